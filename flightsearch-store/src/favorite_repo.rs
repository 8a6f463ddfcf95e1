use async_trait::async_trait;
use flightsearch_core::repository::FavoritesStore;
use flightsearch_core::FavoritePair;
use sqlx::PgPool;
use std::error::Error;
use tracing::info;

pub struct PostgresFavoritesStore {
    pool: PgPool,
}

impl PostgresFavoritesStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct FavoriteRow {
    departure_code: String,
    destination_code: String,
}

#[async_trait]
impl FavoritesStore for PostgresFavoritesStore {
    async fn insert(
        &self,
        pair: &FavoritePair,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let result = sqlx::query(
            r#"
            INSERT INTO favorite (departure_code, destination_code)
            VALUES ($1, $2)
            ON CONFLICT (departure_code, destination_code) DO NOTHING
            "#,
        )
        .bind(&pair.departure_code)
        .bind(&pair.destination_code)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            info!("Favorite saved: {} -> {}", pair.departure_code, pair.destination_code);
        }
        Ok(())
    }

    async fn delete(
        &self,
        pair: &FavoritePair,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        sqlx::query("DELETE FROM favorite WHERE departure_code = $1 AND destination_code = $2")
            .bind(&pair.departure_code)
            .bind(&pair.destination_code)
            .execute(&self.pool)
            .await?;

        info!("Favorite removed: {} -> {}", pair.departure_code, pair.destination_code);
        Ok(())
    }

    async fn all(&self) -> Result<Vec<FavoritePair>, Box<dyn Error + Send + Sync>> {
        let rows = sqlx::query_as::<_, FavoriteRow>(
            "SELECT departure_code, destination_code FROM favorite ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        // The table CHECK constraint already forbids self routes.
        Ok(rows
            .into_iter()
            .filter_map(|row| FavoritePair::new(row.departure_code, row.destination_code))
            .collect())
    }
}
