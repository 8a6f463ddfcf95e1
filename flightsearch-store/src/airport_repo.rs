use async_trait::async_trait;
use flightsearch_core::repository::AirportIndex;
use flightsearch_core::AirportRef;
use sqlx::PgPool;
use std::error::Error;
use tracing::debug;

pub struct PostgresAirportIndex {
    pool: PgPool,
}

impl PostgresAirportIndex {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct AirportRow {
    iata_code: String,
    name: String,
}

impl From<AirportRow> for AirportRef {
    fn from(row: AirportRow) -> Self {
        AirportRef::new(row.iata_code, row.name)
    }
}

/// Escape LIKE metacharacters so the fragment only matches literally.
fn escape_like(fragment: &str) -> String {
    let mut escaped = String::with_capacity(fragment.len());
    for c in fragment.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl AirportIndex for PostgresAirportIndex {
    async fn suggest(
        &self,
        fragment: &str,
    ) -> Result<Vec<AirportRef>, Box<dyn Error + Send + Sync>> {
        // ILIKE on both columns so code and name share the same case rules
        let rows = sqlx::query_as::<_, AirportRow>(
            r#"
            SELECT iata_code, name
            FROM airport
            WHERE iata_code ILIKE '%' || $1 || '%' ESCAPE '\'
               OR name ILIKE '%' || $1 || '%' ESCAPE '\'
            ORDER BY passengers DESC
            "#,
        )
        .bind(escape_like(fragment))
        .fetch_all(&self.pool)
        .await?;

        debug!("{} airports match '{}'", rows.len(), fragment);
        Ok(rows.into_iter().map(AirportRef::from).collect())
    }

    async fn destinations_from(
        &self,
        origin: &AirportRef,
    ) -> Result<Vec<AirportRef>, Box<dyn Error + Send + Sync>> {
        let rows = sqlx::query_as::<_, AirportRow>(
            r#"
            SELECT iata_code, name
            FROM airport
            WHERE lower(iata_code) <> lower($1)
              AND lower(name) <> lower($2)
            ORDER BY passengers DESC
            "#,
        )
        .bind(&origin.iata_code)
        .bind(&origin.name)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AirportRef::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("JFK"), "JFK");
        assert_eq!(escape_like("_"), r"\_");
        assert_eq!(escape_like("50%"), r"50\%");
        assert_eq!(escape_like(r"a\b"), r"a\\b");
    }
}
