use async_trait::async_trait;
use crate::model::{AirportRef, FavoritePair};

/// Read-only airport lookup, ranked by descending passenger volume
#[async_trait]
pub trait AirportIndex: Send + Sync {
    /// Airports whose code or name contains `fragment`.
    async fn suggest(
        &self,
        fragment: &str,
    ) -> Result<Vec<AirportRef>, Box<dyn std::error::Error + Send + Sync>>;

    /// Every airport except one whose code or name exactly matches `origin`.
    async fn destinations_from(
        &self,
        origin: &AirportRef,
    ) -> Result<Vec<AirportRef>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Durable set of saved routes
#[async_trait]
pub trait FavoritesStore: Send + Sync {
    async fn insert(
        &self,
        pair: &FavoritePair,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    async fn delete(
        &self,
        pair: &FavoritePair,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    async fn all(&self) -> Result<Vec<FavoritePair>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Durable last-typed search text
#[async_trait]
pub trait InputPreferences: Send + Sync {
    async fn get(&self) -> Result<String, Box<dyn std::error::Error + Send + Sync>>;

    async fn set(
        &self,
        text: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
