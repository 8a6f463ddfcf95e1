//! In-memory collaborators.
//!
//! Used by tests and local runs without Postgres/Redis. Matching and ordering
//! follow the SQL-backed implementations in `flightsearch-store`, and every
//! type can be switched into a failing mode to exercise the error paths.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::model::{Airport, AirportRef, FavoritePair};
use crate::repository::{AirportIndex, FavoritesStore, InputPreferences};

pub struct InMemoryAirportIndex {
    airports: Vec<Airport>,
    latency: Duration,
    failing: AtomicBool,
    suggest_log: RwLock<Vec<String>>,
    destination_log: RwLock<Vec<String>>,
}

impl InMemoryAirportIndex {
    pub fn new(mut airports: Vec<Airport>) -> Self {
        airports.sort_by(|a, b| b.passengers.cmp(&a.passengers));
        Self {
            airports,
            latency: Duration::ZERO,
            failing: AtomicBool::new(false),
            suggest_log: RwLock::new(Vec::new()),
            destination_log: RwLock::new(Vec::new()),
        }
    }

    /// Delay every lookup by `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Fragments passed to `suggest`, in call order (including cancelled calls).
    pub async fn suggest_queries(&self) -> Vec<String> {
        self.suggest_log.read().await.clone()
    }

    /// Origin codes passed to `destinations_from`, in call order.
    pub async fn destination_queries(&self) -> Vec<String> {
        self.destination_log.read().await.clone()
    }

    async fn respond(
        &self,
        airports: Vec<AirportRef>,
    ) -> Result<Vec<AirportRef>, Box<dyn std::error::Error + Send + Sync>> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err("airport index unavailable".into());
        }
        Ok(airports)
    }
}

#[async_trait]
impl AirportIndex for InMemoryAirportIndex {
    async fn suggest(
        &self,
        fragment: &str,
    ) -> Result<Vec<AirportRef>, Box<dyn std::error::Error + Send + Sync>> {
        self.suggest_log.write().await.push(fragment.to_string());

        let needle = fragment.to_lowercase();
        let matches = self
            .airports
            .iter()
            .filter(|a| {
                a.iata_code.to_lowercase().contains(&needle) || a.name.to_lowercase().contains(&needle)
            })
            .map(Airport::to_ref)
            .collect();

        self.respond(matches).await
    }

    async fn destinations_from(
        &self,
        origin: &AirportRef,
    ) -> Result<Vec<AirportRef>, Box<dyn std::error::Error + Send + Sync>> {
        self.destination_log.write().await.push(origin.iata_code.clone());

        let code = origin.iata_code.to_lowercase();
        let name = origin.name.to_lowercase();
        let destinations = self
            .airports
            .iter()
            .filter(|a| a.iata_code.to_lowercase() != code && a.name.to_lowercase() != name)
            .map(Airport::to_ref)
            .collect();

        self.respond(destinations).await
    }
}

#[derive(Default)]
pub struct InMemoryFavoritesStore {
    favorites: RwLock<BTreeSet<FavoritePair>>,
    fail_writes: AtomicBool,
    fail_next: AtomicUsize,
}

impl InMemoryFavoritesStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_favorites(favorites: impl IntoIterator<Item = FavoritePair>) -> Self {
        Self {
            favorites: RwLock::new(favorites.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Fail only the next `count` writes, then accept writes again.
    pub fn fail_next_writes(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    pub async fn contains(&self, pair: &FavoritePair) -> bool {
        self.favorites.read().await.contains(pair)
    }

    fn check_writable(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err("favorites store is read-only".into());
        }
        let transient = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if transient {
            return Err("favorites store briefly unavailable".into());
        }
        Ok(())
    }
}

#[async_trait]
impl FavoritesStore for InMemoryFavoritesStore {
    async fn insert(
        &self,
        pair: &FavoritePair,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.check_writable()?;
        if pair.is_self_route() {
            return Err(format!("refusing self route {}", pair.departure_code).into());
        }
        self.favorites.write().await.insert(pair.clone());
        Ok(())
    }

    async fn delete(
        &self,
        pair: &FavoritePair,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.check_writable()?;
        self.favorites.write().await.remove(pair);
        Ok(())
    }

    async fn all(&self) -> Result<Vec<FavoritePair>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.favorites.read().await.iter().cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemoryInputPreferences {
    text: RwLock<String>,
    failing: AtomicBool,
}

impl InMemoryInputPreferences {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: RwLock::new(text.into()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl InputPreferences for InMemoryInputPreferences {
    async fn get(&self) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err("preferences unavailable".into());
        }
        Ok(self.text.read().await.clone())
    }

    async fn set(
        &self,
        text: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err("preferences unavailable".into());
        }
        *self.text.write().await = text.to_string();
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn sample_airports() -> Vec<Airport> {
    vec![
        Airport::new("LAX", "Los Angeles International Airport", 88_068_013),
        Airport::new("JFK", "John F Kennedy", 62_551_072),
        Airport::new("ORD", "O'Hare International Airport", 84_649_115),
        Airport::new("SFO", "San Francisco International Airport", 57_793_313),
        Airport::new("MUC", "Munich International Airport", 47_959_885),
        Airport::new("AMS", "Amsterdam Airport Schiphol", 71_706_999),
        Airport::new("OSL", "Oslo Airport, Gardermoen", 28_578_000),
    ]
}
