pub mod app_config;
pub mod database;
pub mod airport_repo;
pub mod favorite_repo;
pub mod redis_repo;

pub use airport_repo::PostgresAirportIndex;
pub use database::DbClient;
pub use favorite_repo::PostgresFavoritesStore;
pub use redis_repo::{RedisClient, RedisInputPreferences};
