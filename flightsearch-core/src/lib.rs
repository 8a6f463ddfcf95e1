pub mod model;
pub mod repository;
pub mod memory;
pub mod favorites;
pub mod pipeline;
pub mod session;
mod writer;

pub use favorites::{FavoriteFlags, FavoriteOp, Toggled, WriteFailure, WriteFailurePolicy};
pub use model::{Airport, AirportRef, FavoritePair};
pub use pipeline::Lookup;
pub use repository::{AirportIndex, FavoritesStore, InputPreferences};
pub use session::{SearchSession, SessionConfig, SessionDeps, SessionPhase, SessionSnapshot};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Store operation failed: {0}")]
    Store(String),
    #[error("Cannot {event} while session is {from:?}")]
    InvalidTransition {
        from: SessionPhase,
        event: &'static str,
    },
    #[error("A route cannot start and end at {0}")]
    SelfRoute(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
