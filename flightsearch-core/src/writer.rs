use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info};

use crate::favorites::{FavoriteOp, WriteFailure, WriteFailurePolicy};
use crate::model::FavoritePair;
use crate::repository::{FavoritesStore, InputPreferences};
use crate::session::SessionState;

#[derive(Debug, Clone)]
pub(crate) enum DurableWrite {
    Favorite { pair: FavoritePair, op: FavoriteOp, seq: u64 },
    Input(String),
}

/// Applies durable writes one at a time, in the order they were queued.
pub(crate) async fn run_writer(
    mut queue: mpsc::UnboundedReceiver<DurableWrite>,
    favorites: Arc<dyn FavoritesStore>,
    preferences: Arc<dyn InputPreferences>,
    state: Arc<watch::Sender<SessionState>>,
    failures: broadcast::Sender<WriteFailure>,
    policy: WriteFailurePolicy,
) {
    while let Some(write) = queue.recv().await {
        match write {
            DurableWrite::Favorite { pair, op, seq } => {
                let result = match op {
                    FavoriteOp::Insert => favorites.insert(&pair).await,
                    FavoriteOp::Delete => favorites.delete(&pair).await,
                };
                match result {
                    Ok(()) => {
                        debug!(
                            "Favorite {:?} {} -> {} stored",
                            op, pair.departure_code, pair.destination_code
                        );
                        // Bookkeeping only, the visible flag is unchanged.
                        state.send_if_modified(|s| {
                            s.favorite_flags.confirm_write(&pair, op == FavoriteOp::Insert);
                            false
                        });
                    }
                    Err(e) => {
                        error!(
                            "Favorite {:?} {} -> {} failed: {}",
                            op, pair.departure_code, pair.destination_code, e
                        );
                        if policy == WriteFailurePolicy::Rollback {
                            roll_back(&state, &pair, seq);
                        }
                        let _ = failures.send(WriteFailure::Favorite {
                            pair,
                            op,
                            message: e.to_string(),
                        });
                    }
                }
            }
            DurableWrite::Input(text) => {
                if let Err(e) = preferences.set(&text).await {
                    error!("Saving search text failed: {}", e);
                    let _ = failures.send(WriteFailure::InputPreference {
                        text,
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    info!("Durable write queue closed");
}

/// Undo the failed write `seq`, unless a later write for the pair is queued.
pub(crate) fn roll_back(state: &watch::Sender<SessionState>, pair: &FavoritePair, seq: u64) {
    state.send_if_modified(|s| match s.favorite_flags.roll_back(pair, seq) {
        Some(restored) => {
            info!(
                "Rolled back favorite {} -> {} to {}",
                pair.departure_code, pair.destination_code, restored
            );
            true
        }
        None => false,
    });
}
