//! Search session: input text, selection and favorite flags for one
//! interactive user, plus the pipelines derived from them.
//!
//! All mutations go through `watch` senders, whose write locks serialize
//! concurrent callers. The state lock is only ever taken while holding the
//! input or selection lock (never the other way around).

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::favorites::{FavoriteFlags, FavoriteOp, Toggled, WriteFailure, WriteFailurePolicy};
use crate::model::{AirportRef, FavoritePair};
use crate::pipeline::{self, InputEvent, Lookup, SelectionEvent};
use crate::repository::{AirportIndex, FavoritesStore, InputPreferences};
use crate::writer::{self, DurableWrite};
use crate::{CoreError, CoreResult};

const FAILURE_BUFFER: usize = 64;

fn default_debounce_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default)]
    pub write_failure_policy: WriteFailurePolicy,
}

impl SessionConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            write_failure_policy: WriteFailurePolicy::default(),
        }
    }
}

#[derive(Clone)]
pub struct SessionDeps {
    pub airports: Arc<dyn AirportIndex>,
    pub favorites: Arc<dyn FavoritesStore>,
    pub preferences: Arc<dyn InputPreferences>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    #[default]
    Idle,
    Typing,
    Selected,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SessionState {
    pub input_text: String,
    pub selection: Option<AirportRef>,
    pub is_selection_active: bool,
    pub phase: SessionPhase,
    pub favorite_flags: FavoriteFlags,
}

/// Point-in-time copy of the session state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub input_text: String,
    pub selection: Option<AirportRef>,
    pub is_selection_active: bool,
    pub phase: SessionPhase,
    pub favorites: Vec<FavoritePair>,
}

pub struct SearchSession {
    state: Arc<watch::Sender<SessionState>>,
    input: watch::Sender<InputEvent>,
    selection: watch::Sender<SelectionEvent>,
    suggestions: watch::Receiver<Lookup>,
    possible_flights: watch::Receiver<Lookup>,
    writes: mpsc::UnboundedSender<DurableWrite>,
    failures: broadcast::Sender<WriteFailure>,
    favorites: Arc<dyn FavoritesStore>,
    policy: WriteFailurePolicy,
    tasks: Vec<JoinHandle<()>>,
}

impl SearchSession {
    /// Seed from the saved search text and spawn the background pipelines.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start(deps: SessionDeps, config: SessionConfig) -> Self {
        let seed = match deps.preferences.get().await {
            Ok(text) => text,
            Err(e) => {
                warn!("Could not read saved search text, starting empty: {}", e);
                String::new()
            }
        };

        let (state, _) = watch::channel(SessionState {
            input_text: seed.clone(),
            phase: if seed.is_empty() { SessionPhase::Idle } else { SessionPhase::Typing },
            ..SessionState::default()
        });
        let state = Arc::new(state);

        let (input, input_rx) = watch::channel(InputEvent { generation: 0, text: seed.clone() });
        let (selection, selection_rx) = watch::channel(SelectionEvent::default());
        let (suggestions_tx, suggestions) = watch::channel(Lookup::empty());
        let (flights_tx, possible_flights) = watch::channel(Lookup::empty());
        let (writes, write_rx) = mpsc::unbounded_channel();
        let (failures, _) = broadcast::channel(FAILURE_BUFFER);

        let tasks = vec![
            tokio::spawn(pipeline::run_suggestions(
                deps.airports.clone(),
                input_rx,
                suggestions_tx,
                config.debounce(),
            )),
            tokio::spawn(pipeline::run_possible_flights(
                deps.airports.clone(),
                selection_rx,
                flights_tx,
            )),
            tokio::spawn(run_reconciler(
                possible_flights.clone(),
                state.clone(),
                deps.favorites.clone(),
            )),
            tokio::spawn(writer::run_writer(
                write_rx,
                deps.favorites.clone(),
                deps.preferences.clone(),
                state.clone(),
                failures.clone(),
                config.write_failure_policy,
            )),
        ];

        info!(
            "Search session started (seed '{}', debounce {}ms, on write failure: {:?})",
            seed, config.debounce_ms, config.write_failure_policy
        );

        Self {
            state,
            input,
            selection,
            suggestions,
            possible_flights,
            writes,
            failures,
            favorites: deps.favorites,
            policy: config.write_failure_policy,
            tasks,
        }
    }

    // ------------------------------------------------------------------------
    // Input & selection
    // ------------------------------------------------------------------------

    /// Replace the search text. Deactivates the selection, restarts the
    /// suggestion debounce and queues the text for saving.
    pub fn update_input(&self, text: impl Into<String>) {
        let text = text.into();
        self.input.send_modify(|event| {
            event.generation += 1;
            event.text = text.clone();
            self.state.send_modify(|s| {
                s.input_text = text.clone();
                s.is_selection_active = false;
                s.phase = if text.is_empty() { SessionPhase::Idle } else { SessionPhase::Typing };
            });
        });
        self.persist_input(text);
    }

    /// Choose an airport from the suggestions. Rejected while idle.
    pub fn select_airport(&self, airport: AirportRef) -> CoreResult<()> {
        let mut outcome = Ok(());
        self.selection.send_if_modified(|event| {
            let phase = self.state.borrow().phase;
            if phase == SessionPhase::Idle {
                outcome = Err(CoreError::InvalidTransition { from: phase, event: "select_airport" });
                return false;
            }
            event.generation += 1;
            event.airport = Some(airport.clone());
            self.state.send_modify(|s| {
                s.selection = Some(airport.clone());
                s.is_selection_active = true;
                s.phase = SessionPhase::Selected;
            });
            true
        });

        if outcome.is_ok() {
            debug!("Selected {} ({})", airport.iata_code, airport.name);
        }
        outcome
    }

    /// Empty the search text. Selection and its active flag are kept.
    pub fn on_clear_click(&self) {
        self.input.send_modify(|event| {
            event.generation += 1;
            event.text.clear();
            self.state.send_modify(|s| {
                s.input_text.clear();
                s.phase = SessionPhase::Idle;
            });
        });
        self.persist_input(String::new());
    }

    fn persist_input(&self, text: String) {
        if self.writes.send(DurableWrite::Input(text)).is_err() {
            warn!("Write queue closed, search text not saved");
        }
    }

    // ------------------------------------------------------------------------
    // Favorites
    // ------------------------------------------------------------------------

    pub fn is_favorite(&self, pair: &FavoritePair) -> bool {
        self.state.borrow().favorite_flags.get(pair)
    }

    /// Flip the flag right away and queue the durable insert/delete.
    /// Returns the new flag value.
    pub fn toggle_favorite(&self, pair: &FavoritePair) -> CoreResult<bool> {
        if pair.is_self_route() {
            return Err(CoreError::SelfRoute(pair.departure_code.clone()));
        }

        let mut toggled = Toggled { favorite: false, seq: 0 };
        self.state.send_modify(|s| toggled = s.favorite_flags.toggle(pair));
        let Toggled { favorite, seq } = toggled;

        let op = if favorite { FavoriteOp::Insert } else { FavoriteOp::Delete };
        debug!("Favorite {} -> {} now {}", pair.departure_code, pair.destination_code, favorite);

        let write = DurableWrite::Favorite { pair: pair.clone(), op, seq };
        if self.writes.send(write).is_err() {
            error!("Write queue closed, favorite {:?} not saved", op);
            if self.policy == WriteFailurePolicy::Rollback {
                writer::roll_back(&self.state, pair, seq);
            }
            let _ = self.failures.send(WriteFailure::Favorite {
                pair: pair.clone(),
                op,
                message: "write queue closed".to_string(),
            });
        }

        Ok(favorite)
    }

    /// Raise flags for stored favorites departing `selection` to one of
    /// `destinations`. Returns how many flags changed.
    pub fn reconcile(
        &self,
        all_favorites: &[FavoritePair],
        selection: &AirportRef,
        destinations: &[AirportRef],
    ) -> usize {
        apply_reconcile(&self.state, all_favorites, selection, destinations)
    }

    /// Reconcile against the store for the current selection and destinations.
    pub async fn refresh_favorites(&self) -> CoreResult<usize> {
        let all = self
            .favorites
            .all()
            .await
            .map_err(|e| CoreError::Store(e.to_string()))?;

        let Some(selection) = self.selection() else {
            return Ok(0);
        };
        let destinations = self.possible_flights.borrow().airports().to_vec();

        Ok(self.reconcile(&all, &selection, &destinations))
    }

    /// Every stored favorite, straight from the store.
    pub async fn stored_favorites(&self) -> CoreResult<Vec<FavoritePair>> {
        self.favorites
            .all()
            .await
            .map_err(|e| CoreError::Store(e.to_string()))
    }

    // ------------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------------

    pub fn input_text(&self) -> String {
        self.state.borrow().input_text.clone()
    }

    pub fn selection(&self) -> Option<AirportRef> {
        self.state.borrow().selection.clone()
    }

    pub fn is_selection_active(&self) -> bool {
        self.state.borrow().is_selection_active
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.borrow().phase
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let s = self.state.borrow();
        SessionSnapshot {
            input_text: s.input_text.clone(),
            selection: s.selection.clone(),
            is_selection_active: s.is_selection_active,
            phase: s.phase,
            favorites: s.favorite_flags.favorites(),
        }
    }

    /// Debounced suggestions for the current input text.
    pub fn suggestions(&self) -> watch::Receiver<Lookup> {
        self.suggestions.clone()
    }

    /// Destinations from the current selection.
    pub fn possible_flights(&self) -> watch::Receiver<Lookup> {
        self.possible_flights.clone()
    }

    /// Durable writes that failed after their optimistic update.
    pub fn write_failures(&self) -> broadcast::Receiver<WriteFailure> {
        self.failures.subscribe()
    }
}

impl Drop for SearchSession {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn apply_reconcile(
    state: &watch::Sender<SessionState>,
    all_favorites: &[FavoritePair],
    selection: &AirportRef,
    destinations: &[AirportRef],
) -> usize {
    let mut raised = 0;
    state.send_if_modified(|s| {
        raised = s.favorite_flags.reconcile(all_favorites, selection, destinations);
        raised > 0
    });
    raised
}

/// Refresh favorite flags from the store whenever a destinations list loads.
async fn run_reconciler(
    mut flights: watch::Receiver<Lookup>,
    state: Arc<watch::Sender<SessionState>>,
    favorites: Arc<dyn FavoritesStore>,
) {
    while flights.changed().await.is_ok() {
        let destinations = flights.borrow_and_update().airports().to_vec();
        if destinations.is_empty() {
            continue;
        }
        let Some(selection) = state.borrow().selection.clone() else {
            continue;
        };

        match favorites.all().await {
            Ok(all) => {
                let raised = apply_reconcile(&state, &all, &selection, &destinations);
                debug!("Reconciled favorites from {}: {} raised", selection.iata_code, raised);
            }
            Err(e) => warn!("Could not load favorites for {}: {}", selection.iata_code, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{
        sample_airports, InMemoryAirportIndex, InMemoryFavoritesStore, InMemoryInputPreferences,
    };

    struct Harness {
        index: Arc<InMemoryAirportIndex>,
        favorites: Arc<InMemoryFavoritesStore>,
        preferences: Arc<InMemoryInputPreferences>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                index: Arc::new(InMemoryAirportIndex::new(sample_airports())),
                favorites: Arc::new(InMemoryFavoritesStore::new()),
                preferences: Arc::new(InMemoryInputPreferences::default()),
            }
        }

        async fn start(&self, policy: WriteFailurePolicy) -> SearchSession {
            let deps = SessionDeps {
                airports: self.index.clone(),
                favorites: self.favorites.clone(),
                preferences: self.preferences.clone(),
            };
            let config = SessionConfig { write_failure_policy: policy, ..SessionConfig::default() };
            SearchSession::start(deps, config).await
        }
    }

    fn jfk() -> AirportRef {
        AirportRef::new("JFK", "John F Kennedy")
    }

    fn jfk_lax() -> FavoritePair {
        FavoritePair::new("JFK", "LAX").unwrap()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_phase_transitions() {
        let harness = Harness::new();
        let session = harness.start(WriteFailurePolicy::Ignore).await;
        assert_eq!(session.phase(), SessionPhase::Idle);

        session.update_input("JF");
        assert_eq!(session.phase(), SessionPhase::Typing);

        session.select_airport(jfk()).unwrap();
        assert_eq!(session.phase(), SessionPhase::Selected);
        assert!(session.is_selection_active());

        session.update_input("JFK");
        assert_eq!(session.phase(), SessionPhase::Typing);
        assert!(!session.is_selection_active());
        assert_eq!(session.selection(), Some(jfk()));

        session.update_input("");
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_rejected_while_idle() {
        let harness = Harness::new();
        let session = harness.start(WriteFailurePolicy::Ignore).await;

        let err = session.select_airport(jfk()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { from: SessionPhase::Idle, .. }));
        assert_eq!(session.selection(), None);
        assert!(harness.index.destination_queries().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_keeps_selection() {
        let harness = Harness::new();
        let session = harness.start(WriteFailurePolicy::Ignore).await;

        session.update_input("JFK");
        session.select_airport(jfk()).unwrap();
        session.on_clear_click();

        assert_eq!(session.input_text(), "");
        assert_eq!(session.selection(), Some(jfk()));
        assert!(session.is_selection_active());
        assert_eq!(session.phase(), SessionPhase::Idle);

        settle().await;
        assert_eq!(harness.preferences.get().await.unwrap(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_seeded_from_saved_text() {
        let harness = Harness {
            preferences: Arc::new(InMemoryInputPreferences::new("MUC")),
            ..Harness::new()
        };

        let session = harness.start(WriteFailurePolicy::Ignore).await;
        assert_eq!(session.input_text(), "MUC");
        assert_eq!(session.phase(), SessionPhase::Typing);

        let mut suggestions = session.suggestions();
        suggestions.wait_for(|l| !l.airports().is_empty()).await.unwrap();
        assert_eq!(suggestions.borrow().airports()[0].iata_code, "MUC");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_preferences_start_empty() {
        let harness = Harness::new();
        harness.preferences.set_failing(true);

        let session = harness.start(WriteFailurePolicy::Ignore).await;
        assert_eq!(session.input_text(), "");
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_input_is_saved() {
        let harness = Harness::new();
        let session = harness.start(WriteFailurePolicy::Ignore).await;

        session.update_input("Oslo");
        settle().await;
        assert_eq!(harness.preferences.get().await.unwrap(), "Oslo");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_input_save_is_reported() {
        let harness = Harness::new();
        let session = harness.start(WriteFailurePolicy::Ignore).await;
        let mut failures = session.write_failures();

        harness.preferences.set_failing(true);
        session.update_input("Oslo");

        let failure = failures.recv().await.unwrap();
        assert!(matches!(failure, WriteFailure::InputPreference { ref text, .. } if text == "Oslo"));
        assert_eq!(session.input_text(), "Oslo");
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_writes_in_order() {
        let harness = Harness::new();
        let session = harness.start(WriteFailurePolicy::Ignore).await;

        assert!(session.toggle_favorite(&jfk_lax()).unwrap());
        assert!(session.is_favorite(&jfk_lax()));
        settle().await;
        assert!(harness.favorites.contains(&jfk_lax()).await);

        // Insert and delete queued back to back land in issue order.
        assert!(!session.toggle_favorite(&jfk_lax()).unwrap());
        assert!(session.toggle_favorite(&jfk_lax()).unwrap());
        assert!(!session.toggle_favorite(&jfk_lax()).unwrap());
        settle().await;
        assert!(!harness.favorites.contains(&jfk_lax()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_self_route_toggle_rejected() {
        let harness = Harness::new();
        let session = harness.start(WriteFailurePolicy::Ignore).await;
        let pair = FavoritePair {
            departure_code: "JFK".to_string(),
            destination_code: "JFK".to_string(),
        };

        assert!(matches!(session.toggle_favorite(&pair), Err(CoreError::SelfRoute(_))));
        assert!(!session.is_favorite(&pair));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_keeps_flag_when_ignoring() {
        let harness = Harness::new();
        harness.favorites.set_fail_writes(true);
        let session = harness.start(WriteFailurePolicy::Ignore).await;
        let mut failures = session.write_failures();

        assert!(session.toggle_favorite(&jfk_lax()).unwrap());

        let failure = failures.recv().await.unwrap();
        assert!(matches!(failure, WriteFailure::Favorite { op: FavoriteOp::Insert, .. }));
        assert!(session.is_favorite(&jfk_lax()));
        assert!(!harness.favorites.contains(&jfk_lax()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_rolls_back() {
        let harness = Harness::new();
        harness.favorites.set_fail_writes(true);
        let session = harness.start(WriteFailurePolicy::Rollback).await;
        let mut failures = session.write_failures();

        assert!(session.toggle_favorite(&jfk_lax()).unwrap());
        assert!(session.is_favorite(&jfk_lax()));

        failures.recv().await.unwrap();
        assert!(!session.is_favorite(&jfk_lax()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rollback_tracks_store_when_every_write_fails() {
        let harness = Harness::new();
        harness.favorites.set_fail_writes(true);
        let session = harness.start(WriteFailurePolicy::Rollback).await;

        // on (insert fails), off (delete fails): the store never held the pair.
        session.toggle_favorite(&jfk_lax()).unwrap();
        session.toggle_favorite(&jfk_lax()).unwrap();
        settle().await;

        assert!(!harness.favorites.contains(&jfk_lax()).await);
        assert_eq!(session.is_favorite(&jfk_lax()), harness.favorites.contains(&jfk_lax()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rollback_ignores_failure_followed_by_later_writes() {
        let harness = Harness::new();
        harness.favorites.fail_next_writes(1);
        let session = harness.start(WriteFailurePolicy::Rollback).await;
        let mut failures = session.write_failures();

        // on (insert fails), off (delete ok), on (insert ok).
        session.toggle_favorite(&jfk_lax()).unwrap();
        session.toggle_favorite(&jfk_lax()).unwrap();
        session.toggle_favorite(&jfk_lax()).unwrap();
        settle().await;

        let failure = failures.recv().await.unwrap();
        assert!(matches!(failure, WriteFailure::Favorite { op: FavoriteOp::Insert, .. }));
        assert!(harness.favorites.contains(&jfk_lax()).await);
        assert!(session.is_favorite(&jfk_lax()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rollback_restores_confirmed_favorite() {
        let harness = Harness::new();
        let session = harness.start(WriteFailurePolicy::Rollback).await;

        session.toggle_favorite(&jfk_lax()).unwrap();
        settle().await;
        assert!(harness.favorites.contains(&jfk_lax()).await);

        // The delete fails once; the pair is still stored, so the flag returns.
        harness.favorites.fail_next_writes(1);
        assert!(!session.toggle_favorite(&jfk_lax()).unwrap());
        settle().await;

        assert!(harness.favorites.contains(&jfk_lax()).await);
        assert!(session.is_favorite(&jfk_lax()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_selection_reconciles_stored_favorites() {
        let harness = Harness {
            favorites: Arc::new(InMemoryFavoritesStore::with_favorites([
                jfk_lax(),
                FavoritePair::new("SFO", "LAX").unwrap(),
            ])),
            ..Harness::new()
        };
        let session = harness.start(WriteFailurePolicy::Ignore).await;

        assert!(!session.is_favorite(&jfk_lax()));

        session.update_input("JFK");
        session.select_airport(jfk()).unwrap();
        let mut flights = session.possible_flights();
        flights.wait_for(|l| !l.airports().is_empty()).await.unwrap();
        settle().await;

        assert!(session.is_favorite(&jfk_lax()));
        assert!(!session.is_favorite(&FavoritePair::new("SFO", "LAX").unwrap()));
        assert_eq!(session.snapshot().favorites, vec![jfk_lax()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_without_selection_is_noop() {
        let harness = Harness {
            favorites: Arc::new(InMemoryFavoritesStore::with_favorites([jfk_lax()])),
            ..Harness::new()
        };
        let session = harness.start(WriteFailurePolicy::Ignore).await;

        assert_eq!(session.refresh_favorites().await.unwrap(), 0);
        assert!(!session.is_favorite(&jfk_lax()));
    }
}
