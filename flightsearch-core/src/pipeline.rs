//! Derived lookup streams.
//!
//! Each pipeline owns the sending half of a `watch` channel and republishes
//! whenever its input channel changes. A newer input always cancels the
//! in-flight query for an older one, and results are only published while
//! their generation is still current.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::model::AirportRef;
use crate::repository::AirportIndex;

/// Latest value of a derived airport list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum Lookup {
    Ready(Vec<AirportRef>),
    Failed(String),
}

impl Lookup {
    pub fn empty() -> Self {
        Lookup::Ready(Vec::new())
    }

    pub fn airports(&self) -> &[AirportRef] {
        match self {
            Lookup::Ready(airports) => airports,
            Lookup::Failed(_) => &[],
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Lookup::Failed(_))
    }
}

impl Default for Lookup {
    fn default() -> Self {
        Lookup::empty()
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct InputEvent {
    pub generation: u64,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SelectionEvent {
    pub generation: u64,
    pub airport: Option<AirportRef>,
}

enum Step<T> {
    Superseded,
    Done(T),
    Closed,
}

/// Debounced suggestions: quiet for `debounce`, then one query for the trimmed text.
pub(crate) async fn run_suggestions(
    index: Arc<dyn AirportIndex>,
    mut input: watch::Receiver<InputEvent>,
    output: watch::Sender<Lookup>,
    debounce: Duration,
) {
    // The seeded text is processed like an edit.
    let mut pending = true;

    loop {
        if !pending && input.changed().await.is_err() {
            break;
        }
        pending = false;

        let InputEvent { generation, text } = input.borrow_and_update().clone();
        let fragment = text.trim().to_string();

        if fragment.is_empty() {
            debug!("Blank input (generation {}), clearing suggestions", generation);
            output.send_replace(Lookup::empty());
            continue;
        }

        let quiet = tokio::select! {
            changed = input.changed() => match changed {
                Ok(()) => Step::Superseded,
                Err(_) => Step::Closed,
            },
            _ = tokio::time::sleep(debounce) => Step::Done(()),
        };
        match quiet {
            Step::Closed => break,
            Step::Superseded => {
                pending = true;
                continue;
            }
            Step::Done(()) => {}
        }

        debug!("Querying suggestions for '{}' (generation {})", fragment, generation);
        let step = tokio::select! {
            changed = input.changed() => match changed {
                Ok(()) => Step::Superseded,
                Err(_) => Step::Closed,
            },
            result = index.suggest(&fragment) => Step::Done(result),
        };

        let result = match step {
            Step::Closed => break,
            Step::Superseded => {
                debug!("Suggestion query for '{}' cancelled by newer input", fragment);
                pending = true;
                continue;
            }
            Step::Done(result) => result,
        };

        if input.borrow().generation != generation {
            debug!("Dropping stale suggestions for '{}'", fragment);
            continue;
        }

        match result {
            Ok(airports) => {
                output.send_replace(Lookup::Ready(airports));
            }
            Err(e) => {
                warn!("Suggestion query for '{}' failed: {}", fragment, e);
                output.send_replace(Lookup::Failed(e.to_string()));
            }
        }
    }

    debug!("Suggestion pipeline stopped");
}

/// Destinations for the current selection; a new selection cancels the previous query.
pub(crate) async fn run_possible_flights(
    index: Arc<dyn AirportIndex>,
    mut selection: watch::Receiver<SelectionEvent>,
    output: watch::Sender<Lookup>,
) {
    let mut pending = true;

    loop {
        if !pending && selection.changed().await.is_err() {
            break;
        }
        pending = false;

        let SelectionEvent { generation, airport } = selection.borrow_and_update().clone();
        let Some(origin) = airport else {
            output.send_replace(Lookup::empty());
            continue;
        };

        debug!("Loading destinations from {} (generation {})", origin.iata_code, generation);
        let step = tokio::select! {
            changed = selection.changed() => match changed {
                Ok(()) => Step::Superseded,
                Err(_) => Step::Closed,
            },
            result = index.destinations_from(&origin) => Step::Done(result),
        };

        let result = match step {
            Step::Closed => break,
            Step::Superseded => {
                debug!("Destinations query for {} cancelled by newer selection", origin.iata_code);
                pending = true;
                continue;
            }
            Step::Done(result) => result,
        };

        if selection.borrow().generation != generation {
            continue;
        }

        match result {
            Ok(airports) => {
                debug!("{} destinations from {}", airports.len(), origin.iata_code);
                output.send_replace(Lookup::Ready(airports));
            }
            Err(e) => {
                warn!("Destinations query for {} failed: {}", origin.iata_code, e);
                output.send_replace(Lookup::Failed(e.to_string()));
            }
        }
    }

    debug!("Possible-flights pipeline stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{sample_airports, InMemoryAirportIndex};

    fn input_channel() -> (watch::Sender<InputEvent>, watch::Receiver<InputEvent>) {
        watch::channel(InputEvent::default())
    }

    fn edit(tx: &watch::Sender<InputEvent>, text: &str) {
        tx.send_modify(|event| {
            event.generation += 1;
            event.text = text.to_string();
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_input_skips_index() {
        let index = Arc::new(InMemoryAirportIndex::new(sample_airports()));
        let (tx, rx) = input_channel();
        let (out_tx, out_rx) = watch::channel(Lookup::Ready(vec![AirportRef::new("OLD", "")]));
        tokio::spawn(run_suggestions(index.clone(), rx, out_tx, Duration::from_millis(500)));

        edit(&tx, "   ");
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(*out_rx.borrow(), Lookup::empty());
        assert!(index.suggest_queries().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_waits_for_quiet_window() {
        let index = Arc::new(InMemoryAirportIndex::new(sample_airports()));
        let (tx, rx) = input_channel();
        let (out_tx, out_rx) = watch::channel(Lookup::empty());
        tokio::spawn(run_suggestions(index.clone(), rx, out_tx, Duration::from_millis(500)));

        edit(&tx, " jfk ");
        tokio::time::sleep(Duration::from_millis(499)).await;
        assert!(index.suggest_queries().await.is_empty());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(index.suggest_queries().await, vec!["jfk"]);
        assert_eq!(out_rx.borrow().airports(), &[AirportRef::new("JFK", "John F Kennedy")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_selection_cancels_slow_query() {
        let index = Arc::new(
            InMemoryAirportIndex::new(sample_airports()).with_latency(Duration::from_secs(1)),
        );
        let (tx, rx) = watch::channel(SelectionEvent::default());
        let (out_tx, mut out_rx) = watch::channel(Lookup::empty());
        tokio::spawn(run_possible_flights(index.clone(), rx, out_tx));

        tx.send_replace(SelectionEvent { generation: 1, airport: Some(AirportRef::new("JFK", "John F Kennedy")) });
        tokio::time::sleep(Duration::from_millis(300)).await;
        tx.send_replace(SelectionEvent { generation: 2, airport: Some(AirportRef::new("LAX", "Los Angeles International Airport")) });

        out_rx.wait_for(|l| !l.airports().is_empty()).await.unwrap();
        let lookup = out_rx.borrow().clone();
        assert!(!lookup.airports().contains(&AirportRef::new("LAX", "")));
        assert!(lookup.airports().contains(&AirportRef::new("JFK", "")));
        assert_eq!(index.destination_queries().await, vec!["JFK", "LAX"]);
    }
}
