//! Live state sources: event subscription with a one-time polling fallback

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A state change of one entity as delivered by the live source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChangeEvent {
    pub entity_id: String,
    pub new_state: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Reads the current raw state of an entity on demand
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait StateReader: Send + Sync {
    /// `Ok(None)` when the entity is unknown to the server
    async fn current_state(&self, entity_id: &str) -> crate::Result<Option<String>>;
}

/// Pushes state changes as they happen.
///
/// The returned channel closes when the underlying connection ends. Any
/// task feeding it stops once `cancel` fires.
#[async_trait]
pub trait LiveEventSource: Send + Sync {
    async fn subscribe(
        &self,
        cancel: CancellationToken,
    ) -> crate::Result<mpsc::Receiver<StateChangeEvent>>;
}

/// The live source in use, chosen once at setup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LiveMode {
    Disabled,
    Subscription,
    Polling { interval_millis: u64 },
}

/// Handle to the active live source
pub enum LiveSource {
    Subscription(mpsc::Receiver<StateChangeEvent>),
    Polling(Duration),
}

impl LiveSource {
    pub fn mode(&self) -> LiveMode {
        match self {
            LiveSource::Subscription(_) => LiveMode::Subscription,
            LiveSource::Polling(interval) => LiveMode::Polling {
                interval_millis: interval.as_millis() as u64,
            },
        }
    }
}

/// Called for each state change, in arrival order
#[async_trait]
pub trait StateChangeSink: Send + Sync {
    async fn on_event(&self, event: StateChangeEvent);

    /// Told which source ended up feeding events
    async fn on_mode(&self, mode: LiveMode);
}

/// Try the subscription, else poll. Returns the source to run.
pub async fn select_source(
    subscriber: Option<&dyn LiveEventSource>,
    poll_interval: Duration,
    cancel: &CancellationToken,
) -> LiveSource {
    if let Some(subscriber) = subscriber {
        match subscriber.subscribe(cancel.clone()).await {
            Ok(rx) => {
                tracing::info!("Live updates via event subscription");
                return LiveSource::Subscription(rx);
            }
            Err(e) => {
                tracing::warn!("Event subscription failed, falling back to polling: {}", e);
            }
        }
    }
    tracing::info!("Live updates via polling every {:?}", poll_interval);
    LiveSource::Polling(poll_interval)
}

/// Drive live updates until cancelled.
///
/// `last_seen` holds the raw state of each entity as the caller last applied
/// it. Subscription events keep it current, and polling reports any value
/// that differs from it, including a change made while the subscription was
/// going down. A subscription that ends is replaced by polling once; polling
/// is never swapped back.
pub async fn run_live(
    source: LiveSource,
    entity_ids: Vec<String>,
    mut last_seen: HashMap<String, String>,
    reader: Arc<dyn StateReader>,
    poll_interval: Duration,
    sink: Arc<dyn StateChangeSink>,
    cancel: CancellationToken,
) {
    sink.on_mode(source.mode()).await;

    let interval = match source {
        LiveSource::Subscription(mut rx) => {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    event = rx.recv() => match event {
                        Some(event) => {
                            remember(&mut last_seen, &event);
                            sink.on_event(event).await;
                        }
                        None => break,
                    },
                }
            }
            tracing::warn!("Event subscription ended, falling back to polling");
            sink.on_mode(LiveMode::Polling {
                interval_millis: poll_interval.as_millis() as u64,
            })
            .await;
            poll_interval
        }
        LiveSource::Polling(interval) => interval,
    };

    poll_states(entity_ids, last_seen, reader, interval, sink, cancel).await;
}

fn remember(last_seen: &mut HashMap<String, String>, event: &StateChangeEvent) {
    match &event.new_state {
        Some(state) => {
            last_seen.insert(event.entity_id.clone(), state.clone());
        }
        None => {
            last_seen.remove(&event.entity_id);
        }
    }
}

async fn poll_states(
    entity_ids: Vec<String>,
    mut last_seen: HashMap<String, String>,
    reader: Arc<dyn StateReader>,
    interval: Duration,
    sink: Arc<dyn StateChangeSink>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        for entity_id in &entity_ids {
            let state = match reader.current_state(entity_id).await {
                Ok(Some(state)) => state,
                Ok(None) => continue,
                Err(e) => {
                    tracing::debug!("Polling {} failed: {}", entity_id, e);
                    continue;
                }
            };
            if last_seen.get(entity_id) == Some(&state) {
                continue;
            }
            last_seen.insert(entity_id.clone(), state.clone());
            sink.on_event(StateChangeEvent {
                entity_id: entity_id.clone(),
                new_state: Some(state),
                timestamp: Utc::now(),
            })
            .await;
        }
    }
}
