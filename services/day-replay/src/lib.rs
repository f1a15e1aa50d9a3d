//! Day Replay - timeline reconstruction and playback for Home Assistant
//!
//! Rebuilds a calendar day of on/off activity from entity history, merges
//! live state changes for the current day and replays it on a virtual clock.

pub mod api;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod home_assistant;
pub mod interval;
pub mod io;
pub mod live;
pub mod merger;
pub mod reconstruct;
pub mod sampler;
pub mod state;
pub mod time_math;
pub mod timeline;


pub use config::{load_config, Config};
pub use error::{ReplayError, Result};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::engine::{
    Engine, EngineSettings, LiveSettings, SystemTimeSource, TimeSource, TimerSettings,
};
use crate::history::HistoryProvider;
use crate::home_assistant::{HomeAssistantEvents, HomeAssistantRest};
use crate::io::{HttpClient, ReqwestHttpClient};
use crate::live::{LiveEventSource, StateReader};

/// Assembles the replay service from a configuration.
///
/// Every I/O seam can be replaced; anything not injected is built from the
/// Home Assistant settings in the configuration.
pub struct ReplayBuilder {
    config: Config,
    http: Option<Arc<dyn HttpClient>>,
    history: Option<Arc<dyn HistoryProvider>>,
    states: Option<Arc<dyn StateReader>>,
    live_source: Option<Arc<dyn LiveEventSource>>,
    time: Option<Arc<dyn TimeSource>>,
    cancel: Option<CancellationToken>,
}

impl ReplayBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            http: None,
            history: None,
            states: None,
            live_source: None,
            time: None,
            cancel: None,
        }
    }

    pub fn with_http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    pub fn with_history_provider(mut self, history: Arc<dyn HistoryProvider>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_state_reader(mut self, states: Arc<dyn StateReader>) -> Self {
        self.states = Some(states);
        self
    }

    pub fn with_live_source(mut self, source: Arc<dyn LiveEventSource>) -> Self {
        self.live_source = Some(source);
        self
    }

    pub fn with_time_source(mut self, time: Arc<dyn TimeSource>) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Wire the engine and bind the API listener.
    pub async fn build(self) -> Result<DayReplay> {
        let config = self.config;
        let settings = EngineSettings::from_config(&config)?;

        let (history, states) = match (self.history, self.states) {
            (Some(history), Some(states)) => (history, states),
            (history, states) => {
                let http = match self.http {
                    Some(http) => http,
                    None => Arc::new(ReqwestHttpClient::new(
                        &config.home_assistant.access_token,
                        settings.request_timeout,
                    )?),
                };
                let rest = Arc::new(HomeAssistantRest::new(&config.home_assistant, http));
                let rest_history: Arc<dyn HistoryProvider> = rest.clone();
                let rest_states: Arc<dyn StateReader> = rest;
                (
                    history.unwrap_or(rest_history),
                    states.unwrap_or(rest_states),
                )
            }
        };

        let subscriber = match self.live_source {
            Some(source) => Some(source),
            None if config.live.subscribe => {
                let entity_ids = settings.entities.iter().map(|e| e.entity_id.clone());
                let events: Arc<dyn LiveEventSource> =
                    Arc::new(HomeAssistantEvents::new(&config.home_assistant, entity_ids));
                Some(events)
            }
            None => None,
        };
        let live = LiveSettings {
            subscriber,
            poll_interval: Duration::from_millis(config.live.poll_interval_millis),
        };

        let time = self
            .time
            .unwrap_or_else(|| Arc::new(SystemTimeSource) as Arc<dyn TimeSource>);

        tracing::debug!(
            "Tracking {} entities and {} sensors at UTC offset {}",
            settings.entities.len(),
            settings.sensors.len(),
            settings.offset
        );

        let engine = Arc::new(Engine::new(
            settings,
            history,
            states,
            time,
            state::new_timeline_handle(),
        ));

        let listener = if config.api.enabled {
            let addr = SocketAddr::from(([0, 0, 0, 0], config.api.port));
            let listener = TcpListener::bind(addr).await?;
            tracing::info!("API listening on http://{}", listener.local_addr()?);
            Some(listener)
        } else {
            None
        };

        Ok(DayReplay {
            engine,
            timers: TimerSettings::from_config(&config),
            live,
            cancel: self.cancel.unwrap_or_default(),
            listener,
        })
    }
}

/// A wired replay service, ready to start
pub struct DayReplay {
    engine: Arc<Engine>,
    timers: TimerSettings,
    live: LiveSettings,
    cancel: CancellationToken,
    listener: Option<TcpListener>,
}

impl DayReplay {
    pub fn engine(&self) -> Arc<Engine> {
        Arc::clone(&self.engine)
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn api_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Load today, serve the API and run live updates and timers until
    /// cancelled.
    pub async fn start(self) -> Result<()> {
        let cancel = self.cancel;

        // Setup shutdown handler
        let cancel_for_signal = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Shutdown signal received");
                    cancel_for_signal.cancel();
                }
                Err(e) => tracing::error!("Failed to listen for ctrl-c: {}", e),
            }
        });

        let api_task = self.listener.map(|listener| {
            let router = api::build_router(Arc::clone(&self.engine));
            let cancel_for_api = cancel.clone();
            tokio::spawn(async move {
                let served = axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        cancel_for_api.cancelled().await;
                    })
                    .await;
                if let Err(e) = served {
                    tracing::error!("API server failed: {}", e);
                }
                tracing::debug!("API stopped");
            })
        });

        if !cancel.is_cancelled() {
            self.engine.select_today().await;
        }

        tracing::info!("Day replay engine started");

        // Run the engine (blocks until cancelled)
        Arc::clone(&self.engine)
            .run(self.timers, self.live, cancel)
            .await;

        if let Some(task) = api_task {
            let _ = task.await;
        }
        tracing::info!("Day replay engine stopped");

        Ok(())
    }
}
