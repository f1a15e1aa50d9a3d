//! Home Assistant transport: REST history and state reads, websocket events

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::{SinkExt, Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;

use crate::config::HomeAssistantConfig;
use crate::history::{HistoryProvider, SensorSample};
use crate::io::HttpClient;
use crate::live::{LiveEventSource, StateChangeEvent, StateReader};
use crate::reconstruct::Sample;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// One entry of a history response. With `minimal_response` only the first
/// entry carries `entity_id` and attributes.
#[derive(Debug, Deserialize)]
struct HistoryEntry {
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    last_changed: Option<DateTime<Utc>>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    attributes: Option<serde_json::Value>,
}

impl HistoryEntry {
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_changed.or(self.last_updated)
    }
}

#[derive(Debug, Deserialize)]
struct StateResponse {
    state: String,
}

/// REST client for history and current state
pub struct HomeAssistantRest {
    base_url: String,
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for HomeAssistantRest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HomeAssistantRest")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl HomeAssistantRest {
    pub fn new(config: &HomeAssistantConfig, http: Arc<dyn HttpClient>) -> Self {
        let base_url = config.base_url();
        tracing::debug!("Created Home Assistant REST client at {}", base_url);
        Self { base_url, http }
    }

    fn history_url(
        &self,
        entity_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        minimal: bool,
    ) -> String {
        let mut url = format!(
            "{}/api/history/period/{}?end_time={}&filter_entity_id={}",
            self.base_url,
            encode_timestamp(start),
            encode_timestamp(end),
            entity_id
        );
        if minimal {
            url.push_str("&minimal_response&no_attributes");
        }
        url
    }

    async fn fetch_entries(&self, url: &str) -> crate::Result<Vec<HistoryEntry>> {
        let response = self.http.get(url).await?;
        if !response.is_success() {
            return Err(crate::ReplayError::History(format!(
                "History request returned status {}",
                response.status
            )));
        }
        let series: Vec<Vec<HistoryEntry>> = serde_json::from_str(&response.body)?;
        Ok(series.into_iter().next().unwrap_or_default())
    }
}

/// `+` in an offset would be read as a space in a query string
fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[async_trait]
impl HistoryProvider for HomeAssistantRest {
    async fn fetch_history(
        &self,
        entity_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> crate::Result<Vec<Sample>> {
        let url = self.history_url(entity_id, start, end, true);
        let entries = self.fetch_entries(&url).await?;
        let samples: Vec<Sample> = entries
            .into_iter()
            .filter_map(|entry| {
                Some(Sample {
                    entity_id: entity_id.to_string(),
                    timestamp: entry.timestamp()?,
                    raw_value: entry.state,
                })
            })
            .collect();
        tracing::debug!("Fetched {} sample(s) for {}", samples.len(), entity_id);
        Ok(samples)
    }

    async fn fetch_sensor_history(
        &self,
        entity_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> crate::Result<Vec<SensorSample>> {
        let url = self.history_url(entity_id, start, end, false);
        let entries = self.fetch_entries(&url).await?;
        let samples: Vec<SensorSample> = entries
            .into_iter()
            .filter_map(|entry| {
                Some(SensorSample {
                    entity_id: entity_id.to_string(),
                    timestamp: entry.timestamp()?,
                    value: entry.state?,
                    attributes: entry.attributes.unwrap_or_default(),
                })
            })
            .collect();
        tracing::debug!("Fetched {} sensor reading(s) for {}", samples.len(), entity_id);
        Ok(samples)
    }
}

#[async_trait]
impl StateReader for HomeAssistantRest {
    async fn current_state(&self, entity_id: &str) -> crate::Result<Option<String>> {
        let url = format!("{}/api/states/{}", self.base_url, entity_id);
        let response = self.http.get(&url).await?;
        if response.status == 404 {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(crate::ReplayError::Http(format!(
                "State request for {} returned status {}",
                entity_id, response.status
            )));
        }
        let parsed: StateResponse = serde_json::from_str(&response.body)?;
        Ok(Some(parsed.state))
    }
}

/// Websocket subscription to `state_changed` events
pub struct HomeAssistantEvents {
    url: String,
    access_token: String,
    entity_ids: HashSet<String>,
}

impl HomeAssistantEvents {
    pub fn new(config: &HomeAssistantConfig, entity_ids: impl IntoIterator<Item = String>) -> Self {
        Self {
            url: config.websocket_url(),
            access_token: config.access_token.clone(),
            entity_ids: entity_ids.into_iter().collect(),
        }
    }
}

/// Messages the server sends during and after the handshake
#[derive(Debug, PartialEq)]
enum ServerMessage {
    AuthRequired,
    AuthOk,
    AuthInvalid(String),
    Result { success: bool },
    StateChanged(StateChangeEvent),
    Other,
}

fn parse_server_message(text: &str) -> ServerMessage {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
        return ServerMessage::Other;
    };
    match value.get("type").and_then(|t| t.as_str()) {
        Some("auth_required") => ServerMessage::AuthRequired,
        Some("auth_ok") => ServerMessage::AuthOk,
        Some("auth_invalid") => ServerMessage::AuthInvalid(
            value
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("invalid access token")
                .to_string(),
        ),
        Some("result") => ServerMessage::Result {
            success: value.get("success").and_then(|s| s.as_bool()).unwrap_or(false),
        },
        Some("event") => parse_state_changed(&value)
            .map(ServerMessage::StateChanged)
            .unwrap_or(ServerMessage::Other),
        _ => ServerMessage::Other,
    }
}

fn parse_state_changed(value: &serde_json::Value) -> Option<StateChangeEvent> {
    let event = value.get("event")?;
    if event.get("event_type").and_then(|t| t.as_str()) != Some("state_changed") {
        return None;
    }
    let data = event.get("data")?;
    let entity_id = data.get("entity_id")?.as_str()?.to_string();
    let new_state = data.get("new_state").filter(|s| !s.is_null());
    let raw = new_state
        .and_then(|s| s.get("state"))
        .and_then(|s| s.as_str())
        .map(str::to_string);
    let timestamp = new_state
        .and_then(|s| s.get("last_changed"))
        .or_else(|| event.get("time_fired"))
        .and_then(|t| t.as_str())
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    Some(StateChangeEvent {
        entity_id,
        new_state: raw,
        timestamp,
    })
}

/// Forward tracked `state_changed` events until the connection closes, the
/// receiver is dropped or `cancel` fires.
async fn forward_events<S>(
    mut ws_rx: S,
    entity_ids: HashSet<String>,
    tx: mpsc::Sender<StateChangeEvent>,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tx.closed() => break,
            message = ws_rx.next() => message,
        };
        let text = match message {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::warn!("Websocket error: {}", e);
                break;
            }
        };
        if let ServerMessage::StateChanged(event) = parse_server_message(&text) {
            if !entity_ids.contains(&event.entity_id) {
                continue;
            }
            if tx.send(event).await.is_err() {
                break;
            }
        }
    }
    tracing::debug!("Websocket reader stopped");
}

#[async_trait]
impl LiveEventSource for HomeAssistantEvents {
    async fn subscribe(
        &self,
        cancel: CancellationToken,
    ) -> crate::Result<mpsc::Receiver<StateChangeEvent>> {
        let (ws, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| crate::ReplayError::Subscription(format!("Connecting to {}: {}", self.url, e)))?;
        let (mut ws_tx, mut ws_rx) = ws.split();

        let auth = serde_json::json!({ "type": "auth", "access_token": self.access_token });
        let subscribe = serde_json::json!({
            "id": 1,
            "type": "subscribe_events",
            "event_type": "state_changed"
        });

        // auth_required -> auth -> auth_ok -> subscribe_events -> result
        loop {
            let text = match ws_rx.next().await {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(crate::ReplayError::Subscription(format!("Handshake: {}", e))),
                None => return Err(crate::ReplayError::Subscription("Connection closed during handshake".to_string())),
            };
            match parse_server_message(&text) {
                ServerMessage::AuthRequired => {
                    ws_tx
                        .send(Message::Text(auth.to_string()))
                        .await
                        .map_err(|e| crate::ReplayError::Subscription(format!("Sending auth: {}", e)))?;
                }
                ServerMessage::AuthOk => {
                    ws_tx
                        .send(Message::Text(subscribe.to_string()))
                        .await
                        .map_err(|e| crate::ReplayError::Subscription(format!("Sending subscribe: {}", e)))?;
                }
                ServerMessage::AuthInvalid(message) => {
                    return Err(crate::ReplayError::Subscription(format!("Authentication rejected: {}", message)));
                }
                ServerMessage::Result { success: true } => break,
                ServerMessage::Result { success: false } => {
                    return Err(crate::ReplayError::Subscription("Subscription rejected".to_string()));
                }
                ServerMessage::StateChanged(_) | ServerMessage::Other => {}
            }
        }

        tracing::debug!("Subscribed to state_changed events at {}", self.url);

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let entity_ids = self.entity_ids.clone();
        tokio::spawn(async move {
            // Write half lives as long as the reader
            let _write_half = ws_tx;
            forward_events(ws_rx, entity_ids, tx, cancel).await;
        });

        Ok(rx)
    }
}
