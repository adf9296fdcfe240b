use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Game state as reported in an upstream event's `status.type.state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    NotStarted,
    InProgress,
    Finished,
    /// Missing or unrecognised state; never treated as live.
    Unknown,
}

impl GameState {
    pub fn from_upstream(s: &str) -> Self {
        match s {
            "pre" => GameState::NotStarted,
            "in" => GameState::InProgress,
            "post" => GameState::Finished,
            _ => GameState::Unknown,
        }
    }
}

/// One upstream event. The JSON object is passed to clients unmodified;
/// only the status is ever inspected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreEvent(pub Value);

impl ScoreEvent {
    pub fn state(&self) -> GameState {
        self.0
            .pointer("/status/type/state")
            .and_then(Value::as_str)
            .map(GameState::from_upstream)
            .unwrap_or(GameState::Unknown)
    }

    pub fn is_live(&self) -> bool {
        self.state() == GameState::InProgress
    }
}

/// Body of a scoreboard response. A body without `events` is malformed.
#[derive(Debug, Deserialize)]
pub struct Scoreboard {
    pub events: Vec<ScoreEvent>,
}

/// Static per-sport polling descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct SportConfig {
    /// Key used in page routes and logs, e.g. "soccer"
    pub tag: String,
    /// Full upstream URLs; multi-league sports have several
    pub endpoints: Vec<String>,
    pub interval: Duration,
    /// Push-channel event name, e.g. "soccerScores"
    pub event_name: String,
}

impl SportConfig {
    pub fn new(tag: &str, endpoints: Vec<String>, interval: Duration) -> Self {
        SportConfig {
            tag: tag.to_string(),
            endpoints,
            interval,
            event_name: format!("{}Scores", tag),
        }
    }
}
