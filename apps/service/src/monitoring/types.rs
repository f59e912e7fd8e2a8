use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp format used in rendered status messages
const SEEN_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Identity of a monitored game server
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointKey {
    pub host: String,
    pub port: u16,
}

impl EndpointKey {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Payload of a successful status query
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusInfo {
    /// Server name as advertised by the server
    pub name: String,

    /// Current map
    pub map: String,

    /// Short game identifier (mod folder, e.g. `cstrike`)
    pub game: String,

    /// Players currently connected
    pub player_count: u32,

    /// Advertised player slots
    pub max_players: u32,
}

/// Last known status of one endpoint
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EndpointStatus {
    /// When the most recent check started
    pub last_check: Option<DateTime<Utc>>,

    /// When the server last answered a query
    pub last_seen: Option<DateTime<Utc>>,

    /// Outcome of the most recent completed check
    pub alive: bool,

    /// Rendered status text, absent until the first check completes
    pub message: Option<String>,

    /// Payload of the last successful query
    pub last_info: Option<StatusInfo>,
}

/// What a completed check did to an endpoint's status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    /// The rendered message differs from the one stored before the check
    pub changed: bool,

    /// A rendered message existed before this check
    pub had_previous: bool,

    pub alive: bool,

    /// The message now stored on the endpoint
    pub message: String,
}

impl EndpointStatus {
    pub fn record_attempt(&mut self, at: DateTime<Utc>) {
        self.last_check = Some(at);
    }

    /// Fold a finished query into the status and report whether the rendered text changed.
    ///
    /// A failure keeps `last_seen` untouched so the failure message points at the
    /// previous success.
    pub fn apply(
        &mut self,
        key: &EndpointKey,
        info: Option<StatusInfo>,
        at: DateTime<Utc>,
    ) -> CheckOutcome {
        let message = match info {
            Some(info) => {
                self.alive = true;
                self.last_seen = Some(at);
                let message = render_success(key, &info);
                self.last_info = Some(info);
                message
            }
            None => {
                self.alive = false;
                render_failure(key, self.last_seen)
            }
        };

        let previous = self.message.replace(message.clone());

        CheckOutcome {
            changed: previous.as_deref() != Some(message.as_str()),
            had_previous: previous.is_some(),
            alive: self.alive,
            message,
        }
    }
}

pub fn render_success(key: &EndpointKey, info: &StatusInfo) -> String {
    format!(
        "Server {} [{} on '{}'] has {} players",
        key.host, info.game, info.map, info.player_count
    )
}

pub fn render_failure(key: &EndpointKey, last_seen: Option<DateTime<Utc>>) -> String {
    let seen = last_seen
        .map(|at| at.format(SEEN_FORMAT).to_string())
        .unwrap_or_else(|| "never".to_string());

    format!("Server {key} check failed. Last time seen {seen}")
}
