use thiserror::Error;

/// Failure of a single upstream fetch.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {endpoint} timed out")]
    Timeout { endpoint: String },

    #[error("{endpoint} returned HTTP {status}")]
    Status {
        endpoint: String,
        status: reqwest::StatusCode,
    },

    #[error("malformed scoreboard from {endpoint}: {source}")]
    Malformed {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

impl UpstreamError {
    /// Map a transport error, keeping timeouts distinguishable in logs.
    pub fn from_reqwest(endpoint: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            UpstreamError::Timeout {
                endpoint: endpoint.to_string(),
            }
        } else {
            UpstreamError::Request {
                endpoint: endpoint.to_string(),
                source,
            }
        }
    }
}

/// Failure to hand a message to a client's push channel.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("channel for session {0} is closed")]
    ChannelClosed(String),

    #[error("outbound queue for session {0} is full, message dropped")]
    Lagging(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session {0} is already connected")]
    AlreadyConnected(String),
}
