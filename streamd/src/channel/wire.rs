//! Wire messages exchanged over the streaming WebSocket
//!
//! Client payloads are JSON objects discriminated by a `type` field. Unknown
//! or malformed payloads get an `error` reply and the connection stays open;
//! clients are expected to ignore server message types they do not know.

use serde::{Deserialize, Serialize};

/// Messages sent by an observer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Register interest in one deployment's log stream
    Subscribe {
        #[serde(rename = "deploymentId")]
        deployment_id: String,
    },

    /// Drop interest in one deployment's log stream
    Unsubscribe {
        #[serde(rename = "deploymentId")]
        deployment_id: String,
    },

    /// Application-level keepalive
    Ping,
}

/// Messages pushed to an observer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// One build log line
    Log {
        #[serde(rename = "deploymentId")]
        deployment_id: String,
        message: String,
    },

    /// Marker that older buffered lines were dropped for this connection
    Truncated,

    /// Per-message protocol error; the connection stays open
    Error { message: String },

    /// Reply to a client ping
    Pong,
}
