//! Client configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};
use crate::transport::MalformedFramePolicy;

/// Backend endpoint used when no URL is given.
pub const DEFAULT_URL: &str = "ws://localhost:20808/ws";

/// Configuration for a client talking to the backend over WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// WebSocket endpoint of the backend
    #[serde(default = "default_url")]
    pub url: String,
    /// Start dispatching events as soon as the client is built
    #[serde(default = "default_true")]
    pub start_event_loop: bool,
    /// Only consulted by stream transports; kept here so one config file can
    /// describe either kind of client.
    #[serde(default)]
    pub malformed_frames: MalformedFramePolicy,
}

fn default_url() -> String {
    DEFAULT_URL.to_string()
}
fn default_true() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            start_event_loop: true,
            malformed_frames: MalformedFramePolicy::default(),
        }
    }
}

impl From<&str> for ClientConfig {
    fn from(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Self::default()
        }
    }
}

impl From<String> for ClientConfig {
    fn from(url: String) -> Self {
        Self {
            url,
            ..Self::default()
        }
    }
}

impl ClientConfig {
    pub fn from_toml_str(source: &str) -> ClientResult<Self> {
        toml::from_str(source).map_err(|e| ClientError::Config(e.to_string()))
    }

    /// Read a TOML config file. Missing keys take their defaults.
    pub async fn load(path: impl AsRef<Path>) -> ClientResult<Self> {
        let path = path.as_ref();
        let source = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ClientError::Config(format!("{}: {}", path.display(), e)))?;
        toml::from_str(&source)
            .map_err(|e| ClientError::Config(format!("{}: {}", path.display(), e)))
    }
}

/// Configuration for a client talking to the backend over a byte stream pair.
///
/// There are no defaults: the caller always owns both ends.
pub struct StreamConfig<R, W> {
    /// Backend input; requests are written here.
    pub input: W,
    /// Backend output; frames are read from here.
    pub output: R,
    pub start_event_loop: bool,
    pub malformed_frames: MalformedFramePolicy,
}

impl<R, W> StreamConfig<R, W> {
    pub fn new(input: W, output: R, start_event_loop: bool) -> Self {
        Self {
            input,
            output,
            start_event_loop,
            malformed_frames: MalformedFramePolicy::default(),
        }
    }

    pub fn with_malformed_frames(mut self, policy: MalformedFramePolicy) -> Self {
        self.malformed_frames = policy;
        self
    }
}
