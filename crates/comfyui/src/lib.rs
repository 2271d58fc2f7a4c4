//! ComfyUI REST and push-channel client library.
//!
//! Submits job specifications to a ComfyUI server, detects completion
//! by polling history (or via the WebSocket push channel), downloads the
//! produced images, and ties these steps together in [`Generator`].

pub mod api;
pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod generator;
pub mod history;
pub mod messages;
pub mod poller;
pub mod retry;
pub mod watch;

pub use api::{ComfyUIApi, ComfyUIApiError};
pub use backend::RenderBackend;
pub use config::{CompletionStrategy, ComfyUIConfig, ConfigError};
pub use error::GenerationError;
pub use generator::{GeneratedImages, Generator};
pub use history::{History, HistoryEntry, ImageRef, NodeOutput};
pub use poller::PollConfig;
pub use retry::RetryConfig;
