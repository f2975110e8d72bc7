//! Offline-aware networking with retries, priority queueing, and
//! connectivity tracking.
//!
//! The crate is organized around a handful of cooperating pieces:
//!
//! - [`monitor::NetworkMonitor`] holds the current [`types::NetworkStatus`]
//!   and notifies subscribers when it changes
//! - [`retry`] executes operations with backoff, retry predicates, and
//!   attempt telemetry
//! - [`queue::RequestQueue`] holds requests deferred while offline, ordered
//!   by [`types::Priority`]
//! - [`processor::QueueProcessor`] drains the queue when connectivity
//!   returns, on a timer, or on demand
//! - [`client::NetworkClient`] is the front door: submit a request and it
//!   either runs immediately with retries or waits in the queue
//!
//! All network I/O goes through the [`transport::Transport`] trait;
//! [`transport::HttpTransport`] is the production implementation and
//! [`transport::MockTransport`] the scripted one for tests.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use aula_net::{HttpTransport, NetRequest, NetworkClient};
//!
//! # async fn example() -> aula_net::Result<()> {
//! let transport = Arc::new(HttpTransport::new()?);
//! let client = NetworkClient::builder(transport).build()?;
//!
//! let response = client
//!     .execute(NetRequest::get("https://api.aula.example/messages"))
//!     .await?;
//! println!("{}", response.text()?);
//! # Ok(())
//! # }
//! ```

pub mod broadcast;
pub mod client;
pub mod config;
pub mod error;
pub mod monitor;
pub mod processor;
pub mod queue;
pub mod retry;
pub mod transport;
pub mod types;

pub use client::{NetworkClient, NetworkClientBuilder, SubmitOptions, Submission};
pub use config::NetConfig;
pub use error::{NetError, Result};
pub use monitor::{ConnectionInfo, NetworkMonitor, NetworkObserver};
pub use processor::{DrainStats, QueueProcessor};
pub use queue::{QueueStats, QueuedRequest, RequestQueue};
pub use transport::{HttpTransport, Method, MockTransport, NetRequest, NetResponse, Transport};
pub use types::{
    ConnectionQuality, EffectiveType, NetworkStatus, Priority, RetryPolicy, RetryPresets,
    RetryStrategy,
};
