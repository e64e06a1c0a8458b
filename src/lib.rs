//! Floodgate - a resilient, rate-limited HTTP access layer.
//!
//! Sits beneath HTTP API clients and keeps them inside upstream rate limits
//! while absorbing transient failures.
//!
//! # Architecture
//!
//! - **`application::limiter`** - Multi-window token bucket limiter
//!   - Every window must admit a request; debits are all-or-nothing
//!   - HTTP 429 replies raise a penalty multiplier that slows refills and
//!     decays after a quiet period
//!   - A heartbeat logs token levels without touching them
//!
//! - **`application::transport`** - Resilient transport
//!   - One session per worker, recycled after a number of uses
//!   - Bounded retries with exponential backoff and jitter
//!   - A single deadline covers limiter waits, attempts and backoff
//!
//! - **`application::perf`** - Performance tracker
//!   - Latency percentiles and outcome counts per endpoint
//!   - Periodic summaries to the log and an optional JSONL report
//!
//! # Modules
//!
//! - [`adapter`] - `reqwest` dispatcher
//! - [`application`] - Limiter, transport and performance tracker
//! - [`domain`] - Token windows, penalty state, requests and samples
//! - [`error`] - Error types for the crate
//! - [`infrastructure`] - Configuration, clock, scheduler and wiring
//! - [`port`] - Trait seams: clock, dispatcher, outcome recorder
//!
//! # Example
//!
//! ```no_run
//! use floodgate::domain::Request;
//! use floodgate::infrastructure::bootstrap::Gateway;
//! use floodgate::infrastructure::config::Config;
//!
//! # async fn example() -> floodgate::error::Result<()> {
//! let config = Config::from_env()?;
//! config.init_logging();
//!
//! let mut gateway = Gateway::build(&config)?;
//! gateway.start();
//!
//! let request = Request::get("https://gamma-api.polymarket.com/markets")?
//!     .with_query(&[("limit", "100")])
//!     .with_bucket("gamma_markets");
//! let response = gateway.transport().execute(request).await?;
//! let markets: serde_json::Value = response.json()?;
//! println!("{markets}");
//!
//! gateway.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod port;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
