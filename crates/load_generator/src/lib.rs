//! Bounded-concurrency load generation.
//!
//! A [`LoadGenerator`] drives a user supplied [`Caller`] at a target rate (loads per second),
//! caps the number of in-flight calls with a ticket pool, and streams every call's
//! [`CallResult`] into a statistics aggregator.
//!
//! # Pipeline
//!
//! ```text
//! start() -> dispatcher tick -> ticket -> executor -> Caller::build_req / call
//!         -> CallResult -> result pipeline (bounded, drop on full) -> aggregator
//! ```
//!
//! Shutdown (deadline expiry or [`LoadGenerator::stop`]) stops the dispatcher, closes the
//! ticket pool, waits for every in-flight call, and only then closes the result pipeline.
//! A result is therefore never submitted to a closed pipeline.
//!
//! # Sizing
//!
//! The ticket pool holds `ceil(timeout * lps)` tickets: the number of calls that are
//! dispatched during one expected call latency. See [`GeneratorSettings::concurrency`].
//!
//! # Basic Usage
//! ```no_run
//! use std::time::Duration;
//!
//! use bytes::Bytes;
//! use load_generator::{BoxError, Caller, GeneratorSettings, LoadGenerator, Request, Response};
//!
//! struct Echo;
//!
//! #[async_trait::async_trait]
//! impl Caller for Echo {
//!     fn build_req(&self) -> Request {
//!         Request::new(1, Bytes::from_static(b"ping"))
//!     }
//!
//!     async fn call(&self, payload: Bytes) -> Result<Bytes, BoxError> {
//!         Ok(payload)
//!     }
//!
//!     fn check_resp(&self, request: &Request, response: &Response) -> bool {
//!         response.payload() == Some(request.payload())
//!     }
//! }
//!
//! # async fn run() -> Result<(), load_generator::Error> {
//! let settings = GeneratorSettings::builder()
//!     .timeout(Duration::from_millis(50))
//!     .lps(100)
//!     .duration(Duration::from_secs(5))
//!     .build();
//! let generator = LoadGenerator::new(Echo, settings)?;
//! generator.start();
//! let stats = generator.wait().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Metrics
//! Emits metrics through the `metrics` facade; see [`internal_event`].
pub mod caller;
pub mod error;
pub mod generator;
pub mod internal_event;
pub mod pipeline;
pub mod stats;
pub mod tickets;

mod millis;
#[cfg(test)]
pub(crate) mod test_utils;

#[macro_use]
extern crate tracing;

pub use caller::{CallResult, Caller, Request, Response, RetCode, ServiceCaller};
pub use error::{BoxError, CallError, Error, Result};
pub use generator::{ExitHook, GeneratorSettings, LoadGenerator, MAX_LPS, Status};
pub use stats::{LatencySummary, StatsSnapshot};
pub use tickets::{Ticket, TicketPool};
