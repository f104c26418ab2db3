#![warn(clippy::pedantic, clippy::nursery, clippy::cargo, clippy::perf)]

//! # `influx_line_client`
//!
//! A non-blocking client for the InfluxDB line-protocol write endpoint.
//!
//! Measurements are encoded to line protocol and posted to `/write?db=<database>`.
//! Each send is one independent HTTP request dispatched on a Tokio runtime; its
//! outcome is delivered exactly once, either to a callback or through a future.
//!
//! ```rust,no_run
//! use influx_line_client::{ClientOptions, InfluxClient, Measurement};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), influx_line_client::InfluxError> {
//!     let client = InfluxClient::create(ClientOptions::default())?.use_database("telemetry");
//!     let cpu = Measurement::new("cpu").tag("host", "a").field("usage", 12.5);
//!
//!     client.send(&cpu, |result| {
//!         if let Err(e) = result {
//!             eprintln!("write failed: {e}");
//!         }
//!     })?;
//!
//!     client.write(&[cpu])?.await
//! }
//! ```
//!
//! An [`InfluxRecorder`] can also be installed as the `metrics` recorder so that
//! counters, gauges and histograms are written as measurements.

mod client;
mod error;
pub mod line_protocol;
mod measurement;
mod recorder;

pub use client::{ClientOptions, DEFAULT_HOST, DEFAULT_PORT, InfluxClient, Precision};
pub use error::{InfluxError, WriteResult};
pub use measurement::{FieldValue, Measurement};
pub use recorder::{InfluxRecorder, InfluxRecorderBuilder};
