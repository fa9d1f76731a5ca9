//! # Hybrid Sampler
//!
//! PC-side client for a distributed stochastic Max-Cut sampler: a master
//! device coordinates several worker units that each emit a fixed-width bit
//! chunk per round ("tick") over a line-oriented link. This crate sends the
//! control commands, reassembles the interleaved per-worker telemetry into
//! complete rounds, scores each assembled bit vector against a weighted edge
//! set, and tracks the best solution seen.
//!
//! It provides:
//! - Stream reassembly with a bounded-memory eviction policy
//!   ([`assembler::TickAssembler`])
//! - Online Max-Cut scoring over arbitrary weighted edge lists
//!   ([`objective`])
//! - An orchestration state machine with handshake, inactivity timeout and
//!   cooperative cancellation ([`session::SamplingSession`])
//! - Pluggable transports behind the [`line_source::LineSource`] trait and
//!   report delivery behind [`report::ReportSink`]
//!
//! The session is single-threaded by design: one sequential reader loop
//! consumes the transport, so round state and the best result have exactly
//! one mutator. Lost lines are tolerated, not recovered — stale incomplete
//! rounds are evicted oldest-first once a configured cap is exceeded.
//!
//! # Usage Example
//!
//! ```no_run
//! use std::time::Duration;
//! use hybrid_sampler::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = SessionConfigBuilder::new()
//!         .with_workers(4, 4)
//!         .with_noise(0.2)
//!         .with_batch(300, 1, 20)
//!         .with_inactivity_timeout(Duration::from_secs(25))
//!         .build()?;
//!
//!     // Unit-weight ring over all 16 assembled bits: the reference instance
//!     let mut session = SamplingSession::ring(config)?;
//!
//!     // A serial-to-TCP bridge presents the serial link as a byte stream
//!     let connector = TcpConnector::new("192.168.4.1:3333", Duration::from_secs(5));
//!     let report = session.run(&connector);
//!
//!     println!("{}", report.summary());
//!     CsvReportSink::new(".").deliver(&report)?;
//!     Ok(())
//! }
//! ```
//!
//! # Protocol
//!
//! Outbound, one newline-terminated command per line: `@HELLO`, then
//! `@PARAM N=<noise> B=<bias> K=<coupling> M=<mode>`, then
//! `@GET K=<count> STRIDE=<stride> BURN=<burn-in>` (fire-and-forget, no
//! acknowledgement). Inbound: `@BATCH KEY=VALUE ...` metadata, `O,` data
//! lines with six comma-separated fields, `@DONE` at end of batch, and
//! arbitrary diagnostic text which is passed through without parsing. See
//! [`protocol`] for the exact grammar.
#![warn(missing_docs)]

pub use anyhow;

pub mod assembler;
pub mod configuration;
pub mod line_source;
mod logger;
pub mod objective;
pub mod protocol;
pub mod report;
pub mod session;

/// Commonly used types and traits for quick access.
///
/// Import this prelude to get started easily:
/// ```rust
/// use hybrid_sampler::prelude::*;
/// ```
pub mod prelude {
    pub use crate::configuration::{SessionConfig, SessionConfigBuilder};
    pub use crate::line_source::{Connector, LineSource, TcpConnector};
    pub use crate::objective::{ring_edges, Edge};
    pub use crate::report::{CsvReportSink, ReportSink, SessionOutcome, SessionReport};
    pub use crate::session::{CancelHandle, SamplingSession, SessionState};
}
