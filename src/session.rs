//! Session orchestration: handshake, streaming loop, termination.
//!
//! [`SamplingSession`] drives the whole pipeline over a single logical stream
//! of control: one sequential reader loop consumes the transport, so round
//! state, history and the best result have exactly one mutator and need no
//! locking.
//!
//! The session is an explicit state machine:
//!
//! ```text
//! Idle → Connecting → Handshaking → Streaming → Draining → Closed
//!                \___________\___________\______→ Failed
//! ```
//!
//! `Failed` is reachable from any non-terminal state on an unrecoverable
//! transport error; it releases the transport and surfaces the cause in the
//! report outcome rather than crashing the process.
//!
//! The handshake is fire-and-forget: `@HELLO`, `@PARAM` and `@GET` are sent
//! with a short fixed pause between them and no acknowledgement is awaited —
//! the remote protocol provides none, and command loss is not detectable from
//! this side of the link.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use tracing::{debug, info, instrument, trace, warn};

use crate::assembler::TickAssembler;
use crate::configuration::SessionConfig;
use crate::line_source::{Connector, LineSource, ReadEvent};
use crate::logger::init_logger;
use crate::objective::{max_cut_score, ring_edges, validate_edges, Edge};
use crate::protocol::{batch_command, classify, hello_command, param_command, Message};
use crate::report::{ScoredSample, SessionOutcome, SessionReport};

/// The orchestration states of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, not yet started.
    Idle,
    /// Opening the transport.
    Connecting,
    /// Sending the fire-and-forget command sequence.
    Handshaking,
    /// Consuming the telemetry stream.
    Streaming,
    /// Terminating normally; transport being released.
    Draining,
    /// Finished; outputs are frozen.
    Closed,
    /// Terminated by an unrecoverable transport error.
    Failed,
}

/// Cooperative cancellation signal for a running session.
///
/// Cloneable and shareable across threads; a request is honored between
/// transport reads, within one read-timeout-bounded iteration, and never
/// interrupts an in-flight score or best-result update.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Create a fresh, un-cancelled handle.
    pub fn new() -> CancelHandle {
        CancelHandle::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// True once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Coordinates one sampling run against the remote master.
///
/// Owns the configuration, the problem instance and the best-so-far state;
/// see the module documentation for the state machine.
#[derive(Debug)]
pub struct SamplingSession {
    config: SessionConfig,
    edges: Vec<Edge>,
    state: SessionState,
    cancel: CancelHandle,
}

impl SamplingSession {
    /// Create a session scoring against an arbitrary weighted edge list.
    ///
    /// # Errors
    /// When an edge is a self-loop or references a bit outside
    /// `[0, total_bits)`, or when log-file initialization fails with
    /// `config.log` set.
    pub fn new(config: SessionConfig, edges: Vec<Edge>) -> anyhow::Result<SamplingSession> {
        if config.log {
            init_logger()?;
        }
        validate_edges(&edges, config.total_bits())?;
        Ok(SamplingSession {
            config,
            edges,
            state: SessionState::Idle,
            cancel: CancelHandle::new(),
        })
    }

    /// Create a session scoring against the unit-weight ring over all
    /// assembled bits (the reference instance).
    pub fn ring(config: SessionConfig) -> anyhow::Result<SamplingSession> {
        let edges = ring_edges(config.total_bits(), 1.0);
        SamplingSession::new(config, edges)
    }

    /// A handle for cancelling this session from another thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Current state of the session.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the session to completion: open the transport, hand off the
    /// configuration, consume the stream, and return the frozen report.
    ///
    /// Always returns a report; transport failures are recorded as
    /// [`SessionOutcome::TransportFailed`] with partial history preserved.
    #[instrument(skip_all)]
    pub fn run<C: Connector>(&mut self, connector: &C) -> SessionReport {
        let started = Instant::now();

        self.state = SessionState::Connecting;
        let mut source = match connector.connect() {
            Ok(source) => source,
            Err(e) => {
                warn!("transport open failed: {e:#}");
                self.state = SessionState::Failed;
                return self.report(Collected::default(), SessionOutcome::TransportFailed(format!("{e:#}")), started);
            }
        };

        self.state = SessionState::Handshaking;
        if let Err(e) = self.handshake(&mut source) {
            warn!("handshake send failed: {e:#}");
            source.close();
            self.state = SessionState::Failed;
            return self.report(Collected::default(), SessionOutcome::TransportFailed(format!("{e:#}")), started);
        }

        self.state = SessionState::Streaming;
        info!("listening for telemetry");
        let (collected, outcome) = self.stream(&mut source);

        self.state = SessionState::Draining;
        source.close();
        self.state = match outcome {
            SessionOutcome::TransportFailed(_) => SessionState::Failed,
            _ => SessionState::Closed,
        };

        let report = self.report(collected, outcome, started);
        info!("{}", report.summary());
        report
    }

    /// Fire-and-forget configuration handoff. The fixed pause between sends
    /// respects remote input buffering; the protocol has no acknowledgement
    /// to wait for.
    fn handshake<S: LineSource>(&self, source: &mut S) -> anyhow::Result<()> {
        let c = &self.config;
        debug!(
            num_workers = c.num_workers,
            bits_per_worker = c.bits_per_worker,
            "starting handshake"
        );
        source.send_line(&hello_command())?;
        thread::sleep(c.handshake_delay);
        source.send_line(&param_command(c.noise, c.bias, c.coupling, c.mode))?;
        thread::sleep(c.handshake_delay);
        source.send_line(&batch_command(c.batch_count, c.batch_stride, c.batch_burn_in))?;
        Ok(())
    }

    fn stream<S: LineSource>(&self, source: &mut S) -> (Collected, SessionOutcome) {
        let mut collected = Collected::default();
        let mut assembler = TickAssembler::new(
            self.config.num_workers,
            self.config.bits_per_worker,
            self.config.eviction_cap,
            self.config.eviction_floor,
        );
        // inactivity is silence since the last received line, not total runtime
        let mut last_rx = Instant::now();

        let outcome = loop {
            if self.cancel.is_cancelled() {
                info!("cancellation requested, draining");
                break SessionOutcome::Cancelled;
            }

            let event = match source.next_line(self.config.read_timeout) {
                Ok(event) => event,
                Err(e) => {
                    warn!("transport read failed: {e:#}");
                    break SessionOutcome::TransportFailed(format!("{e:#}"));
                }
            };

            match event {
                ReadEvent::TimedOut => {
                    if last_rx.elapsed() > self.config.inactivity_timeout {
                        warn!(
                            budget_secs = self.config.inactivity_timeout.as_secs_f64(),
                            "no data within the inactivity budget, draining"
                        );
                        break SessionOutcome::InactivityTimeout;
                    }
                }
                ReadEvent::Closed => {
                    warn!("transport closed before @DONE");
                    break SessionOutcome::TransportFailed(
                        "transport closed before end of batch".to_owned(),
                    );
                }
                ReadEvent::Line(line) => match classify(&line) {
                    Message::Empty => {}
                    Message::Meta(fields) => {
                        last_rx = Instant::now();
                        info!(?fields, "batch metadata");
                        collected.batch_meta = fields;
                    }
                    Message::Done => {
                        last_rx = Instant::now();
                        info!("end of batch signalled");
                        break SessionOutcome::Done;
                    }
                    Message::Info(text) => {
                        last_rx = Instant::now();
                        debug!(target: "remote", "{text}");
                    }
                    Message::Unparseable => {
                        last_rx = Instant::now();
                        warn!(%line, "discarding unparseable line");
                        collected.discarded_lines += 1;
                    }
                    Message::Data(sample) => {
                        last_rx = Instant::now();
                        trace!(tick = sample.tick, worker = sample.worker_index, "data line");
                        if let Some(round) = assembler.ingest(sample) {
                            self.record(round.tick, round.bits, &mut collected);
                        }
                    }
                },
            }
        };

        collected.evicted_rounds = assembler.evicted_rounds();
        collected.rejected_samples = assembler.rejected_samples();
        (collected, outcome)
    }

    /// Score a completed round, append it to the history, and advance the
    /// best-so-far state. Strict `>`: on equal scores the earliest arrival
    /// stays the best.
    fn record(&self, tick: u64, bits: Vec<u8>, collected: &mut Collected) {
        let score = max_cut_score(&bits, &self.edges);
        let scored = ScoredSample { tick, score, bits };

        let improved = collected.best.as_ref().map_or(true, |b| score > b.score);
        if improved {
            info!(tick, score, bits = %scored.bit_string(), "new best sample");
            collected.best = Some(scored.clone());
        }
        collected.best_trace.push((
            tick,
            collected.best.as_ref().map_or(score, |b| b.score),
        ));
        collected.history.push(scored);

        if collected.history.len() % 50 == 0 {
            info!(
                scored = collected.history.len(),
                requested = self.config.batch_count,
                "progress"
            );
        }
    }

    fn report(
        &self,
        collected: Collected,
        outcome: SessionOutcome,
        started: Instant,
    ) -> SessionReport {
        SessionReport {
            batch_meta: collected.batch_meta,
            history: collected.history,
            best: collected.best,
            best_trace: collected.best_trace,
            evicted_rounds: collected.evicted_rounds,
            rejected_samples: collected.rejected_samples,
            discarded_lines: collected.discarded_lines,
            outcome,
            total_bits: self.config.total_bits(),
            elapsed: started.elapsed(),
        }
    }
}

/// Mutable state accumulated by the streaming loop.
#[derive(Debug, Default)]
struct Collected {
    batch_meta: std::collections::BTreeMap<String, String>,
    history: Vec<ScoredSample>,
    best: Option<ScoredSample>,
    best_trace: Vec<(u64, f64)>,
    evicted_rounds: u64,
    rejected_samples: u64,
    discarded_lines: u64,
}
