//! Line classification and outbound command formatting.
//!
//! The remote master speaks a line-oriented text protocol. Inbound lines are
//! classified into a closed [`Message`] enum by [`classify`], a pure function
//! of a single line — the decoder keeps no state between calls. Malformed
//! data lines classify as [`Message::Unparseable`] so the caller can log and
//! discard them without interrupting the stream.
//!
//! Outbound commands (`@HELLO`, `@PARAM`, `@GET`) are formatted by the
//! `*_command` functions, which clamp their arguments to the ranges the
//! firmware accepts.

use std::collections::BTreeMap;

/// One worker's report for one round, parsed from an `O,` data line.
///
/// Immutable once parsed. `loss` is the worker-local objective estimate; it
/// is reserved advisory telemetry, carried but never scored against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Remote-clock round identifier.
    pub tick: u64,
    /// Index of the reporting worker.
    pub worker_index: usize,
    /// Integer encoding of the worker's bit chunk, least significant bit
    /// first; only the low `bits_per_worker` bits are payload.
    pub bitmask: u64,
    /// Worker-local objective estimate (advisory only).
    pub loss: i64,
    /// Noise level the worker sampled under.
    pub noise: f64,
    /// Worker RNG seed.
    pub seed: u64,
}

/// Classification of one inbound line.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// `@BATCH` metadata header: whitespace-separated `KEY=VALUE` tokens.
    Meta(BTreeMap<String, String>),
    /// `@DONE` end-of-batch marker; the rest of the line is diagnostic text.
    Done,
    /// A well-formed `O,` data line.
    Data(Sample),
    /// Any other non-empty line, passed through for display only.
    Info(String),
    /// A data line with the wrong field count or a non-numeric field.
    Unparseable,
    /// A blank line, discarded silently.
    Empty,
}

const META_MARKER: &str = "@BATCH";
const DONE_MARKER: &str = "@DONE";
const DATA_MARKER: &str = "O,";

/// Classify one line of input. Pure: no decoder state is retained between
/// calls.
pub fn classify(line: &str) -> Message {
    let line = line.trim();
    if line.is_empty() {
        return Message::Empty;
    }
    if line.starts_with(META_MARKER) {
        return Message::Meta(parse_meta_fields(&line[META_MARKER.len()..]));
    }
    if line.starts_with(DONE_MARKER) {
        return Message::Done;
    }
    if line.starts_with(DATA_MARKER) {
        return match parse_data_fields(&line[DATA_MARKER.len()..]) {
            Some(sample) => Message::Data(sample),
            None => Message::Unparseable,
        };
    }
    Message::Info(line.to_owned())
}

/// Tokens without `=` are ignored; duplicate keys keep the last occurrence.
fn parse_meta_fields(payload: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    for token in payload.split_whitespace() {
        if let Some((key, value)) = token.split_once('=') {
            fields.insert(key.to_owned(), value.to_owned());
        }
    }
    fields
}

/// Exactly six comma-separated fields: tick, worker index, bitmask, loss,
/// noise, seed. Anything else is unparseable.
fn parse_data_fields(payload: &str) -> Option<Sample> {
    let parts: Vec<&str> = payload.split(',').collect();
    if parts.len() != 6 {
        return None;
    }
    Some(Sample {
        tick: parts[0].trim().parse().ok()?,
        worker_index: parts[1].trim().parse().ok()?,
        bitmask: parts[2].trim().parse().ok()?,
        loss: parts[3].trim().parse().ok()?,
        noise: parts[4].trim().parse().ok()?,
        seed: parts[5].trim().parse().ok()?,
    })
}

/// The `@HELLO` handshake opener.
pub fn hello_command() -> String {
    "@HELLO".to_owned()
}

/// Format the `@PARAM` broadcast: noise N in `[0, 1]` (two decimals), bias B
/// in `[-127, 127]`, coupling K in `[0, 255]`, mode M in `[0, 255]`.
/// Out-of-range arguments are clamped.
pub fn param_command(noise: f64, bias: i32, coupling: u32, mode: u32) -> String {
    format!(
        "@PARAM N={:.2} B={} K={} M={}",
        noise.clamp(0.0, 1.0),
        bias.clamp(-127, 127),
        coupling.min(255),
        mode.min(255),
    )
}

/// Format the `@GET` batch request: K emitted samples in `[1, 2000]`, stride
/// in `[1, 1000]`, burn-in rounds in `[0, 5000]`. Out-of-range arguments are
/// clamped.
pub fn batch_command(count: u32, stride: u32, burn_in: u32) -> String {
    format!(
        "@GET K={} STRIDE={} BURN={}",
        count.clamp(1, 2000),
        stride.clamp(1, 1000),
        burn_in.min(5000),
    )
}
