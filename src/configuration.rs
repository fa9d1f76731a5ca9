//! Immutable per-session configuration.
//!
//! A [`SessionConfig`] is built once, validated, and handed to the session at
//! construction — there is no process-wide mutable state. The builder clamps
//! sampler and batch parameters to the ranges the firmware accepts and
//! rejects structural invariant violations outright.
//!
//! # Environment Variables
//!
//! [`SessionConfigBuilder::from_env()`] reads the following optional
//! variables; unset or unparseable values fall back to the defaults:
//!
//! - `SAMPLER_NUM_WORKERS` (usize) — remote workers per round (default: 4)
//! - `SAMPLER_BITS_PER_WORKER` (usize) — bit chunk width (default: 4)
//! - `SAMPLER_NOISE` (f64) — noise/temperature in `[0, 1]` (default: 0.20)
//! - `SAMPLER_BIAS` (i32) — bias in `[-127, 127]` (default: 5)
//! - `SAMPLER_COUPLING` (u32) — coupling in `[0, 255]` (default: 60)
//! - `SAMPLER_MODE` (u32) — sampler mode in `[0, 255]` (default: 1)
//! - `SAMPLER_BATCH_COUNT` (u32) — emitted samples in `[1, 2000]` (default: 300)
//! - `SAMPLER_BATCH_STRIDE` (u32) — sub-sampling stride in `[1, 1000]` (default: 1)
//! - `SAMPLER_BATCH_BURN_IN` (u32) — burn-in rounds in `[0, 5000]` (default: 20)
//! - `SAMPLER_READ_TIMEOUT_MS` (u64) — per-read timeout (default: 1000)
//! - `SAMPLER_INACTIVITY_TIMEOUT_SECS` (u64) — silence budget (default: 25)
//! - `SAMPLER_LOG` — `"true"` enables logging to a file (default: false)

use std::env;
use std::time::Duration;

use anyhow::bail;
use tracing::warn;

/// Validated, immutable configuration for one sampling session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub(crate) num_workers: usize,
    pub(crate) bits_per_worker: usize,
    pub(crate) noise: f64,
    pub(crate) bias: i32,
    pub(crate) coupling: u32,
    pub(crate) mode: u32,
    pub(crate) batch_count: u32,
    pub(crate) batch_stride: u32,
    pub(crate) batch_burn_in: u32,
    pub(crate) read_timeout: Duration,
    pub(crate) inactivity_timeout: Duration,
    pub(crate) handshake_delay: Duration,
    pub(crate) eviction_cap: usize,
    pub(crate) eviction_floor: usize,
    pub(crate) log: bool,
}

impl SessionConfig {
    /// Start building a configuration with default parameters.
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }

    /// Number of remote workers contributing to each round.
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Width of each worker's bit chunk.
    pub fn bits_per_worker(&self) -> usize {
        self.bits_per_worker
    }

    /// Total assembled vector length: `num_workers * bits_per_worker`.
    pub fn total_bits(&self) -> usize {
        self.num_workers * self.bits_per_worker
    }
}

/// A chainable builder for [`SessionConfig`].
///
/// Defaults match the reference demo: 4 workers × 4 bits over a ring, batch
/// of 300 samples, 25 s inactivity budget.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use hybrid_sampler::configuration::SessionConfigBuilder;
///
/// let config = SessionConfigBuilder::new()
///     .with_workers(4, 4)
///     .with_noise(0.2)
///     .with_batch(300, 1, 20)
///     .with_inactivity_timeout(Duration::from_secs(25))
///     .build()
///     .unwrap();
/// assert_eq!(config.total_bits(), 16);
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfigBuilder {
    num_workers: usize,
    bits_per_worker: usize,
    noise: f64,
    bias: i32,
    coupling: u32,
    mode: u32,
    batch_count: u32,
    batch_stride: u32,
    batch_burn_in: u32,
    read_timeout: Duration,
    inactivity_timeout: Duration,
    handshake_delay: Duration,
    eviction_cap: usize,
    eviction_floor: usize,
    log: bool,
}

impl SessionConfigBuilder {
    /// Create a builder with default parameters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            num_workers: 4,
            bits_per_worker: 4,
            noise: 0.20,
            bias: 5,
            coupling: 60,
            mode: 1,
            batch_count: 300,
            batch_stride: 1,
            batch_burn_in: 20,
            read_timeout: Duration::from_secs(1),
            inactivity_timeout: Duration::from_secs(25),
            handshake_delay: Duration::from_millis(50),
            eviction_cap: 50,
            eviction_floor: 20,
            log: false,
        }
    }

    /// Create a builder configured from `SAMPLER_*` environment variables
    /// (see module documentation). Unset or unparseable values keep their
    /// defaults.
    #[must_use]
    pub fn from_env() -> Self {
        fn parse<T: std::str::FromStr>(var: &str) -> Option<T> {
            env::var(var).ok()?.parse().ok()
        }

        let d = Self::new();
        Self {
            num_workers: parse("SAMPLER_NUM_WORKERS").unwrap_or(d.num_workers),
            bits_per_worker: parse("SAMPLER_BITS_PER_WORKER").unwrap_or(d.bits_per_worker),
            noise: parse("SAMPLER_NOISE").unwrap_or(d.noise),
            bias: parse("SAMPLER_BIAS").unwrap_or(d.bias),
            coupling: parse("SAMPLER_COUPLING").unwrap_or(d.coupling),
            mode: parse("SAMPLER_MODE").unwrap_or(d.mode),
            batch_count: parse("SAMPLER_BATCH_COUNT").unwrap_or(d.batch_count),
            batch_stride: parse("SAMPLER_BATCH_STRIDE").unwrap_or(d.batch_stride),
            batch_burn_in: parse("SAMPLER_BATCH_BURN_IN").unwrap_or(d.batch_burn_in),
            read_timeout: parse("SAMPLER_READ_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(d.read_timeout),
            inactivity_timeout: parse("SAMPLER_INACTIVITY_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(d.inactivity_timeout),
            log: env::var("SAMPLER_LOG")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(d.log),
            ..d
        }
    }

    /// Set the worker geometry: `num_workers` remote workers each reporting
    /// `bits_per_worker` bits per round.
    #[must_use]
    pub fn with_workers(mut self, num_workers: usize, bits_per_worker: usize) -> Self {
        self.num_workers = num_workers;
        self.bits_per_worker = bits_per_worker;
        self
    }

    /// Set the sampler noise/temperature, valid in `[0, 1]`.
    #[must_use]
    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise;
        self
    }

    /// Set the sampler bias, valid in `[-127, 127]`.
    #[must_use]
    pub fn with_bias(mut self, bias: i32) -> Self {
        self.bias = bias;
        self
    }

    /// Set the worker coupling strength, valid in `[0, 255]`.
    #[must_use]
    pub fn with_coupling(mut self, coupling: u32) -> Self {
        self.coupling = coupling;
        self
    }

    /// Set the sampler mode, valid in `[0, 255]`.
    #[must_use]
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    /// Set the batch request: `count` emitted samples (`[1, 2000]`),
    /// sub-sampling `stride` (`[1, 1000]`) and `burn_in` warm-up rounds
    /// (`[0, 5000]`).
    #[must_use]
    pub fn with_batch(mut self, count: u32, stride: u32, burn_in: u32) -> Self {
        self.batch_count = count;
        self.batch_stride = stride;
        self.batch_burn_in = burn_in;
        self
    }

    /// Set the per-read timeout bounding each wait on the transport. This
    /// also bounds how quickly a cancellation request is observed.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the inactivity budget: the session drains once the link has been
    /// silent for this long, measured from the last received line.
    #[must_use]
    pub fn with_inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = timeout;
        self
    }

    /// Set the pause between handshake commands, respecting remote-side
    /// input buffering.
    #[must_use]
    pub fn with_handshake_delay(mut self, delay: Duration) -> Self {
        self.handshake_delay = delay;
        self
    }

    /// Set the bounded-memory policy for incomplete rounds: once more than
    /// `cap` are pending, the oldest ticks are discarded unscored until
    /// `floor` remain.
    #[must_use]
    pub fn with_eviction_bounds(mut self, cap: usize, floor: usize) -> Self {
        self.eviction_cap = cap;
        self.eviction_floor = floor;
        self
    }

    /// Enable or disable logging to a timestamped file.
    #[must_use]
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Validate and build the configuration.
    ///
    /// Sampler and batch parameters outside their documented ranges are
    /// clamped (with a warning); structural invariant violations are
    /// rejected.
    ///
    /// # Errors
    /// When `num_workers` or `bits_per_worker` is zero, `bits_per_worker`
    /// exceeds the 64-bit mask width, the eviction floor exceeds the cap, or
    /// the read timeout is zero.
    pub fn build(self) -> anyhow::Result<SessionConfig> {
        if self.num_workers == 0 {
            bail!("num_workers must be at least 1");
        }
        if self.bits_per_worker == 0 {
            bail!("bits_per_worker must be at least 1");
        }
        if self.bits_per_worker > 64 {
            bail!("bits_per_worker cannot exceed the 64-bit mask width");
        }
        if self.eviction_floor > self.eviction_cap {
            bail!(
                "eviction floor ({}) exceeds cap ({})",
                self.eviction_floor,
                self.eviction_cap
            );
        }
        if self.read_timeout.is_zero() {
            bail!("read timeout must be non-zero");
        }

        Ok(SessionConfig {
            num_workers: self.num_workers,
            bits_per_worker: self.bits_per_worker,
            noise: clamped("noise", self.noise, 0.0, 1.0),
            bias: clamped("bias", self.bias, -127, 127),
            coupling: clamped("coupling", self.coupling, 0, 255),
            mode: clamped("mode", self.mode, 0, 255),
            batch_count: clamped("batch count", self.batch_count, 1, 2000),
            batch_stride: clamped("batch stride", self.batch_stride, 1, 1000),
            batch_burn_in: clamped("batch burn-in", self.batch_burn_in, 0, 5000),
            read_timeout: self.read_timeout,
            inactivity_timeout: self.inactivity_timeout,
            handshake_delay: self.handshake_delay,
            eviction_cap: self.eviction_cap,
            eviction_floor: self.eviction_floor,
            log: self.log,
        })
    }
}

impl Default for SessionConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn clamped<T: PartialOrd + Copy + std::fmt::Display>(name: &str, value: T, lo: T, hi: T) -> T {
    if value < lo {
        warn!("{name} {value} below minimum, clamped to {lo}");
        lo
    } else if value > hi {
        warn!("{name} {value} above maximum, clamped to {hi}");
        hi
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build() {
        let config = SessionConfigBuilder::new().build().unwrap();
        assert_eq!(config.num_workers(), 4);
        assert_eq!(config.bits_per_worker(), 4);
        assert_eq!(config.total_bits(), 16);
    }

    #[test]
    fn zero_workers_is_rejected() {
        assert!(SessionConfigBuilder::new().with_workers(0, 4).build().is_err());
        assert!(SessionConfigBuilder::new().with_workers(4, 0).build().is_err());
    }

    #[test]
    fn mask_width_is_bounded() {
        assert!(SessionConfigBuilder::new().with_workers(1, 65).build().is_err());
        assert!(SessionConfigBuilder::new().with_workers(1, 64).build().is_ok());
    }

    #[test]
    fn floor_above_cap_is_rejected() {
        let result = SessionConfigBuilder::new().with_eviction_bounds(20, 50).build();
        assert!(result.is_err());
    }

    #[test]
    fn out_of_range_parameters_are_clamped() {
        let config = SessionConfigBuilder::new()
            .with_noise(2.0)
            .with_bias(-500)
            .with_coupling(999)
            .with_batch(5000, 0, 9999)
            .build()
            .unwrap();
        assert_eq!(config.noise, 1.0);
        assert_eq!(config.bias, -127);
        assert_eq!(config.coupling, 255);
        assert_eq!(config.batch_count, 2000);
        assert_eq!(config.batch_burn_in, 5000);
        assert_eq!(config.batch_stride, 1);
    }
}
