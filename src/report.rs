//! Session outputs: scored-sample history, best-result tracking, and report
//! sinks.
//!
//! The session produces an immutable [`SessionReport`] when it terminates.
//! Downstream persistence and visualization hang off the [`ReportSink`]
//! trait; the provided [`CsvReportSink`] writes the batch history to a
//! timestamped CSV file.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use time::format_description;
use time::OffsetDateTime;
use tracing::info;

/// One scored, fully assembled round: an append-only history entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSample {
    /// Round identifier.
    pub tick: u64,
    /// Max-Cut score of the assembled bit vector.
    pub score: f64,
    /// The assembled `0/1` vector, ascending worker order.
    pub bits: Vec<u8>,
}

impl ScoredSample {
    /// The bit vector rendered as a `0`/`1` string.
    pub fn bit_string(&self) -> String {
        self.bits.iter().map(|b| char::from(b'0' + b)).collect()
    }
}

/// Why a session stopped. Every run terminates with exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The remote master signalled end of batch with `@DONE`.
    Done,
    /// The link was silent for longer than the configured inactivity budget.
    InactivityTimeout,
    /// A cooperative cancellation request was honored.
    Cancelled,
    /// An unrecoverable transport error, with its cause.
    TransportFailed(String),
}

/// Immutable outputs of one finished session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Metadata from the last `@BATCH` header, if any.
    pub batch_meta: BTreeMap<String, String>,
    /// Every scored sample, in round completion order (never re-sorted).
    pub history: Vec<ScoredSample>,
    /// The best sample seen: strictly greatest score, earliest arrival on
    /// ties.
    pub best: Option<ScoredSample>,
    /// `(tick, best_score_so_far)` per completed round, for evolution plots.
    pub best_trace: Vec<(u64, f64)>,
    /// Incomplete rounds discarded unscored by the bounded-memory policy.
    pub evicted_rounds: u64,
    /// Samples rejected for an out-of-range worker index.
    pub rejected_samples: u64,
    /// Lines discarded as unparseable.
    pub discarded_lines: u64,
    /// Why the session stopped.
    pub outcome: SessionOutcome,
    /// Total assembled vector length; also the theoretical maximum score of
    /// the unit-weight ring instance.
    pub total_bits: usize,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

impl SessionReport {
    /// True iff the session ended in transport failure.
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, SessionOutcome::TransportFailed(_))
    }

    /// One-line human-readable summary of the run, including efficiency
    /// against the ring-theoretical maximum when a best sample exists.
    pub fn summary(&self) -> String {
        match &self.best {
            Some(best) => format!(
                "{} samples, best score {:.2} at tick {} ({:.1}% of ring max {}), outcome {:?}",
                self.history.len(),
                best.score,
                best.tick,
                100.0 * best.score / self.total_bits as f64,
                self.total_bits,
                self.outcome,
            ),
            None => format!("no samples scored, outcome {:?}", self.outcome),
        }
    }
}

/// Receives a finished session's history and best result for downstream
/// persistence or visualization.
pub trait ReportSink {
    /// Deliver the report.
    ///
    /// # Errors
    /// On sink-specific failure (e.g. file I/O).
    fn deliver(&mut self, report: &SessionReport) -> anyhow::Result<()>;
}

/// Writes one CSV row per scored sample: `tick,score,bits,is_best`.
///
/// `is_best` is `1` iff the row's bit string equals the final best sample's
/// bit string. The file name is timestamped
/// (`maxcut_results_<YYYYmmdd_HHMMSS>.csv`).
#[derive(Debug)]
pub struct CsvReportSink {
    directory: PathBuf,
    last_path: Option<PathBuf>,
}

impl CsvReportSink {
    /// Create a sink writing into `directory`.
    pub fn new(directory: impl AsRef<Path>) -> CsvReportSink {
        CsvReportSink {
            directory: directory.as_ref().to_owned(),
            last_path: None,
        }
    }

    /// Path of the most recently written file, if any.
    pub fn last_path(&self) -> Option<&Path> {
        self.last_path.as_deref()
    }

    fn timestamp() -> anyhow::Result<String> {
        let format = format_description::parse("[year][month][day]_[hour][minute][second]")
            .context("bad timestamp format description")?;
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        now.format(&format).context("could not format timestamp")
    }
}

impl ReportSink for CsvReportSink {
    fn deliver(&mut self, report: &SessionReport) -> anyhow::Result<()> {
        let path = self
            .directory
            .join(format!("maxcut_results_{}.csv", Self::timestamp()?));
        let mut file = File::create(&path)
            .with_context(|| format!("could not create {}", path.display()))?;

        let best_bits = report.best.as_ref().map(ScoredSample::bit_string);
        writeln!(file, "tick,score,bits,is_best").context("csv write failed")?;
        for sample in &report.history {
            let bits = sample.bit_string();
            let is_best = best_bits.as_deref() == Some(bits.as_str());
            writeln!(
                file,
                "{},{},{},{}",
                sample.tick,
                sample.score,
                bits,
                u8::from(is_best)
            )
            .context("csv write failed")?;
        }

        info!(path = %path.display(), rows = report.history.len(), "batch history written");
        self.last_path = Some(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_with(history: Vec<ScoredSample>, best: Option<ScoredSample>) -> SessionReport {
        SessionReport {
            batch_meta: BTreeMap::new(),
            history,
            best,
            best_trace: vec![],
            evicted_rounds: 0,
            rejected_samples: 0,
            discarded_lines: 0,
            outcome: SessionOutcome::Done,
            total_bits: 4,
            elapsed: Duration::from_secs(1),
        }
    }

    #[test]
    fn bit_string_renders_in_vector_order() {
        let sample = ScoredSample {
            tick: 0,
            score: 0.0,
            bits: vec![1, 0, 1, 1],
        };
        assert_eq!(sample.bit_string(), "1011");
    }

    #[test]
    fn csv_rows_flag_every_occurrence_of_the_best_bits() {
        let best = ScoredSample {
            tick: 1,
            score: 4.0,
            bits: vec![1, 0, 1, 0],
        };
        let other = ScoredSample {
            tick: 0,
            score: 2.0,
            bits: vec![1, 1, 0, 0],
        };
        let repeat = ScoredSample {
            tick: 2,
            ..best.clone()
        };
        let report = report_with(
            vec![other, best.clone(), repeat],
            Some(best),
        );

        let dir = std::env::temp_dir().join(format!("hybrid-sampler-csv-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let mut sink = CsvReportSink::new(&dir);
        sink.deliver(&report).unwrap();

        let contents = std::fs::read_to_string(sink.last_path().unwrap()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "tick,score,bits,is_best");
        assert_eq!(lines[1], "0,2,1100,0");
        assert_eq!(lines[2], "1,4,1010,1");
        // same bit string as the best, so flagged too
        assert_eq!(lines[3], "2,4,1010,1");
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn summary_reports_efficiency_against_ring_max() {
        let best = ScoredSample {
            tick: 3,
            score: 4.0,
            bits: vec![1, 0, 1, 0],
        };
        let report = report_with(vec![best.clone()], Some(best));
        let summary = report.summary();
        assert!(summary.contains("best score 4.00 at tick 3"));
        assert!(summary.contains("100.0%"));
    }
}
