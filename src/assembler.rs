//! Per-tick round reassembly under a bounded memory policy.
//!
//! Workers emit their per-round samples independently, so the lines for one
//! tick arrive interleaved with other ticks and in no particular worker
//! order. [`TickAssembler`] groups samples by tick and emits a
//! [`CompletedRound`] exactly once, the instant the last missing worker
//! reports.
//!
//! Active rounds live in a bounded arena: whenever more than `eviction_cap`
//! incomplete rounds are pending, the oldest ticks are discarded unscored
//! until `eviction_floor` remain. That data loss is an explicit contract for
//! unbounded-memory protection, not an error — lost serial lines would
//! otherwise pin their tick's round forever.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::objective::bits_from_mask;
use crate::protocol::Sample;

/// A fully assembled round, emitted once per tick.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedRound {
    /// The round identifier.
    pub tick: u64,
    /// Concatenated worker bit chunks, ascending worker index, LSB first
    /// within each chunk; length `num_workers * bits_per_worker`.
    pub bits: Vec<u8>,
}

#[derive(Debug)]
struct Round {
    slots: Vec<Option<Sample>>,
    filled: usize,
}

impl Round {
    fn new(num_workers: usize) -> Round {
        Round {
            slots: vec![None; num_workers],
            filled: 0,
        }
    }
}

/// Groups per-worker samples by tick and detects round completion.
///
/// The assembler is the sole owner of round state; it is driven from a single
/// reader loop and needs no locking.
#[derive(Debug)]
pub struct TickAssembler {
    num_workers: usize,
    bits_per_worker: usize,
    eviction_cap: usize,
    eviction_floor: usize,
    active: BTreeMap<u64, Round>,
    evicted_rounds: u64,
    rejected_samples: u64,
}

impl TickAssembler {
    /// Create an assembler for `num_workers` workers of `bits_per_worker`
    /// bits each. `eviction_cap`/`eviction_floor` bound the number of
    /// concurrently incomplete rounds; both are assumed validated by the
    /// session configuration.
    pub fn new(
        num_workers: usize,
        bits_per_worker: usize,
        eviction_cap: usize,
        eviction_floor: usize,
    ) -> TickAssembler {
        TickAssembler {
            num_workers,
            bits_per_worker,
            eviction_cap,
            eviction_floor,
            active: BTreeMap::new(),
            evicted_rounds: 0,
            rejected_samples: 0,
        }
    }

    /// Ingest one sample. Returns the assembled round exactly once, at the
    /// moment the sample completes its tick; `None` otherwise.
    ///
    /// A repeated `(tick, worker_index)` overwrites the prior sample
    /// (last write wins). A `worker_index` outside `[0, num_workers)` is
    /// rejected without creating or mutating any round.
    pub fn ingest(&mut self, sample: Sample) -> Option<CompletedRound> {
        if sample.worker_index >= self.num_workers {
            warn!(
                tick = sample.tick,
                worker_index = sample.worker_index,
                num_workers = self.num_workers,
                "discarding sample with out-of-range worker index"
            );
            self.rejected_samples += 1;
            return None;
        }

        let num_workers = self.num_workers;
        let round = self
            .active
            .entry(sample.tick)
            .or_insert_with(|| Round::new(num_workers));
        if round.slots[sample.worker_index].replace(sample).is_none() {
            round.filled += 1;
        }

        if round.filled == self.num_workers {
            let round = self.active.remove(&sample.tick).unwrap();
            return Some(self.assemble(sample.tick, round));
        }

        self.evict_stale();
        None
    }

    fn assemble(&self, tick: u64, round: Round) -> CompletedRound {
        let mut bits = Vec::with_capacity(self.num_workers * self.bits_per_worker);
        for slot in &round.slots {
            let sample = slot.as_ref().unwrap();
            bits.extend(bits_from_mask(sample.bitmask, self.bits_per_worker));
        }
        CompletedRound { tick, bits }
    }

    /// Oldest-tick-first eviction down to the floor once the cap is exceeded.
    fn evict_stale(&mut self) {
        if self.active.len() <= self.eviction_cap {
            return;
        }
        let before = self.active.len();
        while self.active.len() > self.eviction_floor {
            if let Some((tick, round)) = self.active.pop_first() {
                debug!(tick, filled = round.filled, "evicting incomplete round");
                self.evicted_rounds += 1;
            }
        }
        warn!(
            evicted = before - self.active.len(),
            remaining = self.active.len(),
            "incomplete round cap exceeded; oldest ticks discarded unscored"
        );
    }

    /// Number of currently incomplete rounds.
    pub fn active_rounds(&self) -> usize {
        self.active.len()
    }

    /// Total rounds discarded unscored by the bounded-memory policy.
    pub fn evicted_rounds(&self) -> u64 {
        self.evicted_rounds
    }

    /// Total samples rejected for an out-of-range worker index.
    pub fn rejected_samples(&self) -> u64 {
        self.rejected_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(tick: u64, worker_index: usize, bitmask: u64) -> Sample {
        Sample {
            tick,
            worker_index,
            bitmask,
            loss: 0,
            noise: 0.1,
            seed: 7,
        }
    }

    fn assembler(num_workers: usize) -> TickAssembler {
        TickAssembler::new(num_workers, 4, 50, 20)
    }

    #[test]
    fn round_completes_when_all_workers_reported() {
        let mut asm = assembler(2);
        assert_eq!(asm.ingest(sample(3, 0, 0b0101)), None);
        let round = asm.ingest(sample(3, 1, 0b0011)).unwrap();
        assert_eq!(round.tick, 3);
        assert_eq!(round.bits, vec![1, 0, 1, 0, 1, 1, 0, 0]);
        assert_eq!(asm.active_rounds(), 0);
    }

    #[test]
    fn completion_is_independent_of_worker_arrival_order() {
        let mut asm = assembler(3);
        assert_eq!(asm.ingest(sample(9, 2, 1)), None);
        assert_eq!(asm.ingest(sample(9, 0, 1)), None);
        let round = asm.ingest(sample(9, 1, 1)).unwrap();
        // still assembled in ascending worker order
        assert_eq!(round.bits, vec![1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn repeated_worker_sample_overwrites_without_duplicating() {
        let mut asm = assembler(2);
        assert_eq!(asm.ingest(sample(0, 0, 0b1111)), None);
        assert_eq!(asm.ingest(sample(0, 0, 0b1111)), None);
        assert_eq!(asm.ingest(sample(0, 0, 0b0001)), None);
        assert_eq!(asm.active_rounds(), 1);
        let round = asm.ingest(sample(0, 1, 0)).unwrap();
        // last write for worker 0 wins
        assert_eq!(round.bits, vec![1, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn out_of_range_worker_index_is_rejected_without_state_change() {
        let mut asm = assembler(4);
        assert_eq!(asm.ingest(sample(5, 9, 3)), None);
        assert_eq!(asm.active_rounds(), 0);
        assert_eq!(asm.rejected_samples(), 1);
    }

    #[test]
    fn eviction_keeps_the_newest_ticks() {
        let mut asm = assembler(2);
        // 51 concurrently incomplete ticks: the 51st ingest trips the cap
        for tick in 0..51 {
            asm.ingest(sample(tick, 0, 1));
        }
        assert_eq!(asm.active_rounds(), 20);
        assert_eq!(asm.evicted_rounds(), 31);
        // the 20 highest ticks survive: tick 31 can still complete
        assert!(asm.ingest(sample(31, 1, 1)).is_some());
        // tick 0 was discarded unscored; its worker-1 sample opens a new round
        assert!(asm.ingest(sample(0, 1, 1)).is_none());
        assert_eq!(asm.active_rounds(), 20);
    }

    #[test]
    fn identical_ingest_is_idempotent_per_worker_and_tick() {
        let mut asm = assembler(2);
        for _ in 0..10 {
            assert_eq!(asm.ingest(sample(4, 1, 0b0010)), None);
        }
        assert_eq!(asm.active_rounds(), 1);
        let round = asm.ingest(sample(4, 0, 0)).unwrap();
        assert_eq!(round.bits, vec![0, 0, 0, 0, 0, 1, 0, 0]);
    }
}
