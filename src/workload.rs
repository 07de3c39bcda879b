//! A deterministic, seed-driven generator of allocate/release traffic, used
//! to populate a [`Ledger`] for visualisation and to stress it in tests.
//!
//! Each operation allocates a block of random size, records it, and then
//! flips a coin to decide whether to release it straight away. Blocks that
//! survive stay tracked until the next [`Workload::run()`] or
//! [`Workload::drain()`]. The same seed, operation count and config always
//! produce the same sizes and the same release decisions.

use std::{fmt, fs, path::Path, slice};

use log::{info, warn};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    alloc::{ledger::Ledger, manual::LibcHeap, tracker::Tracker, HeapAdapter},
    error::ConfigError,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Smallest block size drawn, in bytes (inclusive)
    pub min_size: usize,
    /// Largest block size drawn, in bytes (inclusive)
    pub max_size: usize,
    /// Chance that a block is released right after being allocated
    pub release_probability: f64,
    /// Write a byte pattern into every block
    pub fill: bool,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: 4096,
            release_probability: 0.5,
            fill: true,
        }
    }
}

impl WorkloadConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_size > self.max_size {
            return Err(ConfigError::Invalid(format!(
                "min_size ({}) is larger than max_size ({})",
                self.min_size, self.max_size
            )));
        }
        if !(0.0..=1.0).contains(&self.release_probability) {
            return Err(ConfigError::Invalid(format!(
                "release_probability ({}) must be within [0, 1]",
                self.release_probability
            )));
        }
        Ok(())
    }

    /// Read a JSON config. Missing fields take their default value.
    pub fn from_file<P>(path: P) -> Result<Self, ConfigError>
    where
        P: AsRef<Path>,
    {
        let config: Self = serde_json::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        Ok(config)
    }
}

/// What a single [`Workload::run()`] did
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub seed: u64,
    /// Operations attempted, including ones whose allocation failed
    pub operations: usize,
    pub allocation_failures: usize,
    /// Blocks released straight after allocation
    pub released: usize,
    /// Blocks still allocated when the run finished
    pub live: usize,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "After run with seed {}:", self.seed)?;
        writeln!(f, "  Operations: {}", self.operations)?;
        if self.allocation_failures > 0 {
            writeln!(f, "  Failed allocations: {}", self.allocation_failures)?;
        }
        write!(f, "  Still allocated: {} blocks", self.live)
    }
}

/// The simulator's whole world: one ledger, and the tracker of handles it has
/// not yet released.
pub struct Workload<H = LibcHeap>
where
    H: HeapAdapter,
{
    ledger: Ledger<H>,
    tracker: Tracker,
    config: WorkloadConfig,
}

impl<H> Workload<H>
where
    H: HeapAdapter,
{
    pub fn new(heap: H) -> Self {
        Self {
            ledger: Ledger::new(heap),
            tracker: Tracker::new(),
            config: WorkloadConfig::default(),
        }
    }

    pub fn with_config(heap: H, config: WorkloadConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::new(heap)
        })
    }

    /// Drain whatever the previous run left behind, then perform
    /// `num_operations` seeded allocate/maybe-release operations.
    pub fn run(&mut self, seed: u64, num_operations: usize) -> RunReport {
        self.drain();

        let mut rng = StdRng::seed_from_u64(seed);
        let mut report = RunReport {
            seed,
            operations: num_operations,
            allocation_failures: 0,
            released: 0,
            live: 0,
        };

        for i in 0..num_operations {
            let size = rng.gen_range(self.config.min_size..=self.config.max_size);
            let handle = match self.ledger.allocate(size) {
                Ok(handle) => handle,
                Err(e) => {
                    warn!("workload: operation {i} skipped: {e}");
                    report.allocation_failures += 1;
                    continue;
                }
            };

            if self.config.fill {
                // SAFETY:
                // - The allocation is `size` bytes and was made a moment ago
                // - Nothing else has seen the handle yet, so this is the only
                //   reference into the block
                let block = unsafe { slice::from_raw_parts_mut(handle.as_ptr(), size) };
                for (j, byte) in block.iter_mut().enumerate() {
                    *byte = i.wrapping_add(j) as u8;
                }
            }

            self.tracker.track(handle);

            if rng.gen_bool(self.config.release_probability) {
                if let Err(e) = self.ledger.remove(handle) {
                    warn!("workload: operation {i} could not release: {e}");
                }
                self.tracker.untrack(handle);
                report.released += 1;
            }
        }

        report.live = self.tracker.len();
        info!(
            "workload: seed {seed}, {} operations, {} failed, {} live",
            report.operations, report.allocation_failures, report.live
        );
        report
    }

    /// Release everything still tracked. Returns how many blocks were freed.
    pub fn drain(&mut self) -> usize {
        if self.tracker.is_empty() {
            return 0;
        }
        info!("workload: freeing all remaining {} blocks", self.tracker.len());
        let freed = self.tracker.reset(&mut self.ledger);
        info!("workload: all memory freed");
        freed
    }

    pub const fn ledger(&self) -> &Ledger<H> {
        &self.ledger
    }

    pub const fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub const fn config(&self) -> &WorkloadConfig {
        &self.config
    }
}

impl Default for Workload<LibcHeap> {
    fn default() -> Self {
        Self::new(LibcHeap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::{dlmalloc::DlHeap, BudgetHeap};

    fn sizes<H: HeapAdapter>(workload: &Workload<H>) -> Vec<usize> {
        workload.ledger().entries().map(|entry| entry.size).collect()
    }

    #[test]
    fn zero_operations_leave_nothing_behind() {
        let mut workload: Workload = Workload::default();
        let report = workload.run(1, 0);
        assert_eq!(report.operations, 0);
        assert_eq!(report.live, 0);
        assert!(workload.ledger().is_empty());
    }

    #[test]
    fn same_seed_same_ledger() {
        let mut workload: Workload = Workload::default();
        let first = workload.run(12345, 1000);
        let first_sizes = sizes(&workload);
        workload.drain();
        let second = workload.run(12345, 1000);

        assert_eq!(first.live, second.live);
        assert_eq!(first_sizes, sizes(&workload));
    }

    #[test]
    fn tracker_and_ledger_agree_after_a_run() {
        let mut workload = Workload::new(DlHeap::new());
        let report = workload.run(7, 500);
        assert_eq!(report.live, workload.ledger().len());
        assert_eq!(report.live + report.released, report.operations);
        for handle in workload.tracker() {
            assert!(workload.ledger().contains(*handle));
        }
        for entry in workload.ledger().entries() {
            assert!((1..=4096).contains(&entry.size));
        }
    }

    #[test]
    fn drain_is_idempotent() {
        let mut workload: Workload = Workload::default();
        let report = workload.run(3, 64);
        assert_eq!(workload.drain(), report.live);
        assert!(workload.ledger().is_empty());
        assert_eq!(workload.drain(), 0);
        assert!(workload.tracker().is_empty());
    }

    #[test]
    fn run_drains_the_previous_run() {
        let mut workload = Workload::new(BudgetHeap::new(LibcHeap, 1 << 24));
        workload.run(11, 200);
        let report = workload.run(11, 10);
        assert_eq!(workload.ledger().len(), report.live);
        let in_use: usize = workload.ledger().entries().map(|entry| entry.size).sum();
        assert_eq!(workload.ledger().heap().in_use(), in_use);
    }

    #[test]
    fn allocation_failures_are_skipped() {
        let config = WorkloadConfig {
            release_probability: 0.0,
            ..WorkloadConfig::default()
        };
        let mut workload = Workload::with_config(BudgetHeap::new(LibcHeap, 8192), config).unwrap();
        let report = workload.run(99, 100);
        assert!(report.allocation_failures > 0);
        assert_eq!(report.live + report.allocation_failures, 100);
        assert!(workload.ledger().heap().in_use() <= 8192);
    }

    #[test]
    fn fixed_size_config_always_releases() {
        let config = WorkloadConfig {
            min_size: 64,
            max_size: 64,
            release_probability: 1.0,
            fill: false,
        };
        let mut workload = Workload::with_config(LibcHeap, config).unwrap();
        let report = workload.run(5, 50);
        assert_eq!(report.released, 50);
        assert_eq!(report.live, 0);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let backwards = WorkloadConfig {
            min_size: 10,
            max_size: 1,
            ..WorkloadConfig::default()
        };
        assert!(matches!(
            Workload::with_config(LibcHeap, backwards),
            Err(ConfigError::Invalid(_))
        ));

        let unlikely = WorkloadConfig {
            release_probability: 1.5,
            ..WorkloadConfig::default()
        };
        assert!(unlikely.validate().is_err());
    }

    #[test]
    fn config_files_fill_in_defaults() {
        let path = std::env::temp_dir().join(format!("cyberspace-config-{}.json", std::process::id()));
        fs::write(&path, r#"{ "max_size": 128 }"#).unwrap();
        let config = WorkloadConfig::from_file(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(
            config,
            WorkloadConfig {
                max_size: 128,
                ..WorkloadConfig::default()
            }
        );
    }

    #[test]
    fn report_mentions_the_counts() {
        let report = RunReport {
            seed: 1,
            operations: 10,
            allocation_failures: 0,
            released: 4,
            live: 6,
        };
        let text = report.to_string();
        assert!(text.contains("Operations: 10"));
        assert!(text.contains("Still allocated: 6 blocks"));
        assert!(!text.contains("Failed"));
    }
}
