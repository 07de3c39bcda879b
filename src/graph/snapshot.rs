use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{
    alloc::{
        ledger::{Entry, Ledger},
        HeapAdapter,
    },
    error::SnapshotError,
};

/// A ledger's live allocations at one point in time, in ledger order. This is
/// what gets handed to a front-end that isn't running in this process.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// The workload seed that produced this state, if there was one
    pub seed: Option<u64>,
    pub entries: Vec<Entry>,
}

impl Snapshot {
    pub fn of<H>(ledger: &Ledger<H>) -> Self
    where
        H: HeapAdapter,
    {
        Self {
            seed: None,
            entries: ledger.entries().collect(),
        }
    }

    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..self
        }
    }

    pub fn total_bytes(&self) -> usize {
        self.entries.iter().map(|entry| entry.size).sum()
    }

    pub fn write_to_file<P>(&self, path: P) -> Result<(), SnapshotError>
    where
        P: AsRef<Path>,
    {
        let mut file = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut file, self)?;
        file.flush()?;
        Ok(())
    }

    pub fn from_file<P>(path: P) -> Result<Self, SnapshotError>
    where
        P: AsRef<Path>,
    {
        let file = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(file)?)
    }
}
