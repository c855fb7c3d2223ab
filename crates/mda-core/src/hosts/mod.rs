//! Host record store.
//!
//! One `HostRecord` per candidate mirror. The table is built once at
//! resolution time and mutated only by the prober; the ranking and transfer
//! stages read it.

mod record;
mod resolve;

pub use record::HostRecord;
pub use resolve::{resolve_targets, Resolve, SystemResolver};

/// The shared table of candidate mirrors.
#[derive(Debug, Clone, Default)]
pub struct HostTable {
    records: Vec<HostRecord>,
}

impl HostTable {
    /// Table with room for `max(mirrors, workers)` records.
    pub fn with_capacity(mirrors: usize, workers: usize) -> Self {
        Self {
            records: Vec::with_capacity(mirrors.max(workers)),
        }
    }

    pub fn push(&mut self, record: HostRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&HostRecord> {
        self.records.get(index)
    }

    pub fn records(&self) -> &[HostRecord] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [HostRecord] {
        &mut self.records
    }

    /// Number of hosts still eligible for probing or selection.
    pub fn valid_count(&self) -> usize {
        self.records.iter().filter(|h| !h.invalid).count()
    }
}

impl FromIterator<HostRecord> for HostTable {
    fn from_iter<I: IntoIterator<Item = HostRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}
