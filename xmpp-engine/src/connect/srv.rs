//! RFC 2782 ordering of SRV records.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// One SRV record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SrvCandidate {
    /// Lower is tried first
    pub priority: u16,
    /// Relative share within a priority tier
    pub weight: u16,
    /// Target port
    pub port: u16,
    /// Target host, without the trailing dot
    pub target: String,
}

/// SRV records in connection order, computed lazily.
///
/// Tiers are visited by ascending priority. Within a tier, each pick is a
/// weighted random draw among the records not yet returned, so every record
/// is yielded exactly once.
pub struct SrvCandidates<R: Rng = StdRng> {
    remaining: Vec<SrvCandidate>,
    rng: R,
}

impl SrvCandidates<StdRng> {
    /// Order `records` with an entropy-seeded generator.
    pub fn new(records: Vec<SrvCandidate>) -> Self {
        Self::with_rng(records, StdRng::from_entropy())
    }
}

impl<R: Rng> SrvCandidates<R> {
    /// Order `records` drawing from `rng`.
    pub fn with_rng(mut records: Vec<SrvCandidate>, rng: R) -> Self {
        // Stable: zero-weight records lead their tier in input order.
        records.sort_by_key(|record| (record.priority, record.weight != 0));
        SrvCandidates {
            remaining: records,
            rng,
        }
    }

    /// Records not yet returned.
    pub fn len(&self) -> usize {
        self.remaining.len()
    }

    /// Whether every record was returned.
    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }
}

impl<R: Rng> Iterator for SrvCandidates<R> {
    type Item = SrvCandidate;

    fn next(&mut self) -> Option<SrvCandidate> {
        let priority = self.remaining.first()?.priority;
        let tier = self
            .remaining
            .iter()
            .take_while(|record| record.priority == priority);
        let total: u32 = tier.clone().map(|record| u32::from(record.weight)).sum();
        let draw = self.rng.gen_range(0..=total);
        let mut running = 0;
        let index = tier
            .clone()
            .position(|record| {
                running += u32::from(record.weight);
                running >= draw
            })
            .unwrap_or(0);
        Some(self.remaining.remove(index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining.len(), Some(self.remaining.len()))
    }
}

impl<R: Rng> ExactSizeIterator for SrvCandidates<R> {}
