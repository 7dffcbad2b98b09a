//! Set of addresses stored as maximal disjoint ranges

use super::AddressRange;
use std::collections::BTreeMap;

/// A set of addresses. Stored ranges never overlap or touch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressSet {
    // start -> end
    ranges: BTreeMap<u64, u64>,
}

impl AddressSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn contains(&self, address: u64) -> bool {
        self.ranges
            .range(..=address)
            .next_back()
            .map_or(false, |(_, &end)| address < end)
    }

    pub fn iter(&self) -> impl Iterator<Item = AddressRange> + '_ {
        self.ranges.iter().map(|(&start, &end)| AddressRange::new(start, end))
    }

    /// Add every address of `range`, merging with touching or overlapping ranges.
    pub fn add(&mut self, range: AddressRange) {
        if range.is_empty() {
            return;
        }
        let mut start = range.start();
        let mut end = range.end();
        let merged: Vec<(u64, u64)> = self
            .ranges
            .range(..=range.end())
            .rev()
            .take_while(|&(_, &e)| e >= range.start())
            .map(|(&s, &e)| (s, e))
            .collect();
        for (s, e) in merged {
            self.ranges.remove(&s);
            start = start.min(s);
            end = end.max(e);
        }
        self.ranges.insert(start, end);
    }

    /// Remove every address of `range`, splitting ranges that strictly contain it.
    pub fn remove(&mut self, range: AddressRange) {
        if range.is_empty() {
            return;
        }
        let hit: Vec<(u64, u64)> = self
            .ranges
            .range(..range.end())
            .rev()
            .take_while(|&(_, &e)| e > range.start())
            .map(|(&s, &e)| (s, e))
            .collect();
        for (s, e) in hit {
            self.ranges.remove(&s);
            if s < range.start() {
                self.ranges.insert(s, range.start());
            }
            if range.end() < e {
                self.ranges.insert(range.end(), e);
            }
        }
    }
}
