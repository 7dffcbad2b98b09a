//! Ordered map of non-overlapping address ranges
//!
//! Entries are keyed by the exclusive end of their range, so every point or
//! range query is a single upper-bound lookup on a raw address.

use super::AddressRange;
use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Included, Unbounded};

/// Map from non-overlapping, non-empty `AddressRange`s to values.
#[derive(Debug, Clone)]
pub struct AddressRangeMap<V> {
    entries: BTreeMap<u64, (AddressRange, V)>,
}

impl<V> Default for AddressRangeMap<V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<V> AddressRangeMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries in ascending address order.
    pub fn iter(&self) -> impl Iterator<Item = (&AddressRange, &V)> {
        self.entries.values().map(|(r, v)| (r, v))
    }

    /// Insert `value` for `range`.
    ///
    /// Returns false and leaves the map untouched if `range` is empty or
    /// overlaps an existing entry.
    pub fn emplace(&mut self, range: AddressRange, value: V) -> bool {
        if range.is_empty() {
            return false;
        }
        if self.first_overlap(&range).is_some() {
            return false;
        }
        self.entries.insert(range.end(), (range, value));
        true
    }

    /// Entry whose range contains `address`.
    pub fn find(&self, address: u64) -> Option<(&AddressRange, &V)> {
        let (_, (range, value)) = self.entries.range((Excluded(address), Unbounded)).next()?;
        range.contains(address).then_some((range, value))
    }

    pub fn find_mut(&mut self, address: u64) -> Option<(&AddressRange, &mut V)> {
        let (_, (range, value)) = self
            .entries
            .range_mut((Excluded(address), Unbounded))
            .next()?;
        if range.contains(address) {
            Some((&*range, value))
        } else {
            None
        }
    }

    /// Entry whose range fully contains `range`. Panics on an empty `range`.
    pub fn find_range_that_contains(&self, range: &AddressRange) -> Option<(&AddressRange, &V)> {
        assert!(!range.is_empty(), "lookup with empty range {range}");
        let (_, (stored, value)) = self.entries.range((Included(range.end()), Unbounded)).next()?;
        stored.contains_range(range).then_some((stored, value))
    }

    /// Call `callback` on every entry intersecting `range`, in ascending order.
    pub fn for_overlaps<F>(&self, range: &AddressRange, mut callback: F)
    where
        F: FnMut(&AddressRange, &V),
    {
        if range.is_empty() {
            return;
        }
        for (stored, value) in self.entries.range((Excluded(range.start()), Unbounded)).map(|(_, e)| e) {
            if stored.start() >= range.end() {
                break;
            }
            callback(stored, value);
        }
    }

    /// Remove every entry overlapping `range`, reporting each removed pair
    /// to `callback` in ascending order, then insert `(range, value)`.
    pub fn delete_overlaps_and_emplace<F>(&mut self, mut callback: F, range: AddressRange, value: V)
    where
        F: FnMut(AddressRange, V),
    {
        assert!(!range.is_empty(), "cannot emplace empty range {range}");
        for key in self.overlapping_keys(&range) {
            if let Some((stored, old)) = self.entries.remove(&key) {
                callback(stored, old);
            }
        }
        self.entries.insert(range.end(), (range, value));
    }

    /// Insert `(range, value)`, shrinking overlapping entries so that only
    /// their overlapping part is lost.
    ///
    /// `split` builds the value kept for each surviving piece of a trimmed
    /// entry, given the piece's range and the old value.
    pub fn trim_overlaps_and_emplace_with<F>(&mut self, range: AddressRange, value: V, mut split: F)
    where
        F: FnMut(AddressRange, &V) -> V,
    {
        assert!(!range.is_empty(), "cannot emplace empty range {range}");
        for key in self.overlapping_keys(&range) {
            let Some((stored, old)) = self.entries.remove(&key) else {
                continue;
            };
            if stored.start() < range.start() {
                let head = AddressRange::new(stored.start(), range.start());
                self.entries.insert(head.end(), (head, split(head, &old)));
            }
            if range.end() < stored.end() {
                let tail = AddressRange::new(range.end(), stored.end());
                self.entries.insert(tail.end(), (tail, split(tail, &old)));
            }
        }
        self.entries.insert(range.end(), (range, value));
    }

    fn first_overlap(&self, range: &AddressRange) -> Option<&AddressRange> {
        let (_, (stored, _)) = self.entries.range((Excluded(range.start()), Unbounded)).next()?;
        stored.overlaps(range).then_some(stored)
    }

    fn overlapping_keys(&self, range: &AddressRange) -> Vec<u64> {
        let mut keys = Vec::new();
        self.for_overlaps(range, |stored, _| keys.push(stored.end()));
        keys
    }
}

impl<V: Clone> AddressRangeMap<V> {
    /// `trim_overlaps_and_emplace_with` where trimmed pieces keep a copy of
    /// their original value.
    pub fn trim_overlaps_and_emplace(&mut self, range: AddressRange, value: V) {
        self.trim_overlaps_and_emplace_with(range, value, |_, old| old.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(start: u64, end: u64) -> AddressRange {
        AddressRange::new(start, end)
    }

    fn contents<V: Clone>(map: &AddressRangeMap<V>) -> Vec<(AddressRange, V)> {
        map.iter().map(|(r, v)| (*r, v.clone())).collect()
    }

    fn sample_map() -> AddressRangeMap<char> {
        let mut map = AddressRangeMap::new();
        assert!(map.emplace(r(0, 10), 'A'));
        assert!(map.emplace(r(10, 20), 'B'));
        assert!(map.emplace(r(25, 30), 'C'));
        map
    }

    #[test]
    fn test_emplace_rejects_overlap_and_empty() {
        let mut map = sample_map();
        assert!(!map.emplace(r(5, 6), 'X'));
        assert!(!map.emplace(r(19, 26), 'X'));
        assert!(!map.emplace(r(22, 22), 'X'));
        assert!(map.emplace(r(20, 25), 'D'));
        assert_eq!(map.len(), 4);
        assert_eq!(
            contents(&map),
            vec![(r(0, 10), 'A'), (r(10, 20), 'B'), (r(20, 25), 'D'), (r(25, 30), 'C')]
        );
    }

    #[test]
    fn test_find() {
        let map = sample_map();
        assert_eq!(map.find(0).map(|(_, v)| *v), Some('A'));
        assert_eq!(map.find(9).map(|(_, v)| *v), Some('A'));
        assert_eq!(map.find(10).map(|(_, v)| *v), Some('B'));
        assert!(map.find(20).is_none());
        assert!(map.find(24).is_none());
        assert_eq!(map.find(29).map(|(_, v)| *v), Some('C'));
        assert!(map.find(30).is_none());
        assert!(map.find(u64::MAX).is_none());
    }

    #[test]
    fn test_find_range_that_contains() {
        let map = sample_map();
        assert_eq!(map.find_range_that_contains(&r(2, 10)).map(|(_, v)| *v), Some('A'));
        assert_eq!(map.find_range_that_contains(&r(10, 11)).map(|(_, v)| *v), Some('B'));
        assert!(map.find_range_that_contains(&r(5, 15)).is_none());
        assert!(map.find_range_that_contains(&r(20, 25)).is_none());
    }

    #[test]
    #[should_panic]
    fn test_find_range_that_contains_empty_panics() {
        sample_map().find_range_that_contains(&r(3, 3));
    }

    #[test]
    fn test_for_overlaps() {
        let map = sample_map();
        let mut seen = Vec::new();
        map.for_overlaps(&r(9, 26), |_, v| seen.push(*v));
        assert_eq!(seen, vec!['A', 'B', 'C']);

        seen.clear();
        map.for_overlaps(&r(20, 25), |_, v| seen.push(*v));
        assert!(seen.is_empty());

        map.for_overlaps(&r(5, 5), |_, v| seen.push(*v));
        assert!(seen.is_empty());
    }

    #[test]
    fn test_delete_overlaps_and_emplace() {
        let mut map = sample_map();
        let mut deleted = Vec::new();
        map.delete_overlaps_and_emplace(|range, v| deleted.push((range, v)), r(5, 12), 'X');
        assert_eq!(deleted, vec![(r(0, 10), 'A'), (r(10, 20), 'B')]);
        assert_eq!(contents(&map), vec![(r(5, 12), 'X'), (r(25, 30), 'C')]);

        deleted.clear();
        map.delete_overlaps_and_emplace(|range, v| deleted.push((range, v)), r(12, 25), 'Y');
        assert!(deleted.is_empty());
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_trim_overlaps_and_emplace_keeps_remainders() {
        let mut map = sample_map();
        map.trim_overlaps_and_emplace(r(9, 10), 'X');
        assert_eq!(
            contents(&map),
            vec![(r(0, 9), 'A'), (r(9, 10), 'X'), (r(10, 20), 'B'), (r(25, 30), 'C')]
        );
    }

    #[test]
    fn test_trim_overlaps_splits_superset_entry() {
        let mut map = sample_map();
        map.trim_overlaps_and_emplace(r(12, 14), 'X');
        assert_eq!(
            contents(&map),
            vec![
                (r(0, 10), 'A'),
                (r(10, 12), 'B'),
                (r(12, 14), 'X'),
                (r(14, 20), 'B'),
                (r(25, 30), 'C')
            ]
        );

        map.trim_overlaps_and_emplace(r(0, 40), 'Z');
        assert_eq!(contents(&map), vec![(r(0, 40), 'Z')]);
    }

    #[test]
    fn test_trim_preserves_coverage() {
        let mut map = sample_map();
        map.trim_overlaps_and_emplace(r(8, 27), 'X');
        let covered: u64 = map.iter().map(|(r, _)| r.length()).sum();
        assert_eq!(covered, 30);
        let ranges: Vec<_> = map.iter().map(|(r, _)| *r).collect();
        for pair in ranges.windows(2) {
            assert!(!pair[0].overlaps(&pair[1]));
        }
    }

    #[test]
    fn test_trim_with_custom_split() {
        let mut map: AddressRangeMap<(u64, char)> = AddressRangeMap::new();
        map.emplace(r(0, 10), (0, 'A'));
        map.trim_overlaps_and_emplace_with(r(4, 6), (4, 'X'), |piece, old| (piece.start(), old.1));
        assert_eq!(
            contents(&map),
            vec![(r(0, 4), (0, 'A')), (r(4, 6), (4, 'X')), (r(6, 10), (6, 'A'))]
        );
    }
}
