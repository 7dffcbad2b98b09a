//! Half-open address ranges

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error returned when building a range from untrusted bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("range start {start:#x} is past its end {end:#x}")]
    Inverted { start: u64, end: u64 },

    #[error("range starting at {start:#x} with size {size:#x} overflows the address space")]
    Overflow { start: u64, size: u64 },
}

/// A `[start, end)` interval over the 64-bit address space.
///
/// `end` is exclusive, so a range can never cover the very last address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressRange {
    start: u64,
    end: u64,
}

impl AddressRange {
    /// Create a range, panicking if `start > end`.
    pub fn new(start: u64, end: u64) -> Self {
        assert!(start <= end, "invalid address range [{start:#x}, {end:#x})");
        Self { start, end }
    }

    /// Create a range from bounds that come from trace data.
    pub fn try_new(start: u64, end: u64) -> Result<Self, RangeError> {
        if start > end {
            return Err(RangeError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn from_start_and_size(start: u64, size: u64) -> Result<Self, RangeError> {
        let end = start
            .checked_add(size)
            .ok_or(RangeError::Overflow { start, size })?;
        Ok(Self { start, end })
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn length(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True if `addr` lies inside the range. Always false for empty ranges.
    pub fn contains(&self, addr: u64) -> bool {
        self.start <= addr && addr < self.end
    }

    /// True if `other` lies entirely inside this range.
    pub fn contains_range(&self, other: &AddressRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// The overlapping part of both ranges, or the empty range `(0, 0)`.
    pub fn intersect_with(&self, other: &AddressRange) -> AddressRange {
        if !self.overlaps(other) {
            return AddressRange::default();
        }
        AddressRange {
            start: self.start.max(other.start),
            end: self.end.min(other.end),
        }
    }

    /// False whenever either range is empty, even if they touch.
    pub fn overlaps(&self, other: &AddressRange) -> bool {
        !self.is_empty() && !other.is_empty() && self.start < other.end && other.start < self.end
    }
}

impl PartialOrd for AddressRange {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AddressRange {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.start, self.end).cmp(&(other.start, other.end))
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x})", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_self_only_when_non_empty() {
        let r = AddressRange::new(10, 20);
        assert!(r.contains_range(&r));
        assert!(r.contains(10));
        assert!(r.contains(19));
        assert!(!r.contains(20));

        let empty = AddressRange::new(5, 5);
        assert!(!empty.contains(5));
        assert!(r.contains_range(&AddressRange::new(12, 12)));
    }

    #[test]
    #[should_panic]
    fn test_inverted_range_panics() {
        AddressRange::new(2, 1);
    }

    #[test]
    fn test_try_new_rejects_inverted() {
        assert_eq!(
            AddressRange::try_new(2, 1),
            Err(RangeError::Inverted { start: 2, end: 1 })
        );
        assert!(AddressRange::from_start_and_size(u64::MAX, 1).is_err());
        assert_eq!(
            AddressRange::from_start_and_size(0x1000, 0x10).unwrap(),
            AddressRange::new(0x1000, 0x1010)
        );
    }

    #[test]
    fn test_intersect_is_symmetric() {
        let cases = [
            (AddressRange::new(0, 10), AddressRange::new(5, 15)),
            (AddressRange::new(0, 10), AddressRange::new(10, 20)),
            (AddressRange::new(3, 4), AddressRange::new(0, 100)),
            (AddressRange::new(7, 7), AddressRange::new(0, 10)),
        ];
        for (a, b) in cases {
            assert_eq!(a.intersect_with(&b), b.intersect_with(&a));
            assert_eq!(a.overlaps(&b), !a.intersect_with(&b).is_empty());
        }
        assert_eq!(
            AddressRange::new(0, 10).intersect_with(&AddressRange::new(5, 15)),
            AddressRange::new(5, 10)
        );
    }

    #[test]
    fn test_touching_ranges_do_not_overlap() {
        let a = AddressRange::new(0, 10);
        let b = AddressRange::new(10, 20);
        assert!(!a.overlaps(&b));
        assert_eq!(a.intersect_with(&b), AddressRange::new(0, 0));
    }
}
