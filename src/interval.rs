use std::cmp::{max, min};
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Half-open interval `[begin, end)`
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub begin: usize,
    pub end: usize,
}

impl Interval {
    pub fn new(begin: usize, end: usize) -> Self {
        Interval { begin, end: max(begin, end) }
    }

    pub fn empty() -> Self {
        Interval { begin: 0, end: 0 }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    #[inline]
    pub fn contains(&self, pos: usize) -> bool {
        pos >= self.begin && pos < self.end
    }

    /// Smallest interval covering both. Empty intervals are ignored.
    pub fn union(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }

        if other.is_empty() {
            return *self;
        }

        Interval::new(min(self.begin, other.begin), max(self.end, other.end))
    }

    pub fn intersect(&self, other: &Self) -> Self {
        let begin = max(self.begin, other.begin);
        let end = min(self.end, other.end);

        if begin >= end {
            Interval::empty()
        } else {
            Interval::new(begin, end)
        }
    }

    /// Extend the end by one position, never beyond `upper_bound`
    pub fn next(&self, upper_bound: usize) -> Self {
        if self.is_empty() {
            return *self;
        }

        Interval::new(self.begin, min(self.end + 1, upper_bound))
    }

    /// Extend the start by one position, never below `lower_bound`
    pub fn prev(&self, lower_bound: usize) -> Self {
        if self.is_empty() {
            return *self;
        }

        Interval::new(max(self.begin.saturating_sub(1), lower_bound), self.end)
    }
}

impl Display for Interval {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.begin, self.end)
    }
}

/// Hull of all given intervals
pub fn range_union<'a>(intervals: impl IntoIterator<Item = &'a Interval>) -> Interval {
    intervals.into_iter()
        .fold(Interval::empty(), |acc, ival| acc.union(ival))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_ignores_empty() {
        let a = Interval::new(3, 7);
        let b = Interval::new(5, 12);

        assert_eq!(a.union(&b), Interval::new(3, 12));
        assert_eq!(a.union(&Interval::empty()), a);
        assert_eq!(Interval::empty().union(&b), b);
        assert_eq!(range_union(&[a, Interval::empty(), b]), Interval::new(3, 12));
        assert!(range_union(&[]).is_empty());
    }

    #[test]
    fn test_stepping() {
        let ival = Interval::new(4, 10);

        assert_eq!(ival.next(20), Interval::new(4, 11));
        assert_eq!(ival.next(10), Interval::new(4, 10));
        assert_eq!(ival.prev(0), Interval::new(3, 10));
        assert_eq!(Interval::new(0, 2).prev(0), Interval::new(0, 2));
        assert!(Interval::empty().next(5).is_empty());
    }

    #[test]
    fn test_intersect() {
        let a = Interval::new(3, 7);
        assert_eq!(a.intersect(&Interval::new(5, 9)), Interval::new(5, 7));
        assert!(a.intersect(&Interval::new(7, 9)).is_empty());
        assert!(a.contains(3));
        assert!(!a.contains(7));
    }
}
