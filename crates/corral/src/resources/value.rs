use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::resources::amount::ResourceAmount;
use crate::resources::ResourceError;

/// Set of disjoint, closed integer intervals, kept sorted and merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RangeSet {
    ranges: SmallVec<[(u64, u64); 2]>,
}

impl RangeSet {
    pub fn new<I: IntoIterator<Item = (u64, u64)>>(pairs: I) -> Self {
        let mut ranges: SmallVec<[(u64, u64); 2]> = pairs
            .into_iter()
            .filter(|(begin, end)| begin <= end)
            .collect();
        ranges.sort_unstable();

        let mut merged: SmallVec<[(u64, u64); 2]> = SmallVec::new();
        for (begin, end) in ranges {
            match merged.last_mut() {
                // Merges overlapping and adjacent intervals, e.g. [1-3] and [4-5]
                Some((_, last_end)) if begin <= last_end.saturating_add(1) => {
                    *last_end = (*last_end).max(end);
                }
                _ => merged.push((begin, end)),
            }
        }
        RangeSet { ranges: merged }
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Number of integers covered.
    pub fn size(&self) -> u64 {
        self.ranges.iter().map(|(b, e)| e - b + 1).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.ranges.iter().copied()
    }

    pub fn is_superset(&self, other: &RangeSet) -> bool {
        other
            .iter()
            .all(|(begin, end)| self.iter().any(|(b, e)| b <= begin && end <= e))
    }

    pub fn union(&self, other: &RangeSet) -> RangeSet {
        RangeSet::new(self.iter().chain(other.iter()))
    }

    /// Removes `other` from `self`; `None` when `other` is not fully contained.
    pub fn checked_subtract(&self, other: &RangeSet) -> Option<RangeSet> {
        if !self.is_superset(other) {
            return None;
        }
        let mut result: SmallVec<[(u64, u64); 2]> = SmallVec::new();
        for (begin, end) in self.iter() {
            let mut cursor = Some(begin);
            for (rb, re) in other.iter().filter(|(rb, re)| *rb <= end && *re >= begin) {
                if let Some(c) = cursor {
                    if rb > c {
                        result.push((c, rb - 1));
                    }
                }
                cursor = re.checked_add(1);
            }
            if let Some(c) = cursor {
                if c <= end {
                    result.push((c, end));
                }
            }
        }
        Some(RangeSet { ranges: result })
    }
}

impl std::fmt::Display for RangeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, (begin, end)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{begin}-{end}")?;
        }
        write!(f, "]")
    }
}

/// Quantity carried by a resource: a scalar, disjoint integer intervals,
/// or a set of distinct items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceValue {
    Scalar(ResourceAmount),
    Ranges(RangeSet),
    Items(BTreeSet<String>),
}

impl ResourceValue {
    pub fn kind(&self) -> &'static str {
        match self {
            ResourceValue::Scalar(_) => "SCALAR",
            ResourceValue::Ranges(_) => "RANGES",
            ResourceValue::Items(_) => "SET",
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ResourceValue::Scalar(amount) => amount.is_zero(),
            ResourceValue::Ranges(ranges) => ranges.is_empty(),
            ResourceValue::Items(items) => items.is_empty(),
        }
    }

    /// Sufficiency: scalars compare by `>=`, ranges and sets by inclusion.
    /// Values of different kinds never contain each other.
    pub fn contains(&self, other: &ResourceValue) -> bool {
        match (self, other) {
            (ResourceValue::Scalar(a), ResourceValue::Scalar(b)) => a >= b,
            (ResourceValue::Ranges(a), ResourceValue::Ranges(b)) => a.is_superset(b),
            (ResourceValue::Items(a), ResourceValue::Items(b)) => a.is_superset(b),
            _ => false,
        }
    }

    pub(crate) fn merge(&mut self, name: &str, other: &ResourceValue) -> Result<(), ResourceError> {
        match (self, other) {
            (ResourceValue::Scalar(a), ResourceValue::Scalar(b)) => {
                *a += *b;
                Ok(())
            }
            (ResourceValue::Ranges(a), ResourceValue::Ranges(b)) => {
                *a = a.union(b);
                Ok(())
            }
            (ResourceValue::Items(a), ResourceValue::Items(b)) => {
                a.extend(b.iter().cloned());
                Ok(())
            }
            (left, _) => Err(ResourceError::KindMismatch {
                name: name.to_string(),
                left: left.kind(),
                right: other.kind(),
            }),
        }
    }

    pub(crate) fn checked_subtract(
        &self,
        name: &str,
        other: &ResourceValue,
    ) -> Result<ResourceValue, ResourceError> {
        let underflow = || ResourceError::QuantityUnderflow {
            name: name.to_string(),
            minuend: self.to_string(),
            subtrahend: other.to_string(),
        };
        match (self, other) {
            (ResourceValue::Scalar(a), ResourceValue::Scalar(b)) => a
                .checked_sub(*b)
                .map(ResourceValue::Scalar)
                .ok_or_else(underflow),
            (ResourceValue::Ranges(a), ResourceValue::Ranges(b)) => a
                .checked_subtract(b)
                .map(ResourceValue::Ranges)
                .ok_or_else(underflow),
            (ResourceValue::Items(a), ResourceValue::Items(b)) => {
                if !a.is_superset(b) {
                    return Err(underflow());
                }
                Ok(ResourceValue::Items(a.difference(b).cloned().collect()))
            }
            (left, _) => Err(ResourceError::KindMismatch {
                name: name.to_string(),
                left: left.kind(),
                right: other.kind(),
            }),
        }
    }
}

impl std::fmt::Display for ResourceValue {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ResourceValue::Scalar(amount) => write!(f, "{amount}"),
            ResourceValue::Ranges(ranges) => write!(f, "{ranges}"),
            ResourceValue::Items(items) => {
                write!(f, "{{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "}}")
            }
        }
    }
}
