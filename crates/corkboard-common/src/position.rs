//! Fractional positions for ordered board entities.
//!
//! Columns, cards, checklists and checklist items are ordered by a real-valued
//! `position` among their siblings. Inserting between two neighbours takes the
//! midpoint, so no sibling needs renumbering. Repeated midpoint insertion
//! between the same pair eventually runs out of room; once the gap drops below
//! [`PositionAllocator::epsilon`] the allocator reports [`PrecisionExhausted`]
//! and the caller rebalances the whole sibling set with [`PositionAllocator::rebalance`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Position given to the first element of an empty list, and the spacing
/// used for tail inserts and rebalancing.
pub const BASELINE_STEP: f64 = 65536.0;

/// Smallest gap between neighbours the allocator will still split.
pub const DEFAULT_EPSILON: f64 = 1e-6;

/// The gap between two neighbours is too small to place a new element.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("No room between positions {prev:?} and {next:?}; siblings need rebalancing")]
pub struct PrecisionExhausted {
    pub prev: Option<f64>,
    pub next: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionAllocator {
    pub step: f64,
    pub epsilon: f64,
}

impl Default for PositionAllocator {
    fn default() -> Self {
        Self {
            step: BASELINE_STEP,
            epsilon: DEFAULT_EPSILON,
        }
    }
}

impl PositionAllocator {
    pub fn new(step: f64, epsilon: f64) -> Self {
        Self { step, epsilon }
    }

    /// Compute a position strictly between `prev` and `next`.
    ///
    /// `None` on either side means the new element goes at that end of the list.
    pub fn allocate(&self, prev: Option<f64>, next: Option<f64>) -> Result<f64, PrecisionExhausted> {
        let exhausted = PrecisionExhausted { prev, next };
        match (prev, next) {
            (None, None) => Ok(self.step),
            (None, Some(next)) => {
                if next > self.step || next <= 0.0 {
                    let candidate = next - self.step;
                    if candidate < next {
                        return Ok(candidate);
                    }
                }
                let half = next / 2.0;
                if next - half < self.epsilon || half >= next {
                    return Err(exhausted);
                }
                Ok(half)
            }
            (Some(prev), None) => {
                let candidate = prev + self.step;
                if candidate > prev {
                    Ok(candidate)
                } else {
                    Err(exhausted)
                }
            }
            (Some(prev), Some(next)) => {
                if next - prev < self.epsilon {
                    return Err(exhausted);
                }
                let mid = prev + (next - prev) / 2.0;
                if prev < mid && mid < next {
                    Ok(mid)
                } else {
                    Err(exhausted)
                }
            }
        }
    }

    /// Fresh, evenly spaced positions for `count` siblings, in their current order.
    pub fn rebalance(&self, count: usize) -> Vec<f64> {
        (1..=count).map(|i| self.step * i as f64).collect()
    }

    /// Position for inserting at `index` into an already-sorted sibling list.
    ///
    /// An `index` past the end appends.
    pub fn place(&self, siblings: &[f64], index: usize) -> Result<f64, PrecisionExhausted> {
        let index = index.min(siblings.len());
        let prev = index.checked_sub(1).map(|i| siblings[i]);
        let next = siblings.get(index).copied();
        self.allocate(prev, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_gets_baseline() {
        let alloc = PositionAllocator::default();
        assert_eq!(alloc.allocate(None, None), Ok(65536.0));
    }

    #[test]
    fn tail_insert_adds_one_step() {
        let alloc = PositionAllocator::default();
        assert_eq!(alloc.allocate(Some(65536.0), None), Ok(131072.0));
    }

    #[test]
    fn head_insert_subtracts_step_when_room() {
        let alloc = PositionAllocator::default();
        assert_eq!(alloc.allocate(None, Some(131072.0)), Ok(65536.0));
    }

    #[test]
    fn head_insert_halves_small_positions() {
        let alloc = PositionAllocator::default();
        assert_eq!(alloc.allocate(None, Some(65536.0)), Ok(32768.0));
        assert_eq!(alloc.allocate(None, Some(10.0)), Ok(5.0));
    }

    #[test]
    fn head_insert_before_non_positive_stays_below() {
        let alloc = PositionAllocator::default();
        let p = alloc.allocate(None, Some(0.0)).unwrap();
        assert!(p < 0.0);
        let p = alloc.allocate(None, Some(-5.0)).unwrap();
        assert!(p < -5.0);
    }

    #[test]
    fn head_insert_reports_exhaustion_near_zero() {
        let alloc = PositionAllocator::default();
        assert!(alloc.allocate(None, Some(1e-7)).is_err());
    }

    #[test]
    fn between_insert_is_midpoint() {
        let alloc = PositionAllocator::default();
        assert_eq!(alloc.allocate(Some(65536.0), Some(131072.0)), Ok(98304.0));
    }

    #[test]
    fn repeated_midpoints_stay_strictly_between_until_exhausted() {
        let alloc = PositionAllocator::default();
        let lower = 65536.0;
        let mut upper = 131072.0;
        let mut inserted = 0;
        loop {
            match alloc.allocate(Some(lower), Some(upper)) {
                Ok(p) => {
                    assert!(lower < p && p < upper, "{} not in ({}, {})", p, lower, upper);
                    upper = p;
                    inserted += 1;
                }
                Err(e) => {
                    assert_eq!(e.prev, Some(lower));
                    break;
                }
            }
            assert!(inserted < 200, "allocator never reported exhaustion");
        }
        // 65536 / 2^n < 1e-6 first holds at n = 36
        assert!(inserted >= 30, "only {} insertions before exhaustion", inserted);
    }

    #[test]
    fn equal_or_inverted_neighbours_need_rebalance() {
        let alloc = PositionAllocator::default();
        assert!(alloc.allocate(Some(5.0), Some(5.0)).is_err());
        assert!(alloc.allocate(Some(6.0), Some(5.0)).is_err());
    }

    #[test]
    fn rebalance_preserves_order() {
        let alloc = PositionAllocator::default();
        let before = [1.0, 1.0 + 1e-9, 1.0 + 2e-9];
        let after = alloc.rebalance(before.len());
        assert_eq!(after, vec![65536.0, 131072.0, 196608.0]);
        assert!(after.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn place_uses_neighbours_at_index() {
        let alloc = PositionAllocator::default();
        let siblings = [65536.0, 131072.0];
        assert_eq!(alloc.place(&siblings, 0), Ok(32768.0));
        assert_eq!(alloc.place(&siblings, 1), Ok(98304.0));
        assert_eq!(alloc.place(&siblings, 2), Ok(196608.0));
        assert_eq!(alloc.place(&siblings, 99), Ok(196608.0));
        assert_eq!(alloc.place(&[], 0), Ok(65536.0));
    }

    #[test]
    fn custom_step_and_epsilon() {
        let alloc = PositionAllocator::new(10.0, 0.5);
        assert_eq!(alloc.allocate(None, None), Ok(10.0));
        assert_eq!(alloc.allocate(Some(1.0), Some(2.0)), Ok(1.5));
        assert!(alloc.allocate(Some(1.0), Some(1.4)).is_err());
    }
}
