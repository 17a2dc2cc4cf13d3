//! Integer sort keys for the blocks of a page
//!
//! Positions live in a 16-bit range. New keys are picked strictly between an
//! anchor and its successor so that inserting never renumbers siblings. When
//! no integer is free at the requested spot the caller redistributes the whole
//! page (see [`PositionAllocator::redistributed`]) and asks once more.

/// Smallest storable position
pub const MIN_POSITION: i32 = 0;

/// Largest storable position
pub const MAX_POSITION: i32 = i16::MAX as i32;

/// Position given to the first block of an empty page
pub const DEFAULT_POSITION: i32 = 100;

/// Distance kept after the last block when appending
pub const POSITION_STEP: i32 = 100;

/// Redistributed positions span this fraction of the range...
const SPREAD_START: f64 = 0.1;

/// ...up to this fraction
const SPREAD_END: f64 = 0.9;

/// Outcome of asking for a position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allocation {
    /// A free position at the requested spot
    At(i32),

    /// No integer is free; redistribute the page and ask again
    Redistribute,
}

/// Calculates positions for inserting a block among its siblings
pub struct PositionAllocator;

impl PositionAllocator {
    /// Pick a position after `positions[anchor]`, or before every block when
    /// `anchor` is `None`
    ///
    /// `positions` must be sorted ascending and hold every sibling of the
    /// block being placed.
    ///
    /// # Examples
    /// ```
    /// use pagetree_core::db::{Allocation, PositionAllocator};
    ///
    /// // Empty page
    /// assert_eq!(PositionAllocator::position_after(&[], None), Allocation::At(100));
    ///
    /// // Before the first block
    /// assert_eq!(PositionAllocator::position_after(&[40, 90], None), Allocation::At(20));
    ///
    /// // Between two blocks
    /// assert_eq!(PositionAllocator::position_after(&[40, 90], Some(0)), Allocation::At(65));
    ///
    /// // No room between 40 and 41
    /// assert_eq!(PositionAllocator::position_after(&[40, 41], Some(0)), Allocation::Redistribute);
    /// ```
    pub fn position_after(positions: &[i32], anchor: Option<usize>) -> Allocation {
        match anchor {
            None => match positions.first() {
                None => Allocation::At(DEFAULT_POSITION),
                Some(&min) if min > MIN_POSITION => Allocation::At(min / 2),
                Some(_) => Allocation::Redistribute,
            },
            Some(index) => {
                let anchor = positions[index];
                match positions.get(index + 1) {
                    None if anchor < MAX_POSITION => {
                        Allocation::At((anchor + POSITION_STEP).min(MAX_POSITION))
                    }
                    None => Allocation::Redistribute,
                    Some(&next) if next - anchor >= 2 => Allocation::At((anchor + next) / 2),
                    Some(_) => Allocation::Redistribute,
                }
            }
        }
    }

    /// Distance between neighbours after redistributing `count` blocks
    pub fn redistribution_gap(count: usize) -> i32 {
        if count == 0 {
            return 0;
        }
        let span = f64::from(MAX_POSITION) * (SPREAD_END - SPREAD_START);
        (span / count as f64) as i32
    }

    /// Whether `count` blocks fit the spread with distinct positions
    pub fn can_redistribute(count: usize) -> bool {
        count <= 1 || Self::redistribution_gap(count) >= 1
    }

    /// Evenly spaced positions for `count` blocks, spanning 10%-90% of the range
    ///
    /// Only meaningful when [`can_redistribute`](Self::can_redistribute) holds;
    /// beyond that every target collapses onto the same position.
    ///
    /// # Example
    /// Input:  3
    /// Output: [3276, 12013, 20750]
    pub fn redistributed(count: usize) -> Vec<i32> {
        let start = (f64::from(MAX_POSITION) * SPREAD_START) as i32;
        let gap = Self::redistribution_gap(count);
        (0..count).map(|i| start + gap * i as i32).collect()
    }

    /// Whether any neighbouring pair has no integer free between them
    pub fn needs_redistribution(positions: &[i32]) -> bool {
        positions.windows(2).any(|pair| pair[1] - pair[0] < 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_block_gets_default_position() {
        assert_eq!(
            PositionAllocator::position_after(&[], None),
            Allocation::At(DEFAULT_POSITION)
        );
    }

    #[test]
    fn test_before_first_halves_minimum() {
        assert_eq!(
            PositionAllocator::position_after(&[1], None),
            Allocation::At(0)
        );
    }

    #[test]
    fn test_before_first_at_zero_needs_redistribution() {
        assert_eq!(
            PositionAllocator::position_after(&[0, 5], None),
            Allocation::Redistribute
        );
    }

    #[test]
    fn test_between_blocks_uses_midpoint() {
        assert_eq!(
            PositionAllocator::position_after(&[0, 2], Some(0)),
            Allocation::At(1)
        );
    }

    #[test]
    fn test_adjacent_blocks_need_redistribution() {
        assert_eq!(
            PositionAllocator::position_after(&[0, 1], Some(0)),
            Allocation::Redistribute
        );
    }

    #[test]
    fn test_after_last_adds_step() {
        assert_eq!(
            PositionAllocator::position_after(&[0, 10], Some(1)),
            Allocation::At(110)
        );
    }

    #[test]
    fn test_after_last_is_clamped_to_maximum() {
        assert_eq!(
            PositionAllocator::position_after(&[MAX_POSITION - 10], Some(0)),
            Allocation::At(MAX_POSITION)
        );
        assert_eq!(
            PositionAllocator::position_after(&[MAX_POSITION], Some(0)),
            Allocation::Redistribute
        );
    }

    #[test]
    fn test_redistributed_spacing() {
        let positions = PositionAllocator::redistributed(3);
        assert_eq!(positions.len(), 3);
        assert!(positions[0] > MIN_POSITION);
        assert!(*positions.last().unwrap() <= (f64::from(MAX_POSITION) * 0.9) as i32);
        assert!(!PositionAllocator::needs_redistribution(&positions));
        assert_eq!(positions[1] - positions[0], positions[2] - positions[1]);
    }

    #[test]
    fn test_redistribution_always_frees_room() {
        for count in [1usize, 2, 7, 100, 5000] {
            let positions = PositionAllocator::redistributed(count);

            assert!(matches!(
                PositionAllocator::position_after(&positions, None),
                Allocation::At(_)
            ));
            assert!(matches!(
                PositionAllocator::position_after(&positions, Some(count - 1)),
                Allocation::At(_)
            ));
            if count > 1 {
                assert!(matches!(
                    PositionAllocator::position_after(&positions, Some(0)),
                    Allocation::At(_)
                ));
            }
        }
    }

    #[test]
    fn test_can_redistribute_up_to_one_position_per_block() {
        let span = (f64::from(MAX_POSITION) * 0.8) as usize;

        assert!(PositionAllocator::can_redistribute(0));
        assert!(PositionAllocator::can_redistribute(1));
        assert!(PositionAllocator::can_redistribute(span));
        assert!(!PositionAllocator::can_redistribute(span + 1));
        assert!(!PositionAllocator::can_redistribute(27_000));

        let positions = PositionAllocator::redistributed(span);
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_redistributed_empty() {
        assert!(PositionAllocator::redistributed(0).is_empty());
    }

    #[test]
    fn test_needs_redistribution() {
        assert!(!PositionAllocator::needs_redistribution(&[1, 3, 5]));
        assert!(PositionAllocator::needs_redistribution(&[1, 2, 5]));
    }
}
