//! Initiative dice.
//!
//! Ilaris initiative adds a single d6, or two d6 of which the operator keeps
//! one. This module rolls the dice and turns a roll into its contribution.

use crate::host::DiceRoller;
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Sides of the initiative die.
pub const INITIATIVE_DIE_SIDES: u32 = 6;

/// Error type for dice selection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiceError {
    #[error("Die index {index} out of range for {rolled} rolled dice")]
    IndexOutOfRange { index: usize, rolled: usize },
    #[error("Nothing to choose: only {0} die rolled")]
    NoChoice(usize),
    #[error("No dice rolled yet")]
    NotRolled,
}

/// How many dice the operator rolls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DiceCount {
    #[default]
    One,
    Two,
}

impl DiceCount {
    pub fn count(&self) -> usize {
        match self {
            DiceCount::One => 1,
            DiceCount::Two => 2,
        }
    }

    pub fn from_count(count: usize) -> Option<DiceCount> {
        match count {
            1 => Some(DiceCount::One),
            2 => Some(DiceCount::Two),
            _ => None,
        }
    }

    /// Two dice require an explicit pick before committing.
    pub fn requires_selection(&self) -> bool {
        matches!(self, DiceCount::Two)
    }
}

impl fmt::Display for DiceCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d{}", self.count(), INITIATIVE_DIE_SIDES)
    }
}

/// Roll a single d6 with a specific RNG (useful for testing).
pub fn roll_d6_with_rng<R: Rng>(rng: &mut R) -> u32 {
    rng.gen_range(1..=INITIATIVE_DIE_SIDES)
}

/// Roll `count` dice through the host's randomness source, one call per die.
pub async fn roll_pool<D: DiceRoller + ?Sized>(roller: &D, count: DiceCount) -> Vec<u32> {
    let mut results = Vec::with_capacity(count.count());
    for _ in 0..count.count() {
        results.push(roller.roll_d6().await);
    }
    results
}

/// The value a roll adds to initiative.
///
/// The chosen die when one was picked, otherwise the first die; 0 before
/// any roll. An index pointing past the results falls back to the first die.
pub fn dice_contribution(results: &[u32], selected: Option<usize>) -> i32 {
    selected
        .and_then(|i| results.get(i))
        .or_else(|| results.first())
        .map(|v| i32::try_from(*v).unwrap_or(i32::MAX))
        .unwrap_or(0)
}

/// Format rolled dice for display, wrapping dropped dice in parentheses.
pub fn dice_display(results: &[u32], selected: Option<usize>) -> String {
    if results.is_empty() {
        return "-".to_string();
    }
    let shown: Vec<String> = results
        .iter()
        .enumerate()
        .map(|(i, v)| match selected {
            Some(s) if results.len() > 1 && s != i => format!("({v})"),
            _ => v.to_string(),
        })
        .collect();
    format!("[{}]", shown.join(", "))
}

/// Randomness source backed by the thread RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngDice;

#[async_trait]
impl DiceRoller for ThreadRngDice {
    async fn roll_d6(&self) -> u32 {
        roll_d6_with_rng(&mut rand::thread_rng())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_roll_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let v = roll_d6_with_rng(&mut rng);
            assert!((1..=6).contains(&v));
        }
    }

    #[test]
    fn test_contribution_prefers_selection() {
        assert_eq!(dice_contribution(&[], None), 0);
        assert_eq!(dice_contribution(&[4], None), 4);
        assert_eq!(dice_contribution(&[2, 5], Some(1)), 5);
        assert_eq!(dice_contribution(&[2, 5], None), 2);
        // stale index falls back to the first die
        assert_eq!(dice_contribution(&[3], Some(1)), 3);
    }

    #[test]
    fn test_dice_display_marks_dropped() {
        assert_eq!(dice_display(&[], None), "-");
        assert_eq!(dice_display(&[4], Some(0)), "[4]");
        assert_eq!(dice_display(&[2, 5], Some(1)), "[(2), 5]");
        assert_eq!(dice_display(&[2, 5], None), "[2, 5]");
    }

    #[test]
    fn test_dice_count() {
        assert_eq!(DiceCount::from_count(2), Some(DiceCount::Two));
        assert_eq!(DiceCount::from_count(3), None);
        assert!(DiceCount::Two.requires_selection());
        assert!(!DiceCount::One.requires_selection());
        assert_eq!(DiceCount::Two.to_string(), "2d6");
    }

    #[tokio::test]
    async fn test_thread_rng_dice_in_range() {
        let roller = ThreadRngDice;
        let pool = roll_pool(&roller, DiceCount::Two).await;
        assert_eq!(pool.len(), 2);
        assert!(pool.iter().all(|v| (1..=6).contains(v)));
    }
}
