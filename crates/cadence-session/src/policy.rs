//! The bottom-performer rule.
//!
//! After every match each participant's result is classified as "poor" or
//! not. How many of the lowest ranks count as poor depends on how many
//! players took part: in a 4-player match only last place is poor, in a
//! 16-player match the bottom four are.

use serde::{Deserialize, Serialize};

/// Thresholds that decide when a session is relegated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelegationPolicy {
    /// Consecutive poor results (and minimum matches played) before a
    /// session becomes eligible for relegation.
    pub threshold: u32,

    /// Relegation never fires while fewer connected, non-relegated
    /// sessions than this exist.
    pub min_players: usize,

    /// `(min_total_players, bottom_count)` tiers, ascending by
    /// `min_total_players`. The active tier is the last one whose boundary
    /// does not exceed the match size.
    pub tiers: Vec<(usize, usize)>,
}

impl Default for RelegationPolicy {
    fn default() -> Self {
        Self {
            threshold: 3,
            min_players: 4,
            // (16, 4) repeats (12, 4) on purpose: the published tier table
            // lists both, and tuning one should not silently move the other.
            tiers: vec![(4, 1), (6, 2), (8, 3), (12, 4), (16, 4)],
        }
    }
}

impl RelegationPolicy {
    /// How many of the lowest ranks count as poor in a match of
    /// `total_players`. Defaults to 1 below the first tier.
    pub fn bottom_count(&self, total_players: usize) -> usize {
        self.tiers
            .iter()
            .filter(|(boundary, _)| *boundary <= total_players)
            .max_by_key(|(boundary, _)| *boundary)
            .map(|(_, bottom)| *bottom)
            .unwrap_or(1)
    }

    /// Whether `rank` (1 = best) is a poor result in a match of
    /// `total_players`.
    pub fn is_poor(&self, rank: u32, total_players: usize) -> bool {
        let bottom = self.bottom_count(total_players);
        let cutoff = (total_players + 1).saturating_sub(bottom);
        rank as usize >= cutoff
    }
}
