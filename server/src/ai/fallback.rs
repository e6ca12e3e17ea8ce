//! Scripted move choice used when the suggestion service gives up.
//!
//! Candidates are grouped by priority: captures, then checks, then castling,
//! then moves landing on the four central squares, then anything. The first
//! non-empty group wins and a move is drawn uniformly from it.

use crate::rules::LegalMove;
use rand::seq::SliceRandom;
use rand::Rng;

pub const CENTER_SQUARES: [&str; 4] = ["d4", "e4", "d5", "e5"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackCategory {
    Capture,
    Check,
    Castle,
    Center,
    Any,
}

/// Returns the highest-priority non-empty group of moves.
pub fn fallback_candidates(legal: &[LegalMove]) -> (FallbackCategory, Vec<&LegalMove>) {
    let tiers: [(FallbackCategory, fn(&LegalMove) -> bool); 4] = [
        (FallbackCategory::Capture, |m| m.is_capture),
        (FallbackCategory::Check, |m| m.is_check),
        (FallbackCategory::Castle, |m| m.is_castle),
        (FallbackCategory::Center, |m| {
            CENTER_SQUARES.contains(&m.to.as_str())
        }),
    ];

    for (category, keep) in tiers {
        let group: Vec<&LegalMove> = legal.iter().filter(|m| keep(*m)).collect();
        if !group.is_empty() {
            return (category, group);
        }
    }

    (FallbackCategory::Any, legal.iter().collect())
}

/// `None` only when there are no legal moves, i.e. the game is over.
pub fn choose_fallback_move<'a, R: Rng + ?Sized>(
    legal: &'a [LegalMove],
    rng: &mut R,
) -> Option<&'a LegalMove> {
    let (_, group) = fallback_candidates(legal);
    group.choose(rng).copied()
}
