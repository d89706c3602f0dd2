//! Winner selection

use rand::{seq::index, Rng};

use crate::Competitor;

/// Draws `min(winner_count, competitors.len())` distinct competitors uniformly
/// without replacement and returns their participant ids in draw order.
///
/// Every competitor has the same chance of winning regardless of when they
/// joined; join order only matters for display.
pub fn select_winners<R: Rng + ?Sized>(
    competitors: &[Competitor],
    winner_count: u32,
    rng: &mut R,
) -> Vec<String> {
    let amount = (winner_count as usize).min(competitors.len());
    if amount == 0 {
        return vec![];
    }

    index::sample(rng, competitors.len(), amount)
        .into_iter()
        .map(|i| competitors[i].participant_id.clone())
        .collect()
}
