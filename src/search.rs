//! Client-side filtering of post cards.
//!
//! Linear scan on every keystroke; the feed holds tens of cards.

use crate::site::types::PostCard;

/// Normalize a raw query the way the search box does.
pub fn normalize_query(query: &str) -> String {
  query.trim().to_lowercase()
}

/// Whether a card matches an already-normalized term.
///
/// Returns `None` when the card lacks its title or text, in which case
/// the filter leaves the card alone.
pub fn card_matches(card: &PostCard, term: &str) -> Option<bool> {
  let title = card.title.as_deref()?.to_lowercase();
  let text = card.text.as_deref()?.to_lowercase();
  Some(title.contains(term) || text.contains(term))
}

/// Recompute card visibility for `query`.
///
/// `visible` holds one flag per card and is updated in place. An empty
/// query shows every complete card.
pub fn apply_filter(cards: &[PostCard], visible: &mut [bool], query: &str) {
  let term = normalize_query(query);
  for (card, shown) in cards.iter().zip(visible.iter_mut()) {
    if let Some(matched) = card_matches(card, &term) {
      *shown = matched;
    }
  }
}

/// Indices of the currently visible cards.
pub fn visible_indices(visible: &[bool]) -> Vec<usize> {
  visible
    .iter()
    .enumerate()
    .filter_map(|(i, shown)| shown.then_some(i))
    .collect()
}
