use crate::cache::ResponseSource;
use ratatui::prelude::Color;

/// Truncate to at most `max_len` characters, ending in "..." if cut
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Display color for where a response came from
pub fn source_color(source: ResponseSource) -> Color {
  match source {
    ResponseSource::Cache => Color::Green,
    ResponseSource::Network => Color::White,
    ResponseSource::OfflineFallback => Color::Yellow,
    ResponseSource::Unavailable => Color::Red,
  }
}
