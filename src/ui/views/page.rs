use crate::cache::{CacheStorage, ResponseSource};
use crate::query::{Query, QueryState};
use crate::site::BlogClient;
use crate::ui::renderfns::source_color;
use crate::ui::view::{Shortcut, View, ViewAction};
use crate::worker::FetchOutcome;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

/// A page of the site, loaded as a navigation through the worker
pub struct PageView {
  path: String,
  title: String,
  query: Query<FetchOutcome>,
  scroll: u16,
}

impl PageView {
  pub fn new(client: BlogClient<dyn CacheStorage>, path: String, title: String) -> Self {
    let page = path.clone();
    let mut query = Query::new(move || {
      let client = client.clone();
      let page = page.clone();
      async move { client.get_page(&page).await.map_err(|e| e.to_string()) }
    });
    query.fetch();

    Self {
      path,
      title,
      query,
      scroll: 0,
    }
  }

  fn render_page(&self, frame: &mut Frame, area: Rect) {
    let (title, color) = match self.query.state() {
      QueryState::Success(outcome) => (
        format!(" {} [{}] ", self.path, outcome.source.label()),
        source_color(outcome.source),
      ),
      QueryState::Error(e) => (format!(" {} (error: {}) ", self.path, e), Color::Red),
      _ => (format!(" {} (loading...) ", self.path), Color::Blue),
    };

    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(color));

    let (content, style) = match self.query.state() {
      QueryState::Success(FetchOutcome {
        response: Some(response),
        ..
      }) => (html_to_text(&response.text()), Style::default()),
      QueryState::Success(FetchOutcome { response: None, .. }) => (
        "You are offline and this page is not cached. Press 'r' to retry.".to_string(),
        Style::default().fg(Color::DarkGray),
      ),
      QueryState::Error(e) => (
        format!("Error: {}\n\nPress 'r' to retry.", e),
        Style::default().fg(Color::Red),
      ),
      _ => ("Loading page...".to_string(), Style::default().fg(Color::DarkGray)),
    };

    let paragraph = Paragraph::new(content)
      .block(block)
      .style(style)
      .wrap(Wrap { trim: true })
      .scroll((self.scroll, 0));
    frame.render_widget(paragraph, area);
  }
}

impl View for PageView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.scroll = self.scroll.saturating_add(1),
      KeyCode::Char('k') | KeyCode::Up => self.scroll = self.scroll.saturating_sub(1),
      KeyCode::PageDown => self.scroll = self.scroll.saturating_add(10),
      KeyCode::PageUp => self.scroll = self.scroll.saturating_sub(10),
      KeyCode::Char('r') => {
        self.scroll = 0;
        self.query.refetch();
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_page(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    self.title.clone()
  }

  fn status(&self) -> Option<String> {
    let outcome = self.query.data()?;
    Some(match outcome.source {
      ResponseSource::OfflineFallback => "offline: showing the offline page".to_string(),
      source => format!("page from {}", source.label()),
    })
  }

  fn tick(&mut self) {
    self.query.poll();
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![
      Shortcut::new("j/k", "scroll"),
      Shortcut::new("r", "reload"),
      Shortcut::new("q", "back"),
    ]
  }
}

/// Readable text of an HTML document: tags, scripts and styles dropped,
/// entities decoded, runs of blank lines collapsed.
///
/// A preview for the terminal, not an HTML parser. Named entities beyond
/// the common few are left as written.
fn html_to_text(html: &str) -> String {
  let mut text = String::with_capacity(html.len());
  let mut rest = html;

  while let Some(start) = rest.find('<') {
    text.push_str(&rest[..start]);
    let tag = &rest[start..];
    let lower = tag.get(..7).unwrap_or(tag).to_ascii_lowercase();

    let skip_to = if lower.starts_with("<script") {
      "</script>"
    } else if lower.starts_with("<style") {
      "</style>"
    } else {
      ">"
    };

    rest = match find_ignore_case(tag, skip_to) {
      Some(end) => &tag[end + skip_to.len()..],
      None => "",
    };
  }
  text.push_str(rest);

  let text = decode_entities(&text);

  let mut lines: Vec<&str> = Vec::new();
  for line in text.lines().map(str::trim) {
    if line.is_empty() && lines.last().map_or(true, |l| l.is_empty()) {
      continue;
    }
    lines.push(line);
  }
  lines.join("\n").trim().to_string()
}

/// Decode numeric character references and the common named entities.
fn decode_entities(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  let mut rest = text;

  while let Some(start) = rest.find('&') {
    out.push_str(&rest[..start]);
    let entity = &rest[start..];

    // Entities are short; a far-off ';' belongs to something else
    let decoded = entity
      .bytes()
      .take(12)
      .position(|b| b == b';')
      .and_then(|end| decode_entity(&entity[1..end]).map(|c| (c, end)));

    match decoded {
      Some((c, end)) => {
        out.push(c);
        rest = &entity[end + 1..];
      }
      None => {
        out.push('&');
        rest = &entity[1..];
      }
    }
  }
  out.push_str(rest);
  out
}

fn decode_entity(name: &str) -> Option<char> {
  if let Some(num) = name.strip_prefix('#') {
    let code = match num.strip_prefix(['x', 'X']) {
      Some(hex) => u32::from_str_radix(hex, 16).ok()?,
      None => num.parse().ok()?,
    };
    return char::from_u32(code);
  }

  match name {
    "amp" => Some('&'),
    "lt" => Some('<'),
    "gt" => Some('>'),
    "quot" => Some('"'),
    "apos" => Some('\''),
    "nbsp" => Some(' '),
    _ => None,
  }
}

fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
  haystack
    .as_bytes()
    .windows(needle.len())
    .position(|w| w.eq_ignore_ascii_case(needle.as_bytes()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_html_to_text() {
    let html = r#"<!DOCTYPE html>
<html>
  <head><title>Offline</title><style>body { color: red; }</style></head>
  <body>
    <h1>You are offline</h1>

    <p>Check your connection &amp; try again.</p>
    <SCRIPT>console.log("<b>hi</b>")</SCRIPT>
  </body>
</html>"#;

    assert_eq!(
      html_to_text(html),
      "Offline\n\nYou are offline\n\nCheck your connection & try again."
    );
  }

  #[test]
  fn test_numeric_entities_are_decoded() {
    assert_eq!(
      html_to_text("<p>&#1583;&#1585;&#x628;&#x627;&#x631;&#x647; &#39;ما&#39;</p>"),
      "درباره 'ما'"
    );
  }

  #[test]
  fn test_unknown_entities_are_kept() {
    assert_eq!(decode_entities("a &copy; b & c &#xZZ;"), "a &copy; b & c &#xZZ;");
    assert_eq!(decode_entities("fish &amp; chips"), "fish & chips");
  }

  #[test]
  fn test_plain_text_is_unchanged() {
    assert_eq!(html_to_text("body { color: red }"), "body { color: red }");
  }
}
