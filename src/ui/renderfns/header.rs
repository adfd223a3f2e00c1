use crate::ui::view::Shortcut;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;
use url::Url;

/// Draw the header bar: app name, site host, cache generation, shortcuts
pub fn draw_header(
  frame: &mut Frame,
  area: Rect,
  site: &Url,
  generation: Option<&str>,
  shortcuts: &[Shortcut],
) {
  let separator = || Span::styled("│", Style::default().fg(Color::DarkGray));

  let generation = match generation {
    Some(generation) => Span::styled(
      format!(" {} ", generation),
      Style::default().fg(Color::Yellow).bold(),
    ),
    None => Span::styled(" no offline cache ", Style::default().fg(Color::Red)),
  };

  let mut spans = vec![
    Span::styled(" myblog ", Style::default().fg(Color::Cyan).bold()),
    separator(),
    Span::styled(
      format!(" {} ", site_label(site)),
      Style::default().fg(Color::White),
    ),
    separator(),
    generation,
    Span::raw(" "),
  ];

  for shortcut in shortcuts {
    spans.push(Span::raw("  "));
    spans.push(Span::styled(
      format!("<{}>", shortcut.key),
      Style::default().fg(Color::Cyan),
    ));
    spans.push(Span::styled(
      format!(" {}", shortcut.label),
      Style::default().fg(Color::DarkGray),
    ));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
  frame.render_widget(paragraph, area);
}

/// Host and port of the site
fn site_label(site: &Url) -> String {
  let host = site.host_str().unwrap_or("localhost");
  match site.port() {
    Some(port) => format!("{}:{}", host, port),
    None => host.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_site_label() {
    let url = |s: &str| Url::parse(s).unwrap();
    assert_eq!(site_label(&url("https://blog.example.com/")), "blog.example.com");
    assert_eq!(site_label(&url("http://127.0.0.1:8000/")), "127.0.0.1:8000");
  }
}
