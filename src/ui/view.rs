use crossterm::event::KeyEvent;
use ratatui::prelude::*;

/// A keyboard shortcut hint shown in the header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortcut {
  pub key: &'static str,
  pub label: &'static str,
}

impl Shortcut {
  pub const fn new(key: &'static str, label: &'static str) -> Self {
    Self { key, label }
  }
}

/// What the App should do after a view handled a key
pub enum ViewAction {
  None,
  /// Open a view on top of the current one
  Push(Box<dyn View>),
  /// Go back to the previous view (quits from the root view)
  Pop,
}

/// A screen of the terminal UI.
///
/// Views own their input modes and their async queries; the App only
/// routes keys, ticks and rendering to the view on top of the stack.
pub trait View {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction;

  fn render(&mut self, frame: &mut Frame, area: Rect);

  fn breadcrumb_label(&self) -> String;

  /// Where the data on screen came from, for the footer
  fn status(&self) -> Option<String> {
    None
  }

  /// Called on every tick to poll queries
  fn tick(&mut self) {}

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![Shortcut::new("r", "reload"), Shortcut::new("q", "back")]
  }
}
