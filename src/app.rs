use crate::cache::CacheStorage;
use crate::event::{Event, EventHandler};
use crate::likes::LocalStorage;
use crate::site::BlogClient;
use crate::ui;
use crate::ui::view::{View, ViewAction};
use crate::ui::views::PostListView;
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Terminal UI state
pub struct App {
  /// Navigation stack, the post list is always at index 0
  view_stack: Vec<Box<dyn View>>,
  site: Url,
  /// Generation serving requests, `None` when nothing is cached
  generation: Option<String>,
  should_quit: bool,
}

impl App {
  pub fn new(client: BlogClient<dyn CacheStorage>, likes: Arc<dyn LocalStorage>) -> Self {
    let site = client.origin().clone();
    let generation = client.generation().map(String::from);

    Self {
      view_stack: vec![Box::new(PostListView::new(client, likes))],
      site,
      generation,
      should_quit: false,
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;

    let result = self.event_loop().await;

    // Restore the terminal even if the loop failed
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
  }

  async fn event_loop(&mut self) -> Result<()> {
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    let mut events = EventHandler::new(Duration::from_millis(250));

    while !self.should_quit {
      terminal.draw(|frame| ui::draw(frame, self))?;

      match events.next().await {
        Some(Event::Key(key)) => self.handle_key(key),
        Some(Event::Tick) => self.tick(),
        None => break,
      }
    }

    Ok(())
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    let Some(view) = self.view_stack.last_mut() else {
      self.should_quit = true;
      return;
    };

    match view.handle_key(key) {
      ViewAction::None => {}
      ViewAction::Push(view) => self.view_stack.push(view),
      ViewAction::Pop => {
        if self.view_stack.len() > 1 {
          self.view_stack.pop();
        } else {
          self.should_quit = true;
        }
      }
    }
  }

  fn tick(&mut self) {
    // Views below the top keep loading in the background
    for view in self.view_stack.iter_mut() {
      view.tick();
    }
  }

  pub fn current_view(&self) -> Option<&dyn View> {
    self.view_stack.last().map(|v| v.as_ref())
  }

  pub fn current_view_mut(&mut self) -> Option<&mut Box<dyn View>> {
    self.view_stack.last_mut()
  }

  pub fn site(&self) -> &Url {
    &self.site
  }

  pub fn generation(&self) -> Option<&str> {
    self.generation.as_deref()
  }

  pub fn breadcrumb(&self) -> Vec<String> {
    self
      .view_stack
      .iter()
      .map(|v| v.breadcrumb_label())
      .collect()
  }
}
