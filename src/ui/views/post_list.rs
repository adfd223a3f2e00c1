use std::sync::Arc;

use crate::cache::{CacheStorage, ResponseSource};
use crate::likes::{LikeButton, LocalStorage};
use crate::query::{Query, QueryState};
use crate::search;
use crate::site::types::PostCard;
use crate::site::BlogClient;
use crate::ui::components::{KeyResult, SearchEvent, SearchInput};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::truncate;
use crate::ui::view::{Shortcut, View, ViewAction};
use crate::ui::views::PageView;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use tracing::warn;

type Posts = (Vec<PostCard>, ResponseSource);

/// Post cards with like toggles and a live search filter
pub struct PostListView {
  client: BlogClient<dyn CacheStorage>,
  likes_store: Arc<dyn LocalStorage>,
  query: Query<Posts>,
  /// One button per card, in feed order
  likes: Vec<LikeButton>,
  /// One visibility flag per card, in feed order
  visible: Vec<bool>,
  list_state: ListState,
  search: SearchInput,
  message: Option<String>,
}

impl PostListView {
  pub fn new(client: BlogClient<dyn CacheStorage>, likes_store: Arc<dyn LocalStorage>) -> Self {
    let blog = client.clone();
    let mut query = Query::new(move || {
      let blog = blog.clone();
      async move { blog.get_posts().await.map_err(|e| e.to_string()) }
    });
    query.fetch();

    Self {
      client,
      likes_store,
      query,
      likes: Vec::new(),
      visible: Vec::new(),
      list_state: ListState::default(),
      search: SearchInput::new(),
      message: None,
    }
  }

  fn cards(&self) -> &[PostCard] {
    self
      .query
      .data()
      .map(|(cards, _)| cards.as_slice())
      .unwrap_or(&[])
  }

  /// Feed indices of the cards currently shown
  fn shown(&self) -> Vec<usize> {
    search::visible_indices(&self.visible)
  }

  fn selected_card(&self) -> Option<usize> {
    let selected = self.list_state.selected()?;
    self.shown().get(selected).copied()
  }

  /// Rebuild like state and visibility for freshly loaded cards
  fn on_posts_loaded(&mut self) {
    let storage = Arc::clone(&self.likes_store);
    let likes = self
      .cards()
      .iter()
      .map(|card| LikeButton::init(Some(&card.id), storage.as_ref()))
      .collect::<color_eyre::Result<Vec<_>>>();

    match likes {
      Ok(likes) => self.likes = likes,
      Err(e) => {
        warn!(error = %e, "failed to read like flags");
        self.message = Some(format!("Failed to read likes: {}", e));
        self.likes = Vec::new();
      }
    }

    self.visible = vec![true; self.cards().len()];
    let query = self.search.query().to_string();
    self.filter(&query);
  }

  fn filter(&mut self, query: &str) {
    let cards = match self.query.data() {
      Some((cards, _)) => cards,
      None => return,
    };
    search::apply_filter(cards, &mut self.visible, query);
    self.list_state.select(Some(0));
  }

  fn toggle_like(&mut self) {
    let Some(idx) = self.selected_card() else {
      return;
    };
    let Some(button) = self.likes.get_mut(idx) else {
      return;
    };

    if let Err(e) = button.click(self.likes_store.as_ref()) {
      warn!(error = %e, "failed to save like");
      self.message = Some(format!("Failed to save like: {}", e));
    }
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let shown = self.shown();
    ensure_valid_selection(&mut self.list_state, shown.len());

    let title = match self.query.state() {
      QueryState::Loading => " Posts (loading...) ".to_string(),
      QueryState::Error(e) => format!(" Posts (error: {}) ", e),
      _ if self.search.query().trim().is_empty() => format!(" Posts ({}) ", self.cards().len()),
      _ => format!(
        " Posts ({}/{}) /{} ",
        shown.len(),
        self.cards().len(),
        self.search.query().trim()
      ),
    };

    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if shown.is_empty() && !self.query.is_loading() {
      let content = if self.query.error().is_some() {
        "Failed to load posts. Press 'r' to retry."
      } else if self.cards().is_empty() {
        "No posts yet."
      } else {
        "No posts match the search."
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let text_width = (area.width as usize).saturating_sub(48).max(10);
    let items: Vec<ListItem> = shown
      .iter()
      .map(|&idx| {
        let card = &self.cards()[idx];
        let heart = self.likes.get(idx).map(|b| b.icon()).unwrap_or(" ");

        let line = Line::from(vec![
          Span::styled(format!("{} ", heart), Style::default().fg(Color::Red)),
          Span::styled(
            format!("{:<36}", truncate(card.title.as_deref().unwrap_or("(untitled)"), 36)),
            Style::default().fg(Color::Cyan),
          ),
          Span::raw(" "),
          Span::styled(
            truncate(card.text.as_deref().unwrap_or(""), text_width),
            Style::default().fg(Color::Gray),
          ),
        ]);
        ListItem::new(line)
      })
      .collect();

    let list = List::new(items)
      .block(block)
      .highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut self.list_state);
  }
}

impl View for PostListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.search.handle_key(key) {
      KeyResult::Handled | KeyResult::Event(SearchEvent::Submitted) => return ViewAction::None,
      KeyResult::Event(SearchEvent::Changed(query)) => {
        self.filter(&query);
        return ViewAction::None;
      }
      KeyResult::NotHandled => {}
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('l') | KeyCode::Char(' ') => self.toggle_like(),
      KeyCode::Char('r') => {
        self.message = None;
        self.query.refetch();
      }
      KeyCode::Enter => {
        if let Some(card) = self.selected_card().and_then(|idx| self.cards().get(idx)) {
          return ViewAction::Push(Box::new(PageView::new(
            self.client.clone(),
            card.path(),
            card.title.clone().unwrap_or_else(|| card.path()),
          )));
        }
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_list(frame, area);
    self.search.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    "Posts".to_string()
  }

  fn status(&self) -> Option<String> {
    if let Some(message) = &self.message {
      return Some(message.clone());
    }
    let (_, source) = self.query.data()?;
    let mut status = format!("posts from {}", source.label());
    if !self.client.is_online() {
      status.push_str(" (offline)");
    }
    Some(status)
  }

  fn tick(&mut self) {
    if self.query.poll() && self.query.data().is_some() {
      self.on_posts_loaded();
    }
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    if self.search.is_active() {
      return vec![Shortcut::new("enter", "apply"), Shortcut::new("esc", "clear")];
    }
    vec![
      Shortcut::new("/", "search"),
      Shortcut::new("l", "like"),
      Shortcut::new("enter", "open"),
      Shortcut::new("r", "reload"),
      Shortcut::new("q", "quit"),
    ]
  }
}
