mod app;
mod cache;
mod commands;
mod config;
mod db;
mod event;
mod likes;
mod logging;
mod query;
mod search;
mod site;
mod ui;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;

use commands::Services;
use worker::{NotificationTray, WindowRegistry};

#[derive(Parser, Debug)]
#[command(name = "myblog")]
#[command(about = "Offline-first terminal companion for the myblog site")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/myblog/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Site URL, overrides the config file and MYBLOG_SITE_URL
  #[arg(short, long, global = true)]
  site: Option<String>,

  /// Keep the cache and likes in memory for this run only
  #[arg(long, global = true)]
  ephemeral: bool,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Browse posts in the terminal (default)
  Browse,
  /// Install and activate the configured cache generation
  Install,
  /// Fetch one path through the offline worker
  Fetch {
    path: String,
    /// Send the request as a page navigation (Accept: text/html)
    #[arg(long)]
    html: bool,
  },
  /// Deliver a push message, e.g. '{"title":"New post","url":"/post/3/"}'
  Push {
    payload: String,
    /// Click the notification after it is shown
    #[arg(long)]
    click: bool,
    /// URL of an already open window (repeatable)
    #[arg(long = "window")]
    windows: Vec<String>,
  },
  /// Drop one cached path from the active generation
  Evict { path: String },
  /// Toggle the like flag of a post
  Like { post_id: String },
  /// List the posts matching a query
  Search { query: String },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let mut config = config::Config::load(args.config.as_deref())?;
  if let Some(site) = args.site {
    config.site.url = site;
    config.validate()?;
  }

  let _guard = logging::init(&db::data_dir()?)?;

  let services = Services::open(config, args.ephemeral)?;

  match args.command.unwrap_or(Command::Browse) {
    Command::Browse => {
      let worker = services
        .start(
          Arc::new(WindowRegistry::new()),
          Arc::new(NotificationTray::new()),
          false,
        )
        .await?;
      let client = services.blog_client(worker)?;

      let mut app = app::App::new(client, Arc::clone(&services.local));
      app.run().await?;
    }
    Command::Install => commands::install(&services).await?,
    Command::Fetch { path, html } => commands::fetch(&services, &path, html).await?,
    Command::Push {
      payload,
      click,
      windows,
    } => commands::push(&services, &payload, click, &windows).await?,
    Command::Evict { path } => commands::evict(&services, &path).await?,
    Command::Like { post_id } => commands::like(&services, &post_id)?,
    Command::Search { query } => commands::search(&services, &query).await?,
  }

  Ok(())
}
