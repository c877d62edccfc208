mod api;
mod auth;
mod cache;
mod config;
mod controller;
mod notice;
mod push;
mod store;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use api::types::{Location, NewPhoto};
use api::{ApiClient, CachedApiClient, StoryApi};
use cache::{HttpCache, SqliteBuckets};
use config::Config;
use controller::{Controller, FeedLoad, FeedSource, FeedView, View};
use notice::{NoticeLevel, NoticeReceiver};
use push::{PushManager, PushPlatform, UnsupportedPlatform};
use store::StoryStore;

#[derive(Parser, Debug)]
#[command(name = "storyfeed")]
#[command(about = "An offline-resilient terminal client for a story-sharing feed")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/storyfeed/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Create an account
  Register {
    name: String,
    email: String,
    password: String,
  },
  /// Log in and keep the session for later invocations
  Login { email: String, password: String },
  /// Log out and discard the session
  Logout,
  /// Show the live feed (falls back to saved stories when offline)
  Feed,
  /// Show stories saved for offline reading
  Saved,
  /// Save a story from the live feed for offline reading
  Save { id: String },
  /// Remove a story from offline storage
  Unsave { id: String },
  /// Share a new story
  Add {
    description: String,
    /// Path to the photo file
    #[arg(long)]
    photo: PathBuf,
    #[arg(long)]
    lat: Option<f64>,
    #[arg(long)]
    lon: Option<f64>,
  },
  /// Render an incoming push payload as a notification (invoked by the
  /// push delivery agent)
  PushEvent {
    /// JSON payload; omitted or malformed payloads use the default text
    payload: Option<String>,
    /// Also dispatch the notification-click follow-up
    #[arg(long)]
    clicked: bool,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;

  let data_dir = Config::data_dir()?;
  let _log_guard = init_tracing(&data_dir)?;

  // Session + API client share one auth handle.
  let session_path = data_dir.join("session.yaml");
  let auth = auth::shared(auth::load_session(&session_path)?);
  let api = ApiClient::new(&config, Arc::clone(&auth))?;

  // Cache lifecycle: seed the shell, then drop superseded generations.
  let buckets = SqliteBuckets::open_at(&data_dir.join("httpcache.db"))?;
  let http_cache = HttpCache::new(buckets);
  let precache: Vec<String> = config
    .cache
    .precache
    .iter()
    .map(|path| api.origin_url(path))
    .collect();
  let seed_client = api.clone();
  http_cache
    .install(&precache, move |url| {
      let client = seed_client.clone();
      async move { Ok(client.get_raw(&url).await?) }
    })
    .await?;
  http_cache.activate()?;

  let cached_api = CachedApiClient::new(api, http_cache);
  let store = StoryStore::open_at(&data_dir.join("stories.db"))?;

  let (notice_tx, mut notice_rx) = notice::channel();
  let push = PushManager::new(
    UnsupportedPlatform,
    cached_api.clone(),
    config.push.application_server_key.clone(),
    notice_tx.clone(),
  );
  let mut controller = Controller::new(cached_api, store, push, Arc::clone(&auth), notice_tx);

  let outcome = run_command(&mut controller, args.command).await;

  drain_notices(&mut notice_rx);

  let session = auth
    .read()
    .map_err(|_| eyre!("auth state lock poisoned"))?
    .clone();
  auth::save_session(&session_path, &session)?;

  outcome
}

async fn run_command<A: StoryApi, P: PushPlatform>(
  controller: &mut Controller<A, P>,
  command: Command,
) -> Result<()> {
  match command {
    Command::Register {
      name,
      email,
      password,
    } => {
      controller.register(&name, &email, &password).await?;
    }
    Command::Login { email, password } => {
      controller.login(&email, &password).await?;
      controller.navigate(View::LiveFeed);
      render_feed_load(controller.load_live_feed().await);
    }
    Command::Logout => {
      controller.logout().await;
    }
    Command::Feed => {
      controller.navigate(View::LiveFeed);
      render_feed_load(controller.load_live_feed().await);
    }
    Command::Saved => {
      controller.navigate(View::SavedStories);
      let stories = controller.load_saved()?;
      if stories.is_empty() {
        println!("No stories saved for offline reading.");
      } else {
        print_stories(&stories);
      }
    }
    Command::Save { id } => {
      controller.navigate(View::LiveFeed);
      controller.load_live_feed().await;
      if !controller.save_for_offline(&id)? {
        println!("Story {id} is not in the current live feed; nothing saved.");
      }
    }
    Command::Unsave { id } => {
      let remaining = controller.remove_from_offline(&id)?;
      println!("{} saved stories remain.", remaining.len());
    }
    Command::Add {
      description,
      photo,
      lat,
      lon,
    } => {
      controller.navigate(View::AddStory);
      let photo = read_photo(&photo)?;
      let location = lat.zip(lon).map(|(lat, lon)| Location { lat, lon });
      let load = controller
        .submit_new_story(&description, Some(photo), location)
        .await?;
      render_feed_load(load);
    }
    Command::PushEvent { payload, clicked } => {
      let host = cache::LogNotifier;
      cache::handle_push(&host, payload.as_deref().map(str::as_bytes));
      if clicked {
        cache::handle_notification_click(&host);
      }
    }
  }

  Ok(())
}

fn render_feed_load(load: FeedLoad) {
  match load {
    FeedLoad::Rendered(view) => render_feed(&view),
    FeedLoad::Superseded => {}
  }
}

fn render_feed(view: &FeedView) {
  match view.source {
    FeedSource::Live => println!("Live feed:"),
    FeedSource::Saved => println!("Saved stories (offline):"),
  }
  if view.stories.is_empty() {
    println!("  (no stories)");
    return;
  }
  print_stories(&view.stories);
}

fn print_stories(stories: &[api::types::Story]) {
  for story in stories {
    println!(
      "  {}  {}  {}  ({})",
      story.id,
      story.author_name,
      story.description,
      story.created_at.format("%Y-%m-%d %H:%M")
    );
  }
}

fn read_photo(path: &Path) -> Result<NewPhoto> {
  let bytes =
    std::fs::read(path).map_err(|e| eyre!("Failed to read photo {}: {}", path.display(), e))?;
  let file_name = path
    .file_name()
    .and_then(|n| n.to_str())
    .unwrap_or("photo.jpg")
    .to_string();

  Ok(NewPhoto {
    file_name,
    mime_type: mime_for(path).to_string(),
    bytes,
  })
}

fn mime_for(path: &Path) -> &'static str {
  match path
    .extension()
    .and_then(|e| e.to_str())
    .map(|e| e.to_ascii_lowercase())
    .as_deref()
  {
    Some("jpg") | Some("jpeg") => "image/jpeg",
    Some("png") => "image/png",
    Some("gif") => "image/gif",
    Some("webp") => "image/webp",
    _ => "application/octet-stream",
  }
}

fn drain_notices(rx: &mut NoticeReceiver) {
  while let Ok(notice) = rx.try_recv() {
    let prefix = match notice.level {
      NoticeLevel::Info => "info",
      NoticeLevel::Success => "ok",
      NoticeLevel::Error => "error",
    };
    println!("[{prefix}] {}", notice.message);
  }
}

fn init_tracing(data_dir: &Path) -> Result<tracing_appender::non_blocking::WorkerGuard> {
  let file_appender = tracing_appender::rolling::daily(data_dir.join("logs"), "storyfeed.log");
  let (writer, guard) = tracing_appender::non_blocking(file_appender);

  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    )
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}
