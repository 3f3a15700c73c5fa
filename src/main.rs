mod agent;
mod cache;
mod config;
mod db;
mod dispatch;
mod event;
mod intercept;
mod logging;
mod net;
mod notify;
mod sync;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use agent::Agent;
use cache::{CacheStorage, SqliteStorage};
use dispatch::Dispatcher;
use event::{Event, EventOutcome, EventReader};
use notify::ConsoleSink;

#[derive(Parser, Debug)]
#[command(name = "fuelsw")]
#[command(about = "Offline caching agent for the Fuel Tracker web app")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/fuelsw/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Fetch the precache list into the current cache bucket
  Install,
  /// Delete every cache bucket except the current one
  Activate,
  /// Request a URL through the cache
  Fetch {
    /// Path relative to the origin, or an absolute URL
    url: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Write the body here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// Signal restored connectivity
  Sync {
    #[arg(long, default_value = "background-sync")]
    tag: String,
  },
  /// Deliver a push message
  Push {
    #[arg(long)]
    payload: Option<String>,
  },
  /// Click a notification, optionally on one of its actions
  Click {
    #[arg(long)]
    action: Option<String>,
  },
  /// Buffer a JSON record for the next sync
  Buffer { record: String },
  /// List cache buckets
  Buckets,
  /// Read JSON-lines events from stdin and handle them concurrently
  Run,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(config.log_dir.as_deref());

  let agent = Agent::open(&config, Arc::new(ConsoleSink))?;
  let dispatcher = Dispatcher::new(agent, config.budgets.clone());
  info!(origin = %config.origin, cache = %config.cache.name, "Agent ready");

  match args.command {
    Command::Install => print_outcome(dispatcher.dispatch(Event::Install).await?),
    Command::Activate => print_outcome(dispatcher.dispatch(Event::Activate).await?),
    Command::Fetch {
      url,
      method,
      output,
    } => {
      let event = Event::Fetch {
        method,
        url,
        headers: Vec::new(),
        body: None,
      };
      match dispatcher.dispatch(event).await? {
        EventOutcome::Fetched(intercepted) => {
          eprintln!(
            "{} {} ({:?})",
            intercepted.response.status, intercepted.response.url, intercepted.source
          );
          match output {
            Some(path) => std::fs::write(&path, &intercepted.response.body)
              .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?,
            None => std::io::stdout()
              .write_all(&intercepted.response.body)
              .map_err(|e| eyre!("Failed to write response body: {}", e))?,
          }
          // Let the background cache write land before the process exits
          if let Some(write) = intercepted.cache_write {
            write.finished().await;
          }
        }
        other => print_outcome(other),
      }
    }
    Command::Sync { tag } => print_outcome(dispatcher.dispatch(Event::Sync { tag }).await?),
    Command::Push { payload } => {
      dispatcher.dispatch(Event::Push { payload }).await?;
    }
    Command::Click { action } => {
      dispatcher
        .dispatch(Event::NotificationClick { action })
        .await?;
    }
    Command::Buffer { record } => {
      let record: serde_json::Value =
        serde_json::from_str(&record).map_err(|e| eyre!("Record is not valid JSON: {}", e))?;
      let id = dispatcher.agent().sync().buffer(record).await?;
      println!("buffered record {}", id);
    }
    Command::Buckets => list_buckets(&dispatcher)?,
    Command::Run => {
      let summary = Arc::new(dispatcher).run(EventReader::stdin()).await;
      info!(handled = summary.handled, failed = summary.failed, "Event stream finished");
      if summary.failed > 0 {
        return Err(eyre!(
          "{} of {} events failed",
          summary.failed,
          summary.handled
        ));
      }
    }
  }

  Ok(())
}

fn print_outcome(outcome: EventOutcome) {
  println!("{}", outcome);
}

fn list_buckets(dispatcher: &Dispatcher<SqliteStorage>) -> Result<()> {
  let bucket = dispatcher.agent().cache().bucket();
  for name in bucket.storage().bucket_names()? {
    let entries = bucket.storage().keys(&name)?.len();
    let marker = if name == bucket.name() { " (current)" } else { "" };
    println!("{}{}\t{} entries", name, marker, entries);
  }
  Ok(())
}
