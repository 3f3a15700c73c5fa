//! Runs events as independent tasks, each bounded by its own time budget.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::agent::Agent;
use crate::cache::CacheStorage;
use crate::config::BudgetsConfig;
use crate::event::{Event, EventOutcome, EventReader};

/// Summary of an event stream run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
  pub handled: usize,
  pub failed: usize,
}

pub struct Dispatcher<S: CacheStorage> {
  agent: Arc<Agent<S>>,
  budgets: BudgetsConfig,
}

impl<S: CacheStorage> Dispatcher<S> {
  pub fn new(agent: Agent<S>, budgets: BudgetsConfig) -> Self {
    Self {
      agent: Arc::new(agent),
      budgets,
    }
  }

  pub fn agent(&self) -> &Agent<S> {
    &self.agent
  }

  fn budget(&self, event: &Event) -> Duration {
    let secs = match event {
      Event::Install => self.budgets.install_secs,
      Event::Activate => self.budgets.activate_secs,
      Event::Fetch { .. } => self.budgets.fetch_secs,
      Event::Sync { .. } => self.budgets.sync_secs,
      Event::Push { .. } => self.budgets.push_secs,
      Event::NotificationClick { .. } => self.budgets.click_secs,
    };
    Duration::from_secs(secs)
  }

  /// Handle one event within its budget.
  ///
  /// A background cache write started by a fetch is not part of the budget.
  pub async fn dispatch(&self, event: Event) -> Result<EventOutcome> {
    let name = event.name();
    let budget = self.budget(&event);

    match tokio::time::timeout(budget, self.agent.handle(event)).await {
      Ok(result) => result.map_err(|e| e.wrap_err(format!("{} handler failed", name))),
      Err(_) => Err(eyre!("{} handler exceeded its budget of {:?}", name, budget)),
    }
  }

  /// Dispatch every event from the reader concurrently, then wait for all.
  pub async fn run(self: Arc<Self>, mut events: EventReader) -> RunSummary {
    let mut tasks = JoinSet::new();

    while let Some(event) = events.next().await {
      let dispatcher = Arc::clone(&self);
      tasks.spawn(async move {
        let name = event.name();
        match dispatcher.dispatch(event).await {
          Ok(EventOutcome::Fetched(intercepted)) => {
            info!(
              event = name,
              status = intercepted.response.status,
              url = %intercepted.response.url,
              source = ?intercepted.source,
              "Event handled"
            );
            if let Some(write) = intercepted.cache_write {
              write.finished().await;
            }
            true
          }
          Ok(outcome) => {
            info!(event = name, outcome = %outcome, "Event handled");
            true
          }
          Err(e) => {
            error!(event = name, error = ?e, "Event failed");
            false
          }
        }
      });
    }

    let mut summary = RunSummary::default();
    while let Some(joined) = tasks.join_next().await {
      summary.handled += 1;
      if !matches!(joined, Ok(true)) {
        summary.failed += 1;
      }
    }
    summary
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{RequestKey, ResponseSource, SqliteStorage};
  use crate::config::Config;
  use crate::db::OfflineStore;
  use crate::net::testing::MockFetcher;
  use crate::notify::testing::RecordingSink;
  use crate::notify::ClickOutcome;
  use crate::sync::SyncOutcome;
  use serde_json::json;

  const ORIGIN: &str = "https://fuel.example.com";

  struct Harness {
    dispatcher: Dispatcher<SqliteStorage>,
    storage: Arc<SqliteStorage>,
    fetcher: Arc<MockFetcher>,
    sink: Arc<RecordingSink>,
    store: Arc<OfflineStore>,
  }

  fn harness_with(fetcher: MockFetcher, budgets: BudgetsConfig) -> Harness {
    let config = Config {
      origin: ORIGIN.to_string(),
      budgets: budgets.clone(),
      ..Config::default()
    };
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let fetcher = Arc::new(fetcher);
    let sink = Arc::new(RecordingSink::default());
    let store = Arc::new(OfflineStore::open_in_memory(1, "offlineData").unwrap());

    let agent = Agent::new(&config, storage.clone(), fetcher.clone(), sink.clone())
      .unwrap()
      .with_offline_store(store.clone());

    Harness {
      dispatcher: Dispatcher::new(agent, budgets),
      storage,
      fetcher,
      sink,
      store,
    }
  }

  fn harness() -> Harness {
    harness_with(MockFetcher::new(), BudgetsConfig::default())
  }

  fn serve_precache(fetcher: &MockFetcher) {
    for path in Config::default().cache.precache {
      fetcher.ok(&format!("{}{}", ORIGIN, path), &path);
    }
  }

  #[tokio::test]
  async fn test_install_then_offline_fetch_served_from_cache() {
    let h = harness();
    serve_precache(&h.fetcher);

    let outcome = h.dispatcher.dispatch(Event::Install).await.unwrap();
    assert!(matches!(outcome, EventOutcome::Installed { cached: 6 }));
    let calls_after_install = h.fetcher.calls();

    let outcome = h
      .dispatcher
      .dispatch(Event::Fetch {
        method: "GET".to_string(),
        url: "/static/js/app.js".to_string(),
        headers: Vec::new(),
        body: None,
      })
      .await
      .unwrap();

    match outcome {
      EventOutcome::Fetched(intercepted) => {
        assert_eq!(intercepted.source, ResponseSource::Cache);
        assert_eq!(intercepted.response.body, b"/static/js/app.js");
      }
      other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(h.fetcher.calls(), calls_after_install);
  }

  #[tokio::test]
  async fn test_activate_keeps_only_current_bucket() {
    let h = harness();
    h.storage.open_bucket("fuel-tracker-v0.9.0").unwrap();
    h.storage.open_bucket("fuel-tracker-v1.0.0").unwrap();

    let outcome = h.dispatcher.dispatch(Event::Activate).await.unwrap();
    match outcome {
      EventOutcome::Activated { deleted } => {
        assert_eq!(deleted, vec!["fuel-tracker-v0.9.0".to_string()])
      }
      other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(
      h.storage.bucket_names().unwrap(),
      vec!["fuel-tracker-v1.0.0".to_string()]
    );
  }

  #[tokio::test]
  async fn test_sync_event_posts_buffered_records() {
    let h = harness();
    h.fetcher.ok(&format!("{}/api/sync-offline-data", ORIGIN), "{}");
    h.store.append(&json!({"liters": 1})).unwrap();

    let outcome = h
      .dispatcher
      .dispatch(Event::Sync {
        tag: "background-sync".to_string(),
      })
      .await
      .unwrap();

    assert!(matches!(
      outcome,
      EventOutcome::Synced(SyncOutcome::Sent { records: 1, .. })
    ));
  }

  #[tokio::test]
  async fn test_push_and_click_events() {
    let h = harness();

    h.dispatcher
      .dispatch(Event::Push {
        payload: Some("Odometer updated".to_string()),
      })
      .await
      .unwrap();
    assert_eq!(h.sink.shown.lock().unwrap()[0].body, "Odometer updated");

    let outcome = h
      .dispatcher
      .dispatch(Event::NotificationClick {
        action: Some("open".to_string()),
      })
      .await
      .unwrap();
    assert!(matches!(
      outcome,
      EventOutcome::Clicked(ClickOutcome::OpenedWindow(_))
    ));
  }

  #[tokio::test]
  async fn test_budget_expiry_is_an_error() {
    let budgets = BudgetsConfig {
      fetch_secs: 0,
      ..BudgetsConfig::default()
    };
    let h = harness_with(
      MockFetcher::new().with_delay(Duration::from_millis(200)),
      budgets,
    );
    h.fetcher.ok(&format!("{}/slow", ORIGIN), "slow");

    let err = h
      .dispatcher
      .dispatch(Event::Fetch {
        method: "GET".to_string(),
        url: "/slow".to_string(),
        headers: Vec::new(),
        body: None,
      })
      .await
      .unwrap_err();
    assert!(err.to_string().contains("budget"));
  }

  #[tokio::test]
  async fn test_handler_error_names_event() {
    let h = harness();

    let err = h
      .dispatcher
      .dispatch(Event::Fetch {
        method: "GET".to_string(),
        url: "/unreachable".to_string(),
        headers: Vec::new(),
        body: None,
      })
      .await
      .unwrap_err();
    assert!(err.to_string().contains("fetch handler failed"));
  }

  #[tokio::test]
  async fn test_run_handles_stream_and_waits_for_cache_writes() {
    let h = harness();
    h.fetcher.ok(&format!("{}/fuel", ORIGIN), "fuel list");

    let input = concat!(
      "{\"type\":\"fetch\",\"url\":\"/fuel\"}\n",
      "{\"type\":\"fetch\",\"url\":\"/missing\"}\n",
      "{\"type\":\"sync\",\"tag\":\"other\"}\n",
    );
    let events = EventReader::new(input.as_bytes());

    let storage = h.storage.clone();
    let summary = Arc::new(h.dispatcher).run(events).await;
    assert_eq!(
      summary,
      RunSummary {
        handled: 3,
        failed: 1
      }
    );

    let origin = url::Url::parse(ORIGIN).unwrap();
    let key = RequestKey::new("GET", &origin.join("/fuel").unwrap());
    assert!(storage.get("fuel-tracker-v1.0.0", &key).unwrap().is_some());
  }
}
