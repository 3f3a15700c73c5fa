//! Wires the handlers together around one shared cache bucket.

use color_eyre::Result;
use std::sync::Arc;
use url::Url;

use crate::cache::{CacheBucket, CacheManager, CacheStorage, SqliteStorage};
use crate::config::Config;
use crate::db::OfflineStore;
use crate::event::{Event, EventOutcome};
use crate::intercept::RequestInterceptor;
use crate::net::{HttpFetcher, HttpRequest, SharedFetcher};
use crate::notify::{NotificationRelay, NotificationSink};
use crate::sync::SyncTrigger;

/// The offline agent: one handler per kind of lifecycle event.
pub struct Agent<S: CacheStorage> {
  origin: Url,
  cache: CacheManager<S>,
  interceptor: RequestInterceptor<S>,
  sync: SyncTrigger,
  notifications: NotificationRelay,
}

impl Agent<SqliteStorage> {
  /// Build an agent backed by the on-disk cache and the real network.
  pub fn open(config: &Config, sink: Arc<dyn NotificationSink>) -> Result<Self> {
    let origin = config.origin_url()?;
    let storage = Arc::new(SqliteStorage::open(&config.cache.db_path()?)?);
    let fetcher: SharedFetcher = Arc::new(HttpFetcher::new(origin, config.request_timeout())?);

    Self::new(config, storage, fetcher, sink)
  }
}

impl<S: CacheStorage> Agent<S> {
  pub fn new(
    config: &Config,
    storage: Arc<S>,
    fetcher: SharedFetcher,
    sink: Arc<dyn NotificationSink>,
  ) -> Result<Self> {
    let origin = config.origin_url()?;
    let bucket = CacheBucket::new(storage, config.cache.name.clone());

    Ok(Self {
      cache: CacheManager::new(
        bucket.clone(),
        fetcher.clone(),
        origin.clone(),
        config.cache.precache.clone(),
      ),
      interceptor: RequestInterceptor::new(bucket, fetcher.clone()),
      sync: SyncTrigger::new(&config.sync, config.sync_endpoint()?, fetcher),
      notifications: NotificationRelay::new(sink, config.notification.clone(), origin.clone()),
      origin,
    })
  }

  /// Use an already open offline record store.
  pub fn with_offline_store(mut self, store: Arc<OfflineStore>) -> Self {
    self.sync = self.sync.with_store(store);
    self
  }

  pub fn cache(&self) -> &CacheManager<S> {
    &self.cache
  }

  pub fn sync(&self) -> &SyncTrigger {
    &self.sync
  }

  /// Route one event to its handler.
  pub async fn handle(&self, event: Event) -> Result<EventOutcome> {
    match event {
      Event::Install => Ok(EventOutcome::Installed {
        cached: self.cache.install().await?,
      }),
      Event::Activate => Ok(EventOutcome::Activated {
        deleted: self.cache.activate().await?,
      }),
      Event::Fetch {
        method,
        url,
        headers,
        body,
      } => {
        let mut request = HttpRequest::resolve(&self.origin, &method, &url)?;
        request.headers = headers;
        request.body = body.map(String::into_bytes);
        Ok(EventOutcome::Fetched(self.interceptor.handle(&request).await?))
      }
      Event::Sync { tag } => Ok(EventOutcome::Synced(self.sync.handle(&tag).await?)),
      Event::Push { payload } => Ok(EventOutcome::Pushed(
        self.notifications.on_push(payload.as_deref()).await?,
      )),
      Event::NotificationClick { action } => Ok(EventOutcome::Clicked(
        self.notifications.on_click(action.as_deref()).await?,
      )),
    }
  }
}
