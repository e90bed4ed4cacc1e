//! Progress acquisition: cache, refresh gate, circuit breaker and fetcher
//! wired together behind `get_or_fetch`.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::breaker::{BreakerState, CircuitBreaker};
use super::client::{FetchError, Fetcher, Transport};
use super::gate::RefreshGate;
use super::settings::{FeatureFlags, ProjectSettings, StoredConfigs, StoredProjectConfig};
use super::types::{CacheKey, ProgressRecord};
use crate::cache::{keys, CacheResult, DurableStore, KeyValueStore, Lookup, ProgressCache};
use crate::clock::Clock;
use crate::config::PortalConfig;

/// Board segment used when neither the page nor the store knows a board.
pub const NO_BOARD: &str = "none";

/// User-visible message raised once when a project gets blocked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
  pub project_id: String,
  pub status: u16,
  pub message: String,
}

/// One ticket lookup.
#[derive(Debug, Clone, Default)]
pub struct ProgressRequest {
  pub issue: String,
  /// Board the ticket is displayed on; `None` on detail pages
  pub board_id: Option<String>,
  /// Explicit user refresh: skip the cache and the refresh gate
  pub force: bool,
}

impl ProgressRequest {
  pub fn on_board(issue: impl Into<String>, board_id: impl Into<String>) -> Self {
    Self {
      issue: issue.into(),
      board_id: Some(board_id.into()),
      force: false,
    }
  }

  pub fn detail(issue: impl Into<String>) -> Self {
    Self {
      issue: issue.into(),
      board_id: None,
      force: false,
    }
  }

  pub fn forced(mut self) -> Self {
    self.force = true;
    self
  }
}

/// Why no request was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
  /// Project id or portal base missing
  NotConfigured,
  /// Display switched off
  Hidden,
  /// Cached entry expired but the session refreshed recently
  Throttled,
  /// Project blocked after a non-200 answer
  Blocked,
}

/// What a lookup produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
  Found(CacheResult<ProgressRecord>),
  /// The portal answered 200 without extractable data
  NoData,
  Skipped(SkipReason),
  Failed(FetchError),
}

impl Progress {
  #[cfg(test)]
  pub fn record(&self) -> Option<&ProgressRecord> {
    match self {
      Self::Found(result) => Some(&result.data),
      _ => None,
    }
  }
}

/// Session state shared by every lookup.
pub struct PipelineContext {
  store: DurableStore,
  cache: ProgressCache,
  gate: Arc<RefreshGate>,
  breaker: CircuitBreaker,
  fetcher: Fetcher,
  flags: FeatureFlags,
  stored_configs: StoredConfigs,
  notices: Mutex<Option<mpsc::UnboundedSender<Notice>>>,
}

/// Cheaply cloneable handle on a [`PipelineContext`].
#[derive(Clone)]
pub struct Pipeline {
  ctx: Arc<PipelineContext>,
}

impl Pipeline {
  /// Start a session: load cache and refresh clock, and clear the cache when
  /// it is globally stale so it refills cleanly.
  pub fn open(
    store: Arc<dyn KeyValueStore>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    config: &PortalConfig,
  ) -> Self {
    let store = DurableStore::new(store);
    let ttl = config.cache_ttl();
    let gate = Arc::new(RefreshGate::load(
      store.clone(),
      clock.clone(),
      config.refresh_interval(),
    ));
    let cache = ProgressCache::load(store.clone(), clock.clone(), ttl);

    if gate.is_globally_stale(cache.newest_timestamp(), ttl) {
      info!("progress cache is globally stale, clearing");
      cache.clear();
      gate.reset();
    }

    let ctx = PipelineContext {
      cache,
      breaker: CircuitBreaker::new(clock, config.block_cooldown()),
      fetcher: Fetcher::new(transport, gate.clone()),
      gate,
      flags: FeatureFlags::new(store.clone()),
      stored_configs: StoredConfigs::new(store.clone()),
      store,
      notices: Mutex::new(None),
    };
    Self { ctx: Arc::new(ctx) }
  }

  /// Receive a [`Notice`] each time a project gets blocked. Replaces any
  /// earlier subscriber.
  pub fn subscribe_notices(&self) -> mpsc::UnboundedReceiver<Notice> {
    let (tx, rx) = mpsc::unbounded_channel();
    if let Ok(mut notices) = self.ctx.notices.lock() {
      *notices = Some(tx);
    }
    rx
  }

  pub fn flags(&self) -> &FeatureFlags {
    &self.ctx.flags
  }

  pub fn stored_configs(&self) -> &StoredConfigs {
    &self.ctx.stored_configs
  }

  /// Progress for one ticket, from cache or portal.
  pub async fn get_or_fetch(&self, settings: &ProjectSettings, request: &ProgressRequest) -> Progress {
    let ctx = &self.ctx;
    let issue = request.issue.as_str();

    let Some(project_id) = settings.project_id.as_deref() else {
      warn!(project = %settings.project_path, "no project id, progress not loaded");
      return Progress::Skipped(SkipReason::NotConfigured);
    };

    let key = CacheKey::new(self.board_for(request), project_id, issue);
    let mut has_entry = false;
    if !request.force {
      match ctx.cache.lookup(&key) {
        Lookup::Fresh(entry) => {
          debug!(%key, "cache hit");
          return Progress::Found(CacheResult::from_cache(entry.data, to_datetime(entry.timestamp)));
        }
        Lookup::Expired => has_entry = true,
        Lookup::Missing => {}
      }

      // Detail views take a live entry from any board over an unresolved key.
      if request.board_id.is_none() {
        if let Some(entry) = ctx.cache.find_any_board_match(project_id, issue) {
          debug!(%key, "cache hit from another board");
          return Progress::Found(CacheResult::from_other_board(
            entry.data,
            to_datetime(entry.timestamp),
          ));
        }
      }

      if !ctx.flags.show() {
        return Progress::Skipped(SkipReason::Hidden);
      }
    }

    if !ctx.gate.should_fetch(has_entry, request.force) {
      debug!(%key, "refresh gate closed, not refetching");
      return Progress::Skipped(SkipReason::Throttled);
    }

    let Some(url) = settings.portal_url(issue) else {
      warn!(project = %settings.project_path, "no portal base configured, progress not loaded");
      return Progress::Skipped(SkipReason::NotConfigured);
    };

    if let BreakerState::Blocked(block) = ctx.breaker.state(project_id) {
      debug!(
        project_id,
        issue,
        status = ?block.status,
        blocked_at = block.blocked_at,
        "project blocked, request suppressed"
      );
      return Progress::Skipped(SkipReason::Blocked);
    }

    info!(issue, %url, "fetching progress");
    match ctx.fetcher.fetch(&url, issue).await {
      Ok(Some(record)) => {
        ctx.breaker.reset(project_id);
        ctx.cache.set(key, record.clone());
        Progress::Found(CacheResult::from_network(record))
      }
      Ok(None) => {
        ctx.breaker.reset(project_id);
        Progress::NoData
      }
      Err(FetchError::Status(status)) => {
        if ctx.breaker.trip(project_id, Some(status)) {
          self.notify(project_id, status);
        }
        Progress::Failed(FetchError::Status(status))
      }
      Err(e) => {
        error!(issue, error = %e, "portal request failed");
        Progress::Failed(e)
      }
    }
  }

  /// Explicit user refresh: unblock the project and fetch past cache and gate.
  pub async fn force_refresh(
    &self,
    settings: &ProjectSettings,
    request: &ProgressRequest,
  ) -> Progress {
    if let Some(project_id) = settings.project_id.as_deref() {
      self.ctx.breaker.reset(project_id);
    }
    self
      .get_or_fetch(settings, &request.clone().forced())
      .await
  }

  /// Empty the cache, forget the last refresh and lift every block.
  pub fn clear(&self) {
    let entries = self.ctx.cache.len();
    self.ctx.cache.clear();
    self.ctx.gate.reset();
    self.ctx.breaker.reset_all();
    info!(entries, "progress cache cleared");
  }

  /// Store a portal project id for this project. Digits only.
  pub fn save_project_id(&self, settings: &mut ProjectSettings, project_id: &str) -> Result<()> {
    let project_id = project_id.trim();
    if project_id.is_empty() {
      return Err(eyre!("Project id must not be empty"));
    }
    if !project_id.bytes().all(|b| b.is_ascii_digit()) {
      return Err(eyre!("Project id may only contain digits: {}", project_id));
    }
    self.ctx.stored_configs.merge(
      &settings.project_key,
      StoredProjectConfig {
        project_id: Some(project_id.to_string()),
        portal_base_url: None,
      },
    );
    settings.project_id = Some(project_id.to_string());
    self.clear();
    Ok(())
  }

  /// Store a portal base URL for this project.
  pub fn save_portal_base_url(&self, settings: &mut ProjectSettings, base_url: &str) -> Result<()> {
    let base_url = base_url.trim();
    if base_url.is_empty() {
      return Err(eyre!("Portal base URL must not be empty"));
    }
    self.ctx.stored_configs.merge(
      &settings.project_key,
      StoredProjectConfig {
        project_id: None,
        portal_base_url: Some(base_url.to_string()),
      },
    );
    settings.portal_base_url = Some(base_url.to_string());
    self.clear();
    Ok(())
  }

  /// Board segment for the cache key. A board on the page is remembered so
  /// later detail views without one still land on a board-scoped key.
  fn board_for(&self, request: &ProgressRequest) -> String {
    let store = &self.ctx.store;
    match &request.board_id {
      Some(board) => {
        if store.get(keys::LAST_BOARD_ID).as_deref() != Some(board.as_str()) {
          store.set(keys::LAST_BOARD_ID, board);
        }
        board.clone()
      }
      None => store
        .get(keys::LAST_BOARD_ID)
        .unwrap_or_else(|| NO_BOARD.to_string()),
    }
  }

  fn notify(&self, project_id: &str, status: u16) {
    let message = format!(
      "Portal answered with HTTP {} for project {}; requests paused for a while.",
      status, project_id
    );
    warn!("{}", message);
    if let Ok(notices) = self.ctx.notices.lock() {
      if let Some(tx) = notices.as_ref() {
        let _ = tx.send(Notice {
          project_id: project_id.to_string(),
          status,
          message,
        });
      }
    }
  }
}

fn to_datetime(ms: i64) -> DateTime<Utc> {
  DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheSource, MemoryStore};
  use crate::clock::ManualClock;
  use crate::portal::client::testing::FakeTransport;
  use crate::portal::client::HttpResponse;
  use chrono::Duration;

  const T0: i64 = 1_700_000_000_000;

  const TWO_BARS: &str = r#"<html><body><div class="progress">
    <div class="progress-bar">12h</div><div class="progress-bar">4h</div>
  </div></body></html>"#;

  struct Harness {
    clock: Arc<ManualClock>,
    store: Arc<MemoryStore>,
    transport: Arc<FakeTransport>,
    pipeline: Pipeline,
  }

  impl Harness {
    fn new(transport: FakeTransport) -> Self {
      Self::with_store(transport, Arc::new(MemoryStore::new()), Arc::new(ManualClock::at_ms(T0)))
    }

    fn with_store(transport: FakeTransport, store: Arc<MemoryStore>, clock: Arc<ManualClock>) -> Self {
      let transport = Arc::new(transport);
      let pipeline = Pipeline::open(
        store.clone(),
        transport.clone(),
        clock.clone(),
        &PortalConfig::default(),
      );
      Self {
        clock,
        store,
        transport,
        pipeline,
      }
    }

    fn calls(&self) -> usize {
      self.transport.calls().len()
    }
  }

  fn settings() -> ProjectSettings {
    ProjectSettings {
      project_path: "ai/ai-portal".into(),
      project_key: "gitlab.example.com|ai/ai-portal".into(),
      project_id: Some("42".into()),
      portal_base_url: Some("https://portal.example.com".into()),
    }
  }

  fn two_bars() -> ProgressRecord {
    ProgressRecord::progress("12h", Some("4h".into()))
  }

  #[tokio::test]
  async fn test_fetch_then_cache_hit() {
    let h = Harness::new(FakeTransport::always(200, TWO_BARS));
    let request = ProgressRequest::on_board("7", "5");

    let first = h.pipeline.get_or_fetch(&settings(), &request).await;
    assert_eq!(first, Progress::Found(CacheResult::from_network(two_bars())));
    assert_eq!(
      h.transport.calls(),
      ["https://portal.example.com/management/project/42/booking-label/%237/"]
    );

    let snapshot = DurableStore::new(h.store.clone())
      .get(keys::CACHE_SNAPSHOT)
      .unwrap();
    assert!(snapshot.contains("board:5|42:7"));

    let second = h.pipeline.get_or_fetch(&settings(), &request).await;
    assert_eq!(second.record(), Some(&two_bars()));
    assert!(matches!(
      second,
      Progress::Found(CacheResult {
        source: CacheSource::CacheFresh,
        ..
      })
    ));
    assert_eq!(h.calls(), 1);
  }

  #[tokio::test]
  async fn test_non_200_blocks_project_until_cooldown() {
    let h = Harness::new(FakeTransport::always(500, "oops"));
    let mut rx = h.pipeline.subscribe_notices();
    let pipeline = h.pipeline.clone();

    let first = pipeline
      .get_or_fetch(&settings(), &ProgressRequest::on_board("7", "5"))
      .await;
    assert_eq!(first, Progress::Failed(FetchError::Status(500)));

    let second = pipeline
      .get_or_fetch(&settings(), &ProgressRequest::on_board("8", "5"))
      .await;
    assert_eq!(second, Progress::Skipped(SkipReason::Blocked));
    assert_eq!(h.transport.calls().len(), 1);

    let notice = rx.try_recv().unwrap();
    assert_eq!(notice.status, 500);
    assert!(notice.message.contains("HTTP 500 for project 42"));
    assert_eq!(notice.project_id, "42");
    assert!(rx.try_recv().is_err());

    h.clock.advance(Duration::minutes(5) + Duration::milliseconds(1));
    let third = pipeline
      .get_or_fetch(&settings(), &ProgressRequest::on_board("8", "5"))
      .await;
    assert_eq!(third, Progress::Failed(FetchError::Status(500)));
    assert_eq!(h.transport.calls().len(), 2);
    assert!(rx.try_recv().is_ok());
  }

  #[tokio::test]
  async fn test_block_is_per_project() {
    let transport = FakeTransport::new(|url| {
      let status = if url.contains("/project/42/") { 404 } else { 200 };
      Ok(HttpResponse {
        status,
        body: TWO_BARS.to_string(),
      })
    });
    let h = Harness::new(transport);
    let other = ProjectSettings {
      project_id: Some("43".into()),
      ..settings()
    };
    let request = ProgressRequest::on_board("7", "5");

    h.pipeline.get_or_fetch(&settings(), &request).await;
    let result = h.pipeline.get_or_fetch(&other, &request).await;
    assert_eq!(result.record(), Some(&two_bars()));
  }

  #[tokio::test]
  async fn test_successful_fetch_clears_block() {
    let responses = std::sync::Mutex::new(vec![200, 503]);
    let h = Harness::new(FakeTransport::new(move |_| {
      let status = responses.lock().unwrap().pop().unwrap_or(200);
      Ok(HttpResponse {
        status,
        body: TWO_BARS.to_string(),
      })
    }));
    let request = ProgressRequest::on_board("7", "5");

    let first = h.pipeline.get_or_fetch(&settings(), &request).await;
    assert_eq!(first, Progress::Failed(FetchError::Status(503)));

    let forced = h.pipeline.force_refresh(&settings(), &request).await;
    assert_eq!(forced.record(), Some(&two_bars()));

    let other = h
      .pipeline
      .get_or_fetch(&settings(), &ProgressRequest::on_board("8", "5"))
      .await;
    assert_eq!(other.record(), Some(&two_bars()));
    assert_eq!(h.calls(), 3);
  }

  #[tokio::test]
  async fn test_transport_failure_does_not_block() {
    let h = Harness::new(FakeTransport::new(|_| {
      Err(FetchError::Transport("dns".into()))
    }));
    let request = ProgressRequest::on_board("7", "5");

    for _ in 0..2 {
      let result = h.pipeline.get_or_fetch(&settings(), &request).await;
      assert_eq!(result, Progress::Failed(FetchError::Transport("dns".into())));
    }
    assert_eq!(h.calls(), 2);
  }

  #[tokio::test]
  async fn test_no_data_is_not_cached_but_advances_clock() {
    let h = Harness::new(FakeTransport::always(200, "<form>login</form>"));
    let request = ProgressRequest::on_board("7", "5");

    assert_eq!(h.pipeline.get_or_fetch(&settings(), &request).await, Progress::NoData);
    assert_eq!(h.pipeline.ctx.gate.last_refresh(), Some(T0));
    assert_eq!(h.pipeline.ctx.cache.len(), 0);

    assert_eq!(h.pipeline.get_or_fetch(&settings(), &request).await, Progress::NoData);
    assert_eq!(h.calls(), 2);
  }

  #[tokio::test]
  async fn test_expired_entry_waits_for_global_refresh() {
    let h = Harness::new(FakeTransport::always(200, TWO_BARS));
    let seven = ProgressRequest::on_board("7", "5");
    let eight = ProgressRequest::on_board("8", "5");

    h.pipeline.get_or_fetch(&settings(), &seven).await;
    h.clock.advance(Duration::minutes(30));
    h.pipeline.get_or_fetch(&settings(), &eight).await;

    // Entry 7 expired, but the session refreshed 31 minutes ago.
    h.clock.advance(Duration::minutes(31));
    let result = h.pipeline.get_or_fetch(&settings(), &seven).await;
    assert_eq!(result, Progress::Skipped(SkipReason::Throttled));
    assert_eq!(h.calls(), 2);

    h.clock.advance(Duration::minutes(30));
    let result = h.pipeline.get_or_fetch(&settings(), &eight).await;
    assert_eq!(result.record(), Some(&two_bars()));
    assert_eq!(h.calls(), 3);
  }

  #[tokio::test]
  async fn test_detail_view_borrows_other_board_entry() {
    let h = Harness::new(FakeTransport::always(200, TWO_BARS));
    h.pipeline
      .get_or_fetch(&settings(), &ProgressRequest::on_board("7", "5"))
      .await;

    // Another board becomes the last seen one.
    h.pipeline
      .get_or_fetch(&settings(), &ProgressRequest::on_board("9", "6"))
      .await;

    let result = h
      .pipeline
      .get_or_fetch(&settings(), &ProgressRequest::detail("7"))
      .await;
    assert!(matches!(
      result,
      Progress::Found(CacheResult {
        source: CacheSource::OtherBoard,
        ..
      })
    ));
    assert_eq!(h.calls(), 2);
  }

  #[tokio::test]
  async fn test_detail_view_prefers_live_entry_over_expired_last_board() {
    let h = Harness::new(FakeTransport::always(200, TWO_BARS));
    h.pipeline
      .get_or_fetch(&settings(), &ProgressRequest::on_board("7", "5"))
      .await;
    h.clock.advance(Duration::minutes(30));
    h.pipeline
      .get_or_fetch(&settings(), &ProgressRequest::on_board("7", "9"))
      .await;
    h.clock.advance(Duration::minutes(5));
    h.pipeline
      .get_or_fetch(&settings(), &ProgressRequest::on_board("8", "5"))
      .await;
    assert_eq!(h.calls(), 3);

    // Board 5 is the last board and its entry for #7 has expired; board 9
    // still holds a live one.
    h.clock.advance(Duration::minutes(26));
    let result = h
      .pipeline
      .get_or_fetch(&settings(), &ProgressRequest::detail("7"))
      .await;
    assert!(matches!(
      result,
      Progress::Found(CacheResult {
        source: CacheSource::OtherBoard,
        ..
      })
    ));
    assert_eq!(result.record(), Some(&two_bars()));
    assert_eq!(h.calls(), 3);
  }

  #[tokio::test]
  async fn test_detail_view_uses_last_board_key() {
    let h = Harness::new(FakeTransport::always(200, TWO_BARS));
    h.pipeline
      .get_or_fetch(&settings(), &ProgressRequest::on_board("7", "5"))
      .await;

    let result = h
      .pipeline
      .get_or_fetch(&settings(), &ProgressRequest::detail("7"))
      .await;
    assert!(matches!(
      result,
      Progress::Found(CacheResult {
        source: CacheSource::CacheFresh,
        ..
      })
    ));
  }

  #[tokio::test]
  async fn test_detail_view_without_any_board() {
    let h = Harness::new(FakeTransport::always(200, TWO_BARS));
    h.pipeline
      .get_or_fetch(&settings(), &ProgressRequest::detail("7"))
      .await;
    assert!(h
      .pipeline
      .ctx
      .cache
      .get(&CacheKey::new(NO_BOARD, "42", "7"))
      .is_some());
  }

  #[tokio::test]
  async fn test_hidden_skips_fetch_but_serves_cache() {
    let h = Harness::new(FakeTransport::always(200, TWO_BARS));
    let request = ProgressRequest::on_board("7", "5");
    h.pipeline.get_or_fetch(&settings(), &request).await;
    h.pipeline.flags().set_show(false);

    let cached = h.pipeline.get_or_fetch(&settings(), &request).await;
    assert_eq!(cached.record(), Some(&two_bars()));

    let missing = h
      .pipeline
      .get_or_fetch(&settings(), &ProgressRequest::on_board("8", "5"))
      .await;
    assert_eq!(missing, Progress::Skipped(SkipReason::Hidden));
    assert_eq!(h.calls(), 1);
  }

  #[tokio::test]
  async fn test_unconfigured_project_is_skipped() {
    let h = Harness::new(FakeTransport::always(200, TWO_BARS));
    let request = ProgressRequest::on_board("7", "5");

    let no_id = ProjectSettings {
      project_id: None,
      ..settings()
    };
    let no_base = ProjectSettings {
      portal_base_url: None,
      ..settings()
    };
    assert_eq!(
      h.pipeline.get_or_fetch(&no_id, &request).await,
      Progress::Skipped(SkipReason::NotConfigured)
    );
    assert_eq!(
      h.pipeline.get_or_fetch(&no_base, &request).await,
      Progress::Skipped(SkipReason::NotConfigured)
    );
    assert_eq!(h.calls(), 0);
  }

  #[tokio::test]
  async fn test_concurrent_lookups_all_persist() {
    let h = Harness::new(FakeTransport::always(200, TWO_BARS));
    let settings = settings();
    let requests: Vec<ProgressRequest> = (1..=5)
      .map(|issue| ProgressRequest::on_board(issue.to_string(), "5"))
      .collect();

    let results =
      futures::future::join_all(requests.iter().map(|r| h.pipeline.get_or_fetch(&settings, r))).await;
    assert!(results.iter().all(|r| r.record().is_some()));

    let reopened = Harness::with_store(
      FakeTransport::always(500, ""),
      h.store.clone(),
      h.clock.clone(),
    );
    assert_eq!(reopened.pipeline.ctx.cache.len(), 5);
  }

  #[tokio::test]
  async fn test_stale_session_starts_with_empty_cache() {
    let h = Harness::new(FakeTransport::always(200, TWO_BARS));
    h.pipeline
      .get_or_fetch(&settings(), &ProgressRequest::on_board("7", "5"))
      .await;

    h.clock.advance(Duration::minutes(61));
    let reopened = Harness::with_store(
      FakeTransport::always(200, TWO_BARS),
      h.store.clone(),
      h.clock.clone(),
    );
    assert_eq!(reopened.pipeline.ctx.cache.len(), 0);
    assert_eq!(reopened.pipeline.ctx.gate.last_refresh(), None);
  }

  #[tokio::test]
  async fn test_clear_resets_everything() {
    let h = Harness::new(FakeTransport::always(200, TWO_BARS));
    let request = ProgressRequest::on_board("7", "5");
    h.pipeline.get_or_fetch(&settings(), &request).await;
    h.pipeline.ctx.breaker.trip("42", Some(500));

    h.pipeline.clear();
    assert_eq!(h.pipeline.ctx.cache.len(), 0);
    assert_eq!(h.pipeline.ctx.gate.last_refresh(), None);

    let result = h.pipeline.get_or_fetch(&settings(), &request).await;
    assert_eq!(result.record(), Some(&two_bars()));
    assert_eq!(h.calls(), 2);
  }

  #[tokio::test]
  async fn test_save_project_id_validates_and_clears() {
    let h = Harness::new(FakeTransport::always(200, TWO_BARS));
    let mut settings = settings();
    h.pipeline
      .get_or_fetch(&settings, &ProgressRequest::on_board("7", "5"))
      .await;

    assert!(h.pipeline.save_project_id(&mut settings, "4x").is_err());
    assert!(h.pipeline.save_project_id(&mut settings, " ").is_err());
    assert_eq!(h.pipeline.ctx.cache.len(), 1);

    h.pipeline.save_project_id(&mut settings, " 77 ").unwrap();
    assert_eq!(settings.project_id.as_deref(), Some("77"));
    assert_eq!(h.pipeline.ctx.cache.len(), 0);
    assert_eq!(
      h.pipeline.stored_configs().get(&settings.project_key).unwrap().project_id.as_deref(),
      Some("77")
    );

    h.pipeline
      .save_portal_base_url(&mut settings, "portal.other.com")
      .unwrap();
    let stored = h.pipeline.stored_configs().get(&settings.project_key).unwrap();
    assert_eq!(stored.project_id.as_deref(), Some("77"));
    assert_eq!(stored.portal_base_url.as_deref(), Some("portal.other.com"));
    assert!(h.pipeline.save_portal_base_url(&mut settings, "").is_err());
  }
}
