/// Streaming Import
///
/// A streaming session polls a payload source on a fixed interval and appends newly
/// observed rows to a shared target table. Sessions are keyed by endpoint string and at
/// most one is active per endpoint.
///
/// Sources are treated as cumulative feeds: every payload carries the whole dataset so
/// far. A session keeps a watermark of payload rows already consumed, starting at the
/// target's row count, and appends only the rows past it. A payload shorter than the
/// watermark means the feed was reset; the watermark drops to its length and nothing is
/// appended.
///
/// Stopping a session signals its polling task, which exits before its next poll. A
/// payload that was already fetched when the stop arrives is discarded without touching
/// the table, and rows appended earlier stay in place.
///
/// Poll outcomes are reported as [`StreamEvent`]s on the channel returned by
/// [`StreamManager::new`]. A failed fetch or parse is reported and the session keeps
/// polling.

use crate::column::Column;
use crate::error::{EngineError, Result};
use crate::import::{self, DataFormat, RawTable};
use crate::table::{SharedTable, Table};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Per-request timeout for HTTP sources.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a session gets its payloads from.
#[async_trait]
pub trait PayloadSource: Send + Sync {
    async fn fetch(&self) -> Result<String>;
}

/// Fetches an HTTP(S) URL with `reqwest`.
pub struct HttpSource {
    client: reqwest::Client,
    url: String,
}

impl HttpSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpSource {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl PayloadSource for HttpSource {
    async fn fetch(&self) -> Result<String> {
        import::fetch_text(&self.client, &self.url).await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    pub endpoint: String,
    pub format: DataFormat,
    pub poll_interval: Duration,
}

impl StreamConfig {
    pub fn new(endpoint: impl Into<String>, format: DataFormat, poll_interval: Duration) -> Self {
        StreamConfig {
            endpoint: endpoint.into(),
            format,
            poll_interval,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(EngineError::InvalidFormat(format!(
                "poll interval for '{}' must be positive",
                self.endpoint
            )));
        }
        Ok(())
    }
}

/// What to do when the endpoint already has an active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartMode {
    /// Leave the running session alone
    #[default]
    KeepExisting,
    /// Return `SessionAlreadyActive`
    FailIfActive,
    /// Stop the running session and start a new one
    Restart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyActive,
    Restarted,
}

/// Poll outcome of one session. `generation` tells a restarted session's events apart
/// from those of the session it replaced.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    RowsAppended {
        endpoint: String,
        generation: u64,
        rows: usize,
        total_rows: usize,
    },
    PollFailed {
        endpoint: String,
        generation: u64,
        error: EngineError,
    },
    Stopped {
        endpoint: String,
        generation: u64,
    },
}

#[derive(Debug, Default)]
struct SessionCounters {
    active: AtomicBool,
    polls: AtomicU64,
    rows_appended: AtomicU64,
}

/// Handle to one running polling loop.
pub struct StreamingSession {
    config: StreamConfig,
    generation: u64,
    target: SharedTable,
    counters: Arc<SessionCounters>,
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl StreamingSession {
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    pub fn format(&self) -> DataFormat {
        self.config.format
    }

    pub fn poll_interval(&self) -> Duration {
        self.config.poll_interval
    }

    /// Distinct for every session the manager starts.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn target(&self) -> &SharedTable {
        &self.target
    }

    pub fn is_active(&self) -> bool {
        self.counters.active.load(Ordering::SeqCst) && !self.task.is_finished()
    }

    /// Completed polls, successful or not.
    pub fn polls(&self) -> u64 {
        self.counters.polls.load(Ordering::SeqCst)
    }

    pub fn rows_appended(&self) -> u64 {
        self.counters.rows_appended.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        self.counters.active.store(false, Ordering::SeqCst);
        // The task may already be gone, in which case nobody is listening
        let _ = self.cancel.send(true);
    }
}

impl std::fmt::Debug for StreamingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingSession")
            .field("endpoint", &self.config.endpoint)
            .field("generation", &self.generation)
            .field("format", &self.config.format)
            .field("poll_interval", &self.config.poll_interval)
            .field("active", &self.is_active())
            .field("polls", &self.polls())
            .field("rows_appended", &self.rows_appended())
            .finish()
    }
}

/// Owns every streaming session, keyed by endpoint.
pub struct StreamManager {
    sessions: HashMap<String, StreamingSession>,
    next_generation: u64,
    events: mpsc::UnboundedSender<StreamEvent>,
}

impl StreamManager {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let manager = StreamManager {
            sessions: HashMap::new(),
            next_generation: 1,
            events,
        };
        (manager, receiver)
    }

    /// Start polling `config.endpoint` over HTTP from within a Tokio runtime.
    pub fn start(&mut self, config: StreamConfig, target: SharedTable, mode: StartMode) -> Result<StartOutcome> {
        config.validate()?;
        let source = Arc::new(HttpSource::new(config.endpoint.clone(), REQUEST_TIMEOUT)?);
        self.start_with_source(config, target, source, mode)
    }

    pub fn start_with_source(
        &mut self,
        config: StreamConfig,
        target: SharedTable,
        source: Arc<dyn PayloadSource>,
        mode: StartMode,
    ) -> Result<StartOutcome> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            EngineError::InvalidFormat("streaming needs a running Tokio runtime".to_string())
        })?;

        let mut outcome = StartOutcome::Started;
        if self.is_active(&config.endpoint) {
            match mode {
                StartMode::KeepExisting => {
                    log::debug!("stream '{}' already active, keeping it", config.endpoint);
                    return Ok(StartOutcome::AlreadyActive);
                }
                StartMode::FailIfActive => {
                    return Err(EngineError::SessionAlreadyActive(config.endpoint));
                }
                StartMode::Restart => {
                    self.stop(&config.endpoint);
                    outcome = StartOutcome::Restarted;
                }
            }
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        let counters = Arc::new(SessionCounters::default());
        counters.active.store(true, Ordering::SeqCst);
        let (cancel, cancelled) = watch::channel(false);
        let task = runtime.spawn(run_session(
            config.clone(),
            generation,
            Arc::clone(&target),
            source,
            Arc::clone(&counters),
            cancelled,
            self.events.clone(),
        ));

        log::info!(
            "started stream '{}' (generation {}) every {:?} ({:?})",
            config.endpoint,
            generation,
            config.poll_interval,
            config.format
        );
        let session = StreamingSession {
            config,
            generation,
            target,
            counters,
            cancel,
            task,
        };
        self.sessions.insert(session.endpoint().to_string(), session);
        Ok(outcome)
    }

    /// Stop the session for `endpoint`. Returns false if there was none.
    pub fn stop(&mut self, endpoint: &str) -> bool {
        match self.sessions.remove(endpoint) {
            Some(session) => {
                session.cancel();
                log::info!(
                    "stopping stream '{}' after {} polls",
                    endpoint,
                    session.polls()
                );
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&mut self) {
        for (endpoint, session) in self.sessions.drain() {
            session.cancel();
            log::info!("stopping stream '{}'", endpoint);
        }
    }

    pub fn is_active(&self, endpoint: &str) -> bool {
        self.sessions
            .get(endpoint)
            .map(StreamingSession::is_active)
            .unwrap_or(false)
    }

    pub fn session(&self, endpoint: &str) -> Option<&StreamingSession> {
        self.sessions.get(endpoint)
    }

    pub fn active_endpoints(&self) -> Vec<String> {
        let mut endpoints: Vec<String> = self
            .sessions
            .values()
            .filter(|s| s.is_active())
            .map(|s| s.endpoint().to_string())
            .collect();
        endpoints.sort();
        endpoints
    }
}

impl Drop for StreamManager {
    fn drop(&mut self) {
        self.stop_all();
    }
}

async fn run_session(
    config: StreamConfig,
    generation: u64,
    target: SharedTable,
    source: Arc<dyn PayloadSource>,
    counters: Arc<SessionCounters>,
    mut cancelled: watch::Receiver<bool>,
    events: mpsc::UnboundedSender<StreamEvent>,
) {
    let endpoint = config.endpoint.clone();
    let mut ticker = tokio::time::interval(config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut consumed = target.read().unwrap_or_else(|e| e.into_inner()).row_count();

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = cancelled.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
        if *cancelled.borrow() {
            break;
        }

        let fetched = source.fetch().await;
        if *cancelled.borrow() {
            log::debug!("stream '{}' stopped mid-fetch, discarding payload", endpoint);
            break;
        }

        let outcome =
            fetched.and_then(|text| ingest(&target, &text, config.format, &endpoint, &mut consumed));
        counters.polls.fetch_add(1, Ordering::SeqCst);
        // Send errors only mean nobody is listening for events
        match outcome {
            Ok((0, _)) => log::debug!("stream '{}' payload had no new rows", endpoint),
            Ok((rows, total_rows)) => {
                counters.rows_appended.fetch_add(rows as u64, Ordering::SeqCst);
                log::debug!("stream '{}' appended {} rows ({} total)", endpoint, rows, total_rows);
                let _ = events.send(StreamEvent::RowsAppended {
                    endpoint: endpoint.clone(),
                    generation,
                    rows,
                    total_rows,
                });
            }
            Err(error) => {
                log::warn!("stream '{}' poll failed: {}", endpoint, error);
                let _ = events.send(StreamEvent::PollFailed {
                    endpoint: endpoint.clone(),
                    generation,
                    error,
                });
            }
        }
    }

    counters.active.store(false, Ordering::SeqCst);
    log::info!("stream '{}' stopped", endpoint);
    let _ = events.send(StreamEvent::Stopped { endpoint, generation });
}

/// Parse one payload and append the rows past `consumed` under the write lock.
///
/// Returns the rows appended and the table's row count afterwards. `consumed` only
/// advances once the rows are in the table.
fn ingest(
    target: &SharedTable,
    text: &str,
    format: DataFormat,
    endpoint: &str,
    consumed: &mut usize,
) -> Result<(usize, usize)> {
    let mut raw = match import::parse_payload(text, format) {
        Ok(raw) => raw,
        Err(EngineError::NoData) => return Ok((0, 0)),
        Err(e) => return Err(e),
    };
    let observed = raw.rows.len();
    if observed < *consumed {
        log::info!(
            "stream '{}' payload shrank from {} to {} rows, treating it as a reset",
            endpoint,
            *consumed,
            observed
        );
        *consumed = observed;
        return Ok((0, 0));
    }
    raw.rows.drain(..*consumed);
    if raw.rows.is_empty() {
        return Ok((0, 0));
    }

    // A poisoned lock still holds a consistent table, since every mutation validates first
    let mut table = target.write().unwrap_or_else(|e| e.into_inner());
    let description = format!("Streamed {} rows from {}", raw.rows.len(), endpoint);
    let appended = if table.column_count() == 0 {
        let columns = inferred_columns(raw);
        table.adopt_columns(columns, description)?
    } else {
        let rows = align_rows(&table, raw)?;
        table.append_rows(rows, description)?
    };
    *consumed = observed;
    Ok((appended, table.row_count()))
}

fn inferred_columns(raw: RawTable) -> Vec<Column> {
    let mut cells: Vec<Vec<String>> = vec![Vec::with_capacity(raw.rows.len()); raw.names.len()];
    for row in raw.rows {
        for (column, value) in cells.iter_mut().zip(row) {
            column.push(value);
        }
    }
    raw.names
        .into_iter()
        .zip(cells)
        .map(|(name, values)| Column::inferred(name, values))
        .collect()
}

/// Reorder payload cells into the table's column order, matching by name.
fn align_rows(table: &Table, raw: RawTable) -> Result<Vec<Vec<String>>> {
    let expected: Vec<String> = table.column_names().iter().map(|s| s.to_string()).collect();
    let mut sorted_expected = expected.clone();
    sorted_expected.sort();
    let mut sorted_actual = raw.names.clone();
    sorted_actual.sort();
    if sorted_expected != sorted_actual {
        return Err(EngineError::SchemaMismatch {
            expected,
            actual: raw.names,
        });
    }

    let positions: Vec<usize> = expected
        .iter()
        .filter_map(|name| raw.names.iter().position(|n| n == name))
        .collect();
    Ok(raw
        .rows
        .into_iter()
        .map(|row| positions.iter().map(|&i| row[i].clone()).collect())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MutationKind;
    use crate::import::import_delimited;
    use crate::table::shared;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Serves queued payloads in order, then empty bodies.
    struct ScriptedSource {
        payloads: Mutex<VecDeque<Result<String>>>,
    }

    impl ScriptedSource {
        fn new(payloads: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(ScriptedSource {
                payloads: Mutex::new(payloads.into()),
            })
        }
    }

    #[async_trait]
    impl PayloadSource for ScriptedSource {
        async fn fetch(&self) -> Result<String> {
            self.payloads
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }

    fn csv_rows(start: usize, count: usize) -> String {
        let mut text = String::from("id,value\n");
        for i in start..start + count {
            text.push_str(&format!("{},v{}\n", i, i));
        }
        text
    }

    fn config(endpoint: &str, format: DataFormat) -> StreamConfig {
        StreamConfig::new(endpoint, format, Duration::from_millis(10))
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<StreamEvent>) -> StreamEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for a stream event")
            .expect("event channel closed")
    }

    async fn wait_for_polls(manager: &StreamManager, endpoint: &str, polls: u64) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while manager.session(endpoint).map(StreamingSession::polls).unwrap_or(0) < polls {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for polls");
    }

    #[tokio::test]
    async fn test_two_payloads_append_eight_rows() {
        let table = shared(import_delimited("feed", &csv_rows(1, 2), ',', true).unwrap());
        let (mut manager, mut rx) = StreamManager::new();
        // The feed serves its whole dataset on every poll
        let source = ScriptedSource::new(vec![Ok(csv_rows(1, 7)), Ok(csv_rows(1, 10))]);

        let outcome = manager
            .start_with_source(config("mem://feed", DataFormat::csv()), table.clone(), source, StartMode::default())
            .unwrap();
        assert_eq!(outcome, StartOutcome::Started);

        let mut appended = Vec::new();
        while appended.len() < 2 {
            if let StreamEvent::RowsAppended { rows, total_rows, .. } = next_event(&mut rx).await {
                appended.push((rows, total_rows));
            }
        }
        assert_eq!(appended, vec![(5, 7), (3, 10)]);

        assert!(manager.stop("mem://feed"));
        loop {
            if let StreamEvent::Stopped { endpoint, .. } = next_event(&mut rx).await {
                assert_eq!(endpoint, "mem://feed");
                break;
            }
        }

        let table = table.read().unwrap();
        assert_eq!(table.row_count(), 10);
        assert_eq!(table.history().of_kind(MutationKind::Import).count(), 3);
        let ids: Vec<&str> = (0..10).filter_map(|i| table.get_value(i, "id")).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4", "5", "6", "7", "8", "9", "10"]);
    }

    #[tokio::test]
    async fn test_repeated_payload_appends_nothing_new() {
        let table = shared(import_delimited("feed", &csv_rows(1, 2), ',', true).unwrap());
        let (mut manager, mut rx) = StreamManager::new();
        let source = ScriptedSource::new(vec![Ok(csv_rows(1, 3)), Ok(csv_rows(1, 3))]);
        manager
            .start_with_source(config("mem://same", DataFormat::csv()), table.clone(), source, StartMode::default())
            .unwrap();

        match next_event(&mut rx).await {
            StreamEvent::RowsAppended { rows, total_rows, .. } => assert_eq!((rows, total_rows), (1, 3)),
            other => panic!("unexpected event {:?}", other),
        }
        wait_for_polls(&manager, "mem://same", 2).await;
        let session = manager.session("mem://same").unwrap();
        assert_eq!(session.rows_appended(), 1);
        manager.stop("mem://same");

        let table = table.read().unwrap();
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.history().of_kind(MutationKind::Import).count(), 2);
    }

    #[tokio::test]
    async fn test_failed_poll_keeps_session_running() {
        let table = shared(import_delimited("feed", &csv_rows(1, 1), ',', true).unwrap());
        let (mut manager, mut rx) = StreamManager::new();
        let source = ScriptedSource::new(vec![
            Err(EngineError::NetworkFailure("connection refused".to_string())),
            Ok(csv_rows(1, 3)),
        ]);
        manager
            .start_with_source(config("mem://flaky", DataFormat::csv()), table.clone(), source, StartMode::default())
            .unwrap();

        match next_event(&mut rx).await {
            StreamEvent::PollFailed { error, .. } => assert!(error.is_retryable()),
            other => panic!("unexpected event {:?}", other),
        }
        match next_event(&mut rx).await {
            StreamEvent::RowsAppended { rows, .. } => assert_eq!(rows, 2),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(manager.is_active("mem://flaky"));
        assert!(manager.session("mem://flaky").unwrap().polls() >= 2);
        manager.stop_all();
        assert!(manager.active_endpoints().is_empty());
    }

    #[tokio::test]
    async fn test_schema_mismatch_is_skipped() {
        let table = shared(import_delimited("feed", &csv_rows(1, 1), ',', true).unwrap());
        let (mut manager, mut rx) = StreamManager::new();
        let source = ScriptedSource::new(vec![Ok("id,other\n1,x\n2,y\n".to_string()), Ok(csv_rows(1, 2))]);
        manager
            .start_with_source(config("mem://drift", DataFormat::csv()), table.clone(), source, StartMode::default())
            .unwrap();

        match next_event(&mut rx).await {
            StreamEvent::PollFailed { error, .. } => {
                assert!(matches!(error, EngineError::SchemaMismatch { .. }))
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(next_event(&mut rx).await, StreamEvent::RowsAppended { rows: 1, .. }));
        manager.stop("mem://drift");
        assert_eq!(table.read().unwrap().row_count(), 2);
    }

    #[tokio::test]
    async fn test_json_payload_defines_shape_of_empty_table() {
        let table = shared(Table::new("live"));
        let (mut manager, mut rx) = StreamManager::new();
        let source = ScriptedSource::new(vec![
            Ok(r#"[{"b": "x", "a": 1}, {"a": 2, "b": "y"}]"#.to_string()),
            Ok(r#"[{"b": "x", "a": 1}, {"a": 2, "b": "y"}, {"b": "z", "a": 3}]"#.to_string()),
        ]);
        manager
            .start_with_source(config("mem://json", DataFormat::Json), table.clone(), source, StartMode::default())
            .unwrap();

        let mut seen = 0;
        while seen < 2 {
            if let StreamEvent::RowsAppended { .. } = next_event(&mut rx).await {
                seen += 1;
            }
        }
        manager.stop("mem://json");

        let table = table.read().unwrap();
        assert_eq!(table.column_names(), vec!["a", "b"]);
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.get_value(2, "b"), Some("z"));
        assert_eq!(table.history().of_kind(MutationKind::Import).count(), 2);
    }

    #[tokio::test]
    async fn test_start_modes() {
        let table = shared(Table::new("t"));
        let (mut manager, _rx) = StreamManager::new();
        let cfg = StreamConfig::new("mem://modes", DataFormat::csv(), Duration::from_secs(60));

        let start = |manager: &mut StreamManager, mode| {
            manager.start_with_source(cfg.clone(), table.clone(), ScriptedSource::new(vec![]), mode)
        };
        assert_eq!(start(&mut manager, StartMode::KeepExisting).unwrap(), StartOutcome::Started);
        assert_eq!(start(&mut manager, StartMode::KeepExisting).unwrap(), StartOutcome::AlreadyActive);
        assert!(matches!(
            start(&mut manager, StartMode::FailIfActive),
            Err(EngineError::SessionAlreadyActive(_))
        ));
        assert_eq!(start(&mut manager, StartMode::Restart).unwrap(), StartOutcome::Restarted);
        assert_eq!(manager.active_endpoints(), vec!["mem://modes".to_string()]);

        assert!(manager.stop("mem://modes"));
        assert!(!manager.stop("mem://modes"));
        assert!(!manager.is_active("mem://modes"));
    }

    #[tokio::test]
    async fn test_restart_stop_event_carries_old_generation() {
        let table = shared(Table::new("t"));
        let (mut manager, mut rx) = StreamManager::new();
        let cfg = StreamConfig::new("mem://restart", DataFormat::csv(), Duration::from_secs(60));

        manager
            .start_with_source(cfg.clone(), table.clone(), ScriptedSource::new(vec![]), StartMode::default())
            .unwrap();
        let first = manager.session("mem://restart").unwrap().generation();
        manager
            .start_with_source(cfg, table, ScriptedSource::new(vec![]), StartMode::Restart)
            .unwrap();
        let second = manager.session("mem://restart").unwrap().generation();
        assert_ne!(first, second);

        loop {
            if let StreamEvent::Stopped { endpoint, generation } = next_event(&mut rx).await {
                assert_eq!(endpoint, "mem://restart");
                assert_eq!(generation, first);
                break;
            }
        }
        assert!(manager.is_active("mem://restart"));
        manager.stop_all();
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let (mut manager, _rx) = StreamManager::new();
        let cfg = StreamConfig::new("mem://zero", DataFormat::Json, Duration::ZERO);
        let result = manager.start_with_source(cfg, shared(Table::new("t")), ScriptedSource::new(vec![]), StartMode::default());
        assert!(matches!(result, Err(EngineError::InvalidFormat(_))));
        assert!(manager.active_endpoints().is_empty());
    }

    #[test]
    fn test_empty_payload_records_nothing() {
        let table = shared(import_delimited("feed", &csv_rows(1, 1), ',', true).unwrap());
        let mut consumed = 1;
        assert_eq!(ingest(&table, "", DataFormat::csv(), "e", &mut consumed).unwrap(), (0, 0));
        assert_eq!(consumed, 1);
        assert_eq!(ingest(&table, "id,value\n", DataFormat::csv(), "e", &mut consumed).unwrap(), (0, 0));
        assert_eq!(ingest(&table, "[]", DataFormat::Json, "e", &mut consumed).unwrap(), (0, 0));
        assert_eq!(table.read().unwrap().history().len(), 1);
    }

    #[test]
    fn test_watermark_follows_the_feed() {
        let table = shared(import_delimited("feed", &csv_rows(1, 2), ',', true).unwrap());
        let mut consumed = 2;
        assert_eq!(ingest(&table, &csv_rows(1, 2), DataFormat::csv(), "e", &mut consumed).unwrap(), (0, 0));
        assert_eq!(ingest(&table, &csv_rows(1, 4), DataFormat::csv(), "e", &mut consumed).unwrap(), (2, 4));
        assert_eq!(consumed, 4);

        // Rows the table rejects are offered again on the next poll
        let drifted = "id,other\n1,a\n2,b\n3,c\n4,d\n5,e\n";
        assert!(ingest(&table, drifted, DataFormat::csv(), "e", &mut consumed).is_err());
        assert_eq!(consumed, 4);

        // A shorter payload resets the watermark without touching the table
        assert_eq!(ingest(&table, &csv_rows(9, 1), DataFormat::csv(), "e", &mut consumed).unwrap(), (0, 0));
        assert_eq!(consumed, 1);
        assert_eq!(ingest(&table, &csv_rows(9, 2), DataFormat::csv(), "e", &mut consumed).unwrap(), (1, 5));

        let table = table.read().unwrap();
        assert_eq!(table.get_value(4, "id"), Some("10"));
        assert_eq!(table.history().of_kind(MutationKind::Import).count(), 3);
    }

    #[test]
    fn test_align_rows_matches_by_name() {
        let table = import_delimited("t", "id,value\n1,a\n", ',', true).unwrap();
        let raw = RawTable {
            names: vec!["value".to_string(), "id".to_string()],
            rows: vec![vec!["b".to_string(), "2".to_string()]],
        };
        assert_eq!(align_rows(&table, raw).unwrap(), vec![vec!["2".to_string(), "b".to_string()]]);
    }
}
