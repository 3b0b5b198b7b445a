/// WebSocket server for real-time table updates
///
/// Every client message is executed against the shared [`AppState`]. The reply goes back
/// to the sender, and every mutation record the message produced is broadcast to the
/// subscribers of the affected table.
use actix::prelude::*;
use actix_web_actors::ws;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::config::ServerConfig;
use crate::error::{EngineError, Result};
use crate::history::MutationRecord;
use crate::import;
use crate::messages::{cell_text, ClientMessage, ExportFormat, ServerMessage};
use crate::recommend;
use crate::streaming::{StartMode, StartOutcome, StreamConfig, StreamEvent, StreamManager};
use crate::table::{shared, SharedTable, Table};
use crate::view::TableView;

/// How often heartbeat pings are sent
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// How long before lack of client response causes a timeout
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

// A poisoned lock still guards a consistent table, since mutations validate before writing
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn read(table: &SharedTable) -> RwLockReadGuard<'_, Table> {
    table.read().unwrap_or_else(|e| e.into_inner())
}

fn write(table: &SharedTable) -> RwLockWriteGuard<'_, Table> {
    table.write().unwrap_or_else(|e| e.into_inner())
}

/// Tables by name
#[derive(Default)]
pub struct TableRegistry {
    tables: RwLock<HashMap<String, SharedTable>>,
}

impl TableRegistry {
    pub fn get(&self, name: &str) -> Option<SharedTable> {
        self.tables
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Register `table` under its own name, replacing any previous table.
    pub fn insert(&self, table: Table) -> SharedTable {
        let name = table.name().to_string();
        let handle = shared(table);
        self.tables
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name, handle.clone());
        handle
    }

    pub fn get_or_create(&self, name: &str) -> SharedTable {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        tables
            .entry(name.to_string())
            .or_insert_with(|| shared(Table::new(name)))
            .clone()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tables
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

/// Result of executing one client message
#[derive(Debug, Default)]
pub struct Outcome {
    pub reply: Option<ServerMessage>,
    /// Records to broadcast, with the table they belong to
    pub mutations: Vec<(String, MutationRecord)>,
}

impl Outcome {
    fn reply(msg: ServerMessage) -> Self {
        Outcome {
            reply: Some(msg),
            mutations: Vec::new(),
        }
    }

    fn error(err: impl std::fmt::Display) -> Self {
        Self::reply(ServerMessage::error(err))
    }
}

/// Shared state for all WebSocket connections
pub struct AppState {
    pub tables: TableRegistry,
    pub streams: Mutex<StreamManager>,
    /// Endpoint -> (table name, session generation) for running streams
    stream_targets: Mutex<HashMap<String, (String, u64)>>,
    pub subscribers: Mutex<HashMap<String, Vec<Addr<TableWebSocket>>>>,
    default_poll_interval: Duration,
}

impl AppState {
    /// State with an empty registry, plus the receiver for stream events.
    pub fn new(config: &ServerConfig) -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (streams, events) = StreamManager::new();
        let state = AppState {
            tables: TableRegistry::default(),
            streams: Mutex::new(streams),
            stream_targets: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(HashMap::new()),
            default_poll_interval: config.default_poll_interval,
        };
        (state, events)
    }

    /// Register the sample table served at startup.
    pub fn with_demo_table(self) -> Self {
        let demo = "month,region,revenue\n\
                    2024-01-01,North,1200.5\n\
                    2024-02-01,South,980\n\
                    2024-03-01,North,1430.25\n\
                    2024-04-01,East,1105\n";
        match import::import_delimited("demo", demo, ',', true) {
            Ok(table) => {
                self.tables.insert(table);
            }
            Err(e) => log::warn!("could not build demo table: {}", e),
        }
        self
    }

    /// Subscribe a WebSocket connection to a table
    pub fn subscribe(&self, table_name: &str, addr: Addr<TableWebSocket>) {
        lock(&self.subscribers)
            .entry(table_name.to_string())
            .or_default()
            .push(addr);
    }

    /// Broadcast a message to all subscribers of a table
    pub fn broadcast(&self, table_name: &str, msg: ServerMessage) {
        let mut subscribers = lock(&self.subscribers);
        if let Some(addrs) = subscribers.get_mut(table_name) {
            addrs.retain(|addr| addr.connected());
            for addr in addrs.iter() {
                addr.do_send(BroadcastMessage(msg.clone()));
            }
        }
    }

    pub fn publish(&self, outcome: &Outcome) {
        for (table_name, record) in &outcome.mutations {
            self.broadcast(
                table_name,
                ServerMessage::Mutation {
                    table_name: table_name.clone(),
                    record: record.clone(),
                },
            );
        }
    }

    fn table(&self, name: &str) -> Result<SharedTable> {
        self.tables
            .get(name)
            .ok_or_else(|| EngineError::TableNotFound(name.to_string()))
    }

    /// Run `op` under the table's write lock and collect the records it appended.
    fn mutate<T, F>(&self, table_name: &str, op: F) -> Result<(T, Vec<(String, MutationRecord)>)>
    where
        F: FnOnce(&mut Table) -> Result<T>,
    {
        let handle = self.table(table_name)?;
        let mut table = write(&handle);
        let before = table.history().last().map(|r| r.id).unwrap_or(0);
        let value = op(&mut *table)?;
        let records = table
            .history()
            .since(before)
            .iter()
            .map(|r| (table_name.to_string(), r.clone()))
            .collect();
        Ok((value, records))
    }

    fn mutation_outcome(&self, table_name: &str, op: impl FnOnce(&mut Table) -> Result<()>) -> Outcome {
        match self.mutate(table_name, op) {
            Ok(((), mutations)) => Outcome {
                reply: None,
                mutations,
            },
            Err(e) => Outcome::error(e),
        }
    }

    pub fn execute(&self, msg: ClientMessage) -> Outcome {
        match msg {
            ClientMessage::Subscribe { table_name } => {
                Outcome::reply(ServerMessage::Subscribed { table_name })
            }

            ClientMessage::Query { table_name } => match self.table(&table_name) {
                Ok(handle) => Outcome::reply(ServerMessage::table_data(&read(&handle))),
                Err(e) => Outcome::error(e),
            },

            ClientMessage::Import {
                table_name,
                text,
                format,
            } => match import::import(&table_name, &text, format) {
                Ok(table) => {
                    let mutations = table
                        .history()
                        .records()
                        .iter()
                        .map(|r| (table_name.clone(), r.clone()))
                        .collect();
                    let reply = ServerMessage::table_data(&table);
                    self.tables.insert(table);
                    Outcome {
                        reply: Some(reply),
                        mutations,
                    }
                }
                Err(e) => Outcome::error(e),
            },

            ClientMessage::InsertRow {
                table_name,
                index,
                values,
            } => self.mutation_outcome(&table_name, |table| {
                if let Some(missing) = values.keys().find(|c| table.column(c).is_none()) {
                    return Err(EngineError::ColumnNotFound(missing.clone()));
                }
                let index = index.unwrap_or(table.row_count());
                table.insert_row(index)?;
                for (column, value) in &values {
                    table.set_value_by_name(index, column, cell_text(value))?;
                }
                Ok(())
            }),

            ClientMessage::DeleteRow {
                table_name,
                row_index,
            } => self.mutation_outcome(&table_name, |table| table.remove_row(row_index).map(|_| ())),

            ClientMessage::UpdateCell {
                table_name,
                row_index,
                column,
                value,
            } => self.mutation_outcome(&table_name, |table| {
                table.set_value_by_name(row_index, &column, cell_text(&value))
            }),

            ClientMessage::Sort {
                table_name,
                column,
                ascending,
            } => self.mutation_outcome(&table_name, |table| table.sort(&column, ascending)),

            ClientMessage::Filter { table_name, query } => {
                let result = self.mutate(&table_name, |table| {
                    let view = TableView::filter(table, &query);
                    let source_rows = view.source_rows().to_vec();
                    let rows: Vec<Vec<String>> = view
                        .iter_rows()
                        .map(|row| row.into_iter().map(str::to_string).collect())
                        .collect();
                    table.record_filter(&query, source_rows.len());
                    Ok((source_rows, rows))
                });
                match result {
                    Ok(((source_rows, rows), mutations)) => Outcome {
                        reply: Some(ServerMessage::FilterResult {
                            table_name,
                            query,
                            source_rows,
                            rows,
                        }),
                        mutations,
                    },
                    Err(e) => Outcome::error(e),
                }
            }

            ClientMessage::Recommend { table_name } => match self.table(&table_name) {
                Ok(handle) => {
                    let recommendations = recommend::recommend_for_table(&read(&handle));
                    Outcome::reply(ServerMessage::Recommendations {
                        table_name,
                        recommendations,
                    })
                }
                Err(e) => Outcome::error(e),
            },

            ClientMessage::Chart {
                table_name,
                chart_kind,
            } => {
                let data = self
                    .table(&table_name)
                    .and_then(|handle| recommend::chart_data(&read(&handle), chart_kind));
                match data {
                    Ok(data) => Outcome::reply(ServerMessage::Chart { table_name, data }),
                    Err(e) => Outcome::error(e),
                }
            }

            ClientMessage::History { table_name, since } => match self.table(&table_name) {
                Ok(handle) => {
                    let table = read(&handle);
                    let records = match since {
                        Some(id) => table.history().since(id).to_vec(),
                        None => table.history().records().to_vec(),
                    };
                    Outcome::reply(ServerMessage::History {
                        table_name,
                        records,
                    })
                }
                Err(e) => Outcome::error(e),
            },

            ClientMessage::Export { table_name, format } => {
                let result = self.mutate(&table_name, |table| match format {
                    ExportFormat::Csv => Ok(table.to_csv()),
                    ExportFormat::Tsv => Ok(table.to_delimited('\t')),
                    ExportFormat::Json => table.to_json(),
                    ExportFormat::Python => Ok(table.to_python_source()),
                });
                match result {
                    Ok((content, mutations)) => Outcome {
                        reply: Some(ServerMessage::Exported {
                            table_name,
                            content,
                        }),
                        mutations,
                    },
                    Err(e) => Outcome::error(e),
                }
            }

            ClientMessage::StartStream {
                table_name,
                endpoint,
                format,
                poll_interval_secs,
                restart,
            } => {
                let poll_interval = poll_interval_secs
                    .map(Duration::from_secs)
                    .unwrap_or(self.default_poll_interval);
                let config = StreamConfig::new(endpoint.clone(), format, poll_interval);
                let mode = if restart { StartMode::Restart } else { StartMode::KeepExisting };
                let target = self.tables.get_or_create(&table_name);

                let mut streams = lock(&self.streams);
                match streams.start(config, target, mode) {
                    Ok(outcome) => {
                        let already_active = outcome == StartOutcome::AlreadyActive;
                        if !already_active {
                            if let Some(session) = streams.session(&endpoint) {
                                lock(&self.stream_targets)
                                    .insert(endpoint.clone(), (table_name.clone(), session.generation()));
                            }
                        }
                        Outcome::reply(ServerMessage::StreamStarted {
                            table_name,
                            endpoint,
                            already_active,
                        })
                    }
                    Err(e) => Outcome::error(e),
                }
            }

            ClientMessage::StopStream { endpoint } => {
                lock(&self.streams).stop(&endpoint);
                Outcome::reply(ServerMessage::StreamStopped { endpoint })
            }
        }
    }

    /// Table fed by the session `generation` of `endpoint`, if that session is current.
    fn stream_target(&self, endpoint: &str, generation: u64) -> Option<String> {
        match lock(&self.stream_targets).get(endpoint) {
            Some((table_name, current)) if *current == generation => Some(table_name.clone()),
            _ => None,
        }
    }

    /// Relay stream events to the subscribers of each stream's table.
    ///
    /// Events from a session that has since been restarted are dropped.
    pub fn handle_stream_event(&self, event: StreamEvent) {
        match event {
            StreamEvent::RowsAppended { endpoint, generation, .. } => {
                let Some(table_name) = self.stream_target(&endpoint, generation) else {
                    return;
                };
                let record = self
                    .tables
                    .get(&table_name)
                    .and_then(|handle| read(&handle).history().last().cloned());
                if let Some(record) = record {
                    let msg = ServerMessage::Mutation {
                        table_name: table_name.clone(),
                        record,
                    };
                    self.broadcast(&table_name, msg);
                }
            }
            StreamEvent::PollFailed { endpoint, generation, error } => {
                if let Some(table_name) = self.stream_target(&endpoint, generation) {
                    self.broadcast(
                        &table_name,
                        ServerMessage::error(format!("stream '{}' poll failed: {}", endpoint, error)),
                    );
                }
            }
            StreamEvent::Stopped { endpoint, generation } => {
                let table_name = {
                    let mut targets = lock(&self.stream_targets);
                    let current = matches!(targets.get(&endpoint), Some((_, g)) if *g == generation);
                    if current {
                        targets.remove(&endpoint).map(|(table_name, _)| table_name)
                    } else {
                        None
                    }
                };
                if let Some(table_name) = table_name {
                    self.broadcast(&table_name, ServerMessage::StreamStopped { endpoint });
                }
            }
        }
    }
}

/// Drain stream events until the manager is dropped.
pub async fn forward_stream_events(
    state: actix_web::web::Data<AppState>,
    mut events: mpsc::UnboundedReceiver<StreamEvent>,
) {
    while let Some(event) = events.recv().await {
        state.handle_stream_event(event);
    }
}

/// Message to broadcast to clients
#[derive(Message)]
#[rtype(result = "()")]
struct BroadcastMessage(ServerMessage);

/// WebSocket connection actor
pub struct TableWebSocket {
    hb: Instant,
    state: actix_web::web::Data<AppState>,
    subscribed_table: Option<String>,
}

impl TableWebSocket {
    pub fn new(state: actix_web::web::Data<AppState>) -> Self {
        Self {
            hb: Instant::now(),
            state,
            subscribed_table: None,
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                log::info!("websocket client heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn send(ctx: &mut ws::WebsocketContext<Self>, msg: &ServerMessage) {
        match serde_json::to_string(msg) {
            Ok(text) => ctx.text(text),
            Err(e) => log::error!("could not serialize server message: {}", e),
        }
    }

    fn handle_client_message(&mut self, msg: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        if let ClientMessage::Subscribe { table_name } = &msg {
            self.subscribed_table = Some(table_name.clone());
            self.state.subscribe(table_name, ctx.address());
        }

        let outcome = self.state.execute(msg);
        if let Some(reply) = &outcome.reply {
            Self::send(ctx, reply);
        }
        self.state.publish(&outcome);
    }
}

impl Actor for TableWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.hb(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(table) = &self.subscribed_table {
            log::debug!("websocket subscriber of '{}' disconnected", table);
        }
    }
}

impl StreamHandler<std::result::Result<ws::Message, ws::ProtocolError>> for TableWebSocket {
    fn handle(&mut self, msg: std::result::Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => self.handle_client_message(client_msg, ctx),
                Err(e) => Self::send(ctx, &ServerMessage::error(format!("Invalid message format: {}", e))),
            },
            Ok(ws::Message::Binary(_)) => {
                log::warn!("unexpected binary websocket message");
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            _ => ctx.stop(),
        }
    }
}

impl Handler<BroadcastMessage> for TableWebSocket {
    type Result = ();

    fn handle(&mut self, msg: BroadcastMessage, ctx: &mut Self::Context) {
        Self::send(ctx, &msg.0);
    }
}
