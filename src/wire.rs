use std::fmt::Debug;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldInfo, QueryResponse,
    Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::auth::CalguardAuthSource;
use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability::{command_label, QUERIES_TOTAL, QUERY_DURATION_SECONDS};
use crate::sql::{self, Command, SqlError};

pub struct CalguardHandler {
    engine: Arc<Engine>,
    query_parser: Arc<CalguardQueryParser>,
    request_timeout: Duration,
}

impl CalguardHandler {
    pub fn new(engine: Arc<Engine>, request_timeout: Duration) -> Self {
        Self {
            engine,
            query_parser: Arc::new(CalguardQueryParser),
            request_timeout,
        }
    }

    /// Parse, execute under the request deadline, and record RED metrics.
    async fn run(&self, sql: &str, format: &Format) -> PgWireResult<Vec<Response>> {
        let cmd = sql::parse_sql(sql).map_err(sql_err)?;
        let label = command_label(&cmd);
        let started = Instant::now();

        let result = match tokio::time::timeout(
            self.request_timeout,
            self.execute_command(cmd, format),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("{label} exceeded {:?}", self.request_timeout);
                Err(user_err("57014", "canceling statement due to request timeout".into()))
            }
        };

        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(&self, cmd: Command, format: &Format) -> PgWireResult<Vec<Response>> {
        let engine = &self.engine;
        match cmd {
            Command::InsertBooking {
                owner_id,
                booked_by,
                start,
                end,
                returning,
            } => {
                let booking = engine
                    .create_booking(owner_id, &booked_by, start, end)
                    .await
                    .map_err(engine_err)?;
                if returning {
                    booking_rows(vec![booking], format)
                } else {
                    Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
                }
            }
            Command::UpdateBooking {
                id,
                patch,
                returning,
            } => {
                let booking = engine.update_booking(id, patch).await.map_err(engine_err)?;
                if returning {
                    booking_rows(vec![booking], format)
                } else {
                    Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
                }
            }
            Command::DeleteBooking { id } => {
                engine.delete_booking(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::SelectBookings {
                owner_id,
                window,
                exclude_id,
            } => {
                let bookings = match window {
                    Some(window) => {
                        engine
                            .conflicting_bookings(owner_id, window, exclude_id)
                            .await
                    }
                    None => {
                        let mut all = engine.list_bookings(owner_id).await;
                        all.retain(|b| Some(b.id) != exclude_id);
                        all
                    }
                };
                booking_rows(bookings, format)
            }
            Command::SelectBooking { id } => {
                let found = engine.get_booking(id).await;
                booking_rows(found.into_iter().collect(), format)
            }
        }
    }
}

const BOOKING_COLUMNS: [(&str, Type); 5] = [
    ("id", Type::VARCHAR),
    ("owner_id", Type::VARCHAR),
    ("booked_by", Type::VARCHAR),
    ("start", Type::INT8),
    ("end", Type::INT8),
];

fn bookings_schema(format: &Format) -> Vec<FieldInfo> {
    BOOKING_COLUMNS
        .iter()
        .enumerate()
        .map(|(i, (name, ty))| {
            FieldInfo::new((*name).into(), None, None, ty.clone(), format.format_for(i))
        })
        .collect()
}

fn booking_rows(bookings: Vec<Booking>, format: &Format) -> PgWireResult<Vec<Response>> {
    let schema = Arc::new(bookings_schema(format));
    let rows: Vec<PgWireResult<_>> = bookings
        .into_iter()
        .map(|booking| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&booking.id.to_string())?;
            encoder.encode_field(&booking.owner_id.to_string())?;
            encoder.encode_field(&booking.booked_by)?;
            encoder.encode_field(&booking.span.start)?;
            encoder.encode_field(&booking.span.end)?;
            Ok(encoder.take_row())
        })
        .collect();

    Ok(vec![Response::Query(QueryResponse::new(
        schema,
        stream::iter(rows),
    ))])
}

#[async_trait]
impl SimpleQueryHandler for CalguardHandler {
    async fn do_query<C>(&self, _client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        self.run(query, &Format::UnifiedText).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct CalguardQueryParser;

#[async_trait]
impl QueryParser for CalguardQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        if sql::returns_rows(stmt) {
            Ok(bookings_schema(column_format.unwrap_or(&Format::UnifiedText)))
        } else {
            Ok(vec![])
        }
    }
}

#[async_trait]
impl ExtendedQueryHandler for CalguardHandler {
    type Statement = String;
    type QueryParser = CalguardQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        _client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let sql = substitute_params(portal);
        let mut responses = self.run(&sql, &portal.result_column_format).await?;
        Ok(responses.remove(0))
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        let fields = if sql::returns_rows(&target.statement) {
            bookings_schema(&Format::UnifiedText)
        } else {
            vec![]
        };
        Ok(DescribeStatementResponse::new(param_types, fields))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        if sql::returns_rows(&target.statement.statement) {
            Ok(DescribePortalResponse::new(bookings_schema(
                &target.result_column_format,
            )))
        } else {
            Ok(DescribePortalResponse::new(vec![]))
        }
    }
}

/// A `$n` placeholder found outside quoted literals and identifiers.
struct Placeholder {
    start: usize,
    end: usize,
    index: usize,
}

/// Scan for `$n` placeholders, skipping anything inside `'...'` or `"..."`.
fn placeholders(sql: &str) -> Vec<Placeholder> {
    let bytes = sql.as_bytes();
    let mut found = Vec::new();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            // A doubled quote closes and reopens, which leaves us inside
            Some(q) => {
                if b == q {
                    quote = None;
                }
                i += 1;
            }
            None if b == b'\'' || b == b'"' => {
                quote = Some(b);
                i += 1;
            }
            None if b == b'$' => {
                let start = i;
                i += 1;
                let digits = i;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                if let Ok(index) = sql[digits..i].parse::<usize>() {
                    found.push(Placeholder { start, end: i, index });
                }
            }
            None => i += 1,
        }
    }
    found
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    placeholders(sql).iter().map(|p| p.index).max().unwrap_or(0)
}

/// Substitute $1, $2, ... with bound parameter values (text format) in one
/// left-to-right pass, so bound text is never rescanned.
fn substitute_placeholders<B: AsRef<[u8]>>(sql: &str, params: &[Option<B>]) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut copied = 0;
    for p in placeholders(sql) {
        let Some(param) = p.index.checked_sub(1).and_then(|i| params.get(i)) else {
            continue;
        };
        out.push_str(&sql[copied..p.start]);
        match param {
            Some(bytes) => {
                out.push('\'');
                out.push_str(&String::from_utf8_lossy(bytes.as_ref()).replace('\'', "''"));
                out.push('\'');
            }
            None => out.push_str("NULL"),
        }
        copied = p.end;
    }
    out.push_str(&sql[copied..]);
    out
}

fn substitute_params(portal: &Portal<String>) -> String {
    substitute_placeholders(&portal.statement.statement, &portal.parameters)
}

// ── Factory ──────────────────────────────────────────────────────

pub struct CalguardFactory {
    handler: Arc<CalguardHandler>,
    auth_handler: Arc<
        CleartextPasswordAuthStartupHandler<CalguardAuthSource, DefaultServerParameterProvider>,
    >,
    noop: Arc<NoopHandler>,
}

impl CalguardFactory {
    pub fn new(engine: Arc<Engine>, password: String, request_timeout: Duration) -> Self {
        let auth_source = CalguardAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(CalguardHandler::new(engine, request_timeout)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for CalguardFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
    password: String,
    tls: Option<TlsAcceptor>,
    request_timeout: Duration,
) -> io::Result<()> {
    let factory = Arc::new(CalguardFactory::new(engine, password, request_timeout));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Errors ───────────────────────────────────────────────────────

fn user_err(code: &str, msg: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new("ERROR".into(), code.into(), msg)))
}

/// SQLSTATE per engine outcome; clients match on the code, not the message.
fn engine_sqlstate(e: &EngineError) -> &'static str {
    match e {
        EngineError::Validation(_) => "22023",
        EngineError::Conflict(_) => "23P01",
        EngineError::NotFound(_) => "P0002",
        EngineError::Storage(_) => "58030",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    user_err(engine_sqlstate(&e), e.to_string())
}

fn sql_err(e: SqlError) -> PgWireError {
    user_err(e.sqlstate(), e.to_string())
}
