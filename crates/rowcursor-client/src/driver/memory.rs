//! In-memory driver
//!
//! `MemoryDriver` implements [`Driver`] over canned result sets keyed by the
//! exact statement text. It follows the state rules a real handle-based
//! driver enforces (protocol version before connection allocation, connect
//! before statements, fetch before `get_data`, no freeing of handles that
//! still have dependents) and keeps enough bookkeeping for tests: a call
//! log, injectable failures, and a live-handle counter for leak checks.

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::{
    ColumnDescription, ConnectAttr, ConnectAttrKind, DataRequest, Driver, DriverCall,
    DriverCompletion, DriverResult, EnvAttr, Handle, HandleType, Indicator, Nullability,
    OdbcVersion, ReturnCode, SqlDataType, TransactionOutcome,
};
use crate::error::{Error, Result};
use crate::types::Value;

/// Column of a canned result set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: SqlDataType,
    #[serde(default)]
    pub size: usize,
    #[serde(default)]
    pub decimal_digits: i16,
    #[serde(default = "default_nullability")]
    pub nullability: Nullability,
}

fn default_nullability() -> Nullability {
    Nullability::Nullable
}

/// A canned result set: column layout plus rows of values
///
/// Rows shorter than the column list read as NULL in the missing cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    pub columns: Vec<ColumnSpec>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
}

impl TableData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a nullable column
    pub fn column(mut self, name: &str, data_type: SqlDataType) -> Self {
        self.columns.push(ColumnSpec {
            name: name.to_string(),
            data_type,
            size: 0,
            decimal_digits: 0,
            nullability: Nullability::Nullable,
        });
        self
    }

    pub fn row(mut self, values: Vec<Value>) -> Self {
        self.rows.push(values);
        self
    }
}

/// Contents of a JSON fixture file for [`MemoryDriver::from_fixture`]
///
/// ```json
/// {
///   "credentials": { "user": "app", "password": "secret" },
///   "queries": {
///     "SELECT id FROM t": { "columns": [{ "name": "id", "data_type": "big_int" }], "rows": [[1]] }
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default)]
    pub queries: BTreeMap<String, TableData>,
}

/// Credentials the driver accepts; any are accepted when unset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Fixture {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(format!("bad fixture: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    BeforeFirst,
    At(usize),
    AfterLast,
}

struct EnvState {
    version: Option<OdbcVersion>,
}

struct ConnState {
    env: Handle,
    connected: bool,
    autocommit: bool,
}

struct StmtState {
    dbc: Handle,
    result: Option<Arc<TableData>>,
    position: Position,
}

#[derive(Default)]
struct State {
    next_handle: u64,
    environments: HashMap<Handle, EnvState>,
    connections: HashMap<Handle, ConnState>,
    statements: HashMap<Handle, StmtState>,
    queries: HashMap<String, Arc<TableData>>,
    credentials: Option<Credentials>,
    failures: HashMap<DriverCall, ReturnCode>,
    calls: Vec<DriverCall>,
    transactions: Vec<TransactionOutcome>,
    last_target: Option<String>,
    reported_text_length: Option<usize>,
}

impl State {
    fn connection(&mut self, dbc: Handle) -> DriverResult<&mut ConnState> {
        self.connections
            .get_mut(&dbc)
            .ok_or(ReturnCode::InvalidHandle)
    }

    fn connected(&mut self, dbc: Handle) -> DriverResult<&mut ConnState> {
        let conn = self.connection(dbc)?;
        if conn.connected {
            Ok(conn)
        } else {
            Err(ReturnCode::Error)
        }
    }

    fn statement(&mut self, stmt: Handle) -> DriverResult<&mut StmtState> {
        self.statements
            .get_mut(&stmt)
            .ok_or(ReturnCode::InvalidHandle)
    }
}

/// In-memory [`Driver`] backed by canned result sets
#[derive(Default)]
pub struct MemoryDriver {
    state: Mutex<State>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixture(fixture: Fixture) -> Self {
        let driver = Self::new();
        {
            let mut state = driver.state.lock();
            state.credentials = fixture.credentials;
            state.queries = fixture
                .queries
                .into_iter()
                .map(|(text, table)| (text.trim().to_string(), Arc::new(table)))
                .collect();
        }
        driver
    }

    /// Register the result set returned for `query`
    pub fn with_table(self, query: &str, table: TableData) -> Self {
        self.add_table(query, table);
        self
    }

    /// Only accept connections carrying these credentials
    pub fn with_credentials(self, user: &str, password: &str) -> Self {
        self.state.lock().credentials = Some(Credentials {
            user: user.to_string(),
            password: password.to_string(),
        });
        self
    }

    pub fn add_table(&self, query: &str, table: TableData) {
        self.state
            .lock()
            .queries
            .insert(query.trim().to_string(), Arc::new(table));
    }

    /// Make every subsequent `call` fail with `code`
    pub fn fail_on(&self, call: DriverCall, code: ReturnCode) {
        self.state.lock().failures.insert(call, code);
    }

    /// Answer zero-length text reads with `len` instead of the real length
    ///
    /// Sized reads still report the real length, which simulates a value
    /// that changed size between the two reads.
    pub fn report_text_length(&self, len: Option<usize>) {
        self.state.lock().reported_text_length = len;
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Every call made so far, in order, including failed ones
    pub fn calls(&self) -> Vec<DriverCall> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self, call: DriverCall) -> usize {
        self.state.lock().calls.iter().filter(|c| **c == call).count()
    }

    /// Number of handles of any type currently allocated
    pub fn live_handles(&self) -> usize {
        let state = self.state.lock();
        state.environments.len() + state.connections.len() + state.statements.len()
    }

    pub fn live_handles_of(&self, kind: HandleType) -> usize {
        let state = self.state.lock();
        match kind {
            HandleType::Environment => state.environments.len(),
            HandleType::Connection => state.connections.len(),
            HandleType::Statement => state.statements.len(),
        }
    }

    /// Transactions ended so far, in order
    pub fn transactions(&self) -> Vec<TransactionOutcome> {
        self.state.lock().transactions.clone()
    }

    /// The last connection string passed to `driver_connect`
    pub fn last_target(&self) -> Option<String> {
        self.state.lock().last_target.clone()
    }

    fn enter(&self, call: DriverCall) -> DriverResult<MutexGuard<'_, State>> {
        let mut state = self.state.lock();
        state.calls.push(call);
        if let Some(code) = state.failures.get(&call).copied() {
            return Err(code);
        }
        Ok(state)
    }
}

/// Check a `KEY=value;KEY=value` connection string
fn validate_target(target: &str, credentials: Option<&Credentials>) -> DriverResult<()> {
    let mut pairs = HashMap::new();
    for segment in target.split(';').filter(|s| !s.trim().is_empty()) {
        let (key, value) = segment.split_once('=').ok_or(ReturnCode::Error)?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ReturnCode::Error);
        }
        pairs.insert(key.to_ascii_uppercase(), value.to_string());
    }

    if !pairs.contains_key("DRIVER") && !pairs.contains_key("DSN") {
        return Err(ReturnCode::Error);
    }
    let (Some(user), Some(password)) = (pairs.get("UID"), pairs.get("PWD")) else {
        return Err(ReturnCode::Error);
    };
    if let Some(expected) = credentials {
        if expected.user != *user || expected.password != *password {
            return Err(ReturnCode::Error);
        }
    }
    Ok(())
}

static NULL: Value = Value::Null;

fn render_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Int(i) => Some(i.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Text(s) => Some(s.clone()),
    }
}

impl Driver for MemoryDriver {
    fn allocate_handle(&self, kind: HandleType, parent: Option<Handle>) -> DriverResult<Handle> {
        let mut state = self.enter(DriverCall::allocation_of(kind))?;
        match (kind, parent) {
            (HandleType::Environment, None) => {}
            (HandleType::Connection, Some(env)) => {
                let env_state = state
                    .environments
                    .get(&env)
                    .ok_or(ReturnCode::InvalidHandle)?;
                if env_state.version.is_none() {
                    return Err(ReturnCode::Error);
                }
            }
            (HandleType::Statement, Some(dbc)) => {
                state.connected(dbc)?;
            }
            _ => return Err(ReturnCode::Error),
        }

        state.next_handle += 1;
        let handle = Handle::from_raw(state.next_handle);
        match kind {
            HandleType::Environment => {
                state.environments.insert(handle, EnvState { version: None });
            }
            HandleType::Connection => {
                let env = parent.ok_or(ReturnCode::Error)?;
                state.connections.insert(
                    handle,
                    ConnState {
                        env,
                        connected: false,
                        autocommit: true,
                    },
                );
            }
            HandleType::Statement => {
                let dbc = parent.ok_or(ReturnCode::Error)?;
                state.statements.insert(
                    handle,
                    StmtState {
                        dbc,
                        result: None,
                        position: Position::BeforeFirst,
                    },
                );
            }
        }
        debug!("Allocated {:?} handle {}", kind, handle);
        Ok(handle)
    }

    fn free_handle(&self, kind: HandleType, handle: Handle) -> DriverResult<()> {
        let mut state = self.enter(DriverCall::FreeHandle)?;
        match kind {
            HandleType::Environment => {
                if !state.environments.contains_key(&handle) {
                    return Err(ReturnCode::InvalidHandle);
                }
                if state.connections.values().any(|c| c.env == handle) {
                    return Err(ReturnCode::Error);
                }
                state.environments.remove(&handle);
            }
            HandleType::Connection => {
                if state.connection(handle)?.connected {
                    return Err(ReturnCode::Error);
                }
                state.connections.remove(&handle);
            }
            HandleType::Statement => {
                state
                    .statements
                    .remove(&handle)
                    .ok_or(ReturnCode::InvalidHandle)?;
            }
        }
        debug!("Freed {:?} handle {}", kind, handle);
        Ok(())
    }

    fn set_env_attr(&self, env: Handle, attr: EnvAttr) -> DriverResult<()> {
        let mut state = self.enter(DriverCall::SetEnvironmentAttribute)?;
        let env_state = state
            .environments
            .get_mut(&env)
            .ok_or(ReturnCode::InvalidHandle)?;
        match attr {
            EnvAttr::OdbcVersion(version) => env_state.version = Some(version),
        }
        Ok(())
    }

    fn set_connect_attr(&self, dbc: Handle, attr: ConnectAttr) -> DriverResult<()> {
        let mut state = self.enter(DriverCall::SetConnectAttribute)?;
        let conn = state.connection(dbc)?;
        match attr {
            ConnectAttr::Autocommit(on) => conn.autocommit = on,
        }
        Ok(())
    }

    fn get_connect_attr(&self, dbc: Handle, kind: ConnectAttrKind) -> DriverResult<ConnectAttr> {
        let mut state = self.enter(DriverCall::GetConnectAttribute)?;
        let conn = state.connection(dbc)?;
        match kind {
            ConnectAttrKind::Autocommit => Ok(ConnectAttr::Autocommit(conn.autocommit)),
        }
    }

    fn driver_connect(
        &self,
        dbc: Handle,
        target: &str,
        _completion: DriverCompletion,
    ) -> DriverResult<()> {
        let mut state = self.enter(DriverCall::DriverConnect)?;
        state.last_target = Some(target.to_string());
        if state.connection(dbc)?.connected {
            return Err(ReturnCode::Error);
        }
        validate_target(target, state.credentials.as_ref())?;
        state.connection(dbc)?.connected = true;
        Ok(())
    }

    fn end_transaction(&self, dbc: Handle, outcome: TransactionOutcome) -> DriverResult<()> {
        let mut state = self.enter(DriverCall::EndTransaction)?;
        state.connected(dbc)?;
        state.transactions.push(outcome);
        Ok(())
    }

    fn disconnect(&self, dbc: Handle) -> DriverResult<()> {
        let mut state = self.enter(DriverCall::Disconnect)?;
        state.connected(dbc)?.connected = false;
        // Disconnecting releases every statement still open on the connection
        state.statements.retain(|_, s| s.dbc != dbc);
        Ok(())
    }

    fn exec_direct(&self, stmt: Handle, text: &str) -> DriverResult<()> {
        let mut state = self.enter(DriverCall::ExecDirect)?;
        let table = state
            .queries
            .get(text.trim())
            .cloned()
            .ok_or(ReturnCode::Error)?;
        let stmt_state = state.statement(stmt)?;
        stmt_state.result = Some(table);
        stmt_state.position = Position::BeforeFirst;
        Ok(())
    }

    fn num_result_cols(&self, stmt: Handle) -> DriverResult<usize> {
        let mut state = self.enter(DriverCall::NumResultCols)?;
        let stmt_state = state.statement(stmt)?;
        let table = stmt_state.result.as_ref().ok_or(ReturnCode::Error)?;
        Ok(table.columns.len())
    }

    fn describe_column(&self, stmt: Handle, column: u16) -> DriverResult<ColumnDescription> {
        let mut state = self.enter(DriverCall::DescribeColumn)?;
        let stmt_state = state.statement(stmt)?;
        let table = stmt_state.result.as_ref().ok_or(ReturnCode::Error)?;
        let spec = (column as usize)
            .checked_sub(1)
            .and_then(|i| table.columns.get(i))
            .ok_or(ReturnCode::Error)?;
        Ok(ColumnDescription {
            name: spec.name.clone(),
            data_type: spec.data_type,
            size: spec.size,
            decimal_digits: spec.decimal_digits,
            nullability: spec.nullability,
        })
    }

    fn fetch(&self, stmt: Handle) -> DriverResult<bool> {
        let mut state = self.enter(DriverCall::Fetch)?;
        let stmt_state = state.statement(stmt)?;
        let rows = stmt_state.result.as_ref().ok_or(ReturnCode::Error)?.rows.len();
        let next = match stmt_state.position {
            Position::BeforeFirst if rows > 0 => Position::At(0),
            Position::At(i) if i + 1 < rows => Position::At(i + 1),
            _ => Position::AfterLast,
        };
        stmt_state.position = next;
        Ok(matches!(next, Position::At(_)))
    }

    fn get_data(
        &self,
        stmt: Handle,
        column: u16,
        request: DataRequest<'_>,
    ) -> DriverResult<Indicator> {
        let mut state = self.enter(DriverCall::GetData)?;
        let reported = state.reported_text_length;
        let stmt_state = state.statement(stmt)?;
        let table = stmt_state.result.as_ref().ok_or(ReturnCode::Error)?;
        let Position::At(row) = stmt_state.position else {
            return Err(ReturnCode::Error);
        };
        let index = (column as usize)
            .checked_sub(1)
            .filter(|i| *i < table.columns.len())
            .ok_or(ReturnCode::Error)?;
        let value = table.rows[row].get(index).unwrap_or(&NULL);

        match request {
            DataRequest::BigInt(out) => {
                *out = match value {
                    Value::Null => return Ok(Indicator::Null),
                    Value::Int(i) => *i,
                    Value::Float(f) => *f as i64,
                    Value::Text(s) => s.trim().parse().map_err(|_| ReturnCode::Error)?,
                };
                Ok(Indicator::Length(std::mem::size_of::<i64>()))
            }
            DataRequest::Double(out) => {
                *out = match value {
                    Value::Null => return Ok(Indicator::Null),
                    Value::Int(i) => *i as f64,
                    Value::Float(f) => *f,
                    Value::Text(s) => s.trim().parse().map_err(|_| ReturnCode::Error)?,
                };
                Ok(Indicator::Length(std::mem::size_of::<f64>()))
            }
            DataRequest::Char(buf) => {
                let Some(text) = render_text(value) else {
                    return Ok(Indicator::Null);
                };
                let bytes = text.as_bytes();
                if let Some(room) = buf.len().checked_sub(1) {
                    let n = bytes.len().min(room);
                    buf[..n].copy_from_slice(&bytes[..n]);
                    buf[n] = 0;
                } else if let Some(len) = reported {
                    return Ok(Indicator::Length(len));
                }
                Ok(Indicator::Length(bytes.len()))
            }
        }
    }
}
