//! Handle-based driver interface
//!
//! The [`Driver`] trait is the boundary to the component that actually talks
//! to a data source. It allocates environment, connection and statement
//! handles, runs statements, and hands back column data one call at a time.
//! Every call reports the same uniform signal: `Ok` for success (including
//! success with info) and `Err(ReturnCode)` otherwise.
//!
//! Implementations must be `Send + Sync` so a driver can be shared by several
//! sessions. The handles themselves are never shared: each one is owned by
//! exactly one [`Session`](crate::Session) or [`ResultCursor`](crate::ResultCursor).

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod memory;

pub use memory::{Fixture, MemoryDriver, TableData};

/// Opaque identifier for a driver-managed resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl Handle {
    pub fn from_raw(raw: u64) -> Self {
        Handle(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Kind of resource a handle refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleType {
    Environment,
    Connection,
    Statement,
}

/// Uniform status signal reported by every driver call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnCode {
    Success,
    SuccessWithInfo,
    NoData,
    Error,
    InvalidHandle,
    StillExecuting,
    NeedData,
}

impl ReturnCode {
    /// True for `Success` and `SuccessWithInfo`
    pub fn succeeded(self) -> bool {
        matches!(self, ReturnCode::Success | ReturnCode::SuccessWithInfo)
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReturnCode::Success => "SUCCESS",
            ReturnCode::SuccessWithInfo => "SUCCESS_WITH_INFO",
            ReturnCode::NoData => "NO_DATA",
            ReturnCode::Error => "ERROR",
            ReturnCode::InvalidHandle => "INVALID_HANDLE",
            ReturnCode::StillExecuting => "STILL_EXECUTING",
            ReturnCode::NeedData => "NEED_DATA",
        };
        f.write_str(s)
    }
}

/// Outcome of a driver call: the produced value, or the non-success code
pub type DriverResult<T> = std::result::Result<T, ReturnCode>;

/// Names of the driver operations, used to tag errors and in call logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverCall {
    AllocateEnvironment,
    SetEnvironmentAttribute,
    AllocateConnection,
    DriverConnect,
    SetConnectAttribute,
    GetConnectAttribute,
    EndTransaction,
    Disconnect,
    AllocateStatement,
    FreeHandle,
    ExecDirect,
    NumResultCols,
    DescribeColumn,
    Fetch,
    GetData,
}

impl DriverCall {
    /// The call that allocates a handle of the given type
    pub fn allocation_of(kind: HandleType) -> Self {
        match kind {
            HandleType::Environment => DriverCall::AllocateEnvironment,
            HandleType::Connection => DriverCall::AllocateConnection,
            HandleType::Statement => DriverCall::AllocateStatement,
        }
    }
}

impl fmt::Display for DriverCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DriverCall::AllocateEnvironment => "allocate-environment-handle",
            DriverCall::SetEnvironmentAttribute => "set-environment-attribute",
            DriverCall::AllocateConnection => "allocate-connection-handle",
            DriverCall::DriverConnect => "connect-with-completion",
            DriverCall::SetConnectAttribute => "set-connection-attribute",
            DriverCall::GetConnectAttribute => "get-connection-attribute",
            DriverCall::EndTransaction => "end-transaction",
            DriverCall::Disconnect => "disconnect",
            DriverCall::AllocateStatement => "allocate-statement-handle",
            DriverCall::FreeHandle => "free-handle",
            DriverCall::ExecDirect => "execute-statement",
            DriverCall::NumResultCols => "column-count",
            DriverCall::DescribeColumn => "describe-column",
            DriverCall::Fetch => "fetch-next-row",
            DriverCall::GetData => "get-column-data",
        };
        f.write_str(s)
    }
}

/// Protocol version announced on the environment handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OdbcVersion {
    #[serde(rename = "2")]
    V2,
    #[default]
    #[serde(rename = "3")]
    V3,
    #[serde(rename = "3.80")]
    V3_80,
}

/// Environment attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvAttr {
    OdbcVersion(OdbcVersion),
}

/// Connection attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectAttr {
    Autocommit(bool),
}

/// Connection attribute selectors for [`Driver::get_connect_attr`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectAttrKind {
    Autocommit,
}

/// How the driver may complete a connection string with missing parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverCompletion {
    /// Prompt only for parameters the string leaves out
    #[default]
    Complete,
    /// Always prompt
    Prompt,
    /// Prompt only for required parameters
    CompleteRequired,
    /// Never prompt; fail instead
    NoPrompt,
}

/// How `end_transaction` concludes the open transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOutcome {
    Commit,
    Rollback,
}

/// Column data types reported by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlDataType {
    Char,
    VarChar,
    LongVarChar,
    WChar,
    WVarChar,
    Bit,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Float,
    Double,
    Decimal,
    Numeric,
    Date,
    Time,
    Timestamp,
    Binary,
    Unknown(i16),
}

/// Whether a column accepts NULL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nullability {
    NoNulls,
    Nullable,
    #[default]
    Unknown,
}

/// Metadata the driver reports for one result column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescription {
    pub name: String,
    pub data_type: SqlDataType,
    pub size: usize,
    pub decimal_digits: i16,
    pub nullability: Nullability,
}

/// Target buffer for a `get_data` call
///
/// The closed set of C-side types the client ever asks for. Numeric kinds
/// are filled by the driver in a single call; `Char` follows the
/// probe-then-retrieve protocol and receives a NUL terminator.
#[derive(Debug)]
pub enum DataRequest<'a> {
    BigInt(&'a mut i64),
    Double(&'a mut f64),
    Char(&'a mut [u8]),
}

/// Length/NULL indicator returned alongside column data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    /// The column value is NULL
    Null,
    /// Total length of the value in bytes, excluding any terminator
    Length(usize),
    /// The driver cannot tell the remaining length
    NoTotal,
}

/// Handle-based interface to a tabular data source
///
/// Column numbers passed to `describe_column` and `get_data` are 1-based, as
/// drivers number them.
pub trait Driver: Send + Sync {
    /// Allocate a handle of `kind` under `parent` (none for environments)
    fn allocate_handle(&self, kind: HandleType, parent: Option<Handle>) -> DriverResult<Handle>;

    fn free_handle(&self, kind: HandleType, handle: Handle) -> DriverResult<()>;

    fn set_env_attr(&self, env: Handle, attr: EnvAttr) -> DriverResult<()>;

    fn set_connect_attr(&self, dbc: Handle, attr: ConnectAttr) -> DriverResult<()>;

    fn get_connect_attr(&self, dbc: Handle, kind: ConnectAttrKind) -> DriverResult<ConnectAttr>;

    /// Connect using a full connection string, letting the driver complete
    /// missing parameters according to `completion`
    fn driver_connect(
        &self,
        dbc: Handle,
        target: &str,
        completion: DriverCompletion,
    ) -> DriverResult<()>;

    fn end_transaction(&self, dbc: Handle, outcome: TransactionOutcome) -> DriverResult<()>;

    fn disconnect(&self, dbc: Handle) -> DriverResult<()>;

    fn exec_direct(&self, stmt: Handle, text: &str) -> DriverResult<()>;

    fn num_result_cols(&self, stmt: Handle) -> DriverResult<usize>;

    fn describe_column(&self, stmt: Handle, column: u16) -> DriverResult<ColumnDescription>;

    /// Advance to the next row; `Ok(false)` when the driver reports no data
    fn fetch(&self, stmt: Handle) -> DriverResult<bool>;

    fn get_data(
        &self,
        stmt: Handle,
        column: u16,
        request: DataRequest<'_>,
    ) -> DriverResult<Indicator>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_return_code_succeeded() {
        assert!(ReturnCode::Success.succeeded());
        assert!(ReturnCode::SuccessWithInfo.succeeded());
        assert!(!ReturnCode::NoData.succeeded());
        assert!(!ReturnCode::Error.succeeded());
        assert!(!ReturnCode::InvalidHandle.succeeded());
    }

    #[test]
    fn test_allocation_call_names() {
        assert_eq!(
            DriverCall::allocation_of(HandleType::Statement),
            DriverCall::AllocateStatement
        );
        assert_eq!(
            DriverCall::DriverConnect.to_string(),
            "connect-with-completion"
        );
    }

    #[test]
    fn test_config_enums_deserialize() {
        let v: OdbcVersion = serde_yaml::from_str("\"3.80\"").unwrap();
        assert_eq!(v, OdbcVersion::V3_80);
        let c: DriverCompletion = serde_yaml::from_str("no_prompt").unwrap();
        assert_eq!(c, DriverCompletion::NoPrompt);
    }
}
