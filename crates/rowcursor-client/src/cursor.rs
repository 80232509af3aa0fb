//! Forward-only, typed, null-aware cursor over a statement's result rows

use std::fmt;
use std::mem;
use tracing::{debug, warn};

use crate::driver::{
    ColumnDescription, DataRequest, Driver, DriverCall, Handle, HandleType, Indicator, ReturnCode,
};
use crate::error::{Error, Result};
use crate::guard::HandleGuard;
use crate::types::{ColumnRef, Row, Value, ValueKind};

enum CursorState {
    Open { stmt: Handle },
    Closed,
}

/// Rows produced by [`Session::execute`](crate::Session::execute)
///
/// The cursor starts positioned before the first row. Each call to
/// [`next`](Self::next) moves it one row forward; once `next` has returned
/// `false` the cursor is exhausted for good and every further call returns
/// `false` without touching the driver.
///
/// Accessors read the current row. They address a column either by 0-based
/// index or by exact name, and return `Ok(None)` when the driver reports
/// NULL. Each call returns a freshly owned value.
///
/// The cursor owns its statement handle exclusively and releases it on
/// [`close`](Self::close) or drop. It borrows the session that produced it,
/// so the session cannot be closed or dropped while the cursor is alive:
///
/// ```compile_fail
/// # use std::sync::Arc;
/// # use rowcursor_client::{MemoryDriver, Session, SqlDataType, TableData};
/// # fn main() -> rowcursor_client::Result<()> {
/// # let table = TableData::new().column("one", SqlDataType::BigInt);
/// # let driver = Arc::new(MemoryDriver::new().with_table("SELECT 1", table));
/// let mut session = Session::connect(driver, "DSN=bank", "app", "secret")?;
/// let mut rows = session.execute("SELECT 1")?;
/// session.close()?;
/// rows.next()?;
/// # Ok(())
/// # }
/// ```
pub struct ResultCursor<'s> {
    driver: &'s dyn Driver,
    state: CursorState,
    columns: Vec<ColumnDescription>,
    names: Vec<String>,
    exhausted: bool,
}

impl<'s> ResultCursor<'s> {
    /// Build a cursor from an executed statement
    ///
    /// The statement stays guarded until every column is described, so a
    /// failing description releases it.
    pub(crate) fn from_statement(driver: &'s dyn Driver, stmt: HandleGuard<'_>) -> Result<Self> {
        let count = driver
            .num_result_cols(stmt.handle())
            .map_err(|code| Error::driver(DriverCall::NumResultCols, code))?;
        let count =
            u16::try_from(count).map_err(|_| Error::driver(DriverCall::NumResultCols, ReturnCode::Error))?;

        let mut columns = Vec::with_capacity(count as usize);
        for column in 1..=count {
            let description = driver
                .describe_column(stmt.handle(), column)
                .map_err(|code| Error::driver(DriverCall::DescribeColumn, code))?;
            columns.push(description);
        }
        let names = columns.iter().map(|c| c.name.clone()).collect();
        debug!("Described {} result columns", count);

        Ok(Self {
            driver,
            state: CursorState::Open { stmt: stmt.commit() },
            columns,
            names,
            exhausted: false,
        })
    }

    /// Column names in driver order
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    /// Full column descriptions (name, type, size, nullability)
    pub fn columns(&self) -> &[ColumnDescription] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.names.len()
    }

    /// Advance to the next row; `false` when there are no more rows
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<bool> {
        if self.exhausted {
            return Ok(false);
        }
        let stmt = self.statement()?;
        let has_row = self
            .driver
            .fetch(stmt)
            .map_err(|code| Error::driver(DriverCall::Fetch, code))?;
        if !has_row {
            debug!("Result cursor exhausted");
            self.exhausted = true;
        }
        Ok(has_row)
    }

    pub fn get_int(&self, column: impl Into<ColumnRef>) -> Result<Option<i64>> {
        let index = self.resolve(column.into())?;
        let mut value = 0i64;
        match self.get_fixed(index, DataRequest::BigInt(&mut value))? {
            Indicator::Null => Ok(None),
            _ => Ok(Some(value)),
        }
    }

    pub fn get_float(&self, column: impl Into<ColumnRef>) -> Result<Option<f64>> {
        let index = self.resolve(column.into())?;
        let mut value = 0f64;
        match self.get_fixed(index, DataRequest::Double(&mut value))? {
            Indicator::Null => Ok(None),
            _ => Ok(Some(value)),
        }
    }

    /// Read a text column with a zero-length probe followed by a sized read
    pub fn get_string(&self, column: impl Into<ColumnRef>) -> Result<Option<String>> {
        let index = self.resolve(column.into())?;
        let stmt = self.statement()?;
        let number = driver_column(index);

        let mut probe = [0u8; 0];
        let len = match self
            .driver
            .get_data(stmt, number, DataRequest::Char(&mut probe))
            .map_err(|code| Error::driver(DriverCall::GetData, code))?
        {
            Indicator::Null => return Ok(None),
            Indicator::Length(len) => len,
            Indicator::NoTotal => return Err(Error::Unsupported("text value of unknown length")),
        };

        // One extra slot for the terminator the driver writes
        let size = len
            .checked_add(1)
            .ok_or_else(|| Error::driver(DriverCall::GetData, ReturnCode::Error))?;
        let mut buf = vec![0u8; size];
        let written = match self
            .driver
            .get_data(stmt, number, DataRequest::Char(&mut buf))
            .map_err(|code| Error::driver(DriverCall::GetData, code))?
        {
            Indicator::Null => return Ok(None),
            Indicator::Length(n) if n <= len => n,
            // The value grew between probe and read
            _ => return Err(Error::driver(DriverCall::GetData, ReturnCode::SuccessWithInfo)),
        };

        buf.truncate(written);
        String::from_utf8(buf)
            .map(Some)
            .map_err(|source| Error::InvalidText { column: index, source })
    }

    /// Read a column as the value kind its described data type maps to
    pub fn get_value(&self, column: impl Into<ColumnRef>) -> Result<Value> {
        let index = self.resolve(column.into())?;
        let value = match ValueKind::from(self.columns[index].data_type) {
            ValueKind::Int => Value::from(self.get_int(index)?),
            ValueKind::Float => Value::from(self.get_float(index)?),
            ValueKind::Text => Value::from(self.get_string(index)?),
        };
        Ok(value)
    }

    /// Read every column of the current row
    pub fn current_row(&self) -> Result<Row> {
        let values = (0..self.column_count())
            .map(|index| self.get_value(index))
            .collect::<Result<Vec<_>>>()?;
        Ok(Row::new(self.names.clone(), values))
    }

    /// Release the statement handle; a no-op once closed
    pub fn close(&mut self) -> Result<()> {
        let CursorState::Open { stmt } = mem::replace(&mut self.state, CursorState::Closed) else {
            return Ok(());
        };
        self.driver
            .free_handle(HandleType::Statement, stmt)
            .map_err(|code| Error::driver(DriverCall::FreeHandle, code))
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, CursorState::Open { .. })
    }

    /// The statement handle this cursor owns, if open
    pub fn handle(&self) -> Option<Handle> {
        match self.state {
            CursorState::Open { stmt } => Some(stmt),
            CursorState::Closed => None,
        }
    }

    /// Move the statement and column list into a new cursor, leaving this
    /// one closed
    pub fn take(&mut self) -> ResultCursor<'s> {
        ResultCursor {
            driver: self.driver,
            state: mem::replace(&mut self.state, CursorState::Closed),
            columns: mem::take(&mut self.columns),
            names: mem::take(&mut self.names),
            exhausted: mem::take(&mut self.exhausted),
        }
    }

    fn statement(&self) -> Result<Handle> {
        self.handle().ok_or(Error::Closed("result cursor"))
    }

    fn resolve(&self, column: ColumnRef) -> Result<usize> {
        match column {
            ColumnRef::Index(index) if index < self.names.len() => Ok(index),
            ColumnRef::Index(index) => Err(Error::ColumnOutOfRange {
                index,
                count: self.names.len(),
            }),
            ColumnRef::Name(name) => self
                .names
                .iter()
                .position(|n| *n == name)
                .ok_or(Error::ColumnNotFound(name)),
        }
    }

    fn get_fixed(&self, index: usize, request: DataRequest<'_>) -> Result<Indicator> {
        let stmt = self.statement()?;
        self.driver
            .get_data(stmt, driver_column(index), request)
            .map_err(|code| Error::driver(DriverCall::GetData, code))
    }
}

/// Drivers number columns from 1; `index` is bounded by a `u16` column count
fn driver_column(index: usize) -> u16 {
    (index + 1) as u16
}

impl Drop for ResultCursor<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to release result cursor: {}", e);
        }
    }
}

impl fmt::Debug for ResultCursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCursor")
            .field("handle", &self.handle())
            .field("columns", &self.names)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}
