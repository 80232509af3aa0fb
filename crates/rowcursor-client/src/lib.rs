//! rowcursor client library
//!
//! A small client layer over a handle-based tabular driver interface: open a
//! [`Session`], run a transaction, execute a statement, and walk the rows
//! through a forward-only, typed, null-aware [`ResultCursor`].
//!
//! # Features
//!
//! - **Leak-free setup** - every handle allocated during the connection
//!   handshake or statement execution is released if a later step fails
//! - **Typed accessors** - `get_int`, `get_float`, `get_string` by index or
//!   by column name, returning `None` for NULL
//! - **Explicit ownership** - sessions and cursors own their handles
//!   exclusively and release them once, on `close` or drop
//! - **Pluggable driver** - anything implementing [`Driver`]; an in-memory
//!   [`MemoryDriver`] is included for tests and demos
//!
//! All calls are synchronous and block until the driver answers.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use rowcursor_client::{MemoryDriver, Session, SqlDataType, TableData, Value};
//!
//! fn main() -> rowcursor_client::Result<()> {
//!     let driver = Arc::new(MemoryDriver::new().with_table(
//!         "SELECT balance FROM accounts",
//!         TableData::new()
//!             .column("balance", SqlDataType::Double)
//!             .row(vec![Value::Float(3.14)])
//!             .row(vec![Value::Null]),
//!     ));
//!
//!     let session = Session::connect(driver, "DRIVER=Memory;DATABASE=bank", "app", "secret")?;
//!     let mut rows = session.execute("SELECT balance FROM accounts")?;
//!
//!     assert!(rows.next()?);
//!     assert_eq!(rows.get_float("balance")?, Some(3.14));
//!     assert!(rows.next()?);
//!     assert_eq!(rows.get_float(0)?, None);
//!     assert!(!rows.next()?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod cursor;
pub mod driver;
pub mod error;
mod guard;
pub mod session;
pub mod transaction;
pub mod types;

pub use config::SessionConfig;
pub use cursor::ResultCursor;
pub use driver::{
    ColumnDescription, Driver, DriverCall, Fixture, Handle, HandleType, MemoryDriver, ReturnCode,
    SqlDataType, TableData,
};
pub use error::{CallSite, Error, HandshakeStep, Result};
pub use session::Session;
pub use transaction::Transaction;
pub use types::{ColumnRef, Row, Value};
