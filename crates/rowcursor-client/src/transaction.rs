//! Scoped transactions

use tracing::{info, warn};

use crate::cursor::ResultCursor;
use crate::error::Result;
use crate::session::Session;

/// A transaction on a [`Session`]
///
/// Created by [`Session::transaction`], which turns autocommit off.
/// [`commit`](Self::commit) and [`rollback`](Self::rollback) consume the
/// transaction and turn autocommit back on. A transaction dropped without
/// either is rolled back.
///
/// # Example
///
/// ```
/// # use std::sync::Arc;
/// # use rowcursor_client::{MemoryDriver, Session, TableData};
/// # fn main() -> rowcursor_client::Result<()> {
/// # let driver = Arc::new(MemoryDriver::new().with_table("UPDATE accounts SET balance = 0", TableData::new()));
/// let mut session = Session::connect(driver, "DSN=bank", "app", "secret")?;
/// let tx = session.transaction()?;
/// tx.execute("UPDATE accounts SET balance = 0")?;
/// tx.rollback()?;
/// # Ok(())
/// # }
/// ```
pub struct Transaction<'s> {
    session: &'s mut Session,
    finished: bool,
}

impl<'s> Transaction<'s> {
    pub(crate) fn begin(session: &'s mut Session) -> Result<Self> {
        info!("Beginning transaction");
        session.begin()?;
        Ok(Self {
            session,
            finished: false,
        })
    }

    /// Execute a statement inside the transaction
    pub fn execute(&self, query: &str) -> Result<ResultCursor<'_>> {
        self.session.execute(query)
    }

    /// Commit the transaction
    ///
    /// If the commit fails the transaction is rolled back on drop.
    pub fn commit(mut self) -> Result<()> {
        info!("Committing transaction");
        self.session.commit()?;
        self.finished = true;
        Ok(())
    }

    /// Roll back the transaction
    pub fn rollback(mut self) -> Result<()> {
        info!("Rolling back transaction");
        self.finished = true;
        self.session.rollback()
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!("Transaction dropped without commit; rolling back");
        if let Err(e) = self.session.rollback() {
            warn!("Rollback on drop failed: {}", e);
        }
    }
}
