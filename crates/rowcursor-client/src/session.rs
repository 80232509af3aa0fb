//! Session lifecycle, transactions and statement execution

use std::fmt;
use std::mem;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::cursor::ResultCursor;
use crate::driver::{
    ConnectAttr, ConnectAttrKind, Driver, DriverCall, EnvAttr, Handle, HandleType,
    TransactionOutcome,
};
use crate::error::{Error, HandshakeStep, Result};
use crate::guard::HandleGuard;
use crate::transaction::Transaction;
use crate::types::Value;

enum SessionState {
    Open { env: Handle, dbc: Handle },
    /// Disconnected with handles still to free; `dbc` is `None` once freed
    Releasing { env: Handle, dbc: Option<Handle> },
    Closed,
}

/// A connection to a data source through a [`Driver`]
///
/// The session owns one environment handle and one connection handle. It is
/// created connected and stays usable until [`close`](Self::close) or drop,
/// both of which release the handles exactly once.
///
/// A session is not meant to be driven from several threads at once;
/// transaction control takes `&mut self` so the borrow checker enforces
/// that for the common paths.
pub struct Session {
    driver: Arc<dyn Driver>,
    state: SessionState,
}

impl Session {
    /// Connect using `target` plus credentials
    ///
    /// The driver receives `"<target>;UID=<user>;PWD=<password>"` and may
    /// prompt for anything still missing.
    ///
    /// # Example
    ///
    /// ```
    /// # use std::sync::Arc;
    /// # use rowcursor_client::{MemoryDriver, Session};
    /// # fn main() -> rowcursor_client::Result<()> {
    /// let driver = Arc::new(MemoryDriver::new());
    /// let session = Session::connect(driver, "DRIVER=Memory;DATABASE=bank", "app", "secret")?;
    /// assert!(session.is_open());
    /// # Ok(())
    /// # }
    /// ```
    pub fn connect(
        driver: Arc<dyn Driver>,
        target: &str,
        user: &str,
        password: &str,
    ) -> Result<Self> {
        Self::connect_with(driver, &SessionConfig::new(target, user, password))
    }

    /// Connect using a [`SessionConfig`]
    ///
    /// Runs the handshake: allocate environment, set protocol version,
    /// allocate connection, connect. Each handle is guarded until the
    /// handshake completes, so a failing step releases everything allocated
    /// before it.
    pub fn connect_with(driver: Arc<dyn Driver>, config: &SessionConfig) -> Result<Self> {
        info!("Connecting to {}", config.redacted_target());

        let (env, dbc) = {
            let d: &dyn Driver = driver.as_ref();

            let env = HandleGuard::allocate(d, HandleType::Environment, None)
                .map_err(|code| Error::connection(HandshakeStep::AllocateEnvironment, code))?;

            d.set_env_attr(env.handle(), EnvAttr::OdbcVersion(config.odbc_version))
                .map_err(|code| Error::connection(HandshakeStep::SetEnvironmentAttribute, code))?;

            let dbc = HandleGuard::allocate(d, HandleType::Connection, Some(env.handle()))
                .map_err(|code| Error::connection(HandshakeStep::AllocateConnection, code))?;

            d.driver_connect(dbc.handle(), &config.target_string(), config.completion)
                .map_err(|code| Error::connection(HandshakeStep::DriverConnect, code))?;

            (env.commit(), dbc.commit())
        };

        info!("Successfully connected");
        Ok(Self {
            driver,
            state: SessionState::Open { env, dbc },
        })
    }

    /// Start an explicit transaction by turning autocommit off
    pub fn begin(&mut self) -> Result<()> {
        debug!("Disabling autocommit");
        self.set_autocommit(false)
    }

    /// Commit the open transaction and turn autocommit back on
    pub fn commit(&mut self) -> Result<()> {
        self.end_transaction(TransactionOutcome::Commit)
    }

    /// Roll back the open transaction and turn autocommit back on
    pub fn rollback(&mut self) -> Result<()> {
        self.end_transaction(TransactionOutcome::Rollback)
    }

    /// Begin a transaction that rolls back unless committed
    ///
    /// # Example
    ///
    /// ```
    /// # use std::sync::Arc;
    /// # use rowcursor_client::{MemoryDriver, Session};
    /// # fn main() -> rowcursor_client::Result<()> {
    /// # let driver = Arc::new(MemoryDriver::new());
    /// let mut session = Session::connect(driver, "DSN=bank", "app", "secret")?;
    /// let tx = session.transaction()?;
    /// tx.commit()?;
    /// assert!(session.autocommit()?);
    /// # Ok(())
    /// # }
    /// ```
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        Transaction::begin(self)
    }

    /// Whether the driver currently has autocommit on
    pub fn autocommit(&self) -> Result<bool> {
        let (_, dbc) = self.handles_or_closed()?;
        match self
            .driver
            .get_connect_attr(dbc, ConnectAttrKind::Autocommit)
            .map_err(|code| Error::driver(DriverCall::GetConnectAttribute, code))?
        {
            ConnectAttr::Autocommit(on) => Ok(on),
        }
    }

    /// Execute a statement and return a cursor over its result rows
    ///
    /// The statement handle belongs to the returned cursor, which borrows the
    /// session so it cannot outlive the connection it runs on.
    pub fn execute(&self, query: &str) -> Result<ResultCursor<'_>> {
        let (_, dbc) = self.handles_or_closed()?;
        debug!("Executing statement: {}", query);

        let d: &dyn Driver = self.driver.as_ref();
        let stmt = HandleGuard::allocate(d, HandleType::Statement, Some(dbc))
            .map_err(|code| Error::driver(DriverCall::AllocateStatement, code))?;
        d.exec_direct(stmt.handle(), query)
            .map_err(|code| Error::driver(DriverCall::ExecDirect, code))?;

        ResultCursor::from_statement(d, stmt)
    }

    /// Execute with bound parameters
    ///
    /// Binding is not implemented: any non-empty `params` is rejected rather
    /// than silently ignored.
    pub fn execute_with_params(&self, query: &str, params: &[Value]) -> Result<ResultCursor<'_>> {
        if !params.is_empty() {
            return Err(Error::Unsupported("parameter binding"));
        }
        self.execute(query)
    }

    /// Disconnect and release both handles; a no-op once closed
    ///
    /// Teardown stops at the first failing step and keeps the handles not yet
    /// released, so a later `close` (or drop) resumes from that step. The
    /// session stops accepting work as soon as it is disconnected.
    pub fn close(&mut self) -> Result<()> {
        if let SessionState::Open { env, dbc } = self.state {
            self.driver
                .disconnect(dbc)
                .map_err(|code| Error::driver(DriverCall::Disconnect, code))?;
            self.state = SessionState::Releasing {
                env,
                dbc: Some(dbc),
            };
        }

        if let SessionState::Releasing {
            env,
            dbc: Some(dbc),
        } = self.state
        {
            self.driver
                .free_handle(HandleType::Connection, dbc)
                .map_err(|code| Error::driver(DriverCall::FreeHandle, code))?;
            self.state = SessionState::Releasing { env, dbc: None };
        }

        if let SessionState::Releasing { env, dbc: None } = self.state {
            self.driver
                .free_handle(HandleType::Environment, env)
                .map_err(|code| Error::driver(DriverCall::FreeHandle, code))?;
            self.state = SessionState::Closed;
            info!("Session closed");
        }

        Ok(())
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, SessionState::Open { .. })
    }

    /// The `(environment, connection)` handles this session owns, if open
    pub fn handles(&self) -> Option<(Handle, Handle)> {
        match self.state {
            SessionState::Open { env, dbc } => Some((env, dbc)),
            SessionState::Releasing { .. } | SessionState::Closed => None,
        }
    }

    /// Move both handles into a new session, leaving this one closed
    pub fn take(&mut self) -> Session {
        Session {
            driver: Arc::clone(&self.driver),
            state: mem::replace(&mut self.state, SessionState::Closed),
        }
    }

    fn handles_or_closed(&self) -> Result<(Handle, Handle)> {
        self.handles().ok_or(Error::Closed("session"))
    }

    fn set_autocommit(&mut self, on: bool) -> Result<()> {
        let (_, dbc) = self.handles_or_closed()?;
        self.driver
            .set_connect_attr(dbc, ConnectAttr::Autocommit(on))
            .map_err(|code| Error::driver(DriverCall::SetConnectAttribute, code))
    }

    fn end_transaction(&mut self, outcome: TransactionOutcome) -> Result<()> {
        let (_, dbc) = self.handles_or_closed()?;
        debug!("Ending transaction: {:?}", outcome);
        self.driver
            .end_transaction(dbc, outcome)
            .map_err(|code| Error::driver(DriverCall::EndTransaction, code))?;
        self.set_autocommit(true)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close session cleanly: {}", e);
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("handles", &self.handles())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{MemoryDriver, ReturnCode};

    fn connect(driver: &Arc<MemoryDriver>) -> Session {
        Session::connect(driver.clone(), "DSN=bank", "app", "secret").unwrap()
    }

    #[test]
    fn test_handshake_call_order() {
        let driver = Arc::new(MemoryDriver::new());
        let _session = connect(&driver);
        assert_eq!(
            driver.calls(),
            vec![
                DriverCall::AllocateEnvironment,
                DriverCall::SetEnvironmentAttribute,
                DriverCall::AllocateConnection,
                DriverCall::DriverConnect,
            ]
        );
        assert_eq!(driver.last_target().as_deref(), Some("DSN=bank;UID=app;PWD=secret"));
    }

    #[test]
    fn test_each_handshake_step_unwinds() {
        let steps = [
            HandshakeStep::AllocateEnvironment,
            HandshakeStep::SetEnvironmentAttribute,
            HandshakeStep::AllocateConnection,
            HandshakeStep::DriverConnect,
        ];
        for step in steps {
            let driver = Arc::new(MemoryDriver::new());
            driver.fail_on(step.call(), ReturnCode::Error);

            let err = Session::connect(driver.clone(), "DSN=bank", "app", "secret").unwrap_err();
            match err {
                Error::Connection { step: failed, .. } => assert_eq!(failed, step),
                other => panic!("Expected connection error, got {:?}", other),
            }
            assert_eq!(driver.live_handles(), 0, "leak after failing {:?}", step);
        }
    }

    #[test]
    fn test_failed_execute_releases_statement() {
        let driver = Arc::new(MemoryDriver::new());
        let session = connect(&driver);

        let err = session.execute("SELECT * FROM missing").unwrap_err();
        assert_eq!(err.failed_call(), Some(DriverCall::ExecDirect));
        assert_eq!(driver.live_handles_of(HandleType::Statement), 0);
    }

    #[test]
    fn test_end_transaction_failure_keeps_autocommit_off() {
        let driver = Arc::new(MemoryDriver::new());
        let mut session = connect(&driver);

        session.begin().unwrap();
        driver.fail_on(DriverCall::EndTransaction, ReturnCode::Error);
        let err = session.commit().unwrap_err();
        assert_eq!(err.failed_call(), Some(DriverCall::EndTransaction));
        assert!(!session.autocommit().unwrap());
    }

    #[test]
    fn test_failed_disconnect_keeps_handles_for_retry() {
        let driver = Arc::new(MemoryDriver::new());
        let mut session = connect(&driver);

        driver.fail_on(DriverCall::Disconnect, ReturnCode::Error);
        let err = session.close().unwrap_err();
        assert_eq!(err.failed_call(), Some(DriverCall::Disconnect));
        assert!(session.is_open());
        assert_eq!(driver.live_handles(), 2);

        driver.clear_failures();
        session.close().unwrap();
        assert!(!session.is_open());
        assert_eq!(driver.live_handles(), 0);
    }

    #[test]
    fn test_drop_retries_after_failed_close() {
        let driver = Arc::new(MemoryDriver::new());
        let mut session = connect(&driver);

        driver.fail_on(DriverCall::Disconnect, ReturnCode::Error);
        assert!(session.close().is_err());
        driver.clear_failures();
        drop(session);
        assert_eq!(driver.live_handles(), 0);
    }

    #[test]
    fn test_failed_free_resumes_without_disconnecting_again() {
        let driver = Arc::new(MemoryDriver::new());
        let mut session = connect(&driver);

        driver.fail_on(DriverCall::FreeHandle, ReturnCode::Error);
        let err = session.close().unwrap_err();
        assert_eq!(err.failed_call(), Some(DriverCall::FreeHandle));
        assert!(!session.is_open());
        assert!(matches!(session.execute("SELECT 1"), Err(Error::Closed("session"))));
        assert_eq!(driver.live_handles(), 2);

        driver.clear_failures();
        session.close().unwrap();
        assert_eq!(driver.call_count(DriverCall::Disconnect), 1);
        assert_eq!(driver.live_handles(), 0);

        let calls = driver.calls().len();
        session.close().unwrap();
        assert_eq!(driver.calls().len(), calls);
    }

    #[test]
    fn test_closed_session_rejects_work() {
        let driver = Arc::new(MemoryDriver::new());
        let mut session = connect(&driver);
        session.close().unwrap();

        assert!(matches!(session.execute("SELECT 1"), Err(Error::Closed("session"))));
        assert!(matches!(session.begin(), Err(Error::Closed("session"))));
    }
}
