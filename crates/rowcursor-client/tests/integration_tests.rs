//! Integration tests for rowcursor-client
//!
//! These run the public API end to end against the in-memory driver.

use std::sync::Arc;

use rowcursor_client::driver::TransactionOutcome;
use rowcursor_client::{
    DriverCall, Error, HandleType, HandshakeStep, MemoryDriver, Result, Session, SqlDataType,
    TableData, Value,
};

const ACCOUNTS: &str = "SELECT id, name, balance FROM accounts";

fn accounts() -> TableData {
    TableData::new()
        .column("id", SqlDataType::BigInt)
        .column("name", SqlDataType::VarChar)
        .column("balance", SqlDataType::Double)
        .row(vec![
            Value::Int(1),
            Value::Text("Alice".to_string()),
            Value::Float(3.14),
        ])
        .row(vec![Value::Int(2), Value::Null, Value::Float(-0.5)])
}

fn bank() -> Arc<MemoryDriver> {
    Arc::new(MemoryDriver::new().with_table(ACCOUNTS, accounts()))
}

fn connect(driver: &Arc<MemoryDriver>) -> Result<Session> {
    Session::connect(
        driver.clone(),
        "DRIVER=MariaDB Unicode;SERVER=localhost;DATABASE=bank",
        "app",
        "secret",
    )
}

#[test]
fn test_two_row_scenario() -> Result<()> {
    let driver = bank();
    let session = connect(&driver)?;
    let mut rows = session.execute(ACCOUNTS)?;

    assert_eq!(rows.column_names(), ["id", "name", "balance"]);

    assert!(rows.next()?);
    assert_eq!(rows.get_string("name")?.as_deref(), Some("Alice"));
    assert_eq!(rows.get_float(2)?, Some(3.14));

    assert!(rows.next()?);
    assert_eq!(rows.get_string("name")?, None);
    assert_eq!(rows.get_float("balance")?, Some(-0.5));

    assert!(!rows.next()?);
    assert!(!rows.next()?);
    assert!(!rows.next()?);
    Ok(())
}

#[test]
fn test_exhausted_cursor_stops_calling_driver() -> Result<()> {
    let driver = bank();
    let session = connect(&driver)?;
    let mut rows = session.execute(ACCOUNTS)?;

    while rows.next()? {}
    let fetches = driver.call_count(DriverCall::Fetch);
    assert!(!rows.next()?);
    assert_eq!(driver.call_count(DriverCall::Fetch), fetches);
    Ok(())
}

#[test]
fn test_null_is_never_a_default() -> Result<()> {
    let driver = Arc::new(MemoryDriver::new().with_table(
        "SELECT * FROM empty_row",
        TableData::new()
            .column("i", SqlDataType::BigInt)
            .column("f", SqlDataType::Double)
            .column("s", SqlDataType::VarChar)
            .row(vec![Value::Null, Value::Null, Value::Null]),
    ));
    let session = connect(&driver)?;
    let mut rows = session.execute("SELECT * FROM empty_row")?;
    assert!(rows.next()?);

    for column in 0..3 {
        assert_eq!(rows.get_int(column)?, None);
        assert_eq!(rows.get_float(column)?, None);
        assert_eq!(rows.get_string(column)?, None);
        assert_eq!(rows.get_value(column)?, Value::Null);
    }
    Ok(())
}

#[test]
fn test_empty_string_is_not_null() -> Result<()> {
    let driver = Arc::new(MemoryDriver::new().with_table(
        "SELECT note FROM notes",
        TableData::new()
            .column("note", SqlDataType::VarChar)
            .row(vec![Value::Text(String::new())]),
    ));
    let session = connect(&driver)?;
    let mut rows = session.execute("SELECT note FROM notes")?;
    assert!(rows.next()?);
    assert_eq!(rows.get_string("note")?, Some(String::new()));
    Ok(())
}

#[test]
fn test_driver_coerces_to_requested_kind() -> Result<()> {
    let driver = bank();
    let session = connect(&driver)?;
    let mut rows = session.execute(ACCOUNTS)?;
    assert!(rows.next()?);

    assert_eq!(rows.get_float("id")?, Some(1.0));
    assert_eq!(rows.get_string("id")?.as_deref(), Some("1"));
    assert_eq!(rows.get_string("balance")?.as_deref(), Some("3.14"));
    assert_eq!(rows.get_int("balance")?, Some(3));
    Ok(())
}

#[test]
fn test_unknown_column_name() -> Result<()> {
    let driver = bank();
    let session = connect(&driver)?;
    let mut rows = session.execute(ACCOUNTS)?;
    assert!(rows.next()?);

    let calls = driver.calls().len();
    assert!(matches!(
        rows.get_int("missing"),
        Err(Error::ColumnNotFound(name)) if name == "missing"
    ));
    assert!(matches!(
        rows.get_string(3),
        Err(Error::ColumnOutOfRange { index: 3, count: 3 })
    ));
    assert_eq!(driver.calls().len(), calls);
    Ok(())
}

#[test]
fn test_current_row_snapshot() -> Result<()> {
    let driver = bank();
    let session = connect(&driver)?;
    let mut rows = session.execute(ACCOUNTS)?;

    assert!(rows.next()?);
    let row = rows.current_row()?;
    assert_eq!(row.get("id"), Some(&Value::Int(1)));
    assert_eq!(row.get("name").and_then(|v| v.as_str()), Some("Alice"));

    assert!(rows.next()?);
    let row = rows.current_row()?;
    assert!(row.get("name").is_some_and(|v| v.is_null()));
    Ok(())
}

#[test]
fn test_column_descriptions() -> Result<()> {
    let driver = bank();
    let session = connect(&driver)?;
    let rows = session.execute(ACCOUNTS)?;

    let types: Vec<SqlDataType> = rows.columns().iter().map(|c| c.data_type).collect();
    assert_eq!(
        types,
        vec![SqlDataType::BigInt, SqlDataType::VarChar, SqlDataType::Double]
    );
    assert_eq!(rows.column_count(), 3);
    Ok(())
}

#[test]
fn test_malformed_target_fails_at_connect_without_leaks() {
    let driver = bank();
    let err = Session::connect(driver.clone(), "this is not a connection string", "app", "secret")
        .unwrap_err();

    match err {
        Error::Connection { step, location, .. } => {
            assert_eq!(step, HandshakeStep::DriverConnect);
            assert!(location.file.ends_with("session.rs"));
        }
        other => panic!("Expected connection error, got {:?}", other),
    }
    assert_eq!(driver.live_handles(), 0);
}

#[test]
fn test_wrong_credentials_rejected() {
    let driver = Arc::new(MemoryDriver::new().with_credentials("app", "secret"));
    let err = Session::connect(driver.clone(), "DSN=bank", "app", "guess").unwrap_err();
    assert_eq!(err.failed_call(), Some(DriverCall::DriverConnect));
    assert_eq!(driver.live_handles(), 0);
}

#[test]
fn test_close_is_idempotent() -> Result<()> {
    let driver = bank();
    let mut session = connect(&driver)?;
    let mut rows = session.execute(ACCOUNTS)?;

    rows.close()?;
    let calls = driver.calls().len();
    rows.close()?;
    assert_eq!(driver.calls().len(), calls);
    drop(rows);
    assert_eq!(driver.calls().len(), calls);

    session.close()?;
    assert_eq!(driver.live_handles(), 0);
    let calls = driver.calls().len();
    session.close()?;
    drop(session);
    assert_eq!(driver.calls().len(), calls);
    Ok(())
}

#[test]
fn test_drop_releases_everything() -> Result<()> {
    let driver = bank();
    {
        let session = connect(&driver)?;
        let mut rows = session.execute(ACCOUNTS)?;
        assert!(rows.next()?);
        assert_eq!(driver.live_handles(), 3);
    }
    assert_eq!(driver.live_handles(), 0);
    assert_eq!(
        driver
            .calls()
            .iter()
            .filter(|c| **c == DriverCall::FreeHandle)
            .count(),
        3
    );
    Ok(())
}

#[test]
fn test_cursor_released_before_session_close() -> Result<()> {
    let driver = bank();
    let mut session = connect(&driver)?;
    {
        let mut rows = session.execute(ACCOUNTS)?;
        assert!(rows.next()?);
        assert_eq!(driver.live_handles_of(HandleType::Statement), 1);
    }
    assert_eq!(driver.live_handles_of(HandleType::Statement), 0);

    session.close()?;
    assert_eq!(driver.live_handles(), 0);
    let calls = driver.calls();
    assert_eq!(
        calls[calls.len() - 4..],
        [
            DriverCall::FreeHandle,
            DriverCall::Disconnect,
            DriverCall::FreeHandle,
            DriverCall::FreeHandle,
        ]
    );
    Ok(())
}

#[test]
fn test_take_transfers_session_handles() -> Result<()> {
    let driver = bank();
    let mut source = connect(&driver)?;
    let handles = source.handles();

    let mut target = source.take();
    assert!(!source.is_open());
    assert_eq!(target.handles(), handles);

    let calls = driver.calls().len();
    drop(source);
    assert_eq!(driver.calls().len(), calls);

    target.close()?;
    assert_eq!(driver.live_handles(), 0);
    Ok(())
}

#[test]
fn test_take_transfers_cursor_handle() -> Result<()> {
    let driver = bank();
    let session = connect(&driver)?;
    let mut source = session.execute(ACCOUNTS)?;
    let handle = source.handle();

    let mut target = source.take();
    assert_eq!(source.handle(), None);
    assert_eq!(target.handle(), handle);
    assert!(source.column_names().is_empty());
    assert_eq!(target.column_names().len(), 3);

    let calls = driver.calls().len();
    source.close()?;
    assert_eq!(driver.calls().len(), calls);

    assert!(target.next()?);
    assert_eq!(target.get_int("id")?, Some(1));
    Ok(())
}

#[test]
fn test_assignment_releases_previous_session() -> Result<()> {
    let driver = bank();
    let mut session = connect(&driver)?;
    let first = session.handles();

    session = connect(&driver)?;
    assert_ne!(session.handles(), first);
    assert_eq!(driver.live_handles_of(HandleType::Connection), 1);
    assert_eq!(driver.live_handles_of(HandleType::Environment), 1);
    Ok(())
}

#[test]
fn test_begin_commit_restores_autocommit() -> Result<()> {
    let driver = bank();
    let mut session = connect(&driver)?;
    assert!(session.autocommit()?);

    session.begin()?;
    assert!(!session.autocommit()?);
    session.commit()?;
    assert!(session.autocommit()?);

    session.begin()?;
    session.rollback()?;
    assert!(session.autocommit()?);

    assert_eq!(
        driver.transactions(),
        vec![TransactionOutcome::Commit, TransactionOutcome::Rollback]
    );
    Ok(())
}

#[test]
fn test_transaction_guard() -> Result<()> {
    let driver = bank();
    let mut session = connect(&driver)?;

    let tx = session.transaction()?;
    {
        let mut rows = tx.execute(ACCOUNTS)?;
        assert!(rows.next()?);
    }
    tx.commit()?;

    assert!(session.autocommit()?);
    assert_eq!(driver.transactions(), vec![TransactionOutcome::Commit]);
    Ok(())
}

#[test]
fn test_parameter_binding_is_rejected() -> Result<()> {
    let driver = bank();
    let session = connect(&driver)?;

    let err = session
        .execute_with_params(ACCOUNTS, &[Value::Int(1)])
        .unwrap_err();
    assert!(matches!(err, Error::Unsupported(_)));
    assert_eq!(driver.call_count(DriverCall::AllocateStatement), 0);

    let mut rows = session.execute_with_params(ACCOUNTS, &[])?;
    assert!(rows.next()?);
    Ok(())
}

#[test]
fn test_failing_description_releases_statement() -> Result<()> {
    let driver = bank();
    let session = connect(&driver)?;
    driver.fail_on(DriverCall::DescribeColumn, rowcursor_client::ReturnCode::Error);

    let err = session.execute(ACCOUNTS).unwrap_err();
    assert_eq!(err.failed_call(), Some(DriverCall::DescribeColumn));
    assert_eq!(driver.live_handles_of(HandleType::Statement), 0);
    Ok(())
}

#[test]
fn test_get_data_failure_carries_call_site() -> Result<()> {
    let driver = bank();
    let session = connect(&driver)?;
    let mut rows = session.execute(ACCOUNTS)?;
    assert!(rows.next()?);

    driver.fail_on(DriverCall::GetData, rowcursor_client::ReturnCode::Error);
    let err = rows.get_string("name").unwrap_err();
    let location = err.location().expect("driver errors carry a call site");
    assert!(location.file.ends_with("cursor.rs"));
    assert_eq!(err.failed_call(), Some(DriverCall::GetData));
    Ok(())
}
