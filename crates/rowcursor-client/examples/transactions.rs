//! Transaction example for the rowcursor client library
//!
//! Shows explicit begin/commit/rollback and the scoped transaction guard.
//!
//! Run with:
//! ```bash
//! cargo run --example transactions
//! ```

use std::sync::Arc;

use rowcursor_client::{MemoryDriver, Result, Session, TableData};

const TRANSFER: &str = "UPDATE accounts SET balance = balance - 200 WHERE id = 1";

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let driver = Arc::new(MemoryDriver::new().with_table(TRANSFER, TableData::new()));
    let mut session = Session::connect(driver, "DSN=bank", "app", "secret")?;
    println!("✓ Connected! autocommit = {}\n", session.autocommit()?);

    // === Example 1: Explicit begin/commit ===
    session.begin()?;
    println!("  → Transaction started, autocommit = {}", session.autocommit()?);
    session.execute(TRANSFER)?;
    session.commit()?;
    println!("  → Committed, autocommit = {}\n", session.autocommit()?);

    // === Example 2: Guard with rollback ===
    let tx = session.transaction()?;
    tx.execute(TRANSFER)?;
    tx.rollback()?;
    println!("  → Rolled back, autocommit = {}\n", session.autocommit()?);

    // === Example 3: Guard dropped without commit rolls back ===
    {
        let tx = session.transaction()?;
        tx.execute(TRANSFER)?;
    }
    println!("  → Dropped guard rolled back, autocommit = {}", session.autocommit()?);

    session.close()?;
    Ok(())
}
