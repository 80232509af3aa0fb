//! Basic usage example for the rowcursor client library
//!
//! Connects through the in-memory driver, runs one query and walks the rows.
//!
//! Run with:
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::Arc;

use rowcursor_client::{MemoryDriver, Result, Session, SqlDataType, TableData, Value};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let driver = Arc::new(MemoryDriver::new().with_table(
        "SELECT id, name, balance FROM accounts",
        TableData::new()
            .column("id", SqlDataType::BigInt)
            .column("name", SqlDataType::VarChar)
            .column("balance", SqlDataType::Double)
            .row(vec![
                Value::Int(1),
                Value::Text("Alice".to_string()),
                Value::Float(3.14),
            ])
            .row(vec![Value::Int(2), Value::Null, Value::Float(-0.5)]),
    ));

    println!("Connecting...");
    let session = Session::connect(
        driver,
        "DRIVER=Memory;SERVER=localhost;DATABASE=bank",
        "app",
        "secret",
    )?;
    println!("✓ Connected!\n");

    let mut rows = session.execute("SELECT id, name, balance FROM accounts")?;
    println!("Columns: {}", rows.column_names().join(", "));

    while rows.next()? {
        let id = rows.get_int("id")?;
        let name = rows.get_string("name")?;
        let balance = rows.get_float("balance")?;

        println!(
            "  - Account #{}: {} ({})",
            id.map_or("NULL".to_string(), |v| v.to_string()),
            name.as_deref().unwrap_or("NULL"),
            balance.map_or("NULL".to_string(), |v| v.to_string()),
        );
    }

    rows.close()?;
    println!("\n✓ Done!");
    Ok(())
}
