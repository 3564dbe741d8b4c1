//! Stage edits in a transaction, then commit or walk away
//!
//! Run with: cargo run --example transactions

use vellum_core::MemorySession;

fn balances(session: &mut MemorySession) -> anyhow::Result<()> {
    let rows = session
        .execute("SELECT $ FROM accounts ORDER BY _id")?
        .collect_documents(10)?;
    for row in &rows {
        let id = row.get("_id").map(|v| v.to_string()).unwrap_or_default();
        let balance = row.get("balance").map(|v| v.to_string()).unwrap_or_default();
        println!("  {id}: {balance}");
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let mut session = MemorySession::open_memory()?;
    session.execute(
        "INSERT INTO accounts VALUES \
         {_id: 'ada', balance: 100}, {_id: 'grace', balance: 50}",
    )?;

    println!("Vellum Transactions");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Opening balances:");
    balances(&mut session)?;

    // First attempt: transfer too much, inspect, abandon
    println!();
    println!("BEGIN: moving 80 from ada to grace...");
    session.execute("BEGIN")?;
    session.execute("UPDATE accounts SET balance = balance - 80 WHERE _id = 'ada'")?;
    session.execute("UPDATE accounts SET balance = balance + 80 WHERE _id = 'grace'")?;
    println!("Inside the transaction:");
    balances(&mut session)?;

    println!("That drains ada. ROLLBACK.");
    session.execute("ROLLBACK")?;
    println!("After rollback:");
    balances(&mut session)?;

    // Second attempt: a smaller transfer, committed
    println!();
    println!("BEGIN: moving 30 instead...");
    session.execute("BEGIN")?;
    session.execute("UPDATE accounts SET balance = balance - 30 WHERE _id = 'ada'")?;
    session.execute("UPDATE accounts SET balance = balance + 30 WHERE _id = 'grace'")?;
    session.execute("COMMIT")?;
    println!("After commit:");
    balances(&mut session)?;

    let bytes = session.checkpoint()?;
    println!();
    println!("Checkpoint wrote {bytes} bytes (committed records only)");

    Ok(())
}
