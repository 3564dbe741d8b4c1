//! Open a store, insert documents and query them back
//!
//! Run with: cargo run --example quickstart

use vellum_core::Session;

fn main() -> anyhow::Result<()> {
    let path = std::env::temp_dir().join("vellum-quickstart.vellum");
    // Start fresh on every run
    let _ = std::fs::remove_file(&path);

    let mut session = Session::open_file(&path)?;

    println!("Vellum Quickstart");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Store: {}", path.display());
    println!();

    session.execute(
        "INSERT INTO starships VALUES \
         {name: 'Nostromo', class: 'tug', crew: 7}, \
         {name: 'Sulaco', class: 'military', crew: 90}, \
         {name: 'Narcissus', class: 'shuttle', crew: 2}",
    )?;
    println!("Inserted 3 documents into 'starships'");

    let rows = session
        .execute("SELECT name, crew FROM starships WHERE crew > 5 ORDER BY crew DESC")?
        .collect_documents(10)?;
    println!();
    println!("Ships with more than five crew:");
    for row in &rows {
        let name = row.get("name").map(|v| v.to_string()).unwrap_or_default();
        let crew = row.get("crew").map(|v| v.to_string()).unwrap_or_default();
        println!("  {name} ({crew} aboard)");
    }

    let counts = session.execute("SELECT COUNT(*) FROM starships")?.collect_values()?;
    println!();
    println!("Total documents: {}", counts[0]);

    let bytes = session.checkpoint()?;
    let info = session.info();
    println!();
    println!("Checkpoint wrote {bytes} bytes");
    println!(
        "Store now holds {} collection(s), {} document(s)",
        info.collections, info.documents
    );

    println!();
    println!("Browse it interactively:");
    println!("   cargo run -p vellum-cli -- shell {}", path.display());

    Ok(())
}
