//! Drive a session through the query tab strip, the way the studio
//! front end does
//!
//! Run with: cargo run --example query_tabs

use vellum_core::session::tabs::templates;
use vellum_core::{MemorySession, TabSet};

fn main() -> anyhow::Result<()> {
    let mut session = MemorySession::open_memory()?;
    session.execute(
        "INSERT INTO planets VALUES \
         {name: 'Mercury', moons: 0}, {name: 'Earth', moons: 1}, \
         {name: 'Mars', moons: 2}, {name: 'Jupiter', moons: 95}",
    )?;

    println!("Vellum Query Tabs");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let mut tabs = TabSet::new();

    // Tab 1: browse everything
    tabs.active_mut()?.query = templates::select_all("planets");
    let tab = tabs.run_active(&mut session)?;
    println!();
    println!("Tab {} ran: {}", tab.name(), tab.query);
    println!("{}", tab.results_json());

    // Tab 2: a filtered view with a bound parameter
    tabs.open();
    {
        let tab = tabs.active_mut()?;
        tab.query = "SELECT name FROM planets WHERE moons >= @min ORDER BY moons DESC".to_string();
        tab.parameters.insert("min", 1i64);
    }
    let tab = tabs.run_active(&mut session)?;
    println!();
    println!("Tab {} ran: {}", tab.name(), tab.query);
    println!("{}", tab.results_json());

    // Tab names climb and never come back
    let second = tab.id();
    tabs.close(second);
    tabs.open();
    println!();
    println!(
        "Closed tab 2, opened a fresh one: it is tab {}",
        tabs.active()?.name()
    );

    // Every tab keeps its own grid; tab 1 still holds the full browse
    let strip: Vec<&str> = tabs.tabs().iter().map(|t| t.name()).collect();
    println!("Open tabs: {strip:?}");
    println!(
        "Tab 1 still holds {} row(s) from its last run",
        tabs.tabs()[0].results().len()
    );

    Ok(())
}
