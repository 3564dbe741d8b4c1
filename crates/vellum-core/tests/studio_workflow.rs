//! End-to-end studio workflows: open, edit, browse through tabs,
//! checkpoint, reopen.

use anyhow::Result;
use tempfile::tempdir;
use vellum_core::session::tabs::templates;
use vellum_core::{
    Document, MemorySession, RebuildOptions, Session, TabSet, Value, VellumError,
};

#[test]
fn test_open_edit_checkpoint_reopen_cycle() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("inventory.vellum");

    {
        let mut session = Session::open_file(&path)?;
        session.execute(
            "INSERT INTO parts VALUES \
             {sku: 'B-204', qty: 12}, {sku: 'A-117', qty: 3}, {sku: 'C-550', qty: 44}",
        )?;
        session.execute("UPDATE parts SET qty = qty - 1 WHERE sku = 'A-117'")?;
        session.checkpoint()?;
    }

    // A second process opens the same file and sees the edits
    let mut session = Session::open_file(&path)?;
    let rows = session
        .execute("SELECT sku, qty FROM parts WHERE qty < 10")?
        .collect_documents(10)?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("sku"), Some(&Value::String("A-117".into())));
    assert_eq!(rows[0].get("qty"), Some(&Value::Int(2)));
    Ok(())
}

#[test]
fn test_unsaved_edits_do_not_reach_the_file() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("draft.vellum");

    {
        let mut session = Session::open_file(&path)?;
        session.execute("INSERT INTO notes VALUES {text: 'saved'}")?;
        session.checkpoint()?;
        session.execute("INSERT INTO notes VALUES {text: 'never saved'}")?;
        assert!(session.has_unsaved_changes());
        // Dropped without a checkpoint, like closing the app
    }

    let mut session = Session::open_file(&path)?;
    let rows = session.execute("SELECT $ FROM notes")?.collect_documents(10)?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("text"), Some(&Value::String("saved".into())));
    Ok(())
}

#[test]
fn test_tab_strip_drives_queries() -> Result<()> {
    let mut session = MemorySession::open_memory()?;
    session.execute(
        "INSERT INTO cities VALUES \
         {name: 'Oslo', pop: 709}, {name: 'Bergen', pop: 286}, {name: 'Trondheim', pop: 212}",
    )?;

    let mut tabs = TabSet::new();

    // Tab 1 runs a template count; a scalar leaves the grid empty
    tabs.active_mut()?.query = templates::count_all("cities");
    let tab = tabs.run_active(&mut session)?;
    assert!(tab.results().is_empty());
    assert_eq!(tab.results_json(), "[]");

    // Tab 2 browses documents; the grid renders display text
    tabs.open();
    tabs.active_mut()?.query =
        "SELECT name, pop FROM cities WHERE pop > 250 ORDER BY pop DESC".to_string();
    let tab = tabs.run_active(&mut session)?;
    assert_eq!(tab.results().len(), 2);
    assert!(tab.results_json().contains("\"name\": \"Oslo\""));
    assert!(tab.results_json().contains("\"pop\": \"709\""));

    // Each tab keeps its own result set
    let first = tabs.tabs()[0].id();
    assert!(tabs.select(first));
    assert!(tabs.active()?.results().is_empty());
    Ok(())
}

#[test]
fn test_staged_transaction_can_be_abandoned() -> Result<()> {
    let mut session = MemorySession::open_memory()?;
    session.execute("INSERT INTO accounts VALUES {_id: 'ada', balance: 100}")?;

    session.execute("BEGIN")?;
    session.execute("UPDATE accounts SET balance = balance - 40 WHERE _id = 'ada'")?;
    session.execute("INSERT INTO accounts VALUES {_id: 'grace', balance: 40}")?;

    // Inside the transaction both edits are visible
    let rows = session.execute("SELECT $ FROM accounts")?.collect_documents(10)?;
    assert_eq!(rows.len(), 2);

    session.execute("ROLLBACK")?;
    let rows = session.execute("SELECT $ FROM accounts")?.collect_documents(10)?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("balance"), Some(&Value::Int(100)));
    Ok(())
}

#[test]
fn test_file_export_import_between_stores() -> Result<()> {
    let dir = tempdir()?;
    let export_path = dir.path().join("crew.json");

    let mut source = MemorySession::open_memory()?;
    source.execute("INSERT INTO crew VALUES {name: 'Ripley'}, {name: 'Dallas'}")?;
    let sql = templates::export_to_file("crew", &export_path.display().to_string());
    let written = source.execute(&sql)?.collect_values()?;
    assert_eq!(written, vec![Value::Int(2)]);

    // The file is plain JSON any other tool could read
    let text = std::fs::read_to_string(&export_path)?;
    let parsed: serde_json::Value = serde_json::from_str(&text)?;
    assert_eq!(parsed.as_array().map(Vec::len), Some(2));

    let mut target = MemorySession::open_memory()?;
    let imported = target.import_collection("crew", &std::fs::read(&export_path)?)?;
    assert_eq!(imported, 2);
    let rows = target.execute("SELECT $ FROM crew")?.collect_documents(10)?;
    assert_eq!(rows.len(), 2);
    Ok(())
}

#[test]
fn test_rebuild_shrinks_churned_file() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("churn.vellum");

    let mut session = Session::open_file(&path)?;
    session.execute("INSERT INTO log VALUES {n: 1}, {n: 2}, {n: 3}, {n: 4}, {n: 5}")?;
    session.execute("UPDATE log SET n = n * 10")?;
    session.execute("DELETE FROM log WHERE n > 10")?;
    session.checkpoint()?;

    let before = std::fs::metadata(&path)?.len();
    let delta = session.rebuild(RebuildOptions::default())?;
    assert!(delta > 0, "rebuild should drop dead journal entries");
    assert_eq!(std::fs::metadata(&path)?.len(), before - delta as u64);
    drop(session);

    let mut session = Session::open_file(&path)?;
    let rows = session.execute("SELECT $ FROM log")?.collect_documents(10)?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("n"), Some(&Value::Int(10)));
    Ok(())
}

#[test]
fn test_parameters_flow_from_client_to_query() -> Result<()> {
    let mut session = MemorySession::open_memory()?;
    session.execute("INSERT INTO books VALUES {title: 'Dune', year: 1965}, {title: 'Neuromancer', year: 1984}")?;

    let mut params = Document::new();
    params.insert("after", 1970i64);
    let rows = session
        .execute_with("SELECT title FROM books WHERE year > @after", &params)?
        .collect_documents(10)?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("title"), Some(&Value::String("Neuromancer".into())));
    Ok(())
}

#[test]
fn test_errors_name_what_went_wrong() {
    let mut session = MemorySession::open_memory().unwrap();

    assert!(matches!(
        session.execute("SELECT $ FROM nowhere"),
        Err(VellumError::UnknownCollection(name)) if name == "nowhere"
    ));
    assert!(matches!(
        session.execute("SELECT FROM x"),
        Err(VellumError::Syntax { .. })
    ));

    session.execute("INSERT INTO t VALUES {_id: 1}").unwrap();
    assert!(matches!(
        session.execute("INSERT INTO t VALUES {_id: 1}"),
        Err(VellumError::DuplicateKey(_, _))
    ));

    // An unbound parameter surfaces when the row is evaluated
    let pulled = session
        .execute("SELECT $ FROM t WHERE _id = @missing")
        .unwrap()
        .collect_values();
    assert!(matches!(
        pulled,
        Err(VellumError::Parameter(name)) if name == "missing"
    ));
}
