//! Query tab bookkeeping
//!
//! A [`TabSet`] models the client's tab strip: each [`QueryTab`] owns
//! its statement text, its parameter bindings and the grid captured by
//! its last run. Only the active tab runs at a time.

use std::collections::BTreeMap;

use tracing::debug;
use uuid::Uuid;

use crate::document::Document;
use crate::errors::{Result, VellumError};
use crate::session::Session;
use crate::storage::file::StoreFile;

/// Documents kept per run unless the caller asks for more.
pub const DEFAULT_MAX_RESULTS: usize = 100;

/// One query tab.
#[derive(Clone, Debug)]
pub struct QueryTab {
    id: Uuid,
    name: String,
    /// Editable statement text.
    pub query: String,
    /// `@name` bindings applied when the tab runs.
    pub parameters: Document,
    results: Vec<Document>,
    results_json: String,
}

impl QueryTab {
    fn new(name: String) -> Self {
        QueryTab {
            id: Uuid::new_v4(),
            name,
            query: String::new(),
            parameters: Document::new(),
            results: Vec::new(),
            results_json: "[]".to_string(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Documents captured by the last run.
    pub fn results(&self) -> &[Document] {
        &self.results
    }

    /// The last result set as a pretty JSON array of field-to-text
    /// maps, every value rendered as display text.
    pub fn results_json(&self) -> &str {
        &self.results_json
    }
}

/// The set of open tabs plus which one is active.
pub struct TabSet {
    tabs: Vec<QueryTab>,
    active: Option<Uuid>,
    /// Lifetime open count. Default names come from here, so a closed
    /// "2" never comes back.
    opened: u64,
    max_results: usize,
}

impl TabSet {
    /// A tab set holding one fresh tab named "1".
    pub fn new() -> Self {
        Self::with_max_results(DEFAULT_MAX_RESULTS)
    }

    pub fn with_max_results(max_results: usize) -> Self {
        let mut set = TabSet {
            tabs: Vec::new(),
            active: None,
            opened: 0,
            max_results,
        };
        set.open();
        set
    }

    /// Open a fresh tab and make it active. Returns its id.
    pub fn open(&mut self) -> Uuid {
        self.opened += 1;
        let tab = QueryTab::new(self.opened.to_string());
        let id = tab.id();
        self.active = Some(id);
        self.tabs.push(tab);
        debug!(tab = self.opened, "tab opened");
        id
    }

    /// Close a tab. Closing the active one falls back to the most
    /// recently opened of the rest; closing the last leaves the set
    /// empty.
    pub fn close(&mut self, id: Uuid) {
        self.tabs.retain(|tab| tab.id != id);
        if self.active == Some(id) {
            self.active = self.tabs.last().map(QueryTab::id);
        }
    }

    /// Make a tab active. Returns false if no tab has that id.
    pub fn select(&mut self, id: Uuid) -> bool {
        if self.tabs.iter().any(|tab| tab.id == id) {
            self.active = Some(id);
            true
        } else {
            false
        }
    }

    pub fn active(&self) -> Result<&QueryTab> {
        let id = self.active.ok_or(VellumError::NoActiveTab)?;
        self.tabs
            .iter()
            .find(|tab| tab.id == id)
            .ok_or(VellumError::NoActiveTab)
    }

    pub fn active_mut(&mut self) -> Result<&mut QueryTab> {
        let id = self.active.ok_or(VellumError::NoActiveTab)?;
        self.tabs
            .iter_mut()
            .find(|tab| tab.id == id)
            .ok_or(VellumError::NoActiveTab)
    }

    pub fn tabs(&self) -> &[QueryTab] {
        &self.tabs
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    /// Run the active tab's query against a session and capture the
    /// results. At most `max_results` documents are kept; scalar
    /// results (counts, acknowledgements, plans) leave the grid empty
    /// even though the statement ran.
    pub fn run_active<S: StoreFile>(&mut self, session: &mut Session<S>) -> Result<&QueryTab> {
        let max = self.max_results;
        let tab = self.active_mut()?;
        let results = session
            .execute_with(&tab.query, &tab.parameters)?
            .collect_documents(max)?;
        debug!(tab = %tab.name, rows = results.len(), "tab ran");
        tab.results_json = render_results_json(&results)?;
        tab.results = results;
        Ok(&*tab)
    }
}

impl Default for TabSet {
    fn default() -> Self {
        Self::new()
    }
}

/// The client grid projection: one map per row, field name to display
/// text, pretty-printed.
fn render_results_json(docs: &[Document]) -> Result<String> {
    let grid: Vec<BTreeMap<&String, String>> = docs
        .iter()
        .map(|doc| doc.iter().map(|(k, v)| (k, v.to_string())).collect())
        .collect();
    Ok(serde_json::to_string_pretty(&grid)?)
}

/// Ready-made statements for the collection context menu.
pub mod templates {
    pub fn select_all(collection: &str) -> String {
        format!("SELECT $ FROM {collection};")
    }

    pub fn count_all(collection: &str) -> String {
        format!("SELECT COUNT(*) FROM {collection};")
    }

    pub fn explain_select(collection: &str) -> String {
        format!("EXPLAIN SELECT $ FROM {collection};")
    }

    pub fn list_indexes(collection: &str) -> String {
        format!("SELECT $ FROM $indexes WHERE collection = \"{collection}\";")
    }

    pub fn export_to_file(collection: &str, path: &str) -> String {
        format!("SELECT $ INTO $file('{path}') FROM {collection};")
    }

    pub fn analyze(collection: &str) -> String {
        format!("ANALYZE {collection};")
    }

    pub fn rename(collection: &str) -> String {
        format!("RENAME COLLECTION {collection} TO new_name;")
    }

    pub fn drop_collection(collection: &str) -> String {
        format!("DROP COLLECTION {collection};")
    }
}
