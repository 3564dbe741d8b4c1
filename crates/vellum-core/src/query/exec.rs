//! Statement execution
//!
//! Turns a parsed [`Statement`] into work against a session. Reads
//! come back as a lazy [`ResultCursor`] that scans in primary-key
//! order and stops pulling once a LIMIT is satisfied; writes are
//! staged against a trial copy of the catalog first, so a statement
//! that fails halfway leaves nothing behind.

use crate::catalog::{validate_collection_name, Catalog};
use crate::document::{json, Collation, Document, Value};
use crate::errors::{Result, VellumError};
use crate::query::ast::{
    Expr, IntoTarget, Path, Projection, SelectStatement, SortOrder, Source, Statement,
};
use crate::query::eval::{eval, eval_predicate, EvalContext};
use crate::session::{Session, SessionInfo};
use crate::storage::file::StoreFile;
use crate::storage::record::Record;

/// Forward-only result of one executed statement.
///
/// Scalars (counts, acknowledgements, plans) carry a single value;
/// SELECT yields documents on demand.
pub struct ResultCursor<'a> {
    inner: CursorInner<'a>,
}

enum CursorInner<'a> {
    Empty,
    Scalar(Option<Value>),
    Stream(Box<dyn Iterator<Item = Result<Value>> + 'a>),
}

impl std::fmt::Debug for ResultCursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = match &self.inner {
            CursorInner::Empty => "Empty",
            CursorInner::Scalar(value) => return f.debug_tuple("Scalar").field(value).finish(),
            CursorInner::Stream(_) => "Stream",
        };
        f.write_str(inner)
    }
}

impl<'a> ResultCursor<'a> {
    pub(crate) fn empty() -> Self {
        ResultCursor { inner: CursorInner::Empty }
    }

    pub(crate) fn scalar(value: Value) -> Self {
        ResultCursor { inner: CursorInner::Scalar(Some(value)) }
    }

    pub(crate) fn stream(iter: Box<dyn Iterator<Item = Result<Value>> + 'a>) -> Self {
        ResultCursor { inner: CursorInner::Stream(iter) }
    }

    pub(crate) fn from_values(values: Vec<Value>) -> Self {
        ResultCursor {
            inner: CursorInner::Stream(Box::new(values.into_iter().map(Ok))),
        }
    }

    /// Pull the next value, if any.
    pub fn try_next(&mut self) -> Result<Option<Value>> {
        match &mut self.inner {
            CursorInner::Empty => Ok(None),
            CursorInner::Scalar(slot) => Ok(slot.take()),
            CursorInner::Stream(iter) => iter.next().transpose(),
        }
    }

    /// Drain every remaining value.
    pub fn collect_values(mut self) -> Result<Vec<Value>> {
        let mut out = Vec::new();
        while let Some(value) = self.try_next()? {
            out.push(value);
        }
        Ok(out)
    }

    /// Drain up to `max` documents, skipping scalar results. This is
    /// the shape a result grid wants.
    pub fn collect_documents(mut self, max: usize) -> Result<Vec<Document>> {
        let mut out = Vec::new();
        while out.len() < max {
            match self.try_next()? {
                Some(Value::Document(doc)) => out.push(doc),
                Some(_) => continue,
                None => break,
            }
        }
        Ok(out)
    }
}

impl Iterator for ResultCursor<'_> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        self.try_next().transpose()
    }
}

/// Run one statement against a session.
pub(crate) fn execute<'a, S: StoreFile>(
    session: &'a mut Session<S>,
    statement: Statement,
    params: &Document,
) -> Result<ResultCursor<'a>> {
    match statement {
        Statement::Begin => {
            session.begin()?;
            Ok(ResultCursor::empty())
        }
        Statement::Commit => {
            session.commit()?;
            Ok(ResultCursor::empty())
        }
        Statement::Rollback => {
            session.rollback()?;
            Ok(ResultCursor::empty())
        }
        Statement::Checkpoint => {
            let bytes = session.checkpoint()?;
            Ok(ResultCursor::scalar(Value::Int(bytes as i64)))
        }
        Statement::Rebuild { options } => {
            let options = parse_rebuild_options(options.as_ref(), params)?;
            let delta = session.rebuild(options)?;
            Ok(ResultCursor::scalar(Value::Int(delta)))
        }
        Statement::Analyze { collection } => {
            let stats = session.analyze(&collection)?;
            let mut doc = Document::new();
            doc.insert("collection", collection);
            doc.insert("documents", stats.documents as i64);
            doc.insert("total_bytes", stats.total_bytes as i64);
            doc.insert("avg_bytes", stats.avg_bytes() as i64);
            doc.insert("analyzed_at", stats.analyzed_at);
            Ok(ResultCursor::scalar(Value::Document(doc)))
        }
        Statement::Pragma { name, value } => {
            if !name.eq_ignore_ascii_case("user_version") {
                return Err(VellumError::eval(format!("unknown pragma '{name}'")));
            }
            match value {
                None => Ok(ResultCursor::scalar(Value::Int(
                    session.user_version() as i64
                ))),
                Some(v) => {
                    let v = u32::try_from(v).map_err(|_| {
                        VellumError::eval("USER_VERSION must fit an unsigned 32-bit integer")
                    })?;
                    session.set_user_version(v);
                    Ok(ResultCursor::empty())
                }
            }
        }
        Statement::Rename { from, to } => {
            session.apply_write(Record::RenameCollection { from, to })?;
            Ok(ResultCursor::scalar(Value::Bool(true)))
        }
        Statement::Drop { collection } => {
            session.apply_write(Record::DropCollection { name: collection })?;
            Ok(ResultCursor::scalar(Value::Bool(true)))
        }
        Statement::Insert { collection, documents } => {
            let count = run_insert(session, &collection, &documents, params)?;
            Ok(ResultCursor::scalar(Value::Int(count)))
        }
        Statement::Update { collection, assignments, filter } => {
            let count = run_update(session, &collection, &assignments, filter.as_ref(), params)?;
            Ok(ResultCursor::scalar(Value::Int(count)))
        }
        Statement::Delete { collection, filter } => {
            let count = run_delete(session, &collection, filter.as_ref(), params)?;
            Ok(ResultCursor::scalar(Value::Int(count)))
        }
        Statement::Explain(select) => {
            let mut plan = explain_document(&select);
            let estimate = match &select.source {
                Source::Collection(name) => {
                    session.catalog().get(name).map(|c| c.len() as i64)
                }
                Source::Database => Some(1),
                Source::Cols | Source::Indexes => Some(session.catalog().len() as i64),
            };
            plan.insert("estimated_docs", estimate.map(Value::Int).unwrap_or(Value::Null));
            Ok(ResultCursor::scalar(Value::Document(plan)))
        }
        Statement::Select(select) => {
            if select.into.is_some() {
                let written = run_select_into(session, select, params)?;
                return Ok(ResultCursor::scalar(Value::Int(written)));
            }
            let info = session.info();
            select_stream(session.catalog(), &info, select, params)
        }
    }
}

fn eval_filter(
    filter: Option<&Expr>,
    doc: &Document,
    params: &Document,
    collation: Collation,
) -> Result<bool> {
    match filter {
        None => Ok(true),
        Some(expr) => {
            let ctx = EvalContext { root: doc, params, collation };
            eval_predicate(expr, &ctx)
        }
    }
}

/// Build the lazy pipeline for a plain SELECT.
fn select_stream<'a>(
    catalog: &'a Catalog,
    info: &SessionInfo,
    select: SelectStatement,
    params: &Document,
) -> Result<ResultCursor<'a>> {
    let collation = catalog.collation();
    let params = params.clone();
    let SelectStatement { projection, source, filter, order, limit, offset, .. } = select;

    let filtered: Box<dyn Iterator<Item = Result<Document>> + 'a> = match &source {
        Source::Collection(name) => {
            let collection = catalog.require(name)?;
            let params = params.clone();
            Box::new(collection.iter().filter_map(move |doc| {
                match eval_filter(filter.as_ref(), doc, &params, collation) {
                    Ok(true) => Some(Ok(doc.clone())),
                    Ok(false) => None,
                    Err(e) => Some(Err(e)),
                }
            }))
        }
        virtual_source => {
            let rows = virtual_rows(virtual_source, catalog, info);
            let params = params.clone();
            Box::new(rows.into_iter().filter_map(move |doc| {
                match eval_filter(filter.as_ref(), &doc, &params, collation) {
                    Ok(true) => Some(Ok(doc)),
                    Ok(false) => None,
                    Err(e) => Some(Err(e)),
                }
            }))
        }
    };

    // COUNT(*) collapses the stream into one number
    if matches!(projection, Projection::Count) {
        let mut count = 0i64;
        for item in filtered {
            item?;
            count += 1;
        }
        return Ok(ResultCursor::scalar(Value::Int(count)));
    }

    if let Some(order_by) = order {
        // Sorting has to materialize
        let mut keyed = Vec::new();
        for item in filtered {
            let doc = item?;
            let key = doc
                .get_steps(&order_by.path.steps)
                .cloned()
                .unwrap_or(Value::Null);
            keyed.push((key, doc));
        }
        keyed.sort_by(|a, b| {
            let ord = a.0.cmp_with(&b.0, collation);
            match order_by.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });

        let skip = offset.unwrap_or(0) as usize;
        let take = limit.map(|n| n as usize).unwrap_or(usize::MAX);
        let mut values = Vec::new();
        for (_, doc) in keyed.into_iter().skip(skip).take(take) {
            values.push(project(&projection, doc, &params, collation)?);
        }
        return Ok(ResultCursor::from_values(values));
    }

    // Lazy path: skip, cap, project, all on demand
    let mut to_skip = offset.unwrap_or(0);
    let skipped = filtered.filter(move |item| {
        if item.is_err() {
            return true;
        }
        if to_skip > 0 {
            to_skip -= 1;
            false
        } else {
            true
        }
    });
    let capped = skipped.scan(limit, |remaining, item| match *remaining {
        None => Some(item),
        Some(0) => None,
        Some(n) => {
            if item.is_ok() {
                *remaining = Some(n - 1);
            }
            Some(item)
        }
    });
    let projected = capped.map(move |item| {
        item.and_then(|doc| project(&projection, doc, &params, collation))
    });
    Ok(ResultCursor::stream(Box::new(projected)))
}

fn project(
    projection: &Projection,
    doc: Document,
    params: &Document,
    collation: Collation,
) -> Result<Value> {
    match projection {
        Projection::All => Ok(Value::Document(doc)),
        Projection::Count => Err(VellumError::eval("COUNT(*) cannot project rows")),
        Projection::Fields(fields) => {
            let ctx = EvalContext { root: &doc, params, collation };
            let mut out = Document::new();
            for (i, field) in fields.iter().enumerate() {
                let value = eval(&field.expr, &ctx)?;
                out.insert(field.output_name(i), value);
            }
            Ok(Value::Document(out))
        }
    }
}

fn virtual_rows(source: &Source, catalog: &Catalog, info: &SessionInfo) -> Vec<Document> {
    match source {
        Source::Database => {
            let mut doc = Document::new();
            doc.insert("collation", info.collation.name());
            doc.insert("user_version", info.user_version as i64);
            doc.insert("collections", info.collections as i64);
            doc.insert("documents", info.documents as i64);
            doc.insert("pending_records", info.pending_records as i64);
            doc.insert("in_transaction", info.in_transaction);
            doc.insert("opened_at", info.opened_at);
            doc.insert("store_bytes", info.store_len as i64);
            vec![doc]
        }
        Source::Cols => catalog
            .names()
            .filter_map(|name| {
                let collection = catalog.get(name)?;
                let mut doc = Document::new();
                doc.insert("name", name.clone());
                doc.insert("documents", collection.len() as i64);
                doc.insert("next_id", collection.next_id());
                if let Some(stats) = collection.stats() {
                    let mut stats_doc = Document::new();
                    stats_doc.insert("documents", stats.documents as i64);
                    stats_doc.insert("total_bytes", stats.total_bytes as i64);
                    stats_doc.insert("avg_bytes", stats.avg_bytes() as i64);
                    stats_doc.insert("analyzed_at", stats.analyzed_at);
                    doc.insert("stats", Value::Document(stats_doc));
                }
                Some(doc)
            })
            .collect(),
        Source::Indexes => catalog
            .names()
            .map(|name| {
                let mut doc = Document::new();
                doc.insert("collection", name.clone());
                doc.insert("name", "_id");
                doc.insert("expression", "$._id");
                doc.insert("unique", true);
                doc
            })
            .collect(),
        Source::Collection(_) => Vec::new(),
    }
}

fn explain_document(select: &SelectStatement) -> Document {
    let mut plan = Document::new();
    plan.insert("statement", "select");
    plan.insert("source", select.source.name());
    plan.insert("scan", "primary_key_order");
    let projection: Value = match &select.projection {
        Projection::All => Value::String("all".into()),
        Projection::Count => Value::String("count".into()),
        Projection::Fields(fields) => Value::Array(
            fields
                .iter()
                .enumerate()
                .map(|(i, f)| Value::String(f.output_name(i)))
                .collect(),
        ),
    };
    plan.insert("projection", projection);
    plan.insert(
        "filter",
        select
            .filter
            .as_ref()
            .map(|f| Value::String(f.to_string()))
            .unwrap_or(Value::Null),
    );
    let sort = match &select.order {
        Some(order_by) => {
            let mut doc = Document::new();
            doc.insert("path", order_by.path.to_string());
            doc.insert("order", order_by.order.as_str());
            Value::Document(doc)
        }
        None => Value::Null,
    };
    plan.insert("sort", sort);
    plan.insert(
        "limit",
        select.limit.map(|n| Value::Int(n as i64)).unwrap_or(Value::Null),
    );
    plan.insert(
        "offset",
        select.offset.map(|n| Value::Int(n as i64)).unwrap_or(Value::Null),
    );
    let into = match &select.into {
        Some(IntoTarget::Collection(name)) => Value::String(name.clone()),
        Some(IntoTarget::File(path)) => Value::String(format!("$file({path})")),
        None => Value::Null,
    };
    plan.insert("into", into);
    plan
}

fn run_insert<S: StoreFile>(
    session: &mut Session<S>,
    collection: &str,
    documents: &[Expr],
    params: &Document,
) -> Result<i64> {
    validate_collection_name(collection)?;
    let collation = session.collation();
    let empty = Document::new();
    let ctx = EvalContext { root: &empty, params, collation };

    let mut docs = Vec::with_capacity(documents.len());
    for expr in documents {
        match eval(expr, &ctx)? {
            Value::Document(doc) => docs.push(doc),
            other => {
                return Err(VellumError::eval(format!(
                    "INSERT values must be documents, got {}",
                    other.type_name()
                )))
            }
        }
    }

    // Stage against a trial catalog so a duplicate in the middle of
    // the batch leaves the store untouched.
    let mut trial = session.catalog().clone();
    let mut records = Vec::with_capacity(docs.len() + 1);
    if !trial.contains(collection) {
        let record = Record::CreateCollection { name: collection.to_string() };
        trial.apply(&record)?;
        records.push(record);
    }
    for doc in docs {
        let doc = trial.finalize_document(collection, doc)?;
        let record = Record::Insert { collection: collection.to_string(), document: doc };
        trial.apply(&record)?;
        records.push(record);
    }

    let count = records.iter().filter(|r| matches!(r, Record::Insert { .. })).count();
    session.commit_records(records)?;
    Ok(count as i64)
}

fn run_update<S: StoreFile>(
    session: &mut Session<S>,
    collection: &str,
    assignments: &[(Path, Expr)],
    filter: Option<&Expr>,
    params: &Document,
) -> Result<i64> {
    let collation = session.collation();
    let records = {
        let catalog = session.catalog();
        let source = catalog.require(collection)?;
        let mut records = Vec::new();
        for doc in source.iter() {
            if !eval_filter(filter, doc, params, collation)? {
                continue;
            }
            let ctx = EvalContext { root: doc, params, collation };
            let mut updated = doc.clone();
            for (path, expr) in assignments {
                let value = eval(expr, &ctx)?;
                updated.set_steps(&path.steps, value)?;
            }
            match (doc.id(), updated.id()) {
                (Some(before), Some(after)) if before.eq_with(after, collation) => {}
                _ => {
                    return Err(VellumError::eval(
                        "UPDATE may not change the _id of a document",
                    ))
                }
            }
            records.push(Record::Update {
                collection: collection.to_string(),
                document: updated,
            });
        }
        records
    };
    let count = records.len() as i64;
    session.commit_records(records)?;
    Ok(count)
}

fn run_delete<S: StoreFile>(
    session: &mut Session<S>,
    collection: &str,
    filter: Option<&Expr>,
    params: &Document,
) -> Result<i64> {
    let collation = session.collation();
    let records = {
        let catalog = session.catalog();
        let source = catalog.require(collection)?;
        let mut records = Vec::new();
        for doc in source.iter() {
            if !eval_filter(filter, doc, params, collation)? {
                continue;
            }
            let id = doc
                .id()
                .cloned()
                .ok_or_else(|| VellumError::InvalidId("missing".to_string()))?;
            records.push(Record::Delete { collection: collection.to_string(), id });
        }
        records
    };
    let count = records.len() as i64;
    session.commit_records(records)?;
    Ok(count)
}

/// SELECT ... INTO: materialize the result set, then write it to a new
/// collection or out to a JSON file.
fn run_select_into<S: StoreFile>(
    session: &mut Session<S>,
    mut select: SelectStatement,
    params: &Document,
) -> Result<i64> {
    let target = match select.into.take() {
        Some(target) => target,
        None => return Err(VellumError::eval("SELECT INTO without a target")),
    };
    if let IntoTarget::Collection(name) = &target {
        validate_collection_name(name)?;
        if session.catalog().contains(name) {
            return Err(VellumError::CollectionExists(name.clone()));
        }
    }

    let docs = {
        let info = session.info();
        let cursor = select_stream(session.catalog(), &info, select, params)?;
        let mut docs = Vec::new();
        for value in cursor {
            match value? {
                Value::Document(doc) => docs.push(doc),
                other => {
                    return Err(VellumError::eval(format!(
                        "INTO expects document rows, got {}",
                        other.type_name()
                    )))
                }
            }
        }
        docs
    };

    match target {
        IntoTarget::File(path) => {
            let text = json::documents_to_json_pretty(&docs)?;
            std::fs::write(&path, text)?;
            Ok(docs.len() as i64)
        }
        IntoTarget::Collection(name) => {
            let mut trial = session.catalog().clone();
            let mut records = Vec::with_capacity(docs.len() + 1);
            let create = Record::CreateCollection { name: name.clone() };
            trial.apply(&create)?;
            records.push(create);
            let count = docs.len() as i64;
            for doc in docs {
                let doc = trial.finalize_document(&name, doc)?;
                let record = Record::Insert { collection: name.clone(), document: doc };
                trial.apply(&record)?;
                records.push(record);
            }
            session.commit_records(records)?;
            Ok(count)
        }
    }
}

fn parse_rebuild_options(
    options: Option<&Expr>,
    params: &Document,
) -> Result<crate::session::RebuildOptions> {
    let mut parsed = crate::session::RebuildOptions::default();
    let expr = match options {
        None => return Ok(parsed),
        Some(expr) => expr,
    };
    let empty = Document::new();
    let ctx = EvalContext { root: &empty, params, collation: Collation::Binary };
    let doc = match eval(expr, &ctx)? {
        Value::Document(doc) => doc,
        other => {
            return Err(VellumError::eval(format!(
                "REBUILD options must be a document, got {}",
                other.type_name()
            )))
        }
    };
    for (key, value) in doc.iter() {
        match key.as_str() {
            "collation" => {
                let name = value.as_str().ok_or_else(|| {
                    VellumError::eval("collation option must be a string")
                })?;
                let collation = Collation::from_name(name).ok_or_else(|| {
                    VellumError::eval(format!("unknown collation '{name}'"))
                })?;
                parsed.collation = Some(collation);
            }
            other => {
                return Err(VellumError::eval(format!(
                    "unknown REBUILD option '{other}'"
                )))
            }
        }
    }
    Ok(parsed)
}
