use std::io::{self, BufRead, Write as _};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use vellum_core::document::json;
use vellum_core::{Collation, Document, RebuildOptions, ResultCursor, Session, Value};

const SHELL_MAX_ROWS: u64 = 100;

#[derive(Parser, Debug)]
#[command(name = "vellum", version, about = "Vellum CLI - Document Store Studio")]
struct Cli {
	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Show store header and catalog summary
	Info {
		/// Path to store file
		store: PathBuf,
	},
	/// List collections with document counts
	Collections {
		store: PathBuf,
	},
	/// Run a single statement (creates the store if missing)
	Query {
		store: PathBuf,
		/// Statement text, e.g. "SELECT $ FROM users WHERE age > 30"
		sql: String,
		/// Maximum rows to print
		#[arg(long, default_value = "100")]
		max: u64,
		/// Bind a parameter, e.g. --param min=30 (repeatable)
		#[arg(long = "param", value_name = "NAME=VALUE")]
		params: Vec<String>,
	},
	/// Interactive shell; statements end with ';'
	Shell {
		store: PathBuf,
	},
	/// Export a collection as pretty JSON
	Export {
		store: PathBuf,
		collection: String,
		/// Output file
		out: PathBuf,
	},
	/// Import documents from a JSON file
	Import {
		store: PathBuf,
		collection: String,
		/// JSON file holding an array of objects or a single object
		file: PathBuf,
	},
	/// Rewrite the store compacted, dropping dead journal entries
	Rebuild {
		store: PathBuf,
		/// Re-key the store under a different collation
		#[arg(long, value_parser = ["binary", "nocase"])]
		collation: Option<String>,
	},
}

fn main() -> Result<()> {
	// Initialize tracing
	tracing_subscriber::fmt::init();

	let cli = Cli::parse();
	match cli.command {
		Commands::Info { store } => info(&store),
		Commands::Collections { store } => collections(&store),
		Commands::Query { store, sql, max, params } => query(&store, &sql, max, &params),
		Commands::Shell { store } => shell(&store),
		Commands::Export { store, collection, out } => export(&store, &collection, &out),
		Commands::Import { store, collection, file } => import(&store, &collection, &file),
		Commands::Rebuild { store, collation } => rebuild(&store, collation.as_deref()),
	}
}

/// Open a store that has to exist already. Read-only commands should
/// not silently create empty files.
fn open_existing(path: &Path) -> Result<Session<std::fs::File>> {
	anyhow::ensure!(path.exists(), "no store at {}", path.display());
	Session::open_file(path).with_context(|| format!("failed to open {}", path.display()))
}

fn info(path: &Path) -> Result<()> {
	let session = open_existing(path)?;
	let info = session.info();
	println!("📦 Store: {}", path.display());
	println!("   Collation: {}", info.collation);
	println!("   User version: {}", info.user_version);
	println!("   Collections: {}", info.collections);
	println!("   Documents: {}", info.documents);
	println!("   File size: {} bytes", info.store_len);
	Ok(())
}

fn collections(path: &Path) -> Result<()> {
	let session = open_existing(path)?;
	if session.catalog().is_empty() {
		println!("(empty store)");
		return Ok(());
	}
	for (name, collection) in session.catalog().iter() {
		println!("{name}\t{} document(s)", collection.len());
	}
	Ok(())
}

fn query(path: &Path, sql: &str, max: u64, raw_params: &[String]) -> Result<()> {
	let params = parse_params(raw_params)?;
	let mut session = Session::open_file(path)
		.with_context(|| format!("failed to open {}", path.display()))?;
	{
		let cursor = session.execute_with(sql, &params)?;
		print_rows(cursor, max)?;
	}
	if session.has_unsaved_changes() {
		let bytes = session.checkpoint()?;
		eprintln!("💾 Saved {bytes} bytes");
	}
	Ok(())
}

fn shell(path: &Path) -> Result<()> {
	let mut session = Session::open_file(path)
		.with_context(|| format!("failed to open {}", path.display()))?;
	let interactive = atty::is(atty::Stream::Stdin);
	if interactive {
		println!("Vellum shell - {}", path.display());
		println!("End statements with ';'. Type .help for commands, .exit to leave.");
	}

	let stdin = io::stdin();
	let mut buffer = String::new();
	loop {
		if interactive {
			if buffer.is_empty() {
				print!("vellum> ");
			} else {
				print!("   ...> ");
			}
			io::stdout().flush()?;
		}
		let mut line = String::new();
		if stdin.lock().read_line(&mut line)? == 0 {
			break; // EOF
		}
		let trimmed = line.trim();
		if buffer.is_empty() && trimmed.starts_with('.') {
			if !dot_command(trimmed, &mut session)? {
				break;
			}
			continue;
		}
		if buffer.is_empty() && trimmed.is_empty() {
			continue;
		}
		buffer.push_str(&line);
		if buffer.trim_end().ends_with(';') {
			let sql = std::mem::take(&mut buffer);
			match session.execute(&sql) {
				Ok(cursor) => {
					if let Err(e) = print_rows(cursor, SHELL_MAX_ROWS) {
						eprintln!("❌ {e}");
					}
				}
				Err(e) => eprintln!("❌ {e}"),
			}
		}
	}

	if session.in_transaction() {
		eprintln!("⚠️  Open transaction discarded");
	}
	let bytes = session.checkpoint()?;
	if interactive && bytes > 0 {
		println!("💾 Saved {bytes} bytes");
	}
	Ok(())
}

/// Shell dot commands. Returns false when the shell should exit.
fn dot_command(line: &str, session: &mut Session<std::fs::File>) -> Result<bool> {
	match line {
		".exit" | ".quit" => return Ok(false),
		".help" => {
			println!("  .tables        list collections");
			println!("  .info          store summary");
			println!("  .save          checkpoint now");
			println!("  .exit          save and leave");
		}
		".tables" => {
			for name in session.collection_names() {
				println!("  {name}");
			}
		}
		".info" => {
			let info = session.info();
			println!("  collation {}, user version {}", info.collation, info.user_version);
			println!(
				"  {} collection(s), {} document(s), {} pending record(s)",
				info.collections, info.documents, info.pending_records
			);
		}
		".save" => {
			let bytes = session.checkpoint()?;
			println!("💾 Saved {bytes} bytes");
		}
		other => eprintln!("❌ Unknown command '{other}' (try .help)"),
	}
	Ok(true)
}

fn export(path: &Path, collection: &str, out: &Path) -> Result<()> {
	let session = open_existing(path)?;
	let bytes = session.export_collection(collection)?;
	let count = session.catalog().require(collection)?.len();
	std::fs::write(out, &bytes)
		.with_context(|| format!("failed to write {}", out.display()))?;
	println!("✅ Exported {count} document(s) to {}", out.display());
	Ok(())
}

fn import(path: &Path, collection: &str, file: &Path) -> Result<()> {
	let bytes = std::fs::read(file)
		.with_context(|| format!("failed to read {}", file.display()))?;
	let docs = json::parse_documents(&bytes)?;
	anyhow::ensure!(!docs.is_empty(), "{} holds no documents", file.display());

	let mut session = Session::open_file(path)
		.with_context(|| format!("failed to open {}", path.display()))?;

	let bar = ProgressBar::new(docs.len() as u64);
	bar.set_style(ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")?);
	let insert = format!("INSERT INTO {collection} VALUES @doc");
	let mut count = 0u64;
	for doc in docs {
		let mut params = Document::new();
		params.insert("doc", Value::Document(doc));
		session.execute_with(&insert, &params)?;
		count += 1;
		bar.inc(1);
	}
	bar.finish_and_clear();

	let saved = session.checkpoint()?;
	println!("✅ Imported {count} document(s) into '{collection}' ({saved} bytes written)");
	Ok(())
}

fn rebuild(path: &Path, collation: Option<&str>) -> Result<()> {
	let mut session = open_existing(path)?;
	let options = RebuildOptions {
		collation: match collation {
			None => None,
			Some("binary") => Some(Collation::Binary),
			Some("nocase") => Some(Collation::NoCase),
			Some(_) => unreachable!(),
		},
	};

	let spinner = ProgressBar::new_spinner();
	spinner.set_message("rewriting store...");
	let delta = session.rebuild(options)?;
	spinner.finish_and_clear();

	let info = session.info();
	if delta >= 0 {
		println!("✅ Rebuilt: reclaimed {delta} bytes ({} bytes on disk)", info.store_len);
	} else {
		println!("✅ Rebuilt: grew by {} bytes ({} bytes on disk)", -delta, info.store_len);
	}
	Ok(())
}

fn print_rows(mut cursor: ResultCursor<'_>, max: u64) -> Result<()> {
	let mut rows = 0u64;
	while let Some(value) = cursor.try_next()? {
		println!("{value}");
		rows += 1;
		if rows == max {
			eprintln!("... stopped after {max} rows (add a LIMIT to narrow the scan)");
			return Ok(());
		}
	}
	if rows == 0 {
		eprintln!("(no rows)");
	}
	Ok(())
}

fn parse_params(specs: &[String]) -> Result<Document> {
	let mut params = Document::new();
	for spec in specs {
		let (name, raw) = spec
			.split_once('=')
			.with_context(|| format!("--param '{spec}' is not NAME=VALUE"))?;
		params.insert(name, literal_value(raw));
	}
	Ok(params)
}

/// Best-effort literal: null, booleans and numbers bind typed, the
/// rest binds as a string.
fn literal_value(raw: &str) -> Value {
	if raw.eq_ignore_ascii_case("null") {
		return Value::Null;
	}
	if raw.eq_ignore_ascii_case("true") {
		return Value::Bool(true);
	}
	if raw.eq_ignore_ascii_case("false") {
		return Value::Bool(false);
	}
	if let Ok(n) = raw.parse::<i64>() {
		return Value::Int(n);
	}
	if let Ok(f) = raw.parse::<f64>() {
		return Value::Double(f);
	}
	Value::String(raw.to_string())
}
