use std::{io::IsTerminal, path::Path};

use clap::Parser;
use kdam::{BarExt, tqdm};
use pdfsift::{
    ConfigDb,
    DataDir,
    GroupedResults,
    IndexReport,
    Library,
    Marker,
    Tunables,
    config_db::keys,
    error::{self, Error},
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command, ConfigAction, RootAction, SearchArgs};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("PDFSIFT_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let config_db = ConfigDb::open(&data_dir.config_db())?;
    let show_progress = !cli.quiet && std::io::stderr().is_terminal();

    match cli.command {
        Command::Root { action } => match action {
            RootAction::Add { path, name } => {
                root_add(&config_db, &path, name.as_deref())?;
            }
            RootAction::Remove { name } => {
                root_remove(&config_db, &name)?;
            }
            RootAction::List { json } => {
                root_list(&config_db, json)?;
            }
        },
        Command::Config { action } => match action {
            ConfigAction::Set { key, value } => {
                config_db.set_tunable(&key, &value)?;
                println!("Set {key} = {}", value.trim());
            }
            ConfigAction::Get { key } => {
                config_get(&config_db, &key)?;
            }
            ConfigAction::Show { json } => {
                config_show(&config_db, json)?;
            }
        },
        Command::Index => {
            let mut library = open_library(&config_db, &data_dir, false)?;
            run_index(&mut library, show_progress)?;
        }
        Command::Search(args) => {
            cmd_search(&config_db, &data_dir, &args, show_progress)?;
        }
        Command::Status(args) => {
            cmd_status(&config_db, &data_dir, args.json)?;
        }
        Command::Clear => {
            cmd_clear(&config_db, &data_dir)?;
        }
        Command::Completions(_) => {}
    }

    Ok(())
}

fn root_add(
    config_db: &ConfigDb,
    path: &Path,
    name: Option<&str>,
) -> error::Result<()> {
    if !path.is_dir() {
        return Err(Error::Config(format!(
            "not a directory: {}",
            path.display()
        )));
    }

    let abs_path = path.canonicalize().map_err(|e| {
        Error::Config(format!("cannot resolve path {}: {e}", path.display()))
    })?;

    let name = match name {
        Some(name) => name.to_string(),
        None => abs_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Error::Config(format!(
                    "cannot derive a name from {}, pass --name",
                    abs_path.display()
                ))
            })?,
    };

    if config_db.get_root(&name)?.is_some() {
        return Err(Error::Config(format!("root '{name}' already exists")));
    }

    config_db.set_root(&name, &abs_path.to_string_lossy())?;
    println!("Added root '{name}' -> {}", abs_path.display());
    Ok(())
}

fn root_remove(config_db: &ConfigDb, name: &str) -> error::Result<()> {
    if !config_db.remove_root(name)? {
        return Err(Error::NotFound {
            kind: "root",
            name: name.to_string(),
        });
    }
    println!("Removed root '{name}'");
    Ok(())
}

fn root_list(config_db: &ConfigDb, json: bool) -> error::Result<()> {
    let roots = config_db.list_roots()?;

    if json {
        let entries: Vec<_> = roots
            .iter()
            .map(|(name, path)| serde_json::json!({ "name": name, "path": path }))
            .collect();
        println!("{}", serde_json::to_string(&entries)?);
    } else if roots.is_empty() {
        println!("No roots registered.");
    } else {
        for (name, path) in &roots {
            println!("{name}\t{path}");
        }
    }
    Ok(())
}

fn config_get(config_db: &ConfigDb, key: &str) -> error::Result<()> {
    let tunables = Tunables::load(config_db)?;
    let value = tunables.value(key).ok_or_else(|| Error::NotFound {
        kind: "setting",
        name: key.to_string(),
    })?;
    println!("{value}");
    Ok(())
}

fn config_show(config_db: &ConfigDb, json: bool) -> error::Result<()> {
    let tunables = Tunables::load(config_db)?;
    let values = keys::ALL
        .iter()
        .filter_map(|key| Some((*key, tunables.value(key)?)));

    if json {
        let map: serde_json::Map<_, _> = values
            .map(|(key, value)| (key.to_string(), value.into()))
            .collect();
        println!("{}", serde_json::Value::Object(map));
    } else {
        for (key, value) in values {
            println!("{key}\t{value}");
        }
    }
    Ok(())
}

fn open_library(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    highlight_for_terminal: bool,
) -> error::Result<Library> {
    let roots = config_db.root_paths()?;
    if roots.is_empty() {
        warn!("no roots registered, add one with `pdfsift root add <dir>`");
    }
    let tunables = Tunables::load(config_db)?;

    let marker = if highlight_for_terminal && std::io::stdout().is_terminal()
    {
        Marker::ANSI
    } else {
        Marker::HTML
    };
    Ok(Library::open(data_dir, &roots, tunables)?.with_marker(marker))
}

fn run_index(
    library: &mut Library,
    show_progress: bool,
) -> error::Result<IndexReport> {
    let pending = library.pending().len();
    if pending == 0 {
        return library.index(|_| {});
    }

    let report = if show_progress {
        let mut pb = tqdm!(total = pending, desc = "Extracting");
        let report = library.index(|p| {
            let _ = pb.update_to(p.processed);
        })?;
        eprintln!();
        report
    } else {
        library.index(|_| {})?
    };

    for failure in &report.failed {
        eprintln!("  failed: {}: {}", failure.filename, failure.error);
    }
    eprintln!(
        "Indexed {} of {} documents",
        report.extracted.len(),
        report.pending
    );
    Ok(report)
}

fn cmd_search(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    args: &SearchArgs,
    show_progress: bool,
) -> error::Result<()> {
    let mut library = open_library(config_db, data_dir, !args.json)?;
    if !args.no_index
        && let Err(e) = run_index(&mut library, show_progress)
    {
        // New extractions are still in memory; answer from them.
        warn!(error = %e, "could not save the extraction cache");
    }

    let mut grouped = library.search_grouped(&args.keyword);
    if let Some(filter) = &args.filter {
        grouped = grouped.filter_by_name(filter);
    }

    if args.json {
        let output = serde_json::json!({
            "keyword": args.keyword.trim(),
            "files": grouped.file_count(),
            "matches": grouped.match_count(),
            "groups": grouped.groups,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if args.files {
        format_files(&grouped);
    } else if let Some(page) = args.page {
        format_linear(&grouped, page, args.per_page);
    } else {
        format_grouped(&grouped, &args.keyword);
    }
    Ok(())
}

fn format_files(grouped: &GroupedResults) {
    for group in &grouped.groups {
        match group.matches.first().and_then(|m| m.resolved_path.as_ref()) {
            Some(path) => println!("{}", path.display()),
            None => println!("{}", group.file),
        }
    }
}

fn format_grouped(grouped: &GroupedResults, keyword: &str) {
    if grouped.is_empty() {
        println!("No matches for '{}'", keyword.trim());
        return;
    }

    for group in &grouped.groups {
        println!("{} ({} matches)", group.file, group.len());
        for m in &group.matches {
            println!("  p.{}: {}", m.page_number, m.context);
        }
        println!();
    }
    println!(
        "{} matches in {} files",
        grouped.match_count(),
        grouped.file_count()
    );
}

fn format_linear(grouped: &GroupedResults, page: usize, per_page: usize) {
    let pages = grouped.page_count(per_page);
    let records = grouped.page(page, per_page);
    if records.is_empty() {
        println!("Page {page} is empty ({pages} pages)");
        return;
    }

    for m in &records {
        println!("{} p.{}: {}", m.file, m.page_number, m.context);
    }
    println!(
        "\nPage {page} of {pages} ({} matches in {} files)",
        grouped.match_count(),
        grouped.file_count()
    );
}

fn cmd_status(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    json: bool,
) -> error::Result<()> {
    let library = open_library(config_db, data_dir, false)?;
    let stats = library.stats();

    if json {
        let mut value = serde_json::to_value(&stats)?;
        value["data_dir"] = data_dir.root().display().to_string().into();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Data directory: {}", data_dir.root().display());
    println!("Roots: {}", stats.roots.len());
    for root in &stats.roots {
        match root.pdf_count {
            Some(n) => println!("  {}: {n} PDF files", root.path.display()),
            None => println!("  {}: unavailable", root.path.display()),
        }
    }
    println!("Located files: {}", stats.located_files);
    println!("Cached documents: {}", stats.cached_documents);
    println!("Cached pages: {}", stats.total_pages);
    println!("Pending: {}", stats.pending);
    println!("Extract workers: {}", stats.extract_workers);
    match stats.indexed_at {
        Some(ts) => println!("Last indexed: {ts} (unix time)"),
        None => println!("Last indexed: never"),
    }
    println!(
        "Prefilter: {}",
        if stats.prefilter_available {
            "available"
        } else {
            "missing"
        }
    );
    Ok(())
}

fn cmd_clear(config_db: &ConfigDb, data_dir: &DataDir) -> error::Result<()> {
    let mut library = open_library(config_db, data_dir, false)?;
    let cached = library.cache().len();
    library.clear()?;
    println!("Cleared {cached} cached documents and the search prefilter.");
    Ok(())
}
