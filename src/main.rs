//! Entry point for the nmdep dependency analyzer.
//!
//! Simple flow: parse args → scan listings → build link sets → prune →
//! reports and/or linker script.

use anyhow::{bail, Context, Result};
use clap::Parser;
use memmap2::Mmap;
use std::fs::File;
use std::io::{self, Read, Write};
use tracing_subscriber::EnvFilter;

use nmdep::config::Config;
use nmdep::graph::{Database, SetName};
use nmdep::interactive;
use nmdep::link;
use nmdep::report;
use nmdep::scan::Scanner;

fn main() -> Result<()> {
    let config = Config::parse();

    // Initialize logging; RUST_LOG overrides the -l/-u flags
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_directives()))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let mut log: Box<dyn Write> = match &config.log_file {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("opening log file {}", path.display()))?,
        ),
        None => Box::new(io::stdout()),
    };

    let mut db = Database::new();
    let scanner = Scanner::new(config.lenient);

    // The first listing (or stdin) contains the application's mandatory
    // objects; the watermark separates them from the optional remainder.
    let mut watermark = None;
    if config.listings.is_empty() {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("reading standard input")?;
        scanner.scan_listing(&mut db, &text, "<stdin>")?;
        watermark = db.last_object();
    } else {
        for (i, path) in config.listings.iter().enumerate() {
            let file =
                File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
            let mmap = unsafe { Mmap::map(&file)? };
            let text = std::str::from_utf8(&mmap)
                .with_context(|| format!("{} is not valid UTF-8", path.display()))?;
            scanner.scan_listing(&mut db, text, &path.to_string_lossy())?;
            if i == 0 {
                watermark = db.last_object();
            }
        }
    }

    db.finish_ingest();

    report::list_undefined(&db, &mut log)?;

    let errors = db.check_back_pointers();
    if errors != 0 {
        bail!("database corrupted: {errors} bad cross-reference back-pointers");
    }

    match &config.entry_symbol {
        Some(entry) => link::seed_with_entry(&mut db, entry, config.warn_undefined)?,
        None => link::seed_and_link(&mut db, watermark, config.warn_undefined),
    }

    if config.quiet {
        writeln!(log, "OK, that's it for now")?;
        return Ok(());
    }

    if config.show_syms {
        report::dump_syms(&db, &mut log)?;
    }
    if config.show_deps {
        report::dump_deps(&db, &mut log)?;
    }

    writeln!(log, "Removing undefined symbols")?;
    link::prune_undefs(&mut db);

    if let Some(path) = &config.removal_list {
        let list = std::fs::read_to_string(path)
            .with_context(|| format!("opening removal list {}", path.display()))?;
        link::remove_objects(&mut db, &mut log, &list, &path.to_string_lossy())?;
    }

    if config.multiple_defs {
        report::check_multiple_defs(&db, SetName::Application, &mut log)?;
        report::check_multiple_defs(&db, SetName::Optional, &mut log)?;
    }

    if config.interactive {
        let stdin = io::stdin();
        interactive::query_loop(&db, &mut stdin.lock(), &mut io::stderr())?;
    }

    let errors = db.check_back_pointers();
    if errors != 0 {
        bail!("database corrupted: {errors} bad cross-reference back-pointers");
    }

    if let Some(path) = &config.script {
        write!(log, "Writing linker script to '{}'...", path.display())?;
        log.flush()?;
        let mut script = File::create(path)
            .with_context(|| format!("opening script file {}", path.display()))?;
        report::write_script(&db, &mut script, false)?;
        writeln!(log, "done.")?;
    }

    Ok(())
}
