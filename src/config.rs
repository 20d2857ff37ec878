//! Command-line configuration.
//!
//! The option surface mirrors the classic single-letter `nm`/`ld` style
//! tools this one sits next to in a build: a handful of short flags plus
//! optional output files. Logging verbosity for the link and unlink
//! phases is mapped onto `tracing` filter directives so that `RUST_LOG`
//! can always override it.

use clap::Parser;
use std::path::PathBuf;

/// Object file dependency analyzer.
///
/// Builds a database of object files and symbols from symbol listings
/// produced by `nm -g -fposix`, partitions the objects into the
/// Application and Optional link sets, prunes objects whose imports
/// cannot be resolved, and emits reports or a linker script.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Config {
    /// Symbol listings produced by `nm -g -fposix`. The first listing
    /// names the application's mandatory objects; objects from later
    /// listings are optional unless a mandatory object depends on them.
    /// Standard input is scanned when no listing is given.
    pub listings: Vec<PathBuf>,

    /// On success, generate a linker script with EXTERN statements.
    #[arg(short = 'e', value_name = "FILE")]
    pub script: Option<PathBuf>,

    /// Un-link the objects named in FILE (one per line, `lib[member]`
    /// qualification allowed) from the Optional link set.
    #[arg(short = 'r', value_name = "FILE")]
    pub removal_list: Option<PathBuf>,

    /// Seed the Application link set from SYMBOL's definition site
    /// instead of the first listing.
    #[arg(short = 'A', value_name = "SYMBOL")]
    pub entry_symbol: Option<String>,

    /// Write the log and reports to FILE instead of stdout.
    #[arg(short = 'o', value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Be less paranoid when scanning: map lowercase type codes to
    /// upper case and treat unrecognized types ('?') as undefined.
    #[arg(short = 'f')]
    pub lenient: bool,

    /// Check for symbols defined in multiple objects.
    #[arg(short = 'm')]
    pub multiple_defs: bool,

    /// Enter the interactive query loop.
    #[arg(short = 'i')]
    pub interactive: bool,

    /// Show the flat dependency list of every object (a lot of output).
    #[arg(short = 'd')]
    pub show_deps: bool,

    /// Show the full trace report of every symbol (a lot of output).
    #[arg(short = 's')]
    pub show_syms: bool,

    /// Log the linking process.
    #[arg(short = 'l')]
    pub log_link: bool,

    /// Log the unlinking process.
    #[arg(short = 'u')]
    pub log_unlink: bool,

    /// Quiet: just build the database and run the basic checks.
    #[arg(short = 'q')]
    pub quiet: bool,

    /// Warn about symbols that remain undefined while linking.
    #[arg(long)]
    pub warn_undefined: bool,
}

impl Config {
    /// Filter directives used when `RUST_LOG` is not set.
    pub fn log_directives(&self) -> String {
        let mut directives = String::from("warn");
        if self.log_link {
            directives.push_str(",nmdep::link=debug");
        }
        if self.log_unlink {
            directives.push_str(",nmdep::unlink=debug");
        }
        directives
    }
}
