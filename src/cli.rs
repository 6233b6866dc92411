use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use pdfsift::aggregate::DEFAULT_RESULTS_PER_PAGE;

#[derive(Debug, Parser)]
#[command(
    name = "pdfsift",
    about = "Keyword search across the pages of your PDF library"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage the directories scanned for PDF files
    Root {
        #[command(subcommand)]
        action: RootAction,
    },
    /// Read or change extraction and search settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Extract text from new and modified PDF files
    Index,
    /// Search every cached page for a keyword
    Search(SearchArgs),
    /// Show cache and root statistics
    Status(StatusArgs),
    /// Delete the extraction cache and the search prefilter
    Clear,
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Root subcommands --

#[derive(Debug, Subcommand)]
pub enum RootAction {
    /// Register a directory of PDF files under a name
    Add {
        /// Path to the directory
        path: PathBuf,
        /// Name for the root (defaults to the directory name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Stop scanning a root; cached text is kept
    Remove {
        /// Name of the root to remove
        name: String,
    },
    /// List all registered roots
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

// -- Config subcommands --

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Persist a setting
    Set {
        /// One of context_chars, extract_workers, page_workers,
        /// parallel_page_threshold
        key: String,
        /// Positive integer
        value: String,
    },
    /// Print the effective value of a setting
    Get { key: String },
    /// Print every effective setting
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// Keyword or phrase, matched ignoring case
    pub keyword: String,

    /// Output results as JSON
    #[arg(long, conflicts_with_all = ["files", "page"])]
    pub json: bool,

    /// Output only the paths of matching files
    #[arg(long)]
    pub files: bool,

    /// Only keep files whose name contains this text
    #[arg(long)]
    pub filter: Option<String>,

    /// Show one page of a flat listing instead of grouping by file
    #[arg(long)]
    pub page: Option<usize>,

    /// Results per page of the flat listing
    #[arg(long, default_value_t = DEFAULT_RESULTS_PER_PAGE)]
    pub per_page: usize,

    /// Skip indexing new and modified files before searching
    #[arg(long)]
    pub no_index: bool,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "pdfsift",
            &mut std::io::stdout(),
        );
    }
}
