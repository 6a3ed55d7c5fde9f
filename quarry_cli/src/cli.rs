use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "quarry")]
#[command(about = "Quarry - search local folders for file names and text")]
#[command(version)]
#[command(after_help = "\x1b[1;36mQuick Start:\x1b[0m
  quarry files .                          List every file below the current folder
  quarry files src --pattern '*.rs'       Find files by name
  quarry grep TODO src tests              Search file contents
  quarry grep 'fn \\w+' . --regex -C 2    Regex search with two lines of context

\x1b[1;36mConfiguration:\x1b[0m
  quarry config path                      Show where the config file lives
  quarry config init                      Write a config file with the defaults
  quarry config show                      Print the effective configuration")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Pretty)]
    pub output: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Verbose output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path of the config file
    #[arg(long, global = true, env = "QUARRY_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Find files by name
    ///
    /// Walks every root and prints the files that pass the filters. Without
    /// --pattern every file is listed.
    #[command(alias = "f")]
    #[command(after_help = "\x1b[1;33mExamples:\x1b[0m
  quarry files . --pattern '*.toml'
  quarry files src tests --pattern mod -n 20
  quarry files . --exclude target --output json")]
    Files(FilesArgs),

    /// Search file contents
    ///
    /// Matches stream to the terminal as they are found; the summary is
    /// printed once every root has been searched.
    #[command(alias = "g")]
    #[command(after_help = "\x1b[1;33mExamples:\x1b[0m
  quarry grep needle .
  quarry grep 'impl\\s+Drop' src --regex
  quarry grep Result src --word --case-sensitive -C 1")]
    Grep(GrepArgs),

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args, Debug, Clone)]
pub struct FilesArgs {
    /// Folders (paths or file: URIs) to search
    #[arg(default_value = ".")]
    pub roots: Vec<String>,

    /// File name pattern: a glob when it contains * ? or [, otherwise a
    /// case-insensitive substring
    #[arg(short, long)]
    pub pattern: Option<String>,

    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Args, Debug, Clone)]
pub struct GrepArgs {
    /// Text to search for
    pub pattern: String,

    /// Folders (paths or file: URIs) to search
    #[arg(default_value = ".")]
    pub roots: Vec<String>,

    /// Treat the pattern as a regular expression
    #[arg(short = 'e', long)]
    pub regex: bool,

    /// Match case exactly
    #[arg(short = 's', long)]
    pub case_sensitive: bool,

    /// Only match whole words
    #[arg(short, long)]
    pub word: bool,

    /// Lines of context before and after each match
    #[arg(short = 'C', long, conflicts_with_all = ["before", "after"])]
    pub context: Option<usize>,

    /// Lines of context before each match
    #[arg(short = 'B', long, default_value_t = 0)]
    pub before: usize,

    /// Lines of context after each match
    #[arg(short = 'A', long, default_value_t = 0)]
    pub after: usize,

    #[command(flatten)]
    pub filter: FilterArgs,
}

impl GrepArgs {
    /// Context as (before, after).
    pub fn context_lines(&self) -> (usize, usize) {
        match self.context {
            Some(lines) => (lines, lines),
            None => (self.before, self.after),
        }
    }
}

/// Filters shared by `files` and `grep`.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Stop after this many results
    #[arg(short = 'n', long)]
    pub max_results: Option<usize>,

    /// Only search paths matching this glob (repeatable)
    #[arg(long = "include", value_name = "GLOB")]
    pub include: Vec<String>,

    /// Skip paths matching this glob (repeatable)
    #[arg(long = "exclude", value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Also search inside .git directories
    #[arg(long)]
    pub no_default_excludes: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Print the config file location
    Path,
    /// Write a config file with the default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable formatted output
    Pretty,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
}
