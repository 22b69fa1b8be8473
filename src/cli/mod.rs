//! CLI argument parsing
//!
//! Defines command-line interface using clap. A test binary parses [`Args`] and
//! hands them to [`run`] together with its test library.

mod commands;

pub use commands::{build_sinks, resolve, run, Resolved};

use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand};

/// Select, run and report tests from a compiled test library
#[derive(Parser, Debug)]
#[command(name = "unitrun")]
#[command(version)]
#[command(about = "Run a test library and report results to the console, JUnit, TeamCity or JSON")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file (default: first of unitrun.yaml, .unitrun.yaml, ~/.config/unitrun/config.yaml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the selected tests
    Run(RunArgs),

    /// Print the names of the selected runs without executing them
    List(SelectionArgs),
}

/// Which tests and parameters to run
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Test names (all tests if none are given)
    pub tests: Vec<String>,

    /// Select tests whose names match this regex from the start
    #[arg(short, long, value_name = "RE")]
    pub regex: Option<String>,

    /// Run everything except the selected tests
    #[arg(short = 'x', long)]
    pub exclude: bool,

    /// Parameter file (JSON or YAML) or inline JSON
    #[arg(short, long, value_name = "STR")]
    pub params: Option<String>,

    /// Named selection from the configuration file
    #[arg(long, value_name = "NAME")]
    pub profile: Option<String>,
}

/// Arguments for the run command
#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Print the selected runs and exit
    #[arg(short, long)]
    pub list: bool,

    /// Worker threads (0 or 1 runs sequentially)
    #[arg(short, long, value_name = "INT")]
    pub jobs: Option<usize>,

    /// Capture output printed by test bodies
    #[arg(short, long)]
    pub capture: bool,

    #[command(flatten)]
    pub output: OutputArgs,

    #[command(flatten)]
    pub reporters: ReporterArgs,
}

/// Console output options
#[derive(ClapArgs, Debug, Clone)]
pub struct OutputArgs {
    /// No console report
    #[arg(short, long)]
    pub quiet: bool,

    /// Show failures
    #[arg(short, long)]
    pub failure: bool,

    /// Show successes
    #[arg(short, long)]
    pub success: bool,

    /// Show exceptions
    #[arg(short, long)]
    pub exception: bool,

    /// Show timings and durations
    #[arg(short, long)]
    pub timing: bool,

    /// Show skipped tests
    #[arg(short = 'k', long)]
    pub skip: bool,

    /// Omit separator lines
    #[arg(short, long)]
    pub brief: bool,

    /// Color policy: auto, always or never
    #[arg(long, value_name = "WHEN")]
    pub color: Option<String>,

    /// Same as --color never
    #[arg(short, long)]
    pub no_color: bool,

    /// Console destination: stdout, stderr or a file path
    #[arg(short, long, value_name = "PATH", default_value = "stdout")]
    pub out: String,

    /// Console file open mode (w or a)
    #[arg(long, value_name = "MODE", default_value = "w")]
    pub out_mode: String,
}

/// Additional report sinks
#[derive(ClapArgs, Debug, Clone)]
pub struct ReporterArgs {
    /// JUnit XML file path
    #[arg(long, value_name = "PATH")]
    pub xml: Option<String>,

    /// JUnit open mode: a merges into an existing document, w replaces it
    #[arg(long, value_name = "MODE", default_value = "a")]
    pub xml_mode: String,

    /// Suite name for JUnit and TeamCity
    #[arg(long, value_name = "NAME")]
    pub suite: Option<String>,

    /// TeamCity service message file path
    #[arg(long, value_name = "PATH")]
    pub teamcity: Option<String>,

    /// JSON file path
    #[arg(long, value_name = "PATH")]
    pub json: Option<String>,

    /// JSON indentation (compact if unset)
    #[arg(long, value_name = "INT")]
    pub json_indent: Option<usize>,
}

impl OutputArgs {
    /// Event flags given on the command line, if any
    pub fn event_flags(&self) -> Option<[bool; 5]> {
        let flags = [self.failure, self.success, self.exception, self.timing, self.skip];
        flags.iter().any(|f| *f).then_some(flags)
    }
}
