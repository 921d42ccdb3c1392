//! Command-line interface for the interpreter.

use std::fs;
use std::path::PathBuf;

use clap::Parser;

use crate::{run_source, Options, EXIT_SYNTAX_ERROR};

#[derive(Parser)]
#[command(name = "a68")]
#[command(about = "An interpreter for a strict subset of Algol 68", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Program file to run.
    pub program: PathBuf,

    /// Arguments passed through to the program.
    pub args: Vec<String>,

    /// Mode-check and coerce only; do not run.
    #[arg(long, alias = "norun")]
    pub check: bool,

    /// Disable language extensions beyond the Report.
    #[arg(long)]
    pub strict: bool,

    /// Warn on implicit widening of denotations.
    #[arg(long)]
    pub portcheck: bool,

    /// Suppress warnings.
    #[arg(long = "no-warnings")]
    pub no_warnings: bool,

    /// Suppress warnings and informative messages.
    #[arg(long)]
    pub quiet: bool,

    /// Expression stack size in cells.
    #[arg(long, default_value_t = 1 << 16)]
    pub stack: usize,

    /// Frame stack depth.
    #[arg(long, default_value_t = 4096)]
    pub frame: usize,

    /// Heap size in cells.
    #[arg(long, default_value_t = 1 << 20)]
    pub heap: usize,

    /// Handle pool size.
    #[arg(long, default_value_t = 1 << 16)]
    pub handles: usize,

    /// Trace every executed construct to stderr.
    #[arg(long)]
    pub trace: bool,

    /// Like --trace.
    #[arg(long)]
    pub debug: bool,

    /// Print a stack backtrace with runtime errors.
    #[arg(long)]
    pub backtrace: bool,

    /// Wall-clock limit in seconds.
    #[arg(long)]
    pub timelimit: Option<u64>,

    /// Fixed random seed and reproducible behaviour, for test suites.
    #[arg(long = "regression-test")]
    pub regression_test: bool,
}

/// Entry point for the binary; returns the process exit code.
pub fn run_cli() -> i32 {
    let cli = Cli::parse();
    let source = match fs::read_to_string(&cli.program) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("a68: cannot read {}: {}", cli.program.display(), e);
            return EXIT_SYNTAX_ERROR;
        }
    };
    let file = cli.program.display().to_string();
    let options = Options {
        check_only: cli.check,
        strict: cli.strict,
        portcheck: cli.portcheck,
        no_warnings: cli.no_warnings,
        quiet: cli.quiet,
        frame_limit: cli.frame,
        stack_limit: cli.stack,
        heap_limit: cli.heap,
        handle_limit: cli.handles,
        trace: cli.trace || cli.debug,
        backtrace: cli.backtrace,
        time_limit: cli.timelimit,
        regression: cli.regression_test,
        echo: true,
    };
    let outcome = run_source(&source, &file, &options, &[]);
    {
        use std::io::Write;
        let _ = std::io::stdout().flush();
    }
    if !outcome.diagnostics.is_empty() && !cli.quiet {
        eprint!("{}", outcome.diagnostics);
    }
    outcome.exit_code
}
