//! a68: a tree-walking interpreter for a strict subset of Algol 68.
//!
//! The pipeline: the lexer and parser build a mode-annotated tree and the
//! symbol-table chain; the mode checker assigns a yield to every producing
//! construct; the coercion inserter wraps the tree with explicit coercions;
//! a preprocessing pass assigns propagators and frame offsets; the genie
//! walks the result.

pub mod ast;
pub mod check;
pub mod cli;
pub mod diag;
pub mod genie;
pub mod intern;
pub mod lexer;
pub mod modes;
pub mod parser;
pub mod prelude;
pub mod scope;
pub mod token;

pub use ast::{Attr, NodeId, Tree};
pub use check::{check_program, Soid};
pub use diag::{Diagnostics, Severity};
pub use genie::{Genie, GenieOptions, Unwind};
pub use intern::{Interner, Symbol};
pub use lexer::Lexer;
pub use modes::{Mode, ModeTable, Moid};
pub use parser::Parser;
pub use scope::SymbolTables;

/// Exit codes, partitioned by failure class.
pub const EXIT_OK: i32 = 0;
pub const EXIT_RUNTIME_ERROR: i32 = 1;
pub const EXIT_MODE_ERROR: i32 = 2;
pub const EXIT_SYNTAX_ERROR: i32 = 3;
pub const EXIT_FORCED_QUIT: i32 = 4;
pub const EXIT_RERUN_REQUESTED: i32 = 5;

#[derive(Clone, Debug)]
pub struct Options {
    /// Mode-check and coerce only; do not run.
    pub check_only: bool,
    /// Reject extensions beyond the Report.
    pub strict: bool,
    /// Warn on implicit widening of denotations.
    pub portcheck: bool,
    pub no_warnings: bool,
    pub quiet: bool,
    pub frame_limit: usize,
    pub stack_limit: usize,
    pub heap_limit: usize,
    pub handle_limit: usize,
    pub trace: bool,
    pub backtrace: bool,
    pub time_limit: Option<u64>,
    pub regression: bool,
    /// Stream transput to stdout while running.
    pub echo: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            check_only: false,
            strict: false,
            portcheck: false,
            no_warnings: false,
            quiet: false,
            frame_limit: 4096,
            stack_limit: 1 << 16,
            heap_limit: 1 << 20,
            handle_limit: 1 << 16,
            trace: false,
            backtrace: false,
            time_limit: None,
            regression: false,
            echo: false,
        }
    }
}

pub struct RunOutcome {
    pub exit_code: i32,
    /// Everything the program printed.
    pub output: String,
    /// Rendered diagnostics (errors and warnings).
    pub diagnostics: String,
    pub warning_count: usize,
}

/// Drive a source text through the whole pipeline.
pub fn run_source(source: &str, file: &str, options: &Options, input: &[&str]) -> RunOutcome {
    let mut interner = Interner::new();
    let mut modes = ModeTable::new();
    let mut tables = SymbolTables::new();
    let mut tree = Tree::new();
    let mut diags = Diagnostics::new();
    diags.no_warnings = options.no_warnings || options.quiet;
    let funs = prelude::standard_environ(&mut interner, &mut modes, &mut tables);

    let tokens = Lexer::new(source).tokenize(&mut interner, &mut diags);
    let root = Parser::new(
        &tokens,
        &mut interner,
        &mut modes,
        &mut tables,
        &mut tree,
        &mut diags,
    )
    .parse_program();
    if options.strict {
        reject_extensions(&tree, &mut diags);
    }
    if diags.has_syntax_errors() {
        return RunOutcome {
            exit_code: EXIT_SYNTAX_ERROR,
            output: String::new(),
            warning_count: diags.warning_count(),
            diagnostics: diags.render(source, file),
        };
    }

    check_program(&mut tree, &mut modes, &mut tables, &mut diags, &interner, root);
    if diags.has_mode_errors() {
        return RunOutcome {
            exit_code: EXIT_MODE_ERROR,
            output: String::new(),
            warning_count: diags.warning_count(),
            diagnostics: diags.render(source, file),
        };
    }

    check::coerce::coerce_program(
        &mut tree,
        &mut modes,
        &mut tables,
        &mut diags,
        &interner,
        root,
        options.portcheck,
    );
    genie::preprocess(&mut tree, &mut tables, &modes);

    if options.check_only {
        return RunOutcome {
            exit_code: EXIT_OK,
            output: String::new(),
            warning_count: diags.warning_count(),
            diagnostics: diags.render(source, file),
        };
    }

    let genie_options = GenieOptions {
        max_frames: options.frame_limit,
        stack_cells: options.stack_limit,
        heap_cells: options.heap_limit,
        heap_handles: options.handle_limit,
        trace: options.trace,
        time_limit: options.time_limit,
        regression: options.regression,
        echo: options.echo,
    };
    let mut genie = Genie::new(&tree, &mut modes, &tables, &interner, &funs, &genie_options);
    if !input.is_empty() {
        genie.feed_input(input);
    }
    let result = genie.run(root);
    let exit_code = match result {
        Ok(()) => EXIT_OK,
        Err(Unwind::Error(e)) => {
            diags.runtime_error(e.span, e.message);
            if options.backtrace {
                diags.runtime_error(e.span, format!("backtrace:\n{}", genie.backtrace()));
            }
            EXIT_RUNTIME_ERROR
        }
        Err(Unwind::Quit(reason)) => {
            diags.runtime_error(token::Span::default(), reason);
            EXIT_FORCED_QUIT
        }
        Err(Unwind::Jump(_)) => EXIT_RUNTIME_ERROR,
    };
    let output = std::mem::take(&mut genie.output);
    drop(genie);
    RunOutcome {
        exit_code,
        output,
        warning_count: diags.warning_count(),
        diagnostics: diags.render(source, file),
    }
}

/// Under `--strict`, constructs beyond the Report are rejected.
fn reject_extensions(tree: &Tree, diags: &mut Diagnostics) {
    for i in 0..tree.len() {
        let id = NodeId::from_index(i);
        if tree.attr(id) == Attr::UntilPart {
            diags.syntax_error(
                tree.node(id).span,
                "UNTIL in a loop clause is an extension beyond the Report",
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str) -> RunOutcome {
        run_source(src, "test.a68", &Options::default(), &[])
    }

    #[test]
    fn trivial_program_runs() {
        let out = run("SKIP");
        assert_eq!(out.exit_code, EXIT_OK, "{}", out.diagnostics);
    }

    #[test]
    fn syntax_error_exit_code() {
        let out = run("INT a = ;");
        assert_eq!(out.exit_code, EXIT_SYNTAX_ERROR);
    }

    #[test]
    fn mode_error_exit_code() {
        let out = run("INT a = TRUE");
        assert_eq!(out.exit_code, EXIT_MODE_ERROR);
        assert!(out.diagnostics.contains("BOOL"), "{}", out.diagnostics);
    }

    #[test]
    fn runtime_error_exit_code() {
        let out = run("INT a = 1 % 0; print(a)");
        assert_eq!(out.exit_code, EXIT_RUNTIME_ERROR, "{}", out.diagnostics);
        assert!(
            out.diagnostics.contains("division by zero"),
            "{}",
            out.diagnostics
        );
    }

    #[test]
    fn strict_rejects_until() {
        let src = "INT i := 0; DO i := i + 1 UNTIL i = 3 OD";
        let ok = run(src);
        assert_eq!(ok.exit_code, EXIT_OK, "{}", ok.diagnostics);
        let strict = run_source(
            src,
            "test.a68",
            &Options {
                strict: true,
                ..Options::default()
            },
            &[],
        );
        assert_eq!(strict.exit_code, EXIT_SYNTAX_ERROR);
    }
}
