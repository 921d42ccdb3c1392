//! Diagnostics attached to source lines.
//!
//! Every message carries a severity, a byte span into the source, and a
//! rendered explanation. Messages are kept in a per-line list so the renderer
//! can show each offending line once, with carets under the tokens and the
//! messages numbered beneath it.

use std::collections::BTreeMap;
use std::fmt;

use crate::token::Span;

/// Mode errors beyond this many are counted but no longer rendered.
pub const MAX_ERRORS: usize = 16;

/// SGR codes for the terminal listing.
mod sgr {
    pub const BOLD: &str = "\x1b[1m";
    pub const RED: &str = "\x1b[31m";
    pub const BLUE: &str = "\x1b[34m";
    pub const BOLD_RED: &str = "\x1b[1;31m";
    pub const BOLD_YELLOW: &str = "\x1b[1;33m";
}

/// Wrap a fragment in an SGR code, resetting afterwards.
fn paint(code: &str, text: &str) -> String {
    format!("{}{}\x1b[0m", code, text)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    SyntaxError,
    ModeError,
    RuntimeError,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Warning => "warning",
            Severity::SyntaxError => "syntax error",
            Severity::ModeError => "mode error",
            Severity::RuntimeError => "runtime error",
        })
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub span: Span,
    pub message: String,
}

/// Accumulator for the whole front end.
pub struct Diagnostics {
    list: Vec<Diagnostic>,
    syntax_errors: usize,
    mode_errors: usize,
    warnings: usize,
    suppressed: usize,
    pub no_warnings: bool,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics {
            list: Vec::new(),
            syntax_errors: 0,
            mode_errors: 0,
            warnings: 0,
            suppressed: 0,
            no_warnings: false,
        }
    }

    pub fn syntax_error(&mut self, span: Span, message: impl Into<String>) {
        self.syntax_errors += 1;
        self.push(Severity::SyntaxError, span, message.into());
    }

    pub fn mode_error(&mut self, span: Span, message: impl Into<String>) {
        self.mode_errors += 1;
        if self.mode_errors > MAX_ERRORS {
            self.suppressed += 1;
            return;
        }
        self.push(Severity::ModeError, span, message.into());
    }

    pub fn runtime_error(&mut self, span: Span, message: impl Into<String>) {
        self.push(Severity::RuntimeError, span, message.into());
    }

    pub fn warning(&mut self, span: Span, message: impl Into<String>) {
        if self.no_warnings {
            return;
        }
        self.warnings += 1;
        self.push(Severity::Warning, span, message.into());
    }

    fn push(&mut self, severity: Severity, span: Span, message: String) {
        self.list.push(Diagnostic {
            severity,
            span,
            message,
        });
    }

    /// Checkpoint for speculative parsing.
    pub fn mark(&self) -> (usize, usize, usize, usize) {
        (
            self.list.len(),
            self.syntax_errors,
            self.mode_errors,
            self.warnings,
        )
    }

    /// Drop everything recorded after `mark`.
    pub fn rollback(&mut self, mark: (usize, usize, usize, usize)) {
        self.list.truncate(mark.0);
        self.syntax_errors = mark.1;
        self.mode_errors = mark.2;
        self.warnings = mark.3;
    }

    pub fn has_errors(&self) -> bool {
        self.syntax_errors + self.mode_errors > 0
    }

    pub fn has_syntax_errors(&self) -> bool {
        self.syntax_errors > 0
    }

    pub fn has_mode_errors(&self) -> bool {
        self.mode_errors > 0
    }

    pub fn warning_count(&self) -> usize {
        self.warnings
    }

    pub fn error_count(&self) -> usize {
        self.syntax_errors + self.mode_errors
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.list.iter()
    }

    /// Render all diagnostics against the source, one block per source line.
    pub fn render(&self, source: &str, file: &str) -> String {
        let mut by_line: BTreeMap<usize, Vec<&Diagnostic>> = BTreeMap::new();
        for d in &self.list {
            let (line, _, _) = line_context(source, d.span.start);
            by_line.entry(line).or_default().push(d);
        }

        let mut out = String::new();
        let mut number = 0usize;
        for (line, diags) in &by_line {
            let (_, line_start, line_text) = line_context(source, diags[0].span.start);
            let line_num_str = paint(sgr::BLUE, &format!("{:4}", line));
            let pipe = paint(sgr::BLUE, "|");
            out.push_str(&format!(
                "{} {}:{}\n{} {} {}\n",
                paint(sgr::BOLD, file),
                line,
                diags[0].span.start.saturating_sub(line_start) + 1,
                line_num_str,
                pipe,
                line_text
            ));
            // Carets for every diagnostic on this line, then numbered messages.
            let mut caret_line = vec![b' '; line_text.len() + 1];
            for d in diags {
                let col = d.span.start.saturating_sub(line_start);
                let len = (d.span.end - d.span.start).max(1);
                for i in col..(col + len).min(caret_line.len()) {
                    caret_line[i] = b'^';
                }
            }
            let carets = String::from_utf8_lossy(&caret_line).trim_end().to_string();
            out.push_str(&format!("     {} {}\n", pipe, paint(sgr::RED, &carets)));
            for d in diags {
                number += 1;
                let label = match d.severity {
                    Severity::Warning => paint(sgr::BOLD_YELLOW, "warning"),
                    other => paint(sgr::BOLD_RED, &other.to_string()),
                };
                out.push_str(&format!("     {} [{}] {}: {}\n", pipe, number, label, d.message));
            }
        }
        if self.suppressed > 0 {
            out.push_str(&format!(
                "{} further mode errors not shown\n",
                self.suppressed
            ));
        }
        out
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

/// Locate the 1-based line number, line start offset, and line text holding
/// a byte position.
pub fn line_context(source: &str, pos: usize) -> (usize, usize, &str) {
    let mut line_num = 1;
    let mut line_start = 0;
    for (i, c) in source.char_indices() {
        if i >= pos {
            break;
        }
        if c == '\n' {
            line_num += 1;
            line_start = i + 1;
        }
    }
    let line_end = source[line_start..]
        .find('\n')
        .map(|off| line_start + off)
        .unwrap_or(source.len());
    (line_num, line_start, &source[line_start..line_end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_context_finds_second_line() {
        let src = "INT a = 3;\nprint(a)\n";
        let (line, start, text) = line_context(src, 12);
        assert_eq!(line, 2);
        assert_eq!(start, 11);
        assert_eq!(text, "print(a)");
    }

    #[test]
    fn render_shows_line_and_caret() {
        let src = "REAL x := TRUE";
        let mut diags = Diagnostics::new();
        diags.mode_error(Span::new(10, 14), "BOOL cannot be coerced to REAL");
        let out = diags.render(src, "t.a68");
        assert!(out.contains("TRUE"), "source line missing: {}", out);
        assert!(out.contains("^^^^"), "caret missing: {}", out);
        assert!(out.contains("mode error"), "severity missing: {}", out);
    }

    #[test]
    fn render_colours_the_severity_label() {
        let src = "x";
        let mut diags = Diagnostics::new();
        diags.mode_error(Span::new(0, 1), "m");
        let out = diags.render(src, "t.a68");
        assert!(out.contains("\x1b[1;31m"), "missing SGR code: {:?}", out);
        assert!(out.contains("\x1b[0m"), "missing reset: {:?}", out);
    }

    #[test]
    fn messages_on_one_line_are_numbered_together() {
        let src = "x := y";
        let mut diags = Diagnostics::new();
        diags.mode_error(Span::new(0, 1), "first");
        diags.mode_error(Span::new(5, 6), "second");
        let out = diags.render(src, "t.a68");
        assert!(out.contains("[1]"), "{}", out);
        assert!(out.contains("[2]"), "{}", out);
        // One source line block only.
        assert_eq!(out.matches("x := y").count(), 1, "{}", out);
    }

    #[test]
    fn errors_beyond_cap_are_counted_not_rendered() {
        let src = "x";
        let mut diags = Diagnostics::new();
        for _ in 0..(MAX_ERRORS + 5) {
            diags.mode_error(Span::new(0, 1), "overflow test");
        }
        assert_eq!(diags.error_count(), MAX_ERRORS + 5);
        let out = diags.render(src, "t.a68");
        assert!(out.contains("5 further mode errors not shown"), "{}", out);
    }

    #[test]
    fn no_warnings_suppresses_warnings() {
        let mut diags = Diagnostics::new();
        diags.no_warnings = true;
        diags.warning(Span::new(0, 1), "dubious");
        assert_eq!(diags.warning_count(), 0);
    }
}
