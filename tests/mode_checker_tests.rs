//! Mode checking and coercion behaviour observed through the driver.

use a68::{run_source, Options, EXIT_MODE_ERROR, EXIT_OK, EXIT_SYNTAX_ERROR};

fn check(src: &str) -> a68::RunOutcome {
    run_source(
        src,
        "test.a68",
        &Options {
            check_only: true,
            ..Options::default()
        },
        &[],
    )
}

#[test]
fn well_moded_program_passes() {
    let out = check("INT a = 3, b = 4; print(a + b)");
    assert_eq!(out.exit_code, EXIT_OK, "{}", out.diagnostics);
}

#[test]
fn flex_row_alias_is_a_mode_error() {
    let out = check("PROC bad = (REF [] CHAR c) VOID: SKIP; STRING u; bad(u)");
    assert_eq!(out.exit_code, EXIT_MODE_ERROR);
    assert!(
        out.diagnostics.contains("CHAR"),
        "explanation should name the row mode:\n{}",
        out.diagnostics
    );
}

#[test]
fn undeclared_identifier_is_reported_with_its_name() {
    let out = check("print(mystery)");
    assert_eq!(out.exit_code, EXIT_MODE_ERROR);
    assert!(out.diagnostics.contains("mystery"), "{}", out.diagnostics);
}

#[test]
fn series_mismatch_explains_the_offending_constituent() {
    let out = check("[] INT v = (1, TRUE, 3)");
    assert_eq!(out.exit_code, EXIT_MODE_ERROR);
    assert!(out.diagnostics.contains("BOOL"), "{}", out.diagnostics);
    assert!(out.diagnostics.contains("INT"), "{}", out.diagnostics);
}

#[test]
fn errors_continue_past_the_first_construct() {
    let out = check("INT a = TRUE; REAL b = \"x\"; BOOL c = 1.5");
    assert_eq!(out.exit_code, EXIT_MODE_ERROR);
    // All three declarations are reported.
    assert!(out.diagnostics.matches("mode error").count() >= 3, "{}", out.diagnostics);
}

#[test]
fn voided_value_warning_can_be_suppressed() {
    let noisy = check("INT a = 1; a + a; SKIP");
    assert!(noisy.warning_count > 0);
    let quiet = run_source(
        "INT a = 1; a + a; SKIP",
        "test.a68",
        &Options {
            check_only: true,
            no_warnings: true,
            ..Options::default()
        },
        &[],
    );
    assert_eq!(quiet.warning_count, 0);
}

#[test]
fn portcheck_warns_about_widened_denotations() {
    let out = run_source(
        "REAL x = 1; print(x)",
        "test.a68",
        &Options {
            check_only: true,
            portcheck: true,
            ..Options::default()
        },
        &[],
    );
    assert_eq!(out.exit_code, EXIT_OK, "{}", out.diagnostics);
    assert!(out.warning_count > 0, "{}", out.diagnostics);
    assert!(out.diagnostics.contains("portable"), "{}", out.diagnostics);
}

#[test]
fn check_only_does_not_run_the_program() {
    let out = check("print(1)");
    assert_eq!(out.exit_code, EXIT_OK, "{}", out.diagnostics);
    assert!(out.output.is_empty());
}

#[test]
fn syntax_errors_take_precedence() {
    let out = check("IF TRUE THEN 1");
    assert_eq!(out.exit_code, EXIT_SYNTAX_ERROR);
}

#[test]
fn assignment_to_a_constant_is_rejected() {
    let out = check("INT a = 3; a := 4");
    assert_eq!(out.exit_code, EXIT_MODE_ERROR);
    assert!(out.diagnostics.contains("not a name"), "{}", out.diagnostics);
}

#[test]
fn operand_without_an_operator_is_reported_with_modes() {
    let out = check("BOOL b = TRUE < 1");
    assert_eq!(out.exit_code, EXIT_MODE_ERROR);
    assert!(out.diagnostics.contains("BOOL"), "{}", out.diagnostics);
}

#[test]
fn recursive_modes_check_and_run() {
    let out = run_source(
        "MODE LIST = STRUCT (INT v, REF LIST next); \
         LIST l := (1, NIL); \
         print(v OF l)",
        "test.a68",
        &Options::default(),
        &[],
    );
    assert_eq!(out.exit_code, EXIT_OK, "{}", out.diagnostics);
    assert!(out.output.contains('1'), "output was {:?}", out.output);
}

#[test]
fn nil_needs_a_name_context() {
    let out = check("INT x = NIL");
    assert_eq!(out.exit_code, EXIT_MODE_ERROR);
    assert!(out.diagnostics.contains("NIL"), "{}", out.diagnostics);
}

#[test]
fn brief_case_requires_an_int_enquiry() {
    let out = check(r#"print((TRUE | "one", "two" | "other"))"#);
    assert_eq!(out.exit_code, EXIT_MODE_ERROR, "{}", out.diagnostics);
}

#[test]
fn union_assignment_unites_the_value() {
    let out = run_source(
        "UNION (INT, REAL) u := 1.5; \
         print(CASE u IN (INT i): 0, (REAL r): 1 ESAC)",
        "test.a68",
        &Options::default(),
        &[],
    );
    assert_eq!(out.exit_code, EXIT_OK, "{}", out.diagnostics);
    assert!(out.output.contains('1'), "output was {:?}", out.output);
}
