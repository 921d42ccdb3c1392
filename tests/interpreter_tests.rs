//! End-to-end interpreter tests: whole programs through the public API.

use a68::{run_source, Options, EXIT_OK, EXIT_RUNTIME_ERROR};

fn run(src: &str) -> a68::RunOutcome {
    run_source(src, "test.a68", &Options::default(), &[])
}

fn run_ok(src: &str) -> String {
    let out = run(src);
    assert_eq!(
        out.exit_code, EXIT_OK,
        "program failed:\n{}\n{}",
        src, out.diagnostics
    );
    out.output
}

#[test]
fn prints_integer_sum() {
    let out = run_ok("INT a = 3, b = 4; print(a + b)");
    assert!(out.contains('7'), "output was {:?}", out);
}

#[test]
fn declaration_through_generator_runs() {
    let out = run(r#"REF INT i := LOC INT := 0; print(i)"#);
    assert_eq!(out.exit_code, EXIT_OK, "{}", out.diagnostics);
    assert!(out.warning_count > 0, "the unintended form should warn");
    assert!(out.output.contains('0'), "output was {:?}", out.output);
}

#[test]
fn row_display_and_slice() {
    let out = run_ok("[1:3] INT v := (1, 2, 3); print(v[2])");
    assert!(out.contains('2'), "output was {:?}", out);
}

#[test]
fn integer_case_clause_balances_strings() {
    let out = run_ok(r#"INT i := 2; print((i | "one", "two" | "other"))"#);
    assert!(out.contains("two"), "output was {:?}", out);
    let other = run_ok(r#"INT i := 5; print((i | "one", "two" | "other"))"#);
    assert!(other.contains("other"), "output was {:?}", other);
}

#[test]
fn ref_string_parameter_aliases_the_flex_row() {
    let out = run_ok(
        r#"PROC f = (REF STRING s) VOID: s := "hi";
           STRING t := "old";
           f(t);
           print(t)"#,
    );
    assert!(out.contains("hi"), "output was {:?}", out);
    assert!(!out.contains("old"), "output was {:?}", out);
}

#[test]
fn while_loop_accumulates() {
    let out = run_ok(
        "INT sum := 0, i := 1; WHILE i <= 10 DO sum +:= i; i +:= 1 OD; print(sum)",
    );
    assert!(out.contains("55"), "output was {:?}", out);
}

#[test]
fn for_loop_with_step() {
    let out = run_ok("INT s := 0; FOR k FROM 1 BY 2 TO 9 DO s +:= k OD; print(s)");
    assert!(out.contains("25"), "output was {:?}", out);
}

#[test]
fn until_loop_extension() {
    let out = run_ok("INT i := 0; DO i +:= 1 UNTIL i = 4 OD; print(i)");
    assert!(out.contains('4'), "output was {:?}", out);
}

#[test]
fn recursive_procedure() {
    let out = run_ok(
        "PROC fac = (INT n) INT: (n = 0 | 1 | n * fac(n - 1)); print(fac(6))",
    );
    assert!(out.contains("720"), "output was {:?}", out);
}

#[test]
fn partial_parameterization_call() {
    let out = run_ok(
        "PROC add = (INT a, INT b) INT: a + b; \
         PROC (INT) INT inc = add( , 1); \
         print(inc(41))",
    );
    assert!(out.contains("42"), "output was {:?}", out);
}

#[test]
fn user_operator_and_priority() {
    let out = run_ok(
        "PRIO XOR = 2; \
         OP XOR = (BOOL a, BOOL b) BOOL: (a AND NOT b) OR (b AND NOT a); \
         print((TRUE XOR TRUE | 1 | 0))",
    );
    assert!(out.contains('0'), "output was {:?}", out);
}

#[test]
fn structures_select_and_update() {
    let out = run_ok(
        "MODE VEC = STRUCT (REAL x, REAL y); \
         VEC v := (3.0, 4.0); \
         x OF v := 6.0; \
         print(x OF v + y OF v)",
    );
    assert!(out.contains("10"), "output was {:?}", out);
}

#[test]
fn conformity_case_dispatches_on_the_runtime_mode() {
    let out = run_ok(
        "UNION (INT, STRING) u := 1; \
         print(CASE u IN (INT i): i + 1, (STRING s): 0 ESAC); \
         u := \"x\"; \
         print(CASE u IN (INT i): i + 1, (STRING s): 99 ESAC)",
    );
    assert!(out.contains('2'), "output was {:?}", out);
    assert!(out.contains("99"), "output was {:?}", out);
}

#[test]
fn identity_relations_and_nil() {
    let out = run_ok(
        "REF INT a = LOC INT; \
         print((a IS a | 1 | 0)); \
         print((a ISNT NIL | 1 | 0)); \
         print((NIL IS a | 0 | 1))",
    );
    let ones = out.matches('1').count();
    assert!(ones >= 3, "output was {:?}", out);
}

#[test]
fn trims_alias_the_underlying_row() {
    let out = run_ok(
        "[1:5] INT v := (1, 2, 3, 4, 5); \
         v[2:4] := (9, 8, 7); \
         print(v[3])",
    );
    assert!(out.contains('8'), "output was {:?}", out);
}

#[test]
fn trimmer_rebases_bounds_with_at() {
    let out = run_ok(
        "[1:5] INT v := (10, 20, 30, 40, 50); \
         [] INT w = v[2:4 @ 0]; \
         print(w[0])",
    );
    assert!(out.contains("20"), "output was {:?}", out);
}

#[test]
fn bounds_interrogation_through_rows_coercion() {
    let out = run_ok("[1:3] INT v := (1, 2, 3); print(UPB v); print(LWB v)");
    assert!(out.contains('3'), "output was {:?}", out);
    assert!(out.contains('1'), "output was {:?}", out);
    let out = run_ok("[0:4] REAL w; print(1 UPB w)");
    assert!(out.contains('4'), "output was {:?}", out);
}

#[test]
fn string_concatenation_and_append() {
    let out = run_ok(
        r#"STRING s := "al";
           s +:= "gol";
           print(s + " " + "68")"#,
    );
    assert!(out.contains("algol 68"), "output was {:?}", out);
}

#[test]
fn string_comparison_orders_lexicographically() {
    let out = run_ok(r#"print(("abc" < "abd" | 1 | 0))"#);
    assert!(out.contains('1'), "output was {:?}", out);
}

#[test]
fn goto_jumps_forward_in_the_serial_clause() {
    let out = run_ok("INT i := 0; GOTO done; i := 99; done: print(i)");
    assert!(out.contains('0') && !out.contains("99"), "output was {:?}", out);
}

#[test]
fn goto_unwinds_out_of_a_procedure() {
    let out = run_ok(
        "INT i := 0; PROC p = VOID: GOTO done; p; i := 1; done: print(i)",
    );
    assert!(out.contains('0') && !out.contains("+1"), "output was {:?}", out);
}

#[test]
fn parallel_clause_tasks_share_the_heap_and_rendezvous() {
    let out = run_ok("INT a := 0; PAR (a +:= 1, a +:= 2); print(a)");
    assert!(out.contains('3'), "output was {:?}", out);
}

#[test]
fn read_parses_into_names() {
    let out = run_source(
        "INT n; read(n); print(n * 2)",
        "test.a68",
        &Options::default(),
        &["21"],
    );
    assert_eq!(out.exit_code, EXIT_OK, "{}", out.diagnostics);
    assert!(out.output.contains("42"), "output was {:?}", out.output);
}

#[test]
fn heap_generator_survives_the_frame() {
    let out = run_ok(
        "REF INT keep = HEAP INT := 7; \
         PROC bump = VOID: (keep := keep + 1); \
         bump; bump; \
         print(keep)",
    );
    assert!(out.contains('9'), "output was {:?}", out);
}

#[test]
fn garbage_is_collected_under_a_small_heap() {
    // Each iteration abandons a fresh string; a heap far smaller than the
    // total allocation only survives if collection reclaims the garbage
    // and compaction keeps live values intact.
    let options = Options {
        heap_limit: 2048,
        ..Options::default()
    };
    let out = run_source(
        r#"STRING keep := "live";
           INT i := 0;
           WHILE i < 500 DO
               STRING scratch := "garbage" * 3;
               i +:= 1
           OD;
           print(keep);
           print(i)"#,
        "test.a68",
        &options,
        &[],
    );
    assert_eq!(out.exit_code, EXIT_OK, "{}", out.diagnostics);
    assert!(out.output.contains("live"), "output was {:?}", out.output);
    assert!(out.output.contains("500"), "output was {:?}", out.output);
}

#[test]
fn scope_violation_is_reported_not_ignored() {
    let out = run(
        "REF INT r := LOC INT; \
         PROC p = VOID: (r := LOC INT); \
         p",
    );
    assert_eq!(out.exit_code, EXIT_RUNTIME_ERROR, "{}", out.diagnostics);
    assert!(out.diagnostics.contains("scope"), "{}", out.diagnostics);
}

#[test]
fn uninitialised_use_is_a_runtime_error() {
    let out = run("INT n; INT m = n + 1; print(m)");
    assert_eq!(out.exit_code, EXIT_RUNTIME_ERROR, "{}", out.diagnostics);
    assert!(
        out.diagnostics.contains("before initialisation"),
        "{}",
        out.diagnostics
    );
}

#[test]
fn division_by_zero_is_a_runtime_error() {
    let out = run("INT a := 0; print(7 % a)");
    assert_eq!(out.exit_code, EXIT_RUNTIME_ERROR);
    assert!(out.diagnostics.contains("division by zero"), "{}", out.diagnostics);
}

#[test]
fn subscript_out_of_bounds_is_a_runtime_error() {
    let out = run("[1:3] INT v := (1, 2, 3); INT i := 4; print(v[i])");
    assert_eq!(out.exit_code, EXIT_RUNTIME_ERROR);
    assert!(out.diagnostics.contains("out of bounds"), "{}", out.diagnostics);
}

#[test]
fn failed_assertion_unwinds_to_the_landing_pad() {
    let out = run("assert(1 = 2)");
    assert_eq!(out.exit_code, EXIT_RUNTIME_ERROR);
    assert!(out.diagnostics.contains("assertion"), "{}", out.diagnostics);
}

#[test]
fn widened_denotations_execute_exactly() {
    let out = run_ok("REAL x = 1; LONG INT n = 123; print(x); print(n)");
    assert!(out.contains("1.000000"), "output was {:?}", out);
    assert!(out.contains("123"), "output was {:?}", out);
}

#[test]
fn standard_functions_evaluate() {
    let out = run_ok("print(ENTIER sqrt(16.0)); print(ABS - 5)");
    assert!(out.contains('4'), "output was {:?}", out);
    assert!(out.contains('5'), "output was {:?}", out);
}

#[test]
fn deproceduring_calls_parameterless_routines() {
    let out = run_ok(
        "INT calls := 0; \
         PROC tick = INT: (calls +:= 1; calls); \
         INT a = tick; INT b = tick; \
         print(a + b)",
    );
    assert!(out.contains('3'), "output was {:?}", out);
}

#[test]
fn bits_and_bool_operators() {
    let out = run_ok(
        "BITS m = 2r1010 AND 2r1100; \
         print(ABS m); \
         print((1 ELEM (BITS(2r1) OR 2r0) | 0 | 1))",
    );
    assert!(out.contains('8'), "output was {:?}", out);
}

#[test]
fn time_limit_forces_a_quit() {
    let options = Options {
        time_limit: Some(0),
        ..Options::default()
    };
    let out = run_source(
        "INT i := 0; WHILE TRUE DO i +:= 1 OD",
        "test.a68",
        &options,
        &[],
    );
    assert_eq!(out.exit_code, a68::EXIT_FORCED_QUIT, "{}", out.diagnostics);
}
