//! Checker and inserter tests over the whole front end.

use super::coerce::{coerce_program, hoist_denotations};
use super::*;
use crate::ast::{Attr, Status, Tree};
use crate::diag::Diagnostics;
use crate::intern::Interner;
use crate::lexer::Lexer;
use crate::modes::{ModeTable, Moid};
use crate::parser::Parser;
use crate::scope::SymbolTables;

struct Front {
    interner: Interner,
    modes: ModeTable,
    tables: SymbolTables,
    tree: Tree,
    diags: Diagnostics,
    root: crate::ast::NodeId,
}

fn front(src: &str) -> Front {
    let mut interner = Interner::new();
    let mut modes = ModeTable::new();
    let mut tables = SymbolTables::new();
    let mut tree = Tree::new();
    let mut diags = Diagnostics::new();
    crate::prelude::standard_environ(&mut interner, &mut modes, &mut tables);
    let tokens = Lexer::new(src).tokenize(&mut interner, &mut diags);
    let root = Parser::new(
        &tokens,
        &mut interner,
        &mut modes,
        &mut tables,
        &mut tree,
        &mut diags,
    )
    .parse_program();
    assert!(
        !diags.has_syntax_errors(),
        "syntax errors in {:?}:\n{}",
        src,
        diags.render(src, "test.a68")
    );
    Front {
        interner,
        modes,
        tables,
        tree,
        diags,
        root,
    }
}

fn checked(src: &str) -> Front {
    let mut f = front(src);
    check_program(
        &mut f.tree,
        &mut f.modes,
        &mut f.tables,
        &mut f.diags,
        &f.interner,
        f.root,
    );
    f
}

fn coerced(src: &str) -> Front {
    let mut f = checked(src);
    assert!(
        !f.diags.has_mode_errors(),
        "mode errors in {:?}:\n{}",
        src,
        f.diags.render(src, "test.a68")
    );
    coerce_program(
        &mut f.tree,
        &mut f.modes,
        &mut f.tables,
        &mut f.diags,
        &f.interner,
        f.root,
        false,
    );
    f
}

/// All node attrs in arena order, for whole-tree comparisons.
fn shape(tree: &Tree) -> Vec<Attr> {
    (0..tree.len())
        .map(|i| tree.attr(crate::ast::NodeId::from_index(i)))
        .collect()
}

fn find_attr(f: &Front, attr: Attr) -> Vec<crate::ast::NodeId> {
    (0..f.tree.len())
        .map(crate::ast::NodeId::from_index)
        .filter(|&n| f.tree.attr(n) == attr)
        .collect()
}

#[test]
fn identity_declaration_accepts_exact_mode() {
    let f = checked("INT a = 3");
    assert!(!f.diags.has_mode_errors(), "{}", f.diags.render("", "t"));
}

#[test]
fn identity_declaration_rejects_uncoercible_mode() {
    let f = checked("INT a = TRUE");
    assert!(f.diags.has_mode_errors());
}

#[test]
fn widening_is_strong_only() {
    assert!(!checked("REAL x = 1").diags.has_mode_errors());
    // A firm operand does not widen: INT + REAL resolves via the standard
    // environ retry instead of failing.
    assert!(!checked("REAL x = 1 + 2.0").diags.has_mode_errors());
}

#[test]
fn assignation_destination_must_be_a_name() {
    let f = checked("3 := 4");
    assert!(f.diags.has_mode_errors());
}

#[test]
fn assignation_annotates_the_name_mode() {
    let f = checked("INT n; n := 7");
    assert!(!f.diags.has_mode_errors());
    let assign = find_attr(&f, Attr::Assignation)[0];
    let moid = f.tree.moid(assign).unwrap();
    let ref_int = f.modes.canonical(moid);
    assert!(matches!(
        f.modes.mode(ref_int),
        crate::modes::Mode::Ref(inner) if *inner == Moid::INT
    ));
}

#[test]
fn checker_yield_is_coercible_to_expectation() {
    // The P3 shape: every annotated producing node in a well-checked tree
    // coerces to what its context demanded; spot-check the source of a
    // widened declaration.
    let f = checked("REAL x = 1");
    let decl = find_attr(&f, Attr::IdentityDecl)[0];
    let source = f.tree.sub(decl).unwrap();
    let y = f.tree.moid(source).unwrap();
    let mut modes = f.modes;
    assert!(crate::modes::predicates::coercible(
        &mut modes,
        y,
        Moid::REAL,
        crate::modes::predicates::Sort::Strong,
        crate::modes::predicates::Regime::Safe,
    ));
}

#[test]
fn conditional_balances_int_and_real_to_real() {
    let f = checked("BOOL b = TRUE; REAL x = IF b THEN 1 ELSE 2.5 FI");
    assert!(!f.diags.has_mode_errors(), "{}", f.diags.render("", "t"));
}

#[test]
fn conditional_without_else_cannot_yield_a_value() {
    let f = checked("INT x = IF TRUE THEN 1 FI");
    assert!(f.diags.has_mode_errors());
}

#[test]
fn empty_clause_in_value_position_has_no_unique_mode() {
    let f = checked("INT x = (INT never; SKIP; never := 0; )");
    // The trailing semicolon leaves the clause ending in a unit, so build
    // a genuinely empty one instead.
    let g = checked("INT x = IF TRUE THEN ELSE 1 FI");
    assert!(
        f.diags.has_mode_errors() || g.diags.has_mode_errors(),
        "an empty series must be rejected"
    );
}

#[test]
fn flex_alias_rejection_for_ref_row_char_argument() {
    // PROC (REF [] CHAR) VOID applied to a REF STRING argument.
    let f = checked(
        "PROC bad = (REF [] CHAR c) VOID: SKIP; STRING u; bad(u)",
    );
    assert!(f.diags.has_mode_errors());
    let rendered = f.diags.render("", "t");
    assert!(rendered.contains("STRING") || rendered.contains("FLEX"), "{}", rendered);
}

#[test]
fn ref_string_argument_is_accepted() {
    let f = checked("PROC f = (REF STRING s) VOID: s := \"hi\"; STRING t := \"old\"; f(t)");
    assert!(!f.diags.has_mode_errors(), "{}", f.diags.render("", "t"));
}

#[test]
fn unintended_generator_assignment_warns() {
    let f = checked("REF INT i := LOC INT := 0");
    assert!(!f.diags.has_mode_errors(), "{}", f.diags.render("", "t"));
    assert!(f.diags.warning_count() > 0, "expected the UNINTENDED warning");
}

#[test]
fn voided_formula_warns() {
    let f = checked("INT a = 1; a + a; SKIP");
    assert!(f.diags.warning_count() > 0);
}

#[test]
fn call_with_trimmed_slot_yields_partial_proc() {
    let f = checked(
        "PROC add = (INT a, INT b) INT: a + b; PROC (INT) INT inc = add( , 1); INT x = inc(4)",
    );
    assert!(!f.diags.has_mode_errors(), "{}", f.diags.render("", "t"));
    let call = find_attr(&f, Attr::Call)
        .into_iter()
        .find(|&c| {
            f.tree
                .children(c)
                .iter()
                .any(|&a| f.tree.attr(a) == Attr::EmptyArgument)
        })
        .expect("the partial call exists");
    let moid = f.tree.moid(call).unwrap();
    match f.modes.mode(moid) {
        crate::modes::Mode::Proc { params, result } => {
            assert_eq!(params.len(), 1);
            assert_eq!(params[0], Moid::INT);
            assert_eq!(*result, Moid::INT);
        }
        other => panic!("partial call yields {:?}", other),
    }
}

#[test]
fn call_with_all_arguments_yields_the_result_mode() {
    let f = checked("PROC add = (INT a, INT b) INT: a + b; INT x = add(1, 2)");
    assert!(!f.diags.has_mode_errors());
    let call = find_attr(&f, Attr::Call)[0];
    assert_eq!(f.tree.moid(call), Some(Moid::INT));
}

#[test]
fn slice_of_name_yields_name_of_element() {
    let f = checked("[1:3] INT v; v[2] := 9");
    assert!(!f.diags.has_mode_errors(), "{}", f.diags.render("", "t"));
}

#[test]
fn trimmer_yields_a_row() {
    let f = checked("[1:9] INT v; [] INT w = v[2:4]");
    assert!(!f.diags.has_mode_errors(), "{}", f.diags.render("", "t"));
}

#[test]
fn selection_on_name_yields_name_of_field() {
    let f = checked("STRUCT (REAL re, REAL im) z; re OF z := 1.0");
    assert!(!f.diags.has_mode_errors(), "{}", f.diags.render("", "t"));
}

#[test]
fn unknown_field_is_reported() {
    let f = checked("STRUCT (REAL re) z; REAL x = im OF z");
    assert!(f.diags.has_mode_errors());
}

#[test]
fn operator_identification_walks_the_scope_chain() {
    let f = checked(
        "OP DOUBLE = (INT n) INT: n * 2; INT x = DOUBLE 4",
    );
    assert!(!f.diags.has_mode_errors(), "{}", f.diags.render("", "t"));
}

#[test]
fn assigning_operator_resolves_through_strong_retry() {
    let f = checked("REAL x := 0.0; x +:= 1");
    assert!(!f.diags.has_mode_errors(), "{}", f.diags.render("", "t"));
}

#[test]
fn conformity_case_checks_specifiers_against_the_union() {
    let f = checked(
        "UNION (INT, STRING) u := 1; \
         INT r = CASE u IN (INT i): i, (STRING s): 0 ESAC",
    );
    assert!(!f.diags.has_mode_errors(), "{}", f.diags.render("", "t"));

    let g = checked(
        "UNION (INT, STRING) u := 1; \
         INT r = CASE u IN (BOOL b): 1, (INT i): i ESAC",
    );
    assert!(g.diags.has_mode_errors(), "BOOL can never conform");
}

// ------------------------------------------------------------------
// Coercion insertion
// ------------------------------------------------------------------

#[test]
fn widened_denotation_is_hoisted_and_optimal() {
    let f = coerced("REAL x = 1");
    let decl = find_attr(&f, Attr::IdentityDecl)[0];
    let source = f.tree.sub(decl).unwrap();
    assert_eq!(f.tree.attr(source), Attr::RealDenotation(1.0));
    assert!(f.tree.node(source).status.contains(Status::OPTIMAL));
    assert_eq!(f.tree.moid(source), Some(Moid::REAL));
}

#[test]
fn widening_of_identifiers_stays_a_coercion() {
    let f = coerced("INT y = 1; REAL x = y");
    let widenings = find_attr(&f, Attr::Widening);
    assert_eq!(widenings.len(), 1);
    assert_eq!(f.tree.moid(widenings[0]), Some(Moid::REAL));
    let inner = f.tree.sub(widenings[0]).unwrap();
    assert_eq!(f.tree.attr(inner), Attr::Identifier);
}

#[test]
fn dereferencing_is_inserted_for_variable_reads() {
    let f = coerced("INT n := 1; INT m = n");
    let derefs = find_attr(&f, Attr::Dereferencing);
    assert_eq!(derefs.len(), 1);
    assert_eq!(f.tree.moid(derefs[0]), Some(Moid::INT));
}

#[test]
fn voiding_is_inserted_for_discarded_units() {
    let f = coerced("INT n := 1; n := 2; SKIP");
    let voidings = find_attr(&f, Attr::Voiding);
    assert!(!voidings.is_empty());
    for v in voidings {
        assert_eq!(f.tree.moid(v), Some(Moid::VOID));
    }
}

#[test]
fn print_argument_is_united_and_rowed() {
    let f = coerced("print(1 + 2)");
    let unitings = find_attr(&f, Attr::Uniting);
    assert_eq!(unitings.len(), 1);
    assert_eq!(f.tree.moid(unitings[0]), Some(Moid::SIMPLOUT));
    let rowings = find_attr(&f, Attr::Rowing);
    assert_eq!(rowings.len(), 1);
    assert_eq!(f.tree.moid(rowings[0]), Some(Moid::ROW_SIMPLOUT));
}

#[test]
fn post_insertion_modes_match_expectations() {
    // The P4 shape: a coerced child carries exactly the mode its parent
    // required.
    let f = coerced("INT y = 2; REAL x := y");
    let decl = find_attr(&f, Attr::VariableDecl)[0];
    let source = f.tree.sub(decl).unwrap();
    assert_eq!(f.tree.moid(source), Some(Moid::REAL));
}

#[test]
fn rerunning_the_inserter_is_a_no_op() {
    let mut f = coerced("INT n := 1; REAL x = n + 1; print(x)");
    let before = shape(&f.tree);
    coerce_program(
        &mut f.tree,
        &mut f.modes,
        &mut f.tables,
        &mut f.diags,
        &f.interner,
        f.root,
        false,
    );
    assert_eq!(before, shape(&f.tree), "second insertion changed the tree");
}

#[test]
fn hoist_is_idempotent() {
    let mut f = coerced("LONG INT n = 123; REAL x = 1; print(x)");
    let once = shape(&f.tree);
    hoist_denotations(&mut f.tree, &f.modes, &mut f.diags, false);
    assert_eq!(once, shape(&f.tree), "second hoist changed the tree");
}

#[test]
fn portcheck_warns_on_hoisted_widenings() {
    let mut f = checked("REAL x = 1");
    assert!(!f.diags.has_mode_errors());
    let warnings_before = f.diags.warning_count();
    coerce_program(
        &mut f.tree,
        &mut f.modes,
        &mut f.tables,
        &mut f.diags,
        &f.interner,
        f.root,
        true,
    );
    assert!(f.diags.warning_count() > warnings_before);
}
