//! The standard environ: built-in operators, constants, and simple
//! transput, declared into the root symbol table.
//!
//! Every standard tag carries an index into the [`StdFun`] table returned
//! by [`standard_environ`]; the interpreter dispatches on that.

use crate::intern::Interner;
use crate::modes::{Mode, ModeTable, Moid};
use crate::scope::{SymbolTables, TableId, TagKind};

/// Semantics of a standard-prelude tag. Numeric operators are shared
/// between all longnesses of a family; the operand values decide.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StdFun {
    // Identifiers
    Print,
    Read,
    Pi,
    Newline,
    Assert,
    Random,
    Sqrt,
    Exp,
    Ln,
    Sin,
    Cos,
    Tan,
    Arctan,
    // Monadic operators
    MonadPlus,
    MonadMinus,
    Abs,
    Sign,
    Odd,
    Entier,
    Round,
    Repr,
    Not,
    Re,
    Im,
    UpbMonadic,
    LwbMonadic,
    // Dyadic operators
    Add,
    Sub,
    Mul,
    DivReal,
    Over,
    ModOp,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Elem,
    IOp,
    Concat,
    Repeat,
    UpbDyadic,
    LwbDyadic,
    // Assigning operators
    PlusAb,
    MinusAb,
    TimesAb,
    DivAb,
    OverAb,
    ModAb,
    PlusAbString,
}

struct Env<'a> {
    interner: &'a mut Interner,
    modes: &'a mut ModeTable,
    tables: &'a mut SymbolTables,
    funs: Vec<StdFun>,
}

impl<'a> Env<'a> {
    fn ident(&mut self, name: &str, moid: Moid, fun: StdFun) {
        let sym = self.interner.intern(name);
        let tag = self
            .tables
            .add_tag(TableId::ROOT, sym, TagKind::Identifier, moid);
        self.tables.tag_mut(tag).std_index = Some(self.funs.len());
        self.funs.push(fun);
    }

    fn op(&mut self, name: &str, params: &[Moid], result: Moid, fun: StdFun) {
        let sym = self.interner.intern(name);
        let moid = self.modes.register(Mode::Proc {
            params: params.to_vec(),
            result,
        });
        let tag = self
            .tables
            .add_tag(TableId::ROOT, sym, TagKind::Operator, moid);
        self.tables.tag_mut(tag).std_index = Some(self.funs.len());
        self.funs.push(fun);
    }

    fn proc1(&mut self, name: &str, param: Moid, result: Moid, fun: StdFun) {
        let sym = self.interner.intern(name);
        let moid = self.modes.register(Mode::Proc {
            params: vec![param],
            result,
        });
        let tag = self
            .tables
            .add_tag(TableId::ROOT, sym, TagKind::Identifier, moid);
        self.tables.tag_mut(tag).std_index = Some(self.funs.len());
        self.funs.push(fun);
    }
}

/// Populate the root table; returns the implementation table for the
/// interpreter.
pub fn standard_environ(
    interner: &mut Interner,
    modes: &mut ModeTable,
    tables: &mut SymbolTables,
) -> Vec<StdFun> {
    let mut env = Env {
        interner,
        modes,
        tables,
        funs: Vec::new(),
    };
    let e = &mut env;

    let ints = [Moid::INT, Moid::LONG_INT, Moid::LONG_LONG_INT];
    let reals = [Moid::REAL, Moid::LONG_REAL, Moid::LONG_LONG_REAL];
    let compls = [Moid::COMPL, Moid::LONG_COMPL, Moid::LONG_LONG_COMPL];

    // Transput and standard procedures.
    e.proc1("print", Moid::ROW_SIMPLOUT, Moid::VOID, StdFun::Print);
    e.proc1("read", Moid::ROW_SIMPLIN, Moid::VOID, StdFun::Read);
    e.proc1("assert", Moid::BOOL, Moid::VOID, StdFun::Assert);
    e.ident("pi", Moid::REAL, StdFun::Pi);
    e.ident("newline", Moid::CHAR, StdFun::Newline);
    for (name, fun) in [
        ("sqrt", StdFun::Sqrt),
        ("exp", StdFun::Exp),
        ("ln", StdFun::Ln),
        ("sin", StdFun::Sin),
        ("cos", StdFun::Cos),
        ("tan", StdFun::Tan),
        ("arctan", StdFun::Arctan),
    ] {
        e.proc1(name, Moid::REAL, Moid::REAL, fun);
    }
    {
        let random = e.modes.register(Mode::Proc {
            params: vec![],
            result: Moid::REAL,
        });
        e.ident("random", random, StdFun::Random);
    }

    // Monadic arithmetic, narrowest modes first.
    for &m in ints.iter().chain(reals.iter()).chain(compls.iter()) {
        e.op("+", &[m], m, StdFun::MonadPlus);
        e.op("-", &[m], m, StdFun::MonadMinus);
    }
    for &m in ints.iter() {
        e.op("ABS", &[m], m, StdFun::Abs);
        e.op("SIGN", &[m], Moid::INT, StdFun::Sign);
        e.op("ODD", &[m], Moid::BOOL, StdFun::Odd);
    }
    for &m in reals.iter() {
        e.op("ABS", &[m], m, StdFun::Abs);
        e.op("SIGN", &[m], Moid::INT, StdFun::Sign);
    }
    for (&c, &r) in compls.iter().zip(reals.iter()) {
        e.op("ABS", &[c], r, StdFun::Abs);
        e.op("RE", &[c], r, StdFun::Re);
        e.op("IM", &[c], r, StdFun::Im);
    }
    e.op("ABS", &[Moid::BOOL], Moid::INT, StdFun::Abs);
    e.op("ABS", &[Moid::CHAR], Moid::INT, StdFun::Abs);
    e.op("ABS", &[Moid::BITS], Moid::INT, StdFun::Abs);
    e.op("ENTIER", &[Moid::REAL], Moid::INT, StdFun::Entier);
    e.op("ROUND", &[Moid::REAL], Moid::INT, StdFun::Round);
    e.op("REPR", &[Moid::INT], Moid::CHAR, StdFun::Repr);
    e.op("NOT", &[Moid::BOOL], Moid::BOOL, StdFun::Not);
    e.op("NOT", &[Moid::BITS], Moid::BITS, StdFun::Not);
    e.op("UPB", &[Moid::ROWS], Moid::INT, StdFun::UpbMonadic);
    e.op("LWB", &[Moid::ROWS], Moid::INT, StdFun::LwbMonadic);

    // Dyadic arithmetic.
    for &m in ints.iter() {
        e.op("+", &[m, m], m, StdFun::Add);
        e.op("-", &[m, m], m, StdFun::Sub);
        e.op("*", &[m, m], m, StdFun::Mul);
        e.op("/", &[m, m], Moid::REAL, StdFun::DivReal);
        e.op("%", &[m, m], m, StdFun::Over);
        e.op("OVER", &[m, m], m, StdFun::Over);
        e.op("%*", &[m, m], m, StdFun::ModOp);
        e.op("MOD", &[m, m], m, StdFun::ModOp);
        e.op("**", &[m, Moid::INT], m, StdFun::Pow);
    }
    for &m in reals.iter() {
        e.op("+", &[m, m], m, StdFun::Add);
        e.op("-", &[m, m], m, StdFun::Sub);
        e.op("*", &[m, m], m, StdFun::Mul);
        e.op("/", &[m, m], m, StdFun::DivReal);
        e.op("**", &[m, Moid::INT], m, StdFun::Pow);
    }
    for &m in compls.iter() {
        e.op("+", &[m, m], m, StdFun::Add);
        e.op("-", &[m, m], m, StdFun::Sub);
        e.op("*", &[m, m], m, StdFun::Mul);
        e.op("/", &[m, m], m, StdFun::DivReal);
    }
    for (&r, &c) in reals.iter().zip(compls.iter()) {
        e.op("I", &[r, r], c, StdFun::IOp);
    }
    e.op("I", &[Moid::INT, Moid::INT], Moid::COMPL, StdFun::IOp);

    // Comparison and equality.
    for &m in ints.iter().chain(reals.iter()) {
        for (name, fun) in [
            ("=", StdFun::Eq),
            ("/=", StdFun::Ne),
            ("<", StdFun::Lt),
            ("<=", StdFun::Le),
            (">", StdFun::Gt),
            (">=", StdFun::Ge),
        ] {
            e.op(name, &[m, m], Moid::BOOL, fun);
        }
    }
    for m in [Moid::CHAR, Moid::ROW_CHAR] {
        for (name, fun) in [
            ("=", StdFun::Eq),
            ("/=", StdFun::Ne),
            ("<", StdFun::Lt),
            ("<=", StdFun::Le),
            (">", StdFun::Gt),
            (">=", StdFun::Ge),
        ] {
            e.op(name, &[m, m], Moid::BOOL, fun);
        }
    }
    for m in [Moid::BOOL, Moid::BITS, Moid::COMPL] {
        e.op("=", &[m, m], Moid::BOOL, StdFun::Eq);
        e.op("/=", &[m, m], Moid::BOOL, StdFun::Ne);
    }

    // Boolean and bits logic.
    e.op("AND", &[Moid::BOOL, Moid::BOOL], Moid::BOOL, StdFun::And);
    e.op("&", &[Moid::BOOL, Moid::BOOL], Moid::BOOL, StdFun::And);
    e.op("OR", &[Moid::BOOL, Moid::BOOL], Moid::BOOL, StdFun::Or);
    e.op("AND", &[Moid::BITS, Moid::BITS], Moid::BITS, StdFun::And);
    e.op("OR", &[Moid::BITS, Moid::BITS], Moid::BITS, StdFun::Or);
    e.op("ELEM", &[Moid::INT, Moid::BITS], Moid::BOOL, StdFun::Elem);

    // Text joining and repetition.
    e.op("+", &[Moid::ROW_CHAR, Moid::ROW_CHAR], Moid::STRING, StdFun::Concat);
    e.op("+", &[Moid::ROW_CHAR, Moid::CHAR], Moid::STRING, StdFun::Concat);
    e.op("+", &[Moid::CHAR, Moid::ROW_CHAR], Moid::STRING, StdFun::Concat);
    e.op("+", &[Moid::CHAR, Moid::CHAR], Moid::STRING, StdFun::Concat);
    e.op("*", &[Moid::ROW_CHAR, Moid::INT], Moid::STRING, StdFun::Repeat);
    e.op("*", &[Moid::INT, Moid::ROW_CHAR], Moid::STRING, StdFun::Repeat);
    e.op("*", &[Moid::CHAR, Moid::INT], Moid::STRING, StdFun::Repeat);

    // Bounds interrogation.
    e.op("UPB", &[Moid::INT, Moid::ROWS], Moid::INT, StdFun::UpbDyadic);
    e.op("LWB", &[Moid::INT, Moid::ROWS], Moid::INT, StdFun::LwbDyadic);

    // Assigning operators.
    {
        let ref_int = e.modes.register(Mode::Ref(Moid::INT));
        let ref_real = e.modes.register(Mode::Ref(Moid::REAL));
        for (name, fun) in [
            ("+:=", StdFun::PlusAb),
            ("-:=", StdFun::MinusAb),
            ("*:=", StdFun::TimesAb),
        ] {
            e.op(name, &[ref_int, Moid::INT], ref_int, fun);
            e.op(name, &[ref_real, Moid::REAL], ref_real, fun);
        }
        e.op("%:=", &[ref_int, Moid::INT], ref_int, StdFun::OverAb);
        e.op("%*:=", &[ref_int, Moid::INT], ref_int, StdFun::ModAb);
        e.op("/:=", &[ref_real, Moid::REAL], ref_real, StdFun::DivAb);
        e.op(
            "+:=",
            &[Moid::REF_STRING, Moid::ROW_CHAR],
            Moid::REF_STRING,
            StdFun::PlusAbString,
        );
    }

    env.funs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declares_print_with_row_simplout_parameter() {
        let mut interner = Interner::new();
        let mut modes = ModeTable::new();
        let mut tables = SymbolTables::new();
        let funs = standard_environ(&mut interner, &mut modes, &mut tables);
        assert!(!funs.is_empty());
        let print = interner.lookup("print").expect("print interned");
        let tag = tables
            .lookup(TableId::ROOT, print, TagKind::Identifier)
            .expect("print declared");
        match modes.mode(tables.tag(tag).moid) {
            Mode::Proc { params, result } => {
                assert_eq!(params, &vec![Moid::ROW_SIMPLOUT]);
                assert_eq!(*result, Moid::VOID);
            }
            other => panic!("print is {:?}", other),
        }
        assert_eq!(funs[tables.tag(tag).std_index.unwrap()], StdFun::Print);
    }

    #[test]
    fn plus_has_int_and_string_overloads() {
        let mut interner = Interner::new();
        let mut modes = ModeTable::new();
        let mut tables = SymbolTables::new();
        let _ = standard_environ(&mut interner, &mut modes, &mut tables);
        let plus = interner.lookup("+").expect("+ interned");
        let ops = tables.operators(TableId::ROOT, plus);
        let mut has_int = false;
        let mut has_concat = false;
        for tag in ops {
            if let Mode::Proc { params, .. } = modes.mode(tables.tag(tag).moid) {
                if params.as_slice() == [Moid::INT, Moid::INT] {
                    has_int = true;
                }
                if params.as_slice() == [Moid::ROW_CHAR, Moid::ROW_CHAR] {
                    has_concat = true;
                }
            }
        }
        assert!(has_int, "dyadic + on INT missing");
        assert!(has_concat, "dyadic + on [] CHAR missing");
    }
}
