//! The mode checker: a top-down traversal assigning an inferred mode to
//! every producing construct.
//!
//! Each construct is checked against an expected [`Soid`]; the construct's
//! yield is written to its node and verified coercible to the expectation
//! under the regime the construct dictates. Failures produce mode errors
//! with an explanation that walks into series and stowed components.

pub mod coerce;

use crate::ast::{Attr, NodeId, Tree};
use crate::diag::Diagnostics;
use crate::intern::Interner;
use crate::modes::balance::balanced_mode;
use crate::modes::predicates::{
    coercible, depref_completely, depref_once, modes_equal, Regime, Sort,
};
use crate::modes::{Mode, ModeTable, Moid};
use crate::scope::{SymbolTables, TableId, TagKind};

/// Sort-mode pair describing an expectation or a yield. A `None` mode means
/// the context imposes no particular mode and the checker infers one.
#[derive(Clone, Copy, Debug)]
pub struct Soid {
    pub sort: Sort,
    pub moid: Option<Moid>,
    pub cast: bool,
}

impl Soid {
    pub fn new(sort: Sort, moid: Option<Moid>) -> Self {
        Soid {
            sort,
            moid,
            cast: false,
        }
    }

    pub fn strong(moid: Moid) -> Self {
        Soid::new(Sort::Strong, Some(moid))
    }
}

pub struct Checker<'a> {
    pub tree: &'a mut Tree,
    pub modes: &'a mut ModeTable,
    pub tables: &'a mut SymbolTables,
    pub diags: &'a mut Diagnostics,
    pub interner: &'a Interner,
}

/// Check a parsed program. The particular program is a void-strong
/// enclosed clause.
pub fn check_program(
    tree: &mut Tree,
    modes: &mut ModeTable,
    tables: &mut SymbolTables,
    diags: &mut Diagnostics,
    interner: &Interner,
    root: NodeId,
) {
    let mut checker = Checker {
        tree,
        modes,
        tables,
        diags,
        interner,
    };
    if let Some(body) = checker.tree.sub(root) {
        checker.check(body, Soid::strong(Moid::VOID), Regime::Safe);
    }
}

impl<'a> Checker<'a> {
    /// Check `n` against expectation `x` under `regime`; annotate the node
    /// with its yield, verify coercibility, and return the yielded soid.
    pub fn check(&mut self, n: NodeId, x: Soid, regime: Regime) -> Soid {
        let yielded = self.check_inner(n, x, regime);
        let mut moid = yielded.moid.unwrap_or(Moid::ERROR);
        if let Some(q) = x.moid {
            if !coercible(self.modes, moid, q, x.sort, regime) {
                let message = self.explain_failure(moid, q, x.sort);
                let span = self.tree.node(n).span;
                self.diags.mode_error(span, message);
                // Parents short-circuit on the ill mode, so one mistake
                // is reported once.
                moid = Moid::ERROR;
            }
        }
        self.tree.node_mut(n).moid = Some(moid);
        Soid {
            sort: yielded.sort,
            moid: Some(moid),
            cast: yielded.cast,
        }
    }

    fn yield_moid(&self, sort: Sort, moid: Moid) -> Soid {
        Soid::new(sort, Some(moid))
    }

    fn check_inner(&mut self, n: NodeId, x: Soid, regime: Regime) -> Soid {
        let attr = self.tree.attr(n);
        match attr {
            Attr::SerialClause => self.check_serial(n, x, regime),
            Attr::ClosedClause => {
                let body = self.tree.sub(n).expect("closed clause has a body");
                self.check(body, x, regime)
            }
            Attr::CollateralClause => self.check_collateral(n, x, regime),
            Attr::ParallelClause => self.check_parallel(n, x),
            Attr::ConditionalClause => self.check_conditional(n, x),
            Attr::CaseClause => self.check_case(n, x),
            Attr::ConformityClause => self.check_conformity(n, x),
            Attr::LoopClause => self.check_loop(n, x),
            Attr::IdentityDecl => self.check_identity_decl(n),
            Attr::VariableDecl => self.check_variable_decl(n),
            Attr::OperatorDecl => self.check_operator_decl(n),
            Attr::ModeDecl | Attr::PrioDecl => self.yield_moid(x.sort, Moid::VOID),
            Attr::Assignation => self.check_assignation(n, x),
            Attr::IdentityRelation { .. } => self.check_identity_relation(n, x),
            Attr::Cast => self.check_cast(n, x),
            Attr::Call => self.check_call(n, x),
            Attr::Slice => self.check_slice(n, x),
            Attr::Selection => self.check_selection(n, x),
            Attr::MonadicFormula => self.check_monadic(n, x),
            Attr::DyadicFormula => self.check_dyadic(n, x),
            Attr::Identifier => self.check_identifier(n, x),
            Attr::Jump => self.check_jump(n, x),
            Attr::SkipSymbol => self.yield_moid(x.sort, Moid::HIP),
            Attr::NihilSymbol => self.check_nihil(n, x),
            Attr::Generator { .. } => self.check_generator(n, x),
            Attr::RoutineText => self.check_routine_text(n, x),
            Attr::IntDenotation(_)
            | Attr::RealDenotation(_)
            | Attr::BoolDenotation(_)
            | Attr::BitsDenotation(_)
            | Attr::CharDenotation(_)
            | Attr::EmptyDenotation => {
                let m = self.tree.moid(n).unwrap_or(Moid::ERROR);
                self.yield_moid(x.sort, m)
            }
            Attr::StringDenotation(sym) => {
                // A one-character string denotation is a character
                // denotation in a CHAR context.
                let text_len = self.interner.resolve(sym).chars().count();
                let wants_char = x
                    .moid
                    .map(|q| depref_completely(self.modes, q) == Moid::CHAR)
                    .unwrap_or(false);
                let m = if text_len == 1 && wants_char {
                    Moid::CHAR
                } else {
                    self.tree.moid(n).unwrap_or(Moid::ROW_CHAR)
                };
                self.yield_moid(x.sort, m)
            }
            // Coercion wrappers appear only when re-checking a coerced
            // tree; their mode is already final.
            _ if attr.is_coercion() => {
                let m = self.tree.moid(n).unwrap_or(Moid::ERROR);
                self.yield_moid(x.sort, m)
            }
            other => {
                let span = self.tree.node(n).span;
                self.diags
                    .mode_error(span, format!("construct {:?} cannot yield a value", other));
                self.yield_moid(x.sort, Moid::ERROR)
            }
        }
    }

    // ------------------------------------------------------------------
    // Clauses
    // ------------------------------------------------------------------

    fn is_declaration(attr: Attr) -> bool {
        matches!(
            attr,
            Attr::ModeDecl
                | Attr::PrioDecl
                | Attr::IdentityDecl
                | Attr::VariableDecl
                | Attr::OperatorDecl
        )
    }

    fn check_serial(&mut self, n: NodeId, x: Soid, regime: Regime) -> Soid {
        let phrases = self.tree.children(n);
        let last_unit = phrases
            .iter()
            .rposition(|&p| !Self::is_declaration(self.tree.attr(p)));
        if let (Some(last), Some(q)) = (last_unit, x.moid) {
            if q != Moid::VOID && last != phrases.len() - 1 {
                let span = self.tree.node(n).span;
                self.diags.mode_error(
                    span,
                    "a clause yielding a value must end with a unit, not a declaration",
                );
            }
        }
        let mut yielded = None;
        for (i, &p) in phrases.iter().enumerate() {
            if Self::is_declaration(self.tree.attr(p)) {
                self.check(p, Soid::strong(Moid::VOID), Regime::Safe);
            } else if Some(i) == last_unit {
                yielded = Some(self.check(p, x, regime));
            } else {
                let y = self.check(p, Soid::strong(Moid::VOID), Regime::Safe);
                self.warn_voided(p, y);
            }
        }
        match yielded {
            Some(y) => y,
            None => {
                // No yielding unit: fine in a void context, an error where a
                // value is required.
                if let Some(q) = x.moid {
                    if q != Moid::VOID {
                        let span = self.tree.node(n).span;
                        self.diags
                            .mode_error(span, "clause yields no value: no unique mode");
                    }
                }
                self.yield_moid(x.sort, Moid::VOID)
            }
        }
    }

    /// Dubious but legal: a voided value from a pure producer.
    fn warn_voided(&mut self, p: NodeId, y: Soid) {
        if y.cast {
            return;
        }
        let m = match y.moid {
            Some(m) => m,
            None => return,
        };
        if m == Moid::VOID || m == Moid::HIP {
            return;
        }
        let base = self.tree.attr(p);
        if matches!(
            base,
            Attr::MonadicFormula
                | Attr::DyadicFormula
                | Attr::Identifier
                | Attr::Slice
                | Attr::Selection
        ) || base.is_denotation()
        {
            let span = self.tree.node(p).span;
            let rendered = self.modes.render(m, self.interner);
            self.diags
                .warning(span, format!("value of mode {} is voided", rendered));
        }
    }

    fn check_collateral(&mut self, n: NodeId, x: Soid, regime: Regime) -> Soid {
        let units = self.tree.children(n);
        if units.is_empty() {
            return self.yield_moid(x.sort, Moid::VACUUM);
        }
        match x.moid {
            Some(q) => {
                let dq = self.modes.deflexed(q);
                match self.modes.mode(dq).clone() {
                    Mode::Row { .. } => {
                        let elem = self.modes.slice_of(dq).unwrap_or(Moid::ERROR);
                        let mut yields = Vec::new();
                        for &u in &units {
                            let y = self.check(u, Soid::strong(elem), regime);
                            yields.push(y.moid.unwrap_or(Moid::ERROR));
                        }
                        let pack = yields
                            .iter()
                            .map(|&m| crate::modes::Field::plain(m))
                            .collect();
                        let stowed = self.modes.register(Mode::Stowed(pack));
                        self.yield_moid(x.sort, stowed)
                    }
                    Mode::Struct(pack) => {
                        if pack.len() != units.len() {
                            let span = self.tree.node(n).span;
                            let rendered = self.modes.render(q, self.interner);
                            self.diags.mode_error(
                                span,
                                format!(
                                    "display of {} units cannot yield {} of {} fields",
                                    units.len(),
                                    rendered,
                                    pack.len()
                                ),
                            );
                            return self.yield_moid(x.sort, Moid::ERROR);
                        }
                        let mut yields = Vec::new();
                        for (&u, f) in units.iter().zip(pack.iter()) {
                            let y = self.check(u, Soid::strong(f.moid), regime);
                            yields.push(y.moid.unwrap_or(Moid::ERROR));
                        }
                        let pack = yields
                            .iter()
                            .map(|&m| crate::modes::Field::plain(m))
                            .collect();
                        let stowed = self.modes.register(Mode::Stowed(pack));
                        self.yield_moid(x.sort, stowed)
                    }
                    _ if q == Moid::VOID => {
                        for &u in &units {
                            self.check(u, Soid::strong(Moid::VOID), regime);
                        }
                        self.yield_moid(x.sort, Moid::VOID)
                    }
                    _ => {
                        // Let the outer coercibility check report this.
                        self.infer_stowed(n, &units, x)
                    }
                }
            }
            None => self.infer_stowed(n, &units, x),
        }
    }

    fn infer_stowed(&mut self, _n: NodeId, units: &[NodeId], x: Soid) -> Soid {
        let mut yields = Vec::new();
        for &u in units {
            let y = self.check(u, Soid::new(Sort::Strong, None), Regime::Safe);
            yields.push(y.moid.unwrap_or(Moid::ERROR));
        }
        let pack = yields
            .iter()
            .map(|&m| crate::modes::Field::plain(m))
            .collect();
        let stowed = self.modes.register(Mode::Stowed(pack));
        self.yield_moid(x.sort, stowed)
    }

    fn check_parallel(&mut self, n: NodeId, x: Soid) -> Soid {
        for u in self.tree.children(n) {
            self.check(u, Soid::strong(Moid::VOID), Regime::Safe);
        }
        self.yield_moid(x.sort, Moid::VOID)
    }

    fn check_enquiry(&mut self, n: NodeId, moid: Option<Moid>) -> Soid {
        let serial = self.tree.sub(n).expect("enquiry has a clause");
        self.check(serial, Soid::new(Sort::Strong, moid), Regime::Safe)
    }

    /// Check each branch against the expectation, or balance the collected
    /// yields when the context imposes no mode.
    fn balance_parts(&mut self, parts: &[NodeId], x: Soid) -> Soid {
        let mut yields = Vec::new();
        for &part in parts {
            let body = self.tree.sub(part).expect("choice part has a body");
            let y = self.check(body, x, Regime::Safe);
            self.tree.node_mut(part).moid = y.moid;
            yields.push(y.moid.unwrap_or(Moid::ERROR));
        }
        match x.moid {
            Some(q) => self.yield_moid(x.sort, q),
            None => {
                let series = self.modes.make_series(&yields);
                let balanced = balanced_mode(self.modes, series, x.sort, Regime::Safe);
                self.yield_moid(x.sort, balanced)
            }
        }
    }

    fn check_conditional(&mut self, n: NodeId, x: Soid) -> Soid {
        let children = self.tree.children(n);
        let enquiry = children[0];
        self.check_enquiry(enquiry, Some(Moid::BOOL));
        let parts: Vec<NodeId> = children[1..].to_vec();
        let has_else = parts
            .iter()
            .any(|&p| self.tree.attr(p) == Attr::ElsePart);
        if !has_else {
            if let Some(q) = x.moid {
                if q != Moid::VOID {
                    let span = self.tree.node(n).span;
                    let rendered = self.modes.render(q, self.interner);
                    self.diags.mode_error(
                        span,
                        format!("conditional without an ELSE part cannot yield {}", rendered),
                    );
                }
            }
        }
        self.balance_parts(&parts, x)
    }

    fn check_case(&mut self, n: NodeId, x: Soid) -> Soid {
        let children = self.tree.children(n);
        self.check_enquiry(children[0], Some(Moid::INT));
        let parts: Vec<NodeId> = children[1..].to_vec();
        let has_out = parts.iter().any(|&p| self.tree.attr(p) == Attr::OutPart);
        if !has_out {
            if let Some(q) = x.moid {
                if q != Moid::VOID {
                    let span = self.tree.node(n).span;
                    let rendered = self.modes.render(q, self.interner);
                    self.diags.mode_error(
                        span,
                        format!("case clause without an OUT part cannot yield {}", rendered),
                    );
                }
            }
        }
        self.balance_parts(&parts, x)
    }

    fn check_conformity(&mut self, n: NodeId, x: Soid) -> Soid {
        let children = self.tree.children(n);
        let enquiry_yield = self.check_enquiry(children[0], None);
        let e = enquiry_yield.moid.unwrap_or(Moid::ERROR);
        // The set of specifier modes, united.
        let specs: Vec<Moid> = children[1..]
            .iter()
            .filter(|&&c| self.tree.attr(c) == Attr::ConformityAlternative)
            .map(|&c| self.tree.moid(c).unwrap_or(Moid::ERROR))
            .collect();
        let spec_pack = self.modes.absorb_union_pack(&specs);
        let spec_pack = self.modes.contract_union(spec_pack);
        let spec_union = if spec_pack.len() == 1 {
            spec_pack[0].moid
        } else {
            self.modes.register(Mode::Union(spec_pack))
        };
        // Mutual firm relations between the enquiry mode and the united
        // specifiers decide the dispatch mode.
        let eu = depref_completely(self.modes, e);
        let forward = coercible(self.modes, eu, spec_union, Sort::Firm, Regime::Safe);
        let backward = coercible(self.modes, spec_union, eu, Sort::Firm, Regime::Safe);
        let dispatch = if forward && backward {
            eu
        } else if forward {
            spec_union
        } else if backward {
            eu
        } else {
            // Neither direction: the coercer resolves or the outer check
            // reports.
            spec_union
        };
        self.tree.node_mut(children[0]).moid = Some(dispatch);
        if !matches!(self.modes.mode(eu), Mode::Union(_)) {
            let span = self.tree.node(children[0]).span;
            let rendered = self.modes.render(e, self.interner);
            self.diags.mode_error(
                span,
                format!("conformity enquiry of mode {} is not a united value", rendered),
            );
        } else {
            // Every specifier should be able to match.
            for &c in children[1..].iter() {
                if self.tree.attr(c) != Attr::ConformityAlternative {
                    continue;
                }
                let s = self.tree.moid(c).unwrap_or(Moid::ERROR);
                let fits = crate::modes::predicates::unitable(self.modes, s, eu, Regime::Safe)
                    || modes_equal(self.modes, s, eu, Regime::Safe);
                if !fits && self.modes.is_well(s) {
                    let span = self.tree.node(c).span;
                    let rs = self.modes.render(s, self.interner);
                    let re = self.modes.render(eu, self.interner);
                    self.diags.mode_error(
                        span,
                        format!("specifier {} can never conform to {}", rs, re),
                    );
                }
            }
        }
        let parts: Vec<NodeId> = children[1..].to_vec();
        self.balance_parts(&parts, x)
    }

    fn check_loop(&mut self, n: NodeId, x: Soid) -> Soid {
        for part in self.tree.children(n) {
            match self.tree.attr(part) {
                Attr::ForPart => {}
                Attr::FromPart | Attr::ByPart | Attr::ToPart => {
                    let u = self.tree.sub(part).expect("loop part has a unit");
                    self.check(u, Soid::strong(Moid::INT), Regime::Safe);
                }
                Attr::WhilePart | Attr::UntilPart => {
                    let serial = self.tree.sub(part).expect("loop part has a clause");
                    self.check(serial, Soid::strong(Moid::BOOL), Regime::Safe);
                }
                Attr::DoPart => {
                    let serial = self.tree.sub(part).expect("loop body");
                    self.check(serial, Soid::strong(Moid::VOID), Regime::Safe);
                }
                _ => {}
            }
        }
        self.yield_moid(x.sort, Moid::VOID)
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn check_identity_decl(&mut self, n: NodeId) -> Soid {
        let declared = self.tree.moid(n).expect("identity declaration carries a mode");
        let source = self.tree.sub(n).expect("identity declaration has a source");
        self.check(source, Soid::strong(declared), Regime::Safe);
        self.yield_moid(Sort::Strong, Moid::VOID)
    }

    fn check_variable_decl(&mut self, n: NodeId) -> Soid {
        let name_moid = self.tree.moid(n).expect("variable declaration carries a mode");
        let target = match self.modes.mode(name_moid) {
            Mode::Ref(inner) => *inner,
            _ => Moid::ERROR,
        };
        for c in self.tree.children(n) {
            match self.tree.attr(c) {
                Attr::BoundsPart => self.check_bounds(c),
                _ => {
                    self.warn_unintended_generator(c);
                    self.check(c, Soid::strong(target), Regime::Force);
                }
            }
        }
        self.yield_moid(Sort::Strong, Moid::VOID)
    }

    /// `REF INT i := LOC INT := 0` almost always means something else.
    fn warn_unintended_generator(&mut self, source: NodeId) {
        if self.tree.attr(source) != Attr::Assignation {
            return;
        }
        let dest = self.tree.sub(source);
        if let Some(dest) = dest {
            if matches!(self.tree.attr(dest), Attr::Generator { .. }) {
                let span = self.tree.node(source).span;
                self.diags.warning(
                    span,
                    "assignment to a generator in a declaration is probably unintended",
                );
            }
        }
    }

    fn check_bounds(&mut self, bounds: NodeId) {
        for pair in self.tree.children(bounds) {
            for bound in self.tree.children(pair) {
                self.check(bound, Soid::strong(Moid::INT), Regime::Safe);
            }
        }
    }

    fn check_operator_decl(&mut self, n: NodeId) -> Soid {
        let declared = self.tree.moid(n).expect("operator declaration carries a mode");
        let body = self.tree.sub(n).expect("operator declaration has a body");
        if self.tree.attr(body) == Attr::RoutineText {
            let routine = self.tree.moid(body).unwrap_or(Moid::ERROR);
            if !self.modes.modes_equivalent(declared, routine) {
                let span = self.tree.node(n).span;
                let rd = self.modes.render(declared, self.interner);
                let rr = self.modes.render(routine, self.interner);
                self.diags.mode_error(
                    span,
                    format!("operator is declared {} but its routine is {}", rd, rr),
                );
            }
        }
        self.check(body, Soid::strong(declared), Regime::Safe);
        self.yield_moid(Sort::Strong, Moid::VOID)
    }

    fn check_routine_text(&mut self, n: NodeId, x: Soid) -> Soid {
        let moid = self.tree.moid(n).expect("routine text carries its mode");
        let result = match self.modes.mode(moid) {
            Mode::Proc { result, .. } => *result,
            _ => Moid::ERROR,
        };
        let body = self.tree.sub(n).expect("routine text has a body");
        self.check(body, Soid::strong(result), Regime::Force);
        self.yield_moid(x.sort, moid)
    }

    // ------------------------------------------------------------------
    // Units
    // ------------------------------------------------------------------

    fn check_identifier(&mut self, n: NodeId, x: Soid) -> Soid {
        let sym = self.tree.node(n).symbol;
        let table = self.tree.node(n).table.unwrap_or(TableId::ROOT);
        match self.tables.lookup(table, sym, TagKind::Identifier) {
            Some(tag) => {
                self.tree.node_mut(n).tag = Some(tag);
                self.yield_moid(x.sort, self.tables.tag(tag).moid)
            }
            None => {
                let span = self.tree.node(n).span;
                self.diags.mode_error(
                    span,
                    format!("{} has not been declared", self.interner.resolve(sym)),
                );
                self.yield_moid(x.sort, Moid::ERROR)
            }
        }
    }

    fn check_jump(&mut self, n: NodeId, x: Soid) -> Soid {
        let sym = self.tree.node(n).symbol;
        let table = self.tree.node(n).table.unwrap_or(TableId::ROOT);
        match self.tables.lookup(table, sym, TagKind::Label) {
            Some(tag) => {
                self.tree.node_mut(n).tag = Some(tag);
            }
            None => {
                let span = self.tree.node(n).span;
                self.diags.mode_error(
                    span,
                    format!("label {} is not in reach", self.interner.resolve(sym)),
                );
            }
        }
        self.yield_moid(x.sort, Moid::HIP)
    }

    fn check_nihil(&mut self, n: NodeId, x: Soid) -> Soid {
        if let Some(q) = x.moid {
            let ok = matches!(self.modes.mode(q), Mode::Ref(_))
                || q == Moid::VOID
                || !self.modes.is_well(q);
            let union_of_names = match self.modes.mode(q) {
                Mode::Union(pack) => pack
                    .iter()
                    .any(|f| matches!(self.modes.mode(f.moid), Mode::Ref(_))),
                _ => false,
            };
            if !(ok || union_of_names) {
                let span = self.tree.node(n).span;
                let rendered = self.modes.render(q, self.interner);
                self.diags.mode_error(
                    span,
                    format!("NIL requires a name context, not {}", rendered),
                );
            }
        }
        self.yield_moid(x.sort, Moid::HIP)
    }

    fn check_generator(&mut self, n: NodeId, x: Soid) -> Soid {
        let moid = self.tree.moid(n).expect("generator carries its mode");
        for c in self.tree.children(n) {
            if self.tree.attr(c) == Attr::BoundsPart {
                self.check_bounds(c);
            }
        }
        self.yield_moid(x.sort, moid)
    }

    fn check_cast(&mut self, n: NodeId, x: Soid) -> Soid {
        let declared = self.tree.moid(n).expect("cast carries its mode");
        let enclosed = self.tree.sub(n).expect("cast has an enclosed clause");
        self.check(enclosed, Soid::strong(declared), Regime::Safe);
        let mut y = self.yield_moid(x.sort, declared);
        y.cast = true;
        y
    }

    fn check_assignation(&mut self, n: NodeId, x: Soid) -> Soid {
        let children = self.tree.children(n);
        let (dest, source) = (children[0], children[1]);
        let d = self
            .check(dest, Soid::new(Sort::Soft, None), Regime::Safe)
            .moid
            .unwrap_or(Moid::ERROR);
        let name = soft_depref_to_name(self.modes, d);
        match name {
            Some(name_moid) => {
                let inner = match self.modes.mode(name_moid) {
                    Mode::Ref(inner) => *inner,
                    _ => Moid::ERROR,
                };
                self.check(source, Soid::strong(inner), Regime::Force);
                self.yield_moid(x.sort, name_moid)
            }
            None => {
                if self.modes.is_well(d) {
                    let span = self.tree.node(dest).span;
                    let rendered = self.modes.render(d, self.interner);
                    self.diags.mode_error(
                        span,
                        format!("destination of mode {} is not a name", rendered),
                    );
                }
                // Still check the source so its errors surface.
                self.check(source, Soid::new(Sort::Strong, None), Regime::Force);
                self.yield_moid(x.sort, Moid::ERROR)
            }
        }
    }

    fn check_identity_relation(&mut self, n: NodeId, x: Soid) -> Soid {
        let children = self.tree.children(n);
        let (lhs, rhs) = (children[0], children[1]);
        let l = self
            .check(lhs, Soid::new(Sort::Soft, None), Regime::Safe)
            .moid
            .unwrap_or(Moid::ERROR);
        let r = self
            .check(rhs, Soid::new(Sort::Soft, None), Regime::Safe)
            .moid
            .unwrap_or(Moid::ERROR);
        let ln = soft_depref_to_name(self.modes, l);
        let rn = soft_depref_to_name(self.modes, r);
        match (ln, rn, l == Moid::HIP, r == Moid::HIP) {
            (_, _, true, true) => {
                let span = self.tree.node(n).span;
                self.diags
                    .mode_error(span, "an identity relation needs at least one name");
            }
            (Some(a), Some(b), _, _) => {
                let balanced = modes_equal(self.modes, a, b, Regime::Safe)
                    || coercible(self.modes, a, b, Sort::Strong, Regime::Safe)
                    || coercible(self.modes, b, a, Sort::Strong, Regime::Safe);
                if !balanced && self.modes.is_well(a) && self.modes.is_well(b) {
                    let span = self.tree.node(n).span;
                    let ra = self.modes.render(a, self.interner);
                    let rb = self.modes.render(b, self.interner);
                    self.diags.mode_error(
                        span,
                        format!("cannot relate names of modes {} and {}", ra, rb),
                    );
                }
            }
            (Some(_), None, _, true) | (None, Some(_), true, _) => {}
            (a, b, _, _) => {
                let bad = if a.is_none() { lhs } else { rhs };
                let m = if a.is_none() { l } else { r };
                if self.modes.is_well(m) {
                    let span = self.tree.node(bad).span;
                    let rendered = self.modes.render(m, self.interner);
                    self.diags.mode_error(
                        span,
                        format!("identity relation operand of mode {} is not a name", rendered),
                    );
                }
            }
        }
        self.yield_moid(x.sort, Moid::BOOL)
    }

    fn check_call(&mut self, n: NodeId, x: Soid) -> Soid {
        let children = self.tree.children(n);
        let primary = children[0];
        let p = self
            .check(primary, Soid::new(Sort::Weak, None), Regime::Safe)
            .moid
            .unwrap_or(Moid::ERROR);
        // Peel to the routine mode.
        let mut m = p;
        let (params, result) = loop {
            match self.modes.mode(m).clone() {
                Mode::Proc { params, result } if !params.is_empty() => break (params, result),
                _ => match depref_once(self.modes, m) {
                    Some(next) => m = next,
                    None => {
                        if self.modes.is_well(p) {
                            let span = self.tree.node(primary).span;
                            let rendered = self.modes.render(p, self.interner);
                            self.diags.mode_error(
                                span,
                                format!("{} cannot be called", rendered),
                            );
                        }
                        return self.yield_moid(x.sort, Moid::ERROR);
                    }
                },
            }
        };
        let args = &children[1..];
        if args.len() != params.len() {
            let span = self.tree.node(n).span;
            self.diags.mode_error(
                span,
                format!(
                    "routine of {} parameters called with {} arguments",
                    params.len(),
                    args.len()
                ),
            );
            return self.yield_moid(x.sort, Moid::ERROR);
        }
        // Trimmed slots build the partial-parameterization modes.
        let mut missing: Vec<Moid> = Vec::new();
        for (&arg, &param) in args.iter().zip(params.iter()) {
            if self.tree.attr(arg) == Attr::EmptyArgument {
                self.tree.node_mut(arg).moid = Some(param);
                missing.push(param);
            } else {
                self.check(arg, Soid::strong(param), Regime::Alias);
            }
        }
        if missing.is_empty() {
            self.yield_moid(x.sort, result)
        } else {
            let partial_proc = self.modes.register(Mode::Proc {
                params: missing,
                result,
            });
            self.yield_moid(x.sort, partial_proc)
        }
    }

    fn check_slice(&mut self, n: NodeId, x: Soid) -> Soid {
        let children = self.tree.children(n);
        let primary = children[0];
        let p = self
            .check(primary, Soid::new(Sort::Weak, None), Regime::Safe)
            .moid
            .unwrap_or(Moid::ERROR);
        // Weakly peel, stopping at a name of a rows mode.
        let mut m = p;
        let (row, named) = loop {
            let cur = self.modes.mode(m).clone();
            match cur {
                Mode::Ref(inner) => {
                    let di = self.modes.deflexed(inner);
                    if matches!(self.modes.mode(di), Mode::Row { .. }) {
                        break (inner, true);
                    }
                    m = inner;
                }
                Mode::Proc { ref params, result } if params.is_empty() => m = result,
                Mode::Row { .. } | Mode::Flex(_) => break (m, false),
                _ => {
                    if self.modes.is_well(p) {
                        let span = self.tree.node(primary).span;
                        let rendered = self.modes.render(p, self.interner);
                        self.diags
                            .mode_error(span, format!("{} cannot be subscripted", rendered));
                    }
                    return self.yield_moid(x.sort, Moid::ERROR);
                }
            }
        };
        let drow = self.modes.deflexed(row);
        let (dim, elem) = match self.modes.mode(drow) {
            Mode::Row { dim, elem } => (*dim, *elem),
            _ => (1, Moid::ERROR),
        };
        let indexers = &children[1..];
        if indexers.len() != dim as usize {
            let span = self.tree.node(n).span;
            self.diags.mode_error(
                span,
                format!(
                    "row of {} dimensions subscripted with {} indexers",
                    dim,
                    indexers.len()
                ),
            );
            return self.yield_moid(x.sort, Moid::ERROR);
        }
        let mut trims = 0u32;
        for &ix in indexers {
            if self.tree.attr(ix) == Attr::Trimmer {
                trims += 1;
                for part in self.tree.children(ix) {
                    if let Some(bound) = self.tree.sub(part) {
                        self.check(bound, Soid::strong(Moid::INT), Regime::Safe);
                    }
                }
            } else {
                self.check(ix, Soid::strong(Moid::INT), Regime::Safe);
            }
        }
        let sliced = if trims == 0 {
            elem
        } else {
            self.modes.register(Mode::Row { dim: trims, elem })
        };
        let yielded = if named {
            self.modes.register(Mode::Ref(sliced))
        } else {
            sliced
        };
        self.yield_moid(x.sort, yielded)
    }

    fn check_selection(&mut self, n: NodeId, x: Soid) -> Soid {
        let sym = self.tree.node(n).symbol;
        let secondary = self.tree.sub(n).expect("selection has a secondary");
        let p = self
            .check(secondary, Soid::new(Sort::Weak, None), Regime::Safe)
            .moid
            .unwrap_or(Moid::ERROR);
        // Peel procedures, and names down to the last one.
        let mut m = p;
        let (st, named) = loop {
            match self.modes.mode(m).clone() {
                Mode::Proc { ref params, result } if params.is_empty() => m = result,
                Mode::Ref(inner) => {
                    if matches!(self.modes.mode(inner), Mode::Ref(_))
                        || matches!(
                            self.modes.mode(inner),
                            Mode::Proc { ref params, .. } if params.is_empty()
                        )
                    {
                        m = inner;
                    } else {
                        break (inner, true);
                    }
                }
                _ => break (m, false),
            }
        };
        // The multiple mode of a row of structs selects a row of fields.
        let (fields, row_dim) = match self.modes.mode(st).clone() {
            Mode::Struct(pack) => (pack, None),
            Mode::Row { dim, elem } => match self.modes.mode(elem).clone() {
                Mode::Struct(pack) => (pack, Some(dim)),
                _ => (Vec::new(), None),
            },
            Mode::Flex(row) => match self.modes.mode(row).clone() {
                Mode::Row { dim, elem } => match self.modes.mode(elem).clone() {
                    Mode::Struct(pack) => (pack, Some(dim)),
                    _ => (Vec::new(), None),
                },
                _ => (Vec::new(), None),
            },
            _ => (Vec::new(), None),
        };
        if fields.is_empty() {
            if self.modes.is_well(p) {
                let span = self.tree.node(n).span;
                let rendered = self.modes.render(p, self.interner);
                self.diags.mode_error(
                    span,
                    format!("cannot select {} from {}", self.interner.resolve(sym), rendered),
                );
            }
            return self.yield_moid(x.sort, Moid::ERROR);
        }
        let field = fields.iter().find(|f| f.label == Some(sym));
        match field {
            Some(f) => {
                let mut selected = f.moid;
                if let Some(dim) = row_dim {
                    selected = self.modes.register(Mode::Row { dim, elem: selected });
                }
                let yielded = if named {
                    self.modes.register(Mode::Ref(selected))
                } else {
                    selected
                };
                self.yield_moid(x.sort, yielded)
            }
            None => {
                let span = self.tree.node(n).span;
                let rendered = self.modes.render(st, self.interner);
                self.diags.mode_error(
                    span,
                    format!("{} has no field {}", rendered, self.interner.resolve(sym)),
                );
                self.yield_moid(x.sort, Moid::ERROR)
            }
        }
    }

    // ------------------------------------------------------------------
    // Formulas
    // ------------------------------------------------------------------

    /// Operator spelling for diagnostics: bold operators read as words,
    /// worthy-character marks get quotes.
    fn operator_name(&self, sym: crate::intern::Symbol) -> String {
        let text = self.interner.resolve(sym);
        if self.interner.is_bold(sym) {
            text.to_string()
        } else {
            format!("\"{}\"", text)
        }
    }

    fn check_monadic(&mut self, n: NodeId, x: Soid) -> Soid {
        let operand = self.tree.sub(n).expect("monadic formula has an operand");
        let u = self
            .check(operand, Soid::new(Sort::Firm, None), Regime::Safe)
            .moid
            .unwrap_or(Moid::ERROR);
        if !self.modes.is_well(u) {
            return self.yield_moid(x.sort, Moid::ERROR);
        }
        let sym = self.tree.node(n).symbol;
        let table = self.tree.node(n).table.unwrap_or(TableId::ROOT);
        match self.find_operator(table, sym, &[u], Sort::Firm) {
            Some((tag, result)) => {
                self.tree.node_mut(n).tag = Some(tag);
                self.yield_moid(x.sort, result)
            }
            None => {
                let span = self.tree.node(n).span;
                let ru = self.modes.render(u, self.interner);
                let op = self.operator_name(sym);
                self.diags.mode_error(
                    span,
                    format!("no monadic operator {} for operand of mode {}", op, ru),
                );
                self.yield_moid(x.sort, Moid::ERROR)
            }
        }
    }

    fn check_dyadic(&mut self, n: NodeId, x: Soid) -> Soid {
        let children = self.tree.children(n);
        let (lhs, rhs) = (children[0], children[1]);
        let u = self
            .check(lhs, Soid::new(Sort::Firm, None), Regime::Safe)
            .moid
            .unwrap_or(Moid::ERROR);
        let v = self
            .check(rhs, Soid::new(Sort::Firm, None), Regime::Safe)
            .moid
            .unwrap_or(Moid::ERROR);
        if !self.modes.is_well(u) || !self.modes.is_well(v) {
            return self.yield_moid(x.sort, Moid::ERROR);
        }
        let sym = self.tree.node(n).symbol;
        let table = self.tree.node(n).table.unwrap_or(TableId::ROOT);
        // Firm search first; then the standard environ again with strong
        // operand coercions, which is what lets REF REAL +:= INT resolve.
        let found = self
            .find_operator(table, sym, &[u, v], Sort::Firm)
            .or_else(|| self.find_operator(TableId::ROOT, sym, &[u, v], Sort::Strong));
        match found {
            Some((tag, result)) => {
                self.tree.node_mut(n).tag = Some(tag);
                self.yield_moid(x.sort, result)
            }
            None => {
                let span = self.tree.node(n).span;
                let ru = self.modes.render(u, self.interner);
                let rv = self.modes.render(v, self.interner);
                let op = self.operator_name(sym);
                self.diags.mode_error(
                    span,
                    format!(
                        "no operator {} for operands of modes {} and {}",
                        op, ru, rv
                    ),
                );
                self.yield_moid(x.sort, Moid::ERROR)
            }
        }
    }

    /// Search the operator tags visible from `table` for one whose operand
    /// modes accept the given yields at `sort` strength.
    fn find_operator(
        &mut self,
        table: TableId,
        sym: crate::intern::Symbol,
        operands: &[Moid],
        sort: Sort,
    ) -> Option<(crate::scope::TagId, Moid)> {
        let candidates = self.tables.operators(table, sym);
        for tag in candidates {
            let moid = self.tables.tag(tag).moid;
            let (params, result) = match self.modes.mode(moid).clone() {
                Mode::Proc { params, result } => (params, result),
                _ => continue,
            };
            if params.len() != operands.len() {
                continue;
            }
            let fits = operands
                .iter()
                .zip(params.iter())
                .all(|(&o, &p)| coercible(self.modes, o, p, sort, Regime::Safe));
            if fits {
                return Some((tag, result));
            }
        }
        None
    }

    // ------------------------------------------------------------------
    // Failure explanation
    // ------------------------------------------------------------------

    /// Build the explanatory message for an uncoercible pair, descending
    /// into series and stowed components.
    fn explain_failure(&mut self, p: Moid, q: Moid, sort: Sort) -> String {
        let sort_name = match sort {
            Sort::NoSort => "no",
            Sort::Soft => "soft",
            Sort::Weak => "weak",
            Sort::Meek => "meek",
            Sort::Firm => "firm",
            Sort::Strong => "strong",
        };
        let mut message = format!(
            "{} cannot be coerced to {} in a {} context",
            self.modes.render(p, self.interner),
            self.modes.render(q, self.interner),
            sort_name
        );
        match self.modes.mode(p).clone() {
            Mode::Series(pack) => {
                for (i, f) in pack.iter().enumerate() {
                    if !coercible(self.modes, f.moid, q, Sort::Strong, Regime::Safe) {
                        message.push_str(&format!(
                            "; constituent {} yields {} where {} is required",
                            i + 1,
                            self.modes.render(f.moid, self.interner),
                            self.modes.render(q, self.interner)
                        ));
                    }
                }
            }
            Mode::Stowed(pack) => {
                let dq = self.modes.deflexed(q);
                let elems: Vec<Moid> = match self.modes.mode(dq).clone() {
                    Mode::Row { .. } => {
                        let elem = self.modes.slice_of(dq).unwrap_or(Moid::ERROR);
                        vec![elem; pack.len()]
                    }
                    Mode::Struct(fields) if fields.len() == pack.len() => {
                        fields.iter().map(|f| f.moid).collect()
                    }
                    _ => Vec::new(),
                };
                for (i, (f, &e)) in pack.iter().zip(elems.iter()).enumerate() {
                    if !coercible(self.modes, f.moid, e, Sort::Strong, Regime::Safe) {
                        message.push_str(&format!(
                            "; element {} yields {} where {} is required",
                            i + 1,
                            self.modes.render(f.moid, self.interner),
                            self.modes.render(e, self.interner)
                        ));
                    }
                }
            }
            _ => {}
        }
        message
    }
}

/// Peel parameterless procedures only, down to a name.
pub fn soft_depref_to_name(t: &ModeTable, m: Moid) -> Option<Moid> {
    let mut m = t.canonical(m);
    loop {
        match t.mode(m) {
            Mode::Ref(_) => return Some(m),
            Mode::Proc { params, result } if params.is_empty() => m = t.canonical(*result),
            _ => return None,
        }
    }
}

#[cfg(test)]
mod tests;
