//! The coercion inserter: wraps a successfully mode-checked tree with
//! explicit coercion nodes.
//!
//! The traversal mirrors the checker's contexts, recursing into children
//! first and then bringing each construct to its required mode by inserting
//! `Dereferencing`, `Deproceduring`, `Uniting`, `Widening`, `Rowing`, and
//! `Voiding` wrappers. Re-running the pass is a no-op: coerced nodes carry
//! a status bit and are skipped.

use crate::ast::{Attr, NodeId, Status, Tree};
use crate::diag::Diagnostics;
use crate::intern::Interner;
use crate::modes::predicates::{
    coercible, depref_once, modes_equal, printable_mode, readable_mode, unitable, widen_path,
    widenable, Regime, Sort,
};
use crate::modes::{Mode, ModeTable, Moid};
use crate::scope::SymbolTables;

use super::soft_depref_to_name;

pub struct Coercer<'a> {
    pub tree: &'a mut Tree,
    pub modes: &'a mut ModeTable,
    pub tables: &'a mut SymbolTables,
    pub interner: &'a Interner,
}

/// Insert coercions below the program node, then hoist widened denotations.
pub fn coerce_program(
    tree: &mut Tree,
    modes: &mut ModeTable,
    tables: &mut SymbolTables,
    diags: &mut Diagnostics,
    interner: &Interner,
    root: NodeId,
    portcheck: bool,
) {
    {
        let mut coercer = Coercer {
            tree: &mut *tree,
            modes: &mut *modes,
            tables: &mut *tables,
            interner,
        };
        if let Some(body) = coercer.tree.sub(root) {
            coercer.coerce(body, Sort::Strong, Some(Moid::VOID), Regime::Safe);
        }
    }
    hoist_denotations(tree, modes, diags, portcheck);
}

impl<'a> Coercer<'a> {
    /// Coerce `n` into the context `(sort, q)`.
    pub fn coerce(&mut self, n: NodeId, sort: Sort, q: Option<Moid>, regime: Regime) {
        if self.tree.node(n).status.contains(Status::COERCED) {
            return;
        }
        self.coerce_inner(n, sort, q, regime);
        if let Some(q) = q {
            self.wrap_to(n, sort, q, regime);
        }
        self.tree.node_mut(n).status |= Status::COERCED;
    }

    fn coerce_inner(&mut self, n: NodeId, sort: Sort, q: Option<Moid>, regime: Regime) {
        match self.tree.attr(n) {
            Attr::SerialClause => {
                let phrases = self.tree.children(n);
                let last_unit = phrases
                    .iter()
                    .rposition(|&p| !is_declaration(self.tree.attr(p)));
                for (i, &p) in phrases.iter().enumerate() {
                    if is_declaration(self.tree.attr(p)) {
                        self.coerce(p, Sort::Strong, Some(Moid::VOID), Regime::Safe);
                    } else if Some(i) == last_unit {
                        self.coerce(p, sort, q, regime);
                    } else {
                        self.coerce(p, Sort::Strong, Some(Moid::VOID), Regime::Safe);
                    }
                }
                if let Some(q) = q {
                    self.tree.node_mut(n).moid = Some(q);
                }
            }
            Attr::ClosedClause => {
                let body = self.tree.sub(n).expect("closed clause has a body");
                self.coerce(body, sort, q, regime);
                self.tree.node_mut(n).moid = self.tree.moid(body);
            }
            Attr::CollateralClause => self.coerce_collateral(n, q, regime),
            Attr::ParallelClause => {
                for u in self.tree.children(n) {
                    self.coerce(u, Sort::Strong, Some(Moid::VOID), Regime::Safe);
                }
            }
            Attr::ConditionalClause | Attr::CaseClause | Attr::ConformityClause => {
                self.coerce_choice(n, sort)
            }
            Attr::LoopClause => self.coerce_loop(n),
            Attr::IdentityDecl => {
                let declared = self.tree.moid(n).expect("declaration carries a mode");
                let source = self.tree.sub(n).expect("declaration has a source");
                self.coerce(source, Sort::Strong, Some(declared), Regime::Safe);
            }
            Attr::VariableDecl => {
                let name_moid = self.tree.moid(n).expect("declaration carries a mode");
                let target = match self.modes.mode(name_moid) {
                    Mode::Ref(inner) => *inner,
                    _ => Moid::ERROR,
                };
                for c in self.tree.children(n) {
                    if self.tree.attr(c) == Attr::BoundsPart {
                        self.coerce_bounds(c);
                    } else {
                        self.coerce(c, Sort::Strong, Some(target), Regime::Force);
                    }
                }
            }
            Attr::OperatorDecl => {
                let declared = self.tree.moid(n).expect("declaration carries a mode");
                let body = self.tree.sub(n).expect("declaration has a body");
                self.coerce(body, Sort::Strong, Some(declared), Regime::Safe);
            }
            Attr::RoutineText => {
                let moid = self.tree.moid(n).expect("routine text carries its mode");
                let result = match self.modes.mode(moid) {
                    Mode::Proc { result, .. } => *result,
                    _ => Moid::ERROR,
                };
                let body = self.tree.sub(n).expect("routine text has a body");
                self.coerce(body, Sort::Strong, Some(result), Regime::Force);
            }
            Attr::Assignation => {
                let children = self.tree.children(n);
                let name_moid = self.tree.moid(n).expect("assignation carries the name mode");
                let inner = match self.modes.mode(name_moid) {
                    Mode::Ref(inner) => *inner,
                    _ => Moid::ERROR,
                };
                self.coerce(children[0], Sort::Soft, Some(name_moid), Regime::Safe);
                self.coerce(children[1], Sort::Strong, Some(inner), Regime::Force);
            }
            Attr::IdentityRelation { .. } => self.coerce_identity_relation(n),
            Attr::Cast => {
                let declared = self.tree.moid(n).expect("cast carries its mode");
                let enclosed = self.tree.sub(n).expect("cast has an enclosed clause");
                self.coerce(enclosed, Sort::Strong, Some(declared), Regime::Safe);
            }
            Attr::Call => self.coerce_call(n),
            Attr::Slice => self.coerce_slice(n),
            Attr::Selection => self.coerce_selection(n),
            Attr::MonadicFormula | Attr::DyadicFormula => self.coerce_formula(n),
            Attr::Generator { .. } => {
                for c in self.tree.children(n) {
                    if self.tree.attr(c) == Attr::BoundsPart {
                        self.coerce_bounds(c);
                    }
                }
            }
            Attr::SkipSymbol | Attr::NihilSymbol | Attr::Jump => {
                // These adopt the context mode outright.
                if let Some(q) = q {
                    self.tree.node_mut(n).moid = Some(q);
                }
            }
            _ => {}
        }
    }

    fn coerce_bounds(&mut self, bounds: NodeId) {
        for pair in self.tree.children(bounds) {
            for bound in self.tree.children(pair) {
                self.coerce(bound, Sort::Meek, Some(Moid::INT), Regime::Safe);
            }
        }
    }

    fn coerce_collateral(&mut self, n: NodeId, q: Option<Moid>, regime: Regime) {
        let units = self.tree.children(n);
        let q = match q {
            Some(q) => q,
            None => return,
        };
        if q == Moid::VOID {
            for &u in &units {
                self.coerce(u, Sort::Strong, Some(Moid::VOID), Regime::Safe);
            }
            self.tree.node_mut(n).moid = Some(Moid::VOID);
            return;
        }
        let dq = self.modes.deflexed(q);
        match self.modes.mode(dq).clone() {
            Mode::Row { .. } => {
                let elem = self.modes.slice_of(dq).unwrap_or(Moid::ERROR);
                for &u in &units {
                    self.coerce(u, Sort::Strong, Some(elem), regime);
                }
                self.tree.node_mut(n).moid = Some(q);
            }
            Mode::Struct(pack) if pack.len() == units.len() => {
                for (&u, f) in units.iter().zip(pack.iter()) {
                    self.coerce(u, Sort::Strong, Some(f.moid), regime);
                }
                self.tree.node_mut(n).moid = Some(q);
            }
            _ => {}
        }
    }

    /// Branches of a choice coerce to the clause's balanced mode.
    fn coerce_choice(&mut self, n: NodeId, sort: Sort) {
        let children = self.tree.children(n);
        let yielded = self.tree.moid(n);
        let attr = self.tree.attr(n);
        for &c in &children {
            match self.tree.attr(c) {
                Attr::EnquiryClause => {
                    let serial = self.tree.sub(c).expect("enquiry has a clause");
                    let target = match attr {
                        Attr::CaseClause => Moid::INT,
                        Attr::ConformityClause => {
                            self.tree.moid(c).unwrap_or(Moid::ERROR)
                        }
                        _ => Moid::BOOL,
                    };
                    self.coerce(serial, Sort::Strong, Some(target), Regime::Safe);
                    self.tree.node_mut(c).moid = Some(target);
                }
                Attr::ThenPart
                | Attr::ElsePart
                | Attr::CaseAlternative
                | Attr::ConformityAlternative
                | Attr::OutPart => {
                    let body = self.tree.sub(c).expect("choice part has a body");
                    self.coerce(body, sort, yielded, Regime::Safe);
                    self.tree.node_mut(c).moid = yielded;
                }
                _ => {}
            }
        }
    }

    fn coerce_loop(&mut self, n: NodeId) {
        for part in self.tree.children(n) {
            match self.tree.attr(part) {
                Attr::FromPart | Attr::ByPart | Attr::ToPart => {
                    let u = self.tree.sub(part).expect("loop part has a unit");
                    self.coerce(u, Sort::Meek, Some(Moid::INT), Regime::Safe);
                }
                Attr::WhilePart | Attr::UntilPart => {
                    let serial = self.tree.sub(part).expect("loop part has a clause");
                    self.coerce(serial, Sort::Meek, Some(Moid::BOOL), Regime::Safe);
                }
                Attr::DoPart => {
                    let serial = self.tree.sub(part).expect("loop body");
                    self.coerce(serial, Sort::Strong, Some(Moid::VOID), Regime::Safe);
                }
                _ => {}
            }
        }
    }

    fn coerce_identity_relation(&mut self, n: NodeId) {
        let children = self.tree.children(n);
        let (lhs, rhs) = (children[0], children[1]);
        let l = self.tree.moid(lhs).unwrap_or(Moid::ERROR);
        let r = self.tree.moid(rhs).unwrap_or(Moid::ERROR);
        let ln = soft_depref_to_name(self.modes, l);
        let rn = soft_depref_to_name(self.modes, r);
        // Balance strongly either way; a NIL side adopts the other's name.
        let target = match (ln, rn) {
            (Some(a), Some(b)) => {
                if modes_equal(self.modes, a, b, Regime::Safe) {
                    a
                } else if coercible(self.modes, a, b, Sort::Strong, Regime::Safe) {
                    b
                } else {
                    a
                }
            }
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => Moid::ERROR,
        };
        self.coerce(lhs, Sort::Strong, Some(target), Regime::Safe);
        self.coerce(rhs, Sort::Strong, Some(target), Regime::Safe);
    }

    fn coerce_call(&mut self, n: NodeId) {
        let children = self.tree.children(n);
        let primary = children[0];
        let p = self.tree.moid(primary).unwrap_or(Moid::ERROR);
        let mut proc_moid = p;
        let (params, _) = loop {
            match self.modes.mode(proc_moid).clone() {
                Mode::Proc { params, result } if !params.is_empty() => break (params, result),
                _ => match depref_once(self.modes, proc_moid) {
                    Some(next) => proc_moid = next,
                    None => return,
                },
            }
        };
        self.coerce(primary, Sort::Weak, Some(proc_moid), Regime::Safe);
        for (&arg, &param) in children[1..].iter().zip(params.iter()) {
            if self.tree.attr(arg) != Attr::EmptyArgument {
                self.coerce(arg, Sort::Strong, Some(param), Regime::Alias);
            }
        }
    }

    fn coerce_slice(&mut self, n: NodeId) {
        let children = self.tree.children(n);
        let primary = children[0];
        let p = self.tree.moid(primary).unwrap_or(Moid::ERROR);
        let mut m = p;
        let target = loop {
            let cur = self.modes.mode(m).clone();
            match cur {
                Mode::Ref(inner) => {
                    let di = self.modes.deflexed(inner);
                    if matches!(self.modes.mode(di), Mode::Row { .. }) {
                        break m;
                    }
                    m = inner;
                }
                Mode::Proc { ref params, result } if params.is_empty() => m = result,
                Mode::Row { .. } | Mode::Flex(_) => break m,
                _ => return,
            }
        };
        self.coerce(primary, Sort::Weak, Some(target), Regime::Safe);
        for &ix in &children[1..] {
            if self.tree.attr(ix) == Attr::Trimmer {
                for part in self.tree.children(ix) {
                    if let Some(bound) = self.tree.sub(part) {
                        self.coerce(bound, Sort::Meek, Some(Moid::INT), Regime::Safe);
                    }
                }
            } else {
                self.coerce(ix, Sort::Meek, Some(Moid::INT), Regime::Safe);
            }
        }
    }

    fn coerce_selection(&mut self, n: NodeId) {
        let secondary = self.tree.sub(n).expect("selection has a secondary");
        let p = self.tree.moid(secondary).unwrap_or(Moid::ERROR);
        let mut m = p;
        let target = loop {
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
                        break m;
                    }
                }
                _ => break m,
            }
        };
        self.coerce(secondary, Sort::Weak, Some(target), Regime::Safe);
    }

    /// Operands take the resolved operator's declared parameter modes.
    fn coerce_formula(&mut self, n: NodeId) {
        let tag = match self.tree.node(n).tag {
            Some(tag) => tag,
            None => return,
        };
        let moid = self.tables.tag(tag).moid;
        let params = match self.modes.mode(moid).clone() {
            Mode::Proc { params, .. } => params,
            _ => return,
        };
        let operands = self.tree.children(n);
        for (&operand, &param) in operands.iter().zip(params.iter()) {
            // Operators found through the standard environ's strong retry
            // need strong operand coercions (widening) too.
            let p = self.tree.moid(operand).unwrap_or(Moid::ERROR);
            let sort = if coercible(self.modes, p, param, Sort::Firm, Regime::Safe) {
                Sort::Firm
            } else {
                Sort::Strong
            };
            self.coerce(operand, sort, Some(param), Regime::Safe);
        }
    }

    // ------------------------------------------------------------------
    // Wrapping
    // ------------------------------------------------------------------

    fn wrap_to(&mut self, n: NodeId, sort: Sort, q: Moid, regime: Regime) {
        let p = match self.tree.moid(n) {
            Some(p) => p,
            None => return,
        };
        if !self.modes.is_well(p) || !self.modes.is_well(q) {
            return;
        }
        match sort {
            Sort::NoSort => {}
            Sort::Soft => self.make_soft(n, q, regime),
            Sort::Weak | Sort::Meek => self.make_depref_to(n, q, regime),
            Sort::Firm => self.make_firm(n, q, regime),
            Sort::Strong => self.make_strong(n, q, regime),
        }
    }

    fn make_soft(&mut self, n: NodeId, q: Moid, regime: Regime) {
        loop {
            let p = self.tree.moid(n).expect("coerced node has a mode");
            if modes_equal(self.modes, p, q, regime) {
                return;
            }
            match self.modes.mode(p).clone() {
                Mode::Proc { ref params, result } if params.is_empty() => {
                    self.tree.wrap(n, Attr::Deproceduring, result);
                }
                _ => return,
            }
        }
    }

    fn make_depref_to(&mut self, n: NodeId, q: Moid, regime: Regime) {
        loop {
            let p = self.tree.moid(n).expect("coerced node has a mode");
            if modes_equal(self.modes, p, q, regime) {
                return;
            }
            match self.modes.mode(p).clone() {
                Mode::Ref(inner) => {
                    self.tree.wrap(n, Attr::Dereferencing, inner);
                }
                Mode::Proc { ref params, result } if params.is_empty() => {
                    self.tree.wrap(n, Attr::Deproceduring, result);
                }
                _ => return,
            }
        }
    }

    fn make_firm(&mut self, n: NodeId, q: Moid, regime: Regime) {
        let p = self.tree.moid(n).expect("coerced node has a mode");
        if modes_equal(self.modes, p, q, regime) {
            return;
        }
        if q == Moid::ROWS && self.is_rows_value(p) {
            self.tree.wrap(n, Attr::Rowing, Moid::ROWS);
            return;
        }
        if unitable(self.modes, p, q, regime) {
            self.tree.wrap(n, Attr::Uniting, q);
            return;
        }
        match self.modes.mode(p).clone() {
            Mode::Ref(inner) => {
                self.tree.wrap(n, Attr::Dereferencing, inner);
                self.make_firm(n, q, regime);
            }
            Mode::Proc { ref params, result } if params.is_empty() => {
                self.tree.wrap(n, Attr::Deproceduring, result);
                self.make_firm(n, q, regime);
            }
            _ => {}
        }
    }

    /// The strong entry point: voiding, then the depreffing dispatcher.
    fn make_strong(&mut self, n: NodeId, q: Moid, regime: Regime) {
        let p = self.tree.moid(n).expect("coerced node has a mode");
        if q == Moid::VOID {
            if p != Moid::VOID {
                self.make_void(n);
            }
            return;
        }
        self.make_depreffing_coercion(n, q, regime);
    }

    /// Dispatcher over the target mode, in fixed order: deflex-equal,
    /// transput unions, ROWS, widening, uniting, name-rowing, value-rowing,
    /// then descend `REF`/`PROC` and retry.
    fn make_depreffing_coercion(&mut self, n: NodeId, q: Moid, regime: Regime) {
        let p = self.tree.moid(n).expect("coerced node has a mode");
        let p = self.modes.canonical(p);
        let q = self.modes.canonical(q);
        if p == Moid::HIP || p == Moid::VACUUM {
            self.tree.node_mut(n).moid = Some(q);
            return;
        }
        if modes_equal(self.modes, p, q, regime) || modes_equal(self.modes, p, q, Regime::Force) {
            return;
        }
        if q == Moid::SIMPLOUT && printable_mode(self.modes, p) {
            self.tree.wrap(n, Attr::Uniting, Moid::SIMPLOUT);
            return;
        }
        if q == Moid::ROW_SIMPLOUT && printable_mode(self.modes, p) {
            self.tree.wrap(n, Attr::Uniting, Moid::SIMPLOUT);
            self.tree.wrap(n, Attr::Rowing, Moid::ROW_SIMPLOUT);
            return;
        }
        if q == Moid::SIMPLIN && readable_mode(self.modes, p) {
            self.tree.wrap(n, Attr::Uniting, Moid::SIMPLIN);
            return;
        }
        if q == Moid::ROW_SIMPLIN && readable_mode(self.modes, p) {
            self.tree.wrap(n, Attr::Uniting, Moid::SIMPLIN);
            self.tree.wrap(n, Attr::Rowing, Moid::ROW_SIMPLIN);
            return;
        }
        if q == Moid::ROWS && self.is_rows_value(p) {
            self.tree.wrap(n, Attr::Rowing, Moid::ROWS);
            return;
        }
        if widenable(self.modes, p, q) {
            if let Some(path) = widen_path(self.modes, p, q) {
                for step in path {
                    self.tree.wrap(n, Attr::Widening, step);
                }
            }
            return;
        }
        if unitable(self.modes, p, q, regime) {
            self.tree.wrap(n, Attr::Uniting, q);
            return;
        }
        // Rowing a name: REF A to REF [] A, possibly several levels.
        if matches!(self.modes.mode(p), Mode::Ref(_)) {
            if let Some(name) = self.modes.name_of(q) {
                if crate::modes::predicates::strong_name(self.modes, p, q) {
                    self.make_depreffing_coercion(n, name, regime);
                    self.tree.wrap(n, Attr::Rowing, q);
                    return;
                }
            }
        }
        // Rowing a value into a rows (or flex rows) mode.
        let dq = self.modes.deflexed(q);
        if matches!(self.modes.mode(dq), Mode::Row { .. }) {
            if let Some(elem) = self.modes.slice_of(dq) {
                if coercible(self.modes, p, elem, Sort::Strong, regime) {
                    self.make_depreffing_coercion(n, elem, regime);
                    self.tree.wrap(n, Attr::Rowing, q);
                    return;
                }
            }
        }
        match self.modes.mode(p).clone() {
            Mode::Ref(inner) => {
                self.tree.wrap(n, Attr::Dereferencing, inner);
                self.make_depreffing_coercion(n, q, regime);
            }
            Mode::Proc { ref params, result } if params.is_empty() => {
                self.tree.wrap(n, Attr::Deproceduring, result);
                self.make_depreffing_coercion(n, q, regime);
            }
            _ => {}
        }
    }

    fn is_rows_value(&mut self, p: Moid) -> bool {
        let dp = self.modes.deflexed(p);
        matches!(self.modes.mode(dp), Mode::Row { .. })
    }

    /// Voiding; a MORF still carrying a `REF PROC` chain is first unwound.
    fn make_void(&mut self, n: NodeId) {
        let base = self.tree.attr(n);
        if base.is_morf() {
            loop {
                let p = self.tree.moid(n).expect("coerced node has a mode");
                match self.modes.mode(p).clone() {
                    Mode::Proc { ref params, result } if params.is_empty() => {
                        self.tree.wrap(n, Attr::Deproceduring, result);
                    }
                    Mode::Ref(inner) if chains_to_proc(self.modes, inner) => {
                        self.tree.wrap(n, Attr::Dereferencing, inner);
                    }
                    _ => break,
                }
            }
        }
        self.tree.wrap(n, Attr::Voiding, Moid::VOID);
    }
}

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

/// Does dereferencing eventually uncover a parameterless procedure?
fn chains_to_proc(t: &ModeTable, m: Moid) -> bool {
    let mut m = t.canonical(m);
    loop {
        match t.mode(m) {
            Mode::Proc { params, .. } => return params.is_empty(),
            Mode::Ref(inner) => m = t.canonical(*inner),
            _ => return false,
        }
    }
}

/// Collapse `WIDENING(DENOTATION)` into an already-widened denotation when
/// the widening is numerically exact. Idempotent; warns under portcheck.
pub fn hoist_denotations(
    tree: &mut Tree,
    modes: &ModeTable,
    diags: &mut Diagnostics,
    portcheck: bool,
) {
    use crate::modes::StdName;
    // Inner wrappers have higher ids than their parents, so a descending
    // scan collapses chains in one pass.
    for i in (0..tree.len()).rev() {
        let id = node_id(i);
        if tree.attr(id) != Attr::Widening {
            continue;
        }
        let child = match tree.sub(id) {
            Some(c) => c,
            None => continue,
        };
        let target = match tree.moid(id) {
            Some(t) => t,
            None => continue,
        };
        let target_name = match modes.raw(modes.canonical(target)) {
            Mode::Standard { name, .. } => *name,
            _ => continue,
        };
        let new_attr = match (tree.attr(child), target_name) {
            (Attr::IntDenotation(v), StdName::Int) => Some(Attr::IntDenotation(v)),
            (Attr::IntDenotation(v), StdName::Real) => {
                // Collapse only when the value survives the conversion.
                let as_real = v as f64;
                if as_real as i64 == v {
                    Some(Attr::RealDenotation(as_real))
                } else {
                    None
                }
            }
            (Attr::RealDenotation(v), StdName::Real) => Some(Attr::RealDenotation(v)),
            _ => None,
        };
        if let Some(attr) = new_attr {
            let was_optimal = tree.node(id).status.contains(Status::OPTIMAL);
            let span = tree.node(id).span;
            let node = tree.node_mut(id);
            node.attr = attr;
            node.sub = None;
            node.status |= Status::OPTIMAL;
            if !was_optimal && portcheck {
                diags.warning(span, "widened denotation is not portable");
            }
        }
    }
}

fn node_id(i: usize) -> NodeId {
    NodeId::from_index(i)
}
