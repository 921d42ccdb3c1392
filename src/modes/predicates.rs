//! Deflexing-aware mode predicates and the coercibility lattice.
//!
//! Every test here operates modulo a deflexing [`Regime`]; the context
//! [`Sort`] decides which implicit conversions are admissible at a position.

use super::{Mode, ModeTable, Moid, Pack};

/// Deflexing regime for a comparison.
///
/// `Force` lets `FLEX [] A` and `[] A` interchange freely. `Alias` keeps
/// names apart (`REF FLEX [] A` is not `REF [] A`) while letting values of
/// either row mode interchange. `Safe` separates anything that can refer to
/// a name and behaves like `Force` on pure values. `No` and `Skip` are
/// strict.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Regime {
    Skip,
    Force,
    Alias,
    Safe,
    No,
}

/// Context strength, weakest to strongest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub enum Sort {
    NoSort,
    Soft,
    Weak,
    Meek,
    Firm,
    Strong,
}

/// `REF _` or a parameterless `PROC _` can be peeled by dereferencing or
/// deproceduring.
pub fn deprefable(t: &ModeTable, m: Moid) -> bool {
    match t.mode(m) {
        Mode::Ref(_) => true,
        Mode::Proc { params, .. } => params.is_empty(),
        _ => false,
    }
}

pub fn depref_once(t: &ModeTable, m: Moid) -> Option<Moid> {
    match t.mode(m) {
        Mode::Ref(inner) => Some(*inner),
        Mode::Proc { params, result } if params.is_empty() => Some(*result),
        _ => None,
    }
}

pub fn depref_completely(t: &ModeTable, m: Moid) -> Moid {
    let mut m = t.canonical(m);
    while let Some(next) = depref_once(t, m) {
        m = t.canonical(next);
    }
    m
}

/// Regime-aware mode equality.
pub fn modes_equal(t: &mut ModeTable, u: Moid, v: Moid, regime: Regime) -> bool {
    let u = t.canonical(u);
    let v = t.canonical(v);
    if t.modes_equivalent(u, v) {
        return true;
    }
    match regime {
        Regime::No | Regime::Skip => false,
        Regime::Force => {
            let du = t.deflexed(u);
            let dv = t.deflexed(v);
            t.modes_equivalent(du, dv)
        }
        Regime::Alias => {
            // Values interchange; deflexing stops at REF, so names of flex
            // rows stay separate from names of plain rows.
            let du = t.deflexed(u);
            t.modes_equivalent(du, v)
        }
        Regime::Safe => {
            if !t.has_ref(u) && !t.has_ref(v) {
                let du = t.deflexed(u);
                let dv = t.deflexed(v);
                t.modes_equivalent(du, dv)
            } else {
                false
            }
        }
    }
}

pub fn moid_in_pack(t: &mut ModeTable, u: Moid, pack: &Pack, regime: Regime) -> bool {
    pack.iter().any(|f| modes_equal(t, u, f.moid, regime))
}

/// Every alternative of union `p` occurs in union `q`.
pub fn subset(t: &mut ModeTable, p: Moid, q: Moid, regime: Regime) -> bool {
    let p_pack = match t.mode(p) {
        Mode::Union(pack) => pack.clone(),
        _ => return false,
    };
    let q_pack = match t.mode(q) {
        Mode::Union(pack) => pack.clone(),
        _ => return false,
    };
    p_pack
        .iter()
        .all(|f| moid_in_pack(t, f.moid, &q_pack, regime))
}

/// `q` is a union and `p` fits as one alternative, or as a subset of them.
pub fn unitable(t: &mut ModeTable, p: Moid, q: Moid, regime: Regime) -> bool {
    let q_pack = match t.mode(q) {
        Mode::Union(pack) => pack.clone(),
        _ => return false,
    };
    if matches!(t.mode(p), Mode::Union(_)) {
        subset(t, p, q, regime)
    } else {
        moid_in_pack(t, p, &q_pack, regime)
    }
}

/// The exact one-step widening table.
pub fn widens_to(t: &ModeTable, p: Moid, q: Moid) -> bool {
    widenings_of(t, p).contains(&q)
}

fn widenings_of(t: &ModeTable, p: Moid) -> Vec<Moid> {
    use super::StdName::*;
    let p = t.canonical(p);
    let (name, long) = match t.raw(p) {
        Mode::Standard { name, long } => (*name, *long),
        _ => return Vec::new(),
    };
    match (name, long) {
        (Int, 0) => vec![Moid::LONG_INT, Moid::REAL],
        (Int, 1) => vec![Moid::LONG_LONG_INT, Moid::LONG_REAL],
        (Int, 2) => vec![Moid::LONG_LONG_REAL],
        (Real, 0) => vec![Moid::LONG_REAL, Moid::COMPL],
        (Real, 1) => vec![Moid::LONG_LONG_REAL, Moid::LONG_COMPL],
        (Real, 2) => vec![Moid::LONG_LONG_COMPL],
        (Compl, 0) => vec![Moid::LONG_COMPL],
        (Compl, 1) => vec![Moid::LONG_LONG_COMPL],
        (Bits, 0) => vec![Moid::LONG_BITS, Moid::ROW_BOOL],
        (Bits, 1) => vec![Moid::LONG_LONG_BITS, Moid::ROW_BOOL],
        (Bits, 2) => vec![Moid::ROW_BOOL],
        (Bytes, 0) => vec![Moid::ROW_CHAR],
        (Bytes, 1) => vec![Moid::ROW_CHAR],
        _ => Vec::new(),
    }
}

/// Transitive closure of [`widens_to`].
pub fn widenable(t: &ModeTable, p: Moid, q: Moid) -> bool {
    widen_path(t, p, q).is_some()
}

/// The sequence of one-step widenings from `p` to `q`, outermost first,
/// excluding `p` itself. `None` when `q` is not reachable.
pub fn widen_path(t: &ModeTable, p: Moid, q: Moid) -> Option<Vec<Moid>> {
    let p = t.canonical(p);
    let q = t.canonical(q);
    if p == q {
        return None;
    }
    // The table is a small dag; depth-first search suffices.
    fn dfs(t: &ModeTable, from: Moid, to: Moid, path: &mut Vec<Moid>) -> bool {
        for next in widenings_of(t, from) {
            path.push(next);
            if next == to || dfs(t, next, to, path) {
                return true;
            }
            path.pop();
        }
        false
    }
    let mut path = Vec::new();
    if dfs(t, p, q, &mut path) {
        Some(path)
    } else {
        None
    }
}

/// Strong coercion from a value to a (possibly flex) rows type: rowing.
pub fn strong_slice(t: &mut ModeTable, p: Moid, q: Moid) -> bool {
    let p = t.canonical(p);
    let q = t.canonical(q);
    if p == q || widenable(t, p, q) {
        return true;
    }
    if let Mode::Flex(row) = t.mode(q) {
        let row = *row;
        return strong_slice(t, p, row);
    }
    if let Some(sliced) = t.slice_of(q) {
        return strong_slice(t, p, sliced);
    }
    false
}

/// Strong coercion from a name to a name of a rows type.
pub fn strong_name(t: &mut ModeTable, p: Moid, q: Moid) -> bool {
    let p = t.canonical(p);
    let q = t.canonical(q);
    if p == q {
        return true;
    }
    match t.name_of(q) {
        Some(name) => strong_name(t, p, name),
        None => false,
    }
}

/// Mode eligible as a `SIMPLOUT` alternative.
pub fn printable_mode(t: &ModeTable, m: Moid) -> bool {
    let m = t.canonical(m);
    match t.raw(m) {
        Mode::Standard { .. } => true,
        _ => m == Moid::ROW_CHAR || m == Moid::STRING,
    }
}

/// Mode eligible as a `SIMPLIN` alternative: a name of a readable value.
pub fn readable_mode(t: &ModeTable, m: Moid) -> bool {
    let m = t.canonical(m);
    let inner = match t.raw(m) {
        Mode::Ref(inner) => *inner,
        _ => return false,
    };
    let inner = t.canonical(inner);
    matches!(t.raw(inner), Mode::Standard { .. }) || inner == Moid::STRING
}

pub fn transput_mode(t: &ModeTable, m: Moid, direction: char) -> bool {
    match direction {
        'r' => readable_mode(t, m),
        _ => printable_mode(t, m),
    }
}

/// Is there a coercion from `p` to `q` at the given strength and regime?
pub fn coercible(t: &mut ModeTable, p: Moid, q: Moid, sort: Sort, regime: Regime) -> bool {
    let p = t.canonical(p);
    let q = t.canonical(q);
    // Ill-formed operands short-circuit so diagnostics do not cascade.
    if !t.is_well(p) || !t.is_well(q) {
        return true;
    }
    if p == q || p == Moid::HIP {
        return true;
    }
    match t.raw(p).clone() {
        Mode::Series(pack) => {
            return pack
                .iter()
                .all(|f| coercible(t, f.moid, q, Sort::Strong, regime));
        }
        Mode::Stowed(pack) => return coercible_stowed(t, &pack, q, sort, regime),
        _ => {}
    }
    if p == Moid::VACUUM && is_rows_type(t, q) {
        return true;
    }
    match sort {
        Sort::NoSort => modes_equal(t, p, q, regime),
        Sort::Soft => softly_coercible(t, p, q, regime),
        Sort::Weak | Sort::Meek => weakly_coercible(t, p, q, regime),
        Sort::Firm => firmly_coercible(t, p, q, regime),
        Sort::Strong => strongly_coercible(t, p, q, regime),
    }
}

fn is_rows_type(t: &mut ModeTable, m: Moid) -> bool {
    let d = t.deflexed(m);
    matches!(t.mode(d), Mode::Row { .. })
}

/// Componentwise coercion of a collateral display into a rows, struct, or
/// routine mode.
fn coercible_stowed(t: &mut ModeTable, pack: &Pack, q: Moid, sort: Sort, regime: Regime) -> bool {
    if sort != Sort::Strong {
        return false;
    }
    match t.mode(q).clone() {
        Mode::Flex(row) => coercible_stowed(t, pack, row, sort, regime),
        Mode::Row { .. } => {
            let elem = match t.slice_of(q) {
                Some(e) => e,
                None => return false,
            };
            pack.iter()
                .all(|f| coercible(t, f.moid, elem, Sort::Strong, regime))
        }
        Mode::Struct(fields) => {
            fields.len() == pack.len()
                && pack
                    .iter()
                    .zip(fields.iter())
                    .all(|(f, g)| coercible(t, f.moid, g.moid, Sort::Strong, regime))
        }
        Mode::Proc { params, result } if params.is_empty() => {
            coercible_stowed(t, pack, result, sort, regime)
        }
        _ => false,
    }
}

fn softly_coercible(t: &mut ModeTable, p: Moid, q: Moid, regime: Regime) -> bool {
    if modes_equal(t, p, q, regime) {
        return true;
    }
    match t.mode(p) {
        Mode::Proc { params, result } if params.is_empty() => {
            let result = *result;
            softly_coercible(t, result, q, regime)
        }
        _ => false,
    }
}

fn weakly_coercible(t: &mut ModeTable, p: Moid, q: Moid, regime: Regime) -> bool {
    if modes_equal(t, p, q, regime) {
        return true;
    }
    match depref_once(t, p) {
        Some(next) => weakly_coercible(t, next, q, regime),
        None => false,
    }
}

fn firmly_coercible(t: &mut ModeTable, p: Moid, q: Moid, regime: Regime) -> bool {
    if modes_equal(t, p, q, regime) {
        return true;
    }
    if q == Moid::ROWS && is_rows_type(t, p) {
        return true;
    }
    if unitable(t, p, q, regime) {
        return true;
    }
    match depref_once(t, p) {
        Some(next) => firmly_coercible(t, next, q, regime),
        None => false,
    }
}

fn strongly_coercible(t: &mut ModeTable, p: Moid, q: Moid, regime: Regime) -> bool {
    if q == Moid::VOID {
        return true;
    }
    if modes_equal(t, p, q, regime) {
        return true;
    }
    if q == Moid::ROWS && is_rows_type(t, p) {
        return true;
    }
    if unitable(t, p, q, regime) {
        return true;
    }
    if q == Moid::SIMPLOUT && printable_mode(t, p) {
        return true;
    }
    if q == Moid::SIMPLIN && readable_mode(t, p) {
        return true;
    }
    if q == Moid::ROW_SIMPLOUT && printable_mode(t, p) {
        return true;
    }
    if q == Moid::ROW_SIMPLIN && readable_mode(t, p) {
        return true;
    }
    if let Some(next) = depref_once(t, p) {
        if strongly_coercible(t, next, q, regime) {
            return true;
        }
    }
    if widenable(t, p, q) {
        return true;
    }
    let dq = t.deflexed(q);
    if matches!(t.mode(dq), Mode::Row { .. }) && strong_slice(t, p, q) {
        return true;
    }
    if matches!(t.mode(p), Mode::Ref(_)) && strong_name(t, p, q) {
        return true;
    }
    false
}
