//! The mode system: canonical mode table and derived-mode algebra.
//!
//! Every mode in a program is interned into one global [`ModeTable`]; a
//! [`Moid`] is an index into it. Constituent modes are registered bottom-up,
//! so structural equality of acyclic modes reduces to index equality.
//! Recursive modes declared through indicants get a placeholder entry first
//! and are unified afterwards: [`ModeTable::modes_equivalent`] compares mode
//! graphs under a postulate set, so `STRUCT (REF SELF, …)` terminates, and
//! equivalent graph nodes end up sharing an `equivalent` pointer.

pub mod balance;
pub mod predicates;

use std::collections::{HashMap, HashSet};

use crate::intern::{Interner, Symbol};

/// Index of a mode in the [`ModeTable`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct Moid(u32);

impl Moid {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    // Well-known modes, in the registration order of `ModeTable::new`.
    pub const VOID: Moid = Moid(0);
    pub const ERROR: Moid = Moid(1);
    pub const UNDEFINED: Moid = Moid(2);
    pub const HIP: Moid = Moid(3);
    pub const VACUUM: Moid = Moid(4);
    pub const ROWS: Moid = Moid(5);
    pub const SIMPLIN: Moid = Moid(6);
    pub const SIMPLOUT: Moid = Moid(7);
    pub const INT: Moid = Moid(8);
    pub const LONG_INT: Moid = Moid(9);
    pub const LONG_LONG_INT: Moid = Moid(10);
    pub const REAL: Moid = Moid(11);
    pub const LONG_REAL: Moid = Moid(12);
    pub const LONG_LONG_REAL: Moid = Moid(13);
    pub const BOOL: Moid = Moid(14);
    pub const CHAR: Moid = Moid(15);
    pub const BITS: Moid = Moid(16);
    pub const LONG_BITS: Moid = Moid(17);
    pub const LONG_LONG_BITS: Moid = Moid(18);
    pub const BYTES: Moid = Moid(19);
    pub const LONG_BYTES: Moid = Moid(20);
    pub const COMPL: Moid = Moid(21);
    pub const LONG_COMPL: Moid = Moid(22);
    pub const LONG_LONG_COMPL: Moid = Moid(23);
    pub const FORMAT: Moid = Moid(24);
    pub const FILE: Moid = Moid(25);
    pub const SOUND: Moid = Moid(26);
    pub const ROW_CHAR: Moid = Moid(27);
    pub const STRING: Moid = Moid(28);
    pub const ROW_BOOL: Moid = Moid(29);
    pub const ROW_SIMPLOUT: Moid = Moid(30);
    pub const ROW_SIMPLIN: Moid = Moid(31);
    pub const REF_STRING: Moid = Moid(32);
}

/// Primitive mode constructors. Longness is carried beside the name.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum StdName {
    Int,
    Real,
    Bool,
    Char,
    Bits,
    Bytes,
    Compl,
}

/// One entry of a struct, union, series, or stowed pack.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Field {
    pub moid: Moid,
    pub label: Option<Symbol>,
}

impl Field {
    pub fn plain(moid: Moid) -> Self {
        Field { moid, label: None }
    }
}

pub type Pack = Vec<Field>;

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Mode {
    Standard { name: StdName, long: u8 },
    Ref(Moid),
    /// `FLEX [] m`; the inner moid is always a `Row`.
    Flex(Moid),
    Row { dim: u32, elem: Moid },
    Struct(Pack),
    Union(Pack),
    Proc { params: Vec<Moid>, result: Moid },
    /// Yields of a serial clause taken together.
    Series(Pack),
    /// Ad-hoc mode of a collateral display.
    Stowed(Pack),
    Format,
    File,
    Sound,
    /// Yield of a jump, skip or nihil: coercible to anything.
    Hip,
    /// Mode of an empty display `()`.
    Vacuum,
    Void,
    /// Mode of a construct that already has a diagnostic.
    ErrorMode,
    Undefined,
    /// Any rows type, as required by `UPB`-like operands.
    Rows,
    SimplIn,
    SimplOut,
}

struct ModeEntry {
    mode: Mode,
    /// Canonical pointer set by unification of recursive declarations.
    equivalent: Option<Moid>,
    deflexed: Option<Moid>,
}

/// The global unique-mode table.
pub struct ModeTable {
    entries: Vec<ModeEntry>,
    canon: HashMap<Mode, Moid>,
}

impl ModeTable {
    pub fn new() -> Self {
        let mut t = ModeTable {
            entries: Vec::new(),
            canon: HashMap::new(),
        };
        // Order must match the `Moid` constants above.
        t.register(Mode::Void);
        t.register(Mode::ErrorMode);
        t.register(Mode::Undefined);
        t.register(Mode::Hip);
        t.register(Mode::Vacuum);
        t.register(Mode::Rows);
        t.register(Mode::SimplIn);
        t.register(Mode::SimplOut);
        for name in [StdName::Int, StdName::Real] {
            for long in 0..=2u8 {
                t.register(Mode::Standard { name, long });
            }
        }
        t.register(Mode::Standard { name: StdName::Bool, long: 0 });
        t.register(Mode::Standard { name: StdName::Char, long: 0 });
        for long in 0..=2u8 {
            t.register(Mode::Standard { name: StdName::Bits, long });
        }
        for long in 0..=1u8 {
            t.register(Mode::Standard { name: StdName::Bytes, long });
        }
        for long in 0..=2u8 {
            t.register(Mode::Standard { name: StdName::Compl, long });
        }
        t.register(Mode::Format);
        t.register(Mode::File);
        t.register(Mode::Sound);
        let row_char = t.register(Mode::Row { dim: 1, elem: Moid::CHAR });
        t.register(Mode::Flex(row_char));
        t.register(Mode::Row { dim: 1, elem: Moid::BOOL });
        t.register(Mode::Row { dim: 1, elem: Moid::SIMPLOUT });
        t.register(Mode::Row { dim: 1, elem: Moid::SIMPLIN });
        t.register(Mode::Ref(Moid::STRING));
        t
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The structure of a mode, not resolving `equivalent` links.
    pub fn raw(&self, m: Moid) -> &Mode {
        &self.entries[m.index()].mode
    }

    /// The structure of the canonical representative.
    pub fn mode(&self, m: Moid) -> &Mode {
        self.raw(self.canonical(m))
    }

    /// Follow `equivalent` links to the canonical representative.
    pub fn canonical(&self, mut m: Moid) -> Moid {
        let mut hops = 0;
        while let Some(e) = self.entries[m.index()].equivalent {
            m = e;
            hops += 1;
            if hops > self.entries.len() {
                break;
            }
        }
        m
    }

    /// Intern a mode: return the existing equivalent or append.
    pub fn register(&mut self, m: Mode) -> Moid {
        let m = self.canonicalize_mode(m);
        if let Some(&existing) = self.canon.get(&m) {
            return existing;
        }
        let id = Moid(self.entries.len() as u32);
        self.entries.push(ModeEntry {
            mode: m.clone(),
            equivalent: None,
            deflexed: None,
        });
        self.canon.insert(m, id);
        id
    }

    fn canonicalize_mode(&self, m: Mode) -> Mode {
        match m {
            Mode::Ref(x) => Mode::Ref(self.canonical(x)),
            Mode::Flex(x) => Mode::Flex(self.canonical(x)),
            Mode::Row { dim, elem } => Mode::Row { dim, elem: self.canonical(elem) },
            Mode::Struct(pack) => Mode::Struct(self.canonicalize_pack(pack)),
            Mode::Union(pack) => Mode::Union(self.canonicalize_pack(pack)),
            Mode::Series(pack) => Mode::Series(self.canonicalize_pack(pack)),
            Mode::Stowed(pack) => Mode::Stowed(self.canonicalize_pack(pack)),
            Mode::Proc { params, result } => Mode::Proc {
                params: params.into_iter().map(|p| self.canonical(p)).collect(),
                result: self.canonical(result),
            },
            other => other,
        }
    }

    fn canonicalize_pack(&self, pack: Pack) -> Pack {
        pack.into_iter()
            .map(|f| Field { moid: self.canonical(f.moid), label: f.label })
            .collect()
    }

    /// Allocate a placeholder for a recursive indicant declaration.
    pub fn new_pending(&mut self) -> Moid {
        let id = Moid(self.entries.len() as u32);
        self.entries.push(ModeEntry {
            mode: Mode::Undefined,
            equivalent: None,
            deflexed: None,
        });
        id
    }

    /// Fill in a pending entry and unify it with any equivalent mode already
    /// in the table.
    pub fn resolve_pending(&mut self, id: Moid, m: Mode) {
        let m = self.canonicalize_mode(m);
        self.entries[id.index()].mode = m;
        for other in 0..self.entries.len() {
            let other = Moid(other as u32);
            if other == id || self.entries[other.index()].equivalent.is_some() {
                continue;
            }
            if matches!(self.raw(other), Mode::Undefined) {
                continue;
            }
            if self.modes_equivalent(id, other) {
                self.entries[id.index()].equivalent = Some(other);
                break;
            }
        }
    }

    /// Structural equivalence under a fresh postulate set.
    pub fn modes_equivalent(&self, u: Moid, v: Moid) -> bool {
        let mut postulates = HashSet::new();
        self.equivalent_under(u, v, &mut postulates)
    }

    fn equivalent_under(&self, u: Moid, v: Moid, postulates: &mut HashSet<(Moid, Moid)>) -> bool {
        let u = self.canonical(u);
        let v = self.canonical(v);
        if u == v {
            return true;
        }
        if postulates.contains(&(u, v)) || postulates.contains(&(v, u)) {
            return true;
        }
        postulates.insert((u, v));
        let result = match (self.raw(u), self.raw(v)) {
            (Mode::Standard { name: n1, long: l1 }, Mode::Standard { name: n2, long: l2 }) => {
                n1 == n2 && l1 == l2
            }
            (Mode::Ref(a), Mode::Ref(b)) | (Mode::Flex(a), Mode::Flex(b)) => {
                self.equivalent_under(*a, *b, postulates)
            }
            (Mode::Row { dim: d1, elem: e1 }, Mode::Row { dim: d2, elem: e2 }) => {
                d1 == d2 && self.equivalent_under(*e1, *e2, postulates)
            }
            (Mode::Struct(p1), Mode::Struct(p2))
            | (Mode::Series(p1), Mode::Series(p2))
            | (Mode::Stowed(p1), Mode::Stowed(p2)) => {
                p1.len() == p2.len()
                    && p1.iter().zip(p2.iter()).all(|(f1, f2)| {
                        f1.label == f2.label
                            && self.equivalent_under(f1.moid, f2.moid, postulates)
                    })
            }
            (Mode::Union(p1), Mode::Union(p2)) => {
                // United packs are unordered sets.
                p1.len() == p2.len()
                    && p1.iter().all(|f1| {
                        p2.iter()
                            .any(|f2| self.equivalent_under(f1.moid, f2.moid, postulates))
                    })
            }
            (
                Mode::Proc { params: a1, result: r1 },
                Mode::Proc { params: a2, result: r2 },
            ) => {
                a1.len() == a2.len()
                    && a1
                        .iter()
                        .zip(a2.iter())
                        .all(|(x, y)| self.equivalent_under(*x, *y, postulates))
                    && self.equivalent_under(*r1, *r2, postulates)
            }
            _ => false,
        };
        // A postulate that did not hold is withdrawn, so a failed branch
        // cannot justify a later comparison.
        if !result {
            postulates.remove(&(u, v));
        }
        result
    }

    pub fn is_well(&self, m: Moid) -> bool {
        !matches!(self.mode(m), Mode::ErrorMode | Mode::Undefined)
    }

    /// Transitively: can a value of this mode refer to a name?
    pub fn has_ref(&self, m: Moid) -> bool {
        self.has_ref_rec(m, &mut HashSet::new())
    }

    fn has_ref_rec(&self, m: Moid, seen: &mut HashSet<Moid>) -> bool {
        let m = self.canonical(m);
        if !seen.insert(m) {
            return false;
        }
        match self.raw(m) {
            Mode::Ref(_) => true,
            Mode::Flex(inner) => self.has_ref_rec(*inner, seen),
            Mode::Row { elem, .. } => self.has_ref_rec(*elem, seen),
            Mode::Struct(pack) | Mode::Union(pack) | Mode::Series(pack) | Mode::Stowed(pack) => {
                pack.iter().any(|f| {
                    let mut s = seen.clone();
                    self.has_ref_rec(f.moid, &mut s)
                })
            }
            _ => false,
        }
    }

    /// The deflexed counterpart of a mode: flex rows become plain rows, and
    /// the flattening descends rows and structured fields, but never a `REF`
    /// (a name of a flex row stays distinct from a name of a row).
    pub fn deflexed(&mut self, m: Moid) -> Moid {
        let m = self.canonical(m);
        if let Some(d) = self.entries[m.index()].deflexed {
            return d;
        }
        let d = self.deflex_rec(m, &mut HashSet::new());
        self.entries[m.index()].deflexed = Some(d);
        d
    }

    fn deflex_rec(&mut self, m: Moid, visiting: &mut HashSet<Moid>) -> Moid {
        let m = self.canonical(m);
        if !visiting.insert(m) {
            return m;
        }
        let result = match self.raw(m).clone() {
            Mode::Flex(inner) => self.deflex_rec(inner, visiting),
            Mode::Row { dim, elem } => {
                let de = self.deflex_rec(elem, visiting);
                self.register(Mode::Row { dim, elem: de })
            }
            Mode::Struct(pack) => {
                let fields: Pack = pack
                    .into_iter()
                    .map(|f| Field { moid: self.deflex_rec(f.moid, visiting), label: f.label })
                    .collect();
                self.register(Mode::Struct(fields))
            }
            Mode::Union(pack) => {
                let fields: Pack = pack
                    .into_iter()
                    .map(|f| Field { moid: self.deflex_rec(f.moid, visiting), label: f.label })
                    .collect();
                self.make_united_of_pack(fields)
            }
            _ => m,
        };
        visiting.remove(&m);
        result
    }

    /// For `REF [] A` (possibly flex): the mode of a subscripted name,
    /// `REF A` one dimension down.
    pub fn name_of(&mut self, m: Moid) -> Option<Moid> {
        let m = self.canonical(m);
        let inner = match self.raw(m) {
            Mode::Ref(inner) => *inner,
            _ => return None,
        };
        let row = match self.raw(inner) {
            Mode::Flex(r) => *r,
            _ => inner,
        };
        let sliced = self.slice_of(row)?;
        Some(self.register(Mode::Ref(sliced)))
    }

    /// One dimension down from a row (or flex row); the element when the
    /// last dimension comes off.
    pub fn slice_of(&mut self, m: Moid) -> Option<Moid> {
        let m = self.canonical(m);
        let (dim, elem) = match self.raw(m) {
            Mode::Row { dim, elem } => (*dim, *elem),
            Mode::Flex(inner) => match self.raw(*inner) {
                Mode::Row { dim, elem } => (*dim, *elem),
                _ => return None,
            },
            _ => return None,
        };
        if dim <= 1 {
            Some(elem)
        } else {
            Some(self.register(Mode::Row { dim: dim - 1, elem }))
        }
    }

    /// Trimming a name of a flex row yields a name of the plain row.
    pub fn trim_of(&mut self, m: Moid) -> Option<Moid> {
        let m = self.canonical(m);
        let inner = match self.raw(m) {
            Mode::Ref(inner) => *inner,
            _ => return None,
        };
        if let Mode::Flex(row) = self.raw(inner) {
            let row = *row;
            Some(self.register(Mode::Ref(row)))
        } else {
            None
        }
    }

    /// For a row of structs: the struct of rows, used when selecting a field
    /// from every element at once.
    pub fn multiple_of(&mut self, m: Moid) -> Option<Moid> {
        let m = self.canonical(m);
        let (dim, elem) = match self.raw(m) {
            Mode::Row { dim, elem } => (*dim, *elem),
            Mode::Flex(inner) => match self.raw(*inner) {
                Mode::Row { dim, elem } => (*dim, *elem),
                _ => return None,
            },
            _ => return None,
        };
        let pack = match self.raw(elem) {
            Mode::Struct(pack) => pack.clone(),
            _ => return None,
        };
        let rows: Pack = pack
            .into_iter()
            .map(|f| Field {
                moid: self.register(Mode::Row { dim, elem: f.moid }),
                label: f.label,
            })
            .collect();
        Some(self.register(Mode::Struct(rows)))
    }

    /// Build the series mode of a clause's yields. Nested series packs are
    /// absorbed so a series never directly contains a series; a one-element
    /// series is that element.
    pub fn make_series(&mut self, yields: &[Moid]) -> Moid {
        let pack = self.absorb_series_pack(yields);
        match pack.len() {
            1 => pack[0].moid,
            _ => self.register(Mode::Series(pack)),
        }
    }

    pub fn absorb_series_pack(&mut self, yields: &[Moid]) -> Pack {
        let mut pack = Pack::new();
        for &y in yields {
            let y = self.canonical(y);
            if let Mode::Series(inner) = self.raw(y) {
                pack.extend(inner.clone());
            } else {
                pack.push(Field::plain(y));
            }
        }
        pack
    }

    /// Turn a series (or explicit alternatives) into a canonical united
    /// mode: united packs are absorbed, contracted, and a one-alternative
    /// union collapses to its alternative.
    pub fn make_united(&mut self, series: Moid) -> Moid {
        let series = self.canonical(series);
        let alts: Vec<Moid> = match self.raw(series) {
            Mode::Series(pack) | Mode::Union(pack) => {
                pack.iter().map(|f| f.moid).collect()
            }
            _ => vec![series],
        };
        let pack = self.absorb_union_pack(&alts);
        self.make_united_of_pack(pack)
    }

    fn make_united_of_pack(&mut self, pack: Pack) -> Moid {
        let alts: Vec<Moid> = pack.iter().map(|f| f.moid).collect();
        let pack = self.absorb_union_pack(&alts);
        let pack = self.contract_union(pack);
        match pack.len() {
            0 => Moid::VOID,
            1 => pack[0].moid,
            _ => self.register(Mode::Union(pack)),
        }
    }

    /// Flatten unions inside a united pack: no union directly inside a union.
    pub fn absorb_union_pack(&mut self, alts: &[Moid]) -> Pack {
        let mut pack = Pack::new();
        for &a in alts {
            let a = self.canonical(a);
            if let Mode::Union(inner) = self.raw(a) {
                let inner = inner.clone();
                let nested: Vec<Moid> = inner.iter().map(|f| f.moid).collect();
                pack.extend(self.absorb_union_pack(&nested));
            } else {
                pack.push(Field::plain(a));
            }
        }
        pack
    }

    /// Remove duplicate alternatives, then sort so that equal united packs
    /// intern identically regardless of spelling order.
    pub fn contract_union(&self, pack: Pack) -> Pack {
        let mut out = Pack::new();
        for f in pack {
            if !out.iter().any(|g| self.modes_equivalent(g.moid, f.moid)) {
                out.push(f);
            }
        }
        out.sort_by_key(|f| self.canonical(f.moid));
        out
    }

    /// Render a mode with a bounded width, so cyclic modes stay printable.
    pub fn render(&self, m: Moid, interner: &Interner) -> String {
        let mut out = String::new();
        self.render_into(m, interner, 0, &mut out);
        out
    }

    fn render_into(&self, m: Moid, interner: &Interner, depth: usize, out: &mut String) {
        if depth > 6 {
            out.push_str("...");
            return;
        }
        let m = self.canonical(m);
        match self.raw(m) {
            Mode::Standard { name, long } => {
                for _ in 0..*long {
                    out.push_str("LONG ");
                }
                out.push_str(match name {
                    StdName::Int => "INT",
                    StdName::Real => "REAL",
                    StdName::Bool => "BOOL",
                    StdName::Char => "CHAR",
                    StdName::Bits => "BITS",
                    StdName::Bytes => "BYTES",
                    StdName::Compl => "COMPL",
                });
            }
            Mode::Ref(inner) => {
                out.push_str("REF ");
                self.render_into(*inner, interner, depth + 1, out);
            }
            Mode::Flex(inner) => {
                if m == Moid::STRING {
                    out.push_str("STRING");
                } else {
                    out.push_str("FLEX ");
                    self.render_into(*inner, interner, depth + 1, out);
                }
            }
            Mode::Row { dim, elem } => {
                out.push('[');
                for _ in 1..*dim {
                    out.push(',');
                }
                out.push_str("] ");
                self.render_into(*elem, interner, depth + 1, out);
            }
            Mode::Struct(pack) => {
                out.push_str("STRUCT (");
                for (i, f) in pack.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.render_into(f.moid, interner, depth + 1, out);
                    if let Some(label) = f.label {
                        out.push(' ');
                        out.push_str(interner.resolve(label));
                    }
                }
                out.push(')');
            }
            Mode::Union(pack) => {
                out.push_str("UNION (");
                for (i, f) in pack.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.render_into(f.moid, interner, depth + 1, out);
                }
                out.push(')');
            }
            Mode::Proc { params, result } => {
                out.push_str("PROC ");
                if !params.is_empty() {
                    out.push('(');
                    for (i, p) in params.iter().enumerate() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        self.render_into(*p, interner, depth + 1, out);
                    }
                    out.push_str(") ");
                }
                self.render_into(*result, interner, depth + 1, out);
            }
            Mode::Series(pack) | Mode::Stowed(pack) => {
                out.push('(');
                for (i, f) in pack.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.render_into(f.moid, interner, depth + 1, out);
                }
                out.push(')');
            }
            Mode::Format => out.push_str("FORMAT"),
            Mode::File => out.push_str("FILE"),
            Mode::Sound => out.push_str("SOUND"),
            Mode::Hip => out.push_str("HIP"),
            Mode::Vacuum => out.push_str("VACUUM"),
            Mode::Void => out.push_str("VOID"),
            Mode::ErrorMode => out.push_str("ERROR"),
            Mode::Undefined => out.push_str("UNDEFINED"),
            Mode::Rows => out.push_str("ROWS"),
            Mode::SimplIn => out.push_str("SIMPLIN"),
            Mode::SimplOut => out.push_str("SIMPLOUT"),
        }
    }
}

impl Default for ModeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_moids_match_registration_order() {
        let t = ModeTable::new();
        assert_eq!(t.raw(Moid::VOID), &Mode::Void);
        assert_eq!(
            t.raw(Moid::INT),
            &Mode::Standard { name: StdName::Int, long: 0 }
        );
        assert_eq!(
            t.raw(Moid::LONG_LONG_REAL),
            &Mode::Standard { name: StdName::Real, long: 2 }
        );
        assert_eq!(
            t.raw(Moid::LONG_BYTES),
            &Mode::Standard { name: StdName::Bytes, long: 1 }
        );
        assert_eq!(t.raw(Moid::FORMAT), &Mode::Format);
        assert_eq!(t.raw(Moid::ROW_CHAR), &Mode::Row { dim: 1, elem: Moid::CHAR });
        assert_eq!(t.raw(Moid::STRING), &Mode::Flex(Moid::ROW_CHAR));
        assert_eq!(t.raw(Moid::ROW_SIMPLIN), &Mode::Row { dim: 1, elem: Moid::SIMPLIN });
        assert_eq!(t.raw(Moid::REF_STRING), &Mode::Ref(Moid::STRING));
    }

    #[test]
    fn register_is_idempotent() {
        let mut t = ModeTable::new();
        let r1 = t.register(Mode::Ref(Moid::INT));
        let r2 = t.register(Mode::Ref(Moid::INT));
        assert_eq!(r1, r2);
        let r3 = t.register(Mode::Ref(Moid::REAL));
        assert_ne!(r1, r3);
    }

    #[test]
    fn recursive_modes_unify() {
        // MODE A = STRUCT (INT v, REF A next) declared twice produces one
        // canonical representative.
        let mut t = ModeTable::new();
        let mut interner = Interner::new();
        let v = interner.intern("v");
        let next = interner.intern("next");

        let a = t.new_pending();
        let ref_a = t.register(Mode::Ref(a));
        t.resolve_pending(
            a,
            Mode::Struct(vec![
                Field { moid: Moid::INT, label: Some(v) },
                Field { moid: ref_a, label: Some(next) },
            ]),
        );

        let b = t.new_pending();
        let ref_b = t.register(Mode::Ref(b));
        t.resolve_pending(
            b,
            Mode::Struct(vec![
                Field { moid: Moid::INT, label: Some(v) },
                Field { moid: ref_b, label: Some(next) },
            ]),
        );

        assert!(t.modes_equivalent(a, b));
        assert_eq!(t.canonical(b), t.canonical(a));
    }

    #[test]
    fn equivalence_terminates_on_self_reference() {
        let mut t = ModeTable::new();
        let a = t.new_pending();
        let ref_a = t.register(Mode::Ref(a));
        t.resolve_pending(a, Mode::Struct(vec![Field::plain(ref_a)]));
        // A mode is equivalent to itself even through its own cycle.
        assert!(t.modes_equivalent(a, a));
        // And inequivalent to a differently-shaped struct.
        let other = t.register(Mode::Struct(vec![Field::plain(Moid::INT)]));
        assert!(!t.modes_equivalent(a, other));
    }

    #[test]
    fn deflex_strips_flex_and_descends_rows() {
        let mut t = ModeTable::new();
        assert_eq!(t.deflexed(Moid::STRING), Moid::ROW_CHAR);
        let row_string = t.register(Mode::Row { dim: 1, elem: Moid::STRING });
        let expected = t.register(Mode::Row { dim: 1, elem: Moid::ROW_CHAR });
        assert_eq!(t.deflexed(row_string), expected);
    }

    #[test]
    fn deflex_does_not_descend_ref() {
        let mut t = ModeTable::new();
        let ref_string = t.register(Mode::Ref(Moid::STRING));
        assert_eq!(t.deflexed(ref_string), ref_string);
    }

    #[test]
    fn name_and_slice_of_rows() {
        let mut t = ModeTable::new();
        let row2_int = t.register(Mode::Row { dim: 2, elem: Moid::INT });
        let row1_int = t.register(Mode::Row { dim: 1, elem: Moid::INT });
        assert_eq!(t.slice_of(row2_int), Some(row1_int));
        assert_eq!(t.slice_of(row1_int), Some(Moid::INT));

        let ref_row = t.register(Mode::Ref(row1_int));
        let ref_int = t.register(Mode::Ref(Moid::INT));
        assert_eq!(t.name_of(ref_row), Some(ref_int));
    }

    #[test]
    fn trim_of_flex_name() {
        let mut t = ModeTable::new();
        let ref_string = t.register(Mode::Ref(Moid::STRING));
        let ref_row_char = t.register(Mode::Ref(Moid::ROW_CHAR));
        assert_eq!(t.trim_of(ref_string), Some(ref_row_char));
    }

    #[test]
    fn multiple_of_row_of_struct() {
        let mut t = ModeTable::new();
        let mut interner = Interner::new();
        let x = interner.intern("x");
        let st = t.register(Mode::Struct(vec![Field { moid: Moid::REAL, label: Some(x) }]));
        let row_st = t.register(Mode::Row { dim: 1, elem: st });
        let row_real = t.register(Mode::Row { dim: 1, elem: Moid::REAL });
        let expected = t.register(Mode::Struct(vec![Field { moid: row_real, label: Some(x) }]));
        assert_eq!(t.multiple_of(row_st), Some(expected));
    }

    #[test]
    fn series_absorbs_nested_series() {
        let mut t = ModeTable::new();
        let inner = t.make_series(&[Moid::INT, Moid::REAL]);
        let outer = t.make_series(&[inner, Moid::BOOL]);
        match t.raw(outer) {
            Mode::Series(pack) => {
                assert_eq!(pack.len(), 3);
                assert!(pack.iter().all(|f| !matches!(t.raw(f.moid), Mode::Series(_))));
            }
            other => panic!("expected series, got {:?}", other),
        }
    }

    #[test]
    fn one_element_series_collapses() {
        let mut t = ModeTable::new();
        assert_eq!(t.make_series(&[Moid::INT]), Moid::INT);
    }

    #[test]
    fn united_pack_is_absorbed_contracted_and_unordered() {
        let mut t = ModeTable::new();
        let s1 = t.make_series(&[Moid::INT, Moid::REAL]);
        let u1 = t.make_united(s1);
        let s2 = t.make_series(&[Moid::REAL, Moid::INT, Moid::INT]);
        let u2 = t.make_united(s2);
        assert_eq!(u1, u2);
        // UNION (UNION (INT, REAL), BOOL) absorbs to a flat three-way union.
        let s3 = t.make_series(&[u1, Moid::BOOL]);
        let u3 = t.make_united(s3);
        match t.raw(u3) {
            Mode::Union(pack) => assert_eq!(pack.len(), 3),
            other => panic!("expected union, got {:?}", other),
        }
    }

    #[test]
    fn one_alternative_union_collapses() {
        let mut t = ModeTable::new();
        let s = t.make_series(&[Moid::INT, Moid::INT]);
        assert_eq!(t.make_united(s), Moid::INT);
    }

    #[test]
    fn has_ref_is_transitive() {
        let mut t = ModeTable::new();
        let ref_int = t.register(Mode::Ref(Moid::INT));
        let row_ref = t.register(Mode::Row { dim: 1, elem: ref_int });
        assert!(t.has_ref(ref_int));
        assert!(t.has_ref(row_ref));
        assert!(!t.has_ref(Moid::ROW_CHAR));
        assert!(!t.has_ref(Moid::STRING));
    }

    #[test]
    fn render_is_bounded_on_cycles() {
        let mut t = ModeTable::new();
        let interner = Interner::new();
        let a = t.new_pending();
        let ref_a = t.register(Mode::Ref(a));
        t.resolve_pending(a, Mode::Struct(vec![Field::plain(ref_a)]));
        let s = t.render(a, &interner);
        assert!(s.contains("STRUCT"));
        assert!(s.contains("..."));
        assert!(s.len() < 200);
    }

    #[test]
    fn render_spellings() {
        let mut t = ModeTable::new();
        let interner = Interner::new();
        assert_eq!(t.render(Moid::LONG_INT, &interner), "LONG INT");
        assert_eq!(t.render(Moid::STRING, &interner), "STRING");
        let row2 = t.register(Mode::Row { dim: 2, elem: Moid::REAL });
        assert_eq!(t.render(row2, &interner), "[,] REAL");
        let p = t.register(Mode::Proc { params: vec![Moid::INT], result: Moid::BOOL });
        assert_eq!(t.render(p, &interner), "PROC (INT) BOOL");
    }
}
