//! The syntax tree handed from the parser to the mode checker, the coercion
//! inserter, and finally the interpreter.
//!
//! Nodes live in one index-addressed arena; `sub` points at the first child
//! and `next` at the following sibling. The two checking passes fill in
//! `moid` and `tag`; the preprocessor fills the genie side-record.

use bitflags::bitflags;

use crate::intern::Symbol;
use crate::modes::Moid;
use crate::scope::{TableId, TagId};
use crate::token::Span;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn from_index(i: usize) -> NodeId {
        NodeId(i as u32)
    }
}

/// What a node is. Composite constructs keep their parts in fixed positions
/// of the child chain, with role wrappers (`ThenPart`, `OutPart`, …) where a
/// part is optional or repeated.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Attr {
    Program,

    // Declarations
    ModeDecl,
    PrioDecl,
    IdentityDecl,
    VariableDecl,
    OperatorDecl,

    // Enclosed clauses
    SerialClause,
    ClosedClause,
    CollateralClause,
    ParallelClause,
    ConditionalClause,
    CaseClause,
    ConformityClause,
    LoopClause,

    // Clause parts
    EnquiryClause,
    ThenPart,
    ElsePart,
    CaseAlternative,
    ConformityAlternative,
    OutPart,
    ForPart,
    FromPart,
    ByPart,
    ToPart,
    WhilePart,
    DoPart,
    UntilPart,

    // Actual row bounds of a variable declaration or generator
    BoundsPart,
    BoundPair,

    // Units
    Assignation,
    IdentityRelation { negated: bool },
    Cast,
    Call,
    EmptyArgument,
    Slice,
    Trimmer,
    LowerBound,
    UpperBound,
    AtBound,
    Selection,
    MonadicFormula,
    DyadicFormula,
    Identifier,
    Jump,
    SkipSymbol,
    NihilSymbol,
    Generator { heap: bool },
    RoutineText,

    // Denotations
    IntDenotation(i64),
    RealDenotation(f64),
    BoolDenotation(bool),
    BitsDenotation(u64),
    CharDenotation(char),
    StringDenotation(Symbol),
    EmptyDenotation,

    // Coercions, inserted after mode checking
    Dereferencing,
    Deproceduring,
    Uniting,
    Widening,
    Rowing,
    Voiding,
}

impl Attr {
    /// Coercion wrappers are skipped when the inserter re-runs.
    pub fn is_coercion(self) -> bool {
        matches!(
            self,
            Attr::Dereferencing
                | Attr::Deproceduring
                | Attr::Uniting
                | Attr::Widening
                | Attr::Rowing
                | Attr::Voiding
        )
    }

    /// A MORF: moded-or-formed construct whose voiding must first unwind a
    /// `REF PROC` chain.
    pub fn is_morf(self) -> bool {
        matches!(
            self,
            Attr::Call
                | Attr::Slice
                | Attr::Selection
                | Attr::RoutineText
                | Attr::MonadicFormula
                | Attr::DyadicFormula
                | Attr::Identifier
        )
    }

    pub fn is_denotation(self) -> bool {
        matches!(
            self,
            Attr::IntDenotation(_)
                | Attr::RealDenotation(_)
                | Attr::BoolDenotation(_)
                | Attr::BitsDenotation(_)
                | Attr::CharDenotation(_)
                | Attr::StringDenotation(_)
                | Attr::EmptyDenotation
        )
    }
}

bitflags! {
    /// Per-node state shared by the passes.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct Status: u32 {
        /// Coercion wrapping for this node is final.
        const COERCED = 1 << 0;
        /// Produced by the denotation-widening hoist.
        const OPTIMAL = 1 << 1;
        /// The interpreter polls for interrupts at this node.
        const INTERRUPTIBLE = 1 << 2;
        /// A breakpoint is armed here.
        const BREAKPOINT = 1 << 3;
    }
}

/// Executor discriminant assigned by the preprocessor.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Propagator {
    #[default]
    Unprepared,
    Constant,
    LocalIdentifier,
    Coercion,
    Formula,
    Call,
    Slice,
    Selection,
    Assignation,
    IdentityRelation,
    Cast,
    Generator,
    RoutineText,
    Jump,
    SkipOrNihil,
    Serial,
    Closed,
    Collateral,
    Parallel,
    Conditional,
    IntCase,
    Conformity,
    Loop,
    Declaration,
}

/// Interpreter side-record: the propagator plus the precomputed lexical
/// level and frame offset of identifier-like nodes.
#[derive(Clone, Copy, Debug, Default)]
pub struct GenieInfo {
    pub propagator: Propagator,
    pub level: u32,
    pub offset: u32,
}

#[derive(Clone, Debug)]
pub struct Node {
    pub attr: Attr,
    pub span: Span,
    pub sub: Option<NodeId>,
    pub next: Option<NodeId>,
    pub symbol: Symbol,
    pub moid: Option<Moid>,
    pub table: Option<TableId>,
    pub tag: Option<TagId>,
    pub status: Status,
    pub genie: GenieInfo,
}

pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub fn new() -> Self {
        Tree { nodes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn new_node(&mut self, attr: Attr, span: Span) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            attr,
            span,
            sub: None,
            next: None,
            symbol: Symbol::EMPTY,
            moid: None,
            table: None,
            tag: None,
            status: Status::empty(),
            genie: GenieInfo::default(),
        });
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn attr(&self, id: NodeId) -> Attr {
        self.nodes[id.index()].attr
    }

    pub fn sub(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].sub
    }

    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].next
    }

    pub fn moid(&self, id: NodeId) -> Option<Moid> {
        self.nodes[id.index()].moid
    }

    /// Attach `children` as the child chain of `parent`.
    pub fn adopt(&mut self, parent: NodeId, children: &[NodeId]) {
        let mut prev: Option<NodeId> = None;
        for &c in children {
            match prev {
                None => self.nodes[parent.index()].sub = Some(c),
                Some(p) => self.nodes[p.index()].next = Some(c),
            }
            self.nodes[c.index()].next = None;
            prev = Some(c);
        }
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = self.sub(id);
        while let Some(c) = cur {
            out.push(c);
            cur = self.next(c);
        }
        out
    }

    pub fn nth_child(&self, id: NodeId, n: usize) -> Option<NodeId> {
        let mut cur = self.sub(id);
        for _ in 0..n {
            cur = cur.and_then(|c| self.next(c));
        }
        cur
    }

    /// Find the first child with the given attribute.
    pub fn child_with(&self, id: NodeId, attr: Attr) -> Option<NodeId> {
        self.children(id).into_iter().find(|&c| self.attr(c) == attr)
    }

    /// Deep-copy a subtree; the copy has no sibling.
    pub fn clone_subtree(&mut self, id: NodeId) -> NodeId {
        let children = self.children(id);
        let copies: Vec<NodeId> = children.iter().map(|&c| self.clone_subtree(c)).collect();
        let copy = NodeId(self.nodes.len() as u32);
        let mut node = self.nodes[id.index()].clone();
        node.next = None;
        node.sub = None;
        self.nodes.push(node);
        self.adopt(copy, &copies);
        copy
    }

    /// Wrap `id` in a fresh coercion parent in place: the node's contents
    /// move to a new cell which becomes the single child, and the original
    /// cell becomes the wrapper, so links from the parent stay valid.
    pub fn wrap(&mut self, id: NodeId, attr: Attr, moid: Moid) -> NodeId {
        let inner_id = NodeId(self.nodes.len() as u32);
        let mut inner = self.nodes[id.index()].clone();
        inner.next = None;
        self.nodes.push(inner);
        let outer = &mut self.nodes[id.index()];
        outer.attr = attr;
        outer.sub = Some(inner_id);
        outer.moid = Some(moid);
        outer.tag = None;
        outer.genie = GenieInfo::default();
        inner_id
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adopt_builds_sibling_chain() {
        let mut t = Tree::new();
        let p = t.new_node(Attr::SerialClause, Span::default());
        let a = t.new_node(Attr::SkipSymbol, Span::default());
        let b = t.new_node(Attr::NihilSymbol, Span::default());
        t.adopt(p, &[a, b]);
        assert_eq!(t.children(p), vec![a, b]);
        assert_eq!(t.nth_child(p, 1), Some(b));
        assert_eq!(t.nth_child(p, 2), None);
    }

    #[test]
    fn wrap_preserves_outer_identity() {
        let mut t = Tree::new();
        let p = t.new_node(Attr::SerialClause, Span::default());
        let u = t.new_node(Attr::IntDenotation(1), Span::default());
        let v = t.new_node(Attr::IntDenotation(2), Span::default());
        t.adopt(p, &[u, v]);
        t.node_mut(u).moid = Some(Moid::INT);

        let inner = t.wrap(u, Attr::Widening, Moid::REAL);
        // The parent still reaches the wrapper under the old id.
        assert_eq!(t.children(p), vec![u, v]);
        assert_eq!(t.attr(u), Attr::Widening);
        assert_eq!(t.moid(u), Some(Moid::REAL));
        // The wrapped denotation kept its payload and mode.
        assert_eq!(t.attr(inner), Attr::IntDenotation(1));
        assert_eq!(t.moid(inner), Some(Moid::INT));
        assert_eq!(t.next(inner), None);
    }

    #[test]
    fn morf_classification() {
        assert!(Attr::Call.is_morf());
        assert!(Attr::Identifier.is_morf());
        assert!(!Attr::Cast.is_morf());
        assert!(Attr::Voiding.is_coercion());
        assert!(Attr::IntDenotation(0).is_denotation());
    }
}
