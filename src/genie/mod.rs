//! The genie: the tree-walking interpreter core.
//!
//! A preprocessing pass assigns every node a propagator and computes frame
//! offsets for identifier tags; the walker then executes the coercion-
//! annotated tree against the frame stack, the expression stack, and the
//! handle-indirected heap. One landing pad per invocation catches runtime
//! errors, jumps across frames, and forced quits, as an explicit unwind
//! value rather than a host exception.

pub mod heap;
pub mod stack;
pub mod value;

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::ast::{Attr, NodeId, Propagator, Tree};
use crate::intern::Interner;
use crate::modes::predicates::Regime;
use crate::modes::{Mode, ModeTable, Moid, StdName};
use crate::prelude::StdFun;
use crate::scope::{SymbolTables, TableId, TagId, TagKind};
use crate::token::Span;

use heap::{Heap, HeapError};
use stack::FrameStack;
use value::{Dim, ProcKind, ProcVal, RefVal, RowVal, Target, Value};

#[derive(Debug)]
pub struct RuntimeError {
    pub span: Span,
    pub message: String,
}

/// The result-carrying unwind protocol.
#[derive(Debug)]
pub enum Unwind {
    Error(RuntimeError),
    Jump(TagId),
    Quit(String),
}

pub type Exec<T> = Result<T, Unwind>;

#[derive(Clone, Debug)]
pub struct GenieOptions {
    pub max_frames: usize,
    pub stack_cells: usize,
    pub heap_cells: usize,
    pub heap_handles: usize,
    pub trace: bool,
    pub time_limit: Option<u64>,
    pub regression: bool,
    /// Echo transput to stdout as it happens.
    pub echo: bool,
}

impl Default for GenieOptions {
    fn default() -> Self {
        GenieOptions {
            max_frames: 4096,
            stack_cells: 1 << 16,
            heap_cells: 1 << 20,
            heap_handles: 1 << 16,
            trace: false,
            time_limit: None,
            regression: false,
            echo: false,
        }
    }
}

// ----------------------------------------------------------------------
// Preprocessing: frame offsets and propagators
// ----------------------------------------------------------------------

/// Compute frame-slot offsets for every identifier-like tag, frame sizes
/// per routine range, and the per-node propagators.
pub fn preprocess(tree: &mut Tree, tables: &mut SymbolTables, modes: &ModeTable) {
    // Frame roots: a routine table owns a frame; nested non-routine ranges
    // share it.
    let table_count = tables.table_count();
    let mut frame_root: Vec<usize> = Vec::with_capacity(table_count);
    for i in 0..table_count {
        let t = tables.table(TableId::from_index(i));
        let root = match t.parent {
            None => i,
            Some(parent) => {
                if t.level > tables.table(parent).level {
                    i
                } else {
                    frame_root[parent.index()]
                }
            }
        };
        frame_root.push(root);
    }
    let mut counters = vec![0u32; table_count];
    for i in 0..tables.tag_count() {
        let id = TagId::from_index(i);
        let tag = tables.tag(id);
        let owns_slot = match tag.kind {
            TagKind::Identifier => tag.std_index.is_none(),
            TagKind::Operator => tag.std_index.is_none(),
            _ => false,
        };
        if !owns_slot {
            continue;
        }
        let root = frame_root[tag.table.index()];
        let offset = counters[root];
        counters[root] += 1;
        let tag = tables.tag_mut(id);
        tag.offset = offset;
    }
    for i in 0..table_count {
        tables.table_mut(TableId::from_index(i)).slots = counters[i];
    }

    for i in 0..tree.len() {
        let id = NodeId::from_index(i);
        let prop = propagator_for(tree.attr(id));
        tree.node_mut(id).genie.propagator = prop;
        match tree.attr(id) {
            Attr::Identifier => {
                if let Some(tag) = tree.node(id).tag {
                    let t = tables.tag(tag);
                    let (level, offset) = (t.level, t.offset);
                    let g = &mut tree.node_mut(id).genie;
                    g.level = level;
                    g.offset = offset;
                }
            }
            Attr::Selection => {
                if let Some(index) = selection_index(tree, modes, id) {
                    tree.node_mut(id).genie.offset = index as u32;
                }
            }
            _ => {}
        }
    }
}

fn propagator_for(attr: Attr) -> Propagator {
    match attr {
        a if a.is_denotation() => Propagator::Constant,
        a if a.is_coercion() => Propagator::Coercion,
        Attr::Identifier => Propagator::LocalIdentifier,
        Attr::MonadicFormula | Attr::DyadicFormula => Propagator::Formula,
        Attr::Call => Propagator::Call,
        Attr::Slice => Propagator::Slice,
        Attr::Selection => Propagator::Selection,
        Attr::Assignation => Propagator::Assignation,
        Attr::IdentityRelation { .. } => Propagator::IdentityRelation,
        Attr::Cast => Propagator::Cast,
        Attr::Generator { .. } => Propagator::Generator,
        Attr::RoutineText => Propagator::RoutineText,
        Attr::Jump => Propagator::Jump,
        Attr::SkipSymbol | Attr::NihilSymbol => Propagator::SkipOrNihil,
        Attr::SerialClause => Propagator::Serial,
        Attr::ClosedClause => Propagator::Closed,
        Attr::CollateralClause => Propagator::Collateral,
        Attr::ParallelClause => Propagator::Parallel,
        Attr::ConditionalClause => Propagator::Conditional,
        Attr::CaseClause => Propagator::IntCase,
        Attr::ConformityClause => Propagator::Conformity,
        Attr::LoopClause => Propagator::Loop,
        Attr::ModeDecl
        | Attr::PrioDecl
        | Attr::IdentityDecl
        | Attr::VariableDecl
        | Attr::OperatorDecl => Propagator::Declaration,
        _ => Propagator::Unprepared,
    }
}

/// Index of the selected field in the secondary's structure.
fn selection_index(tree: &Tree, modes: &ModeTable, n: NodeId) -> Option<usize> {
    let sym = tree.node(n).symbol;
    let sub = tree.sub(n)?;
    let mut m = tree.moid(sub)?;
    loop {
        match modes.mode(m) {
            Mode::Ref(inner) => m = *inner,
            Mode::Proc { params, result } if params.is_empty() => m = *result,
            Mode::Flex(inner) => m = *inner,
            Mode::Row { elem, .. } => m = *elem,
            Mode::Struct(pack) => {
                return pack.iter().position(|f| f.label == Some(sym));
            }
            _ => return None,
        }
    }
}

// ----------------------------------------------------------------------
// The interpreter proper
// ----------------------------------------------------------------------

pub struct Genie<'a> {
    tree: &'a Tree,
    modes: &'a mut ModeTable,
    tables: &'a SymbolTables,
    interner: &'a Interner,
    funs: &'a [StdFun],
    frames: FrameStack,
    stack: Vec<Value>,
    stack_cells: usize,
    heap: Heap,
    pub output: String,
    echo: bool,
    input: VecDeque<String>,
    stdin_fallback: bool,
    rng: StdRng,
    deadline: Option<Instant>,
    steps: u64,
    trace: bool,
}

impl<'a> Genie<'a> {
    pub fn new(
        tree: &'a Tree,
        modes: &'a mut ModeTable,
        tables: &'a SymbolTables,
        interner: &'a Interner,
        funs: &'a [StdFun],
        options: &GenieOptions,
    ) -> Self {
        let seed = if options.regression {
            1
        } else {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(1)
        };
        Genie {
            tree,
            modes,
            tables,
            interner,
            funs,
            frames: FrameStack::new(options.max_frames),
            stack: Vec::new(),
            stack_cells: options.stack_cells,
            heap: Heap::new(options.heap_cells, options.heap_handles),
            output: String::new(),
            echo: options.echo,
            input: VecDeque::new(),
            stdin_fallback: options.echo,
            rng: StdRng::seed_from_u64(seed),
            deadline: options
                .time_limit
                .map(|secs| Instant::now() + Duration::from_secs(secs)),
            steps: 0,
            trace: options.trace,
        }
    }

    /// Provide input lines for `read`, instead of standard input.
    pub fn feed_input(&mut self, lines: &[&str]) {
        for line in lines {
            for token in line.split_whitespace() {
                self.input.push_back(token.to_string());
            }
        }
        self.stdin_fallback = false;
    }

    pub fn collections(&self) -> usize {
        self.heap.collections()
    }

    /// The dynamic chain at the moment of an error, for `--backtrace`.
    pub fn backtrace(&self) -> String {
        let mut out = String::new();
        for i in (0..self.frames.depth()).rev() {
            let f = self.frames.frame(i);
            out.push_str(&format!(
                "  frame {:3}  lexical level {:2}  {} locals\n",
                i,
                f.lex_level,
                f.locals.len()
            ));
        }
        out
    }

    /// Run a preprocessed program; this is the landing pad armed per
    /// invocation.
    pub fn run(&mut self, root: NodeId) -> Result<(), Unwind> {
        let table = self
            .tree
            .node(root)
            .table
            .expect("program node carries its table");
        let slots = self.tables.table(table).slots as usize;
        let level = self.tables.table(table).level;
        self.frames
            .push(0, level, slots)
            .expect("the first frame always fits");
        let body = self.tree.sub(root).expect("program has a body");
        let result = self.execute(body);
        match result {
            Ok(()) => {
                self.stack.pop();
                Ok(())
            }
            Err(Unwind::Jump(tag)) => Err(Unwind::Error(RuntimeError {
                span: self.tree.node(body).span,
                message: format!(
                    "jump to {} escaped the program",
                    self.interner.resolve(self.tables.tag(tag).name)
                ),
            })),
            Err(other) => Err(other),
        }
    }

    fn error<T>(&self, span: Span, message: impl Into<String>) -> Exec<T> {
        Err(Unwind::Error(RuntimeError {
            span,
            message: message.into(),
        }))
    }

    /// Execute one node, leaving exactly one value on the expression
    /// stack.
    fn execute(&mut self, n: NodeId) -> Exec<()> {
        self.steps += 1;
        if self.steps % 4096 == 0 {
            if let Some(deadline) = self.deadline {
                if Instant::now() > deadline {
                    return Err(Unwind::Quit("time limit exceeded".to_string()));
                }
            }
        }
        if self.stack.len() > self.stack_cells {
            return self.error(self.tree.node(n).span, "expression stack overflow");
        }
        if self.trace {
            eprintln!(
                "a68: trace: {:?} at {}..{}",
                self.tree.attr(n),
                self.tree.node(n).span.start,
                self.tree.node(n).span.end
            );
        }
        match self.tree.node(n).genie.propagator {
            Propagator::Constant => self.exec_constant(n),
            Propagator::LocalIdentifier => self.exec_identifier(n),
            Propagator::Coercion => self.exec_coercion(n),
            Propagator::Formula => self.exec_formula(n),
            Propagator::Call => self.exec_call(n),
            Propagator::Slice => self.exec_slice(n),
            Propagator::Selection => self.exec_selection(n),
            Propagator::Assignation => self.exec_assignation(n),
            Propagator::IdentityRelation => self.exec_identity_relation(n),
            Propagator::Cast | Propagator::Closed => {
                let sub = self.tree.sub(n).expect("enclosed construct has a body");
                self.execute(sub)
            }
            Propagator::Generator => self.exec_generator(n),
            Propagator::RoutineText => self.exec_routine_text(n),
            Propagator::Jump => {
                let tag = self.tree.node(n).tag.expect("jump was resolved");
                Err(Unwind::Jump(tag))
            }
            Propagator::SkipOrNihil => self.exec_skip_or_nihil(n),
            Propagator::Serial => self.exec_serial(n),
            Propagator::Collateral => self.exec_collateral(n),
            Propagator::Parallel => self.exec_parallel(n),
            Propagator::Conditional => self.exec_conditional(n),
            Propagator::IntCase => self.exec_case(n),
            Propagator::Conformity => self.exec_conformity(n),
            Propagator::Loop => self.exec_loop(n),
            Propagator::Declaration => self.exec_declaration(n),
            Propagator::Unprepared => self.error(
                self.tree.node(n).span,
                format!("construct {:?} has no propagator", self.tree.attr(n)),
            ),
        }
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("expression stack discipline")
    }

    // ------------------------------------------------------------------
    // Heap plumbing
    // ------------------------------------------------------------------

    fn collect_garbage(&mut self) {
        self.heap
            .collect(self.frames.roots().chain(self.stack.iter()));
    }

    /// Allocate, collecting first when past the high-water mark. The cells
    /// are rooted on the expression stack while the collector runs.
    fn allocate(&mut self, moid: Moid, cells: Vec<Value>, span: Span) -> Exec<usize> {
        if self.heap.past_high_water() {
            let n = cells.len();
            for c in &cells {
                self.stack.push(c.clone());
            }
            self.collect_garbage();
            self.stack.truncate(self.stack.len() - n);
        }
        match self.heap.alloc(moid, cells) {
            Ok(h) => Ok(h),
            Err((_, retry)) => {
                // One full collection before giving up.
                let n = retry.len();
                for c in &retry {
                    self.stack.push(c.clone());
                }
                self.collect_garbage();
                self.stack.truncate(self.stack.len() - n);
                match self.heap.alloc(moid, retry) {
                    Ok(h) => Ok(h),
                    Err((HeapError::OutOfCells, _)) => self.error(span, "heap exhausted"),
                    Err((HeapError::OutOfHandles, _)) => {
                        self.error(span, "handle pool exhausted")
                    }
                }
            }
        }
    }

    fn alloc_row(&mut self, moid: Moid, bounds: &[(i64, i64)], cells: Vec<Value>, span: Span) -> Exec<Value> {
        let handle = self.allocate(moid, cells, span)?;
        Ok(Value::Row(RowVal::fresh(handle, bounds)))
    }

    fn string_value(&mut self, text: &str, span: Span) -> Exec<Value> {
        let cells: Vec<Value> = text.chars().map(Value::Char).collect();
        let n = cells.len() as i64;
        self.alloc_row(Moid::ROW_CHAR, &[(1, n)], cells, span)
    }

    fn row_to_string(&self, row: &RowVal) -> String {
        row.iter_flat()
            .iter()
            .map(|&i| match self.heap.get(row.handle, i) {
                Some(Value::Char(c)) => *c,
                _ => ' ',
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Names
    // ------------------------------------------------------------------

    fn fetch_ref(&self, r: &RefVal, span: Span) -> Exec<Value> {
        match &r.target {
            Target::Frame {
                frame,
                offset,
                path,
            } => {
                let base = match self.frames.get(*frame, *offset) {
                    Some(v) => v,
                    None => return self.error(span, "value is used before initialisation"),
                };
                match navigate(base, path) {
                    Some(v) => Ok(v.clone()),
                    None => self.error(span, "value is used before initialisation"),
                }
            }
            Target::Heap {
                handle,
                index,
                path,
            } => {
                let base = match self.heap.get(*handle, *index) {
                    Some(v) => v,
                    None => return self.error(span, "dangling name"),
                };
                match navigate(base, path) {
                    Some(v) => Ok(v.clone()),
                    None => self.error(span, "value is used before initialisation"),
                }
            }
            Target::Trim { row } => Ok(Value::Row((**row).clone())),
        }
    }

    fn store_ref(&mut self, r: &RefVal, v: Value, span: Span) -> Exec<()> {
        match &r.target {
            Target::Trim { row } => {
                let dst = (**row).clone();
                match v {
                    Value::Row(src) => self.copy_row(&src, &dst, span),
                    _ => self.error(span, "a rows value is required here"),
                }
            }
            Target::Frame {
                frame,
                offset,
                path,
            } => {
                if path.is_empty() {
                    let existing = self.frames.get(*frame, *offset).cloned();
                    if let Some(done) = self.try_row_overwrite(&existing, &v, span)? {
                        let _ = done;
                        return Ok(());
                    }
                    self.frames.set(*frame, *offset, v);
                    Ok(())
                } else {
                    let (frame, offset, path) = (*frame, *offset, path.clone());
                    match self.frames.frame_mut(frame).locals[offset].as_mut() {
                        Some(base) => match navigate_mut(base, &path) {
                            Some(slot) => {
                                *slot = v;
                                Ok(())
                            }
                            None => self.error(span, "value is used before initialisation"),
                        },
                        None => self.error(span, "value is used before initialisation"),
                    }
                }
            }
            Target::Heap {
                handle,
                index,
                path,
            } => {
                if path.is_empty() {
                    let existing = self.heap.get(*handle, *index).cloned();
                    if let Some(done) = self.try_row_overwrite(&existing, &v, span)? {
                        let _ = done;
                        return Ok(());
                    }
                    if !self.heap.set(*handle, *index, v) {
                        return self.error(span, "dangling name");
                    }
                    Ok(())
                } else {
                    let (handle, index, path) = (*handle, *index, path.clone());
                    match self.heap.get_mut(handle, index) {
                        Some(base) => match navigate_mut(base, &path) {
                            Some(slot) => {
                                *slot = v;
                                Ok(())
                            }
                            None => self.error(span, "value is used before initialisation"),
                        },
                        None => self.error(span, "dangling name"),
                    }
                }
            }
        }
    }

    /// Assigning a row of the same shape writes through the existing
    /// descriptor, so trims taken earlier stay aliased. A different shape
    /// (a flex name growing or shrinking) replaces the descriptor.
    fn try_row_overwrite(
        &mut self,
        existing: &Option<Value>,
        v: &Value,
        span: Span,
    ) -> Exec<Option<()>> {
        if let (Some(Value::Row(old)), Value::Row(new)) = (existing, v) {
            if old.dims.len() == new.dims.len() && old.element_count() == new.element_count() {
                self.copy_row(new, &old.clone(), span)?;
                return Ok(Some(()));
            }
        }
        Ok(None)
    }

    fn copy_row(&mut self, src: &RowVal, dst: &RowVal, span: Span) -> Exec<()> {
        if src.element_count() != dst.element_count() {
            return self.error(span, "bounds do not match in rows assignment");
        }
        let cells: Vec<Value> = src
            .iter_flat()
            .iter()
            .map(|&i| {
                self.heap
                    .get(src.handle, i)
                    .cloned()
                    .unwrap_or(Value::Void)
            })
            .collect();
        for (d, v) in dst.iter_flat().into_iter().zip(cells) {
            self.heap.set(dst.handle, d, v);
        }
        Ok(())
    }

    /// Innermost frame depth a value keeps alive; 0 is primal.
    fn value_scope(&self, v: &Value) -> u32 {
        match v {
            Value::Ref(r) => r.scope,
            Value::Proc(ProcVal { kind, partial, .. }) => {
                let own = match kind {
                    ProcKind::Routine { env_frame, .. } => *env_frame as u32 + 1,
                    ProcKind::Std(_) => 0,
                };
                partial
                    .iter()
                    .flatten()
                    .map(|p| self.value_scope(p))
                    .fold(own, u32::max)
            }
            Value::Struct(fields) => fields.iter().map(|f| self.value_scope(f)).max().unwrap_or(0),
            Value::United { value, .. } => self.value_scope(value),
            Value::Row(row) => row
                .iter_flat()
                .iter()
                .filter_map(|&i| self.heap.get(row.handle, i))
                .map(|cell| self.value_scope(&cell.clone()))
                .max()
                .unwrap_or(0),
            _ => 0,
        }
    }

    fn default_value(&mut self, moid: Moid, span: Span) -> Exec<Value> {
        let moid = self.modes.canonical(moid);
        match self.modes.raw(moid).clone() {
            Mode::Standard { name, .. } => Ok(match name {
                StdName::Int => Value::Int(0),
                StdName::Real => Value::Real(0.0),
                StdName::Bool => Value::Bool(false),
                StdName::Char => Value::Char(' '),
                StdName::Bits => Value::Bits(0),
                StdName::Bytes => Value::Bits(0),
                StdName::Compl => Value::Complex(0.0, 0.0),
            }),
            Mode::Row { dim, .. } => {
                let bounds = vec![(1i64, 0i64); dim as usize];
                self.alloc_row(moid, &bounds, Vec::new(), span)
            }
            Mode::Flex(row) => self.default_value(row, span),
            Mode::Struct(pack) => {
                // Keep part-built fields rooted while later defaults
                // allocate.
                let mark = self.stack.len();
                for f in pack {
                    let v = self.default_value(f.moid, span)?;
                    self.stack.push(v);
                }
                let fields: Vec<Value> = self.stack.drain(mark..).collect();
                Ok(Value::Struct(fields))
            }
            Mode::Union(pack) => {
                let first = pack.first().map(|f| f.moid).unwrap_or(Moid::VOID);
                let inner = self.default_value(first, span)?;
                Ok(Value::United {
                    tag: first,
                    value: Box::new(inner),
                })
            }
            Mode::Ref(_) => Ok(Value::Nil),
            _ => Ok(Value::Void),
        }
    }

    /// Build a default row with the given bounds.
    fn default_row(&mut self, row_moid: Moid, bounds: &[(i64, i64)], span: Span) -> Exec<Value> {
        let elem = match self.modes.slice_of(row_moid) {
            Some(e) => {
                let mut e = e;
                for _ in 1..bounds.len() {
                    e = match self.modes.slice_of(e) {
                        Some(x) => x,
                        None => break,
                    };
                }
                e
            }
            None => Moid::ERROR,
        };
        let total: usize = bounds
            .iter()
            .map(|&(l, u)| if u < l { 0 } else { (u - l + 1) as usize })
            .product();
        // Keep part-built cells rooted while later defaults allocate.
        let mark = self.stack.len();
        for _ in 0..total {
            let v = self.default_value(elem, span)?;
            self.stack.push(v);
        }
        let cells: Vec<Value> = self.stack.drain(mark..).collect();
        self.alloc_row(row_moid, bounds, cells, span)
    }

    // ------------------------------------------------------------------
    // Executors
    // ------------------------------------------------------------------

    fn exec_constant(&mut self, n: NodeId) -> Exec<()> {
        let span = self.tree.node(n).span;
        let v = match self.tree.attr(n) {
            Attr::IntDenotation(v) => Value::Int(v),
            Attr::RealDenotation(v) => Value::Real(v),
            Attr::BoolDenotation(v) => Value::Bool(v),
            Attr::BitsDenotation(v) => Value::Bits(v),
            Attr::CharDenotation(c) => Value::Char(c),
            Attr::StringDenotation(sym) => {
                let text = self.interner.resolve(sym).to_string();
                if self.tree.moid(n) == Some(Moid::CHAR) {
                    Value::Char(text.chars().next().unwrap_or(' '))
                } else {
                    self.string_value(&text, span)?
                }
            }
            Attr::EmptyDenotation => Value::Void,
            other => panic!("not a denotation: {:?}", other),
        };
        self.stack.push(v);
        Ok(())
    }

    fn exec_identifier(&mut self, n: NodeId) -> Exec<()> {
        let span = self.tree.node(n).span;
        let tag_id = self.tree.node(n).tag.expect("identifier was resolved");
        let tag = self.tables.tag(tag_id);
        if let Some(idx) = tag.std_index {
            let v = match self.funs[idx] {
                StdFun::Pi => Value::Real(std::f64::consts::PI),
                StdFun::Newline => Value::Char('\n'),
                _ => {
                    let params = match self.modes.mode(tag.moid) {
                        Mode::Proc { params, .. } => params.len(),
                        _ => 0,
                    };
                    Value::Proc(ProcVal {
                        kind: ProcKind::Std(idx),
                        moid: tag.moid,
                        partial: vec![None; params],
                    })
                }
            };
            self.stack.push(v);
            return Ok(());
        }
        let (level, offset) = (
            self.tree.node(n).genie.level,
            self.tree.node(n).genie.offset as usize,
        );
        let frame = match self.frames.frame_at_level(level) {
            Some(f) => f,
            None => return self.error(span, "identifier is outside every frame"),
        };
        if tag.variable {
            self.stack.push(Value::Ref(RefVal {
                scope: frame as u32 + 1,
                target: Target::Frame {
                    frame,
                    offset,
                    path: Vec::new(),
                },
            }));
            Ok(())
        } else {
            match self.frames.get(frame, offset) {
                Some(v) => {
                    let v = v.clone();
                    self.stack.push(v);
                    Ok(())
                }
                None => self.error(span, "value is used before initialisation"),
            }
        }
    }

    fn exec_coercion(&mut self, n: NodeId) -> Exec<()> {
        let span = self.tree.node(n).span;
        let sub = self.tree.sub(n).expect("coercion wraps a construct");
        self.execute(sub)?;
        match self.tree.attr(n) {
            Attr::Dereferencing => {
                let v = self.pop();
                match v {
                    Value::Ref(r) => {
                        let fetched = self.fetch_ref(&r, span)?;
                        self.stack.push(fetched);
                        Ok(())
                    }
                    Value::Nil => self.error(span, "NIL cannot be dereferenced"),
                    other => self.error(
                        span,
                        format!("cannot dereference a {}", other.kind_name()),
                    ),
                }
            }
            Attr::Deproceduring => {
                let v = self.pop();
                match v {
                    Value::Proc(p) => self.invoke(p, Vec::new(), span),
                    other => self.error(span, format!("cannot call a {}", other.kind_name())),
                }
            }
            Attr::Uniting => {
                let v = self.pop();
                let united = match v {
                    united @ Value::United { .. } => united,
                    plain => {
                        let constituent =
                            self.tree.moid(sub).expect("united constituent has a mode");
                        // The tag is the union's alternative the constituent
                        // matches, modulo deflexing.
                        let union_moid = self.tree.moid(n).expect("uniting carries its mode");
                        let tag = self.union_alternative(union_moid, constituent);
                        Value::United {
                            tag,
                            value: Box::new(plain),
                        }
                    }
                };
                self.stack.push(united);
                Ok(())
            }
            Attr::Widening => {
                let v = self.pop();
                let to = self.tree.moid(n).expect("widening carries its mode");
                let widened = self.widen_value(v, to, span)?;
                self.stack.push(widened);
                Ok(())
            }
            Attr::Rowing => {
                let to = self.tree.moid(n).expect("rowing carries its mode");
                self.exec_rowing(sub, to, span)
            }
            Attr::Voiding => {
                self.pop();
                self.stack.push(Value::Void);
                Ok(())
            }
            other => panic!("not a coercion: {:?}", other),
        }
    }

    /// The alternative of `union_moid` that `constituent` matches, values
    /// of flex and plain rows interchanging freely.
    fn union_alternative(&mut self, union_moid: Moid, constituent: Moid) -> Moid {
        let alts: Vec<Moid> = match self.modes.mode(self.modes.canonical(union_moid)) {
            Mode::Union(pack) => pack.iter().map(|f| f.moid).collect(),
            _ => return constituent,
        };
        for alt in alts {
            if crate::modes::predicates::modes_equal(self.modes, constituent, alt, Regime::Force)
            {
                return alt;
            }
        }
        constituent
    }

    fn widen_value(&mut self, v: Value, to: Moid, span: Span) -> Exec<Value> {
        let name = match self.modes.mode(to) {
            Mode::Standard { name, .. } => Some(*name),
            _ => None,
        };
        match (v, name) {
            (Value::Int(i), Some(StdName::Int)) => Ok(Value::Int(i)),
            (Value::Int(i), Some(StdName::Real)) => Ok(Value::Real(i as f64)),
            (Value::Real(r), Some(StdName::Real)) => Ok(Value::Real(r)),
            (Value::Real(r), Some(StdName::Compl)) => Ok(Value::Complex(r, 0.0)),
            (Value::Complex(re, im), Some(StdName::Compl)) => Ok(Value::Complex(re, im)),
            (Value::Bits(b), Some(StdName::Bits)) => Ok(Value::Bits(b)),
            (Value::Bits(b), None) => {
                // BITS widens to [] BOOL, most significant bit first.
                let cells: Vec<Value> = (0..64)
                    .map(|i| Value::Bool(b >> (63 - i) & 1 == 1))
                    .collect();
                self.alloc_row(Moid::ROW_BOOL, &[(1, 64)], cells, span)
            }
            (other, _) => self.error(
                span,
                format!("cannot widen a {}", other.kind_name()),
            ),
        }
    }

    fn exec_rowing(&mut self, sub: NodeId, to: Moid, span: Span) -> Exec<()> {
        if to == Moid::ROWS {
            // The operand is already some rows value.
            return Ok(());
        }
        let v = self.pop();
        match self.modes.mode(self.modes.canonical(to)).clone() {
            Mode::Ref(row_moid) => {
                // Rowing a name yields a name of a fresh multiple.
                let inner = match v {
                    Value::Ref(r) => self.fetch_ref(&r, span)?,
                    Value::Nil => return self.error(span, "NIL cannot be rowed"),
                    other => other,
                };
                let rowed = self.row_up(inner, row_moid, span)?;
                let handle = self.allocate(row_moid, vec![rowed], span)?;
                self.stack.push(Value::Ref(RefVal {
                    scope: 0,
                    target: Target::Heap {
                        handle,
                        index: 0,
                        path: Vec::new(),
                    },
                }));
                Ok(())
            }
            _ => {
                let rowed = self.row_up(v, to, span)?;
                self.stack.push(rowed);
                Ok(())
            }
        }
    }

    /// Add one dimension: a scalar becomes `[1:1]`, a row gains a
    /// leading `[1:1]` dimension sharing its handle.
    fn row_up(&mut self, v: Value, to: Moid, span: Span) -> Exec<Value> {
        match v {
            Value::Row(r) => {
                let want_dims = {
                    let d = self.modes.deflexed(to);
                    match self.modes.mode(d) {
                        Mode::Row { dim, .. } => *dim as usize,
                        _ => r.dims.len() + 1,
                    }
                };
                if want_dims == r.dims.len() + 1 {
                    let mut dims = vec![Dim {
                        lower: 1,
                        upper: 1,
                        stride: r.element_count(),
                    }];
                    dims.extend(r.dims.iter().copied());
                    Ok(Value::Row(RowVal {
                        handle: r.handle,
                        base: r.base,
                        dims,
                    }))
                } else {
                    Ok(Value::Row(r))
                }
            }
            scalar => {
                let handle = self.allocate(to, vec![scalar], span)?;
                Ok(Value::Row(RowVal::fresh(handle, &[(1, 1)])))
            }
        }
    }

    fn exec_formula(&mut self, n: NodeId) -> Exec<()> {
        let span = self.tree.node(n).span;
        let operands = self.tree.children(n);
        for &o in &operands {
            self.execute(o)?;
        }
        let tag_id = self.tree.node(n).tag.expect("operator was identified");
        let tag = self.tables.tag(tag_id);
        if let Some(idx) = tag.std_index {
            let fun = self.funs[idx];
            if operands.len() == 1 {
                let v = self.pop();
                let r = self.apply_monadic(fun, v, span)?;
                self.stack.push(r);
            } else {
                let rhs = self.pop();
                let lhs = self.pop();
                let r = self.apply_dyadic(fun, lhs, rhs, span)?;
                self.stack.push(r);
            }
            Ok(())
        } else {
            let (level, offset) = (tag.level, tag.offset as usize);
            let frame = match self.frames.frame_at_level(level) {
                Some(f) => f,
                None => return self.error(span, "operator is outside every frame"),
            };
            let proc = match self.frames.get(frame, offset) {
                Some(Value::Proc(p)) => p.clone(),
                _ => return self.error(span, "operator is used before its declaration"),
            };
            let mut args = Vec::with_capacity(operands.len());
            for _ in 0..operands.len() {
                args.push(self.pop());
            }
            args.reverse();
            self.invoke(proc, args, span)
        }
    }

    /// Invoke a routine or standard procedure; the result lands on the
    /// expression stack.
    fn invoke(&mut self, p: ProcVal, args: Vec<Value>, span: Span) -> Exec<()> {
        // Merge partially applied arguments with the supplied ones.
        let mut merged: Vec<Value> = Vec::new();
        let mut supply = args.into_iter();
        if p.partial.iter().any(|s| s.is_some()) {
            for slot in &p.partial {
                match slot {
                    Some(v) => merged.push(v.clone()),
                    None => match supply.next() {
                        Some(v) => merged.push(v),
                        None => return self.error(span, "routine is still missing arguments"),
                    },
                }
            }
        } else {
            merged.extend(supply);
        }
        match p.kind {
            ProcKind::Std(idx) => {
                let fun = self.funs[idx];
                self.apply_std_proc(fun, merged, span)
            }
            ProcKind::Routine { node, env_frame } => {
                let table = self
                    .tree
                    .node(node)
                    .table
                    .expect("routine text carries its table");
                let info = self.tables.table(table);
                let (level, slots) = (info.level, info.slots as usize);
                let frame = match self.frames.push(env_frame, level, slots) {
                    Some(f) => f,
                    None => return self.error(span, "frame stack overflow"),
                };
                for (i, v) in merged.into_iter().enumerate() {
                    self.frames.set(frame, i, v);
                }
                let body = self.tree.sub(node).expect("routine text has a body");
                let result = self.execute(body);
                self.frames.pop();
                result
            }
        }
    }

    fn exec_call(&mut self, n: NodeId) -> Exec<()> {
        let span = self.tree.node(n).span;
        let children = self.tree.children(n);
        self.execute(children[0])?;
        let mut skipped = Vec::new();
        let mut supplied = 0usize;
        for (i, &arg) in children[1..].iter().enumerate() {
            if self.tree.attr(arg) == Attr::EmptyArgument {
                skipped.push(i);
            } else {
                self.execute(arg)?;
                supplied += 1;
            }
        }
        let mut args = Vec::with_capacity(supplied);
        for _ in 0..supplied {
            args.push(self.pop());
        }
        args.reverse();
        let proc = match self.pop() {
            Value::Proc(p) => p,
            Value::Nil => return self.error(span, "NIL cannot be called"),
            other => return self.error(span, format!("cannot call a {}", other.kind_name())),
        };
        if skipped.is_empty() {
            self.invoke(proc, args, span)
        } else {
            // Partial parameterization: bind what was given, keep the rest.
            let open_slots: Vec<usize> = if p_has_partial(&proc) {
                proc.partial
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| s.is_none())
                    .map(|(i, _)| i)
                    .collect()
            } else {
                (0..children.len() - 1).collect()
            };
            let mut partial = if proc.partial.is_empty() {
                vec![None; children.len() - 1]
            } else {
                proc.partial.clone()
            };
            let mut supply = args.into_iter();
            for (k, &slot) in open_slots.iter().enumerate() {
                if skipped.contains(&k) {
                    continue;
                }
                partial[slot] = supply.next();
            }
            let moid = self
                .tree
                .moid(n)
                .expect("partial call carries the partial-proc mode");
            self.stack.push(Value::Proc(ProcVal {
                kind: proc.kind,
                moid,
                partial,
            }));
            Ok(())
        }
    }

    fn exec_slice(&mut self, n: NodeId) -> Exec<()> {
        let span = self.tree.node(n).span;
        let children = self.tree.children(n);
        self.execute(children[0])?;
        // Evaluate indexers left to right.
        enum Indexer {
            Subscript(i64),
            Trim {
                lower: Option<i64>,
                upper: Option<i64>,
                at: Option<i64>,
            },
        }
        let mut indexers = Vec::new();
        for &ix in &children[1..] {
            if self.tree.attr(ix) == Attr::Trimmer {
                let mut lower = None;
                let mut upper = None;
                let mut at = None;
                for part in self.tree.children(ix) {
                    let bound = self.tree.sub(part).expect("trimmer part has a bound");
                    self.execute(bound)?;
                    let v = match self.pop() {
                        Value::Int(i) => i,
                        other => {
                            return self.error(
                                span,
                                format!("trimmer bound is a {}", other.kind_name()),
                            )
                        }
                    };
                    match self.tree.attr(part) {
                        Attr::LowerBound => lower = Some(v),
                        Attr::UpperBound => upper = Some(v),
                        Attr::AtBound => at = Some(v),
                        _ => {}
                    }
                }
                indexers.push(Indexer::Trim { lower, upper, at });
            } else {
                self.execute(ix)?;
                match self.pop() {
                    Value::Int(i) => indexers.push(Indexer::Subscript(i)),
                    other => {
                        return self
                            .error(span, format!("subscript is a {}", other.kind_name()))
                    }
                }
            }
        }
        let primary = self.pop();
        let (row, name_scope) = match primary {
            Value::Row(r) => (r, None),
            Value::Ref(r) => {
                let fetched = self.fetch_ref(&r, span)?;
                match fetched {
                    Value::Row(row) => (row, Some(r.scope)),
                    other => {
                        return self.error(
                            span,
                            format!("cannot subscript a {}", other.kind_name()),
                        )
                    }
                }
            }
            Value::Nil => return self.error(span, "NIL cannot be subscripted"),
            other => {
                return self.error(span, format!("cannot subscript a {}", other.kind_name()))
            }
        };
        if indexers.len() != row.dims.len() {
            return self.error(span, "wrong number of subscripts");
        }
        let any_trim = indexers
            .iter()
            .any(|ix| matches!(ix, Indexer::Trim { .. }));
        if !any_trim {
            let subs: Vec<i64> = indexers
                .iter()
                .map(|ix| match ix {
                    Indexer::Subscript(i) => *i,
                    Indexer::Trim { .. } => unreachable!(),
                })
                .collect();
            let flat = match row.locate(&subs) {
                Some(f) => f,
                None => return self.error(span, "subscript out of bounds"),
            };
            match name_scope {
                Some(scope) => self.stack.push(Value::Ref(RefVal {
                    scope,
                    target: Target::Heap {
                        handle: row.handle,
                        index: flat,
                        path: Vec::new(),
                    },
                })),
                None => {
                    let v = match self.heap.get(row.handle, flat) {
                        Some(v) => v.clone(),
                        None => return self.error(span, "dangling row"),
                    };
                    self.stack.push(v);
                }
            }
            return Ok(());
        }
        // Build the trimmed descriptor over the same handle.
        let mut base = row.base;
        let mut dims = Vec::new();
        for (d, ix) in row.dims.iter().zip(indexers.iter()) {
            match ix {
                Indexer::Subscript(i) => {
                    if *i < d.lower || *i > d.upper {
                        return self.error(span, "subscript out of bounds");
                    }
                    base += (*i - d.lower) as usize * d.stride;
                }
                Indexer::Trim { lower, upper, at } => {
                    let l = lower.unwrap_or(d.lower);
                    let u = upper.unwrap_or(d.upper);
                    if l < d.lower || u > d.upper {
                        return self.error(span, "trimmer out of bounds");
                    }
                    base += (l - d.lower).max(0) as usize * d.stride;
                    let new_lower = at.unwrap_or(1);
                    let new_upper = new_lower + (u - l);
                    dims.push(Dim {
                        lower: new_lower,
                        upper: new_upper,
                        stride: d.stride,
                    });
                }
            }
        }
        let trimmed = RowVal {
            handle: row.handle,
            base,
            dims,
        };
        match name_scope {
            Some(scope) => self.stack.push(Value::Ref(RefVal {
                scope,
                target: Target::Trim {
                    row: Box::new(trimmed),
                },
            })),
            None => self.stack.push(Value::Row(trimmed)),
        }
        Ok(())
    }

    fn exec_selection(&mut self, n: NodeId) -> Exec<()> {
        let span = self.tree.node(n).span;
        let index = self.tree.node(n).genie.offset as usize;
        let sub = self.tree.sub(n).expect("selection has a secondary");
        self.execute(sub)?;
        match self.pop() {
            Value::Struct(mut fields) => {
                if index >= fields.len() {
                    return self.error(span, "no such field");
                }
                let v = fields.swap_remove(index);
                self.stack.push(v);
                Ok(())
            }
            Value::Ref(r) => {
                let mut r = r;
                match &mut r.target {
                    Target::Frame { path, .. } | Target::Heap { path, .. } => path.push(index),
                    Target::Trim { .. } => {
                        return self.error(span, "cannot select from a trimmed name")
                    }
                }
                self.stack.push(Value::Ref(r));
                Ok(())
            }
            Value::Row(row) => {
                // The multiple mode: gather the field of every element.
                let flats = row.iter_flat();
                let mut cells = Vec::with_capacity(flats.len());
                for i in flats {
                    match self.heap.get(row.handle, i) {
                        Some(Value::Struct(fields)) if index < fields.len() => {
                            cells.push(fields[index].clone());
                        }
                        _ => return self.error(span, "row element has no such field"),
                    }
                }
                let bounds: Vec<(i64, i64)> =
                    row.dims.iter().map(|d| (d.lower, d.upper)).collect();
                let moid = self.tree.moid(n).unwrap_or(Moid::ERROR);
                let v = self.alloc_row(moid, &bounds, cells, span)?;
                self.stack.push(v);
                Ok(())
            }
            Value::Nil => self.error(span, "NIL has no fields"),
            other => self.error(span, format!("cannot select from a {}", other.kind_name())),
        }
    }

    fn exec_assignation(&mut self, n: NodeId) -> Exec<()> {
        let span = self.tree.node(n).span;
        let children = self.tree.children(n);
        self.execute(children[0])?;
        self.execute(children[1])?;
        let source = self.pop();
        let dest = self.pop();
        let r = match dest {
            Value::Ref(r) => r,
            Value::Nil => return self.error(span, "assignment through NIL"),
            other => {
                return self.error(span, format!("cannot assign to a {}", other.kind_name()))
            }
        };
        if self.value_scope(&source) > r.scope {
            return self.error(
                span,
                "scope violation: the assigned value does not outlive the name",
            );
        }
        self.store_ref(&r, source, span)?;
        self.stack.push(Value::Ref(r));
        Ok(())
    }

    fn exec_identity_relation(&mut self, n: NodeId) -> Exec<()> {
        let negated = matches!(self.tree.attr(n), Attr::IdentityRelation { negated: true });
        let children = self.tree.children(n);
        self.execute(children[0])?;
        self.execute(children[1])?;
        let rhs = self.pop();
        let lhs = self.pop();
        let same = match (&lhs, &rhs) {
            (Value::Nil, Value::Nil) => true,
            (Value::Nil, Value::Ref(_)) | (Value::Ref(_), Value::Nil) => false,
            (Value::Ref(a), Value::Ref(b)) => a.target == b.target,
            _ => false,
        };
        self.stack.push(Value::Bool(same != negated));
        Ok(())
    }

    fn exec_generator(&mut self, n: NodeId) -> Exec<()> {
        let span = self.tree.node(n).span;
        let on_heap = matches!(self.tree.attr(n), Attr::Generator { heap: true });
        let name_moid = self.tree.moid(n).expect("generator carries its mode");
        let inner = match self.modes.mode(name_moid) {
            Mode::Ref(inner) => *inner,
            _ => Moid::ERROR,
        };
        let bounds = self.eval_bounds(n)?;
        let initial = match bounds {
            Some(b) => {
                let row_moid = self.modes.deflexed(inner);
                self.default_row(row_moid, &b, span)?
            }
            None => self.default_value(inner, span)?,
        };
        let handle = self.allocate(inner, vec![initial], span)?;
        let scope = if on_heap {
            0
        } else {
            self.frames.top_index() as u32 + 1
        };
        self.stack.push(Value::Ref(RefVal {
            scope,
            target: Target::Heap {
                handle,
                index: 0,
                path: Vec::new(),
            },
        }));
        Ok(())
    }

    fn eval_bounds(&mut self, n: NodeId) -> Exec<Option<Vec<(i64, i64)>>> {
        let part = match self.tree.child_with(n, Attr::BoundsPart) {
            Some(p) => p,
            None => return Ok(None),
        };
        let span = self.tree.node(n).span;
        let mut bounds = Vec::new();
        for pair in self.tree.children(part) {
            let ends = self.tree.children(pair);
            self.execute(ends[0])?;
            let lower = match self.pop() {
                Value::Int(i) => i,
                _ => return self.error(span, "a bound is not an INT"),
            };
            self.execute(ends[1])?;
            let upper = match self.pop() {
                Value::Int(i) => i,
                _ => return self.error(span, "a bound is not an INT"),
            };
            bounds.push((lower, upper));
        }
        Ok(Some(bounds))
    }

    fn exec_routine_text(&mut self, n: NodeId) -> Exec<()> {
        let moid = self.tree.moid(n).expect("routine text carries its mode");
        let params = match self.modes.mode(moid) {
            Mode::Proc { params, .. } => params.len(),
            _ => 0,
        };
        self.stack.push(Value::Proc(ProcVal {
            kind: ProcKind::Routine {
                node: n,
                env_frame: self.frames.top_index(),
            },
            moid,
            partial: vec![None; params],
        }));
        Ok(())
    }

    fn exec_skip_or_nihil(&mut self, n: NodeId) -> Exec<()> {
        let span = self.tree.node(n).span;
        match self.tree.attr(n) {
            Attr::NihilSymbol => {
                self.stack.push(Value::Nil);
                Ok(())
            }
            _ => {
                let moid = self.tree.moid(n).unwrap_or(Moid::VOID);
                let v = self.default_value(moid, span)?;
                self.stack.push(v);
                Ok(())
            }
        }
    }

    fn exec_serial(&mut self, n: NodeId) -> Exec<()> {
        let phrases = self.tree.children(n);
        if phrases.is_empty() {
            self.stack.push(Value::Void);
            return Ok(());
        }
        let table = self.tree.node(n).table;
        let base_depth = self.stack.len();
        let mut i = 0;
        while i < phrases.len() {
            match self.execute(phrases[i]) {
                Ok(()) => {
                    if i + 1 < phrases.len() {
                        self.stack.pop();
                    }
                    i += 1;
                }
                Err(Unwind::Jump(tag)) if Some(self.tables.tag(tag).table) == table => {
                    self.stack.truncate(base_depth);
                    let target = self.tables.tag(tag).node;
                    match phrases.iter().position(|&p| Some(p) == target) {
                        Some(at) => i = at,
                        None => return Err(Unwind::Jump(tag)),
                    }
                }
                Err(other) => return Err(other),
            }
        }
        Ok(())
    }

    fn exec_collateral(&mut self, n: NodeId) -> Exec<()> {
        let span = self.tree.node(n).span;
        let units = self.tree.children(n);
        let moid = self.tree.moid(n).unwrap_or(Moid::VOID);
        let moid = self.modes.deflexed(moid);
        match self.modes.mode(moid).clone() {
            Mode::Row { dim, .. } => {
                for &u in &units {
                    self.execute(u)?;
                }
                let mut values = Vec::with_capacity(units.len());
                for _ in 0..units.len() {
                    values.push(self.pop());
                }
                values.reverse();
                let v = self.build_row_display(moid, dim, values, span)?;
                self.stack.push(v);
                Ok(())
            }
            Mode::Struct(_) => {
                for &u in &units {
                    self.execute(u)?;
                }
                let mut values = Vec::with_capacity(units.len());
                for _ in 0..units.len() {
                    values.push(self.pop());
                }
                values.reverse();
                self.stack.push(Value::Struct(values));
                Ok(())
            }
            _ => {
                for &u in &units {
                    self.execute(u)?;
                    self.pop();
                }
                self.stack.push(Value::Void);
                Ok(())
            }
        }
    }

    fn build_row_display(
        &mut self,
        moid: Moid,
        dim: u32,
        values: Vec<Value>,
        span: Span,
    ) -> Exec<Value> {
        if dim <= 1 {
            let n = values.len() as i64;
            return self.alloc_row(moid, &[(1, n)], values, span);
        }
        // A display of displays: flatten sub-rows of equal bounds.
        let mut sub_bounds: Option<Vec<(i64, i64)>> = None;
        let mut cells = Vec::new();
        for v in &values {
            let row = match v {
                Value::Row(r) => r,
                other => {
                    return self.error(
                        span,
                        format!("element of a multiple display is a {}", other.kind_name()),
                    )
                }
            };
            let bounds: Vec<(i64, i64)> = row.dims.iter().map(|d| (d.lower, d.upper)).collect();
            match &sub_bounds {
                None => sub_bounds = Some(bounds),
                Some(b) if *b == bounds => {}
                Some(_) => return self.error(span, "ragged multiple display"),
            }
            for i in row.iter_flat() {
                cells.push(
                    self.heap
                        .get(row.handle, i)
                        .cloned()
                        .unwrap_or(Value::Void),
                );
            }
        }
        let mut bounds = vec![(1i64, values.len() as i64)];
        bounds.extend(sub_bounds.unwrap_or_default());
        self.alloc_row(moid, &bounds, cells, span)
    }

    fn exec_parallel(&mut self, n: NodeId) -> Exec<()> {
        // The units are cooperating tasks; the base build interleaves them
        // on one thread in clause order, and they rendezvous here before
        // control leaves the clause.
        for u in self.tree.children(n) {
            self.execute(u)?;
            self.pop();
        }
        self.stack.push(Value::Void);
        Ok(())
    }

    fn exec_conditional(&mut self, n: NodeId) -> Exec<()> {
        let span = self.tree.node(n).span;
        let children = self.tree.children(n);
        let enquiry = self.tree.sub(children[0]).expect("enquiry has a clause");
        self.execute(enquiry)?;
        let b = match self.pop() {
            Value::Bool(b) => b,
            other => {
                return self.error(span, format!("enquiry yields a {}", other.kind_name()))
            }
        };
        let part = if b {
            self.tree.child_with(n, Attr::ThenPart)
        } else {
            self.tree.child_with(n, Attr::ElsePart)
        };
        match part {
            Some(p) => {
                let body = self.tree.sub(p).expect("choice part has a body");
                self.execute(body)
            }
            None => {
                self.stack.push(Value::Void);
                Ok(())
            }
        }
    }

    fn exec_case(&mut self, n: NodeId) -> Exec<()> {
        let span = self.tree.node(n).span;
        let children = self.tree.children(n);
        let enquiry = self.tree.sub(children[0]).expect("enquiry has a clause");
        self.execute(enquiry)?;
        let i = match self.pop() {
            Value::Int(i) => i,
            other => {
                return self.error(span, format!("enquiry yields a {}", other.kind_name()))
            }
        };
        let alternatives: Vec<NodeId> = children
            .iter()
            .copied()
            .filter(|&c| self.tree.attr(c) == Attr::CaseAlternative)
            .collect();
        if i >= 1 && (i as usize) <= alternatives.len() {
            let body = self
                .tree
                .sub(alternatives[i as usize - 1])
                .expect("alternative has a unit");
            return self.execute(body);
        }
        match self.tree.child_with(n, Attr::OutPart) {
            Some(out) => {
                let body = self.tree.sub(out).expect("out part has a clause");
                self.execute(body)
            }
            None => {
                self.stack.push(Value::Void);
                Ok(())
            }
        }
    }

    fn exec_conformity(&mut self, n: NodeId) -> Exec<()> {
        let span = self.tree.node(n).span;
        let children = self.tree.children(n);
        let enquiry = self.tree.sub(children[0]).expect("enquiry has a clause");
        self.execute(enquiry)?;
        let (tag_moid, value) = match self.pop() {
            Value::United { tag, value } => (tag, *value),
            other => {
                return self.error(
                    span,
                    format!("conformity enquiry yields a {}", other.kind_name()),
                )
            }
        };
        for &alt in children
            .iter()
            .filter(|&&c| self.tree.attr(c) == Attr::ConformityAlternative)
        {
            let spec = self.tree.moid(alt).expect("specifier carries its mode");
            let matches = crate::modes::predicates::modes_equal(
                self.modes,
                tag_moid,
                spec,
                Regime::Force,
            ) || {
                let spec_alts: Vec<Moid> = match self.modes.mode(spec) {
                    Mode::Union(pack) => pack.iter().map(|f| f.moid).collect(),
                    _ => Vec::new(),
                };
                spec_alts.into_iter().any(|s| {
                    crate::modes::predicates::modes_equal(self.modes, s, tag_moid, Regime::Force)
                })
            };
            if !matches {
                continue;
            }
            if let Some(t) = self.tree.node(alt).tag {
                let info = self.tables.tag(t);
                let (level, offset) = (info.level, info.offset as usize);
                let frame = match self.frames.frame_at_level(level) {
                    Some(f) => f,
                    None => return self.error(span, "specifier is outside every frame"),
                };
                // A union-moded specifier binds the still-united value.
                let bound = match self.modes.mode(spec) {
                    Mode::Union(_) => Value::United {
                        tag: tag_moid,
                        value: Box::new(value.clone()),
                    },
                    _ => value.clone(),
                };
                self.frames.set(frame, offset, bound);
            }
            let body = self.tree.sub(alt).expect("alternative has a unit");
            return self.execute(body);
        }
        match self.tree.child_with(n, Attr::OutPart) {
            Some(out) => {
                let body = self.tree.sub(out).expect("out part has a clause");
                self.execute(body)
            }
            None => {
                if self.tree.moid(n) != Some(Moid::VOID) {
                    return self.error(span, "no specifier conforms to the united value");
                }
                self.stack.push(Value::Void);
                Ok(())
            }
        }
    }

    fn exec_loop(&mut self, n: NodeId) -> Exec<()> {
        let span = self.tree.node(n).span;
        let mut from = 1i64;
        let mut by = 1i64;
        let mut to: Option<i64> = None;
        let mut for_tag: Option<TagId> = None;
        let mut while_part = None;
        let mut do_part = None;
        let mut until_part = None;
        for part in self.tree.children(n) {
            match self.tree.attr(part) {
                Attr::ForPart => for_tag = self.tree.node(part).tag,
                Attr::FromPart => {
                    let u = self.tree.sub(part).expect("FROM has a unit");
                    self.execute(u)?;
                    from = self.pop_int(span)?;
                }
                Attr::ByPart => {
                    let u = self.tree.sub(part).expect("BY has a unit");
                    self.execute(u)?;
                    by = self.pop_int(span)?;
                }
                Attr::ToPart => {
                    let u = self.tree.sub(part).expect("TO has a unit");
                    self.execute(u)?;
                    to = Some(self.pop_int(span)?);
                }
                Attr::WhilePart => while_part = self.tree.sub(part),
                Attr::DoPart => do_part = self.tree.sub(part),
                Attr::UntilPart => until_part = self.tree.sub(part),
                _ => {}
            }
        }
        let body = do_part.expect("loop has a DO part");
        let mut i = from;
        loop {
            if let Some(to) = to {
                if (by >= 0 && i > to) || (by < 0 && i < to) {
                    break;
                }
            }
            if let Some(tag) = for_tag {
                let info = self.tables.tag(tag);
                let (level, offset) = (info.level, info.offset as usize);
                let frame = match self.frames.frame_at_level(level) {
                    Some(f) => f,
                    None => return self.error(span, "loop identifier is outside every frame"),
                };
                self.frames.set(frame, offset, Value::Int(i));
            }
            if let Some(w) = while_part {
                self.execute(w)?;
                if !self.pop_bool(span)? {
                    break;
                }
            }
            self.execute(body)?;
            self.pop();
            if let Some(u) = until_part {
                self.execute(u)?;
                if self.pop_bool(span)? {
                    break;
                }
            }
            i = match i.checked_add(by) {
                Some(next) => next,
                None => return self.error(span, "loop counter overflow"),
            };
        }
        self.stack.push(Value::Void);
        Ok(())
    }

    fn pop_int(&mut self, span: Span) -> Exec<i64> {
        match self.pop() {
            Value::Int(i) => Ok(i),
            other => self.error(span, format!("INT required, found a {}", other.kind_name())),
        }
    }

    fn pop_bool(&mut self, span: Span) -> Exec<bool> {
        match self.pop() {
            Value::Bool(b) => Ok(b),
            other => self.error(
                span,
                format!("BOOL required, found a {}", other.kind_name()),
            ),
        }
    }

    fn exec_declaration(&mut self, n: NodeId) -> Exec<()> {
        let span = self.tree.node(n).span;
        match self.tree.attr(n) {
            Attr::IdentityDecl | Attr::OperatorDecl => {
                let source = self.tree.sub(n).expect("declaration has a source");
                self.execute(source)?;
                let v = self.pop();
                self.store_tag(n, v, span)?;
            }
            Attr::VariableDecl => {
                let bounds = self.eval_bounds(n)?;
                let init = self
                    .tree
                    .children(n)
                    .into_iter()
                    .find(|&c| self.tree.attr(c) != Attr::BoundsPart);
                let name_moid = self.tree.moid(n).expect("declaration carries a mode");
                let target = match self.modes.mode(name_moid) {
                    Mode::Ref(inner) => *inner,
                    _ => Moid::ERROR,
                };
                let value = match init {
                    Some(u) => {
                        self.execute(u)?;
                        let mut v = self.pop();
                        if let (Some(b), Value::Row(row)) = (&bounds, &v) {
                            v = Value::Row(self.rebase_row(row, b, span)?);
                        }
                        Some(v)
                    }
                    None => match (&bounds, self.modes.mode(target).clone()) {
                        (Some(b), _) => {
                            let row_moid = self.modes.deflexed(target);
                            Some(self.default_row(row_moid, b, span)?)
                        }
                        (None, Mode::Flex(row)) => {
                            let b = vec![(1i64, 0i64)];
                            Some(self.default_row(row, &b, span)?)
                        }
                        _ => None,
                    },
                };
                if let Some(v) = value {
                    self.store_tag(n, v, span)?;
                }
            }
            _ => {}
        }
        self.stack.push(Value::Void);
        Ok(())
    }

    /// Rebase a fresh display onto declared bounds.
    fn rebase_row(&mut self, row: &RowVal, bounds: &[(i64, i64)], span: Span) -> Exec<RowVal> {
        if row.dims.len() != bounds.len() {
            return self.error(span, "bounds do not match the declared row");
        }
        let declared: usize = bounds
            .iter()
            .map(|&(l, u)| if u < l { 0 } else { (u - l + 1) as usize })
            .product();
        if declared != row.element_count() {
            return self.error(span, "bounds do not match the declared row");
        }
        let mut out = row.clone();
        for (d, &(l, u)) in out.dims.iter_mut().zip(bounds.iter()) {
            d.lower = l;
            d.upper = u;
        }
        Ok(out)
    }

    fn store_tag(&mut self, n: NodeId, v: Value, span: Span) -> Exec<()> {
        let tag = self.tree.node(n).tag.expect("declaration carries its tag");
        let info = self.tables.tag(tag);
        let (level, offset) = (info.level, info.offset as usize);
        let frame = match self.frames.frame_at_level(level) {
            Some(f) => f,
            None => return self.error(span, "declaration is outside every frame"),
        };
        self.frames.set(frame, offset, v);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Standard prelude semantics
    // ------------------------------------------------------------------

    fn emit(&mut self, text: &str) {
        if self.echo {
            print!("{}", text);
        }
        self.output.push_str(text);
    }

    fn apply_std_proc(&mut self, fun: StdFun, mut args: Vec<Value>, span: Span) -> Exec<()> {
        match fun {
            StdFun::Print => {
                let row = match args.pop() {
                    Some(Value::Row(r)) => r,
                    _ => return self.error(span, "print requires a [] SIMPLOUT"),
                };
                let mut text = String::new();
                for i in row.iter_flat() {
                    let cell = self
                        .heap
                        .get(row.handle, i)
                        .cloned()
                        .unwrap_or(Value::Void);
                    match cell {
                        Value::United { tag, value } => {
                            text.push_str(&self.format_simplout(tag, &value))
                        }
                        other => text.push_str(&self.format_simplout(Moid::VOID, &other)),
                    }
                }
                self.emit(&text);
                self.stack.push(Value::Void);
                Ok(())
            }
            StdFun::Read => {
                let row = match args.pop() {
                    Some(Value::Row(r)) => r,
                    _ => return self.error(span, "read requires a [] SIMPLIN"),
                };
                for i in row.iter_flat() {
                    let cell = self
                        .heap
                        .get(row.handle, i)
                        .cloned()
                        .unwrap_or(Value::Void);
                    let (tag, r) = match cell {
                        Value::United { tag, value } => match *value {
                            Value::Ref(r) => (tag, r),
                            _ => return self.error(span, "read requires names"),
                        },
                        _ => return self.error(span, "read requires names"),
                    };
                    let token = self.next_token(span)?;
                    let inner = match self.modes.mode(tag) {
                        Mode::Ref(inner) => *inner,
                        _ => Moid::ERROR,
                    };
                    let v = self.parse_token(&token, inner, span)?;
                    self.store_ref(&r, v, span)?;
                }
                self.stack.push(Value::Void);
                Ok(())
            }
            StdFun::Assert => match args.pop() {
                Some(Value::Bool(true)) => {
                    self.stack.push(Value::Void);
                    Ok(())
                }
                Some(Value::Bool(false)) => self.error(span, "assertion failed"),
                _ => self.error(span, "assert requires a BOOL"),
            },
            StdFun::Random => {
                let x: f64 = self.rng.gen();
                self.stack.push(Value::Real(x));
                Ok(())
            }
            StdFun::Sqrt | StdFun::Exp | StdFun::Ln | StdFun::Sin | StdFun::Cos
            | StdFun::Tan | StdFun::Arctan => {
                let x = match args.pop() {
                    Some(Value::Real(x)) => x,
                    _ => return self.error(span, "a REAL argument is required"),
                };
                let y = match fun {
                    StdFun::Sqrt => {
                        if x < 0.0 {
                            return self.error(span, "sqrt of a negative REAL");
                        }
                        x.sqrt()
                    }
                    StdFun::Exp => x.exp(),
                    StdFun::Ln => {
                        if x <= 0.0 {
                            return self.error(span, "ln of a non-positive REAL");
                        }
                        x.ln()
                    }
                    StdFun::Sin => x.sin(),
                    StdFun::Cos => x.cos(),
                    StdFun::Tan => x.tan(),
                    _ => x.atan(),
                };
                self.stack.push(Value::Real(y));
                Ok(())
            }
            other => self.error(span, format!("{:?} is not a procedure", other)),
        }
    }

    fn next_token(&mut self, span: Span) -> Exec<String> {
        if let Some(t) = self.input.pop_front() {
            return Ok(t);
        }
        if self.stdin_fallback {
            let mut line = String::new();
            if std::io::stdin().read_line(&mut line).unwrap_or(0) > 0 {
                for token in line.split_whitespace() {
                    self.input.push_back(token.to_string());
                }
                if let Some(t) = self.input.pop_front() {
                    return Ok(t);
                }
            }
        }
        self.error(span, "end of input on read")
    }

    fn parse_token(&mut self, token: &str, moid: Moid, span: Span) -> Exec<Value> {
        let moid = self.modes.canonical(moid);
        match self.modes.raw(moid).clone() {
            Mode::Standard { name: StdName::Int, .. } => match token.parse::<i64>() {
                Ok(v) => Ok(Value::Int(v)),
                Err(_) => self.error(span, format!("'{}' is not an INT", token)),
            },
            Mode::Standard { name: StdName::Real, .. } => match token.parse::<f64>() {
                Ok(v) => Ok(Value::Real(v)),
                Err(_) => self.error(span, format!("'{}' is not a REAL", token)),
            },
            Mode::Standard { name: StdName::Bool, .. } => match token {
                "T" | "TRUE" => Ok(Value::Bool(true)),
                "F" | "FALSE" => Ok(Value::Bool(false)),
                _ => self.error(span, format!("'{}' is not a BOOL", token)),
            },
            Mode::Standard { name: StdName::Char, .. } => {
                Ok(Value::Char(token.chars().next().unwrap_or(' ')))
            }
            _ if moid == Moid::STRING || moid == Moid::ROW_CHAR => {
                let token = token.to_string();
                self.string_value(&token, span)
            }
            _ => self.error(span, "this mode cannot be read"),
        }
    }

    fn format_simplout(&self, tag: Moid, v: &Value) -> String {
        match v {
            Value::Int(i) => format!("{:+}", i),
            Value::Real(r) => format_real(*r),
            Value::Bool(b) => if *b { "T" } else { "F" }.to_string(),
            Value::Char(c) => c.to_string(),
            Value::Bits(b) => format!("{}", b),
            Value::Complex(re, im) => format!("{} I {}", format_real(*re), format_real(*im)),
            Value::Row(row) => self.row_to_string(row),
            other => {
                let _ = tag;
                format!("({})", other.kind_name())
            }
        }
    }

    fn apply_monadic(&mut self, fun: StdFun, v: Value, span: Span) -> Exec<Value> {
        use StdFun::*;
        match (fun, v) {
            (MonadPlus, v) => Ok(v),
            (MonadMinus, Value::Int(i)) => match i.checked_neg() {
                Some(r) => Ok(Value::Int(r)),
                None => self.error(span, "integer overflow"),
            },
            (MonadMinus, Value::Real(r)) => Ok(Value::Real(-r)),
            (MonadMinus, Value::Complex(re, im)) => Ok(Value::Complex(-re, -im)),
            (Abs, Value::Int(i)) => match i.checked_abs() {
                Some(r) => Ok(Value::Int(r)),
                None => self.error(span, "integer overflow"),
            },
            (Abs, Value::Real(r)) => Ok(Value::Real(r.abs())),
            (Abs, Value::Complex(re, im)) => Ok(Value::Real(re.hypot(im))),
            (Abs, Value::Bool(b)) => Ok(Value::Int(if b { 1 } else { 0 })),
            (Abs, Value::Char(c)) => Ok(Value::Int(c as i64)),
            (Abs, Value::Bits(b)) => Ok(Value::Int(b as i64)),
            (Sign, Value::Int(i)) => Ok(Value::Int(i.signum())),
            (Sign, Value::Real(r)) => Ok(Value::Int(if r > 0.0 {
                1
            } else if r < 0.0 {
                -1
            } else {
                0
            })),
            (Odd, Value::Int(i)) => Ok(Value::Bool(i.rem_euclid(2) == 1)),
            (Entier, Value::Real(r)) => Ok(Value::Int(r.floor() as i64)),
            (Round, Value::Real(r)) => Ok(Value::Int(r.round() as i64)),
            (Repr, Value::Int(i)) => match u32::try_from(i).ok().and_then(char::from_u32) {
                Some(c) => Ok(Value::Char(c)),
                None => self.error(span, "REPR argument is not a character code"),
            },
            (Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
            (Not, Value::Bits(b)) => Ok(Value::Bits(!b)),
            (Re, Value::Complex(re, _)) => Ok(Value::Real(re)),
            (Im, Value::Complex(_, im)) => Ok(Value::Real(im)),
            (UpbMonadic, Value::Row(r)) => Ok(Value::Int(
                r.dims.first().map(|d| d.upper).unwrap_or(0),
            )),
            (LwbMonadic, Value::Row(r)) => Ok(Value::Int(
                r.dims.first().map(|d| d.lower).unwrap_or(1),
            )),
            (fun, v) => self.error(
                span,
                format!("operator {:?} cannot take a {}", fun, v.kind_name()),
            ),
        }
    }

    fn apply_dyadic(&mut self, fun: StdFun, l: Value, r: Value, span: Span) -> Exec<Value> {
        use StdFun::*;
        match (fun, l, r) {
            (Add, Value::Int(a), Value::Int(b)) => match a.checked_add(b) {
                Some(v) => Ok(Value::Int(v)),
                None => self.error(span, "integer overflow"),
            },
            (Add, Value::Real(a), Value::Real(b)) => Ok(Value::Real(a + b)),
            (Add, Value::Complex(ar, ai), Value::Complex(br, bi)) => {
                Ok(Value::Complex(ar + br, ai + bi))
            }
            (Sub, Value::Int(a), Value::Int(b)) => match a.checked_sub(b) {
                Some(v) => Ok(Value::Int(v)),
                None => self.error(span, "integer overflow"),
            },
            (Sub, Value::Real(a), Value::Real(b)) => Ok(Value::Real(a - b)),
            (Sub, Value::Complex(ar, ai), Value::Complex(br, bi)) => {
                Ok(Value::Complex(ar - br, ai - bi))
            }
            (Mul, Value::Int(a), Value::Int(b)) => match a.checked_mul(b) {
                Some(v) => Ok(Value::Int(v)),
                None => self.error(span, "integer overflow"),
            },
            (Mul, Value::Real(a), Value::Real(b)) => Ok(Value::Real(a * b)),
            (Mul, Value::Complex(ar, ai), Value::Complex(br, bi)) => {
                Ok(Value::Complex(ar * br - ai * bi, ar * bi + ai * br))
            }
            (DivReal, Value::Int(a), Value::Int(b)) => {
                if b == 0 {
                    self.error(span, "division by zero")
                } else {
                    Ok(Value::Real(a as f64 / b as f64))
                }
            }
            (DivReal, Value::Real(a), Value::Real(b)) => {
                if b == 0.0 {
                    self.error(span, "division by zero")
                } else {
                    Ok(Value::Real(a / b))
                }
            }
            (DivReal, Value::Complex(ar, ai), Value::Complex(br, bi)) => {
                let d = br * br + bi * bi;
                if d == 0.0 {
                    self.error(span, "division by zero")
                } else {
                    Ok(Value::Complex((ar * br + ai * bi) / d, (ai * br - ar * bi) / d))
                }
            }
            (Over, Value::Int(a), Value::Int(b)) => {
                if b == 0 {
                    self.error(span, "division by zero")
                } else {
                    Ok(Value::Int(a.wrapping_div(b)))
                }
            }
            (ModOp, Value::Int(a), Value::Int(b)) => {
                if b == 0 {
                    self.error(span, "division by zero")
                } else {
                    Ok(Value::Int(a.rem_euclid(b)))
                }
            }
            (Pow, Value::Int(a), Value::Int(b)) => {
                if b < 0 {
                    return self.error(span, "negative power of an INT");
                }
                match u32::try_from(b).ok().and_then(|e| a.checked_pow(e)) {
                    Some(v) => Ok(Value::Int(v)),
                    None => self.error(span, "integer overflow"),
                }
            }
            (Pow, Value::Real(a), Value::Int(b)) => Ok(Value::Real(a.powi(b as i32))),
            (Eq, a, b) => {
                let eq = self.values_equal(&a, &b);
                Ok(Value::Bool(eq))
            }
            (Ne, a, b) => {
                let eq = self.values_equal(&a, &b);
                Ok(Value::Bool(!eq))
            }
            (Lt, a, b) => self.compare(a, b, span).map(|o| Value::Bool(o.is_lt())),
            (Le, a, b) => self.compare(a, b, span).map(|o| Value::Bool(o.is_le())),
            (Gt, a, b) => self.compare(a, b, span).map(|o| Value::Bool(o.is_gt())),
            (Ge, a, b) => self.compare(a, b, span).map(|o| Value::Bool(o.is_ge())),
            (And, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a && b)),
            (Or, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a || b)),
            (And, Value::Bits(a), Value::Bits(b)) => Ok(Value::Bits(a & b)),
            (Or, Value::Bits(a), Value::Bits(b)) => Ok(Value::Bits(a | b)),
            (Elem, Value::Int(i), Value::Bits(b)) => {
                if (1..=64).contains(&i) {
                    Ok(Value::Bool(b >> (64 - i) & 1 == 1))
                } else {
                    self.error(span, "ELEM index out of range")
                }
            }
            (IOp, Value::Real(a), Value::Real(b)) => Ok(Value::Complex(a, b)),
            (IOp, Value::Int(a), Value::Int(b)) => Ok(Value::Complex(a as f64, b as f64)),
            (Concat, a, b) => {
                let s = format!("{}{}", self.text_of(&a), self.text_of(&b));
                self.string_value(&s, span)
            }
            (Repeat, a, b) => {
                let (text, count) = match (&a, &b) {
                    (Value::Int(n), other) => (self.text_of(other), *n),
                    (other, Value::Int(n)) => (self.text_of(other), *n),
                    _ => return self.error(span, "rows repetition requires an INT"),
                };
                let s = text.repeat(count.max(0) as usize);
                self.string_value(&s, span)
            }
            (UpbDyadic, Value::Int(k), Value::Row(r)) => {
                match r.dims.get((k - 1).max(0) as usize) {
                    Some(d) => Ok(Value::Int(d.upper)),
                    None => self.error(span, "UPB dimension out of range"),
                }
            }
            (LwbDyadic, Value::Int(k), Value::Row(r)) => {
                match r.dims.get((k - 1).max(0) as usize) {
                    Some(d) => Ok(Value::Int(d.lower)),
                    None => self.error(span, "LWB dimension out of range"),
                }
            }
            (PlusAb | MinusAb | TimesAb | DivAb | OverAb | ModAb, Value::Ref(r), b) => {
                let current = self.fetch_ref(&r, span)?;
                let inner_fun = match fun {
                    PlusAb => Add,
                    MinusAb => Sub,
                    TimesAb => Mul,
                    DivAb => DivReal,
                    OverAb => Over,
                    _ => ModOp,
                };
                let updated = self.apply_dyadic(inner_fun, current, b, span)?;
                self.store_ref(&r, updated, span)?;
                Ok(Value::Ref(r))
            }
            (PlusAbString, Value::Ref(r), b) => {
                let current = self.fetch_ref(&r, span)?;
                let s = format!("{}{}", self.text_of(&current), self.text_of(&b));
                let new = self.string_value(&s, span)?;
                self.store_ref(&r, new, span)?;
                Ok(Value::Ref(r))
            }
            (fun, l, r) => self.error(
                span,
                format!(
                    "operator {:?} cannot take a {} and a {}",
                    fun,
                    l.kind_name(),
                    r.kind_name()
                ),
            ),
        }
    }

    fn text_of(&self, v: &Value) -> String {
        match v {
            Value::Char(c) => c.to_string(),
            Value::Row(r) => self.row_to_string(r),
            other => other.kind_name().to_string(),
        }
    }

    fn values_equal(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Real(x), Value::Real(y)) => x == y,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Char(x), Value::Char(y)) => x == y,
            (Value::Bits(x), Value::Bits(y)) => x == y,
            (Value::Complex(xr, xi), Value::Complex(yr, yi)) => xr == yr && xi == yi,
            (Value::Row(x), Value::Row(y)) => self.row_to_string(x) == self.row_to_string(y),
            _ => false,
        }
    }

    fn compare(&mut self, a: Value, b: Value, span: Span) -> Exec<std::cmp::Ordering> {
        use std::cmp::Ordering;
        match (&a, &b) {
            (Value::Int(x), Value::Int(y)) => Ok(x.cmp(y)),
            (Value::Real(x), Value::Real(y)) => {
                Ok(x.partial_cmp(y).unwrap_or(Ordering::Equal))
            }
            (Value::Char(x), Value::Char(y)) => Ok(x.cmp(y)),
            (Value::Row(x), Value::Row(y)) => {
                Ok(self.row_to_string(x).cmp(&self.row_to_string(y)))
            }
            _ => self.error(
                span,
                format!("cannot compare a {} and a {}", a.kind_name(), b.kind_name()),
            ),
        }
    }
}

fn p_has_partial(p: &ProcVal) -> bool {
    !p.partial.is_empty()
}

fn navigate<'v>(mut v: &'v Value, path: &[usize]) -> Option<&'v Value> {
    for &i in path {
        match v {
            Value::Struct(fields) => v = fields.get(i)?,
            _ => return None,
        }
    }
    Some(v)
}

fn navigate_mut<'v>(mut v: &'v mut Value, path: &[usize]) -> Option<&'v mut Value> {
    for &i in path {
        match v {
            Value::Struct(fields) => v = fields.get_mut(i)?,
            _ => return None,
        }
    }
    Some(v)
}

/// Default fixed-point rendering, sign always shown.
pub fn format_real(x: f64) -> String {
    format!("{:+.6}", x)
}
