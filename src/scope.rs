//! Symbol tables: one per range, chained through parents, holding
//! identifier, indicant, operator, priority, and label entries.

use crate::ast::NodeId;
use crate::intern::Symbol;
use crate::modes::Moid;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TableId(u32);

impl TableId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn from_index(i: usize) -> TableId {
        TableId(i as u32)
    }

    /// The standard environ.
    pub const ROOT: TableId = TableId(0);
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TagId(u32);

impl TagId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn from_index(i: usize) -> TagId {
        TagId(i as u32)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TagKind {
    Identifier,
    Indicant,
    Operator,
    Label,
    Priority,
}

#[derive(Clone, Debug)]
pub struct Tag {
    pub name: Symbol,
    pub kind: TagKind,
    /// Identifiers: their mode. Operators: the procedure mode. Indicants:
    /// the declared mode.
    pub moid: Moid,
    pub table: TableId,
    pub prio: u8,
    /// Index into the standard-prelude implementation table, for tags the
    /// standard environ owns.
    pub std_index: Option<usize>,
    /// Defining node: the source unit of a declaration, the routine text of
    /// a proc, the labelled unit of a label.
    pub node: Option<NodeId>,
    /// Frame offset, set by the preprocessor.
    pub offset: u32,
    /// Lexical level of the owning table.
    pub level: u32,
    /// A variable's slot holds the referred-to instance; the identifier
    /// yields a name for it. Identity-declared tags yield the slot value.
    pub variable: bool,
}

pub struct SymTable {
    pub parent: Option<TableId>,
    pub level: u32,
    pub entries: Vec<TagId>,
    /// Routine parameters in declaration order, when this is a routine range.
    pub params: Vec<TagId>,
    /// Number of identifier slots in a frame of this range.
    pub slots: u32,
}

pub struct SymbolTables {
    tables: Vec<SymTable>,
    tags: Vec<Tag>,
}

impl SymbolTables {
    /// Creates the table chain with the standard environ as root.
    pub fn new() -> Self {
        SymbolTables {
            tables: vec![SymTable {
                parent: None,
                level: 0,
                entries: Vec::new(),
                params: Vec::new(),
                slots: 0,
            }],
            tags: Vec::new(),
        }
    }

    /// A range that shares its enclosing frame: the lexical level carries
    /// over.
    pub fn new_table(&mut self, parent: TableId) -> TableId {
        let level = self.tables[parent.index()].level;
        self.push_table(parent, level)
    }

    /// A routine range: locals live in a fresh frame one lexical level down.
    pub fn new_routine_table(&mut self, parent: TableId) -> TableId {
        let level = self.tables[parent.index()].level + 1;
        self.push_table(parent, level)
    }

    fn push_table(&mut self, parent: TableId, level: u32) -> TableId {
        let id = TableId(self.tables.len() as u32);
        self.tables.push(SymTable {
            parent: Some(parent),
            level,
            entries: Vec::new(),
            params: Vec::new(),
            slots: 0,
        });
        id
    }

    pub fn table(&self, id: TableId) -> &SymTable {
        &self.tables[id.index()]
    }

    pub fn table_mut(&mut self, id: TableId) -> &mut SymTable {
        &mut self.tables[id.index()]
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    pub fn tag(&self, id: TagId) -> &Tag {
        &self.tags[id.index()]
    }

    pub fn tag_mut(&mut self, id: TagId) -> &mut Tag {
        &mut self.tags[id.index()]
    }

    pub fn add_tag(&mut self, table: TableId, name: Symbol, kind: TagKind, moid: Moid) -> TagId {
        let id = TagId(self.tags.len() as u32);
        let level = self.tables[table.index()].level;
        self.tags.push(Tag {
            name,
            kind,
            moid,
            table,
            prio: 0,
            std_index: None,
            node: None,
            offset: 0,
            level,
            variable: false,
        });
        self.tables[table.index()].entries.push(id);
        id
    }

    /// Is `name` already declared with this kind directly in `table`?
    pub fn declared_here(&self, table: TableId, name: Symbol, kind: TagKind) -> bool {
        self.tables[table.index()]
            .entries
            .iter()
            .any(|&t| self.tags[t.index()].name == name && self.tags[t.index()].kind == kind)
    }

    /// Innermost tag of the given kind visible from `table`.
    pub fn lookup(&self, table: TableId, name: Symbol, kind: TagKind) -> Option<TagId> {
        let mut cur = Some(table);
        while let Some(t) = cur {
            for &tag in self.tables[t.index()].entries.iter().rev() {
                let entry = &self.tags[tag.index()];
                if entry.name == name && entry.kind == kind {
                    return Some(tag);
                }
            }
            cur = self.tables[t.index()].parent;
        }
        None
    }

    /// All operator tags with this name visible from `table`, innermost
    /// ranges first.
    pub fn operators(&self, table: TableId, name: Symbol) -> Vec<TagId> {
        let mut out = Vec::new();
        let mut cur = Some(table);
        while let Some(t) = cur {
            for &tag in &self.tables[t.index()].entries {
                let entry = &self.tags[tag.index()];
                if entry.name == name && entry.kind == TagKind::Operator {
                    out.push(tag);
                }
            }
            cur = self.tables[t.index()].parent;
        }
        out
    }

    /// Declared priority of a dyadic operator, if any is visible.
    pub fn priority(&self, table: TableId, name: Symbol) -> Option<u8> {
        self.lookup(table, name, TagKind::Priority)
            .map(|t| self.tags[t.index()].prio)
    }
}

impl Default for SymbolTables {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Interner;

    #[test]
    fn inner_declaration_shadows_outer() {
        let mut tables = SymbolTables::new();
        let mut interner = Interner::new();
        let x = interner.intern("x");
        let outer = tables.new_table(TableId::ROOT);
        let inner = tables.new_table(outer);
        let t1 = tables.add_tag(outer, x, TagKind::Identifier, Moid::INT);
        let t2 = tables.add_tag(inner, x, TagKind::Identifier, Moid::REAL);
        assert_eq!(tables.lookup(inner, x, TagKind::Identifier), Some(t2));
        assert_eq!(tables.lookup(outer, x, TagKind::Identifier), Some(t1));
    }

    #[test]
    fn operators_collects_up_the_chain() {
        let mut tables = SymbolTables::new();
        let mut interner = Interner::new();
        let plus = interner.intern("+");
        let outer = tables.new_table(TableId::ROOT);
        let inner = tables.new_table(outer);
        let o1 = tables.add_tag(TableId::ROOT, plus, TagKind::Operator, Moid::VOID);
        let o2 = tables.add_tag(inner, plus, TagKind::Operator, Moid::VOID);
        assert_eq!(tables.operators(inner, plus), vec![o2, o1]);
    }

    #[test]
    fn only_routine_ranges_bump_the_lexical_level() {
        let mut tables = SymbolTables::new();
        let program = tables.new_routine_table(TableId::ROOT);
        let serial = tables.new_table(program);
        let routine = tables.new_routine_table(serial);
        assert_eq!(tables.table(TableId::ROOT).level, 0);
        assert_eq!(tables.table(program).level, 1);
        assert_eq!(tables.table(serial).level, 1);
        assert_eq!(tables.table(routine).level, 2);
    }

    #[test]
    fn declared_here_ignores_parents() {
        let mut tables = SymbolTables::new();
        let mut interner = Interner::new();
        let x = interner.intern("x");
        let outer = tables.new_table(TableId::ROOT);
        let inner = tables.new_table(outer);
        tables.add_tag(outer, x, TagKind::Identifier, Moid::INT);
        assert!(tables.declared_here(outer, x, TagKind::Identifier));
        assert!(!tables.declared_here(inner, x, TagKind::Identifier));
    }
}
