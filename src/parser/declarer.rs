//! Declarers and declarations.
//!
//! A declarer is parsed straight into a registered [`Moid`]; actual row
//! bounds (units) are collected into a `BoundsPart` subtree for the
//! interpreter to evaluate at elaboration time.

use super::{ParseResult, Parser};
use crate::ast::{Attr, NodeId};
use crate::modes::{Field, Mode, Moid, Pack, StdName};
use crate::scope::TagKind;
use crate::token::TokenType;

impl<'a> Parser<'a> {
    pub(crate) fn starts_declarer(&self, t: &TokenType) -> bool {
        match t {
            TokenType::Ref
            | TokenType::Flex
            | TokenType::Struct
            | TokenType::Union
            | TokenType::Proc
            | TokenType::Long
            | TokenType::Short
            | TokenType::Int
            | TokenType::Real
            | TokenType::Bool
            | TokenType::Char
            | TokenType::Bits
            | TokenType::Bytes
            | TokenType::Compl
            | TokenType::StringWord
            | TokenType::Void
            | TokenType::Format
            | TokenType::File
            | TokenType::OpenBracket => true,
            TokenType::Bold(sym) => self.is_indicant(*sym),
            _ => false,
        }
    }

    /// Parse a declarer. When `actual` holds, outermost row bounds may be
    /// actual bounds; the returned node is their `BoundsPart`.
    pub(crate) fn parse_declarer(
        &mut self,
        actual: bool,
    ) -> ParseResult<(Moid, Option<NodeId>)> {
        match self.peek().clone() {
            TokenType::Ref => {
                self.advance();
                let (inner, _) = self.parse_declarer(false)?;
                Ok((self.modes.register(Mode::Ref(inner)), None))
            }
            TokenType::Flex => {
                self.advance();
                if !self.at(&TokenType::OpenBracket) {
                    self.diags.syntax_error(
                        self.peek_span(),
                        "expected a rows declarer after FLEX",
                    );
                    return Err(());
                }
                let (row, bounds) = self.parse_row_declarer(actual)?;
                Ok((self.modes.register(Mode::Flex(row)), bounds))
            }
            TokenType::OpenBracket => self.parse_row_declarer(actual),
            TokenType::Struct => {
                self.advance();
                let pack = self.parse_struct_pack()?;
                Ok((self.modes.register(Mode::Struct(pack)), None))
            }
            TokenType::Union => {
                self.advance();
                self.expect(&TokenType::OpenParen, "'(' after UNION")?;
                let mut alts = Vec::new();
                loop {
                    let (m, _) = self.parse_declarer(false)?;
                    alts.push(m);
                    if !self.eat(&TokenType::Comma) {
                        break;
                    }
                }
                self.expect(&TokenType::CloseParen, "')' after the united declarers")?;
                let series = self.modes.register(Mode::Series(
                    alts.iter().map(|&m| Field::plain(m)).collect(),
                ));
                Ok((self.modes.make_united(series), None))
            }
            TokenType::Proc => {
                self.advance();
                let mut params = Vec::new();
                if self.at(&TokenType::OpenParen) {
                    self.advance();
                    loop {
                        let (m, _) = self.parse_declarer(false)?;
                        params.push(m);
                        if !self.eat(&TokenType::Comma) {
                            break;
                        }
                    }
                    self.expect(&TokenType::CloseParen, "')' after the parameter modes")?;
                }
                let (result, _) = self.parse_declarer(false)?;
                Ok((self.modes.register(Mode::Proc { params, result }), None))
            }
            TokenType::Long | TokenType::Short => self.parse_sized_standard(),
            TokenType::Int => {
                self.advance();
                Ok((Moid::INT, None))
            }
            TokenType::Real => {
                self.advance();
                Ok((Moid::REAL, None))
            }
            TokenType::Bool => {
                self.advance();
                Ok((Moid::BOOL, None))
            }
            TokenType::Char => {
                self.advance();
                Ok((Moid::CHAR, None))
            }
            TokenType::Bits => {
                self.advance();
                Ok((Moid::BITS, None))
            }
            TokenType::Bytes => {
                self.advance();
                Ok((Moid::BYTES, None))
            }
            TokenType::Compl => {
                self.advance();
                Ok((Moid::COMPL, None))
            }
            TokenType::StringWord => {
                self.advance();
                Ok((Moid::STRING, None))
            }
            TokenType::Void => {
                self.advance();
                Ok((Moid::VOID, None))
            }
            TokenType::Format => {
                self.advance();
                Ok((Moid::FORMAT, None))
            }
            TokenType::File => {
                self.advance();
                Ok((Moid::FILE, None))
            }
            TokenType::Bold(sym) => {
                if let Some(tag) = self.tables.lookup(self.current_table, sym, TagKind::Indicant)
                {
                    self.advance();
                    Ok((self.tables.tag(tag).moid, None))
                } else {
                    let sp = self.peek_span();
                    self.diags.syntax_error(
                        sp,
                        format!("unknown mode indicant {}", self.interner.resolve(sym)),
                    );
                    Err(())
                }
            }
            other => {
                let sp = self.peek_span();
                self.diags
                    .syntax_error(sp, format!("expected a declarer, found {:?}", other));
                Err(())
            }
        }
    }

    fn parse_sized_standard(&mut self) -> ParseResult<(Moid, Option<NodeId>)> {
        let mut long: i32 = 0;
        loop {
            match self.peek() {
                TokenType::Long => {
                    long += 1;
                    self.advance();
                }
                TokenType::Short => {
                    let sp = self.peek_span();
                    self.diags
                        .syntax_error(sp, "SHORT modes are not supported");
                    self.advance();
                }
                _ => break,
            }
        }
        let long = long.min(2) as u8;
        let name = match self.peek() {
            TokenType::Int => StdName::Int,
            TokenType::Real => StdName::Real,
            TokenType::Bits => StdName::Bits,
            TokenType::Bytes => StdName::Bytes,
            TokenType::Compl => StdName::Compl,
            other => {
                let sp = self.peek_span();
                self.diags.syntax_error(
                    sp,
                    format!("expected a sizeable mode after LONG, found {:?}", other),
                );
                return Err(());
            }
        };
        self.advance();
        let long = match name {
            StdName::Bytes => long.min(1),
            _ => long,
        };
        Ok((self.modes.register(Mode::Standard { name, long }), None))
    }

    /// `[ bounds ] elem`; each dimension is `l:u`, `u` (lower 1), or formal.
    fn parse_row_declarer(&mut self, actual: bool) -> ParseResult<(Moid, Option<NodeId>)> {
        let open = self.peek_span();
        self.expect(&TokenType::OpenBracket, "'['")?;
        let mut dim = 0u32;
        let mut pairs: Vec<NodeId> = Vec::new();
        let mut any_actual = false;
        loop {
            dim += 1;
            if matches!(self.peek(), TokenType::Comma | TokenType::CloseBracket) {
                // Formal dimension.
                if !self.eat(&TokenType::Comma) {
                    break;
                }
                continue;
            }
            any_actual = true;
            let first = self.parse_unit()?;
            let pair = self.tree.new_node(Attr::BoundPair, self.tree.node(first).span);
            if self.eat(&TokenType::Colon) {
                let upper = self.parse_unit()?;
                self.tree.adopt(pair, &[first, upper]);
            } else {
                // `[n]` means `[1:n]`.
                let one = self
                    .tree
                    .new_node(Attr::IntDenotation(1), self.tree.node(first).span);
                self.tree.node_mut(one).moid = Some(Moid::INT);
                self.tree.adopt(pair, &[one, first]);
            }
            pairs.push(pair);
            if !self.eat(&TokenType::Comma) {
                break;
            }
        }
        self.expect(&TokenType::CloseBracket, "']' after the bounds")?;
        let (elem, _) = self.parse_declarer(false)?;
        let moid = self.modes.register(Mode::Row { dim, elem });
        if any_actual && pairs.len() != dim as usize {
            self.diags.syntax_error(
                open,
                "either all bounds of a rows declarer are given or none",
            );
            return Err(());
        }
        if !actual && any_actual {
            self.diags
                .syntax_error(open, "actual bounds are not allowed in this declarer");
            return Err(());
        }
        let bounds = if any_actual {
            let part = self.tree.new_node(Attr::BoundsPart, open);
            self.tree.adopt(part, &pairs);
            Some(part)
        } else {
            None
        };
        Ok((moid, bounds))
    }

    fn parse_struct_pack(&mut self) -> ParseResult<Pack> {
        self.expect(&TokenType::OpenParen, "'(' after STRUCT")?;
        let mut pack = Pack::new();
        'outer: loop {
            let (m, _) = self.parse_declarer(false)?;
            loop {
                match self.peek().clone() {
                    TokenType::Identifier(sym) => {
                        self.advance();
                        pack.push(Field { moid: m, label: Some(sym) });
                    }
                    other => {
                        let sp = self.peek_span();
                        self.diags.syntax_error(
                            sp,
                            format!("expected a field selector, found {:?}", other),
                        );
                        return Err(());
                    }
                }
                if !self.eat(&TokenType::Comma) {
                    break 'outer;
                }
                if self.starts_declarer(&self.peek().clone()) {
                    continue 'outer;
                }
            }
        }
        self.expect(&TokenType::CloseParen, "')' after the fields")?;
        Ok(pack)
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    /// Parse one declaration, appending a node per defined tag.
    pub(crate) fn parse_declaration(&mut self, out: &mut Vec<NodeId>) -> ParseResult<()> {
        match self.peek().clone() {
            TokenType::Mode => self.parse_mode_declaration(out),
            TokenType::Prio => self.parse_priority_declaration(out),
            TokenType::Op => self.parse_operator_declaration(out),
            TokenType::Proc
                if matches!(self.peek_at(1), TokenType::Identifier(_))
                    && matches!(self.peek_at(2), TokenType::Equals) =>
            {
                self.parse_proc_identity(out)
            }
            _ => self.parse_identity_or_variable(out),
        }
    }

    fn parse_mode_declaration(&mut self, out: &mut Vec<NodeId>) -> ParseResult<()> {
        self.expect(&TokenType::Mode, "MODE")?;
        loop {
            let span = self.peek_span();
            let name = match self.peek().clone() {
                TokenType::Bold(sym) => {
                    self.advance();
                    sym
                }
                other => {
                    self.diags.syntax_error(
                        span,
                        format!("expected a mode indicant after MODE, found {:?}", other),
                    );
                    return Err(());
                }
            };
            self.expect(&TokenType::Equals, "'=' in the mode declaration")?;
            // Pre-register the indicant so the declarer can refer to itself.
            let pending = self.modes.new_pending();
            let tag = self
                .tables
                .add_tag(self.current_table, name, TagKind::Indicant, pending);
            let (moid, _) = self.parse_declarer(false)?;
            let resolved = self.modes.raw(moid).clone();
            self.modes.resolve_pending(pending, resolved);
            let node = self.tree.new_node(Attr::ModeDecl, span.merge(self.prev_span()));
            self.tree.node_mut(node).symbol = name;
            self.tree.node_mut(node).tag = Some(tag);
            self.tree.node_mut(node).moid = Some(pending);
            self.tree.node_mut(node).table = Some(self.current_table);
            out.push(node);
            if !self.eat(&TokenType::Comma) {
                return Ok(());
            }
        }
    }

    fn parse_priority_declaration(&mut self, out: &mut Vec<NodeId>) -> ParseResult<()> {
        self.expect(&TokenType::Prio, "PRIO")?;
        loop {
            let span = self.peek_span();
            let name = self.parse_operator_symbol()?;
            self.expect(&TokenType::Equals, "'=' in the priority declaration")?;
            let prio = match self.peek().clone() {
                TokenType::IntDenotation(v) if (1..=9).contains(&v) => {
                    self.advance();
                    v as u8
                }
                other => {
                    self.diags.syntax_error(
                        self.peek_span(),
                        format!("expected a priority between 1 and 9, found {:?}", other),
                    );
                    return Err(());
                }
            };
            let tag = self
                .tables
                .add_tag(self.current_table, name, TagKind::Priority, Moid::VOID);
            self.tables.tag_mut(tag).prio = prio;
            let node = self.tree.new_node(Attr::PrioDecl, span.merge(self.prev_span()));
            self.tree.node_mut(node).symbol = name;
            self.tree.node_mut(node).tag = Some(tag);
            self.tree.node_mut(node).table = Some(self.current_table);
            out.push(node);
            if !self.eat(&TokenType::Comma) {
                return Ok(());
            }
        }
    }

    fn parse_operator_symbol(&mut self) -> ParseResult<crate::intern::Symbol> {
        match self.peek().clone() {
            TokenType::Operator(sym) | TokenType::Bold(sym) => {
                self.advance();
                Ok(sym)
            }
            TokenType::Equals => {
                self.advance();
                Ok(crate::intern::Symbol::EQUALS)
            }
            other => {
                let sp = self.peek_span();
                self.diags.syntax_error(
                    sp,
                    format!("expected an operator symbol, found {:?}", other),
                );
                Err(())
            }
        }
    }

    fn parse_operator_declaration(&mut self, out: &mut Vec<NodeId>) -> ParseResult<()> {
        self.expect(&TokenType::Op, "OP")?;
        loop {
            let span = self.peek_span();
            // Declared-mode form: OP (INT, INT) INT name = unit.
            let declared = if self.at(&TokenType::OpenParen) {
                let mut params = Vec::new();
                self.advance();
                loop {
                    let (m, _) = self.parse_declarer(false)?;
                    params.push(m);
                    if !self.eat(&TokenType::Comma) {
                        break;
                    }
                }
                self.expect(&TokenType::CloseParen, "')' after the operand modes")?;
                let (result, _) = self.parse_declarer(false)?;
                if params.is_empty() || params.len() > 2 {
                    self.diags.syntax_error(
                        span,
                        "an operator takes one or two operands",
                    );
                    return Err(());
                }
                Some(self.modes.register(Mode::Proc { params, result }))
            } else {
                None
            };
            let name = self.parse_operator_symbol()?;
            self.expect(&TokenType::Equals, "'=' in the operator declaration")?;
            let (body, routine_moid) = self.parse_routine_text()?;
            let moid = declared.unwrap_or(routine_moid);
            let tag = self
                .tables
                .add_tag(self.current_table, name, TagKind::Operator, moid);
            self.tables.tag_mut(tag).node = Some(body);
            let node = self
                .tree
                .new_node(Attr::OperatorDecl, span.merge(self.prev_span()));
            self.tree.node_mut(node).symbol = name;
            self.tree.node_mut(node).tag = Some(tag);
            self.tree.node_mut(node).moid = Some(moid);
            self.tree.node_mut(node).table = Some(self.current_table);
            self.tree.adopt(node, &[body]);
            out.push(node);
            if !self.eat(&TokenType::Comma) {
                return Ok(());
            }
        }
    }

    fn parse_proc_identity(&mut self, out: &mut Vec<NodeId>) -> ParseResult<()> {
        self.expect(&TokenType::Proc, "PROC")?;
        loop {
            let span = self.peek_span();
            let name = match self.peek().clone() {
                TokenType::Identifier(sym) => {
                    self.advance();
                    sym
                }
                other => {
                    self.diags.syntax_error(
                        self.peek_span(),
                        format!("expected a routine identifier, found {:?}", other),
                    );
                    return Err(());
                }
            };
            self.expect(&TokenType::Equals, "'=' in the routine declaration")?;
            let (body, moid) = self.parse_routine_text()?;
            let tag = self
                .tables
                .add_tag(self.current_table, name, TagKind::Identifier, moid);
            self.tables.tag_mut(tag).node = Some(body);
            let node = self
                .tree
                .new_node(Attr::IdentityDecl, span.merge(self.prev_span()));
            self.tree.node_mut(node).symbol = name;
            self.tree.node_mut(node).tag = Some(tag);
            self.tree.node_mut(node).moid = Some(moid);
            self.tree.node_mut(node).table = Some(self.current_table);
            self.tree.adopt(node, &[body]);
            out.push(node);
            if !self.eat(&TokenType::Comma) {
                return Ok(());
            }
        }
    }

    /// routine text = [ ( params ) ] result declarer : unit
    pub(crate) fn parse_routine_text(&mut self) -> ParseResult<(NodeId, Moid)> {
        let span = self.peek_span();
        let routine_table = self.tables.new_routine_table(self.current_table);
        let mut params: Vec<Moid> = Vec::new();
        if self.at(&TokenType::OpenParen) {
            self.advance();
            'outer: loop {
                let (pm, _) = self.parse_declarer(false)?;
                loop {
                    match self.peek().clone() {
                        TokenType::Identifier(sym) => {
                            self.advance();
                            let tag =
                                self.tables.add_tag(routine_table, sym, TagKind::Identifier, pm);
                            self.tables.table_mut(routine_table).params.push(tag);
                            params.push(pm);
                        }
                        other => {
                            self.diags.syntax_error(
                                self.peek_span(),
                                format!("expected a parameter identifier, found {:?}", other),
                            );
                            return Err(());
                        }
                    }
                    if !self.eat(&TokenType::Comma) {
                        break 'outer;
                    }
                    if self.starts_declarer(&self.peek().clone()) {
                        continue 'outer;
                    }
                }
            }
            self.expect(&TokenType::CloseParen, "')' after the parameters")?;
        }
        let (result, _) = self.parse_declarer(false)?;
        self.expect(&TokenType::Colon, "':' before the routine body")?;
        let saved = self.current_table;
        self.current_table = routine_table;
        let body = self.parse_unit();
        self.current_table = saved;
        let body = body?;
        let moid = self.modes.register(Mode::Proc { params, result });
        let node = self
            .tree
            .new_node(Attr::RoutineText, span.merge(self.tree.node(body).span));
        self.tree.node_mut(node).table = Some(routine_table);
        self.tree.node_mut(node).moid = Some(moid);
        self.tree.adopt(node, &[body]);
        Ok((node, moid))
    }

    /// `declarer id = unit`, `declarer id := unit`, `declarer id`, with
    /// comma-separated repetitions sharing or renewing the declarer.
    fn parse_identity_or_variable(&mut self, out: &mut Vec<NodeId>) -> ParseResult<()> {
        let (mut moid, mut bounds) = self.parse_declarer(true)?;
        loop {
            let span = self.peek_span();
            let name = match self.peek().clone() {
                TokenType::Identifier(sym) => {
                    self.advance();
                    sym
                }
                other => {
                    self.diags.syntax_error(
                        span,
                        format!("expected an identifier in the declaration, found {:?}", other),
                    );
                    return Err(());
                }
            };
            if self.tables.declared_here(self.current_table, name, TagKind::Identifier) {
                self.diags.syntax_error(
                    span,
                    format!("{} is already declared in this range", self.interner.resolve(name)),
                );
            }
            let node = if self.eat(&TokenType::Equals) {
                let source = self.parse_unit()?;
                let tag = self
                    .tables
                    .add_tag(self.current_table, name, TagKind::Identifier, moid);
                let node = self
                    .tree
                    .new_node(Attr::IdentityDecl, span.merge(self.prev_span()));
                self.tree.node_mut(node).moid = Some(moid);
                self.tree.node_mut(node).tag = Some(tag);
                self.tree.adopt(node, &[source]);
                node
            } else {
                let ref_moid = self.modes.register(Mode::Ref(moid));
                let tag = self
                    .tables
                    .add_tag(self.current_table, name, TagKind::Identifier, ref_moid);
                self.tables.tag_mut(tag).variable = true;
                let mut children = Vec::new();
                if let Some(b) = bounds {
                    children.push(self.tree.clone_subtree(b));
                }
                if self.eat(&TokenType::Assign) {
                    children.push(self.parse_unit()?);
                }
                let node = self
                    .tree
                    .new_node(Attr::VariableDecl, span.merge(self.prev_span()));
                self.tree.node_mut(node).moid = Some(ref_moid);
                self.tree.node_mut(node).tag = Some(tag);
                self.tree.adopt(node, &children);
                node
            };
            self.tree.node_mut(node).symbol = name;
            self.tree.node_mut(node).table = Some(self.current_table);
            out.push(node);
            if !self.eat(&TokenType::Comma) {
                return Ok(());
            }
            if self.starts_declarer(&self.peek().clone()) {
                let (m, b) = self.parse_declarer(true)?;
                moid = m;
                bounds = b;
            }
        }
    }
}
