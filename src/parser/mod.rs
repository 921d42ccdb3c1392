//! Recursive-descent parser for the strict Algol 68 subset.
//!
//! Produces the [`Tree`] of mode-annotated nodes and the symbol-table chain
//! the two checking passes work on. Declarers register their modes as they
//! are parsed; denotations carry a preliminary mode.
//!
//! Split by concern: units and formulas here, declarers and declarations in
//! [`declarer`], enclosed clauses in [`clause`].

mod clause;
mod declarer;

use crate::ast::{Attr, NodeId, Tree};
use crate::diag::Diagnostics;
use crate::intern::{Interner, Symbol};
use crate::modes::{Mode, ModeTable, Moid};
use crate::scope::{SymbolTables, TableId, TagKind};
use crate::token::{Span, Token, TokenType};

/// Parse failure already reported to the diagnostics.
pub(crate) type ParseResult<T> = Result<T, ()>;

pub struct Parser<'a> {
    pub(crate) tokens: &'a [Token],
    pub(crate) pos: usize,
    pub(crate) interner: &'a mut Interner,
    pub(crate) modes: &'a mut ModeTable,
    pub(crate) tables: &'a mut SymbolTables,
    pub(crate) tree: &'a mut Tree,
    pub(crate) diags: &'a mut Diagnostics,
    pub(crate) current_table: TableId,
}

impl<'a> Parser<'a> {
    pub fn new(
        tokens: &'a [Token],
        interner: &'a mut Interner,
        modes: &'a mut ModeTable,
        tables: &'a mut SymbolTables,
        tree: &'a mut Tree,
        diags: &'a mut Diagnostics,
    ) -> Self {
        Parser {
            tokens,
            pos: 0,
            interner,
            modes,
            tables,
            tree,
            diags,
            current_table: TableId::ROOT,
        }
    }

    /// Parse a particular program: one enclosed clause.
    pub fn parse_program(&mut self) -> NodeId {
        let program_table = self.tables.new_routine_table(TableId::ROOT);
        self.current_table = program_table;
        let start = self.peek_span();
        let program = self.tree.new_node(Attr::Program, start);
        self.tree.node_mut(program).table = Some(program_table);
        let body = self
            .parse_serial_until(|t| matches!(t, TokenType::EndOfFile))
            .unwrap_or_else(|()| {
                let n = self.tree.new_node(Attr::SkipSymbol, start);
                n
            });
        self.tree.adopt(program, &[body]);
        if !self.at(&TokenType::EndOfFile) {
            let sp = self.peek_span();
            self.diags
                .syntax_error(sp, "text after the end of the program");
        }
        program
    }

    // ------------------------------------------------------------------
    // Token plumbing
    // ------------------------------------------------------------------

    pub(crate) fn peek(&self) -> &TokenType {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].ty
    }

    pub(crate) fn peek_at(&self, ahead: usize) -> &TokenType {
        &self.tokens[(self.pos + ahead).min(self.tokens.len() - 1)].ty
    }

    pub(crate) fn peek_span(&self) -> Span {
        self.tokens[self.pos.min(self.tokens.len() - 1)].span
    }

    pub(crate) fn prev_span(&self) -> Span {
        self.tokens[self.pos.saturating_sub(1).min(self.tokens.len() - 1)].span
    }

    pub(crate) fn at(&self, ty: &TokenType) -> bool {
        self.peek() == ty
    }

    pub(crate) fn advance(&mut self) -> &TokenType {
        let i = self.pos.min(self.tokens.len() - 1);
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        &self.tokens[i].ty
    }

    pub(crate) fn eat(&mut self, ty: &TokenType) -> bool {
        if self.at(ty) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, ty: &TokenType, what: &str) -> ParseResult<()> {
        if self.eat(ty) {
            Ok(())
        } else {
            let sp = self.peek_span();
            self.diags
                .syntax_error(sp, format!("expected {}, found {:?}", what, self.peek()));
            Err(())
        }
    }

    /// Skip ahead to a phrase boundary after an error.
    pub(crate) fn synchronize(&mut self) {
        loop {
            match self.peek() {
                TokenType::Semicolon => {
                    self.advance();
                    return;
                }
                TokenType::EndOfFile
                | TokenType::End
                | TokenType::Fi
                | TokenType::Esac
                | TokenType::Od
                | TokenType::CloseParen
                | TokenType::Then
                | TokenType::Else
                | TokenType::Elif
                | TokenType::In
                | TokenType::Out
                | TokenType::Ouse
                | TokenType::Do
                | TokenType::Bar
                | TokenType::BarColon => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Units
    // ------------------------------------------------------------------

    /// unit = assignation | identity relation | tertiary
    pub(crate) fn parse_unit(&mut self) -> ParseResult<NodeId> {
        let lhs = self.parse_tertiary()?;
        match self.peek().clone() {
            TokenType::Assign => {
                self.advance();
                let rhs = self.parse_unit()?;
                let span = self.tree.node(lhs).span.merge(self.tree.node(rhs).span);
                let n = self.tree.new_node(Attr::Assignation, span);
                self.tree.node_mut(n).table = Some(self.current_table);
                self.tree.adopt(n, &[lhs, rhs]);
                Ok(n)
            }
            TokenType::IdentityRelation | TokenType::Is => {
                self.advance();
                let rhs = self.parse_tertiary()?;
                self.make_identity_relation(lhs, rhs, false)
            }
            TokenType::NotIdentityRelation | TokenType::Isnt => {
                self.advance();
                let rhs = self.parse_tertiary()?;
                self.make_identity_relation(lhs, rhs, true)
            }
            _ => Ok(lhs),
        }
    }

    fn make_identity_relation(
        &mut self,
        lhs: NodeId,
        rhs: NodeId,
        negated: bool,
    ) -> ParseResult<NodeId> {
        let span = self.tree.node(lhs).span.merge(self.tree.node(rhs).span);
        let n = self
            .tree
            .new_node(Attr::IdentityRelation { negated }, span);
        self.tree.node_mut(n).table = Some(self.current_table);
        self.tree.adopt(n, &[lhs, rhs]);
        Ok(n)
    }

    /// tertiary = dyadic formula over secondaries, by declared priority.
    pub(crate) fn parse_tertiary(&mut self) -> ParseResult<NodeId> {
        self.parse_formula(1)
    }

    fn parse_formula(&mut self, min_prio: u8) -> ParseResult<NodeId> {
        let mut lhs = self.parse_monadic_operand()?;
        while let Some((sym, prio)) = self.peek_dyadic() {
            if prio < min_prio {
                break;
            }
            let op_span = self.peek_span();
            self.advance();
            let rhs = self.parse_formula(prio + 1)?;
            let span = self.tree.node(lhs).span.merge(self.tree.node(rhs).span);
            let n = self.tree.new_node(Attr::DyadicFormula, span);
            self.tree.node_mut(n).symbol = sym;
            self.tree.node_mut(n).table = Some(self.current_table);
            self.tree.node_mut(n).span = op_span.merge(span);
            self.tree.adopt(n, &[lhs, rhs]);
            lhs = n;
        }
        Ok(lhs)
    }

    /// The dyadic operator at the cursor, with its priority.
    fn peek_dyadic(&self) -> Option<(Symbol, u8)> {
        let sym = match self.peek().clone() {
            TokenType::Operator(sym) => sym,
            TokenType::Equals => Symbol::EQUALS,
            TokenType::Bold(sym) => {
                if self.is_indicant(sym) {
                    return None;
                }
                sym
            }
            _ => return None,
        };
        let prio = self.dyadic_priority(sym)?;
        Some((sym, prio))
    }

    pub(crate) fn is_indicant(&self, sym: Symbol) -> bool {
        self.tables
            .lookup(self.current_table, sym, TagKind::Indicant)
            .is_some()
    }

    fn dyadic_priority(&self, sym: Symbol) -> Option<u8> {
        if let Some(p) = self.tables.priority(self.current_table, sym) {
            return Some(p);
        }
        let text = self.interner.resolve(sym);
        let p = match text {
            "+:=" | "-:=" | "*:=" | "/:=" | "%:=" | "%*:=" | "PLUSAB" | "MINUSAB" | "TIMESAB"
            | "DIVAB" | "OVERAB" | "MODAB" | "PLUSTO" => 1,
            "OR" => 2,
            "AND" | "&" => 3,
            "=" | "/=" | "EQ" | "NE" => 4,
            "<" | "<=" | ">" | ">=" | "LT" | "LE" | "GT" | "GE" => 5,
            "+" | "-" => 6,
            "*" | "/" | "%" | "%*" | "OVER" | "MOD" | "ELEM" => 7,
            "**" | "UP" | "DOWN" | "SHL" | "SHR" | "UPB" | "LWB" => 8,
            "I" => 9,
            _ => return None,
        };
        Some(p)
    }

    fn parse_monadic_operand(&mut self) -> ParseResult<NodeId> {
        let sym = match self.peek().clone() {
            TokenType::Operator(sym) => Some(sym),
            TokenType::Bold(sym)
                if !self.is_indicant(sym) && self.is_operator_word(sym) =>
            {
                Some(sym)
            }
            _ => None,
        };
        if let Some(sym) = sym {
            let span = self.peek_span();
            self.advance();
            let operand = self.parse_monadic_operand()?;
            let n = self
                .tree
                .new_node(Attr::MonadicFormula, span.merge(self.tree.node(operand).span));
            self.tree.node_mut(n).symbol = sym;
            self.tree.node_mut(n).table = Some(self.current_table);
            self.tree.adopt(n, &[operand]);
            Ok(n)
        } else {
            self.parse_secondary()
        }
    }

    /// A bold word that names some visible operator.
    fn is_operator_word(&self, sym: Symbol) -> bool {
        !self.tables.operators(self.current_table, sym).is_empty()
    }

    /// secondary = selection | generator | primary
    pub(crate) fn parse_secondary(&mut self) -> ParseResult<NodeId> {
        // field OF secondary
        if let TokenType::Identifier(sym) = self.peek().clone() {
            if matches!(self.peek_at(1), TokenType::Of) {
                let span = self.peek_span();
                self.advance();
                self.advance();
                let from = self.parse_secondary()?;
                let n = self
                    .tree
                    .new_node(Attr::Selection, span.merge(self.tree.node(from).span));
                self.tree.node_mut(n).symbol = sym;
                self.tree.node_mut(n).table = Some(self.current_table);
                self.tree.adopt(n, &[from]);
                return Ok(n);
            }
        }
        match self.peek().clone() {
            TokenType::Loc => self.parse_generator(false),
            TokenType::Heap => self.parse_generator(true),
            _ => self.parse_primary(),
        }
    }

    fn parse_generator(&mut self, heap: bool) -> ParseResult<NodeId> {
        let span = self.peek_span();
        self.advance();
        let (moid, bounds) = self.parse_declarer(true)?;
        let n = self
            .tree
            .new_node(Attr::Generator { heap }, span.merge(self.prev_span()));
        let ref_moid = self.modes.register(Mode::Ref(moid));
        self.tree.node_mut(n).moid = Some(ref_moid);
        self.tree.node_mut(n).table = Some(self.current_table);
        if let Some(b) = bounds {
            self.tree.adopt(n, &[b]);
        }
        Ok(n)
    }

    fn parse_primary(&mut self) -> ParseResult<NodeId> {
        let span = self.peek_span();
        let mut node = match self.peek().clone() {
            TokenType::Identifier(sym) => {
                self.advance();
                let n = self.tree.new_node(Attr::Identifier, span);
                self.tree.node_mut(n).symbol = sym;
                self.tree.node_mut(n).table = Some(self.current_table);
                n
            }
            TokenType::IntDenotation(v) => {
                self.advance();
                let n = self.tree.new_node(Attr::IntDenotation(v), span);
                self.tree.node_mut(n).moid = Some(Moid::INT);
                n
            }
            TokenType::RealDenotation(v) => {
                self.advance();
                let n = self.tree.new_node(Attr::RealDenotation(v), span);
                self.tree.node_mut(n).moid = Some(Moid::REAL);
                n
            }
            TokenType::BitsDenotation { value, .. } => {
                self.advance();
                let n = self.tree.new_node(Attr::BitsDenotation(value), span);
                self.tree.node_mut(n).moid = Some(Moid::BITS);
                n
            }
            TokenType::StringDenotation(sym) => {
                self.advance();
                let n = self.tree.new_node(Attr::StringDenotation(sym), span);
                self.tree.node_mut(n).moid = Some(Moid::ROW_CHAR);
                n
            }
            TokenType::True | TokenType::False => {
                let v = matches!(self.peek(), TokenType::True);
                self.advance();
                let n = self.tree.new_node(Attr::BoolDenotation(v), span);
                self.tree.node_mut(n).moid = Some(Moid::BOOL);
                n
            }
            TokenType::Empty => {
                self.advance();
                let n = self.tree.new_node(Attr::EmptyDenotation, span);
                self.tree.node_mut(n).moid = Some(Moid::VOID);
                n
            }
            TokenType::Long => self.parse_long_denotation_or_cast()?,
            TokenType::Skip => {
                self.advance();
                let n = self.tree.new_node(Attr::SkipSymbol, span);
                self.tree.node_mut(n).moid = Some(Moid::HIP);
                n
            }
            TokenType::Nil => {
                self.advance();
                let n = self.tree.new_node(Attr::NihilSymbol, span);
                n
            }
            TokenType::Goto | TokenType::Go => {
                self.advance();
                if matches!(self.peek(), TokenType::To) {
                    self.advance();
                }
                match self.peek().clone() {
                    TokenType::Identifier(sym) => {
                        self.advance();
                        let n = self.tree.new_node(Attr::Jump, span.merge(self.prev_span()));
                        self.tree.node_mut(n).symbol = sym;
                        self.tree.node_mut(n).table = Some(self.current_table);
                        n
                    }
                    _ => {
                        self.diags
                            .syntax_error(self.peek_span(), "expected a label after GOTO");
                        return Err(());
                    }
                }
            }
            TokenType::OpenParen => self.parse_paren_enclosed()?,
            TokenType::Begin => self.parse_begin_enclosed()?,
            TokenType::If => self.parse_conditional(TokenType::If)?,
            TokenType::Case => self.parse_case(TokenType::Case)?,
            TokenType::Par => self.parse_parallel()?,
            TokenType::For
            | TokenType::From
            | TokenType::By
            | TokenType::To
            | TokenType::While
            | TokenType::Do => self.parse_loop()?,
            ref t if self.starts_declarer(t) => self.parse_cast()?,
            other => {
                self.diags.syntax_error(
                    span,
                    format!("expected a unit, found {:?}", other),
                );
                return Err(());
            }
        };
        // Postfix calls and slices.
        loop {
            match self.peek() {
                TokenType::OpenParen => {
                    node = self.parse_call(node)?;
                }
                TokenType::OpenBracket => {
                    node = self.parse_slice(node)?;
                }
                _ => break,
            }
        }
        Ok(node)
    }

    /// `LONG 123` and `LONG 1.5` are widened denotations; anything else
    /// after LONG is a declarer, hence a cast.
    fn parse_long_denotation_or_cast(&mut self) -> ParseResult<NodeId> {
        let mut ahead = 0;
        while matches!(self.peek_at(ahead), TokenType::Long) {
            ahead += 1;
        }
        match self.peek_at(ahead) {
            TokenType::IntDenotation(_) | TokenType::RealDenotation(_) => {
                let span = self.peek_span();
                let long = (ahead as u8).min(2);
                for _ in 0..ahead {
                    self.advance();
                }
                match self.advance().clone() {
                    TokenType::IntDenotation(v) => {
                        let n = self
                            .tree
                            .new_node(Attr::IntDenotation(v), span.merge(self.prev_span()));
                        let moid = self.modes.register(Mode::Standard {
                            name: crate::modes::StdName::Int,
                            long,
                        });
                        self.tree.node_mut(n).moid = Some(moid);
                        Ok(n)
                    }
                    TokenType::RealDenotation(v) => {
                        let n = self
                            .tree
                            .new_node(Attr::RealDenotation(v), span.merge(self.prev_span()));
                        let moid = self.modes.register(Mode::Standard {
                            name: crate::modes::StdName::Real,
                            long,
                        });
                        self.tree.node_mut(n).moid = Some(moid);
                        Ok(n)
                    }
                    _ => unreachable!("lookahead guaranteed a denotation"),
                }
            }
            _ => self.parse_cast(),
        }
    }

    /// cast = declarer ( enclosed )
    fn parse_cast(&mut self) -> ParseResult<NodeId> {
        let span = self.peek_span();
        let (moid, _) = self.parse_declarer(false)?;
        if !matches!(self.peek(), TokenType::OpenParen | TokenType::Begin) {
            self.diags.syntax_error(
                self.peek_span(),
                "expected an enclosed clause after the cast declarer",
            );
            return Err(());
        }
        let enclosed = self.parse_primary()?;
        let n = self
            .tree
            .new_node(Attr::Cast, span.merge(self.tree.node(enclosed).span));
        self.tree.node_mut(n).moid = Some(moid);
        self.tree.node_mut(n).table = Some(self.current_table);
        self.tree.adopt(n, &[enclosed]);
        Ok(n)
    }

    fn parse_call(&mut self, primary: NodeId) -> ParseResult<NodeId> {
        let open = self.peek_span();
        self.advance();
        let mut children = vec![primary];
        if !self.at(&TokenType::CloseParen) {
            loop {
                if matches!(self.peek(), TokenType::Comma | TokenType::CloseParen) {
                    // A skipped argument slot: partial parameterization.
                    let n = self.tree.new_node(Attr::EmptyArgument, self.peek_span());
                    children.push(n);
                } else {
                    children.push(self.parse_unit()?);
                }
                if !self.eat(&TokenType::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenType::CloseParen, "')' after the call arguments")?;
        let n = self
            .tree
            .new_node(Attr::Call, open.merge(self.prev_span()));
        self.tree.node_mut(n).table = Some(self.current_table);
        self.tree.adopt(n, &children);
        Ok(n)
    }

    fn parse_slice(&mut self, primary: NodeId) -> ParseResult<NodeId> {
        let open = self.peek_span();
        self.advance();
        let mut children = vec![primary];
        loop {
            children.push(self.parse_subscript_or_trimmer()?);
            if !self.eat(&TokenType::Comma) {
                break;
            }
        }
        self.expect(&TokenType::CloseBracket, "']' after the subscripts")?;
        let n = self
            .tree
            .new_node(Attr::Slice, open.merge(self.prev_span()));
        self.tree.node_mut(n).table = Some(self.current_table);
        self.tree.adopt(n, &children);
        Ok(n)
    }

    /// `i` subscripts; `l:u`, `l:`, `:u`, `:`, with optional `@ n`, trim.
    fn parse_subscript_or_trimmer(&mut self) -> ParseResult<NodeId> {
        let span = self.peek_span();
        let lower = if matches!(
            self.peek(),
            TokenType::Colon | TokenType::At | TokenType::Comma | TokenType::CloseBracket
        ) {
            None
        } else {
            Some(self.parse_unit()?)
        };
        if !matches!(self.peek(), TokenType::Colon | TokenType::At) {
            // A plain subscript.
            return lower.ok_or_else(|| {
                self.diags
                    .syntax_error(span, "expected a subscript or a trimmer");
            });
        }
        let trimmer = self.tree.new_node(Attr::Trimmer, span);
        let mut parts = Vec::new();
        if let Some(l) = lower {
            let w = self.tree.new_node(Attr::LowerBound, self.tree.node(l).span);
            self.tree.adopt(w, &[l]);
            parts.push(w);
        }
        if self.eat(&TokenType::Colon)
            && !matches!(
                self.peek(),
                TokenType::At | TokenType::Comma | TokenType::CloseBracket
            )
        {
            let u = self.parse_unit()?;
            let w = self.tree.new_node(Attr::UpperBound, self.tree.node(u).span);
            self.tree.adopt(w, &[u]);
            parts.push(w);
        }
        if self.eat(&TokenType::At) {
            let a = self.parse_unit()?;
            let w = self.tree.new_node(Attr::AtBound, self.tree.node(a).span);
            self.tree.adopt(w, &[a]);
            parts.push(w);
        }
        self.tree.adopt(trimmer, &parts);
        Ok(trimmer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    pub(crate) struct Parsed {
        pub interner: Interner,
        pub modes: ModeTable,
        pub tables: SymbolTables,
        pub tree: Tree,
        pub diags: Diagnostics,
        pub root: NodeId,
    }

    pub(crate) fn parse(src: &str) -> Parsed {
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
        Parsed {
            interner,
            modes,
            tables,
            tree,
            diags,
            root,
        }
    }

    fn assert_clean(p: &Parsed, src: &str) {
        assert!(
            !p.diags.has_errors(),
            "unexpected parse errors for {:?}:\n{}",
            src,
            p.diags.render(src, "test.a68")
        );
    }

    #[test]
    fn parses_assignation_right_associative() {
        let src = "INT a, INT b; a := b := 1";
        let p = parse(src);
        assert_clean(&p, src);
    }

    #[test]
    fn formula_priorities_nest_multiplication_tighter() {
        let src = "INT a = 2 + 3 * 4";
        let p = parse(src);
        assert_clean(&p, src);
        // The identity declaration's source is a + formula whose right
        // operand is the * formula.
        let serial = p.tree.children(p.root)[0];
        let decl = p.tree.children(serial)[0];
        let plus = p.tree.children(decl)[0];
        assert_eq!(p.tree.attr(plus), Attr::DyadicFormula);
        assert_eq!(p.interner.resolve(p.tree.node(plus).symbol), "+");
        let times = p.tree.children(plus)[1];
        assert_eq!(p.tree.attr(times), Attr::DyadicFormula);
        assert_eq!(p.interner.resolve(p.tree.node(times).symbol), "*");
    }

    #[test]
    fn parses_identity_relations() {
        for src in ["a :=: b", "a :/=: b", "a IS b", "a ISNT b"] {
            let full = format!("REF INT a = LOC INT, b = LOC INT; BOOL t = ({})", src);
            let p = parse(&full);
            assert_clean(&p, &full);
        }
    }

    #[test]
    fn parses_slice_forms() {
        let src = "[1:9] INT v; INT x = v[3]; [] INT w = v[2:4]; [] INT u = v[2:4 @ 0]";
        let p = parse(src);
        assert_clean(&p, src);
    }

    #[test]
    fn parses_selection_chain() {
        let src = "STRUCT (REAL re, REAL im) z; REAL r = re OF z";
        let p = parse(src);
        assert_clean(&p, src);
    }

    #[test]
    fn parses_monadic_operators() {
        let src = "INT a = ABS - 3";
        let p = parse(src);
        assert_clean(&p, src);
    }

    #[test]
    fn long_denotations_get_long_modes() {
        let src = "LONG INT n = LONG 123";
        let p = parse(src);
        assert_clean(&p, src);
    }

    #[test]
    fn stray_token_reports_syntax_error() {
        let p = parse("INT a = ]");
        assert!(p.diags.has_syntax_errors());
    }
}
