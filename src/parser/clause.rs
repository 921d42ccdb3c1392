//! Enclosed clauses: serial, closed, collateral, conditional, case,
//! conformity case, loop, and parallel clauses.

use super::{ParseResult, Parser};
use crate::ast::{Attr, NodeId};
use crate::scope::TagKind;
use crate::token::TokenType;

impl<'a> Parser<'a> {
    /// serial clause = phrases separated by `;`, with labels.
    pub(crate) fn parse_serial_until(
        &mut self,
        stop: fn(&TokenType) -> bool,
    ) -> ParseResult<NodeId> {
        let span = self.peek_span();
        let table = self.tables.new_table(self.current_table);
        let saved = self.current_table;
        self.current_table = table;
        let node = self.tree.new_node(Attr::SerialClause, span);
        self.tree.node_mut(node).table = Some(table);

        let mut phrases: Vec<NodeId> = Vec::new();
        loop {
            if stop(self.peek()) || matches!(self.peek(), TokenType::EndOfFile) {
                break;
            }
            // Labels before the phrase.
            let mut labels = Vec::new();
            while matches!(self.peek(), TokenType::Identifier(_))
                && matches!(self.peek_at(1), TokenType::Colon)
            {
                if let TokenType::Identifier(sym) = self.peek().clone() {
                    labels.push(sym);
                }
                self.advance();
                self.advance();
            }
            let before = phrases.len();
            let parsed = if self.at_declaration() {
                let r = self.parse_declaration(&mut phrases);
                r
            } else {
                self.parse_unit().map(|u| phrases.push(u))
            };
            if parsed.is_err() {
                self.synchronize();
                continue;
            }
            if let Some(&phrase) = phrases.get(before) {
                for label in labels {
                    let tag = self
                        .tables
                        .add_tag(table, label, TagKind::Label, crate::modes::Moid::VOID);
                    self.tables.tag_mut(tag).node = Some(phrase);
                }
            }
            if !self.eat(&TokenType::Semicolon) {
                break;
            }
        }
        self.current_table = saved;
        self.tree.adopt(node, &phrases);
        self.tree.node_mut(node).span = span.merge(self.prev_span());
        Ok(node)
    }

    fn at_declaration(&mut self) -> bool {
        match self.peek().clone() {
            TokenType::Mode | TokenType::Prio | TokenType::Op => true,
            TokenType::Proc => {
                (matches!(self.peek_at(1), TokenType::Identifier(_))
                    && matches!(self.peek_at(2), TokenType::Equals))
                    || self.declarer_then_identifier()
            }
            ref t if self.starts_declarer(t) => self.declarer_then_identifier(),
            _ => false,
        }
    }

    /// Speculatively parse a declarer to tell a declaration from a cast.
    fn declarer_then_identifier(&mut self) -> bool {
        let pos = self.pos;
        let mark = self.diags.mark();
        let ok = self.parse_declarer(true).is_ok()
            && matches!(self.peek(), TokenType::Identifier(_));
        self.pos = pos;
        self.diags.rollback(mark);
        ok
    }

    /// `( … )`: closed, collateral, brief conditional, or brief case.
    pub(crate) fn parse_paren_enclosed(&mut self) -> ParseResult<NodeId> {
        let open = self.peek_span();
        self.expect(&TokenType::OpenParen, "'('")?;
        if self.eat(&TokenType::CloseParen) {
            // An empty display.
            let n = self
                .tree
                .new_node(Attr::CollateralClause, open.merge(self.prev_span()));
            self.tree.node_mut(n).table = Some(self.current_table);
            return Ok(n);
        }
        let first = self.parse_serial_until(|t| {
            matches!(
                t,
                TokenType::Bar | TokenType::BarColon | TokenType::Comma | TokenType::CloseParen
            )
        })?;
        match self.peek().clone() {
            TokenType::CloseParen => {
                self.advance();
                let n = self
                    .tree
                    .new_node(Attr::ClosedClause, open.merge(self.prev_span()));
                self.tree.node_mut(n).table = Some(self.current_table);
                self.tree.adopt(n, &[first]);
                Ok(n)
            }
            TokenType::Comma => {
                let mut units = vec![self.single_unit_of(first)?];
                while self.eat(&TokenType::Comma) {
                    units.push(self.parse_unit()?);
                }
                self.expect(&TokenType::CloseParen, "')' after the display")?;
                let n = self
                    .tree
                    .new_node(Attr::CollateralClause, open.merge(self.prev_span()));
                self.tree.node_mut(n).table = Some(self.current_table);
                self.tree.adopt(n, &units);
                Ok(n)
            }
            TokenType::Bar => {
                self.advance();
                self.parse_brief_choice(open, first)
            }
            other => {
                self.diags.syntax_error(
                    self.peek_span(),
                    format!("expected ')', ',' or '|', found {:?}", other),
                );
                Err(())
            }
        }
    }

    /// The display form requires plain units between commas.
    fn single_unit_of(&mut self, serial: NodeId) -> ParseResult<NodeId> {
        let children = self.tree.children(serial);
        if children.len() == 1 {
            Ok(children[0])
        } else {
            let sp = self.tree.node(serial).span;
            self.diags
                .syntax_error(sp, "a display element must be a unit");
            Err(())
        }
    }

    /// After `( enquiry |`: either a brief conditional, a brief integer
    /// case, or a brief conformity case.
    fn parse_brief_choice(
        &mut self,
        open: crate::token::Span,
        enquiry_serial: NodeId,
    ) -> ParseResult<NodeId> {
        let enquiry = self.tree.new_node(Attr::EnquiryClause, self.tree.node(enquiry_serial).span);
        self.tree.adopt(enquiry, &[enquiry_serial]);

        if self.at_conformity_specifier() {
            let mut alternatives = Vec::new();
            loop {
                alternatives.push(self.parse_conformity_alternative()?);
                if !self.eat(&TokenType::Comma) {
                    break;
                }
            }
            let out = self.parse_brief_tail()?;
            self.expect(&TokenType::CloseParen, "')' closing the case clause")?;
            let n = self
                .tree
                .new_node(Attr::ConformityClause, open.merge(self.prev_span()));
            self.tree.node_mut(n).table = Some(self.current_table);
            let mut children = vec![enquiry];
            children.extend(alternatives);
            children.extend(out);
            self.tree.adopt(n, &children);
            return Ok(n);
        }

        let mut units = vec![self.parse_unit()?];
        while self.eat(&TokenType::Comma) {
            units.push(self.parse_unit()?);
        }
        if units.len() > 1 {
            // Brief integer case.
            let alternatives: Vec<NodeId> = units
                .into_iter()
                .map(|u| {
                    let a = self.tree.new_node(Attr::CaseAlternative, self.tree.node(u).span);
                    self.tree.adopt(a, &[u]);
                    a
                })
                .collect();
            let out = self.parse_brief_tail()?;
            self.expect(&TokenType::CloseParen, "')' closing the case clause")?;
            let n = self
                .tree
                .new_node(Attr::CaseClause, open.merge(self.prev_span()));
            self.tree.node_mut(n).table = Some(self.current_table);
            let mut children = vec![enquiry];
            children.extend(alternatives);
            children.extend(out);
            self.tree.adopt(n, &children);
            Ok(n)
        } else {
            // Brief conditional.
            let then_part = self.tree.new_node(Attr::ThenPart, self.tree.node(units[0]).span);
            self.tree.adopt(then_part, &[units[0]]);
            let else_part = match self.peek().clone() {
                TokenType::Bar => {
                    self.advance();
                    let u = self.parse_unit()?;
                    let e = self.tree.new_node(Attr::ElsePart, self.tree.node(u).span);
                    self.tree.adopt(e, &[u]);
                    Some(e)
                }
                TokenType::BarColon => {
                    self.advance();
                    let first = self.parse_serial_until(|t| {
                        matches!(t, TokenType::Bar | TokenType::BarColon | TokenType::CloseParen)
                    })?;
                    self.expect(&TokenType::Bar, "'|' after the elif enquiry")?;
                    let nested = self.parse_brief_choice(open, first)?;
                    let e = self.tree.new_node(Attr::ElsePart, self.tree.node(nested).span);
                    self.tree.adopt(e, &[nested]);
                    // The nested choice consumed the closing parenthesis.
                    let n = self
                        .tree
                        .new_node(Attr::ConditionalClause, open.merge(self.prev_span()));
                    self.tree.node_mut(n).table = Some(self.current_table);
                    self.tree.adopt(n, &[enquiry, then_part, e]);
                    return Ok(n);
                }
                _ => None,
            };
            self.expect(&TokenType::CloseParen, "')' closing the conditional")?;
            let n = self
                .tree
                .new_node(Attr::ConditionalClause, open.merge(self.prev_span()));
            self.tree.node_mut(n).table = Some(self.current_table);
            let mut children = vec![enquiry, then_part];
            children.extend(else_part);
            self.tree.adopt(n, &children);
            Ok(n)
        }
    }

    /// Optional `| out` tail of a brief case.
    fn parse_brief_tail(&mut self) -> ParseResult<Option<NodeId>> {
        if self.eat(&TokenType::Bar) {
            let serial =
                self.parse_serial_until(|t| matches!(t, TokenType::CloseParen))?;
            let out = self.tree.new_node(Attr::OutPart, self.tree.node(serial).span);
            self.tree.adopt(out, &[serial]);
            Ok(Some(out))
        } else {
            Ok(None)
        }
    }

    /// `( declarer [identifier] ) :` begins a conformity alternative.
    fn at_conformity_specifier(&mut self) -> bool {
        if !self.at(&TokenType::OpenParen) {
            return false;
        }
        let pos = self.pos;
        let mark = self.diags.mark();
        self.advance();
        let mut ok = self.parse_declarer(false).is_ok();
        if ok {
            if matches!(self.peek(), TokenType::Identifier(_)) {
                self.advance();
            }
            ok = self.at(&TokenType::CloseParen)
                && matches!(self.peek_at(1), TokenType::Colon);
        }
        self.pos = pos;
        self.diags.rollback(mark);
        ok
    }

    /// `( declarer [identifier] ) : unit`
    fn parse_conformity_alternative(&mut self) -> ParseResult<NodeId> {
        let span = self.peek_span();
        self.expect(&TokenType::OpenParen, "'(' of the specifier")?;
        let (moid, _) = self.parse_declarer(false)?;
        let table = self.tables.new_table(self.current_table);
        let tag = match self.peek().clone() {
            TokenType::Identifier(sym) => {
                self.advance();
                Some(self.tables.add_tag(table, sym, TagKind::Identifier, moid))
            }
            _ => None,
        };
        self.expect(&TokenType::CloseParen, "')' of the specifier")?;
        self.expect(&TokenType::Colon, "':' after the specifier")?;
        let saved = self.current_table;
        self.current_table = table;
        let unit = self.parse_unit();
        self.current_table = saved;
        let unit = unit?;
        let n = self
            .tree
            .new_node(Attr::ConformityAlternative, span.merge(self.prev_span()));
        self.tree.node_mut(n).moid = Some(moid);
        self.tree.node_mut(n).tag = tag;
        self.tree.node_mut(n).table = Some(table);
        self.tree.adopt(n, &[unit]);
        Ok(n)
    }

    /// `BEGIN … END`: closed or collateral.
    pub(crate) fn parse_begin_enclosed(&mut self) -> ParseResult<NodeId> {
        let open = self.peek_span();
        self.expect(&TokenType::Begin, "BEGIN")?;
        if self.eat(&TokenType::End) {
            let n = self
                .tree
                .new_node(Attr::CollateralClause, open.merge(self.prev_span()));
            self.tree.node_mut(n).table = Some(self.current_table);
            return Ok(n);
        }
        let first = self
            .parse_serial_until(|t| matches!(t, TokenType::Comma | TokenType::End))?;
        if self.at(&TokenType::Comma) {
            let mut units = vec![self.single_unit_of(first)?];
            while self.eat(&TokenType::Comma) {
                units.push(self.parse_unit()?);
            }
            self.expect(&TokenType::End, "END after the display")?;
            let n = self
                .tree
                .new_node(Attr::CollateralClause, open.merge(self.prev_span()));
            self.tree.node_mut(n).table = Some(self.current_table);
            self.tree.adopt(n, &units);
            Ok(n)
        } else {
            self.expect(&TokenType::End, "END closing the clause")?;
            let n = self
                .tree
                .new_node(Attr::ClosedClause, open.merge(self.prev_span()));
            self.tree.node_mut(n).table = Some(self.current_table);
            self.tree.adopt(n, &[first]);
            Ok(n)
        }
    }

    /// `IF … THEN … [ELIF …|ELSE …] FI` (and the same shape for OUSE via
    /// `parse_case`).
    pub(crate) fn parse_conditional(&mut self, opener: TokenType) -> ParseResult<NodeId> {
        let open = self.peek_span();
        self.expect(&opener, "IF")?;
        let enquiry_serial =
            self.parse_serial_until(|t| matches!(t, TokenType::Then))?;
        let enquiry = self
            .tree
            .new_node(Attr::EnquiryClause, self.tree.node(enquiry_serial).span);
        self.tree.adopt(enquiry, &[enquiry_serial]);
        self.expect(&TokenType::Then, "THEN")?;
        let then_serial = self.parse_serial_until(|t| {
            matches!(t, TokenType::Elif | TokenType::Else | TokenType::Fi)
        })?;
        let then_part = self
            .tree
            .new_node(Attr::ThenPart, self.tree.node(then_serial).span);
        self.tree.adopt(then_part, &[then_serial]);
        let mut children = vec![enquiry, then_part];
        match self.peek().clone() {
            TokenType::Elif => {
                let nested = self.parse_conditional(TokenType::Elif)?;
                let e = self.tree.new_node(Attr::ElsePart, self.tree.node(nested).span);
                self.tree.adopt(e, &[nested]);
                children.push(e);
                // ELIF's FI closes the whole chain.
                let n = self
                    .tree
                    .new_node(Attr::ConditionalClause, open.merge(self.prev_span()));
                self.tree.node_mut(n).table = Some(self.current_table);
                self.tree.adopt(n, &children);
                return Ok(n);
            }
            TokenType::Else => {
                self.advance();
                let else_serial =
                    self.parse_serial_until(|t| matches!(t, TokenType::Fi))?;
                let e = self
                    .tree
                    .new_node(Attr::ElsePart, self.tree.node(else_serial).span);
                self.tree.adopt(e, &[else_serial]);
                children.push(e);
            }
            _ => {}
        }
        self.expect(&TokenType::Fi, "FI closing the conditional")?;
        let n = self
            .tree
            .new_node(Attr::ConditionalClause, open.merge(self.prev_span()));
        self.tree.node_mut(n).table = Some(self.current_table);
        self.tree.adopt(n, &children);
        Ok(n)
    }

    /// `CASE … IN … [OUSE …|OUT …] ESAC`, integer or conformity.
    pub(crate) fn parse_case(&mut self, opener: TokenType) -> ParseResult<NodeId> {
        let open = self.peek_span();
        self.expect(&opener, "CASE")?;
        let enquiry_serial =
            self.parse_serial_until(|t| matches!(t, TokenType::In))?;
        let enquiry = self
            .tree
            .new_node(Attr::EnquiryClause, self.tree.node(enquiry_serial).span);
        self.tree.adopt(enquiry, &[enquiry_serial]);
        self.expect(&TokenType::In, "IN")?;

        let conformity = self.at_conformity_specifier();
        let mut alternatives = Vec::new();
        loop {
            if conformity {
                alternatives.push(self.parse_conformity_alternative()?);
            } else {
                let u = self.parse_unit()?;
                let a = self.tree.new_node(Attr::CaseAlternative, self.tree.node(u).span);
                self.tree.adopt(a, &[u]);
                alternatives.push(a);
            }
            if !self.eat(&TokenType::Comma) {
                break;
            }
        }
        let mut children = vec![enquiry];
        children.extend(alternatives);
        match self.peek().clone() {
            TokenType::Ouse => {
                let nested = self.parse_case(TokenType::Ouse)?;
                let out = self.tree.new_node(Attr::OutPart, self.tree.node(nested).span);
                self.tree.adopt(out, &[nested]);
                children.push(out);
                let n = self.finish_case(open, conformity, children);
                return Ok(n);
            }
            TokenType::Out => {
                self.advance();
                let serial =
                    self.parse_serial_until(|t| matches!(t, TokenType::Esac))?;
                let out = self.tree.new_node(Attr::OutPart, self.tree.node(serial).span);
                self.tree.adopt(out, &[serial]);
                children.push(out);
            }
            _ => {}
        }
        self.expect(&TokenType::Esac, "ESAC closing the case clause")?;
        Ok(self.finish_case(open, conformity, children))
    }

    fn finish_case(
        &mut self,
        open: crate::token::Span,
        conformity: bool,
        children: Vec<NodeId>,
    ) -> NodeId {
        let attr = if conformity {
            Attr::ConformityClause
        } else {
            Attr::CaseClause
        };
        let n = self.tree.new_node(attr, open.merge(self.prev_span()));
        self.tree.node_mut(n).table = Some(self.current_table);
        self.tree.adopt(n, &children);
        n
    }

    /// `[FOR id] [FROM u] [BY u] [TO u] [WHILE …] DO … [UNTIL …] OD`
    pub(crate) fn parse_loop(&mut self) -> ParseResult<NodeId> {
        let open = self.peek_span();
        let table = self.tables.new_table(self.current_table);
        let saved = self.current_table;
        self.current_table = table;
        let result = self.parse_loop_inner(open, table);
        self.current_table = saved;
        result
    }

    fn parse_loop_inner(
        &mut self,
        open: crate::token::Span,
        table: crate::scope::TableId,
    ) -> ParseResult<NodeId> {
        let mut children = Vec::new();
        if self.eat(&TokenType::For) {
            let span = self.peek_span();
            match self.peek().clone() {
                TokenType::Identifier(sym) => {
                    self.advance();
                    let tag = self.tables.add_tag(table, sym, TagKind::Identifier, crate::modes::Moid::INT);
                    let part = self.tree.new_node(Attr::ForPart, span);
                    self.tree.node_mut(part).symbol = sym;
                    self.tree.node_mut(part).tag = Some(tag);
                    children.push(part);
                }
                other => {
                    self.diags.syntax_error(
                        span,
                        format!("expected the loop identifier after FOR, found {:?}", other),
                    );
                    return Err(());
                }
            }
        }
        for (tok, attr) in [
            (TokenType::From, Attr::FromPart),
            (TokenType::By, Attr::ByPart),
            (TokenType::To, Attr::ToPart),
        ] {
            if self.eat(&tok) {
                let u = self.parse_unit()?;
                let part = self.tree.new_node(attr, self.tree.node(u).span);
                self.tree.adopt(part, &[u]);
                children.push(part);
            }
        }
        if self.eat(&TokenType::While) {
            let serial = self.parse_serial_until(|t| matches!(t, TokenType::Do))?;
            let part = self.tree.new_node(Attr::WhilePart, self.tree.node(serial).span);
            self.tree.adopt(part, &[serial]);
            children.push(part);
        }
        self.expect(&TokenType::Do, "DO")?;
        let body = self
            .parse_serial_until(|t| matches!(t, TokenType::Od | TokenType::Until))?;
        let do_part = self.tree.new_node(Attr::DoPart, self.tree.node(body).span);
        self.tree.adopt(do_part, &[body]);
        children.push(do_part);
        if self.eat(&TokenType::Until) {
            let serial = self.parse_serial_until(|t| matches!(t, TokenType::Od))?;
            let part = self.tree.new_node(Attr::UntilPart, self.tree.node(serial).span);
            self.tree.adopt(part, &[serial]);
            children.push(part);
        }
        self.expect(&TokenType::Od, "OD closing the loop")?;
        let n = self.tree.new_node(Attr::LoopClause, open.merge(self.prev_span()));
        self.tree.node_mut(n).table = Some(table);
        self.tree.adopt(n, &children);
        Ok(n)
    }

    /// `PAR ( unit, unit, … )`
    pub(crate) fn parse_parallel(&mut self) -> ParseResult<NodeId> {
        let open = self.peek_span();
        self.expect(&TokenType::Par, "PAR")?;
        self.expect(&TokenType::OpenParen, "'(' after PAR")?;
        let mut units = Vec::new();
        loop {
            units.push(self.parse_unit()?);
            if !self.eat(&TokenType::Comma) {
                break;
            }
        }
        self.expect(&TokenType::CloseParen, "')' closing the parallel clause")?;
        let n = self
            .tree
            .new_node(Attr::ParallelClause, open.merge(self.prev_span()));
        self.tree.node_mut(n).table = Some(self.current_table);
        self.tree.adopt(n, &units);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::parse;
    use crate::ast::Attr;

    fn clean(src: &str) -> super::super::tests::Parsed {
        let p = parse(src);
        assert!(
            !p.diags.has_errors(),
            "unexpected errors for {:?}:\n{}",
            src,
            p.diags.render(src, "test.a68")
        );
        p
    }

    #[test]
    fn parses_bold_conditional() {
        let p = clean("IF TRUE THEN 1 ELSE 2 FI");
        let serial = p.tree.children(p.root)[0];
        let cond = p.tree.children(serial)[0];
        assert_eq!(p.tree.attr(cond), Attr::ConditionalClause);
        let kids = p.tree.children(cond);
        assert_eq!(p.tree.attr(kids[0]), Attr::EnquiryClause);
        assert_eq!(p.tree.attr(kids[1]), Attr::ThenPart);
        assert_eq!(p.tree.attr(kids[2]), Attr::ElsePart);
    }

    #[test]
    fn elif_nests_in_the_else_part() {
        let p = clean("IF a THEN 1 ELIF b THEN 2 ELSE 3 FI");
        let serial = p.tree.children(p.root)[0];
        let cond = p.tree.children(serial)[0];
        let kids = p.tree.children(cond);
        let else_part = kids[2];
        let nested = p.tree.children(else_part)[0];
        assert_eq!(p.tree.attr(nested), Attr::ConditionalClause);
    }

    #[test]
    fn brief_conditional_and_case_disambiguate_by_arity() {
        let p = clean("INT x = (TRUE | 1 | 2)");
        let serial = p.tree.children(p.root)[0];
        let decl = p.tree.children(serial)[0];
        let choice = p.tree.children(decl)[0];
        assert_eq!(p.tree.attr(choice), Attr::ConditionalClause);

        let p = clean("INT i := 2; [] CHAR s = (i | \"one\", \"two\" | \"other\")");
        let serial = p.tree.children(p.root)[0];
        let decl = p.tree.children(serial)[1];
        let choice = p.tree.children(decl)[0];
        assert_eq!(p.tree.attr(choice), Attr::CaseClause);
        // enquiry + two alternatives + out part
        assert_eq!(p.tree.children(choice).len(), 4);
    }

    #[test]
    fn parses_integer_case_clause() {
        let p = clean("CASE 2 IN 10, 20, 30 OUT 0 ESAC");
        let serial = p.tree.children(p.root)[0];
        let case = p.tree.children(serial)[0];
        assert_eq!(p.tree.attr(case), Attr::CaseClause);
        let kids = p.tree.children(case);
        assert_eq!(kids.len(), 5);
        assert_eq!(p.tree.attr(kids[4]), Attr::OutPart);
    }

    #[test]
    fn parses_conformity_case() {
        let p = clean(
            "UNION (INT, STRING) u := 1; CASE u IN (INT i): i, (STRING s): 0 OUT -1 ESAC",
        );
        let serial = p.tree.children(p.root)[0];
        let case = p.tree.children(serial)[1];
        assert_eq!(p.tree.attr(case), Attr::ConformityClause);
        let kids = p.tree.children(case);
        assert_eq!(p.tree.attr(kids[1]), Attr::ConformityAlternative);
        assert!(p.tree.node(kids[1]).tag.is_some());
    }

    #[test]
    fn parses_full_loop_header() {
        let p = clean("FOR i FROM 1 BY 2 TO 9 WHILE TRUE DO SKIP OD");
        let serial = p.tree.children(p.root)[0];
        let l = p.tree.children(serial)[0];
        assert_eq!(p.tree.attr(l), Attr::LoopClause);
        let kinds: Vec<Attr> = p.tree.children(l).iter().map(|&c| p.tree.attr(c)).collect();
        assert_eq!(
            kinds,
            vec![
                Attr::ForPart,
                Attr::FromPart,
                Attr::ByPart,
                Attr::ToPart,
                Attr::WhilePart,
                Attr::DoPart
            ]
        );
    }

    #[test]
    fn parses_do_until_loop() {
        let p = clean("INT i := 0; DO i := i + 1 UNTIL i = 3 OD");
        let serial = p.tree.children(p.root)[0];
        let l = p.tree.children(serial)[1];
        let kinds: Vec<Attr> = p.tree.children(l).iter().map(|&c| p.tree.attr(c)).collect();
        assert_eq!(kinds, vec![Attr::DoPart, Attr::UntilPart]);
    }

    #[test]
    fn parses_collateral_display() {
        let p = clean("[] INT v = (1, 2, 3)");
        let serial = p.tree.children(p.root)[0];
        let decl = p.tree.children(serial)[0];
        let display = p.tree.children(decl)[0];
        assert_eq!(p.tree.attr(display), Attr::CollateralClause);
        assert_eq!(p.tree.children(display).len(), 3);
    }

    #[test]
    fn parses_parallel_clause() {
        let p = clean("PAR (SKIP, SKIP)");
        let serial = p.tree.children(p.root)[0];
        let par = p.tree.children(serial)[0];
        assert_eq!(p.tree.attr(par), Attr::ParallelClause);
        assert_eq!(p.tree.children(par).len(), 2);
    }

    #[test]
    fn parses_labels_and_jumps() {
        let p = clean("INT i := 0; again: i := i + 1; IF i < 3 THEN GOTO again FI");
        assert!(!p.diags.has_errors());
    }

    #[test]
    fn parses_routine_declarations() {
        let p = clean("PROC f = (REF STRING s) VOID: s := \"hi\"; STRING t := \"old\"; f(t)");
        assert!(!p.diags.has_errors());
    }

    #[test]
    fn parses_mode_and_operator_declarations() {
        let p = clean(
            "MODE VEC = STRUCT (REAL x, REAL y); \
             OP + = (VEC a, VEC b) VEC: (x OF a + x OF b, y OF a + y OF b); \
             VEC v = (1.0, 2.0)",
        );
        assert!(!p.diags.has_errors());
    }

    #[test]
    fn parses_recursive_mode_declaration() {
        let p = clean("MODE LIST = STRUCT (INT v, REF LIST next); LIST l = (1, NIL)");
        assert!(!p.diags.has_errors());
    }
}
