//! Statement parser
//!
//! Recursive descent over the token stream. One statement per call;
//! a single trailing semicolon is allowed. Operator precedence, loosest
//! first: OR, AND, NOT, comparisons (non-associative), `+ -`, `* /`,
//! unary minus.

use crate::document::{PathStep, Value};
use crate::errors::{Result, VellumError};
use crate::query::ast::{
    BinaryOp, Expr, IntoTarget, OrderBy, Path, Projection, ProjectionField, SelectStatement,
    SortOrder, Source, Statement, UnaryOp,
};
use crate::query::lex::{tokenize, Keyword, Punct, Token, TokenKind};

/// Parse one statement from query text.
pub fn parse(src: &str) -> Result<Statement> {
    let tokens = tokenize(src)?;
    let mut parser = Parser { tokens, pos: 0, end: src.len() };
    let statement = parser.parse_statement()?;
    parser.finish()?;
    Ok(statement)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn peek_nth(&self, n: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + n).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<TokenKind> {
        let kind = self.tokens.get(self.pos).map(|t| t.kind.clone());
        if kind.is_some() {
            self.pos += 1;
        }
        kind
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|t| t.offset).unwrap_or(self.end)
    }

    fn error(&self, expected: &str) -> VellumError {
        let found = match self.peek() {
            Some(kind) => kind.describe(),
            None => "end of input".to_string(),
        };
        VellumError::syntax(format!("expected {expected}, found {found}"), self.offset())
    }

    fn eat_punct(&mut self, punct: Punct) -> bool {
        if self.peek() == Some(&TokenKind::Punct(punct)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: Punct) -> Result<()> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.error(&format!("'{}'", punct.as_str())))
        }
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        if self.peek() == Some(&TokenKind::Keyword(keyword)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(keyword.as_str()))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String> {
        match self.peek() {
            Some(TokenKind::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error(what)),
        }
    }

    fn expect_uint(&mut self, what: &str) -> Result<u64> {
        match self.peek() {
            Some(TokenKind::Int(n)) if *n >= 0 => {
                let n = *n as u64;
                self.pos += 1;
                Ok(n)
            }
            _ => Err(self.error(what)),
        }
    }

    fn finish(&mut self) -> Result<()> {
        self.eat_punct(Punct::Semi);
        if self.pos < self.tokens.len() {
            return Err(self.error("end of statement"));
        }
        Ok(())
    }

    fn parse_statement(&mut self) -> Result<Statement> {
        match self.peek() {
            Some(TokenKind::Keyword(Keyword::Select)) => {
                Ok(Statement::Select(self.parse_select()?))
            }
            Some(TokenKind::Keyword(Keyword::Explain)) => {
                self.pos += 1;
                Ok(Statement::Explain(self.parse_select()?))
            }
            Some(TokenKind::Keyword(Keyword::Insert)) => self.parse_insert(),
            Some(TokenKind::Keyword(Keyword::Update)) => self.parse_update(),
            Some(TokenKind::Keyword(Keyword::Delete)) => self.parse_delete(),
            Some(TokenKind::Keyword(Keyword::Rename)) => {
                self.pos += 1;
                self.expect_keyword(Keyword::Collection)?;
                let from = self.expect_ident("a collection name")?;
                self.expect_keyword(Keyword::To)?;
                let to = self.expect_ident("a collection name")?;
                Ok(Statement::Rename { from, to })
            }
            Some(TokenKind::Keyword(Keyword::Drop)) => {
                self.pos += 1;
                self.expect_keyword(Keyword::Collection)?;
                let collection = self.expect_ident("a collection name")?;
                Ok(Statement::Drop { collection })
            }
            Some(TokenKind::Keyword(Keyword::Analyze)) => {
                self.pos += 1;
                let collection = self.expect_ident("a collection name")?;
                Ok(Statement::Analyze { collection })
            }
            Some(TokenKind::Keyword(Keyword::Rebuild)) => {
                self.pos += 1;
                let options = match self.peek() {
                    Some(TokenKind::Punct(Punct::LBrace)) => Some(self.parse_expr()?),
                    _ => None,
                };
                Ok(Statement::Rebuild { options })
            }
            Some(TokenKind::Keyword(Keyword::Checkpoint)) => {
                self.pos += 1;
                Ok(Statement::Checkpoint)
            }
            Some(TokenKind::Keyword(Keyword::Begin)) => {
                self.pos += 1;
                let _ = self.eat_keyword(Keyword::Trans) || self.eat_keyword(Keyword::Transaction);
                Ok(Statement::Begin)
            }
            Some(TokenKind::Keyword(Keyword::Commit)) => {
                self.pos += 1;
                Ok(Statement::Commit)
            }
            Some(TokenKind::Keyword(Keyword::Rollback)) => {
                self.pos += 1;
                Ok(Statement::Rollback)
            }
            Some(TokenKind::Keyword(Keyword::Pragma)) => {
                self.pos += 1;
                let name = self.expect_ident("a pragma name")?;
                let value = if self.eat_punct(Punct::Eq) {
                    Some(self.expect_uint("a non-negative number")? as i64)
                } else {
                    None
                };
                Ok(Statement::Pragma { name, value })
            }
            _ => Err(self.error("a statement")),
        }
    }

    fn parse_select(&mut self) -> Result<SelectStatement> {
        self.expect_keyword(Keyword::Select)?;
        let projection = self.parse_projection()?;

        let into = if self.eat_keyword(Keyword::Into) {
            if matches!(projection, Projection::Count) {
                return Err(VellumError::syntax(
                    "COUNT(*) cannot be combined with INTO",
                    self.offset(),
                ));
            }
            Some(self.parse_into_target()?)
        } else {
            None
        };

        self.expect_keyword(Keyword::From)?;
        let source = self.parse_source()?;

        let filter = if self.eat_keyword(Keyword::Where) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let order = if self.eat_keyword(Keyword::Order) {
            self.expect_keyword(Keyword::By)?;
            let path = self.parse_path()?;
            let order = if self.eat_keyword(Keyword::Desc) {
                SortOrder::Desc
            } else {
                self.eat_keyword(Keyword::Asc);
                SortOrder::Asc
            };
            Some(OrderBy { path, order })
        } else {
            None
        };

        let limit = if self.eat_keyword(Keyword::Limit) {
            Some(self.expect_uint("a limit count")?)
        } else {
            None
        };

        let offset = if self.eat_keyword(Keyword::Offset) {
            Some(self.expect_uint("an offset count")?)
        } else {
            None
        };

        Ok(SelectStatement { projection, into, source, filter, order, limit, offset })
    }

    fn parse_projection(&mut self) -> Result<Projection> {
        // COUNT(*)
        if self.peek() == Some(&TokenKind::Keyword(Keyword::Count)) {
            self.pos += 1;
            self.expect_punct(Punct::LParen)?;
            self.expect_punct(Punct::Star)?;
            self.expect_punct(Punct::RParen)?;
            return Ok(Projection::Count);
        }
        // Bare `$` means the whole document; `$.x` is a field path.
        if self.peek() == Some(&TokenKind::Punct(Punct::Dollar))
            && !matches!(
                self.peek_nth(1),
                Some(TokenKind::Punct(Punct::Dot)) | Some(TokenKind::Punct(Punct::LBracket))
            )
        {
            self.pos += 1;
            return Ok(Projection::All);
        }

        let mut fields = Vec::new();
        loop {
            let expr = self.parse_expr()?;
            let alias = if self.eat_keyword(Keyword::As) {
                Some(self.expect_ident("an alias")?)
            } else {
                None
            };
            fields.push(ProjectionField { expr, alias });
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        Ok(Projection::Fields(fields))
    }

    fn parse_into_target(&mut self) -> Result<IntoTarget> {
        if self.eat_punct(Punct::Dollar) {
            let name = self.expect_ident("'file'")?;
            if !name.eq_ignore_ascii_case("file") {
                return Err(VellumError::syntax(
                    format!("unknown INTO target '${name}'"),
                    self.offset(),
                ));
            }
            self.expect_punct(Punct::LParen)?;
            let path = match self.advance() {
                Some(TokenKind::Str(path)) => path,
                _ => return Err(self.error("a file path string")),
            };
            self.expect_punct(Punct::RParen)?;
            Ok(IntoTarget::File(path))
        } else {
            Ok(IntoTarget::Collection(self.expect_ident("a collection name")?))
        }
    }

    fn parse_source(&mut self) -> Result<Source> {
        if self.eat_punct(Punct::Dollar) {
            let name = self.expect_ident("a virtual collection name")?;
            return if name.eq_ignore_ascii_case("database") {
                Ok(Source::Database)
            } else if name.eq_ignore_ascii_case("cols") {
                Ok(Source::Cols)
            } else if name.eq_ignore_ascii_case("indexes") {
                Ok(Source::Indexes)
            } else {
                Err(VellumError::syntax(
                    format!("unknown virtual collection '${name}'"),
                    self.offset(),
                ))
            };
        }
        Ok(Source::Collection(self.expect_ident("a collection name")?))
    }

    fn parse_insert(&mut self) -> Result<Statement> {
        self.expect_keyword(Keyword::Insert)?;
        self.expect_keyword(Keyword::Into)?;
        let collection = self.expect_ident("a collection name")?;
        self.expect_keyword(Keyword::Values)?;
        let mut documents = vec![self.parse_expr()?];
        while self.eat_punct(Punct::Comma) {
            documents.push(self.parse_expr()?);
        }
        Ok(Statement::Insert { collection, documents })
    }

    fn parse_update(&mut self) -> Result<Statement> {
        self.expect_keyword(Keyword::Update)?;
        let collection = self.expect_ident("a collection name")?;
        self.expect_keyword(Keyword::Set)?;
        let mut assignments = Vec::new();
        loop {
            let path = self.parse_path()?;
            if path.is_root() {
                return Err(VellumError::syntax(
                    "cannot assign to the document root",
                    self.offset(),
                ));
            }
            self.expect_punct(Punct::Eq)?;
            let expr = self.parse_expr()?;
            assignments.push((path, expr));
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        let filter = if self.eat_keyword(Keyword::Where) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Statement::Update { collection, assignments, filter })
    }

    fn parse_delete(&mut self) -> Result<Statement> {
        self.expect_keyword(Keyword::Delete)?;
        // FROM is optional: both `DELETE people` and `DELETE FROM people`
        self.eat_keyword(Keyword::From);
        let collection = self.expect_ident("a collection name")?;
        let filter = if self.eat_keyword(Keyword::Where) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Statement::Delete { collection, filter })
    }

    fn parse_path(&mut self) -> Result<Path> {
        let mut steps = Vec::new();
        if self.eat_punct(Punct::Dollar) {
            self.parse_path_tail(&mut steps)?;
        } else {
            let first = self.expect_ident("a field path")?;
            steps.push(PathStep::Field(first));
            self.parse_path_tail(&mut steps)?;
        }
        Ok(Path { steps })
    }

    fn parse_path_tail(&mut self, steps: &mut Vec<PathStep>) -> Result<()> {
        loop {
            if self.eat_punct(Punct::Dot) {
                let name = self.expect_ident("a field name")?;
                steps.push(PathStep::Field(name));
            } else if self.eat_punct(Punct::LBracket) {
                let index = self.expect_uint("an array index")?;
                self.expect_punct(Punct::RBracket)?;
                steps.push(PathStep::Index(index as usize));
            } else {
                return Ok(());
            }
        }
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.eat_keyword(Keyword::Or) {
            let right = self.parse_and()?;
            left = Expr::Binary { op: BinaryOp::Or, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while self.eat_keyword(Keyword::And) {
            let right = self.parse_not()?;
            left = Expr::Binary { op: BinaryOp::And, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.eat_keyword(Keyword::Not) {
            let expr = self.parse_not()?;
            return Ok(Expr::Unary { op: UnaryOp::Not, expr: Box::new(expr) });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = self.parse_additive()?;
        let op = match self.peek() {
            Some(TokenKind::Punct(Punct::Eq)) => BinaryOp::Eq,
            Some(TokenKind::Punct(Punct::Ne)) => BinaryOp::NotEq,
            Some(TokenKind::Punct(Punct::Lt)) => BinaryOp::Lt,
            Some(TokenKind::Punct(Punct::Le)) => BinaryOp::LtEq,
            Some(TokenKind::Punct(Punct::Gt)) => BinaryOp::Gt,
            Some(TokenKind::Punct(Punct::Ge)) => BinaryOp::GtEq,
            Some(TokenKind::Keyword(Keyword::Like)) => BinaryOp::Like,
            Some(TokenKind::Keyword(Keyword::In)) => BinaryOp::In,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.parse_additive()?;
        Ok(Expr::Binary { op, left: Box::new(left), right: Box::new(right) })
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Punct(Punct::Plus)) => BinaryOp::Add,
                Some(TokenKind::Punct(Punct::Minus)) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_multiplicative()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Punct(Punct::Star)) => BinaryOp::Mul,
                Some(TokenKind::Punct(Punct::Slash)) => BinaryOp::Div,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.eat_punct(Punct::Minus) {
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary { op: UnaryOp::Neg, expr: Box::new(expr) });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(TokenKind::Int(n)) => {
                let n = *n;
                self.pos += 1;
                Ok(Expr::Literal(Value::Int(n)))
            }
            Some(TokenKind::Double(n)) => {
                let n = *n;
                self.pos += 1;
                Ok(Expr::Literal(Value::Double(n)))
            }
            Some(TokenKind::Str(s)) => {
                let s = s.clone();
                self.pos += 1;
                Ok(Expr::Literal(Value::String(s)))
            }
            Some(TokenKind::Keyword(Keyword::True)) => {
                self.pos += 1;
                Ok(Expr::Literal(Value::Bool(true)))
            }
            Some(TokenKind::Keyword(Keyword::False)) => {
                self.pos += 1;
                Ok(Expr::Literal(Value::Bool(false)))
            }
            Some(TokenKind::Keyword(Keyword::Null)) => {
                self.pos += 1;
                Ok(Expr::Literal(Value::Null))
            }
            Some(TokenKind::Param(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(Expr::Parameter(name))
            }
            Some(TokenKind::Punct(Punct::LParen)) => {
                self.pos += 1;
                let expr = self.parse_expr()?;
                self.expect_punct(Punct::RParen)?;
                Ok(expr)
            }
            Some(TokenKind::Punct(Punct::LBrace)) => self.parse_document_literal(),
            Some(TokenKind::Punct(Punct::LBracket)) => {
                self.pos += 1;
                let mut items = Vec::new();
                if !self.eat_punct(Punct::RBracket) {
                    loop {
                        items.push(self.parse_expr()?);
                        if !self.eat_punct(Punct::Comma) {
                            break;
                        }
                    }
                    self.expect_punct(Punct::RBracket)?;
                }
                Ok(Expr::ArrayLiteral(items))
            }
            Some(TokenKind::Punct(Punct::Dollar)) | Some(TokenKind::Ident(_)) => {
                Ok(Expr::Path(self.parse_path()?))
            }
            _ => Err(self.error("an expression")),
        }
    }

    fn parse_document_literal(&mut self) -> Result<Expr> {
        self.expect_punct(Punct::LBrace)?;
        let mut fields = Vec::new();
        if !self.eat_punct(Punct::RBrace) {
            loop {
                let name = match self.peek() {
                    Some(TokenKind::Ident(name)) => name.clone(),
                    Some(TokenKind::Str(name)) => name.clone(),
                    _ => return Err(self.error("a field name")),
                };
                self.pos += 1;
                self.expect_punct(Punct::Colon)?;
                let value = self.parse_expr()?;
                fields.push((name, value));
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
            self.expect_punct(Punct::RBrace)?;
        }
        Ok(Expr::DocumentLiteral(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_path(name: &str) -> Expr {
        Expr::Path(Path { steps: vec![PathStep::Field(name.into())] })
    }

    #[test]
    fn test_select_all() {
        let stmt = parse("SELECT $ FROM people;").unwrap();
        match stmt {
            Statement::Select(s) => {
                assert_eq!(s.projection, Projection::All);
                assert_eq!(s.source, Source::Collection("people".into()));
                assert!(s.filter.is_none() && s.order.is_none());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_select_full_clause_set() {
        let stmt = parse(
            "SELECT name AS who, address.city FROM people \
             WHERE age >= 21 AND name LIKE 'A%' \
             ORDER BY age DESC LIMIT 10 OFFSET 5",
        )
        .unwrap();
        let s = match stmt {
            Statement::Select(s) => s,
            other => panic!("unexpected: {other:?}"),
        };
        match &s.projection {
            Projection::Fields(fields) => {
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[0].alias.as_deref(), Some("who"));
                assert_eq!(fields[1].output_name(1), "city");
            }
            other => panic!("unexpected projection: {other:?}"),
        }
        assert!(s.filter.is_some());
        let order = s.order.unwrap();
        assert_eq!(order.order, SortOrder::Desc);
        assert_eq!(order.path.to_string(), "$.age");
        assert_eq!(s.limit, Some(10));
        assert_eq!(s.offset, Some(5));
    }

    #[test]
    fn test_count_projection() {
        let stmt = parse("SELECT COUNT(*) FROM people WHERE age > 30").unwrap();
        match stmt {
            Statement::Select(s) => assert_eq!(s.projection, Projection::Count),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(parse("SELECT COUNT(*) INTO backup FROM people").is_err());
    }

    #[test]
    fn test_explain_wraps_select() {
        let stmt = parse("EXPLAIN SELECT $ FROM people WHERE age > 1").unwrap();
        assert!(matches!(stmt, Statement::Explain(_)));
        assert!(parse("EXPLAIN DROP COLLECTION x").is_err());
    }

    #[test]
    fn test_virtual_sources() {
        for (sql, source) in [
            ("SELECT $ FROM $database", Source::Database),
            ("SELECT $ FROM $cols", Source::Cols),
            ("SELECT $ FROM $indexes", Source::Indexes),
        ] {
            match parse(sql).unwrap() {
                Statement::Select(s) => assert_eq!(s.source, source),
                other => panic!("unexpected: {other:?}"),
            }
        }
        assert!(parse("SELECT $ FROM $bogus").is_err());
    }

    #[test]
    fn test_select_into() {
        match parse("SELECT $ INTO backup FROM people").unwrap() {
            Statement::Select(s) => {
                assert_eq!(s.into, Some(IntoTarget::Collection("backup".into())))
            }
            other => panic!("unexpected: {other:?}"),
        }
        match parse("SELECT $ INTO $file('/tmp/people.json') FROM people").unwrap() {
            Statement::Select(s) => {
                assert_eq!(s.into, Some(IntoTarget::File("/tmp/people.json".into())))
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_insert_documents() {
        let stmt = parse("INSERT INTO people VALUES {name: 'Ada'}, {name: 'Grace', age: 36}")
            .unwrap();
        match stmt {
            Statement::Insert { collection, documents } => {
                assert_eq!(collection, "people");
                assert_eq!(documents.len(), 2);
                match &documents[1] {
                    Expr::DocumentLiteral(fields) => assert_eq!(fields.len(), 2),
                    other => panic!("unexpected: {other:?}"),
                }
            }
            other => panic!("unexpected: {other:?}"),
        }
        // Parameters can stand in for whole documents
        let stmt = parse("INSERT INTO people VALUES @doc").unwrap();
        match stmt {
            Statement::Insert { documents, .. } => {
                assert_eq!(documents, vec![Expr::Parameter("doc".into())])
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_update_assignments() {
        let stmt =
            parse("UPDATE people SET age = age + 1, address.city = 'Porto' WHERE _id = 1")
                .unwrap();
        match stmt {
            Statement::Update { collection, assignments, filter } => {
                assert_eq!(collection, "people");
                assert_eq!(assignments.len(), 2);
                assert_eq!(assignments[0].0.to_string(), "$.age");
                assert_eq!(assignments[1].0.to_string(), "$.address.city");
                assert!(filter.is_some());
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(parse("UPDATE people SET $ = 1").is_err());
    }

    #[test]
    fn test_delete_with_and_without_from() {
        for sql in ["DELETE FROM people WHERE age < 0", "DELETE people WHERE age < 0"] {
            match parse(sql).unwrap() {
                Statement::Delete { collection, filter } => {
                    assert_eq!(collection, "people");
                    assert!(filter.is_some());
                }
                other => panic!("unexpected: {other:?}"),
            }
        }
    }

    #[test]
    fn test_ddl_statements() {
        assert_eq!(
            parse("RENAME COLLECTION old TO new_name").unwrap(),
            Statement::Rename { from: "old".into(), to: "new_name".into() }
        );
        assert_eq!(
            parse("DROP COLLECTION people").unwrap(),
            Statement::Drop { collection: "people".into() }
        );
        assert_eq!(
            parse("ANALYZE people").unwrap(),
            Statement::Analyze { collection: "people".into() }
        );
    }

    #[test]
    fn test_rebuild_with_options() {
        assert_eq!(parse("REBUILD").unwrap(), Statement::Rebuild { options: None });
        match parse("REBUILD {collation: 'nocase'}").unwrap() {
            Statement::Rebuild { options: Some(Expr::DocumentLiteral(fields)) } => {
                assert_eq!(fields[0].0, "collation");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_transaction_statements() {
        for sql in ["BEGIN", "BEGIN TRANS", "BEGIN TRANSACTION", "begin transaction;"] {
            assert_eq!(parse(sql).unwrap(), Statement::Begin, "{sql}");
        }
        assert_eq!(parse("COMMIT").unwrap(), Statement::Commit);
        assert_eq!(parse("ROLLBACK;").unwrap(), Statement::Rollback);
        assert_eq!(parse("CHECKPOINT").unwrap(), Statement::Checkpoint);
    }

    #[test]
    fn test_pragma() {
        assert_eq!(
            parse("PRAGMA USER_VERSION").unwrap(),
            Statement::Pragma { name: "USER_VERSION".into(), value: None }
        );
        assert_eq!(
            parse("PRAGMA user_version = 7").unwrap(),
            Statement::Pragma { name: "user_version".into(), value: Some(7) }
        );
    }

    #[test]
    fn test_operator_precedence() {
        // a = 1 OR b = 2 AND c = 3  parses as  a = 1 OR ((b = 2) AND (c = 3))
        let stmt = parse("SELECT $ FROM t WHERE a = 1 OR b = 2 AND c = 3").unwrap();
        let filter = match stmt {
            Statement::Select(s) => s.filter.unwrap(),
            other => panic!("unexpected: {other:?}"),
        };
        assert_eq!(
            filter.to_string(),
            "(($.a = 1) OR (($.b = 2) AND ($.c = 3)))"
        );

        // 1 + 2 * 3 parses as 1 + (2 * 3)
        let stmt = parse("SELECT $ FROM t WHERE x = 1 + 2 * 3").unwrap();
        let filter = match stmt {
            Statement::Select(s) => s.filter.unwrap(),
            other => panic!("unexpected: {other:?}"),
        };
        assert_eq!(filter.to_string(), "($.x = (1 + (2 * 3)))");
    }

    #[test]
    fn test_unary_and_grouping() {
        let stmt = parse("SELECT $ FROM t WHERE -(a + 1) < 0 AND NOT hidden").unwrap();
        let filter = match stmt {
            Statement::Select(s) => s.filter.unwrap(),
            other => panic!("unexpected: {other:?}"),
        };
        assert_eq!(
            filter.to_string(),
            "((-(($.a + 1)) < 0) AND NOT ($.hidden))"
        );
    }

    #[test]
    fn test_in_and_array_literals() {
        let stmt = parse("SELECT $ FROM t WHERE status IN ['new', 'open']").unwrap();
        let filter = match stmt {
            Statement::Select(s) => s.filter.unwrap(),
            other => panic!("unexpected: {other:?}"),
        };
        match filter {
            Expr::Binary { op: BinaryOp::In, right, .. } => match *right {
                Expr::ArrayLiteral(items) => assert_eq!(items.len(), 2),
                other => panic!("unexpected: {other:?}"),
            },
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_paths_with_indexes() {
        let stmt = parse("SELECT $.tags[0], items[2].name FROM t").unwrap();
        let fields = match stmt {
            Statement::Select(s) => match s.projection {
                Projection::Fields(fields) => fields,
                other => panic!("unexpected: {other:?}"),
            },
            other => panic!("unexpected: {other:?}"),
        };
        assert_eq!(fields[0].expr, Expr::Path(Path {
            steps: vec![PathStep::Field("tags".into()), PathStep::Index(0)],
        }));
        assert_eq!(fields[1].output_name(1), "name");
    }

    #[test]
    fn test_error_positions_and_trailing_input() {
        match parse("SELECT $ people").unwrap_err() {
            VellumError::Syntax { position, message } => {
                assert_eq!(position, 9);
                assert!(message.contains("FROM"), "got: {message}");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(parse("SELECT $ FROM a; SELECT $ FROM b").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn test_where_against_parameter() {
        let stmt = parse("SELECT $ FROM t WHERE name = @who").unwrap();
        let filter = match stmt {
            Statement::Select(s) => s.filter.unwrap(),
            other => panic!("unexpected: {other:?}"),
        };
        assert_eq!(
            filter,
            Expr::Binary {
                op: BinaryOp::Eq,
                left: Box::new(field_path("name")),
                right: Box::new(Expr::Parameter("who".into())),
            }
        );
    }
}
