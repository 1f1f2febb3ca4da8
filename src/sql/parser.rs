//! # Query Parser
//!
//! Recursive descent over the token stream for the single production the
//! engine accepts. An input may hold several queries back to back; each one
//! begins at `WITH` and the trailing semicolon is optional for the last.
//!
//! The parser also enforces the shape constraints the grammar implies: the
//! final `SELECT` must be `SELECT *`, and its `FROM` must name the
//! WITH-declared table.

use eyre::{bail, ensure, eyre, Result};

use super::ast::{Column, Operand, Operation, Query, Term, WithDecl};
use super::lexer::{tokenize, Token};
use crate::types::Comparator;

/// Parses every query in `input`, in order.
pub fn parse_queries(input: &str) -> Result<Vec<Query>> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let mut queries = Vec::new();
    while !parser.at_end() {
        queries.push(parser.query()?);
    }
    ensure!(!queries.is_empty(), "input holds no queries");
    Ok(queries)
}

/// Parses exactly one query.
pub fn parse_query(input: &str) -> Result<Query> {
    let queries = parse_queries(input)?;
    ensure!(
        queries.len() == 1,
        "expected exactly one query, found {}",
        queries.len()
    );
    Ok(queries.into_iter().next().ok_or_else(|| eyre!("no query parsed"))?)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<&Token> {
        let token = self
            .tokens
            .get(self.pos)
            .ok_or_else(|| eyre!("unexpected end of query"))?;
        self.pos += 1;
        Ok(token)
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        let token = self.next()?;
        ensure!(
            token.is_keyword(keyword),
            "expected keyword '{keyword}', found {token:?}"
        );
        Ok(())
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        let token = self.next()?;
        ensure!(token == expected, "expected {expected:?}, found {token:?}");
        Ok(())
    }

    fn ident(&mut self) -> Result<String> {
        match self.next()? {
            Token::Ident(name) => Ok(name.clone()),
            other => bail!("expected identifier, found {other:?}"),
        }
    }

    fn query(&mut self) -> Result<Query> {
        self.expect_keyword("WITH")?;
        self.expect_keyword("RECURSIVE")?;
        let name = self.ident()?;
        self.expect(&Token::LParen)?;
        let mut cols = vec![self.ident()?];
        while self.peek() == Some(&Token::Comma) {
            self.pos += 1;
            cols.push(self.ident()?);
        }
        self.expect(&Token::RParen)?;
        self.expect_keyword("AS")?;
        self.expect(&Token::LParen)?;
        let base = self.term()?;
        self.expect_keyword("UNION")?;
        let recursive = self.term()?;
        self.expect(&Token::RParen)?;

        self.expect_keyword("SELECT")?;
        self.expect(&Token::Star)?;
        self.expect_keyword("INTO")?;
        let destination = self.ident()?;
        self.expect_keyword("FROM")?;
        let from = self.ident()?;
        ensure!(
            from == name,
            "final SELECT must read the declared table '{name}', not '{from}'"
        );
        if self.peek() == Some(&Token::Semi) {
            self.pos += 1;
        }

        Ok(Query {
            decl: WithDecl { name, cols },
            base,
            recursive,
            destination,
        })
    }

    fn term(&mut self) -> Result<Term> {
        self.expect_keyword("SELECT")?;
        let mut cols = vec![self.select_column()?];
        while self.peek() == Some(&Token::Comma) {
            self.pos += 1;
            cols.push(self.select_column()?);
        }
        self.expect_keyword("FROM")?;
        let mut tables = vec![self.ident()?];
        while self.peek() == Some(&Token::Comma) {
            self.pos += 1;
            tables.push(self.ident()?);
        }
        let mut ops = Vec::new();
        if matches!(self.peek(), Some(t) if t.is_keyword("WHERE")) {
            self.pos += 1;
            ops.push(self.condition()?);
            while matches!(self.peek(), Some(t) if t.is_keyword("AND")) {
                self.pos += 1;
                ops.push(self.condition()?);
            }
        }
        Term::new(cols, tables, ops)
    }

    fn select_column(&mut self) -> Result<Column> {
        if self.peek() == Some(&Token::Star) {
            self.pos += 1;
            return Ok(Column::All);
        }
        self.named_column()
    }

    fn named_column(&mut self) -> Result<Column> {
        let table = self.ident()?;
        self.expect(&Token::Dot)?;
        let column = self.ident()?;
        Ok(Column::named(table, column))
    }

    fn condition(&mut self) -> Result<Operation> {
        let lhs = self.named_column()?;
        let cmp = match self.next()? {
            Token::Eq => Comparator::Eq,
            Token::Gt => Comparator::Gt,
            other => bail!("expected '=' or '>', found {other:?}"),
        };
        let rhs = match self.peek() {
            Some(Token::Number(n)) => {
                let n = *n;
                self.pos += 1;
                Operand::Literal(crate::types::Value::Int(n))
            }
            Some(Token::Str(s)) => {
                let s = s.clone();
                self.pos += 1;
                Operand::Literal(crate::types::Value::Str(s))
            }
            Some(Token::Ident(_)) => Operand::Column(self.named_column()?),
            other => bail!("expected literal or column reference, found {other:?}"),
        };
        Operation::new(lhs, cmp, rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    const CLOSURE: &str = "WITH RECURSIVE t(c1, c2) AS ( \
        SELECT * FROM a UNION \
        SELECT a.c1, t.c2 FROM a, t WHERE t.c1 = a.c2 \
      ) SELECT * INTO n FROM t;";

    #[test]
    fn test_parses_transitive_closure_query() {
        let query = parse_query(CLOSURE).unwrap();
        assert_eq!(query.decl.name, "t");
        assert_eq!(query.decl.cols, vec!["c1", "c2"]);
        assert_eq!(query.destination, "n");
        assert!(query.base.is_select_all());
        assert_eq!(query.base.tables, vec!["a"]);
        assert_eq!(query.recursive.tables, vec!["a", "t"]);
        assert_eq!(query.recursive.ops.len(), 1);
        let op = &query.recursive.ops[0];
        assert_eq!(op.lhs, Column::named("t", "c1"));
        assert_eq!(op.cmp, Comparator::Eq);
        assert_eq!(op.rhs, Operand::Column(Column::named("a", "c2")));
    }

    #[test]
    fn test_parses_literal_and_multiple_conditions() {
        let text = "WITH RECURSIVE t(c1) AS ( \
            SELECT * FROM a UNION \
            SELECT a.c1 FROM a, t WHERE a.c1 > 3 AND a.c1 = t.c1 AND a.c2 = 'x' \
          ) SELECT * INTO out FROM t;";
        let query = parse_query(text).unwrap();
        let ops = &query.recursive.ops;
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0].rhs, Operand::Literal(Value::Int(3)));
        assert_eq!(ops[2].rhs, Operand::Literal(Value::Str("x".to_string())));
    }

    #[test]
    fn test_parses_multiple_queries_split_at_with() {
        let text = format!("{CLOSURE} {}", CLOSURE.replace("INTO n", "INTO m"));
        let queries = parse_queries(&text).unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].destination, "n");
        assert_eq!(queries[1].destination, "m");
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let text = CLOSURE.to_lowercase();
        assert!(parse_query(&text).is_ok());
    }

    #[test]
    fn test_final_select_must_read_declared_table() {
        let text = CLOSURE.replace("INTO n FROM t", "INTO n FROM a");
        assert!(parse_query(&text).is_err());
    }

    #[test]
    fn test_rejects_truncated_query() {
        assert!(parse_query("WITH RECURSIVE t(c1) AS ( SELECT * FROM a").is_err());
    }
}
