//! Boolean query language: terms, `!` (NOT), `&&` (AND), `||` (OR) and
//! parentheses. Adjacent operands are joined by an implicit AND, so `a b`
//! means `a && b`.
//!
//! Queries are compiled to postfix with the shunting-yard algorithm and run
//! on a stack of postings lists. Malformed queries never fail: an unmatched
//! `)` is ignored, an unmatched `(` is dropped when the operator stack is
//! flushed, and an operator without enough operands is skipped.

use crate::error::Result;
use crate::postings::{complement, intersect, union};
use crate::DocId;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryToken {
    Term(String),
    Not,
    And,
    Or,
    LParen,
    RParen,
}

impl QueryToken {
    fn precedence(&self) -> u8 {
        match self {
            QueryToken::Not => 3,
            QueryToken::And => 2,
            QueryToken::Or => 1,
            _ => 0,
        }
    }

    fn is_operator(&self) -> bool {
        matches!(self, QueryToken::Not | QueryToken::And | QueryToken::Or)
    }

    /// Can end an operand: a term or `)`.
    fn ends_operand(&self) -> bool {
        matches!(self, QueryToken::Term(_) | QueryToken::RParen)
    }

    /// Can start an operand: a term, `(` or `!`.
    fn starts_operand(&self) -> bool {
        matches!(self, QueryToken::Term(_) | QueryToken::LParen | QueryToken::Not)
    }
}

impl fmt::Display for QueryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryToken::Term(t) => f.write_str(t),
            QueryToken::Not => f.write_str("!"),
            QueryToken::And => f.write_str("&&"),
            QueryToken::Or => f.write_str("||"),
            QueryToken::LParen => f.write_str("("),
            QueryToken::RParen => f.write_str(")"),
        }
    }
}

/// Split a query string into tokens in one left-to-right pass.
///
/// `(`, `)`, `!`, `&` and `|` end the current term. `&&` and `||` are matched
/// greedily; a lone `&` or `|` becomes a term of its own, which no indexed
/// token can equal.
pub fn lex(query: &str) -> Vec<QueryToken> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = query.chars().peekable();

    while let Some(c) = chars.next() {
        let op = match c {
            '(' => Some(QueryToken::LParen),
            ')' => Some(QueryToken::RParen),
            '!' => Some(QueryToken::Not),
            '&' if chars.next_if_eq(&'&').is_some() => Some(QueryToken::And),
            '|' if chars.next_if_eq(&'|').is_some() => Some(QueryToken::Or),
            '&' | '|' => Some(QueryToken::Term(c.to_string())),
            c if c.is_whitespace() => None,
            _ => {
                current.push(c);
                continue;
            }
        };
        if !current.is_empty() {
            tokens.push(QueryToken::Term(std::mem::take(&mut current)));
        }
        tokens.extend(op);
    }
    if !current.is_empty() {
        tokens.push(QueryToken::Term(current));
    }
    tokens
}

/// Insert `&&` wherever an operand end is directly followed by an operand
/// start.
pub fn insert_implicit_and(tokens: Vec<QueryToken>) -> Vec<QueryToken> {
    let mut out = Vec::with_capacity(tokens.len() * 2);
    let mut iter = tokens.into_iter().peekable();
    while let Some(t) = iter.next() {
        let join = t.ends_operand() && iter.peek().is_some_and(QueryToken::starts_operand);
        out.push(t);
        if join {
            out.push(QueryToken::And);
        }
    }
    out
}

/// Shunting-yard conversion to postfix. NOT > AND > OR, all left
/// associative.
pub fn to_postfix(tokens: Vec<QueryToken>) -> Vec<QueryToken> {
    let mut output = Vec::with_capacity(tokens.len());
    let mut ops: Vec<QueryToken> = Vec::new();

    for t in tokens {
        match t {
            QueryToken::Term(_) => output.push(t),
            QueryToken::LParen => ops.push(t),
            QueryToken::RParen => {
                while let Some(op) = ops.pop() {
                    if op == QueryToken::LParen {
                        break;
                    }
                    output.push(op);
                }
            }
            _ => {
                while let Some(top) = ops.last() {
                    if *top == QueryToken::LParen || top.precedence() < t.precedence() {
                        break;
                    }
                    output.extend(ops.pop());
                }
                ops.push(t);
            }
        }
    }
    output.extend(ops.into_iter().rev().filter(QueryToken::is_operator));
    output
}

/// Lex, join with implicit ANDs and convert to postfix.
pub fn compile(query: &str) -> Vec<QueryToken> {
    to_postfix(insert_implicit_and(lex(query)))
}

/// Where the evaluator gets its operands from.
pub trait PostingSource {
    /// Ascending, deduplicated ids of documents containing `term`; empty for
    /// an unknown term.
    fn postings(&self, term: &str) -> Result<Vec<DocId>>;

    /// Size of the id universe used by NOT.
    fn total_docs(&self) -> u32;
}

/// Run a postfix program and return what is left on top of the stack.
pub fn evaluate<S: PostingSource + ?Sized>(postfix: &[QueryToken], source: &S) -> Result<Vec<DocId>> {
    let mut stack: Vec<Vec<DocId>> = Vec::new();
    for t in postfix {
        match t {
            QueryToken::Term(term) => stack.push(source.postings(term)?),
            QueryToken::Not => match stack.pop() {
                Some(a) => stack.push(complement(&a, source.total_docs())),
                None => tracing::debug!("skipping ! without operand"),
            },
            QueryToken::And | QueryToken::Or => {
                if stack.len() < 2 {
                    tracing::debug!(op = %t, "skipping operator with missing operand");
                    continue;
                }
                let (Some(b), Some(a)) = (stack.pop(), stack.pop()) else { continue };
                stack.push(if *t == QueryToken::And { intersect(&a, &b) } else { union(&a, &b) });
            }
            QueryToken::LParen | QueryToken::RParen => {}
        }
    }
    Ok(stack.pop().unwrap_or_default())
}

/// Render a postfix program for logs and diagnostics.
pub fn format_postfix(postfix: &[QueryToken]) -> String {
    postfix.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ")
}
