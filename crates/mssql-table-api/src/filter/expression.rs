//! Expression dialect: `$filter` strings such as
//! `status eq 'shipped' and total gt 100`.
//!
//! Each clause is `<field> <op> <literal>` with `op` one of `eq`, `ne`,
//! `gt`, `lt`, `ge`, `le`, `like`. Clauses are joined by `and`; there is no
//! `or` and no grouping. Literals may be single-quoted, with `''` standing
//! for one quote inside the literal.

use super::{Clause, Comparison, Filter, Predicate};
use crate::core::{FieldValue, TableSchema};
use crate::error::{ApiError, Result};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Bare(String),
    Quoted(String),
}

impl Token {
    fn is_separator(&self) -> bool {
        matches!(self, Token::Bare(word) if word.eq_ignore_ascii_case("and"))
    }
}

/// Parse a `$filter` string against `schema`. Blank input yields an empty
/// filter.
pub fn parse(input: &str, schema: &TableSchema) -> Result<Filter> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Ok(Filter::new());
    }

    tokens
        .split(Token::is_separator)
        .map(|clause| parse_clause(clause, schema))
        .collect()
}

fn parse_clause(tokens: &[Token], schema: &TableSchema) -> Result<Clause> {
    let (field, op, literal) = match tokens {
        [Token::Bare(field), Token::Bare(op), literal] => (field, op, literal),
        [] => return Err(ApiError::validation("$filter has an empty clause")),
        _ => {
            return Err(ApiError::validation(format!(
                "malformed $filter clause '{}': expected <field> <op> <value>",
                render_tokens(tokens)
            )))
        }
    };

    let column = schema.require_column(field)?;

    let comparison = match op.to_ascii_lowercase().as_str() {
        "eq" => Comparison::Eq,
        "ne" => Comparison::Ne,
        "gt" => Comparison::Gt,
        "lt" => Comparison::Lt,
        "ge" => Comparison::Ge,
        "le" => Comparison::Le,
        "like" => Comparison::Like,
        _ => {
            return Err(ApiError::validation(format!(
                "unknown $filter operator '{}'",
                op
            )))
        }
    };

    // Bare `null` is a null test for eq/ne.
    if let Token::Bare(word) = literal {
        if word.eq_ignore_ascii_case("null") {
            let comparison = match comparison {
                Comparison::Eq => Comparison::IsNull,
                Comparison::Ne => Comparison::IsNotNull,
                _ => {
                    return Err(ApiError::validation(format!(
                        "operator '{}' cannot compare '{}' with null",
                        op, field
                    )))
                }
            };
            return Ok(Predicate::new(&column.name, comparison, Vec::new()).into());
        }
    }

    let raw = match literal {
        Token::Bare(s) | Token::Quoted(s) => s.as_str(),
    };

    let value = if comparison == Comparison::Like {
        FieldValue::Text(format!("%{}%", raw))
    } else {
        FieldValue::from_literal(&column.name, raw, column.semantic_type)?
    };

    Ok(Predicate::new(&column.name, comparison, vec![value]).into())
}

/// Split on whitespace outside quotes. Quoted literals become one token with
/// the outer quotes removed and doubled quotes collapsed.
fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c == '\'' {
            chars.next();
            let mut literal = String::new();
            loop {
                match chars.next() {
                    Some('\'') if chars.peek() == Some(&'\'') => {
                        chars.next();
                        literal.push('\'');
                    }
                    Some('\'') => break,
                    Some(ch) => literal.push(ch),
                    None => {
                        return Err(ApiError::validation(format!(
                            "unterminated string literal in $filter: {}",
                            input
                        )))
                    }
                }
            }
            if let Some(&next) = chars.peek() {
                if !next.is_whitespace() {
                    return Err(ApiError::validation(format!(
                        "unexpected '{}' after string literal in $filter",
                        next
                    )));
                }
            }
            tokens.push(Token::Quoted(literal));
            continue;
        }

        let mut word = String::new();
        while let Some(&ch) = chars.peek() {
            if ch.is_whitespace() {
                break;
            }
            word.push(ch);
            chars.next();
        }
        tokens.push(Token::Bare(word));
    }

    Ok(tokens)
}

fn render_tokens(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(|t| match t {
            Token::Bare(s) => s.clone(),
            Token::Quoted(s) => format!("'{}'", s.replace('\'', "''")),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
