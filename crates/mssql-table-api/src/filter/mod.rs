//! Filter translation.
//!
//! Two input dialects compile into one predicate tree:
//! - [`structured`]: a list of grid filter conditions (JSON body).
//! - [`expression`]: a `$filter` query string of `and`-joined clauses.
//!
//! Compilation validates every field against the table schema before any
//! predicate is produced, so one bad field rejects the whole filter. Values
//! always travel as bound parameters; only catalog-discovered column names,
//! bracket-quoted, appear in the rendered SQL.

pub mod expression;
pub mod structured;

pub use structured::FilterCondition;

use crate::core::identifier::quote_mssql;
use crate::core::FieldValue;
use crate::db::Statement;
use crate::error::Result;

/// Comparison applied by a single predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    /// Pattern match; the parameter already carries its wildcards.
    Like,
    /// Inclusive range with two parameters.
    Between,
    IsNull,
    IsNotNull,
}

impl Comparison {
    /// Number of bound parameters the comparison takes.
    pub fn arity(&self) -> usize {
        match self {
            Comparison::IsNull | Comparison::IsNotNull => 0,
            Comparison::Between => 2,
            _ => 1,
        }
    }

    fn sql_operator(&self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ne => "<>",
            Comparison::Gt => ">",
            Comparison::Lt => "<",
            Comparison::Ge => ">=",
            Comparison::Le => "<=",
            Comparison::Like => "LIKE",
            Comparison::Between => "BETWEEN",
            Comparison::IsNull => "IS NULL",
            Comparison::IsNotNull => "IS NOT NULL",
        }
    }
}

/// One field comparison with its bound values.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: String,
    pub comparison: Comparison,
    pub params: Vec<FieldValue>,
}

impl Predicate {
    pub fn new(field: impl Into<String>, comparison: Comparison, params: Vec<FieldValue>) -> Self {
        Self {
            field: field.into(),
            comparison,
            params,
        }
    }

    /// Equality against a single value.
    pub fn eq(field: impl Into<String>, value: FieldValue) -> Self {
        Self::new(field, Comparison::Eq, vec![value])
    }

    fn render(&self, stmt: &mut Statement) -> Result<String> {
        let column = quote_mssql(&self.field)?;
        let op = self.comparison.sql_operator();
        let sql = match self.comparison {
            Comparison::IsNull | Comparison::IsNotNull => format!("{} {}", column, op),
            Comparison::Between => {
                let low = stmt.push_param(param_at(&self.params, 0));
                let high = stmt.push_param(param_at(&self.params, 1));
                format!("{} BETWEEN {} AND {}", column, low, high)
            }
            _ => {
                let p = stmt.push_param(param_at(&self.params, 0));
                format!("{} {} {}", column, op, p)
            }
        };
        Ok(sql)
    }
}

fn param_at(params: &[FieldValue], idx: usize) -> FieldValue {
    params.get(idx).cloned().unwrap_or(FieldValue::Null)
}

/// A predicate or a two-way logical combination of clauses.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Single(Predicate),
    Or(Box<Clause>, Box<Clause>),
    And(Box<Clause>, Box<Clause>),
}

impl Clause {
    pub fn or(left: Clause, right: Clause) -> Self {
        Clause::Or(Box::new(left), Box::new(right))
    }

    pub fn and(left: Clause, right: Clause) -> Self {
        Clause::And(Box::new(left), Box::new(right))
    }

    fn is_compound(&self) -> bool {
        !matches!(self, Clause::Single(_))
    }

    fn render(&self, stmt: &mut Statement) -> Result<String> {
        match self {
            Clause::Single(p) => p.render(stmt),
            Clause::Or(l, r) => Ok(format!("({}) OR ({})", l.render(stmt)?, r.render(stmt)?)),
            Clause::And(l, r) => Ok(format!("({}) AND ({})", l.render(stmt)?, r.render(stmt)?)),
        }
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Clause::Single(p) => out.push(&p.field),
            Clause::Or(l, r) | Clause::And(l, r) => {
                l.collect_fields(out);
                r.collect_fields(out);
            }
        }
    }
}

impl From<Predicate> for Clause {
    fn from(p: Predicate) -> Self {
        Clause::Single(p)
    }
}

/// Top-level clauses, combined with AND.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, clause: impl Into<Clause>) {
        self.clauses.push(clause.into());
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Every field referenced anywhere in the filter.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        for clause in &self.clauses {
            clause.collect_fields(&mut out);
        }
        out
    }

    /// Render the filter as a WHERE condition, binding values into `stmt`.
    /// Returns `None` for an empty filter.
    pub fn render(&self, stmt: &mut Statement) -> Result<Option<String>> {
        if self.clauses.is_empty() {
            return Ok(None);
        }

        let wrap = self.clauses.len() > 1;
        let mut parts = Vec::with_capacity(self.clauses.len());
        for clause in &self.clauses {
            let sql = clause.render(stmt)?;
            if wrap && clause.is_compound() {
                parts.push(format!("({})", sql));
            } else {
                parts.push(sql);
            }
        }
        Ok(Some(parts.join(" AND ")))
    }
}

impl FromIterator<Clause> for Filter {
    fn from_iter<I: IntoIterator<Item = Clause>>(iter: I) -> Self {
        Self {
            clauses: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(filter: &Filter) -> (Option<String>, Vec<FieldValue>) {
        let mut stmt = Statement::new("");
        let sql = filter.render(&mut stmt).unwrap();
        (sql, stmt.params)
    }

    #[test]
    fn test_empty_filter_renders_nothing() {
        assert_eq!(render(&Filter::new()).0, None);
    }

    #[test]
    fn test_siblings_combine_with_and() {
        let mut filter = Filter::new();
        filter.push(Predicate::eq("status", "shipped".into()));
        filter.push(Predicate::new("total", Comparison::Gt, vec![FieldValue::Integer(100)]));

        let (sql, params) = render(&filter);
        assert_eq!(sql.unwrap(), "[status] = @P1 AND [total] > @P2");
        assert_eq!(params, vec![FieldValue::from("shipped"), FieldValue::Integer(100)]);
    }

    #[test]
    fn test_or_clause_is_parenthesized_among_siblings() {
        let mut filter = Filter::new();
        filter.push(Clause::or(
            Predicate::eq("status", "new".into()).into(),
            Predicate::eq("status", "open".into()).into(),
        ));
        assert_eq!(render(&filter).0.unwrap(), "([status] = @P1) OR ([status] = @P2)");

        filter.push(Predicate::new("total", Comparison::IsNull, vec![]));
        assert_eq!(
            render(&filter).0.unwrap(),
            "(([status] = @P1) OR ([status] = @P2)) AND [total] IS NULL"
        );
    }

    #[test]
    fn test_between_binds_two_params() {
        let filter: Filter = vec![Clause::Single(Predicate::new(
            "total",
            Comparison::Between,
            vec![FieldValue::Integer(10), FieldValue::Integer(20)],
        ))]
        .into_iter()
        .collect();

        let (sql, params) = render(&filter);
        assert_eq!(sql.unwrap(), "[total] BETWEEN @P1 AND @P2");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_identifiers_are_quoted() {
        let mut filter = Filter::new();
        filter.push(Predicate::eq("odd]name", FieldValue::Integer(1)));
        assert_eq!(render(&filter).0.unwrap(), "[odd]]name] = @P1");
        assert_eq!(filter.fields(), vec!["odd]name"]);
    }
}
