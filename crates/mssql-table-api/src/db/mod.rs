//! Database access seam.
//!
//! Everything above this module speaks in [`Statement`]s (parameterized
//! T-SQL plus bound [`FieldValue`]s) and decoded rows. The only production
//! implementation is [`MssqlPool`]; tests substitute a recording fake.

mod mssql;

pub use mssql::MssqlPool;

use crate::core::FieldValue;
use crate::error::Result;
use async_trait::async_trait;

/// A parameterized statement. Placeholders are `@P1..@Pn` in the order of
/// `params`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<FieldValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Append a parameter and return its placeholder.
    pub fn push_param(&mut self, value: FieldValue) -> String {
        self.params.push(value);
        format!("@P{}", self.params.len())
    }

    /// Builder-style parameter binding for statements whose SQL already
    /// contains the placeholders.
    pub fn bind(mut self, value: impl Into<FieldValue>) -> Self {
        self.params.push(value.into());
        self
    }
}

/// Trait for database operations.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run a query and decode each row. `column_types` holds the native type
    /// of every projected column, in order, and drives decoding.
    async fn query(&self, stmt: &Statement, column_types: &[&str]) -> Result<Vec<Vec<FieldValue>>>;

    /// Run a statement and return the number of affected rows.
    async fn execute(&self, stmt: &Statement) -> Result<u64>;

    /// Round-trip a trivial query to check connectivity.
    async fn ping(&self) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod fake {
    //! Recording in-memory stand-in for [`Database`].

    use super::*;
    use crate::error::ApiError;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays queued responses and records every statement it receives.
    #[derive(Default)]
    pub struct FakeDatabase {
        responses: Mutex<VecDeque<Result<Vec<Vec<FieldValue>>>>>,
        affected: Mutex<VecDeque<u64>>,
        log: Mutex<Vec<Statement>>,
        delay: Option<Duration>,
    }

    impl FakeDatabase {
        pub fn new() -> Self {
            Self::default()
        }

        /// Sleep before answering each call, to widen race windows.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn push_rows(&self, rows: Vec<Vec<FieldValue>>) {
            self.responses.lock().unwrap().push_back(Ok(rows));
        }

        pub fn push_error(&self, err: ApiError) {
            self.responses.lock().unwrap().push_back(Err(err));
        }

        pub fn push_affected(&self, rows: u64) {
            self.affected.lock().unwrap().push_back(rows);
        }

        pub fn statements(&self) -> Vec<Statement> {
            self.log.lock().unwrap().clone()
        }

        pub fn statement_count(&self) -> usize {
            self.log.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Database for FakeDatabase {
        async fn query(&self, stmt: &Statement, _column_types: &[&str]) -> Result<Vec<Vec<FieldValue>>> {
            self.log.lock().unwrap().push(stmt.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn execute(&self, stmt: &Statement) -> Result<u64> {
            self.log.lock().unwrap().push(stmt.clone());
            Ok(self.affected.lock().unwrap().pop_front().unwrap_or(1))
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_param_numbers_placeholders() {
        let mut stmt = Statement::new("");
        assert_eq!(stmt.push_param(FieldValue::Integer(1)), "@P1");
        assert_eq!(stmt.push_param(FieldValue::Text("a".into())), "@P2");
        assert_eq!(stmt.params.len(), 2);
    }

    #[test]
    fn test_bind_builder() {
        let stmt = Statement::new("SELECT 1 WHERE a = @P1").bind("x");
        assert_eq!(stmt.params, vec![FieldValue::Text("x".into())]);
    }
}
