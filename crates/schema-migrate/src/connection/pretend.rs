use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::traits::Connection;
use crate::core::value::Row;
use crate::drivers::Dialect;
use crate::error::Result;

/// Records statements instead of executing them.
///
/// Reads go to the wrapped connection so grammars that inspect the live
/// schema (SQLite rebuilds, the foreign-key pragma) still compile the same
/// statements a real run would. Transaction control is a no-op.
pub struct PretendConnection<'a> {
    inner: &'a dyn Connection,
    captured: Mutex<Vec<String>>,
}

impl<'a> PretendConnection<'a> {
    pub fn new(inner: &'a dyn Connection) -> Self {
        Self {
            inner,
            captured: Mutex::new(Vec::new()),
        }
    }

    /// Statements recorded so far.
    pub fn statements(&self) -> Vec<String> {
        self.captured.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Take the recorded statements, leaving the log empty.
    pub fn take_statements(&self) -> Vec<String> {
        self.captured
            .lock()
            .map(|mut c| std::mem::take(&mut *c))
            .unwrap_or_default()
    }
}

#[async_trait]
impl Connection for PretendConnection<'_> {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    fn database_name(&self) -> &str {
        self.inner.database_name()
    }

    async fn select(&self, sql: &str) -> Result<Vec<Row>> {
        self.inner.select(sql).await
    }

    async fn statement(&self, sql: &str) -> Result<()> {
        if let Ok(mut captured) = self.captured.lock() {
            captured.push(sql.to_string());
        }
        Ok(())
    }

    async fn begin(&self) -> Result<()> {
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        Ok(())
    }

    fn pretending(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::blueprint::Blueprint;
    use crate::testing::FakeConnection;

    #[tokio::test]
    async fn test_records_without_executing() {
        let inner = FakeConnection::new(Dialect::MySql);
        let pretend = PretendConnection::new(&inner);

        let mut bp = Blueprint::new("users");
        bp.create();
        bp.increments("id");
        pretend.begin().await.unwrap();
        bp.build(&pretend).await.unwrap();
        pretend.commit().await.unwrap();

        assert!(pretend.pretending());
        assert_eq!(
            pretend.statements(),
            ["CREATE TABLE `users` (`id` INT NOT NULL AUTO_INCREMENT PRIMARY KEY)"]
        );
        assert!(inner.log().is_empty());
        assert_eq!(pretend.take_statements().len(), 1);
        assert!(pretend.statements().is_empty());
    }
}
