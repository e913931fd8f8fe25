//! The [`Transaction`] type.
use crate::{
    common::warning,
    connection::Connection,
    error::Result,
    fsm::TransactionStatus,
    query::{Params, PreparedQuery, SimpleQuery},
    row::ResultSet,
    transport::{Socket, Transport},
};

/// An RAII implementation of a transaction scope.
///
/// To begin a transaction, use [`Connection::begin`].
///
/// To commit, use [`Transaction::commit`]. If neither committed nor rolled
/// back while the transaction block is still open, dropping the scope queues
/// a rollback, which the connection sends on its next asynchronous
/// operation.
///
/// The scope borrows the connection for the unit of work, so every pending
/// query callback keeps the connection alive by construction.
///
/// # Example
///
/// ```no_run
/// # async fn test(mut conn: pgtide::Connection) -> pgtide::Result<()> {
/// let mut tx = conn.begin().await?;
///
/// tx.fetch("insert into post(name) values('foo')").await?;
///
/// tx.commit().await?;
/// # Ok(())
/// # }
/// ```
pub struct Transaction<'c, T: Transport = Socket> {
    conn: &'c mut Connection<T>,
    finished: bool,
}

impl<'c, T: Transport> Transaction<'c, T> {
    pub(crate) fn new(conn: &'c mut Connection<T>) -> Transaction<'c, T> {
        Self { conn, finished: false }
    }

    /// Issue a simple query on the scope's connection.
    ///
    /// Completion is delivered through the query's callbacks while the
    /// connection is driven.
    pub fn execute(&mut self, query: SimpleQuery) -> Result<()> {
        self.conn.execute(query)
    }

    /// Issue an extended query on the scope's connection.
    pub fn execute_prepared(&mut self, query: PreparedQuery) -> Result<()> {
        self.conn.execute_prepared(query)
    }

    /// Run a simple query to completion, collecting the result sets.
    pub async fn fetch(&mut self, sql: impl Into<String>) -> Result<Vec<ResultSet>> {
        self.conn.simple_query(sql).await
    }

    /// Run an extended query to completion and return its result set.
    pub async fn fetch_prepared(
        &mut self,
        sql: impl Into<String>,
        params: Params,
    ) -> Result<ResultSet> {
        self.conn.prepared_query(sql, params).await
    }

    /// Current transaction-state view.
    pub fn in_transaction(&self) -> bool {
        self.conn.in_transaction()
    }

    /// Transaction state as of the last ReadyForQuery.
    pub fn status(&self) -> TransactionStatus {
        self.conn.transaction_status()
    }

    /// The underlying connection.
    pub fn connection(&mut self) -> &mut Connection<T> {
        self.conn
    }

    /// Commit the transaction.
    pub async fn commit(mut self) -> Result<()> {
        self.finished = true;
        self.conn.control(|conn,done|conn.commit_with(done)).await
    }

    /// Roll the transaction back.
    pub async fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.conn.control(|conn,done|conn.rollback_with(done)).await
    }
}

impl<T: Transport> Drop for Transaction<'_, T> {
    fn drop(&mut self) {
        if !self.finished && self.conn.in_transaction() {
            warning!("transaction scope abandoned, rolling back");
            let _ = self.conn.rollback_with(Box::new(|_|{}));
        }
    }
}

impl<T: Transport> std::fmt::Debug for Transaction<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("status", &self.status())
            .finish()
    }
}
