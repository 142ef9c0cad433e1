use std::sync::Arc;

use async_trait::async_trait;
use deadpool_postgres::{Config as PgConfig, Pool};
use tracing::{debug, error, info};

use crate::binding::Command;
use crate::config;
use crate::error::SqlcmdPgError;
use crate::executor::build_result_set_from_rows;
use crate::params::Params;
use crate::results::ResultSet;
use crate::stream::{QueryStream, StreamOptions, StreamPool};
use crate::types::RowValues;

/// A configured PostgreSQL connection pool with one-shot and streaming
/// query entry points.
///
/// One-shot queries ([`query`](Connection::query),
/// [`execute`](Connection::execute)) acquire a pooled connection, run a
/// single statement, decode the full result eagerly, and return the
/// connection before reporting the outcome. Streaming queries
/// ([`query_stream`](Connection::query_stream)) pull rows incrementally
/// through a [`QueryStream`].
pub struct Connection {
    options: PgConfig,
    pool: Pool,
    stream_pool: Option<Arc<dyn StreamPool>>,
}

impl Connection {
    /// Validate the options and build the connection pool.
    ///
    /// # Errors
    /// Returns `SqlcmdPgError::ConfigError` if required config fields are
    /// missing, or `SqlcmdPgError::ConnectionError` if pool creation fails.
    pub fn new(options: PgConfig) -> Result<Self, SqlcmdPgError> {
        config::validate_config(&options)?;
        let pool = config::create_pool(&options)?;
        Ok(Self {
            options,
            pool,
            stream_pool: None,
        })
    }

    /// Attach the protocol-driver pool used by the streaming query path.
    #[must_use]
    pub fn with_stream_pool(mut self, stream_pool: Arc<dyn StreamPool>) -> Self {
        self.stream_pool = Some(stream_pool);
        self
    }

    /// The configured database name.
    #[must_use]
    pub fn database(&self) -> Option<&str> {
        self.options.dbname.as_deref()
    }

    /// Close the pool: drop idle connections and refuse new leases.
    ///
    /// Does not interrupt connections currently leased out; they are
    /// discarded when returned.
    pub fn close(&self) {
        self.pool.close();
    }

    /// The connection options this pool was built from.
    #[must_use]
    pub fn options(&self) -> &PgConfig {
        &self.options
    }

    /// Run a single SQL query and buffer all resulting rows.
    ///
    /// The pooled connection is released before the outcome is surfaced,
    /// whether the query succeeded or failed.
    ///
    /// # Errors
    /// Returns pool errors on acquisition failure (the SQL layer is never
    /// touched) and execution/decode errors otherwise.
    pub async fn query(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, SqlcmdPgError> {
        info!(sql, params = ?params, "executing SQL");
        let client = self.pool.get().await?;
        let converted = Params::convert(params)?;
        let outcome = client.query(sql, converted.as_refs()).await;
        drop(client);
        match outcome {
            Ok(rows) => {
                let result_set = build_result_set_from_rows(&rows)?;
                debug!(rows = result_set.results.len(), "query complete");
                Ok(result_set)
            }
            Err(e) => {
                error!(error = %e, "query error");
                Err(e.into())
            }
        }
    }

    /// Run a single DML statement and return the affected-row count.
    ///
    /// # Errors
    /// Same contract as [`query`](Connection::query).
    pub async fn execute(&self, sql: &str, params: &[RowValues]) -> Result<u64, SqlcmdPgError> {
        info!(sql, params = ?params, "executing SQL");
        let client = self.pool.get().await?;
        let converted = Params::convert(params)?;
        let outcome = client.execute(sql, converted.as_refs()).await;
        drop(client);
        match outcome {
            Ok(count) => {
                debug!(rows_affected = count, "statement complete");
                Ok(count)
            }
            Err(e) => {
                error!(error = %e, "statement error");
                Err(e.into())
            }
        }
    }

    /// Run a batch of statements over the simple-query protocol.
    ///
    /// Used for DDL (such as `CREATE DATABASE`) that must not run inside an
    /// implicit prepared-statement transaction.
    ///
    /// # Errors
    /// Same contract as [`query`](Connection::query).
    pub async fn execute_batch(&self, sql: &str) -> Result<(), SqlcmdPgError> {
        info!(sql, "executing batch SQL");
        let client = self.pool.get().await?;
        let outcome = client.batch_execute(sql).await;
        drop(client);
        match outcome {
            Ok(()) => {
                debug!("batch complete");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "batch error");
                Err(e.into())
            }
        }
    }

    /// Bind a [`Command`]'s named parameters and run the rewritten query.
    ///
    /// # Errors
    /// Binding failures (missing names) surface before any I/O; execution
    /// follows the [`query`](Connection::query) contract.
    pub async fn execute_command(&self, command: &Command) -> Result<ResultSet, SqlcmdPgError> {
        let bound = command.bind()?;
        self.query(&bound.text, &bound.values).await
    }

    /// Open a streaming query with default [`StreamOptions`].
    ///
    /// # Errors
    /// Returns `SqlcmdPgError::ConfigError` when no stream driver pool was
    /// attached via [`with_stream_pool`](Connection::with_stream_pool).
    pub fn query_stream(
        &self,
        sql: &str,
        values: Vec<RowValues>,
    ) -> Result<QueryStream, SqlcmdPgError> {
        self.query_stream_with(sql, values, StreamOptions::default())
    }

    /// Open a streaming query with explicit options.
    ///
    /// The cursor is returned immediately; the connection lease is granted
    /// asynchronously and the first poll drives the protocol from there.
    ///
    /// # Errors
    /// Returns `SqlcmdPgError::ConfigError` when no stream driver pool was
    /// attached.
    pub fn query_stream_with(
        &self,
        sql: &str,
        values: Vec<RowValues>,
        options: StreamOptions,
    ) -> Result<QueryStream, SqlcmdPgError> {
        let stream_pool = self.stream_pool.as_ref().ok_or_else(|| {
            SqlcmdPgError::ConfigError("no streaming driver pool configured".to_string())
        })?;
        info!(sql, values = ?values, "creating query stream");
        Ok(QueryStream::new(sql, values, options, stream_pool.acquire()))
    }
}

/// Async execution surface for code generic over the connection it runs on.
#[async_trait]
pub trait AsyncDatabaseExecutor {
    /// Executes a single SELECT statement and returns the buffered result set.
    async fn execute_select(
        &self,
        query: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, SqlcmdPgError>;

    /// Executes a single DML statement (INSERT, UPDATE, DELETE, etc.) and
    /// returns the number of rows affected.
    async fn execute_dml(&self, query: &str, params: &[RowValues]) -> Result<u64, SqlcmdPgError>;
}

#[async_trait]
impl AsyncDatabaseExecutor for Connection {
    async fn execute_select(
        &self,
        query: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, SqlcmdPgError> {
        self.query(query, params).await
    }

    async fn execute_dml(&self, query: &str, params: &[RowValues]) -> Result<u64, SqlcmdPgError> {
        self.execute(query, params).await
    }
}
