//! Whole-database lifecycle helpers.
//!
//! All helpers run against an administrative connection: the same options as
//! the target connection with the database name overridden to `postgres`,
//! because `CREATE DATABASE` / `DROP DATABASE` cannot operate on the
//! database currently connected to.
//!
//! The conditional variants compose an existence check with a DDL statement.
//! They are not transactional against concurrent external DDL: another
//! session can create or drop the database between the check and the
//! statement.

use tracing::info;

use crate::config;
use crate::connection::Connection;
use crate::error::SqlcmdPgError;
use crate::types::RowValues;

impl Connection {
    /// A connection to the administrative database with the same credentials.
    ///
    /// # Errors
    /// Returns config/pool errors from building the admin pool.
    pub fn admin_connection(&self) -> Result<Connection, SqlcmdPgError> {
        Connection::new(config::admin_config(self.options()))
    }

    fn target_database(&self) -> Result<String, SqlcmdPgError> {
        self.database()
            .map(str::to_string)
            .ok_or_else(|| SqlcmdPgError::ConfigError("dbname is required".to_string()))
    }

    /// Check whether the configured database exists.
    ///
    /// # Errors
    /// Returns pool/execution errors from the catalog lookup.
    pub async fn database_exists(&self) -> Result<bool, SqlcmdPgError> {
        let dbname = self.target_database()?;
        let admin = self.admin_connection()?;
        let result_set = admin
            .query(
                "SELECT 1 FROM pg_catalog.pg_database WHERE datname = $1",
                &[RowValues::Text(dbname)],
            )
            .await?;
        Ok(!result_set.results.is_empty())
    }

    /// Create the configured database.
    ///
    /// The database name cannot be a protocol parameter, so it is quoted and
    /// interpolated directly into the DDL text. The caller is responsible
    /// for sanitizing the configured name.
    ///
    /// # Errors
    /// Returns pool/execution errors, including `duplicate_database` when it
    /// already exists.
    pub async fn create_database(&self) -> Result<(), SqlcmdPgError> {
        let dbname = self.target_database()?;
        let admin = self.admin_connection()?;
        admin
            .execute_batch(&format!("CREATE DATABASE \"{dbname}\""))
            .await?;
        info!(database = %dbname, "database created");
        Ok(())
    }

    /// Create the configured database unless it already exists.
    ///
    /// Returns `true` if the database was created, `false` if it was already
    /// present and left intact.
    ///
    /// # Errors
    /// Returns errors from the existence check or the DDL statement.
    pub async fn create_database_if_not_exists(&self) -> Result<bool, SqlcmdPgError> {
        if self.database_exists().await? {
            return Ok(false);
        }
        self.create_database().await?;
        Ok(true)
    }

    /// Drop the configured database.
    ///
    /// Same identifier-interpolation caveat as
    /// [`create_database`](Connection::create_database).
    ///
    /// # Errors
    /// Returns pool/execution errors, including when the database is missing.
    pub async fn drop_database(&self) -> Result<(), SqlcmdPgError> {
        let dbname = self.target_database()?;
        let admin = self.admin_connection()?;
        admin
            .execute_batch(&format!("DROP DATABASE \"{dbname}\""))
            .await?;
        info!(database = %dbname, "database dropped");
        Ok(())
    }

    /// Drop the configured database if it exists.
    ///
    /// Returns `true` if the database was dropped, `false` if there was
    /// nothing to drop.
    ///
    /// # Errors
    /// Returns errors from the existence check or the DDL statement.
    pub async fn drop_database_if_exists(&self) -> Result<bool, SqlcmdPgError> {
        if !self.database_exists().await? {
            return Ok(false);
        }
        self.drop_database().await?;
        Ok(true)
    }
}
