use deadpool_postgres::{Config as PgConfig, Pool};
use tokio_postgres::NoTls;

use crate::error::SqlcmdPgError;

/// Name of the administrative database used for whole-database DDL.
///
/// Lifecycle helpers connect here with the same credentials as the target
/// database, because `CREATE DATABASE` / `DROP DATABASE` cannot run against
/// the database they operate on.
pub const ADMIN_DATABASE: &str = "postgres";

/// Validate that every field required to open a connection is present.
///
/// # Errors
/// Returns `SqlcmdPgError::ConfigError` naming the first missing field.
pub fn validate_config(pg_config: &PgConfig) -> Result<(), SqlcmdPgError> {
    if pg_config.dbname.is_none() {
        return Err(SqlcmdPgError::ConfigError("dbname is required".to_string()));
    }
    if pg_config.host.is_none() {
        return Err(SqlcmdPgError::ConfigError("host is required".to_string()));
    }
    if pg_config.port.is_none() {
        return Err(SqlcmdPgError::ConfigError("port is required".to_string()));
    }
    if pg_config.user.is_none() {
        return Err(SqlcmdPgError::ConfigError("user is required".to_string()));
    }
    if pg_config.password.is_none() {
        return Err(SqlcmdPgError::ConfigError(
            "password is required".to_string(),
        ));
    }
    Ok(())
}

/// Build a deadpool pool from a validated config.
///
/// # Errors
/// Returns `SqlcmdPgError::ConnectionError` if pool creation fails.
pub fn create_pool(pg_config: &PgConfig) -> Result<Pool, SqlcmdPgError> {
    pg_config
        .create_pool(Some(deadpool_postgres::Runtime::Tokio1), NoTls)
        .map_err(|e| SqlcmdPgError::ConnectionError(format!("Failed to create Postgres pool: {e}")))
}

/// The same options with the database name swapped for [`ADMIN_DATABASE`].
#[must_use]
pub fn admin_config(pg_config: &PgConfig) -> PgConfig {
    let mut admin = pg_config.clone();
    admin.dbname = Some(ADMIN_DATABASE.to_string());
    admin
}
