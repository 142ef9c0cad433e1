use std::collections::BTreeMap;

use thiserror::Error;

use crate::types::RowValues;

#[derive(Debug, Error)]
pub enum SqlcmdPgError {
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[error(transparent)]
    PoolError(#[from] deadpool::managed::PoolError<tokio_postgres::Error>),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error(
        "Cannot bind command with incomplete parameters: \"{name}\" is missing. sql = \"{sql}\" parameters = {parameters:?}"
    )]
    MissingParameter {
        name: String,
        sql: String,
        parameters: BTreeMap<String, RowValues>,
    },

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Row decode error: {0}")]
    DecodeError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Other database error: {0}")]
    Other(String),
}
