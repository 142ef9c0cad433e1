//! PostgreSQL connection layer for sqlcmd-style command builders.
//!
//! The crate covers the connection-handling half of a SQL toolkit: a
//! command builder produces SQL text with named `$name` placeholders, and
//! this crate binds, executes, and streams it against PostgreSQL.
//!
//! - [`binding`] rewrites named placeholders into the positional `$1..$n`
//!   markers the wire protocol expects.
//! - [`Connection`] runs one-shot queries and DML over a deadpool-managed
//!   connection pool, buffering results eagerly.
//! - [`stream::QueryStream`] drives the extended-query protocol
//!   (parse/bind/describe/execute/sync) over a leased connection and yields
//!   rows as a backpressure-aware stream.
//! - Database lifecycle helpers create, drop, and probe whole databases via
//!   an administrative connection.
//!
//! ```no_run
//! use sqlcmd_pg::{Command, Connection, PgConfig};
//!
//! # async fn demo() -> Result<(), sqlcmd_pg::SqlcmdPgError> {
//! let mut cfg = PgConfig::new();
//! cfg.dbname = Some("app".to_string());
//! cfg.host = Some("localhost".to_string());
//! cfg.port = Some(5432);
//! cfg.user = Some("app".to_string());
//! cfg.password = Some("secret".to_string());
//!
//! let db = Connection::new(cfg)?;
//! let command = Command::new("SELECT age FROM person WHERE name = $name")
//!     .param("name", "Brown");
//! let result = db.execute_command(&command).await?;
//! # let _ = result;
//! # Ok(())
//! # }
//! ```

mod admin;
pub mod binding;
pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod params;
pub mod prelude;
pub mod results;
pub mod stream;
#[cfg(feature = "test-utils-postgres")]
pub mod test_utils;
pub mod types;

pub use binding::{BoundStatement, Command, bind_named};
pub use config::ADMIN_DATABASE;
pub use connection::{AsyncDatabaseExecutor, Connection};
pub use error::SqlcmdPgError;
pub use results::{CustomDbRow, ResultSet};
pub use stream::{QueryStream, StreamOptions};
pub use types::{QueryAndParams, RowValues};

pub use deadpool_postgres::Config as PgConfig;
