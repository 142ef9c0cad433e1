//! Test utilities for running against an embedded PostgreSQL server.
//!
//! Gated behind the `test-utils-postgres` feature; used by the end-to-end
//! integration tests and usable by downstream crates for the same purpose.

use postgresql_embedded::{PostgreSQL, Settings};

use crate::error::SqlcmdPgError;

/// A running embedded PostgreSQL server.
pub struct EmbeddedPostgres {
    server: PostgreSQL,
}

impl EmbeddedPostgres {
    /// Connection options for `dbname` on this server. The database itself
    /// is only created by [`setup_postgres_embedded`] for its argument;
    /// other names are usable with the lifecycle helpers.
    #[must_use]
    pub fn config_for(&self, dbname: &str) -> deadpool_postgres::Config {
        let settings = self.server.settings();
        let mut cfg = deadpool_postgres::Config::new();
        cfg.host = Some(settings.host.clone());
        cfg.port = Some(settings.port);
        cfg.user = Some(settings.username.clone());
        cfg.password = Some(settings.password.clone());
        cfg.dbname = Some(dbname.to_string());
        cfg
    }
}

/// Start a temporary embedded server and create `dbname` on it.
///
/// # Errors
/// Returns `SqlcmdPgError::ConnectionError` if the server cannot be
/// downloaded, started, or the database cannot be created.
pub async fn setup_postgres_embedded(
    dbname: &str,
) -> Result<(EmbeddedPostgres, deadpool_postgres::Config), SqlcmdPgError> {
    let mut settings = Settings::default();
    settings.temporary = true;
    let mut server = PostgreSQL::new(settings);
    server.setup().await.map_err(embed_err)?;
    server.start().await.map_err(embed_err)?;
    server.create_database(dbname).await.map_err(embed_err)?;

    let embedded = EmbeddedPostgres { server };
    let cfg = embedded.config_for(dbname);
    Ok((embedded, cfg))
}

/// Stop the embedded server, discarding its data directory.
pub async fn stop_postgres_embedded(embedded: EmbeddedPostgres) {
    let mut server = embedded.server;
    let _ = server.stop().await;
}

fn embed_err(e: postgresql_embedded::Error) -> SqlcmdPgError {
    SqlcmdPgError::ConnectionError(format!("embedded postgres: {e}"))
}
