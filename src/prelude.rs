//! Convenient imports for common functionality.

pub use crate::binding::{BoundStatement, Command, bind_named};
pub use crate::connection::{AsyncDatabaseExecutor, Connection};
pub use crate::error::SqlcmdPgError;
pub use crate::results::{CustomDbRow, ResultSet};
pub use crate::stream::{
    BackendEvent, DriverLease, FieldDescriptor, FieldFormat, PortalDriver, QueryStream,
    RowDecoder, StreamOptions, StreamPool, TextRowDecoder,
};
pub use crate::types::{QueryAndParams, RowValues};

pub use deadpool_postgres::Config as PgConfig;
