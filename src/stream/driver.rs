use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tokio_util::bytes::Bytes;

use crate::error::SqlcmdPgError;
use crate::types::RowValues;

/// Wire format of a result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldFormat {
    Text,
    Binary,
}

/// Metadata for one result column, produced once per query by the row
/// description message and fixed for the remainder of the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub type_oid: u32,
    pub type_size: i16,
    pub format: FieldFormat,
}

/// Inbound protocol events delivered to the active streaming query.
#[derive(Debug)]
pub enum BackendEvent {
    /// Field metadata for the portal (`T`)
    RowDescription(Vec<FieldDescriptor>),
    /// One result row, fields in descriptor order, `None` for NULL (`D`)
    DataRow(Vec<Option<Bytes>>),
    /// The requested row count was produced but more rows remain (`s`)
    PortalSuspended,
    /// The statement finished; fewer rows than requested (`C`)
    CommandComplete(String),
    /// The connection is idle again (`Z`)
    ReadyForQuery,
    /// A protocol- or server-level error
    Error(SqlcmdPgError),
}

/// Outbound half of the extended-query protocol.
///
/// Implementations enqueue frontend messages; [`flush`](PortalDriver::flush)
/// transmits whatever has been enqueued. Inbound traffic arrives as
/// [`BackendEvent`]s on the channel packaged in the [`DriverLease`].
///
/// # Errors
/// Each operation fails if the message cannot be enqueued or transmitted;
/// the cursor treats any such failure as fatal to the query.
pub trait PortalDriver: Send {
    fn parse(&mut self, text: &str) -> Result<(), SqlcmdPgError>;
    fn bind(&mut self, portal: &str, values: &[RowValues]) -> Result<(), SqlcmdPgError>;
    fn describe_portal(&mut self, portal: &str) -> Result<(), SqlcmdPgError>;
    fn execute(&mut self, portal: &str, max_rows: u32) -> Result<(), SqlcmdPgError>;
    fn close_portal(&mut self, portal: &str) -> Result<(), SqlcmdPgError>;
    fn sync(&mut self) -> Result<(), SqlcmdPgError>;
    fn flush(&mut self) -> Result<(), SqlcmdPgError>;
}

/// Release hook invoked exactly once when a lease ends, optionally carrying
/// the error that terminated the query.
pub type ReleaseFn = Box<dyn for<'a> FnOnce(Option<&'a SqlcmdPgError>) + Send>;

/// Exclusive ownership of one protocol-capable pooled connection.
///
/// The release hook runs exactly once: explicitly when the cursor reaches a
/// terminal state, or on drop as a backstop.
pub struct DriverLease {
    driver: Box<dyn PortalDriver>,
    events: mpsc::UnboundedReceiver<BackendEvent>,
    release: Option<ReleaseFn>,
}

impl DriverLease {
    #[must_use]
    pub fn new(
        driver: Box<dyn PortalDriver>,
        events: mpsc::UnboundedReceiver<BackendEvent>,
        release: ReleaseFn,
    ) -> Self {
        Self {
            driver,
            events,
            release: Some(release),
        }
    }

    pub fn driver_mut(&mut self) -> &mut dyn PortalDriver {
        self.driver.as_mut()
    }

    pub(crate) fn events_mut(&mut self) -> &mut mpsc::UnboundedReceiver<BackendEvent> {
        &mut self.events
    }

    pub(crate) fn release(&mut self, error: Option<&SqlcmdPgError>) {
        if let Some(release) = self.release.take() {
            release(error);
        }
    }
}

impl Drop for DriverLease {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release(None);
        }
    }
}

impl std::fmt::Debug for DriverLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverLease")
            .field("released", &self.release.is_none())
            .finish()
    }
}

/// Future resolving to a granted connection lease.
pub type AcquireFuture = Pin<Box<dyn Future<Output = Result<DriverLease, SqlcmdPgError>> + Send>>;

/// Grants protocol-capable connection leases to streaming queries.
pub trait StreamPool: Send + Sync {
    fn acquire(&self) -> AcquireFuture;
}
