//! Streaming query cursor.
//!
//! [`QueryStream`] owns the extended-query lifecycle over a single leased
//! connection: parse, bind, and describe on grant, then one execute round per
//! drained buffer, each requesting at most the high-water mark of rows. The
//! server-side portal never advances past outstanding consumer demand.
//!
//! The cursor is pull-based: it implements
//! [`Stream`](futures_util::Stream) and does protocol work only inside
//! `poll_next`. Polling before a connection is bound registers the pending
//! pull and returns without blocking. On completion, error, or early
//! [`close`](QueryStream::close), a sync is issued so the connection goes
//! back to the pool idle, and the lease is released exactly once.
//!
//! No timeout is enforced here; a silent server parks the cursor in its
//! current state. Timeout policy belongs to the caller.

mod decode;
mod driver;

pub use decode::{RowDecoder, TextRowDecoder};
pub use driver::{
    AcquireFuture, BackendEvent, DriverLease, FieldDescriptor, FieldFormat, PortalDriver,
    ReleaseFn, StreamPool,
};

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use tracing::debug;

use crate::error::SqlcmdPgError;
use crate::results::{CustomDbRow, build_column_cache};
use crate::types::RowValues;

/// Options for a streaming query.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Rows requested per execute round; also bounds the rows buffered ahead
    /// of the consumer. Defaults to 16384.
    pub high_water_mark: usize,
    /// Server-side portal name; empty selects the unnamed portal.
    pub portal: String,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            high_water_mark: 16384,
            portal: String::new(),
        }
    }
}

impl StreamOptions {
    #[must_use]
    pub fn with_high_water_mark(mut self, high_water_mark: usize) -> Self {
        self.high_water_mark = high_water_mark;
        self
    }

    #[must_use]
    pub fn with_portal(mut self, portal: impl Into<String>) -> Self {
        self.portal = portal.into();
        self
    }
}

enum CursorState {
    /// Waiting for the pool to grant a connection lease.
    Unbound { acquire: AcquireFuture },
    /// Statement submitted; protocol in flight on the leased connection.
    Bound { lease: DriverLease },
    /// Lease released; only buffered rows and the terminal signal remain.
    Terminal,
}

/// Field metadata shared by every row of the query, fixed on receipt of the
/// row description.
struct RowShape {
    fields: Arc<Vec<FieldDescriptor>>,
    column_names: Arc<Vec<String>>,
    column_cache: Arc<HashMap<String, usize>>,
}

/// Cursor bookkeeping, split from [`CursorState`] so event handlers can
/// borrow the lease and the bookkeeping disjointly.
struct CursorCore {
    text: String,
    values: Vec<RowValues>,
    options: StreamOptions,
    decoder: Box<dyn RowDecoder>,
    shape: Option<RowShape>,
    buffer: VecDeque<CustomDbRow>,
    execute_in_flight: bool,
    /// Sync has been sent; no further execute rounds.
    winding_down: bool,
    /// Consumer requested an early close.
    closing: bool,
    error: Option<SqlcmdPgError>,
}

impl CursorCore {
    /// Issue parse, bind, describe, flush, in that order, on a freshly
    /// granted connection.
    fn submit(&mut self, lease: &mut DriverLease) -> Result<(), SqlcmdPgError> {
        let driver = lease.driver_mut();
        driver.parse(&self.text)?;
        driver.bind(&self.options.portal, &self.values)?;
        driver.describe_portal(&self.options.portal)?;
        driver.flush()?;
        Ok(())
    }

    /// Start an execute round if demand allows: nothing in flight, nothing
    /// buffered, and the query still running.
    fn maybe_execute(&mut self, lease: &mut DriverLease) -> Result<(), SqlcmdPgError> {
        if self.execute_in_flight || self.winding_down || self.closing {
            return Ok(());
        }
        if !self.buffer.is_empty() {
            return Ok(());
        }
        let max_rows = u32::try_from(self.options.high_water_mark)
            .unwrap_or(u32::MAX)
            .max(1);
        let driver = lease.driver_mut();
        driver.execute(&self.options.portal, max_rows)?;
        driver.flush()?;
        self.execute_in_flight = true;
        Ok(())
    }

    /// Conclude the extended-query round so the connection returns to the
    /// pool idle.
    fn begin_wind_down(&mut self, lease: &mut DriverLease) -> Result<(), SqlcmdPgError> {
        if self.winding_down {
            return Ok(());
        }
        self.winding_down = true;
        let driver = lease.driver_mut();
        driver.sync()?;
        driver.flush()?;
        Ok(())
    }

    /// Apply one backend event. Returns `true` once ReadyForQuery ends the
    /// protocol round.
    fn handle_event(
        &mut self,
        lease: &mut DriverLease,
        event: BackendEvent,
    ) -> Result<bool, SqlcmdPgError> {
        match event {
            BackendEvent::RowDescription(fields) => {
                let names: Vec<String> = fields.iter().map(|f| f.name.clone()).collect();
                self.shape = Some(RowShape {
                    fields: Arc::new(fields),
                    column_cache: build_column_cache(&names),
                    column_names: Arc::new(names),
                });
                Ok(false)
            }
            BackendEvent::DataRow(raw) => {
                if self.error.is_some() || self.closing {
                    // Rows still in flight after a failure or close are discarded.
                    return Ok(false);
                }
                let Some(shape) = self.shape.as_ref() else {
                    self.error = Some(SqlcmdPgError::ProtocolError(
                        "data row received before row description".to_string(),
                    ));
                    self.begin_wind_down(lease)?;
                    return Ok(false);
                };
                match self.decoder.decode_row(&shape.fields, &raw) {
                    Ok(values) => {
                        let row = CustomDbRow::with_cache(
                            shape.column_names.clone(),
                            shape.column_cache.clone(),
                            values,
                        );
                        self.buffer.push_back(row);
                    }
                    Err(err) => {
                        self.error = Some(err);
                        self.begin_wind_down(lease)?;
                    }
                }
                Ok(false)
            }
            BackendEvent::PortalSuspended => {
                // The round produced everything requested; buffered rows
                // drain before the next execute.
                self.execute_in_flight = false;
                Ok(false)
            }
            BackendEvent::CommandComplete(tag) => {
                debug!(tag, "statement complete");
                self.execute_in_flight = false;
                self.begin_wind_down(lease)?;
                Ok(false)
            }
            BackendEvent::ReadyForQuery => Ok(true),
            BackendEvent::Error(err) => {
                if self.error.is_none() {
                    self.error = Some(err);
                }
                self.execute_in_flight = false;
                self.begin_wind_down(lease)?;
                Ok(false)
            }
        }
    }
}

/// A streaming query result: rows pulled incrementally from a server-side
/// portal.
///
/// Construct through [`Connection::query_stream`](crate::Connection::query_stream)
/// or directly with [`QueryStream::new`] and any lease-granting future.
///
/// Dropping a still-bound stream without calling
/// [`close`](QueryStream::close) skips the protocol wind-down; the lease's
/// release hook still runs, and the pool implementation decides whether the
/// connection is reusable.
pub struct QueryStream {
    core: CursorCore,
    state: CursorState,
}

impl std::fmt::Debug for QueryStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryStream").finish_non_exhaustive()
    }
}

impl QueryStream {
    pub fn new(
        text: impl Into<String>,
        values: Vec<RowValues>,
        options: StreamOptions,
        acquire: impl Future<Output = Result<DriverLease, SqlcmdPgError>> + Send + 'static,
    ) -> Self {
        Self {
            core: CursorCore {
                text: text.into(),
                values,
                options,
                decoder: Box::new(TextRowDecoder),
                shape: None,
                buffer: VecDeque::new(),
                execute_in_flight: false,
                winding_down: false,
                closing: false,
                error: None,
            },
            state: CursorState::Unbound {
                acquire: Box::pin(acquire),
            },
        }
    }

    /// Replace the default text-format decoder.
    #[must_use]
    pub fn with_decoder(mut self, decoder: Box<dyn RowDecoder>) -> Self {
        self.core.decoder = decoder;
        self
    }

    /// Field descriptors for this query, available once the row description
    /// has arrived; always before the first row.
    #[must_use]
    pub fn fields(&self) -> Option<&Arc<Vec<FieldDescriptor>>> {
        self.core.shape.as_ref().map(|shape| &shape.fields)
    }

    /// Close the cursor early: close the portal, sync, and wind down through
    /// the normal terminal path. Rows already buffered are still delivered.
    ///
    /// Closing an unbound cursor abandons the pending acquisition; closing a
    /// finished cursor is a no-op.
    pub fn close(&mut self) {
        match &mut self.state {
            CursorState::Unbound { .. } => {
                debug!("query stream closed before a connection was bound");
                self.state = CursorState::Terminal;
            }
            CursorState::Bound { lease } => {
                if self.core.closing || self.core.winding_down {
                    return;
                }
                self.core.closing = true;
                self.core.winding_down = true;
                debug!("closing query stream portal");
                let result =
                    send_portal_close(lease.driver_mut(), &self.core.options.portal);
                if let Err(err) = result {
                    lease.release(Some(&err));
                    self.core.error = Some(err);
                    self.state = CursorState::Terminal;
                }
            }
            CursorState::Terminal => {}
        }
    }
}

fn send_portal_close(
    driver: &mut dyn PortalDriver,
    portal: &str,
) -> Result<(), SqlcmdPgError> {
    driver.close_portal(portal)?;
    driver.sync()?;
    driver.flush()
}

impl Stream for QueryStream {
    type Item = Result<CustomDbRow, SqlcmdPgError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match &mut this.state {
                CursorState::Terminal => {
                    // A recorded error preempts anything left in the buffer:
                    // it is yielded once, then the stream ends.
                    if let Some(err) = this.core.error.take() {
                        this.core.buffer.clear();
                        return Poll::Ready(Some(Err(err)));
                    }
                    if let Some(row) = this.core.buffer.pop_front() {
                        return Poll::Ready(Some(Ok(row)));
                    }
                    return Poll::Ready(None);
                }
                CursorState::Unbound { acquire } => match acquire.as_mut().poll(cx) {
                    // The pending pull is recorded through the waker; the
                    // caller is never blocked.
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Err(err)) => {
                        this.core.error = Some(err);
                        this.state = CursorState::Terminal;
                    }
                    Poll::Ready(Ok(mut lease)) => {
                        debug!("connection lease granted; submitting statement");
                        match this.core.submit(&mut lease) {
                            Ok(()) => this.state = CursorState::Bound { lease },
                            Err(err) => {
                                lease.release(Some(&err));
                                this.core.error = Some(err);
                                this.state = CursorState::Terminal;
                            }
                        }
                    }
                },
                CursorState::Bound { lease } => {
                    if this.core.error.is_none()
                        && let Some(row) = this.core.buffer.pop_front()
                    {
                        return Poll::Ready(Some(Ok(row)));
                    }
                    if let Err(err) = this.core.maybe_execute(lease) {
                        lease.release(Some(&err));
                        this.core.error = Some(err);
                        this.state = CursorState::Terminal;
                        continue;
                    }
                    match lease.events_mut().poll_recv(cx) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(None) => {
                            let err = SqlcmdPgError::ConnectionError(
                                "connection closed during streaming query".to_string(),
                            );
                            lease.release(Some(&err));
                            if this.core.error.is_none() {
                                this.core.error = Some(err);
                            }
                            this.state = CursorState::Terminal;
                        }
                        Poll::Ready(Some(event)) => match this.core.handle_event(lease, event) {
                            Ok(false) => {}
                            Ok(true) => {
                                debug!("query stream finished; releasing connection");
                                lease.release(this.core.error.as_ref());
                                this.state = CursorState::Terminal;
                            }
                            Err(err) => {
                                lease.release(Some(&err));
                                this.core.error = Some(err);
                                this.state = CursorState::Terminal;
                            }
                        },
                    }
                }
            }
        }
    }
}
