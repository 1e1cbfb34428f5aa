use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use super::cursor::Cursor;
use crate::client::Xtdb;
use crate::errors::{Result, XtdbError};
use crate::transport::{HttpTransport, ReqwestTransport};

/// Owns a client and hands out cursors sharing its session.
///
/// Commits happen on the server when each batch is submitted, so `commit`
/// does nothing.
#[derive(Debug)]
pub struct Connection<T: HttpTransport = ReqwestTransport> {
    client: Arc<Mutex<Xtdb<T>>>,
    closed: bool,
    /// Closed flags of live cursors.
    cursors: Vec<Weak<AtomicBool>>,
}

impl<T: HttpTransport> Connection<T> {
    pub fn new(client: Xtdb<T>) -> Self {
        Connection {
            client: Arc::new(Mutex::new(client)),
            closed: false,
            cursors: Vec::new(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn check_closed(&self) -> Result<()> {
        if self.closed {
            return Err(XtdbError::Closed("Connection"));
        }
        Ok(())
    }

    /// Close the connection and every cursor it created.
    pub fn close(&mut self) -> Result<()> {
        self.check_closed()?;
        self.closed = true;
        for cursor in self.cursors.drain(..) {
            // Already closed cursors are fine.
            if let Some(closed) = cursor.upgrade() {
                closed.store(true, Ordering::Release);
            }
        }
        debug!("connection closed");
        Ok(())
    }

    pub fn commit(&self) -> Result<()> {
        self.check_closed()
    }

    pub fn cursor(&mut self) -> Result<Cursor<T>> {
        self.check_closed()?;
        self.cursors
            .retain(|c| c.upgrade().is_some_and(|closed| !closed.load(Ordering::Acquire)));
        let closed = Arc::new(AtomicBool::new(false));
        self.cursors.push(Arc::downgrade(&closed));
        Ok(Cursor::new(self.client.clone(), closed))
    }

    /// Create a cursor and execute `sql` on it.
    pub fn execute(&mut self, sql: &str) -> Result<Cursor<T>> {
        let mut cursor = self.cursor()?;
        cursor.execute(sql)?;
        Ok(cursor)
    }

    /// Run `f` with exclusive access to the underlying client.
    pub fn with_client<R>(&self, f: impl FnOnce(&mut Xtdb<T>) -> R) -> R {
        f(&mut *self.client.lock())
    }
}
