use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::debug;
use xtql::query::SqlQuery;
use xtql::tx::Sql;
use xtql::value::ValueKind;
use xtql::{Query, Row, TxOp, Value};

use super::statement::{BatchBody, SessionVar, parse_batch};
use crate::client::Xtdb;
use crate::errors::{Result, XtdbError};
use crate::opts::{QueryOptions, TxOptions};
use crate::transport::{HttpTransport, ReqwestTransport};

/// Description of a result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    /// Kind of the first value seen for this column.
    pub type_code: ValueKind,
    pub null_ok: bool,
}

/// Column order is the order names are first seen across all rows. Rows are
/// flattened to that order with absent fields as null.
pub(crate) fn tabulate(rows: Vec<Row>) -> (Vec<Column>, Vec<Vec<Value>>) {
    let mut first_seen: IndexMap<String, ValueKind> = IndexMap::new();
    for row in &rows {
        for (name, value) in row {
            if !first_seen.contains_key(name) {
                first_seen.insert(name.clone(), value.kind());
            }
        }
    }

    let flattened = rows
        .into_iter()
        .map(|mut row| {
            first_seen
                .keys()
                .map(|name| row.swap_remove(name).unwrap_or(Value::Null))
                .collect()
        })
        .collect();

    let columns = first_seen
        .into_iter()
        .map(|(name, type_code)| Column {
            name,
            type_code,
            null_ok: true,
        })
        .collect();

    (columns, flattened)
}

/// Executes batches against a shared client and buffers the last result.
///
/// Fetching removes rows from the buffer.
#[derive(Debug)]
pub struct Cursor<T: HttpTransport = ReqwestTransport> {
    client: Arc<Mutex<Xtdb<T>>>,
    closed: Arc<AtomicBool>,
    /// Rows returned by [`Cursor::fetchmany`] when no size is given.
    pub arraysize: usize,
    description: Option<Vec<Column>>,
    results: Option<VecDeque<Vec<Value>>>,
}

impl<T: HttpTransport> Cursor<T> {
    pub(crate) fn new(client: Arc<Mutex<Xtdb<T>>>, closed: Arc<AtomicBool>) -> Self {
        Cursor {
            client,
            closed,
            arraysize: 1,
            description: None,
            results: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn check_closed(&self) -> Result<()> {
        if self.is_closed() {
            return Err(XtdbError::Closed("Cursor"));
        }
        Ok(())
    }

    fn results_mut(&mut self) -> Result<&mut VecDeque<Vec<Value>>> {
        self.check_closed()?;
        self.results.as_mut().ok_or(XtdbError::NoResults)
    }

    pub fn close(&mut self) -> Result<()> {
        self.check_closed()?;
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    /// Columns of the last result. `None` before the first execute.
    pub fn description(&self) -> Option<&[Column]> {
        self.description.as_deref()
    }

    /// Rows still buffered.
    pub fn rowcount(&self) -> Result<usize> {
        self.check_closed()?;
        self.results
            .as_ref()
            .map(VecDeque::len)
            .ok_or(XtdbError::NoResults)
    }

    /// Execute a batch of statements.
    ///
    /// The whole batch is validated before any session variable is changed
    /// or any request is sent.
    pub fn execute(&mut self, sql: &str) -> Result<&mut Self> {
        self.check_closed()?;
        self.description = None;

        let batch = parse_batch(sql)?;
        let mut client = self.client.lock();

        for set in &batch.sets {
            match (set.var, set.value) {
                (SessionVar::Basis, Some(t)) => client.set_basis(t),
                (SessionVar::Basis, None) => client.clear_basis(),
                (SessionVar::ImportSystemTime, Some(t)) => client.set_import_system_time(t),
                (SessionVar::ImportSystemTime, None) => client.clear_import_system_time(),
            }
        }

        let rows = match batch.body {
            BatchBody::Empty => Vec::new(),
            BatchBody::Tx(statements) => {
                let ops = statements
                    .into_iter()
                    .map(|s| TxOp::from(Sql::new(s)))
                    .collect::<Vec<_>>();
                client.submit_tx(&ops, TxOptions::default())?;
                Vec::new()
            }
            BatchBody::Queries(statements) => {
                let mut last = Vec::new();
                for statement in statements {
                    let query = Query::from(SqlQuery::new(statement));
                    last = client.query(&query, QueryOptions::default())?;
                }
                last
            }
        };
        drop(client);

        let (columns, rows) = tabulate(rows);
        debug!(columns = columns.len(), rows = rows.len(), "execute complete");
        self.description = Some(columns);
        self.results = Some(rows.into());

        Ok(self)
    }

    pub fn executemany(&mut self, _sql: &str) -> Result<()> {
        self.check_closed()?;
        Err(XtdbError::NotSupported(
            "`executemany` is not supported, use `execute` instead",
        ))
    }

    /// Next row, or `None` once the buffer is drained.
    pub fn fetchone(&mut self) -> Result<Option<Vec<Value>>> {
        Ok(self.results_mut()?.pop_front())
    }

    /// Up to `size` rows. A missing or zero size means [`Cursor::arraysize`].
    pub fn fetchmany(&mut self, size: Option<usize>) -> Result<Vec<Vec<Value>>> {
        let size = size.filter(|&n| n > 0).unwrap_or(self.arraysize);
        let results = self.results_mut()?;
        let n = size.min(results.len());
        Ok(results.drain(..n).collect())
    }

    pub fn fetchall(&mut self) -> Result<Vec<Vec<Value>>> {
        Ok(self.results_mut()?.drain(..).collect())
    }

    /// Iterate the rows still buffered without fetching them.
    pub fn iter(&self) -> Result<impl Iterator<Item = &Vec<Value>>> {
        self.check_closed()?;
        let results = self.results.as_ref().ok_or(XtdbError::NoResults)?;
        Ok(results.iter())
    }
}
