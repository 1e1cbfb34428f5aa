//! DB-API style connections and cursors over textual SQL.
//!
//! ```no_run
//! let mut conn = xtdb_client::dbapi::connect("http://localhost:3000")?;
//! let mut cur = conn.execute("SET basis = '2024-01-01T00:00:00Z'; SELECT * FROM docs")?;
//! for row in cur.fetchall()? {
//!     println!("{row:?}");
//! }
//! # Ok::<(), xtdb_client::errors::XtdbError>(())
//! ```
mod connection;
mod cursor;
pub mod statement;

pub use connection::Connection;
pub use cursor::{Column, Cursor};

use crate::client::Xtdb;
use crate::config::ClientConfig;
use crate::errors::Result;
use crate::transport::ReqwestTransport;

pub fn connect(url: &str) -> Result<Connection<ReqwestTransport>> {
    Ok(Connection::new(Xtdb::new(url)?))
}

pub fn connect_with_config(config: &ClientConfig) -> Result<Connection<ReqwestTransport>> {
    Ok(Connection::new(Xtdb::from_config(config)?))
}
