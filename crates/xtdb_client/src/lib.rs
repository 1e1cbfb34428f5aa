//! Blocking HTTP client for XTDB.
//!
//! [`Xtdb`] submits transactions and runs queries built with [`xtql`],
//! tracking the latest submitted transaction and an optional basis pin.
//! [`dbapi`] layers textual SQL batches and cursors on top.
pub mod client;
pub mod config;
pub mod dbapi;
pub mod errors;
pub mod opts;
pub mod transport;

#[cfg(test)]
mod testutil;

pub use client::{TxKey, Xtdb};
pub use config::ClientConfig;
pub use errors::{Result, SqlParsingError, XtdbError};
pub use opts::{QueryOptions, TxOptions};
pub use transport::{HttpTransport, ReqwestTransport};
