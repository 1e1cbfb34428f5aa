//! Query and transaction model for XTDB, with the JSON-LD wire codec.
//!
//! Nothing in this crate performs I/O. Model objects are built fluently and
//! turned into wire JSON with [`ToJson`]; responses are decoded with
//! [`json::decode`].
pub mod binding;
pub mod errors;
pub mod expr;
pub mod json;
pub mod query;
pub mod temporal;
pub mod tx;
pub mod value;

pub use binding::Binding;
pub use errors::{DecodeError, EncodeError};
pub use expr::Expr;
pub use json::{ErrorMode, ToJson};
pub use query::{Query, QueryTail, Source, UnifyClause};
pub use temporal::TemporalFilter;
pub use tx::TxOp;
pub use value::{Row, Value};
