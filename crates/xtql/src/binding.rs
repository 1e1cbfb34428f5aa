//! Name to expression associations.
use serde_json::Value as JsonValue;

use crate::errors::Result;
use crate::expr::{Expr, sym};
use crate::json::ToJson;

/// Binds `binding` to `expr`.
///
/// A bare name converts into a binding of the variable to itself, so
/// `Binding::from("a")` is shorthand for `{"a": {"xt:lvar": "a"}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub binding: String,
    pub expr: Expr,
}

impl Binding {
    pub fn new(binding: impl Into<String>, expr: Expr) -> Self {
        Binding {
            binding: binding.into(),
            expr,
        }
    }
}

impl From<&str> for Binding {
    fn from(name: &str) -> Self {
        Binding::new(name, sym(name))
    }
}

impl From<String> for Binding {
    fn from(name: String) -> Self {
        let expr = sym(name.clone());
        Binding::new(name, expr)
    }
}

impl<S: Into<String>> From<(S, Expr)> for Binding {
    fn from((binding, expr): (S, Expr)) -> Self {
        Binding::new(binding, expr)
    }
}

/// Collect anything binding-like into a list of bindings.
pub fn bindings<B: Into<Binding>>(bindings: impl IntoIterator<Item = B>) -> Vec<Binding> {
    bindings.into_iter().map(Into::into).collect()
}

impl ToJson for Binding {
    fn to_json(&self) -> Result<JsonValue> {
        let mut out = serde_json::Map::with_capacity(1);
        out.insert(self.binding.clone(), self.expr.to_json()?);
        Ok(JsonValue::Object(out))
    }
}
