//! Transaction operations.
//!
//! Every operation serializes to a single JSON object keyed by its kind. Raw
//! SQL takes positional argument rows, the structured operations take named
//! argument rows; the two are separate types and never converted.
use chrono::{DateTime, FixedOffset};
use serde_json::{Map, Value as JsonValue, json};

use crate::binding::{Binding, bindings};
use crate::errors::Result;
use crate::expr::Expr;
use crate::json::{ToJson, format_timestamp};
use crate::query::{Query, UnifyClause};
use crate::temporal::TemporalFilter;
use crate::value::{Row, Value, map_to_json};

/// Positional arguments for one execution of a SQL statement.
pub type PositionalArgs = Vec<Value>;

/// Named arguments for one execution of a structured operation.
pub type NamedArgs = Row;

#[derive(Debug, Clone, PartialEq)]
pub enum TxOp {
    PutDocs(PutDocs),
    DeleteDocs(DeleteDocs),
    EraseDocs(EraseDocs),
    Sql(Sql),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
    Erase(Erase),
    Assert(Assert),
}

impl ToJson for TxOp {
    fn to_json(&self) -> Result<JsonValue> {
        match self {
            Self::PutDocs(op) => op.to_json(),
            Self::DeleteDocs(op) => op.to_json(),
            Self::EraseDocs(op) => op.to_json(),
            Self::Sql(op) => op.to_json(),
            Self::Insert(op) => op.to_json(),
            Self::Update(op) => op.to_json(),
            Self::Delete(op) => op.to_json(),
            Self::Erase(op) => op.to_json(),
            Self::Assert(op) => op.to_json(),
        }
    }
}

macro_rules! impl_into_tx_op {
    ($($op:ident),+) => {
        $(
            impl From<$op> for TxOp {
                fn from(op: $op) -> Self {
                    TxOp::$op(op)
                }
            }
        )+
    };
}

impl_into_tx_op!(PutDocs, DeleteDocs, EraseDocs, Sql, Insert, Update, Delete, Erase, Assert);

fn instant_json(t: Option<&DateTime<FixedOffset>>) -> JsonValue {
    t.map_or(JsonValue::Null, |t| JsonValue::String(format_timestamp(t)))
}

fn named_args_json(args: Option<&Vec<NamedArgs>>) -> Result<Option<JsonValue>> {
    args.map(|rows| {
        rows.iter()
            .map(|row| map_to_json(row).map(JsonValue::Object))
            .collect::<Result<Vec<_>>>()
            .map(JsonValue::Array)
    })
    .transpose()
}

fn with_args(mut obj: Map<String, JsonValue>, args: Option<&Vec<NamedArgs>>) -> Result<JsonValue> {
    if let Some(args) = named_args_json(args)? {
        obj.insert("args".to_string(), args);
    }
    Ok(JsonValue::Object(obj))
}

/// Valid time window shared by put and delete of documents.
#[derive(Debug, Clone, Default, PartialEq)]
struct ValidWindow {
    from: Option<DateTime<FixedOffset>>,
    to: Option<DateTime<FixedOffset>>,
}

macro_rules! valid_window_methods {
    () => {
        pub fn starting_from(mut self, from: impl Into<DateTime<FixedOffset>>) -> Self {
            self.window.from = Some(from.into());
            self
        }

        pub fn until(mut self, to: impl Into<DateTime<FixedOffset>>) -> Self {
            self.window.to = Some(to.into());
            self
        }

        pub fn during(
            mut self,
            from: impl Into<DateTime<FixedOffset>>,
            to: impl Into<DateTime<FixedOffset>>,
        ) -> Self {
            self.window.from = Some(from.into());
            self.window.to = Some(to.into());
            self
        }
    };
}

#[derive(Debug, Clone, PartialEq)]
pub struct PutDocs {
    table: String,
    docs: Vec<Row>,
    window: ValidWindow,
}

impl PutDocs {
    pub fn new(table: impl Into<String>, docs: impl IntoIterator<Item = Row>) -> Self {
        PutDocs {
            table: table.into(),
            docs: docs.into_iter().collect(),
            window: ValidWindow::default(),
        }
    }

    valid_window_methods!();
}

impl ToJson for PutDocs {
    fn to_json(&self) -> Result<JsonValue> {
        let docs = self
            .docs
            .iter()
            .map(|doc| map_to_json(doc).map(JsonValue::Object))
            .collect::<Result<Vec<_>>>()?;
        Ok(json!({
            "putDocs": docs,
            "into": self.table,
            "validFrom": instant_json(self.window.from.as_ref()),
            "validTo": instant_json(self.window.to.as_ref()),
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteDocs {
    table: String,
    ids: Vec<Value>,
    window: ValidWindow,
}

impl DeleteDocs {
    pub fn new<V: Into<Value>>(table: impl Into<String>, ids: impl IntoIterator<Item = V>) -> Self {
        DeleteDocs {
            table: table.into(),
            ids: ids.into_iter().map(Into::into).collect(),
            window: ValidWindow::default(),
        }
    }

    valid_window_methods!();
}

impl ToJson for DeleteDocs {
    fn to_json(&self) -> Result<JsonValue> {
        Ok(json!({
            "deleteDocs": self.ids.to_json()?,
            "from": self.table,
            "validFrom": instant_json(self.window.from.as_ref()),
            "validTo": instant_json(self.window.to.as_ref()),
        }))
    }
}

/// Removes every version of the given documents, across all of time.
#[derive(Debug, Clone, PartialEq)]
pub struct EraseDocs {
    table: String,
    ids: Vec<Value>,
}

impl EraseDocs {
    pub fn new<V: Into<Value>>(table: impl Into<String>, ids: impl IntoIterator<Item = V>) -> Self {
        EraseDocs {
            table: table.into(),
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }
}

impl ToJson for EraseDocs {
    fn to_json(&self) -> Result<JsonValue> {
        Ok(json!({"eraseDocs": self.ids.to_json()?, "from": self.table}))
    }
}

/// Raw SQL DML, optionally executed once per positional argument row.
#[derive(Debug, Clone, PartialEq)]
pub struct Sql {
    sql: String,
    arg_rows: Option<Vec<PositionalArgs>>,
}

impl Sql {
    pub fn new(sql: impl Into<String>) -> Self {
        Sql {
            sql: sql.into(),
            arg_rows: None,
        }
    }

    pub fn arg_rows(mut self, rows: impl IntoIterator<Item = PositionalArgs>) -> Self {
        self.arg_rows = Some(rows.into_iter().collect());
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

impl ToJson for Sql {
    fn to_json(&self) -> Result<JsonValue> {
        let mut obj = Map::new();
        obj.insert("sql".to_string(), JsonValue::String(self.sql.clone()));
        if let Some(rows) = &self.arg_rows {
            obj.insert("argRows".to_string(), rows.to_json()?);
        }
        Ok(JsonValue::Object(obj))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    table: String,
    query: Query,
    args: Option<Vec<NamedArgs>>,
}

impl Insert {
    pub fn new(table: impl Into<String>, query: impl Into<Query>) -> Self {
        Insert {
            table: table.into(),
            query: query.into(),
            args: None,
        }
    }

    pub fn args(mut self, args: impl IntoIterator<Item = NamedArgs>) -> Self {
        self.args = Some(args.into_iter().collect());
        self
    }
}

impl ToJson for Insert {
    fn to_json(&self) -> Result<JsonValue> {
        let mut obj = Map::new();
        obj.insert("insertInto".to_string(), JsonValue::String(self.table.clone()));
        obj.insert("query".to_string(), self.query.to_json()?);
        with_args(obj, self.args.as_ref())
    }
}

/// Builder state shared by the structured update and delete operations.
macro_rules! structured_methods {
    () => {
        pub fn starting_from(mut self, from: impl Into<Expr>) -> Self {
            self.valid_time = Some(TemporalFilter::starting(from));
            self
        }

        pub fn until(mut self, to: impl Into<Expr>) -> Self {
            self.valid_time = Some(TemporalFilter::until(to));
            self
        }

        pub fn during(mut self, from: impl Into<Expr>, to: impl Into<Expr>) -> Self {
            self.valid_time = Some(TemporalFilter::during(from, to));
            self
        }

        pub fn for_all_time(mut self) -> Self {
            self.valid_time = Some(TemporalFilter::AllTime);
            self
        }
    };
}

macro_rules! binding_methods {
    () => {
        pub fn binding<B: Into<Binding>>(mut self, bind: impl IntoIterator<Item = B>) -> Self {
            self.bind.extend(bind.into_iter().map(Into::into));
            self
        }

        pub fn unifying<C: Into<UnifyClause>>(mut self, clauses: impl IntoIterator<Item = C>) -> Self {
            self.unify.extend(clauses.into_iter().map(Into::into));
            self
        }

        pub fn args(mut self, args: impl IntoIterator<Item = NamedArgs>) -> Self {
            self.args = Some(args.into_iter().collect());
            self
        }
    };
}

#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    table: String,
    valid_time: Option<TemporalFilter>,
    bind: Vec<Binding>,
    set: Vec<Binding>,
    unify: Vec<UnifyClause>,
    args: Option<Vec<NamedArgs>>,
}

impl Update {
    pub fn new<B: Into<Binding>>(table: impl Into<String>, set: impl IntoIterator<Item = B>) -> Self {
        Update {
            table: table.into(),
            valid_time: None,
            bind: Vec::new(),
            set: bindings(set),
            unify: Vec::new(),
            args: None,
        }
    }

    pub fn setting<B: Into<Binding>>(mut self, set: impl IntoIterator<Item = B>) -> Self {
        self.set.extend(set.into_iter().map(Into::into));
        self
    }

    structured_methods!();
    binding_methods!();
}

impl ToJson for Update {
    fn to_json(&self) -> Result<JsonValue> {
        let mut obj = Map::new();
        obj.insert("update".to_string(), JsonValue::String(self.table.clone()));
        obj.insert(
            "forValidTime".to_string(),
            TemporalFilter::extents_json(self.valid_time.as_ref())?,
        );
        obj.insert("bind".to_string(), self.bind.to_json()?);
        obj.insert("set".to_string(), self.set.to_json()?);
        obj.insert("unify".to_string(), self.unify.to_json()?);
        with_args(obj, self.args.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    table: String,
    valid_time: Option<TemporalFilter>,
    bind: Vec<Binding>,
    unify: Vec<UnifyClause>,
    args: Option<Vec<NamedArgs>>,
}

impl Delete {
    pub fn new(table: impl Into<String>) -> Self {
        Delete {
            table: table.into(),
            valid_time: None,
            bind: Vec::new(),
            unify: Vec::new(),
            args: None,
        }
    }

    structured_methods!();
    binding_methods!();
}

impl ToJson for Delete {
    fn to_json(&self) -> Result<JsonValue> {
        let mut obj = Map::new();
        obj.insert("deleteFrom".to_string(), JsonValue::String(self.table.clone()));
        obj.insert(
            "forValidTime".to_string(),
            TemporalFilter::extents_json(self.valid_time.as_ref())?,
        );
        obj.insert("bind".to_string(), self.bind.to_json()?);
        obj.insert("unify".to_string(), self.unify.to_json()?);
        with_args(obj, self.args.as_ref())
    }
}

/// Structured erase. Like [`EraseDocs`] it has no temporal window.
#[derive(Debug, Clone, PartialEq)]
pub struct Erase {
    table: String,
    bind: Vec<Binding>,
    unify: Vec<UnifyClause>,
    args: Option<Vec<NamedArgs>>,
}

impl Erase {
    pub fn new(table: impl Into<String>) -> Self {
        Erase {
            table: table.into(),
            bind: Vec::new(),
            unify: Vec::new(),
            args: None,
        }
    }

    binding_methods!();
}

impl ToJson for Erase {
    fn to_json(&self) -> Result<JsonValue> {
        let mut obj = Map::new();
        obj.insert("erase".to_string(), JsonValue::String(self.table.clone()));
        obj.insert("bind".to_string(), self.bind.to_json()?);
        obj.insert("unify".to_string(), self.unify.to_json()?);
        with_args(obj, self.args.as_ref())
    }
}

/// Transaction precondition. The transaction aborts unless the query does
/// (or does not) return rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Assert {
    exists: bool,
    query: Query,
    args: Option<Vec<NamedArgs>>,
}

impl Assert {
    pub fn exists(query: impl Into<Query>) -> Self {
        Assert {
            exists: true,
            query: query.into(),
            args: None,
        }
    }

    pub fn not_exists(query: impl Into<Query>) -> Self {
        Assert {
            exists: false,
            query: query.into(),
            args: None,
        }
    }

    pub fn args(mut self, args: impl IntoIterator<Item = NamedArgs>) -> Self {
        self.args = Some(args.into_iter().collect());
        self
    }
}

impl ToJson for Assert {
    fn to_json(&self) -> Result<JsonValue> {
        let key = if self.exists {
            "assertExists"
        } else {
            "assertNotExists"
        };
        let mut obj = Map::new();
        obj.insert(key.to_string(), self.query.to_json()?);
        with_args(obj, self.args.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use indexmap::indexmap;
    use uuid::Uuid;

    use super::*;
    use crate::expr::{call, param, sym};
    use crate::query::{FromTable, Where};

    fn doc(id: i64, foo: &str) -> Row {
        indexmap! {
            "xt$id".to_string() => Value::from(id),
            "foo".to_string() => Value::from(foo),
        }
    }

    #[test]
    fn put_docs_with_window() {
        let from = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let op = TxOp::from(PutDocs::new("docs", [doc(1, "bar")]).starting_from(from));
        assert_eq!(
            json!({
                "putDocs": [{"xt$id": 1, "foo": "bar"}],
                "into": "docs",
                "validFrom": "2020-01-01T00:00:00Z",
                "validTo": null,
            }),
            op.to_json().unwrap()
        );
    }

    #[test]
    fn delete_and_erase_docs() {
        let id = Uuid::parse_str("97a392d5-5e3f-406f-9651-a828ee79b156").unwrap();
        let op = DeleteDocs::new("docs", [id]);
        assert_eq!(
            json!({
                "deleteDocs": [{"@type": "xt:uuid", "@value": "97a392d5-5e3f-406f-9651-a828ee79b156"}],
                "from": "docs",
                "validFrom": null,
                "validTo": null,
            }),
            op.to_json().unwrap()
        );

        let op = EraseDocs::new("docs", [1i64, 2]);
        assert_eq!(
            json!({"eraseDocs": [1, 2], "from": "docs"}),
            op.to_json().unwrap()
        );
    }

    #[test]
    fn sql_inline_and_with_args() {
        let op = Sql::new("INSERT INTO docs (xt$id) VALUES (1)");
        assert_eq!(
            json!({"sql": "INSERT INTO docs (xt$id) VALUES (1)"}),
            op.to_json().unwrap()
        );

        let op = Sql::new("INSERT INTO docs (xt$id, foo) VALUES (?, ?)")
            .arg_rows([vec![Value::from(1), Value::from("a")], vec![Value::from(2), Value::Null]]);
        assert_eq!(json!([[1, "a"], [2, null]]), op.to_json().unwrap()["argRows"]);
    }

    #[test]
    fn structured_update() {
        let op = Update::new("users", [("email", param("email"))])
            .binding([("xt$id", param("uid"))])
            .for_all_time()
            .args([indexmap! {
                "uid".to_string() => Value::from(3),
                "email".to_string() => Value::from("a@b.c"),
            }]);

        assert_eq!(
            json!({
                "update": "users",
                "forValidTime": "allTime",
                "bind": [{"xt$id": {"xt:param": "uid"}}],
                "set": [{"email": {"xt:param": "email"}}],
                "unify": [],
                "args": [{"uid": 3, "email": "a@b.c"}],
            }),
            op.to_json().unwrap()
        );
    }

    #[test]
    fn structured_delete_window() {
        let to = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let op = Delete::new("users").binding(["name"]).until(to);
        let json = op.to_json().unwrap();
        assert_eq!(json!("users"), json["deleteFrom"]);
        assert_eq!(
            json!({"from": null, "to": {"@type": "xt:timestamptz", "@value": "2021-01-01T00:00:00Z"}}),
            json["forValidTime"]
        );
        assert!(json.get("args").is_none());

        let op = Delete::new("users");
        assert_eq!(json!({}), op.to_json().unwrap()["forValidTime"]);
    }

    #[test]
    fn insert_and_assert() {
        let q = Query::pipeline(
            FromTable::new("staging").binding(["xt$id"]),
            [Where::new([call("=", [sym("xt$id"), Expr::Long(1)])]).into()],
        );
        let op = Insert::new("users", q.clone());
        let json = op.to_json().unwrap();
        assert_eq!(json!("users"), json["insertInto"]);
        assert!(json["query"].is_array());

        let op = Assert::not_exists(q);
        let json = op.to_json().unwrap();
        assert!(json.get("assertNotExists").is_some());
        assert!(json.get("assertExists").is_none());
    }

    #[test]
    fn erase_structured() {
        let op = Erase::new("users").unifying([FromTable::new("users").binding(["xt$id"])]);
        let json = op.to_json().unwrap();
        assert_eq!(json!("users"), json["erase"]);
        assert_eq!(1, json["unify"].as_array().unwrap().len());
    }
}
