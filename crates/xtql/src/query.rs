//! Query stages, unify clauses and pipelines.
//!
//! A [`Query`] is a source stage followed by zero or more tail stages applied
//! left to right. With no tails it serializes to the source fragment alone,
//! otherwise to the array `[source, tail, ...]`.
use serde_json::{Value as JsonValue, json};

use crate::binding::{Binding, bindings};
use crate::errors::Result;
use crate::expr::Expr;
use crate::json::ToJson;
use crate::temporal::TemporalFilter;

/// Scan of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct FromTable {
    table: String,
    for_valid_time: Option<TemporalFilter>,
    for_system_time: Option<TemporalFilter>,
    project_all_cols: bool,
    bind: Vec<Binding>,
}

impl FromTable {
    pub fn new(table: impl Into<String>) -> Self {
        FromTable {
            table: table.into(),
            for_valid_time: None,
            for_system_time: None,
            project_all_cols: false,
            bind: Vec::new(),
        }
    }

    pub fn binding<B: Into<Binding>>(mut self, bind: impl IntoIterator<Item = B>) -> Self {
        self.bind.extend(bind.into_iter().map(Into::into));
        self
    }

    pub fn project_all_cols(mut self) -> Self {
        self.project_all_cols = true;
        self
    }

    /// Configure the valid time filter. Replaces any previous valid time
    /// filter.
    pub fn for_valid_time(self) -> TemporalFilterConfigurator {
        TemporalFilterConfigurator {
            outer: self,
            axis: TimeAxis::Valid,
        }
    }

    /// Configure the system time filter. Replaces any previous system time
    /// filter.
    pub fn for_system_time(self) -> TemporalFilterConfigurator {
        TemporalFilterConfigurator {
            outer: self,
            axis: TimeAxis::System,
        }
    }

    pub fn valid_time_filter(&self) -> Option<&TemporalFilter> {
        self.for_valid_time.as_ref()
    }

    pub fn system_time_filter(&self) -> Option<&TemporalFilter> {
        self.for_system_time.as_ref()
    }
}

impl ToJson for FromTable {
    fn to_json(&self) -> Result<JsonValue> {
        let filter = |f: &Option<TemporalFilter>| -> Result<JsonValue> {
            f.as_ref().map_or(Ok(JsonValue::Null), ToJson::to_json)
        };
        Ok(json!({
            "from": self.table,
            "forValidTime": filter(&self.for_valid_time)?,
            "forSystemTime": filter(&self.for_system_time)?,
            "projectAllCols": self.project_all_cols,
            "bind": self.bind.to_json()?,
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeAxis {
    Valid,
    System,
}

/// Sets a temporal filter on one axis of a [`FromTable`].
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalFilterConfigurator {
    outer: FromTable,
    axis: TimeAxis,
}

impl TemporalFilterConfigurator {
    fn set(mut self, filter: TemporalFilter) -> FromTable {
        match self.axis {
            TimeAxis::Valid => self.outer.for_valid_time = Some(filter),
            TimeAxis::System => self.outer.for_system_time = Some(filter),
        }
        self.outer
    }

    pub fn at(self, t: impl Into<Expr>) -> FromTable {
        self.set(TemporalFilter::at(t))
    }

    pub fn starting(self, from: impl Into<Expr>) -> FromTable {
        self.set(TemporalFilter::starting(from))
    }

    pub fn until(self, to: impl Into<Expr>) -> FromTable {
        self.set(TemporalFilter::until(to))
    }

    pub fn during(self, from: impl Into<Expr>, to: impl Into<Expr>) -> FromTable {
        self.set(TemporalFilter::during(from, to))
    }

    pub fn all_time(self) -> FromTable {
        self.set(TemporalFilter::AllTime)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Where {
    preds: Vec<Expr>,
}

impl Where {
    pub fn new(preds: impl IntoIterator<Item = Expr>) -> Self {
        Where {
            preds: preds.into_iter().collect(),
        }
    }
}

impl ToJson for Where {
    fn to_json(&self) -> Result<JsonValue> {
        Ok(json!({"where": self.preds.to_json()?}))
    }
}

macro_rules! join_stage {
    ($name:ident, $key:tt) => {
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name {
            query: Box<Query>,
            args: Vec<Binding>,
            bindings: Vec<Binding>,
        }

        impl $name {
            pub fn new<B: Into<Binding>>(
                query: impl Into<Query>,
                args: impl IntoIterator<Item = B>,
            ) -> Self {
                $name {
                    query: Box::new(query.into()),
                    args: bindings(args),
                    bindings: Vec::new(),
                }
            }

            pub fn binding<B: Into<Binding>>(mut self, bind: impl IntoIterator<Item = B>) -> Self {
                self.bindings.extend(bind.into_iter().map(Into::into));
                self
            }
        }

        impl ToJson for $name {
            fn to_json(&self) -> Result<JsonValue> {
                Ok(json!({
                    $key: self.query.to_json()?,
                    "args": self.args.to_json()?,
                    "bindings": self.bindings.to_json()?,
                }))
            }
        }
    };
}

join_stage!(Join, "join");
join_stage!(LeftJoin, "leftJoin");

macro_rules! bindings_stage {
    ($name:ident, $key:tt) => {
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name {
            bindings: Vec<Binding>,
        }

        impl $name {
            pub fn new<B: Into<Binding>>(bind: impl IntoIterator<Item = B>) -> Self {
                $name {
                    bindings: bindings(bind),
                }
            }
        }

        impl ToJson for $name {
            fn to_json(&self) -> Result<JsonValue> {
                Ok(json!({$key: self.bindings.to_json()?}))
            }
        }
    };
}

bindings_stage!(Aggregate, "aggregate");
bindings_stage!(With, "with");
bindings_stage!(Return, "return");

#[derive(Debug, Clone, PartialEq)]
pub struct Without {
    cols: Vec<String>,
}

impl Without {
    pub fn new<S: Into<String>>(cols: impl IntoIterator<Item = S>) -> Self {
        Without {
            cols: cols.into_iter().map(Into::into).collect(),
        }
    }
}

impl ToJson for Without {
    fn to_json(&self) -> Result<JsonValue> {
        Ok(json!({"without": self.cols}))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unnest {
    binding: Binding,
}

impl Unnest {
    pub fn new(binding: impl Into<String>, expr: Expr) -> Self {
        Unnest {
            binding: Binding::new(binding, expr),
        }
    }
}

impl ToJson for Unnest {
    fn to_json(&self) -> Result<JsonValue> {
        Ok(json!({"unnest": self.binding.to_json()?}))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderNulls {
    #[default]
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderSpec {
    val: Expr,
    direction: OrderDirection,
    nulls: OrderNulls,
}

impl OrderSpec {
    pub fn new(val: Expr) -> Self {
        OrderSpec {
            val,
            direction: OrderDirection::default(),
            nulls: OrderNulls::default(),
        }
    }

    pub fn asc(mut self) -> Self {
        self.direction = OrderDirection::Asc;
        self
    }

    pub fn desc(mut self) -> Self {
        self.direction = OrderDirection::Desc;
        self
    }

    pub fn nulls_first(mut self) -> Self {
        self.nulls = OrderNulls::First;
        self
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls = OrderNulls::Last;
        self
    }
}

impl ToJson for OrderSpec {
    fn to_json(&self) -> Result<JsonValue> {
        let dir = match self.direction {
            OrderDirection::Asc => "asc",
            OrderDirection::Desc => "desc",
        };
        let nulls = match self.nulls {
            OrderNulls::First => "first",
            OrderNulls::Last => "last",
        };
        Ok(json!({"val": self.val.to_json()?, "dir": dir, "nulls": nulls}))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    specs: Vec<OrderSpec>,
}

impl OrderBy {
    pub fn new(specs: impl IntoIterator<Item = OrderSpec>) -> Self {
        OrderBy {
            specs: specs.into_iter().collect(),
        }
    }
}

impl ToJson for OrderBy {
    fn to_json(&self) -> Result<JsonValue> {
        Ok(json!({"orderBy": self.specs.to_json()?}))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit(pub u64);

impl ToJson for Limit {
    fn to_json(&self) -> Result<JsonValue> {
        Ok(json!({"limit": self.0}))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offset(pub u64);

impl ToJson for Offset {
    fn to_json(&self) -> Result<JsonValue> {
        Ok(json!({"offset": self.0}))
    }
}

/// Raw SQL used as a query source.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    sql: String,
}

impl SqlQuery {
    pub fn new(sql: impl Into<String>) -> Self {
        SqlQuery { sql: sql.into() }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

impl ToJson for SqlQuery {
    fn to_json(&self) -> Result<JsonValue> {
        Ok(json!({"sql": self.sql}))
    }
}

/// Clauses joined into a single block rather than applied in sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Unify {
    clauses: Vec<UnifyClause>,
}

impl Unify {
    pub fn new<C: Into<UnifyClause>>(clauses: impl IntoIterator<Item = C>) -> Self {
        Unify {
            clauses: clauses.into_iter().map(Into::into).collect(),
        }
    }
}

impl ToJson for Unify {
    fn to_json(&self) -> Result<JsonValue> {
        Ok(json!({"unify": self.clauses.to_json()?}))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnifyClause {
    From(FromTable),
    Where(Where),
    Join(Join),
    LeftJoin(LeftJoin),
    With(With),
    Unnest(Unnest),
}

impl ToJson for UnifyClause {
    fn to_json(&self) -> Result<JsonValue> {
        match self {
            Self::From(c) => c.to_json(),
            Self::Where(c) => c.to_json(),
            Self::Join(c) => c.to_json(),
            Self::LeftJoin(c) => c.to_json(),
            Self::With(c) => c.to_json(),
            Self::Unnest(c) => c.to_json(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryTail {
    Where(Where),
    Join(Join),
    LeftJoin(LeftJoin),
    Aggregate(Aggregate),
    With(With),
    Return(Return),
    Without(Without),
    Unnest(Unnest),
    OrderBy(OrderBy),
    Limit(Limit),
    Offset(Offset),
}

impl ToJson for QueryTail {
    fn to_json(&self) -> Result<JsonValue> {
        match self {
            Self::Where(t) => t.to_json(),
            Self::Join(t) => t.to_json(),
            Self::LeftJoin(t) => t.to_json(),
            Self::Aggregate(t) => t.to_json(),
            Self::With(t) => t.to_json(),
            Self::Return(t) => t.to_json(),
            Self::Without(t) => t.to_json(),
            Self::Unnest(t) => t.to_json(),
            Self::OrderBy(t) => t.to_json(),
            Self::Limit(t) => t.to_json(),
            Self::Offset(t) => t.to_json(),
        }
    }
}

/// The stage a pipeline starts from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    From(FromTable),
    Unify(Unify),
    Sql(SqlQuery),
}

impl ToJson for Source {
    fn to_json(&self) -> Result<JsonValue> {
        match self {
            Self::From(s) => s.to_json(),
            Self::Unify(s) => s.to_json(),
            Self::Sql(s) => s.to_json(),
        }
    }
}

macro_rules! impl_from_stage {
    ($stage:ident => $($target:ident :: $variant:ident),+) => {
        $(
            impl From<$stage> for $target {
                fn from(stage: $stage) -> Self {
                    $target::$variant(stage)
                }
            }
        )+
    };
}

impl_from_stage!(FromTable => UnifyClause::From, Source::From);
impl_from_stage!(Where => UnifyClause::Where, QueryTail::Where);
impl_from_stage!(Join => UnifyClause::Join, QueryTail::Join);
impl_from_stage!(LeftJoin => UnifyClause::LeftJoin, QueryTail::LeftJoin);
impl_from_stage!(With => UnifyClause::With, QueryTail::With);
impl_from_stage!(Unnest => UnifyClause::Unnest, QueryTail::Unnest);
impl_from_stage!(Aggregate => QueryTail::Aggregate);
impl_from_stage!(Return => QueryTail::Return);
impl_from_stage!(Without => QueryTail::Without);
impl_from_stage!(OrderBy => QueryTail::OrderBy);
impl_from_stage!(Limit => QueryTail::Limit);
impl_from_stage!(Offset => QueryTail::Offset);
impl_from_stage!(Unify => Source::Unify);
impl_from_stage!(SqlQuery => Source::Sql);

/// A source stage and its ordered tail stages.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    source: Source,
    tails: Vec<QueryTail>,
}

impl Query {
    pub fn new(source: impl Into<Source>) -> Self {
        Query {
            source: source.into(),
            tails: Vec::new(),
        }
    }

    pub fn pipeline(
        source: impl Into<Source>,
        tails: impl IntoIterator<Item = QueryTail>,
    ) -> Self {
        Query {
            source: source.into(),
            tails: tails.into_iter().collect(),
        }
    }

    /// Append a tail stage.
    pub fn then(mut self, tail: impl Into<QueryTail>) -> Self {
        self.tails.push(tail.into());
        self
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn tails(&self) -> &[QueryTail] {
        &self.tails
    }
}

impl ToJson for Query {
    fn to_json(&self) -> Result<JsonValue> {
        if self.tails.is_empty() {
            return self.source.to_json();
        }
        let mut stages = Vec::with_capacity(self.tails.len() + 1);
        stages.push(self.source.to_json()?);
        for tail in &self.tails {
            stages.push(tail.to_json()?);
        }
        Ok(JsonValue::Array(stages))
    }
}

impl From<Source> for Query {
    fn from(source: Source) -> Self {
        Query::new(source)
    }
}

impl From<FromTable> for Query {
    fn from(stage: FromTable) -> Self {
        Query::new(stage)
    }
}

impl From<Unify> for Query {
    fn from(stage: Unify) -> Self {
        Query::new(stage)
    }
}

impl From<SqlQuery> for Query {
    fn from(stage: SqlQuery) -> Self {
        Query::new(stage)
    }
}

impl<S: Into<Source>> From<(S, Vec<QueryTail>)> for Query {
    fn from((source, tails): (S, Vec<QueryTail>)) -> Self {
        Query::pipeline(source, tails)
    }
}
