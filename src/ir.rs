//! The intermediate representation (spec §3). A tree of value types with
//! strict tree ownership — no back-pointers, no cycles, no mutation after
//! parse completion. Consumed exactly once by the lowering engine.

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    pub name: String,
    pub qualifier: Option<String>,
}

impl Identifier {
    pub fn unqualified(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            qualifier: None,
        }
    }

    pub fn qualified(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            qualifier: Some(qualifier.into()),
        }
    }

    /// Dotted display form, e.g. `o.customerNumber` or `customerNumber`.
    pub fn display(&self) -> String {
        match &self.qualifier {
            Some(q) => format!("{q}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntervalUnit {
    Year,
    Quarter,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
    Microsecond,
}

impl IntervalUnit {
    pub fn from_sql(word: &str) -> Option<Self> {
        Some(match word.to_ascii_uppercase().as_str() {
            "YEAR" => Self::Year,
            "QUARTER" => Self::Quarter,
            "MONTH" => Self::Month,
            "WEEK" => Self::Week,
            "DAY" => Self::Day,
            "HOUR" => Self::Hour,
            "MINUTE" => Self::Minute,
            "SECOND" => Self::Second,
            "MICROSECOND" => Self::Microsecond,
            _ => return None,
        })
    }

    /// The MongoDB `$dateAdd`/`$dateSubtract`/`$dateDiff` unit string.
    pub fn mongo_unit(self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Quarter => "quarter",
            Self::Month => "month",
            Self::Week => "week",
            Self::Day => "day",
            Self::Hour => "hour",
            Self::Minute => "minute",
            Self::Second => "second",
            Self::Microsecond => "millisecond", // closest native MongoDB granularity
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Null,
    /// Source text of a date/time literal, normalised but not evaluated.
    Date(String),
    Interval(f64, IntervalUnit),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
    Concat,
    BitAnd,
    BitOr,
    BitXor,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InSource {
    List(Vec<Expression>),
    Subquery(Box<SelectStatement>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubqueryKind {
    Scalar,
    Exists,
    NotExists,
    Row,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    /// Uppercased function name.
    pub name: String,
    pub args: Vec<Expression>,
    pub distinct: bool,
    pub window: Option<WindowSpec>,
    /// `GROUP_CONCAT(... ORDER BY ...)`.
    pub order_by: Vec<OrderByItem>,
    /// `GROUP_CONCAT(... SEPARATOR 's')`.
    pub separator: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowSpec {
    pub partition_by: Vec<Expression>,
    pub order_by: Vec<OrderByItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseExpr {
    /// `CASE operand WHEN ...`; absent for the searched form.
    pub operand: Option<Box<Expression>>,
    pub branches: Vec<(Expression, Expression)>,
    pub else_branch: Option<Box<Expression>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Column(Identifier),
    Lit(Literal),
    Unary(UnaryOp, Box<Expression>),
    Binary(BinaryOp, Box<Expression>, Box<Expression>),
    Like {
        expr: Box<Expression>,
        pattern: Box<Expression>,
        negated: bool,
    },
    /// `expr REGEXP pattern` / `expr RLIKE pattern` — pattern is a POSIX
    /// regex already, unlike `LIKE` which needs `%`/`_` conversion.
    Regexp {
        expr: Box<Expression>,
        pattern: Box<Expression>,
        negated: bool,
    },
    In {
        expr: Box<Expression>,
        source: InSource,
        negated: bool,
    },
    Between {
        expr: Box<Expression>,
        low: Box<Expression>,
        high: Box<Expression>,
    },
    IsNull {
        expr: Box<Expression>,
        negated: bool,
    },
    FunctionCall(FunctionCall),
    Case(CaseExpr),
    If {
        cond: Box<Expression>,
        then_branch: Box<Expression>,
        else_branch: Box<Expression>,
    },
    Coalesce(Vec<Expression>),
    NullIf(Box<Expression>, Box<Expression>),
    Subquery {
        query: Box<SelectStatement>,
        kind: SubqueryKind,
    },
    Star,
    QualifiedStar(String),
}

impl Expression {
    pub fn column(name: impl Into<String>) -> Self {
        Expression::Column(Identifier::unqualified(name))
    }

    pub fn is_aggregate_call(&self, is_aggregate_name: impl Fn(&str) -> bool) -> bool {
        matches!(self, Expression::FunctionCall(f) if f.window.is_none() && is_aggregate_name(&f.name))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableRef {
    Named {
        name: String,
        alias: Option<String>,
    },
    Derived {
        query: Box<SelectStatement>,
        alias: String,
    },
}

impl TableRef {
    /// The name other expressions use to refer to this source: the alias if
    /// present, else the base name.
    pub fn binding_name(&self) -> &str {
        match self {
            TableRef::Named { name, alias } => alias.as_deref().unwrap_or(name),
            TableRef::Derived { alias, .. } => alias,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Cross,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub target: TableRef,
    pub on: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub expr: Expression,
    pub alias: Option<String>,
}

impl Projection {
    /// The name this projection is addressable by downstream (ORDER BY
    /// alias resolution, output document key).
    pub fn output_name(&self) -> Option<String> {
        if let Some(alias) = &self.alias {
            return Some(alias.clone());
        }
        match &self.expr {
            Expression::Column(id) => Some(id.name.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderKey {
    Expr(Expression),
    /// 1-based positional reference, e.g. `ORDER BY 2`.
    Position(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    pub key: OrderKey,
    pub asc: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectStatement {
    pub projections: Vec<Projection>,
    pub distinct: bool,
    pub from: Option<TableRef>,
    pub joins: Vec<Join>,
    pub where_clause: Option<Expression>,
    pub group_by: Vec<Expression>,
    pub having: Option<Expression>,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    pub name: String,
    pub columns: Option<Vec<String>>,
    pub query: SelectStatement,
    pub recursive: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectStatement),
    Insert {
        table: String,
        columns: Vec<String>,
        rows: Vec<Vec<Expression>>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Expression)>,
        where_clause: Option<Expression>,
    },
    Delete {
        table: String,
        where_clause: Option<Expression>,
    },
    With {
        ctes: Vec<Cte>,
        body: Box<Statement>,
    },
}
