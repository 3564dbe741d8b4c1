//! Parsed statement and expression trees

use std::fmt;

use crate::document::{PathStep, Value};

/// One parsed statement.
#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    Select(SelectStatement),
    Explain(SelectStatement),
    Insert {
        collection: String,
        documents: Vec<Expr>,
    },
    Update {
        collection: String,
        assignments: Vec<(Path, Expr)>,
        filter: Option<Expr>,
    },
    Delete {
        collection: String,
        filter: Option<Expr>,
    },
    Rename {
        from: String,
        to: String,
    },
    Drop {
        collection: String,
    },
    Analyze {
        collection: String,
    },
    Rebuild {
        options: Option<Expr>,
    },
    Checkpoint,
    Begin,
    Commit,
    Rollback,
    Pragma {
        name: String,
        value: Option<i64>,
    },
}

impl Statement {
    /// Whether executing this statement can modify the catalog.
    pub fn is_write(&self) -> bool {
        match self {
            Statement::Insert { .. }
            | Statement::Update { .. }
            | Statement::Delete { .. }
            | Statement::Rename { .. }
            | Statement::Drop { .. } => true,
            Statement::Select(select) => select.into.is_some(),
            Statement::Pragma { value, .. } => value.is_some(),
            _ => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SelectStatement {
    pub projection: Projection,
    pub into: Option<IntoTarget>,
    pub source: Source,
    pub filter: Option<Expr>,
    pub order: Option<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Projection {
    /// `SELECT $`: the whole document.
    All,
    /// `SELECT COUNT(*)`.
    Count,
    Fields(Vec<ProjectionField>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProjectionField {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl ProjectionField {
    /// Output field name: the alias, the last path segment, or a
    /// positional fallback.
    pub fn output_name(&self, position: usize) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        if let Expr::Path(path) = &self.expr {
            if let Some(PathStep::Field(name)) = path.steps.last() {
                return name.clone();
            }
        }
        format!("expr{}", position + 1)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum IntoTarget {
    Collection(String),
    /// `INTO $file('path')`: write the result set as a JSON array.
    File(String),
}

/// What FROM names: a stored collection or a virtual one.
#[derive(Clone, Debug, PartialEq)]
pub enum Source {
    Collection(String),
    Database,
    Cols,
    Indexes,
}

impl Source {
    pub fn name(&self) -> &str {
        match self {
            Source::Collection(name) => name,
            Source::Database => "$database",
            Source::Cols => "$cols",
            Source::Indexes => "$indexes",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderBy {
    pub path: Path,
    pub order: SortOrder,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// A field path. Empty steps mean the document root (`$`).
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Path {
    pub steps: Vec<PathStep>,
}

impl Path {
    pub fn root() -> Path {
        Path::default()
    }

    pub fn is_root(&self) -> bool {
        self.steps.is_empty()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for step in &self.steps {
            match step {
                PathStep::Field(name) => write!(f, ".{name}")?,
                PathStep::Index(i) => write!(f, "[{i}]")?,
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// `{ field: expr, ... }` with lazily evaluated field values.
    DocumentLiteral(Vec<(String, Expr)>),
    ArrayLiteral(Vec<Expr>),
    Path(Path),
    Parameter(String),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
    In,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Or => "OR",
            BinaryOp::And => "AND",
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Like => "LIKE",
            BinaryOp::In => "IN",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }
}

impl fmt::Display for Expr {
    /// Canonical rendering, used by EXPLAIN output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(Value::String(s)) => write!(f, "{s:?}"),
            Expr::Literal(value) => write!(f, "{value}"),
            Expr::DocumentLiteral(fields) => {
                f.write_str("{")?;
                for (i, (name, expr)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {expr}")?;
                }
                f.write_str("}")
            }
            Expr::ArrayLiteral(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Expr::Path(path) => write!(f, "{path}"),
            Expr::Parameter(name) => write!(f, "@{name}"),
            Expr::Unary { op: UnaryOp::Not, expr } => write!(f, "NOT ({expr})"),
            Expr::Unary { op: UnaryOp::Neg, expr } => write!(f, "-({expr})"),
            Expr::Binary { op, left, right } => {
                write!(f, "({left} {} {right})", op.as_str())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_display() {
        let mut path = Path::root();
        assert_eq!(path.to_string(), "$");
        path.steps.push(PathStep::Field("items".into()));
        path.steps.push(PathStep::Index(2));
        path.steps.push(PathStep::Field("name".into()));
        assert_eq!(path.to_string(), "$.items[2].name");
    }

    #[test]
    fn test_expr_display() {
        let expr = Expr::Binary {
            op: BinaryOp::And,
            left: Box::new(Expr::Binary {
                op: BinaryOp::Gt,
                left: Box::new(Expr::Path(Path {
                    steps: vec![PathStep::Field("age".into())],
                })),
                right: Box::new(Expr::Literal(Value::Int(21))),
            }),
            right: Box::new(Expr::Binary {
                op: BinaryOp::Like,
                left: Box::new(Expr::Path(Path {
                    steps: vec![PathStep::Field("name".into())],
                })),
                right: Box::new(Expr::Literal(Value::String("A%".into()))),
            }),
        };
        assert_eq!(expr.to_string(), "(($.age > 21) AND ($.name LIKE \"A%\"))");
    }

    #[test]
    fn test_projection_output_names() {
        let aliased = ProjectionField {
            expr: Expr::Literal(Value::Int(1)),
            alias: Some("one".into()),
        };
        assert_eq!(aliased.output_name(0), "one");

        let pathed = ProjectionField {
            expr: Expr::Path(Path {
                steps: vec![PathStep::Field("address".into()), PathStep::Field("city".into())],
            }),
            alias: None,
        };
        assert_eq!(pathed.output_name(3), "city");

        let computed = ProjectionField {
            expr: Expr::Literal(Value::Int(1)),
            alias: None,
        };
        assert_eq!(computed.output_name(2), "expr3");
    }

    #[test]
    fn test_write_classification() {
        let select = SelectStatement {
            projection: Projection::All,
            into: None,
            source: Source::Collection("c".into()),
            filter: None,
            order: None,
            limit: None,
            offset: None,
        };
        assert!(!Statement::Select(select.clone()).is_write());
        let mut with_into = select;
        with_into.into = Some(IntoTarget::Collection("backup".into()));
        assert!(Statement::Select(with_into).is_write());
        assert!(Statement::Drop { collection: "c".into() }.is_write());
        assert!(!Statement::Checkpoint.is_write());
    }
}
