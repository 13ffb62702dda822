//! SQL expressions.

use crate::{ColumnName, ParamName};

/// A SQL expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A parameter placeholder (e.g., $email -> $1)
    Param(ParamName),
    /// A column reference
    Column(ColumnName),
    /// `DEFAULT`, only valid as an INSERT value
    Default,
    /// `EXCLUDED.column` inside ON CONFLICT DO UPDATE
    Excluded(ColumnName),
    /// Binary operation (e.g., a = b, a AND b)
    BinOp {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    /// COUNT(*)
    CountAll,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    And,
}

impl BinOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinOp::Eq => "=",
            BinOp::And => "AND",
        }
    }
}

// Convenience constructors
impl Expr {
    pub fn param(name: impl Into<ParamName>) -> Self {
        Expr::Param(name.into())
    }

    pub fn column(name: impl Into<ColumnName>) -> Self {
        Expr::Column(name.into())
    }

    pub fn excluded(name: impl Into<ColumnName>) -> Self {
        Expr::Excluded(name.into())
    }

    /// Create an equality expression: self = other
    pub fn eq(self, other: Expr) -> Self {
        Expr::BinOp {
            left: Box::new(self),
            op: BinOp::Eq,
            right: Box::new(other),
        }
    }

    /// Create an AND expression: self AND other
    pub fn and(self, other: Expr) -> Self {
        Expr::BinOp {
            left: Box::new(self),
            op: BinOp::And,
            right: Box::new(other),
        }
    }

    /// `a = $a AND b = $b ...` for each column, each bound to a parameter
    /// named after the column. Returns `None` for an empty column list.
    pub fn columns_eq_params<I, C>(columns: I) -> Option<Self>
    where
        I: IntoIterator<Item = C>,
        C: Into<ColumnName>,
    {
        columns
            .into_iter()
            .map(|c| {
                let c: ColumnName = c.into();
                let param = Expr::Param(ParamName::new(c.as_str()));
                Expr::Column(c).eq(param)
            })
            .reduce(Expr::and)
    }
}
