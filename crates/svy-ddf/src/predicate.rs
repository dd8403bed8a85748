//! Respondent filters on root-level columns.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::layout::{StoreLayout, quote};

static COMPARISON: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"^\s*([A-Z_][A-Z0-9_.]*)\s*(<=|>=|<>|!=|=|<|>)\s*(.+?)\s*$")
        .case_insensitive(true)
        .build()
        .expect("Invalid comparison regex")
});

static BETWEEN: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"^\s*([A-Z_][A-Z0-9_.]*)\s+BETWEEN\s+(.+?)\s+AND\s+(.+?)\s*$")
        .case_insensitive(true)
        .build()
        .expect("Invalid range regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn parse(op: &str) -> Option<Self> {
        match op {
            "=" => Some(CompareOp::Eq),
            "<>" | "!=" => Some(CompareOp::Ne),
            "<" => Some(CompareOp::Lt),
            "<=" => Some(CompareOp::Le),
            ">" => Some(CompareOp::Gt),
            ">=" => Some(CompareOp::Ge),
            _ => None,
        }
    }

    fn as_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// A literal operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Operand {
    fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some(text) = raw
            .strip_prefix('\'')
            .and_then(|rest| rest.strip_suffix('\''))
        {
            return Operand::Text(text.replace("''", "'"));
        }
        if let Ok(integer) = raw.parse::<i64>() {
            return Operand::Integer(integer);
        }
        if let Ok(real) = raw.parse::<f64>() {
            return Operand::Real(real);
        }
        Operand::Text(raw.to_string())
    }

    fn to_value(&self) -> Value {
        match self {
            Operand::Integer(value) => Value::Integer(*value),
            Operand::Real(value) => Value::Real(*value),
            Operand::Text(value) => Value::Text(value.clone()),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Integer(value) => write!(f, "{value}"),
            Operand::Real(value) => write!(f, "{value}"),
            Operand::Text(value) => write!(f, "'{}'", value.replace('\'', "''")),
        }
    }
}

/// Equality, comparison or range test on one root-level variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    Compare {
        variable: String,
        op: CompareOp,
        value: Operand,
    },
    Between {
        variable: String,
        low: Operand,
        high: Operand,
    },
}

impl Predicate {
    pub fn variable(&self) -> &str {
        match self {
            Predicate::Compare { variable, .. } | Predicate::Between { variable, .. } => variable,
        }
    }

    /// SQL condition on `L1` and its bound parameters.
    pub fn to_sql(&self, layout: &StoreLayout) -> Result<(String, Vec<Value>)> {
        let column = layout
            .root()
            .column(self.variable())
            .ok_or_else(|| StoreError::UnknownVariable {
                name: self.variable().to_string(),
            })?;
        let column = quote(&column.column_name());
        Ok(match self {
            Predicate::Compare { op, value, .. } => (
                format!("{column} {} ?", op.as_sql()),
                vec![value.to_value()],
            ),
            Predicate::Between { low, high, .. } => (
                format!("{column} BETWEEN ? AND ?"),
                vec![low.to_value(), high.to_value()],
            ),
        })
    }
}

impl FromStr for Predicate {
    type Err = StoreError;

    fn from_str(text: &str) -> Result<Self> {
        if let Some(captures) = BETWEEN.captures(text) {
            return Ok(Predicate::Between {
                variable: captures[1].to_string(),
                low: Operand::parse(&captures[2]),
                high: Operand::parse(&captures[3]),
            });
        }
        if let Some(captures) = COMPARISON.captures(text)
            && let Some(op) = CompareOp::parse(&captures[2])
        {
            return Ok(Predicate::Compare {
                variable: captures[1].to_string(),
                op,
                value: Operand::parse(&captures[3]),
            });
        }
        Err(StoreError::InvalidArgument(format!(
            "cannot parse filter `{text}`"
        )))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Compare { variable, op, value } => {
                write!(f, "{variable} {} {value}", op.as_sql())
            }
            Predicate::Between {
                variable,
                low,
                high,
            } => write!(f, "{variable} BETWEEN {low} AND {high}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svy_model::{DataType, FieldNode, Schema, Variable};

    #[test]
    fn parses_comparisons_and_ranges() {
        let age: Predicate = "Age >= 30".parse().unwrap();
        assert_eq!(
            age,
            Predicate::Compare {
                variable: "Age".to_string(),
                op: CompareOp::Ge,
                value: Operand::Integer(30),
            }
        );
        let name: Predicate = "Name = 'O''Neil'".parse().unwrap();
        assert_eq!(name.to_string(), "Name = 'O''Neil'");
        let range: Predicate = "age between 20 and 29.5".parse().unwrap();
        assert!(matches!(
            range,
            Predicate::Between { high: Operand::Real(_), .. }
        ));
        assert!("Age ~ 3".parse::<Predicate>().is_err());
    }

    #[test]
    fn binds_values_against_root_columns() {
        let mut schema = Schema::default();
        schema
            .fields
            .push(FieldNode::Variable(Variable::new("v1", "Age", DataType::Long)));
        let layout = StoreLayout::from_schema(&schema);

        let (sql, values) = "age < 40".parse::<Predicate>().unwrap().to_sql(&layout).unwrap();
        assert_eq!(sql, "\"Age:L\" < ?");
        assert_eq!(values, vec![Value::Integer(40)]);

        let err = "Score = 1".parse::<Predicate>().unwrap().to_sql(&layout);
        assert!(matches!(err, Err(StoreError::UnknownVariable { .. })));
    }
}
