//! Scalar and tabular expressions of the logical plan.

use chrono::NaiveDateTime;

use crate::error::{IngestError, Result};
use crate::schema::DatasetReference;

/// Literal values.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// Timestamp literal; rendered with the sink's timestamp syntax.
    DateTime(NaiveDateTime),
}

/// Binary operators appearing in generated predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Plus,
    Minus,
}

/// Core expression type. Recursive to support correlated subqueries.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Column reference, optionally qualified by a dataset alias.
    Field {
        dataset: Option<String>,
        name: String,
    },
    Literal(Literal),
    BinaryOp {
        left: Box<Value>,
        op: BinaryOperator,
        right: Box<Value>,
    },
    Not(Box<Value>),
    /// Function call: `name(args)`.
    Function { name: String, args: Vec<Value> },
    /// Searched CASE expression.
    Case {
        when_clauses: Vec<(Value, Value)>,
        else_clause: Option<Box<Value>>,
    },
    /// Scalar subquery: `(SELECT ...)`.
    Select(Box<Selection>),
    /// `[NOT] EXISTS (SELECT ...)`.
    Exists {
        query: Box<Selection>,
        negated: bool,
    },
    /// `expr [NOT] IN (literals)`.
    InList {
        value: Box<Value>,
        list: Vec<Literal>,
        negated: bool,
    },
    /// `*`
    All,
}

impl Value {
    pub fn field(dataset: impl Into<String>, name: impl Into<String>) -> Value {
        Value::Field {
            dataset: Some(dataset.into()),
            name: name.into(),
        }
    }

    pub fn bare_field(name: impl Into<String>) -> Value {
        Value::Field {
            dataset: None,
            name: name.into(),
        }
    }

    pub fn int(v: i64) -> Value {
        Value::Literal(Literal::Integer(v))
    }

    pub fn string(v: impl Into<String>) -> Value {
        Value::Literal(Literal::String(v.into()))
    }

    pub fn binary(left: Value, op: BinaryOperator, right: Value) -> Value {
        Value::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn eq(left: Value, right: Value) -> Value {
        Value::binary(left, BinaryOperator::Eq, right)
    }

    pub fn not_eq(left: Value, right: Value) -> Value {
        Value::binary(left, BinaryOperator::NotEq, right)
    }

    /// Conjunction of all terms; `None` when empty.
    pub fn and_all(terms: Vec<Value>) -> Option<Value> {
        terms
            .into_iter()
            .reduce(|acc, t| Value::binary(acc, BinaryOperator::And, t))
    }

    pub fn function(name: impl Into<String>, args: Vec<Value>) -> Value {
        Value::Function {
            name: name.into(),
            args,
        }
    }

    pub fn exists(query: Selection) -> Value {
        Value::Exists {
            query: Box::new(query),
            negated: false,
        }
    }

    pub fn not_exists(query: Selection) -> Value {
        Value::Exists {
            query: Box::new(query),
            negated: true,
        }
    }
}

/// A single item in a SELECT projection list.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub value: Value,
    pub alias: Option<String>,
}

impl SelectItem {
    pub fn plain(value: Value) -> SelectItem {
        SelectItem { value, alias: None }
    }

    pub fn aliased(value: Value, alias: impl Into<String>) -> SelectItem {
        SelectItem {
            value,
            alias: Some(alias.into()),
        }
    }
}

/// A FROM source: a dataset reference or an aliased derived table.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Dataset(DatasetReference),
    Select { query: Box<Selection>, alias: String },
}

impl Source {
    /// Alias this source is referenced under.
    pub fn alias(&self) -> &str {
        match self {
            Source::Dataset(r) => &r.alias,
            Source::Select { alias, .. } => alias,
        }
    }
}

/// A SELECT query over the fixed clause subset the planner emits.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Selection {
    pub distinct: bool,
    pub fields: Vec<SelectItem>,
    pub from: Vec<Source>,
    pub filter: Option<Value>,
}

impl Selection {
    pub fn from_dataset(reference: DatasetReference) -> Selection {
        Selection {
            from: vec![Source::Dataset(reference)],
            ..Default::default()
        }
    }

    pub fn with_fields(mut self, fields: Vec<SelectItem>) -> Selection {
        self.fields = fields;
        self
    }

    pub fn with_filter(mut self, filter: Option<Value>) -> Selection {
        self.filter = filter;
        self
    }

    pub fn with_distinct(mut self, distinct: bool) -> Selection {
        self.distinct = distinct;
        self
    }
}

/// Inline rows for VALUES-based inserts. Every row must match the field
/// list arity; validated at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct TabularValues {
    pub fields: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl TabularValues {
    pub fn new(fields: Vec<String>, rows: Vec<Vec<Value>>) -> Result<TabularValues> {
        if fields.is_empty() {
            return Err(IngestError::malformed_plan(
                "tabular values require at least one field",
            ));
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != fields.len() {
                return Err(IngestError::malformed_plan(format!(
                    "row {} has {} values but {} fields are declared",
                    i,
                    row.len(),
                    fields.len()
                )));
            }
        }
        Ok(TabularValues { fields, rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_and_all_reduces_left_to_right() {
        let combined = Value::and_all(vec![
            Value::eq(Value::bare_field("a"), Value::int(1)),
            Value::eq(Value::bare_field("b"), Value::int(2)),
            Value::eq(Value::bare_field("c"), Value::int(3)),
        ])
        .unwrap();
        // ((a = 1 AND b = 2) AND c = 3)
        match combined {
            Value::BinaryOp { op, left, .. } => {
                assert_eq!(op, BinaryOperator::And);
                assert!(matches!(*left, Value::BinaryOp { .. }));
            }
            other => panic!("expected BinaryOp, got {:?}", other),
        }
    }

    #[test]
    fn test_and_all_empty_is_none() {
        assert_eq!(Value::and_all(vec![]), None);
    }

    #[test]
    fn test_tabular_values_arity_checked() {
        let bad = TabularValues::new(
            vec!["a".into(), "b".into()],
            vec![vec![Value::int(1)]],
        );
        assert!(matches!(bad, Err(IngestError::MalformedPlan(_))));

        let ok = TabularValues::new(
            vec!["a".into(), "b".into()],
            vec![vec![Value::int(1), Value::string("x")]],
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_tabular_values_require_fields() {
        assert!(TabularValues::new(vec![], vec![]).is_err());
    }
}
