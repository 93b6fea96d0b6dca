//! Relational operations and the ordered logical plan.

use crate::error::{IngestError, Result};
use crate::plan::values::{Selection, Source, TabularValues, Value};
use crate::schema::{Dataset, DatasetReference};

/// `column = value` in UPDATE / MERGE clauses.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: String,
    pub value: Value,
}

impl Assignment {
    pub fn new(column: impl Into<String>, value: Value) -> Assignment {
        Assignment {
            column: column.into(),
            value,
        }
    }
}

/// Row source for an INSERT.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertSource {
    Values(TabularValues),
    Select(Selection),
}

/// `WHEN MATCHED [AND condition] THEN UPDATE SET ...`
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedClause {
    pub condition: Option<Value>,
    pub assignments: Vec<Assignment>,
}

/// `WHEN NOT MATCHED THEN INSERT (fields) VALUES (values)`
#[derive(Debug, Clone, PartialEq)]
pub struct NotMatchedClause {
    pub fields: Vec<String>,
    pub values: Vec<Value>,
}

/// Introspection requests.
#[derive(Debug, Clone, PartialEq)]
pub enum ShowKind {
    Tables {
        group: Option<String>,
        like: Option<String>,
    },
}

/// The closed set of relational operations a sink must render.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Create {
        dataset: Dataset,
        if_not_exists: bool,
    },
    Insert {
        target: DatasetReference,
        fields: Vec<String>,
        source: InsertSource,
    },
    Update {
        target: DatasetReference,
        assignments: Vec<Assignment>,
        filter: Option<Value>,
    },
    Delete {
        target: DatasetReference,
        filter: Option<Value>,
    },
    Merge {
        target: DatasetReference,
        source: Source,
        on: Value,
        when_matched: Vec<MatchedClause>,
        when_not_matched: Option<NotMatchedClause>,
    },
    Select(Selection),
    Show(ShowKind),
    LoadCsv {
        target: DatasetReference,
        fields: Vec<String>,
        locator: String,
    },
}

impl Operation {
    /// INSERT with local shape validation: the row source must match the
    /// declared field list arity.
    pub fn insert(
        target: DatasetReference,
        fields: Vec<String>,
        source: InsertSource,
    ) -> Result<Operation> {
        if fields.is_empty() {
            return Err(IngestError::malformed_plan(format!(
                "insert into {:?} declares no fields",
                target.name
            )));
        }
        match &source {
            InsertSource::Values(values) => {
                if values.fields != fields {
                    return Err(IngestError::malformed_plan(format!(
                        "insert into {:?}: tabular fields {:?} differ from declared fields {:?}",
                        target.name, values.fields, fields
                    )));
                }
            }
            InsertSource::Select(selection) => {
                if selection.fields.len() != fields.len() {
                    return Err(IngestError::malformed_plan(format!(
                        "insert into {:?}: select projects {} columns but {} fields are declared",
                        target.name,
                        selection.fields.len(),
                        fields.len()
                    )));
                }
            }
        }
        Ok(Operation::Insert {
            target,
            fields,
            source,
        })
    }

    /// UPDATE with at least one assignment.
    pub fn update(
        target: DatasetReference,
        assignments: Vec<Assignment>,
        filter: Option<Value>,
    ) -> Result<Operation> {
        if assignments.is_empty() {
            return Err(IngestError::malformed_plan(format!(
                "update of {:?} carries no assignments",
                target.name
            )));
        }
        Ok(Operation::Update {
            target,
            assignments,
            filter,
        })
    }

    /// MERGE with at least one action clause.
    pub fn merge(
        target: DatasetReference,
        source: Source,
        on: Value,
        when_matched: Vec<MatchedClause>,
        when_not_matched: Option<NotMatchedClause>,
    ) -> Result<Operation> {
        if when_matched.is_empty() && when_not_matched.is_none() {
            return Err(IngestError::malformed_plan(format!(
                "merge into {:?} carries no action clauses",
                target.name
            )));
        }
        for clause in &when_matched {
            if clause.assignments.is_empty() {
                return Err(IngestError::malformed_plan(format!(
                    "merge into {:?}: matched clause carries no assignments",
                    target.name
                )));
            }
        }
        if let Some(nm) = &when_not_matched {
            if nm.fields.len() != nm.values.len() {
                return Err(IngestError::malformed_plan(format!(
                    "merge into {:?}: not-matched clause has {} fields but {} values",
                    target.name,
                    nm.fields.len(),
                    nm.values.len()
                )));
            }
        }
        Ok(Operation::Merge {
            target,
            source,
            on,
            when_matched,
            when_not_matched,
        })
    }

    /// Short node name, used in capability-gap errors.
    pub fn node_name(&self) -> &'static str {
        match self {
            Operation::Create { .. } => "Create",
            Operation::Insert { .. } => "Insert",
            Operation::Update { .. } => "Update",
            Operation::Delete { .. } => "Delete",
            Operation::Merge { .. } => "Merge",
            Operation::Select(_) => "Select",
            Operation::Show(_) => "Show",
            Operation::LoadCsv { .. } => "LoadCsv",
        }
    }
}

/// What a statement contributes to ingest statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementTag {
    /// Schema-shaping DDL, no row statistics.
    Ddl,
    /// Staging row count query; result recorded as `incoming_records`.
    StagedCount,
    /// Closes changed rows; affected rows count as updated.
    Close,
    /// Closes delete-flagged rows; affected rows count as terminated.
    Terminate,
    /// Opens new rows; affected rows count as inserted.
    Insert,
    /// Physical deletes.
    Delete,
    /// Metadata ledger append, excluded from statistics.
    Metadata,
    /// Bulk load; affected rows count as inserted.
    Load,
    /// Plain query, no statistics contribution.
    Query,
}

/// One plan step: an operation plus its statistics attribution.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanStep {
    pub op: Operation,
    pub tag: StatementTag,
}

/// The ordered, immutable output of a planning call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LogicalPlan {
    pub steps: Vec<PlanStep>,
}

impl LogicalPlan {
    pub fn new() -> LogicalPlan {
        LogicalPlan::default()
    }

    pub fn push(&mut self, op: Operation, tag: StatementTag) {
        self.steps.push(PlanStep { op, tag });
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::values::SelectItem;

    fn target() -> DatasetReference {
        DatasetReference {
            database: None,
            group: None,
            name: "main".into(),
            alias: "sink".into(),
        }
    }

    #[test]
    fn test_insert_field_list_must_match_values() {
        let values = TabularValues::new(vec!["a".into()], vec![vec![Value::int(1)]]).unwrap();
        let err = Operation::insert(
            target(),
            vec!["a".into(), "b".into()],
            InsertSource::Values(values),
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::MalformedPlan(_)));
    }

    #[test]
    fn test_insert_select_projection_arity() {
        let selection = Selection::default().with_fields(vec![SelectItem::plain(Value::int(1))]);
        let err = Operation::insert(
            target(),
            vec!["a".into(), "b".into()],
            InsertSource::Select(selection),
        )
        .unwrap_err();
        assert!(err.to_string().contains("projects 1 columns"));
    }

    #[test]
    fn test_update_requires_assignments() {
        let err = Operation::update(target(), vec![], None).unwrap_err();
        assert!(matches!(err, IngestError::MalformedPlan(_)));
    }

    #[test]
    fn test_merge_requires_clauses() {
        let on = Value::eq(Value::field("sink", "id"), Value::field("stage", "id"));
        let err = Operation::merge(
            target(),
            Source::Dataset(DatasetReference {
                database: None,
                group: None,
                name: "staging".into(),
                alias: "stage".into(),
            }),
            on,
            vec![],
            None,
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::MalformedPlan(_)));
    }

    #[test]
    fn test_merge_not_matched_arity() {
        let on = Value::eq(Value::field("sink", "id"), Value::field("stage", "id"));
        let err = Operation::merge(
            target(),
            Source::Dataset(DatasetReference {
                database: None,
                group: None,
                name: "staging".into(),
                alias: "stage".into(),
            }),
            on,
            vec![],
            Some(NotMatchedClause {
                fields: vec!["a".into(), "b".into()],
                values: vec![Value::int(1)],
            }),
        )
        .unwrap_err();
        assert!(err.to_string().contains("2 fields but 1 values"));
    }

    #[test]
    fn test_plan_preserves_order() {
        let mut plan = LogicalPlan::new();
        plan.push(
            Operation::update(
                target(),
                vec![Assignment::new("x", Value::int(1))],
                None,
            )
            .unwrap(),
            StatementTag::Close,
        );
        plan.push(
            Operation::Delete {
                target: target(),
                filter: None,
            },
            StatementTag::Delete,
        );
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.steps[0].tag, StatementTag::Close);
        assert_eq!(plan.steps[1].tag, StatementTag::Delete);
    }
}
