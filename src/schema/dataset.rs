//! Fields, datasets and their derived references.
//!
//! `Dataset` computes its `DatasetReference` and `SchemaReference` at
//! construction time. Both are stored alongside the value, never
//! recomputed or mutated, so a rename cannot desynchronize them.

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};
use crate::schema::types::DataType;

/// A single column declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub primary_key: bool,
    pub identity: bool,
    pub unique: bool,
    pub alias: Option<String>,
    pub default_value: Option<String>,
}

impl Field {
    /// Build a field, enforcing `primary_key ⇒ !nullable`.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Result<Field> {
        Field::build(name, data_type, true, false)
    }

    /// Non-nullable primary-key column.
    pub fn primary_key(name: impl Into<String>, data_type: DataType) -> Result<Field> {
        Field::build(name, data_type, false, true)
    }

    /// Non-nullable plain column.
    pub fn required(name: impl Into<String>, data_type: DataType) -> Result<Field> {
        Field::build(name, data_type, false, false)
    }

    fn build(
        name: impl Into<String>,
        data_type: DataType,
        nullable: bool,
        primary_key: bool,
    ) -> Result<Field> {
        let name = name.into();
        if name.is_empty() {
            return Err(IngestError::invalid_schema("field name must be non-empty"));
        }
        if primary_key && nullable {
            return Err(IngestError::invalid_schema(format!(
                "primary key column {:?} cannot be nullable",
                name
            )));
        }
        Ok(Field {
            name,
            data_type,
            nullable,
            primary_key,
            identity: false,
            unique: false,
            alias: None,
            default_value: None,
        })
    }

    pub fn with_identity(mut self) -> Field {
        self.identity = true;
        self
    }

    pub fn with_unique(mut self) -> Field {
        self.unique = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Field {
        self.default_value = Some(value.into());
        self
    }
}

/// Fully-qualified dataset name plus the alias it is referenced under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetReference {
    pub database: Option<String>,
    pub group: Option<String>,
    pub name: String,
    pub alias: String,
}

impl DatasetReference {
    /// Dot-joined qualified name, unquoted. Quoting belongs to the sink.
    pub fn qualified_name(&self) -> String {
        let mut parts = Vec::with_capacity(3);
        if let Some(db) = &self.database {
            parts.push(db.as_str());
        }
        if let Some(group) = &self.group {
            parts.push(group.as_str());
        }
        parts.push(self.name.as_str());
        parts.join(".")
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> DatasetReference {
        self.alias = alias.into();
        self
    }
}

/// The dataset's fields rebound to its reference: each entry carries the
/// owning alias so correlated predicates can qualify columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaReference {
    pub dataset_alias: String,
    pub fields: Vec<Field>,
}

/// An immutable table description: identity, alias and column schema,
/// with both references derived once at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub database: Option<String>,
    pub group: Option<String>,
    pub alias: String,
    pub schema: Vec<Field>,
    reference: DatasetReference,
    schema_reference: SchemaReference,
}

impl Dataset {
    pub fn new(name: impl Into<String>, schema: Vec<Field>) -> Result<Dataset> {
        Dataset::qualified(name, None, None, schema)
    }

    pub fn qualified(
        name: impl Into<String>,
        database: Option<String>,
        group: Option<String>,
        schema: Vec<Field>,
    ) -> Result<Dataset> {
        let name = name.into();
        if name.is_empty() {
            return Err(IngestError::invalid_schema("dataset name must be non-empty"));
        }
        let mut seen = std::collections::HashSet::new();
        for field in &schema {
            if !seen.insert(field.name.as_str()) {
                return Err(IngestError::invalid_schema(format!(
                    "duplicate column {:?} in dataset {:?}",
                    field.name, name
                )));
            }
        }
        let alias = name.clone();
        let reference = DatasetReference {
            database: database.clone(),
            group: group.clone(),
            name: name.clone(),
            alias: alias.clone(),
        };
        let schema_reference = SchemaReference {
            dataset_alias: alias.clone(),
            fields: schema.clone(),
        };
        Ok(Dataset {
            name,
            database,
            group,
            alias,
            schema,
            reference,
            schema_reference,
        })
    }

    /// Rebuild with a different alias; references are re-derived so they
    /// can never disagree with the carrying value.
    pub fn aliased(&self, alias: impl Into<String>) -> Dataset {
        let alias = alias.into();
        let mut ds = self.clone();
        ds.alias = alias.clone();
        ds.reference.alias = alias.clone();
        ds.schema_reference.dataset_alias = alias;
        ds
    }

    pub fn reference(&self) -> &DatasetReference {
        &self.reference
    }

    pub fn schema_reference(&self) -> &SchemaReference {
        &self.schema_reference
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.schema.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn primary_keys(&self) -> Vec<&Field> {
        self.schema.iter().filter(|f| f.primary_key).collect()
    }
}

/// The planning input triple. `metadata` holds the batch-id ledger and is
/// absent when transaction milestoning is purely date-time based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datasets {
    pub main: Dataset,
    pub staging: Dataset,
    pub metadata: Option<Dataset>,
}

impl Datasets {
    pub fn new(main: Dataset, staging: Dataset) -> Datasets {
        Datasets {
            main,
            staging,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Dataset) -> Datasets {
        self.metadata = Some(metadata);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_dataset() -> Dataset {
        Dataset::qualified(
            "orders",
            Some("analytics".into()),
            Some("sales".into()),
            vec![
                Field::primary_key("id", DataType::BigInt).unwrap(),
                Field::new("amount", DataType::Double).unwrap(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_nullable_primary_key_rejected() {
        let err = Field::build("id", DataType::Int, true, true).unwrap_err();
        assert!(matches!(err, IngestError::InvalidSchema(_)));
        assert!(err.to_string().contains("id"));
    }

    #[test]
    fn test_primary_key_constructor_is_not_nullable() {
        let f = Field::primary_key("id", DataType::Int).unwrap();
        assert!(f.primary_key);
        assert!(!f.nullable);
    }

    #[test]
    fn test_empty_field_name_rejected() {
        assert!(Field::new("", DataType::Int).is_err());
    }

    #[test]
    fn test_qualified_name() {
        let ds = sample_dataset();
        assert_eq!(ds.reference().qualified_name(), "analytics.sales.orders");
        assert_eq!(ds.reference().alias, "orders");
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let err = Dataset::new(
            "t",
            vec![
                Field::new("a", DataType::Int).unwrap(),
                Field::new("a", DataType::Text).unwrap(),
            ],
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate column"));
    }

    #[test]
    fn test_alias_rebinds_both_references() {
        let ds = sample_dataset().aliased("sink");
        assert_eq!(ds.alias, "sink");
        assert_eq!(ds.reference().alias, "sink");
        assert_eq!(ds.schema_reference().dataset_alias, "sink");
        // The underlying name is untouched.
        assert_eq!(ds.name, "orders");
    }

    #[test]
    fn test_primary_keys_lookup() {
        let ds = sample_dataset();
        let pks = ds.primary_keys();
        assert_eq!(pks.len(), 1);
        assert_eq!(pks[0].name, "id");
        assert!(ds.has_field("amount"));
        assert!(!ds.has_field("missing"));
    }
}
