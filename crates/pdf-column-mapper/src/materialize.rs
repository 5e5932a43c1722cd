use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::mapping::ColumnMapping;
use crate::model::ExtractedDataset;
use crate::schema::TargetSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl FinalTable {
    /// Value at `row` for the first column named `column`.
    #[must_use]
    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.columns.iter().position(|name| name == column)?;
        self.rows
            .get(row)
            .and_then(|cells| cells.get(index))
            .map(String::as_str)
    }
}

/// Checks the three preconditions for producing an export.
///
/// # Errors
///
/// `IncompleteConfiguration` with a message telling the user what is missing.
pub fn check_ready(
    schema: &TargetSchema,
    dataset: Option<&ExtractedDataset>,
    mapping: &ColumnMapping,
) -> Result<(), PipelineError> {
    if schema.is_empty() {
        return Err(PipelineError::IncompleteConfiguration(
            "enter at least one target column".to_string(),
        ));
    }
    if dataset.is_none() {
        return Err(PipelineError::IncompleteConfiguration(
            "extract a PDF containing tables first".to_string(),
        ));
    }
    if mapping.is_empty() {
        return Err(PipelineError::IncompleteConfiguration(
            "map at least one column to generate the export".to_string(),
        ));
    }
    Ok(())
}

/// Builds the export table column by column, one row per dataset record.
///
/// Unmapped targets and sources missing from the dataset produce empty strings.
#[must_use]
pub fn materialize(
    schema: &TargetSchema,
    mapping: &ColumnMapping,
    dataset: &ExtractedDataset,
) -> FinalTable {
    let sources = schema
        .columns()
        .iter()
        .map(|target| {
            let source = mapping.get(target)?;
            if dataset.has_column(source) {
                Some(source)
            } else {
                tracing::warn!(
                    target_column = target,
                    source_column = source,
                    "mapped source column is not in the dataset"
                );
                None
            }
        })
        .collect::<Vec<_>>();

    let rows = dataset
        .records
        .iter()
        .map(|record| {
            sources
                .iter()
                .map(|source| {
                    source
                        .and_then(|column| record.get(column))
                        .unwrap_or_default()
                        .to_string()
                })
                .collect()
        })
        .collect();

    FinalTable {
        columns: schema.columns().to_vec(),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use pretty_assertions::assert_eq;

    use super::{FinalTable, check_ready, materialize};
    use crate::error::PipelineError;
    use crate::mapping::{ColumnMapping, MappingChoice, build_default_mapping};
    use crate::model::{ExtractedDataset, Record};
    use crate::schema::{TargetSchema, parse_manual_columns};

    fn names_dataset() -> ExtractedDataset {
        let record = |page: u32, name: &str| Record {
            page,
            cells: BTreeMap::from([("Name".to_string(), name.to_string())]),
        };
        ExtractedDataset {
            columns: vec!["Name".to_string(), "Phone".to_string()],
            records: vec![record(1, "Alice"), record(2, "Bob")],
            table_count: 2,
        }
    }

    fn mapping(schema: &TargetSchema, pairs: &[(&str, &str)]) -> ColumnMapping {
        ColumnMapping::from_pairs(
            schema,
            pairs
                .iter()
                .map(|(target, source)| ((*target).to_string(), MappingChoice::parse(source))),
        )
    }

    #[test]
    fn maps_named_column_and_blanks_unmapped_one() {
        let schema = parse_manual_columns("nom,prenom");
        let table = materialize(&schema, &mapping(&schema, &[("nom", "Name")]), &names_dataset());

        assert_eq!(
            table,
            FinalTable {
                columns: vec!["nom".to_string(), "prenom".to_string()],
                rows: vec![
                    vec!["Alice".to_string(), String::new()],
                    vec!["Bob".to_string(), String::new()],
                ],
            }
        );
    }

    #[test]
    fn missing_source_column_degrades_to_empty_strings() {
        let schema = parse_manual_columns("nom,email");
        let table = materialize(
            &schema,
            &mapping(&schema, &[("nom", "Name"), ("email", "E-mail")]),
            &names_dataset(),
        );
        assert_eq!(table.rows.len(), 2);
        assert!(table.rows.iter().all(|row| row[1].is_empty()));
    }

    #[test]
    fn known_column_with_absent_cell_is_empty() {
        let schema = parse_manual_columns("telephone");
        let table = materialize(
            &schema,
            &mapping(&schema, &[("telephone", "Phone")]),
            &names_dataset(),
        );
        assert_eq!(table.cell(0, "telephone"), Some(""));
    }

    #[test]
    fn duplicate_targets_alias_the_same_source() {
        let schema = parse_manual_columns("nom,nom");
        let table = materialize(&schema, &mapping(&schema, &[("nom", "Name")]), &names_dataset());
        assert_eq!(table.rows[1], vec!["Bob", "Bob"]);
    }

    #[test]
    fn row_count_follows_dataset_even_when_nothing_is_mapped() {
        let schema = parse_manual_columns("a,b");
        let table = materialize(&schema, &ColumnMapping::default(), &names_dataset());
        assert_eq!(table.rows, vec![vec!["", ""], vec!["", ""]]);
    }

    #[test]
    fn readiness_requires_schema_dataset_and_one_mapping() {
        let dataset = names_dataset();
        let empty_schema = TargetSchema::default();
        let no_mapping = build_default_mapping(&empty_schema, &dataset.columns);
        assert!(matches!(
            check_ready(&empty_schema, Some(&dataset), &no_mapping),
            Err(PipelineError::IncompleteConfiguration(_))
        ));

        let schema = parse_manual_columns("Name");
        let mapped = build_default_mapping(&schema, &dataset.columns);
        assert!(check_ready(&schema, None, &mapped).is_err());
        assert!(check_ready(&schema, Some(&dataset), &ColumnMapping::default()).is_err());
        assert!(check_ready(&schema, Some(&dataset), &mapped).is_ok());
    }
}
