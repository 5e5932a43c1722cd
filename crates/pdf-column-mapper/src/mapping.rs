use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::schema::TargetSchema;

/// Selection value meaning "no source column" in host selection controls.
pub const UNSET_CHOICE: &str = "-- none --";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingChoice {
    Unset,
    Source(String),
}

impl MappingChoice {
    /// Reads a selection control value; the sentinel and blank input both clear the choice.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value == UNSET_CHOICE {
            Self::Unset
        } else {
            Self::Source(value.to_string())
        }
    }

    fn into_source(self) -> Option<String> {
        match self {
            Self::Unset => None,
            Self::Source(column) => Some(column),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub target: String,
    pub source: Option<String>,
}

/// One entry per distinct target column, in schema order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnMapping {
    entries: Vec<MappingEntry>,
}

impl ColumnMapping {
    fn from_schema<F>(schema: &TargetSchema, mut pick: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut entries: Vec<MappingEntry> = Vec::with_capacity(schema.len());
        for target in schema.columns() {
            if entries.iter().any(|entry| &entry.target == target) {
                continue;
            }
            entries.push(MappingEntry {
                target: target.clone(),
                source: pick(target),
            });
        }
        Self { entries }
    }

    /// Rebuilds a full mapping from host-held `(target, choice)` pairs. Targets without a pair
    /// are unset; pairs naming unknown targets are ignored.
    #[must_use]
    pub fn from_pairs<I>(schema: &TargetSchema, pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, MappingChoice)>,
    {
        let pairs = pairs.into_iter().collect::<Vec<_>>();
        Self::from_schema(schema, |target| {
            pairs
                .iter()
                .rev()
                .find(|(candidate, _)| candidate == target)
                .and_then(|(_, choice)| choice.clone().into_source())
        })
    }

    #[must_use]
    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    /// Source for `target`; `None` when unset or when `target` is not in the schema.
    #[must_use]
    pub fn get(&self, target: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.target == target)
            .and_then(|entry| entry.source.as_deref())
    }

    #[must_use]
    pub fn mapped_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.source.is_some())
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mapped_count() == 0
    }

    /// Targets whose selected source is absent from `source_columns`.
    #[must_use]
    pub fn missing_sources(&self, source_columns: &[String]) -> Vec<(String, String)> {
        self.entries
            .iter()
            .filter_map(|entry| {
                let source = entry.source.as_ref()?;
                (!source_columns.contains(source)).then(|| (entry.target.clone(), source.clone()))
            })
            .collect()
    }
}

/// Pre-selects the source column whose name equals the target exactly, otherwise leaves it unset.
#[must_use]
pub fn build_default_mapping(schema: &TargetSchema, source_columns: &[String]) -> ColumnMapping {
    ColumnMapping::from_schema(schema, |target| {
        source_columns
            .iter()
            .find(|source| source.as_str() == target)
            .cloned()
    })
}

/// Returns a copy of `current` with one target's selection replaced or cleared.
///
/// # Errors
///
/// `UnknownTargetColumn` when `target` has no entry in `current`.
pub fn set_mapping(
    current: &ColumnMapping,
    target: &str,
    choice: MappingChoice,
) -> Result<ColumnMapping, PipelineError> {
    let index = current
        .entries
        .iter()
        .position(|entry| entry.target == target)
        .ok_or_else(|| PipelineError::UnknownTargetColumn(target.to_string()))?;

    let mut next = current.clone();
    next.entries[index].source = choice.into_source();
    Ok(next)
}
