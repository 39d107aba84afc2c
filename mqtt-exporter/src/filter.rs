//! Topic filters.
//!
//! Each configured filter pairs a topic pattern with the values to extract from matching
//! messages.  Named capture groups in the pattern parameterize the produced metrics:
//!
//! - a group named exactly `N` overrides the metric name
//! - a group whose name starts with `L` becomes a label, keyed by the group name without the
//!   `L` prefix and one optional `_` (so both `Lroom` and `L_room` become `room`)
//!
//! Other named groups are captured but otherwise ignored.
use std::collections::BTreeMap;

use regex::Regex;
use tracing::debug;

use crate::common::BuildError;
use crate::config::FilterDefinition;
use crate::path::ValuePath;

/// Capture group that overrides the metric name.
pub const NAME_GROUP: &str = "N";

/// Prefix of capture groups that become labels.
pub const LABEL_GROUP_PREFIX: char = 'L';

/// A filter definition with its topic pattern and value paths compiled.
#[derive(Debug)]
pub struct CompiledFilter {
    id: String,
    group: String,
    pattern: Regex,
    values: Vec<(String, ValuePath)>,
}

impl CompiledFilter {
    /// Compiles a single filter definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the topic pattern or any value path is invalid.
    pub fn compile(id: &str, definition: &FilterDefinition) -> Result<Self, BuildError> {
        let pattern = Regex::new(&definition.filter).map_err(|source| {
            BuildError::InvalidFilterPattern { filter: id.to_owned(), source }
        })?;

        let values = definition
            .values
            .iter()
            .map(|(value, path)| {
                ValuePath::parse(path).map(|path| (value.clone(), path)).map_err(|source| {
                    BuildError::InvalidValuePath {
                        filter: id.to_owned(),
                        value: value.clone(),
                        source,
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CompiledFilter { id: id.to_owned(), group: definition.group.clone(), pattern, values })
    }

    /// Identifier of the filter in the configuration.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Group prepended to the names of metrics produced by this filter.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Logical value names and their extraction paths.
    pub fn values(&self) -> &[(String, ValuePath)] {
        &self.values
    }

    /// Matches `topic` against this filter's pattern, returning the named captures on success.
    pub fn captures(&self, topic: &str) -> Option<Captures> {
        let found = self.pattern.captures(topic)?;

        let groups = self
            .pattern
            .capture_names()
            .flatten()
            .filter_map(|name| found.name(name).map(|m| (name.to_owned(), m.as_str().to_owned())))
            .collect();

        Some(Captures { groups })
    }
}

/// Named captures from matching a topic against a filter pattern.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Captures {
    groups: BTreeMap<String, String>,
}

impl Captures {
    /// Gets the value captured by the group `name`, if it participated in the match.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.groups.get(name).map(String::as_str)
    }

    /// Gets the metric name override, if the pattern captured one.
    pub fn name_override(&self) -> Option<&str> {
        self.get(NAME_GROUP)
    }

    /// Builds the label set from the label capture groups.
    pub fn labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        for (group, value) in &self.groups {
            let Some(key) = group.strip_prefix(LABEL_GROUP_PREFIX) else {
                continue;
            };
            let key = key.strip_prefix('_').unwrap_or(key);
            if key.is_empty() {
                debug!(group = group.as_str(), "Ignoring label capture group without a label name.");
                continue;
            }
            labels.insert(key.to_owned(), value.clone());
        }
        labels
    }

    /// Returns `true` if no named group participated in the match.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// A filter whose pattern matched a topic, with the captures of that match.
#[derive(Debug)]
pub struct TopicMatch<'a> {
    /// The matching filter.
    pub filter: &'a CompiledFilter,
    /// Captures of the match, scoped to this filter only.
    pub captures: Captures,
}

/// All compiled filters.
///
/// Immutable once compiled, so it can be shared freely between message handlers.
#[derive(Debug, Default)]
pub struct FilterSet {
    filters: Vec<CompiledFilter>,
}

impl FilterSet {
    /// Compiles every filter definition.
    ///
    /// # Errors
    ///
    /// Returns the first compilation error encountered; no partial set is ever produced.
    pub fn compile_all(
        definitions: &BTreeMap<String, FilterDefinition>,
    ) -> Result<FilterSet, BuildError> {
        let filters = definitions
            .iter()
            .map(|(id, definition)| CompiledFilter::compile(id, definition))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FilterSet { filters })
    }

    /// Finds every filter whose pattern matches `topic`.
    ///
    /// The order of the returned matches carries no meaning.
    pub fn match_topic(&self, topic: &str) -> Vec<TopicMatch<'_>> {
        self.filters
            .iter()
            .filter_map(|filter| {
                filter.captures(topic).map(|captures| TopicMatch { filter, captures })
            })
            .collect()
    }

    /// Number of compiled filters.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Returns `true` if no filters are configured.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}
