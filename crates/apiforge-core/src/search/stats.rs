//! Aggregate statistics over the descriptor table.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::descriptor::{ResourceDescriptor, ResourceType};
use crate::usage::UsageReport;

/// Counts over the whole table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchStats {
    /// Every descriptor.
    #[schema(example = 42)]
    pub total: usize,
    /// REST operations.
    pub rest_count: usize,
    /// Schemas.
    pub schema_count: usize,
    /// Distinct sources.
    pub unique_sources: usize,
    /// Distinct controllers (tag groupings) across all sources.
    pub unique_controllers: usize,
    /// Per-source breakdown, sorted by source id.
    pub sources: Vec<SourceStats>,
    /// Usage cross-reference, when a report was supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageStats>,
}

/// Counts for one source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourceStats {
    /// Source id.
    #[schema(example = "petstore")]
    pub source: String,
    /// REST operations in the source.
    pub rest_count: usize,
    /// Schemas in the source.
    pub schema_count: usize,
    /// Distinct controllers in the source.
    pub controllers: usize,
    /// Project files importing anything from the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_in_files: Option<usize>,
    /// Endpoints of the source imported somewhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_endpoints: Option<usize>,
    /// Schemas of the source imported somewhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_datatypes: Option<usize>,
}

/// Table-wide usage cross-reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    /// Descriptor-set generation the report was computed against.
    pub generation: u64,
    /// Files the scan read.
    pub files_scanned: usize,
    /// REST descriptors imported by at least one file.
    pub used_endpoints: usize,
    /// REST descriptors imported nowhere.
    pub unused_endpoints: usize,
    /// Schema descriptors imported by at least one file.
    pub used_datatypes: usize,
    /// Schema descriptors imported nowhere.
    pub unused_datatypes: usize,
    /// Controllers with at least one imported endpoint or a barrel import.
    pub used_controllers: usize,
}

#[derive(Default)]
struct SourceTally {
    rest: usize,
    schema: usize,
    controllers: BTreeSet<String>,
    used_endpoints: usize,
    used_datatypes: usize,
}

impl SearchStats {
    /// Recompute statistics from a descriptor snapshot.
    pub fn collect<'a>(
        descriptors: impl IntoIterator<Item = &'a ResourceDescriptor>,
        usage: Option<&UsageReport>,
    ) -> Self {
        let mut per_source: BTreeMap<&str, SourceTally> = BTreeMap::new();
        let mut controllers: BTreeSet<&str> = BTreeSet::new();
        let mut stats = Self::default();
        let mut usage_stats = usage.map(|report| UsageStats {
            generation: report.generation,
            files_scanned: report.files_scanned,
            ..UsageStats::default()
        });

        for descriptor in descriptors {
            stats.total += 1;
            let tally = per_source.entry(descriptor.source.as_str()).or_default();

            match descriptor.resource_type() {
                ResourceType::Rest => {
                    stats.rest_count += 1;
                    tally.rest += 1;
                    if let Some(controller) = descriptor.controller() {
                        controllers.insert(controller);
                        tally.controllers.insert(controller.to_string());
                    }
                }
                ResourceType::Schema => {
                    stats.schema_count += 1;
                    tally.schema += 1;
                }
            }

            let (Some(report), Some(totals)) = (usage, usage_stats.as_mut()) else {
                continue;
            };
            let used = report.files_using(&descriptor.path) > 0;
            match (descriptor.resource_type(), used) {
                (ResourceType::Rest, true) => {
                    totals.used_endpoints += 1;
                    tally.used_endpoints += 1;
                }
                (ResourceType::Rest, false) => totals.unused_endpoints += 1,
                (ResourceType::Schema, true) => {
                    totals.used_datatypes += 1;
                    tally.used_datatypes += 1;
                }
                (ResourceType::Schema, false) => totals.unused_datatypes += 1,
            }
        }

        if let (Some(report), Some(totals)) = (usage, usage_stats.as_mut()) {
            totals.used_controllers = controllers
                .iter()
                .filter(|controller| report.controller_files(controller) > 0)
                .count();
        }

        stats.unique_sources = per_source.len();
        stats.unique_controllers = controllers.len();
        stats.sources = per_source
            .into_iter()
            .map(|(source, tally)| SourceStats {
                source: source.to_string(),
                rest_count: tally.rest,
                schema_count: tally.schema,
                controllers: tally.controllers.len(),
                used_in_files: usage.map(|report| report.source_files(source)),
                used_endpoints: usage.map(|_| tally.used_endpoints),
                used_datatypes: usage.map(|_| tally.used_datatypes),
            })
            .collect();
        stats.usage = usage_stats;
        stats
    }
}
