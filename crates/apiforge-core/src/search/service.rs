//! The search service: descriptor table, owned index and ranking pipeline.
//!
//! The service is synchronous and in-memory. Callers that share it across
//! tasks wrap it in a lock; no method suspends.
//!
//! Ranking:
//! 1. classify the query ([`QueryIntent`])
//! 2. query the index with prefix expansion, fuzzy tolerance and the
//!    option filters
//! 3. normalize scores by `max(max_score, 1)`
//! 4. blend with recency decay and sort, ties by insertion order
//! 5. move exact path / operation hits ahead of the generic tail
//! 6. slice by offset and limit

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, error, trace, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::SearchConfig;
use crate::descriptor::{HttpMethod, ResourceDescriptor, ResourceType};
use crate::usage::UsageReport;

use super::index::{FieldBoosts, IndexedDocument, QueryOptions, TextIndex};
use super::intent::QueryIntent;
use super::ranking::{combine, decay, normalize};
use super::stats::SearchStats;
use super::{SearchError, SearchResult};

/// Filters and pagination for [`SearchService::search`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOptions {
    /// Only descriptors of this type.
    pub resource_type: Option<ResourceType>,
    /// Only descriptors whose tag path is this package or nested under it.
    /// The package may be qualified by its source, as in `petstore/users`.
    pub package: Option<String>,
    /// Only descriptors from this source.
    pub source: Option<String>,
    /// Only descriptors referencing at least one of these schema names.
    pub data_types: Option<Vec<String>>,
    /// Only descriptors with one of these exact names.
    pub names: Option<Vec<String>>,
    /// Only REST descriptors with this method.
    pub method: Option<HttpMethod>,
    /// Fuzzy tolerance; the configured default when absent.
    pub fuzzy: Option<f64>,
    /// Rows to skip.
    pub offset: usize,
    /// Rows to return; the configured default when absent.
    pub limit: Option<usize>,
}

/// Outcome of [`SearchService::replace_source`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceReplacement {
    /// Descriptors dropped from the previous load.
    pub removed: usize,
    /// Descriptors indexed from the new load.
    pub added: usize,
}

struct Entry {
    descriptor: Arc<ResourceDescriptor>,
    seq: u64,
}

/// In-memory descriptor search.
pub struct SearchService {
    config: SearchConfig,
    clock: Arc<dyn Clock>,
    table: HashMap<String, Entry>,
    index: TextIndex,
    by_path: HashMap<String, HashSet<String>>,
    by_name: HashMap<String, HashSet<String>>,
    next_seq: u64,
    generation: u64,
}

impl std::fmt::Debug for SearchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchService")
            .field("config", &self.config)
            .field("descriptors", &self.table.len())
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl SearchService {
    /// Create a service on the system clock.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidConfig`] for out-of-range parameters.
    pub fn new(config: SearchConfig) -> SearchResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a service with an injected clock.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidConfig`] for out-of-range parameters and
    /// [`SearchError::Index`] if the index cannot be created.
    pub fn with_clock(config: SearchConfig, clock: Arc<dyn Clock>) -> SearchResult<Self> {
        let errors = config.validation_errors();
        if !errors.is_empty() {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            return Err(SearchError::InvalidConfig(messages.join("; ")));
        }

        Ok(Self {
            config,
            clock,
            table: HashMap::new(),
            index: TextIndex::new(FieldBoosts::default())?,
            by_path: HashMap::new(),
            by_name: HashMap::new(),
            next_seq: 0,
            generation: 0,
        })
    }

    /// Ranking parameters in effect.
    #[must_use]
    pub const fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Number of descriptors in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Counter bumped by every change to the descriptor set.
    ///
    /// Usage reports computed against an older generation are stale.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    // =========================================================================
    // MUTATION
    // =========================================================================

    /// Insert or replace a descriptor.
    ///
    /// A replaced descriptor keeps its original insertion position for
    /// tie-breaking.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::TypeChanged`] if the id is stored with a
    /// different resource type, or [`SearchError::Index`] if the index
    /// write fails. Either way the table is unchanged.
    pub fn add_descriptor(&mut self, descriptor: ResourceDescriptor) -> SearchResult<()> {
        let seq = self.slot_for(&descriptor)?;
        self.index.index(IndexedDocument::from_descriptor(&descriptor))?;
        self.store(descriptor, seq);
        self.generation += 1;
        Ok(())
    }

    /// Remove a descriptor from the table and the index.
    ///
    /// The index entry is dropped even when the table no longer holds the id.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Index`] if the index delete fails; the table
    /// is left unchanged.
    pub fn remove_descriptor(&mut self, id: &str) -> SearchResult<Option<Arc<ResourceDescriptor>>> {
        let indexed = self.index.contains(id);
        self.index.remove(id)?;

        let removed = self.evict(id);
        if indexed || removed.is_some() {
            self.generation += 1;
        }
        Ok(removed)
    }

    /// Remove every descriptor of a source. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Index`] if the index delete fails; nothing is
    /// removed.
    pub fn remove_source(&mut self, source: &str) -> SearchResult<usize> {
        let ids = self.source_ids(source);
        if ids.is_empty() {
            return Ok(0);
        }

        self.index.apply(&ids, Vec::new())?;
        for id in &ids {
            self.evict(id);
        }
        self.generation += 1;
        Ok(ids.len())
    }

    /// Swap the descriptors of one source for a freshly loaded set.
    ///
    /// The index applies the swap in a single commit, so readers holding
    /// the service lock never observe a half-loaded source. Descriptors
    /// whose id now belongs to another type are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Index`] if the index commit fails; the
    /// previous load stays in place.
    pub fn replace_source(
        &mut self,
        source: &str,
        descriptors: Vec<ResourceDescriptor>,
    ) -> SearchResult<SourceReplacement> {
        let previous = self.source_ids(source);

        let mut incoming: Vec<(ResourceDescriptor, u64)> = Vec::with_capacity(descriptors.len());
        let mut positions: HashMap<String, usize> = HashMap::new();
        for descriptor in descriptors {
            // Ids this source already owns may change type; others may not.
            let owned = self
                .table
                .get(&descriptor.id)
                .filter(|entry| entry.descriptor.source == source)
                .map(|entry| entry.seq);
            let seq = match owned.map_or_else(|| self.slot_for(&descriptor), Ok) {
                Ok(seq) => seq,
                Err(e) => {
                    warn!(source, id = %descriptor.id, error = %e, "Skipping descriptor");
                    continue;
                }
            };
            // A later duplicate wins but keeps the first one's position.
            match positions.get(&descriptor.id) {
                Some(&at) => incoming[at].0 = descriptor,
                None => {
                    positions.insert(descriptor.id.clone(), incoming.len());
                    incoming.push((descriptor, seq));
                }
            }
        }

        let stale: Vec<String> = previous
            .iter()
            .filter(|id| !positions.contains_key(id.as_str()))
            .cloned()
            .collect();
        let documents = incoming
            .iter()
            .map(|(descriptor, _)| IndexedDocument::from_descriptor(descriptor))
            .collect();
        self.index.apply(&stale, documents)?;

        for id in &previous {
            self.evict(id);
        }
        let added = incoming.len();
        for (descriptor, seq) in incoming {
            self.store(descriptor, seq);
        }
        self.generation += 1;

        let removed = previous.len();
        debug!(source, removed, added, "Replaced source descriptors");
        Ok(SourceReplacement { removed, added })
    }

    /// Empty the table, the index and the lookups.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Index`] if the index cannot be cleared; the
    /// table is left unchanged.
    pub fn clear_all(&mut self) -> SearchResult<()> {
        self.index.remove_all()?;
        self.table.clear();
        self.by_path.clear();
        self.by_name.clear();
        self.generation += 1;
        Ok(())
    }

    /// Stamp a descriptor as accessed now and re-index it.
    ///
    /// Returns the updated descriptor, or `None` for unknown ids.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Index`] if the re-index fails.
    pub fn touch_descriptor(&mut self, id: &str) -> SearchResult<Option<Arc<ResourceDescriptor>>> {
        let now = self.clock.now_ms();
        let Some(entry) = self.table.get_mut(id) else {
            return Ok(None);
        };

        let mut touched = ResourceDescriptor::clone(&entry.descriptor);
        touched.last_accessed = Some(now);
        let touched = Arc::new(touched);
        entry.descriptor = Arc::clone(&touched);

        self.index.index(IndexedDocument::from_descriptor(&touched))?;
        Ok(Some(touched))
    }

    /// Insertion position for a descriptor, or the type-change error.
    fn slot_for(&mut self, descriptor: &ResourceDescriptor) -> SearchResult<u64> {
        let requested = descriptor.resource_type();
        match self.table.get(&descriptor.id) {
            Some(existing) if existing.descriptor.resource_type() != requested => {
                Err(SearchError::TypeChanged {
                    id: descriptor.id.clone(),
                    existing: existing.descriptor.resource_type(),
                    requested,
                })
            }
            Some(existing) => Ok(existing.seq),
            None => {
                self.next_seq += 1;
                Ok(self.next_seq)
            }
        }
    }

    fn store(&mut self, descriptor: ResourceDescriptor, seq: u64) {
        if let Some(previous) = self.table.remove(&descriptor.id) {
            self.unlink(&previous.descriptor);
        }
        self.link(&descriptor);
        trace!(id = %descriptor.id, name = %descriptor.name, "Indexed descriptor");

        self.table.insert(
            descriptor.id.clone(),
            Entry {
                descriptor: Arc::new(descriptor),
                seq,
            },
        );
    }

    fn evict(&mut self, id: &str) -> Option<Arc<ResourceDescriptor>> {
        self.table.remove(id).map(|entry| {
            self.unlink(&entry.descriptor);
            entry.descriptor
        })
    }

    fn source_ids(&self, source: &str) -> Vec<String> {
        self.table
            .values()
            .filter(|entry| entry.descriptor.source == source)
            .map(|entry| entry.descriptor.id.clone())
            .collect()
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Look up a descriptor by id.
    #[must_use]
    pub fn get_by_id(&self, id: &str) -> Option<Arc<ResourceDescriptor>> {
        self.table.get(id).map(|entry| Arc::clone(&entry.descriptor))
    }

    /// Snapshot of every descriptor in insertion order.
    #[must_use]
    pub fn descriptors(&self) -> Vec<Arc<ResourceDescriptor>> {
        let mut entries: Vec<&Entry> = self.table.values().collect();
        entries.sort_by_key(|entry| entry.seq);
        entries
            .into_iter()
            .map(|entry| Arc::clone(&entry.descriptor))
            .collect()
    }

    /// Ranked, paginated search.
    #[must_use]
    pub fn search(&self, query: &str, options: &SearchOptions) -> Vec<Arc<ResourceDescriptor>> {
        let limit = options.limit.unwrap_or(self.config.default_limit);
        self.rank(query, options)
            .into_iter()
            .skip(options.offset)
            .take(limit)
            .map(|entry| Arc::clone(&entry.descriptor))
            .collect()
    }

    /// Number of rows [`search`](Self::search) would yield without
    /// pagination. Offset and limit are ignored.
    #[must_use]
    pub fn get_total_count(&self, query: &str, options: &SearchOptions) -> usize {
        self.rank(query, options).len()
    }

    /// The most recently accessed descriptors, newest first.
    #[must_use]
    pub fn get_recent(&self, limit: usize) -> Vec<Arc<ResourceDescriptor>> {
        let mut accessed: Vec<(&Entry, i64)> = self
            .table
            .values()
            .filter_map(|entry| entry.descriptor.last_accessed.map(|at| (entry, at)))
            .collect();
        accessed.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.seq.cmp(&b.0.seq)));

        accessed
            .into_iter()
            .take(limit)
            .map(|(entry, _)| Arc::clone(&entry.descriptor))
            .collect()
    }

    /// Aggregate statistics, optionally cross-referenced with a usage report.
    #[must_use]
    pub fn stats(&self, usage: Option<&UsageReport>) -> SearchStats {
        let descriptors = self.table.values().map(|entry| entry.descriptor.as_ref());
        SearchStats::collect(descriptors, usage)
    }

    // =========================================================================
    // RANKING
    // =========================================================================

    fn rank(&self, query: &str, options: &SearchOptions) -> Vec<&Entry> {
        let fuzzy = options
            .fuzzy
            .unwrap_or(self.config.fuzzy)
            .clamp(0.0, 1.0);

        match QueryIntent::detect(query, |q| self.by_path.contains_key(q)) {
            QueryIntent::ExactPath(path) => {
                let pins = self.exact_pins(&path);
                self.ranked(&path, None, &pins, options, fuzzy)
            }
            QueryIntent::Hook(operation) => {
                let pins = self.exact_pins(&operation);
                self.ranked(&operation, None, &pins, options, fuzzy)
            }
            QueryIntent::Method { method, rest } => {
                let pins = self.exact_pins(&rest);
                let results = self.ranked(&rest, Some(method), &pins, options, fuzzy);
                if results.is_empty() && self.config.method_intent_fallback {
                    debug!(%method, query = %rest, "Method filter matched nothing, falling back");
                    return self.ranked(&rest, None, &pins, options, fuzzy);
                }
                results
            }
            QueryIntent::Free(text) => {
                let pins = self.exact_pins(&text);
                self.ranked(&text, None, &pins, options, fuzzy)
            }
        }
    }

    fn ranked<'a>(
        &'a self,
        text: &str,
        method: Option<HttpMethod>,
        pins: &[&'a Entry],
        options: &SearchOptions,
        fuzzy: f64,
    ) -> Vec<&'a Entry> {
        let filter = |doc: &IndexedDocument| admits(doc, options, method);
        let query = QueryOptions {
            prefix: true,
            fuzzy,
            filter: Some(&filter),
        };
        let hits = match self.index.query(text, &query) {
            Ok(hits) => hits,
            Err(e) => {
                error!(query = %text, error = %e, "Index query failed");
                return Vec::new();
            }
        };

        let max_score = hits.iter().map(|hit| hit.score).fold(0.0, f64::max);
        let now = self.clock.now_ms();

        // Exact matches only reorder the generic result set.
        let pinned: Vec<&Entry> = pins
            .iter()
            .copied()
            .filter(|entry| hits.iter().any(|hit| hit.id == entry.descriptor.id))
            .collect();

        let mut scored: Vec<(&Entry, f64)> = hits
            .into_iter()
            .filter_map(|hit| {
                let Some(entry) = self.table.get(&hit.id) else {
                    debug!(id = %hit.id, "Index hit without descriptor, skipping");
                    return None;
                };
                if pinned.iter().any(|p| p.descriptor.id == hit.id) {
                    return None;
                }
                let relevance = normalize(hit.score, max_score);
                let recency = decay(
                    entry.descriptor.last_accessed,
                    now,
                    self.config.half_life_hours,
                );
                Some((entry, combine(self.config.alpha, relevance, recency)))
            })
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.seq.cmp(&b.0.seq)));

        pinned
            .into_iter()
            .chain(scored.into_iter().map(|(entry, _)| entry))
            .collect()
    }

    /// Descriptors whose path template, operation id or name equals the
    /// query, in insertion order.
    fn exact_pins(&self, query: &str) -> Vec<&Entry> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        let ids = self
            .by_path
            .get(query)
            .or_else(|| self.by_name.get(&query.to_lowercase()));

        let mut entries: Vec<&Entry> = ids
            .into_iter()
            .flatten()
            .filter_map(|id| self.table.get(id))
            .collect();
        entries.sort_by_key(|entry| entry.seq);
        entries
    }

    fn link(&mut self, descriptor: &ResourceDescriptor) {
        for key in lookup_keys(descriptor) {
            let target = match key {
                LookupKey::Path(path) => self.by_path.entry(path),
                LookupKey::Name(name) => self.by_name.entry(name),
            };
            target.or_default().insert(descriptor.id.clone());
        }
    }

    fn unlink(&mut self, descriptor: &ResourceDescriptor) {
        for key in lookup_keys(descriptor) {
            let (map, key) = match key {
                LookupKey::Path(path) => (&mut self.by_path, path),
                LookupKey::Name(name) => (&mut self.by_name, name),
            };
            if let Some(ids) = map.get_mut(&key) {
                ids.remove(&descriptor.id);
                if ids.is_empty() {
                    map.remove(&key);
                }
            }
        }
    }
}

enum LookupKey {
    Path(String),
    Name(String),
}

fn lookup_keys(descriptor: &ResourceDescriptor) -> Vec<LookupKey> {
    let mut keys = vec![LookupKey::Name(descriptor.name.to_lowercase())];
    if let Some(rest) = descriptor.as_rest() {
        keys.push(LookupKey::Path(rest.url.clone()));
        if !rest.operation_id.eq_ignore_ascii_case(&descriptor.name) {
            keys.push(LookupKey::Name(rest.operation_id.to_lowercase()));
        }
    }
    keys
}

fn admits(doc: &IndexedDocument, options: &SearchOptions, method: Option<HttpMethod>) -> bool {
    if options.resource_type.is_some_and(|t| t != doc.resource_type) {
        return false;
    }
    if let Some(source) = &options.source {
        if &doc.source != source {
            return false;
        }
    }
    if let Some(package) = &options.package {
        if doc.package.is_empty() {
            return false;
        }
        let qualified = format!("{}/{}", doc.source, doc.package);
        if !nested_under(&doc.package, package) && !nested_under(&qualified, package) {
            return false;
        }
    }
    if let Some(data_types) = &options.data_types {
        if !doc.data_types.iter().any(|t| data_types.contains(t)) {
            return false;
        }
    }
    if let Some(names) = &options.names {
        if !names.contains(&doc.name) {
            return false;
        }
    }
    for wanted in [options.method, method].into_iter().flatten() {
        if doc.method != Some(wanted) {
            return false;
        }
    }
    true
}

/// Whether `path` equals `package` or sits below it on a `/` boundary.
fn nested_under(path: &str, package: &str) -> bool {
    path.strip_prefix(package)
        .is_some_and(|tail| tail.is_empty() || tail.starts_with('/'))
}
