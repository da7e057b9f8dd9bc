//! In-RAM tantivy index over [`IndexedDocument`]s.
//!
//! Every text field is pre-tokenized by [`tokenize`] and handed to tantivy as
//! space-separated terms behind a whitespace analyzer, so index terms and
//! query terms always agree. Exact terms score by tantivy's BM25 with a
//! per-field boost; prefix and fuzzy expansions add a constant weight per
//! field they match in.

use std::collections::HashMap;
use std::fmt;

use tantivy::collector::TopDocs;
use tantivy::query::{
    BooleanQuery, BoostQuery, ConstScoreQuery, FuzzyTermQuery, Occur, Query, TermQuery,
};
use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, Value, STORED, STRING,
};
use tantivy::tokenizer::{TextAnalyzer, WhitespaceTokenizer};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tracing::warn;

use crate::descriptor::{HttpMethod, ResourceDescriptor, ResourceType};

use super::tokenizer::{tokenize, tokenize_query};
use super::SearchResult;

/// Value of every document's catch-all field, and the query that matches it.
pub const ALL_SENTINEL: &str = "__all__";

/// Upper bound on the edit distance a fuzzy query may use. Tantivy builds
/// Levenshtein automata up to this distance.
pub const MAX_FUZZY_DISTANCE: u8 = 2;

const TOKENIZER: &str = "apiforge_terms";
const WRITER_HEAP_BYTES: usize = 20_000_000;

const PREFIX_WEIGHT: f32 = 0.375;
const FUZZY_WEIGHT: f32 = 0.45;

/// Text fields of an indexed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum DocField {
    Name,
    OperationId,
    Method,
    Package,
    Url,
    Summary,
    Description,
    DataTypes,
}

impl DocField {
    const ALL: [Self; 8] = [
        Self::Name,
        Self::OperationId,
        Self::Method,
        Self::Package,
        Self::Url,
        Self::Summary,
        Self::Description,
        Self::DataTypes,
    ];

    const fn slot(self) -> usize {
        self as usize
    }

    const fn schema_name(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::OperationId => "operation_id",
            Self::Method => "method",
            Self::Package => "package",
            Self::Url => "url",
            Self::Summary => "summary",
            Self::Description => "description",
            Self::DataTypes => "data_types",
        }
    }
}

/// Per-field score multipliers.
///
/// Identifier fields must outrank prose: a user typing `user` expects
/// `getUser` before an operation whose description mentions users.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub struct FieldBoosts {
    pub name: f32,
    pub operation_id: f32,
    pub method: f32,
    pub package: f32,
    pub url: f32,
    pub summary: f32,
    pub description: f32,
    pub data_types: f32,
    /// Catch-all field, only consulted by the list-everything query.
    pub all: f32,
}

impl Default for FieldBoosts {
    fn default() -> Self {
        Self {
            name: 3.0,
            operation_id: 3.0,
            method: 1.5,
            package: 1.0,
            url: 1.5,
            summary: 2.0,
            description: 1.0,
            data_types: 1.0,
            all: 0.1,
        }
    }
}

impl FieldBoosts {
    const fn get(&self, field: DocField) -> f32 {
        match field {
            DocField::Name => self.name,
            DocField::OperationId => self.operation_id,
            DocField::Method => self.method,
            DocField::Package => self.package,
            DocField::Url => self.url,
            DocField::Summary => self.summary,
            DocField::Description => self.description,
            DocField::DataTypes => self.data_types,
        }
    }
}

/// Flattened, denormalized projection of a descriptor.
///
/// Filters run against this shape only, never against the descriptor table.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub struct IndexedDocument {
    pub id: String,
    pub resource_type: ResourceType,
    pub source: String,
    pub name: String,
    pub method: Option<HttpMethod>,
    pub package: String,
    pub operation_id: Option<String>,
    pub url: Option<String>,
    pub summary: String,
    pub description: String,
    pub all: &'static str,
    pub data_types: Vec<String>,
}

impl IndexedDocument {
    /// Project a descriptor into its indexable fields.
    #[must_use]
    pub fn from_descriptor(descriptor: &ResourceDescriptor) -> Self {
        let rest = descriptor.as_rest();
        Self {
            id: descriptor.id.clone(),
            resource_type: descriptor.resource_type(),
            source: descriptor.source.clone(),
            name: descriptor.name.clone(),
            method: rest.map(|r| r.method),
            package: descriptor.package(),
            operation_id: rest.map(|r| r.operation_id.clone()),
            url: rest.map(|r| r.url.clone()),
            summary: rest.map(|r| r.summary.clone()).unwrap_or_default(),
            description: rest.map(|r| r.description.clone()).unwrap_or_default(),
            all: ALL_SENTINEL,
            data_types: descriptor.data_types(),
        }
    }

    fn text(&self, field: DocField) -> String {
        match field {
            DocField::Name => self.name.clone(),
            DocField::OperationId => self.operation_id.clone().unwrap_or_default(),
            DocField::Method => self.method.map(|m| m.as_str().to_string()).unwrap_or_default(),
            DocField::Package => self.package.clone(),
            DocField::Url => self.url.clone().unwrap_or_default(),
            DocField::Summary => self.summary.clone(),
            DocField::Description => self.description.clone(),
            DocField::DataTypes => self.data_types.join(" "),
        }
    }
}

/// A ranked match.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    /// Descriptor id.
    pub id: String,
    /// Positive textual relevance.
    pub score: f64,
}

/// Predicate over stored documents.
pub type DocumentFilter<'a> = &'a dyn Fn(&IndexedDocument) -> bool;

/// Options for [`TextIndex::query`].
#[derive(Clone, Copy, Default)]
pub struct QueryOptions<'a> {
    /// Let the trailing query token match any term it prefixes.
    pub prefix: bool,
    /// Edit-distance tolerance in `[0, 1]`, relative to term length.
    pub fuzzy: f64,
    /// Candidate predicate, evaluated once per document.
    pub filter: Option<DocumentFilter<'a>>,
}

#[derive(Clone, Copy)]
struct Fields {
    id: Field,
    all: Field,
    text: [Field; DocField::ALL.len()],
}

/// Field-weighted text index with prefix and fuzzy expansion.
///
/// Every mutation commits and reloads the reader before returning, so a
/// query never sees a partially applied change.
pub struct TextIndex {
    boosts: FieldBoosts,
    fields: Fields,
    writer: IndexWriter,
    reader: IndexReader,
    documents: HashMap<String, IndexedDocument>,
}

impl fmt::Debug for TextIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextIndex")
            .field("boosts", &self.boosts)
            .field("documents", &self.documents.len())
            .finish_non_exhaustive()
    }
}

impl TextIndex {
    /// Create an empty in-RAM index with the given field boosts.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Index`](super::SearchError::Index) if tantivy
    /// cannot start a writer or reader.
    pub fn new(boosts: FieldBoosts) -> SearchResult<Self> {
        let (schema, fields) = build_schema();
        let index = Index::create_in_ram(schema);
        index.tokenizers().register(
            TOKENIZER,
            TextAnalyzer::builder(WhitespaceTokenizer::default()).build(),
        );

        let writer = index.writer_with_num_threads(1, WRITER_HEAP_BYTES)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Self {
            boosts,
            fields,
            writer,
            reader,
            documents: HashMap::new(),
        })
    }

    /// Number of indexed documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether the index holds no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Whether a document with this id is indexed.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.documents.contains_key(id)
    }

    /// The stored projection for an id.
    #[must_use]
    pub fn document(&self, id: &str) -> Option<&IndexedDocument> {
        self.documents.get(id)
    }

    /// Insert a document, replacing any document with the same id.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Index`](super::SearchError::Index) if the
    /// commit fails; the index is left as it was.
    pub fn index(&mut self, doc: IndexedDocument) -> SearchResult<()> {
        self.apply(&[], vec![doc])
    }

    /// Delete a document. Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Index`](super::SearchError::Index) if the
    /// commit fails.
    pub fn remove(&mut self, id: &str) -> SearchResult<()> {
        self.apply(&[id.to_string()], Vec::new())
    }

    /// Delete `remove` and upsert `insert` in one commit.
    ///
    /// A document identical to the one already stored under its id is not
    /// rewritten, which keeps repeated loads from skewing term statistics.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Index`](super::SearchError::Index) if the
    /// commit fails; the index is left as it was.
    pub fn apply(&mut self, remove: &[String], insert: Vec<IndexedDocument>) -> SearchResult<()> {
        let remove: Vec<&String> = remove
            .iter()
            .filter(|id| self.documents.contains_key(id.as_str()))
            .collect();
        let insert: Vec<IndexedDocument> = insert
            .into_iter()
            .filter(|doc| remove.contains(&&doc.id) || self.documents.get(&doc.id) != Some(doc))
            .collect();
        if remove.is_empty() && insert.is_empty() {
            return Ok(());
        }

        for id in &remove {
            let term = Term::from_field_text(self.fields.id, id);
            self.writer.delete_term(term);
        }
        for doc in &insert {
            let term = Term::from_field_text(self.fields.id, &doc.id);
            self.writer.delete_term(term);
            self.writer.add_document(self.to_tantivy(doc))?;
        }
        self.publish()?;

        for id in remove {
            self.documents.remove(id.as_str());
        }
        for doc in insert {
            self.documents.insert(doc.id.clone(), doc);
        }
        Ok(())
    }

    /// Drop every document.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Index`](super::SearchError::Index) if the
    /// commit fails.
    pub fn remove_all(&mut self) -> SearchResult<()> {
        self.writer.delete_all_documents()?;
        self.publish()?;
        self.documents.clear();
        Ok(())
    }

    /// Rank documents against `text`.
    ///
    /// Empty or whitespace-only text is the sentinel query and matches every
    /// document that passes the filter. Text that yields no terms matches
    /// nothing. Hits are ordered by score, ties by id.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Index`](super::SearchError::Index) if tantivy
    /// fails to execute the query or load a stored document.
    pub fn query(&self, text: &str, options: &QueryOptions<'_>) -> SearchResult<Vec<IndexHit>> {
        let text = text.trim();
        let query = if text.is_empty() || text == ALL_SENTINEL {
            self.match_all()
        } else {
            let terms = tokenize_query(text);
            if terms.is_empty() {
                return Ok(Vec::new());
            }
            self.match_terms(&terms, options)
        };

        let searcher = self.reader.searcher();
        let limit = usize::try_from(searcher.num_docs())
            .unwrap_or(usize::MAX)
            .max(1);
        let top = searcher.search(query.as_ref(), &TopDocs::with_limit(limit))?;

        let mut hits = Vec::with_capacity(top.len());
        for (score, address) in top {
            let stored: TantivyDocument = searcher.doc(address)?;
            let Some(doc) = stored
                .get_first(self.fields.id)
                .and_then(|value| value.as_str())
                .and_then(|id| self.documents.get(id))
            else {
                continue;
            };
            if options.filter.is_some_and(|admit| !admit(doc)) {
                continue;
            }
            hits.push(IndexHit {
                id: doc.id.clone(),
                score: f64::from(score),
            });
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        Ok(hits)
    }

    fn match_all(&self) -> Box<dyn Query> {
        let sentinel = TermQuery::new(
            Term::from_field_text(self.fields.all, ALL_SENTINEL),
            IndexRecordOption::Basic,
        );
        Box::new(ConstScoreQuery::new(Box::new(sentinel), self.boosts.all))
    }

    /// One clause per term and field: BM25 on the exact term, a constant
    /// for prefix matches of the trailing term and one constant per fuzzy
    /// level, so closer spellings accumulate more weight.
    fn match_terms(&self, terms: &[String], options: &QueryOptions<'_>) -> Box<dyn Query> {
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();

        for (position, text) in terms.iter().enumerate() {
            let trailing = position + 1 == terms.len();
            let distance = fuzzy_distance(text.chars().count(), options.fuzzy);

            for field in DocField::ALL {
                let boost = self.boosts.get(field);
                let term = Term::from_field_text(self.fields.text[field.slot()], text);

                let exact = TermQuery::new(term.clone(), IndexRecordOption::WithFreqs);
                clauses.push(boosted(exact, boost));

                if options.prefix && trailing {
                    let prefix = FuzzyTermQuery::new_prefix(term.clone(), 0, true);
                    clauses.push(boosted(prefix, PREFIX_WEIGHT * boost));
                }

                for level in 1..=distance {
                    let fuzzy = FuzzyTermQuery::new(term.clone(), level, true);
                    clauses.push(boosted(fuzzy, FUZZY_WEIGHT * boost / f32::from(distance)));
                }
            }
        }

        Box::new(BooleanQuery::new(clauses))
    }

    fn to_tantivy(&self, doc: &IndexedDocument) -> TantivyDocument {
        let mut out = TantivyDocument::default();
        out.add_text(self.fields.id, &doc.id);
        out.add_text(self.fields.all, doc.all);

        for field in DocField::ALL {
            let terms = tokenize(&doc.text(field));
            if !terms.is_empty() {
                out.add_text(self.fields.text[field.slot()], terms.join(" "));
            }
        }
        out
    }

    fn publish(&mut self) -> SearchResult<()> {
        if let Err(e) = self.writer.commit() {
            if let Err(rollback) = self.writer.rollback() {
                warn!(error = %rollback, "Index rollback failed");
            }
            return Err(e.into());
        }
        self.reader.reload()?;
        Ok(())
    }
}

fn build_schema() -> (Schema, Fields) {
    let mut builder = Schema::builder();
    let id = builder.add_text_field("id", STRING | STORED);
    let all = builder.add_text_field("all", STRING);

    let terms = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer(TOKENIZER)
            .set_index_option(IndexRecordOption::WithFreqs),
    );
    let text = DocField::ALL.map(|field| builder.add_text_field(field.schema_name(), terms.clone()));

    (builder.build(), Fields { id, all, text })
}

fn boosted(query: impl Query, boost: f32) -> (Occur, Box<dyn Query>) {
    (Occur::Should, Box::new(BoostQuery::new(Box::new(query), boost)))
}

/// Maximum edit distance for a term of `len` characters at tolerance
/// `fuzzy`.
fn fuzzy_distance(len: usize, fuzzy: f64) -> u8 {
    if fuzzy.is_nan() || fuzzy <= 0.0 {
        return 0;
    }
    let scaled = (len as f64 * fuzzy.min(1.0)).round();
    if scaled >= f64::from(MAX_FUZZY_DISTANCE) {
        MAX_FUZZY_DISTANCE
    } else {
        scaled as u8
    }
}
