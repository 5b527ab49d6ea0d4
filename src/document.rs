//! Documents and queries.
//!
//! A [`Document`] is identified by its id alone; the optional vertical type only matters to the
//! vertical-aware leaving constraints. Two documents with the same id compare equal even when
//! their types differ.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Document identifier, unique within a query.
pub type DocId = usize;

/// Content type of a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DocType {
    /// Regular organic result.
    #[default]
    Web,
    /// A vertical result (e.g. `"Image"`, `"News"`); verticals of one type stay contiguous.
    Vertical(String),
}

impl DocType {
    /// Shorthand for `DocType::Vertical(name.into())`.
    pub fn vertical(name: impl Into<String>) -> Self {
        Self::Vertical(name.into())
    }

    pub fn is_web(&self) -> bool {
        matches!(self, Self::Web)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Web => "Web",
            Self::Vertical(name) => name,
        }
    }
}

impl From<&str> for DocType {
    fn from(s: &str) -> Self {
        if s.eq_ignore_ascii_case("web") {
            Self::Web
        } else {
            Self::Vertical(s.to_string())
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single retrievable document.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Document {
    id: DocId,
    doc_type: DocType,
}

impl Document {
    /// A web document.
    pub fn new(id: DocId) -> Self {
        Self {
            id,
            doc_type: DocType::Web,
        }
    }

    /// A document with an explicit content type.
    pub fn with_type(id: DocId, doc_type: impl Into<DocType>) -> Self {
        Self {
            id,
            doc_type: doc_type.into(),
        }
    }

    pub fn id(&self) -> DocId {
        self.id
    }

    pub fn doc_type(&self) -> &DocType {
        &self.doc_type
    }
}

impl From<DocId> for Document {
    fn from(id: DocId) -> Self {
        Self::new(id)
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Document {}

impl Hash for Document {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Document {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Document {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.doc_type {
            DocType::Web => write!(f, "{}", self.id),
            DocType::Vertical(name) => write!(f, "{}:{}", self.id, name),
        }
    }
}

/// Ids of a list of documents, in order.
pub fn doc_ids(list: &[Document]) -> Vec<DocId> {
    list.iter().map(Document::id).collect()
}

/// Position of `doc` in `ranking`, or `ranking.len()` when it is absent.
pub(crate) fn rank_in(ranking: &[Document], doc: &Document) -> usize {
    ranking
        .iter()
        .position(|d| d == doc)
        .unwrap_or(ranking.len())
}

/// A query impression: an id plus the candidate documents rankers order.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Query {
    id: String,
    documents: Vec<Document>,
}

impl Query {
    pub fn new(id: impl Into<String>, documents: Vec<Document>) -> Self {
        Self {
            id: id.into(),
            documents,
        }
    }

    /// A query whose candidates are web documents with the given ids.
    pub fn with_ids(id: impl Into<String>, ids: impl IntoIterator<Item = DocId>) -> Self {
        Self::new(id, ids.into_iter().map(Document::new).collect())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
