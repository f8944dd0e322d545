use crate::error::{IndexError, Result};
use crate::persist::{DocStore, IndexPaths, InvertedIndexReader};
use crate::query::{self, PostingSource, QueryToken};
use crate::tokenizer::normalize;
use crate::{DictEntry, DocId, DocMeta};
use serde::Serialize;
use std::path::Path;
use std::time::{Duration, Instant};

/// Query-time view of a built index: the dictionary in memory, both files
/// kept open for positioned reads.
///
/// Each file handle sits behind its own mutex, so one engine can be shared
/// between threads; reads against the same file are serialised.
#[derive(Debug)]
pub struct SearchEngine {
    index: InvertedIndexReader,
    docs: DocStore,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub url: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub total_hits: usize,
    #[serde(skip)]
    pub took: Duration,
    pub offset: usize,
    pub hits: Vec<SearchHit>,
}

impl SearchEngine {
    pub fn open(paths: &IndexPaths) -> Result<Self> {
        Self::open_files(paths.docs(), paths.index())
    }

    pub fn open_files<P: AsRef<Path>, Q: AsRef<Path>>(docs: P, index: Q) -> Result<Self> {
        let docs = DocStore::open(docs)?;
        let index = InvertedIndexReader::open(index)?;
        tracing::info!(
            terms = index.dictionary().len(),
            docs = docs.doc_count(),
            postings_base = index.postings_base(),
            "search engine ready"
        );
        Ok(Self { index, docs })
    }

    pub fn total_docs(&self) -> u32 {
        self.docs.doc_count()
    }

    pub fn term_count(&self) -> usize {
        self.index.dictionary().len()
    }

    /// Dictionary entry for a raw query term (case-folded before the search).
    pub fn lookup(&self, term: &str) -> Option<&DictEntry> {
        let key = normalize(term.as_bytes());
        let key = &key[..key.len().min(crate::MAX_TERM_LEN)];
        self.index.dictionary().lookup(key)
    }

    /// Ascending ids of documents containing `term`; empty if unknown.
    ///
    /// A list naming a document past the end of the forward index means the
    /// two files come from different builds, and is reported as corrupt.
    pub fn get_postings(&self, term: &str) -> Result<Vec<DocId>> {
        let ids = self.index.get_postings(&normalize(term.as_bytes()))?;
        match ids.last() {
            Some(&last) if last >= self.docs.doc_count() => Err(IndexError::corrupt(
                self.index.path(),
                format!(
                    "postings of {term:?} name document {last}, but {} holds {} documents",
                    self.docs.path().display(),
                    self.docs.doc_count()
                ),
            )),
            _ => Ok(ids),
        }
    }

    pub fn to_postfix(&self, query: &str) -> Vec<QueryToken> {
        query::compile(query)
    }

    /// Evaluate a boolean query. Results are ascending document ids.
    pub fn execute_query(&self, query: &str) -> Result<Vec<DocId>> {
        let postfix = query::compile(query);
        tracing::debug!(query, postfix = %query::format_postfix(&postfix), "evaluating");
        query::evaluate(&postfix, self)
    }

    /// `(url, title)` of a document; empty strings for an unknown id or an
    /// unreadable record.
    pub fn get_document(&self, doc_id: DocId) -> DocMeta {
        match self.docs.try_get(doc_id) {
            Ok(meta) => meta.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(doc_id, error = %e, "failed to read document");
                DocMeta::default()
            }
        }
    }

    /// Like [`get_document`](Self::get_document) but reports both cases.
    pub fn try_get_document(&self, doc_id: DocId) -> Result<Option<DocMeta>> {
        self.docs.try_get(doc_id)
    }

    /// Evaluate `query` and resolve `limit` hits starting at `offset`.
    /// `took` covers evaluation only, not document lookups.
    pub fn search(&self, query: &str, offset: usize, limit: usize) -> Result<SearchPage> {
        let start = Instant::now();
        let ids = self.execute_query(query)?;
        let took = start.elapsed();

        let mut hits = Vec::with_capacity(limit.min(ids.len()));
        for &doc_id in ids.iter().skip(offset).take(limit) {
            let meta = self.try_get_document(doc_id)?.unwrap_or_default();
            hits.push(SearchHit { doc_id, url: meta.url, title: meta.title.replace('\n', " ") });
        }
        Ok(SearchPage { total_hits: ids.len(), took, offset, hits })
    }
}

impl PostingSource for SearchEngine {
    fn postings(&self, term: &str) -> Result<Vec<DocId>> {
        self.get_postings(term)
    }

    fn total_docs(&self) -> u32 {
        self.docs.doc_count()
    }
}
