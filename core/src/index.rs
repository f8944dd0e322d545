use crate::error::Result;
use crate::persist::{self, IndexPaths};
use crate::tokenizer::{char_count, tokenize};
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::time::Instant;

pub type DocId = u32;
/// A case-folded token. Raw bytes: the corpus is not guaranteed to be UTF-8.
pub type Term = Vec<u8>;

/// Longest term the dictionary can hold (1-byte length prefix).
pub const MAX_TERM_LEN: usize = u8::MAX as usize;
/// Longest url or title the forward index can hold (2-byte length prefix).
pub const MAX_FIELD_LEN: usize = u16::MAX as usize;

/// How often the builder reports progress while scanning a corpus.
const PROGRESS_EVERY: u32 = 2000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocMeta {
    pub url: String,
    pub title: String,
}

/// One dictionary row: the term, how many documents contain it, and where
/// its document ids start relative to the postings region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictEntry {
    pub term: Term,
    pub doc_freq: u32,
    pub postings_offset: u64,
}

/// Presence of `term` in `doc_id`. Ordering is (term, doc_id), which is the
/// order the inverted index is written in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Posting {
    pub term: Term,
    pub doc_id: DocId,
}

/// A corpus line split into its fields: `<id>\t<url>\t<title>\t<body>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record<'a> {
    pub url: &'a [u8],
    pub title: &'a [u8],
    pub body: &'a [u8],
}

impl<'a> Record<'a> {
    /// Returns `None` unless the line has at least three tabs. The body keeps
    /// any further tabs.
    pub fn parse(line: &'a [u8]) -> Option<Self> {
        let mut fields = line.splitn(4, |&b| b == b'\t');
        let _external_id = fields.next()?;
        let url = fields.next()?;
        let title = fields.next()?;
        let body = fields.next()?;
        Some(Record { url, title, body })
    }
}

/// Accumulates `(term, doc_id)` pairs for the whole corpus.
#[derive(Debug, Default)]
pub struct PostingsCollector {
    pairs: Vec<Posting>,
}

impl PostingsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, term: Term, doc_id: DocId) {
        self.pairs.push(Posting { term, doc_id });
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Sort by (term, doc_id) and collapse repeated occurrences of a term
    /// within one document into a single posting.
    pub fn into_sorted(mut self) -> Vec<Posting> {
        self.pairs.sort_unstable();
        self.pairs.dedup();
        self.pairs
    }
}

/// In-memory image of the forward index: relative record offsets plus the
/// encoded `(url, title)` records.
#[derive(Debug, Default)]
pub struct ForwardIndexBuilder {
    offsets: Vec<u64>,
    data: Vec<u8>,
}

impl ForwardIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a document and return its id. Fields longer than
    /// [`MAX_FIELD_LEN`] bytes are cut at that length.
    pub fn push(&mut self, url: &[u8], title: &[u8]) -> DocId {
        let doc_id = self.offsets.len() as DocId;
        self.offsets.push(self.data.len() as u64);
        persist::encode_field(&mut self.data, url);
        persist::encode_field(&mut self.data, title);
        doc_id
    }

    pub fn doc_count(&self) -> u32 {
        self.offsets.len() as u32
    }

    /// Offsets relative to the start of the data region.
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Counters gathered while building, reported once the index is on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildStats {
    pub documents: u32,
    pub skipped_records: u64,
    pub tokens: u64,
    pub postings: u64,
    pub terms: u32,
    pub truncated_terms: u32,
    pub body_bytes: u64,
    pub token_chars: u64,
    pub elapsed_secs: f64,
}

impl BuildStats {
    pub fn avg_ms_per_doc(&self) -> f64 {
        if self.documents == 0 {
            return 0.0;
        }
        self.elapsed_secs * 1000.0 / self.documents as f64
    }

    pub fn kb_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.body_bytes as f64 / 1024.0 / self.elapsed_secs
    }

    pub fn avg_token_chars(&self) -> f64 {
        if self.tokens == 0 {
            return 0.0;
        }
        self.token_chars as f64 / self.tokens as f64
    }
}

/// Owns everything the build accumulates: the forward index image, the
/// collected postings and the running counters.
#[derive(Debug)]
pub struct IndexBuilder {
    forward: ForwardIndexBuilder,
    postings: PostingsCollector,
    stats: BuildStats,
    started: Instant,
}

impl Default for IndexBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self {
            forward: ForwardIndexBuilder::new(),
            postings: PostingsCollector::new(),
            stats: BuildStats::default(),
            started: Instant::now(),
        }
    }

    pub fn doc_count(&self) -> u32 {
        self.forward.doc_count()
    }

    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    /// Index one corpus line. Lines with fewer than three tabs are skipped
    /// and `None` is returned.
    pub fn add_line(&mut self, line: &[u8]) -> Option<DocId> {
        match Record::parse(line) {
            Some(rec) => Some(self.add_document(rec.url, rec.title, rec.body)),
            None => {
                self.stats.skipped_records += 1;
                None
            }
        }
    }

    pub fn add_document(&mut self, url: &[u8], title: &[u8], body: &[u8]) -> DocId {
        let doc_id = self.forward.push(url, title);
        self.stats.body_bytes += body.len() as u64;
        for token in tokenize(body) {
            self.stats.tokens += 1;
            self.stats.token_chars += char_count(&token) as u64;
            self.postings.add(token, doc_id);
        }
        self.stats.documents = self.forward.doc_count();
        doc_id
    }

    /// Stream every line of `reader` into the builder.
    pub fn ingest<R: BufRead>(&mut self, mut reader: R) -> Result<()> {
        let mut line = Vec::new();
        let mut line_no: u64 = 0;
        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            line_no += 1;
            let mut content = line.as_slice();
            content = content.strip_suffix(b"\n").unwrap_or(content);
            content = content.strip_suffix(b"\r").unwrap_or(content);
            if content.is_empty() {
                continue;
            }
            match self.add_line(content) {
                Some(doc_id) if (doc_id + 1) % PROGRESS_EVERY == 0 => {
                    tracing::info!(docs_processed = doc_id + 1, "indexing");
                }
                Some(_) => {}
                None => tracing::debug!(line_no, "skipping record with fewer than three fields"),
            }
        }
        Ok(())
    }

    /// Write the forward and inverted index files and return the final
    /// counters.
    pub fn finish(self, paths: &IndexPaths) -> Result<BuildStats> {
        let IndexBuilder { forward, postings, mut stats, started } = self;
        persist::create_index_dir(paths)?;
        let (docs_file, ()) = persist::stage_file(&paths.docs(), |w| {
            persist::write_forward_index(w, forward.offsets(), forward.data())
        })?;
        drop(forward);

        tracing::info!(pairs = postings.len(), "sorting postings");
        let sorted = postings.into_sorted();
        let (index_file, summary) = persist::stage_file(&paths.index(), |w| {
            persist::write_inverted_index(w, &sorted)
        })?;
        // both files are complete before either replaces the previous pair
        docs_file.commit()?;
        index_file.commit()?;
        stats.postings = sorted.len() as u64;
        stats.terms = summary.terms;
        stats.truncated_terms = summary.truncated_terms;
        stats.elapsed_secs = started.elapsed().as_secs_f64();
        Ok(stats)
    }
}
