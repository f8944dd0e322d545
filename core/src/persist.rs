//! On-disk layout of the forward index (`docs.bin`) and the inverted index
//! (`index.bin`). Every field is encoded explicitly as fixed-width little
//! endian, independent of the in-memory representation.
//!
//! ```text
//! docs.bin   u32 doc_count | doc_count x u64 absolute offset | records
//!            record = u16 url_len, url | u16 title_len, title
//! index.bin  u32 term_count | u64 dict_size | dictionary | postings
//!            entry  = u8 term_len, term | u32 doc_freq | u64 postings_offset
//!            postings = doc_freq x u32 ascending doc ids per entry, in order
//! ```

use crate::error::{IndexError, Result};
use crate::{postings, DictEntry, DocId, DocMeta, Posting, MAX_FIELD_LEN, MAX_TERM_LEN};
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub const DOCS_FILE: &str = "docs.bin";
pub const INDEX_FILE: &str = "index.bin";
pub const META_FILE: &str = "meta.json";

/// `u32 term_count` + `u64 dict_size`.
pub const INDEX_HEADER_LEN: u64 = 12;
/// `u32 doc_count`.
pub const DOCS_HEADER_LEN: u64 = 4;

const DICT_ENTRY_FIXED_LEN: usize = 1 + 4 + 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaFile {
    pub version: u32,
    pub created_at: String,
    pub num_docs: u32,
    pub num_terms: u32,
    pub stats: crate::BuildStats,
}

#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn docs(&self) -> PathBuf { self.root.join(DOCS_FILE) }
    pub fn index(&self) -> PathBuf { self.root.join(INDEX_FILE) }
    pub fn meta(&self) -> PathBuf { self.root.join(META_FILE) }
}

pub fn create_index_dir(paths: &IndexPaths) -> Result<()> {
    fs::create_dir_all(&paths.root)?;
    Ok(())
}

/// A fully written and synced `<file>.tmp` waiting to be renamed over its
/// target. Dropping it without [`commit`](Self::commit) removes the file.
#[derive(Debug)]
pub struct StagedFile {
    tmp: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagedFile {
    pub fn tmp_path(&self) -> &Path {
        &self.tmp
    }

    pub fn commit(mut self) -> Result<()> {
        fs::rename(&self.tmp, &self.target)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.tmp);
        }
    }
}

/// Run `write` against a temporary sibling of `path`. On failure the
/// temporary file is removed and `path` is left untouched.
pub fn stage_file<T, F>(path: &Path, write: F) -> Result<(StagedFile, T)>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<T>,
{
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let staged = StagedFile { tmp: PathBuf::from(tmp), target: path.to_path_buf(), committed: false };

    let f = File::create(&staged.tmp)?;
    let mut w = BufWriter::new(f);
    let value = write(&mut w)?;
    let f = w.into_inner().map_err(|e| e.into_error())?;
    f.sync_all()?;
    Ok((staged, value))
}

/// [`stage_file`] followed by the rename into place.
pub fn write_file_atomically<T, F>(path: &Path, write: F) -> Result<T>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<T>,
{
    let (staged, value) = stage_file(path, write)?;
    staged.commit()?;
    Ok(value)
}

// ---------------------------------------------------------------------------
// forward index
// ---------------------------------------------------------------------------

/// Append a 2-byte length-prefixed field, cut at [`MAX_FIELD_LEN`] bytes.
pub fn encode_field(buf: &mut Vec<u8>, field: &[u8]) {
    let field = &field[..field.len().min(MAX_FIELD_LEN)];
    let mut len = [0u8; 2];
    LittleEndian::write_u16(&mut len, field.len() as u16);
    buf.extend_from_slice(&len);
    buf.extend_from_slice(field);
}

/// Write header, offset table and data region. `offsets` are relative to
/// the data region and are stored as absolute file offsets.
pub fn write_forward_index<W: Write>(w: &mut W, offsets: &[u64], data: &[u8]) -> Result<()> {
    let doc_count = offsets.len() as u32;
    let table_base = DOCS_HEADER_LEN + offsets.len() as u64 * 8;
    w.write_u32::<LittleEndian>(doc_count)?;
    for off in offsets {
        w.write_u64::<LittleEndian>(table_base + off)?;
    }
    w.write_all(data)?;
    Ok(())
}

/// Random access to `(url, title)` by document id.
#[derive(Debug)]
pub struct DocStore {
    path: PathBuf,
    offsets: Vec<u64>,
    file: Mutex<File>,
}

impl DocStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = open_existing(&path)?;
        let file_len = file.metadata()?.len();
        if file_len < DOCS_HEADER_LEN {
            return Err(IndexError::Truncated { file: path, expected: DOCS_HEADER_LEN, actual: file_len });
        }
        let doc_count = file.read_u32::<LittleEndian>()?;
        let data_base = DOCS_HEADER_LEN + doc_count as u64 * 8;
        if file_len < data_base {
            return Err(IndexError::Truncated { file: path, expected: data_base, actual: file_len });
        }
        let mut table = vec![0u8; doc_count as usize * 8];
        file.read_exact(&mut table)?;
        let mut offsets = vec![0u64; doc_count as usize];
        LittleEndian::read_u64_into(&table, &mut offsets);
        if let Some((doc_id, off)) = offsets.iter().enumerate().find(|&(_, &off)| off < data_base || off >= file_len) {
            return Err(IndexError::corrupt(path, format!("offset {off} of document {doc_id} is outside the data region")));
        }
        tracing::debug!(file = %path.display(), doc_count, "opened forward index");
        Ok(Self { path, offsets, file: Mutex::new(file) })
    }

    pub fn doc_count(&self) -> u32 {
        self.offsets.len() as u32
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` for an id outside `[0, doc_count)`.
    pub fn try_get(&self, doc_id: DocId) -> Result<Option<DocMeta>> {
        let Some(&offset) = self.offsets.get(doc_id as usize) else {
            return Ok(None);
        };
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let url = read_field(&mut *file)?;
        let title = read_field(&mut *file)?;
        Ok(Some(DocMeta {
            url: String::from_utf8_lossy(&url).into_owned(),
            title: String::from_utf8_lossy(&title).into_owned(),
        }))
    }
}

fn read_field<R: Read>(r: &mut R) -> io::Result<Vec<u8>> {
    let len = r.read_u16::<LittleEndian>()?;
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

// ---------------------------------------------------------------------------
// inverted index
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvertedSummary {
    pub terms: u32,
    pub postings: u64,
    /// Terms cut to [`MAX_TERM_LEN`] bytes in the dictionary.
    pub truncated_terms: u32,
}

/// Serialize postings already sorted by (term, doc_id) and deduplicated.
///
/// Terms longer than [`MAX_TERM_LEN`] bytes are cut to that length in the
/// dictionary. Two long terms sharing a 255-byte prefix therefore produce two
/// adjacent entries with the same key; the reader merges such runs.
pub fn write_inverted_index<W: Write>(w: &mut W, sorted: &[Posting]) -> Result<InvertedSummary> {
    let mut dict: Vec<u8> = Vec::new();
    let mut post: Vec<u8> = Vec::with_capacity(sorted.len() * 4);
    let mut summary = InvertedSummary::default();

    for group in sorted.chunk_by(|a, b| a.term == b.term) {
        let term = &group[0].term;
        let rel_offset = post.len() as u64;
        for p in group {
            post.write_u32::<LittleEndian>(p.doc_id)?;
        }
        if term.len() > MAX_TERM_LEN {
            summary.truncated_terms += 1;
        }
        let key = &term[..term.len().min(MAX_TERM_LEN)];
        dict.write_u8(key.len() as u8)?;
        dict.write_all(key)?;
        dict.write_u32::<LittleEndian>(group.len() as u32)?;
        dict.write_u64::<LittleEndian>(rel_offset)?;
        summary.terms += 1;
        summary.postings += group.len() as u64;
    }

    w.write_u32::<LittleEndian>(summary.terms)?;
    w.write_u64::<LittleEndian>(dict.len() as u64)?;
    w.write_all(&dict)?;
    w.write_all(&post)?;
    Ok(summary)
}

/// Decode exactly `term_count` entries that together span all of `bytes`.
pub fn decode_dictionary(bytes: &[u8], term_count: u32, file: &Path) -> Result<Vec<DictEntry>> {
    let mut entries = Vec::with_capacity((term_count as usize).min(bytes.len() / DICT_ENTRY_FIXED_LEN));
    let mut cur = Cursor::new(bytes);
    let truncated = || IndexError::corrupt(file, "dictionary entry runs past the dictionary blob");
    while (cur.position() as usize) < bytes.len() {
        let term_len = cur.read_u8().map_err(|_| truncated())? as usize;
        let start = cur.position() as usize;
        if bytes.len() - start < term_len + DICT_ENTRY_FIXED_LEN - 1 {
            return Err(truncated());
        }
        let term = bytes[start..start + term_len].to_vec();
        cur.set_position((start + term_len) as u64);
        let doc_freq = cur.read_u32::<LittleEndian>()?;
        let postings_offset = cur.read_u64::<LittleEndian>()?;
        entries.push(DictEntry { term, doc_freq, postings_offset });
    }
    if entries.len() != term_count as usize {
        return Err(IndexError::corrupt(
            file,
            format!("header declares {term_count} terms, dictionary holds {}", entries.len()),
        ));
    }
    Ok(entries)
}

/// The loaded term dictionary, sorted by term bytes.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    entries: Vec<DictEntry>,
}

impl Dictionary {
    /// Wrap decoded entries, rejecting any that are out of order.
    pub fn new(entries: Vec<DictEntry>, file: &Path) -> Result<Self> {
        if let Some(w) = entries.windows(2).find(|w| w[0].term > w[1].term) {
            return Err(IndexError::corrupt(
                file,
                format!("dictionary not sorted at term {:?}", String::from_utf8_lossy(&w[1].term)),
            ));
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[DictEntry] {
        &self.entries
    }

    /// First entry not less than `term`, if it is equal to `term`.
    pub fn lookup(&self, term: &[u8]) -> Option<&DictEntry> {
        let i = self.entries.partition_point(|e| e.term.as_slice() < term);
        self.entries.get(i).filter(|e| e.term == term)
    }

    /// All entries keyed by `term`. More than one only when distinct long
    /// terms were truncated onto the same key.
    pub fn lookup_all(&self, term: &[u8]) -> &[DictEntry] {
        let lo = self.entries.partition_point(|e| e.term.as_slice() < term);
        let hi = lo + self.entries[lo..].partition_point(|e| e.term == term);
        &self.entries[lo..hi]
    }
}

/// Dictionary in memory, postings read on demand from the open file.
#[derive(Debug)]
pub struct InvertedIndexReader {
    path: PathBuf,
    dictionary: Dictionary,
    postings_base: u64,
    file: Mutex<File>,
}

impl InvertedIndexReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = open_existing(&path)?;
        let file_len = file.metadata()?.len();
        if file_len < INDEX_HEADER_LEN {
            return Err(IndexError::Truncated { file: path, expected: INDEX_HEADER_LEN, actual: file_len });
        }
        let term_count = file.read_u32::<LittleEndian>()?;
        let dict_size = file.read_u64::<LittleEndian>()?;
        let postings_base = INDEX_HEADER_LEN.saturating_add(dict_size);
        if file_len < postings_base {
            return Err(IndexError::Truncated { file: path, expected: postings_base, actual: file_len });
        }
        if term_count as u64 * DICT_ENTRY_FIXED_LEN as u64 > dict_size {
            return Err(IndexError::corrupt(
                &path,
                format!("header declares {term_count} terms, too many for a {dict_size}-byte dictionary"),
            ));
        }
        let mut blob = vec![0u8; dict_size as usize];
        file.read_exact(&mut blob)?;
        let entries = decode_dictionary(&blob, term_count, &path)?;
        drop(blob);

        let postings_len = file_len - postings_base;
        if let Some(e) = entries.iter().find(|e| {
            e.postings_offset
                .checked_add(e.doc_freq as u64 * 4)
                .map_or(true, |end| end > postings_len)
        }) {
            return Err(IndexError::corrupt(
                &path,
                format!("postings of {:?} overrun the postings region", String::from_utf8_lossy(&e.term)),
            ));
        }
        let dictionary = Dictionary::new(entries, &path)?;
        tracing::debug!(file = %path.display(), terms = dictionary.len(), postings_base, "opened inverted index");
        Ok(Self { path, dictionary, postings_base, file: Mutex::new(file) })
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn postings_base(&self) -> u64 {
        self.postings_base
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Document ids of one dictionary entry.
    pub fn read_postings(&self, entry: &DictEntry) -> Result<Vec<DocId>> {
        let mut buf = vec![0u8; entry.doc_freq as usize * 4];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(self.postings_base + entry.postings_offset))?;
            file.read_exact(&mut buf)?;
        }
        let mut ids = vec![0u32; entry.doc_freq as usize];
        LittleEndian::read_u32_into(&buf, &mut ids);
        Ok(ids)
    }

    /// Postings for an already folded term; empty when the term is unknown.
    pub fn get_postings(&self, term: &[u8]) -> Result<Vec<DocId>> {
        let key = &term[..term.len().min(MAX_TERM_LEN)];
        let mut out: Vec<DocId> = Vec::new();
        for entry in self.dictionary.lookup_all(key) {
            let ids = self.read_postings(entry)?;
            out = if out.is_empty() { ids } else { postings::union(&out, &ids) };
        }
        Ok(out)
    }
}

fn open_existing(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => IndexError::Missing(path.to_path_buf()),
        _ => IndexError::Io(e),
    })
}

// ---------------------------------------------------------------------------
// meta.json
// ---------------------------------------------------------------------------

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_index_dir(paths)?;
    write_file_atomically(&paths.meta(), |w| Ok(serde_json::to_writer_pretty(w, meta)?))
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let buf = fs::read_to_string(paths.meta())?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}
