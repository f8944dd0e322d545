use std::fs;
use tabsearch_core::persist::{load_meta, save_meta, IndexPaths, InvertedIndexReader, MetaFile};
use tabsearch_core::{DocId, DocMeta, IndexBuilder, IndexError, SearchEngine, MAX_TERM_LEN};
use tempfile::tempdir;

const CORPUS: &str = "1\thttp://a\tTitle A\tthe cat sat\n\
                      2\thttp://b\tTitle B\tthe dog sat\n\
                      3\thttp://c\tTitle C\tcats and dogs\n";

fn build(corpus: &[u8], dir: &std::path::Path) -> IndexPaths {
    let paths = IndexPaths::new(dir);
    let mut builder = IndexBuilder::new();
    builder.ingest(corpus).unwrap();
    builder.finish(&paths).unwrap();
    paths
}

fn postings_of(engine: &SearchEngine, term: &str) -> Vec<DocId> {
    engine.get_postings(term).unwrap()
}

#[test]
fn three_document_scenario() {
    let dir = tempdir().unwrap();
    let paths = build(CORPUS.as_bytes(), dir.path());
    let engine = SearchEngine::open(&paths).unwrap();

    assert_eq!(engine.total_docs(), 3);
    assert_eq!(engine.term_count(), 7);
    assert_eq!(postings_of(&engine, "cat"), vec![0]);
    assert_eq!(postings_of(&engine, "sat"), vec![0, 1]);
    assert_eq!(postings_of(&engine, "the"), vec![0, 1]);
    assert_eq!(postings_of(&engine, "dog"), vec![1]);
    assert_eq!(postings_of(&engine, "cats"), vec![2]);
    assert_eq!(postings_of(&engine, "and"), vec![2]);
    assert_eq!(postings_of(&engine, "dogs"), vec![2]);

    assert_eq!(engine.execute_query("cat").unwrap(), vec![0]);
    assert_eq!(engine.execute_query("sat || dog").unwrap(), vec![0, 1]);
    assert_eq!(engine.execute_query("sat && !dog").unwrap(), vec![0]);
    assert_eq!(engine.execute_query("the sat").unwrap(), vec![0, 1]);
    assert_eq!(engine.execute_query("!the").unwrap(), vec![2]);
}

#[test]
fn query_terms_are_case_folded() {
    let dir = tempdir().unwrap();
    let paths = build(CORPUS.as_bytes(), dir.path());
    let engine = SearchEngine::open(&paths).unwrap();
    assert_eq!(engine.execute_query("CAT || Dogs").unwrap(), vec![0, 2]);
    assert_eq!(engine.lookup("SAT").map(|e| e.doc_freq), Some(2));
    assert!(engine.lookup("bird").is_none());
    assert!(engine.execute_query("bird").unwrap().is_empty());
}

#[test]
fn documents_round_trip() {
    let dir = tempdir().unwrap();
    let paths = build(CORPUS.as_bytes(), dir.path());
    let engine = SearchEngine::open(&paths).unwrap();
    assert_eq!(engine.get_document(1), DocMeta { url: "http://b".into(), title: "Title B".into() });
    assert_eq!(engine.get_document(3), DocMeta::default());
    assert!(engine.try_get_document(3).unwrap().is_none());
}

#[test]
fn search_pages_results() {
    let dir = tempdir().unwrap();
    let paths = build(CORPUS.as_bytes(), dir.path());
    let engine = SearchEngine::open(&paths).unwrap();
    let page = engine.search("sat || cats", 1, 1).unwrap();
    assert_eq!(page.total_hits, 3);
    assert_eq!(page.hits.len(), 1);
    assert_eq!(page.hits[0].doc_id, 1);
    assert_eq!(page.hits[0].url, "http://b");
    assert!(engine.search("sat", 10, 5).unwrap().hits.is_empty());
}

#[test]
fn malformed_records_are_skipped() {
    let corpus = "1\thttp://a\tA\tapple\nno tabs here\n2\thttp://b\tonly two\n3\thttp://c\tC\tapple pie\n";
    let dir = tempdir().unwrap();
    let paths = IndexPaths::new(dir.path());
    let mut builder = IndexBuilder::new();
    builder.ingest(corpus.as_bytes()).unwrap();
    let stats = builder.finish(&paths).unwrap();
    assert_eq!(stats.documents, 2);
    assert_eq!(stats.skipped_records, 2);
    assert_eq!(stats.terms, 2);
    assert_eq!(stats.postings, 3);

    let engine = SearchEngine::open(&paths).unwrap();
    assert_eq!(engine.execute_query("apple").unwrap(), vec![0, 1]);
    assert_eq!(engine.get_document(1).url, "http://c");
}

#[test]
fn repeated_terms_collapse_to_one_posting() {
    let dir = tempdir().unwrap();
    let paths = build(b"1\tu\tt\tspam spam SPAM eggs\n", dir.path());
    let engine = SearchEngine::open(&paths).unwrap();
    assert_eq!(engine.lookup("spam").map(|e| e.doc_freq), Some(1));
    assert_eq!(postings_of(&engine, "spam"), vec![0]);
}

#[test]
fn empty_corpus_builds_a_usable_index() {
    let dir = tempdir().unwrap();
    let paths = build(b"", dir.path());
    let engine = SearchEngine::open(&paths).unwrap();
    assert_eq!(engine.total_docs(), 0);
    assert!(engine.execute_query("!anything").unwrap().is_empty());
}

#[test]
fn aliased_long_terms_share_one_key() {
    let prefix = "x".repeat(MAX_TERM_LEN);
    let corpus = format!("1\tu0\tt0\t{prefix}a\n2\tu1\tt1\t{prefix}b\n3\tu2\tt2\tother\n");
    let dir = tempdir().unwrap();
    let paths = build(corpus.as_bytes(), dir.path());

    let reader = InvertedIndexReader::open(paths.index()).unwrap();
    assert_eq!(reader.dictionary().len(), 3);
    assert_eq!(reader.dictionary().lookup_all(prefix.as_bytes()).len(), 2);

    let engine = SearchEngine::open(&paths).unwrap();
    assert_eq!(engine.execute_query(&format!("{prefix}a")).unwrap(), vec![0, 1]);
    assert_eq!(engine.execute_query(&prefix).unwrap(), vec![0, 1]);
}

#[test]
fn missing_files_are_fatal() {
    let dir = tempdir().unwrap();
    let err = SearchEngine::open(&IndexPaths::new(dir.path())).unwrap_err();
    assert!(matches!(err, IndexError::Missing(_)));
}

#[test]
fn truncated_index_is_rejected() {
    let dir = tempdir().unwrap();
    let paths = build(CORPUS.as_bytes(), dir.path());
    let bytes = fs::read(paths.index()).unwrap();
    fs::write(paths.index(), &bytes[..20]).unwrap();
    let err = SearchEngine::open(&paths).unwrap_err();
    assert!(matches!(err, IndexError::Truncated { .. }));

    fs::write(paths.docs(), [5u8, 0, 0, 0]).unwrap();
    let err = SearchEngine::open(&paths).unwrap_err();
    assert!(matches!(err, IndexError::Truncated { .. }));
}

#[test]
fn oversized_term_count_is_corrupt() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.bin");
    let mut header = u32::MAX.to_le_bytes().to_vec();
    header.extend_from_slice(&0u64.to_le_bytes());
    fs::write(&path, &header).unwrap();
    let err = InvertedIndexReader::open(&path).unwrap_err();
    assert!(matches!(err, IndexError::Corrupt { .. }));
}

#[test]
fn failed_rebuild_keeps_previous_pair() {
    let dir = tempdir().unwrap();
    let paths = build(b"1	http://a	A	the cat
2	http://b	B	the dog
", dir.path());
    fs::create_dir(dir.path().join("index.bin.tmp")).unwrap();

    let mut builder = IndexBuilder::new();
    builder.ingest(&b"1	http://z	Z	zebra
"[..]).unwrap();
    assert!(builder.finish(&paths).is_err());
    assert!(!dir.path().join("docs.bin.tmp").exists());

    let engine = SearchEngine::open(&paths).unwrap();
    assert_eq!(engine.total_docs(), 2);
    assert_eq!(postings_of(&engine, "dog"), vec![1]);
    assert_eq!(engine.get_document(1).url, "http://b");
    assert!(postings_of(&engine, "zebra").is_empty());
}

#[test]
fn mismatched_files_are_reported_as_corrupt() {
    let big = tempdir().unwrap();
    let small = tempdir().unwrap();
    let big = build(b"1	http://a	A	the cat
2	http://b	B	the dog
", big.path());
    let small = build(b"1	http://a	A	the cat
", small.path());

    let engine = SearchEngine::open_files(small.docs(), big.index()).unwrap();
    assert_eq!(postings_of(&engine, "cat"), vec![0]);
    let err = engine.get_postings("dog").unwrap_err();
    assert!(matches!(err, IndexError::Corrupt { .. }));
    assert!(engine.execute_query("the && dog").is_err());
}

#[test]
fn meta_file_round_trip() {
    let dir = tempdir().unwrap();
    let paths = IndexPaths::new(dir.path());
    let mut builder = IndexBuilder::new();
    builder.ingest(CORPUS.as_bytes()).unwrap();
    let stats = builder.finish(&paths).unwrap();
    let meta = MetaFile {
        version: 1,
        created_at: "2024-01-01T00:00:00Z".into(),
        num_docs: stats.documents,
        num_terms: stats.terms,
        stats: stats.clone(),
    };
    save_meta(&paths, &meta).unwrap();
    let loaded = load_meta(&paths).unwrap();
    assert_eq!(loaded.num_docs, 3);
    assert_eq!(loaded.num_terms, 7);
    assert_eq!(loaded.stats, stats);
}

#[test]
fn engine_is_shareable_across_threads() {
    let dir = tempdir().unwrap();
    let paths = build(CORPUS.as_bytes(), dir.path());
    let engine = std::sync::Arc::new(SearchEngine::open(&paths).unwrap());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            std::thread::spawn(move || {
                for _ in 0..50 {
                    assert_eq!(engine.execute_query("sat && !dog").unwrap(), vec![0]);
                    assert_eq!(engine.get_document(2).title, "Title C");
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
}
