//! End-to-end retrieval tests: build an index on disk, reopen it and compare
//! what the engine returns with a full scan of the corpus.

use proptest::prelude::*;
use simstring::measure::EPSILON;
use simstring::{CharWidth, Error, IndexConfig, IndexReader, IndexWriter, Measure, NgramGenerator};
use std::collections::BTreeSet;
use std::path::Path;
use tempfile::TempDir;

fn build(path: &Path, config: IndexConfig, strings: &[&str]) -> IndexReader {
    let mut writer = IndexWriter::open_for_write(path, config).unwrap();
    for s in strings {
        writer.insert(s).unwrap();
    }
    writer.finalize().unwrap();
    IndexReader::open(path).unwrap()
}

fn ids(reader: &IndexReader, query: &str, measure: Measure, threshold: f64) -> BTreeSet<u32> {
    reader
        .retrieve(query, measure, threshold)
        .unwrap()
        .map(|m| m.id)
        .collect()
}

/// Every string scoring at least `threshold`, found by scoring each one.
/// Exact ignores the threshold and keeps only perfect scores.
fn full_scan(
    generator: &NgramGenerator,
    corpus: &[String],
    query: &str,
    measure: Measure,
    threshold: f64,
) -> BTreeSet<u32> {
    let q = generator.generate(query);
    corpus
        .iter()
        .enumerate()
        .filter(|(_, s)| {
            let x = generator.generate(s);
            let score = measure.score(q.size(), x.size(), q.overlap(&x));
            match measure {
                Measure::Exact => score == 1.0,
                _ => score >= threshold - EPSILON,
            }
        })
        .map(|(id, _)| id as u32)
        .collect()
}

#[test]
fn test_dice_example() {
    let dir = TempDir::new().unwrap();
    let reader = build(
        &dir.path().join("db"),
        IndexConfig::new(2, CharWidth::Narrow),
        &["cat", "cats", "dog"],
    );

    let found = reader.retrieve_strings("cat", Measure::Dice, 0.5).unwrap();
    assert_eq!(found, vec!["cat".to_string(), "cats".to_string()]);
}

#[test]
fn test_scores_reported() {
    let dir = TempDir::new().unwrap();
    let reader = build(
        &dir.path().join("db"),
        IndexConfig::new(2, CharWidth::Narrow),
        &["cat", "cats"],
    );

    let matches: Vec<_> = reader.retrieve("cat", Measure::Dice, 0.5).unwrap().collect();
    assert_eq!(matches.len(), 2);
    assert_eq!((matches[0].size, matches[0].overlap), (4, 4));
    assert!((matches[0].score - 1.0).abs() < 1e-12);
    // cats: 5 bigrams, shares \x01c ca at with cat
    assert_eq!((matches[1].size, matches[1].overlap), (5, 3));
    assert!((matches[1].score - 6.0 / 9.0).abs() < 1e-12);
}

#[test]
fn test_empty_query_overlap() {
    let dir = TempDir::new().unwrap();
    let reader = build(
        &dir.path().join("db"),
        IndexConfig::default(),
        &["alpha", "beta", "gamma"],
    );

    for threshold in [0.1, 0.5, 1.0] {
        assert!(ids(&reader, "", Measure::Overlap, threshold).is_empty());
    }
}

#[test]
fn test_exact_round_trip_with_duplicates() {
    let dir = TempDir::new().unwrap();
    let corpus = ["apple", "banana", "apple", "", "ünïcödé", "banana"];
    let reader = build(&dir.path().join("db"), IndexConfig::default(), &corpus);

    assert_eq!(reader.len(), corpus.len());
    for s in corpus {
        let found = reader.retrieve_strings(s, Measure::Exact, 0.0).unwrap();
        let expected = corpus.iter().filter(|&&c| c == s).count();
        assert_eq!(found.len(), expected, "query {s:?}");
        assert!(found.iter().all(|f| f == s));
    }
}

#[test]
fn test_wide_characters() {
    let dir = TempDir::new().unwrap();
    let reader = build(
        &dir.path().join("db"),
        IndexConfig::new(2, CharWidth::Wide),
        &["東京都", "京都府", "大阪府"],
    );

    // 東京都 and 京都府 share the bigram 京都
    let found = reader.retrieve_strings("京都", Measure::Overlap, 0.3).unwrap();
    assert_eq!(found, vec!["東京都".to_string(), "京都府".to_string()]);
    assert_eq!(reader.config().char_width, CharWidth::Wide);
}

#[test]
fn test_zero_threshold_returns_corpus() {
    let dir = TempDir::new().unwrap();
    let corpus = ["x", "hello", "world", "completely different"];
    let reader = build(&dir.path().join("db"), IndexConfig::default(), &corpus);

    for measure in [Measure::Dice, Measure::Cosine, Measure::Jaccard, Measure::Overlap] {
        assert_eq!(ids(&reader, "hello", measure, 0.0).len(), corpus.len(), "{measure}");
    }
}

#[test]
fn test_unit_threshold_returns_identical_multisets() {
    let dir = TempDir::new().unwrap();
    let corpus = ["abab", "baba", "abab", "ab"];
    let config = IndexConfig::new(1, CharWidth::Narrow);
    let reader = build(&dir.path().join("db"), config, &corpus);
    let generator = NgramGenerator::from_config(&config).unwrap();
    let q = generator.generate("abab");

    for measure in [Measure::Dice, Measure::Cosine, Measure::Jaccard] {
        let found: Vec<_> = reader.retrieve("abab", measure, 1.0).unwrap().collect();
        // Unigrams ignore order, so "baba" has the same multiset
        assert_eq!(found.len(), 3, "{measure}");
        for m in found {
            let x = generator.generate_bytes(m.bytes);
            assert_eq!(x.size(), q.size());
            assert_eq!(x.overlap(&q), q.size());
        }
    }
}

#[test]
fn test_results_ordered_by_size_then_id() {
    let dir = TempDir::new().unwrap();
    let reader = build(
        &dir.path().join("db"),
        IndexConfig::new(2, CharWidth::Narrow),
        &["abcd", "ab", "abc", "abx", "a"],
    );

    let order: Vec<(u32, u32)> = reader
        .retrieve("abc", Measure::Overlap, 0.0)
        .unwrap()
        .map(|m| (m.size, m.id))
        .collect();
    let mut sorted = order.clone();
    sorted.sort();
    assert_eq!(order, sorted);
    assert_eq!(order.len(), 5);
}

#[test]
fn test_concurrent_queries() {
    let dir = TempDir::new().unwrap();
    let corpus: Vec<String> = (0..500).map(|i| format!("item-{i:04}")).collect();
    let refs: Vec<&str> = corpus.iter().map(String::as_str).collect();
    let reader = build(&dir.path().join("db"), IndexConfig::default(), &refs);
    let expected = ids(&reader, "item-0042", Measure::Cosine, 0.6);
    assert!(expected.contains(&42));

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..20 {
                    assert_eq!(ids(&reader, "item-0042", Measure::Cosine, 0.6), expected);
                }
            });
        }
    });
}

#[test]
fn test_sealed_writer_rejects_changes() {
    let dir = TempDir::new().unwrap();
    let mut writer = IndexWriter::open_for_write(dir.path().join("db"), IndexConfig::default()).unwrap();
    writer.insert("one").unwrap();
    writer.finalize().unwrap();

    assert!(matches!(writer.insert("two"), Err(Error::Sealed)));
    assert!(matches!(writer.finalize(), Err(Error::Sealed)));
}

#[test]
fn test_width_mismatch_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db");
    build(&path, IndexConfig::new(3, CharWidth::Narrow), &["one"]);

    assert!(matches!(
        IndexReader::open_with_width(&path, CharWidth::Wide),
        Err(Error::InvalidConfig(_))
    ));
    assert!(IndexReader::open_with_width(&path, CharWidth::Narrow).is_ok());
}

#[test]
fn test_unfinished_build_not_openable() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db");
    {
        let mut writer = IndexWriter::open_for_write(&path, IndexConfig::default()).unwrap();
        writer.insert("never sealed").unwrap();
    }

    let err = IndexReader::open(&path).err().unwrap();
    assert!(err.is_read_error());
}

#[test]
fn test_bad_threshold_rejected() {
    let dir = TempDir::new().unwrap();
    let reader = build(&dir.path().join("db"), IndexConfig::default(), &["one"]);

    for threshold in [-0.1, 1.5, f64::NAN] {
        assert!(matches!(
            reader.retrieve("one", Measure::Jaccard, threshold),
            Err(Error::InvalidConfig(_))
        ));
    }
}

fn byte_corpus_strategy() -> impl Strategy<Value = Vec<Vec<u8>>> {
    let unit = prop::sample::select(vec![b'a', b'b', 0xe8, 0xe9, 0xff]);
    prop::collection::vec(prop::collection::vec(unit, 0..6), 1..30)
}

fn corpus_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[abc]{0,6}", 1..40)
}

fn measure_strategy() -> impl Strategy<Value = Measure> {
    prop::sample::select(Measure::ALL.to_vec())
}

fn threshold_strategy() -> impl Strategy<Value = f64> {
    prop_oneof![
        Just(0.0),
        Just(0.5),
        Just(1.0),
        0.0f64..=1.0,
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_retrieval_matches_full_scan(
        corpus in corpus_strategy(),
        query in "[abcd]{0,6}",
        n in 1usize..=3,
        wide in any::<bool>(),
        measure in measure_strategy(),
        threshold in threshold_strategy(),
    ) {
        let width = if wide { CharWidth::Wide } else { CharWidth::Narrow };
        let config = IndexConfig::new(n, width);
        let dir = TempDir::new().unwrap();
        let refs: Vec<&str> = corpus.iter().map(String::as_str).collect();
        let reader = build(&dir.path().join("db"), config, &refs);
        let generator = NgramGenerator::from_config(&config).unwrap();

        prop_assert_eq!(
            ids(&reader, &query, measure, threshold),
            full_scan(&generator, &corpus, &query, measure, threshold)
        );
    }

    #[test]
    fn prop_higher_threshold_returns_subset(
        corpus in corpus_strategy(),
        query in "[abc]{0,6}",
        measure in measure_strategy(),
        a in 0.0f64..=1.0,
        b in 0.0f64..=1.0,
    ) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let dir = TempDir::new().unwrap();
        let refs: Vec<&str> = corpus.iter().map(String::as_str).collect();
        let reader = build(&dir.path().join("db"), IndexConfig::new(2, CharWidth::Narrow), &refs);

        let loose = ids(&reader, &query, measure, lo);
        let strict = ids(&reader, &query, measure, hi);
        prop_assert!(strict.is_subset(&loose));
    }

    #[test]
    fn prop_capped_retrieval_matches_full_scan(
        corpus in corpus_strategy(),
        query in "[abc]{0,6}",
        cap in 1u32..=2,
        measure in measure_strategy(),
        threshold in threshold_strategy(),
    ) {
        let config = IndexConfig::new(1, CharWidth::Narrow).with_max_multiplicity(Some(cap));
        let dir = TempDir::new().unwrap();
        let refs: Vec<&str> = corpus.iter().map(String::as_str).collect();
        let reader = build(&dir.path().join("db"), config, &refs);
        let generator = NgramGenerator::from_config(&config).unwrap();

        prop_assert_eq!(
            ids(&reader, &query, measure, threshold),
            full_scan(&generator, &corpus, &query, measure, threshold)
        );
    }

    #[test]
    fn prop_narrow_bytes_match_full_scan(
        corpus in byte_corpus_strategy(),
        query in prop::collection::vec(prop::sample::select(vec![b'a', 0xe9, 0xff]), 0..6),
        measure in measure_strategy(),
        threshold in threshold_strategy(),
    ) {
        let config = IndexConfig::new(2, CharWidth::Narrow);
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db");
        let mut writer = IndexWriter::open_for_write(&path, config).unwrap();
        for s in &corpus {
            writer.insert_bytes(s).unwrap();
        }
        writer.finalize().unwrap();
        let reader = IndexReader::open(&path).unwrap();
        let generator = NgramGenerator::from_config(&config).unwrap();

        let q = generator.generate_bytes(&query);
        let expected: BTreeSet<u32> = corpus
            .iter()
            .enumerate()
            .filter(|(_, s)| {
                let x = generator.generate_bytes(s);
                let score = measure.score(q.size(), x.size(), q.overlap(&x));
                match measure {
                    Measure::Exact => score == 1.0,
                    _ => score >= threshold - EPSILON,
                }
            })
            .map(|(id, _)| id as u32)
            .collect();
        let found: BTreeSet<u32> = reader
            .retrieve_bytes(&query, measure, threshold)
            .unwrap()
            .map(|m| m.id)
            .collect();
        prop_assert_eq!(found, expected);
    }
}
