//! Property tests for in-memory vector store query ordering and
//! prefix-listing pagination.

use std::collections::{HashMap, HashSet};

use papyrus::document::EmbeddingRecord;
use papyrus::inmemory::InMemoryVectorStore;
use papyrus::vectorstore::VectorStore;
use proptest::prelude::*;

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map(
        "non-zero embedding",
        |mut v| {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm < 1e-8 {
                return None;
            }
            for val in &mut v {
                *val /= norm;
            }
            Some(v)
        },
    )
}

/// Generate a record with a normalized embedding.
fn arb_record(dim: usize) -> impl Strategy<Value = EmbeddingRecord> {
    ("[a-z]{3,8}", arb_normalized_embedding(dim)).prop_map(|(id, values)| EmbeddingRecord {
        id,
        values,
        metadata: HashMap::new(),
    })
}

mod prop_query_ordering {
    use super::*;

    const DIM: usize = 16;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// For any set of stored records, a query returns results ordered
        /// by descending cosine similarity, at most `top_k` of them, and
        /// never from another namespace.
        #[test]
        fn results_ordered_descending_and_bounded_by_top_k(
            records in proptest::collection::vec(arb_record(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
            top_k in 1usize..25,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (results, unique_count) = rt.block_on(async {
                let store = InMemoryVectorStore::new();

                // Deduplicate records by id to avoid upsert overwriting
                let mut deduped: HashMap<String, EmbeddingRecord> = HashMap::new();
                for record in &records {
                    deduped.entry(record.id.clone()).or_insert_with(|| record.clone());
                }
                let unique: Vec<EmbeddingRecord> = deduped.into_values().collect();
                let count = unique.len();

                store.upsert("ns-a", &unique).await.unwrap();
                store
                    .upsert(
                        "ns-b",
                        &[EmbeddingRecord {
                            id: "other".to_string(),
                            values: query.clone(),
                            metadata: HashMap::new(),
                        }],
                    )
                    .await
                    .unwrap();

                let results = store.query("ns-a", &query, top_k).await.unwrap();
                (results, count)
            });

            prop_assert!(results.len() <= top_k);
            prop_assert!(results.len() <= unique_count);
            prop_assert!(results.iter().all(|m| m.id != "other"));

            for window in results.windows(2) {
                prop_assert!(
                    window[0].score >= window[1].score,
                    "results not in descending order: {} < {}",
                    window[0].score,
                    window[1].score,
                );
            }
        }
    }
}

mod prop_pagination_completeness {
    use super::*;

    fn record(id: String) -> EmbeddingRecord {
        EmbeddingRecord { id, values: vec![1.0, 0.0], metadata: HashMap::new() }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Walking `list_paginated` to exhaustion visits every id with the
        /// prefix exactly once, regardless of page size, and never an id
        /// without it.
        #[test]
        fn pagination_visits_prefixed_ids_exactly_once(
            prefixed_count in 0usize..40,
            noise in proptest::collection::hash_set("[a-z]{4,10}", 0..15),
            limit in 1usize..8,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (collected, expected) = rt.block_on(async {
                let store = InMemoryVectorStore::new();
                let prefix = "report.pdf#doc-1#";

                let mut expected = HashSet::new();
                let mut records = Vec::new();
                for i in 1..=prefixed_count {
                    let id = format!("{prefix}{i}");
                    expected.insert(id.clone());
                    records.push(record(id));
                }
                for id in &noise {
                    if !id.starts_with(prefix) {
                        records.push(record(id.clone()));
                    }
                }
                store.upsert("ns", &records).await.unwrap();

                let mut collected = Vec::new();
                let mut cursor: Option<String> = None;
                loop {
                    let page = store
                        .list_paginated("ns", prefix, limit, cursor.as_deref())
                        .await
                        .unwrap();
                    collected.extend(page.ids);
                    match page.next_cursor {
                        Some(next) => cursor = Some(next),
                        None => break,
                    }
                }
                (collected, expected)
            });

            let seen: HashSet<String> = collected.iter().cloned().collect();
            prop_assert_eq!(collected.len(), seen.len(), "an id was visited twice");
            prop_assert_eq!(seen, expected);
        }
    }
}
