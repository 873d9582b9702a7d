//! Hybrid search, reranking, and bulk search.

mod common;

use common::{result, sequential_uuids, MockDriver, MockEmbedder, MockLlm, MockReranker};
use epigraph::{BulkSearchQuery, EngineConfig, Epigraph, EpigraphError};
use serde_json::{json, Value};

fn search_result(facts: &[&str]) -> epigraph::driver::QueryResult {
    let rows: Vec<Vec<(&str, Value)>> = facts
        .iter()
        .enumerate()
        .map(|(i, fact)| {
            vec![
                ("uuid", json!(format!("edge-{i}"))),
                ("source_uuid", json!("a")),
                ("target_uuid", json!("b")),
                ("name", json!("RELATES")),
                ("fact", json!(fact)),
                ("created_at", json!("2026-02-01T12:00:00Z")),
                ("valid_at", json!("2026-02-01T12:00:00Z")),
                ("episodes", json!(["ep-1"])),
            ]
        })
        .collect();
    let rows_refs: Vec<&[(&str, Value)]> = rows.iter().map(|r| r.as_slice()).collect();
    result(&rows_refs)
}

#[tokio::test]
async fn test_search_without_embedder_uses_lexical_match() {
    let driver = MockDriver::default();
    driver.route("e.fact CONTAINS $query", search_result(&["Alice lives in Seattle"]));

    let engine: Epigraph<MockDriver, MockLlm, MockEmbedder, MockReranker> =
        Epigraph::new(driver.clone(), MockLlm::default(), None, None, EngineConfig::default());

    let edges = engine.search("g1", "Seattle").await.unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].fact, "Alice lives in Seattle");
    assert!(edges[0].is_active());

    let lexical = driver.calls_matching("e.fact CONTAINS $query");
    assert_eq!(lexical.len(), 1);
    assert_eq!(lexical[0].1["query"], json!("Seattle"));
    // The lexical query still filters to active edges only.
    assert!(lexical[0].0.contains(r#"e.invalid_at IS NULL OR e.invalid_at = """#));
}

#[tokio::test]
async fn test_search_with_embedder_uses_vector_match() {
    let driver = MockDriver::default();
    driver.route("fact_embedding IS NOT NULL", search_result(&["vector hit"]));

    let engine: Epigraph<MockDriver, MockLlm, MockEmbedder, MockReranker> = Epigraph::new(
        driver.clone(),
        MockLlm::default(),
        Some(MockEmbedder::default()),
        None,
        EngineConfig::default(),
    );

    let edges = engine.search("g1", "query").await.unwrap();
    assert_eq!(edges.len(), 1);

    // The query embedding was bound as a parameter.
    let vector_calls = driver.calls_matching("fact_embedding IS NOT NULL");
    assert_eq!(vector_calls.len(), 1);
    assert_eq!(vector_calls[0].1["embedding"], json!([0.1_f32, 0.2_f32, 0.3_f32]));
    // No lexical query ran.
    assert!(driver.calls_matching("e.fact CONTAINS $query").is_empty());
}

#[tokio::test]
async fn test_search_reranker_reorders_results() {
    let driver = MockDriver::default();
    driver.route("e.fact CONTAINS $query", search_result(&["a", "b", "c"]));

    let engine: Epigraph<MockDriver, MockLlm, MockEmbedder, MockReranker> = Epigraph::new(
        driver,
        MockLlm::default(),
        None,
        Some(MockReranker {
            indices: Some(vec![2, 0, 1]),
        }),
        EngineConfig::default(),
    );

    let edges = engine.search("g1", "q").await.unwrap();
    let facts: Vec<&str> = edges.iter().map(|e| e.fact.as_str()).collect();
    assert_eq!(facts, vec!["c", "a", "b"]);
}

#[tokio::test]
async fn test_search_rerank_tolerates_malformed_indices() {
    // Reranker returns [2, 0, 2, 99] for 4 results: expected order is
    // [results[2], results[0], results[1], results[3]].
    let driver = MockDriver::default();
    driver.route("e.fact CONTAINS $query", search_result(&["a", "b", "c", "d"]));

    let engine: Epigraph<MockDriver, MockLlm, MockEmbedder, MockReranker> = Epigraph::new(
        driver,
        MockLlm::default(),
        None,
        Some(MockReranker {
            indices: Some(vec![2, 0, 2, 99]),
        }),
        EngineConfig::default(),
    );

    let edges = engine.search("g1", "q").await.unwrap();
    let facts: Vec<&str> = edges.iter().map(|e| e.fact.as_str()).collect();
    assert_eq!(facts, vec!["c", "a", "b", "d"]);
}

#[tokio::test]
async fn test_search_reranker_error_preserves_order() {
    let driver = MockDriver::default();
    driver.route("e.fact CONTAINS $query", search_result(&["a", "b"]));

    let engine: Epigraph<MockDriver, MockLlm, MockEmbedder, MockReranker> = Epigraph::new(
        driver,
        MockLlm::default(),
        None,
        Some(MockReranker { indices: None }), // errors on every call
        EngineConfig::default(),
    );

    let edges = engine.search("g1", "q").await.unwrap();
    let facts: Vec<&str> = edges.iter().map(|e| e.fact.as_str()).collect();
    assert_eq!(facts, vec!["a", "b"]);
}

#[tokio::test]
async fn test_search_single_result_skips_reranker() {
    let driver = MockDriver::default();
    driver.route("e.fact CONTAINS $query", search_result(&["only"]));

    // A reranker that would scramble anything it is given.
    let engine: Epigraph<MockDriver, MockLlm, MockEmbedder, MockReranker> = Epigraph::new(
        driver,
        MockLlm::default(),
        None,
        Some(MockReranker {
            indices: Some(vec![99]),
        }),
        EngineConfig::default(),
    );

    let edges = engine.search("g1", "q").await.unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].fact, "only");
}

#[tokio::test]
async fn test_search_driver_error_is_terminal() {
    let driver = MockDriver::default();
    driver.fail_matching("e.fact CONTAINS $query");

    let engine: Epigraph<MockDriver, MockLlm, MockEmbedder, MockReranker> =
        Epigraph::new(driver, MockLlm::default(), None, None, EngineConfig::default());

    let err = engine.search("g1", "q").await.unwrap_err();
    assert!(matches!(err, EpigraphError::Search(_)));
}

#[tokio::test]
async fn test_bulk_search_returns_results_keyed_by_query_id() {
    let driver = MockDriver::default();
    driver.route("e.fact CONTAINS $query", search_result(&["hit"]));

    let engine: Epigraph<MockDriver, MockLlm, MockEmbedder, MockReranker> =
        Epigraph::new(driver, MockLlm::default(), None, None, EngineConfig::default());

    let queries = vec![
        BulkSearchQuery {
            query_id: "q1".into(),
            query: "alpha".into(),
        },
        BulkSearchQuery {
            query_id: "q2".into(),
            query: "beta".into(),
        },
    ];
    let results = engine.bulk_search("g1", &queries).await.unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results["q1"].len(), 1);
    assert_eq!(results["q2"].len(), 1);
}

#[tokio::test]
async fn test_bulk_search_aggregates_failing_queries() {
    let driver = MockDriver::default();
    driver.fail_matching("e.fact CONTAINS $query");

    let engine: Epigraph<MockDriver, MockLlm, MockEmbedder, MockReranker> =
        Epigraph::new(driver, MockLlm::default(), None, None, EngineConfig::default());

    let queries = vec![
        BulkSearchQuery {
            query_id: "q1".into(),
            query: "alpha".into(),
        },
        BulkSearchQuery {
            query_id: "q2".into(),
            query: "beta".into(),
        },
    ];
    let err = engine.bulk_search("g1", &queries).await.unwrap_err();

    match err {
        EpigraphError::Bulk(errors) => {
            assert_eq!(errors.len(), 2);
            assert!(errors.iter().any(|e| e.contains("query q1")));
            assert!(errors.iter().any(|e| e.contains("query q2")));
        }
        e => panic!("expected Bulk error, got {e:?}"),
    }
}

#[tokio::test]
async fn test_build_indices_runs_all_statements_despite_failures() {
    let driver = MockDriver::default();
    driver.fail_matching("CREATE INDEX ON :Entity(uuid)");

    let engine: Epigraph<MockDriver, MockLlm, MockEmbedder, MockReranker> =
        Epigraph::new(driver.clone(), MockLlm::default(), None, None, EngineConfig::default())
            .with_uuid_generator(sequential_uuids());

    engine.build_indices().await.unwrap();
    assert_eq!(driver.calls_matching("CREATE INDEX").len(), 8);
}
