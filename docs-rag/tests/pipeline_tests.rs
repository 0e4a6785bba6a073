//! End-to-end retrieval tests against the in-memory store.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use docs_rag::document::{Chunk, CorpusStats, ParentContext, SearchResult, StoredChunk};
use docs_rag::store::{RankRequest, SimilarityStore};
use docs_rag::{
    Corpus, DocsToolset, EmbeddingProvider, InMemoryStore, LookupArgs, NO_RESULTS, RagError,
    Result, RetrievalEngine, SearchArgs, SearchOptions,
};

/// Returns canned vectors keyed by query text.
struct StaticEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    calls: AtomicUsize,
}

impl StaticEmbedder {
    fn new(pairs: &[(&str, Vec<f32>)]) -> Self {
        Self {
            vectors: pairs.iter().map(|(q, v)| (q.to_string(), v.clone())).collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for StaticEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.vectors.get(text).cloned().ok_or_else(|| RagError::EmbeddingFailure {
            provider: "static".into(),
            message: format!("no vector for '{text}'"),
        })
    }

    fn dimensions(&self) -> usize {
        3
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// A store whose every call fails.
struct BrokenStore;

fn broken() -> RagError {
    RagError::StorageFailure { backend: "broken".into(), message: "connection refused".into() }
}

#[async_trait]
impl SimilarityStore for BrokenStore {
    fn backend(&self) -> &str {
        "broken"
    }

    async fn rank_by_similarity(
        &self,
        _corpus: Corpus,
        _embedding: &[f32],
        _request: &RankRequest,
    ) -> Result<Vec<SearchResult>> {
        Err(broken())
    }

    async fn get_by_id(&self, _corpus: Corpus, _id: &str) -> Result<Option<Chunk>> {
        Err(broken())
    }

    async fn get_parent_context(
        &self,
        _corpus: Corpus,
        _id: &str,
    ) -> Result<Option<ParentContext>> {
        Err(broken())
    }

    async fn get_by_component(&self, _corpus: Corpus, _component: &str) -> Result<Vec<Chunk>> {
        Err(broken())
    }

    async fn list_distinct_components(&self, _corpus: Corpus) -> Result<Vec<String>> {
        Err(broken())
    }

    async fn stats(&self, _corpus: Corpus) -> Result<CorpusStats> {
        Err(broken())
    }
}

fn chunk(id: &str, component: &str, section_path: &str, content: &str) -> StoredChunk {
    StoredChunk {
        id: id.into(),
        component: component.into(),
        section_path: section_path.into(),
        content: content.into(),
        parent_id: None,
        demo_code: None,
        token_count: content.split_whitespace().count() as i64,
        embedding: vec![],
    }
}

fn button_corpus() -> Vec<StoredChunk> {
    let mut usage = chunk("1", "button", "button/usage", "Use Button for actions.");
    usage.embedding = vec![1.0, 0.0, 0.0];
    let mut styling =
        chunk("2", "button", "button/usage/styling", "Pass className to override styles.");
    styling.parent_id = Some("1".into());
    styling.embedding = vec![0.2, 0.9, 0.0];
    let mut dialog = chunk("3", "dialog", "dialog/usage", "Dialogs interrupt the user.");
    dialog.embedding = vec![0.0, 0.8, 0.6];
    vec![usage, styling, dialog]
}

async fn engine_with(
    corpus: Corpus,
    chunks: Vec<StoredChunk>,
    embedder: StaticEmbedder,
) -> (RetrievalEngine, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    store.upsert(corpus, chunks).await;
    let engine = RetrievalEngine::builder()
        .embedding_provider(Arc::new(embedder))
        .store(store.clone())
        .build()
        .unwrap();
    (engine, store)
}

#[tokio::test]
async fn styling_query_resolves_parent_section() {
    let embedder = StaticEmbedder::new(&[("How do I style a button?", vec![0.0, 1.0, 0.0])]);
    let (engine, _) = engine_with(Corpus::Hierarchical, button_corpus(), embedder).await;

    let results = engine
        .retrieve(Corpus::Hierarchical, "How do I style a button?", SearchOptions::new(1))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk.id, "2");
    let parent = results[0].parent_context.as_ref().unwrap();
    assert_eq!(parent.section_path, "button/usage");
    assert_eq!(parent.content, "Use Button for actions.");

    let text = engine
        .search(Corpus::Hierarchical, "How do I style a button?", SearchOptions::new(1))
        .await
        .unwrap();
    assert!(text.contains("button/usage/styling"));
    assert!(text.contains("Parent section: button/usage"));
}

#[tokio::test]
async fn inferred_filter_excludes_other_components() {
    // The query vector is closest to the dialog chunk, but "button" is named.
    let embedder = StaticEmbedder::new(&[("button spacing", vec![0.0, 0.8, 0.6])]);
    let (engine, _) = engine_with(Corpus::Hierarchical, button_corpus(), embedder).await;

    let results = engine
        .retrieve(Corpus::Hierarchical, "button spacing", SearchOptions::new(5))
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.chunk.component == "button"));
}

#[tokio::test]
async fn unmatched_query_spans_components() {
    let embedder = StaticEmbedder::new(&[("how do overlays work", vec![0.3, 0.6, 0.4])]);
    let (engine, _) = engine_with(Corpus::Hierarchical, button_corpus(), embedder).await;

    let results = engine
        .retrieve(Corpus::Hierarchical, "how do overlays work", SearchOptions::new(5))
        .await
        .unwrap();
    assert_eq!(results.len(), 3);
    let components: Vec<&str> = results.iter().map(|r| r.chunk.component.as_str()).collect();
    assert!(components.contains(&"button"));
    assert!(components.contains(&"dialog"));
    for pair in results.windows(2) {
        assert!(pair[0].similarity >= pair[1].similarity);
    }
}

#[tokio::test]
async fn root_chunks_have_no_parent_context() {
    let embedder = StaticEmbedder::new(&[("actions", vec![1.0, 0.0, 0.0])]);
    let (engine, _) = engine_with(Corpus::Hierarchical, button_corpus(), embedder).await;

    let results =
        engine.retrieve(Corpus::Hierarchical, "actions", SearchOptions::new(1)).await.unwrap();
    assert_eq!(results[0].chunk.id, "1");
    assert!(results[0].parent_context.is_none());
}

#[tokio::test]
async fn empty_corpus_returns_sentinel() {
    let embedder = StaticEmbedder::new(&[("anything", vec![1.0, 0.0, 0.0])]);
    let (engine, _) = engine_with(Corpus::Flat, vec![], embedder).await;

    let text = engine.search(Corpus::Hierarchical, "anything", SearchOptions::new(5)).await.unwrap();
    assert_eq!(text, NO_RESULTS);
}

#[tokio::test]
async fn blank_query_is_rejected_before_embedding() {
    let embedder = StaticEmbedder::new(&[]);
    let store = Arc::new(InMemoryStore::new());
    let embedder = Arc::new(embedder);
    let engine = RetrievalEngine::builder()
        .embedding_provider(embedder.clone())
        .store(store)
        .build()
        .unwrap();

    let err = engine.search(Corpus::Flat, "   ", SearchOptions::new(5)).await.unwrap_err();
    assert!(matches!(err, RagError::InvalidRequest(_)));
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn embedding_failure_aborts_request() {
    let embedder = StaticEmbedder::new(&[]);
    let (engine, _) = engine_with(Corpus::Hierarchical, button_corpus(), embedder).await;

    let err = engine
        .search(Corpus::Hierarchical, "unknown query", SearchOptions::new(5))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::EmbeddingFailure { .. }));
}

#[tokio::test]
async fn storage_failure_degrades_to_no_results() {
    let embedder = StaticEmbedder::new(&[("button", vec![1.0, 0.0, 0.0])]);
    let engine = RetrievalEngine::builder()
        .embedding_provider(Arc::new(embedder))
        .store(Arc::new(BrokenStore))
        .build()
        .unwrap();

    let text = engine.search(Corpus::Hierarchical, "button", SearchOptions::new(5)).await.unwrap();
    assert_eq!(text, NO_RESULTS);

    assert!(engine.get_chunk(Corpus::Flat, "1").await.unwrap_err().is_not_found());
    assert!(engine.get_chunks_by_component(Corpus::Flat, "button").await.unwrap_err().is_not_found());
    assert_eq!(engine.list_components(Corpus::Flat).await.total, 0);
    assert!(matches!(
        engine.stats(Corpus::Flat).await,
        Err(RagError::StorageFailure { .. })
    ));
}

#[tokio::test]
async fn malformed_demo_code_is_isolated() {
    let mut broken = chunk("10", "table", "table/sorting", "Sort by column.");
    broken.demo_code = Some("{not json".into());
    broken.embedding = vec![1.0, 0.0, 0.0];
    let mut good = chunk("11", "table", "table/paging", "Page long tables.");
    good.demo_code = Some(r#"[{"file": "paging.demo.tsx", "code": "<Table />"}]"#.into());
    good.embedding = vec![0.9, 0.1, 0.0];

    let embedder = StaticEmbedder::new(&[("sorting", vec![1.0, 0.0, 0.0])]);
    let (engine, _) = engine_with(Corpus::Hierarchical, vec![broken, good], embedder).await;

    let results =
        engine.retrieve(Corpus::Hierarchical, "sorting", SearchOptions::new(5)).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].chunk.id, "10");
    assert!(results[0].chunk.demo_code.is_empty());
    assert_eq!(results[1].chunk.demo_code.len(), 1);

    let text = engine.search(Corpus::Hierarchical, "sorting", SearchOptions::new(5)).await.unwrap();
    assert!(text.contains("### Example: paging.demo.tsx"));
}

#[tokio::test]
async fn dangling_and_self_parents_resolve_one_hop() {
    let mut dangling = chunk("20", "menu", "menu/items", "Menu items.");
    dangling.parent_id = Some("999".into());
    dangling.embedding = vec![1.0, 0.0, 0.0];
    let mut looped = chunk("21", "menu", "menu/sections", "Menu sections.");
    looped.parent_id = Some("21".into());
    looped.embedding = vec![0.9, 0.1, 0.0];

    let embedder = StaticEmbedder::new(&[("menus", vec![1.0, 0.0, 0.0])]);
    let (engine, _) = engine_with(Corpus::Hierarchical, vec![dangling, looped], embedder).await;

    let results =
        engine.retrieve(Corpus::Hierarchical, "menus", SearchOptions::new(5)).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[0].parent_context.is_none());
    assert_eq!(results[1].parent_context.as_ref().unwrap().section_path, "menu/sections");
}

#[tokio::test]
async fn flat_lookup_omits_parent_block() {
    let embedder = StaticEmbedder::new(&[("How do I style a button?", vec![0.0, 1.0, 0.0])]);
    let (engine, _) = engine_with(Corpus::Flat, button_corpus(), embedder).await;

    let text =
        engine.search(Corpus::Flat, "How do I style a button?", SearchOptions::new(2)).await.unwrap();
    assert!(text.contains("button/usage/styling"));
    assert!(!text.contains("Parent section"));
}

#[tokio::test]
async fn configured_threshold_applies_when_unset() {
    let embedder = StaticEmbedder::new(&[("overlays", vec![0.0, 0.0, 1.0])]);
    let store = Arc::new(InMemoryStore::new());
    store.upsert(Corpus::Hierarchical, button_corpus()).await;
    let config = docs_rag::EngineConfig::builder().similarity_threshold(0.5).build().unwrap();
    let engine = RetrievalEngine::builder()
        .config(config)
        .embedding_provider(Arc::new(embedder))
        .store(store)
        .build()
        .unwrap();

    let results =
        engine.retrieve(Corpus::Hierarchical, "overlays", SearchOptions::new(5)).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk.id, "3");

    let all = engine
        .retrieve(Corpus::Hierarchical, "overlays", SearchOptions::new(5).with_threshold(Some(-1.0)))
        .await
        .unwrap();
    assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn vocabulary_is_loaded_once_per_corpus() {
    let embedder = StaticEmbedder::new(&[("tooltip placement", vec![1.0, 0.0, 0.0])]);
    let (engine, store) = engine_with(Corpus::Hierarchical, button_corpus(), embedder).await;

    assert_eq!(engine.infer_component(Corpus::Hierarchical, "tooltip placement").await, None);

    let mut tooltip = chunk("30", "tooltip", "tooltip/placement", "Tooltips float.");
    tooltip.embedding = vec![1.0, 0.0, 0.0];
    store.upsert(Corpus::Hierarchical, vec![tooltip]).await;

    // The cached vocabulary predates the new component.
    assert_eq!(engine.infer_component(Corpus::Hierarchical, "tooltip placement").await, None);
    assert_eq!(engine.list_components(Corpus::Hierarchical).await.total, 3);
}

#[tokio::test]
async fn point_operations() {
    let embedder = StaticEmbedder::new(&[]);
    let (engine, _) = engine_with(Corpus::Hierarchical, button_corpus(), embedder).await;

    let chunk = engine.get_chunk(Corpus::Hierarchical, "2").await.unwrap();
    assert_eq!(chunk.parent_id.as_deref(), Some("1"));
    assert!(engine.get_chunk(Corpus::Hierarchical, "404").await.unwrap_err().is_not_found());
    assert!(engine.get_chunk(Corpus::Flat, "2").await.unwrap_err().is_not_found());

    let buttons = engine.get_chunks_by_component(Corpus::Hierarchical, "button").await.unwrap();
    let ids: Vec<&str> = buttons.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, ["1", "2"]);

    let list = engine.list_components(Corpus::Hierarchical).await;
    assert_eq!(list.components, ["button", "dialog"]);
    assert_eq!(list.total, 2);

    let stats = engine.stats(Corpus::Hierarchical).await.unwrap();
    assert_eq!(stats.total_chunks, 3);
    assert_eq!(stats.unique_components, 2);
    assert_eq!(stats.avg_token_count, 4.3);
}

#[tokio::test]
async fn toolset_renders_errors_as_text() {
    let embedder = StaticEmbedder::new(&[("How do I style a button?", vec![0.0, 1.0, 0.0])]);
    let (engine, _) = engine_with(Corpus::Hierarchical, button_corpus(), embedder).await;
    let tools = DocsToolset::new(Arc::new(engine));

    let ok = tools
        .hierarchical_documentation_lookup(LookupArgs {
            query: "How do I style a button?".into(),
            limit: Some(1),
        })
        .await;
    assert!(!ok.is_error);
    assert!(ok.text.contains("Parent section: button/usage"));

    let blank = tools.documentation_lookup(LookupArgs { query: " ".into(), limit: None }).await;
    assert!(blank.is_error);

    let failed = tools
        .hierarchical_documentation_lookup(LookupArgs { query: "no vector".into(), limit: None })
        .await;
    assert!(failed.is_error);
    assert!(failed.text.contains("Embedding failure"));

    let json = tools
        .search_chunks(SearchArgs {
            query: "How do I style a button?".into(),
            limit: Some(100),
            threshold: None,
            corpus: Some("hierarchical".into()),
        })
        .await;
    assert!(!json.is_error);
    let value: serde_json::Value = serde_json::from_str(&json.text).unwrap();
    assert_eq!(value[0]["id"], "2");
    assert_eq!(value[0]["parent_context"]["section_path"], "button/usage");

    let bad_corpus = tools.list_components(Some("nested")).await;
    assert!(bad_corpus.is_error);

    let missing = tools.get_chunk("404", None).await;
    assert!(missing.is_error);
    assert!(missing.text.contains("Not found"));

    let stats = tools.get_stats(None).await;
    let value: serde_json::Value = serde_json::from_str(&stats.text).unwrap();
    assert_eq!(value["total_chunks"], 3);
}

fn one_hot(index: usize) -> Vec<f32> {
    let mut v = vec![0.0; 16];
    v[index] = 1.0;
    v
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_searches_keep_their_own_parents() {
    const SECTIONS: usize = 8;
    let mut chunks = Vec::new();
    let mut queries = Vec::new();
    for i in 0..SECTIONS {
        let mut parent = chunk(
            &(100 + i).to_string(),
            "widget",
            &format!("widget/section-{i}"),
            &format!("Overview {i}."),
        );
        parent.embedding = one_hot(SECTIONS + i);
        let mut child = chunk(
            &i.to_string(),
            "widget",
            &format!("widget/section-{i}/detail"),
            &format!("Detail {i}."),
        );
        child.parent_id = Some((100 + i).to_string());
        child.embedding = one_hot(i);
        chunks.push(parent);
        chunks.push(child);
        queries.push((format!("question number {i}"), one_hot(i)));
    }
    let pairs: Vec<(&str, Vec<f32>)> =
        queries.iter().map(|(q, v)| (q.as_str(), v.clone())).collect();
    let (engine, _) =
        engine_with(Corpus::Hierarchical, chunks, StaticEmbedder::new(&pairs)).await;
    let engine = Arc::new(engine);

    let mut handles = Vec::new();
    for round in 0..4 {
        for i in 0..SECTIONS {
            let engine = Arc::clone(&engine);
            let query = format!("question number {}", (i + round) % SECTIONS);
            handles.push(tokio::spawn(async move {
                let results = engine
                    .retrieve(Corpus::Hierarchical, &query, SearchOptions::new(1))
                    .await
                    .unwrap();
                (query, results)
            }));
        }
    }

    for handle in handles {
        let (query, results) = handle.await.unwrap();
        let n: usize = query.rsplit(' ').next().unwrap().parse().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, n.to_string());
        let parent = results[0].parent_context.as_ref().unwrap();
        assert_eq!(parent.section_path, format!("widget/section-{n}"));
        assert_eq!(parent.content, format!("Overview {n}."));
    }
}

#[cfg(feature = "http")]
#[tokio::test]
async fn http_embedding_error_reports_failure() {
    use docs_rag::{EmbeddingConfig, HttpEmbeddingProvider};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(
            ResponseTemplate::new(503)
                .set_body_json(serde_json::json!({"error": "model not loaded"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = EmbeddingConfig {
        url: format!("{}/api/embed", server.uri()),
        dimensions: 3,
        timeout_secs: 5,
        ..Default::default()
    };
    let provider = HttpEmbeddingProvider::new(&config).unwrap();
    let store = Arc::new(InMemoryStore::new());
    store.upsert(Corpus::Hierarchical, button_corpus()).await;
    let engine = RetrievalEngine::builder()
        .embedding_provider(Arc::new(provider))
        .store(store)
        .build()
        .unwrap();

    let err = engine
        .search(Corpus::Hierarchical, "How do I style a button?", SearchOptions::new(5))
        .await
        .unwrap_err();
    match err {
        RagError::EmbeddingFailure { message, .. } => assert!(message.contains("503"), "{message}"),
        other => panic!("expected embedding failure, got {other:?}"),
    }
}
