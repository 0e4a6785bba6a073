//! pgvector (PostgreSQL) similarity store backend.
//!
//! Provides [`PgVectorStore`] which implements [`SimilarityStore`] using
//! [sqlx](https://docs.rs/sqlx) with the
//! [pgvector](https://github.com/pgvector/pgvector) PostgreSQL extension.
//!
//! # Prerequisites
//!
//! - PostgreSQL with the `pgvector` extension installed
//! - One table per corpus with columns `id`, `component`, `section_path`,
//!   `content`, `token_count`, `embedding vector(N)`, and for the
//!   hierarchical corpus also `parent_id` and `demo_code`
//!
//! # Example
//!
//! ```rust,ignore
//! use docs_rag::pgvector::PgVectorStore;
//!
//! let store = PgVectorStore::connect_lazy(&config.storage, &config.tables);
//! let ranked = store
//!     .rank_by_similarity(Corpus::Hierarchical, &query_embedding, &RankRequest::new(5))
//!     .await?;
//! ```

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing::debug;

use crate::config::StorageConfig;
use crate::corpus::{Corpus, CorpusTables, TableName};
use crate::document::{Chunk, CorpusStats, DemoCode, ParentContext, SearchResult};
use crate::error::{RagError, Result};
use crate::store::{RankRequest, SimilarityStore};

const BACKEND: &str = "pgvector";

/// The fixed statements issued against one corpus table.
///
/// Built once from a validated [`TableName`]; every caller-supplied value is
/// a bind parameter.
#[derive(Debug, Clone)]
struct QuerySet {
    rank: String,
    by_id: String,
    parent: String,
    by_component: String,
    components: String,
    stats: String,
}

impl QuerySet {
    fn new(corpus: Corpus, table: &TableName) -> Self {
        // The flat corpus has no hierarchy columns; select typed NULLs so both
        // corpora decode into the same row shape.
        let hierarchy = if corpus.is_hierarchical() {
            "parent_id::text AS parent_id, demo_code::text AS demo_code"
        } else {
            "NULL::text AS parent_id, NULL::text AS demo_code"
        };
        // Same total order as `inmemory::compare_ids`: integer ids first,
        // numerically, then the rest bytewise. Qualified so ORDER BY reads the
        // stored column, not the `id::text` output alias.
        let id_order = format!(
            "({table}.id::text !~ '^[+-]?[0-9]+$'), \
             CASE WHEN {table}.id::text ~ '^[+-]?[0-9]+$' THEN {table}.id::text::numeric END, \
             {table}.id::text COLLATE \"C\""
        );
        let columns = format!(
            "id::text AS id, component, section_path, content, {hierarchy}, \
             COALESCE(token_count, 0)::int8 AS token_count"
        );

        Self {
            // cosine distance operator <=>: 0 = identical, so similarity = 1 - distance
            rank: format!(
                "SELECT {columns}, (1 - (embedding <=> $1::vector))::float8 AS similarity \
                 FROM {table} \
                 WHERE ($2::float8 IS NULL OR 1 - (embedding <=> $1::vector) > $2::float8) \
                   AND ($3::text IS NULL OR component = $3::text) \
                 ORDER BY embedding <=> $1::vector, {id_order} \
                 LIMIT $4"
            ),
            by_id: format!("SELECT {columns} FROM {table} WHERE id::text = $1"),
            parent: format!("SELECT section_path, content FROM {table} WHERE id::text = $1"),
            by_component: format!(
                "SELECT {columns} FROM {table} WHERE component = $1 ORDER BY {id_order}"
            ),
            components: format!("SELECT DISTINCT component FROM {table} ORDER BY component"),
            stats: format!(
                "SELECT COUNT(*)::int8 AS total_chunks, \
                        COUNT(DISTINCT component)::int8 AS unique_components, \
                        AVG(token_count)::float8 AS avg_token_count \
                 FROM {table}"
            ),
        }
    }
}

#[derive(sqlx::FromRow)]
struct ChunkRow {
    id: String,
    component: String,
    section_path: String,
    content: String,
    parent_id: Option<String>,
    demo_code: Option<String>,
    token_count: i64,
}

impl From<ChunkRow> for Chunk {
    fn from(row: ChunkRow) -> Self {
        let demo_code = DemoCode::decode_or_empty(row.demo_code.as_deref(), &row.id);
        Chunk {
            id: row.id,
            component: row.component,
            section_path: row.section_path,
            content: row.content,
            parent_id: row.parent_id,
            demo_code,
            token_count: row.token_count,
            embedding: Vec::new(),
        }
    }
}

#[derive(sqlx::FromRow)]
struct RankedRow {
    #[sqlx(flatten)]
    chunk: ChunkRow,
    similarity: f64,
}

#[derive(sqlx::FromRow)]
struct ParentRow {
    section_path: String,
    content: String,
}

#[derive(sqlx::FromRow)]
struct StatsRow {
    total_chunks: i64,
    unique_components: i64,
    avg_token_count: Option<f64>,
}

/// A [`SimilarityStore`] backed by PostgreSQL with the pgvector extension.
///
/// Each call borrows its own pooled connection, so concurrent requests never
/// share a session. Every call is bounded by the configured timeout, both
/// server-side (`statement_timeout`) and client-side.
pub struct PgVectorStore {
    pool: PgPool,
    timeout: Duration,
    hierarchical: QuerySet,
    flat: QuerySet,
}

impl PgVectorStore {
    /// Create a store whose pool connects on first use.
    ///
    /// Start-up never fails because the database is down; the first query
    /// reports a [`RagError::StorageFailure`] instead. Must be called from
    /// within a Tokio runtime.
    pub fn connect_lazy(storage: &StorageConfig, tables: &CorpusTables) -> Self {
        let timeout = storage.timeout();
        let options = PgConnectOptions::new()
            .host(&storage.host)
            .port(storage.port)
            .database(&storage.database)
            .username(&storage.user)
            .password(&storage.password)
            .options([("statement_timeout", timeout.as_millis().to_string())]);

        let pool = PgPoolOptions::new()
            .max_connections(storage.max_connections)
            .acquire_timeout(timeout)
            .connect_lazy_with(options);

        debug!(host = %storage.host, port = storage.port, database = %storage.database, "pgvector pool configured");
        Self::from_pool(pool, tables, timeout)
    }

    /// Create a store from an existing connection pool.
    pub fn from_pool(pool: PgPool, tables: &CorpusTables, timeout: Duration) -> Self {
        Self {
            pool,
            timeout,
            hierarchical: QuerySet::new(Corpus::Hierarchical, &tables.hierarchical),
            flat: QuerySet::new(Corpus::Flat, &tables.flat),
        }
    }

    fn queries(&self, corpus: Corpus) -> &QuerySet {
        match corpus {
            Corpus::Hierarchical => &self.hierarchical,
            Corpus::Flat => &self.flat,
        }
    }

    fn map_err(op: &str, e: sqlx::Error) -> RagError {
        RagError::storage(BACKEND, format!("{op}: {e}"))
    }

    /// Run `fut` under the client-side timeout.
    async fn bounded<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(|e| Self::map_err(op, e)),
            Err(_) => Err(RagError::storage(
                BACKEND,
                format!("{op}: timed out after {:.1}s", self.timeout.as_secs_f64()),
            )),
        }
    }
}

/// pgvector expects the vector as a string like `[1.0,2.0,3.0]`.
fn vector_literal(embedding: &[f32]) -> String {
    format!("[{}]", embedding.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(","))
}

#[async_trait]
impl SimilarityStore for PgVectorStore {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn rank_by_similarity(
        &self,
        corpus: Corpus,
        embedding: &[f32],
        request: &RankRequest,
    ) -> Result<Vec<SearchResult>> {
        let limit = i64::try_from(request.limit).unwrap_or(i64::MAX);
        let rows: Vec<RankedRow> = self
            .bounded(
                "rank",
                sqlx::query_as::<_, RankedRow>(&self.queries(corpus).rank)
                    .bind(vector_literal(embedding))
                    .bind(request.threshold.map(f64::from))
                    .bind(request.component.as_deref())
                    .bind(limit)
                    .fetch_all(&self.pool),
            )
            .await?;

        debug!(%corpus, rows = rows.len(), component = ?request.component, "ranked chunks");
        Ok(rows
            .into_iter()
            .map(|row| SearchResult::new(row.chunk.into(), row.similarity as f32))
            .collect())
    }

    async fn get_by_id(&self, corpus: Corpus, id: &str) -> Result<Option<Chunk>> {
        let row: Option<ChunkRow> = self
            .bounded(
                "get_by_id",
                sqlx::query_as::<_, ChunkRow>(&self.queries(corpus).by_id).bind(id).fetch_optional(&self.pool),
            )
            .await?;
        Ok(row.map(Chunk::from))
    }

    async fn get_parent_context(&self, corpus: Corpus, id: &str) -> Result<Option<ParentContext>> {
        let row: Option<ParentRow> = self
            .bounded(
                "get_parent_context",
                sqlx::query_as::<_, ParentRow>(&self.queries(corpus).parent).bind(id).fetch_optional(&self.pool),
            )
            .await?;
        Ok(row.map(|row| ParentContext { section_path: row.section_path, content: row.content }))
    }

    async fn get_by_component(&self, corpus: Corpus, component: &str) -> Result<Vec<Chunk>> {
        let rows: Vec<ChunkRow> = self
            .bounded(
                "get_by_component",
                sqlx::query_as::<_, ChunkRow>(&self.queries(corpus).by_component)
                    .bind(component)
                    .fetch_all(&self.pool),
            )
            .await?;
        Ok(rows.into_iter().map(Chunk::from).collect())
    }

    async fn list_distinct_components(&self, corpus: Corpus) -> Result<Vec<String>> {
        let mut components: Vec<String> = self
            .bounded(
                "list_distinct_components",
                sqlx::query_scalar::<_, String>(&self.queries(corpus).components).fetch_all(&self.pool),
            )
            .await?;
        // Database collation may differ from byte order.
        components.sort();
        Ok(components)
    }

    async fn stats(&self, corpus: Corpus) -> Result<CorpusStats> {
        let row: StatsRow = self
            .bounded("stats", sqlx::query_as::<_, StatsRow>(&self.queries(corpus).stats).fetch_one(&self.pool))
            .await?;
        Ok(CorpusStats::new(
            u64::try_from(row.total_chunks).unwrap_or(0),
            u64::try_from(row.unique_components).unwrap_or(0),
            row.avg_token_count,
        ))
    }
}
