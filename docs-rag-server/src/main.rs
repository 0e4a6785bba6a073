//! Documentation retrieval MCP server.
//!
//! ## Tools
//!
//! - `documentation_lookup` - formatted search over the flat corpus
//! - `hierarchical_documentation_lookup` - formatted search with parent sections
//! - `search_chunks` - structured search results as JSON
//! - `get_chunk`, `get_chunks_by_component` - point lookups
//! - `list_components`, `get_stats` - corpus overview
//!
//! ## Usage
//!
//! Add to your MCP client configuration:
//! ```json
//! {
//!   "mcpServers": {
//!     "docs-rag": {
//!       "command": "docs-rag-mcp",
//!       "env": { "DB_HOST": "localhost", "EMBEDDING_URL": "http://localhost:11434/api/embed" }
//!     }
//!   }
//! }
//! ```

use std::sync::Arc;

use anyhow::Result;
use docs_rag::{EngineConfig, PgVectorStore, RetrievalEngine, provider_from_config};
use rmcp::ServiceExt;
use rmcp::transport::stdio;
use tracing_subscriber::EnvFilter;

mod service;

use service::DocsRagService;

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries protocol frames
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = EngineConfig::from_env()?;
    tracing::info!(
        embedding.backend = ?config.embedding.backend,
        embedding.model = %config.embedding.model,
        db.host = %config.storage.host,
        db.name = %config.storage.database,
        "starting docs-rag MCP server"
    );

    let embedding_provider = provider_from_config(&config.embedding)?;
    let store = Arc::new(PgVectorStore::connect_lazy(&config.storage, &config.tables));
    let engine = RetrievalEngine::builder()
        .config(config)
        .embedding_provider(embedding_provider)
        .store(store)
        .build()?;

    let server = DocsRagService::new(Arc::new(engine)).serve(stdio()).await?;
    server.waiting().await?;

    tracing::info!("docs-rag MCP server stopped");
    Ok(())
}
