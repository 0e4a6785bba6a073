//! MCP tools for documentation retrieval.

use std::sync::Arc;

use docs_rag::{DocsToolset, LookupArgs, RetrievalEngine, SearchArgs, ToolOutput};
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo};
use rmcp::schemars;
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};
use serde::Deserialize;

/// Documentation retrieval MCP service.
#[derive(Clone)]
pub struct DocsRagService {
    tools: DocsToolset,
    tool_router: ToolRouter<Self>,
}

impl DocsRagService {
    pub fn new(engine: Arc<RetrievalEngine>) -> Self {
        Self { tools: DocsToolset::new(engine), tool_router: Self::tool_router() }
    }
}

#[tool_handler]
impl ServerHandler for DocsRagService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some("Semantic search over component documentation. Use 'hierarchical_documentation_lookup' for answers with parent-section context, 'documentation_lookup' for the flat corpus, and 'list_components' to see what is documented.".into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            ..Default::default()
        }
    }
}

// ============================================================================
// Tool Input Schemas
// ============================================================================

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct LookupRequest {
    /// Question about a component
    #[schemars(description = "Natural language question, e.g. 'How do I style a button?'")]
    pub query: String,

    #[schemars(description = "Maximum number of results (1-20, default 5)")]
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchChunksRequest {
    #[schemars(description = "Natural language search query")]
    pub query: String,

    #[schemars(description = "Maximum number of results (1-20, default 5)")]
    pub limit: Option<i64>,

    #[schemars(description = "Minimum cosine similarity; results at or below it are dropped")]
    pub threshold: Option<f32>,

    #[schemars(description = "Corpus to search: 'hierarchical' (default) or 'flat'")]
    pub corpus: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GetChunkRequest {
    #[schemars(description = "Chunk id")]
    pub id: String,

    #[schemars(description = "Corpus: 'hierarchical' (default) or 'flat'")]
    pub corpus: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ComponentRequest {
    #[schemars(description = "Exact component name, e.g. 'button'")]
    pub component: String,

    #[schemars(description = "Corpus: 'hierarchical' (default) or 'flat'")]
    pub corpus: Option<String>,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct CorpusRequest {
    #[schemars(description = "Corpus: 'hierarchical' (default) or 'flat'")]
    pub corpus: Option<String>,
}

impl From<LookupRequest> for LookupArgs {
    fn from(request: LookupRequest) -> Self {
        Self { query: request.query, limit: request.limit }
    }
}

impl From<SearchChunksRequest> for SearchArgs {
    fn from(request: SearchChunksRequest) -> Self {
        Self {
            query: request.query,
            limit: request.limit,
            threshold: request.threshold,
            corpus: request.corpus,
        }
    }
}

fn into_result(output: ToolOutput) -> Result<CallToolResult, McpError> {
    let content = vec![Content::text(output.text)];
    Ok(if output.is_error {
        CallToolResult::error(content)
    } else {
        CallToolResult::success(content)
    })
}

// ============================================================================
// Tools
// ============================================================================

#[tool_router]
impl DocsRagService {
    #[tool(description = "Search the flat documentation corpus. Returns the most relevant sections with their demo code as one formatted document.")]
    pub async fn documentation_lookup(
        &self,
        Parameters(request): Parameters<LookupRequest>,
    ) -> Result<CallToolResult, McpError> {
        into_result(self.tools.documentation_lookup(request.into()).await)
    }

    #[tool(description = "Search the hierarchical documentation corpus. Each result includes its parent section for context, plus demo code.")]
    pub async fn hierarchical_documentation_lookup(
        &self,
        Parameters(request): Parameters<LookupRequest>,
    ) -> Result<CallToolResult, McpError> {
        into_result(self.tools.hierarchical_documentation_lookup(request.into()).await)
    }

    #[tool(description = "Semantic search returning raw chunk records with similarity scores as JSON.")]
    pub async fn search_chunks(
        &self,
        Parameters(request): Parameters<SearchChunksRequest>,
    ) -> Result<CallToolResult, McpError> {
        into_result(self.tools.search_chunks(request.into()).await)
    }

    #[tool(description = "Fetch one documentation chunk by id.")]
    pub async fn get_chunk(
        &self,
        Parameters(request): Parameters<GetChunkRequest>,
    ) -> Result<CallToolResult, McpError> {
        into_result(self.tools.get_chunk(&request.id, request.corpus.as_deref()).await)
    }

    #[tool(description = "Fetch every documentation chunk of one component, ordered by id.")]
    pub async fn get_chunks_by_component(
        &self,
        Parameters(request): Parameters<ComponentRequest>,
    ) -> Result<CallToolResult, McpError> {
        into_result(
            self.tools
                .get_chunks_by_component(&request.component, request.corpus.as_deref())
                .await,
        )
    }

    #[tool(description = "List every documented component name.")]
    pub async fn list_components(
        &self,
        Parameters(request): Parameters<CorpusRequest>,
    ) -> Result<CallToolResult, McpError> {
        into_result(self.tools.list_components(request.corpus.as_deref()).await)
    }

    #[tool(description = "Corpus statistics: total chunks, unique components and average token count.")]
    pub async fn get_stats(
        &self,
        Parameters(request): Parameters<CorpusRequest>,
    ) -> Result<CallToolResult, McpError> {
        into_result(self.tools.get_stats(request.corpus.as_deref()).await)
    }
}
