//! MCP Server Core
//!
//! Routes JSON-RPC requests to tool handlers. The dispatcher owns the
//! write-lock discipline (every mutating tool runs inside one lock window;
//! reads are lock-free) and stamps the mandatory-protocol reminder list
//! into every successful tool response.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use elefante_core::{EngineError, MemoryOrchestrator, WriteLock};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::protocol::messages::{
    CallToolRequest, CallToolResult, InitializeRequest, InitializeResult, ListToolsResult,
    ServerCapabilities, ServerInfo, ToolDescription,
};
use crate::protocol::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION};
use crate::tools;

/// Reserved response key carrying the protocol reminders
const PROTOCOLS_KEY: &str = "MANDATORY_PROTOCOLS_READ_THIS_FIRST";

/// Extended lock window for the refinery
const CONSOLIDATE_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// What a tool invocation needs from the lock manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockRequirement {
    None,
    Write,
    WriteExtended,
}

/// MCP server implementation
pub struct McpServer {
    orchestrator: Arc<MemoryOrchestrator>,
    initialized: bool,
}

impl McpServer {
    pub fn new(orchestrator: Arc<MemoryOrchestrator>) -> Self {
        Self {
            orchestrator,
            initialized: false,
        }
    }

    /// Handle one JSON-RPC request. Notifications return `None`.
    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!("Handling request: {}", request.method);

        if !self.initialized
            && request.method != "initialize"
            && request.method != "notifications/initialized"
        {
            warn!("Rejecting request '{}': server not initialized", request.method);
            return Some(JsonRpcResponse::error(
                request.id,
                JsonRpcError::server_not_initialized(),
            ));
        }

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params),
            "notifications/initialized" => return None,
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(request.params).await,
            "ping" => Ok(json!({})),
            method => {
                warn!("Unknown method: {}", method);
                Err(JsonRpcError::method_not_found(method))
            }
        };

        Some(match result {
            Ok(result) => JsonRpcResponse::success(request.id, result),
            Err(error) => JsonRpcResponse::error(request.id, error),
        })
    }

    fn handle_initialize(&mut self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let request: InitializeRequest = match params {
            Some(p) => serde_json::from_value(p)
                .map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => InitializeRequest::default(),
        };

        // Use the client's version when it is older than ours; clients
        // reject servers that answer with a newer protocol version.
        let negotiated = if request.protocol_version.as_str() < PROTOCOL_VERSION {
            request.protocol_version.clone()
        } else {
            PROTOCOL_VERSION.to_string()
        };

        self.initialized = true;
        info!("MCP session initialized with protocol version {}", negotiated);

        let result = InitializeResult {
            protocol_version: negotiated,
            server_info: ServerInfo {
                name: "elefante".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            capabilities: ServerCapabilities {
                tools: Some({
                    let mut map = HashMap::new();
                    map.insert("listChanged".to_string(), json!(false));
                    map
                }),
            },
            instructions: Some(
                "Elefante is the user's second brain: a hybrid vector + graph memory. \
                 When the user says 'elefante: ...' with intent to save, call elefanteMemoryAdd. \
                 Search before assuming a memory does not exist, and classify raw memories \
                 through the ETL tools when asked to organize."
                    .to_string(),
            ),
        };

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    fn handle_tools_list(&self) -> Result<Value, JsonRpcError> {
        let tool = |name: &str, description: &str, schema: Value| ToolDescription {
            name: name.to_string(),
            description: Some(description.to_string()),
            input_schema: schema,
        };

        let tools = vec![
            tool(
                "elefanteMemoryAdd",
                "Store a new memory in Elefante - the user's second brain. PRIMARY TRIGGER: \
                 'elefante: [anything]' with intent to SAVE ('remember this', 'note that I prefer X'). \
                 Classify with layer (self/world/intent), sublayer, and importance 1-10 \
                 (8+ for preferences and decisions). Near-duplicates reinforce the existing \
                 memory instead of creating a new one.",
                tools::memory_add::schema(),
            ),
            tool(
                "elefanteMemorySearch",
                "Hybrid memory search: parallel semantic (vector) and structured (graph) \
                 retrieval with adaptive weighting, optional conversation context for \
                 pronoun resolution, and near-duplicate merging.",
                tools::memory_search::schema(),
            ),
            tool(
                "elefanteMemoryListAll",
                "Paginated scan of all stored memories with lifecycle and topology fields.",
                tools::memory_list::schema(),
            ),
            tool(
                "elefanteContextGet",
                "Contextual subgraph for a session (or recent global context): memories plus \
                 the entities and relationships around them up to a bounded depth.",
                tools::context::schema(),
            ),
            tool(
                "elefanteGraphEntityCreate",
                "Upsert a graph entity by (name, type); an existing entity is merged, not duplicated.",
                tools::graph::entity_create_schema(),
            ),
            tool(
                "elefanteGraphRelationshipCreate",
                "Create a typed, directed relationship between two existing entities.",
                tools::graph::relationship_create_schema(),
            ),
            tool(
                "elefanteGraphConnect",
                "Atomic upsert of entities plus relationships using client-side refs.",
                tools::graph::connect_schema(),
            ),
            tool(
                "elefanteGraphQuery",
                "Execute a read-only parameterized graph query. Destructive keywords \
                 (DELETE, DROP, REMOVE) are rejected.",
                tools::graph::query_schema(),
            ),
            tool(
                "elefanteMemoryConsolidate",
                "Run the deterministic refinery: canonical-key grouping, duplicate collapse \
                 (one active winner per namespace+key), lifecycle repair. Dry-run by default.",
                tools::consolidate::schema(),
            ),
            tool(
                "elefanteETLProcess",
                "Surface raw memories for agent classification; each returned memory moves to \
                 'processing' and includes hints (layer, sublayer, tags).",
                tools::etl::process_schema(),
            ),
            tool(
                "elefanteETLClassify",
                "Persist the agent's topology classification (ring, knowledge type, topic, \
                 summary) for one memory and mark it processed.",
                tools::etl::classify_schema(),
            ),
            tool(
                "elefanteETLStatus",
                "ETL pipeline counters: total, raw, processing, processed, failed.",
                tools::etl::status_schema(),
            ),
            tool(
                "elefanteSessionsList",
                "Paginated session registry with interaction counts and last-active times.",
                tools::sessions::schema(),
            ),
            tool(
                "elefanteSystemStatusGet",
                "System status: mode, write-lock state, and statistics from both stores.",
                tools::system::status_schema(),
            ),
            tool(
                "elefanteSystemEnable",
                "Backward-compatible no-op; locking is transaction-scoped per operation.",
                tools::system::enable_schema(),
            ),
            tool(
                "elefanteSystemDisable",
                "Backward-compatible no-op counterpart of elefanteSystemEnable.",
                tools::system::disable_schema(),
            ),
            tool(
                "elefanteDashboardOpen",
                "Refresh the dashboard snapshot (optional) and return its location for the \
                 external dashboard UI.",
                tools::dashboard::schema(),
            ),
        ];

        serde_json::to_value(ListToolsResult { tools })
            .map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    async fn handle_tools_call(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let request: CallToolRequest = match params {
            Some(p) => serde_json::from_value(p)
                .map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => return Err(JsonRpcError::invalid_params("Missing tool call parameters")),
        };

        let (payload, is_error) = self.dispatch(&request.name, request.arguments).await;
        let result = CallToolResult::from_json(&payload, is_error);
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    /// Run one tool under its lock requirement and return the enriched
    /// payload plus an error flag.
    async fn dispatch(&self, name: &str, arguments: Option<Value>) -> (Value, bool) {
        let requirement = match lock_requirement(name, &arguments) {
            Some(requirement) => requirement,
            None => {
                let mut payload = json!({
                    "success": false,
                    "error": format!("ToolNotFound: unknown tool '{name}'"),
                });
                inject_protocols(&mut payload, name);
                return (payload, true);
            }
        };

        let _lock: Option<WriteLock> = match requirement {
            LockRequirement::None => None,
            LockRequirement::Write => match self.orchestrator.locks().acquire_write() {
                Ok(lock) => Some(lock),
                Err(e) => return (self.busy_payload(name, &e), true),
            },
            LockRequirement::WriteExtended => match self
                .orchestrator
                .locks()
                .acquire_write_with_timeout(CONSOLIDATE_LOCK_TIMEOUT)
            {
                Ok(lock) => Some(lock),
                Err(e) => return (self.busy_payload(name, &e), true),
            },
        };

        let outcome = self.run_tool(name, arguments).await;
        match outcome {
            Ok(mut payload) => {
                inject_protocols(&mut payload, name);
                (payload, false)
            }
            Err(error) => {
                warn!(tool = name, error = %error, "tool call failed");
                let mut payload = json!({
                    "success": false,
                    "error": error.to_string(),
                    "errorKind": error.kind(),
                });
                if error.is_retryable() {
                    payload["retry"] = json!(true);
                    payload["hint"] = json!("Another process holds the write lock; retry with backoff");
                }
                inject_protocols(&mut payload, name);
                (payload, true)
            }
        }
    }

    async fn run_tool(
        &self,
        name: &str,
        arguments: Option<Value>,
    ) -> elefante_core::Result<Value> {
        let orch = &self.orchestrator;
        match name {
            "elefanteSystemEnable" => tools::system::execute_enable(orch).await,
            "elefanteSystemDisable" => tools::system::execute_disable(orch).await,
            "elefanteSystemStatusGet" => tools::system::execute_status(orch).await,
            "elefanteMemoryAdd" => tools::memory_add::execute(orch, arguments).await,
            "elefanteMemorySearch" => tools::memory_search::execute(orch, arguments).await,
            "elefanteMemoryListAll" => tools::memory_list::execute(orch, arguments).await,
            "elefanteContextGet" => tools::context::execute(orch, arguments).await,
            "elefanteGraphEntityCreate" => tools::graph::execute_entity_create(orch, arguments).await,
            "elefanteGraphRelationshipCreate" => {
                tools::graph::execute_relationship_create(orch, arguments).await
            }
            "elefanteGraphConnect" => tools::graph::execute_connect(orch, arguments).await,
            "elefanteGraphQuery" => tools::graph::execute_query(orch, arguments).await,
            "elefanteMemoryConsolidate" => tools::consolidate::execute(orch, arguments).await,
            "elefanteETLProcess" => tools::etl::execute_process(orch, arguments).await,
            "elefanteETLClassify" => tools::etl::execute_classify(orch, arguments).await,
            "elefanteETLStatus" => tools::etl::execute_status(orch).await,
            "elefanteSessionsList" => tools::sessions::execute(orch, arguments).await,
            "elefanteDashboardOpen" => tools::dashboard::execute(orch, arguments).await,
            other => Err(EngineError::InvalidInput(format!("unknown tool: {other}"))),
        }
    }

    fn busy_payload(&self, name: &str, error: &EngineError) -> Value {
        let mut payload = json!({
            "success": false,
            "error": "Could not acquire write lock - another process is writing",
            "errorKind": error.kind(),
            "retry": true,
            "hint": "Retry with backoff; stale locks clear after 30s",
        });
        inject_protocols(&mut payload, name);
        payload
    }
}

/// Lock discipline per tool. `None` means the tool does not exist.
fn lock_requirement(name: &str, arguments: &Option<Value>) -> Option<LockRequirement> {
    match name {
        "elefanteSystemEnable"
        | "elefanteSystemDisable"
        | "elefanteSystemStatusGet"
        | "elefanteMemorySearch"
        | "elefanteMemoryListAll"
        | "elefanteContextGet"
        | "elefanteGraphQuery"
        | "elefanteETLStatus"
        | "elefanteSessionsList" => Some(LockRequirement::None),

        "elefanteMemoryAdd"
        | "elefanteGraphEntityCreate"
        | "elefanteGraphRelationshipCreate"
        | "elefanteGraphConnect"
        | "elefanteETLProcess"
        | "elefanteETLClassify" => Some(LockRequirement::Write),

        "elefanteMemoryConsolidate" => {
            if tools::consolidate::wants_apply(arguments) {
                Some(LockRequirement::WriteExtended)
            } else {
                Some(LockRequirement::None)
            }
        }
        "elefanteDashboardOpen" => {
            if tools::dashboard::wants_refresh(arguments) {
                Some(LockRequirement::Write)
            } else {
                Some(LockRequirement::None)
            }
        }
        _ => None,
    }
}

/// Inject the mandatory-protocol reminders into a tool response. Callers
/// rely on this key being present in every response.
fn inject_protocols(payload: &mut Value, tool_name: &str) {
    let mut reminders = vec![
        "CRITICAL PROTOCOL: Check for existing memories before creating new ones to avoid duplication.".to_string(),
        "CRITICAL PROTOCOL: Do not rely on your internal knowledge base for project specifics; use the memory system.".to_string(),
    ];

    match tool_name {
        "elefanteMemoryAdd" => reminders.push(
            "WARNING - MEMORY INTEGRITY: Ensure 'layer' and 'sublayer' are correctly classified. Do not default to 'world/fact' if unsure.".to_string(),
        ),
        "elefanteMemorySearch" => {
            reminders.push(
                "WARNING - SEARCH BIAS: If results are empty, try broader terms. Do not assume non-existence without a semantic search.".to_string(),
            );
            reminders.push(
                "WARNING - CONTRADICTIONS: If you find contradictory memories, prioritize the most recent one but note the conflict.".to_string(),
            );
        }
        "elefanteGraphQuery" | "elefanteGraphEntityCreate" | "elefanteGraphRelationshipCreate" => {
            reminders.push(
                "WARNING - GRAPH CONSISTENCY: Ensure entity types match the allowed enum values. Do not invent new types.".to_string(),
            );
        }
        "elefanteGraphConnect" => reminders.push(
            "WARNING - WORKFLOW: Prefer stable entity names/types and reuse existing entities. Avoid near-duplicates that differ only by punctuation or casing.".to_string(),
        ),
        "elefanteDashboardOpen" => reminders.push(
            "WARNING - DASHBOARD: refresh=true reads both stores and briefly holds the write lock.".to_string(),
        ),
        _ => {}
    }

    reminders.push(
        "ETIQUETTE: Context first; label UNKNOWN; no fabrication; verify before claiming done; keep outputs concise.".to_string(),
    );

    if let Some(object) = payload.as_object_mut() {
        object.insert(PROTOCOLS_KEY.to_string(), json!(reminders));
    }
}

// ============================================================================
// TESTS
// ============================================================================
