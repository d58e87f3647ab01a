//! Protocol Flows
//!
//! Drives the MCP server the way a client would: initialize, list tools,
//! call them, and check the response envelope and error shapes.

use elefante_e2e_tests::harness::TestEngine;
use elefante_mcp::protocol::types::{JsonRpcRequest, JsonRpcResponse};
use elefante_mcp::McpServer;
use serde_json::{json, Value};

const PROTOCOLS_KEY: &str = "MANDATORY_PROTOCOLS_READ_THIS_FIRST";

fn request(id: i64, method: &str, params: Value) -> JsonRpcRequest {
    JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        id: Some(json!(id)),
        method: method.to_string(),
        params: Some(params),
    }
}

async fn initialized_server() -> (McpServer, TestEngine) {
    let engine = TestEngine::new();
    let mut server = McpServer::new(engine.orchestrator.clone());
    let response = server
        .handle_request(request(0, "initialize", json!({"protocolVersion": "2025-03-26"})))
        .await
        .unwrap();
    assert!(response.error.is_none());
    (server, engine)
}

fn tool_payload(response: &JsonRpcResponse) -> Value {
    let text = response.result.as_ref().unwrap()["content"][0]["text"]
        .as_str()
        .unwrap();
    serde_json::from_str(text).unwrap()
}

async fn call_tool(server: &mut McpServer, id: i64, name: &str, arguments: Value) -> Value {
    let response = server
        .handle_request(request(
            id,
            "tools/call",
            json!({"name": name, "arguments": arguments}),
        ))
        .await
        .unwrap();
    assert!(response.error.is_none(), "transport-level error for {name}");
    tool_payload(&response)
}

#[tokio::test]
async fn initialize_reports_server_info() {
    let engine = TestEngine::new();
    let mut server = McpServer::new(engine.orchestrator.clone());

    let response = server
        .handle_request(request(0, "initialize", json!({})))
        .await
        .unwrap();
    let result = response.result.unwrap();
    assert_eq!(result["serverInfo"]["name"], "elefante");
    assert!(result["protocolVersion"].is_string());
    assert!(result["capabilities"]["tools"].is_object());
}

#[tokio::test]
async fn every_tool_response_carries_the_envelope() {
    let (mut server, _engine) = initialized_server().await;

    let payload = call_tool(&mut server, 1, "elefanteSystemStatusGet", json!({})).await;
    assert!(payload[PROTOCOLS_KEY].is_array());

    let payload = call_tool(
        &mut server,
        2,
        "elefanteMemoryAdd",
        json!({"content": "The deploy pipeline gates on green CI"}),
    )
    .await;
    assert_eq!(payload["success"], true);
    let reminders = payload[PROTOCOLS_KEY].as_array().unwrap();
    assert!(reminders
        .iter()
        .any(|r| r.as_str().unwrap().contains("layer")));
}

#[tokio::test]
async fn add_search_listall_flow() {
    let (mut server, _engine) = initialized_server().await;

    let added = call_tool(
        &mut server,
        1,
        "elefanteMemoryAdd",
        json!({
            "content": "I prefer Black formatter with line-length 100",
            "layer": "self",
            "sublayer": "preference",
            "memoryType": "preference",
            "importance": 8
        }),
    )
    .await;
    assert_eq!(added["status"], "new");

    let found = call_tool(
        &mut server,
        2,
        "elefanteMemorySearch",
        json!({"query": "my preference for formatting", "minSimilarity": 0.3}),
    )
    .await;
    assert!(found["count"].as_u64().unwrap() >= 1);
    assert_eq!(found["results"][0]["memoryId"], added["memoryId"]);

    let listed = call_tool(&mut server, 3, "elefanteMemoryListAll", json!({})).await;
    assert_eq!(listed["count"], 1);
}

#[tokio::test]
async fn cypher_safety_rejects_destructive_query() {
    let (mut server, engine) = initialized_server().await;

    call_tool(
        &mut server,
        1,
        "elefanteMemoryAdd",
        json!({"content": "a memory that must survive"}),
    )
    .await;
    let before = engine.orchestrator.vector().stats().unwrap().count;

    let payload = call_tool(
        &mut server,
        2,
        "elefanteGraphQuery",
        json!({"query": "MATCH (n) DETACH DELETE n"}),
    )
    .await;
    assert_eq!(payload["success"], false);
    assert_eq!(payload["errorKind"], "invalid_input");
    assert!(payload[PROTOCOLS_KEY].is_array());

    // Stores remain intact
    assert_eq!(engine.orchestrator.vector().stats().unwrap().count, before);
    assert!(engine.orchestrator.graph().stats().unwrap().entities >= 1);
}

#[tokio::test]
async fn graph_connect_and_context_flow() {
    let (mut server, _engine) = initialized_server().await;

    let connected = call_tool(
        &mut server,
        1,
        "elefanteGraphConnect",
        json!({
            "entities": [
                {"ref": "svc", "name": "Billing", "entityType": "project"},
                {"ref": "db", "name": "PostgreSQL", "entityType": "technology"}
            ],
            "relationships": [
                {"from": "svc", "to": "db", "relationshipType": "USES"}
            ]
        }),
    )
    .await;
    assert_eq!(connected["relationshipsCreated"], 1);

    let rows = call_tool(
        &mut server,
        2,
        "elefanteGraphQuery",
        json!({
            "query": "SELECT name FROM entities WHERE entity_type = :kind ORDER BY name",
            "params": {"kind": "technology"}
        }),
    )
    .await;
    assert_eq!(rows["rows"][0]["name"], "PostgreSQL");
}

#[tokio::test]
async fn consolidate_dry_run_then_apply() {
    let (mut server, _engine) = initialized_server().await;

    call_tool(
        &mut server,
        1,
        "elefanteMemoryAdd",
        json!({"content": "LAW 11 - NO EMOJIS", "importance": 10}),
    )
    .await;
    call_tool(
        &mut server,
        2,
        "elefanteMemoryAdd",
        json!({"content": "CRITICAL CONSTRAINT: Do NOT use emojis", "importance": 9, "forceNew": true}),
    )
    .await;

    let dry = call_tool(&mut server, 3, "elefanteMemoryConsolidate", json!({"apply": false})).await;
    assert_eq!(dry["applied"], false);
    assert_eq!(dry["stats"]["duplicateGroups"], 1);

    let applied = call_tool(&mut server, 4, "elefanteMemoryConsolidate", json!({"apply": true})).await;
    assert_eq!(applied["applied"], true);
    assert_eq!(applied["stats"]["redundantMarked"], 1);
}

#[tokio::test]
async fn etl_flow_over_protocol() {
    let (mut server, _engine) = initialized_server().await;

    call_tool(
        &mut server,
        1,
        "elefanteMemoryAdd",
        json!({"content": "An unclassified note about the graph"}),
    )
    .await;

    let surfaced = call_tool(&mut server, 2, "elefanteETLProcess", json!({"limit": 5})).await;
    assert_eq!(surfaced["count"], 1);
    let memory_id = surfaced["items"][0]["memoryId"].clone();

    let classified = call_tool(
        &mut server,
        3,
        "elefanteETLClassify",
        json!({
            "memoryId": memory_id,
            "ring": "leaf",
            "knowledgeType": "fact",
            "topic": "general",
            "summary": "a note about the graph"
        }),
    )
    .await;
    assert_eq!(classified["processingStatus"], "processed");

    let status = call_tool(&mut server, 4, "elefanteETLStatus", json!({})).await;
    assert_eq!(status["status"]["processed"], 1);
}

#[tokio::test]
async fn dashboard_refresh_writes_snapshot() {
    let (mut server, engine) = initialized_server().await;

    call_tool(
        &mut server,
        1,
        "elefanteMemoryAdd",
        json!({"content": "memory feeding the dashboard"}),
    )
    .await;

    let payload = call_tool(&mut server, 2, "elefanteDashboardOpen", json!({"refresh": true})).await;
    assert_eq!(payload["refreshed"], true);
    assert!(engine.orchestrator.config().snapshot_path().exists());
}

#[tokio::test]
async fn unknown_tool_and_unknown_method() {
    let (mut server, _engine) = initialized_server().await;

    let payload = call_tool(&mut server, 1, "elefanteNotATool", json!({})).await;
    assert_eq!(payload["success"], false);
    assert!(payload["error"].as_str().unwrap().contains("ToolNotFound"));

    let response = server
        .handle_request(request(2, "resources/wipe", json!({})))
        .await
        .unwrap();
    assert_eq!(response.error.unwrap().code, -32601);
}
