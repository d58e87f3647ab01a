//! End-to-End Scenarios
//!
//! Full-pipeline flows through the orchestrator: reinforcement of
//! near-verbatim restatements, refinery collapse of canonical duplicates,
//! the test-memory guard, session-aware hybrid search, and graph context.

use elefante_core::{
    IngestOutcome, MemoryStatus, QueryMode, RelationshipType, SearchFilters, SearchParams,
};
use elefante_e2e_tests::harness::{conversation_input, input, preference_input, TestEngine};
use elefante_e2e_tests::mocks::ConceptEmbedder;
use uuid::Uuid;

#[tokio::test]
async fn exact_reinforce_keeps_one_record() {
    let engine = TestEngine::new();
    let orch = &engine.orchestrator;

    let first = orch
        .add_memory(preference_input("My favorite color is definitely Electric Blue."))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.outcome, IngestOutcome::New);

    let second = orch
        .add_memory(preference_input(
            "I really love Electric Blue, it is my favorite color.",
        ))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(second.outcome, IngestOutcome::Reinforced);
    assert_eq!(second.memory.id, first.memory.id);
    assert!(second.memory.access_count >= 2);
    assert!(second.memory.importance >= first.memory.importance);
    assert_eq!(orch.vector().stats().unwrap().count, 1);
}

#[tokio::test]
async fn refinery_collapses_canonical_duplicates() {
    let engine = TestEngine::new();
    let orch = &engine.orchestrator;

    // Same concept (emoji ban) in different words; force_new keeps both
    // records so the refinery has work to do.
    let mut a = input("LAW 11 - NO EMOJIS");
    a.importance = Some(10);
    let a = orch.add_memory(a).await.unwrap().unwrap();

    let mut b = input("CRITICAL CONSTRAINT: Do NOT use emojis");
    b.importance = Some(10);
    b.force_new = true;
    let b = orch.add_memory(b).await.unwrap().unwrap();

    // Give b the higher access count; with equal importance the access
    // count decides the winner.
    orch.vector().touch(&[b.memory.id]).unwrap();
    orch.vector().touch(&[b.memory.id]).unwrap();

    let report = orch.consolidate(true).unwrap();
    assert!(report.applied);
    assert_eq!(report.stats.redundant_marked, 1);

    let loser = orch.vector().get(a.memory.id).unwrap().unwrap();
    let winner = orch.vector().get(b.memory.id).unwrap().unwrap();

    assert_eq!(loser.status, MemoryStatus::Redundant);
    assert!(loser.archived);
    assert!(loser.deprecated);
    assert_eq!(loser.superseded_by_id, Some(winner.id));
    assert_eq!(loser.relationship_type, Some(RelationshipType::Supersedes));
    assert!(winner.is_active());
}

#[tokio::test]
async fn refinery_importance_outranks_access_count() {
    let engine = TestEngine::new();
    let orch = &engine.orchestrator;

    let mut a = input("LAW 11 - NO EMOJIS");
    a.importance = Some(10);
    let a = orch.add_memory(a).await.unwrap().unwrap();

    let mut b = input("CRITICAL CONSTRAINT: Do NOT use emojis");
    b.importance = Some(9);
    b.force_new = true;
    let b = orch.add_memory(b).await.unwrap().unwrap();
    for _ in 0..5 {
        orch.vector().touch(&[b.memory.id]).unwrap();
    }

    orch.consolidate(true).unwrap();

    // Strict winner ordering puts importance before access count
    assert!(orch.vector().get(a.memory.id).unwrap().unwrap().is_active());
    assert_eq!(
        orch.vector().get(b.memory.id).unwrap().unwrap().status,
        MemoryStatus::Redundant
    );
}

#[tokio::test]
async fn test_memory_guard_quarantines_and_allows() {
    // Default configuration: quarantined, both stores untouched
    let engine = TestEngine::new();
    let orch = &engine.orchestrator;

    let mut quarantined = input("Test memory for guard");
    quarantined.tags = vec!["test".to_string()];
    assert!(orch.add_memory(quarantined).await.unwrap().is_none());
    assert_eq!(orch.vector().stats().unwrap().count, 0);
    assert_eq!(orch.graph().stats().unwrap().entities, 0);

    // Allowed configuration: persisted under the test namespace
    let engine = TestEngine::allowing_test_memories();
    let orch = &engine.orchestrator;
    let mut allowed = input("Test memory for guard");
    allowed.tags = vec!["test".to_string()];
    let stored = orch.add_memory(allowed).await.unwrap().unwrap();
    assert_eq!(stored.memory.namespace, elefante_core::Namespace::Test);
}

#[tokio::test]
async fn hybrid_search_resolves_preference_via_session() {
    let engine = TestEngine::new();
    let orch = &engine.orchestrator;
    let session_id = Uuid::new_v4();

    let mut preference = preference_input("I prefer Black formatter with line-length 100");
    preference.session_id = Some(session_id);
    let stored = orch.add_memory(preference).await.unwrap().unwrap();

    // Some unrelated chatter in the same session
    orch.add_memory(conversation_input("the standup moved to 10am", session_id))
        .await
        .unwrap()
        .unwrap();

    let results = orch
        .search(SearchParams {
            query: "my preference for formatting".to_string(),
            mode: QueryMode::Hybrid,
            limit: 5,
            min_similarity: 0.3,
            include_conversation: true,
            include_stored: true,
            session_id: Some(session_id),
            filters: SearchFilters::default(),
        })
        .await
        .unwrap();

    assert!(!results.is_empty());
    assert_eq!(results[0].memory.id, stored.memory.id);
    assert!(matches!(
        results[0].source,
        elefante_core::CandidateSource::Hybrid
            | elefante_core::CandidateSource::Conversation
            | elefante_core::CandidateSource::Vector
    ));
}

#[tokio::test]
async fn graph_context_returns_entity_and_relationship() {
    let engine = TestEngine::new();
    let orch = &engine.orchestrator;

    let mut with_entity = input("TestEntity anchors the integration scenario");
    with_entity.entities = vec![elefante_core::EntityRef {
        name: "TestEntity".to_string(),
        entity_type: elefante_core::EntityType::Concept,
        description: None,
    }];
    orch.add_memory(with_entity).await.unwrap().unwrap();

    let bundle = orch.get_context(None, 2, 10).await.unwrap();
    assert!(bundle.entities.iter().any(|e| e.name == "TestEntity"));
    assert!(bundle
        .relationships
        .iter()
        .any(|r| r.relationship_type == RelationshipType::RelatesTo));
}

#[tokio::test]
async fn delete_removes_from_both_stores() {
    let engine = TestEngine::new();
    let orch = &engine.orchestrator;

    let stored = orch
        .add_memory(input("short-lived note about the deploy"))
        .await
        .unwrap()
        .unwrap();
    let id = stored.memory.id;

    assert!(orch.delete_memory(id).await.unwrap());
    assert!(orch.vector().get(id).unwrap().is_none());
    assert!(orch.graph().get_entity(id).unwrap().is_none());
}

#[tokio::test]
async fn etl_round_trip_classifies_topology() {
    let engine = TestEngine::new();
    let orch = &engine.orchestrator;

    orch.add_memory(input("The deploy pipeline gates on green CI"))
        .await
        .unwrap()
        .unwrap();

    let surfaced = orch.etl_process(10).unwrap();
    assert_eq!(surfaced.len(), 1);

    let classified = orch
        .etl_classify(&elefante_core::EtlClassification {
            memory_id: surfaced[0].memory_id,
            ring: "leaf".to_string(),
            knowledge_type: "method".to_string(),
            topic: "workflow".to_string(),
            summary: "deploys gate on green CI".to_string(),
            owner_id: None,
        })
        .unwrap();

    assert_eq!(classified.ring, Some(elefante_core::Ring::Leaf));
    assert_eq!(classified.owner_id.as_deref(), Some("owner-jay"));

    let status = orch.etl_status().unwrap();
    assert_eq!(status.processed, 1);
    assert_eq!(status.raw, 0);
}

#[tokio::test]
async fn mock_embedder_wired_through_engine() {
    let engine = TestEngine::new();
    let embedder = ConceptEmbedder::new();
    assert_eq!(
        engine.orchestrator.embedder().dimension(),
        elefante_core::Embedder::dimension(&embedder)
    );
}
