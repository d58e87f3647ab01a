//! Invariant Properties
//!
//! Quantified checks over the engine: id parity between stores, lifecycle
//! coupling, canonical uniqueness, refinery idempotence, ingestion dedup,
//! search monotonicity, write-lock exclusion, and the test-memory guard.

use std::collections::HashSet;
use std::time::Duration;

use elefante_core::{
    EntityType, IngestOutcome, MemoryStatus, QueryMode, SearchFilters, SearchParams,
    WriteLockManager,
};
use elefante_e2e_tests::harness::{input, preference_input, TestEngine};
use uuid::Uuid;

fn all_memory_ids(engine: &TestEngine) -> Vec<Uuid> {
    engine
        .orchestrator
        .list_memories(
            500,
            0,
            &SearchFilters {
                include_archived: true,
                ..Default::default()
            },
        )
        .unwrap()
        .iter()
        .map(|m| m.id)
        .collect()
}

#[tokio::test]
async fn p1_id_parity_between_stores() {
    let engine = TestEngine::new();
    let orch = &engine.orchestrator;

    let mut ids = vec![];
    for content in [
        "the deploy window opens at nine",
        "kubernetes cluster runs three nodes",
        "I prefer short commit messages",
    ] {
        let mut add = input(content);
        add.force_new = true;
        ids.push(orch.add_memory(add).await.unwrap().unwrap().memory.id);
    }
    orch.delete_memory(ids[1]).await.unwrap();

    // Every vector record has a graph node of type memory
    for id in all_memory_ids(&engine) {
        let node = orch.graph().get_entity(id).unwrap().expect("graph node exists");
        assert_eq!(node.entity_type, EntityType::Memory);
    }

    // Every memory-typed graph node has a vector record
    let vector_ids: HashSet<Uuid> = all_memory_ids(&engine).into_iter().collect();
    for node in orch.graph().entities_by_type(EntityType::Memory, 500, 0).unwrap() {
        assert!(vector_ids.contains(&node.id), "orphan graph node {}", node.id);
    }
    assert!(!vector_ids.contains(&ids[1]));
}

#[tokio::test]
async fn p2_p3_lifecycle_coupling_and_canonical_uniqueness() {
    let engine = TestEngine::new();
    let orch = &engine.orchestrator;

    for content in [
        "LAW 11 - NO EMOJIS",
        "CRITICAL CONSTRAINT: Do NOT use emojis",
        "Reminder: emojis are banned in output",
    ] {
        let mut add = input(content);
        add.force_new = true;
        orch.add_memory(add).await.unwrap().unwrap();
    }

    orch.consolidate(true).unwrap();

    let memories = orch
        .list_memories(
            500,
            0,
            &SearchFilters {
                include_archived: true,
                ..Default::default()
            },
        )
        .unwrap();

    // P2: redundant implies archived and deprecated
    for memory in &memories {
        if memory.status == MemoryStatus::Redundant {
            assert!(memory.archived && memory.deprecated, "I2 drift on {}", memory.id);
        }
    }

    // P3: at most one active member per (namespace, canonical_key)
    let mut active_per_group: std::collections::HashMap<(String, String), usize> =
        std::collections::HashMap::new();
    for memory in &memories {
        if memory.is_active() {
            let key = (
                memory.namespace.as_str().to_string(),
                memory.canonical_key.clone().unwrap_or_default(),
            );
            *active_per_group.entry(key).or_default() += 1;
        }
    }
    for (group, count) in active_per_group {
        assert!(count <= 1, "group {group:?} has {count} active members");
    }
}

#[tokio::test]
async fn p4_refinery_is_idempotent() {
    let engine = TestEngine::new();
    let orch = &engine.orchestrator;

    for content in ["LAW 11 - NO EMOJIS", "Do NOT use emojis, ever"] {
        let mut add = input(content);
        add.force_new = true;
        orch.add_memory(add).await.unwrap().unwrap();
    }

    let first = orch.consolidate(true).unwrap();
    assert!(first.changed > 0);

    let second = orch.consolidate(true).unwrap();
    assert_eq!(second.changed, 0);
    assert_eq!(second.stats.redundant_marked, 0);
    assert_eq!(second.stats.planned_updates, 0);
}

#[tokio::test]
async fn p5_near_duplicate_ingest_reinforces() {
    let engine = TestEngine::new();
    let orch = &engine.orchestrator;

    let first = orch
        .add_memory(preference_input("My favorite color is definitely Electric Blue."))
        .await
        .unwrap()
        .unwrap();
    let second = orch
        .add_memory(preference_input(
            "I really love Electric Blue, it is my favorite color.",
        ))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(second.outcome, IngestOutcome::Reinforced);
    assert_eq!(second.memory.id, first.memory.id);
    assert_eq!(orch.vector().stats().unwrap().count, 1);
}

#[tokio::test]
async fn p6_search_monotone_in_min_similarity() {
    let engine = TestEngine::new();
    let orch = &engine.orchestrator;

    for content in [
        "kubernetes cluster autoscaling policy",
        "the release deploy gates on CI",
        "I prefer Black formatter",
    ] {
        let mut add = input(content);
        add.force_new = true;
        orch.add_memory(add).await.unwrap().unwrap();
    }

    let mut counts = vec![];
    for min_similarity in [0.0_f32, 0.3, 0.6, 0.9] {
        let results = orch
            .search(SearchParams {
                query: "cluster deploy".to_string(),
                mode: QueryMode::Semantic,
                limit: 10,
                min_similarity,
                ..Default::default()
            })
            .await
            .unwrap();
        counts.push(results.len());
    }
    for window in counts.windows(2) {
        assert!(window[1] <= window[0], "counts not monotone: {counts:?}");
    }
}

#[tokio::test]
async fn p9_write_lock_exclusion() {
    let engine = TestEngine::new();
    let config = engine.orchestrator.config().clone();

    let writer_a = WriteLockManager::new(
        config.write_lock_path(),
        Duration::from_millis(300),
        Duration::from_secs(30),
    );
    let writer_b = WriteLockManager::new(
        config.write_lock_path(),
        Duration::from_millis(300),
        Duration::from_secs(30),
    );

    let held = writer_a.acquire_write().unwrap();
    let err = writer_b.acquire_write().unwrap_err();
    assert!(err.is_retryable());

    held.release();
    writer_b.acquire_write().unwrap().release();
}

#[tokio::test]
async fn p10_test_quarantine_leaves_stores_unchanged() {
    let engine = TestEngine::new();
    let orch = &engine.orchestrator;

    orch.add_memory(input("a normal production note"))
        .await
        .unwrap()
        .unwrap();
    let before_vector = orch.vector().stats().unwrap().count;
    let before_graph = orch.graph().stats().unwrap().entities;

    let mut quarantined = input("Elefante e2e test memory: probe");
    quarantined.tags = vec!["e2e".to_string()];
    assert!(orch.add_memory(quarantined).await.unwrap().is_none());

    assert_eq!(orch.vector().stats().unwrap().count, before_vector);
    assert_eq!(orch.graph().stats().unwrap().entities, before_graph);
}
