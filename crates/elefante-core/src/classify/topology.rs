//! Knowledge Topology Classifier
//!
//! Deterministic placement of memories into the knowledge topology:
//! ring (core/domain/topic/leaf), knowledge type, topic, one-line summary,
//! and owner. Fixed pattern tables over content substrings; no model calls.

use std::sync::LazyLock;

use regex::Regex;

use crate::memory::record::{KnowledgeType, Layer, MemoryType, Ring};

// ============================================================================
// PATTERN TABLES
// ============================================================================

struct PatternTable {
    knowledge_type: KnowledgeType,
    patterns: Vec<Regex>,
}

static KNOWLEDGE_TYPE_PATTERNS: LazyLock<Vec<PatternTable>> = LazyLock::new(|| {
    let table = |knowledge_type, raw: &[&str]| PatternTable {
        knowledge_type,
        patterns: raw
            .iter()
            .map(|p| Regex::new(&format!("(?i){}", p)).expect("valid topology pattern"))
            .collect(),
    };

    vec![
        table(
            KnowledgeType::Law,
            &[
                r"\bLAW\s*\d+",
                r"\bNEVER\b.*\b(use|do|allow|say)\b",
                r"\bALWAYS\b.*\bMUST\b",
                r"\bMANDATORY\b",
                r"\bCRITICAL CONSTRAINT\b",
                r"\bDO NOT\b",
                r"\bFORBIDDEN\b",
                r"\bPROHIBITED\b",
            ],
        ),
        table(
            KnowledgeType::Principle,
            &[
                r"\bThe Rule:",
                r"\bPRIME DIRECTIVE\b",
                r"\bCORE IDENTITY\b",
                r"\bFOUNDATION\b",
                r"\bAmbiguity is a bug\b",
                r"\bContext First\b",
                r"\bTruth\b.*\bNon-Fabrication\b",
            ],
        ),
        table(
            KnowledgeType::Method,
            &[
                r"\bProtocol\b",
                r"\bWorkflow\b",
                r"\bPhase\s*\d+\b",
                r"\bMeta-loop\b",
                r"\bChecklist\b",
                r"→.*→",
                r"\bRequirements.*Design.*Tasks\b",
            ],
        ),
        table(
            KnowledgeType::Decision,
            &[
                r"\bChose\b",
                r"\bDecided\b",
                r"\bWe will\b",
                r"\bSelected\b",
                r"\bprefers?\b.*\bover\b",
            ],
        ),
        table(
            KnowledgeType::Insight,
            &[
                r"\bLearned\b",
                r"\bRealized\b",
                r"\bKey takeaway\b",
                r"\bWisdom\b",
                r"\bInception\b",
            ],
        ),
    ]
});

static TOPIC_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "coding-standards",
        &["code", "comment", "formatting", "linter", "black", "test", "security", "sanitize", "emoji"],
    ),
    (
        "communication",
        &["explain", "concise", "simple", "jargon", "claim", "success", "verification", "ask", "token", "brevity"],
    ),
    (
        "workflow",
        &["protocol", "phase", "requirements", "design", "tasks", "implement", "verify", "kiro", "spec"],
    ),
    (
        "agent-behavior",
        &["agent", "context", "memory", "search", "hallucination", "fabrication", "tool"],
    ),
    (
        "tools-environment",
        &["python", "vscode", "ide", "chromadb", "kuzu", "elefante", "mcp"],
    ),
    (
        "collaboration",
        &["review", "documentation", "bus factor", "team", "constructive"],
    ),
];

static MARKDOWN_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#+\s*").expect("valid regex"));
static FOUNDATIONAL_LAW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bLAW\s*[01]\b").expect("valid regex"));
static TITLE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(Rule|Self|Memory|E2E|Elefante)-").expect("valid regex"));

// ============================================================================
// TOPOLOGY
// ============================================================================

/// Full topology classification for one memory
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    pub ring: Ring,
    pub knowledge_type: KnowledgeType,
    pub topic: String,
    pub summary: String,
    pub owner_id: String,
}

impl Topology {
    /// Safe defaults used when classification inputs are unusable.
    pub fn safe_default(owner_id: &str) -> Self {
        Self {
            ring: Ring::Leaf,
            knowledge_type: KnowledgeType::Fact,
            topic: "general".to_string(),
            summary: String::new(),
            owner_id: owner_id.to_string(),
        }
    }
}

/// Inputs to topology classification (all optional except content)
#[derive(Debug, Clone, Copy, Default)]
pub struct TopologyInput<'a> {
    pub content: &'a str,
    pub title: &'a str,
    pub memory_type: Option<MemoryType>,
    pub layer: Option<Layer>,
    pub sublayer: &'a str,
    pub importance: u8,
    pub tags: &'a [String],
}

/// Classify one memory into the topology.
pub fn classify_topology(input: TopologyInput<'_>, owner_id: &str) -> Topology {
    let knowledge_type = infer_knowledge_type(input);
    let topic = infer_topic(input);
    let ring = infer_ring(input, knowledge_type);
    let summary = generate_summary(input.content, input.title);

    Topology {
        ring,
        knowledge_type,
        topic,
        summary,
        owner_id: owner_id.to_string(),
    }
}

/// Infer knowledge type: explicit memory type first, then pattern scores,
/// then sublayer fallbacks.
pub fn infer_knowledge_type(input: TopologyInput<'_>) -> KnowledgeType {
    match input.memory_type {
        Some(MemoryType::Decision) => return KnowledgeType::Decision,
        Some(MemoryType::Insight) => return KnowledgeType::Insight,
        _ => {}
    }

    let text = format!("{} {}", input.content, input.title);
    let mut best: Option<(KnowledgeType, usize)> = None;
    for table in KNOWLEDGE_TYPE_PATTERNS.iter() {
        let score = table.patterns.iter().filter(|p| p.is_match(&text)).count();
        if score > 0 && best.map(|(_, s)| score > s).unwrap_or(true) {
            best = Some((table.knowledge_type, score));
        }
    }
    if let Some((knowledge_type, _)) = best {
        return knowledge_type;
    }

    let layer_tag = format!(
        "{}/{}",
        input.layer.map(|l| l.as_str()).unwrap_or(""),
        input.sublayer.to_lowercase()
    );
    if layer_tag.contains("constraint") {
        KnowledgeType::Law
    } else if layer_tag.contains("rule") || layer_tag.contains("preference") {
        KnowledgeType::Preference
    } else if layer_tag.contains("method") {
        KnowledgeType::Method
    } else if layer_tag.contains("identity") {
        KnowledgeType::Principle
    } else {
        KnowledgeType::Fact
    }
}

/// Infer topic by keyword scoring; `general` when nothing matches.
pub fn infer_topic(input: TopologyInput<'_>) -> String {
    let text = format!(
        "{} {} {}",
        input.content,
        input.title,
        input.tags.join(" ")
    )
    .to_lowercase();

    let mut best: Option<(&str, usize)> = None;
    for (topic, keywords) in TOPIC_KEYWORDS {
        let score = keywords.iter().filter(|k| text.contains(*k)).count();
        if score > 0 && best.map(|(_, s)| score > s).unwrap_or(true) {
            best = Some((topic, score));
        }
    }
    best.map(|(topic, _)| topic.to_string())
        .unwrap_or_else(|| "general".to_string())
}

/// Infer the ring from knowledge type, importance, and layer.
pub fn infer_ring(input: TopologyInput<'_>, knowledge_type: KnowledgeType) -> Ring {
    let text = format!("{}{}", input.content, input.title);

    if knowledge_type == KnowledgeType::Principle {
        return Ring::Core;
    }
    // LAW 0 / LAW 1 are foundational; LAW 10+ is not
    if FOUNDATIONAL_LAW.is_match(&text) {
        return Ring::Core;
    }
    if input.importance >= 10
        && knowledge_type == KnowledgeType::Law
        && ["Context First", "Truth", "Non-Fabrication", "ETIQUETTE"]
            .iter()
            .any(|m| text.contains(m))
    {
        return Ring::Core;
    }

    if input.layer == Some(Layer::Self_) && input.sublayer.to_lowercase().starts_with("preference") {
        return Ring::Domain;
    }

    if matches!(knowledge_type, KnowledgeType::Law | KnowledgeType::Method) && input.importance >= 9 {
        return Ring::Topic;
    }

    Ring::Leaf
}

/// One-line summary: the first line when it reads as a statement, else a
/// cleaned-up title.
pub fn generate_summary(content: &str, title: &str) -> String {
    let first_line = content.lines().next().unwrap_or("").trim();
    let len = first_line.chars().count();
    if len > 10 && len < 150 {
        return MARKDOWN_HEADER.replace(first_line, "").to_string();
    }

    let cleaned = TITLE_PREFIX.replace(title, "");
    let cleaned = cleaned.replace('-', " ");
    cleaned.trim().chars().take(150).collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn input(content: &str) -> TopologyInput<'_> {
        TopologyInput {
            content,
            importance: 5,
            ..Default::default()
        }
    }

    #[test]
    fn test_law_patterns() {
        for content in [
            "LAW 11 - NO EMOJIS",
            "NEVER use global mutable state",
            "CRITICAL CONSTRAINT: Do NOT use emojis",
            "This behavior is FORBIDDEN in production",
        ] {
            assert_eq!(
                infer_knowledge_type(input(content)),
                KnowledgeType::Law,
                "content: {content}"
            );
        }
    }

    #[test]
    fn test_principle_patterns() {
        assert_eq!(
            infer_knowledge_type(input("PRIME DIRECTIVE: context first, always")),
            KnowledgeType::Principle
        );
        assert_eq!(
            infer_knowledge_type(input("Ambiguity is a bug, not a feature")),
            KnowledgeType::Principle
        );
    }

    #[test]
    fn test_method_patterns() {
        assert_eq!(
            infer_knowledge_type(input("Release Workflow: build, test, tag")),
            KnowledgeType::Method
        );
        assert_eq!(
            infer_knowledge_type(input("plan → execute → verify")),
            KnowledgeType::Method
        );
    }

    #[test]
    fn test_explicit_memory_type_wins() {
        let mut i = input("NEVER do this");
        i.memory_type = Some(MemoryType::Decision);
        assert_eq!(infer_knowledge_type(i), KnowledgeType::Decision);

        i.memory_type = Some(MemoryType::Insight);
        assert_eq!(infer_knowledge_type(i), KnowledgeType::Insight);
    }

    #[test]
    fn test_sublayer_fallbacks() {
        let mut i = input("plain statement with no markers");
        i.sublayer = "constraint";
        assert_eq!(infer_knowledge_type(i), KnowledgeType::Law);
        i.sublayer = "preference";
        assert_eq!(infer_knowledge_type(i), KnowledgeType::Preference);
        i.sublayer = "fact";
        assert_eq!(infer_knowledge_type(i), KnowledgeType::Fact);
    }

    #[test]
    fn test_topic_scoring() {
        let mut i = input("run the linter and formatting checks on all code");
        assert_eq!(infer_topic(i), "coding-standards");

        i = input("the agent should search memory before answering");
        assert_eq!(infer_topic(i), "agent-behavior");

        i = input("nothing matches here at all");
        assert_eq!(infer_topic(i), "general");
    }

    #[test]
    fn test_topic_uses_tags() {
        let tags = vec!["vscode".to_string()];
        let i = TopologyInput {
            content: "pin the interpreter",
            tags: &tags,
            importance: 5,
            ..Default::default()
        };
        assert_eq!(infer_topic(i), "tools-environment");
    }

    #[test]
    fn test_ring_inference() {
        // Principles are core
        let i = input("PRIME DIRECTIVE: stay grounded");
        assert_eq!(infer_ring(i, KnowledgeType::Principle), Ring::Core);

        // Self-preferences are domain
        let tags: Vec<String> = vec![];
        let i = TopologyInput {
            content: "prefer short answers",
            layer: Some(Layer::Self_),
            sublayer: "preference",
            importance: 5,
            tags: &tags,
            ..Default::default()
        };
        assert_eq!(infer_ring(i, KnowledgeType::Preference), Ring::Domain);

        // Foundational laws are core; LAW 11 is not LAW 1
        let i = input("LAW 1: Context First");
        assert_eq!(infer_ring(i, KnowledgeType::Law), Ring::Core);
        let mut i = input("LAW 11 - NO EMOJIS");
        i.importance = 9;
        assert_eq!(infer_ring(i, KnowledgeType::Law), Ring::Topic);

        // High-importance laws are topic
        let mut i = input("NEVER use emojis");
        i.importance = 9;
        assert_eq!(infer_ring(i, KnowledgeType::Law), Ring::Topic);

        // Everything else is leaf
        let i = input("the cafe opens at nine");
        assert_eq!(infer_ring(i, KnowledgeType::Fact), Ring::Leaf);
    }

    #[test]
    fn test_summary_from_first_line() {
        let summary = generate_summary("## The no-emoji rule applies everywhere\nmore detail", "T");
        assert_eq!(summary, "The no-emoji rule applies everywhere");
    }

    #[test]
    fn test_summary_from_title_when_first_line_unusable() {
        let summary = generate_summary("ok", "Rule-No-Emojis");
        assert_eq!(summary, "No Emojis");

        let long_line = "x".repeat(200);
        let summary = generate_summary(&long_line, "Self-Pref-Communication");
        assert_eq!(summary, "Pref Communication");
    }

    #[test]
    fn test_classify_topology_end_to_end() {
        let tags: Vec<String> = vec![];
        let i = TopologyInput {
            content: "LAW 11 - NO EMOJIS in any output",
            title: "Rule-NoEmojis",
            importance: 10,
            tags: &tags,
            ..Default::default()
        };
        let topology = classify_topology(i, "owner-jay");
        assert_eq!(topology.knowledge_type, KnowledgeType::Law);
        assert_eq!(topology.topic, "coding-standards");
        assert_eq!(topology.ring, Ring::Topic);
        assert_eq!(topology.summary, "LAW 11 - NO EMOJIS in any output");
        assert_eq!(topology.owner_id, "owner-jay");
    }

    #[test]
    fn test_safe_default() {
        let topology = Topology::safe_default("owner-jay");
        assert_eq!(topology.ring, Ring::Leaf);
        assert_eq!(topology.knowledge_type, KnowledgeType::Fact);
        assert_eq!(topology.topic, "general");
    }
}
