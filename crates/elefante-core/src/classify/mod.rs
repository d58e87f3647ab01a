//! Deterministic Classification
//!
//! Pure, table-driven rules over `(content, existing metadata)`: namespace
//! assignment, canonical-key inference for dedup identity, and the
//! first-person heuristic used for auto-linking memories to the user entity.
//! Anything probabilistic is delegated to the agent via the ETL loop.

pub mod topology;

use std::sync::LazyLock;

use regex::Regex;
use sha1::{Digest, Sha1};

use crate::memory::record::{Layer, Memory, MemoryType, Namespace};

/// Content prefixes that mark test fixtures regardless of tags
const TEST_CONTENT_SENTINELS: &[&str] = &["elefante e2e test memory", "hybrid search test memory"];

/// Maximum slug length for title-derived canonical keys
const MAX_SLUG_CHARS: usize = 80;

// ============================================================================
// NAMESPACE
// ============================================================================

/// Infer the dedup namespace for a memory.
///
/// An explicit agent-supplied `custom_metadata.namespace` wins; otherwise
/// test-flavored categories, tags, and content sentinels route to `test`,
/// and everything else is `prod`.
pub fn classify_namespace(memory: &Memory) -> Namespace {
    if let Some(explicit) = memory.custom_str("namespace").and_then(Namespace::parse) {
        return explicit;
    }

    if memory.category.trim().eq_ignore_ascii_case("test") {
        return Namespace::Test;
    }
    if memory
        .tags
        .iter()
        .any(|t| t.eq_ignore_ascii_case("test") || t.eq_ignore_ascii_case("e2e"))
    {
        return Namespace::Test;
    }

    let content = memory.content.trim().to_lowercase();
    if TEST_CONTENT_SENTINELS.iter().any(|s| content.starts_with(s)) {
        return Namespace::Test;
    }

    Namespace::Prod
}

// ============================================================================
// CANONICAL KEY
// ============================================================================

/// Infer the canonical key identifying a memory's concept.
///
/// Priority order:
/// 1. explicit `custom_metadata.canonical_key` (with one legacy refinement)
/// 2. deterministic keyword mapping
/// 3. normalized title slug
/// 4. content-hash fallback
pub fn infer_canonical_key(memory: &Memory) -> String {
    let title = memory.title().unwrap_or("");
    let haystack = format!("{}\n{}", title, memory.content).to_lowercase();

    if let Some(explicit) = memory.custom_str("canonical_key") {
        // One known-legacy ambiguous key gets refined when the memory is a
        // simple+concise communication preference.
        if explicit == "self-pref-always" && matches_simple_concise_preference(memory, &haystack) {
            return "self-pref-communication-simple-concise".to_string();
        }
        return explicit.to_string();
    }

    if haystack.contains("emoji") || haystack.contains("emojis") {
        return "Self-Limit-Emojis".to_string();
    }

    if matches_simple_concise_preference(memory, &haystack) {
        return "self-pref-communication-simple-concise".to_string();
    }

    if is_preference_like(memory) && haystack.contains("do not claim") && haystack.contains("success") {
        return "self-pref-no-false-success-claims".to_string();
    }

    if !title.is_empty() {
        let slug = slugify(title);
        if !slug.is_empty() {
            return slug;
        }
        return "World-Fact-General".to_string();
    }

    format!("Content-{}", content_digest(&memory.content))
}

fn is_preference_like(memory: &Memory) -> bool {
    memory.layer == Layer::Self_
        && (memory.memory_type == MemoryType::Preference
            || matches!(memory.sublayer.trim().to_lowercase().as_str(), "preference" | "constraint"))
}

fn matches_simple_concise_preference(memory: &Memory, haystack: &str) -> bool {
    if !is_preference_like(memory) {
        return false;
    }
    const SIMPLE_MARKERS: &[&str] = &[
        "simple terms",
        "simple language",
        "plain language",
        "avoid jargon",
        "no jargon",
        "no fluff",
        "minimal wording",
        "straightforward",
        "concise",
    ];
    const CONCISE_MARKERS: &[&str] = &["concise", "no fluff", "minimal", "brief", "short"];

    SIMPLE_MARKERS.iter().any(|m| haystack.contains(m))
        && CONCISE_MARKERS.iter().any(|m| haystack.contains(m))
}

/// Lowercased, dash-separated slug, capped at 80 chars.
pub fn slugify(title: &str) -> String {
    let mut slug = String::new();
    let mut last_dash = true;
    for c in title.trim().to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let slug = slug.trim_matches('-').to_string();
    slug.chars().take(MAX_SLUG_CHARS).collect()
}

/// First 12 hex chars of the SHA-1 of whitespace-normalized content.
fn content_digest(content: &str) -> String {
    let normalized = content.trim().to_lowercase();
    let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");
    let digest = Sha1::digest(normalized.as_bytes());
    digest
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>()
        .chars()
        .take(12)
        .collect()
}

// ============================================================================
// FIRST-PERSON HEURISTIC
// ============================================================================

static FIRST_PERSON_WORDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(my|me|we|our|mine)\b").expect("valid regex"));
static STANDALONE_I: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bI\b").expect("valid regex"));

/// Keywords that mark content as code rather than prose
const CODE_PREFIXES: &[&str] = &[
    "return ", "import ", "def ", "class ", "for ", "if ", "async ", "await ", "try:", "except",
    "else", "elif",
];

/// Symbols whose presence (two or more distinct) marks code-like content
const CODE_SYMBOLS: &[&str] = &["{", "}", ";", "==", "=>", "->", "()", "[]", "&&", "||"];

/// Whether content reads as a first-person statement about the user.
///
/// Suppressed for code-like content so `for i in items` never links an
/// iteration variable to the user.
pub fn is_first_person(content: &str) -> bool {
    let trimmed = content.trim_start();
    if CODE_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
        return false;
    }
    let distinct_symbols = CODE_SYMBOLS.iter().filter(|s| content.contains(*s)).count();
    if distinct_symbols >= 2 {
        return false;
    }

    if FIRST_PERSON_WORDS.is_match(content) {
        return true;
    }

    // Standalone capital I, except when it is being assigned to (`I = 0`)
    for m in STANDALONE_I.find_iter(content) {
        let rest = content[m.end()..].trim_start();
        if !rest.starts_with('=') {
            return true;
        }
    }
    false
}

// ============================================================================
// TESTS
// ============================================================================
