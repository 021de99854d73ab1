//! Call-free cleanup of raw references before any mapping attempt.
//!
//! Titles are checked against an ordered rule table; the first matching
//! rule decides what the title is. Preprint identifiers are rewritten to
//! the prefixed `arXiv:{id}` form and, when no DOI is known, the preprint
//! DOI is derived so the DOI attempts of the mapping chain apply.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

use crate::config::DedupKeyPolicy;
use crate::sources::{RawReference, normalize_doi};

/// Maximum characters kept in a title cache key.
const TITLE_KEY_MAX_CHARS: usize = 200;

/// Titles with fewer words than this carry too little signal to search.
const MIN_TITLE_WORDS: usize = 3;

/// DOI prefix the preprint server registers its papers under.
const ARXIV_DOI_PREFIX: &str = "10.48550/arxiv.";

/// What a matching title rule says about the title.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TitleAction {
    /// The title is really a preprint id (capture group 1).
    PreprintId,
    /// The title is a venue/volume citation, not a work title.
    JournalOnly,
}

struct TitleRule {
    pattern: Regex,
    /// Rule applies only to titles with at most this many words.
    max_words: Option<usize>,
    action: TitleAction,
}

/// Ordered title rules; the first match wins.
#[allow(clippy::expect_used)]
static TITLE_RULES: LazyLock<Vec<TitleRule>> = LazyLock::new(|| {
    let rule = |pattern: &str, max_words, action| TitleRule {
        pattern: Regex::new(pattern).expect("title rule regex is valid"), // Static pattern, safe to panic
        max_words,
        action,
    };
    vec![
        // Legacy preprint id: hep-th/9711200, math.AG/0309136
        rule(
            r"(?i)^\s*(?:arxiv:\s*)?((?:hep-(?:th|ph|ex|lat)|gr-qc|astro-ph|cond-mat|math-ph|nucl-(?:th|ex)|quant-ph|nlin|math|physics|cs)(?:\.[a-z]{2})?/\d{7})(?:v\d+)?\s*$",
            None,
            TitleAction::PreprintId,
        ),
        // Modern preprint id: 2301.01234v2
        rule(
            r"(?i)^\s*(?:arxiv:\s*)?(\d{4}\.\d{4,5})(?:v\d+)?\s*$",
            None,
            TitleAction::PreprintId,
        ),
        // Abbreviated venue strings: "Phys. Rev. Lett.", "Nucl. Phys. B", "JHEP"
        rule(
            r"(?i)\b(?:preprint|proceedings|proc\.|phys\.?\s*rev\.?(?:\s*lett\.?)?|phys\.?\s*lett\.?(?:\s*[ab])?|mod\.?\s*phys\.?\s*lett\.?|ann\.?\s*phys\.?|nucl\.?\s*phys\.?(?:\s*[ab])?|class\.?\s*quant\.?\s*grav\.?|(?:commun|comm)\.?\s*math\.?\s*phys\.?|int\.?\s*j\.?|jhep|j\.?\s*phys\.?)(?:\s|$|\b)",
            Some(4),
            TitleAction::JournalOnly,
        ),
        // Bare volume/page citation: "116, 061102", "vol. 12 (3) pp. 45-67"
        rule(
            r"(?i)^\s*(?:vol\.?\s*)?\d+\s*(?:\(\d+\))?\s*[,:]?\s*(?:pp?\.?\s*)?\d*\s*(?:[-–]\s*\d+)?\s*\.?\s*$",
            None,
            TitleAction::JournalOnly,
        ),
        // Bare roman numeral (series volume)
        rule(r"^\s*[IVXLCDM]+\.?\s*$", None, TitleAction::JournalOnly),
    ]
});

#[allow(clippy::expect_used)]
static WORD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+").expect("word regex is valid")); // Static pattern, safe to panic

#[allow(clippy::expect_used)]
static PREPRINT_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:arxiv:\s*)?([a-z\-]+(?:\.[a-z]{2})?/\d{7}|\d{4}\.\d{4,5})(?:v\d+)?\s*$")
        .expect("preprint id regex is valid") // Static pattern, safe to panic
});

/// Why a reference was dropped before mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The title is a venue or volume citation and no identifier is present.
    JournalOnly,
    /// No identifier and too little title text.
    NoSignal,
}

/// Verdict on a title.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TitleVerdict {
    Usable,
    PreprintId(String),
    JournalOnly,
    LowInfo,
}

fn classify_title(title: &str) -> TitleVerdict {
    let words = WORD_PATTERN.find_iter(title).count();
    for rule in TITLE_RULES.iter() {
        if rule.max_words.is_some_and(|max| words > max) {
            continue;
        }
        if let Some(caps) = rule.pattern.captures(title) {
            return match rule.action {
                TitleAction::PreprintId => caps
                    .get(1)
                    .map_or(TitleVerdict::JournalOnly, |m| TitleVerdict::PreprintId(m.as_str().to_string())),
                TitleAction::JournalOnly => TitleVerdict::JournalOnly,
            };
        }
    }
    if words < MIN_TITLE_WORDS {
        TitleVerdict::LowInfo
    } else {
        TitleVerdict::Usable
    }
}

/// Returns true for titles not worth a title search.
#[must_use]
pub fn is_low_info_title(title: &str) -> bool {
    !matches!(classify_title(title), TitleVerdict::Usable)
}

/// Canonical preprint id without version suffix or prefix, lowercased category.
#[must_use]
pub fn normalize_preprint_id(raw: &str) -> Option<String> {
    let caps = PREPRINT_ID_PATTERN.captures(raw)?;
    Some(caps[1].to_ascii_lowercase())
}

/// Lowercased, whitespace-collapsed, length-capped title key.
#[must_use]
pub fn title_key(title: &str) -> Option<String> {
    let collapsed = title.split_whitespace().collect::<Vec<_>>().join(" ");
    let key: String = collapsed.to_lowercase().chars().take(TITLE_KEY_MAX_CHARS).collect();
    let key = key.trim().to_string();
    (!key.is_empty()).then_some(key)
}

/// A reference that survived normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedReference {
    /// The reference with DOI and preprint ids in canonical form.
    pub reference: RawReference,
    /// Prefixed preprint id (`arXiv:{id}`), if known.
    pub preprint: Option<String>,
    /// Title cache key, present only for searchable titles.
    pub title_key: Option<String>,
}

impl NormalizedReference {
    /// True if the reference carries an identifier the catalog can match exactly.
    #[must_use]
    pub fn has_strong_id(&self) -> bool {
        self.reference.canonical_id.is_some() || self.reference.doi.is_some() || self.preprint.is_some()
    }

    /// Merge key under `policy`. `None` only when the reference has no usable key at all.
    #[must_use]
    pub fn dedup_key(&self, policy: DedupKeyPolicy) -> Option<String> {
        let doi = self.reference.doi.as_ref().map(|d| format!("DOI:{d}"));
        let title = self.title_key.as_ref().map(|t| format!("TITLE:{t}"));
        let primary = match policy {
            DedupKeyPolicy::DoiFirst => doi.or(title),
            DedupKeyPolicy::TitleFirst => title.or(doi),
        };
        primary
            .or_else(|| self.reference.canonical_id.as_ref().map(|id| format!("ID:{id}")))
            .or_else(|| self.reference.secondary_id.as_ref().map(|id| format!("S2:{id}")))
    }

    /// Fills missing fields from a duplicate of the same work.
    fn enrich_from(&mut self, other: NormalizedReference) {
        let r = &mut self.reference;
        let o = other.reference;
        r.origin = r.origin.or(o.origin);
        r.canonical_id = r.canonical_id.take().or(o.canonical_id);
        r.secondary_id = r.secondary_id.take().or(o.secondary_id);
        r.doi = r.doi.take().or(o.doi);
        r.arxiv_id = r.arxiv_id.take().or(o.arxiv_id);
        r.title = r.title.take().or(o.title);
        r.year = r.year.or(o.year);
        r.venue = r.venue.take().or(o.venue);
        r.citation_count = r.citation_count.or(o.citation_count);
        self.preprint = self.preprint.take().or(other.preprint);
        self.title_key = self.title_key.take().or(other.title_key);
    }
}

/// Cleans a raw reference, or says why it must not be mapped.
///
/// # Errors
///
/// Returns the [`DropReason`] for references with no identifier and no
/// usable title.
pub fn normalize(mut reference: RawReference) -> Result<NormalizedReference, DropReason> {
    reference.doi = reference.doi.as_deref().and_then(normalize_doi);
    reference.title = reference
        .title
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty());

    let mut preprint_id = reference.arxiv_id.as_deref().and_then(normalize_preprint_id);

    let verdict = reference
        .title
        .as_deref()
        .map_or(TitleVerdict::LowInfo, classify_title);

    let title_key = match &verdict {
        TitleVerdict::Usable => reference.title.as_deref().and_then(title_key),
        TitleVerdict::PreprintId(id) => {
            if preprint_id.is_none() {
                preprint_id = normalize_preprint_id(id);
            }
            None
        }
        TitleVerdict::JournalOnly | TitleVerdict::LowInfo => None,
    };

    if let Some(id) = &preprint_id {
        reference.arxiv_id = Some(id.clone());
        if reference.doi.is_none() {
            reference.doi = Some(format!("{ARXIV_DOI_PREFIX}{id}"));
        }
    }

    let normalized = NormalizedReference {
        preprint: preprint_id.map(|id| format!("arXiv:{id}")),
        title_key,
        reference,
    };

    if normalized.title_key.is_none()
        && !normalized.has_strong_id()
        && normalized.reference.secondary_id.is_none()
    {
        let reason = if verdict == TitleVerdict::JournalOnly {
            DropReason::JournalOnly
        } else {
            DropReason::NoSignal
        };
        trace!(title = ?normalized.reference.title, ?reason, "dropping reference before mapping");
        return Err(reason);
    }
    Ok(normalized)
}

/// Merges reference lists, keeping the first occurrence of each key and
/// enriching it with identifiers carried by later duplicates.
#[must_use]
pub fn merge_references(
    references: impl IntoIterator<Item = NormalizedReference>,
    policy: DedupKeyPolicy,
) -> Vec<NormalizedReference> {
    let mut merged: Vec<NormalizedReference> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for reference in references {
        match reference.dedup_key(policy) {
            Some(key) => {
                if let Some(&slot) = index.get(&key) {
                    merged[slot].enrich_from(reference);
                } else {
                    index.insert(key, merged.len());
                    merged.push(reference);
                }
            }
            None => merged.push(reference),
        }
    }
    merged
}
