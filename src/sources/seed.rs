//! Recognition of the seed input's identifier form.

use std::sync::LazyLock;

use regex::Regex;

use super::{normalize_doi, short_work_id};

/// `https://openalex.org/W123` or bare `W123`.
#[allow(clippy::expect_used)]
static CATALOG_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:https?://(?:api\.)?openalex\.org/(?:works/)?)?(W\d+)/?$")
        .expect("catalog id regex is valid") // Static pattern, safe to panic
});

/// `https://www.semanticscholar.org/paper/<slug>/<id>` or `.../paper/<id>`.
#[allow(clippy::expect_used)]
static SECONDARY_URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)semanticscholar\.org/paper/(?:[^/]+/)?([0-9a-f]{16,})/?$")
        .expect("secondary URL regex is valid") // Static pattern, safe to panic
});

/// Bare secondary-service paper id (hex, at least 16 characters).
#[allow(clippy::expect_used)]
static SECONDARY_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{16,}$").expect("secondary id regex is valid") // Static pattern, safe to panic
});

/// Bare DOI with an optional `doi:` prefix or resolver URL.
#[allow(clippy::expect_used)]
static DOI_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:doi:\s*|https?://(?:dx\.)?doi\.org/)?10\.\d{4,9}(?:\.\d+)*/\S+$")
        .expect("DOI regex is valid") // Static pattern, safe to panic
});

/// The recognized form of a seed string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedInput {
    /// A primary-catalog work id (`W123`).
    CatalogId(String),
    /// A bare lowercase DOI.
    Doi(String),
    /// A secondary-service paper id.
    SecondaryId(String),
    /// Anything else: free title text.
    Title(String),
}

impl SeedInput {
    /// Classifies `input`.
    ///
    /// ```
    /// use citegraph_core::sources::seed::SeedInput;
    ///
    /// assert_eq!(SeedInput::parse("W2741809807"), SeedInput::CatalogId("W2741809807".into()));
    /// assert_eq!(
    ///     SeedInput::parse("https://doi.org/10.1103/PhysRevLett.116.061102"),
    ///     SeedInput::Doi("10.1103/physrevlett.116.061102".into())
    /// );
    /// ```
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let input = input.trim();

        if let Some(caps) = CATALOG_ID_PATTERN.captures(input)
            && let Some(id) = short_work_id(&caps[1])
        {
            return Self::CatalogId(id);
        }
        if DOI_PATTERN.is_match(input)
            && let Some(doi) = normalize_doi(input)
        {
            return Self::Doi(doi);
        }
        if let Some(caps) = SECONDARY_URL_PATTERN.captures(input) {
            return Self::SecondaryId(caps[1].to_ascii_lowercase());
        }
        if SECONDARY_ID_PATTERN.is_match(input) {
            return Self::SecondaryId(input.to_ascii_lowercase());
        }
        Self::Title(input.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_id_forms() {
        for input in ["W42", "w42", "https://openalex.org/W42", "https://api.openalex.org/works/W42"] {
            assert_eq!(SeedInput::parse(input), SeedInput::CatalogId("W42".into()), "{input}");
        }
    }

    #[test]
    fn test_doi_forms() {
        for input in ["10.1000/XYZ", "doi:10.1000/xyz", "https://dx.doi.org/10.1000/xyz"] {
            assert_eq!(SeedInput::parse(input), SeedInput::Doi("10.1000/xyz".into()), "{input}");
        }
    }

    #[test]
    fn test_secondary_id_forms() {
        let id = "204e3073870fae3d05bcbc2f6a8e263d9b72e776";
        assert_eq!(SeedInput::parse(id), SeedInput::SecondaryId(id.into()));
        let url = format!("https://www.semanticscholar.org/paper/Attention-Is-All-You-Need/{id}");
        assert_eq!(SeedInput::parse(&url), SeedInput::SecondaryId(id.into()));
    }

    #[test]
    fn test_title_fallback() {
        assert_eq!(
            SeedInput::parse("  Attention is all you need "),
            SeedInput::Title("Attention is all you need".into())
        );
        assert_eq!(SeedInput::parse("Wasserstein GAN"), SeedInput::Title("Wasserstein GAN".into()));
    }
}
