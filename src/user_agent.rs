//! Shared User-Agent strings for the catalog and reference-service clients.
//!
//! Both bibliographic APIs ask callers to identify themselves and leave a
//! contact address; requests that do so are routed to their polite pools.

/// Project URL for User-Agent identification (good citizenship; RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/citegraph/citegraph";

/// Builds the polite User-Agent used by every outbound request.
///
/// The contact address is appended as `mailto:` when one is configured.
#[must_use]
pub(crate) fn polite_user_agent(contact: Option<&str>) -> String {
    let version = env!("CARGO_PKG_VERSION");
    match contact.map(str::trim).filter(|c| !c.is_empty()) {
        Some(contact) => {
            format!("citegraph/{version} (reference-crawler; +{PROJECT_UA_URL}; mailto:{contact})")
        }
        None => format!("citegraph/{version} (reference-crawler; +{PROJECT_UA_URL})"),
    }
}
