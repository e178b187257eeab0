//! Site resolution: URL match patterns → site identity.
//!
//! Patterns use the browser match-pattern syntax:
//! - `<all_urls>` matches any http/https URL
//! - `scheme://host/path` where scheme is `*`, `http` or `https`, host is `*`,
//!   `*.domain` (the domain and any subdomain) or a literal host, and path may
//!   contain `*` wildcards. A missing path means `/*`.
//!
//! Matching is case-insensitive. Malformed patterns never match anything; they
//! are rejected with a readable message by [`validate_pattern`] before being
//! persisted.

use crate::{ReadyAiError, Result};
use once_cell::sync::Lazy;
use readyai_types::{CustomSite, Settings, SiteIdentity, BUILTIN_SITES};
use regex::Regex;
use std::collections::HashSet;
use tracing::{debug, trace};

static PATTERN_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([*a-zA-Z]+)://([^/]+)(/.*)?$").expect("valid regex"));

static PATTERN_SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\r?\n|,|;").expect("valid regex"));

/// A compiled URL match pattern.
#[derive(Debug, Clone)]
pub struct MatchPattern {
    raw: String,
    regex: Option<Regex>,
}

impl MatchPattern {
    /// Compile a pattern. Malformed patterns compile to a matcher that never matches.
    pub fn compile(pattern: &str) -> Self {
        Self {
            raw: pattern.to_string(),
            regex: pattern_to_regex(pattern),
        }
    }

    pub fn matches(&self, url: &str) -> bool {
        self.regex.as_ref().is_some_and(|re| re.is_match(url))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Specificity used for longest-match-wins resolution.
    pub fn specificity(&self) -> usize {
        self.raw.len()
    }
}

fn pattern_to_regex(pattern: &str) -> Option<Regex> {
    if pattern == "<all_urls>" {
        return Regex::new(r"(?i)^https?://").ok();
    }

    let parts: Vec<&str> = pattern.split("://").collect();
    if parts.len() != 2 {
        return None;
    }
    let (scheme, rest) = (parts[0], parts[1]);

    let (host, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, "/*"),
    };

    let scheme_re = if scheme == "*" {
        "https?".to_string()
    } else {
        regex::escape(scheme)
    };

    let host_re = if host == "*" {
        "[^/]+?".to_string()
    } else if let Some(domain) = host.strip_prefix("*.") {
        format!(r"(?:[^/]+?\.)?{}", regex::escape(domain))
    } else {
        regex::escape(host)
    };

    let path_re = regex::escape(path).replace(r"\*", ".*");

    Regex::new(&format!("(?i)^{}://{}{}$", scheme_re, host_re, path_re)).ok()
}

/// Check a user-entered pattern. Deliberately lenient beyond the basic shape.
pub fn validate_pattern(pattern: &str) -> Result<()> {
    let invalid = |reason: &str| ReadyAiError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    if pattern.is_empty() {
        return Err(invalid("pattern is empty"));
    }
    if pattern == "<all_urls>" {
        return Ok(());
    }

    let caps = PATTERN_SHAPE
        .captures(pattern)
        .ok_or_else(|| invalid("expected scheme://host/path"))?;

    let scheme = &caps[1];
    if !matches!(scheme, "*" | "http" | "https") {
        return Err(invalid("scheme must be *, http or https"));
    }

    let host = &caps[2];
    if host.contains(' ') {
        return Err(invalid("host must not contain spaces"));
    }
    if host != "*" && host.contains('*') && !host.starts_with("*.") {
        return Err(invalid("'*' in the host is only allowed as '*' or a '*.' prefix"));
    }

    Ok(())
}

/// Split free-form pattern input on newlines, commas and semicolons.
pub fn normalize_patterns(text: &str) -> Vec<String> {
    PATTERN_SEPARATORS
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Generate an id for a new custom site.
pub fn make_custom_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("custom_{:x}_{}", millis, &random[..12])
}

/// Normalize and validate a custom site at the edit boundary.
pub fn validate_custom_site(site: CustomSite) -> Result<CustomSite> {
    let id = site.id.trim().to_string();
    if id.is_empty() {
        return Err(ReadyAiError::InvalidCustomSite("id is required".into()));
    }

    let name = match site.name.trim() {
        "" => "Custom".to_string(),
        name => name.to_string(),
    };

    let url_patterns: Vec<String> = site
        .url_patterns
        .iter()
        .flat_map(|p| normalize_patterns(p))
        .collect();
    if url_patterns.is_empty() {
        return Err(ReadyAiError::InvalidCustomSite(format!(
            "site '{}' needs at least one URL pattern",
            name
        )));
    }
    for pattern in &url_patterns {
        validate_pattern(pattern)?;
    }

    Ok(CustomSite {
        id,
        name,
        url_patterns,
        detection: site.detection,
        enabled: site.enabled,
    })
}

/// Clamp settings and validate every custom site. Nothing invalid is ever persisted.
pub fn validate_settings(settings: Settings) -> Result<Settings> {
    let mut settings = settings.clamped();

    let mut seen = HashSet::new();
    let mut custom_sites = Vec::with_capacity(settings.custom_sites.len());
    for site in std::mem::take(&mut settings.custom_sites) {
        let site = validate_custom_site(site)?;
        if !seen.insert(site.id.clone()) {
            return Err(ReadyAiError::InvalidCustomSite(format!(
                "duplicate id '{}'",
                site.id
            )));
        }
        custom_sites.push(site);
    }
    settings.custom_sites = custom_sites;

    Ok(settings)
}

#[derive(Debug, Clone)]
struct CompiledSite {
    identity: SiteIdentity,
    patterns: Vec<MatchPattern>,
}

impl CompiledSite {
    fn new(identity: SiteIdentity) -> Self {
        let patterns = identity
            .url_patterns
            .iter()
            .map(|p| MatchPattern::compile(p))
            .collect();
        Self { identity, patterns }
    }

    fn best_match(&self, url: &str) -> Option<usize> {
        self.patterns
            .iter()
            .filter(|p| p.matches(url))
            .map(MatchPattern::specificity)
            .max()
    }
}

/// Resolves URLs against the currently enabled sites.
///
/// Built once per settings revision; patterns are compiled at construction.
#[derive(Debug, Clone, Default)]
pub struct SiteResolver {
    custom: Vec<CompiledSite>,
    builtin: Vec<CompiledSite>,
}

impl SiteResolver {
    pub fn new(settings: &Settings) -> Self {
        let custom = settings
            .custom_sites
            .iter()
            .filter(|s| s.enabled)
            .map(|s| CompiledSite::new(s.identity()))
            .collect();

        let builtin = BUILTIN_SITES
            .iter()
            .filter(|s| {
                settings
                    .enabled_sites
                    .get(s.key)
                    .copied()
                    .unwrap_or(s.default_enabled)
            })
            .map(|s| CompiledSite::new(s.identity()))
            .collect();

        let resolver = Self { custom, builtin };
        debug!(
            target: "readyai::sites",
            "Site resolver built: {} custom, {} built-in",
            resolver.custom.len(),
            resolver.builtin.len()
        );
        resolver
    }

    /// Resolve a URL. Custom sites win over built-ins; within each tier the
    /// longest matching pattern wins, ties going to registry order.
    pub fn resolve(&self, url: &str) -> Option<SiteIdentity> {
        let site = Self::best_in(&self.custom, url).or_else(|| Self::best_in(&self.builtin, url));
        trace!(
            target: "readyai::sites",
            "Resolved {} -> {:?}",
            url,
            site.as_ref().map(|s| s.key.as_str())
        );
        site
    }

    fn best_in(sites: &[CompiledSite], url: &str) -> Option<SiteIdentity> {
        let mut best: Option<(usize, &CompiledSite)> = None;
        for site in sites {
            if let Some(len) = site.best_match(url) {
                if best.is_none_or(|(best_len, _)| len > best_len) {
                    best = Some((len, site));
                }
            }
        }
        best.map(|(_, site)| site.identity.clone())
    }

    /// Resolve the site for a frame. Frames whose own URL is not monitored
    /// (typically cross-origin iframes) fall back to the top document URL.
    pub fn resolve_for_frame(&self, frame_url: &str, top_url: Option<&str>) -> Option<SiteIdentity> {
        self.resolve(frame_url)
            .or_else(|| top_url.filter(|u| !u.is_empty()).and_then(|u| self.resolve(u)))
    }

    /// Whether a tab URL belongs to a monitored site.
    pub fn is_monitored(&self, url: &str) -> bool {
        let lower = url.to_ascii_lowercase();
        if !(lower.starts_with("http://") || lower.starts_with("https://")) {
            return false;
        }
        self.resolve(url).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use readyai_types::DetectionMode;

    fn custom(id: &str, patterns: &[&str]) -> CustomSite {
        CustomSite {
            id: id.to_string(),
            name: id.to_string(),
            url_patterns: patterns.iter().map(|p| p.to_string()).collect(),
            detection: DetectionMode::GenericStop,
            enabled: true,
        }
    }

    #[test]
    fn test_match_pattern_wildcards() {
        let p = MatchPattern::compile("https://*.example.com/chat/*");
        assert!(p.matches("https://example.com/chat/1"));
        assert!(p.matches("https://a.b.example.com/chat/"));
        assert!(p.matches("HTTPS://EXAMPLE.COM/chat/x"));
        assert!(!p.matches("https://example.com/other"));
        assert!(!p.matches("https://notexample.com/chat/1"));
    }

    #[test]
    fn test_match_pattern_scheme_and_missing_path() {
        let p = MatchPattern::compile("*://poe.com");
        assert!(p.matches("http://poe.com/"));
        assert!(p.matches("https://poe.com/chat"));
        assert!(!p.matches("ftp://poe.com/"));

        let all = MatchPattern::compile("<all_urls>");
        assert!(all.matches("https://anything.test/x"));
        assert!(!all.matches("chrome://extensions"));
    }

    #[test]
    fn test_malformed_pattern_never_matches() {
        let p = MatchPattern::compile("not a pattern");
        assert!(!p.matches("not a pattern"));
        assert!(!p.matches("https://example.com/"));
    }

    #[test]
    fn test_validate_pattern() {
        assert!(validate_pattern("https://example.com/*").is_ok());
        assert!(validate_pattern("*://*.example.com").is_ok());
        assert!(validate_pattern("<all_urls>").is_ok());

        let err = validate_pattern("ftp://example.com/*").unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("scheme"));
        assert!(validate_pattern("https://exa*mple.com/").is_err());
        assert!(validate_pattern("example.com").is_err());
        assert!(validate_pattern("").is_err());
    }

    #[test]
    fn test_normalize_patterns() {
        let patterns = normalize_patterns(" https://a.com/* ,https://b.com/*;\n\r\nhttps://c.com/* ");
        assert_eq!(
            patterns,
            vec!["https://a.com/*", "https://b.com/*", "https://c.com/*"]
        );
    }

    #[test]
    fn test_make_custom_id_is_unique() {
        let a = make_custom_id();
        let b = make_custom_id();
        assert!(a.starts_with("custom_"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_validate_custom_site_normalizes() {
        let site = CustomSite {
            id: "  custom_1 ".into(),
            name: "   ".into(),
            url_patterns: vec!["https://a.com/*\nhttps://b.com/*".into()],
            detection: DetectionMode::Claude,
            enabled: true,
        };
        let site = validate_custom_site(site).unwrap();
        assert_eq!(site.id, "custom_1");
        assert_eq!(site.name, "Custom");
        assert_eq!(site.url_patterns.len(), 2);
    }

    #[test]
    fn test_validate_custom_site_rejects_bad_input() {
        assert!(validate_custom_site(custom("", &["https://a.com/*"])).is_err());
        assert!(validate_custom_site(custom("c", &[])).is_err());
        assert!(validate_custom_site(custom("c", &["gopher://a.com/*"])).is_err());
    }

    #[test]
    fn test_validate_settings_rejects_duplicate_ids() {
        let settings = Settings {
            custom_sites: vec![
                custom("dup", &["https://a.com/*"]),
                custom("dup", &["https://b.com/*"]),
            ],
            ..Settings::default()
        };
        assert!(validate_settings(settings).is_err());
    }

    #[test]
    fn test_resolve_builtin_respects_enable_flags() {
        let settings = Settings::default();
        let resolver = SiteResolver::new(&settings);
        assert_eq!(
            resolver.resolve("https://gemini.google.com/app/123").map(|s| s.key),
            Some("gemini".to_string())
        );
        // Claude is off by default.
        assert!(resolver.resolve("https://claude.ai/chat/1").is_none());

        let mut settings = Settings::default();
        settings.enabled_sites.insert("claude".into(), true);
        let resolver = SiteResolver::new(&settings);
        assert!(resolver.resolve("https://claude.ai/chat/1").is_some());
    }

    #[test]
    fn test_custom_sites_win_over_builtin() {
        let mut site = custom("custom_gem", &["https://gemini.google.com/*"]);
        site.name = "My Gemini".into();
        let settings = Settings {
            custom_sites: vec![site],
            ..Settings::default()
        };
        let resolved = SiteResolver::new(&settings)
            .resolve("https://gemini.google.com/app")
            .unwrap();
        assert_eq!(resolved.key, "custom_gem");
        assert!(resolved.is_custom);
    }

    #[test]
    fn test_longest_match_wins_within_tier() {
        let settings = Settings {
            custom_sites: vec![
                custom("broad", &["https://*.example.com/*"]),
                custom("narrow", &["https://chat.example.com/assistant/*"]),
            ],
            ..Settings::default()
        };
        let resolver = SiteResolver::new(&settings);
        assert_eq!(
            resolver.resolve("https://chat.example.com/assistant/1").unwrap().key,
            "narrow"
        );
        assert_eq!(
            resolver.resolve("https://www.example.com/").unwrap().key,
            "broad"
        );
    }

    #[test]
    fn test_disabled_custom_site_is_ignored() {
        let mut site = custom("off", &["https://a.com/*"]);
        site.enabled = false;
        let settings = Settings {
            custom_sites: vec![site],
            ..Settings::default()
        };
        assert!(SiteResolver::new(&settings).resolve("https://a.com/x").is_none());
    }

    #[test]
    fn test_resolve_for_frame_falls_back_to_top_url() {
        let mut settings = Settings::default();
        settings.enabled_sites.insert("aistudio".into(), true);
        let resolver = SiteResolver::new(&settings);

        let site = resolver.resolve_for_frame(
            "https://cdn.usercontent.example/frame",
            Some("https://aistudio.google.com/prompts/new"),
        );
        assert_eq!(site.unwrap().key, "aistudio");
        assert!(resolver
            .resolve_for_frame("https://cdn.usercontent.example/frame", None)
            .is_none());
    }

    #[test]
    fn test_is_monitored_requires_http() {
        let settings = Settings {
            custom_sites: vec![custom("all", &["<all_urls>"])],
            ..Settings::default()
        };
        let resolver = SiteResolver::new(&settings);
        assert!(resolver.is_monitored("https://anything.test/"));
        assert!(!resolver.is_monitored("chrome://newtab"));
    }
}
