//! Retired URLs
//!
//! Paths from the previous site that were removed on purpose answer
//! 410 Gone instead of 404 so crawlers drop them.

use regex::Regex;

/// Retired path patterns that are always matched
pub const BUILTIN_PATTERNS: &[&str] = &[
    r"^/mobile-app-development(/.*)?$",
    r"^/blog/why-your-business-needs-to-switch-from-wordpress-to-svelteKit-for-a-competitive-edge$",
    r"^/blog/passion-and-experience-versus-price-when-hiring-a-software-developer$",
    r"^/articles/(business-efficiency|customer-engagement|user-engagement|seo)$",
    r"^/app-development-costs/.*",
    r"^/website-optimisation/.*",
    r"^/bespoke-mobile-apps/.*",
    r"^/legal-tech/.*",
    r"^/services/mobile-application-development$",
];

pub const GONE_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="robots" content="noindex">
<title>Page Removed - Solve With Software</title>
</head>
<body>
<main>
<h1>410</h1>
<p>This page has been permanently removed.</p>
<p><a href="/">Visit our homepage</a></p>
</main>
</body>
</html>
"#;

/// Compiled set of retired path patterns
#[derive(Debug, Clone)]
pub struct GoneMatcher {
    patterns: Vec<Regex>,
}

impl GoneMatcher {
    /// Built-in patterns plus `extra`. Invalid extra patterns are skipped.
    pub fn new(extra: &[String]) -> Self {
        let mut patterns: Vec<Regex> = BUILTIN_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect();

        for pattern in extra {
            match Regex::new(pattern) {
                Ok(re) => patterns.push(re),
                Err(e) => {
                    tracing::warn!(pattern = %pattern, "Ignoring invalid gone pattern: {}", e);
                }
            }
        }

        Self { patterns }
    }

    pub fn is_gone(&self, path: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(path))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Default for GoneMatcher {
    fn default() -> Self {
        Self::new(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_patterns_compile() {
        assert_eq!(GoneMatcher::default().len(), BUILTIN_PATTERNS.len());
    }

    #[test]
    fn test_retired_paths() {
        let matcher = GoneMatcher::default();

        assert!(matcher.is_gone("/mobile-app-development"));
        assert!(matcher.is_gone("/mobile-app-development/ios"));
        assert!(matcher.is_gone("/articles/seo"));
        assert!(matcher.is_gone("/legal-tech/case-management"));
        assert!(matcher.is_gone("/services/mobile-application-development"));

        assert!(!matcher.is_gone("/"));
        assert!(!matcher.is_gone("/articles/seo-basics"));
        assert!(!matcher.is_gone("/mobile-app-development-guide"));
        assert!(!matcher.is_gone("/blog/hello-world"));
    }

    #[test]
    fn test_configured_patterns() {
        let matcher = GoneMatcher::new(&[r"^/old-shop/.*".to_string(), "([".to_string()]);

        assert_eq!(matcher.len(), BUILTIN_PATTERNS.len() + 1);
        assert!(matcher.is_gone("/old-shop/cart"));
    }
}
