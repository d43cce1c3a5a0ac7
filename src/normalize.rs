//! Display-name normalization
//!
//! Backends decorate entity names differently (a trailing generation
//! suffix on one, a hosting-institution clause on another), so the same
//! site would reconcile to two different keys unless both the catalog
//! listing and the metric fetch go through one shared normalizer. The
//! strip rules are configuration, not code; see
//! [`crate::config::ReportConfig::strip_patterns`].

use serde::{Deserialize, Serialize};

/// One configured strip rule: a literal suffix removed from the end of
/// a name, optionally only when the name starts with a given prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripRule {
    pub suffix: String,
    #[serde(default)]
    pub require_prefix: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NameNormalizer {
    rules: Vec<StripRule>,
}

impl NameNormalizer {
    pub fn new(rules: Vec<StripRule>) -> Self {
        Self { rules }
    }

    /// Apply the strip rules until a fixpoint. Idempotent:
    /// `normalize(normalize(s)) == normalize(s)`.
    pub fn normalize(&self, name: &str) -> String {
        let mut out = name.trim().to_string();
        loop {
            let mut stripped = false;
            for rule in &self.rules {
                if let Some(prefix) = &rule.require_prefix {
                    if !out.starts_with(prefix.as_str()) {
                        continue;
                    }
                }
                if let Some(rest) = out.strip_suffix(rule.suffix.as_str()) {
                    out = rest.trim_end().to_string();
                    stripped = true;
                }
            }
            if !stripped {
                return out;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> NameNormalizer {
        NameNormalizer::new(vec![
            StripRule {
                suffix: " - GA4".into(),
                require_prefix: None,
            },
            StripRule {
                suffix: " Hosted at New York University".into(),
                require_prefix: Some("Finding Aids".into()),
            },
        ])
    }

    #[test]
    fn test_strips_generation_suffix() {
        let n = normalizer();
        assert_eq!(n.normalize("Ancient World - GA4"), "Ancient World");
        assert_eq!(n.normalize("Ancient World"), "Ancient World");
    }

    #[test]
    fn test_prefix_conditional_rule() {
        let n = normalizer();
        assert_eq!(
            n.normalize("Finding Aids Hosted at New York University"),
            "Finding Aids"
        );
        // rule does not fire without the prefix
        assert_eq!(
            n.normalize("Other Site Hosted at New York University"),
            "Other Site Hosted at New York University"
        );
    }

    #[test]
    fn test_rules_compose() {
        let n = normalizer();
        assert_eq!(
            n.normalize("Finding Aids Hosted at New York University - GA4"),
            "Finding Aids"
        );
    }

    #[test]
    fn test_idempotent() {
        let n = normalizer();
        for s in [
            "Ancient World - GA4",
            "Finding Aids Hosted at New York University",
            "  padded  ",
            "plain",
        ] {
            let once = n.normalize(s);
            assert_eq!(n.normalize(&once), once);
        }
    }
}
