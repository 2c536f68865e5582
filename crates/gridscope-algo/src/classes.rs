//! Raw tariff class codes → canonical classes.
//!
//! Configured rules are tried first, in order; then the built-in two-letter
//! prefixes of the distribution-utility class codes. Anything else is
//! [`CanonicalClass::Other`]; classification never fails.

use gridscope_core::CanonicalClass;
use serde::{Deserialize, Serialize};

/// One mapping rule. Exactly one of `code` (exact match) or `prefix` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    pub class: CanonicalClass,
}

impl ClassRule {
    pub fn exact(code: &str, class: CanonicalClass) -> Self {
        Self {
            code: Some(code.to_string()),
            prefix: None,
            class,
        }
    }

    pub fn prefix(prefix: &str, class: CanonicalClass) -> Self {
        Self {
            code: None,
            prefix: Some(prefix.to_string()),
            class,
        }
    }

    /// Reject rules that could never match or would be ambiguous.
    pub fn validate(&self) -> Result<(), String> {
        match (&self.code, &self.prefix) {
            (Some(c), None) if !c.trim().is_empty() => Ok(()),
            (None, Some(p)) if !p.trim().is_empty() => Ok(()),
            (Some(_), Some(_)) => Err("class rule sets both `code` and `prefix`".into()),
            _ => Err("class rule needs a non-empty `code` or `prefix`".into()),
        }
    }

    fn matches(&self, normalized: &str) -> bool {
        if let Some(code) = &self.code {
            return normalize(code) == normalized;
        }
        if let Some(prefix) = &self.prefix {
            return normalized.starts_with(&normalize(prefix));
        }
        false
    }
}

const DEFAULT_PREFIXES: [(&str, CanonicalClass); 7] = [
    ("RE", CanonicalClass::Residential),
    ("CO", CanonicalClass::Commercial),
    ("IN", CanonicalClass::Industrial),
    ("RU", CanonicalClass::Rural),
    ("PP", CanonicalClass::PublicPower),
    ("SP", CanonicalClass::PublicPower),
    ("PO", CanonicalClass::PublicPower),
];

/// Outcome of classifying one code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub class: CanonicalClass,
    /// `false` when a present code matched no rule
    pub mapped: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassTable {
    rules: Vec<ClassRule>,
}

impl Default for ClassTable {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl ClassTable {
    /// Table with `extra` rules ahead of the built-in prefixes.
    pub fn new(extra: &[ClassRule]) -> Self {
        let mut rules = extra.to_vec();
        rules.extend(
            DEFAULT_PREFIXES
                .iter()
                .map(|(prefix, class)| ClassRule::prefix(prefix, *class)),
        );
        Self { rules }
    }

    /// Classify a raw code. A missing or blank code is `Other` but is not
    /// reported as unmapped; callers decide how to count absent codes.
    pub fn classify(&self, code: Option<&str>) -> Classification {
        let normalized = match code.map(normalize) {
            Some(n) if !n.is_empty() => n,
            _ => {
                return Classification {
                    class: CanonicalClass::Other,
                    mapped: true,
                }
            }
        };
        match self.rules.iter().find(|rule| rule.matches(&normalized)) {
            Some(rule) => Classification {
                class: rule.class,
                mapped: true,
            },
            None => Classification {
                class: CanonicalClass::Other,
                mapped: false,
            },
        }
    }

    pub fn rules(&self) -> &[ClassRule] {
        &self.rules
    }
}

fn normalize(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}
