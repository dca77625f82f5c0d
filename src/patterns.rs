//! Pattern Store: per-label regular expressions used for boundary and
//! classification signals.
//!
//! Patterns are compiled once when they enter a [`PatternSet`]. A pattern
//! that fails to compile is logged and dropped at that point, so scoring
//! code never sees an invalid expression.

use std::collections::BTreeMap;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    label::DocumentType,
};

/// A regular expression compiled case-insensitive and multi-line.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    source: String,
    regex: Regex,
}

impl CompiledPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .multi_line(true)
            .build()
            .map_err(|source| Error::Pattern {
                pattern: pattern.to_string(),
                source,
            })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// Ordered patterns per label.
///
/// Labels iterate in [`DocumentType::ALL`] order, which is the tie-break
/// order for every "first match wins" decision made over a set.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: BTreeMap<DocumentType, Vec<CompiledPattern>>,
}

impl PatternSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile every pattern, skipping (and logging) the ones that fail.
    pub fn from_strings<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (DocumentType, Vec<S>)>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for (label, patterns) in entries {
            for pattern in patterns {
                if let Err(e) = set.add(label, pattern.as_ref()) {
                    tracing::warn!(%label, "skipping pattern: {e}");
                }
            }
        }
        set
    }

    /// Append a pattern for `label`.
    ///
    /// Returns `Ok(false)` if the exact pattern string is already present.
    pub fn add(&mut self, label: DocumentType, pattern: &str) -> Result<bool> {
        if self
            .patterns_for(label)
            .iter()
            .any(|p| p.as_str() == pattern)
        {
            return Ok(false);
        }
        let compiled = CompiledPattern::new(pattern)?;
        self.patterns.entry(label).or_default().push(compiled);
        Ok(true)
    }

    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (DocumentType, &[CompiledPattern])> {
        self.patterns
            .iter()
            .map(|(label, patterns)| (*label, patterns.as_slice()))
    }

    pub fn patterns_for(&self, label: DocumentType) -> &[CompiledPattern] {
        self.patterns
            .get(&label)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Number of usable patterns per label.
    pub fn pattern_counts(&self) -> BTreeMap<DocumentType, usize> {
        self.patterns
            .iter()
            .map(|(label, patterns)| (*label, patterns.len()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.values().all(Vec::is_empty)
    }
}

/// Which of the two pattern tables a pattern belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Boundary,
    Classification,
}

/// Uncompiled pattern tables keyed by label string, as found in a
/// configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub boundary_patterns: BTreeMap<String, Vec<String>>,
    pub classification_rules: BTreeMap<String, Vec<String>>,
}

/// Both pattern tables, compiled.
#[derive(Debug, Clone)]
pub struct PatternStore {
    boundary: PatternSet,
    classification: PatternSet,
}

impl Default for PatternStore {
    fn default() -> Self {
        Self {
            boundary: PatternSet::from_strings(default_boundary_patterns()),
            classification: PatternSet::from_strings(
                default_classification_patterns(),
            ),
        }
    }
}

impl PatternStore {
    pub fn new(boundary: PatternSet, classification: PatternSet) -> Self {
        Self {
            boundary,
            classification,
        }
    }

    /// Compile a configuration document. Unknown label names are logged
    /// and skipped.
    pub fn from_config(config: &PatternConfig) -> Self {
        Self {
            boundary: PatternSet::from_strings(resolve_labels(
                &config.boundary_patterns,
            )),
            classification: PatternSet::from_strings(resolve_labels(
                &config.classification_rules,
            )),
        }
    }

    pub fn boundary(&self) -> &PatternSet {
        &self.boundary
    }

    pub fn classification(&self) -> &PatternSet {
        &self.classification
    }

    /// Append a custom pattern at runtime. Invalid expressions are
    /// rejected and not stored.
    pub fn add_custom_pattern(
        &mut self,
        kind: PatternKind,
        label: DocumentType,
        pattern: &str,
    ) -> Result<bool> {
        let set = match kind {
            PatternKind::Boundary => &mut self.boundary,
            PatternKind::Classification => &mut self.classification,
        };
        let added = set.add(label, pattern)?;
        if added {
            tracing::info!(%label, ?kind, pattern, "added custom pattern");
        }
        Ok(added)
    }
}

fn resolve_labels(
    table: &BTreeMap<String, Vec<String>>,
) -> Vec<(DocumentType, Vec<String>)> {
    table
        .iter()
        .filter_map(|(name, patterns)| match name.parse::<DocumentType>() {
            Ok(label) => Some((label, patterns.clone())),
            Err(e) => {
                tracing::warn!("ignoring patterns: {e}");
                None
            }
        })
        .collect()
}

fn default_boundary_patterns() -> Vec<(DocumentType, Vec<&'static str>)> {
    vec![
        (
            DocumentType::PaymentApplication,
            vec![
                r"PAYMENT APPLICATION\s*(?:NO|#)\.?\s*\d+",
                r"APPLICATION FOR PAYMENT",
                r"(?:AIA|FORM)\s*(?:DOCUMENT\s*)?G702",
            ],
        ),
        (
            DocumentType::ChangeOrder,
            vec![
                r"CHANGE ORDER\s*(?:NO|#)\.?\s*\d+",
                r"(?:AIA|FORM)\s*(?:DOCUMENT\s*)?G701",
            ],
        ),
        (
            DocumentType::Email,
            vec![
                r"From:\s*.+@.+",
                r"Subject:\s*.+",
                r"Sent:\s*\w+,\s*\w+\s*\d+",
            ],
        ),
        (
            DocumentType::Letter,
            vec![
                r"Dear\s+(?:Mr\.|Ms\.|Mrs\.|Dr\.|\w+)",
                r"Re:\s*.+",
                r"^\s*\w+,\s*\w+\s*\d{1,2},\s*\d{4}",
            ],
        ),
        (
            DocumentType::Rfi,
            vec![r"REQUEST FOR INFORMATION", r"RFI\s*(?:NO|#)\.?\s*\d+"],
        ),
        (
            DocumentType::ContractDocument,
            vec![
                r"CONTRACT\s*(?:AGREEMENT|FOR)",
                r"SUBCONTRACT\s*AGREEMENT",
                r"AGREEMENT\s*BETWEEN",
            ],
        ),
        (
            DocumentType::InspectionReport,
            vec![
                r"INSPECTION\s*REPORT",
                r"DAILY\s*(?:FIELD\s*)?REPORT",
                r"SITE\s*VISIT\s*REPORT",
            ],
        ),
    ]
}

fn default_classification_patterns()
-> Vec<(DocumentType, Vec<&'static str>)> {
    vec![
        (
            DocumentType::Email,
            vec![
                r"From:\s*.+@.+",
                r"To:\s*.+@.+",
                r"Subject:\s*.+",
                r"Sent:\s*\w+.*\d{4}",
                r"Message-ID:",
            ],
        ),
        (
            DocumentType::PaymentApplication,
            vec![
                r"APPLICATION FOR PAYMENT",
                r"SCHEDULE OF VALUES",
                r"(?:AIA|FORM)\s*G702",
                r"PAYMENT APPLICATION\s*(?:NO|#)\.?\s*\d+",
                r"APPLICATION AND CERTIFICATE FOR PAYMENT",
            ],
        ),
        (
            DocumentType::ChangeOrder,
            vec![
                r"CHANGE ORDER",
                r"MODIFICATION TO CONTRACT",
                r"(?:AIA|FORM)\s*G701",
                r"CHANGE ORDER\s*(?:NO|#)\.?\s*\d+",
                r"CONSTRUCTION CHANGE DIRECTIVE",
            ],
        ),
        (
            DocumentType::Rfi,
            vec![
                r"REQUEST FOR INFORMATION",
                r"RFI\s*(?:NO|#)\.?\s*\d+",
                r"INFORMATION REQUEST",
                r"CLARIFICATION REQUEST",
            ],
        ),
        (
            DocumentType::RfiResponse,
            vec![
                r"RFI.*RESPONSE",
                r"RESPONSE TO.*RFI",
                r"INFORMATION REQUEST.*RESPONSE",
            ],
        ),
        (
            DocumentType::ContractDocument,
            vec![
                r"CONTRACT AGREEMENT",
                r"SUBCONTRACT",
                r"GENERAL CONDITIONS",
                r"SPECIAL CONDITIONS",
                r"CONSTRUCTION CONTRACT",
            ],
        ),
        (
            DocumentType::InspectionReport,
            vec![
                r"INSPECTION REPORT",
                r"SITE VISIT REPORT",
                r"FIELD REPORT",
                r"PROGRESS INSPECTION",
            ],
        ),
        (
            DocumentType::EvidenceOfPayment,
            vec![
                r"CHECK\s*(?:NO|#)\.?\s*\d+",
                r"PAYMENT RECEIPT",
                r"PROOF OF PAYMENT",
                r"BANK STATEMENT",
                r"WIRE TRANSFER",
            ],
        ),
        (
            DocumentType::ChangeOrderResponse,
            vec![
                r"CHANGE ORDER.*RESPONSE",
                r"RESPONSE TO.*CHANGE ORDER",
                r"CO.*ACCEPTANCE",
                r"CO.*REJECTION",
            ],
        ),
        (
            DocumentType::PlansSpecifications,
            vec![
                r"DRAWING\s*(?:NO|#)",
                r"SPECIFICATION",
                r"ARCHITECTURAL PLANS",
                r"TECHNICAL SPECIFICATIONS",
                r"BLUEPRINT",
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiled_patterns_ignore_case_and_span_lines() {
        let p = CompiledPattern::new(r"^subject:").unwrap();
        assert!(p.is_match("FROM: A@B.COM\nSUBJECT: HI"));
    }

    #[test]
    fn invalid_patterns_are_skipped_at_load() {
        let set = PatternSet::from_strings([(
            DocumentType::Email,
            vec!["From:", "(unclosed", "Subject:"],
        )]);
        let patterns: Vec<_> = set
            .patterns_for(DocumentType::Email)
            .iter()
            .map(CompiledPattern::as_str)
            .collect();
        assert_eq!(patterns, vec!["From:", "Subject:"]);
    }

    #[test]
    fn add_rejects_invalid_and_ignores_duplicates() {
        let mut set = PatternSet::new();
        assert!(set.add(DocumentType::Rfi, "RFI").unwrap());
        assert!(!set.add(DocumentType::Rfi, "RFI").unwrap());
        assert!(matches!(
            set.add(DocumentType::Rfi, "[z-a]"),
            Err(Error::Pattern { .. })
        ));
        assert_eq!(set.patterns_for(DocumentType::Rfi).len(), 1);
    }

    #[test]
    fn label_with_only_invalid_patterns_is_not_counted() {
        let mut set = PatternSet::from_strings([
            (DocumentType::Email, vec!["From:"]),
            (DocumentType::Letter, vec!["(unclosed"]),
        ]);
        assert!(set.add(DocumentType::Rfi, "[z-a]").is_err());

        let counts = set.pattern_counts();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[&DocumentType::Email], 1);
        assert!(!counts.contains_key(&DocumentType::Letter));
        assert!(!counts.contains_key(&DocumentType::Rfi));
    }

    #[test]
    fn iteration_follows_declared_label_order() {
        let set = PatternSet::from_strings([
            (DocumentType::Other, vec!["x"]),
            (DocumentType::Rfi, vec!["x"]),
            (DocumentType::Email, vec!["x"]),
        ]);
        let labels: Vec<_> = set.iter().map(|(label, _)| label).collect();
        assert_eq!(
            labels,
            vec![DocumentType::Email, DocumentType::Rfi, DocumentType::Other]
        );
    }

    #[test]
    fn config_with_unknown_label_is_partially_loaded() {
        let config: PatternConfig = serde_json::from_str(
            r#"{
                "boundary_patterns": {"memo": ["MEMO"], "rfi": ["RFI"]},
                "classification_rules": {"email": ["From:"]}
            }"#,
        )
        .unwrap();
        let store = PatternStore::from_config(&config);
        assert_eq!(store.boundary().pattern_counts().len(), 1);
        assert_eq!(
            store.classification().patterns_for(DocumentType::Email).len(),
            1
        );
    }

    #[test]
    fn custom_patterns_go_to_the_requested_table() {
        let mut store =
            PatternStore::new(PatternSet::new(), PatternSet::new());
        store
            .add_custom_pattern(
                PatternKind::Classification,
                DocumentType::Letter,
                r"Sincerely",
            )
            .unwrap();
        assert!(store.boundary().is_empty());
        assert_eq!(
            store.classification().patterns_for(DocumentType::Letter).len(),
            1
        );
    }

    #[test]
    fn defaults_compile_cleanly() {
        let store = PatternStore::default();
        let counts = store.classification().pattern_counts();
        assert_eq!(counts[&DocumentType::Email], 5);
        assert_eq!(counts[&DocumentType::PlansSpecifications], 5);
        assert!(!store.boundary().is_empty());
    }
}
