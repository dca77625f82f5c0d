use std::sync::Arc;

use serde::Serialize;

use crate::{
    boundary::{BoundaryDetector, BoundaryScore, BoundarySet},
    classification::ClassificationResult,
    classifier::{DocumentClassifier, ExternalClassifier},
    config::SplitterConfig,
    error::Result,
    feedback::FeedbackStore,
    label::DocumentType,
    page::PageObservation,
    patterns::{PatternKind, PatternStore},
    segment::{DocumentSegment, get_document_sections},
};

/// Minimum share of past corrections for a label to be offered as an
/// alternative.
pub const ALTERNATIVE_THRESHOLD: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Alternative {
    pub document_type: DocumentType,
    pub probability: f32,
}

/// One logical document found in the input.
#[derive(Debug, Clone, Serialize)]
pub struct SplitDocument {
    pub segment: DocumentSegment,
    pub classification: ClassificationResult,
    /// Labels this classification has historically been corrected to.
    pub alternatives: Vec<Alternative>,
}

/// Pages in, classified documents out.
#[derive(Debug)]
pub struct Splitter {
    detector: BoundaryDetector,
    classifier: DocumentClassifier,
    patterns: PatternStore,
}

impl Splitter {
    pub fn new(config: &SplitterConfig, feedback: Arc<FeedbackStore>) -> Self {
        Self {
            detector: BoundaryDetector::new(config.boundary),
            classifier: DocumentClassifier::new(config.classifier, feedback),
            patterns: config.pattern_store(),
        }
    }

    pub fn with_external(
        mut self,
        external: Arc<dyn ExternalClassifier>,
    ) -> Self {
        self.classifier = self.classifier.with_external(external);
        self
    }

    pub fn patterns(&self) -> &PatternStore {
        &self.patterns
    }

    pub fn classifier(&self) -> &DocumentClassifier {
        &self.classifier
    }

    pub fn add_custom_pattern(
        &mut self,
        kind: PatternKind,
        label: DocumentType,
        pattern: &str,
    ) -> Result<bool> {
        self.patterns.add_custom_pattern(kind, label, pattern)
    }

    pub fn detect(&self, pages: &[PageObservation]) -> BoundarySet {
        self.detector.detect(pages, self.patterns.boundary())
    }

    /// Per-page boundary scores, for diagnostics.
    pub fn explain(&self, pages: &[PageObservation]) -> Vec<BoundaryScore> {
        self.detector.score_pages(pages, self.patterns.boundary())
    }

    pub fn sections(&self, pages: &[PageObservation]) -> Vec<DocumentSegment> {
        get_document_sections(&self.detect(pages), pages.len())
    }

    /// Detect boundaries, segment, and classify every segment in order.
    pub fn split(&self, pages: &[PageObservation]) -> Vec<SplitDocument> {
        let segments = self.sections(pages);
        let texts: Vec<String> =
            segments.iter().map(|s| s.text(pages)).collect();
        let results = self
            .classifier
            .classify_batch(&texts, self.patterns.classification());

        let feedback = self.classifier.feedback();
        let documents: Vec<SplitDocument> = segments
            .into_iter()
            .zip(results)
            .map(|(segment, classification)| {
                let alternatives = feedback
                    .alternative_types(
                        classification.document_type(),
                        ALTERNATIVE_THRESHOLD,
                    )
                    .into_iter()
                    .map(|(document_type, probability)| Alternative {
                        document_type,
                        probability,
                    })
                    .collect();
                SplitDocument {
                    segment,
                    classification,
                    alternatives,
                }
            })
            .collect();

        tracing::info!(
            pages = pages.len(),
            documents = documents.len(),
            "split complete"
        );
        documents
    }
}
