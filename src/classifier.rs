//! Document Classifier: labels a segment's text.
//!
//! Classification falls through three stages:
//!
//! 1. Rule scoring. Each label scores `0.6 + 0.2` per additional distinct
//!    matching pattern (capped at 1.0), multiplied by the label's feedback
//!    adjustment. A winner at or above `confidence_threshold` is returned
//!    and recorded in the feedback store.
//! 2. An optional [`ExternalClassifier`]. Its answer is blended with the
//!    rule result as `0.3 * rule + 0.7 * api`; the raw result with the
//!    higher confidence is returned carrying the blended confidence.
//! 3. The rule result if its confidence exceeds 0.3, otherwise `other`.

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    classification::ClassificationResult,
    error::{Error, Result},
    feedback::{AccuracyEntry, FeedbackGuard, FeedbackStore},
    label::{DocumentType, Method},
    patterns::PatternSet,
};

const FIRST_MATCH_CONFIDENCE: f32 = 0.6;
const EXTRA_MATCH_CONFIDENCE: f32 = 0.2;
const API_CONFIDENCE: f32 = 0.8;
const INVALID_API_CONFIDENCE: f32 = 0.2;
const RULE_WEIGHT: f32 = 0.3;
const API_WEIGHT: f32 = 0.7;
const LOW_CONFIDENCE_FLOOR: f32 = 0.3;
const FALLBACK_CONFIDENCE: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Characters of text considered for rule scoring.
    pub max_input_chars: usize,
    pub confidence_threshold: f32,
    /// Characters of text sent to the external classifier.
    pub api_max_chars: usize,
    pub api_timeout_ms: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            max_input_chars: 1000,
            confidence_threshold: 0.7,
            api_max_chars: 1000,
            api_timeout_ms: 10_000,
        }
    }
}

impl ClassifierConfig {
    pub fn api_timeout(&self) -> Duration {
        Duration::from_millis(self.api_timeout_ms)
    }
}

/// A remote labeling service, such as a hosted language model.
///
/// Implementations return a single label string chosen from `labels`.
/// The answer is matched case-insensitively; anything outside the closed
/// label set is treated as an invalid answer.
///
/// `timeout` is the configured budget for the whole call. Implementations
/// should apply it to their own I/O; the classifier stops waiting once it
/// expires and will not start another call while one is still running.
pub trait ExternalClassifier: Send + Sync {
    fn classify(
        &self,
        text: &str,
        labels: &[DocumentType],
        timeout: Duration,
    ) -> Result<String>;
}

pub struct DocumentClassifier {
    config: ClassifierConfig,
    feedback: Arc<FeedbackStore>,
    external: Option<Arc<dyn ExternalClassifier>>,
    /// Set while an external call is running, including one the classifier
    /// already gave up waiting for.
    external_busy: Arc<AtomicBool>,
}

/// Clears the busy flag when the worker finishes, even by panicking.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl DocumentClassifier {
    pub fn new(config: ClassifierConfig, feedback: Arc<FeedbackStore>) -> Self {
        Self {
            config,
            feedback,
            external: None,
            external_busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_external(
        mut self,
        external: Arc<dyn ExternalClassifier>,
    ) -> Self {
        self.external = Some(external);
        self
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn feedback(&self) -> &Arc<FeedbackStore> {
        &self.feedback
    }

    /// Classify one document's text against `patterns`.
    ///
    /// External failures never surface here; they fall through to the
    /// rule-based or fallback result.
    pub fn classify(
        &self,
        text: &str,
        patterns: &PatternSet,
    ) -> Result<ClassificationResult> {
        if text.trim().is_empty() {
            return Ok(ClassificationResult::unclassified()
                .with_info("error", "Empty text sample"));
        }

        let text = truncate_chars(text, self.config.max_input_chars);

        let rule = {
            let mut feedback = self.feedback.lock();
            let rule = score_rules(text, patterns, &feedback)?;
            if rule.confidence() >= self.config.confidence_threshold {
                feedback.record_classification(rule.document_type());
                tracing::debug!(
                    label = %rule.document_type(),
                    confidence = rule.confidence(),
                    "rule-based classification"
                );
                return Ok(rule);
            }
            rule
        };

        if let Some(external) = &self.external {
            match self.classify_external(external, text) {
                Ok(api) => {
                    let combined = (rule.confidence() * RULE_WEIGHT
                        + api.confidence() * API_WEIGHT)
                        .min(1.0);
                    let preferred = if api.confidence() > rule.confidence() {
                        api
                    } else {
                        rule
                    };
                    tracing::debug!(
                        label = %preferred.document_type(),
                        method = %preferred.method(),
                        combined,
                        "combined rule and external classification"
                    );
                    return preferred.with_confidence(combined);
                }
                Err(e) => {
                    tracing::warn!("external classification failed: {e}");
                }
            }
        }

        if rule.confidence() > LOW_CONFIDENCE_FLOOR {
            tracing::debug!(
                label = %rule.document_type(),
                "using low-confidence rule-based result"
            );
            return Ok(rule);
        }

        tracing::debug!("falling back to 'other'");
        Ok(ClassificationResult::new(
            DocumentType::Other,
            FALLBACK_CONFIDENCE,
            Method::Fallback,
        )?
        .with_info("reason", "No patterns matched"))
    }

    /// Classify each document independently. A failing item becomes an
    /// `other`/`fallback` result carrying the error; the rest still run.
    pub fn classify_batch<S: AsRef<str>>(
        &self,
        documents: &[S],
        patterns: &PatternSet,
    ) -> Vec<ClassificationResult> {
        documents
            .iter()
            .enumerate()
            .map(|(i, doc)| match self.classify(doc.as_ref(), patterns) {
                Ok(result) => {
                    tracing::debug!(
                        "classified document {}/{}: {}",
                        i + 1,
                        documents.len(),
                        result.document_type()
                    );
                    result
                }
                Err(e) => {
                    tracing::error!(
                        "failed to classify document {}: {e}",
                        i + 1
                    );
                    ClassificationResult::unclassified()
                        .with_info("error", e.to_string())
                }
            })
            .collect()
    }

    pub fn record_correction(
        &self,
        original: DocumentType,
        corrected: DocumentType,
        confidence: f32,
        text_sample: &str,
    ) {
        self.feedback
            .record_correction(original, corrected, confidence, text_sample);
    }

    pub fn feedback_report(&self) -> BTreeMap<DocumentType, AccuracyEntry> {
        self.feedback.accuracy_report()
    }

    pub fn suggest_pattern_improvements(
        &self,
        min_corrections: usize,
    ) -> BTreeMap<DocumentType, Vec<String>> {
        self.feedback.suggest_pattern_improvements(min_corrections)
    }

    /// Ask the external classifier, bounded by the configured timeout.
    fn classify_external(
        &self,
        external: &Arc<dyn ExternalClassifier>,
        text: &str,
    ) -> Result<ClassificationResult> {
        if self
            .external_busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::External(
                "previous request is still running".into(),
            ));
        }
        let busy = BusyGuard(Arc::clone(&self.external_busy));

        let sample =
            truncate_chars(text, self.config.api_max_chars).to_string();
        let timeout = self.config.api_timeout();
        let worker = Arc::clone(external);
        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("docsplit-external".into())
            .spawn(move || {
                let answer =
                    worker.classify(&sample, &DocumentType::ALL, timeout);
                drop(busy);
                let _ = tx.send(answer);
            })?;

        let raw = match rx.recv_timeout(timeout) {
            Ok(answer) => answer?,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                return Err(Error::Timeout(timeout));
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return Err(Error::External(
                    "classifier exited without an answer".into(),
                ));
            }
        };

        match DocumentType::parse_loose(&raw) {
            Some(label) => Ok(ClassificationResult::new(
                label,
                API_CONFIDENCE,
                Method::Api,
            )?
            .with_raw_response(raw.trim())),
            None => {
                tracing::warn!(
                    answer = raw.trim(),
                    "external classifier returned an invalid type"
                );
                Ok(ClassificationResult::new(
                    DocumentType::Other,
                    INVALID_API_CONFIDENCE,
                    Method::Api,
                )?
                .with_info("error", "Invalid API response")
                .with_raw_response(raw.trim()))
            }
        }
    }
}

impl std::fmt::Debug for DocumentClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentClassifier")
            .field("config", &self.config)
            .field("external", &self.external.is_some())
            .finish_non_exhaustive()
    }
}

/// Best label by feedback-adjusted rule confidence. Labels are visited in
/// declared order and only a strictly higher score replaces the leader.
fn score_rules(
    text: &str,
    patterns: &PatternSet,
    feedback: &FeedbackGuard<'_>,
) -> Result<ClassificationResult> {
    let upper = text.to_uppercase();

    let mut best: Option<(DocumentType, f32, Vec<&str>)> = None;
    for (label, set) in patterns.iter() {
        let matched: Vec<&str> = set
            .iter()
            .filter(|p| p.is_match(&upper))
            .map(|p| p.as_str())
            .collect();
        if matched.is_empty() {
            continue;
        }

        let raw = (FIRST_MATCH_CONFIDENCE
            + EXTRA_MATCH_CONFIDENCE * (matched.len() - 1) as f32)
            .min(1.0);
        let adjusted = raw * feedback.confidence_adjustment(label);
        if best.as_ref().is_none_or(|(_, score, _)| adjusted > *score) {
            best = Some((label, adjusted, matched));
        }
    }

    let Some((label, confidence, matched)) = best else {
        return ClassificationResult::new(
            DocumentType::Other,
            0.0,
            Method::RuleBased,
        );
    };

    let count = matched.len();
    Ok(ClassificationResult::new(label, confidence, Method::RuleBased)?
        .with_info("matched_patterns", matched)
        .with_info("pattern_count", count))
}

/// The first `max_chars` characters of `text`.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte, _)) => &text[..byte],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, atomic::AtomicUsize};

    use super::*;
    use crate::patterns::PatternStore;

    struct Fixed(&'static str);

    impl ExternalClassifier for Fixed {
        fn classify(
            &self,
            _: &str,
            _: &[DocumentType],
            _: Duration,
        ) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Failing;

    impl ExternalClassifier for Failing {
        fn classify(
            &self,
            _: &str,
            _: &[DocumentType],
            _: Duration,
        ) -> Result<String> {
            Err(Error::External("connection refused".into()))
        }
    }

    /// Ignores its timeout and blocks for `delay`, counting live calls.
    struct Hanging {
        delay: Duration,
        calls: AtomicUsize,
        live: AtomicUsize,
        peak: AtomicUsize,
        seen_timeout: Mutex<Option<Duration>>,
    }

    impl Hanging {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                calls: AtomicUsize::new(0),
                live: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                seen_timeout: Mutex::new(None),
            }
        }
    }

    impl ExternalClassifier for Hanging {
        fn classify(
            &self,
            _: &str,
            _: &[DocumentType],
            timeout: Duration,
        ) -> Result<String> {
            *self.seen_timeout.lock().unwrap() = Some(timeout);
            self.calls.fetch_add(1, Ordering::SeqCst);
            let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(live, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.live.fetch_sub(1, Ordering::SeqCst);
            Ok("rfi".into())
        }
    }

    fn wait_until(done: impl Fn() -> bool) {
        for _ in 0..400 {
            if done() {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn with_timeout_ms(ms: u64) -> DocumentClassifier {
        let config = ClassifierConfig {
            api_timeout_ms: ms,
            ..Default::default()
        };
        DocumentClassifier::new(config, Arc::new(FeedbackStore::in_memory()))
    }

    fn classifier() -> DocumentClassifier {
        DocumentClassifier::new(
            ClassifierConfig::default(),
            Arc::new(FeedbackStore::in_memory()),
        )
    }

    fn patterns() -> PatternSet {
        PatternStore::default().classification().clone()
    }

    const EMAIL: &str = "From: a@b.com\nSubject: hi";
    const RFI_ONLY: &str = "Request for information about the slab";

    #[test]
    fn empty_text_is_unclassified() {
        let result = classifier().classify("   \n", &patterns()).unwrap();
        assert_eq!(result.document_type(), DocumentType::Other);
        assert_eq!(result.confidence(), 0.0);
        assert_eq!(result.method(), Method::Fallback);
        assert!(result.extracted_info().contains_key("error"));
    }

    #[test]
    fn two_email_patterns_score_point_eight() {
        let c = classifier();
        let result = c.classify(EMAIL, &patterns()).unwrap();
        assert_eq!(result.document_type(), DocumentType::Email);
        assert!((result.confidence() - 0.8).abs() < 1e-6);
        assert_eq!(result.method(), Method::RuleBased);
        assert_eq!(result.extracted_info()["pattern_count"], 2);
        assert_eq!(
            c.feedback()
                .stats(DocumentType::Email)
                .unwrap()
                .total_classifications,
            1
        );
    }

    #[test]
    fn confidence_is_capped_at_one() {
        let text = "From: a@b.com\nTo: c@d.com\nSubject: x\n\
                    Sent: Monday 2024\nMessage-ID: 1";
        let result = classifier().classify(text, &patterns()).unwrap();
        assert_eq!(result.confidence(), 1.0);
    }

    #[test]
    fn ties_keep_first_declared_label() {
        let set = PatternSet::from_strings([
            (DocumentType::Rfi, vec!["SHARED"]),
            (DocumentType::Email, vec!["SHARED"]),
        ]);
        let result = classifier().classify("shared words", &set).unwrap();
        assert_eq!(result.document_type(), DocumentType::Email);
    }

    #[test]
    fn default_table_ties_follow_label_order() {
        // one pattern each for evidence_of_payment and change_order
        let text = "Check No. 1042 for change order pending";
        let result = classifier().classify(text, &patterns()).unwrap();
        assert_eq!(result.document_type(), DocumentType::EvidenceOfPayment);
        assert!((result.confidence() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn feedback_lowers_rule_confidence() {
        let c = classifier();
        for _ in 0..5 {
            c.feedback().record_classification(DocumentType::Email);
            c.record_correction(
                DocumentType::Email,
                DocumentType::Letter,
                0.8,
                EMAIL,
            );
        }

        let result = c.classify(EMAIL, &patterns()).unwrap();
        assert_eq!(result.document_type(), DocumentType::Email);
        assert!((result.confidence() - 0.4).abs() < 1e-6);
        assert_eq!(result.method(), Method::RuleBased);
        // below threshold, so not recorded
        assert_eq!(
            c.feedback()
                .stats(DocumentType::Email)
                .unwrap()
                .total_classifications,
            5
        );
    }

    #[test]
    fn weak_rule_result_is_kept_without_external() {
        let result = classifier().classify(RFI_ONLY, &patterns()).unwrap();
        assert_eq!(result.document_type(), DocumentType::Rfi);
        assert!((result.confidence() - 0.6).abs() < 1e-6);
        assert_eq!(result.method(), Method::RuleBased);
    }

    #[test]
    fn nothing_matched_falls_back_to_other() {
        let result = classifier()
            .classify("lorem ipsum dolor", &patterns())
            .unwrap();
        assert_eq!(result.document_type(), DocumentType::Other);
        assert!((result.confidence() - 0.1).abs() < 1e-6);
        assert_eq!(result.method(), Method::Fallback);
    }

    #[test]
    fn external_answer_wins_with_blended_confidence() {
        let c = classifier().with_external(Arc::new(Fixed(" RFI_Response\n")));
        let result = c.classify(RFI_ONLY, &patterns()).unwrap();
        assert_eq!(result.document_type(), DocumentType::RfiResponse);
        assert_eq!(result.method(), Method::Api);
        assert!((result.confidence() - (0.3 * 0.6 + 0.7 * 0.8)).abs() < 1e-6);
        assert_eq!(result.raw_response(), Some("RFI_Response"));
    }

    #[test]
    fn invalid_external_answer_keeps_rule_label() {
        let c = classifier().with_external(Arc::new(Fixed("banana")));
        let result = c.classify(RFI_ONLY, &patterns()).unwrap();
        assert_eq!(result.document_type(), DocumentType::Rfi);
        assert_eq!(result.method(), Method::RuleBased);
        assert!((result.confidence() - (0.3 * 0.6 + 0.7 * 0.2)).abs() < 1e-6);
    }

    #[test]
    fn invalid_external_answer_without_rules_is_api_other() {
        let c = classifier().with_external(Arc::new(Fixed("banana")));
        let result = c.classify("lorem ipsum", &patterns()).unwrap();
        assert_eq!(result.document_type(), DocumentType::Other);
        assert_eq!(result.method(), Method::Api);
        assert!((result.confidence() - 0.7 * 0.2).abs() < 1e-6);
        assert_eq!(result.raw_response(), Some("banana"));
    }

    #[test]
    fn external_failure_falls_through() {
        let c = classifier().with_external(Arc::new(Failing));
        let result = c.classify(RFI_ONLY, &patterns()).unwrap();
        assert_eq!(result.method(), Method::RuleBased);
        assert!((result.confidence() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn external_timeout_falls_through() {
        let slow = Arc::new(Hanging::new(Duration::from_millis(500)));
        let c = with_timeout_ms(20).with_external(slow.clone());
        let result = c.classify("lorem ipsum", &patterns()).unwrap();
        assert_eq!(result.method(), Method::Fallback);
        wait_until(|| slow.calls.load(Ordering::SeqCst) > 0);
        assert_eq!(
            *slow.seen_timeout.lock().unwrap(),
            Some(Duration::from_millis(20))
        );
    }

    #[test]
    fn hung_service_holds_at_most_one_worker() {
        let hung = Arc::new(Hanging::new(Duration::from_secs(2)));
        let c = with_timeout_ms(10).with_external(hung.clone());
        let docs = vec!["lorem ipsum"; 20];

        let results = c.classify_batch(&docs, &patterns());

        assert_eq!(results.len(), 20);
        assert!(results.iter().all(|r| r.method() == Method::Fallback));
        assert!(hung.peak.load(Ordering::SeqCst) <= 1);
        assert!(hung.calls.load(Ordering::SeqCst) <= 1);
    }

    #[test]
    fn external_is_called_again_after_worker_finishes() {
        let slow = Arc::new(Hanging::new(Duration::from_millis(50)));
        let c = with_timeout_ms(10).with_external(slow.clone());

        let idle = || !c.external_busy.load(Ordering::SeqCst);

        c.classify("lorem ipsum", &patterns()).unwrap();
        wait_until(idle);
        c.classify("lorem ipsum", &patterns()).unwrap();
        wait_until(idle);

        assert_eq!(slow.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn back_to_back_fast_answers_all_reach_the_service() {
        let fast = Arc::new(Hanging::new(Duration::ZERO));
        let c = classifier().with_external(fast.clone());
        for _ in 0..5 {
            let result = c.classify("lorem ipsum", &patterns()).unwrap();
            assert_eq!(result.method(), Method::Api);
        }
        assert_eq!(fast.calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn text_is_truncated_before_scoring() {
        let text = format!("{}\nREQUEST FOR INFORMATION", "x".repeat(1500));
        let result = classifier().classify(&text, &patterns()).unwrap();
        assert_eq!(result.document_type(), DocumentType::Other);
    }

    #[test]
    fn repeated_classification_is_stable() {
        let c = classifier();
        let first = c.classify(RFI_ONLY, &patterns()).unwrap();
        let second = c.classify(RFI_ONLY, &patterns()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn batch_classifies_each_item() {
        let results = classifier().classify_batch(
            &["", EMAIL, "lorem ipsum"],
            &patterns(),
        );
        let labels: Vec<_> =
            results.iter().map(|r| (r.document_type(), r.method())).collect();
        assert_eq!(
            labels,
            vec![
                (DocumentType::Other, Method::Fallback),
                (DocumentType::Email, Method::RuleBased),
                (DocumentType::Other, Method::Fallback),
            ]
        );
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
