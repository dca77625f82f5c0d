//! Feedback Store: per-label classification and correction statistics.
//!
//! The store is the only mutable state shared between classifications.
//! Each operation locks the in-memory state, applies the change, and writes
//! the complete state back to disk before releasing the lock. Writes go to
//! a temporary file that is renamed over the target, so an interrupted save
//! leaves the previous file intact.
//!
//! Persisted as JSON:
//!
//! ```json
//! {
//!   "corrections": [{"timestamp": "...", "original_type": "email", ...}],
//!   "stats": {"email": {"total_classifications": 7, ...}},
//!   "last_updated": "2024-05-01T10:00:00+00:00"
//! }
//! ```

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    io::Write,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    label::DocumentType,
};

/// Number of correction entries kept.
pub const MAX_CORRECTIONS: usize = 1000;

/// Characters of document text kept per correction.
pub const SAMPLE_CHARS: usize = 200;

/// Classifications needed before corrections affect confidence.
const MIN_CLASSIFICATIONS: u64 = 5;

const MIN_ADJUSTMENT: f32 = 0.5;

const SUGGESTIONS_PER_GROUP: usize = 3;
const MIN_SUGGESTED_WORD_CHARS: usize = 4;

/// A single user relabeling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionEntry {
    /// ISO-8601 time the correction was recorded.
    pub timestamp: String,
    pub original_type: DocumentType,
    pub corrected_type: DocumentType,
    /// Confidence that was assigned before the correction.
    pub confidence: f32,
    pub text_sample: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrectionStats {
    #[serde(default)]
    pub total_classifications: u64,
    #[serde(default)]
    pub total_corrections: u64,
    /// Labels this label was corrected to, with counts.
    #[serde(default)]
    pub correction_targets: BTreeMap<DocumentType, u64>,
}

impl CorrectionStats {
    pub fn correction_rate(&self) -> f32 {
        if self.total_classifications == 0 {
            return 0.0;
        }
        self.total_corrections as f32 / self.total_classifications as f32
    }

    pub fn accuracy_rate(&self) -> f32 {
        1.0 - self.correction_rate()
    }

    fn confidence_adjustment(&self) -> f32 {
        if self.total_classifications < MIN_CLASSIFICATIONS {
            return 1.0;
        }
        (1.0 - self.correction_rate() * 0.5).max(MIN_ADJUSTMENT)
    }
}

/// One row of [`FeedbackStore::accuracy_report`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccuracyEntry {
    pub total_classifications: u64,
    pub total_corrections: u64,
    pub accuracy_rate: f32,
    pub correction_rate: f32,
    pub confidence_adjustment: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub most_corrected_to: Option<DocumentType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub most_corrected_to_rate: Option<f32>,
}

#[derive(Debug, Default)]
struct FeedbackState {
    corrections: Vec<CorrectionEntry>,
    stats: BTreeMap<DocumentType, CorrectionStats>,
}

impl FeedbackState {
    fn confidence_adjustment(&self, label: DocumentType) -> f32 {
        self.stats
            .get(&label)
            .map_or(1.0, CorrectionStats::confidence_adjustment)
    }

    fn record_classification(&mut self, label: DocumentType) {
        self.stats.entry(label).or_default().total_classifications += 1;
    }

    fn record_correction(&mut self, entry: CorrectionEntry) {
        let stats = self.stats.entry(entry.original_type).or_default();
        stats.total_corrections += 1;
        *stats
            .correction_targets
            .entry(entry.corrected_type)
            .or_default() += 1;

        self.corrections.push(entry);
        if self.corrections.len() > MAX_CORRECTIONS {
            let excess = self.corrections.len() - MAX_CORRECTIONS;
            self.corrections.drain(..excess);
        }
    }
}

#[derive(Deserialize)]
struct FeedbackDocument {
    #[serde(default)]
    corrections: Vec<CorrectionEntry>,
    #[serde(default)]
    stats: BTreeMap<DocumentType, CorrectionStats>,
}

#[derive(Serialize)]
struct FeedbackSnapshot<'a> {
    corrections: &'a [CorrectionEntry],
    stats: &'a BTreeMap<DocumentType, CorrectionStats>,
    last_updated: String,
}

/// Durable per-label statistics used to adapt classification confidence.
pub struct FeedbackStore {
    path: Option<PathBuf>,
    state: Mutex<FeedbackState>,
}

impl FeedbackStore {
    /// Open the store backed by `path`.
    ///
    /// A missing file starts empty. An unreadable or malformed file is
    /// logged and also starts empty; it is replaced on the next write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = load_state(&path);
        Self {
            path: Some(path),
            state: Mutex::new(state),
        }
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(FeedbackState::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Hold the store for a read-adjust-then-record sequence.
    pub fn lock(&self) -> FeedbackGuard<'_> {
        FeedbackGuard {
            store: self,
            state: self.state(),
        }
    }

    fn state(&self) -> MutexGuard<'_, FeedbackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_classification(&self, label: DocumentType) {
        self.lock().record_classification(label);
    }

    pub fn record_correction(
        &self,
        original: DocumentType,
        corrected: DocumentType,
        confidence: f32,
        text_sample: &str,
    ) {
        let entry = CorrectionEntry {
            timestamp: chrono::Local::now().to_rfc3339(),
            original_type: original,
            corrected_type: corrected,
            confidence,
            text_sample: text_sample.chars().take(SAMPLE_CHARS).collect(),
        };

        let mut state = self.state();
        state.record_correction(entry);
        self.persist_logged(&state);
        tracing::info!(%original, %corrected, "recorded correction");
    }

    /// Multiplier in `[0.5, 1.0]` for rule-based confidence of `label`.
    ///
    /// `1.0` until five classifications are recorded, then
    /// `max(0.5, 1 - correction_rate / 2)`.
    pub fn confidence_adjustment(&self, label: DocumentType) -> f32 {
        self.state().confidence_adjustment(label)
    }

    /// Labels `label` was corrected to, with the share of its corrections
    /// each received, highest first. Shares below `threshold` are dropped.
    pub fn alternative_types(
        &self,
        label: DocumentType,
        threshold: f32,
    ) -> Vec<(DocumentType, f32)> {
        let state = self.state();
        let Some(stats) = state.stats.get(&label) else {
            return Vec::new();
        };
        if stats.total_corrections == 0 {
            return Vec::new();
        }

        let mut alternatives: Vec<(DocumentType, f32)> = stats
            .correction_targets
            .iter()
            .map(|(target, &count)| {
                (*target, count as f32 / stats.total_corrections as f32)
            })
            .filter(|(_, probability)| *probability >= threshold)
            .collect();
        alternatives.sort_by(|a, b| b.1.total_cmp(&a.1));
        alternatives
    }

    /// Propose word patterns for labels that keep receiving corrections.
    ///
    /// Corrections are grouped by `(original, corrected)`. For each group
    /// with at least `min_corrections` samples, words longer than three
    /// characters that occur in at least half of the samples are ranked
    /// by frequency and the top three become `\bWORD\b` patterns for the
    /// corrected label.
    pub fn suggest_pattern_improvements(
        &self,
        min_corrections: usize,
    ) -> BTreeMap<DocumentType, Vec<String>> {
        let state = self.state();

        let mut groups: BTreeMap<(DocumentType, DocumentType), Vec<&str>> =
            BTreeMap::new();
        for c in &state.corrections {
            groups
                .entry((c.original_type, c.corrected_type))
                .or_default()
                .push(&c.text_sample);
        }

        let mut suggestions: BTreeMap<DocumentType, Vec<String>> =
            BTreeMap::new();
        for ((_, corrected), samples) in groups {
            if samples.len() < min_corrections {
                continue;
            }
            let words = common_words(&samples);
            if words.is_empty() {
                continue;
            }
            let patterns = suggestions.entry(corrected).or_default();
            for word in words.into_iter().take(SUGGESTIONS_PER_GROUP) {
                let pattern = format!(r"\b{}\b", regex::escape(&word));
                if !patterns.contains(&pattern) {
                    patterns.push(pattern);
                }
            }
        }
        suggestions
    }

    /// Accuracy figures for every label with at least one classification.
    pub fn accuracy_report(&self) -> BTreeMap<DocumentType, AccuracyEntry> {
        let state = self.state();
        state
            .stats
            .iter()
            .filter(|(_, stats)| stats.total_classifications > 0)
            .map(|(label, stats)| {
                let top = most_frequent_target(stats);
                let entry = AccuracyEntry {
                    total_classifications: stats.total_classifications,
                    total_corrections: stats.total_corrections,
                    accuracy_rate: stats.accuracy_rate(),
                    correction_rate: stats.correction_rate(),
                    confidence_adjustment: stats.confidence_adjustment(),
                    most_corrected_to: top.map(|(target, _)| target),
                    most_corrected_to_rate: top.map(|(_, rate)| rate),
                };
                (*label, entry)
            })
            .collect()
    }

    pub fn stats(&self, label: DocumentType) -> Option<CorrectionStats> {
        self.state().stats.get(&label).cloned()
    }

    /// Retained corrections, oldest first.
    pub fn corrections(&self) -> Vec<CorrectionEntry> {
        self.state().corrections.clone()
    }

    /// Write the full state to disk. A no-op for in-memory stores.
    pub fn save(&self) -> Result<()> {
        let state = self.state();
        self.persist(&state)
    }

    fn persist(&self, state: &FeedbackState) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let start = state.corrections.len().saturating_sub(MAX_CORRECTIONS);
        let snapshot = FeedbackSnapshot {
            corrections: &state.corrections[start..],
            stats: &state.stats,
            last_updated: chrono::Local::now().to_rfc3339(),
        };
        write_atomic(path, &serde_json::to_vec_pretty(&snapshot)?)?;
        tracing::debug!(path = %path.display(), "saved feedback");
        Ok(())
    }

    fn persist_logged(&self, state: &FeedbackState) {
        if let Err(e) = self.persist(state) {
            tracing::error!("failed to save feedback: {e}");
        }
    }
}

impl std::fmt::Debug for FeedbackStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Exclusive access to a [`FeedbackStore`] for the duration of one
/// classification.
pub struct FeedbackGuard<'a> {
    store: &'a FeedbackStore,
    state: MutexGuard<'a, FeedbackState>,
}

impl FeedbackGuard<'_> {
    pub fn confidence_adjustment(&self, label: DocumentType) -> f32 {
        self.state.confidence_adjustment(label)
    }

    pub fn record_classification(&mut self, label: DocumentType) {
        self.state.record_classification(label);
        self.store.persist_logged(&self.state);
    }
}

fn load_state(path: &Path) -> FeedbackState {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return FeedbackState::default();
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                "failed to read feedback file: {e}"
            );
            return FeedbackState::default();
        }
    };

    match serde_json::from_str::<FeedbackDocument>(&contents) {
        Ok(doc) => {
            tracing::info!(
                corrections = doc.corrections.len(),
                "loaded feedback file"
            );
            let mut state = FeedbackState {
                corrections: doc.corrections,
                stats: doc.stats,
            };
            let start =
                state.corrections.len().saturating_sub(MAX_CORRECTIONS);
            state.corrections.drain(..start);
            state
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                "failed to load feedback file: {e}"
            );
            FeedbackState::default()
        }
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Upper-cased words longer than three characters found in at least half
/// of `samples`, most frequent first.
fn common_words(samples: &[&str]) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for sample in samples {
        let upper = sample.to_uppercase();
        let mut seen = HashSet::new();
        for word in upper
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter(|w| !w.is_empty())
        {
            let (total, in_samples) =
                counts.entry(word.to_string()).or_default();
            *total += 1;
            if seen.insert(word) {
                *in_samples += 1;
            }
        }
    }

    let mut words: Vec<(String, usize)> = counts
        .into_iter()
        .filter(|(word, (_, in_samples))| {
            in_samples * 2 >= samples.len()
                && word.chars().count() >= MIN_SUGGESTED_WORD_CHARS
        })
        .map(|(word, (total, _))| (word, total))
        .collect();
    words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    words.into_iter().map(|(word, _)| word).collect()
}

/// The most frequent correction target and its share of corrections.
/// Ties go to the label declared first.
fn most_frequent_target(
    stats: &CorrectionStats,
) -> Option<(DocumentType, f32)> {
    if stats.total_corrections == 0 {
        return None;
    }
    let mut best: Option<(DocumentType, u64)> = None;
    for (target, &count) in &stats.correction_targets {
        if best.is_none_or(|(_, c)| count > c) {
            best = Some((*target, count));
        }
    }
    best.map(|(target, count)| {
        (target, count as f32 / stats.total_corrections as f32)
    })
}
