//! Boundary Detector: decides which pages start a new logical document.
//!
//! Every page after the first is scored from four independent signals:
//!
//! 1. a boundary pattern matching anywhere on the page (3.0),
//! 2. layout change against the previous page: average font size moving by
//!    more than 20% (1.0) and average block position moving by more than 30%
//!    of the page height (1.0),
//! 3. the page carrying large text (`large_font_weight`),
//! 4. a header unlike any of the previous three pages' headers
//!    (`header_change_weight`).
//!
//! A page whose summed score reaches `confidence_threshold` is a boundary.

use std::collections::HashSet;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{page::PageObservation, patterns::PatternSet};

const PATTERN_SCORE: f32 = 3.0;
const FONT_CHANGE_SCORE: f32 = 1.0;
const FONT_CHANGE_RATIO: f32 = 0.2;
const LAYOUT_SHIFT_SCORE: f32 = 1.0;
const LAYOUT_SHIFT_RATIO: f32 = 0.3;
const HEADER_SIMILARITY: f32 = 0.3;
const HEADER_LOOKBACK: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    /// Minimum number of pages between two accepted boundaries.
    pub min_document_length: usize,
    pub confidence_threshold: f32,
    pub large_font_weight: f32,
    pub header_change_weight: f32,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            min_document_length: 1,
            confidence_threshold: 0.7,
            large_font_weight: 2.0,
            header_change_weight: 1.5,
        }
    }
}

/// Sorted, deduplicated page indices at which a document starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct BoundarySet(Vec<usize>);

impl BoundarySet {
    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn contains(&self, page: usize) -> bool {
        self.0.binary_search(&page).is_ok()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<usize> {
        self.0
    }
}

/// Per-signal contributions for a single page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BoundaryScore {
    pub page: usize,
    pub pattern: f32,
    pub font_change: f32,
    pub layout_shift: f32,
    pub large_font: f32,
    pub header_change: f32,
}

impl BoundaryScore {
    pub fn total(&self) -> f32 {
        self.pattern
            + self.font_change
            + self.layout_shift
            + self.large_font
            + self.header_change
    }
}

#[derive(Debug, Clone, Default)]
pub struct BoundaryDetector {
    config: BoundaryConfig,
}

impl BoundaryDetector {
    pub fn new(config: BoundaryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BoundaryConfig {
        &self.config
    }

    /// Detect and validate document boundaries.
    ///
    /// Returns an empty set for no pages; otherwise page 0 is always present.
    pub fn detect(
        &self,
        pages: &[PageObservation],
        patterns: &PatternSet,
    ) -> BoundarySet {
        if pages.is_empty() {
            return BoundarySet::default();
        }

        let mut boundaries = vec![0];
        boundaries.extend(
            self.score_pages(pages, patterns)
                .into_iter()
                .filter(|score| {
                    score.total() >= self.config.confidence_threshold
                })
                .map(|score| score.page),
        );

        tracing::debug!(
            pages = pages.len(),
            raw = boundaries.len(),
            "scored page transitions"
        );

        self.validate_boundaries(&boundaries, pages.len())
    }

    /// Score every page after the first. Pages are scored independently.
    pub fn score_pages(
        &self,
        pages: &[PageObservation],
        patterns: &PatternSet,
    ) -> Vec<BoundaryScore> {
        (1..pages.len())
            .into_par_iter()
            .map(|i| self.score_page(pages, i, patterns))
            .collect()
    }

    pub fn score_page(
        &self,
        pages: &[PageObservation],
        index: usize,
        patterns: &PatternSet,
    ) -> BoundaryScore {
        let current = &pages[index];
        let mut score = BoundaryScore {
            page: index,
            pattern: pattern_score(&current.text, patterns),
            ..Default::default()
        };

        if let Some(previous) = index.checked_sub(1).map(|i| &pages[i]) {
            score.font_change = font_change_score(previous, current);
            score.layout_shift = layout_shift_score(previous, current);
        }

        if current.has_large_text {
            score.large_font = self.config.large_font_weight;
        }

        if header_changed(pages, index) {
            score.header_change = self.config.header_change_weight;
        }

        score
    }

    /// Keep page 0, drop duplicates and out-of-range pages, and drop any
    /// boundary closer than `min_document_length` to the last kept one.
    pub fn validate_boundaries(
        &self,
        boundaries: &[usize],
        total_pages: usize,
    ) -> BoundarySet {
        let mut rest: Vec<usize> = boundaries
            .iter()
            .copied()
            .filter(|&b| b != 0 && b < total_pages)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        rest.sort_unstable();

        let mut validated = vec![0];
        for boundary in rest {
            let previous = validated[validated.len() - 1];
            if boundary - previous >= self.config.min_document_length {
                validated.push(boundary);
            }
        }
        BoundarySet(validated)
    }
}

fn pattern_score(text: &str, patterns: &PatternSet) -> f32 {
    let upper = text.to_uppercase();
    let matched = patterns
        .iter()
        .any(|(_, set)| set.iter().any(|p| p.is_match(&upper)));
    if matched { PATTERN_SCORE } else { 0.0 }
}

fn font_change_score(
    previous: &PageObservation,
    current: &PageObservation,
) -> f32 {
    let prev_avg = previous.layout.average_font_size();
    let curr_avg = current.layout.average_font_size();
    if prev_avg <= 0.0 {
        return 0.0;
    }
    if (curr_avg - prev_avg).abs() / prev_avg > FONT_CHANGE_RATIO {
        FONT_CHANGE_SCORE
    } else {
        0.0
    }
}

fn layout_shift_score(
    previous: &PageObservation,
    current: &PageObservation,
) -> f32 {
    let (Some(prev_y), Some(curr_y)) = (
        previous.layout.average_block_y(),
        current.layout.average_block_y(),
    ) else {
        return 0.0;
    };
    let height = current.layout.page_height;
    if height <= 0.0 {
        return 0.0;
    }
    if (curr_y - prev_y).abs() / height > LAYOUT_SHIFT_RATIO {
        LAYOUT_SHIFT_SCORE
    } else {
        0.0
    }
}

/// A header "changes" when it is non-empty and none of the previous three
/// headers share enough words with it. Needs two prior pages.
fn header_changed(pages: &[PageObservation], index: usize) -> bool {
    if index < 2 {
        return false;
    }
    let current = pages[index].header();
    if current.is_empty() {
        return false;
    }
    let start = index.saturating_sub(HEADER_LOOKBACK);
    !pages[start..index]
        .iter()
        .any(|prev| headers_similar(current, prev.header()))
}

fn headers_similar(a: &[String], b: &[String]) -> bool {
    let words_a = header_words(a);
    let words_b = header_words(b);
    if words_a.is_empty() || words_b.is_empty() {
        return false;
    }
    let common = words_a.intersection(&words_b).count();
    let similarity = common as f32 / words_a.len().max(words_b.len()) as f32;
    similarity > HEADER_SIMILARITY
}

fn header_words(lines: &[String]) -> HashSet<String> {
    lines
        .join(" ")
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}
