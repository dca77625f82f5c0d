//! Per-page observations produced by an external feature extractor.
//!
//! This crate never reads PDF bytes. A [`PageObservation`] is built once
//! per page by whatever extracted the text and layout, and is only read
//! from then on.

use serde::{Deserialize, Serialize};

/// Font size (in points) above which text counts as "large".
pub const DEFAULT_LARGE_FONT_THRESHOLD: f32 = 16.0;

/// Number of leading lines scanned for `first_lines`.
const FIRST_LINES_SCAN: usize = 10;

/// Font size assumed for a page with no observed font sizes.
const FALLBACK_FONT_SIZE: f32 = 12.0;

/// A positioned run of text on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    #[serde(default)]
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub font_size: f32,
    #[serde(default)]
    pub font_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutInfo {
    pub font_sizes: Vec<f32>,
    pub text_blocks: Vec<TextBlock>,
    pub page_width: f32,
    pub page_height: f32,
}

impl LayoutInfo {
    /// Mean observed font size, or 12pt when nothing was observed.
    pub fn average_font_size(&self) -> f32 {
        if self.font_sizes.is_empty() {
            return FALLBACK_FONT_SIZE;
        }
        self.font_sizes.iter().sum::<f32>() / self.font_sizes.len() as f32
    }

    /// Mean y coordinate of all text blocks, `None` for a page without blocks.
    pub fn average_block_y(&self) -> Option<f32> {
        if self.text_blocks.is_empty() {
            return None;
        }
        let total: f32 = self.text_blocks.iter().map(|b| b.y).sum();
        Some(total / self.text_blocks.len() as f32)
    }

    /// Whether any text sits in the top 10% of the page.
    pub fn has_header(&self) -> bool {
        self.text_blocks
            .iter()
            .any(|b| b.y < self.page_height * 0.1)
    }

    /// Whether any text sits in the bottom 10% of the page.
    pub fn has_footer(&self) -> bool {
        self.text_blocks
            .iter()
            .any(|b| b.y > self.page_height * 0.9)
    }
}

/// Text and layout observed on a single page.
///
/// When deserialized, a missing `first_lines` or `has_large_text` is derived
/// from the text and layout the same way [`PageObservation::from_extracted`]
/// does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "PageRecord")]
pub struct PageObservation {
    /// Zero-based page index.
    pub index: usize,
    pub text: String,
    pub has_large_text: bool,
    /// Up to ten non-empty, trimmed lines from the top of the page.
    pub first_lines: Vec<String>,
    pub layout: LayoutInfo,
}

/// Wire form of a page, with the derivable fields optional.
#[derive(Deserialize)]
struct PageRecord {
    index: usize,
    #[serde(default)]
    text: String,
    has_large_text: Option<bool>,
    first_lines: Option<Vec<String>>,
    #[serde(default)]
    layout: LayoutInfo,
}

impl From<PageRecord> for PageObservation {
    fn from(record: PageRecord) -> Self {
        let mut page = Self::from_extracted(
            record.index,
            record.text,
            record.layout,
        );
        if let Some(flag) = record.has_large_text {
            page.has_large_text = flag;
        }
        if let Some(lines) = record.first_lines {
            page.first_lines = lines;
        }
        page
    }
}

impl PageObservation {
    /// Build an observation from raw extracted text and layout, deriving
    /// `first_lines` and `has_large_text` with the default 16pt threshold.
    pub fn from_extracted(
        index: usize,
        text: String,
        layout: LayoutInfo,
    ) -> Self {
        Self::with_large_font_threshold(
            index,
            text,
            layout,
            DEFAULT_LARGE_FONT_THRESHOLD,
        )
    }

    pub fn with_large_font_threshold(
        index: usize,
        text: String,
        layout: LayoutInfo,
        threshold: f32,
    ) -> Self {
        let first_lines = leading_lines(&text);
        let has_large_text = layout.font_sizes.iter().any(|&s| s > threshold);
        Self {
            index,
            text,
            has_large_text,
            first_lines,
            layout,
        }
    }

    /// The first three header lines, used for header comparison.
    pub fn header(&self) -> &[String] {
        &self.first_lines[..self.first_lines.len().min(3)]
    }
}

fn leading_lines(text: &str) -> Vec<String> {
    text.split('\n')
        .take(FIRST_LINES_SCAN)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(y: f32, font_size: f32) -> TextBlock {
        TextBlock {
            text: "x".into(),
            x: 0.0,
            y,
            width: 10.0,
            height: 10.0,
            font_size,
            font_name: "Helvetica".into(),
        }
    }

    #[test]
    fn first_lines_skip_blank_and_trim() {
        let page = PageObservation::from_extracted(
            0,
            "  Title  \n\n  \nSecond\nThird".into(),
            LayoutInfo::default(),
        );
        assert_eq!(page.first_lines, vec!["Title", "Second", "Third"]);
    }

    #[test]
    fn first_lines_only_scan_ten_lines() {
        let text = (0..20)
            .map(|i| if i % 2 == 0 { String::new() } else { format!("l{i}") })
            .collect::<Vec<_>>()
            .join("\n");
        let page =
            PageObservation::from_extracted(0, text, LayoutInfo::default());
        assert_eq!(page.first_lines.len(), 5);
        assert_eq!(page.first_lines[0], "l1");
    }

    #[test]
    fn large_text_threshold_is_strict() {
        let layout = LayoutInfo {
            font_sizes: vec![10.0, 16.0],
            ..Default::default()
        };
        let page = PageObservation::from_extracted(0, String::new(), layout);
        assert!(!page.has_large_text);

        let layout = LayoutInfo {
            font_sizes: vec![10.0, 16.5],
            ..Default::default()
        };
        let page = PageObservation::from_extracted(0, String::new(), layout);
        assert!(page.has_large_text);
    }

    #[test]
    fn average_font_size_defaults_to_twelve() {
        assert_eq!(LayoutInfo::default().average_font_size(), 12.0);
        let layout = LayoutInfo {
            font_sizes: vec![10.0, 14.0],
            ..Default::default()
        };
        assert_eq!(layout.average_font_size(), 12.0);
    }

    #[test]
    fn header_and_footer_flags() {
        let layout = LayoutInfo {
            text_blocks: vec![block(20.0, 12.0), block(750.0, 8.0)],
            page_width: 612.0,
            page_height: 792.0,
            ..Default::default()
        };
        assert!(layout.has_header());
        assert!(layout.has_footer());
        assert_eq!(layout.average_block_y(), Some(385.0));
    }

    #[test]
    fn deserialized_page_derives_missing_lines() {
        let page: PageObservation = serde_json::from_str(
            r#"{"index": 2, "text": "\n  CHANGE ORDER 4 \nScope"}"#,
        )
        .unwrap();
        assert_eq!(page.first_lines, vec!["CHANGE ORDER 4", "Scope"]);
        assert!(!page.has_large_text);

        let page: PageObservation = serde_json::from_str(
            r#"{"index": 0, "text": "body", "layout": {"font_sizes": [20.0]}}"#,
        )
        .unwrap();
        assert!(page.has_large_text);
        assert_eq!(page.header(), ["body"]);
    }

    #[test]
    fn deserialized_page_keeps_supplied_fields() {
        let page: PageObservation = serde_json::from_str(
            r#"{"index": 0, "text": "body", "has_large_text": true,
                "first_lines": ["Cover"]}"#,
        )
        .unwrap();
        assert!(page.has_large_text);
        assert_eq!(page.first_lines, vec!["Cover"]);

        let back: PageObservation =
            serde_json::from_str(&serde_json::to_string(&page).unwrap())
                .unwrap();
        assert_eq!(back, page);
    }

    #[test]
    fn header_is_at_most_three_lines() {
        let page = PageObservation::from_extracted(
            0,
            "a\nb\nc\nd".into(),
            LayoutInfo::default(),
        );
        assert_eq!(page.header(), ["a", "b", "c"]);
    }
}
