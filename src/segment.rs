use serde::{Deserialize, Serialize};

use crate::{boundary::BoundarySet, page::PageObservation};

/// An inclusive, zero-based page range making up one logical document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSegment {
    pub start_page: usize,
    pub end_page: usize,
}

impl DocumentSegment {
    pub fn page_count(&self) -> usize {
        self.end_page - self.start_page + 1
    }

    /// The segment's pages' text joined by newlines.
    pub fn text(&self, pages: &[PageObservation]) -> String {
        let end = (self.end_page + 1).min(pages.len());
        let start = self.start_page.min(end);
        pages[start..end]
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Turn sorted boundaries into contiguous page ranges covering
/// `[0, total_pages - 1]`.
///
/// With no boundaries the whole input is a single segment.
pub fn get_document_sections(
    boundaries: &BoundarySet,
    total_pages: usize,
) -> Vec<DocumentSegment> {
    sections_from_starts(boundaries.as_slice(), total_pages)
}

fn sections_from_starts(
    starts: &[usize],
    total_pages: usize,
) -> Vec<DocumentSegment> {
    if total_pages == 0 {
        return Vec::new();
    }
    if starts.is_empty() {
        return vec![DocumentSegment {
            start_page: 0,
            end_page: total_pages - 1,
        }];
    }

    starts
        .iter()
        .enumerate()
        .filter_map(|(i, &start_page)| {
            let end_page = match starts.get(i + 1) {
                Some(&next) => next.checked_sub(1)?,
                None => total_pages - 1,
            };
            (start_page <= end_page).then_some(DocumentSegment {
                start_page,
                end_page,
            })
        })
        .collect()
}
