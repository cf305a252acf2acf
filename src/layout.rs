//! Reading-order recovery for positioned page text.
//!
//! PDF content streams emit text in drawing order, which interleaves the
//! columns of tabular statements. Sorting fragments by their anchors, with a
//! vertical tolerance band, recovers row order without table detection.

use log::debug;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One text run from a page with its anchor in page space.
/// `y` grows upwards, so the top of the page has the largest value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionedFragment {
    pub text: String,
    pub x: f32,
    pub y: f32,
}

impl PositionedFragment {
    pub fn new(text: impl Into<String>, x: f32, y: f32) -> Self {
        Self {
            text: text.into(),
            x,
            y,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructedLine {
    /// Vertical anchor of the first fragment placed on the line.
    pub y: f32,
    pub fragments: Vec<PositionedFragment>,
    pub text: String,
}

/// Ordered text of a whole document, pages concatenated in page order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconstructedDocument {
    pub lines: Vec<String>,
}

impl ReconstructedDocument {
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|l| l.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LayoutReconstructor {
    y_tolerance: f32,
}

impl Default for LayoutReconstructor {
    fn default() -> Self {
        Self::new(5.0)
    }
}

impl LayoutReconstructor {
    pub fn new(y_tolerance: f32) -> Self {
        Self { y_tolerance }
    }

    /// Groups one page's fragments into lines, top of page first.
    pub fn reconstruct_page(&self, fragments: &[PositionedFragment]) -> Vec<ReconstructedLine> {
        let mut sorted: Vec<&PositionedFragment> = fragments
            .iter()
            .filter(|f| !f.text.trim().is_empty())
            .collect();

        // Stable: equal anchors keep their stream order.
        sorted.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x.total_cmp(&b.x)));

        let mut lines: Vec<ReconstructedLine> = Vec::new();
        let mut previous_y: Option<f32> = None;

        for fragment in sorted {
            let starts_new_line = match previous_y {
                Some(prev) => (prev - fragment.y).abs() > self.y_tolerance,
                None => true,
            };

            if starts_new_line {
                lines.push(ReconstructedLine {
                    y: fragment.y,
                    fragments: Vec::new(),
                    text: String::new(),
                });
            }

            if let Some(line) = lines.last_mut() {
                line.fragments.push(fragment.clone());
            }
            previous_y = Some(fragment.y);
        }

        for line in &mut lines {
            line.fragments
                .sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal));
            line.text = join_fragments(&line.fragments);
        }

        lines
    }

    pub fn page_text(&self, fragments: &[PositionedFragment]) -> String {
        self.reconstruct_page(fragments)
            .into_iter()
            .map(|l| l.text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn reconstruct_document(&self, pages: &[Vec<PositionedFragment>]) -> ReconstructedDocument {
        let mut lines = Vec::new();
        for (idx, page) in pages.iter().enumerate() {
            let page_lines = self.reconstruct_page(page);
            debug!(
                "Page {}: {} fragments grouped into {} lines",
                idx + 1,
                page.len(),
                page_lines.len()
            );
            lines.extend(page_lines.into_iter().map(|l| l.text));
        }
        ReconstructedDocument { lines }
    }
}

fn join_fragments(fragments: &[PositionedFragment]) -> String {
    let mut text = String::new();
    for fragment in fragments {
        let piece = fragment.text.trim();
        if !text.is_empty() && !text.ends_with('\n') {
            text.push(' ');
        }
        text.push_str(piece);
    }
    text
}
