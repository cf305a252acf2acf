//! Positioned text fragments from PDF content streams.
//!
//! Text-positioning operators are interpreted together with the current
//! transformation matrix (`cm`, `q`, `Q`), so every anchor is in y-up
//! device space even when the producer flips the page. Font metrics are
//! ignored, so horizontal advances are approximate. That is enough for row
//! grouping in [`crate::layout`].

use crate::error::Result;
use crate::layout::PositionedFragment;
use log::{debug, warn};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object};

/// TJ displacements below this (thousandths of an em) read as a word gap.
const TJ_SPACE_THRESHOLD: f32 = -200.0;
/// Rough average glyph width as a fraction of the font size.
const AVG_GLYPH_WIDTH: f32 = 0.5;

const IDENTITY: [f32; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Returns one fragment list per page, in page order.
pub fn extract_fragments(bytes: &[u8]) -> Result<Vec<Vec<PositionedFragment>>> {
    let document = Document::load_mem(bytes)?;
    let pages = document.get_pages();
    let mut result = Vec::with_capacity(pages.len());

    for (page_number, page_id) in pages {
        let data = match document.get_page_content(page_id) {
            Ok(data) => data,
            Err(e) => {
                warn!("Page {}: unreadable content stream ({}), skipping", page_number, e);
                result.push(Vec::new());
                continue;
            }
        };

        let fragments = match Content::decode(&data) {
            Ok(content) => fragments_from_operations(&content.operations),
            Err(e) => {
                warn!("Page {}: content stream did not decode ({}), skipping", page_number, e);
                Vec::new()
            }
        };

        debug!("Page {}: {} text fragments", page_number, fragments.len());
        result.push(fragments);
    }

    Ok(result)
}

#[derive(Debug, Clone)]
struct TextState {
    matrix: [f32; 6],
    line_matrix: [f32; 6],
    leading: f32,
    font_size: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            matrix: IDENTITY,
            line_matrix: IDENTITY,
            leading: 0.0,
            font_size: 10.0,
        }
    }
}

impl TextState {
    fn begin_text(&mut self) {
        self.matrix = IDENTITY;
        self.line_matrix = IDENTITY;
    }

    fn set_matrix(&mut self, m: [f32; 6]) {
        self.matrix = m;
        self.line_matrix = m;
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        let lm = self.line_matrix;
        let e = lm[4] + tx * lm[0] + ty * lm[2];
        let f = lm[5] + tx * lm[1] + ty * lm[3];
        self.line_matrix = [lm[0], lm[1], lm[2], lm[3], e, f];
        self.matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        let leading = self.leading;
        self.move_line(0.0, -leading);
    }

    /// Text-space origin mapped through `ctm` into device space.
    fn anchor(&self, ctm: &[f32; 6]) -> (f32, f32) {
        transform_point(ctm, self.matrix[4], self.matrix[5])
    }

    fn advance(&mut self, text: &str) {
        let width = text.chars().count() as f32 * self.font_size * AVG_GLYPH_WIDTH;
        self.matrix[4] += width * self.matrix[0];
        self.matrix[5] += width * self.matrix[1];
    }

    fn show(&mut self, text: String, ctm: &[f32; 6], out: &mut Vec<PositionedFragment>) {
        if text.trim().is_empty() {
            return;
        }
        let (x, y) = self.anchor(ctm);
        self.advance(&text);
        out.push(PositionedFragment { text, x, y });
    }
}

fn fragments_from_operations(operations: &[Operation]) -> Vec<PositionedFragment> {
    let mut state = TextState::default();
    let mut ctm = IDENTITY;
    let mut saved: Vec<[f32; 6]> = Vec::new();
    let mut out = Vec::new();

    for op in operations {
        let operands = &op.operands;
        match op.operator.as_str() {
            "q" => saved.push(ctm),
            "Q" => {
                if let Some(previous) = saved.pop() {
                    ctm = previous;
                }
            }
            "cm" => {
                if let Some(m) = matrix_operands(operands) {
                    ctm = multiply(&m, &ctm);
                }
            }
            "BT" => state.begin_text(),
            "Tf" => {
                if let Some(size) = operands.get(1).and_then(number) {
                    state.font_size = size.abs();
                }
            }
            "TL" => {
                if let Some(leading) = operands.first().and_then(number) {
                    state.leading = leading;
                }
            }
            "Tm" => {
                if let Some(m) = matrix_operands(operands) {
                    state.set_matrix(m);
                }
            }
            "Td" | "TD" => {
                if let (Some(tx), Some(ty)) = (
                    operands.first().and_then(number),
                    operands.get(1).and_then(number),
                ) {
                    if op.operator == "TD" {
                        state.leading = -ty;
                    }
                    state.move_line(tx, ty);
                }
            }
            "T*" => state.next_line(),
            "Tj" => {
                if let Some(text) = operands.first().and_then(decode_string) {
                    state.show(text, &ctm, &mut out);
                }
            }
            "'" => {
                state.next_line();
                if let Some(text) = operands.first().and_then(decode_string) {
                    state.show(text, &ctm, &mut out);
                }
            }
            "\"" => {
                state.next_line();
                if let Some(text) = operands.get(2).and_then(decode_string) {
                    state.show(text, &ctm, &mut out);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    state.show(join_tj_array(items), &ctm, &mut out);
                }
            }
            _ => {}
        }
    }

    out
}

fn matrix_operands(operands: &[Object]) -> Option<[f32; 6]> {
    let values: Vec<f32> = operands.iter().filter_map(number).collect();
    match values.as_slice() {
        &[a, b, c, d, e, f] => Some([a, b, c, d, e, f]),
        _ => None,
    }
}

/// `m × n` in the PDF row-vector convention: apply `m`, then `n`.
fn multiply(m: &[f32; 6], n: &[f32; 6]) -> [f32; 6] {
    [
        m[0] * n[0] + m[1] * n[2],
        m[0] * n[1] + m[1] * n[3],
        m[2] * n[0] + m[3] * n[2],
        m[2] * n[1] + m[3] * n[3],
        m[4] * n[0] + m[5] * n[2] + n[4],
        m[4] * n[1] + m[5] * n[3] + n[5],
    ]
}

fn transform_point(m: &[f32; 6], x: f32, y: f32) -> (f32, f32) {
    (m[0] * x + m[2] * y + m[4], m[1] * x + m[3] * y + m[5])
}

fn join_tj_array(items: &[Object]) -> String {
    let mut text = String::new();
    for item in items {
        match item {
            Object::String(..) => {
                if let Some(piece) = decode_string(item) {
                    text.push_str(&piece);
                }
            }
            other => {
                if let Some(offset) = number(other) {
                    if offset < TJ_SPACE_THRESHOLD && !text.ends_with(' ') {
                        text.push(' ');
                    }
                }
            }
        }
    }
    text
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(f) => Some(*f),
        _ => None,
    }
}

/// UTF-16BE when BOM-prefixed, otherwise byte-per-char Latin-1.
fn decode_string(obj: &Object) -> Option<String> {
    let Object::String(bytes, _) = obj else {
        return None;
    };

    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return Some(String::from_utf16_lossy(&units));
    }

    Some(bytes.iter().map(|&b| b as char).collect())
}
