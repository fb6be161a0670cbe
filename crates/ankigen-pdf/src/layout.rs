//! Approximate glyph placement from a page content stream.
//!
//! Font metrics are not consulted: every glyph is `GLYPH_WIDTH` ems wide and
//! one em tall, which is enough to tell which words sit under an annotation.

use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};

use crate::{PdfError, Rect, decode_text, number};

const GLYPH_WIDTH: f32 = 0.5;

/// One character and its box in user space.
#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    pub ch: char,
    pub bbox: Rect,
}

type Matrix = [f32; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// `translate(tx, ty) × m`
fn translate(m: &Matrix, tx: f32, ty: f32) -> Matrix {
    [
        m[0],
        m[1],
        m[2],
        m[3],
        tx * m[0] + ty * m[2] + m[4],
        tx * m[1] + ty * m[3] + m[5],
    ]
}

/// `a × b`
fn multiply(a: &Matrix, b: &Matrix) -> Matrix {
    [
        a[0] * b[0] + a[1] * b[2],
        a[0] * b[1] + a[1] * b[3],
        a[2] * b[0] + a[3] * b[2],
        a[2] * b[1] + a[3] * b[3],
        a[4] * b[0] + a[5] * b[2] + b[4],
        a[4] * b[1] + a[5] * b[3] + b[5],
    ]
}

fn matrix_operands(operands: &[Object]) -> Option<Matrix> {
    if operands.len() != 6 {
        return None;
    }
    let mut m = IDENTITY;
    for (slot, value) in m.iter_mut().zip(operands) {
        *slot = number(value).unwrap_or(0.0);
    }
    Some(m)
}

fn apply(m: &Matrix, x: f32, y: f32) -> (f32, f32) {
    (x * m[0] + y * m[2] + m[4], x * m[1] + y * m[3] + m[5])
}

struct TextState {
    tm: Matrix,
    tlm: Matrix,
    font_size: f32,
    leading: f32,
    char_spacing: f32,
    word_spacing: f32,
}

impl TextState {
    fn new() -> Self {
        Self {
            tm: IDENTITY,
            tlm: IDENTITY,
            font_size: 0.0,
            leading: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.tlm = translate(&self.tlm, tx, ty);
        self.tm = self.tlm;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.leading);
    }

    /// Glyph boxes land in page space: text space through `Tm × CTM`.
    fn show(&mut self, bytes: &[u8], ctm: &Matrix, out: &mut Vec<Glyph>) {
        let size = self.font_size;
        let width = GLYPH_WIDTH * size;
        for ch in decode_text(bytes).chars() {
            let m = multiply(&self.tm, ctm);
            let corners = [
                apply(&m, 0.0, 0.0),
                apply(&m, width, size),
                apply(&m, width, 0.0),
                apply(&m, 0.0, size),
            ];
            let (mut x1, mut y1) = corners[0];
            let (mut x2, mut y2) = corners[0];
            for &(x, y) in &corners[1..] {
                x1 = x1.min(x);
                y1 = y1.min(y);
                x2 = x2.max(x);
                y2 = y2.max(y);
            }
            out.push(Glyph {
                ch,
                bbox: Rect::new(x1, y1, x2, y2),
            });

            let mut advance = width + self.char_spacing;
            if ch == ' ' {
                advance += self.word_spacing;
            }
            self.tm = translate(&self.tm, advance, 0.0);
        }
    }
}

fn operand(operands: &[Object], idx: usize) -> f32 {
    operands.get(idx).and_then(number).unwrap_or(0.0)
}

/// Lay out every text-showing operator on the page.
pub fn page_glyphs(doc: &Document, page_id: ObjectId) -> Result<Vec<Glyph>, PdfError> {
    let data = doc
        .get_page_content(page_id)
        .map_err(|e| PdfError::Malformed(format!("page content {:?}: {}", page_id, e)))?;
    let content = Content::decode(&data)
        .map_err(|e| PdfError::Malformed(format!("content stream {:?}: {}", page_id, e)))?;

    let mut state = TextState::new();
    let mut ctm = IDENTITY;
    let mut saved: Vec<Matrix> = Vec::new();
    let mut glyphs = Vec::new();

    for op in &content.operations {
        let args = &op.operands;
        match op.operator.as_str() {
            "q" => saved.push(ctm),
            // Unbalanced `Q` is tolerated.
            "Q" => ctm = saved.pop().unwrap_or(IDENTITY),
            "cm" => {
                if let Some(m) = matrix_operands(args) {
                    ctm = multiply(&m, &ctm);
                }
            }
            "BT" => {
                state.tm = IDENTITY;
                state.tlm = IDENTITY;
            }
            "Tf" => state.font_size = operand(args, 1),
            "TL" => state.leading = operand(args, 0),
            "Tc" => state.char_spacing = operand(args, 0),
            "Tw" => state.word_spacing = operand(args, 0),
            "Td" => state.move_line(operand(args, 0), operand(args, 1)),
            "TD" => {
                state.leading = -operand(args, 1);
                state.move_line(operand(args, 0), operand(args, 1));
            }
            "Tm" => {
                if let Some(m) = matrix_operands(args) {
                    state.tm = m;
                    state.tlm = m;
                }
            }
            "T*" => state.next_line(),
            "Tj" => {
                if let Some(Object::String(bytes, _)) = args.first() {
                    state.show(bytes, &ctm, &mut glyphs);
                }
            }
            "'" => {
                state.next_line();
                if let Some(Object::String(bytes, _)) = args.first() {
                    state.show(bytes, &ctm, &mut glyphs);
                }
            }
            "\"" => {
                state.word_spacing = operand(args, 0);
                state.char_spacing = operand(args, 1);
                state.next_line();
                if let Some(Object::String(bytes, _)) = args.get(2) {
                    state.show(bytes, &ctm, &mut glyphs);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = args.first() {
                    for item in items {
                        match item {
                            Object::String(bytes, _) => state.show(bytes, &ctm, &mut glyphs),
                            other => {
                                if let Some(n) = number(other) {
                                    let tx = -n / 1000.0 * state.font_size;
                                    state.tm = translate(&state.tm, tx, 0.0);
                                }
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    log::debug!("page {:?}: {} glyphs", page_id, glyphs.len());
    Ok(glyphs)
}

/// Concatenate, in content order, the glyphs whose boxes overlap `rect`.
pub fn text_in_rect(glyphs: &[Glyph], rect: &Rect) -> String {
    glyphs
        .iter()
        .filter(|g| g.bbox.intersects(rect))
        .map(|g| g.ch)
        .collect::<String>()
        .trim()
        .to_string()
}
