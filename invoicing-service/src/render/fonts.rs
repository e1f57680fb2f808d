//! Typefaces and text metrics for the invoice document.
//!
//! DejaVu Sans is bundled with the service and embedded into every document,
//! so names, addresses and the rupee sign render as written. String widths
//! for alignment and wrapping come from the same font files. If the bundled
//! faces cannot be parsed the document falls back to the built-in Helvetica
//! pair, measured with the standard AFM advance widths (units of 1/1000 em)
//! for the printable ASCII range.

use once_cell::sync::Lazy;
use ttf_parser::Face as TtfFace;

/// Face used for a run of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    Regular,
    Bold,
}

const PT_TO_MM: f32 = 25.4 / 72.0;
const FALLBACK_WIDTH: u16 = 556;
const REPLACEMENT: char = '?';

static REGULAR_TTF: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");
static BOLD_TTF: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans-Bold.ttf");

struct EmbeddedFaces {
    regular: TtfFace<'static>,
    bold: TtfFace<'static>,
}

impl EmbeddedFaces {
    fn get(&self, face: Face) -> &TtfFace<'static> {
        match face {
            Face::Regular => &self.regular,
            Face::Bold => &self.bold,
        }
    }
}

static EMBEDDED: Lazy<Option<EmbeddedFaces>> = Lazy::new(|| {
    let parsed = TtfFace::parse(REGULAR_TTF, 0).and_then(|regular| {
        TtfFace::parse(BOLD_TTF, 0).map(|bold| EmbeddedFaces { regular, bold })
    });
    match parsed {
        Ok(faces) => Some(faces),
        Err(e) => {
            tracing::warn!(error = %e, "Bundled fonts unreadable, using built-in Helvetica");
            None
        }
    }
});

/// Font program to embed for `face`, or `None` when the built-in fonts are in use.
pub fn font_program(face: Face) -> Option<&'static [u8]> {
    EMBEDDED.as_ref().map(|_| match face {
        Face::Regular => REGULAR_TTF,
        Face::Bold => BOLD_TTF,
    })
}

#[rustfmt::skip]
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // '0'..'?'
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // '@'..'O'
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 'P'..'_'
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // '`'..'o'
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,      // 'p'..'~'
];

#[rustfmt::skip]
const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, // '0'..'?'
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, // '@'..'O'
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556, // 'P'..'_'
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611, // '`'..'o'
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,      // 'p'..'~'
];

fn builtin_advance(face: Face, ch: char) -> u16 {
    let table = match face {
        Face::Regular => &HELVETICA,
        Face::Bold => &HELVETICA_BOLD,
    };
    (ch as u32)
        .checked_sub(32)
        .and_then(|index| table.get(index as usize))
        .copied()
        .unwrap_or(FALLBACK_WIDTH)
}

/// Advance width of `ch` in em.
fn advance(face: Face, ch: char) -> f32 {
    if let Some(faces) = EMBEDDED.as_ref() {
        let ttf = faces.get(face);
        if let Some(width) = ttf
            .glyph_index(ch)
            .and_then(|glyph| ttf.glyph_hor_advance(glyph))
        {
            return f32::from(width) / f32::from(ttf.units_per_em());
        }
    }
    f32::from(builtin_advance(face, ch)) / 1000.0
}

/// Whether the active fonts can draw `ch` in `face`.
pub fn can_render(face: Face, ch: char) -> bool {
    match EMBEDDED.as_ref() {
        Some(faces) => faces.get(face).glyph_index(ch).is_some(),
        None => matches!(ch, ' '..='~'),
    }
}

/// Replace characters the active fonts cannot draw.
pub fn printable(text: &str, face: Face) -> String {
    text.chars()
        .map(|ch| match ch {
            '\t' => ' ',
            ch if ch.is_control() => REPLACEMENT,
            ch if can_render(face, ch) => ch,
            _ => REPLACEMENT,
        })
        .collect()
}

/// Rendered width of `text` in millimetres.
pub fn string_width(text: &str, face: Face, size_pt: f32) -> f32 {
    let em: f32 = text.chars().map(|ch| advance(face, ch)).sum();
    em * size_pt * PT_TO_MM
}

/// Greedy word wrap to `max_width` millimetres.
///
/// Explicit newlines start a new line; words wider than the column are split
/// between characters. Returns no lines for blank input.
pub fn wrap_text(text: &str, face: Face, size_pt: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    if text.trim().is_empty() {
        return lines;
    }

    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", current, word)
            };

            if string_width(&candidate, face, size_pt) <= max_width {
                current = candidate;
                continue;
            }

            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }

            for ch in word.chars() {
                current.push(ch);
                if string_width(&current, face, size_pt) > max_width && current.chars().count() > 1 {
                    current.pop();
                    lines.push(std::mem::replace(&mut current, ch.to_string()));
                }
            }
        }

        if !current.is_empty() {
            lines.push(current);
        }
    }

    lines
}
