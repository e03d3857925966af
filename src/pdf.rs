//! Minimal A4 document layout on top of `lopdf`.
//!
//! A [`PdfDoc`] is a flat list of blocks (text, spacers, tables) laid out top
//! to bottom with automatic page breaks. Text uses the standard Helvetica
//! faces with WinAnsi encoding, so no font files are embedded.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

pub const PAGE_WIDTH: f32 = 595.28;
pub const PAGE_HEIGHT: f32 = 841.89;
const CM: f32 = 28.346;
pub const MARGIN_X: f32 = 2.0 * CM;
pub const MARGIN_TOP: f32 = 2.5 * CM;
const MARGIN_BOTTOM: f32 = 2.0 * CM;
const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN_X;
const CELL_PAD: f32 = 3.0;
const HEADER_FILL: (f32, f32, f32) = (13.0 / 255.0, 110.0 / 255.0, 253.0 / 255.0);
const GRID_GRAY: f32 = 0.6;

#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    #[error("pdf encoding failed: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Title,
    Heading,
    Body,
    Small,
}

impl Style {
    fn size(self) -> f32 {
        match self {
            Self::Title => 15.0,
            Self::Heading => 11.5,
            Self::Body => 10.0,
            Self::Small => 8.0,
        }
    }

    fn bold(self) -> bool {
        matches!(self, Self::Title | Self::Heading)
    }

    fn leading(self) -> f32 {
        self.size() * 1.35
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
}

#[derive(Debug, Clone)]
pub struct Table {
    /// Relative column widths; scaled to the content width.
    pub widths: Vec<f32>,
    pub header: Option<Vec<String>>,
    pub rows: Vec<Vec<String>>,
    pub highlight_header: bool,
}

#[derive(Debug, Clone)]
pub enum Block {
    Text {
        style: Style,
        align: Align,
        text: String,
    },
    Spacer(f32),
    Table(Table),
}

#[derive(Debug, Clone, Default)]
pub struct PdfDoc {
    title: String,
    blocks: Vec<Block>,
}

impl PdfDoc {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            blocks: Vec::new(),
        }
    }

    pub fn push(&mut self, block: Block) -> &mut Self {
        self.blocks.push(block);
        self
    }

    pub fn text(&mut self, style: Style, align: Align, text: impl Into<String>) -> &mut Self {
        self.push(Block::Text {
            style,
            align,
            text: text.into(),
        })
    }

    pub fn title(&mut self, text: impl Into<String>) -> &mut Self {
        self.text(Style::Title, Align::Center, text)
    }

    pub fn heading(&mut self, text: impl Into<String>) -> &mut Self {
        self.text(Style::Heading, Align::Left, text)
    }

    pub fn paragraph(&mut self, text: impl Into<String>) -> &mut Self {
        self.text(Style::Body, Align::Left, text)
    }

    pub fn small(&mut self, text: impl Into<String>) -> &mut Self {
        self.text(Style::Small, Align::Left, text)
    }

    pub fn spacer(&mut self, height: f32) -> &mut Self {
        self.push(Block::Spacer(height))
    }

    /// Two-column label/value table without a header row.
    pub fn key_values(&mut self, pairs: &[(&str, String)]) -> &mut Self {
        self.push(Block::Table(Table {
            widths: vec![1.0, 2.0],
            header: None,
            rows: pairs
                .iter()
                .map(|(k, v)| vec![k.to_string(), v.clone()])
                .collect(),
            highlight_header: false,
        }))
    }

    pub fn table(&mut self, widths: &[f32], header: &[&str], rows: Vec<Vec<String>>) -> &mut Self {
        self.push(Block::Table(Table {
            widths: widths.to_vec(),
            header: Some(header.iter().map(|h| h.to_string()).collect()),
            rows,
            highlight_header: true,
        }))
    }

    pub fn render(&self) -> Result<Vec<u8>, PdfError> {
        let mut layout = Layout::new();
        for block in &self.blocks {
            match block {
                Block::Text { style, align, text } => layout.paragraph(*style, *align, text),
                Block::Spacer(h) => layout.spacer(*h),
                Block::Table(t) => layout.table(t),
            }
        }
        let pages = layout.finish();
        assemble(&self.title, pages)
    }
}

// Helvetica advance widths (1/1000 em) for ASCII 32..=126.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, 556, 556, 556,
    556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, 1015, 667, 667, 722, 722, 667,
    611, 778, 722, 278, 500, 667, 556, 833, 722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667,
    667, 611, 278, 278, 278, 469, 556, 333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500,
    222, 833, 556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

fn char_width(c: char) -> f32 {
    let code = c as u32;
    let w = if (32..=126).contains(&code) {
        HELVETICA_WIDTHS[(code - 32) as usize]
    } else {
        556
    };
    f32::from(w) / 1000.0
}

pub fn text_width(text: &str, style: Style) -> f32 {
    let factor = if style.bold() { 1.06 } else { 1.0 };
    text.chars().map(char_width).sum::<f32>() * style.size() * factor
}

/// Greedy word wrap; words wider than the line are split by characters.
pub fn wrap(text: &str, style: Style, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    for raw_line in text.split('\n') {
        let mut current = String::new();
        for word in raw_line.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", current, word)
            };
            if text_width(&candidate, style) <= max_width {
                current = candidate;
                continue;
            }
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if text_width(word, style) <= max_width {
                current = word.to_string();
                continue;
            }
            for c in word.chars() {
                current.push(c);
                if text_width(&current, style) > max_width && current.chars().count() > 1 {
                    current.pop();
                    lines.push(std::mem::take(&mut current));
                    current.push(c);
                }
            }
        }
        lines.push(current);
    }
    lines
}

/// Maps text onto WinAnsiEncoding; anything outside it becomes `?`.
fn encode_text(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '€' => 0x80,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            c if (c as u32) < 0x80 || (0xA0..=0xFF).contains(&(c as u32)) => c as u32 as u8,
            _ => b'?',
        })
        .collect()
}

struct Layout {
    pages: Vec<Vec<Operation>>,
    ops: Vec<Operation>,
    y: f32,
}

impl Layout {
    fn new() -> Self {
        Self {
            pages: Vec::new(),
            ops: Vec::new(),
            y: PAGE_HEIGHT - MARGIN_TOP,
        }
    }

    fn new_page(&mut self) {
        self.pages.push(std::mem::take(&mut self.ops));
        self.y = PAGE_HEIGHT - MARGIN_TOP;
    }

    fn ensure(&mut self, height: f32) {
        let at_top = self.y >= PAGE_HEIGHT - MARGIN_TOP;
        if self.y - height < MARGIN_BOTTOM && !at_top {
            self.new_page();
        }
    }

    fn show_text(&mut self, x: f32, baseline: f32, style: Style, text: &str) {
        let font = if style.bold() { "F2" } else { "F1" };
        self.ops.push(Operation::new("BT", vec![]));
        self.ops.push(Operation::new(
            "Tf",
            vec![Object::Name(font.as_bytes().to_vec()), Object::Real(style.size())],
        ));
        self.ops.push(Operation::new(
            "Td",
            vec![Object::Real(x), Object::Real(baseline)],
        ));
        self.ops.push(Operation::new(
            "Tj",
            vec![Object::string_literal(encode_text(text))],
        ));
        self.ops.push(Operation::new("ET", vec![]));
    }

    fn fill_color(&mut self, (r, g, b): (f32, f32, f32)) {
        self.ops.push(Operation::new(
            "rg",
            vec![Object::Real(r), Object::Real(g), Object::Real(b)],
        ));
    }

    fn rect(&mut self, x: f32, y: f32, w: f32, h: f32, op: &str) {
        self.ops.push(Operation::new(
            "re",
            vec![Object::Real(x), Object::Real(y), Object::Real(w), Object::Real(h)],
        ));
        self.ops.push(Operation::new(op, vec![]));
    }

    fn paragraph(&mut self, style: Style, align: Align, text: &str) {
        for line in wrap(text, style, CONTENT_WIDTH) {
            self.ensure(style.leading());
            let x = match align {
                Align::Left => MARGIN_X,
                Align::Center => MARGIN_X + (CONTENT_WIDTH - text_width(&line, style)).max(0.0) / 2.0,
            };
            let baseline = self.y - style.size();
            self.show_text(x, baseline, style, &line);
            self.y -= style.leading();
        }
    }

    fn spacer(&mut self, height: f32) {
        if self.y - height < MARGIN_BOTTOM {
            self.new_page();
        } else {
            self.y -= height;
        }
    }

    fn table(&mut self, table: &Table) {
        let total: f32 = table.widths.iter().sum::<f32>().max(f32::EPSILON);
        let widths: Vec<f32> = table
            .widths
            .iter()
            .map(|w| w / total * CONTENT_WIDTH)
            .collect();

        if let Some(header) = &table.header {
            self.table_row(&widths, header, Style::Heading, table.highlight_header);
        }
        for row in &table.rows {
            let row_height = row_height(&widths, row, Style::Body);
            self.ensure(row_height);
            if self.y >= PAGE_HEIGHT - MARGIN_TOP {
                if let Some(header) = &table.header {
                    if !self.pages.is_empty() {
                        self.table_row(&widths, header, Style::Heading, table.highlight_header);
                    }
                }
            }
            self.table_row(&widths, row, Style::Body, false);
        }
        self.y -= 4.0;
    }

    fn table_row(&mut self, widths: &[f32], cells: &[String], style: Style, highlight: bool) {
        let height = row_height(widths, cells, style);
        self.ensure(height);
        let top = self.y;
        let mut x = MARGIN_X;
        for (i, width) in widths.iter().enumerate() {
            let text = cells.get(i).map(String::as_str).unwrap_or_default();
            if highlight {
                self.fill_color(HEADER_FILL);
                self.rect(x, top - height, *width, height, "f");
                self.fill_color((1.0, 1.0, 1.0));
            }
            let lines = wrap(text, style, width - 2.0 * CELL_PAD);
            let mut baseline = top - CELL_PAD - style.size();
            for line in lines {
                self.show_text(x + CELL_PAD, baseline, style, &line);
                baseline -= style.leading();
            }
            if highlight {
                self.fill_color((0.0, 0.0, 0.0));
            }
            self.ops.push(Operation::new(
                "RG",
                vec![
                    Object::Real(GRID_GRAY),
                    Object::Real(GRID_GRAY),
                    Object::Real(GRID_GRAY),
                ],
            ));
            self.ops.push(Operation::new("w", vec![Object::Real(0.5)]));
            self.rect(x, top - height, *width, height, "S");
            x += width;
        }
        self.y -= height;
    }

    fn finish(mut self) -> Vec<Vec<Operation>> {
        if !self.ops.is_empty() || self.pages.is_empty() {
            self.pages.push(std::mem::take(&mut self.ops));
        }
        let count = self.pages.len();
        for (i, ops) in self.pages.iter_mut().enumerate() {
            let label = format!("Page {} / {}", i + 1, count);
            let x = (PAGE_WIDTH - text_width(&label, Style::Small)) / 2.0;
            let mut footer = Layout::new();
            footer.show_text(x, MARGIN_BOTTOM / 2.0, Style::Small, &label);
            ops.extend(footer.ops);
        }
        self.pages
    }
}

fn row_height(widths: &[f32], cells: &[String], style: Style) -> f32 {
    let lines = widths
        .iter()
        .enumerate()
        .map(|(i, w)| {
            let text = cells.get(i).map(String::as_str).unwrap_or_default();
            wrap(text, style, w - 2.0 * CELL_PAD).len()
        })
        .max()
        .unwrap_or(1)
        .max(1);
    lines as f32 * style.leading() + 2.0 * CELL_PAD - (style.leading() - style.size())
}

fn font(base: &str) -> lopdf::Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => Object::Name(base.as_bytes().to_vec()),
        "Encoding" => "WinAnsiEncoding",
    }
}

fn assemble(title: &str, pages: Vec<Vec<Operation>>) -> Result<Vec<u8>, PdfError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let regular = doc.add_object(font("Helvetica"));
    let bold = doc.add_object(font("Helvetica-Bold"));
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular,
            "F2" => bold,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for operations in pages {
        let content = Content { operations };
        let encoded = content
            .encode()
            .map_err(|e| PdfError::Encode(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => Object::Integer(count),
        "Resources" => resources_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(PAGE_WIDTH),
            Object::Real(PAGE_HEIGHT),
        ],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal(encode_text(title)),
        "Producer" => Object::string_literal(concat!("umsd ", env!("CARGO_PKG_VERSION"))),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);
    doc.compress();

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| PdfError::Encode(e.to_string()))?;
    Ok(out)
}
