//! A4 invoice document layout.
//!
//! Layout runs top-down with a cursor measured in millimetres from the top
//! edge of the page; it is converted to PDF coordinates only when drawing.

use printpdf::lopdf::{self, Object, StringFormat};
use printpdf::path::PaintMode;
use printpdf::{
    BuiltinFont, Color, CustomPdfConformance, IndirectFontRef, Line, Mm, PdfConformance,
    PdfDocument, PdfDocumentReference, PdfLayerReference, Point, Rect, Rgb,
};
use service_core::error::AppError;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use super::amounts::{format_money, LineAmounts};
use super::fonts::{font_program, printable, string_width, wrap_text, Face};
use crate::models::{InvoiceItem, InvoiceView, Product};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 5.0;
const TOP_MARGIN: f32 = 10.0;
const BOTTOM_MARGIN: f32 = 15.0;
const CELL_PADDING: f32 = 1.0;
const PT_TO_MM: f32 = 25.4 / 72.0;

const ADDRESS_COLUMN_WIDTH: f32 = 95.0;
const ADDRESS_LINE_HEIGHT: f32 = 6.0;
const ROW_HEIGHT: f32 = 7.0;
const BODY_SIZE: f32 = 8.0;

/// Item table columns: heading and width in millimetres.
const COLUMNS: [(&str, f32); 7] = [
    ("#", 10.0),
    ("Item", 60.0),
    ("Rate / Item", 25.0),
    ("Qty", 15.0),
    ("Taxable Value", 30.0),
    ("Tax Amount", 30.0),
    ("Item Total", 30.0),
];

const BLACK: (u8, u8, u8) = (0, 0, 0);
const WHITE: (u8, u8, u8) = (255, 255, 255);
const ACCENT: (u8, u8, u8) = (78, 79, 235);
const ROW_FILL: (u8, u8, u8) = (238, 238, 238);

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Product {product_id} referenced by item {item_id} is not in the catalog")]
    MissingProduct { item_id: Uuid, product_id: Uuid },

    #[error("Amounts for item {item_id} exceed the representable range")]
    AmountOverflow { item_id: Uuid },

    #[error("PDF generation failed: {0}")]
    Pdf(String),
}

impl From<RenderError> for AppError {
    fn from(err: RenderError) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

fn pdf_error(err: impl std::fmt::Display) -> RenderError {
    RenderError::Pdf(err.to_string())
}

/// Finished document bytes.
#[derive(Debug, Clone)]
pub struct RenderedInvoice {
    pub bytes: Vec<u8>,
    pub page_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Center,
    Right,
}

fn rgb((r, g, b): (u8, u8, u8)) -> Color {
    Color::Rgb(Rgb::new(
        f32::from(r) / 255.0,
        f32::from(g) / 255.0,
        f32::from(b) / 255.0,
        None,
    ))
}

/// Shorten `text` with a trailing ".." until it fits `width`.
fn fit(text: &str, face: Face, size: f32, width: f32) -> String {
    if string_width(text, face, size) <= width {
        return text.to_string();
    }
    let mut chars: Vec<char> = text.chars().collect();
    while !chars.is_empty() {
        chars.pop();
        let candidate = format!("{}..", chars.iter().collect::<String>().trim_end());
        if string_width(&candidate, face, size) <= width {
            return candidate;
        }
    }
    String::new()
}

/// One item with its product and derived amounts.
struct Row<'a> {
    item: &'a InvoiceItem,
    product: &'a Product,
    amounts: LineAmounts,
}

struct Canvas {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    cursor: f32,
    pages: usize,
    /// Lowest edge drawn so far on any page, from the top.
    deepest: f32,
}

impl Canvas {
    fn new(title: &str, document_id: String, stamp: OffsetDateTime) -> Result<Self, RenderError> {
        let (doc, page, layer) =
            PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");

        // No XMP/ICC blocks and fixed ids and dates keep the output reproducible.
        let doc = doc
            .with_conformance(PdfConformance::Custom(CustomPdfConformance {
                requires_icc_profile: false,
                requires_xmp_metadata: false,
                ..Default::default()
            }))
            .with_document_id(document_id)
            .with_creation_date(stamp)
            .with_mod_date(stamp)
            .with_metadata_date(stamp);

        let (regular, bold) = match (font_program(Face::Regular), font_program(Face::Bold)) {
            (Some(regular), Some(bold)) => (
                doc.add_external_font(regular).map_err(pdf_error)?,
                doc.add_external_font(bold).map_err(pdf_error)?,
            ),
            _ => (
                doc.add_builtin_font(BuiltinFont::Helvetica)
                    .map_err(pdf_error)?,
                doc.add_builtin_font(BuiltinFont::HelveticaBold)
                    .map_err(pdf_error)?,
            ),
        };
        let layer = doc.get_page(page).get_layer(layer);

        Ok(Self {
            doc,
            layer,
            regular,
            bold,
            cursor: TOP_MARGIN,
            pages: 1,
            deepest: TOP_MARGIN,
        })
    }

    fn font(&self, face: Face) -> &IndirectFontRef {
        match face {
            Face::Regular => &self.regular,
            Face::Bold => &self.bold,
        }
    }

    fn advance(&mut self, height: f32) {
        self.cursor += height;
    }

    fn new_page(&mut self) {
        let (page, layer) = self
            .doc
            .add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.cursor = TOP_MARGIN;
        self.pages += 1;
    }

    /// Start a new page unless `height` still fits above the bottom margin.
    fn ensure_space(&mut self, height: f32) -> bool {
        if self.cursor + height > PAGE_HEIGHT - BOTTOM_MARGIN {
            self.new_page();
            true
        } else {
            false
        }
    }

    /// Draw one cell on the current row without moving the cursor.
    #[allow(clippy::too_many_arguments)]
    fn cell(
        &mut self,
        x: f32,
        width: f32,
        height: f32,
        text: &str,
        face: Face,
        size: f32,
        align: Align,
        fill: Option<(u8, u8, u8)>,
        color: (u8, u8, u8),
    ) {
        let top = self.cursor;
        self.deepest = self.deepest.max(top + height);

        if let Some(fill) = fill {
            self.layer.set_fill_color(rgb(fill));
            let rect = Rect::new(
                Mm(x),
                Mm(PAGE_HEIGHT - top - height),
                Mm(x + width),
                Mm(PAGE_HEIGHT - top),
            )
            .with_mode(PaintMode::Fill);
            self.layer.add_rect(rect);
        }

        let text = printable(text, face);
        if text.is_empty() {
            return;
        }
        let text_width = string_width(&text, face, size);
        let text_x = match align {
            Align::Left => x + CELL_PADDING,
            Align::Center => x + (width - text_width) / 2.0,
            Align::Right => x + width - CELL_PADDING - text_width,
        };
        let baseline = top + height / 2.0 + 0.3 * size * PT_TO_MM;

        self.layer.set_fill_color(rgb(color));
        self.layer.use_text(
            text,
            size,
            Mm(text_x),
            Mm(PAGE_HEIGHT - baseline),
            self.font(face),
        );
    }

    /// Full-width left-aligned line of text, then move down. Breaks the page
    /// first when the line would cross the bottom margin.
    fn line(&mut self, text: &str, face: Face, size: f32, height: f32) {
        self.ensure_space(height);
        self.cell(
            MARGIN,
            PAGE_WIDTH - 2.0 * MARGIN,
            height,
            text,
            face,
            size,
            Align::Left,
            None,
            BLACK,
        );
        self.advance(height);
    }

    fn rule(&self, x_from: f32, x_to: f32) {
        let y = Mm(PAGE_HEIGHT - self.cursor);
        self.layer.set_outline_color(rgb(BLACK));
        self.layer.set_outline_thickness(0.5);
        self.layer.add_line(Line {
            points: vec![
                (Point::new(Mm(x_from), y), false),
                (Point::new(Mm(x_to), y), false),
            ],
            is_closed: false,
        });
    }

    /// Serialize the document with a trailer `/ID` derived from `document_id`.
    ///
    /// The writer stamps a random instance id into the trailer, so the saved
    /// file is reloaded and both identifiers are replaced before the final write.
    fn finish(self, document_id: &str) -> Result<RenderedInvoice, RenderError> {
        let pages = self.pages;
        let raw = self.doc.save_to_bytes().map_err(pdf_error)?;

        let mut doc = lopdf::Document::load_mem(&raw).map_err(pdf_error)?;
        let id = Object::String(document_id.as_bytes().to_vec(), StringFormat::Literal);
        doc.trailer.set("ID", Object::Array(vec![id.clone(), id]));
        doc.compress();

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).map_err(pdf_error)?;
        Ok(RenderedInvoice {
            bytes,
            page_count: pages,
        })
    }
}

/// Render an assembled invoice to PDF bytes.
///
/// Every item's product and amounts are resolved before anything is drawn,
/// so a missing product or an out-of-range amount yields an error and never
/// a partial document.
pub fn render_invoice(view: &InvoiceView) -> Result<RenderedInvoice, RenderError> {
    let canvas = layout(view)?;
    canvas.finish(&document_id(view))
}

fn document_id(view: &InvoiceView) -> String {
    view.invoice.id.simple().to_string()
}

fn layout(view: &InvoiceView) -> Result<Canvas, RenderError> {
    let rows = resolve_rows(view)?;
    let invoice = &view.invoice;

    let stamp = OffsetDateTime::from_unix_timestamp(invoice.created_at.timestamp())
        .unwrap_or(OffsetDateTime::UNIX_EPOCH);
    let title = format!("Invoice #{}", invoice.invoice_number);
    let mut canvas = Canvas::new(&title, document_id(view), stamp)?;

    draw_header(&mut canvas, view, &title);
    draw_dates(&mut canvas, view);
    draw_customer(&mut canvas, view);
    draw_addresses(&mut canvas, view);
    draw_items(&mut canvas, &rows);
    draw_total(&mut canvas, view);
    draw_bank_details(&mut canvas, view);

    Ok(canvas)
}

fn resolve_rows(view: &InvoiceView) -> Result<Vec<Row<'_>>, RenderError> {
    view.items
        .iter()
        .map(|item| {
            let product = view
                .product(item.product_id)
                .ok_or(RenderError::MissingProduct {
                    item_id: item.id,
                    product_id: item.product_id,
                })?;
            let amounts = LineAmounts::compute(item.unit_price, item.quantity, product.tax_rate)
                .ok_or(RenderError::AmountOverflow { item_id: item.id })?;
            Ok(Row {
                item,
                product,
                amounts,
            })
        })
        .collect()
}

fn draw_header(canvas: &mut Canvas, view: &InvoiceView, title: &str) {
    let business = &view.business;

    canvas.cell(
        MARGIN,
        PAGE_WIDTH - 2.0 * MARGIN,
        10.0,
        title,
        Face::Bold,
        18.0,
        Align::Center,
        None,
        ACCENT,
    );
    canvas.advance(20.0);

    canvas.line(&business.name, Face::Bold, 16.0, 7.0);

    let width = PAGE_WIDTH - 2.0 * MARGIN - 2.0 * CELL_PADDING;
    let locality = [
        business.city.as_str(),
        business.state.as_str(),
        business.zip_code.as_str(),
        business.country.as_str(),
    ]
    .iter()
    .filter(|part| !part.trim().is_empty())
    .copied()
    .collect::<Vec<_>>()
    .join(", ");

    let mut lines = vec![format!("GSTIN: {}", business.gst_number)];
    lines.extend(wrap_text(&business.address, Face::Regular, BODY_SIZE, width));
    lines.push(locality);
    lines.push(format!("Phone: {}", business.company_phone));
    lines.push(format!("Email: {}", business.company_email));

    for line in lines {
        canvas.line(&line, Face::Regular, BODY_SIZE, 5.0);
    }
}

fn draw_dates(canvas: &mut Canvas, view: &InvoiceView) {
    let invoice = &view.invoice;
    canvas.advance(4.0);
    canvas.ensure_space(6.0);
    canvas.cell(
        MARGIN,
        95.0,
        6.0,
        &format!("Invoice Date: {}", invoice.invoice_date.format("%d/%m/%Y")),
        Face::Bold,
        BODY_SIZE,
        Align::Left,
        None,
        BLACK,
    );
    canvas.cell(
        MARGIN + 95.0,
        95.0,
        6.0,
        &format!("Due Date: {}", invoice.due_date.format("%d/%m/%Y")),
        Face::Bold,
        BODY_SIZE,
        Align::Left,
        None,
        BLACK,
    );
    canvas.advance(6.0 + 5.0);
}

fn draw_customer(canvas: &mut Canvas, view: &InvoiceView) {
    let customer = &view.customer;
    canvas.line("Customer Detail:", Face::Bold, BODY_SIZE, 6.0);
    canvas.line(&format!("Name: {}", customer.name), Face::Regular, BODY_SIZE, 5.0);
    canvas.line(
        &format!("GSTNo: {}", customer.gst_number),
        Face::Regular,
        BODY_SIZE,
        5.0,
    );
    canvas.advance(2.0);
}

/// Side-by-side billing and shipping columns, drawn row by row so either
/// column can run onto the next page.
fn draw_addresses(canvas: &mut Canvas, view: &InvoiceView) {
    let customer = &view.customer;
    let text_width = ADDRESS_COLUMN_WIDTH - 2.0 * CELL_PADDING;
    let billing = wrap_text(&customer.billing_address, Face::Regular, BODY_SIZE, text_width);
    let shipping = wrap_text(&customer.shipping_address, Face::Regular, BODY_SIZE, text_width);
    let shipping_x = MARGIN + ADDRESS_COLUMN_WIDTH + 5.0;

    // Keep the labels together with the first address row.
    canvas.ensure_space(6.0 + ADDRESS_LINE_HEIGHT);
    for (x, label) in [(MARGIN, "Billing Address:"), (shipping_x, "Shipping Address:")] {
        canvas.cell(
            x,
            ADDRESS_COLUMN_WIDTH,
            6.0,
            label,
            Face::Bold,
            BODY_SIZE,
            Align::Left,
            None,
            BLACK,
        );
    }
    canvas.advance(6.0);

    let rows = billing.len().max(shipping.len()).max(1);
    for index in 0..rows {
        canvas.ensure_space(ADDRESS_LINE_HEIGHT);
        for (x, lines) in [(MARGIN, &billing), (shipping_x, &shipping)] {
            if let Some(line) = lines.get(index) {
                canvas.cell(
                    x,
                    ADDRESS_COLUMN_WIDTH,
                    ADDRESS_LINE_HEIGHT,
                    line,
                    Face::Regular,
                    BODY_SIZE,
                    Align::Left,
                    None,
                    BLACK,
                );
            }
        }
        canvas.advance(ADDRESS_LINE_HEIGHT);
    }
    canvas.advance(4.0);
}

fn draw_table_header(canvas: &mut Canvas) {
    let mut x = MARGIN;
    for (heading, width) in COLUMNS {
        canvas.cell(
            x,
            width,
            ROW_HEIGHT,
            heading,
            Face::Bold,
            BODY_SIZE,
            Align::Center,
            Some(ACCENT),
            WHITE,
        );
        x += width;
    }
    canvas.advance(ROW_HEIGHT);
}

fn draw_items(canvas: &mut Canvas, rows: &[Row<'_>]) {
    canvas.ensure_space(2.0 * ROW_HEIGHT);
    draw_table_header(canvas);

    let name_width = COLUMNS[1].1 - 2.0 * CELL_PADDING;
    for (index, row) in rows.iter().enumerate() {
        if canvas.ensure_space(ROW_HEIGHT) {
            draw_table_header(canvas);
        }

        let name = printable(&row.product.name, Face::Regular);
        let cells = [
            ((index + 1).to_string(), Align::Center),
            (fit(&name, Face::Regular, BODY_SIZE, name_width), Align::Left),
            (format_money(row.item.unit_price), Align::Right),
            (row.item.quantity.to_string(), Align::Right),
            (format_money(row.amounts.taxable_value), Align::Right),
            (format_money(row.amounts.tax_amount), Align::Right),
            (format_money(row.amounts.line_total), Align::Right),
        ];

        let mut x = MARGIN;
        for ((text, align), (_, width)) in cells.iter().zip(COLUMNS) {
            canvas.cell(
                x,
                width,
                ROW_HEIGHT,
                text,
                Face::Regular,
                BODY_SIZE,
                *align,
                Some(ROW_FILL),
                BLACK,
            );
            x += width;
        }
        canvas.advance(ROW_HEIGHT);
    }

    let table_width: f32 = COLUMNS.iter().map(|(_, width)| width).sum();
    canvas.rule(MARGIN, MARGIN + table_width);
    canvas.advance(1.0);
}

fn draw_total(canvas: &mut Canvas, view: &InvoiceView) {
    canvas.advance(2.0);
    canvas.ensure_space(ROW_HEIGHT);
    canvas.cell(
        MARGIN,
        160.0,
        ROW_HEIGHT,
        "Total Amount",
        Face::Bold,
        BODY_SIZE,
        Align::Right,
        None,
        BLACK,
    );
    canvas.cell(
        MARGIN + 160.0,
        40.0,
        ROW_HEIGHT,
        &format_money(view.invoice.total_amount),
        Face::Bold,
        BODY_SIZE,
        Align::Right,
        None,
        BLACK,
    );
    canvas.advance(ROW_HEIGHT);
}

fn draw_bank_details(canvas: &mut Canvas, view: &InvoiceView) {
    let business = &view.business;
    canvas.advance(10.0);
    canvas.ensure_space(6.0 + 4.0 * 5.0);

    canvas.line("Bank Details:", Face::Bold, BODY_SIZE, 6.0);
    for line in [
        format!("Bank: {}", business.bank_name),
        format!("Account No: {}", business.account_number),
        format!("IFSC Code: {}", business.ifsc),
        format!("Branch: {}", business.bank_branch),
    ] {
        canvas.line(&line, Face::Regular, BODY_SIZE, 5.0);
    }
}
