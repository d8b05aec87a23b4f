//! Ticket rendering.
//!
//! Rendering is two steps. [`TicketLayout::build`] places every element of the page
//! (text, rules, the optional header image and the QR code) in PDF points from the
//! bottom-left corner. [`PdfTicketRenderer`] then draws that layout onto a single A4
//! page with `printpdf`, using the builtin Helvetica fonts.

use chrono::{DateTime, Utc};
use printpdf::{
    BuiltinFont, Color, Greyscale, Image, ImageTransform, ImageXObject, IndirectFontRef, Line,
    LineDashPattern, Mm, PdfDocument, PdfLayerReference, Point, Pt, Px, Rect,
};
use qrcode::QrCode;

/// Fields printed on a ticket.
#[derive(Debug, Clone)]
pub struct TicketData {
    /// Event name.
    pub event_name: String,
    /// Venue.
    pub event_location: String,
    /// Event start time.
    pub event_date: DateTime<Utc>,
    /// Encoded event image (PNG or JPEG), if one could be fetched.
    pub event_image: Option<Vec<u8>>,
    /// Booking code of the order.
    pub booking_id: String,
    /// Ticket number, also encoded in the QR code.
    pub ticket_number: String,
}

/// Rendering errors.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The ticket number could not be encoded as a QR code.
    #[error("QR encoding failed: {0}")]
    QrCode(String),

    /// The PDF document could not be assembled.
    #[error("PDF generation failed: {0}")]
    Pdf(String),

    /// The rendering task did not complete.
    #[error("render task aborted: {0}")]
    Aborted(String),
}

impl From<printpdf::Error> for RenderError {
    fn from(err: printpdf::Error) -> Self {
        Self::Pdf(err.to_string())
    }
}

/// Produces ticket artifacts from ticket data.
pub trait TicketRenderer: Send + Sync {
    /// Render one ticket.
    ///
    /// # Errors
    ///
    /// Returns `RenderError` if the artifact cannot be produced.
    fn render(&self, data: &TicketData) -> Result<Vec<u8>, RenderError>;
}

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 28.0;
const HEADER_MAX_HEIGHT: f32 = 140.0;
const QR_SIZE: f32 = 120.0;

/// Header images are downscaled to at most this many pixels per side.
const IMAGE_MAX_PIXELS: u32 = 800;

const DARK_GRAY: f32 = 50.0 / 255.0;
const LIGHT_GRAY: f32 = 150.0 / 255.0;

const ATTENDEE_NOTES: [&str; 3] = [
    "- Show this e-ticket to the staff at the venue.",
    "- Bring a valid identity document.",
    "- Sharp weapons and illegal drugs are not allowed.",
];

/// Decoded RGB header image.
#[derive(Debug, Clone)]
pub struct HeaderImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    rgb: Vec<u8>,
}

impl HeaderImage {
    fn decode(bytes: &[u8]) -> Result<Self, image::ImageError> {
        let mut decoded = image::load_from_memory(bytes)?;
        if decoded.width() > IMAGE_MAX_PIXELS || decoded.height() > IMAGE_MAX_PIXELS {
            decoded = decoded.thumbnail(IMAGE_MAX_PIXELS, IMAGE_MAX_PIXELS);
        }
        let rgb = decoded.to_rgb8();
        Ok(Self {
            width: rgb.width(),
            height: rgb.height(),
            rgb: rgb.into_raw(),
        })
    }
}

/// One drawing operation; coordinates are PDF points from the bottom-left corner.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    /// A line of text with its baseline at `y`.
    Text {
        /// Printed text, restricted to Latin-1.
        text: String,
        /// Bold face.
        bold: bool,
        /// Font size in points.
        size: f32,
        /// Fill gray level, 0 is black.
        gray: f32,
        /// Left edge.
        x: f32,
        /// Baseline.
        y: f32,
    },
    /// A dashed horizontal rule across the content width.
    Rule {
        /// Height of the rule.
        y: f32,
    },
    /// The header image scaled into a box.
    Image {
        /// Left edge.
        x: f32,
        /// Bottom edge.
        y: f32,
        /// Drawn width.
        width: f32,
        /// Drawn height.
        height: f32,
    },
    /// A filled black square; one per dark QR module.
    Module {
        /// Left edge.
        x: f32,
        /// Bottom edge.
        y: f32,
        /// Side length.
        size: f32,
    },
}

/// A positioned ticket page.
#[derive(Debug, Clone)]
pub struct TicketLayout {
    /// Drawing operations in paint order.
    pub elements: Vec<Element>,
    /// Header image referenced by the [`Element::Image`] element, if any.
    pub image: Option<HeaderImage>,
}

impl TicketLayout {
    /// Lay out one ticket. An event image that cannot be decoded is left out.
    ///
    /// # Errors
    ///
    /// Returns `RenderError::QrCode` if the ticket number cannot be encoded.
    pub fn build(data: &TicketData) -> Result<Self, RenderError> {
        let qr = QrCode::new(data.ticket_number.as_bytes())
            .map_err(|e| RenderError::QrCode(e.to_string()))?;

        let image = data.event_image.as_deref().and_then(|bytes| {
            HeaderImage::decode(bytes)
                .map_err(|e| {
                    tracing::warn!(ticket_number = %data.ticket_number, error = %e, "Skipping undecodable event image");
                })
                .ok()
        });

        let mut layout = Self {
            elements: Vec::new(),
            image,
        };
        layout.place(data, &qr);
        Ok(layout)
    }

    /// Every text element, in paint order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.elements.iter().filter_map(|element| match element {
            Element::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    fn text(&mut self, bold: bool, size: f32, gray: f32, x: f32, y: f32, text: &str) {
        self.elements.push(Element::Text {
            text: latin1(text),
            bold,
            size,
            gray,
            x,
            y,
        });
    }

    fn qr(&mut self, code: &QrCode, x: f32, y: f32, size: f32) {
        let modules = code.width();
        #[allow(clippy::cast_precision_loss)]
        let module = size / modules as f32;

        for (index, color) in code.to_colors().iter().enumerate() {
            if *color != qrcode::Color::Dark {
                continue;
            }
            #[allow(clippy::cast_precision_loss)]
            let (col, row) = ((index % modules) as f32, (index / modules) as f32);
            self.elements.push(Element::Module {
                x: x + col * module,
                y: y + size - (row + 1.0) * module,
                size: module,
            });
        }
    }

    fn place(&mut self, data: &TicketData, qr: &QrCode) {
        let column = PAGE_WIDTH / 2.0;
        let mut y = PAGE_HEIGHT - MARGIN;

        if let Some(image) = &self.image {
            #[allow(clippy::cast_precision_loss)]
            let (w, h) = (image.width as f32, image.height as f32);
            let scale = ((PAGE_WIDTH - 2.0 * MARGIN) / w).min(HEADER_MAX_HEIGHT / h);
            let (width, height) = (w * scale, h * scale);
            y -= height;
            self.elements.push(Element::Image {
                x: (PAGE_WIDTH - width) / 2.0,
                y,
                width,
                height,
            });
            y -= 15.0;
        }

        y -= 20.0;
        self.text(true, 18.0, DARK_GRAY, MARGIN, y, &data.event_name);

        y -= 22.0;
        self.text(false, 8.0, LIGHT_GRAY, MARGIN, y, "Location");
        y -= 14.0;
        self.text(false, 11.0, DARK_GRAY, MARGIN, y, &data.event_location);

        y -= 16.0;
        self.elements.push(Element::Rule { y });

        y -= 24.0;
        self.text(false, 8.0, LIGHT_GRAY, MARGIN, y, "Booking Code");
        self.text(false, 8.0, LIGHT_GRAY, column, y, "Ticket Number");
        y -= 15.0;
        self.text(true, 11.0, DARK_GRAY, MARGIN, y, &data.booking_id);
        self.text(true, 11.0, DARK_GRAY, column, y, &data.ticket_number);

        y -= 26.0;
        self.text(false, 8.0, LIGHT_GRAY, MARGIN, y, "Event Date");
        self.text(false, 8.0, LIGHT_GRAY, column, y, "Time");
        y -= 15.0;
        let date = data.event_date.format("%d %b %Y").to_string();
        let time = data.event_date.format("%H:%M UTC").to_string();
        self.text(true, 11.0, DARK_GRAY, MARGIN, y, &date);
        self.text(true, 11.0, DARK_GRAY, column, y, &time);

        y -= 18.0;
        self.elements.push(Element::Rule { y });

        y -= 24.0;
        let qr_x = PAGE_WIDTH - MARGIN - QR_SIZE;
        self.qr(qr, qr_x, y - QR_SIZE + 10.0, QR_SIZE);
        self.text(false, 7.0, DARK_GRAY, qr_x + QR_SIZE / 2.0 - 18.0, y - QR_SIZE, "Scan Code");

        self.text(true, 10.0, DARK_GRAY, MARGIN, y, "Ticket Information");
        for note in ATTENDEE_NOTES {
            y -= 14.0;
            self.text(false, 8.0, DARK_GRAY, MARGIN, y, note);
        }
    }
}

/// The builtin fonts cover Latin-1 only; anything else prints as `?`.
fn latin1(text: &str) -> String {
    text.chars()
        .map(|ch| match ch {
            ' '..='~' | '\u{a0}'..='\u{ff}' => ch,
            _ => '?',
        })
        .collect()
}

fn mm(points: f32) -> Mm {
    Mm::from(Pt(points))
}

fn gray(level: f32) -> Color {
    Color::Greyscale(Greyscale::new(level, None))
}

/// Single-page A4 PDF renderer.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTicketRenderer;

impl PdfTicketRenderer {
    /// Create a renderer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Draw a finished layout into a PDF document.
    ///
    /// # Errors
    ///
    /// Returns `RenderError::Pdf` if the document cannot be serialized.
    pub fn draw(layout: &TicketLayout, title: &str) -> Result<Vec<u8>, RenderError> {
        let (doc, page, layer) =
            PdfDocument::new(title, mm(PAGE_WIDTH), mm(PAGE_HEIGHT), "Ticket");
        let regular = doc.add_builtin_font(BuiltinFont::Helvetica)?;
        let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold)?;
        let canvas = doc.get_page(page).get_layer(layer);

        for element in &layout.elements {
            match element {
                Element::Text {
                    text,
                    bold: is_bold,
                    size,
                    gray: level,
                    x,
                    y,
                } => {
                    let font: &IndirectFontRef = if *is_bold { &bold } else { &regular };
                    canvas.set_fill_color(gray(*level));
                    canvas.use_text(text.as_str(), *size, mm(*x), mm(*y), font);
                }
                Element::Rule { y } => draw_rule(&canvas, *y),
                Element::Image {
                    x,
                    y,
                    width,
                    height,
                } => {
                    if let Some(image) = &layout.image {
                        draw_image(&canvas, image, *x, *y, *width, *height);
                    }
                }
                Element::Module { x, y, size } => {
                    canvas.set_fill_color(gray(0.0));
                    canvas.add_rect(Rect::new(mm(*x), mm(*y), mm(x + size), mm(y + size)));
                }
            }
        }

        Ok(doc.save_to_bytes()?)
    }
}

fn draw_rule(canvas: &PdfLayerReference, y: f32) {
    canvas.set_outline_color(gray(LIGHT_GRAY));
    canvas.set_outline_thickness(1.0);
    canvas.set_line_dash_pattern(LineDashPattern {
        dash_1: Some(3),
        gap_1: Some(3),
        ..LineDashPattern::default()
    });
    canvas.add_line(Line {
        points: vec![
            (Point::new(mm(MARGIN), mm(y)), false),
            (Point::new(mm(PAGE_WIDTH - MARGIN), mm(y)), false),
        ],
        is_closed: false,
    });
    canvas.set_line_dash_pattern(LineDashPattern::default());
}

fn draw_image(canvas: &PdfLayerReference, image: &HeaderImage, x: f32, y: f32, width: f32, height: f32) {
    let xobject = ImageXObject {
        width: Px(image.width as usize),
        height: Px(image.height as usize),
        color_space: printpdf::ColorSpace::Rgb,
        bits_per_component: printpdf::ColorBits::Bit8,
        interpolate: true,
        image_data: image.rgb.clone(),
        image_filter: None,
        smask: None,
        clipping_bbox: None,
    };

    // At 72 dpi one pixel is one point
    #[allow(clippy::cast_precision_loss)]
    let transform = ImageTransform {
        translate_x: Some(mm(x)),
        translate_y: Some(mm(y)),
        scale_x: Some(width / image.width as f32),
        scale_y: Some(height / image.height as f32),
        dpi: Some(72.0),
        ..ImageTransform::default()
    };
    Image::from(xobject).add_to_layer(canvas.clone(), transform);
}

impl TicketRenderer for PdfTicketRenderer {
    fn render(&self, data: &TicketData) -> Result<Vec<u8>, RenderError> {
        let layout = TicketLayout::build(data)?;
        Self::draw(&layout, &format!("Ticket {}", data.ticket_number))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use chrono::TimeZone;
    use image::{ImageFormat, Rgb, RgbImage};

    use super::*;

    fn data(image: Option<Vec<u8>>) -> TicketData {
        TicketData {
            event_name: "Jazz (Live) Night".into(),
            event_location: "Blue Note, Jakarta".into(),
            event_date: Utc.with_ymd_and_hms(2026, 3, 14, 19, 30, 0).unwrap(),
            event_image: image,
            booking_id: "WT-3F2A9C1B-K7M2QX".into(),
            ticket_number: "TIK-WT-3F2A9C1B-K7M2QX-8HD3PA".into(),
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 30, 30]));
        let mut bytes = Cursor::new(Vec::new());
        img.write_to(&mut bytes, ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    fn image_elements(layout: &TicketLayout) -> usize {
        layout
            .elements
            .iter()
            .filter(|e| matches!(e, Element::Image { .. }))
            .count()
    }

    #[test]
    fn lays_out_ticket_fields() {
        let layout = TicketLayout::build(&data(None)).unwrap();
        let texts: Vec<&str> = layout.texts().collect();

        for expected in [
            "Jazz (Live) Night",
            "Blue Note, Jakarta",
            "WT-3F2A9C1B-K7M2QX",
            "TIK-WT-3F2A9C1B-K7M2QX-8HD3PA",
            "14 Mar 2026",
            "19:30 UTC",
            "Scan Code",
        ] {
            assert!(texts.contains(&expected), "missing {expected}");
        }
        assert!(layout.image.is_none());
        assert_eq!(image_elements(&layout), 0);
    }

    #[test]
    fn everything_stays_on_the_page() {
        let layout = TicketLayout::build(&data(Some(png(400, 400)))).unwrap();

        for element in &layout.elements {
            let (x, y) = match element {
                Element::Text { x, y, .. }
                | Element::Image { x, y, .. }
                | Element::Module { x, y, .. } => (*x, *y),
                Element::Rule { y } => (MARGIN, *y),
            };
            assert!((0.0..PAGE_WIDTH).contains(&x), "{element:?}");
            assert!((0.0..PAGE_HEIGHT).contains(&y), "{element:?}");
        }
    }

    #[test]
    fn embeds_event_image_within_the_header() {
        let layout = TicketLayout::build(&data(Some(png(8, 4)))).unwrap();

        let image = layout.image.as_ref().unwrap();
        assert_eq!((image.width, image.height), (8, 4));
        assert_eq!(image.rgb.len(), 8 * 4 * 3);
        assert_eq!(image_elements(&layout), 1);

        let Some(Element::Image { width, height, .. }) = layout.elements.first() else {
            panic!("header image is not painted first");
        };
        assert!(*height <= HEADER_MAX_HEIGHT);
        assert!(*width <= PAGE_WIDTH - 2.0 * MARGIN);
        assert!((width / height - 2.0).abs() < 1e-3);
    }

    #[test]
    fn large_images_are_downscaled() {
        let layout = TicketLayout::build(&data(Some(png(1600, 400)))).unwrap();
        let image = layout.image.unwrap();
        assert_eq!((image.width, image.height), (800, 200));
    }

    #[test]
    fn undecodable_image_is_skipped() {
        let layout = TicketLayout::build(&data(Some(b"not an image".to_vec()))).unwrap();

        assert!(layout.image.is_none());
        assert_eq!(image_elements(&layout), 0);
        assert!(layout.texts().any(|t| t == "TIK-WT-3F2A9C1B-K7M2QX-8HD3PA"));
    }

    #[test]
    fn qr_code_has_one_square_per_dark_module() {
        let layout = TicketLayout::build(&data(None)).unwrap();
        let dark = QrCode::new(b"TIK-WT-3F2A9C1B-K7M2QX-8HD3PA")
            .unwrap()
            .to_colors()
            .into_iter()
            .filter(|c| *c == qrcode::Color::Dark)
            .count();

        let squares = layout
            .elements
            .iter()
            .filter(|e| matches!(e, Element::Module { .. }))
            .count();
        assert_eq!(squares, dark);
    }

    #[test]
    fn non_latin_text_is_replaced() {
        let mut ticket = data(None);
        ticket.event_name = "Caf\u{e9} \u{1f3ab} \u{7968}".into();

        let layout = TicketLayout::build(&ticket).unwrap();
        assert!(layout.texts().any(|t| t == "Caf\u{e9} ? ?"));
    }

    #[test]
    fn renders_a_pdf_document() {
        let renderer = PdfTicketRenderer::new();
        let plain = renderer.render(&data(None)).unwrap();
        let illustrated = renderer.render(&data(Some(png(64, 32)))).unwrap();

        assert!(plain.starts_with(b"%PDF-"));
        assert!(illustrated.starts_with(b"%PDF-"));
        assert!(illustrated.len() > plain.len());
    }
}
