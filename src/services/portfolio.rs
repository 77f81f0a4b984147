// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! PDF portfolio export.
//!
//! Export is split into a pure layout pass (positions in millimetres from the
//! top-left of an A4 page) and a rendering pass that writes PDF objects with
//! `lopdf`. The layout is what the tests inspect.

use std::sync::Arc;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use crate::db::{ActivityFilter, DocumentStore};
use crate::error::{AppError, Result};
use crate::middleware::Session;
use crate::models::{Activity, ActivityStatus, Capability, User};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 20.0;
/// An entry starts on a new page once the cursor passes this line.
const PAGE_BREAK_Y: f32 = PAGE_HEIGHT - 60.0;
const WRAP_LINE_HEIGHT: f32 = 5.0;
const MM_TO_PT: f32 = 72.0 / 25.4;
/// Average Helvetica glyph width as a fraction of the font size.
const AVG_GLYPH_EM: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
    Italic,
}

impl Font {
    fn resource_name(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
            Font::Italic => "F3",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextItem {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub font: Font,
    pub text: String,
}

/// Horizontal rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub x1: f32,
    pub x2: f32,
    pub y: f32,
    pub width: f32,
    /// 0.0 = black, 1.0 = white
    pub gray: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    pub texts: Vec<TextItem>,
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioLayout {
    pub pages: Vec<PageLayout>,
}

fn text_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * AVG_GLYPH_EM / MM_TO_PT
}

/// Greedy word wrap to `max_width` millimetres.
fn wrap(text: &str, size: f32, max_width: f32) -> Vec<String> {
    let max_chars = ((max_width * MM_TO_PT) / (size * AVG_GLYPH_EM)).floor().max(1.0) as usize;
    let mut lines = Vec::new();

    for paragraph in text.lines() {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            let mut word = word.to_string();
            // Hard-break words longer than a full line.
            while word.chars().count() > max_chars {
                if !line.is_empty() {
                    lines.push(std::mem::take(&mut line));
                }
                let head: String = word.chars().take(max_chars).collect();
                word = word.chars().skip(max_chars).collect();
                lines.push(head);
            }
            let needed = line.chars().count() + usize::from(!line.is_empty()) + word.chars().count();
            if needed > max_chars && !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(&word);
        }
        lines.push(line);
    }

    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

struct Cursor {
    pages: Vec<PageLayout>,
    y: f32,
}

impl Cursor {
    fn page(&mut self) -> &mut PageLayout {
        if self.pages.is_empty() {
            self.pages.push(PageLayout::default());
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn text(&mut self, x: f32, size: f32, font: Font, text: impl Into<String>) {
        let y = self.y;
        self.page().texts.push(TextItem {
            x,
            y,
            size,
            font,
            text: text.into(),
        });
    }

    fn centered(&mut self, size: f32, font: Font, text: &str) {
        let x = ((PAGE_WIDTH - text_width(text, size)) / 2.0).max(MARGIN);
        self.text(x, size, font, text);
    }

    fn rule(&mut self, x1: f32, x2: f32, width: f32, gray: f32) {
        let y = self.y;
        self.page().rules.push(Rule {
            x1,
            x2,
            y,
            width,
            gray,
        });
    }

    fn lines(&mut self, x: f32, size: f32, font: Font, lines: &[String]) {
        for (i, line) in lines.iter().enumerate() {
            let y = self.y + i as f32 * WRAP_LINE_HEIGHT;
            self.page().texts.push(TextItem {
                x,
                y,
                size,
                font,
                text: line.clone(),
            });
        }
    }

    fn new_page(&mut self) {
        self.pages.push(PageLayout::default());
        self.y = MARGIN;
    }
}

/// Lay out the portfolio: heading block, one numbered entry per activity,
/// and a footer on every page.
pub fn layout(user: &User, activities: &[Activity], generated_on: NaiveDate) -> PortfolioLayout {
    let mut cursor = Cursor {
        pages: vec![PageLayout::default()],
        y: MARGIN,
    };
    let body_width = PAGE_WIDTH - 2.0 * MARGIN - 20.0;

    cursor.centered(24.0, Font::Bold, "Student Portfolio");
    cursor.y += 20.0;
    cursor.centered(16.0, Font::Regular, &user.name);
    cursor.y += 10.0;
    cursor.centered(12.0, Font::Regular, &user.email);
    cursor.y += 20.0;
    cursor.rule(MARGIN, PAGE_WIDTH - MARGIN, 0.5, 0.0);
    cursor.y += 20.0;
    cursor.text(MARGIN, 18.0, Font::Bold, "Approved Activities");
    cursor.y += 20.0;

    for (index, activity) in activities.iter().enumerate() {
        if cursor.y > PAGE_BREAK_Y {
            cursor.new_page();
        }

        cursor.text(
            MARGIN,
            14.0,
            Font::Bold,
            format!("{}. {}", index + 1, activity.title),
        );
        cursor.y += 10.0;

        cursor.text(
            MARGIN + 10.0,
            10.0,
            Font::Regular,
            format!("Category: {}", activity.category),
        );
        cursor.text(
            PAGE_WIDTH - MARGIN - 50.0,
            10.0,
            Font::Regular,
            format!("Date: {}", activity.created_at.format("%d/%m/%Y")),
        );
        cursor.y += 10.0;

        let description = wrap(&activity.description, 10.0, body_width);
        cursor.lines(MARGIN + 10.0, 10.0, Font::Regular, &description);
        cursor.y += description.len() as f32 * WRAP_LINE_HEIGHT + 10.0;

        if let Some(remarks) = activity.remarks.as_deref().filter(|r| !r.is_empty()) {
            cursor.text(MARGIN + 10.0, 10.0, Font::Italic, "Faculty Remarks:");
            cursor.y += WRAP_LINE_HEIGHT;
            let remarks = wrap(remarks, 10.0, body_width);
            cursor.lines(MARGIN + 10.0, 10.0, Font::Italic, &remarks);
            cursor.y += remarks.len() as f32 * WRAP_LINE_HEIGHT;
        }

        cursor.y += 10.0;

        if index + 1 < activities.len() {
            cursor.rule(MARGIN + 10.0, PAGE_WIDTH - MARGIN - 10.0, 0.1, 200.0 / 255.0);
            cursor.y += 10.0;
        }
    }

    let total = cursor.pages.len();
    for (i, page) in cursor.pages.iter_mut().enumerate() {
        let footer = format!(
            "Generated on {} - Page {} of {}",
            generated_on.format("%d/%m/%Y"),
            i + 1,
            total
        );
        page.texts.push(TextItem {
            x: ((PAGE_WIDTH - text_width(&footer, 8.0)) / 2.0).max(MARGIN),
            y: PAGE_HEIGHT - 10.0,
            size: 8.0,
            font: Font::Regular,
            text: footer,
        });
    }

    PortfolioLayout {
        pages: cursor.pages,
    }
}

/// Latin-1 bytes for the standard Type1 fonts; anything else becomes `?`.
// TODO: embed a Unicode TrueType font (Type0/CIDFontType2) so names in Indic
// scripts render.
/// Encode text for the standard Type 1 fonts under `WinAnsiEncoding`.
///
/// Latin-1 maps through unchanged above 0x9F. The C1 range is replaced by
/// the Windows-1252 punctuation that lives there. Anything else, including
/// Indic scripts, has no glyph in the base fonts and prints as `?`.
fn pdf_text(text: &str) -> Vec<u8> {
    text.chars().map(win_ansi_byte).collect()
}

fn win_ansi_byte(c: char) -> u8 {
    match c {
        '\u{20}'..='\u{7e}' | '\u{a0}'..='\u{ff}' => c as u8,
        '\u{20ac}' => 0x80,
        '\u{201a}' => 0x82,
        '\u{0192}' => 0x83,
        '\u{201e}' => 0x84,
        '\u{2026}' => 0x85,
        '\u{2020}' => 0x86,
        '\u{2021}' => 0x87,
        '\u{02c6}' => 0x88,
        '\u{2030}' => 0x89,
        '\u{0160}' => 0x8a,
        '\u{2039}' => 0x8b,
        '\u{0152}' => 0x8c,
        '\u{017d}' => 0x8e,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201c}' => 0x93,
        '\u{201d}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{02dc}' => 0x98,
        '\u{2122}' => 0x99,
        '\u{0161}' => 0x9a,
        '\u{203a}' => 0x9b,
        '\u{0153}' => 0x9c,
        '\u{017e}' => 0x9e,
        '\u{0178}' => 0x9f,
        '\t' | '\n' | '\r' => b' ',
        _ => b'?',
    }
}

fn page_operations(page: &PageLayout) -> Vec<Operation> {
    let mut ops = Vec::new();

    for rule in &page.rules {
        let y = (PAGE_HEIGHT - rule.y) * MM_TO_PT;
        ops.push(Operation::new("G", vec![rule.gray.into()]));
        ops.push(Operation::new("w", vec![(rule.width * MM_TO_PT).into()]));
        ops.push(Operation::new("m", vec![(rule.x1 * MM_TO_PT).into(), y.into()]));
        ops.push(Operation::new("l", vec![(rule.x2 * MM_TO_PT).into(), y.into()]));
        ops.push(Operation::new("S", vec![]));
    }

    for item in &page.texts {
        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new(
            "Tf",
            vec![item.font.resource_name().into(), item.size.into()],
        ));
        ops.push(Operation::new(
            "Td",
            vec![
                (item.x * MM_TO_PT).into(),
                ((PAGE_HEIGHT - item.y) * MM_TO_PT).into(),
            ],
        ));
        ops.push(Operation::new(
            "Tj",
            vec![Object::string_literal(pdf_text(&item.text))],
        ));
        ops.push(Operation::new("ET", vec![]));
    }

    ops
}

/// Render a layout to PDF bytes.
pub fn render(layout: &PortfolioLayout) -> anyhow::Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font = |base: &str| {
        dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => base.to_string(),
            "Encoding" => "WinAnsiEncoding",
        }
    };
    let regular_id = doc.add_object(font("Helvetica"));
    let bold_id = doc.add_object(font("Helvetica-Bold"));
    let italic_id = doc.add_object(font("Helvetica-Oblique"));
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular_id,
            "F2" => bold_id,
            "F3" => italic_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(layout.pages.len());
    for page in &layout.pages {
        let content = Content {
            operations: page_operations(page),
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().context("failed encoding page content")?,
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "Resources" => resources_id,
            "MediaBox" => vec![
                0.into(),
                0.into(),
                (PAGE_WIDTH * MM_TO_PT).into(),
                (PAGE_HEIGHT * MM_TO_PT).into(),
            ],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .context("failed writing portfolio PDF")?;
    Ok(bytes)
}

/// `Jane Q Doe` → `Jane_Q_Doe_Portfolio.pdf`
pub fn file_name(user_name: &str) -> String {
    let stem = user_name.split_whitespace().collect::<Vec<_>>().join("_");
    format!("{stem}_Portfolio.pdf")
}

/// Rendered portfolio ready for download.
#[derive(Debug, Clone)]
pub struct Portfolio {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct PortfolioService {
    db: Arc<dyn DocumentStore>,
}

impl PortfolioService {
    pub fn new(db: Arc<dyn DocumentStore>) -> Self {
        Self { db }
    }

    /// Export the caller's approved activities.
    pub async fn export(&self, session: &Session) -> Result<Portfolio> {
        session.require(Capability::ExportPortfolio)?;

        let user = self
            .db
            .get_user(&session.uid)
            .await?
            .ok_or(AppError::InvalidToken)?;

        let approved = self
            .db
            .list_activities(&ActivityFilter {
                student_id: Some(session.uid.clone()),
                status: Some(ActivityStatus::Approved),
            })
            .await?;
        if approved.is_empty() {
            return Err(AppError::Validation(
                "No approved activities to export".to_string(),
            ));
        }

        let layout = layout(&user, &approved, Utc::now().date_naive());
        let bytes = render(&layout)?;

        tracing::info!(
            uid = %session.uid,
            activities = approved.len(),
            pages = layout.pages.len(),
            "Portfolio exported"
        );

        Ok(Portfolio {
            file_name: file_name(&user.name),
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, VerifiedIdentity};

    fn user() -> User {
        User::from_identity(
            &VerifiedIdentity {
                subject: "s1".to_string(),
                display_name: "Ada  Lovelace".to_string(),
                email: "ada@uni.edu".to_string(),
                photo_url: None,
            },
            Role::Student,
            "Unknown User",
        )
    }

    fn approved(n: usize, remarks: Option<&str>) -> Activity {
        Activity {
            id: format!("a{n}"),
            student_id: "s1".to_string(),
            student_name: "Ada Lovelace".to_string(),
            student_department: Some("CSE".to_string()),
            title: format!("Activity {n}"),
            description: "Built an analytical engine prototype. ".repeat(6),
            category: "Technical".to_string(),
            start_date: None,
            end_date: None,
            internship: None,
            file_id: None,
            file_url: None,
            file_name: "f.pdf".to_string(),
            file_type: "application/pdf".to_string(),
            file_size: None,
            status: ActivityStatus::Approved,
            remarks: remarks.map(String::from),
            reviewed_at: None,
            reviewed_by: None,
            created_at: "2025-02-01T10:00:00Z".parse().unwrap(),
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    fn all_text(layout: &PortfolioLayout) -> Vec<&str> {
        layout
            .pages
            .iter()
            .flat_map(|p| p.texts.iter().map(|t| t.text.as_str()))
            .collect()
    }

    #[test]
    fn test_file_name_collapses_whitespace() {
        assert_eq!(file_name("Ada  Lovelace"), "Ada_Lovelace_Portfolio.pdf");
        assert_eq!(file_name("Ada"), "Ada_Portfolio.pdf");
    }

    #[test]
    fn test_single_page_layout() {
        let layout = layout(&user(), &[approved(1, Some("Great work"))], date());
        assert_eq!(layout.pages.len(), 1);

        let texts = all_text(&layout);
        assert!(texts.contains(&"Student Portfolio"));
        assert!(texts.contains(&"1. Activity 1"));
        assert!(texts.contains(&"Faculty Remarks:"));
        assert!(texts.contains(&"Great work"));
        assert!(texts.contains(&"Generated on 01/03/2025 - Page 1 of 1"));
    }

    #[test]
    fn test_remarks_block_omitted_without_remarks() {
        let layout = layout(&user(), &[approved(1, None)], date());
        assert!(!all_text(&layout).contains(&"Faculty Remarks:"));
    }

    #[test]
    fn test_paginates_and_numbers_every_page() {
        let activities: Vec<Activity> = (1..=12).map(|n| approved(n, Some("ok"))).collect();
        let layout = layout(&user(), &activities, date());
        let total = layout.pages.len();
        assert!(total > 1);

        for (i, page) in layout.pages.iter().enumerate() {
            let footer = page.texts.last().unwrap();
            assert_eq!(
                footer.text,
                format!("Generated on 01/03/2025 - Page {} of {}", i + 1, total)
            );
            for item in &page.texts {
                if item.font == Font::Bold && item.size == 14.0 {
                    assert!(item.y <= PAGE_BREAK_Y);
                }
            }
        }
        assert!(all_text(&layout).contains(&"12. Activity 12"));
    }

    #[test]
    fn test_wrap_respects_width() {
        let lines = wrap(&"word ".repeat(100), 10.0, 150.0);
        assert!(lines.len() > 1);
        let max_chars = ((150.0 * MM_TO_PT) / (10.0 * AVG_GLYPH_EM)).floor() as usize;
        assert!(lines.iter().all(|l| l.chars().count() <= max_chars));

        let long = wrap(&"x".repeat(300), 10.0, 150.0);
        assert!(long.iter().all(|l| l.chars().count() <= max_chars));
    }

    #[test]
    fn test_render_produces_loadable_pdf() {
        let activities: Vec<Activity> = (1..=12).map(|n| approved(n, Some("ok"))).collect();
        let layout = layout(&user(), &activities, date());
        let bytes = render(&layout).unwrap();

        assert!(bytes.starts_with(b"%PDF-1.5"));
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), layout.pages.len());
    }

    #[test]
    fn test_pdf_text_replaces_non_latin1() {
        assert_eq!(pdf_text("café ✓"), vec![b'c', b'a', b'f', 0xE9, b' ', b'?']);
    }

    #[test]
    fn test_pdf_text_uses_win_ansi() {
        assert_eq!(pdf_text("Café"), b"Caf\xe9");
        assert_eq!(pdf_text("\u{201c}A\u{201d} \u{2013} \u{20ac}5"), b"\x93A\x94 \x96 \x805");
        // C1 controls have no WinAnsi glyph.
        assert_eq!(pdf_text("\u{85}"), b"?");
        assert_eq!(pdf_text("\u{0905}\u{092e}\u{093f}"), b"???");
    }
}
