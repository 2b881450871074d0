use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use regex::Regex;

use crate::util::ensure_directory;

/// A positioned run of text or an image, in PDF points from the top-left
/// corner of the page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutBox {
    pub text: String,
    pub top: f64,
    pub left: f64,
    pub right: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    pub number: usize,
    pub width: f64,
    pub height: f64,
    pub text_boxes: Vec<LayoutBox>,
    pub images: Vec<LayoutBox>,
    /// Non-whitespace characters per font family.
    pub font_chars: BTreeMap<String, usize>,
    pub links: Vec<String>,
    pub parse_failed: bool,
}

/// Source of page text and page layout for a PDF file.
pub trait PdfBackend: Send + Sync {
    /// Plain text per page, from page 1 through `last_page` (or the end).
    fn page_texts(&self, path: &Path, last_page: Option<usize>) -> Result<Vec<String>>;

    fn page_layouts(&self, path: &Path) -> Result<Vec<PageLayout>>;
}

/// Extraction through poppler-utils (`pdftotext`, `pdftohtml`).
#[derive(Debug, Default, Clone, Copy)]
pub struct PopplerBackend;

impl PdfBackend for PopplerBackend {
    fn page_texts(&self, path: &Path, last_page: Option<usize>) -> Result<Vec<String>> {
        extract_pages_with_pdftotext(path, last_page)
    }

    fn page_layouts(&self, path: &Path) -> Result<Vec<PageLayout>> {
        let xml = extract_layout_xml_with_pdftohtml(path)?;
        parse_layout_xml(&xml)
    }
}

fn extract_pages_with_pdftotext(pdf_path: &Path, last_page: Option<usize>) -> Result<Vec<String>> {
    let mut command = Command::new("pdftotext");
    command.arg("-enc").arg("UTF-8").arg("-f").arg("1");
    if let Some(last_page) = last_page {
        command.arg("-l").arg(last_page.to_string());
    }
    command.arg(pdf_path).arg("-");

    let output = command
        .output()
        .with_context(|| format!("failed to execute pdftotext for {}", pdf_path.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "pdftotext returned non-zero exit status for {}: {}",
            pdf_path.display(),
            stderr.trim()
        );
    }

    let raw = String::from_utf8_lossy(&output.stdout);
    let mut pages: Vec<String> = raw
        .split('\u{000C}')
        .map(|chunk| chunk.replace('\u{0000}', ""))
        .collect();

    // pdftotext ends every page with a form feed, leaving an empty tail.
    if pages.last().is_some_and(|page| page.is_empty()) {
        pages.pop();
    }

    Ok(pages)
}

fn extract_layout_xml_with_pdftohtml(pdf_path: &Path) -> Result<String> {
    let pdf_stem = pdf_path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("pdf");
    let safe_stem = pdf_stem
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() {
                character
            } else {
                '_'
            }
        })
        .collect::<String>();

    let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let output_dir = std::env::temp_dir().join(format!(
        "aclpub_layout_{}_{}_{}",
        safe_stem,
        std::process::id(),
        stamp
    ));
    ensure_directory(&output_dir)?;

    let result = run_pdftohtml(pdf_path, &output_dir);
    let _ = fs::remove_dir_all(&output_dir);
    result
}

fn run_pdftohtml(pdf_path: &Path, output_dir: &Path) -> Result<String> {
    // Images are written next to the xml; the directory is discarded afterwards.
    let output_base = output_dir.join("layout");
    let output = Command::new("pdftohtml")
        .arg("-xml")
        .arg("-zoom")
        .arg("1")
        .arg("-hidden")
        .arg("-nodrm")
        .arg("-q")
        .arg(pdf_path)
        .arg(&output_base)
        .output()
        .with_context(|| format!("failed to execute pdftohtml for {}", pdf_path.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "pdftohtml returned non-zero exit status for {}: {}",
            pdf_path.display(),
            stderr.trim()
        );
    }

    let xml_path = PathBuf::from(format!("{}.xml", output_base.display()));
    let raw = fs::read(&xml_path)
        .with_context(|| format!("pdftohtml did not produce {}", xml_path.display()))?;

    Ok(String::from_utf8_lossy(&raw).into_owned())
}

struct LayoutPatterns {
    page: Regex,
    attribute: Regex,
    fontspec: Regex,
    text: Regex,
    image: Regex,
    link: Regex,
    tag: Regex,
}

impl LayoutPatterns {
    fn new() -> Result<Self> {
        Ok(Self {
            page: Regex::new(r"(?s)<page\s([^>]*)>(.*?)</page>")
                .context("failed to compile page regex")?,
            attribute: Regex::new(r#"([A-Za-z_]+)="([^"]*)""#)
                .context("failed to compile attribute regex")?,
            fontspec: Regex::new(r"<fontspec\s([^>]*?)/?>")
                .context("failed to compile fontspec regex")?,
            text: Regex::new(r"(?s)<text\s([^>]*)>(.*?)</text>")
                .context("failed to compile text regex")?,
            image: Regex::new(r"<image\s([^>]*?)/?>").context("failed to compile image regex")?,
            link: Regex::new(r#"<a\s[^>]*href="([^"]*)""#)
                .context("failed to compile link regex")?,
            tag: Regex::new(r"<[^>]*>").context("failed to compile tag regex")?,
        })
    }

    fn attributes<'a>(&self, raw: &'a str) -> HashMap<&'a str, &'a str> {
        self.attribute
            .captures_iter(raw)
            .filter_map(|captures| Some((captures.get(1)?.as_str(), captures.get(2)?.as_str())))
            .collect()
    }
}

/// Parses `pdftohtml -xml -zoom 1` output. A page with attributes that do not
/// parse is kept with `parse_failed` set instead of failing the document.
pub fn parse_layout_xml(xml: &str) -> Result<Vec<PageLayout>> {
    let patterns = LayoutPatterns::new()?;

    let mut font_families = HashMap::<String, String>::new();
    for captures in patterns.fontspec.captures_iter(xml) {
        let raw = captures.get(1).map(|value| value.as_str()).unwrap_or_default();
        let attributes = patterns.attributes(raw);
        if let (Some(id), Some(family)) = (attributes.get("id"), attributes.get("family")) {
            font_families.insert((*id).to_string(), unescape_xml(family));
        }
    }

    let mut pages = Vec::new();
    for (index, captures) in patterns.page.captures_iter(xml).enumerate() {
        let raw_attributes = captures.get(1).map(|value| value.as_str()).unwrap_or_default();
        let body = captures.get(2).map(|value| value.as_str()).unwrap_or_default();
        pages.push(parse_page(&patterns, &font_families, index, raw_attributes, body));
    }

    Ok(pages)
}

fn parse_page(
    patterns: &LayoutPatterns,
    font_families: &HashMap<String, String>,
    index: usize,
    raw_attributes: &str,
    body: &str,
) -> PageLayout {
    let attributes = patterns.attributes(raw_attributes);
    let mut page = PageLayout {
        number: attributes
            .get("number")
            .and_then(|value| value.parse::<usize>().ok())
            .unwrap_or(index + 1),
        ..PageLayout::default()
    };

    match (
        parse_number(attributes.get("width")),
        parse_number(attributes.get("height")),
    ) {
        (Some(width), Some(height)) => {
            page.width = width;
            page.height = height;
        }
        _ => page.parse_failed = true,
    }

    for captures in patterns.text.captures_iter(body) {
        let raw = captures.get(1).map(|value| value.as_str()).unwrap_or_default();
        let content = captures.get(2).map(|value| value.as_str()).unwrap_or_default();
        let attributes = patterns.attributes(raw);

        for link in patterns.link.captures_iter(content) {
            if let Some(href) = link.get(1) {
                page.links.push(unescape_xml(href.as_str()));
            }
        }

        let text = unescape_xml(&patterns.tag.replace_all(content, ""));
        let char_count = text.chars().filter(|character| !character.is_whitespace()).count();
        if char_count == 0 {
            continue;
        }

        let family = attributes
            .get("font")
            .and_then(|id| font_families.get(*id))
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());
        *page.font_chars.entry(family).or_insert(0) += char_count;

        match positioned_box(&attributes, text) {
            Some(text_box) => page.text_boxes.push(text_box),
            None => page.parse_failed = true,
        }
    }

    for captures in patterns.image.captures_iter(body) {
        let raw = captures.get(1).map(|value| value.as_str()).unwrap_or_default();
        let attributes = patterns.attributes(raw);
        match positioned_box(&attributes, String::new()) {
            Some(image) => page.images.push(image),
            None => page.parse_failed = true,
        }
    }

    page
}

fn positioned_box(attributes: &HashMap<&str, &str>, text: String) -> Option<LayoutBox> {
    let top = parse_number(attributes.get("top"))?;
    let left = parse_number(attributes.get("left"))?;
    let width = parse_number(attributes.get("width"))?;

    Some(LayoutBox {
        text,
        top,
        left,
        right: left + width,
    })
}

fn parse_number(value: Option<&&str>) -> Option<f64> {
    value
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
}

fn unescape_xml(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#160;", " ")
        .replace('\u{00a0}', " ")
        .replace("&amp;", "&")
}

pub fn command_version_optional(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let source = if stdout.trim().is_empty() {
        stderr.trim()
    } else {
        stdout.trim()
    };

    source
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
}
