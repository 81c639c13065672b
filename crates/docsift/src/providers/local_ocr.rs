//! Local text extraction
//!
//! Native parsers handle files that carry a text layer (text, PDF, DOCX,
//! PPTX, XLSX). Images and, in high-accuracy mode, PDFs without a text layer
//! go through tesseract; PDF pages are rasterized with pdftoppm first.

use async_trait::async_trait;
use calamine::Reader;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use super::{AdapterError, AdapterResult, OcrMode, OcrProvider};
use crate::config::OcrConfig;
use crate::types::{ExtractedPage, FileKind};

/// Text extraction backed by native parsers and tesseract
pub struct LocalOcr {
    config: OcrConfig,
}

impl LocalOcr {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Check whether tesseract can be launched
    pub async fn has_tesseract(&self) -> bool {
        Command::new(&self.config.tesseract_path)
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    async fn read(path: &Path) -> AdapterResult<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .map_err(|e| AdapterError::Unreadable(format!("{}: {}", path.display(), e)))
    }

    /// Run a blocking parser off the async runtime
    async fn blocking<F>(label: &'static str, f: F) -> AdapterResult<Vec<ExtractedPage>>
    where
        F: FnOnce() -> AdapterResult<Vec<ExtractedPage>> + Send + 'static,
    {
        tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| AdapterError::Failed(format!("{} parser crashed: {}", label, e)))?
    }

    async fn extract_pdf(&self, path: &Path, mode: OcrMode) -> AdapterResult<Vec<ExtractedPage>> {
        let data = Self::read(path).await?;
        let pages = Self::blocking("pdf", move || pdf_pages(&data)).await?;

        let has_text = pages.iter().any(|p| !p.text.trim().is_empty());
        if has_text || mode == OcrMode::Fast {
            return Ok(pages);
        }

        tracing::info!("{} has no text layer, rasterizing for OCR", path.display());
        self.ocr_pdf(path).await
    }

    async fn extract_office(&self, path: &Path) -> AdapterResult<Vec<ExtractedPage>> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        let data = Self::read(path).await?;
        match ext.as_str() {
            "docx" => Self::blocking("docx", move || docx_pages(&data)).await,
            "pptx" => Self::blocking("pptx", move || pptx_pages(&data)).await,
            "xlsx" | "xls" => Self::blocking("spreadsheet", move || spreadsheet_pages(data)).await,
            other => Err(AdapterError::Unsupported(format!(
                "legacy .{} files need conversion before extraction",
                other
            ))),
        }
    }

    /// Rasterize a PDF and OCR every page
    async fn ocr_pdf(&self, path: &Path) -> AdapterResult<Vec<ExtractedPage>> {
        let temp_dir = tempfile::tempdir()
            .map_err(|e| AdapterError::Failed(format!("Failed to create temp dir: {}", e)))?;
        let prefix = temp_dir.path().join("page");

        let output = Command::new(&self.config.pdftoppm_path)
            .arg("-png")
            .arg("-r")
            .arg(self.config.dpi.to_string())
            .arg(path)
            .arg(&prefix)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AdapterError::ModelMissing(format!("pdftoppm not available: {}", e)))?;

        if !output.status.success() {
            return Err(AdapterError::Failed(format!(
                "pdftoppm error: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let images = rendered_pages(temp_dir.path()).await?;
        if images.is_empty() {
            return Err(AdapterError::Failed("pdftoppm produced no images".to_string()));
        }

        let mut pages = Vec::with_capacity(images.len());
        for (i, image) in images.iter().enumerate() {
            let (text, confidence) = self.tesseract(image).await?;
            pages.push(ExtractedPage {
                page_number: i as u32 + 1,
                text,
                confidence,
            });
        }

        tracing::info!("OCR extracted {} pages from {}", pages.len(), path.display());
        Ok(pages)
    }

    /// OCR one image, returning text and mean word confidence in 0..=1
    async fn tesseract(&self, image: &Path) -> AdapterResult<(String, f32)> {
        let output = Command::new(&self.config.tesseract_path)
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(&self.config.language)
            .arg("tsv")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AdapterError::ModelMissing(format!("tesseract not available: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("Failed loading language") {
                return Err(AdapterError::ModelMissing(format!(
                    "tesseract language pack '{}' is not installed",
                    self.config.language
                )));
            }
            return Err(AdapterError::Failed(format!("tesseract error: {}", stderr.trim())));
        }

        Ok(parse_tesseract_tsv(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// PNG pages written by pdftoppm, in page order
async fn rendered_pages(dir: &Path) -> AdapterResult<Vec<PathBuf>> {
    let read_err = |e: std::io::Error| AdapterError::Failed(format!("Failed to read temp dir: {}", e));
    let mut entries = tokio::fs::read_dir(dir).await.map_err(read_err)?;

    let mut images = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "png") {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

#[async_trait]
impl OcrProvider for LocalOcr {
    async fn process(
        &self,
        path: &Path,
        kind: FileKind,
        mode: OcrMode,
    ) -> AdapterResult<Vec<ExtractedPage>> {
        match kind {
            FileKind::Text => {
                let data = Self::read(path).await?;
                Ok(vec![ExtractedPage {
                    page_number: 1,
                    text: String::from_utf8_lossy(&data).into_owned(),
                    confidence: 1.0,
                }])
            }
            FileKind::Pdf => self.extract_pdf(path, mode).await,
            FileKind::Office => self.extract_office(path).await,
            FileKind::Image => {
                let (text, confidence) = self.tesseract(path).await?;
                Ok(vec![ExtractedPage {
                    page_number: 1,
                    text,
                    confidence,
                }])
            }
        }
    }

    async fn health_check(&self) -> bool {
        self.has_tesseract().await
    }

    fn name(&self) -> &str {
        "local"
    }
}

fn text_layer_page(page_number: u32, text: String) -> ExtractedPage {
    let confidence = if text.trim().is_empty() { 0.0 } else { 1.0 };
    ExtractedPage {
        page_number,
        text,
        confidence,
    }
}

fn clean(text: &str) -> String {
    text.replace('\0', "")
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Per-page text layer; falls back to pdf-extract as a single page
fn pdf_pages(data: &[u8]) -> AdapterResult<Vec<ExtractedPage>> {
    match lopdf::Document::load_mem(data) {
        Ok(doc) => {
            let numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
            let mut pages = Vec::with_capacity(numbers.len());
            let mut any_error = false;
            for number in numbers {
                match doc.extract_text(&[number]) {
                    Ok(text) => pages.push(text_layer_page(number, clean(&text))),
                    Err(e) => {
                        tracing::debug!("lopdf could not read page {}: {}", number, e);
                        any_error = true;
                        pages.push(text_layer_page(number, String::new()));
                    }
                }
            }
            if any_error && pages.iter().all(|p| p.text.is_empty()) {
                return pdf_extract_single(data);
            }
            Ok(pages)
        }
        Err(e) => {
            tracing::debug!("lopdf failed ({}), trying pdf-extract", e);
            pdf_extract_single(data)
        }
    }
}

fn pdf_extract_single(data: &[u8]) -> AdapterResult<Vec<ExtractedPage>> {
    let text = pdf_extract::extract_text_from_mem(data)
        .map_err(|e| AdapterError::Unreadable(format!("Failed to load PDF: {}", e)))?;
    Ok(vec![text_layer_page(1, clean(&text))])
}

fn docx_pages(data: &[u8]) -> AdapterResult<Vec<ExtractedPage>> {
    let doc = docx_rs::read_docx(data)
        .map_err(|e| AdapterError::Unreadable(format!("Failed to read DOCX: {}", e)))?;

    let mut text = String::new();
    for child in doc.document.children {
        if let docx_rs::DocumentChild::Paragraph(p) = child {
            for child in p.children {
                if let docx_rs::ParagraphChild::Run(run) = child {
                    for child in run.children {
                        if let docx_rs::RunChild::Text(t) = child {
                            text.push_str(&t.text);
                        }
                    }
                }
            }
            text.push('\n');
        }
    }

    Ok(vec![text_layer_page(1, clean(&text))])
}

fn slide_number(name: &str) -> u32 {
    name.trim_start_matches("ppt/slides/slide")
        .trim_end_matches(".xml")
        .parse()
        .unwrap_or(0)
}

fn pptx_pages(data: &[u8]) -> AdapterResult<Vec<ExtractedPage>> {
    use std::io::Read;

    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(data))
        .map_err(|e| AdapterError::Unreadable(format!("Failed to open PPTX: {}", e)))?;

    let mut slides: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    slides.sort_by_key(|n| slide_number(n));

    let mut pages = Vec::with_capacity(slides.len());
    for (i, name) in slides.iter().enumerate() {
        let mut xml = String::new();
        if let Ok(mut file) = archive.by_name(name) {
            if file.read_to_string(&mut xml).is_err() {
                xml.clear();
            }
        }
        pages.push(text_layer_page(i as u32 + 1, slide_text(&xml)));
    }

    Ok(pages)
}

/// Collect `<a:t>` runs, one line per paragraph
fn slide_text(xml: &str) -> String {
    use quick_xml::events::Event;
    use quick_xml::Reader as XmlReader;

    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut lines = Vec::new();
    let mut line = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(e)) if in_text => {
                if let Ok(text) = e.unescape() {
                    if !line.is_empty() {
                        line.push(' ');
                    }
                    line.push_str(text.trim());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" if !line.is_empty() => lines.push(std::mem::take(&mut line)),
                _ => {}
            },
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }

    lines.join("\n")
}

fn spreadsheet_pages(data: Vec<u8>) -> AdapterResult<Vec<ExtractedPage>> {
    let mut workbook = calamine::open_workbook_auto_from_rs(std::io::Cursor::new(data))
        .map_err(|e| AdapterError::Unreadable(format!("Failed to open spreadsheet: {}", e)))?;

    let mut pages = Vec::new();
    for (i, sheet) in workbook.sheet_names().to_vec().into_iter().enumerate() {
        let mut text = String::new();
        if let Ok(range) = workbook.worksheet_range(&sheet) {
            for row in range.rows() {
                let cells: Vec<String> = row
                    .iter()
                    .map(|cell| match cell {
                        calamine::Data::Empty => String::new(),
                        calamine::Data::String(s) => s.clone(),
                        calamine::Data::Float(f) => f.to_string(),
                        calamine::Data::Int(i) => i.to_string(),
                        calamine::Data::Bool(b) => b.to_string(),
                        calamine::Data::DateTime(dt) => dt.to_string(),
                        _ => String::new(),
                    })
                    .collect();
                if cells.iter().any(|c| !c.is_empty()) {
                    text.push_str(&cells.join(" | "));
                    text.push('\n');
                }
            }
        }
        pages.push(text_layer_page(i as u32 + 1, text.trim_end().to_string()));
    }

    Ok(pages)
}

/// Parse `tesseract ... tsv` output into (text, mean confidence 0..=1).
///
/// Word rows are level 5; rows with conf -1 carry layout only.
pub fn parse_tesseract_tsv(tsv: &str) -> (String, f32) {
    let mut lines: Vec<String> = Vec::new();
    let mut current_key: Option<(&str, &str, &str, &str)> = None;
    let mut conf_sum = 0.0f32;
    let mut words = 0usize;

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let word = cols[11].trim();
        let conf: f32 = cols[10].parse().unwrap_or(-1.0);
        if word.is_empty() || conf < 0.0 {
            continue;
        }

        let key = (cols[1], cols[2], cols[3], cols[4]);
        if current_key == Some(key) {
            if let Some(line) = lines.last_mut() {
                line.push(' ');
                line.push_str(word);
            }
        } else {
            lines.push(word.to_string());
            current_key = Some(key);
        }

        conf_sum += conf;
        words += 1;
    }

    let confidence = if words == 0 {
        0.0
    } else {
        (conf_sum / words as f32 / 100.0).clamp(0.0, 1.0)
    };
    (lines.join("\n"), confidence)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
1\t1\t0\t0\t0\t0\t0\t0\t640\t480\t-1\t\n\
5\t1\t1\t1\t1\t1\t10\t10\t50\t20\t90\tInvoice\n\
5\t1\t1\t1\t1\t2\t70\t10\t40\t20\t80\t#42\n\
5\t1\t1\t1\t2\t1\t10\t40\t60\t20\t70\tTotal\n";

    #[test]
    fn test_parse_tsv_groups_lines() {
        let (text, confidence) = parse_tesseract_tsv(TSV);
        assert_eq!(text, "Invoice #42\nTotal");
        assert!((confidence - 0.8).abs() < 1e-4);
    }

    #[test]
    fn test_parse_empty_tsv() {
        let (text, confidence) = parse_tesseract_tsv("level\tpage_num\n");
        assert!(text.is_empty());
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn test_slide_text() {
        let xml = r#"<p:sld xmlns:a="a" xmlns:p="p"><p:txBody><a:p><a:r><a:t>Quarterly</a:t></a:r><a:r><a:t>Report</a:t></a:r></a:p><a:p><a:r><a:t>2024</a:t></a:r></a:p></p:txBody></p:sld>"#;
        assert_eq!(slide_text(xml), "Quarterly Report\n2024");
    }

    #[tokio::test]
    async fn test_text_read_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "# Heading\nbody").unwrap();

        let ocr = LocalOcr::new(&OcrConfig::default());
        let pages = ocr.process(&path, FileKind::Text, OcrMode::Fast).await.unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].text, "# Heading\nbody");
        assert_eq!(pages[0].confidence, 1.0);
    }

    #[tokio::test]
    async fn test_missing_file_is_unreadable() {
        let ocr = LocalOcr::new(&OcrConfig::default());
        let err = ocr
            .process(Path::new("/nope/missing.txt"), FileKind::Text, OcrMode::Fast)
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Unreadable(_)));
    }

    #[tokio::test]
    async fn test_legacy_office_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.doc");
        std::fs::write(&path, b"\xd0\xcf\x11\xe0").unwrap();

        let ocr = LocalOcr::new(&OcrConfig::default());
        let err = ocr.process(&path, FileKind::Office, OcrMode::Fast).await.unwrap_err();
        assert!(matches!(err, AdapterError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_rendered_pages_sorted_png_only() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["page-2.png", "page-1.png", "page-1.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let pages = rendered_pages(dir.path()).await.unwrap();
        let names: Vec<_> = pages
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["page-1.png", "page-2.png"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_abandoned_tesseract_is_killed() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("finished");
        let script = dir.path().join("slow-tesseract");
        std::fs::write(
            &script,
            format!("#!/bin/sh\nsleep 2\ntouch '{}'\n", marker.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let image = dir.path().join("scan.png");
        std::fs::write(&image, b"not really a png").unwrap();

        let ocr = LocalOcr::new(&OcrConfig {
            tesseract_path: script.clone(),
            ..OcrConfig::default()
        });
        let call = ocr.process(&image, FileKind::Image, OcrMode::Fast);
        let result = tokio::time::timeout(std::time::Duration::from_millis(300), call).await;
        assert!(result.is_err());

        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
        assert!(!marker.exists());
    }
}
