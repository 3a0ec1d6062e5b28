use crate::error::{PipelineError, PipelineResult};
use image::DynamicImage;
use pdfium_render::prelude::*;
use uuid::Uuid;

/// A contiguous run of paragraphs from the source document, sized to an
/// estimated token budget.
#[derive(Debug, Clone)]
pub struct ParsedChunk {
    /// `c_` + zero-padded ordinal, unique within a run.
    pub chunk_id: String,
    /// 1-based page of the chunk's first paragraph.
    pub page: u32,
    /// 1-based chunk ordinal.
    pub paragraph_index: u32,
    pub text: String,
    /// Character span [start, end) in the concatenated document text.
    pub char_start: u32,
    pub char_end: u32,
}

/// An embedded image lifted out of the PDF.
#[derive(Debug, Clone)]
pub struct ParsedImage {
    pub image_id: String,
    /// 1-based page number.
    pub page: u32,
    /// Position within the page's image objects (skipped images leave gaps).
    pub image_index: u32,
    pub bytes: Vec<u8>,
    /// Storage-key extension; always normalized (`jpg` becomes `jpeg`).
    pub ext: String,
    pub width: u32,
    pub height: u32,
    /// (x0, y0, x1, y1) page rectangle; falls back to (0, 0, w, h).
    pub bbox: (f32, f32, f32, f32),
}

/// Parse PDF bytes into page count, text chunks, and embedded images.
///
/// Fails with `PARSE_FAILED` on invalid or empty PDFs, or when no text
/// survives normalization. pdfium work is synchronous; callers drive this
/// through `spawn_blocking`.
pub fn parse_pdf_bytes(
    data: &[u8],
    chunk_size_tokens: u32,
) -> PipelineResult<(u32, Vec<ParsedChunk>, Vec<ParsedImage>)> {
    let pdfium = bind_pdfium()?;
    let doc = pdfium
        .load_pdf_from_byte_slice(data, None)
        .map_err(|e| PipelineError::ParseFailed(format!("invalid pdf: {e}")))?;

    let pages = doc.pages().len() as u32;
    if pages == 0 {
        return Err(PipelineError::ParseFailed("empty pdf".to_string()));
    }

    let mut paragraph_rows: Vec<(u32, String)> = Vec::new();
    let mut all_images: Vec<ParsedImage> = Vec::new();

    for (idx, page) in doc.pages().iter().enumerate() {
        let page_num = idx as u32 + 1;

        let raw = page
            .text()
            .map(|t| t.all())
            .unwrap_or_default();
        let normalized = normalize_text(&raw);
        if !normalized.is_empty() {
            for para in split_paragraphs(&normalized) {
                paragraph_rows.push((page_num, para));
            }
        }

        all_images.extend(extract_page_images(&page, page_num));
    }

    if paragraph_rows.is_empty() {
        return Err(PipelineError::ParseFailed("no extractable text".to_string()));
    }

    let chunk_rows = chunk_paragraphs(&paragraph_rows, chunk_size_tokens);

    let mut chunks = Vec::with_capacity(chunk_rows.len());
    let mut offset: u32 = 0;
    for (i, (page, text)) in chunk_rows.into_iter().enumerate() {
        let ordinal = i as u32 + 1;
        let start = offset;
        let end = start + text.chars().count() as u32;
        chunks.push(ParsedChunk {
            chunk_id: format!("c_{ordinal:04}"),
            page,
            paragraph_index: ordinal,
            text,
            char_start: start,
            char_end: end,
        });
        offset = end + 1;
    }

    Ok((pages, chunks, all_images))
}

/// Load the pdfium library from the system or the working directory.
fn bind_pdfium() -> PipelineResult<Pdfium> {
    let bindings = Pdfium::bind_to_system_library()
        .or_else(|_| Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(".")))
        .map_err(|e| {
            PipelineError::Other(format!(
                "Failed to load pdfium library: {e}. \
                 Place libpdfium in the working directory or system path."
            ))
        })?;
    Ok(Pdfium::new(bindings))
}

/// Normalize extracted page text: NBSP to space, collapse runs of spaces and
/// tabs, collapse 3+ newlines to 2, trim.
fn normalize_text(text: &str) -> String {
    let mut collapsed = String::with_capacity(text.len());
    let mut in_blank = false;
    for ch in text.chars() {
        let ch = if ch == '\u{00a0}' { ' ' } else { ch };
        if ch == ' ' || ch == '\t' {
            if !in_blank {
                collapsed.push(' ');
            }
            in_blank = true;
        } else {
            in_blank = false;
            collapsed.push(ch);
        }
    }

    let mut out = String::with_capacity(collapsed.len());
    let mut newlines = 0;
    for ch in collapsed.chars() {
        if ch == '\n' {
            newlines += 1;
            if newlines <= 2 {
                out.push(ch);
            }
        } else {
            newlines = 0;
            out.push(ch);
        }
    }

    out.trim().to_string()
}

/// Split page text into paragraphs on blank-line separators; when none
/// produce anything, fall back to non-empty lines.
fn split_paragraphs(page_text: &str) -> Vec<String> {
    let mut paras: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in page_text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paras.push(current.join("\n").trim().to_string());
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paras.push(current.join("\n").trim().to_string());
    }
    paras.retain(|p| !p.is_empty());

    if !paras.is_empty() {
        return paras;
    }

    page_text
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

/// Conservative token estimate without a tokenizer dependency.
fn estimate_tokens(text: &str) -> u32 {
    let words = text.split_whitespace().count() as f64;
    ((words * 1.3) as u32).max(1)
}

/// Greedily pack paragraphs into chunks bounded by `chunk_size` estimated
/// tokens. A chunk's page is the page of its first paragraph.
fn chunk_paragraphs(paragraphs: &[(u32, String)], chunk_size: u32) -> Vec<(u32, String)> {
    let mut chunks: Vec<(u32, String)> = Vec::new();
    let mut current_page = paragraphs[0].0;
    let mut current_parts: Vec<&str> = Vec::new();
    let mut current_tokens: u32 = 0;

    for (page, para) in paragraphs {
        let para_tokens = estimate_tokens(para);

        if !current_parts.is_empty() && current_tokens + para_tokens > chunk_size {
            chunks.push((current_page, current_parts.join("\n\n")));
            current_parts = vec![para];
            current_tokens = para_tokens;
            current_page = *page;
            continue;
        }

        if current_parts.is_empty() {
            current_page = *page;
        }
        current_parts.push(para);
        current_tokens += para_tokens;
    }

    if !current_parts.is_empty() {
        chunks.push((current_page, current_parts.join("\n\n")));
    }

    chunks
}

/// Normalize a reported image extension for storage keys.
fn normalize_ext(ext: &str) -> &str {
    if ext == "jpg" { "jpeg" } else { ext }
}

/// Extract embedded images from a page, skipping tiny decorative ones.
fn extract_page_images(page: &PdfPage, page_num: u32) -> Vec<ParsedImage> {
    let mut images = Vec::new();
    let mut img_idx: u32 = 0;

    for object in page.objects().iter() {
        if object.object_type() != PdfPageObjectType::Image {
            continue;
        }
        let this_idx = img_idx;
        img_idx += 1;

        let bounds = object.bounds().ok();

        let Some(image_object) = object.as_image_object() else {
            continue;
        };

        let raw_image: DynamicImage = match image_object.get_raw_image() {
            Ok(img) => img,
            Err(_) => continue,
        };

        let w = raw_image.width();
        let h = raw_image.height();
        if w < 20 || h < 20 {
            continue;
        }

        // pdfium hands back decoded bitmaps, so bytes are re-encoded as PNG.
        let mut png_bytes = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut png_bytes);
        if raw_image
            .write_to(&mut cursor, image::ImageFormat::Png)
            .is_err()
        {
            continue;
        }

        let bbox = match &bounds {
            Some(b) => (
                b.left().value,
                b.top().value,
                b.right().value,
                b.bottom().value,
            ),
            None => (0.0, 0.0, w as f32, h as f32),
        };

        images.push(ParsedImage {
            image_id: Uuid::new_v4().to_string(),
            page: page_num,
            image_index: this_idx,
            bytes: png_bytes,
            ext: normalize_ext("png").to_string(),
            width: w,
            height: h,
            bbox,
        });
    }

    images
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text_collapses_whitespace() {
        let raw = "a\u{00a0}b\t\tc   d";
        assert_eq!(normalize_text(raw), "a b c d");
    }

    #[test]
    fn test_normalize_text_collapses_newline_runs() {
        let raw = "para one\n\n\n\n\npara two";
        assert_eq!(normalize_text(raw), "para one\n\npara two");
    }

    #[test]
    fn test_normalize_text_trims() {
        assert_eq!(normalize_text("  \n hello \n "), "hello");
    }

    #[test]
    fn test_split_paragraphs_on_blank_lines() {
        let text = "first paragraph\ncontinues here\n\nsecond paragraph";
        let paras = split_paragraphs(text);
        assert_eq!(paras.len(), 2);
        assert_eq!(paras[0], "first paragraph\ncontinues here");
        assert_eq!(paras[1], "second paragraph");
    }

    #[test]
    fn test_split_paragraphs_whitespace_only_separator() {
        let text = "first\n   \nsecond";
        let paras = split_paragraphs(text);
        assert_eq!(paras, vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn test_split_paragraphs_no_blank_lines() {
        let text = "only\nlines\nhere";
        let paras = split_paragraphs(text);
        assert_eq!(paras.len(), 1);
        assert_eq!(paras[0], "only\nlines\nhere");
    }

    #[test]
    fn test_estimate_tokens_floor() {
        assert_eq!(estimate_tokens(""), 1);
        assert_eq!(estimate_tokens("one two three four"), 5); // 4 * 1.3 = 5.2 -> 5
    }

    #[test]
    fn test_chunk_paragraphs_greedy_split() {
        // 10 words each -> 13 estimated tokens per paragraph.
        let para = "w1 w2 w3 w4 w5 w6 w7 w8 w9 w10".to_string();
        let paragraphs: Vec<(u32, String)> = (1..=4).map(|p| (p, para.clone())).collect();

        // Budget fits two paragraphs (26 tokens) but not three.
        let chunks = chunk_paragraphs(&paragraphs, 30);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].0, 1);
        assert_eq!(chunks[1].0, 3);
        assert_eq!(chunks[0].1, format!("{para}\n\n{para}"));
    }

    #[test]
    fn test_chunk_paragraphs_single_oversized_paragraph() {
        let big = "word ".repeat(100).trim().to_string();
        let paragraphs = vec![(1, big.clone())];
        let chunks = chunk_paragraphs(&paragraphs, 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].1, big);
    }

    #[test]
    fn test_chunk_ids_and_offsets_are_deterministic() {
        let paragraphs = vec![
            (1, "alpha beta".to_string()),
            (2, "gamma delta".to_string()),
        ];
        // Tiny budget: one paragraph per chunk.
        let rows = chunk_paragraphs(&paragraphs, 1);
        assert_eq!(rows.len(), 2);

        let mut offset = 0u32;
        for (i, (_, text)) in rows.iter().enumerate() {
            let ordinal = i as u32 + 1;
            let chunk_id = format!("c_{ordinal:04}");
            assert_eq!(chunk_id.len(), 6);
            let end = offset + text.chars().count() as u32;
            offset = end + 1;
        }
        assert_eq!(offset, 10 + 1 + 11 + 1);
    }

    #[test]
    fn test_normalize_ext() {
        assert_eq!(normalize_ext("jpg"), "jpeg");
        assert_eq!(normalize_ext("jpeg"), "jpeg");
        assert_eq!(normalize_ext("png"), "png");
    }

    #[test]
    fn test_parse_rejects_garbage_bytes() {
        // Requires the pdfium library; skip quietly when it is unavailable.
        if bind_pdfium().is_err() {
            return;
        }
        let err = parse_pdf_bytes(b"not a pdf at all", 1200).unwrap_err();
        assert_eq!(err.code(), "PARSE_FAILED");
    }
}
