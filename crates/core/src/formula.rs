use image::DynamicImage;
use std::sync::Arc;

/// LaTeX transcription engine for formula images.
///
/// Implementations run a local OCR model over the image and return a LaTeX
/// string, or `None` when transcription fails. Engines must swallow their own
/// errors; the detector treats every failure as "not a formula".
pub trait LatexOcr: Send + Sync {
    fn transcribe(&self, image: &DynamicImage) -> Option<String>;
}

/// Classifies embedded images as formulas and transcribes them to LaTeX.
///
/// Pure with respect to the caller: no side effects, and any decode or engine
/// failure yields `None`. When no engine is installed, formula recognition is
/// disabled and every image passes through unrecognized.
#[derive(Clone)]
pub struct FormulaDetector {
    ocr: Option<Arc<dyn LatexOcr>>,
}

impl FormulaDetector {
    pub fn new(ocr: Arc<dyn LatexOcr>) -> Self {
        Self { ocr: Some(ocr) }
    }

    /// A detector without a transcription engine; always returns `None`.
    pub fn disabled() -> Self {
        Self { ocr: None }
    }

    /// Attempt to detect and OCR a LaTeX formula from raw image bytes.
    pub fn detect(&self, image_bytes: &[u8]) -> Option<String> {
        let img = image::load_from_memory(image_bytes).ok()?;

        if !is_formula_candidate(&img) {
            return None;
        }

        let ocr = self.ocr.as_ref()?;
        let latex = ocr.transcribe(&img)?;
        accept_latex(&latex)
    }
}

/// Heuristic gate ahead of the expensive OCR call: formula images are
/// moderately sized, not tall-and-narrow, and mostly light-background.
fn is_formula_candidate(img: &DynamicImage) -> bool {
    let (w, h) = (img.width(), img.height());

    if w > 2000 || h > 2000 {
        return false;
    }
    if w < 20 || h < 20 {
        return false;
    }

    let aspect = w as f64 / h.max(1) as f64;
    if aspect < 0.3 {
        return false;
    }

    let gray = img.to_luma8();
    let pixels = gray.as_raw();
    if pixels.is_empty() {
        return false;
    }
    let light = pixels.iter().filter(|&&p| p > 200).count();
    (light as f64 / pixels.len() as f64) >= 0.5
}

/// Sanity-check OCR output before accepting it as a formula.
fn accept_latex(latex: &str) -> Option<String> {
    let trimmed = latex.trim();
    if trimmed.chars().count() < 2 {
        return None;
    }

    const MATH_INDICATORS: &[char] = &[
        '\\', '^', '_', '{', '}', '+', '=', '(', ')', '-', '*', '/',
    ];
    let has_math = trimmed.chars().any(|c| MATH_INDICATORS.contains(&c));
    if !has_math && trimmed.chars().count() < 10 {
        return None;
    }

    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, RgbImage};

    /// Engine stub that replays a fixed transcription.
    struct StubOcr(Option<String>);

    impl LatexOcr for StubOcr {
        fn transcribe(&self, _image: &DynamicImage) -> Option<String> {
            self.0.clone()
        }
    }

    fn white_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, image::Rgb([255, 255, 255]));
        encode_png(DynamicImage::ImageRgb8(img))
    }

    fn dark_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, image::Rgb([10, 10, 10]));
        encode_png(DynamicImage::ImageRgb8(img))
    }

    fn encode_png(img: DynamicImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut bytes);
        img.write_to(&mut cursor, image::ImageFormat::Png).unwrap();
        bytes
    }

    fn detector_with(latex: &str) -> FormulaDetector {
        FormulaDetector::new(Arc::new(StubOcr(Some(latex.to_string()))))
    }

    #[test]
    fn test_detects_formula_on_light_image() {
        let detector = detector_with("E = mc^2");
        let latex = detector.detect(&white_png(100, 40));
        assert_eq!(latex.as_deref(), Some("E = mc^2"));
    }

    #[test]
    fn test_rejects_invalid_bytes() {
        let detector = detector_with("E = mc^2");
        assert_eq!(detector.detect(b"not an image"), None);
    }

    #[test]
    fn test_gate_rejects_tiny_and_huge_images() {
        let detector = detector_with("E = mc^2");
        assert_eq!(detector.detect(&white_png(10, 10)), None);
        assert_eq!(detector.detect(&white_png(2400, 100)), None);
    }

    #[test]
    fn test_gate_rejects_tall_narrow_images() {
        let detector = detector_with("E = mc^2");
        // Aspect 50/400 = 0.125 < 0.3
        assert_eq!(detector.detect(&white_png(50, 400)), None);
    }

    #[test]
    fn test_gate_rejects_dark_images() {
        let detector = detector_with("E = mc^2");
        assert_eq!(detector.detect(&dark_png(100, 40)), None);
    }

    #[test]
    fn test_gate_accepts_grayscale_light_image() {
        let img = image::GrayImage::from_pixel(120, 60, Luma([230]));
        let bytes = encode_png(DynamicImage::ImageLuma8(img));
        let detector = detector_with("\\frac{a}{b}");
        assert_eq!(detector.detect(&bytes).as_deref(), Some("\\frac{a}{b}"));
    }

    #[test]
    fn test_disabled_detector_returns_none() {
        let detector = FormulaDetector::disabled();
        assert_eq!(detector.detect(&white_png(100, 40)), None);
    }

    #[test]
    fn test_acceptance_rules() {
        assert_eq!(accept_latex("  "), None);
        assert_eq!(accept_latex("x"), None); // too short
        assert_eq!(accept_latex("abcdefg"), None); // short, no math chars
        assert_eq!(accept_latex("x = y + z"), Some("x = y + z".to_string()));
        assert_eq!(
            accept_latex("alphabetagamma"), // >= 10 chars passes without math chars
            Some("alphabetagamma".to_string())
        );
        assert_eq!(accept_latex(" a_n \n"), Some("a_n".to_string()));
    }

    #[test]
    fn test_engine_none_result_propagates() {
        let detector = FormulaDetector::new(Arc::new(StubOcr(None)));
        assert_eq!(detector.detect(&white_png(100, 40)), None);
    }

    #[test]
    fn test_unacceptable_ocr_output_rejected() {
        let detector = detector_with("ab"); // 2 chars, no math indicator, < 10
        assert_eq!(detector.detect(&white_png(100, 40)), None);
    }
}
