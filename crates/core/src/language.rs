use crate::pdf::ParsedChunk;
use whatlang::Lang;

/// Detect the document language from the first chunks of text.
///
/// Samples the first 500 chars of up to 5 chunks; anything the detector
/// cannot place defaults to `en`.
pub fn detect_language(chunks: &[ParsedChunk]) -> String {
    let sample: String = chunks
        .iter()
        .take(5)
        .map(|c| c.text.chars().take(500).collect::<String>())
        .collect::<Vec<_>>()
        .join(" ");

    if sample.trim().is_empty() {
        return "en".to_string();
    }

    match whatlang::detect(&sample) {
        Some(info) => iso_639_1(info.lang()).to_string(),
        None => "en".to_string(),
    }
}

/// Map a detected language to its ISO 639-1 code. Languages outside the
/// supported set fall back to `en`.
fn iso_639_1(lang: Lang) -> &'static str {
    match lang {
        Lang::Eng => "en",
        Lang::Spa => "es",
        Lang::Fra => "fr",
        Lang::Deu => "de",
        Lang::Por => "pt",
        Lang::Ita => "it",
        Lang::Nld => "nl",
        Lang::Rus => "ru",
        Lang::Cmn => "zh",
        Lang::Jpn => "ja",
        Lang::Kor => "ko",
        Lang::Tha => "th",
        Lang::Ara => "ar",
        Lang::Hin => "hi",
        Lang::Tur => "tr",
        Lang::Vie => "vi",
        Lang::Ind => "id",
        Lang::Pol => "pl",
        Lang::Ukr => "uk",
        Lang::Swe => "sv",
        _ => "en",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> ParsedChunk {
        ParsedChunk {
            chunk_id: "c_0001".to_string(),
            page: 1,
            paragraph_index: 1,
            text: text.to_string(),
            char_start: 0,
            char_end: text.len() as u32,
        }
    }

    #[test]
    fn test_detects_english() {
        let chunks = vec![chunk(
            "Gradient descent is an optimization algorithm that iteratively updates \
             model weights to minimize a differentiable loss function over the data.",
        )];
        assert_eq!(detect_language(&chunks), "en");
    }

    #[test]
    fn test_empty_input_defaults_to_english() {
        assert_eq!(detect_language(&[]), "en");
        assert_eq!(detect_language(&[chunk("   ")]), "en");
    }
}
