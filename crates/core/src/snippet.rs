use std::collections::HashSet;

/// Default cap on quote snippet length, in chars.
pub const MAX_SNIPPET_LEN: usize = 180;

/// Pick the most relevant snippet of `chunk_text` for a statement.
///
/// Slides a `max_len`-char window over the text in steps of 40 and scores
/// each window by how many statement keywords (words longer than 3 chars)
/// it contains; the first best window wins. The result is at most `max_len`
/// chars and is a substring of the input, modulo trimming.
pub fn find_best_snippet(statement: &str, chunk_text: &str, max_len: usize) -> String {
    let chars: Vec<char> = chunk_text.chars().collect();
    if chars.len() <= max_len {
        return chunk_text.to_string();
    }

    let keywords: HashSet<String> = statement
        .split_whitespace()
        .filter(|w| w.chars().count() > 3)
        .map(|w| w.to_lowercase())
        .collect();
    if keywords.is_empty() {
        return chars[..max_len].iter().collect();
    }

    let step = 40;
    let mut best_score = -1i64;
    let mut best_start = 0usize;
    let mut start = 0usize;
    while start + max_len <= chars.len() {
        let window: String = chars[start..start + max_len]
            .iter()
            .collect::<String>()
            .to_lowercase();
        let score = keywords.iter().filter(|kw| window.contains(kw.as_str())).count() as i64;
        if score > best_score {
            best_score = score;
            best_start = start;
        }
        start += step;
    }

    let mut snippet: String = chars[best_start..best_start + max_len].iter().collect();
    // Mid-text windows start mid-word; advance to the next word boundary.
    if best_start > 0 {
        if let Some(space) = snippet.find(' ') {
            if space < 20 {
                snippet = snippet[space + 1..].to_string();
            }
        }
    }
    snippet.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_returned_verbatim() {
        let text = "A short passage.";
        assert_eq!(find_best_snippet("anything", text, 180), text);
    }

    #[test]
    fn test_no_keywords_returns_prefix() {
        let text = "x ".repeat(200);
        let snippet = find_best_snippet("a of to it", &text, 180);
        assert_eq!(snippet.chars().count(), 180);
        assert!(text.starts_with(&snippet));
    }

    #[test]
    fn test_window_lands_on_keyword_region() {
        // 600-char passage with the relevant phrase near offset 300.
        let filler = "lorem ipsum dolor sit amet consectetur adipiscing elit sed do ";
        let mut text = filler.repeat(5); // ~310 chars
        text.truncate(300);
        text.push_str("gradient descent minimizes loss by iterative updates ");
        while text.chars().count() < 600 {
            text.push_str(filler);
        }
        text.truncate(600);

        let snippet = find_best_snippet("gradient descent minimizes loss", &text, 180);
        assert!(snippet.chars().count() <= 180);
        assert!(snippet.contains("gradient descent minimizes loss"));
        assert!(text.contains(snippet.trim()));
    }

    #[test]
    fn test_snippet_is_substring_and_bounded() {
        let text = "alpha beta gamma delta epsilon zeta eta theta ".repeat(20);
        let snippet = find_best_snippet("epsilon theta", &text, 180);
        assert!(snippet.chars().count() <= 180);
        assert!(text.contains(&snippet));
    }

    #[test]
    fn test_word_boundary_alignment() {
        // Force a non-zero window start, then check the snippet does not
        // begin mid-word.
        let text = format!(
            "{}special keyword target sits here {}",
            "padding words repeated again and again ".repeat(10),
            "trailing filler text ".repeat(10)
        );
        let snippet = find_best_snippet("special keyword target", &text, 180);
        assert!(snippet.chars().count() <= 180);
        assert!(!snippet.starts_with(' '));
        assert!(text.contains(&snippet));
    }
}
