use crate::llm::FactCandidate;

/// Token-sort similarity in [0, 100]: whitespace-normalized, token-sorted
/// Levenshtein ratio of the two strings.
pub fn token_sort_ratio(a: &str, b: &str) -> u32 {
    let sort_tokens = |s: &str| {
        let mut tokens: Vec<&str> = s.split_whitespace().collect();
        tokens.sort_unstable();
        tokens.join(" ")
    };
    let (a, b) = (sort_tokens(a), sort_tokens(b));
    if a.is_empty() && b.is_empty() {
        return 100;
    }
    (strsim::normalized_levenshtein(&a, &b) * 100.0).round() as u32
}

/// Merge semantically near-duplicate facts, preserving input order for kept
/// items. A duplicate replaces the kept entry (in place) only when its
/// importance is strictly higher.
pub fn fuzzy_dedupe(facts: Vec<FactCandidate>, threshold: u32) -> Vec<FactCandidate> {
    let mut kept: Vec<FactCandidate> = Vec::new();
    let mut kept_lower: Vec<String> = Vec::new();
    let mut kept_lengths: Vec<usize> = Vec::new();
    // If lengths differ too much, token_sort_ratio cannot reach the threshold.
    let max_len_ratio = threshold as f64 / 100.0;

    for fact in facts {
        let f_lower = fact.statement.to_lowercase();
        let f_len = f_lower.chars().count();
        let mut is_dup = false;
        let mut replace_at: Option<usize> = None;

        for i in 0..kept.len() {
            let e_len = kept_lengths[i];
            if e_len > 0 && f_len > 0 {
                let len_ratio = f_len.min(e_len) as f64 / f_len.max(e_len) as f64;
                if len_ratio < max_len_ratio {
                    continue;
                }
            }
            if token_sort_ratio(&f_lower, &kept_lower[i]) >= threshold {
                is_dup = true;
                if fact.importance > kept[i].importance {
                    replace_at = Some(i);
                }
                break;
            }
        }

        if let Some(i) = replace_at {
            kept[i] = fact;
            kept_lower[i] = f_lower;
            kept_lengths[i] = f_len;
        } else if !is_dup {
            kept.push(fact);
            kept_lower.push(f_lower);
            kept_lengths.push(f_len);
        }
    }

    kept
}
