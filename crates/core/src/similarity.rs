//! Text similarity helpers for library matching and RSS screening.

/// Normalize a string for comparison: lowercase, alphanumeric words only.
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Levenshtein edit distance between two strings.
fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let a_len = a_chars.len();
    let b_len = b_chars.len();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut matrix = vec![vec![0usize; b_len + 1]; a_len + 1];

    for (i, row) in matrix.iter_mut().enumerate().take(a_len + 1) {
        row[0] = i;
    }
    for (j, val) in matrix[0].iter_mut().enumerate().take(b_len + 1) {
        *val = j;
    }

    for (i, a_char) in a_chars.iter().enumerate() {
        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = if *a_char == *b_char { 0 } else { 1 };
            matrix[i + 1][j + 1] = (matrix[i][j + 1] + 1)
                .min(matrix[i + 1][j] + 1)
                .min(matrix[i][j] + cost);
        }
    }

    matrix[a_len][b_len]
}

/// Similarity in [0, 1]: 1.0 for equal normalized strings, scaled by edit
/// distance otherwise.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    let distance = levenshtein_distance(&a, &b);
    1.0 - (distance as f64 / max_len as f64)
}

/// Weighted title/author score used for library matching.
pub fn match_score(title_a: &str, title_b: &str, author_a: &str, author_b: &str) -> f64 {
    0.7 * similarity(title_a, title_b) + 0.3 * similarity(author_a, author_b)
}

/// Words of at least `min_len` characters, lowercased.
fn significant_words(text: &str, min_len: usize) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= min_len)
        .map(|w| w.to_string())
        .collect()
}

/// Weak fuzzy screen for RSS items: the item title must contain at least one
/// author word of three-plus characters AND at least two of the first three
/// three-plus-character title words.
pub fn rss_item_matches(item_title: &str, author: &str, title: &str) -> bool {
    let haystack = item_title.to_lowercase();

    let author_words = significant_words(author, 3);
    if author_words.is_empty() {
        return false;
    }
    let author_hit = author_words.iter().any(|w| haystack.contains(w.as_str()));
    if !author_hit {
        return false;
    }

    let title_words: Vec<String> = significant_words(title, 3).into_iter().take(3).collect();
    if title_words.is_empty() {
        return false;
    }
    let title_hits = title_words
        .iter()
        .filter(|w| haystack.contains(w.as_str()))
        .count();

    title_hits >= 2.min(title_words.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_similarity_identical() {
        assert!((similarity("The Name of the Wind", "The Name of the Wind") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_similarity_case_and_punctuation_insensitive() {
        assert!((similarity("Mistborn: The Final Empire", "mistborn the final empire") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_similarity_disjoint_is_low() {
        assert!(similarity("The Name of the Wind", "Project Hail Mary") < 0.4);
    }

    #[test]
    fn test_match_score_weights_title_over_author() {
        let title_only = match_score("Mistborn", "Mistborn", "A", "Z");
        let author_only = match_score("A", "Z", "Brandon Sanderson", "Brandon Sanderson");
        assert!(title_only > author_only);
    }

    #[test]
    fn test_rss_item_matches_typical_release_name() {
        assert!(rss_item_matches(
            "Brandon Sanderson - Mistborn - The Final Empire [unabridged]",
            "Brandon Sanderson",
            "The Final Empire",
        ));
    }

    #[test]
    fn test_rss_item_requires_author_word() {
        assert!(!rss_item_matches(
            "The Final Empire [unabridged]",
            "Brandon Sanderson",
            "The Final Empire",
        ));
    }

    #[test]
    fn test_rss_item_requires_two_title_words() {
        assert!(!rss_item_matches(
            "Brandon Sanderson - Warbreaker",
            "Brandon Sanderson",
            "The Final Empire",
        ));
    }

    #[test]
    fn test_rss_item_single_long_title_word() {
        // Only one significant title word exists, so one hit is enough.
        assert!(rss_item_matches(
            "Brandon Sanderson - Elantris (2005)",
            "Brandon Sanderson",
            "Elantris",
        ));
    }
}
