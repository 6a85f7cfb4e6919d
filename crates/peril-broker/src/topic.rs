//! Topic-exchange binding key matching.

/// Returns `true` if `routing_key` matches the topic `binding_key`.
///
/// Both keys are dot-separated words. In the binding key `*` matches
/// exactly one word and `#` matches zero or more words.
pub fn topic_matches(binding_key: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = binding_key.split('.').collect();
    let words: Vec<&str> = routing_key.split('.').collect();
    match_words(&pattern, &words)
}

fn match_words(pattern: &[&str], words: &[&str]) -> bool {
    match pattern.split_first() {
        None => words.is_empty(),
        Some((&"#", rest)) => {
            // `#` swallows 0..=len words.
            (0..=words.len()).any(|skip| match_words(rest, &words[skip..]))
        }
        Some((&"*", rest)) => !words.is_empty() && match_words(rest, &words[1..]),
        Some((literal, rest)) => {
            words.first() == Some(literal) && match_words(rest, &words[1..])
        }
    }
}
