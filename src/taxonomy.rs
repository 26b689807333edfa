//! Static keyword knowledge used across the filter, profiler, and quality
//! gate. Read-only data, no I/O.

use std::collections::HashSet;

use once_cell::sync::Lazy;

/// Particles that close an English phrasal verb.
pub const PHRASAL_PARTICLES: [&str; 14] = [
    "up", "down", "out", "off", "in", "on", "away", "back", "over", "through", "along", "around",
    "about", "across",
];

/// Articles that mark gendered-noun vocabulary lines.
pub const GENDER_ARTICLES: [&str; 16] = [
    "der", "die", "das", "ein", "eine", "le", "la", "les", "un", "une", "el", "los", "las", "il",
    "lo", "gli",
];

/// Keywords that mark a history-topic entry.
pub const HISTORY_KEYWORDS: [&str; 14] = [
    "war", "revolution", "treaty", "empire", "dynasty", "battle", "century", "king", "queen",
    "independence", "colony", "monarchy", "republic", "reform",
];

/// Phrases that mark scanned boilerplate rather than study content.
pub const BOILERPLATE_PHRASES: [&str; 6] = [
    "all rights reserved",
    "table of contents",
    "copyright",
    "isbn",
    "printed in",
    "www.",
];

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "the", "of", "and", "or", "to", "in", "on", "for", "with", "is", "are", "be",
        "that", "this", "it", "as", "at", "by", "from", "only", "all", "any", "each", "every",
        "please", "give", "me", "keep", "just", "want", "i", "extract", "find", "include",
        "entries", "terms", "words", "pairs",
    ]
    .into_iter()
    .collect()
});

/// Subject keyword sets for tagging entries by topic.
pub static SUBJECT_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "biology",
        &[
            "cell", "organism", "photosynthesis", "mitosis", "enzyme", "protein", "dna",
            "membrane", "species", "gene",
        ],
    ),
    (
        "chemistry",
        &[
            "atom", "molecule", "reaction", "element", "compound", "acid", "base", "ion",
            "electron", "bond",
        ],
    ),
    (
        "physics",
        &[
            "force", "energy", "velocity", "gravity", "mass", "momentum", "wave", "particle",
            "field", "charge",
        ],
    ),
    (
        "history",
        &[
            "war", "revolution", "treaty", "empire", "dynasty", "century", "independence",
            "monarchy", "colony", "reform",
        ],
    ),
    (
        "geography",
        &[
            "continent", "climate", "river", "mountain", "plateau", "ocean", "latitude",
            "population", "region", "plate",
        ],
    ),
];

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(word)
}

/// Lower-cased alphanumeric tokens with stop words removed.
pub fn content_words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 2 && !is_stop_word(w))
        .map(str::to_string)
        .collect()
}

/// Count how many of `keywords` occur in `text` (case-insensitive).
pub fn keyword_hits(text: &str, keywords: &[&str]) -> usize {
    let lowered = text.to_lowercase();
    let words: HashSet<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    keywords.iter().filter(|k| words.contains(**k)).count()
}

/// Best-guess subject for a blob of entry text; None when nothing stands out.
pub fn infer_subject(text: &str) -> Option<&'static str> {
    SUBJECT_KEYWORDS
        .iter()
        .map(|(subject, keywords)| (*subject, keyword_hits(text, keywords)))
        .filter(|(_, hits)| *hits >= 2)
        .max_by_key(|(_, hits)| *hits)
        .map(|(subject, _)| subject)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_words_drop_stop_words() {
        let words = content_words("give me only the phrasal verbs");
        assert_eq!(words, vec!["phrasal", "verbs"]);
    }

    #[test]
    fn keyword_hits_are_word_bounded() {
        assert_eq!(keyword_hits("the warbler sang", &["war"]), 0);
        assert_eq!(keyword_hits("the war ended in 1918", &["war"]), 1);
    }

    #[test]
    fn subject_inferred_from_repeated_hits() {
        let text = "the cell membrane regulates what enters the cell; enzymes speed reactions";
        assert_eq!(infer_subject(text), Some("biology"));
    }

    #[test]
    fn no_subject_below_hit_floor() {
        assert_eq!(infer_subject("la casa es grande"), None);
    }
}
