//! Complaint-text normalization shared by training and inference.
//!
//! Referral complaints are short, noisy, and mix English with the local
//! language. Cleaning collapses equivalent phrasings onto one token so the
//! classifier vocabulary stays small:
//! 1. lowercase, punctuation → whitespace
//! 2. multi-word phrase substitutions ("kagat ng aso" → "dogbite")
//! 3. single-token synonym/dialect substitutions ("sugat" → "wound")
//! 4. drop tokens shorter than 2 chars and stopwords

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

/// Reserved token for records whose text cleans down to nothing.
pub const NO_SYMPTOM_TOKEN: &str = "no_symptom";

const MIN_TOKEN_LEN: usize = 2;

static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}\s]+").expect("valid punctuation regex"));

/// Phrases replaced before tokenizing. Matched on whole words only.
const PHRASE_SUBSTITUTIONS: &[(&str, &str)] = &[
    ("kinagat ng aso", "dogbite"),
    ("kagat ng aso", "dogbite"),
    ("nakagat ng aso", "dogbite"),
    ("dog bite", "dogbite"),
    ("bitten by dog", "dogbite"),
    ("bitten by a dog", "dogbite"),
    ("kagat ng pusa", "catbite"),
    ("nakagat ng pusa", "catbite"),
    ("cat bite", "catbite"),
    ("cat scratch", "catbite"),
    ("kalmot ng pusa", "catbite"),
    ("animal bite", "animalbite"),
    ("sakit ng ulo", "headache"),
    ("masakit ang ulo", "headache"),
    ("head ache", "headache"),
    ("sakit ng tiyan", "abdominalpain"),
    ("masakit ang tiyan", "abdominalpain"),
    ("stomach ache", "abdominalpain"),
    ("abdominal pain", "abdominalpain"),
    ("sore throat", "sorethroat"),
    ("masakit ang lalamunan", "sorethroat"),
    ("hirap huminga", "dyspnea"),
    ("hirap sa paghinga", "dyspnea"),
    ("shortness of breath", "dyspnea"),
    ("difficulty breathing", "dyspnea"),
    ("high blood", "hypertension"),
    ("mataas ang presyon", "hypertension"),
    ("loose bowel movement", "diarrhea"),
    ("loose bowel", "diarrhea"),
];

/// Single-token synonyms and dialect terms.
const TOKEN_SUBSTITUTIONS: &[(&str, &str)] = &[
    ("lagnat", "fever"),
    ("nilalagnat", "fever"),
    ("febrile", "fever"),
    ("sinat", "fever"),
    ("ubo", "cough"),
    ("inuubo", "cough"),
    ("coughing", "cough"),
    ("sipon", "colds"),
    ("sinisipon", "colds"),
    ("cold", "colds"),
    ("sugat", "wound"),
    ("nasugatan", "wound"),
    ("wounds", "wound"),
    ("hiwa", "wound"),
    ("nahiwa", "wound"),
    ("cut", "wound"),
    ("laceration", "wound"),
    ("lacerated", "wound"),
    ("tusok", "wound"),
    ("natusok", "wound"),
    ("puncture", "wound"),
    ("punctured", "wound"),
    ("galos", "abrasion"),
    ("gasgas", "abrasion"),
    ("kagat", "bite"),
    ("nakagat", "bite"),
    ("kinagat", "bite"),
    ("bitten", "bite"),
    ("aso", "dog"),
    ("tuta", "dog"),
    ("pusa", "cat"),
    ("dugo", "bleeding"),
    ("dumudugo", "bleeding"),
    ("bleed", "bleeding"),
    ("pagtatae", "diarrhea"),
    ("nagtatae", "diarrhea"),
    ("lbm", "diarrhea"),
    ("diarrhoea", "diarrhea"),
    ("suka", "vomiting"),
    ("nagsusuka", "vomiting"),
    ("vomit", "vomiting"),
    ("hilo", "dizziness"),
    ("nahihilo", "dizziness"),
    ("dizzy", "dizziness"),
    ("sakit", "pain"),
    ("masakit", "pain"),
    ("painful", "pain"),
    ("binti", "leg"),
    ("paa", "foot"),
    ("kamay", "hand"),
    ("braso", "arm"),
    ("ulo", "head"),
    ("tiyan", "abdomen"),
    ("stomach", "abdomen"),
    ("dibdib", "chest"),
    ("hika", "asthma"),
    ("hingal", "dyspnea"),
    ("pantal", "rash"),
    ("kati", "itch"),
    ("makati", "itch"),
];

/// English and local-language words that carry no clinical signal.
const STOPWORDS: &[&str] = &[
    // English
    "an", "and", "are", "as", "at", "by", "for", "from", "has", "have", "he", "her", "his",
    "in", "is", "it", "of", "on", "or", "patient", "pt", "she", "since", "the", "to", "was",
    "with",
    // Local
    "ako", "ang", "ay", "daw", "din", "ito", "kanyang", "ko", "mga", "may", "na",
    "nang", "ng", "ni", "niya", "pa", "po", "rin", "sa", "si", "siya", "yung",
];

/// Lowercase and strip punctuation, without any substitution.
pub fn raw_tokens(text: &str) -> Vec<String> {
    PUNCTUATION
        .replace_all(&text.to_lowercase(), " ")
        .split_whitespace()
        .map(String::from)
        .collect()
}

/// Phrases split into words, longest first so "loose bowel movement" wins
/// over "loose bowel" at the same position.
static PHRASE_WORDS: LazyLock<Vec<(Vec<&'static str>, &'static str)>> = LazyLock::new(|| {
    let mut phrases: Vec<_> = PHRASE_SUBSTITUTIONS
        .iter()
        .map(|(phrase, replacement)| (phrase.split_whitespace().collect::<Vec<_>>(), *replacement))
        .collect();
    phrases.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    phrases
});

/// Left-to-right scan; a matched phrase consumes its words and emits one token.
fn apply_phrases(tokens: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        let window = &tokens[i..];
        let matched = PHRASE_WORDS.iter().find(|(words, _)| {
            words.len() <= window.len()
                && words.iter().zip(window).all(|(w, t)| *w == t.as_str())
        });
        match matched {
            Some((words, replacement)) => {
                out.push((*replacement).to_string());
                i += words.len();
            }
            None => {
                out.push(tokens[i].clone());
                i += 1;
            }
        }
    }
    out
}

fn substitute(token: &str) -> &str {
    TOKEN_SUBSTITUTIONS
        .iter()
        .find(|(from, _)| *from == token)
        .map(|(_, to)| *to)
        .unwrap_or(token)
}

fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// Cleaned token sequence, in text order, duplicates kept.
pub fn clean_tokens(text: &str) -> Vec<String> {
    apply_phrases(raw_tokens(text))
        .iter()
        .map(|t| substitute(t))
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN && !is_stopword(t))
        .map(String::from)
        .collect()
}

/// Cleaned token set; never empty.
pub fn token_set(text: &str, fallback: &str) -> BTreeSet<String> {
    let mut tokens: BTreeSet<String> = clean_tokens(text).into_iter().collect();
    if tokens.is_empty() {
        tokens.insert(fallback.to_string());
    }
    tokens
}

/// True when any keyword appears as a whole word, before or after substitution.
pub fn contains_keyword(text: &str, keywords: &[String]) -> bool {
    if keywords.is_empty() {
        return false;
    }
    let raw = raw_tokens(text);
    let cleaned = clean_tokens(text);
    raw.iter()
        .chain(cleaned.iter())
        .any(|token| keywords.iter().any(|k| k.eq_ignore_ascii_case(token)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(text: &str) -> Vec<String> {
        token_set(text, NO_SYMPTOM_TOKEN).into_iter().collect()
    }

    #[test]
    fn local_wound_phrase_maps_to_english_tokens() {
        assert_eq!(set("may sugat sa binti"), vec!["leg", "wound"]);
    }

    #[test]
    fn punctuation_becomes_whitespace() {
        assert_eq!(raw_tokens("Fever,cough!!  (3 days)"), vec!["fever", "cough", "3", "days"]);
    }

    #[test]
    fn dialect_synonyms_collapse() {
        assert_eq!(set("Nilalagnat at inuubo"), vec!["cough", "fever"]);
        assert_eq!(set("lagnat, ubo"), set("fever cough"));
    }

    #[test]
    fn phrase_substitution_beats_token_substitution() {
        assert_eq!(set("kinagat ng aso kahapon"), vec!["dogbite", "kahapon"]);
        assert_eq!(set("Dog bite on hand"), vec!["dogbite", "hand"]);
    }

    #[test]
    fn phrases_match_whole_words_only() {
        // "xdog bite" must not trigger the "dog bite" phrase
        assert_eq!(set("xdog bite"), vec!["bite", "xdog"]);
    }

    #[test]
    fn repeated_phrases_each_collapse() {
        assert_eq!(clean_tokens("dog bite dog bite"), vec!["dogbite", "dogbite"]);
        assert_eq!(clean_tokens("kagat ng aso, kagat ng aso"), vec!["dogbite", "dogbite"]);
        assert_eq!(clean_tokens("dog dog bite"), vec!["dog", "dogbite"]);
    }

    #[test]
    fn longer_phrase_wins_at_same_position() {
        assert_eq!(clean_tokens("loose bowel movement"), vec!["diarrhea"]);
        assert_eq!(clean_tokens("loose bowel"), vec!["diarrhea"]);
    }

    #[test]
    fn short_tokens_and_stopwords_are_dropped() {
        assert_eq!(clean_tokens("a pain in the leg x"), vec!["pain", "leg"]);
    }

    #[test]
    fn empty_text_yields_fallback_token() {
        assert_eq!(set(""), vec![NO_SYMPTOM_TOKEN]);
        assert_eq!(set("sa ng ang ... !"), vec![NO_SYMPTOM_TOKEN]);
    }

    #[test]
    fn keyword_match_sees_raw_and_cleaned_tokens() {
        let keywords = vec!["laceration".to_string(), "sugat".to_string()];
        assert!(contains_keyword("Laceration on left leg", &keywords));
        assert!(contains_keyword("may sugat sa binti", &keywords));
        assert!(!contains_keyword("pain in left leg", &keywords));
        // "wound" only appears after substitution of "hiwa"
        assert!(contains_keyword("hiwa sa kamay", &["wound".to_string()]));
    }

    #[test]
    fn keyword_match_is_whole_word() {
        assert!(!contains_keyword("acute cough", &["cut".to_string()]));
    }
}
