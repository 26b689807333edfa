//! Lenient parsing of model completions.
//!
//! Models wrap JSON in prose, markdown fences, or stray trailing text. We
//! locate the first balanced JSON array (or object) with a string-aware scan
//! and map loosely-keyed records onto candidate entries. Anything
//! unparseable yields an empty vector, never an error.

use serde_json::Value;

use crate::pipeline::types::{CandidateEntry, EntryProvenance};

/// Key aliases models actually produce, checked in order.
const TERM_KEYS: [&str; 5] = ["term", "word", "front", "question", "name"];
const MEANING_KEYS: [&str; 6] = ["meaning", "definition", "back", "answer", "translation", "description"];
const EXAMPLE_KEYS: [&str; 4] = ["example", "sample", "sentence", "usage"];

/// Parse candidate entries out of a raw model completion.
pub fn parse_entries(raw: &str) -> Vec<CandidateEntry> {
    let cleaned = strip_fences(raw);

    let value = match first_balanced(cleaned, '[', ']')
        .and_then(|s| serde_json::from_str::<Value>(s).ok())
    {
        Some(v) => v,
        None => match first_balanced(cleaned, '{', '}')
            .and_then(|s| serde_json::from_str::<Value>(s).ok())
        {
            Some(v) => v,
            None => return Vec::new(),
        },
    };

    let items: Vec<&Value> = match &value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => {
            // Single-entry object, or a wrapper like {"entries": [...]}.
            if let Some(Value::Array(items)) = map
                .get("entries")
                .or_else(|| map.get("pairs"))
                .or_else(|| map.get("cards"))
            {
                items.iter().collect()
            } else {
                vec![&value]
            }
        }
        _ => return Vec::new(),
    };

    items.iter().filter_map(|item| entry_from(item)).collect()
}

fn entry_from(value: &Value) -> Option<CandidateEntry> {
    let obj = value.as_object()?;
    let term = pick_string(obj, &TERM_KEYS)?;
    let meaning = pick_string(obj, &MEANING_KEYS)?;
    let example = EXAMPLE_KEYS
        .iter()
        .find_map(|k| obj.get(*k).and_then(|v| v.as_str()))
        .filter(|s| !s.trim().is_empty());
    CandidateEntry::new(&term, &meaning, example, EntryProvenance::Ai)
}

fn pick_string(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| {
        obj.get(*k).and_then(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    })
}

/// Drop markdown code fences so the balance scan sees raw JSON.
fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the optional language tag on the opening fence.
    let inner = inner.split_once('\n').map_or(inner, |(_, rest)| rest);
    inner.rsplit_once("```").map_or(inner, |(body, _)| body).trim()
}

/// First balanced `open..close` span, ignoring brackets inside JSON strings.
fn first_balanced(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_array_parses() {
        let raw = r#"[{"term":"osmosis","meaning":"diffusion of water"}]"#;
        let entries = parse_entries(raw);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].term, "osmosis");
        assert_eq!(entries[0].provenance, EntryProvenance::Ai);
    }

    #[test]
    fn array_inside_prose_and_fences() {
        let raw = "Sure! Here are the extracted pairs:\n```json\n[{\"term\":\"gravity\",\"meaning\":\"attractive force\"}]\n```\nLet me know if you need more.";
        let entries = parse_entries(raw);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].term, "gravity");
    }

    #[test]
    fn alternative_key_names_accepted() {
        let raw = r#"[{"word":"la casa","translation":"the house","sentence":"La casa es grande."}]"#;
        let entries = parse_entries(raw);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].term, "la casa");
        assert_eq!(entries[0].meaning, "the house");
        assert_eq!(entries[0].example.as_deref(), Some("La casa es grande."));
    }

    #[test]
    fn brackets_inside_strings_do_not_break_the_scan() {
        let raw = r#"noise [{"term":"array","meaning":"ordered [indexed] collection"}] trailing"#;
        let entries = parse_entries(raw);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].meaning, "ordered [indexed] collection");
    }

    #[test]
    fn wrapper_object_unwrapped() {
        let raw = r#"{"entries":[{"term":"mitosis","meaning":"cell division"}]}"#;
        assert_eq!(parse_entries(raw).len(), 1);
    }

    #[test]
    fn single_object_becomes_one_entry() {
        let raw = r#"{"term":"enzyme","meaning":"biological catalyst"}"#;
        assert_eq!(parse_entries(raw).len(), 1);
    }

    #[test]
    fn records_missing_meaning_are_dropped() {
        let raw = r#"[{"term":"orphan"},{"term":"kept","meaning":"has both"}]"#;
        let entries = parse_entries(raw);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].term, "kept");
    }

    #[test]
    fn unparseable_text_yields_empty() {
        assert!(parse_entries("I could not find any term pairs.").is_empty());
        assert!(parse_entries("").is_empty());
        assert!(parse_entries("[{broken json").is_empty());
    }

    #[test]
    fn numeric_values_are_stringified() {
        let raw = r#"[{"term":"pi","meaning":3.14159}]"#;
        let entries = parse_entries(raw);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].meaning, "3.14159");
    }
}
