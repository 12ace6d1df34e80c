//! Lenient JSON extraction from reasoner output
//!
//! Reasoners wrap JSON in prose and code fences more often than not. This
//! tries progressively looser interpretations before giving up.

use serde::de::DeserializeOwned;

pub fn extract_json<T: DeserializeOwned>(response: &str) -> Result<T, String> {
    let trimmed = response.trim();

    // Stage 1: the whole response
    if let Ok(parsed) = serde_json::from_str::<T>(trimmed) {
        return Ok(parsed);
    }

    // Stage 2: contents of a fenced block
    let unfenced = strip_code_fence(trimmed);
    if let Ok(parsed) = serde_json::from_str::<T>(unfenced) {
        return Ok(parsed);
    }

    // Stage 3: first balanced object inside the fenced block, then inside
    // the raw response
    for candidate in [unfenced, trimmed] {
        if let Some(object) = find_json_object(candidate) {
            if let Ok(parsed) = serde_json::from_str::<T>(object) {
                return Ok(parsed);
            }
        }
    }

    Err(format!(
        "No valid JSON in response. Preview: {}...",
        trimmed.chars().take(200).collect::<String>()
    ))
}

/// Body of the first ``` fenced block (any language tag), or the input
fn strip_code_fence(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text;
    };
    let after_open = &text[open + 3..];
    // Skip the language tag line
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_open[body_start..];
    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// First balanced `{ ... }` span, ignoring braces inside string literals
fn find_json_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut start: Option<usize> = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' if start.is_some() => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return start.map(|s| &text[s..=i]);
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
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Digest {
        document_type: String,
        #[serde(default)]
        key_entities: Vec<String>,
    }

    #[test]
    fn test_pure_json() {
        let digest: Digest = extract_json(r#"{"document_type": "invoice", "key_entities": ["AWS"]}"#).unwrap();
        assert_eq!(digest.document_type, "invoice");
        assert_eq!(digest.key_entities, vec!["AWS"]);
    }

    #[test]
    fn test_fenced_block_with_prose() {
        let input = "Here is the digest:\n```json\n{\"document_type\": \"contract\"}\n```\nLet me know.";
        let digest: Digest = extract_json(input).unwrap();
        assert_eq!(digest.document_type, "contract");
    }

    #[test]
    fn test_braces_inside_strings() {
        let input = r#"Result: {"document_type": "template {draft}", "key_entities": ["}"]} trailing"#;
        let digest: Digest = extract_json(input).unwrap();
        assert_eq!(digest.document_type, "template {draft}");
        assert_eq!(digest.key_entities, vec!["}"]);
    }

    #[test]
    fn test_no_json() {
        let err = extract_json::<Digest>("The file looks like a grocery list.").unwrap_err();
        assert!(err.starts_with("No valid JSON"));
    }
}
