use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("fenced block regex")
});

/// Returns the first syntactically valid JSON object in a free-text reply.
///
/// Markdown code fences are tried first, in order; then the whole text is scanned for
/// balanced `{...}` spans. Arrays and scalars are never returned.
pub fn extract_json_object(text: &str) -> Option<Value> {
    for caps in FENCED_BLOCK.captures_iter(text) {
        if let Some(value) = scan_objects(&caps[1]).next() {
            return Some(value);
        }
    }
    scan_objects(text).next()
}

/// Iterates over every balanced `{...}` span in `text` that parses as a JSON object.
fn scan_objects(text: &str) -> impl Iterator<Item = Value> + '_ {
    text.char_indices()
        .filter(|(_, c)| *c == '{')
        .filter_map(move |(start, _)| {
            let end = balanced_end(&text[start..])?;
            match serde_json::from_str::<Value>(&text[start..start + end]) {
                Ok(value @ Value::Object(_)) => Some(value),
                _ => None,
            }
        })
}

/// Byte length of the brace-balanced span at the start of `text`, honouring strings.
fn balanced_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}
