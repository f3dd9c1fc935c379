use regex::{Captures, Regex};
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("placeholder regex")
});

/// Expands `${VAR}` and `${VAR:-default}` placeholders.
///
/// `lookup` resolves a variable name. A placeholder whose variable is unknown and that
/// has no default is left verbatim, so validation can report it by name.
pub fn expand_env_placeholders<F>(text: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    PLACEHOLDER
        .replace_all(text, |caps: &Captures| {
            let name = &caps[1];
            match lookup(name) {
                Some(value) => value,
                None => match caps.get(2) {
                    Some(default) => default.as_str().to_string(),
                    None => caps[0].to_string(),
                },
            }
        })
        .into_owned()
}

/// Names of the placeholders still present in `text`.
pub fn unresolved_placeholders(text: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Resolves against the process environment.
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}
