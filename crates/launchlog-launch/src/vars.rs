use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

static VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:\{(?P<braced>[A-Za-z_][A-Za-z0-9_]*)\}|(?P<bare>[A-Za-z_][A-Za-z0-9_]*))")
        .expect("static regex is valid")
});

/// Replace `$NAME` and `${NAME}` with values from `env`.
///
/// Unknown names and names with an empty value are left as written.
pub fn expand_variables(input: &str, env: &HashMap<String, String>) -> String {
    VARIABLE
        .replace_all(input, |caps: &Captures<'_>| {
            let name = caps
                .name("braced")
                .or_else(|| caps.name("bare"))
                .map_or("", |m| m.as_str());
            match env.get(name) {
                Some(value) if !value.is_empty() => value.clone(),
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}
