//! Column-name normalization

use crate::patterns::{camel_boundary, camel_word, name_separators};
use std::collections::HashSet;

/// Normalize one column name to lowercase snake case.
///
/// `"Order ID"` becomes `order_id`, `"customerName"` becomes `customer_name`.
/// Empty names become `unnamed`; names starting with a digit get a `_` prefix.
pub fn normalize_column_name(raw: &str) -> String {
    let expanded = camel_word().replace_all(raw.trim(), "${1}_${2}");
    let expanded = camel_boundary().replace_all(&expanded, "${1}_${2}");
    let lowered = expanded.to_lowercase();
    let snake = name_separators().replace_all(&lowered, "_");
    let name = snake.trim_matches('_');

    if name.is_empty() {
        "unnamed".to_string()
    } else if name.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{}", name)
    } else {
        name.to_string()
    }
}

/// Normalize a full header, disambiguating collisions with `_1`, `_2`, ...
///
/// A generated suffix never reuses a name that appears anywhere in the
/// header, so `["a", "a", "a_1"]` becomes `["a", "a_2", "a_1"]`.
pub fn normalize_columns<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let normalized: Vec<String> = raw.iter().map(|r| normalize_column_name(r.as_ref())).collect();
    dedupe_names(normalized)
}

/// Make a list of already-normalized names unique
pub fn dedupe_names(names: Vec<String>) -> Vec<String> {
    let reserved: HashSet<String> = names.iter().cloned().collect();
    let mut used: HashSet<String> = HashSet::with_capacity(names.len());
    let mut out = Vec::with_capacity(names.len());

    for name in names {
        if used.insert(name.clone()) {
            out.push(name);
            continue;
        }
        let mut suffix = 1usize;
        let unique = loop {
            let candidate = format!("{}_{}", name, suffix);
            if !reserved.contains(&candidate) && !used.contains(&candidate) {
                break candidate;
            }
            suffix += 1;
        };
        used.insert(unique.clone());
        out.push(unique);
    }

    out
}
