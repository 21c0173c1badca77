//! Compiled regular expressions shared across stages

use regex::Regex;
use std::sync::OnceLock;

macro_rules! pattern {
    ($name:ident, $src:expr) => {
        #[allow(clippy::expect_used)]
        pub(crate) fn $name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            RE.get_or_init(|| Regex::new($src).expect("static pattern compiles"))
        }
    };
}

// Column names
pattern!(camel_word, r"(.)([A-Z][a-z]+)");
pattern!(camel_boundary, r"([a-z0-9])([A-Z])");
pattern!(name_separators, r"[^a-z0-9]+");

// Coercion predicates; no leading zeros so identifiers stay text
pattern!(integer_literal, r"^(0|[+-]?[1-9][0-9]*)$");
pattern!(
    float_literal,
    r"^[+-]?(0|[1-9][0-9]*)(\.[0-9]+)?([eE][+-]?[0-9]+)?$"
);
pattern!(iso_date, r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$");

// JSON repair
pattern!(json_control_chars, r"[\x00-\x08\x0B\x0C\x0E-\x1F]");
pattern!(json_trailing_comma, r",\s*([}\]])");
pattern!(json_single_quoted, r#"'([^'"\\]*)'"#);
