//! Parse strategy selection for delimited text
//!
//! Candidates are the cross product of inferred delimiters, quote styles and
//! header presence. Each (delimiter, quote) pair is parsed once over a sample
//! and scored by:
//!
//! 1. rows whose width differs from the first row
//! 2. values that do not conform to their column's majority type
//! 3. header presence (present wins ties)
//! 4. declaration order
//!
//! Header presence comes from a column-consistency heuristic, then from an
//! optional [`HeaderClassifier`] when the heuristic cannot decide, and finally
//! from the score itself.

use crate::coerce::{is_blank, is_boolean_literal, is_date_literal, is_float_literal};
use crate::error::{RepairError, Result};
use crate::format::FileFormat;
use crate::load::read_records;
use crate::pipeline::RepairConfig;
use serde::Serialize;
use std::collections::HashMap;

/// Delimiters always tried after the frequency-ranked ones
const COMMON_DELIMITERS: [char; 4] = [',', '\t', ';', '|'];

/// Rows kept per trial for header detection
const HEADER_PROBE_ROWS: usize = 21;

/// Quote and escape convention of a delimited file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStyle {
    /// `"a ""b"""`
    DoubleQuote,
    /// `"a \"b\""`
    BackslashEscape,
    /// `'a ''b'''`
    SingleQuote,
    /// Quotes are ordinary characters
    None,
}

impl QuoteStyle {
    /// Declaration order, which is also tie-break priority
    pub const ALL: [QuoteStyle; 4] = [
        QuoteStyle::DoubleQuote,
        QuoteStyle::BackslashEscape,
        QuoteStyle::SingleQuote,
        QuoteStyle::None,
    ];

    pub fn quote_char(&self) -> Option<char> {
        match self {
            QuoteStyle::DoubleQuote | QuoteStyle::BackslashEscape => Some('"'),
            QuoteStyle::SingleQuote => Some('\''),
            QuoteStyle::None => None,
        }
    }

    pub fn escape_char(&self) -> Option<char> {
        match self {
            QuoteStyle::DoubleQuote => Some('"'),
            QuoteStyle::BackslashEscape => Some('\\'),
            QuoteStyle::SingleQuote => Some('\''),
            QuoteStyle::None => None,
        }
    }
}

/// The selected way to read a delimited file. Immutable once chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParseStrategy {
    pub delimiter: char,
    pub quote: QuoteStyle,
    pub has_header: bool,
}

impl ParseStrategy {
    pub fn new(delimiter: char, quote: QuoteStyle, has_header: bool) -> Self {
        Self {
            delimiter,
            quote,
            has_header,
        }
    }

    pub fn quote_char(&self) -> Option<char> {
        self.quote.quote_char()
    }

    pub fn escape_char(&self) -> Option<char> {
        self.quote.escape_char()
    }
}

/// Decides whether the first sampled row is a header.
///
/// Consulted only when the column heuristic is ambiguous. Implementations
/// may call an external service; an `Err` falls back to scoring.
pub trait HeaderClassifier: Send + Sync {
    fn classify_header(&self, sample_rows: &[Vec<String>]) -> anyhow::Result<bool>;
}

/// Deterministic classifier that always returns the same answer
#[derive(Debug, Clone, Copy)]
pub struct StaticHeaderClassifier {
    has_header: bool,
}

impl StaticHeaderClassifier {
    pub fn new(has_header: bool) -> Self {
        Self { has_header }
    }
}

impl HeaderClassifier for StaticHeaderClassifier {
    fn classify_header(&self, _sample_rows: &[Vec<String>]) -> anyhow::Result<bool> {
        Ok(self.has_header)
    }
}

/// Outcome of the column-consistency header heuristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderVerdict {
    Present,
    Absent,
    Ambiguous,
}

/// Result of strategy selection
#[derive(Debug, Clone, Serialize)]
pub struct StrategySelection {
    pub strategy: ParseStrategy,
    /// Share of sampled data rows whose width differs from the header
    pub overflow_rate: f64,
    pub candidates_scored: usize,
    pub header_verdict: HeaderVerdict,
    pub classifier_consulted: bool,
}

/// One parsed (delimiter, quote) pair
struct Trial {
    delimiter: char,
    quote: QuoteStyle,
    order: usize,
    width: usize,
    row_count: usize,
    mismatches: usize,
    cast_failures_with_header: usize,
    cast_failures_without_header: usize,
    head: Vec<Vec<String>>,
}

impl Trial {
    fn cast_failures(&self, has_header: bool) -> usize {
        if has_header {
            self.cast_failures_with_header
        } else {
            self.cast_failures_without_header
        }
    }

    fn overflow_rate(&self, has_header: bool) -> f64 {
        let data_rows = if has_header {
            self.row_count.saturating_sub(1)
        } else {
            self.row_count
        };
        if data_rows == 0 {
            0.0
        } else {
            self.mismatches as f64 / data_rows as f64
        }
    }
}

/// Choose the parse strategy for delimited text.
pub fn select_strategy(
    text: &str,
    format: FileFormat,
    config: &RepairConfig,
    classifier: Option<&dyn HeaderClassifier>,
) -> Result<StrategySelection> {
    let sample = sample_text(text, config.sample_bytes);
    let delimiters = delimiter_candidates(sample, format, config.max_delimiter_candidates);

    let mut trials = Vec::with_capacity(delimiters.len() * QuoteStyle::ALL.len());
    for &delimiter in &delimiters {
        for quote in QuoteStyle::ALL {
            let rows = read_records(sample, delimiter, quote)?;
            if rows.is_empty() {
                continue;
            }
            let width = rows[0].len();
            let mismatches = rows[1..].iter().filter(|r| r.len() != width).count();
            let trial = Trial {
                delimiter,
                quote,
                order: trials.len(),
                width,
                row_count: rows.len(),
                mismatches,
                cast_failures_with_header: cast_failures(&rows[1..], width, &config.null_sentinels),
                cast_failures_without_header: cast_failures(&rows, width, &config.null_sentinels),
                head: rows.into_iter().take(HEADER_PROBE_ROWS).collect(),
            };
            trials.push(trial);
        }
    }

    // A delimiter that never splits a row is only viable for single-column files
    if trials.iter().any(|t| t.width > 1) {
        trials.retain(|t| t.width > 1);
    }

    let best_pair = trials
        .iter()
        .min_by_key(|t| {
            (
                t.mismatches,
                t.cast_failures_with_header.min(t.cast_failures_without_header),
                t.order,
            )
        })
        .ok_or(RepairError::EmptyFile)?;

    let header_verdict = detect_header(&best_pair.head, &config.null_sentinels);
    let mut classifier_consulted = false;
    let forced_header = match header_verdict {
        HeaderVerdict::Present => Some(true),
        HeaderVerdict::Absent => Some(false),
        HeaderVerdict::Ambiguous => match classifier {
            Some(classifier) => {
                classifier_consulted = true;
                let sample_len = config.header_sample_rows.min(best_pair.head.len());
                match classifier.classify_header(&best_pair.head[..sample_len]) {
                    Ok(has_header) => Some(has_header),
                    Err(e) => {
                        tracing::warn!(error = %e, "Header classifier failed, falling back to scoring");
                        None
                    },
                }
            },
            None => None,
        },
    };

    let header_options: &[bool] = match forced_header {
        Some(true) => &[true],
        Some(false) => &[false],
        None => &[true, false],
    };

    let candidates_scored = trials.len() * header_options.len();
    let (winner, has_header) = trials
        .iter()
        .flat_map(|t| header_options.iter().map(move |&h| (t, h)))
        .min_by_key(|(t, h)| (t.mismatches, t.cast_failures(*h), !*h, t.order))
        .ok_or(RepairError::EmptyFile)?;

    let overflow_rate = winner.overflow_rate(has_header);
    if overflow_rate > config.max_overflow_rate {
        return Err(RepairError::ParseAmbiguous {
            candidates: candidates_scored,
            best_rate: overflow_rate,
            max_rate: config.max_overflow_rate,
        });
    }

    let strategy = ParseStrategy::new(winner.delimiter, winner.quote, has_header);
    tracing::debug!(
        delimiter = ?strategy.delimiter,
        quote = ?strategy.quote,
        has_header = strategy.has_header,
        overflow_rate,
        candidates_scored,
        "Selected parse strategy"
    );

    Ok(StrategySelection {
        strategy,
        overflow_rate,
        candidates_scored,
        header_verdict,
        classifier_consulted,
    })
}

/// Leading part of `text` no longer than `limit` bytes, cut at a line end.
pub fn sample_text(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    match text[..end].rfind('\n') {
        Some(pos) => &text[..=pos],
        None => &text[..end],
    }
}

/// Rank delimiter candidates for a sample.
///
/// Non-alphanumeric characters of the first non-blank line are ranked by
/// frequency, then the common delimiters follow. Tab leads for `.tsv` files.
pub fn delimiter_candidates(sample: &str, format: FileFormat, limit: usize) -> Vec<char> {
    let first_line = sample.lines().find(|l| !l.trim().is_empty()).unwrap_or("");

    let mut counts: HashMap<char, (usize, usize)> = HashMap::new();
    for (pos, c) in first_line.chars().enumerate() {
        let eligible = c.is_ascii()
            && !c.is_ascii_alphanumeric()
            && !matches!(c, ' ' | '"' | '\'' | '-' | '_' | '\r' | '\\');
        if eligible {
            counts.entry(c).or_insert((0, pos)).0 += 1;
        }
    }
    let mut ranked: Vec<(char, usize, usize)> =
        counts.into_iter().map(|(c, (n, first))| (c, n, first)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    let mut candidates: Vec<char> = Vec::new();
    if format == FileFormat::Tsv {
        candidates.push('\t');
    }
    for c in ranked.into_iter().map(|(c, _, _)| c).chain(COMMON_DELIMITERS) {
        if !candidates.contains(&c) {
            candidates.push(c);
        }
    }
    candidates.truncate(limit.max(1));
    candidates
}

/// Column-consistency header heuristic over the first rows of a parse.
///
/// Each column votes: a typed data column under a differently typed first
/// cell votes "header"; a first cell that looks like data votes "no header";
/// fixed-length text columns vote "header" when the first cell's length
/// differs.
pub fn detect_header(rows: &[Vec<String>], sentinels: &[String]) -> HeaderVerdict {
    let Some((first, rest)) = rows.split_first() else {
        return HeaderVerdict::Ambiguous;
    };
    let data: Vec<&Vec<String>> = rest.iter().filter(|r| r.len() == first.len()).collect();
    if data.is_empty() {
        return HeaderVerdict::Ambiguous;
    }

    let mut header_votes = 0usize;
    let mut data_votes = 0usize;

    for (col, cell) in first.iter().enumerate() {
        let cell = cell.trim();
        let values: Vec<&str> = data
            .iter()
            .map(|r| r[col].trim())
            .filter(|v| !is_blank(v, sentinels))
            .collect();
        if values.is_empty() || cell.is_empty() {
            continue;
        }

        let column_kind = common_kind(&values);
        let cell_kind = value_kind(cell);
        match column_kind {
            Some(kind) if kind != ValueKind::Text => {
                if cell_kind == kind {
                    data_votes += 1;
                } else {
                    header_votes += 1;
                }
            },
            _ => {
                if cell_kind != ValueKind::Text {
                    data_votes += 1;
                    continue;
                }
                let first_len = values[0].chars().count();
                let fixed_length = values.iter().all(|v| v.chars().count() == first_len);
                if fixed_length && cell.chars().count() != first_len {
                    header_votes += 1;
                }
            },
        }
    }

    match header_votes.cmp(&data_votes) {
        std::cmp::Ordering::Greater => HeaderVerdict::Present,
        std::cmp::Ordering::Less => HeaderVerdict::Absent,
        std::cmp::Ordering::Equal => HeaderVerdict::Ambiguous,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Boolean,
    Number,
    Date,
    Text,
}

fn value_kind(value: &str) -> ValueKind {
    if is_boolean_literal(value) {
        ValueKind::Boolean
    } else if is_float_literal(value) {
        ValueKind::Number
    } else if is_date_literal(value) {
        ValueKind::Date
    } else {
        ValueKind::Text
    }
}

fn common_kind(values: &[&str]) -> Option<ValueKind> {
    let first = value_kind(values.first()?);
    values
        .iter()
        .all(|v| value_kind(v) == first)
        .then_some(first)
}

/// Values that miss their column's majority type (numeric or boolean)
fn cast_failures(rows: &[Vec<String>], width: usize, sentinels: &[String]) -> usize {
    let mut failures = 0;
    for col in 0..width {
        let values: Vec<&str> = rows
            .iter()
            .filter_map(|r| r.get(col))
            .map(|v| v.trim())
            .filter(|v| !is_blank(v, sentinels))
            .collect();
        if values.is_empty() {
            continue;
        }
        let numeric = values.iter().filter(|v| is_float_literal(v)).count();
        let boolean = values.iter().filter(|v| is_boolean_literal(v)).count();
        if numeric * 2 > values.len() {
            failures += values.len() - numeric;
        } else if boolean * 2 > values.len() {
            failures += values.len() - boolean;
        }
    }
    failures
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn rows(lines: &[&[&str]]) -> Vec<Vec<String>> {
        lines
            .iter()
            .map(|l| l.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    fn sentinels() -> Vec<String> {
        RepairConfig::default().null_sentinels
    }

    struct FailingClassifier;

    impl HeaderClassifier for FailingClassifier {
        fn classify_header(&self, _rows: &[Vec<String>]) -> anyhow::Result<bool> {
            anyhow::bail!("service unavailable")
        }
    }

    #[test]
    fn test_delimiter_candidates_rank_by_frequency() {
        let candidates = delimiter_candidates("a;b;c|d\n1;2;3|4\n", FileFormat::Csv, 5);
        assert_eq!(candidates, vec![';', '|', ',', '\t']);
    }

    #[test]
    fn test_delimiter_candidates_tsv_prefers_tab() {
        let candidates = delimiter_candidates("a,b\n", FileFormat::Tsv, 3);
        assert_eq!(candidates, vec!['\t', ',', ';']);
    }

    #[test]
    fn test_sample_cuts_at_line_end() {
        let text = "id,name\n1,alice\n2,bob\n";
        assert_eq!(sample_text(text, 18), "id,name\n1,alice\n");
        assert_eq!(sample_text(text, 1000), text);
    }

    #[test]
    fn test_detect_header_typed_columns() {
        let present = rows(&[&["id", "amount"], &["1", "2.5"], &["2", "3.0"]]);
        assert_eq!(detect_header(&present, &sentinels()), HeaderVerdict::Present);

        let absent = rows(&[&["1", "2.5"], &["2", "3.0"], &["3", "4.0"]]);
        assert_eq!(detect_header(&absent, &sentinels()), HeaderVerdict::Absent);
    }

    #[test]
    fn test_detect_header_text_only_is_ambiguous() {
        let text = rows(&[&["alpha", "beta"], &["gamma", "delta"], &["epsilon", "zeta"]]);
        assert_eq!(detect_header(&text, &sentinels()), HeaderVerdict::Ambiguous);
    }

    #[test]
    fn test_select_comma_with_quotes() {
        let text = "\"name\",\"city\",\"amount\"\n\"Smith, J\",\"Oslo\",\"10\"\n\"Doe, A\",\"Rome\",\"12\"\n";
        let config = RepairConfig::default();
        let selection = select_strategy(text, FileFormat::Csv, &config, None).unwrap();
        assert_eq!(selection.strategy.delimiter, ',');
        assert_eq!(selection.strategy.quote, QuoteStyle::DoubleQuote);
        assert!(selection.strategy.has_header);
        assert_eq!(selection.overflow_rate, 0.0);
    }

    #[test]
    fn test_select_semicolon() {
        let text = "id;price\n1;2,50\n2;3,75\n";
        let config = RepairConfig::default();
        let selection = select_strategy(text, FileFormat::Csv, &config, None).unwrap();
        assert_eq!(selection.strategy.delimiter, ';');
    }

    #[test]
    fn test_select_backslash_escapes() {
        let text = "id,quote\n1,\"say \\\"hi\\\", then leave\"\n2,\"plain\"\n";
        let config = RepairConfig::default();
        let selection = select_strategy(text, FileFormat::Csv, &config, None).unwrap();
        assert_eq!(selection.strategy.quote, QuoteStyle::BackslashEscape);
    }

    #[test]
    fn test_ambiguous_header_uses_classifier() {
        let text = "alpha,beta\ngamma,delta\nepsilon,zeta\n";
        let config = RepairConfig::default();
        let classifier = StaticHeaderClassifier::new(false);
        let selection = select_strategy(text, FileFormat::Csv, &config, Some(&classifier)).unwrap();
        assert!(selection.classifier_consulted);
        assert!(!selection.strategy.has_header);
    }

    #[test]
    fn test_ambiguous_header_without_classifier_prefers_header() {
        let text = "alpha,beta\ngamma,delta\nepsilon,zeta\n";
        let config = RepairConfig::default();
        let selection = select_strategy(text, FileFormat::Csv, &config, None).unwrap();
        assert!(!selection.classifier_consulted);
        assert!(selection.strategy.has_header);
    }

    #[test]
    fn test_classifier_failure_falls_back_to_scoring() {
        let text = "alpha,beta\ngamma,delta\nepsilon,zeta\n";
        let config = RepairConfig::default();
        let selection =
            select_strategy(text, FileFormat::Csv, &config, Some(&FailingClassifier)).unwrap();
        assert!(selection.classifier_consulted);
        assert!(selection.strategy.has_header);
    }

    #[test]
    fn test_ragged_file_is_parse_ambiguous() {
        let text = "a,b,c\n1\n1,2,3,4\n1,2\n5,6,7\n";
        let config = RepairConfig::default();
        let err = select_strategy(text, FileFormat::Csv, &config, None).unwrap_err();
        assert!(matches!(err, RepairError::ParseAmbiguous { .. }));
    }

    #[test]
    fn test_cast_failures_count_majority_misses() {
        let data = rows(&[&["1", "x"], &["2", "y"], &["oops", "z"]]);
        assert_eq!(cast_failures(&data, 2, &sentinels()), 1);
    }
}
