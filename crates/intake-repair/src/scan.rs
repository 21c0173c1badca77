//! Independent record counter for delimited text
//!
//! Walks the decoded text character by character under a strategy's quote
//! rules, without the CSV reader. A line break inside a quoted field is
//! forgiven only when the field closes cleanly (the closing quote is followed
//! by a delimiter, a line end or the end of input). Line breaks swallowed by
//! an unterminated or malformed quoted field still count as records, so a
//! quoting defect that merges rows shows up as a count mismatch.
//!
//! Whitespace-only lines are not records.

use crate::strategy::ParseStrategy;

/// Count the records `text` holds under `strategy`, header included.
pub fn count_records(text: &str, strategy: &ParseStrategy) -> usize {
    let quote = strategy.quote_char();
    let escape = strategy.escape_char();
    let delimiter = strategy.delimiter;

    let mut chars = text.chars().peekable();
    let mut count = 0usize;
    let mut line_has_content = false;
    let mut at_field_start = true;

    let mut in_quotes = false;
    // Non-blank line segments ended by a break inside the current quoted field
    let mut pending = 0usize;
    let mut segment_has_content = false;

    while let Some(mut c) = chars.next() {
        if c == '\r' {
            if chars.peek() == Some(&'\n') {
                continue;
            }
            c = '\n';
        }

        if in_quotes {
            if c == '\n' {
                if segment_has_content {
                    pending += 1;
                }
                segment_has_content = false;
                continue;
            }
            if !c.is_whitespace() {
                segment_has_content = true;
            }
            if Some(c) == escape && escape != quote {
                chars.next();
                continue;
            }
            if Some(c) == quote {
                if escape == quote && chars.peek() == Some(&c) {
                    chars.next();
                    continue;
                }
                in_quotes = false;
                let clean = match chars.peek() {
                    None | Some('\n') | Some('\r') => true,
                    Some(&next) => next == delimiter,
                };
                if !clean {
                    count += pending;
                }
                pending = 0;
                line_has_content = true;
                at_field_start = false;
            }
            continue;
        }

        if c == '\n' {
            if line_has_content {
                count += 1;
            }
            line_has_content = false;
            at_field_start = true;
            continue;
        }

        if c == delimiter {
            line_has_content = true;
            at_field_start = true;
            continue;
        }

        if at_field_start && Some(c) == quote {
            in_quotes = true;
            segment_has_content = true;
            pending = 0;
            line_has_content = true;
            at_field_start = false;
            continue;
        }

        if !c.is_whitespace() {
            line_has_content = true;
        }
        at_field_start = false;
    }

    if in_quotes {
        count += pending;
        if segment_has_content {
            count += 1;
        }
    } else if line_has_content {
        count += 1;
    }

    count
}
