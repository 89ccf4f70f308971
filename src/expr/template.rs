//! Reference placeholder parsing.
//!
//! Argument values and conditions embed references using `${path}` syntax,
//! where the path is a dotted key looked up first in the static scope
//! (recipe parameters) and then in the context.
//!
//! # Syntax
//!
//! - `${fetch.result}` - replaced with the referenced value
//! - `$${escaped}` - produces literal `${escaped}` in output
//!
//! Parsing happens once at load time; resolution is single-pass, so a
//! resolved value containing `${...}` text is never expanded again.

use std::collections::BTreeSet;

/// A piece of a parsed template string.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Literal text, emitted unchanged.
    Literal(String),
    /// Reference to a dotted path: `${path}`.
    Reference(String),
}

/// Parse a string into literal and reference segments.
///
/// `$${...}` escapes to a literal `${...}`; a lone `$` or a `$` not
/// followed by `{` stays literal.
pub fn parse_template(input: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            literal.push(c);
            continue;
        }
        match chars.peek() {
            Some('{') => {
                chars.next();
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                let mut path = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    path.push(c);
                }
                segments.push(Segment::Reference(path.trim().to_string()));
            }
            Some('$') => {
                // $$ escapes the next interpolation: $${x} -> literal ${x}
                chars.next();
                if chars.peek() == Some(&'{') {
                    chars.next();
                    literal.push_str("${");
                    for c in chars.by_ref() {
                        literal.push(c);
                        if c == '}' {
                            break;
                        }
                    }
                } else {
                    literal.push('$');
                }
            }
            _ => literal.push('$'),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    segments
}

/// Whether a string contains at least one `${...}` reference.
pub fn has_references(input: &str) -> bool {
    parse_template(input)
        .iter()
        .any(|s| matches!(s, Segment::Reference(_)))
}

/// Unique referenced paths in a string.
pub fn referenced_paths(input: &str) -> BTreeSet<String> {
    parse_template(input)
        .into_iter()
        .filter_map(|s| match s {
            Segment::Reference(path) => Some(path),
            Segment::Literal(_) => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(s: &str) -> Segment {
        Segment::Literal(s.to_string())
    }

    fn reference(s: &str) -> Segment {
        Segment::Reference(s.to_string())
    }

    #[test]
    fn literal_only() {
        assert_eq!(parse_template("plain text"), vec![lit("plain text")]);
    }

    #[test]
    fn bare_reference() {
        assert_eq!(parse_template("${fetch.result}"), vec![reference("fetch.result")]);
    }

    #[test]
    fn reference_with_surrounding_text() {
        assert_eq!(
            parse_template("rows: ${count}!"),
            vec![lit("rows: "), reference("count"), lit("!")]
        );
    }

    #[test]
    fn adjacent_references() {
        assert_eq!(
            parse_template("${a}${b}"),
            vec![reference("a"), reference("b")]
        );
    }

    #[test]
    fn escaped_reference_stays_literal() {
        assert_eq!(
            parse_template("$${NOT_RESOLVED}"),
            vec![lit("${NOT_RESOLVED}")]
        );
    }

    #[test]
    fn escaped_and_real_mix() {
        assert_eq!(
            parse_template("keep '$${raw}' use ${real}"),
            vec![lit("keep '${raw}' use "), reference("real")]
        );
    }

    #[test]
    fn dollar_without_brace_is_literal() {
        assert_eq!(parse_template("cost is $5"), vec![lit("cost is $5")]);
    }

    #[test]
    fn empty_input_yields_no_segments() {
        assert!(parse_template("").is_empty());
    }

    #[test]
    fn path_whitespace_is_trimmed() {
        assert_eq!(parse_template("${ spaced.path }"), vec![reference("spaced.path")]);
    }

    #[test]
    fn has_references_detects_real_references_only() {
        assert!(has_references("v=${x}"));
        assert!(!has_references("v=$${x}"));
        assert!(!has_references("plain"));
    }

    #[test]
    fn referenced_paths_are_unique() {
        let paths = referenced_paths("${a} ${b} ${a}");
        assert_eq!(paths.len(), 2);
        assert!(paths.contains("a"));
        assert!(paths.contains("b"));
    }
}
