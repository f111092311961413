//! Shell-like expression parsing and evaluation, grounded on the original
//! project's `common/expr.c`. Supports `$name`, `${name}`, `${name:-word}`,
//! `${name:+word}`, `${name:offset:length}` and `${name#pattern}`, with
//! backslash escaping and a bounded variable-name length.

use std::collections::HashSet;
use std::iter::Peekable;
use std::str::Chars;

use thiserror::Error;

/// Longest variable name accepted, matching the original's `MAXVARLENGTH`.
const MAX_VAR_LENGTH: usize = 30;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExprError {
    #[error("unterminated ${{...}} expansion")]
    Unterminated,
    #[error("invalid or missing variable name")]
    InvalidName,
    #[error("unrecognized ${{...}} operator")]
    UnknownOperator,
    #[error("invalid numeric offset or length")]
    InvalidNumber,
    #[error("'$' not followed by a name or '{{'")]
    BareDollar,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Op {
    Plain,
    DefaultIfUnset(String),
    AltIfSet(String),
    Substring(i64, i64),
    StripPrefix(Vec<PatternElem>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternElem {
    Literal(char),
    Wildcard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct VarRef {
    name: String,
    op: Op,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Fragment {
    Literal(String),
    Var(VarRef),
}

fn parse(expr: &str) -> Result<Vec<Fragment>, ExprError> {
    let mut chars = expr.chars().peekable();
    let mut fragments = Vec::new();
    let mut literal = String::new();

    loop {
        match chars.next() {
            None => break,
            Some('\\') => match chars.next() {
                Some(c) => literal.push(c),
                None => return Err(ExprError::Unterminated),
            },
            Some('$') => {
                if !literal.is_empty() {
                    fragments.push(Fragment::Literal(std::mem::take(&mut literal)));
                }
                match chars.peek() {
                    Some('{') => {
                        chars.next();
                        fragments.push(Fragment::Var(parse_brace_var(&mut chars)?));
                    }
                    Some(c) if c.is_ascii_alphabetic() => {
                        let name = parse_name(&mut chars)?;
                        fragments.push(Fragment::Var(VarRef {
                            name,
                            op: Op::Plain,
                        }));
                    }
                    _ => return Err(ExprError::BareDollar),
                }
            }
            Some(c) => literal.push(c),
        }
    }
    if !literal.is_empty() {
        fragments.push(Fragment::Literal(literal));
    }
    Ok(fragments)
}

fn parse_name(chars: &mut Peekable<Chars>) -> Result<String, ExprError> {
    let mut name = String::new();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => name.push(c),
        _ => return Err(ExprError::InvalidName),
    }
    while let Some(&c) = chars.peek() {
        if c.is_ascii_alphanumeric() || c == ';' {
            if name.len() >= MAX_VAR_LENGTH {
                return Err(ExprError::InvalidName);
            }
            name.push(c);
            chars.next();
        } else {
            break;
        }
    }
    Ok(name)
}

fn parse_brace_var(chars: &mut Peekable<Chars>) -> Result<VarRef, ExprError> {
    let name = parse_name(chars)?;
    match chars.next() {
        None => Err(ExprError::Unterminated),
        Some('}') => Ok(VarRef {
            name,
            op: Op::Plain,
        }),
        Some(':') => match chars.peek().copied() {
            Some('-') => {
                chars.next();
                let word = parse_text_until_rbrace(chars)?;
                Ok(VarRef {
                    name,
                    op: Op::DefaultIfUnset(word),
                })
            }
            Some('+') => {
                chars.next();
                let word = parse_text_until_rbrace(chars)?;
                Ok(VarRef {
                    name,
                    op: Op::AltIfSet(word),
                })
            }
            Some(c) if c == '-' || c.is_ascii_digit() => {
                let offset = parse_number(chars)?;
                match chars.next() {
                    Some(':') => {}
                    _ => return Err(ExprError::InvalidNumber),
                }
                let length = parse_number(chars)?;
                match chars.next() {
                    Some('}') => Ok(VarRef {
                        name,
                        op: Op::Substring(offset, length),
                    }),
                    _ => Err(ExprError::Unterminated),
                }
            }
            _ => Err(ExprError::UnknownOperator),
        },
        Some('#') => {
            let pattern = parse_pattern_until_rbrace(chars)?;
            Ok(VarRef {
                name,
                op: Op::StripPrefix(pattern),
            })
        }
        Some(_) => Err(ExprError::UnknownOperator),
    }
}

/// Reads literal text (honoring backslash escapes) up to an unescaped `}`.
fn parse_text_until_rbrace(chars: &mut Peekable<Chars>) -> Result<String, ExprError> {
    let mut out = String::new();
    loop {
        match chars.next() {
            None => return Err(ExprError::Unterminated),
            Some('}') => return Ok(out),
            Some('\\') => match chars.next() {
                Some(c) => out.push(c),
                None => return Err(ExprError::Unterminated),
            },
            Some(c) => out.push(c),
        }
    }
}

/// Reads a strip-prefix pattern up to an unescaped `}`, where `?` is a
/// single-character wildcard and `\c` escapes a literal `c`.
fn parse_pattern_until_rbrace(chars: &mut Peekable<Chars>) -> Result<Vec<PatternElem>, ExprError> {
    let mut out = Vec::new();
    loop {
        match chars.next() {
            None => return Err(ExprError::Unterminated),
            Some('}') => return Ok(out),
            Some('\\') => match chars.next() {
                Some(c) => out.push(PatternElem::Literal(c)),
                None => return Err(ExprError::Unterminated),
            },
            Some('?') => out.push(PatternElem::Wildcard),
            Some(c) => out.push(PatternElem::Literal(c)),
        }
    }
}

fn parse_number(chars: &mut Peekable<Chars>) -> Result<i64, ExprError> {
    let mut text = String::new();
    if let Some(&'-') = chars.peek() {
        text.push('-');
        chars.next();
    }
    let mut saw_digit = false;
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            text.push(c);
            saw_digit = true;
            chars.next();
        } else {
            break;
        }
    }
    if !saw_digit {
        return Err(ExprError::InvalidNumber);
    }
    text.parse::<i64>().map_err(|_| ExprError::InvalidNumber)
}

fn apply_substring(value: &str, offset: i64, length: i64) -> String {
    let chars: Vec<char> = value.chars().collect();
    let start = offset.max(0) as usize;
    let start = start.min(chars.len());
    let len = length.max(0) as usize;
    let end = start.saturating_add(len).min(chars.len());
    chars[start..end].iter().collect()
}

fn apply_strip_prefix(value: &str, pattern: &[PatternElem]) -> String {
    let chars: Vec<char> = value.chars().collect();
    if pattern.len() > chars.len() {
        return value.to_string();
    }
    for (elem, ch) in pattern.iter().zip(chars.iter()) {
        let matches = match elem {
            PatternElem::Wildcard => true,
            PatternElem::Literal(c) => c == ch,
        };
        if !matches {
            return value.to_string();
        }
    }
    chars[pattern.len()..].iter().collect()
}

fn apply_op(op: &Op, value: &str) -> String {
    match op {
        Op::Plain => value.to_string(),
        Op::DefaultIfUnset(word) => {
            if value.is_empty() {
                word.clone()
            } else {
                value.to_string()
            }
        }
        Op::AltIfSet(word) => {
            if !value.is_empty() {
                word.clone()
            } else {
                String::new()
            }
        }
        Op::Substring(offset, length) => apply_substring(value, *offset, *length),
        Op::StripPrefix(pattern) => apply_strip_prefix(value, pattern),
    }
}

/// Evaluate `expr`, calling `expander(name)` for every variable reference.
pub fn expand<F>(expr: &str, mut expander: F) -> Result<String, ExprError>
where
    F: FnMut(&str) -> String,
{
    let fragments = parse(expr)?;
    let mut out = String::new();
    for fragment in fragments {
        match fragment {
            Fragment::Literal(text) => out.push_str(&text),
            Fragment::Var(var_ref) => {
                let value = expander(&var_ref.name);
                out.push_str(&apply_op(&var_ref.op, &value));
            }
        }
    }
    Ok(out)
}

/// Every variable name `expr` references, without evaluating it.
pub fn variables_of(expr: &str) -> Result<HashSet<String>, ExprError> {
    let fragments = parse(expr)?;
    let mut names = HashSet::new();
    for fragment in fragments {
        if let Fragment::Var(var_ref) = fragment {
            names.insert(var_ref.name);
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_expander(name: &str) -> String {
        match name {
            "test1" => "foobar".to_string(),
            "empty" => String::new(),
            "userPassword" => "{crypt}HASH".to_string(),
            _ => String::new(),
        }
    }

    #[test]
    fn bare_dollar_name_substitutes_value() {
        assert_eq!(expand("$test1", fixture_expander).unwrap(), "foobar");
    }

    #[test]
    fn default_if_unset_triggers_on_empty_value() {
        assert_eq!(
            expand("${empty:-default}", fixture_expander).unwrap(),
            "default"
        );
    }

    #[test]
    fn alt_if_set_triggers_on_nonempty_value() {
        assert_eq!(expand("${test1:+X}", fixture_expander).unwrap(), "X");
    }

    #[test]
    fn substring_extracts_numeric_range() {
        assert_eq!(expand("${test1:3:3}", fixture_expander).unwrap(), "bar");
    }

    #[test]
    fn strip_prefix_honors_wildcard() {
        assert_eq!(expand("${test1#?oo}", fixture_expander).unwrap(), "bar");
    }

    #[test]
    fn strip_prefix_honors_escaped_brace_in_pattern() {
        assert_eq!(
            expand("${userPassword#{crypt\\}}", fixture_expander).unwrap(),
            "HASH"
        );
    }

    #[test]
    fn unterminated_brace_is_a_syntax_error() {
        assert_eq!(expand("${a", fixture_expander), Err(ExprError::Unterminated));
    }

    #[test]
    fn strip_prefix_with_no_match_returns_full_value() {
        assert_eq!(
            expand("${test1#zzz}", fixture_expander).unwrap(),
            "foobar"
        );
    }

    #[test]
    fn alt_if_set_on_empty_value_yields_empty_string() {
        assert_eq!(expand("${empty:+X}", fixture_expander).unwrap(), "");
    }

    #[test]
    fn variables_of_collects_every_referenced_name() {
        let names = variables_of("$a ${b:-x} ${c:+y} ${d:1:2} ${e#f}").unwrap();
        let expected: HashSet<String> = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn variable_name_of_exactly_max_length_succeeds() {
        let name = "a".repeat(MAX_VAR_LENGTH);
        let expr = format!("${{{name}}}");
        assert!(expand(&expr, |_| "ok".to_string()).is_ok());
    }

    #[test]
    fn variable_name_one_over_max_length_fails() {
        let name = "a".repeat(MAX_VAR_LENGTH + 1);
        let expr = format!("${{{name}}}");
        assert_eq!(
            expand(&expr, |_| "ok".to_string()),
            Err(ExprError::InvalidName)
        );
    }

    #[test]
    fn evaluation_is_idempotent_without_metacharacters() {
        let plain = "no metacharacters here";
        assert_eq!(expand(plain, fixture_expander).unwrap(), plain);
    }

    #[test]
    fn backslash_escapes_literal_text() {
        assert_eq!(
            expand("a\\$b", fixture_expander).unwrap(),
            "a$b"
        );
    }
}
