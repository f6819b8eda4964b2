//! Query template rendering.
//!
//! A [`QueryTemplate`] turns a query with named placeholders and a parameter
//! map into the literal SQL text sent to the server. [`NamedTemplate`] is the
//! default implementation, substituting `:name` placeholders with quoted SQL
//! literals.

use crate::error::{DbError, DbResult};
use crate::models::{QueryParam, QueryParams};

/// Renders a template and its parameters into literal query text.
pub trait QueryTemplate: Send + Sync {
    fn render(&self, template: &str, params: &QueryParams) -> DbResult<String>;
}

/// `:name` placeholder substitution.
///
/// Placeholders inside single-quoted strings, double-quoted identifiers,
/// dollar-quoted bodies and comments are left alone, as are `::type` casts.
/// Unused parameters are ignored; a placeholder without a value is an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct NamedTemplate;

impl QueryTemplate for NamedTemplate {
    fn render(&self, template: &str, params: &QueryParams) -> DbResult<String> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(c) = rest.chars().next() {
            match c {
                '\'' | '"' => {
                    let escapes = c == '\'' && follows_escape_prefix(&out);
                    let end = quoted_len(rest, c, escapes);
                    out.push_str(&rest[..end]);
                    rest = &rest[end..];
                }
                '-' if rest.starts_with("--") => {
                    let end = rest.find('\n').unwrap_or(rest.len());
                    out.push_str(&rest[..end]);
                    rest = &rest[end..];
                }
                '/' if rest.starts_with("/*") => {
                    let end = rest[2..].find("*/").map(|i| i + 4).unwrap_or(rest.len());
                    out.push_str(&rest[..end]);
                    rest = &rest[end..];
                }
                '$' => {
                    let end = dollar_quoted_len(rest).unwrap_or(1);
                    out.push_str(&rest[..end]);
                    rest = &rest[end..];
                }
                ':' if rest.starts_with("::") => {
                    out.push_str("::");
                    rest = &rest[2..];
                }
                ':' => {
                    let name_len = placeholder_len(&rest[1..]);
                    if name_len == 0 {
                        out.push(':');
                        rest = &rest[1..];
                        continue;
                    }
                    let name = &rest[1..1 + name_len];
                    let value = params.get(name).ok_or_else(|| {
                        DbError::template(format!("missing value for parameter ':{}'", name))
                    })?;
                    out.push_str(&literal(value)?);
                    rest = &rest[1 + name_len..];
                }
                _ => {
                    out.push(c);
                    rest = &rest[c.len_utf8()..];
                }
            }
        }

        Ok(out)
    }
}

/// Byte length of a quoted section starting at `s[0] == quote`, doubled
/// quotes included. With `escapes`, a backslash also escapes the next byte.
/// Runs to the end of input when unterminated.
fn quoted_len(s: &str, quote: char, escapes: bool) -> usize {
    let bytes = s.as_bytes();
    let q = quote as u8;
    let mut i = 1;
    while i < bytes.len() {
        if escapes && bytes[i] == b'\\' {
            i += 2;
            continue;
        }
        if bytes[i] == q {
            if bytes.get(i + 1) == Some(&q) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

/// True when the text emitted so far ends in a standalone `E`/`e`, making
/// the next `'` the start of an escape string.
fn follows_escape_prefix(out: &str) -> bool {
    let mut rev = out.chars().rev();
    matches!(rev.next(), Some('E' | 'e'))
        && !rev
            .next()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Byte length of a `$tag$ ... $tag$` body, or `None` if `s` does not start
/// one (e.g. a `$1` positional parameter).
fn dollar_quoted_len(s: &str) -> Option<usize> {
    let tag_end = s[1..].find('$')? + 1;
    let tag = &s[..=tag_end];
    if !tag[1..tag_end]
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
        || tag[1..tag_end].starts_with(|c: char| c.is_ascii_digit())
    {
        return None;
    }
    let body = &s[tag.len()..];
    Some(
        body.find(tag)
            .map(|i| tag.len() + i + tag.len())
            .unwrap_or(s.len()),
    )
}

fn placeholder_len(s: &str) -> usize {
    let mut chars = s.char_indices();
    match chars.next() {
        Some((_, c)) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return 0,
    }
    chars
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Render a parameter as a SQL literal.
fn literal(value: &QueryParam) -> DbResult<String> {
    Ok(match value {
        QueryParam::Null => "NULL".to_string(),
        QueryParam::Bool(true) => "TRUE".to_string(),
        QueryParam::Bool(false) => "FALSE".to_string(),
        QueryParam::Int(v) => v.to_string(),
        QueryParam::Float(v) if v.is_nan() => "'NaN'::float8".to_string(),
        QueryParam::Float(v) if v.is_infinite() => {
            let sign = if v.is_sign_negative() { "-" } else { "" };
            format!("'{}Infinity'::float8", sign)
        }
        QueryParam::Float(v) => format!("{:?}", v),
        QueryParam::String(s) => string_literal(s)?,
        QueryParam::Json(v) => string_literal(&v.to_string())?,
    })
}

fn string_literal(s: &str) -> DbResult<String> {
    if s.contains('\0') {
        return Err(DbError::template("string parameters cannot contain NUL bytes"));
    }
    if s.contains('\\') {
        let escaped = s.replace('\\', "\\\\").replace('\'', "''");
        Ok(format!("E'{}'", escaped))
    } else {
        Ok(format!("'{}'", s.replace('\'', "''")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(template: &str, params: &QueryParams) -> DbResult<String> {
        NamedTemplate.render(template, params)
    }

    #[test]
    fn test_substitutes_each_type() {
        let params = QueryParams::new()
            .with("id", 7)
            .with("name", "O'Brien")
            .with("active", true)
            .with("score", 1.5)
            .with("note", None::<String>);
        let sql = render(
            "INSERT INTO t VALUES (:id, :name, :active, :score, :note)",
            &params,
        )
        .unwrap();
        assert_eq!(sql, "INSERT INTO t VALUES (7, 'O''Brien', TRUE, 1.5, NULL)");
    }

    #[test]
    fn test_repeated_placeholder() {
        let params = QueryParams::new().with("x", 1);
        assert_eq!(render("SELECT :x + :x", &params).unwrap(), "SELECT 1 + 1");
    }

    #[test]
    fn test_casts_untouched() {
        let params = QueryParams::new().with("v", "5");
        assert_eq!(
            render("SELECT :v::int, now()::date", &params).unwrap(),
            "SELECT '5'::int, now()::date"
        );
    }

    #[test]
    fn test_quoted_sections_untouched() {
        let params = QueryParams::new().with("a", 1);
        let sql = "SELECT ':a', \"col:a\", $$ :a $$, $fn$ :a $fn$ -- :a\n/* :a */ :a";
        assert_eq!(
            render(sql, &params).unwrap(),
            "SELECT ':a', \"col:a\", $$ :a $$, $fn$ :a $fn$ -- :a\n/* :a */ 1"
        );
    }

    #[test]
    fn test_escape_string_quote_is_not_a_terminator() {
        let params = QueryParams::new().with("a", 1);
        assert_eq!(
            render(r"SELECT E'\'', ':a'", &params).unwrap(),
            r"SELECT E'\'', ':a'"
        );
        assert_eq!(
            render(r"SELECT e'it\'s', :a", &params).unwrap(),
            r"SELECT e'it\'s', 1"
        );
    }

    #[test]
    fn test_identifier_ending_in_e_is_not_escape_prefix() {
        let params = QueryParams::new().with("a", 1);
        // Standard string after an identifier: the backslash is literal.
        assert_eq!(
            render(r"SELECT name'\', :a", &params).unwrap(),
            r"SELECT name'\', 1"
        );
    }

    #[test]
    fn test_positional_parameters_kept() {
        let params = QueryParams::new().with("a", 1);
        assert_eq!(render("SELECT $1, :a", &params).unwrap(), "SELECT $1, 1");
    }

    #[test]
    fn test_missing_parameter() {
        let err = render("SELECT :missing", &QueryParams::new()).unwrap_err();
        assert!(matches!(err, DbError::Template { .. }));
        assert!(err.to_string().contains(":missing"));
    }

    #[test]
    fn test_lone_colon() {
        assert_eq!(
            render("SELECT ': ' || x, a[1:2]", &QueryParams::new()).unwrap(),
            "SELECT ': ' || x, a[1:2]"
        );
    }

    #[test]
    fn test_backslash_uses_escape_string() {
        let params = QueryParams::new().with("p", r"C:\tmp");
        assert_eq!(render(":p", &params).unwrap(), r"E'C:\\tmp'");
    }

    #[test]
    fn test_json_and_special_floats() {
        let params = QueryParams::new()
            .with("doc", json!({"k": "v"}))
            .with("nan", f64::NAN)
            .with("ninf", f64::NEG_INFINITY);
        assert_eq!(
            render(":doc, :nan, :ninf", &params).unwrap(),
            "'{\"k\":\"v\"}', 'NaN'::float8, '-Infinity'::float8"
        );
    }

    #[test]
    fn test_nul_rejected() {
        let params = QueryParams::new().with("p", "a\0b");
        assert!(render(":p", &params).is_err());
    }

    #[test]
    fn test_multibyte_text() {
        let params = QueryParams::new().with("p", "é");
        assert_eq!(render("SELECT 'ü', :p", &params).unwrap(), "SELECT 'ü', 'é'");
    }
}
