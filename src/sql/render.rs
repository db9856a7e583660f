//! Display-only reconstruction of a statement with its parameters inlined.
//!
//! The output is meant for humans, never for re-execution. Instead of
//! pattern substitution over the whole string, the statement is kept as a
//! list of segments: raw SQL that may still contain markers, and values that
//! were already substituted. Later parameters only ever scan raw segments,
//! so characters inside a substituted value can never be mistaken for a
//! marker and need no escaping.
//!
//! Inside a raw segment, markers within `'...'`, `"..."` or `` `...` ``
//! literals are left alone. Unbalanced quotes are unsupported input: the
//! rest of the segment after an unterminated quote is treated as literal.

use super::ParamKey;

enum Segment {
    Raw(String),
    Value(String),
}

/// Splits the quotation string into left/right delimiters.
///
/// One char is used on both sides, longer strings are split in half
/// (`"<>"` → `<` and `>`).
pub fn split_quotation(quotation_char: &str) -> (String, String) {
    let chars: Vec<char> = quotation_char.chars().collect();
    if chars.len() > 1 {
        let half = chars.len() / 2;
        (chars[..half].iter().collect(), chars[half..].iter().collect())
    } else {
        (quotation_char.to_owned(), quotation_char.to_owned())
    }
}

pub fn render_sql(sql: &str, parameters: &[(ParamKey, String)], quotation_char: &str) -> String {
    let (left, right) = split_quotation(quotation_char);
    let mut segments = vec![Segment::Raw(sql.to_owned())];

    for (key, value) in parameters {
        let wrapped = format!("{left}{value}{right}");
        match key {
            // Each positional parameter consumes the leftmost free `?`
            ParamKey::Index(_) => substitute(&mut segments, "?", &wrapped, Some(1)),
            ParamKey::Name(name) => {
                let marker = if name.starts_with(':') {
                    name.clone()
                } else {
                    format!(":{name}")
                };
                substitute(&mut segments, &marker, &wrapped, None);
            }
        }
    }

    segments
        .into_iter()
        .map(|s| match s {
            Segment::Raw(text) | Segment::Value(text) => text,
        })
        .collect()
}

/// Replaces up to `limit` marker occurrences, left to right.
fn substitute(segments: &mut Vec<Segment>, marker: &str, value: &str, limit: Option<usize>) {
    let mut remaining = limit.unwrap_or(usize::MAX);
    let mut out = Vec::with_capacity(segments.len() + 2);

    for segment in segments.drain(..) {
        let raw = match segment {
            Segment::Raw(raw) if remaining > 0 => raw,
            other => {
                out.push(other);
                continue;
            }
        };

        let mut rest = raw.as_str();
        while remaining > 0 {
            let Some(pos) = find_marker(rest, marker) else {
                break;
            };
            if pos > 0 {
                out.push(Segment::Raw(rest[..pos].to_owned()));
            }
            out.push(Segment::Value(value.to_owned()));
            rest = &rest[pos + marker.len()..];
            remaining -= 1;
        }
        if !rest.is_empty() {
            out.push(Segment::Raw(rest.to_owned()));
        }
    }

    *segments = out;
}

/// Byte offset of the first marker outside a quoted literal and not
/// followed by a word character.
fn find_marker(text: &str, marker: &str) -> Option<usize> {
    let mut in_quote: Option<char> = None;
    let mut chars = text.char_indices();

    while let Some((i, c)) = chars.next() {
        match in_quote {
            Some(q) => {
                if c == '\\' {
                    chars.next();
                } else if c == q {
                    in_quote = None;
                }
            }
            None if matches!(c, '\'' | '"' | '`') => in_quote = Some(c),
            None => {
                if text[i..].starts_with(marker) && !is_word_char(text[i + marker.len()..].chars().next()) {
                    return Some(i);
                }
            }
        }
    }
    None
}

fn is_word_char(c: Option<char>) -> bool {
    c.is_some_and(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idx(i: usize, v: &str) -> (ParamKey, String) {
        (ParamKey::Index(i), v.to_owned())
    }

    fn named(n: &str, v: &str) -> (ParamKey, String) {
        (ParamKey::Name(n.to_owned()), v.to_owned())
    }

    #[test]
    fn mixed_positional_and_named() {
        let sql = "SELECT * FROM t WHERE a = ? AND b = :name";
        let rendered = render_sql(sql, &[idx(0, "x"), named("name", "y")], "<>");
        assert_eq!(rendered, "SELECT * FROM t WHERE a = <x> AND b = <y>");
    }

    #[test]
    fn quotation_split() {
        assert_eq!(split_quotation("'"), ("'".into(), "'".into()));
        assert_eq!(split_quotation("<>"), ("<".into(), ">".into()));
        assert_eq!(split_quotation("[[]]"), ("[[".into(), "]]".into()));
        assert_eq!(split_quotation(""), (String::new(), String::new()));
    }

    #[test]
    fn positional_parameters_fill_in_order() {
        let sql = "INSERT INTO t VALUES (?, ?, ?)";
        let rendered = render_sql(sql, &[idx(0, "1"), idx(1, "2"), idx(2, "3")], "'");
        assert_eq!(rendered, "INSERT INTO t VALUES ('1', '2', '3')");
    }

    #[test]
    fn prefix_names_do_not_cross_substitute() {
        let sql = "WHERE id = :id AND identifier = :identifier";
        let rendered = render_sql(sql, &[named("id", "1"), named("identifier", "abc")], "'");
        assert_eq!(rendered, "WHERE id = '1' AND identifier = 'abc'");
    }

    #[test]
    fn named_marker_with_leading_colon_and_repeats() {
        let sql = "WHERE a = :v OR b = :v";
        let rendered = render_sql(sql, &[named(":v", "7")], "<>");
        assert_eq!(rendered, "WHERE a = <7> OR b = <7>");
    }

    #[test]
    fn values_with_meta_characters_round_trip() {
        let sql = "WHERE a = ? AND b = :b";
        let rendered = render_sql(sql, &[idx(0, r"100% \d $1"), named("b", "$& \\1 %%")], "<>");
        assert_eq!(rendered, r"WHERE a = <100% \d $1> AND b = <$& \1 %%>");
    }

    #[test]
    fn substituted_values_are_never_rescanned() {
        let sql = "WHERE a = ? AND b = ?";
        let rendered = render_sql(sql, &[idx(0, "why?"), idx(1, ":b")], "'");
        assert_eq!(rendered, "WHERE a = 'why?' AND b = ':b'");

        let rendered = render_sql("WHERE a = :a AND b = :b", &[named("a", ":b"), named("b", "x")], "'");
        assert_eq!(rendered, "WHERE a = ':b' AND b = 'x'");
    }

    #[test]
    fn markers_inside_sql_literals_are_skipped() {
        let sql = "SELECT '?' AS q, \"col:x\" FROM t WHERE a = ? AND c = :x";
        let rendered = render_sql(sql, &[idx(0, "1"), named("x", "2")], "<>");
        assert_eq!(rendered, "SELECT '?' AS q, \"col:x\" FROM t WHERE a = <1> AND c = <2>");
    }

    #[test]
    fn escaped_quote_inside_literal() {
        let sql = r"SELECT 'it\'s ?' WHERE a = ?";
        let rendered = render_sql(sql, &[idx(0, "1")], "<>");
        assert_eq!(rendered, r"SELECT 'it\'s ?' WHERE a = <1>");
    }

    #[test]
    fn missing_markers_leave_sql_untouched() {
        let sql = "SELECT 1";
        assert_eq!(render_sql(sql, &[idx(0, "x"), named("y", "z")], "<>"), sql);
    }

    #[test]
    fn extra_markers_stay_raw() {
        let rendered = render_sql("a = ? AND b = ?", &[idx(0, "x")], "<>");
        assert_eq!(rendered, "a = <x> AND b = ?");
    }
}
