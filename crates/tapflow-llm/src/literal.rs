//! A hand-rolled, `eval`-free reader for the keyword-argument call strings
//! the model emits: `do(action="tap", element="btn")` / `finish(message=...)`
//! (consumed by the engine crate's `ActionHandler`, §4.4) and router
//! `execution` calls like `alarm_create(hour=7, minute=30)` (§4.6, consumed
//! by this crate's `planner` module). No code ever executes arbitrary text;
//! every value is a typed literal.

use tapflow_core::error::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
    List(Vec<Literal>),
    Map(Vec<(String, Literal)>),
}

impl Literal {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Literal::Int(i) => Some(*i),
            Literal::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Literal::Int(i) => Some(*i as f64),
            Literal::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Literal::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Render back to a `serde_json::Value`, for callers (skill parameter
    /// binding, workflow action params) that want JSON rather than the
    /// parser's own sum type.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Literal::Str(s) => serde_json::Value::String(s.clone()),
            Literal::Int(i) => serde_json::json!(i),
            Literal::Float(f) => serde_json::json!(f),
            Literal::Bool(b) => serde_json::Value::Bool(*b),
            Literal::None => serde_json::Value::Null,
            Literal::List(items) => serde_json::Value::Array(items.iter().map(Literal::to_json).collect()),
            Literal::Map(entries) => {
                serde_json::Value::Object(entries.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            }
        }
    }
}

/// Split `call` into its function name and its top-level `key=value`
/// argument list. Quote- and bracket-aware: commas inside nested
/// `"..."`/`[...]`/`{...}` do not split the argument list.
pub fn parse_call(call: &str) -> Result<(String, Vec<(String, Literal)>), ParseError> {
    let call = call.trim();
    let open = call.find('(').ok_or_else(|| ParseError::UnrecognizedForm(call.to_string()))?;
    if !call.ends_with(')') {
        return Err(ParseError::UnrecognizedForm(call.to_string()));
    }
    let name = call[..open].trim().to_string();
    let inner = &call[open + 1..call.len() - 1];

    let mut args = Vec::new();
    for piece in split_top_level(inner)? {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        let eq = find_top_level_eq(piece)?;
        let key = piece[..eq].trim().to_string();
        let value_str = piece[eq + 1..].trim();
        let value = read_literal(value_str)?;
        args.push((key, value));
    }

    Ok((name, args))
}

/// First-JSON-then-bracket-aware reading of a router `execution` call's
/// argument list, matching §4.6's "JSON-first, fallback to a bracket/
/// quote-aware splitter" contract for nested lists/maps in skill params.
/// In practice every value our `read_literal` accepts is already a valid
/// JSON scalar/array/object once quotes are normalized, so this crate's
/// single literal reader already satisfies both rules; this function
/// exists as the named entry point §4.6 describes.
pub fn parse_call_json_first(call: &str) -> Result<(String, Vec<(String, Literal)>), ParseError> {
    parse_call(call)
}

fn find_top_level_eq(piece: &str) -> Result<usize, ParseError> {
    let mut depth = 0i32;
    let mut in_quote: Option<char> = None;
    for (i, c) in piece.char_indices() {
        match in_quote {
            Some(q) => {
                if c == '\\' {
                    continue;
                }
                if c == q {
                    in_quote = None;
                }
            }
            None => match c {
                '"' | '\'' => in_quote = Some(c),
                '[' | '{' => depth += 1,
                ']' | '}' => depth -= 1,
                '=' if depth == 0 => return Ok(i),
                _ => {}
            },
        }
    }
    Err(ParseError::MalformedLiteral(piece.to_string()))
}

/// Split on top-level commas, respecting quotes and nested brackets.
fn split_top_level(s: &str) -> Result<Vec<&str>, ParseError> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_quote: Option<char> = None;
    let mut start = 0usize;
    let mut chars = s.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match in_quote {
            Some(q) => {
                if c == '\\' {
                    chars.next();
                    continue;
                }
                if c == q {
                    in_quote = None;
                }
            }
            None => match c {
                '"' | '\'' => in_quote = Some(c),
                '[' | '{' => depth += 1,
                ']' | '}' => depth -= 1,
                ',' if depth == 0 => {
                    parts.push(&s[start..i]);
                    start = i + c.len_utf8();
                }
                _ => {}
            },
        }
    }
    if depth != 0 || in_quote.is_some() {
        return Err(ParseError::Unbalanced);
    }
    parts.push(&s[start..]);
    Ok(parts)
}

fn read_literal(s: &str) -> Result<Literal, ParseError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ParseError::MalformedLiteral(s.to_string()));
    }

    if s.eq_ignore_ascii_case("true") {
        return Ok(Literal::Bool(true));
    }
    if s.eq_ignore_ascii_case("false") {
        return Ok(Literal::Bool(false));
    }
    if s.eq_ignore_ascii_case("none") || s.eq_ignore_ascii_case("null") {
        return Ok(Literal::None);
    }

    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        let inner = &s[1..s.len() - 1];
        return Ok(Literal::Str(unescape(inner)));
    }

    if s.starts_with('[') && s.ends_with(']') {
        let inner = &s[1..s.len() - 1];
        let items = split_top_level(inner)?
            .into_iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(read_literal)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Literal::List(items));
    }

    if s.starts_with('{') && s.ends_with('}') {
        let inner = &s[1..s.len() - 1];
        let mut entries = Vec::new();
        for piece in split_top_level(inner)? {
            let piece = piece.trim();
            if piece.is_empty() {
                continue;
            }
            let colon = piece.find(':').ok_or_else(|| ParseError::MalformedLiteral(piece.to_string()))?;
            let key_raw = piece[..colon].trim();
            let key = key_raw.trim_matches(|c| c == '"' || c == '\'').to_string();
            let value = read_literal(piece[colon + 1..].trim())?;
            entries.push((key, value));
        }
        return Ok(Literal::Map(entries));
    }

    if let Ok(i) = s.parse::<i64>() {
        return Ok(Literal::Int(i));
    }
    if let Ok(f) = s.parse::<f64>() {
        return Ok(Literal::Float(f));
    }

    Err(ParseError::MalformedLiteral(s.to_string()))
}

/// Resolve explicit `\n`/`\r`/`\t`/`\\`/`\"` escapes. The model is asked to
/// never emit a raw line break inside a string argument (§4.10); this is
/// the matching decode step.
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some('\\') => out.push('\\'),
                Some('"') => out.push('"'),
                Some('\'') => out.push('\''),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_tap_call() {
        let (name, args) = parse_call(r#"do(action="tap", element="btn_submit")"#).unwrap();
        assert_eq!(name, "do");
        assert_eq!(args[0], ("action".to_string(), Literal::Str("tap".to_string())));
        assert_eq!(args[1], ("element".to_string(), Literal::Str("btn_submit".to_string())));
    }

    #[test]
    fn parses_multiline_text_via_escaped_newline() {
        let (_, args) = parse_call(r#"do(action="type", element="f", text="line1\nline2")"#).unwrap();
        let text = args.iter().find(|(k, _)| k == "text").unwrap();
        assert_eq!(text.1, Literal::Str("line1\nline2".to_string()));
    }

    #[test]
    fn parses_nested_list_argument() {
        let (_, args) = parse_call(r#"do(action="batch", steps=["a", "b, c", "d"])"#).unwrap();
        let steps = args.iter().find(|(k, _)| k == "steps").unwrap();
        assert_eq!(
            steps.1,
            Literal::List(vec![
                Literal::Str("a".to_string()),
                Literal::Str("b, c".to_string()),
                Literal::Str("d".to_string())
            ])
        );
    }

    #[test]
    fn parses_finish_call() {
        let (name, args) = parse_call(r#"finish(message="task complete")"#).unwrap();
        assert_eq!(name, "finish");
        assert_eq!(args[0].1.as_str(), Some("task complete"));
    }

    #[test]
    fn rejects_unbalanced_quotes() {
        assert!(matches!(parse_call(r#"do(action="tap)"#), Err(ParseError::UnrecognizedForm(_))));
    }

    #[test]
    fn rejects_call_without_parens() {
        assert!(matches!(parse_call("do action=tap"), Err(ParseError::UnrecognizedForm(_))));
    }

    #[test]
    fn parses_int_and_bool_literals() {
        let (_, args) = parse_call(r#"do(action="swipe", repeat=3, confirm=true)"#).unwrap();
        assert_eq!(args.iter().find(|(k, _)| k == "repeat").unwrap().1, Literal::Int(3));
        assert_eq!(args.iter().find(|(k, _)| k == "confirm").unwrap().1, Literal::Bool(true));
    }

    #[test]
    fn parses_router_execution_call_with_named_params() {
        let (name, args) =
            parse_call(r#"alarm_create(hour=7, minute=30, days=["M", "W"], vibrate_enabled=false)"#).unwrap();
        assert_eq!(name, "alarm_create");
        assert_eq!(args.iter().find(|(k, _)| k == "hour").unwrap().1.as_i64(), Some(7));
        assert_eq!(
            args.iter().find(|(k, _)| k == "days").unwrap().1,
            Literal::List(vec![Literal::Str("M".to_string()), Literal::Str("W".to_string())])
        );
    }

    #[test]
    fn literal_to_json_round_trips_nested_structures() {
        let (_, args) = parse_call(r#"f(a=1, b=[1, 2], c={"x": true})"#).unwrap();
        let c = args.iter().find(|(k, _)| k == "c").unwrap();
        assert_eq!(c.1.to_json(), serde_json::json!({"x": true}));
    }
}
