//! Wire value decoding
//!
//! The grammar nests `<value>` elements arbitrarily deep, so sibling
//! boundaries cannot be found with a single-pass pattern match. Decoding
//! scans with an explicit open/close depth counter and recurses exactly
//! once per complete segment.

use crate::error::{Error, Result};
use crate::util::compact_text;

use super::Value;

/// Decode a response envelope into its single return value.
///
/// A `<fault>` envelope decodes into [`Value::Fault`] carrying the first
/// embedded string as its message.
pub fn decode_response(xml: &str) -> Result<Value> {
    let first_value = split_segments(xml, "value")?
        .into_iter()
        .next()
        .ok_or_else(|| Error::Parse("response contains no value element".to_string()))?;

    let value = parse_value(first_value.trim())?;

    if xml.contains("<fault>") {
        let message = value
            .first_string()
            .unwrap_or("unknown fault")
            .to_string();
        return Ok(Value::Fault(message));
    }

    Ok(value)
}

/// Parse the inner content of one `<value>` element.
fn parse_value(content: &str) -> Result<Value> {
    let content = content.trim();
    if content.is_empty() {
        // <value></value> defaults to the empty string
        return Ok(Value::Str(String::new()));
    }

    if let Some(inner) = strip_tag(content, "int").or_else(|| strip_tag(content, "i4")) {
        return inner
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| Error::Parse(format!("invalid integer: {}", compact_text(inner))));
    }

    if let Some(inner) = strip_tag(content, "double") {
        return inner
            .trim()
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|_| Error::Parse(format!("invalid double: {}", compact_text(inner))));
    }

    if let Some(inner) = strip_tag(content, "boolean") {
        return match inner.trim() {
            "1" => Ok(Value::Bool(true)),
            "0" => Ok(Value::Bool(false)),
            other => Err(Error::Parse(format!("invalid boolean: {}", compact_text(other)))),
        };
    }

    if content == "<string/>" {
        return Ok(Value::Str(String::new()));
    }

    if let Some(inner) = strip_tag(content, "string") {
        return Ok(Value::Str(unescape(inner)));
    }

    if let Some(inner) = strip_tag(content, "array") {
        let data = strip_tag(inner.trim(), "data")
            .ok_or_else(|| Error::Parse("array without data element".to_string()))?;
        let mut items = Vec::new();
        for segment in split_segments(data, "value")? {
            items.push(parse_value(segment)?);
        }
        return Ok(Value::Array(items));
    }

    if let Some(inner) = strip_tag(content, "struct") {
        let mut members = Vec::new();
        for member in split_segments(inner, "member")? {
            members.push(parse_member(member)?);
        }
        return Ok(Value::Struct(members));
    }

    if content.starts_with('<') {
        return Err(Error::Parse(format!(
            "unrecognized value element: {}",
            compact_text(content)
        )));
    }

    // Untyped content defaults to string in this grammar
    Ok(Value::Str(unescape(content)))
}

/// Parse one `<member>` inner: a `<name>` followed by a `<value>`.
fn parse_member(member: &str) -> Result<(String, Value)> {
    let name = split_segments(member, "name")?
        .into_iter()
        .next()
        .ok_or_else(|| Error::Parse("struct member without name".to_string()))?;
    let value = split_segments(member, "value")?
        .into_iter()
        .next()
        .ok_or_else(|| Error::Parse("struct member without value".to_string()))?;
    Ok((unescape(name.trim()), parse_value(value)?))
}

/// Inner slice of `content` when it is exactly one `<tag>…</tag>` element.
fn strip_tag<'a>(content: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    content
        .strip_prefix(open.as_str())
        .and_then(|rest| rest.strip_suffix(close.as_str()))
}

/// Split out the inner content of every top-level `<tag>…</tag>` pair,
/// tracking nesting depth so nested pairs stay inside their parent
/// segment.
fn split_segments<'a>(s: &'a str, tag: &str) -> Result<Vec<&'a str>> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");

    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut i = 0usize;

    while i < s.len() {
        let rest = &s[i..];
        if rest.starts_with(open.as_str()) {
            if depth == 0 {
                start = i + open.len();
            }
            depth += 1;
            i += open.len();
        } else if rest.starts_with(close.as_str()) {
            if depth == 0 {
                return Err(Error::Parse(format!("unbalanced </{tag}>")));
            }
            depth -= 1;
            if depth == 0 {
                segments.push(&s[start..i]);
            }
            i += close.len();
        } else {
            i += rest.chars().next().map_or(1, char::len_utf8);
        }
    }

    if depth != 0 {
        return Err(Error::Parse(format!("unbalanced <{tag}>")));
    }

    Ok(segments)
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
