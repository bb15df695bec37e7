//! Declarative response extraction.
//!
//! HTTP applications describe "is it done?" and "did it work?" as path queries
//! into the JSON their endpoints return, plus regex keywords the selected
//! value must match. Strings such as a health-check URL or a result message
//! can also embed one `{{<prefix>$.path}}` marker that is replaced with the
//! value the path selects.
//!
//! Paths are RFC 9535 JSONPath (`serde_json_path`): member and index
//! selectors, wildcards, slices, `..` descendants and `[?(...)]` filters.
//! A path made only of member and index selectors yields the single value
//! it selects; any other path collects its matches into an array.

use regex::Regex;
use serde_json::Value;
use serde_json_path::JsonPath;

use crate::error::ExtractError;

/// Evaluate `path` against `document`.
///
/// Returns [`ExtractError::PathNotFound`] when the query selects nothing.
pub fn lookup(document: &Value, path: &str) -> Result<Value, ExtractError> {
    let query = JsonPath::parse(path).map_err(|e| ExtractError::InvalidPath {
        path: path.to_owned(),
        reason: e.to_string(),
    })?;
    let nodes = query.query(document).all();

    match nodes.as_slice() {
        [] => Err(ExtractError::PathNotFound { path: path.to_owned() }),
        [single] if is_singular(path) => Ok((*single).clone()),
        _ => Ok(Value::Array(nodes.iter().map(|v| (*v).clone()).collect())),
    }
}

/// Replace the `{{<marker_prefix>$...}}` marker in `template` with the
/// stringified value its path selects in `document`.
///
/// A template without a marker is returned unchanged. A marker whose path
/// selects nothing fails with [`ExtractError::PathNotFound`].
pub fn substitute(
    template: &str,
    marker_prefix: &str,
    document: &Value,
) -> Result<String, ExtractError> {
    let Some((marker, path)) = find_marker(template, marker_prefix) else {
        return Ok(template.to_owned());
    };
    let value = lookup(document, path)?;
    Ok(template.replace(marker, &value_to_string(&value)))
}

/// Check whether the value `path` selects matches the regex `keyword`.
///
/// An empty path asserts nothing and always matches.
pub fn matches_keyword(document: &Value, path: &str, keyword: &str) -> Result<bool, ExtractError> {
    if path.is_empty() {
        return Ok(true);
    }
    let value = lookup(document, path)?;
    let pattern = Regex::new(keyword).map_err(|e| ExtractError::InvalidPattern {
        pattern: keyword.to_owned(),
        reason: e.to_string(),
    })?;
    Ok(pattern.is_match(&value_to_string(&value)))
}

/// Render a JSON value as plain text: strings without quotes, scalars in
/// their natural form, containers as compact JSON.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => "null".to_owned(),
        other => other.to_string(),
    }
}

/// Locate the first marker. Returns the whole marker text and the path inside it.
fn find_marker<'a>(template: &'a str, marker_prefix: &str) -> Option<(&'a str, &'a str)> {
    let opening = format!("{{{{{marker_prefix}$");
    let start = template.find(&opening)?;
    let path_start = start + opening.len() - 1;
    let path_len = template[path_start..].find("}}")?;
    let path_end = path_start + path_len;
    Some((&template[start..path_end + 2], &template[path_start..path_end]))
}

/// Whether `path` can select at most one node: no wildcard, slice, union,
/// filter or descendant segment outside quoted member names.
fn is_singular(path: &str) -> bool {
    let mut quote = None;
    let mut previous = '\0';
    for c in path.chars() {
        match quote {
            Some(q) if c == q && previous != '\\' => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '*' | '?' | ':' | ',' => return false,
                '.' if previous == '.' => return false,
                _ => {}
            },
        }
        previous = c;
    }
    true
}
