//! Structured query-string parsing.
//!
//! Turns flat `application/x-www-form-urlencoded` input into a recursive
//! value tree: `a=1&b[c]=2&b[d][]=3` becomes `{a: 1, b: {c: 2, d: [3]}}`.
//! Malformed pairs are dropped silently; lookups on the resulting tree never
//! fail, they return the null variant.

use indexmap::IndexMap;
use memchr::memchr;
use std::fmt;
use std::ops::Index;

/// A parsed query-string value.
///
/// Scalars are coerced from their decoded text (integer, then float, then
/// `true`/`false`, then string). Dictionaries keep first-insertion order.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
    Array(Vec<QueryValue>),
    Dict(IndexMap<String, QueryValue>),
}

const NULL: QueryValue = QueryValue::Null;

impl QueryValue {
    /// Parses a query string (without the leading `?`) into a dictionary.
    ///
    /// Pairs are split on `&`; a pair must contain exactly one `=` and both
    /// halves must survive percent-decoding, or the pair is discarded.
    pub fn parse(query: &str) -> QueryValue {
        let mut root = QueryValue::Dict(IndexMap::new());
        let bytes = query.as_bytes();

        let mut start = 0;
        while start <= bytes.len() {
            let end = memchr(b'&', &bytes[start.min(bytes.len())..])
                .map(|pos| start + pos)
                .unwrap_or(bytes.len());

            if let Some((key, value)) = split_pair(&query[start..end]) {
                insert(&mut root, &key, coerce_scalar(&value));
            }

            start = end + 1;
        }

        root
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, QueryValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            QueryValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            QueryValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            QueryValue::Double(d) => Some(*d),
            QueryValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            QueryValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Element count for containers; 0 for scalars.
    pub fn len(&self) -> usize {
        match self {
            QueryValue::Array(items) => items.len(),
            QueryValue::Dict(map) => map.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keyed access; the null variant on miss or on a non-dictionary.
    pub fn get(&self, key: &str) -> &QueryValue {
        match self {
            QueryValue::Dict(map) => map.get(key).unwrap_or(&NULL),
            _ => &NULL,
        }
    }

    /// Indexed access; the null variant on miss or on a non-array.
    pub fn at(&self, index: usize) -> &QueryValue {
        match self {
            QueryValue::Array(items) => items.get(index).unwrap_or(&NULL),
            _ => &NULL,
        }
    }
}

impl Index<&str> for QueryValue {
    type Output = QueryValue;

    fn index(&self, key: &str) -> &QueryValue {
        self.get(key)
    }
}

impl Index<usize> for QueryValue {
    type Output = QueryValue;

    fn index(&self, index: usize) -> &QueryValue {
        self.at(index)
    }
}

impl fmt::Display for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryValue::Null => write!(f, "null"),
            QueryValue::Bool(b) => write!(f, "{b}"),
            QueryValue::Int(i) => write!(f, "{i}"),
            QueryValue::Double(d) => write!(f, "{d}"),
            QueryValue::Str(s) => write!(f, "{s}"),
            QueryValue::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            QueryValue::Dict(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

// Pair handling

/// Splits one `key=value` segment, requiring exactly one `=`. Both halves
/// are percent-decoded and trimmed of space, `"` and newline characters;
/// a decoding failure on either half discards the whole pair.
fn split_pair(segment: &str) -> Option<(String, String)> {
    let eq = memchr(b'=', segment.as_bytes())?;
    if memchr(b'=', &segment.as_bytes()[eq + 1..]).is_some() {
        return None;
    }

    let key = decode_component(&segment[..eq])?;
    let value = decode_component(&segment[eq + 1..])?;
    Some((key, value))
}

fn decode_component(raw: &str) -> Option<String> {
    let decoded = percent_decode(raw)?;
    Some(decoded.trim_matches([' ', '"', '\n']).to_string())
}

fn percent_decode(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());

    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hi = hex_digit(*bytes.get(i + 1)?)?;
                let lo = hex_digit(*bytes.get(i + 2)?)?;
                out.push(hi << 4 | lo);
                i += 3;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    String::from_utf8(out).ok()
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Coercion priority: integer, float, boolean, string.
fn coerce_scalar(text: &str) -> QueryValue {
    if let Ok(i) = text.parse::<i64>() {
        return QueryValue::Int(i);
    }
    if let Ok(d) = text.parse::<f64>() {
        return QueryValue::Double(d);
    }
    match text {
        "true" => QueryValue::Bool(true),
        "false" => QueryValue::Bool(false),
        _ => QueryValue::Str(text.to_string()),
    }
}

// Key grammar

/// Matches the bracket pattern `head[subscript]` at the start of a key.
///
/// `head` may not contain `]`, `,`, `.` or whitespace; `subscript` may not
/// contain `[`, `]`, `,`, `.` or whitespace. Returns the two groups and the
/// remainder of the key past the closing bracket.
fn match_bracket(key: &str) -> Option<(&str, &str, &str)> {
    let open = key.find('[')?;
    let head = &key[..open];
    if head.bytes().any(invalid_head_byte) {
        return None;
    }

    let after_open = &key[open + 1..];
    let close = after_open.find(']')?;
    let subscript = &after_open[..close];
    if subscript.bytes().any(invalid_subscript_byte) {
        return None;
    }

    Some((head, subscript, &after_open[close + 1..]))
}

fn invalid_head_byte(b: u8) -> bool {
    matches!(b, b']' | b',' | b'.') || b.is_ascii_whitespace()
}

fn invalid_subscript_byte(b: u8) -> bool {
    matches!(b, b'[' | b']' | b',' | b'.') || b.is_ascii_whitespace()
}

/// Recursive insertion. Nested steps descend through dictionaries, with the
/// subscript rejoined to the key remainder: `b[d][]` descends into `b` and
/// re-applies as `d[]`. An empty subscript with no remainder appends to an
/// array at `head`. Scalar/container collisions resolve toward the newer
/// write, except that a container write never replaces a container of the
/// same kind.
fn insert(root: &mut QueryValue, key: &str, value: QueryValue) {
    match match_bracket(key) {
        Some((head, subscript, rest)) if !rest.is_empty() => {
            let slot = ensure_dict(root, head);
            let mut next = String::with_capacity(subscript.len() + rest.len());
            next.push_str(subscript);
            next.push_str(rest);
            insert(slot, &next, value);
        }
        Some((head, "", _)) => {
            if let QueryValue::Array(items) = ensure_array(root, head) {
                items.push(value);
            }
        }
        Some((head, subscript, _)) => {
            if let QueryValue::Dict(map) = ensure_dict(root, head) {
                map.insert(subscript.to_string(), value);
            }
        }
        None if !key.is_empty() => {
            as_dict(root).insert(key.to_string(), value);
        }
        None => match root {
            QueryValue::Array(items) => items.push(value),
            other => *other = value,
        },
    }
}

/// The slot `root[head]`, forced to a dictionary unless it already is one.
fn ensure_dict<'a>(root: &'a mut QueryValue, head: &str) -> &'a mut QueryValue {
    let slot = as_dict(root)
        .entry(head.to_string())
        .or_insert(QueryValue::Null);
    if !matches!(slot, QueryValue::Dict(_)) {
        *slot = QueryValue::Dict(IndexMap::new());
    }
    slot
}

/// The slot `root[head]`, forced to an array unless it already is one.
fn ensure_array<'a>(root: &'a mut QueryValue, head: &str) -> &'a mut QueryValue {
    let slot = as_dict(root)
        .entry(head.to_string())
        .or_insert(QueryValue::Null);
    if !matches!(slot, QueryValue::Array(_)) {
        *slot = QueryValue::Array(Vec::new());
    }
    slot
}

fn as_dict(root: &mut QueryValue) -> &mut IndexMap<String, QueryValue> {
    if !matches!(root, QueryValue::Dict(_)) {
        *root = QueryValue::Dict(IndexMap::new());
    }
    match root {
        QueryValue::Dict(map) => map,
        _ => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_and_nesting() {
        let q = QueryValue::parse("a=1&b[c]=2&b[d][]=3&b[d][]=4&x=true");

        assert_eq!(q["a"], QueryValue::Int(1));
        assert_eq!(q["b"]["c"], QueryValue::Int(2));
        assert_eq!(q["b"]["d"][0], QueryValue::Int(3));
        assert_eq!(q["b"]["d"][1], QueryValue::Int(4));
        assert_eq!(q["b"]["d"].len(), 2);
        assert_eq!(q["x"], QueryValue::Bool(true));

        assert_eq!(q["a"].as_i64(), Some(1));
        assert_eq!(q["a"].as_f64(), Some(1.0));
        assert_eq!(q["x"].as_bool(), Some(true));
        assert_eq!(q["a"].as_str(), None);
    }

    #[test]
    fn malformed_pairs_are_dropped() {
        let q = QueryValue::parse("a=1&bogus&c=2");

        assert_eq!(q["a"], QueryValue::Int(1));
        assert_eq!(q["c"], QueryValue::Int(2));
        assert_eq!(q.len(), 2);

        // A pair with two `=` is also malformed.
        let q = QueryValue::parse("a=1&b=2=3&c=4");
        assert_eq!(q.len(), 2);
        assert!(q["b"].is_null());
    }

    #[test]
    fn coercion_priority() {
        #[rustfmt::skip]
        let cases = [
            ("v=42",     QueryValue::Int(42)),
            ("v=-17",    QueryValue::Int(-17)),
            ("v=3.25",   QueryValue::Double(3.25)),
            ("v=true",   QueryValue::Bool(true)),
            ("v=false",  QueryValue::Bool(false)),
            ("v=True",   QueryValue::Str("True".to_string())),
            ("v=hello",  QueryValue::Str("hello".to_string())),
            ("v=",       QueryValue::Str(String::new())),
        ];

        for (query, expected) in cases {
            let q = QueryValue::parse(query);
            assert_eq!(q["v"], expected, "query: {query}");
        }
    }

    #[test]
    fn percent_decoding_and_trimming() {
        let q = QueryValue::parse("name=John%20Doe&quoted=%22deep%22&padded=%20x%20");
        assert_eq!(q["name"].as_str(), Some("John Doe"));
        assert_eq!(q["quoted"].as_str(), Some("deep"));
        assert_eq!(q["padded"].as_str(), Some("x"));

        // A broken escape discards the whole pair.
        let q = QueryValue::parse("bad=%ZZ&ok=1");
        assert!(q["bad"].is_null());
        assert_eq!(q["ok"], QueryValue::Int(1));
    }

    #[test]
    fn decoded_keys_nest() {
        let q = QueryValue::parse("a%5Bb%5D=7");
        assert_eq!(q["a"]["b"], QueryValue::Int(7));
    }

    #[test]
    fn dictionary_order_is_first_insertion() {
        let q = QueryValue::parse("z=1&a=2&m[second]=3&m[first]=4&a=5");

        match &q {
            QueryValue::Dict(map) => {
                let keys: Vec<_> = map.keys().map(String::as_str).collect();
                assert_eq!(keys, ["z", "a", "m"]);
            }
            other => panic!("expected dict, got {other:?}"),
        }
        match &q["m"] {
            QueryValue::Dict(map) => {
                let keys: Vec<_> = map.keys().map(String::as_str).collect();
                assert_eq!(keys, ["second", "first"]);
            }
            other => panic!("expected dict, got {other:?}"),
        }
        // Re-assignment keeps the original position, newest value.
        assert_eq!(q["a"], QueryValue::Int(5));
    }

    #[test]
    fn deep_nesting() {
        let q = QueryValue::parse("a[b][c][d]=v&a[b][e]=w");
        assert_eq!(q["a"]["b"]["c"]["d"].as_str(), Some("v"));
        assert_eq!(q["a"]["b"]["e"].as_str(), Some("w"));
    }

    #[test]
    fn collisions_replace_toward_newer_write() {
        // Scalar then container: container wins.
        let q = QueryValue::parse("a=1&a[b]=2");
        assert_eq!(q["a"]["b"], QueryValue::Int(2));

        // Container then scalar: scalar wins.
        let q = QueryValue::parse("a[b]=2&a=1");
        assert_eq!(q["a"], QueryValue::Int(1));

        // Same-typed container writes merge instead of replacing.
        let q = QueryValue::parse("a[]=1&a[]=2&a[]=3");
        assert_eq!(q["a"].len(), 3);
        let q = QueryValue::parse("a[x]=1&a[y]=2");
        assert_eq!(q["a"].len(), 2);
    }

    #[test]
    fn miss_yields_null() {
        let q = QueryValue::parse("a=1");

        assert!(q["missing"].is_null());
        assert!(q["a"]["nested"].is_null());
        assert!(q["a"][3].is_null());
        assert!(q["missing"]["deep"]["deeper"][7].is_null());
    }

    #[test]
    fn parse_is_deterministic() {
        let input = "a=1&b[c]=2&b[d][]=3&b[d][]=4&x=true";
        assert_eq!(QueryValue::parse(input), QueryValue::parse(input));
    }

    #[test]
    fn empty_inputs() {
        assert_eq!(QueryValue::parse("").len(), 0);
        assert_eq!(QueryValue::parse("&&&").len(), 0);
    }

    // Serialises a collision-free tree back to bracket syntax.
    fn serialise(prefix: &str, value: &QueryValue, out: &mut Vec<String>) {
        match value {
            QueryValue::Dict(map) => {
                for (key, item) in map {
                    let path = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{prefix}[{key}]")
                    };
                    serialise(&path, item, out);
                }
            }
            QueryValue::Array(items) => {
                for item in items {
                    out.push(format!("{prefix}[]={item}"));
                }
            }
            scalar => out.push(format!("{prefix}={scalar}")),
        }
    }

    #[test]
    fn round_trip() {
        let original = QueryValue::parse("a=1&b[c]=2.5&b[d][]=3&b[d][]=x&e[f][g]=true");

        let mut pairs = Vec::new();
        serialise("", &original, &mut pairs);
        let reparsed = QueryValue::parse(&pairs.join("&"));

        assert_eq!(original, reparsed);
    }
}
