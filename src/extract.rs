use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// One known place a page may embed machine-readable state.
#[derive(Debug, Clone, Copy)]
pub enum StateLocation {
    /// `window.__NAME__ = {...};` style hydration assignment.
    HydrationVar(&'static str),
    /// `<script id="name" ...>{...}</script>` payload.
    ScriptId(&'static str),
}

static LD_JSON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<script[^>]*type\s*=\s*["']application/ld\+json["'][^>]*>(.*?)</script>"#)
        .expect("ld+json regex")
});

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag regex"));

static TR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").expect("tr regex"));

static TD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<t[dh][^>]*>(.*?)</t[dh]>").expect("td regex"));

/// Try each known embedded-state location in order and return the first one
/// whose payload parses. `None` means the page carries no usable state and
/// the caller must fall back to a less precise strategy.
pub fn extract_structured_state(html: &str, locations: &[StateLocation]) -> Option<Value> {
    for location in locations {
        let candidate = match location {
            StateLocation::HydrationVar(name) => hydration_payload(html, name),
            StateLocation::ScriptId(id) => script_payload(html, id),
        };
        let Some(raw) = candidate else {
            continue;
        };
        match serde_json::from_str::<Value>(raw.trim()) {
            Ok(value) if !value.is_null() => return Some(value),
            Ok(_) => continue,
            Err(err) => {
                log::debug!("embedded state at {location:?} did not parse: {err}");
                continue;
            }
        }
    }
    None
}

/// Parse every ld+json block independently; blocks that fail to parse are
/// skipped rather than aborting the scan.
pub fn extract_linked_data(html: &str) -> Vec<Value> {
    let mut docs = Vec::new();
    for captures in LD_JSON_RE.captures_iter(html) {
        let Some(body) = captures.get(1) else {
            continue;
        };
        match serde_json::from_str::<Value>(body.as_str().trim()) {
            Ok(Value::Array(items)) => docs.extend(items),
            Ok(value) if !value.is_null() => docs.push(value),
            Ok(_) => {}
            Err(err) => log::debug!("skipping unparseable ld+json block: {err}"),
        }
    }
    docs
}

fn hydration_payload<'a>(html: &'a str, name: &str) -> Option<&'a str> {
    let at = html.find(name)?;
    let after = &html[at + name.len()..];
    let eq = after.find('=')?;
    let rest = &after[eq + 1..];
    let open = rest.find(['{', '['])?;
    balanced_json_slice(&rest[open..])
}

fn script_payload<'a>(html: &'a str, id: &str) -> Option<&'a str> {
    let re = Regex::new(&format!(
        r#"(?is)<script[^>]*\bid\s*=\s*["']{}["'][^>]*>(.*?)</script>"#,
        regex::escape(id)
    ))
    .ok()?;
    re.captures(html)?.get(1).map(|m| m.as_str())
}

/// Slice out one balanced JSON object or array, honoring string literals and
/// escapes. Input must start at the opening brace/bracket.
fn balanced_json_slice(raw: &str) -> Option<&str> {
    let bytes = raw.as_bytes();
    let (open, close) = match bytes.first()? {
        b'{' => (b'{', b'}'),
        b'[' => (b'[', b']'),
        _ => return None,
    };
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, &byte) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        if byte == b'"' {
            in_string = true;
        } else if byte == open {
            depth += 1;
        } else if byte == close {
            depth -= 1;
            if depth == 0 {
                return Some(&raw[..=idx]);
            }
        }
    }
    None
}

/// Evaluate ordered extraction strategies until one yields a non-empty list.
pub fn run_chain<T>(strategies: Vec<Box<dyn Fn() -> Vec<T> + '_>>) -> Vec<T> {
    for strategy in strategies {
        let out = strategy();
        if !out.is_empty() {
            return out;
        }
    }
    Vec::new()
}

/// Single-value variant of [`run_chain`].
pub fn run_chain_opt<T>(strategies: Vec<Box<dyn Fn() -> Option<T> + '_>>) -> Option<T> {
    strategies.into_iter().find_map(|strategy| strategy())
}

/// Last-resort scraping over visually tabular markup: every `<tr>` becomes a
/// list of cleaned cell strings. Header rows come out like any other row;
/// callers filter by shape.
pub fn table_rows(html: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for row in TR_RE.captures_iter(html) {
        let Some(body) = row.get(1) else {
            continue;
        };
        let cells: Vec<String> = TD_RE
            .captures_iter(body.as_str())
            .filter_map(|cell| cell.get(1))
            .map(|cell| normalize_text(cell.as_str()).unwrap_or_default())
            .collect();
        if !cells.is_empty() {
            rows.push(cells);
        }
    }
    rows
}

/// Trim, strip markup and entities, collapse whitespace. Empty-after-cleanup
/// input is "no data", never an error.
pub fn normalize_text(raw: &str) -> Option<String> {
    let stripped = TAG_RE.replace_all(raw, " ");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">");
    let collapsed = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Tolerant numeric parse: strips decoration, accepts thousands separators.
pub fn parse_number(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() || s == "-" {
        return None;
    }
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-' || *c == ',')
        .collect();
    let cleaned = cleaned.replace(',', "");
    if cleaned.is_empty() || cleaned == "-" {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y", "%B %d, %Y", "%b %d, %Y"];

/// Tolerant date parse across the formats the sources actually emit.
pub fn to_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(stamp) = DateTime::parse_from_rfc3339(s) {
        return Some(stamp.date_naive());
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Some(date);
        }
    }
    None
}

/// First present key rendered as cleaned text; numbers are accepted too since
/// sources disagree on whether e.g. jersey numbers are strings.
pub fn pick_string(value: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(v) = value.get(*key)
            && let Some(text) = value_to_text(v)
        {
            return Some(text);
        }
    }
    None
}

pub fn pick_f64(value: &Value, keys: &[&str]) -> Option<f64> {
    for key in keys {
        if let Some(v) = value.get(*key) {
            if let Some(num) = v.as_f64() {
                return Some(num);
            }
            if let Some(s) = v.as_str()
                && let Some(num) = parse_number(s)
            {
                return Some(num);
            }
        }
    }
    None
}

pub fn pick_u32(value: &Value, keys: &[&str]) -> Option<u32> {
    let num = pick_f64(value, keys)?;
    if num.is_finite() && num >= 0.0 {
        Some(num.round() as u32)
    } else {
        None
    }
}

fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => normalize_text(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
