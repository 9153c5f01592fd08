use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::ValidationError;

/// Top-level option keys. `cntlog` and `link` are the names older page
/// scripts use for `log` and `navigation`.
const BUNDLE_KEYS: [&str; 4] = ["log", "navigation", "cntlog", "link"];

/// The user action a beacon reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Click,
    Impression,
}

impl EventKind {
    /// Value of the beacon's `event` parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Click => "click",
            EventKind::Impression => "impression",
        }
    }

    /// Whether the `log` entries must carry a `label`
    pub fn requires_label(&self) -> bool {
        matches!(self, EventKind::Click)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dot-joined page path, sent as the beacon's `ctl` parameter.
///
/// `/spot/auwallet/store` becomes `spot.auwallet.store`. Only the leading
/// slash is dropped; a trailing slash turns into a trailing dot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageIdentifier(String);

impl PageIdentifier {
    pub fn from_path(path: &str) -> Self {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        Self(trimmed.replace('/', "."))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single `log` value. Rendered verbatim into the query string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LogValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Flag(bool),
    Null,
}

impl fmt::Display for LogValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogValue::Text(s) => f.write_str(s),
            LogValue::Integer(n) => write!(f, "{}", n),
            LogValue::Float(n) => f.write_str(&js_number(*n)),
            LogValue::Flag(b) => write!(f, "{}", b),
            LogValue::Null => f.write_str("null"),
        }
    }
}

/// Format `n` the way JavaScript's `String(n)` does.
///
/// Rust's shortest round-trip digits match JS; only the notation differs.
/// JS switches to exponent form at `1e21` and below `1e-6`, and always
/// signs the exponent.
fn js_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        // -0 prints as "0"
        return "0".to_string();
    }
    let magnitude = n.abs();
    if magnitude < 1e21 && magnitude >= 1e-6 {
        return format!("{}", n);
    }
    let exp = format!("{:e}", n);
    match exp.split_once('e') {
        Some((mantissa, power)) if !power.starts_with('-') => format!("{}e+{}", mantissa, power),
        _ => exp,
    }
}

impl From<&str> for LogValue {
    fn from(value: &str) -> Self {
        LogValue::Text(value.to_string())
    }
}

impl From<String> for LogValue {
    fn from(value: String) -> Self {
        LogValue::Text(value)
    }
}

impl From<i64> for LogValue {
    fn from(value: i64) -> Self {
        LogValue::Integer(value)
    }
}

impl From<f64> for LogValue {
    fn from(value: f64) -> Self {
        LogValue::Float(value)
    }
}

impl From<bool> for LogValue {
    fn from(value: bool) -> Self {
        LogValue::Flag(value)
    }
}

/// Caller-supplied beacon parameters, kept in insertion order.
///
/// Keys are not deduplicated; pushing the same key twice sends it twice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogParams {
    entries: Vec<(String, LogValue)>,
}

impl LogParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, builder style
    pub fn with(mut self, key: impl Into<String>, value: impl Into<LogValue>) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<LogValue>) {
        self.entries.push((key.into(), value.into()));
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn get(&self, key: &str) -> Option<&LogValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LogValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<LogValue>> FromIterator<(K, V)> for LogParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<'de> Deserialize<'de> for LogParams {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ParamsVisitor;

        impl<'de> Visitor<'de> for ParamsVisitor {
            type Value = LogParams;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of string, number, boolean or null values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<LogParams, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, LogValue>()? {
                    entries.push((key, value));
                }
                Ok(LogParams { entries })
            }
        }

        deserializer.deserialize_map(ParamsVisitor)
    }
}

/// Where to go once the beacon has been issued.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Navigation {
    #[serde(default)]
    pub url: Option<String>,
    /// Open in a new browsing context instead of replacing the current page.
    #[serde(default, alias = "target", deserialize_with = "deserialize_truthy")]
    pub new_tab: bool,
}

impl Navigation {
    /// Replace the current page with `url`
    pub fn same_tab(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            new_tab: false,
        }
    }

    /// Open `url` in a new browsing context
    pub fn new_tab(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            new_tab: true,
        }
    }

    /// The URL to visit. An empty URL counts as no target.
    pub fn target(&self) -> Option<&str> {
        self.url.as_deref().filter(|url| !url.is_empty())
    }
}

/// Accept any JSON value and apply JavaScript truthiness, so that
/// `target: "_blank"` means a new tab.
fn deserialize_truthy<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => false,
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    })
}

/// Options handed to `click` / `impression`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterBundle {
    #[serde(default, alias = "cntlog")]
    pub log: Option<LogParams>,
    #[serde(default, alias = "link")]
    pub navigation: Option<Navigation>,
}

impl ParameterBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(mut self, log: LogParams) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_navigation(mut self, navigation: Navigation) -> Self {
        self.navigation = Some(navigation);
        self
    }

    /// Parse an options object from JSON text.
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| ValidationError::Malformed(e.to_string()))?;
        Self::from_value(value)
    }

    /// Check the top-level keys, then decode.
    pub fn from_value(value: Value) -> Result<Self, ValidationError> {
        match &value {
            Value::Null => return Err(ValidationError::MissingOptions),
            Value::Object(object) => {
                if let Some(key) = object.keys().find(|k| !BUNDLE_KEYS.contains(&k.as_str())) {
                    return Err(ValidationError::UnknownField(key.clone()));
                }
            }
            other => {
                return Err(ValidationError::Malformed(format!(
                    "expected an options object, got {}",
                    other
                )))
            }
        }
        serde_json::from_value(value).map_err(|e| ValidationError::Malformed(e.to_string()))
    }
}

/// Render `key1=value1&key2=value2`, no trailing separator.
/// Nothing is escaped.
pub fn flatten_query(params: Option<&LogParams>) -> String {
    let Some(params) = params else {
        return String::new();
    };
    params
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&")
}

/// A fully built beacon URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeaconRequest {
    url: String,
}

impl BeaconRequest {
    /// `{base}{timestamp}?ctl={page}&event={kind}&{params}`
    pub fn new(
        base_path: &str,
        timestamp_ms: u64,
        page: &PageIdentifier,
        kind: EventKind,
        params: &LogParams,
    ) -> Self {
        let mut url = format!("{}{}?ctl={}&event={}", base_path, timestamp_ms, page, kind);
        let query = flatten_query(Some(params));
        if !query.is_empty() {
            url.push('&');
            url.push_str(&query);
        }
        Self { url }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- PageIdentifier ---

    #[test]
    fn test_page_identifier_dots() {
        let page = PageIdentifier::from_path("/spot/auwallet/store");
        assert_eq!(page.as_str(), "spot.auwallet.store");
    }

    #[test]
    fn test_page_identifier_root_and_trailing_slash() {
        assert_eq!(PageIdentifier::from_path("/").as_str(), "");
        assert_eq!(PageIdentifier::from_path("/a/b/").as_str(), "a.b.");
        // No leading slash: nothing dropped
        assert_eq!(PageIdentifier::from_path("a/b").as_str(), "a.b");
    }

    // --- flatten_query ---

    #[test]
    fn test_flatten_query_preserves_order() {
        let params = LogParams::new().with("a", "1").with("b", "2");
        assert_eq!(flatten_query(Some(&params)), "a=1&b=2");

        let reversed = LogParams::new().with("b", "2").with("a", "1");
        assert_eq!(flatten_query(Some(&reversed)), "b=2&a=1");
    }

    #[test]
    fn test_flatten_query_empty() {
        assert_eq!(flatten_query(None), "");
        assert_eq!(flatten_query(Some(&LogParams::new())), "");
    }

    #[test]
    fn test_flatten_query_is_verbatim() {
        let params = LogParams::new()
            .with("q", "a b&c")
            .with("q", "again")
            .with("n", 3i64)
            .with("x", 1.5)
            .with("ok", true);
        assert_eq!(
            flatten_query(Some(&params)),
            "q=a b&c&q=again&n=3&x=1.5&ok=true"
        );
    }

    #[test]
    fn test_whole_float_renders_like_js() {
        assert_eq!(LogValue::Float(1.0).to_string(), "1");
        assert_eq!(LogValue::Float(-0.0).to_string(), "0");
        assert_eq!(LogValue::Float(0.25).to_string(), "0.25");
    }

    #[test]
    fn test_float_exponent_notation_like_js() {
        assert_eq!(LogValue::Float(1e21).to_string(), "1e+21");
        assert_eq!(LogValue::Float(1.5e22).to_string(), "1.5e+22");
        assert_eq!(LogValue::Float(1e20).to_string(), "100000000000000000000");
        assert_eq!(LogValue::Float(1e-7).to_string(), "1e-7");
        assert_eq!(LogValue::Float(-2.5e-8).to_string(), "-2.5e-8");
        assert_eq!(LogValue::Float(0.000001).to_string(), "0.000001");
    }

    #[test]
    fn test_non_finite_floats_render_like_js() {
        assert_eq!(LogValue::Float(f64::NAN).to_string(), "NaN");
        assert_eq!(LogValue::Float(f64::INFINITY).to_string(), "Infinity");
        assert_eq!(LogValue::Float(f64::NEG_INFINITY).to_string(), "-Infinity");
    }

    #[test]
    fn test_null_log_value_is_kept() {
        let bundle =
            ParameterBundle::from_json(r#"{"log": {"label": "x", "ref": null}}"#).unwrap();
        let log = bundle.log.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.get("ref"), Some(&LogValue::Null));
        assert_eq!(flatten_query(Some(&log)), "label=x&ref=null");
    }

    // --- BeaconRequest ---

    #[test]
    fn test_beacon_url_layout() {
        let page = PageIdentifier::from_path("/highway/route/result");
        let params = LogParams::new()
            .with("label", "highway.route.result")
            .with("type", "pc");
        let request = BeaconRequest::new(
            "/pcstorage/img/cntlog/",
            1700000000000,
            &page,
            EventKind::Impression,
            &params,
        );
        assert_eq!(
            request.url(),
            "/pcstorage/img/cntlog/1700000000000?ctl=highway.route.result&event=impression&label=highway.route.result&type=pc"
        );
    }

    #[test]
    fn test_beacon_url_without_params_has_no_trailing_separator() {
        let page = PageIdentifier::from_path("/top");
        let request = BeaconRequest::new("/b/", 5, &page, EventKind::Click, &LogParams::new());
        assert_eq!(request.url(), "/b/5?ctl=top&event=click");
    }

    // --- ParameterBundle parsing ---

    #[test]
    fn test_parse_full_bundle() {
        let bundle = ParameterBundle::from_json(
            r#"{"log": {"label": "x", "pos": 2}, "navigation": {"url": "https://x", "newTab": true}}"#,
        )
        .unwrap();
        let log = bundle.log.unwrap();
        assert_eq!(log.get("label"), Some(&LogValue::Text("x".into())));
        assert_eq!(log.get("pos"), Some(&LogValue::Integer(2)));
        assert_eq!(bundle.navigation, Some(Navigation::new_tab("https://x")));
    }

    #[test]
    fn test_parse_keeps_document_order() {
        let bundle = ParameterBundle::from_json(r#"{"log": {"z": "1", "a": "2", "m": "3"}}"#).unwrap();
        assert_eq!(flatten_query(bundle.log.as_ref()), "z=1&a=2&m=3");
    }

    #[test]
    fn test_parse_rejects_unknown_key() {
        let err = ParameterBundle::from_json(r#"{"log": {"label": "x"}, "extra": 1}"#).unwrap_err();
        assert_eq!(err, ValidationError::UnknownField("extra".into()));
    }

    #[test]
    fn test_parse_null_and_non_object() {
        assert_eq!(
            ParameterBundle::from_json("null").unwrap_err(),
            ValidationError::MissingOptions
        );
        assert!(matches!(
            ParameterBundle::from_json("[1, 2]").unwrap_err(),
            ValidationError::Malformed(_)
        ));
        assert!(matches!(
            ParameterBundle::from_json("{").unwrap_err(),
            ValidationError::Malformed(_)
        ));
    }

    #[test]
    fn test_parse_rejects_nested_log_value() {
        let err = ParameterBundle::from_json(r#"{"log": {"label": {"deep": 1}}}"#).unwrap_err();
        assert!(matches!(err, ValidationError::Malformed(_)));
    }

    #[test]
    fn test_parse_legacy_keys() {
        let bundle = ParameterBundle::from_json(
            r#"{"cntlog": {"label": "old"}, "link": {"url": "/next", "target": "_blank"}}"#,
        )
        .unwrap();
        assert!(bundle.log.unwrap().contains_key("label"));
        assert_eq!(bundle.navigation, Some(Navigation::new_tab("/next")));
    }

    #[test]
    fn test_target_truthiness() {
        let parse = |json: &str| {
            ParameterBundle::from_json(json)
                .unwrap()
                .navigation
                .unwrap()
                .new_tab
        };
        assert!(!parse(r#"{"link": {"url": "/a", "target": ""}}"#));
        assert!(!parse(r#"{"link": {"url": "/a", "target": 0}}"#));
        assert!(!parse(r#"{"link": {"url": "/a", "target": null}}"#));
        assert!(parse(r#"{"link": {"url": "/a", "target": 1}}"#));
        assert!(!parse(r#"{"navigation": {"url": "/a"}}"#));
    }

    #[test]
    fn test_empty_url_is_no_target() {
        assert_eq!(Navigation::same_tab("").target(), None);
        assert_eq!(Navigation::default().target(), None);
        assert_eq!(Navigation::same_tab("/x").target(), Some("/x"));
    }
}
