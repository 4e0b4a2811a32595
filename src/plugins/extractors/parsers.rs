//! HTML and JSON helpers shared by the storefront extractors.

use regex::Regex;
use rust_decimal::Decimal;
use scraper::{Html, Selector};
use serde_json::Value;
use std::str::FromStr;
use std::sync::OnceLock;
use url::Url;

use crate::utils::error::FetchError;

fn price_regex() -> Option<&'static Regex> {
    static PRICE: OnceLock<Option<Regex>> = OnceLock::new();
    PRICE
        .get_or_init(|| Regex::new(r"(\d{1,3}(?:,\d{3})+(?:\.\d{1,2})?|\d+(?:\.\d{1,2})?)").ok())
        .as_ref()
}

/// Yield every JSON payload from `<script>` tags matching `selector`.
/// Scripts that are empty or not valid JSON are skipped.
pub fn json_scripts(document: &Html, selector: &str) -> Vec<Value> {
    let Ok(selector) = Selector::parse(selector) else {
        return Vec::new();
    };
    document
        .select(&selector)
        .filter_map(|script| {
            let text: String = script.text().collect();
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            serde_json::from_str(text).ok()
        })
        .collect()
}

fn flatten_into<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| flatten_into(item, out)),
        Value::Object(map) => {
            out.push(value);
            for nested in ["@graph", "itemListElement"] {
                if let Some(children) = map.get(nested) {
                    flatten_into(children, out);
                }
            }
        }
        _ => {}
    }
}

fn is_type(value: &Value, expected: &str) -> bool {
    match value.get("@type") {
        Some(Value::String(t)) => t == expected,
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some(expected)),
        _ => false,
    }
}

/// Every schema.org `Product` found in the page's JSON-LD blocks, including
/// products wrapped in `ListItem`s or an `@graph`.
pub fn ld_products(document: &Html) -> Vec<Value> {
    let payloads = json_scripts(document, r#"script[type="application/ld+json"]"#);
    let mut objects = Vec::new();
    for payload in &payloads {
        flatten_into(payload, &mut objects);
    }

    objects
        .into_iter()
        .filter_map(|object| {
            if is_type(object, "ListItem") {
                object.get("item").filter(|item| is_type(item, "Product"))
            } else if is_type(object, "Product") {
                Some(object)
            } else {
                None
            }
        })
        .cloned()
        .collect()
}

/// Parse a price from retailer text such as `$1,299.99` or `129.00 USD`.
pub fn parse_price(text: &str) -> Option<Decimal> {
    let captures = price_regex()?.captures(text)?;
    let digits = captures.get(1)?.as_str().replace(',', "");
    Decimal::from_str(&digits).ok()
}

/// Price from a JSON value that may be a number or a string.
pub fn price_from_json(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => parse_price(s),
        _ => None,
    }
}

/// Price from the first non-null of `fields`, keeping the raw text when it
/// does not parse as an amount.
pub fn price_at(value: &Value, fields: &[&str]) -> (Option<Decimal>, Option<String>) {
    let Some(raw) = fields.iter().find_map(|field| value.get(*field).filter(|v| !v.is_null())) else {
        return (None, None);
    };
    let price = price_from_json(raw);
    let display = match raw {
        Value::String(text) if price.is_none() => Some(text.clone()),
        _ => None,
    };
    (price, display)
}

/// First non-empty string among `fields` of `value`.
pub fn first_str<'a>(value: &'a Value, fields: &[&str]) -> Option<&'a str> {
    fields
        .iter()
        .filter_map(|field| value.get(*field).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
}

/// Identifier that may be serialized as a string or a number.
pub fn first_id(value: &Value, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|field| match value.get(*field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Size label from the first of `fields` holding a string or number.
pub fn size_label(value: &Value, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .find_map(|field| value.get(*field).filter(|v| !v.is_null()))
        .and_then(|size| match size {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
}

/// The array at `path` inside the page's `__NEXT_DATA__` payload.
///
/// A page without the payload, or whose payload lacks the array, has changed
/// layout and is reported as unparsable.
pub fn next_data_items(url: &str, html: &str, path: &[&str]) -> Result<Vec<Value>, FetchError> {
    let document = Html::parse_document(html);
    let payloads = json_scripts(&document, "script#__NEXT_DATA__");
    if payloads.is_empty() {
        return Err(FetchError::unparsable(url, "no __NEXT_DATA__ payload"));
    }
    payloads
        .iter()
        .find_map(|payload| pointer(payload, path).and_then(Value::as_array))
        .cloned()
        .ok_or_else(|| FetchError::unparsable(url, format!("__NEXT_DATA__ has nothing at {}", path.join("."))))
}

/// The array at `path` in a JSON API response.
pub fn json_items<'a>(url: &str, body: &'a Value, path: &[&str]) -> Result<&'a Vec<Value>, FetchError> {
    pointer(body, path)
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::unparsable(url, format!("response has no {} array", path.join("."))))
}

/// Resolve `href` against `base`, passing absolute URLs through.
pub fn absolutize(base: &Url, href: &str) -> String {
    let href = href.trim();
    if href.is_empty() {
        return String::new();
    }
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// `application/x-www-form-urlencoded` form of a search query.
pub fn encode_query(query: &str) -> String {
    url::form_urlencoded::byte_serialize(query.as_bytes()).collect()
}

/// Fill the `{query}` placeholder of a path template.
pub fn render_path(template: &str, query: &str) -> String {
    template.replace("{query}", &encode_query(query))
}

/// Walk a dotted path of object keys.
pub fn pointer<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(*key))
}
