//! # Response Parser
//!
//! Turns a raw response into the most structured form it supports:
//!
//! 1. JSON with a top-level `data` key becomes a list of item mappings.
//! 2. Any other JSON is returned unchanged.
//! 3. Tag-delimited markup is converted into a `serde_json::Value` tree.
//! 4. Everything else is handed back as the original text.
//!
//! The caller always gets something back; a body is never dropped.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};

/// One raw item extracted from a feed response.
pub type Item = Map<String, Value>;

/// Key under which the text of a mixed-content element is stored.
pub const TEXT_KEY: &str = "#text";

/// Result of [`parse`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedForm {
    /// Item mappings taken from a `data` envelope, in document order.
    StructuredItems(Vec<Item>),
    /// A decoded structure with no `data` envelope (JSON or converted markup).
    RawStructure(Value),
    /// The body text, untouched.
    RawText(String),
}

impl ParsedForm {
    /// The extracted items, or an empty slice for the raw forms.
    pub fn items(&self) -> &[Item] {
        match self {
            ParsedForm::StructuredItems(items) => items,
            _ => &[],
        }
    }
}

/// Parses a response body; see the module documentation for the order of attempts.
pub fn parse(body_text: &str, body_json: Option<&Value>) -> ParsedForm {
    if let Some(json) = body_json {
        return match json.get("data") {
            Some(data) => match extract_items(data) {
                Some(items) => ParsedForm::StructuredItems(items),
                None => ParsedForm::RawStructure(json.clone()),
            },
            None => ParsedForm::RawStructure(json.clone()),
        };
    }

    match parse_markup(body_text) {
        Some(tree) => ParsedForm::RawStructure(tree),
        None => ParsedForm::RawText(body_text.to_string()),
    }
}

/// Normalizes the value found under `data` into a list of items.
///
/// A sequence keeps its mapping elements. A mapping contributes its mapping values and
/// the mapping elements of its sequence values; when that yields nothing the mapping
/// itself is the only item. Scalars yield `None`.
pub fn extract_items(data: &Value) -> Option<Vec<Item>> {
    match data {
        Value::Array(elements) => Some(mappings(elements.iter())),
        Value::Object(map) => {
            let mut items = Vec::new();
            for value in map.values() {
                match value {
                    Value::Object(item) => items.push(item.clone()),
                    Value::Array(elements) => items.extend(mappings(elements.iter())),
                    _ => {}
                }
            }
            if items.is_empty() {
                items.push(map.clone());
            }
            Some(items)
        }
        _ => None,
    }
}

fn mappings<'a>(values: impl Iterator<Item = &'a Value>) -> Vec<Item> {
    values
        .filter_map(|value| value.as_object().cloned())
        .collect()
}

/// An element still waiting for its end tag.
struct OpenElement {
    name: String,
    fields: Item,
    text: String,
}

impl OpenElement {
    fn start(tag: &BytesStart<'_>) -> Option<Self> {
        let name = String::from_utf8(tag.name().as_ref().to_vec()).ok()?;
        let mut fields = Item::new();
        for attr in tag.attributes() {
            let attr = attr.ok()?;
            let key = String::from_utf8(attr.key.as_ref().to_vec()).ok()?;
            let value = attr.unescape_value().ok()?.into_owned();
            fields.insert(key, Value::String(value));
        }
        Some(Self {
            name,
            fields,
            text: String::new(),
        })
    }

    fn finish(mut self) -> (String, Value) {
        let value = if self.fields.is_empty() {
            if self.text.is_empty() {
                Value::Null
            } else {
                Value::String(self.text)
            }
        } else {
            if !self.text.is_empty() {
                self.fields.insert(TEXT_KEY.to_string(), Value::String(self.text));
            }
            Value::Object(self.fields)
        };
        (self.name, value)
    }
}

fn attach(parent: &mut Item, name: String, value: Value) {
    match parent.get_mut(&name) {
        // Element values are never arrays, so an array here is a list of repeats.
        Some(Value::Array(repeats)) => repeats.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            parent.insert(name, value);
        }
    }
}

/// Converts tag-delimited markup into a value tree.
///
/// Returns `None` for anything that is not a single well-formed root element:
/// plain text, several roots, text outside the root, mismatched or unclosed tags,
/// and unknown entities.
pub fn parse_markup(text: &str) -> Option<Value> {
    if !text.trim_start().starts_with('<') {
        return None;
    }

    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<OpenElement> = Vec::new();
    let mut root: Option<Value> = None;

    loop {
        let finished = match reader.read_event().ok()? {
            Event::Start(tag) => {
                stack.push(OpenElement::start(&tag)?);
                None
            }
            Event::Empty(tag) => Some(OpenElement::start(&tag)?.finish()),
            Event::End(_) => Some(stack.pop()?.finish()),
            Event::Text(content) => {
                let content = content.unescape().ok()?;
                if content.trim().is_empty() {
                    None
                } else {
                    stack.last_mut()?.text.push_str(&content);
                    None
                }
            }
            Event::CData(content) => {
                let content = String::from_utf8_lossy(&content.into_inner()).into_owned();
                stack.last_mut()?.text.push_str(&content);
                None
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions, doctype.
            _ => None,
        };

        if let Some((name, value)) = finished {
            match stack.last_mut() {
                Some(parent) => attach(&mut parent.fields, name, value),
                None if root.is_none() => root = Some(value),
                None => return None,
            }
        }
    }

    if !stack.is_empty() {
        return None;
    }
    root
}
