//! Price value normalization and rendering.

use serde_json::Value;

/// Marker rendered for a missing value.
pub const NOT_AVAILABLE: &str = "N/A";

/// A raw price as delivered by a feed: a JSON number or a possibly-grouped string.
#[derive(Debug, Clone, PartialEq)]
pub enum PriceValue {
    Number(f64),
    Text(String),
}

impl PriceValue {
    /// Reads a price from a JSON value; `null` counts as missing.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Number(n) => Some(match n.as_f64() {
                Some(f) => PriceValue::Number(f),
                None => PriceValue::Text(n.to_string()),
            }),
            Value::String(s) => Some(PriceValue::Text(s.clone())),
            other => Some(PriceValue::Text(other.to_string())),
        }
    }
}

impl From<&str> for PriceValue {
    fn from(text: &str) -> Self {
        PriceValue::Text(text.to_string())
    }
}

impl From<f64> for PriceValue {
    fn from(number: f64) -> Self {
        PriceValue::Number(number)
    }
}

/// Renders a price rounded to an integer with `,` thousands grouping.
///
/// Text is parsed after removing `,` separators and whitespace. Anything that does
/// not parse to a finite number is rendered as given; a missing or blank value is
/// rendered as [`NOT_AVAILABLE`]. Formatting its own output returns the same string.
pub fn format_price(value: Option<&PriceValue>) -> String {
    match value {
        None => NOT_AVAILABLE.to_string(),
        Some(PriceValue::Number(n)) if n.is_finite() => group_rounded(*n),
        Some(PriceValue::Number(n)) => n.to_string(),
        Some(PriceValue::Text(text)) => {
            if text.trim().is_empty() {
                return NOT_AVAILABLE.to_string();
            }
            let cleaned: String = text
                .chars()
                .filter(|c| *c != ',' && !c.is_whitespace())
                .collect();
            match cleaned.parse::<f64>() {
                Ok(n) if n.is_finite() => group_rounded(n),
                _ => text.clone(),
            }
        }
    }
}

/// `74000000` -> `"74,000,000"`.
pub fn group_thousands(value: i64) -> String {
    group_digits(value < 0, &value.unsigned_abs().to_string())
}

// Works on the decimal text so values beyond the `i64` range keep every digit.
fn group_rounded(value: f64) -> String {
    let rounded = format!("{:.0}", value.round().abs());
    let negative = value.is_sign_negative() && rounded.bytes().any(|b| b != b'0');
    group_digits(negative, &rounded)
}

fn group_digits(negative: bool, digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if negative {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fmt(value: impl Into<PriceValue>) -> String {
        format_price(Some(&value.into()))
    }

    #[test]
    fn numbers_are_rounded_and_grouped() {
        assert_eq!(fmt(74_000_000.0), "74,000,000");
        assert_eq!(fmt(1234.5), "1,235");
        assert_eq!(fmt(999.4), "999");
        assert_eq!(fmt(0.0), "0");
        assert_eq!(fmt(-1_500_000.0), "-1,500,000");
        assert_eq!(fmt(-0.4), "0");
        assert_eq!(fmt(1e20), "100,000,000,000,000,000,000");
        assert_eq!(fmt("1e20"), "100,000,000,000,000,000,000");
        assert_eq!(fmt(-2.5e19), "-25,000,000,000,000,000,000");
        assert_eq!(group_thousands(i64::MIN), "-9,223,372,036,854,775,808");
    }

    #[test]
    fn grouped_strings_are_reparsed() {
        assert_eq!(fmt("76,000,000"), "76,000,000");
        assert_eq!(fmt(" 24,640.00 "), "24,640");
        assert_eq!(fmt("7400000"), "7,400,000");
    }

    #[test]
    fn formatting_is_idempotent() {
        for raw in ["74000000", "1,234.56", "12", "-98765.4", "liên hệ"] {
            let once = fmt(raw);
            assert_eq!(fmt(once.as_str()), once, "{raw}");
        }
    }

    #[test]
    fn unparsable_text_is_kept() {
        assert_eq!(fmt("liên hệ"), "liên hệ");
        assert_eq!(fmt("74.000.000"), "74.000.000");
        assert_eq!(fmt("inf"), "inf");
    }

    #[test]
    fn missing_values_use_marker() {
        assert_eq!(format_price(None), NOT_AVAILABLE);
        assert_eq!(fmt("   "), NOT_AVAILABLE);
        assert_eq!(PriceValue::from_json(&json!(null)), None);
    }

    #[test]
    fn json_values_map_to_prices() {
        assert_eq!(PriceValue::from_json(&json!(5)), Some(PriceValue::Number(5.0)));
        assert_eq!(PriceValue::from_json(&json!("5")), Some(PriceValue::Text("5".into())));
        assert_eq!(PriceValue::from_json(&json!(true)), Some(PriceValue::Text("true".into())));
    }
}
