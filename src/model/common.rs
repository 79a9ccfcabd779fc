use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

pub type Id = String;

pub fn generate_id() -> Id {
    Uuid::new_v4().to_string()
}

/// Generate a transaction id in the `txn_<millis>_<suffix>` format used by the
/// transaction log. The suffix is 9 lowercase base-36 characters.
pub fn generate_transaction_id() -> Id {
    let millis = Utc::now().timestamp_millis();
    format!("txn_{}_{}", millis, base36_suffix(Uuid::new_v4().as_u128(), 9))
}

fn base36_suffix(mut value: u128, len: usize) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut out = String::with_capacity(len);
    for _ in 0..len {
        out.push(ALPHABET[(value % 36) as usize] as char);
        value /= 36;
    }
    out
}

/// Timestamp helper used for audit fields (`createdAt`, `updatedAt`, ...)
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Parse a calendar date from the wire. Accepts `YYYY-MM-DD` and full RFC 3339
/// timestamps; blank strings are treated as absent.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date);
    }
    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).date_naive())
}

/// Serde helpers for optional dates stored as `""` by older clients
pub mod optional_date {
    use super::*;
    use serde::Serializer;

    pub fn serialize<S>(value: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(date) => serializer.serialize_str(&date.format("%Y-%m-%d").to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(text) if text.trim().is_empty() => Ok(None),
            Some(text) => parse_date(&text)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid date '{}'", text))),
        }
    }
}

/// Numbers sometimes arrive as strings from form posts ("12.5").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberInput {
    Number(f64),
    Text(String),
}

impl NumberInput {
    pub fn parse(&self) -> Option<f64> {
        match self {
            NumberInput::Number(n) if n.is_finite() => Some(*n),
            NumberInput::Number(_) => None,
            NumberInput::Text(text) => text.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }
}

impl From<f64> for NumberInput {
    fn from(value: f64) -> Self {
        NumberInput::Number(value)
    }
}

/// Lenient numeric field: accepts a number, a numeric string, or null.
pub fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<NumberInput> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|n| n.parse()).unwrap_or(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_id_format() {
        let id = generate_transaction_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "txn");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2].chars().all(|c| c.is_ascii_alphanumeric() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_parse_date_variants() {
        assert_eq!(parse_date("2025-03-01"), NaiveDate::from_ymd_opt(2025, 3, 1));
        assert_eq!(
            parse_date("2025-03-01T10:00:00Z"),
            NaiveDate::from_ymd_opt(2025, 3, 1)
        );
        assert_eq!(parse_date("   "), None);
        assert_eq!(parse_date("not a date"), None);
    }

    #[test]
    fn test_number_input_parsing() {
        assert_eq!(NumberInput::Number(3.5).parse(), Some(3.5));
        assert_eq!(NumberInput::Text(" 12 ".to_string()).parse(), Some(12.0));
        assert_eq!(NumberInput::Text("abc".to_string()).parse(), None);
        assert_eq!(NumberInput::Number(f64::NAN).parse(), None);
    }
}
