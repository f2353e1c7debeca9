//! Money is stored as integer centavos and exposed in the API as reais.

use serde::{Deserialize, Deserializer, Serializer, de};

use crate::error::{AppError, Result, msg};

/// Convert a reais amount to centavos, rejecting negatives and NaN.
pub fn reais_to_cents(value: f64) -> Result<i64> {
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::BadRequest(msg::INVALID_VALUE.into()));
    }
    Ok((value * 100.0).round() as i64)
}

pub fn cents_to_reais(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// Parse "150", "150.5", "1.234,56" or "R$ 1.234,56" into reais.
pub fn parse_reais(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .trim_start_matches("R$")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let normalized = if cleaned.contains(',') {
        cleaned.replace('.', "").replace(',', ".")
    } else {
        cleaned
    };
    normalized.parse().ok()
}

pub fn serialize<S: Serializer>(cents: &i64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(cents_to_reais(*cents))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    let reais = match Raw::deserialize(deserializer)? {
        Raw::Number(n) => n,
        Raw::Text(s) => parse_reais(&s)
            .ok_or_else(|| de::Error::custom(format!("invalid amount: {}", s)))?,
    };
    reais_to_cents(reais).map_err(|_| de::Error::custom("amount must be a non-negative number"))
}

/// Optional amount, for `#[serde(default, deserialize_with = "...")]` fields.
pub fn deserialize_opt<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<i64>, D::Error> {
    #[derive(Deserialize)]
    struct Amount(#[serde(deserialize_with = "deserialize")] i64);

    Option::<Amount>::deserialize(deserializer).map(|a| a.map(|Amount(v)| v))
}
