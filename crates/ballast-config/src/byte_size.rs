use schemars::r#gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

const KIB: u64 = 1024;

/// A byte quantity that accepts either an integer or a human-friendly string in TOML.
///
/// `"64MiB"`, `"512mb"`, `"1G"` and `"1.5 GiB"` are all accepted. Suffixes are case-insensitive and
/// always binary: `k`, `kb` and `kib` all mean 1024 bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub const fn mib(mib: u64) -> Self {
        Self(mib * KIB * KIB)
    }

    pub const fn gib(gib: u64) -> Self {
        Self(gib * KIB * KIB * KIB)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn as_mb(self) -> f64 {
        self.0 as f64 / (KIB * KIB) as f64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ByteSizeError {
    #[error("byte size is empty")]
    Empty,
    #[error("invalid byte size number `{0}`")]
    InvalidNumber(String),
    #[error("unknown byte size unit `{0}` (expected b, k, m, g or t with optional `b`/`ib`)")]
    UnknownUnit(String),
    #[error("byte size `{0}` does not fit in 64 bits")]
    Overflow(String),
}

pub fn parse_byte_size(input: &str) -> Result<u64, ByteSizeError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ByteSizeError::Empty);
    }

    let split = input
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(input.len());
    let (number, unit) = input.split_at(split);
    let unit = unit.trim().to_ascii_lowercase();

    let multiplier: u64 = match unit.as_str() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => KIB,
        "m" | "mb" | "mib" => KIB.pow(2),
        "g" | "gb" | "gib" => KIB.pow(3),
        "t" | "tb" | "tib" => KIB.pow(4),
        _ => return Err(ByteSizeError::UnknownUnit(unit)),
    };

    if let Ok(whole) = number.parse::<u64>() {
        return whole
            .checked_mul(multiplier)
            .ok_or_else(|| ByteSizeError::Overflow(input.to_owned()));
    }

    let value: f64 = number
        .parse()
        .map_err(|_| ByteSizeError::InvalidNumber(number.to_owned()))?;
    if !value.is_finite() || value < 0.0 {
        return Err(ByteSizeError::InvalidNumber(number.to_owned()));
    }
    let bytes = value * multiplier as f64;
    if bytes >= u64::MAX as f64 {
        return Err(ByteSizeError::Overflow(input.to_owned()));
    }
    Ok(bytes.round() as u64)
}

impl Serialize for ByteSize {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Bytes(u64),
            Human(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Bytes(value) => Ok(ByteSize(value)),
            Repr::Human(value) => parse_byte_size(&value)
                .map(ByteSize)
                .map_err(serde::de::Error::custom),
        }
    }
}

impl JsonSchema for ByteSize {
    fn schema_name() -> String {
        "ByteSize".to_owned()
    }

    fn json_schema(_gen: &mut SchemaGenerator) -> Schema {
        let value = json!({
            "description": "Byte quantity: an integer number of bytes or a string such as \"64MiB\".",
            "anyOf": [
                { "type": "integer", "minimum": 0 },
                { "type": "string", "pattern": "^\\s*[0-9]+(\\.[0-9]+)?\\s*([kKmMgGtT]([iI]?[bB])?|[bB])?\\s*$" }
            ]
        });
        serde_json::from_value(value).unwrap_or(Schema::Bool(true))
    }
}
