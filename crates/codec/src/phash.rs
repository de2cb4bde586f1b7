//! Perceptual hashes as fixed-width hexadecimal strings.
//!
//! Provides serde serialization for `u64` as a 16 digit, zero-padded,
//! lower-case hexadecimal string.

use serde::{Deserialize, Deserializer, Serializer, de::Error as _};
use std::borrow::Cow;
use std::num::ParseIntError;

pub(crate) fn format(phash: u64) -> String {
    format!("{phash:016x}")
}

/// Parse a hexadecimal perceptual hash; an empty string is zero.
pub(crate) fn parse(value: &str) -> Result<u64, ParseIntError> {
    match value.trim() {
        "" => Ok(0),
        value => u64::from_str_radix(value, 16),
    }
}

pub fn serialize<S>(phash: &u64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format(*phash))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Cow::<'de, str>::deserialize(deserializer)?;
    parse(&value).map_err(|err| D::Error::custom(format!("invalid pHash {value:?}: {err}")))
}
