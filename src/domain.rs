use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::SourcingError;

pub const DEFAULT_CHUNK_SIZE: usize = 50;

/// Which part-search API resolves the identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Nexar,
    Getchips,
}

impl Provider {
    /// The input column each provider's entry point reads from.
    pub fn identifier_column(&self) -> IdentifierColumn {
        match self {
            Provider::Nexar => IdentifierColumn::First,
            Provider::Getchips => IdentifierColumn::Named("mpn".to_string()),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Nexar => write!(f, "nexar"),
            Provider::Getchips => write!(f, "getchips"),
        }
    }
}

impl FromStr for Provider {
    type Err = SourcingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "nexar" => Ok(Provider::Nexar),
            "getchips" => Ok(Provider::Getchips),
            _ => Err(SourcingError::Config(format!("unknown provider: {value}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierColumn {
    /// First column of the sheet, whatever its header says.
    First,
    /// Column whose header matches exactly after trimming.
    Named(String),
}

/// One output row: a single price tier of a single seller offer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfferRecord {
    #[serde(rename = "MPN")]
    pub mpn: String,
    #[serde(rename = "Manufacturer")]
    pub manufacturer: String,
    #[serde(rename = "SellerID")]
    pub seller_id: String,
    #[serde(rename = "SellerName")]
    pub seller_name: String,
    #[serde(rename = "Stock")]
    pub stock: Option<i64>,
    #[serde(rename = "Quantity")]
    pub quantity: Option<i64>,
    #[serde(rename = "Price")]
    pub price: Option<f64>,
    #[serde(rename = "Currency")]
    pub currency: String,
}

/// Splits a batch into ordered, non-overlapping chunks of at most `size`.
pub fn chunk_identifiers(batch: &[String], size: usize) -> Vec<&[String]> {
    batch.chunks(size.max(1)).collect()
}

/// Everything before the last whitespace-delimited token of a display name.
///
/// The trailing word is taken to be the part number itself, so a single-word
/// name yields an empty manufacturer.
pub fn derive_manufacturer(name: &str) -> String {
    let trimmed = name.trim_end();
    match trimmed.rsplit_once(char::is_whitespace) {
        Some((head, _)) => head.trim_end().to_string(),
        None => String::new(),
    }
}

/// Lossy UTF-8 re-encode that drops whatever could not be decoded.
pub fn clean_bytes(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .chars()
        .filter(|ch| *ch != char::REPLACEMENT_CHARACTER && *ch != '\0')
        .collect::<String>()
        .trim()
        .to_string()
}

pub fn clean_text(raw: &str) -> String {
    clean_bytes(raw.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("MPN{i}")).collect()
    }

    #[test]
    fn chunks_partition_batch() {
        for size in [1, 3, 50, 120] {
            let items = batch(103);
            let chunks = chunk_identifiers(&items, size);
            assert!(chunks.iter().all(|chunk| chunk.len() <= size));
            let joined = chunks.concat();
            assert_eq!(joined, items);
        }
    }

    #[test]
    fn chunk_of_empty_batch() {
        let items: Vec<String> = Vec::new();
        assert!(chunk_identifiers(&items, 50).is_empty());
    }

    #[test]
    fn manufacturer_strips_trailing_token() {
        assert_eq!(derive_manufacturer("ACME Widget X100"), "ACME Widget");
        assert_eq!(derive_manufacturer("Texas Instruments  LM358 "), "Texas Instruments");
    }

    #[test]
    fn manufacturer_single_word_is_empty() {
        assert_eq!(derive_manufacturer("ACME"), "");
        assert_eq!(derive_manufacturer(""), "");
    }

    #[test]
    fn clean_drops_undecodable_bytes() {
        let raw = b"LM\xff358\n";
        assert_eq!(clean_bytes(raw), "LM358");
        assert_eq!(clean_text("  BC547\u{FFFD} \r\n"), "BC547");
    }

    #[test]
    fn provider_columns() {
        assert_eq!(Provider::Nexar.identifier_column(), IdentifierColumn::First);
        assert_eq!(
            "GetChips".parse::<Provider>().unwrap().identifier_column(),
            IdentifierColumn::Named("mpn".to_string())
        );
    }
}
