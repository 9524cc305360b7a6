use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::Deserialize;

use crate::domain::OfferRecord;
use crate::error::SourcingError;
use crate::lookup::PartLookup;

pub const DEFAULT_BASE_URL: &str = "https://api.client-service.getchips.ru/client/api/gh/v1";
pub const DEFAULT_QUANTITY: u32 = 1;

/// Per-identifier search against the GetChips partner API.
#[derive(Clone)]
pub struct GetChipsHttpClient {
    client: Client,
    base_url: String,
    token: String,
    quantity: u32,
    currency: String,
}

impl GetChipsHttpClient {
    pub fn new(base_url: &str, token: &str, currency: &str) -> Result<Self, SourcingError> {
        if token.trim().is_empty() {
            return Err(SourcingError::Auth("GetChips token is empty".to_string()));
        }
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .user_agent(format!("part-sourcing/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| SourcingError::Lookup(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.trim().to_string(),
            quantity: DEFAULT_QUANTITY,
            currency: currency.to_string(),
        })
    }

    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    fn search(&self, mpn: &str) -> Result<SearchResponse, SourcingError> {
        let url = format!("{}/search/partnumber", self.base_url);
        let quantity = self.quantity.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("input", mpn),
                ("qty", quantity.as_str()),
                ("token", self.token.as_str()),
            ])
            .send()
            .map_err(|err| SourcingError::Lookup(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "GetChips request failed".to_string());
            return Err(SourcingError::LookupStatus { status, message });
        }
        response
            .json()
            .map_err(|err| SourcingError::Lookup(format!("invalid GetChips response: {err}")))
    }
}

impl PartLookup for GetChipsHttpClient {
    fn lookup(&self, chunk: &[String]) -> Result<Vec<OfferRecord>, SourcingError> {
        lookup_each(chunk, |mpn| {
            self.search(mpn)
                .map(|response| to_records(mpn, response, &self.currency))
        })
    }
}

/// Runs `search` for every identifier of the chunk. A failed identifier is
/// logged and contributes nothing; the chunk fails only when all of them did.
pub fn lookup_each<F>(chunk: &[String], mut search: F) -> Result<Vec<OfferRecord>, SourcingError>
where
    F: FnMut(&str) -> Result<Vec<OfferRecord>, SourcingError>,
{
    let mut records = Vec::new();
    let mut failures = Vec::new();
    for mpn in chunk {
        match search(mpn) {
            Ok(found) => records.extend(found),
            Err(err) => {
                tracing::warn!(mpn = %mpn, error = %err, "GetChips search failed");
                failures.push(format!("{mpn}: {err}"));
            }
        }
    }
    if !chunk.is_empty() && failures.len() == chunk.len() {
        return Err(SourcingError::Lookup(failures.join(" | ")));
    }
    Ok(records)
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub data: Option<Vec<SearchItem>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchItem {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "donorID", default)]
    pub donor_id: Option<Loose>,
    #[serde(default)]
    pub donor: Option<String>,
    #[serde(default)]
    pub quantity: Option<Loose>,
    #[serde(rename = "eQuantity", default)]
    pub e_quantity: Option<Loose>,
    #[serde(default)]
    pub price: Option<Loose>,
}

/// A field the API sends either as a JSON number or as a string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Loose {
    Number(f64),
    Text(String),
}

impl Loose {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Loose::Number(value) => Some(*value),
            Loose::Text(value) => value.trim().replace(',', ".").parse().ok(),
        }
    }

    fn as_i64(&self) -> Option<i64> {
        self.as_f64()
            .filter(|value| value.is_finite())
            .map(|value| value.trunc() as i64)
    }

    fn as_text(&self) -> String {
        match self {
            Loose::Number(value) => value.to_string(),
            Loose::Text(value) => value.clone(),
        }
    }
}

pub fn to_records(mpn: &str, response: SearchResponse, currency: &str) -> Vec<OfferRecord> {
    response
        .data
        .unwrap_or_default()
        .into_iter()
        .map(|item| OfferRecord {
            mpn: mpn.to_string(),
            manufacturer: item.title.unwrap_or_default(),
            seller_id: item.donor_id.map(|id| id.as_text()).unwrap_or_default(),
            seller_name: item.donor.unwrap_or_default(),
            stock: item.quantity.as_ref().and_then(Loose::as_i64),
            quantity: item.e_quantity.as_ref().and_then(Loose::as_i64),
            price: item.price.as_ref().and_then(Loose::as_f64),
            currency: currency.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_items_to_records() {
        let body = r#"{"data":[
            {"title":"LM358DR","donorID":12,"donor":"Warehouse A","quantity":"1500","eQuantity":10,"price":"12,5"},
            {"title":"LM358DR","donorID":"B-7","donor":"Warehouse B","quantity":null,"price":11.0}
        ]}"#;
        let response: SearchResponse = serde_json::from_str(body).unwrap();
        let records = to_records("LM358DR", response, "RUB");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].seller_id, "12");
        assert_eq!(records[0].stock, Some(1500));
        assert_eq!(records[0].quantity, Some(10));
        assert_eq!(records[0].price, Some(12.5));
        assert_eq!(records[1].seller_id, "B-7");
        assert_eq!(records[1].stock, None);
        assert_eq!(records[1].currency, "RUB");
    }

    #[test]
    fn missing_data_yields_nothing() {
        let response: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(to_records("X", response, "RUB").is_empty());
    }

    fn chunk(mpns: &[&str]) -> Vec<String> {
        mpns.iter().map(|mpn| mpn.to_string()).collect()
    }

    fn status(code: u16) -> SourcingError {
        SourcingError::LookupStatus {
            status: code,
            message: "upstream error".to_string(),
        }
    }

    #[test]
    fn partial_failure_keeps_other_identifiers() {
        let result = lookup_each(&chunk(&["A", "B"]), |mpn| match mpn {
            "A" => Err(status(500)),
            _ => {
                let response: SearchResponse =
                    serde_json::from_str(r#"{"data":[{"title":"B","donor":"W","price":1}]}"#)
                        .unwrap();
                Ok(to_records(mpn, response, "RUB"))
            }
        });
        let records = result.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].mpn, "B");
    }

    #[test]
    fn chunk_fails_when_every_identifier_fails() {
        let err = lookup_each(&chunk(&["A", "B"]), |mpn| {
            Err(status(if mpn == "A" { 500 } else { 502 }))
        })
        .unwrap_err();
        match err {
            SourcingError::Lookup(message) => {
                assert!(message.starts_with("A: "));
                assert!(message.contains("500"));
                assert!(message.contains(" | B: "));
                assert!(message.contains("502"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn identifiers_without_offers_are_not_failures() {
        let records = lookup_each(&chunk(&["A", "B"]), |_| Ok(Vec::new())).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn empty_token_is_rejected() {
        assert!(GetChipsHttpClient::new(DEFAULT_BASE_URL, " ", "RUB").is_err());
    }
}
