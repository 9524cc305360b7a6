use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::{Deserialize, Deserializer};
use serde_json::json;

use crate::domain::{OfferRecord, derive_manufacturer};
use crate::error::SourcingError;
use crate::lookup::PartLookup;
use crate::token::TokenManager;

pub const DEFAULT_API_URL: &str = "https://api.nexar.com/graphql";
pub const DEFAULT_CURRENCY: &str = "EUR";

const MULTI_MATCH_QUERY: &str = r#"
query partSourcing($currency: String!, $queries: [SupPartMatchQuery!]!) {
  supMultiMatch(currency: $currency, queries: $queries) {
    parts {
      mpn
      name
      sellers {
        company {
          id
          name
        }
        offers {
          inventoryLevel
          prices {
            quantity
            convertedPrice
            convertedCurrency
          }
        }
      }
    }
  }
}
"#;

pub struct NexarHttpClient {
    client: Client,
    api_url: String,
    currency: String,
    tokens: TokenManager,
}

impl NexarHttpClient {
    pub fn new(api_url: &str, currency: &str, tokens: TokenManager) -> Result<Self, SourcingError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .user_agent(format!("part-sourcing/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| SourcingError::Lookup(err.to_string()))?;
        Ok(Self {
            client,
            api_url: api_url.to_string(),
            currency: currency.to_string(),
            tokens,
        })
    }

    fn query(&self, chunk: &[String]) -> Result<MultiMatchData, SourcingError> {
        let token = self.tokens.bearer()?;
        let queries = chunk
            .iter()
            .map(|mpn| json!({ "mpn": mpn }))
            .collect::<Vec<_>>();
        let body = json!({
            "query": MULTI_MATCH_QUERY,
            "variables": { "currency": self.currency, "queries": queries },
        });
        let response = self
            .client
            .post(&self.api_url)
            .header("token", token)
            .json(&body)
            .send()
            .map_err(|err| SourcingError::Lookup(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "Nexar request failed".to_string());
            return Err(SourcingError::LookupStatus { status, message });
        }
        let text = response
            .text()
            .map_err(|err| SourcingError::Lookup(err.to_string()))?;
        parse_response(&text)
    }
}

impl PartLookup for NexarHttpClient {
    fn lookup(&self, chunk: &[String]) -> Result<Vec<OfferRecord>, SourcingError> {
        if chunk.is_empty() {
            return Ok(Vec::new());
        }
        let data = self.query(chunk)?;
        Ok(normalize(chunk, &data, &self.currency))
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<MultiMatchData>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct MultiMatchData {
    #[serde(rename = "supMultiMatch", default, deserialize_with = "null_default")]
    pub matches: Vec<MatchResult>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MatchResult {
    #[serde(default, deserialize_with = "null_default")]
    pub parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Part {
    #[serde(default, deserialize_with = "null_default")]
    pub mpn: String,
    #[serde(default, deserialize_with = "null_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_default")]
    pub sellers: Vec<Seller>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Seller {
    #[serde(default, deserialize_with = "null_default")]
    pub company: Company,
    #[serde(default, deserialize_with = "null_default")]
    pub offers: Vec<Offer>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Company {
    #[serde(default, deserialize_with = "null_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_default")]
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct Offer {
    #[serde(rename = "inventoryLevel", default)]
    pub inventory_level: Option<i64>,
    #[serde(default, deserialize_with = "null_default")]
    pub prices: Vec<PriceTier>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PriceTier {
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(rename = "convertedPrice", default)]
    pub converted_price: Option<f64>,
    #[serde(rename = "convertedCurrency", default)]
    pub converted_currency: Option<String>,
}

fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parses a GraphQL response body, turning an `errors` member into a
/// chunk-level failure.
pub fn parse_response(body: &str) -> Result<MultiMatchData, SourcingError> {
    let response: GraphQlResponse = serde_json::from_str(body)
        .map_err(|err| SourcingError::Lookup(format!("invalid Nexar response: {err}")))?;
    if let Some(errors) = response.errors {
        let messages = errors
            .into_iter()
            .map(|error| error.message)
            .collect::<Vec<_>>();
        return Err(SourcingError::Lookup(format!(
            "Nexar API returned errors: {}",
            messages.join(" | ")
        )));
    }
    Ok(response.data.unwrap_or_default())
}

/// Flattens match results into one record per seller offer price tier.
///
/// Results are positional: the n-th match belongs to the n-th identifier of
/// the chunk.
pub fn normalize(chunk: &[String], data: &MultiMatchData, currency: &str) -> Vec<OfferRecord> {
    let mut records = Vec::new();
    for (result, mpn) in data.matches.iter().zip(chunk) {
        for part in &result.parts {
            let manufacturer = derive_manufacturer(&part.name);
            for seller in &part.sellers {
                for offer in &seller.offers {
                    for tier in &offer.prices {
                        records.push(OfferRecord {
                            mpn: mpn.clone(),
                            manufacturer: manufacturer.clone(),
                            seller_id: seller.company.id.clone(),
                            seller_name: seller.company.name.clone(),
                            stock: offer.inventory_level,
                            quantity: tier.quantity,
                            price: tier.converted_price,
                            currency: tier
                                .converted_currency
                                .clone()
                                .unwrap_or_else(|| currency.to_string()),
                        });
                    }
                }
            }
        }
    }
    records
}
