use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, HeaderValue};

use crate::config::EnterpriseSettings;
use crate::delivery::Notifier;
use crate::domain::OfferRecord;
use crate::error::SourcingError;

const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// Posts the aggregated offers to the ERP exchange service as one SOAP call.
#[derive(Clone)]
pub struct EnterpriseNotifier {
    client: Client,
    settings: EnterpriseSettings,
}

impl EnterpriseNotifier {
    pub fn new(settings: EnterpriseSettings) -> Result<Self, SourcingError> {
        let client = Client::builder()
            .user_agent(format!("part-sourcing/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| SourcingError::Notification(err.to_string()))?;
        Ok(Self { client, settings })
    }

    /// The service address, without a trailing `?wsdl`.
    pub fn endpoint(&self) -> &str {
        let url = self.settings.url.as_str();
        url.strip_suffix("?wsdl")
            .or_else(|| url.strip_suffix("?WSDL"))
            .unwrap_or(url)
    }
}

impl Notifier for EnterpriseNotifier {
    fn notify(&self, records: &[OfferRecord]) -> Result<(), SourcingError> {
        let payload = payload_json(records)?;
        let envelope = build_envelope(
            &self.settings.namespace,
            &self.settings.operation,
            &self.settings.field,
            &payload,
        );
        let action = format!("{}#{}", self.settings.namespace, self.settings.operation);
        let response = self
            .client
            .post(self.endpoint())
            .basic_auth(&self.settings.user, Some(&self.settings.password))
            .header(
                CONTENT_TYPE,
                HeaderValue::from_static("text/xml; charset=utf-8"),
            )
            .header("SOAPAction", action)
            .body(envelope)
            .send()
            .map_err(|err| SourcingError::Notification(err.to_string()))?;

        let status = response.status();
        let body = response.text().unwrap_or_default();
        if !status.is_success() || body.contains(":Fault>") {
            return Err(SourcingError::Notification(format!(
                "status {}: {}",
                status.as_u16(),
                truncate(&body, 512)
            )));
        }
        tracing::info!(records = records.len(), response = %truncate(&body, 512), "ERP exchange accepted offers");
        Ok(())
    }
}

/// JSON array of offers, non-ASCII kept as-is.
pub fn payload_json(records: &[OfferRecord]) -> Result<String, SourcingError> {
    serde_json::to_string(records).map_err(|err| SourcingError::Notification(err.to_string()))
}

pub fn build_envelope(namespace: &str, operation: &str, field: &str, payload: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            r#"<soap:Envelope xmlns:soap="{env}" xmlns:m="{ns}">"#,
            "<soap:Body><m:{op}><m:{field}>{payload}</m:{field}></m:{op}></soap:Body>",
            "</soap:Envelope>"
        ),
        env = SOAP_ENV_NS,
        ns = escape_xml(namespace),
        op = operation,
        field = field,
        payload = escape_xml(payload),
    )
}

fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> OfferRecord {
        OfferRecord {
            mpn: "ABC123".to_string(),
            manufacturer: "Ätna & Söhne".to_string(),
            seller_id: "42".to_string(),
            seller_name: "Parts <Inc>".to_string(),
            stock: Some(10),
            quantity: Some(1),
            price: Some(0.5),
            currency: "EUR".to_string(),
        }
    }

    #[test]
    fn payload_uses_exchange_field_names() {
        let json = payload_json(&[record()]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let row = &value[0];
        assert_eq!(row["MPN"], "ABC123");
        assert_eq!(row["SellerID"], "42");
        assert_eq!(row["Stock"], 10);
        assert_eq!(row["Currency"], "EUR");
        assert!(json.contains("Ätna"));
    }

    #[test]
    fn envelope_escapes_payload() {
        let json = payload_json(&[record()]).unwrap();
        let envelope = build_envelope("urn:exchange", "ExchangeOctopart", "Data", &json);
        assert!(envelope.contains("<m:ExchangeOctopart><m:Data>"));
        assert!(envelope.contains("Parts &lt;Inc&gt;"));
        assert!(envelope.contains("&quot;MPN&quot;"));
        assert!(!envelope.contains("<Inc>"));
    }

    #[test]
    fn endpoint_strips_wsdl_query() {
        let notifier = EnterpriseNotifier::new(EnterpriseSettings {
            url: "https://erp.example.test/ws/exchange.1cws?wsdl".to_string(),
            user: "u".to_string(),
            password: "p".to_string(),
            namespace: "urn:exchange".to_string(),
            operation: "ExchangeOctopart".to_string(),
            field: "Data".to_string(),
        })
        .unwrap();
        assert_eq!(
            notifier.endpoint(),
            "https://erp.example.test/ws/exchange.1cws"
        );
    }
}
