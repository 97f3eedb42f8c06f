//! JSON quote endpoint client.
//!
//! The endpoint URL carries a `{code}` placeholder and must answer with
//! `{"price": <number>, "change_percent": <number>}`. Numbers may also be
//! sent as strings with thousands separators.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use watchdesk_core::PriceQuote;

use crate::error::SourceError;
use crate::source::PriceSource;

pub struct JsonQuoteClient {
    client: reqwest::Client,
    name: String,
    url_template: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct QuoteBody {
    price: serde_json::Value,
    #[serde(alias = "changePercent", alias = "change_rate")]
    change_percent: serde_json::Value,
}

impl JsonQuoteClient {
    pub fn new(name: impl Into<String>, url_template: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let url_template = url_template.into();
        if !url_template.contains("{code}") {
            return Err(SourceError::Config(format!(
                "quote URL {} lacks a {{code}} placeholder",
                url_template
            )));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            name: name.into(),
            url_template,
            timeout,
        })
    }
}

#[async_trait]
impl PriceSource for JsonQuoteClient {
    async fn fetch_price(&self, code: &str) -> Result<PriceQuote, SourceError> {
        let url = self.url_template.replace("{code}", code);
        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                SourceError::Timeout(self.timeout)
            } else {
                SourceError::Http(e)
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(code.to_string()));
        }
        if !status.is_success() {
            return Err(SourceError::from_response(response).await);
        }

        let body = response.text().await?;
        parse_quote(code, &body, &self.name)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

pub(crate) fn parse_quote(code: &str, body: &str, source: &str) -> Result<PriceQuote, SourceError> {
    let parsed: QuoteBody = serde_json::from_str(body).map_err(|e| SourceError::Malformed(e.to_string()))?;
    let price = number(&parsed.price).ok_or_else(|| SourceError::Malformed(format!("bad price for {}", code)))?;
    let change_percent = number(&parsed.change_percent)
        .ok_or_else(|| SourceError::Malformed(format!("bad change_percent for {}", code)))?;
    if price <= 0.0 {
        return Err(SourceError::Malformed(format!("non-positive price {} for {}", price, code)));
    }
    Ok(PriceQuote {
        code: code.to_string(),
        price,
        change_percent,
        as_of: Utc::now(),
        source: source.to_string(),
    })
}

fn number(v: &serde_json::Value) -> Option<f64> {
    let parsed: Option<f64> = match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().replace(',', "").trim_end_matches('%').parse().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numeric_body() {
        let q = parse_quote("ABC", r#"{"price": 101.5, "change_percent": -1.2}"#, "primary").unwrap();
        assert_eq!(q.price, 101.5);
        assert_eq!(q.change_percent, -1.2);
        assert_eq!(q.source, "primary");
    }

    #[test]
    fn parses_formatted_strings() {
        let q = parse_quote("005930", r#"{"price": "71,300", "changePercent": "+2.15%"}"#, "p").unwrap();
        assert_eq!(q.price, 71300.0);
        assert_eq!(q.change_percent, 2.15);
    }

    #[test]
    fn rejects_zero_price() {
        assert!(parse_quote("ABC", r#"{"price": 0, "change_percent": 0}"#, "p").is_err());
    }

    #[test]
    fn template_needs_placeholder() {
        assert!(JsonQuoteClient::new("p", "https://example.com/q", Duration::from_secs(1)).is_err());
    }
}
