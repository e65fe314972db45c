//! HTTP rate provider backed by the National Bank of the Republic of Belarus
//! exchange-rate API.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use ratekeeper_common::{CurrencyId, CurrencyInfo, CurrencyRate};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{RateError, RateResult};
use crate::provider::RateProvider;

/// Configuration for [`NbrbRateProvider`].
#[derive(Debug, Clone)]
pub struct NbrbConfig {
    /// API root, without trailing slash.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for NbrbConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.nbrb.by".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Deserialize)]
struct NbrbCurrency {
    #[serde(rename = "Cur_ID")]
    cur_id: CurrencyId,
    #[serde(rename = "Cur_Code")]
    cur_code: String,
    #[serde(rename = "Cur_Abbreviation")]
    cur_abbreviation: String,
    #[serde(rename = "Cur_Name")]
    cur_name: String,
    #[serde(rename = "Cur_Scale")]
    cur_scale: u32,
}

impl From<NbrbCurrency> for CurrencyInfo {
    fn from(c: NbrbCurrency) -> Self {
        CurrencyInfo::new(c.cur_code, c.cur_abbreviation, c.cur_name, c.cur_scale).with_id(c.cur_id)
    }
}

#[derive(Debug, Deserialize)]
struct NbrbRate {
    #[serde(rename = "Date")]
    date: NaiveDateTime,
    #[serde(rename = "Cur_Scale")]
    cur_scale: u32,
    #[serde(rename = "Cur_OfficialRate")]
    cur_official_rate: Decimal,
}

impl From<NbrbRate> for CurrencyRate {
    fn from(r: NbrbRate) -> Self {
        CurrencyRate::new(r.cur_official_rate, r.cur_scale, r.date.date())
    }
}

/// Keep one entry per abbreviation, the one with the highest `Cur_ID`.
///
/// The API lists every historical record of a currency, so `USD` appears
/// under several ids. Order of first appearance is kept.
fn latest_per_abbreviation(currencies: Vec<CurrencyInfo>) -> Vec<CurrencyInfo> {
    let mut latest: Vec<CurrencyInfo> = Vec::with_capacity(currencies.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for currency in currencies {
        match positions.get(&currency.cur_abbreviation) {
            Some(&pos) => {
                if currency.cur_id > latest[pos].cur_id {
                    latest[pos] = currency;
                }
            }
            None => {
                positions.insert(currency.cur_abbreviation.clone(), latest.len());
                latest.push(currency);
            }
        }
    }

    latest
}

/// [`RateProvider`] that queries `{base_url}/exrates/...`.
pub struct NbrbRateProvider {
    client: Client,
    config: NbrbConfig,
}

impl NbrbRateProvider {
    pub fn new(config: NbrbConfig) -> RateResult<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> RateResult<T> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        debug!(url = %url, "Requesting NBRB API");

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            warn!(url = %url, status = %response.status(), "NBRB API returned an error status");
            return Err(RateError::upstream(format!(
                "Rate provider returned status {} for {}",
                response.status(),
                url
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| RateError::upstream(format!("Failed to parse rate provider response: {}", e)))
    }
}

#[async_trait]
impl RateProvider for NbrbRateProvider {
    fn name(&self) -> &str {
        "NBRB"
    }

    async fn fetch_all_currencies(&self) -> RateResult<Vec<CurrencyInfo>> {
        let currencies: Vec<NbrbCurrency> = self.get_json("/exrates/currencies").await?;
        let fetched = currencies.len();
        let currencies =
            latest_per_abbreviation(currencies.into_iter().map(CurrencyInfo::from).collect());
        debug!(fetched, kept = currencies.len(), "Fetched currencies from NBRB");
        Ok(currencies)
    }

    async fn fetch_current_rate(&self, currency_id: CurrencyId) -> RateResult<CurrencyRate> {
        let rate: NbrbRate = self
            .get_json(&format!("/exrates/rates/{}", currency_id))
            .await?;
        Ok(rate.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    #[test]
    fn test_decode_currency() {
        let json = r#"{
            "Cur_ID": 431, "Cur_ParentID": 145, "Cur_Code": "840",
            "Cur_Abbreviation": "USD", "Cur_Name": "Доллар США",
            "Cur_Scale": 1, "Cur_Periodicity": 0
        }"#;

        let currency: CurrencyInfo = serde_json::from_str::<NbrbCurrency>(json).unwrap().into();

        assert_eq!(currency.cur_id, Some(431));
        assert_eq!(currency.cur_abbreviation, "USD");
        assert_eq!(currency.cur_scale, 1);
        assert!(currency.rates.is_empty());
    }

    #[test]
    fn test_decode_rate() {
        let json = r#"{
            "Cur_ID": 431, "Date": "2024-06-03T00:00:00", "Cur_Abbreviation": "USD",
            "Cur_Scale": 1, "Cur_Name": "Доллар США", "Cur_OfficialRate": 3.2641
        }"#;

        let rate: CurrencyRate = serde_json::from_str::<NbrbRate>(json).unwrap().into();

        assert_eq!(rate.cur_official_rate, dec!(3.2641));
        assert_eq!(rate.cur_scale, 1);
        assert_eq!(rate.date, NaiveDate::from_ymd_opt(2024, 6, 3).unwrap());
        assert!(rate.currency_id.is_none());
    }

    #[test]
    fn test_duplicate_abbreviations_keep_latest_id() {
        let json = r#"[
            {"Cur_ID": 145, "Cur_Code": "840", "Cur_Abbreviation": "USD", "Cur_Name": "Доллар США", "Cur_Scale": 1},
            {"Cur_ID": 292, "Cur_Code": "978", "Cur_Abbreviation": "EUR", "Cur_Name": "Евро", "Cur_Scale": 1},
            {"Cur_ID": 431, "Cur_Code": "840", "Cur_Abbreviation": "USD", "Cur_Name": "Доллар США", "Cur_Scale": 1},
            {"Cur_ID": 19, "Cur_Code": "978", "Cur_Abbreviation": "EUR", "Cur_Name": "Евро", "Cur_Scale": 1}
        ]"#;
        let currencies: Vec<CurrencyInfo> = serde_json::from_str::<Vec<NbrbCurrency>>(json)
            .unwrap()
            .into_iter()
            .map(CurrencyInfo::from)
            .collect();

        let kept = latest_per_abbreviation(currencies);

        let ids: Vec<_> = kept.iter().map(|c| (c.cur_abbreviation.as_str(), c.cur_id)).collect();
        assert_eq!(ids, vec![("USD", Some(431)), ("EUR", Some(292))]);
    }

    #[test]
    fn test_default_config() {
        let config = NbrbConfig::default();
        assert_eq!(config.base_url, "https://api.nbrb.by");
        assert_eq!(config.timeout, Duration::from_secs(10));
    }
}
