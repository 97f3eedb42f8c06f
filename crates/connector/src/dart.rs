//! HTTP client for the public disclosure list endpoint (`list.json`).
//!
//! Status codes handled explicitly:
//! - `000` ok
//! - `013` no data for the query (empty result, not an error)
//! - `020` request quota exceeded

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, info, warn};
use watchdesk_core::config::FilingApiConfig;
use watchdesk_core::{DateRange, FilingFilters, FilingRecord};

use crate::error::SourceError;
use crate::source::FilingSource;

const STATUS_OK: &str = "000";
const STATUS_NO_DATA: &str = "013";
const STATUS_QUOTA: &str = "020";

/// Hard stop on pagination in case the source misreports `total_page`.
const MAX_PAGES: u32 = 50;

pub struct DartClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    page_count: u32,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    total_page: Option<u32>,
    #[serde(default)]
    list: Vec<ListItem>,
}

#[derive(Debug, Deserialize)]
struct ListItem {
    #[serde(default)]
    corp_code: String,
    #[serde(default)]
    corp_name: String,
    #[serde(default)]
    stock_code: String,
    #[serde(default)]
    report_nm: String,
    #[serde(default)]
    rcept_no: String,
    #[serde(default)]
    rcept_dt: String,
    #[serde(default)]
    rm: String,
}

/// One decoded page.
#[derive(Debug)]
pub(crate) struct ListPage {
    pub records: Vec<FilingRecord>,
    pub total_pages: u32,
}

impl DartClient {
    pub fn from_config(cfg: &FilingApiConfig) -> Result<Self, SourceError> {
        let api_key = cfg
            .api_key
            .clone()
            .ok_or_else(|| SourceError::Config("DART_API_KEY is not set".into()))?;
        let timeout = Duration::from_secs(cfg.timeout_secs.max(1));
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            page_count: cfg.page_count.clamp(1, 100),
            timeout,
        })
    }

    async fn fetch_page(
        &self,
        range: DateRange,
        filters: &FilingFilters,
        corp_code: Option<&str>,
        page_no: u32,
    ) -> Result<ListPage, SourceError> {
        let url = format!("{}/list.json", self.base_url);
        let mut query: Vec<(&str, String)> = vec![
            ("crtfc_key", self.api_key.clone()),
            ("bgn_de", range.from.format("%Y%m%d").to_string()),
            ("end_de", range.to.format("%Y%m%d").to_string()),
            ("page_no", page_no.to_string()),
            ("page_count", self.page_count.to_string()),
        ];
        if let Some(code) = corp_code {
            query.push(("corp_code", code.to_string()));
        }
        if let Some(cls) = &filters.market_class {
            query.push(("corp_cls", cls.clone()));
        }

        debug!(page_no, corp_code = ?corp_code, "disclosure list request");
        let response = self.client.get(&url).query(&query).send().await.map_err(|e| {
            if e.is_timeout() {
                SourceError::Timeout(self.timeout)
            } else {
                SourceError::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::from_response(response).await);
        }

        let body = response.text().await?;
        parse_list_page(&body)
    }

    /// Fetch every page for one query.
    async fn fetch_all_pages(
        &self,
        range: DateRange,
        filters: &FilingFilters,
        corp_code: Option<&str>,
    ) -> Result<Vec<FilingRecord>, SourceError> {
        let mut records = Vec::new();
        let mut page_no = 1;
        loop {
            let page = self.fetch_page(range, filters, corp_code, page_no).await?;
            records.extend(page.records);
            if page_no >= page.total_pages || page_no >= MAX_PAGES {
                break;
            }
            page_no += 1;
        }
        Ok(records)
    }
}

#[async_trait]
impl FilingSource for DartClient {
    async fn fetch(&self, range: DateRange, filters: &FilingFilters) -> Result<Vec<FilingRecord>, SourceError> {
        let records = if filters.issuer_codes.is_empty() {
            self.fetch_all_pages(range, filters, None).await?
        } else {
            let mut all = Vec::new();
            for code in &filters.issuer_codes {
                all.extend(self.fetch_all_pages(range, filters, Some(code)).await?);
            }
            all
        };
        info!(count = records.len(), from = %range.from, to = %range.to, "fetched disclosures");
        Ok(records)
    }

    fn name(&self) -> &str {
        "dart"
    }
}

/// Decode one `list.json` body, mapping source status codes to results.
pub(crate) fn parse_list_page(body: &str) -> Result<ListPage, SourceError> {
    let resp: ListResponse =
        serde_json::from_str(body).map_err(|e| SourceError::Malformed(e.to_string()))?;

    match resp.status.as_str() {
        STATUS_OK => {}
        STATUS_NO_DATA => {
            return Ok(ListPage {
                records: Vec::new(),
                total_pages: 0,
            })
        }
        STATUS_QUOTA => return Err(SourceError::QuotaExceeded(resp.message)),
        other => {
            return Err(SourceError::Upstream {
                code: other.to_string(),
                message: resp.message,
            })
        }
    }

    let mut records = Vec::with_capacity(resp.list.len());
    for item in resp.list {
        match to_record(item) {
            Ok(r) => records.push(r),
            Err(reason) => warn!(error = %reason, error_class = "malformed_record", "skipping disclosure item"),
        }
    }
    Ok(ListPage {
        records,
        total_pages: resp.total_page.unwrap_or(1),
    })
}

fn to_record(item: ListItem) -> Result<FilingRecord, String> {
    let filed_on = NaiveDate::parse_from_str(item.rcept_dt.trim(), "%Y%m%d")
        .map_err(|e| format!("filing {} has bad date {:?}: {}", item.rcept_no, item.rcept_dt, e))?;
    let issuer_code = if item.stock_code.trim().is_empty() {
        item.corp_code
    } else {
        item.stock_code.trim().to_string()
    };
    Ok(FilingRecord::new(
        item.rcept_no.trim(),
        item.corp_name.trim(),
        issuer_code,
        item.report_nm.trim(),
        filed_on,
    )
    .with_remarks(item.rm.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"{
        "status": "000",
        "message": "정상",
        "page_no": 1,
        "page_count": 100,
        "total_count": 2,
        "total_page": 1,
        "list": [
            {"corp_code": "00126380", "corp_name": "삼성전자", "stock_code": "005930",
             "corp_cls": "Y", "report_nm": "주요사항보고서(자기주식취득결정)",
             "rcept_no": "20260302000123", "flr_nm": "삼성전자", "rcept_dt": "20260302", "rm": "유"},
            {"corp_code": "00999999", "corp_name": "비상장", "stock_code": "",
             "report_nm": "합병등종료보고서", "rcept_no": "20260302000124", "rcept_dt": "20260302", "rm": ""}
        ]
    }"#;

    #[test]
    fn parses_ok_page() {
        let page = parse_list_page(PAGE).unwrap();
        assert_eq!(page.total_pages, 1);
        assert_eq!(page.records.len(), 2);
        let first = &page.records[0];
        assert_eq!(first.id, "20260302000123");
        assert_eq!(first.issuer_code, "005930");
        assert_eq!(first.remarks, "유");
        assert_eq!(page.records[1].issuer_code, "00999999");
    }

    #[test]
    fn no_data_is_empty() {
        let page = parse_list_page(r#"{"status":"013","message":"조회된 데이타가 없습니다."}"#).unwrap();
        assert!(page.records.is_empty());
    }

    #[test]
    fn quota_status_maps_to_quota_error() {
        let err = parse_list_page(r#"{"status":"020","message":"요청 제한을 초과하였습니다."}"#).unwrap_err();
        assert!(err.is_quota_exceeded());
    }

    #[test]
    fn other_status_is_upstream_error() {
        let err = parse_list_page(r#"{"status":"010","message":"등록되지 않은 키입니다."}"#).unwrap_err();
        assert!(matches!(err, SourceError::Upstream { ref code, .. } if code == "010"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn bad_item_date_is_skipped() {
        let body = r#"{"status":"000","total_page":1,"list":[
            {"rcept_no":"1","corp_name":"A","report_nm":"x","rcept_dt":"2026-03-02"},
            {"rcept_no":"2","corp_name":"B","report_nm":"y","rcept_dt":"20260302"}]}"#;
        let page = parse_list_page(body).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].id, "2");
    }

    #[test]
    fn garbage_body_is_malformed() {
        assert!(matches!(parse_list_page("<html>"), Err(SourceError::Malformed(_))));
    }

    #[test]
    fn from_config_requires_key() {
        let cfg = FilingApiConfig {
            base_url: "https://example.com/api".into(),
            api_key: None,
            timeout_secs: 5,
            page_count: 100,
        };
        assert!(matches!(DartClient::from_config(&cfg), Err(SourceError::Config(_))));
    }
}
