//! Drives `DartClient` against a throwaway local HTTP server.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use watchdesk_connector::{DartClient, FilingSource, SourceError};
use watchdesk_core::config::FilingApiConfig;
use watchdesk_core::{DateRange, FilingFilters};

/// Serve `respond(path_and_query)` as a 200 JSON body for every request.
async fn serve<F>(respond: F) -> String
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    serve_raw(move |target| {
        let body = respond(target);
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    })
    .await
}

/// Serve `respond(path_and_query)` as the full raw HTTP response.
async fn serve_raw<F>(respond: F) -> String
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let respond = Arc::new(respond);
    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else { break };
            let respond = respond.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let mut read = 0;
                loop {
                    let n = sock.read(&mut buf[read..]).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    read += n;
                    if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                let head = String::from_utf8_lossy(&buf[..read]).to_string();
                let target = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                let resp = respond(&target);
                let _ = sock.write_all(resp.as_bytes()).await;
                let _ = sock.shutdown().await;
            });
        }
    });
    format!("http://{}", addr)
}

fn item(no: u32) -> String {
    format!(
        r#"{{"corp_code":"0000{no}","corp_name":"Issuer {no}","stock_code":"00{no}","report_nm":"Report {no}","rcept_no":"202603020000{no}","rcept_dt":"20260302","rm":""}}"#
    )
}

fn client(base_url: String) -> DartClient {
    DartClient::from_config(&FilingApiConfig {
        base_url,
        api_key: Some("test-key".into()),
        timeout_secs: 5,
        page_count: 2,
    })
    .unwrap()
}

fn today() -> DateRange {
    DateRange::single_day(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap())
}

#[tokio::test]
async fn follows_pages_until_exhausted() {
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();
    let base = serve(move |target| {
        counter.fetch_add(1, Ordering::SeqCst);
        assert!(target.contains("crtfc_key=test-key"));
        assert!(target.contains("bgn_de=20260302"));
        if target.contains("page_no=1") {
            format!(r#"{{"status":"000","total_page":2,"list":[{},{}]}}"#, item(1), item(2))
        } else {
            format!(r#"{{"status":"000","total_page":2,"list":[{}]}}"#, item(3))
        }
    })
    .await;

    let records = client(base).fetch(today(), &FilingFilters::default()).await.unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[2].title, "Report 3");
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn quota_status_surfaces_as_quota_error() {
    let base = serve(|_| r#"{"status":"020","message":"quota"}"#.to_string()).await;
    let err = client(base).fetch(today(), &FilingFilters::default()).await.unwrap_err();
    assert!(matches!(err, SourceError::QuotaExceeded(_)));
}

#[tokio::test]
async fn too_many_requests_carries_retry_after() {
    let base = serve_raw(|_| {
        "HTTP/1.1 429 Too Many Requests\r\nRetry-After: 7\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
    })
    .await;
    let err = client(base).fetch(today(), &FilingFilters::default()).await.unwrap_err();
    assert!(matches!(err, SourceError::RateLimited { retry_after_secs: Some(7) }));
}

#[tokio::test]
async fn no_data_is_empty_batch() {
    let base = serve(|_| r#"{"status":"013","message":"no data"}"#.to_string()).await;
    let records = client(base).fetch(today(), &FilingFilters::default()).await.unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn issuer_filter_queries_each_code() {
    let base = serve(|target| {
        if target.contains("corp_code=A") {
            format!(r#"{{"status":"000","total_page":1,"list":[{}]}}"#, item(1))
        } else {
            r#"{"status":"013"}"#.to_string()
        }
    })
    .await;
    let filters = FilingFilters {
        issuer_codes: vec!["A".into(), "B".into()],
        market_class: None,
    };
    let records = client(base).fetch(today(), &filters).await.unwrap();
    assert_eq!(records.len(), 1);
}
