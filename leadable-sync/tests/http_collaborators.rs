//! Graph and Sheets clients against a canned local HTTP responder.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use leadable_core::{CanonicalRow, DestinationSettings, SourceSettings};
use leadable_sync::{
    build_client, GoogleSheetStore, GraphRecordSource, RecordSource, SheetStore, SourceError,
    StoreError,
};

// ---------------------------------------------------------------------------
// Canned responder
// ---------------------------------------------------------------------------

/// Maps `(method, target)` to `(status, body)`. `{BASE}` in a body is replaced
/// with the server's base URL.
type Handler = fn(&str, &str) -> (u16, String);

#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    target: String,
    authorization: Option<String>,
    body: String,
}

struct CannedServer {
    base: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl CannedServer {
    async fn spawn(handler: Handler) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let base = format!("http://{}", listener.local_addr().expect("addr"));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let log = requests.clone();
        let base_for_task = base.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let log = log.clone();
                let base = base_for_task.clone();
                tokio::spawn(async move {
                    let _ = respond(stream, &base, handler, log).await;
                });
            }
        });

        Self { base, requests }
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

async fn respond(
    mut stream: TcpStream,
    base: &str,
    handler: Handler,
    log: Arc<Mutex<Vec<Recorded>>>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let header = |name: &str| {
        head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    };
    let content_length = header("content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let mut request_line = head.split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let target = request_line.next().unwrap_or_default().to_string();
    log.lock().unwrap().push(Recorded {
        method: method.clone(),
        target: target.clone(),
        authorization: header("authorization"),
        body: String::from_utf8_lossy(&buf[header_end..]).into_owned(),
    });

    let (status, body) = handler(&method, &target);
    let body = body.replace("{BASE}", base);
    let response = format!(
        "HTTP/1.1 {status} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

fn client() -> reqwest::Client {
    build_client(Duration::from_secs(5)).expect("client")
}

fn source_settings() -> SourceSettings {
    SourceSettings {
        access_token: "graph-secret".into(),
        account_id: "act_1".into(),
        form_id: "form-1".into(),
    }
}

fn destination() -> DestinationSettings {
    DestinationSettings {
        sheet_id: "sheet-1".into(),
        access_token: "google-secret".into(),
    }
}

fn lead_json(created: &str, name: &str) -> String {
    format!(
        r#"{{"created_time":"{created}","field_data":[{{"name":"full_name","values":["{name}"]}}]}}"#
    )
}

// ---------------------------------------------------------------------------
// Graph lead source
// ---------------------------------------------------------------------------

#[tokio::test]
async fn graph_source_follows_paging_links() {
    let server = CannedServer::spawn(|_, target| {
        if target.starts_with("/form-1/leads") {
            (
                200,
                format!(
                    r#"{{"data":[{}],"paging":{{"next":"{{BASE}}/page-2"}}}}"#,
                    lead_json("d1", "Ana")
                ),
            )
        } else if target.starts_with("/page-2") {
            (200, format!(r#"{{"data":[{}]}}"#, lead_json("d2", "Rui")))
        } else {
            (404, "{}".to_string())
        }
    })
    .await;

    let source = GraphRecordSource::new(client(), server.base.clone(), 10);
    let records = source.fetch(&source_settings()).await.expect("fetch");

    let dates: Vec<_> = records.iter().map(|r| r.created_time.as_str()).collect();
    assert_eq!(dates, vec!["d1", "d2"]);

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].target.contains("access_token=graph-secret"));
    assert!(requests[0].target.contains("fields=created_time%2Cfield_data"));
}

#[tokio::test]
async fn graph_source_stops_at_the_page_cap() {
    let server = CannedServer::spawn(|_, _| {
        (
            200,
            format!(
                r#"{{"data":[{}],"paging":{{"next":"{{BASE}}/more"}}}}"#,
                lead_json("d", "Ana")
            ),
        )
    })
    .await;

    let source = GraphRecordSource::new(client(), server.base.clone(), 2);
    let records = source.fetch(&source_settings()).await.expect("fetch");
    assert_eq!(records.len(), 2);
    assert_eq!(server.requests().len(), 2);
}

#[tokio::test]
async fn graph_error_payload_is_an_error_not_an_empty_batch() {
    let server = CannedServer::spawn(|_, _| {
        (
            400,
            r#"{"error":{"message":"Error validating access token","code":190}}"#.to_string(),
        )
    })
    .await;

    let source = GraphRecordSource::new(client(), server.base.clone(), 10);
    let err = source.fetch(&source_settings()).await.unwrap_err();

    assert!(matches!(err, SourceError::Api { .. }));
    assert!(err.to_string().contains("Error validating access token"));
    assert!(!err.to_string().contains("graph-secret"));
}

#[tokio::test]
async fn error_on_a_later_page_fails_the_whole_fetch() {
    let server = CannedServer::spawn(|_, target| {
        if target.starts_with("/form-1/leads") {
            (
                200,
                format!(
                    r#"{{"data":[{}],"paging":{{"next":"{{BASE}}/page-2"}}}}"#,
                    lead_json("d1", "Ana")
                ),
            )
        } else {
            (
                500,
                r#"{"error":{"message":"Please reduce the amount of data","code":1}}"#
                    .to_string(),
            )
        }
    })
    .await;

    let source = GraphRecordSource::new(client(), server.base.clone(), 10);
    let err = source.fetch(&source_settings()).await.unwrap_err();

    assert!(matches!(err, SourceError::Api { .. }));
    assert!(err.to_string().contains("reduce the amount of data"));
    assert_eq!(server.requests().len(), 2);
}

#[tokio::test]
async fn unreachable_graph_host_does_not_leak_the_token() {
    // Bind and drop to get a port nobody listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let base = format!("http://{}", listener.local_addr().expect("addr"));
    drop(listener);

    let source = GraphRecordSource::new(client(), base, 10);
    let err = source.fetch(&source_settings()).await.unwrap_err();
    assert!(matches!(err, SourceError::Http(_)));
    assert!(!err.to_string().contains("graph-secret"));
}

// ---------------------------------------------------------------------------
// Sheets store
// ---------------------------------------------------------------------------

#[tokio::test]
async fn open_resolves_the_first_worksheet() {
    let server = CannedServer::spawn(|_, target| {
        if target.starts_with("/spreadsheets/sheet-1?") {
            (
                200,
                r#"{"sheets":[{"properties":{"title":"Leads"}},{"properties":{"title":"Old"}}]}"#
                    .to_string(),
            )
        } else {
            (404, "{}".to_string())
        }
    })
    .await;

    let store = GoogleSheetStore::new(client(), server.base.clone());
    let sheet = store.open(&destination()).await.expect("open");

    assert_eq!(sheet.worksheet, "Leads");
    let requests = server.requests();
    assert_eq!(
        requests[0].authorization.as_deref(),
        Some("Bearer google-secret")
    );
}

#[tokio::test]
async fn open_maps_auth_and_missing_sheet_failures() {
    let denied = CannedServer::spawn(|_, _| (403, r#"{"error":{"message":"denied"}}"#.into())).await;
    let store = GoogleSheetStore::new(client(), denied.base.clone());
    assert!(matches!(
        store.open(&destination()).await,
        Err(StoreError::Unauthorized { status: 403 })
    ));

    let missing = CannedServer::spawn(|_, _| (404, "{}".into())).await;
    let store = GoogleSheetStore::new(client(), missing.base.clone());
    assert!(matches!(
        store.open(&destination()).await,
        Err(StoreError::SheetNotFound { ref sheet_id }) if sheet_id == "sheet-1"
    ));

    let empty = CannedServer::spawn(|_, _| (200, r#"{"sheets":[]}"#.into())).await;
    let store = GoogleSheetStore::new(client(), empty.base.clone());
    assert!(matches!(
        store.open(&destination()).await,
        Err(StoreError::NoWorksheet { .. })
    ));
}

#[tokio::test]
async fn empty_first_row_gets_the_header() {
    let server = CannedServer::spawn(|method, target| match method {
        "GET" if target.starts_with("/spreadsheets/sheet-1?") => (
            200,
            r#"{"sheets":[{"properties":{"title":"Sheet1"}}]}"#.to_string(),
        ),
        "GET" => (200, r#"{"range":"Sheet1!1:1"}"#.to_string()),
        "POST" => (200, r#"{"updates":{"updatedRows":1}}"#.to_string()),
        _ => (405, "{}".to_string()),
    })
    .await;

    let store = GoogleSheetStore::new(client(), server.base.clone());
    let sheet = store.open(&destination()).await.expect("open");
    store.ensure_header(&sheet).await.expect("header");

    let posts: Vec<_> = server
        .requests()
        .into_iter()
        .filter(|r| r.method == "POST")
        .collect();
    assert_eq!(posts.len(), 1);
    assert!(posts[0].target.contains(":append"));
    assert!(posts[0].target.contains("valueInputOption=RAW"));
    assert!(posts[0].body.contains(r#"["Date","Name","Email","Other Fields"]"#));
}

#[tokio::test]
async fn populated_first_row_is_left_alone() {
    let server = CannedServer::spawn(|method, target| match method {
        "GET" if target.starts_with("/spreadsheets/sheet-1?") => (
            200,
            r#"{"sheets":[{"properties":{"title":"Sheet1"}}]}"#.to_string(),
        ),
        "GET" => (200, r#"{"values":[["Date","Name"]]}"#.to_string()),
        _ => (200, r#"{"updates":{"updatedRows":1}}"#.to_string()),
    })
    .await;

    let store = GoogleSheetStore::new(client(), server.base.clone());
    let sheet = store.open(&destination()).await.expect("open");
    store.ensure_header(&sheet).await.expect("header");

    let posts = server
        .requests()
        .into_iter()
        .filter(|r| r.method == "POST")
        .count();
    assert_eq!(posts, 0);
}

#[tokio::test]
async fn existing_keys_skip_the_header_cell() {
    let server = CannedServer::spawn(|_, target| {
        if target.contains("majorDimension=COLUMNS") {
            (200, r#"{"values":[["Date","d1","d2"]]}"#.to_string())
        } else {
            (404, "{}".to_string())
        }
    })
    .await;

    let store = GoogleSheetStore::new(client(), server.base.clone());
    let sheet = leadable_sync::SheetHandle {
        spreadsheet_id: "sheet-1".into(),
        worksheet: "Sheet1".into(),
        access_token: "google-secret".into(),
    };
    let keys = store.existing_keys(&sheet).await.expect("keys");
    assert_eq!(keys, HashSet::from(["d1".to_string(), "d2".to_string()]));
}

#[tokio::test]
async fn failed_append_surfaces_the_api_message() {
    let server = CannedServer::spawn(|_, _| {
        (
            500,
            r#"{"error":{"code":500,"message":"Internal error encountered."}}"#.to_string(),
        )
    })
    .await;

    let store = GoogleSheetStore::new(client(), server.base.clone());
    let sheet = leadable_sync::SheetHandle {
        spreadsheet_id: "sheet-1".into(),
        worksheet: "Sheet1".into(),
        access_token: "google-secret".into(),
    };
    let row = CanonicalRow {
        date: "d1".into(),
        name: "Ana".into(),
        email: "ana@x.com".into(),
        other_fields: Vec::new(),
    };
    let err = store.append(&sheet, &row).await.unwrap_err();
    assert!(matches!(err, StoreError::Api { status: 500, .. }));
    assert!(err.to_string().contains("Internal error encountered."));
}
