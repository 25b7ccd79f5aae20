use evsolar::config::EmporiaConfig;
use evsolar::emporia::EmporiaApi;
use evsolar::persistence::{StoredTokens, TokenStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const CHARGER_STATUS: &str = r#"{"evChargers":[{"deviceGid":4242,"chargerOn":false,
    "chargingRate":16,"maxChargingRate":40,"status":"Standby","icon":"CarConnected"}]}"#;

/// One parsed request as seen by the stub
struct Request {
    path: String,
    auth_token: Option<String>,
    body: String,
}

#[derive(Default)]
struct Calls {
    api: AtomicUsize,
    refresh: AtomicUsize,
    login: AtomicUsize,
    tokens_seen: Mutex<Vec<String>>,
}

type Handler = Arc<dyn Fn(&Request) -> (u16, String) + Send + Sync>;

async fn read_request(stream: &mut TcpStream) -> Option<Request> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let path = lines.next()?.split_whitespace().nth(1)?.to_string();
    let mut content_length = 0;
    let mut auth_token = None;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse().unwrap_or(0);
        } else if name.eq_ignore_ascii_case("authtoken") {
            auth_token = Some(value.to_string());
        }
    }
    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Some(Request {
        path,
        auth_token,
        body: String::from_utf8_lossy(&buf[header_end..]).to_string(),
    })
}

/// Serve `handler` on a local port; returns the base URL
async fn serve(handler: Handler) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let handler = handler.clone();
            tokio::spawn(async move {
                let Some(request) = read_request(&mut stream).await else {
                    return;
                };
                let (status, body) = handler(&request);
                let response = format!(
                    "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });
    format!("http://{}", addr)
}

/// Emporia API that rejects every token but `fresh`, plus a Cognito endpoint
/// whose refresh flow answers with `refresh_status`
async fn stub_emporia(calls: Arc<Calls>, refresh_status: u16) -> String {
    let handler: Handler = Arc::new(move |req: &Request| {
        if req.path.starts_with("/cognito") {
            if req.body.contains("REFRESH_TOKEN_AUTH") {
                calls.refresh.fetch_add(1, Ordering::SeqCst);
                if refresh_status != 200 {
                    return (
                        refresh_status,
                        r#"{"__type":"NotAuthorizedException","message":"Refresh Token has expired"}"#
                            .to_string(),
                    );
                }
                return (
                    200,
                    r#"{"AuthenticationResult":{"IdToken":"fresh","AccessToken":"a2"}}"#.to_string(),
                );
            }
            calls.login.fetch_add(1, Ordering::SeqCst);
            return (
                200,
                r#"{"AuthenticationResult":{"IdToken":"fresh","AccessToken":"a3","RefreshToken":"r2"}}"#
                    .to_string(),
            );
        }
        calls.api.fetch_add(1, Ordering::SeqCst);
        let token = req.auth_token.clone().unwrap_or_default();
        calls.tokens_seen.lock().unwrap().push(token.clone());
        if token == "fresh" {
            (200, CHARGER_STATUS.to_string())
        } else {
            (401, r#"{"message":"Unauthorized"}"#.to_string())
        }
    });
    serve(handler).await
}

fn config_for(base: &str, token_file: &std::path::Path) -> EmporiaConfig {
    EmporiaConfig {
        username: "owner@example.com".to_string(),
        password: "hunter2".to_string(),
        token_file: token_file.to_string_lossy().to_string(),
        device_gid: Some(4242),
        charge_rate_amps: None,
        api_base_url: base.to_string(),
        cognito_url: format!("{}/cognito", base),
        cognito_client_id: "client".to_string(),
    }
}

fn seed_stale_session(path: &std::path::Path) {
    TokenStore::new(path)
        .save(&StoredTokens {
            id_token: Some("stale".to_string()),
            access_token: None,
            refresh_token: Some("r1".to_string()),
            username: Some("owner@example.com".to_string()),
        })
        .unwrap();
}

#[tokio::test]
async fn rejected_token_is_refreshed_once() {
    let dir = tempfile::tempdir().unwrap();
    let token_file = dir.path().join("emporia.json");
    seed_stale_session(&token_file);
    let calls = Arc::new(Calls::default());
    let base = stub_emporia(calls.clone(), 200).await;

    let api = EmporiaApi::new(&config_for(&base, &token_file), Duration::from_secs(5)).unwrap();
    let charger = api.charger_status().await.unwrap();

    assert_eq!(charger.device_gid, 4242);
    assert!(charger.car_connected());
    assert_eq!(calls.refresh.load(Ordering::SeqCst), 1);
    assert_eq!(calls.login.load(Ordering::SeqCst), 0);
    assert_eq!(calls.api.load(Ordering::SeqCst), 2);
    assert_eq!(*calls.tokens_seen.lock().unwrap(), vec!["stale", "fresh"]);

    // The refreshed id token is kept; the refresh token survives the refresh
    let stored = TokenStore::new(&token_file).load();
    assert_eq!(stored.id_token.as_deref(), Some("fresh"));
    assert_eq!(stored.refresh_token.as_deref(), Some("r1"));

    // A second read goes straight through
    api.charger_status().await.unwrap();
    assert_eq!(calls.api.load(Ordering::SeqCst), 3);
    assert_eq!(calls.refresh.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_refresh_falls_back_to_login() {
    let dir = tempfile::tempdir().unwrap();
    let token_file = dir.path().join("emporia.json");
    seed_stale_session(&token_file);
    let calls = Arc::new(Calls::default());
    let base = stub_emporia(calls.clone(), 400).await;

    let api = EmporiaApi::new(&config_for(&base, &token_file), Duration::from_secs(5)).unwrap();
    let charger = api.charger_status().await.unwrap();

    assert_eq!(charger.device_gid, 4242);
    assert_eq!(calls.refresh.load(Ordering::SeqCst), 1);
    assert_eq!(calls.login.load(Ordering::SeqCst), 1);
    assert_eq!(calls.api.load(Ordering::SeqCst), 2);

    let stored = TokenStore::new(&token_file).load();
    assert_eq!(stored.refresh_token.as_deref(), Some("r2"));
}

#[tokio::test]
async fn missing_session_logs_in_before_first_request() {
    let dir = tempfile::tempdir().unwrap();
    let token_file = dir.path().join("emporia.json");
    let calls = Arc::new(Calls::default());
    let base = stub_emporia(calls.clone(), 200).await;

    let api = EmporiaApi::new(&config_for(&base, &token_file), Duration::from_secs(5)).unwrap();
    api.charger_status().await.unwrap();

    assert_eq!(calls.login.load(Ordering::SeqCst), 1);
    assert_eq!(calls.refresh.load(Ordering::SeqCst), 0);
    assert_eq!(*calls.tokens_seen.lock().unwrap(), vec!["fresh"]);
}
