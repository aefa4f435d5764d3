use std::{net::SocketAddr, path::PathBuf};

use mcore::{
    config::{Config, StoreConfig},
    server::{CONVERT_PATH, MEASUREMENT_FIELD, RECORD_ID_HEADER, Server},
    storage::Store,
};
use rand::RngCore;
use serde_json::{Value, json};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

struct TestServer {
    addr: SocketAddr,
    static_dir: PathBuf,
}

impl TestServer {
    async fn start() -> TestServer {
        let mut salt = [0u8; 8];
        rand::rng().fill_bytes(&mut salt);
        let name: String = salt.iter().map(|b| format!("{b:02x}")).collect();
        let static_dir = std::env::temp_dir().join(format!("mcore-static-{name}"));
        tokio::fs::create_dir_all(static_dir.join("css")).await.unwrap();
        tokio::fs::write(static_dir.join("index.html"), "<h1>measurements</h1>")
            .await
            .unwrap();
        tokio::fs::write(static_dir.join("css/site.css"), "body {}")
            .await
            .unwrap();
        tokio::fs::write(static_dir.join("my file.html"), "spaced")
            .await
            .unwrap();

        let config = Config {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            static_dir: static_dir.clone(),
            store: StoreConfig::Memory,
            read_timeout_ms: 300,
        };
        let store = Store::from_config(&config.store);
        store.provision().await.unwrap();

        let server = Server::bind(&config, store).await.unwrap();
        let addr = server.local_addr();
        tokio::spawn(server.serve());

        TestServer { addr, static_dir }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn raw(&self, request: &[u8]) -> String {
        let mut stream = TcpStream::connect(self.addr).await.unwrap();
        stream.write_all(request).await.unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.static_dir);
    }
}

#[tokio::test]
async fn convert_from_form_body() {
    let server = TestServer::start().await;

    let resp = reqwest::Client::new()
        .post(server.url(CONVERT_PATH))
        .form(&[(MEASUREMENT_FIELD, "aab")])
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "application/json");
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "result": [1, 0] }));
}

#[tokio::test]
async fn convert_from_chunked_body() {
    let server = TestServer::start().await;

    let resp = server
        .raw(
            b"POST /convert-measurements HTTP/1.1\r\n\
              Host: localhost\r\n\
              Content-Type: application/x-www-form-urlencoded\r\n\
              Transfer-Encoding: chunked\r\n\r\n\
              15\r\nconvert-measurements=\r\n\
              3\r\naab\r\n\
              0\r\n\r\n",
        )
        .await;

    assert!(resp.starts_with("HTTP/1.1 200 OK\r\n"), "{resp}");
    assert!(resp.ends_with(r#"{"result":[1,0]}"#), "{resp}");
}

#[tokio::test]
async fn convert_from_multipart_body() {
    let server = TestServer::start().await;

    let body = "--XyZ\r\n\
                Content-Disposition: form-data; name=\"upload\"; filename=\"m.txt\"\r\n\r\n\
                zzzz\r\n\
                --XyZ\r\n\
                Content-Disposition: form-data; name=\"convert-measurements\"\r\n\r\n\
                aab\r\n\
                --XyZ--\r\n";
    let request = format!(
        "POST /convert-measurements HTTP/1.1\r\n\
         Host: localhost\r\n\
         Content-Type: multipart/form-data; boundary=XyZ\r\n\
         Content-Length: {}\r\n\r\n{body}",
        body.len()
    );
    let resp = server.raw(request.as_bytes()).await;

    assert!(resp.starts_with("HTTP/1.1 200 OK\r\n"), "{resp}");
    assert!(resp.ends_with(r#"{"result":[1,0]}"#), "{resp}");
}

#[tokio::test]
async fn error_stalled_request_times_out() {
    let server = TestServer::start().await;

    let resp = server
        .raw(b"POST /convert-measurements HTTP/1.1\r\nContent-Length: 30\r\n\r\nconvert")
        .await;
    assert!(resp.starts_with("HTTP/1.1 408 Request Timeout\r\n"), "{resp}");
}

#[tokio::test]
async fn convert_from_query() {
    let server = TestServer::start().await;

    let body: Value = reqwest::Client::new()
        .get(server.url(CONVERT_PATH))
        .query(&[(MEASUREMENT_FIELD, "azb")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body, json!({ "result": [3] }));
}

#[tokio::test]
async fn invalid_or_missing_input_gives_empty_result() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    for form in [vec![(MEASUREMENT_FIELD, "ab1")], vec![("other", "aa")]] {
        let body: Value = client
            .post(server.url(CONVERT_PATH))
            .form(&form)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body, json!({ "result": [] }));
    }
}

#[tokio::test]
async fn stored_conversion_can_be_retrieved() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.url(CONVERT_PATH))
        .form(&[(MEASUREMENT_FIELD, "cabcbyy")])
        .send()
        .await
        .unwrap();
    let id = resp.headers()[RECORD_ID_HEADER]
        .to_str()
        .unwrap()
        .to_owned();

    let record: Value = client
        .get(server.url(&format!("/measurements/{id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(record["id"], id.as_str());
    assert_eq!(record["measurement_value"], "cabcbyy");
    assert_eq!(record["result_value"], "6,50");
}

#[tokio::test]
async fn unknown_record() {
    let server = TestServer::start().await;

    let resp = reqwest::get(server.url("/measurements/does-not-exist"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn overflow_is_unprocessable() {
    let server = TestServer::start().await;
    let input = format!("a{}", "zza".repeat(200));

    let resp = reqwest::Client::new()
        .post(server.url(CONVERT_PATH))
        .form(&[(MEASUREMENT_FIELD, input.as_str())])
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 422);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn static_files() {
    let server = TestServer::start().await;

    let index = reqwest::get(server.url("/")).await.unwrap();
    assert_eq!(index.status(), 200);
    assert_eq!(
        index.headers()["content-type"],
        "text/html; charset=utf-8"
    );
    assert_eq!(index.text().await.unwrap(), "<h1>measurements</h1>");

    let css = reqwest::get(server.url("/css/site.css")).await.unwrap();
    assert_eq!(css.status(), 200);
    assert_eq!(css.text().await.unwrap(), "body {}");

    let spaced = reqwest::get(server.url("/my%20file.html")).await.unwrap();
    assert_eq!(spaced.status(), 200);
    assert_eq!(spaced.text().await.unwrap(), "spaced");

    let missing = reqwest::get(server.url("/nope.js")).await.unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn static_files_reject_other_methods() {
    let server = TestServer::start().await;

    let resp = reqwest::Client::new()
        .post(server.url("/index.html"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 405);
}

#[tokio::test]
async fn error_path_traversal() {
    let server = TestServer::start().await;

    let resp = server
        .raw(b"GET /../secret HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await;
    assert!(resp.starts_with("HTTP/1.1 403 Forbidden\r\n"), "{resp}");

    let resp = server
        .raw(b"GET /%2e%2e/secret HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await;
    assert!(resp.starts_with("HTTP/1.1 403 Forbidden\r\n"), "{resp}");
}

#[tokio::test]
async fn error_malformed_request() {
    let server = TestServer::start().await;

    let resp = server.raw(b"GARBAGE\r\n\r\n").await;
    assert!(resp.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{resp}");

    let resp = server.raw(b"BREW /pot HTTP/1.1\r\n\r\n").await;
    assert!(resp.starts_with("HTTP/1.1 501 Not Implemented\r\n"), "{resp}");
}

#[tokio::test]
async fn head_request_has_no_body() {
    let server = TestServer::start().await;

    let resp = server
        .raw(b"HEAD /index.html HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await;
    assert!(resp.starts_with("HTTP/1.1 200 OK\r\n"), "{resp}");
    assert!(resp.contains("Content-Length: 21\r\n"), "{resp}");
    assert!(resp.ends_with("\r\n\r\n"), "{resp}");
}
