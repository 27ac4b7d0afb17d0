//! 集成测试 - 服务器与客户端
//!
//! 在随机端口启动真实的文件服务器，通过客户端库和原始 HTTP 请求验证行为。

use fileshare_core::{
    ClientConfig, ClientError, FileServer, FileShareClient, MemorySettings, ProbeOutcome,
    RequestTimeouts, ServerConfig,
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct TestServer {
    server: FileServer,
    addr: SocketAddr,
    dir: TempDir,
}

impl TestServer {
    fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn client(&self) -> FileShareClient {
        FileShareClient::from_settings(Arc::new(MemorySettings::with_url(self.url()))).unwrap()
    }

    fn write_source(&self, name: &str, content: &[u8]) -> std::path::PathBuf {
        let src_dir = self.dir.path().join("src");
        std::fs::create_dir_all(&src_dir).unwrap();
        let path = src_dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }
}

async fn start_server_with(max_upload_bytes: Option<usize>) -> TestServer {
    let dir = TempDir::new().unwrap();
    let mut config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        upload_dir: dir.path().join("uploads"),
        database_path: dir.path().join("catalog.sqlite3"),
        ..Default::default()
    };
    if let Some(limit) = max_upload_bytes {
        config.max_upload_bytes = limit;
    }

    let server = FileServer::new(config).unwrap();
    let addr = server.start().await.unwrap();
    TestServer { server, addr, dir }
}

async fn start_server() -> TestServer {
    start_server_with(None).await
}

#[tokio::test]
async fn test_index_and_connection() {
    let ts = start_server().await;

    let body = reqwest::get(format!("{}/", ts.url()))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "File Server is running!");

    let client = ts.client();
    assert!(client.test_connection(None).await);
    assert!(client.probe(Some(&ts.url())).await.is_reachable());
}

#[tokio::test]
async fn test_empty_listing() {
    let ts = start_server().await;
    assert!(ts.client().list_files().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_download_round_trip() {
    let ts = start_server().await;
    let client = ts.client();

    let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    let source = ts.write_source("data.bin", &content);
    client.upload_file(&source).await.unwrap();

    let dest = ts.dir.path().join("data.copy");
    let written = client.download_file("data.bin", &dest).await.unwrap();
    assert_eq!(written, content.len() as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), content);

    let stored = ts.server.upload_dir().root().join("data.bin");
    assert_eq!(std::fs::read(stored).unwrap(), content);
}

#[tokio::test]
async fn test_list_in_upload_order() {
    let ts = start_server().await;
    let client = ts.client();

    let b = ts.write_source("b.txt", b"bbb");
    let a = ts.write_source("a.txt", b"aaa");
    client.upload_file(&b).await.unwrap();
    client.upload_file(&a).await.unwrap();

    assert_eq!(client.list_files().await.unwrap(), vec!["b.txt", "a.txt"]);
}

#[tokio::test]
async fn test_duplicate_upload_overwrites_content_keeps_one_entry() {
    let ts = start_server().await;
    let client = ts.client();

    let first = ts.write_source("a.txt", b"first");
    client.upload_file(&first).await.unwrap();
    let original = ts.server.catalog().get("a.txt").unwrap().unwrap();

    let second = ts.write_source("a.txt", b"second version");
    client.upload_file(&second).await.unwrap();

    assert_eq!(client.list_files().await.unwrap(), vec!["a.txt"]);

    let dest = ts.dir.path().join("a.out");
    client.download_file("a.txt", &dest).await.unwrap();
    assert_eq!(std::fs::read(&dest).unwrap(), b"second version");

    // 目录记录保持第一次上传的时间
    let record = ts.server.catalog().get("a.txt").unwrap().unwrap();
    assert_eq!(record, original);
}

#[tokio::test]
async fn test_concurrent_uploads_same_name() {
    let ts = start_server().await;
    let client = Arc::new(ts.client());

    let one = ts.write_source("one", &vec![b'1'; 64 * 1024]);
    let two = ts.write_source("two", &vec![b'2'; 64 * 1024]);

    let (r1, r2) = tokio::join!(
        client.upload_as(&one, "same.bin"),
        client.upload_as(&two, "same.bin")
    );
    r1.unwrap();
    r2.unwrap();

    assert_eq!(client.list_files().await.unwrap(), vec!["same.bin"]);

    // 内容来自其中一次上传，不会交错
    let dest = ts.dir.path().join("same.out");
    client.download_file("same.bin", &dest).await.unwrap();
    let data = std::fs::read(&dest).unwrap();
    assert_eq!(data.len(), 64 * 1024);
    assert!(data.iter().all(|&b| b == data[0]));
}

#[tokio::test]
async fn test_filename_with_spaces_and_unicode() {
    let ts = start_server().await;
    let client = ts.client();

    for name in ["my report.txt", "报告 #1.txt"] {
        let source = ts.write_source(name, name.as_bytes());
        client.upload_file(&source).await.unwrap();

        let dest = ts.dir.path().join("out.txt");
        client.download_file(name, &dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), name.as_bytes());
    }

    assert_eq!(
        client.list_files().await.unwrap(),
        vec!["my report.txt", "报告 #1.txt"]
    );
}

#[tokio::test]
async fn test_download_missing_creates_no_file() {
    let ts = start_server().await;
    let client = ts.client();

    let dest = ts.dir.path().join("missing.out");
    let err = client.download_file("missing.txt", &dest).await.unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {err}");
    assert!(!dest.exists());
}

#[tokio::test]
async fn test_download_traversal_rejected() {
    let ts = start_server().await;
    std::fs::write(ts.dir.path().join("secret.txt"), "secret").unwrap();

    let client = ts.client();
    let dest = ts.dir.path().join("leak.out");
    let err = client.download_file("../secret.txt", &dest).await.unwrap_err();
    assert_eq!(err.status(), Some(400));
    assert!(!dest.exists());

    // 上传暂存目录不能通过名称访问
    let err = client.download_file(".incoming", &dest).await.unwrap_err();
    assert_eq!(err.status(), Some(400));
}

#[tokio::test]
async fn test_upload_traversal_rejected() {
    let ts = start_server().await;
    let client = ts.client();

    let source = ts.write_source("evil.txt", b"evil");
    let err = client.upload_as(&source, "../evil.txt").await.unwrap_err();
    assert_eq!(err.status(), Some(400));

    assert!(!ts.dir.path().join("evil.txt").exists());
    assert!(client.list_files().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_without_file_field() {
    let ts = start_server().await;

    let form = reqwest::multipart::Form::new().text("note", "hello");
    let resp = reqwest::Client::new()
        .post(format!("{}/upload", ts.url()))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    assert_eq!(resp.text().await.unwrap(), "No file provided");
}

#[tokio::test]
async fn test_upload_empty_filename() {
    let ts = start_server().await;

    let part = reqwest::multipart::Part::bytes(b"data".to_vec()).file_name("");
    let form = reqwest::multipart::Form::new().part("file", part);
    let resp = reqwest::Client::new()
        .post(format!("{}/upload", ts.url()))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    assert_eq!(resp.text().await.unwrap(), "No file selected");

    assert!(ts.client().list_files().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_over_limit_returns_413() {
    let ts = start_server_with(Some(1024)).await;

    let part = reqwest::multipart::Part::bytes(vec![0u8; 1500]).file_name("big.bin");
    let form = reqwest::multipart::Form::new().part("file", part);
    let resp = reqwest::Client::new()
        .post(format!("{}/upload", ts.url()))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 413);

    assert!(ts.client().list_files().await.unwrap().is_empty());
    assert!(!ts.server.upload_dir().root().join("big.bin").exists());
}

#[tokio::test]
async fn test_upload_missing_source() {
    let ts = start_server().await;
    let err = ts
        .client()
        .upload_file(Path::new("/definitely/not/here.txt"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Io(_)));
}

#[tokio::test]
async fn test_unreachable_server() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client =
        FileShareClient::from_settings(Arc::new(MemorySettings::with_url(format!("http://{addr}"))))
            .unwrap();
    assert!(!client.test_connection(None).await);

    let err = client.list_files().await.unwrap_err();
    assert!(matches!(err, ClientError::Unreachable(_)), "unexpected error: {err}");
}

#[tokio::test]
async fn test_catalog_survives_restart() {
    let dir = TempDir::new().unwrap();
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        upload_dir: dir.path().join("uploads"),
        database_path: dir.path().join("catalog.sqlite3"),
        ..Default::default()
    };

    {
        let server = FileServer::new(config.clone()).unwrap();
        let source = dir.path().join("keep.txt");
        std::fs::write(&source, "keep").unwrap();
        server
            .catalog()
            .insert_if_absent("keep.txt", &server.upload_dir().root().join("keep.txt"))
            .unwrap();
    }

    let server = FileServer::new(config).unwrap();
    assert_eq!(server.catalog().list_all().unwrap(), vec!["keep.txt"]);
}

fn client_with_timeouts(url: &str, timeouts: RequestTimeouts) -> FileShareClient {
    let config = ClientConfig::new(url).with_timeouts(timeouts);
    FileShareClient::new(config, Arc::new(MemorySettings::default())).unwrap()
}

#[tokio::test]
async fn test_silent_server_times_out() {
    // 只监听不处理：连接能建立，但永远没有响应
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let short = Duration::from_millis(300);
    let client = client_with_timeouts(
        &url,
        RequestTimeouts {
            connect: Duration::from_secs(2),
            probe: short,
            list: short,
            download: short,
            upload: short,
        },
    );

    let err = client.list_files().await.unwrap_err();
    assert!(matches!(err, ClientError::TimedOut), "unexpected error: {err}");
    assert_eq!(client.probe(None).await, ProbeOutcome::TimedOut);
    assert!(!client.test_connection(None).await);

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("never.bin");
    let err = client.download_file("never.bin", &dest).await.unwrap_err();
    assert!(matches!(err, ClientError::TimedOut), "unexpected error: {err}");
    assert!(!dest.exists());

    let source = dir.path().join("small.txt");
    std::fs::write(&source, b"hello").unwrap();
    let err = client.upload_file(&source).await.unwrap_err();
    assert!(matches!(err, ClientError::TimedOut), "unexpected error: {err}");

    drop(listener);
}

#[tokio::test]
async fn test_slow_download_completes_while_data_flows() {
    use axum::{Router, body::Body, routing::get};

    const CHUNKS: u32 = 20;
    const CHUNK_LEN: usize = 1024;

    // 每 100ms 发送一块，总时长约 2s，超过 1s 的空闲超时但从不空闲那么久
    async fn slow_body() -> Body {
        let stream = futures_util::stream::unfold(0u32, |i| async move {
            if i == CHUNKS {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
            Some((Ok::<_, std::io::Error>(vec![b'x'; CHUNK_LEN]), i + 1))
        });
        Body::from_stream(stream)
    }

    let app = Router::new().route("/download/:filename", get(slow_body));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let client = client_with_timeouts(
        &format!("http://{addr}"),
        RequestTimeouts {
            download: Duration::from_secs(1),
            ..Default::default()
        },
    );

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("slow.bin");
    let written = client.download_file("slow.bin", &dest).await.unwrap();
    assert_eq!(written, u64::from(CHUNKS) * CHUNK_LEN as u64);
    assert_eq!(std::fs::read(&dest).unwrap().len(), CHUNKS as usize * CHUNK_LEN);
}
