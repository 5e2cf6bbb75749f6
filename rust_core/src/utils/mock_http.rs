//! One-shot HTTP responder for client tests.
//!
//! Binds an ephemeral port, accepts a single connection, reads one request and
//! answers with a canned status and body. The raw request text is handed back
//! so tests can check paths and headers.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub(crate) struct MockServer {
    /// `http://127.0.0.1:<port>`
    pub url: String,
    request: JoinHandle<String>,
}

impl MockServer {
    /// Raw text of the request the server received
    pub async fn request(self) -> String {
        self.request.await.unwrap_or_default()
    }
}

/// Serve exactly one response with `status` and `body`
pub(crate) async fn serve_once(status: u16, body: &'static str) -> MockServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());

    let request = tokio::spawn(async move {
        let (mut stream, _) = match listener.accept().await {
            Ok(conn) => conn,
            Err(_) => return String::new(),
        };

        let raw = read_request(&mut stream).await;

        let response = format!(
            "HTTP/1.1 {} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        let _ = stream.write_all(response.as_bytes()).await;
        let _ = stream.shutdown().await;

        raw
    });

    MockServer { url, request }
}

/// Read headers, then as many body bytes as Content-Length announces
async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }

    String::from_utf8_lossy(&buf).into_owned()
}
