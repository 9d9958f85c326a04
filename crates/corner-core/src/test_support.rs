//! In-process HTTP stubs for client tests.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Raw request captured by a stub server.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub head: String,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Canned response served for one request.
#[derive(Debug, Clone)]
pub struct StubResponse {
    pub status_line: &'static str,
    pub body: String,
}

impl StubResponse {
    pub fn json(status_line: &'static str, body: impl Into<String>) -> Self {
        Self {
            status_line,
            body: body.into(),
        }
    }
}

/// Serve `responses` in order, one connection each, and hand back what was received.
pub async fn spawn_stub_server(
    responses: Vec<StubResponse>,
) -> (String, JoinHandle<Vec<CapturedRequest>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub server");
    let address = listener.local_addr().expect("local address");

    let handle = tokio::spawn(async move {
        let mut captured = Vec::new();
        for response in responses {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            captured.push(read_request(&mut socket).await);
            let payload = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                response.status_line,
                response.body.len(),
                response.body
            );
            let _ = socket.write_all(payload.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
        captured
    });

    (format!("http://{address}"), handle)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> CapturedRequest {
    let mut raw = Vec::new();
    let mut chunk = [0_u8; 4096];

    let head_end = loop {
        if let Some(position) = find(&raw, b"\r\n\r\n") {
            break position;
        }
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break raw.len(),
            Ok(read) => raw.extend_from_slice(&chunk[..read]),
        }
    };

    let head = String::from_utf8_lossy(&raw[..head_end]).into_owned();
    let mut request = CapturedRequest {
        head,
        body: raw.get(head_end + 4..).map(<[u8]>::to_vec).unwrap_or_default(),
    };

    if let Some(length) = request
        .header("content-length")
        .and_then(|value| value.parse::<usize>().ok())
    {
        while request.body.len() < length {
            match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(read) => request.body.extend_from_slice(&chunk[..read]),
            }
        }
    } else if request
        .header("transfer-encoding")
        .is_some_and(|value| value.eq_ignore_ascii_case("chunked"))
    {
        while find(&request.body, b"0\r\n\r\n").is_none() {
            match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(read) => request.body.extend_from_slice(&chunk[..read]),
            }
        }
    }

    request
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
