//! In-process forward proxy serving canned responses

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const LIVENESS_URL: &str = "http://liveness.test/ping";
pub const DOWNLOAD_URL: &str = "http://download.test/blob";

/// Canned reply for one target URL
#[derive(Clone)]
pub enum Reply {
    /// Status line code, whether to send content-length, body
    Respond {
        status: u16,
        content_length: bool,
        body: Vec<u8>,
    },
    /// Accept the request and never answer
    Hang,
    /// Read the request, then close the connection without answering
    Close,
    /// The n-th request gets the n-th reply; the last one repeats
    Sequence(Vec<Reply>),
}

impl Reply {
    pub fn ok(body: &[u8]) -> Self {
        Reply::Respond {
            status: 200,
            content_length: true,
            body: body.to_vec(),
        }
    }

    pub fn status(status: u16) -> Self {
        Reply::Respond {
            status,
            content_length: true,
            body: Vec::new(),
        }
    }

    pub fn without_length(body: &[u8]) -> Self {
        Reply::Respond {
            status: 200,
            content_length: false,
            body: body.to_vec(),
        }
    }
}

pub struct FakeProxy {
    pub addr: SocketAddr,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl FakeProxy {
    /// Start a proxy answering `liveness` and `download` requests
    pub async fn start(liveness: Reply, download: Reply) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(Mutex::new(HashMap::new()));

        let mut routes = HashMap::new();
        routes.insert(LIVENESS_URL.to_string(), liveness);
        routes.insert(DOWNLOAD_URL.to_string(), download);
        let routes = Arc::new(routes);

        let counter = Arc::clone(&hits);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let routes = Arc::clone(&routes);
                let counter = Arc::clone(&counter);
                tokio::spawn(async move {
                    let _ = serve(stream, &routes, &counter).await;
                });
            }
        });

        Self { addr, hits }
    }

    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.addr.port())
    }

    pub fn hits(&self, url: &str) -> usize {
        self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

async fn serve(
    mut stream: TcpStream,
    routes: &HashMap<String, Reply>,
    hits: &Mutex<HashMap<String, usize>>,
) -> std::io::Result<()> {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&buf[..n]);
    }

    let head = String::from_utf8_lossy(&request);
    let target = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or_default()
        .to_string();
    let hit = {
        let mut hits = hits.lock().unwrap();
        let count = hits.entry(target.clone()).or_insert(0);
        *count += 1;
        *count
    };

    let mut reply = routes.get(&target).cloned().unwrap_or(Reply::status(404));
    while let Reply::Sequence(replies) = reply {
        reply = replies
            .get(hit - 1)
            .or(replies.last())
            .cloned()
            .unwrap_or(Reply::status(404));
    }

    match reply {
        Reply::Sequence(_) => unreachable!(),
        Reply::Close => {}
        Reply::Hang => {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        Reply::Respond {
            status,
            content_length,
            body,
        } => {
            let mut response = format!("HTTP/1.1 {} Canned\r\nConnection: close\r\n", status);
            if content_length {
                response.push_str(&format!("Content-Length: {}\r\n", body.len()));
            }
            response.push_str("\r\n");
            stream.write_all(response.as_bytes()).await?;
            stream.write_all(&body).await?;
            stream.shutdown().await?;
        }
    }
    Ok(())
}

/// A port on localhost with nothing listening on it
pub async fn closed_port_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("127.0.0.1:{}", port)
}
