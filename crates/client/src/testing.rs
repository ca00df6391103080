//! Throwaway loopback HTTP server for exercising HTTP collaborators.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// A request as seen by the server.
#[derive(Debug, Clone)]
pub(crate) struct Recorded {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub(crate) struct Reply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Write the body in this many pieces, pausing before each.
    pub pace: Option<(usize, Duration)>,
}

impl Reply {
    pub fn new(status: u16) -> Self {
        Self { status, headers: Vec::new(), body: Vec::new(), pace: None }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn paced(mut self, pieces: usize, pause: Duration) -> Self {
        self.pace = Some((pieces.max(1), pause));
        self
    }

    pub fn redirect(location: &str) -> Self {
        Self::new(302).header("Location", location)
    }
}

pub(crate) struct TestServer {
    pub addr: SocketAddr,
    pub requests: Arc<Mutex<Vec<Recorded>>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

/// Serve every connection with `handler(method, path)`, one request per
/// connection.
pub(crate) async fn serve<F>(handler: F) -> TestServer
where
    F: Fn(&str, &str) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let handler = Arc::new(handler);

    let log = requests.clone();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let handler = handler.clone();
            let log = log.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }

                let head = String::from_utf8_lossy(&buf).into_owned();
                let mut lines = head.split("\r\n");
                let mut request_line = lines.next().unwrap_or_default().split(' ');
                let method = request_line.next().unwrap_or_default().to_string();
                let path = request_line.next().unwrap_or_default().to_string();
                let headers = lines
                    .take_while(|l| !l.is_empty())
                    .filter_map(|l| l.split_once(':'))
                    .map(|(n, v)| (n.trim().to_string(), v.trim().to_string()))
                    .collect();

                let reply = handler(&method, &path);
                log.lock().unwrap().push(Recorded { method: method.clone(), path, headers });

                let mut out = format!("HTTP/1.1 {} Test\r\n", reply.status);
                out.push_str(&format!("Content-Length: {}\r\nConnection: close\r\n", reply.body.len()));
                for (name, value) in &reply.headers {
                    out.push_str(&format!("{name}: {value}\r\n"));
                }
                out.push_str("\r\n");

                let _ = stream.write_all(out.as_bytes()).await;
                if method != "HEAD" {
                    match reply.pace {
                        None => {
                            let _ = stream.write_all(&reply.body).await;
                        }
                        Some((pieces, pause)) => {
                            let size = reply.body.len().div_ceil(pieces).max(1);
                            for piece in reply.body.chunks(size) {
                                tokio::time::sleep(pause).await;
                                if stream.write_all(piece).await.is_err() {
                                    return;
                                }
                                let _ = stream.flush().await;
                            }
                        }
                    }
                }
                let _ = stream.shutdown().await;
            });
        }
    });

    TestServer { addr, requests }
}
