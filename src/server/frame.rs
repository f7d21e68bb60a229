//! HTTP server for the cached frame
//!
//! Serves the most recent capture at a single fixed path. Each connection
//! carries one request and is closed after the response.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::capture::CaptureBuffer;

/// Path the frame is served at
pub const FRAME_PATH: &str = "/screen.png";

/// Largest request head accepted
const MAX_HEAD_SIZE: usize = 8 * 1024;

/// How long a client may take to send its request head
const HEAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Frame server handling client connections
pub struct FrameServer {
    listener: TcpListener,
    buffer: Arc<CaptureBuffer>,
    shutdown_tx: broadcast::Sender<()>,
}

/// A response ready to be written
struct Response {
    status: &'static str,
    content_type: &'static str,
    body: Vec<u8>,
    include_body: bool,
}

impl Response {
    fn text(status: &'static str, message: &str) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            body: message.as_bytes().to_vec(),
            include_body: true,
        }
    }
}

impl FrameServer {
    /// Bind the server to `addr`
    pub async fn bind(addr: SocketAddr, buffer: Arc<CaptureBuffer>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind frame server to {addr}"))?;
        let (shutdown_tx, _) = broadcast::channel(1);

        info!(addr = %listener.local_addr()?, path = FRAME_PATH, "frame server listening");

        Ok(Self {
            listener,
            buffer,
            shutdown_tx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("frame server has no local address")
    }

    /// Accept connections until [`FrameServer::shutdown`] is called
    pub async fn run(&self) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "client connected");
                        let buffer = Arc::clone(&self.buffer);
                        let mut client_shutdown = self.shutdown_tx.subscribe();

                        tokio::spawn(async move {
                            tokio::select! {
                                result = handle_client(stream, buffer) => {
                                    if let Err(e) = result {
                                        warn!(?e, "client handler error");
                                    }
                                }
                                _ = client_shutdown.recv() => {
                                    debug!("client handler shutting down");
                                }
                            }
                        });
                    }
                    Err(e) => {
                        error!(?e, "accept error");
                    }
                },

                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }

        info!("frame server stopped accepting");
        Ok(())
    }

    /// Stop accepting and abort in-flight requests
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        info!("frame server shutdown complete");
    }
}

/// Handle a single request on `stream`
async fn handle_client(mut stream: TcpStream, buffer: Arc<CaptureBuffer>) -> Result<()> {
    let Some(head) = read_head(&mut stream, HEAD_TIMEOUT).await? else {
        debug!("client disconnected before sending a request");
        return Ok(());
    };

    let mut parts = head.lines().next().unwrap_or_default().split_whitespace();
    let (method, target) = match (parts.next(), parts.next()) {
        (Some(method), Some(target)) => (method, target),
        _ => {
            let response = Response::text("400 Bad Request", "malformed request line");
            return write_response(&mut stream, response).await;
        }
    };
    let path = target.split('?').next().unwrap_or(target);

    debug!(method, path, "received request");
    let response = route(method, path, buffer).await;
    write_response(&mut stream, response).await
}

async fn route(method: &str, path: &str, buffer: Arc<CaptureBuffer>) -> Response {
    if path != FRAME_PATH {
        return Response::text("404 Not Found", "not found");
    }
    let include_body = match method {
        "GET" => true,
        "HEAD" => false,
        _ => return Response::text("405 Method Not Allowed", "method not allowed"),
    };

    let content_type = buffer.content_type();
    // The buffer lock may be held by a capture in progress
    let copied = tokio::task::spawn_blocking(move || {
        let mut body = Vec::new();
        std::io::Read::read_to_end(&mut buffer.read(), &mut body).map(|_| body)
    })
    .await;

    match copied {
        Ok(Ok(body)) => Response {
            status: "200 OK",
            content_type,
            body,
            include_body,
        },
        Ok(Err(e)) => {
            error!(?e, "failed to copy frame");
            Response::text("500 Internal Server Error", &e.to_string())
        }
        Err(e) => {
            error!(?e, "frame copy task failed");
            Response::text("500 Internal Server Error", &e.to_string())
        }
    }
}

/// Read up to the end of the request head
///
/// None if the peer closed first, sent too much, or stayed silent past
/// `limit`.
async fn read_head(stream: &mut TcpStream, limit: Duration) -> Result<Option<String>> {
    match tokio::time::timeout(limit, read_head_inner(stream)).await {
        Ok(result) => result,
        Err(_) => {
            debug!(?limit, "client sent no request in time, disconnecting");
            Ok(None)
        }
    }
}

async fn read_head_inner(stream: &mut TcpStream) -> Result<Option<String>> {
    let mut head = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        head.extend_from_slice(&chunk[..n]);

        if head.windows(4).any(|w| w == b"\r\n\r\n") {
            return Ok(Some(String::from_utf8_lossy(&head).into_owned()));
        }
        if head.len() > MAX_HEAD_SIZE {
            warn!(len = head.len(), "request head too large, disconnecting");
            return Ok(None);
        }
    }
}

async fn write_response(stream: &mut TcpStream, response: Response) -> Result<()> {
    let head = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        response.content_type,
        response.body.len()
    );

    stream.write_all(head.as_bytes()).await?;
    if response.include_body {
        stream.write_all(&response.body).await?;
    }
    stream.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureError, CaptureSource, PngEncoder, Rect};
    use image::{Rgba, RgbaImage};

    struct GreySource;

    impl CaptureSource for GreySource {
        fn capture_rect(&self, bounds: Rect) -> Result<RgbaImage, CaptureError> {
            Ok(RgbaImage::from_pixel(
                bounds.width,
                bounds.height,
                Rgba([128, 128, 128, 255]),
            ))
        }
    }

    async fn start_server() -> (Arc<FrameServer>, Arc<CaptureBuffer>, SocketAddr) {
        let buffer = Arc::new(CaptureBuffer::with_capacity(
            Rect::new(0, 0, 4, 4),
            GreySource,
            PngEncoder,
            64,
        ));
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = Arc::new(FrameServer::bind(addr, Arc::clone(&buffer)).await.unwrap());
        let local = server.local_addr().unwrap();

        let running = Arc::clone(&server);
        tokio::spawn(async move { running.run().await });
        (server, buffer, local)
    }

    async fn request(addr: SocketAddr, raw: &str) -> (String, Vec<u8>) {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw.as_bytes()).await.unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();

        let split = response
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("response head");
        let head = String::from_utf8(response[..split].to_vec()).unwrap();
        (head, response[split + 4..].to_vec())
    }

    #[tokio::test]
    async fn test_serves_empty_frame_before_capture() {
        let (server, _buffer, addr) = start_server().await;

        let (head, body) = request(addr, "GET /screen.png HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
        assert!(head.starts_with("HTTP/1.1 200 OK"));
        assert!(head.contains("Content-Type: image/png"));
        assert!(head.contains("Content-Length: 0"));
        assert!(body.is_empty());

        server.shutdown();
    }

    #[tokio::test]
    async fn test_serves_captured_frame() {
        let (server, buffer, addr) = start_server().await;
        buffer.capture().unwrap();

        let (head, body) = request(addr, "GET /screen.png?t=1 HTTP/1.1\r\n\r\n").await;
        assert!(head.starts_with("HTTP/1.1 200 OK"));
        assert_eq!(&body[..4], b"\x89PNG");
        assert_eq!(body.len(), buffer.len());

        server.shutdown();
    }

    #[tokio::test]
    async fn test_head_omits_body() {
        let (server, buffer, addr) = start_server().await;
        buffer.capture().unwrap();

        let (head, body) = request(addr, "HEAD /screen.png HTTP/1.1\r\n\r\n").await;
        assert!(head.starts_with("HTTP/1.1 200 OK"));
        assert!(head.contains(&format!("Content-Length: {}", buffer.len())));
        assert!(body.is_empty());

        server.shutdown();
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found() {
        let (server, _buffer, addr) = start_server().await;

        let (head, _) = request(addr, "GET /index.html HTTP/1.1\r\n\r\n").await;
        assert!(head.starts_with("HTTP/1.1 404 Not Found"));

        server.shutdown();
    }

    #[tokio::test]
    async fn test_silent_client_is_dropped() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = TcpStream::connect(addr).await.unwrap();
        let (mut stream, _) = listener.accept().await.unwrap();

        let head = tokio::time::timeout(
            Duration::from_secs(5),
            read_head(&mut stream, Duration::from_millis(50)),
        )
        .await
        .expect("head read should give up on its own");
        assert!(head.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_other_methods_are_rejected() {
        let (server, _buffer, addr) = start_server().await;

        let (head, _) = request(addr, "POST /screen.png HTTP/1.1\r\n\r\n").await;
        assert!(head.starts_with("HTTP/1.1 405"));

        server.shutdown();
    }
}
