//! HTTP server on `tiny_http`.
//!
//! One listener shared by a small pool of worker threads. A worker may block
//! for the length of a transfer, so the pool keeps at least one other worker
//! free for progress and cancel requests. Works on both host and ESP32 (via
//! std::net).

use super::{Handler, HttpRequest, Reply};
use log::{debug, error, info, warn};
use std::io::{self, Read};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tiny_http::{Header, Request, Response, Server};

/// Largest accepted request body.
pub const MAX_BODY_LEN: u64 = 16 * 1024;

/// Poll interval for the shutdown flag.
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Running HTTP server. Dropping it stops the workers.
pub struct HttpServer {
    workers: Vec<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    local_addr: Option<SocketAddr>,
}

impl HttpServer {
    /// Bind and start `workers` threads serving `handler`.
    ///
    /// `bind_addr` of `None` listens on all interfaces. Port 0 picks a free
    /// port; see [`HttpServer::local_addr`].
    pub fn start(
        bind_addr: Option<IpAddr>,
        port: u16,
        workers: usize,
        handler: Arc<dyn Handler>,
    ) -> io::Result<Self> {
        let addr = match bind_addr {
            Some(ip) => SocketAddr::new(ip, port),
            None => SocketAddr::from(([0, 0, 0, 0], port)),
        };

        let server = Server::http(addr)
            .map_err(|e| io::Error::new(io::ErrorKind::AddrInUse, format!("{}", e)))?;
        let server = Arc::new(server);
        let local_addr = server.server_addr().to_ip();
        info!(
            "HTTP server listening on {} with {} workers",
            local_addr.map_or_else(|| addr.to_string(), |a| a.to_string()),
            workers
        );

        let shutdown = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers.max(1) {
            let server = server.clone();
            let handler = handler.clone();
            let shutdown = shutdown.clone();
            let handle = thread::Builder::new()
                .name(format!("http-{}", i))
                .spawn(move || run_worker(&server, handler.as_ref(), &shutdown))?;
            handles.push(handle);
        }

        Ok(Self {
            workers: handles,
            shutdown,
            local_addr,
        })
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Stop all workers.
    ///
    /// May take up to the poll interval, or longer if a worker is busy with
    /// a request.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for HttpServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(server: &Server, handler: &dyn Handler, shutdown: &AtomicBool) {
    loop {
        if shutdown.load(Ordering::Acquire) {
            debug!("HTTP worker shutting down");
            break;
        }

        match server.recv_timeout(RECV_TIMEOUT) {
            Ok(Some(request)) => serve(request, handler),
            Ok(None) => {}
            Err(e) => {
                error!("HTTP server error: {}", e);
                break;
            }
        }
    }
}

fn serve(mut request: Request, handler: &dyn Handler) {
    let mut body = Vec::new();
    let read = request
        .as_reader()
        .take(MAX_BODY_LEN + 1)
        .read_to_end(&mut body);

    let reply = match read {
        Err(e) => {
            warn!("Reading request body failed: {}", e);
            Reply::text(400, "Bad Request")
        }
        Ok(_) if body.len() as u64 > MAX_BODY_LEN => Reply::text(413, "Payload Too Large"),
        Ok(_) => {
            let http_request = HttpRequest::new(request.method().clone(), request.url(), body);
            let reply = handler.handle(&http_request);
            debug!(
                "{} {} -> {}",
                http_request.method, http_request.path, reply.status
            );
            reply
        }
    };

    if let Err(e) = request.respond(into_response(reply)) {
        warn!("Failed to send response: {}", e);
    }
}

fn into_response(reply: Reply) -> Response<io::Cursor<Vec<u8>>> {
    let mut response = Response::from_data(reply.body).with_status_code(reply.status);

    let headers = std::iter::once(("Content-Type", reply.content_type)).chain(reply.headers);
    for (name, value) in headers {
        match Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            Ok(header) => response.add_header(header),
            Err(()) => warn!("Dropping invalid header {}: {:?}", name, value),
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::{Ipv4Addr, TcpStream};

    struct Echo;

    impl Handler for Echo {
        fn handle(&self, request: &HttpRequest) -> Reply {
            match request.path.as_str() {
                "/ping" => Reply::text(200, "pong"),
                "/echo" => Reply::new(200, "application/octet-stream", request.body.clone()),
                "/moved" => Reply::redirect("/"),
                _ => Reply::not_found(),
            }
        }
    }

    fn exchange(addr: SocketAddr, raw: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream.write_all(raw.as_bytes()).unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    }

    #[test]
    fn test_loopback_requests() {
        let server = HttpServer::start(
            Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            0,
            2,
            Arc::new(Echo),
        )
        .unwrap();
        let addr = server.local_addr().unwrap();

        let response = exchange(
            addr,
            "GET /ping HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n",
        );
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("pong"));

        let response = exchange(
            addr,
            "POST /echo HTTP/1.1\r\nHost: test\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
        );
        assert!(response.ends_with("hello"));

        let response = exchange(
            addr,
            "GET /moved HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n",
        );
        assert!(response.starts_with("HTTP/1.1 302"));
        assert!(response.contains("Location: /"));
    }

    #[test]
    fn test_stop_joins_workers() {
        let mut server = HttpServer::start(
            Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            0,
            3,
            Arc::new(Echo),
        )
        .unwrap();
        server.stop();
        assert!(server.workers.is_empty());
    }
}
