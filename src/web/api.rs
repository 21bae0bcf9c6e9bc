//! Library-mode HTTP API.
//!
//! ```text
//! GET  /                   embedded library UI
//! GET  /status             reader and transfer summary
//! GET  /list-files?type=   books on sd or usb
//! POST /transfer-file      {source, destination, filename}
//! GET  /transfer-progress  active job snapshot, 404 when idle
//! POST /transfer-cancel    cancel the active job
//! GET  /<asset>            file from the web root
//! ```

use super::{Handler, HttpRequest, Reply};
use crate::library::list_books;
use crate::transfer::{TransferEngine, TransferError};
use crate::volumes::{Volume, Volumes};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tiny_http::Method;

const INDEX_HTML: &str = include_str!("../../assets/index.html");

#[derive(Debug, Serialize)]
struct StatusBody {
    reader_connected: bool,
    transfer_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bytes_transferred: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_bytes: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TransferRequest {
    source: String,
    destination: String,
    filename: String,
}

#[derive(Debug, Serialize)]
struct Outcome {
    success: bool,
    message: String,
}

impl Outcome {
    fn reply(status: u16, success: bool, message: impl Into<String>) -> Reply {
        Reply::json(
            status,
            &Outcome {
                success,
                message: message.into(),
            },
        )
    }
}

/// Routes for library mode.
pub struct LibraryApi {
    volumes: Arc<Volumes>,
    transfer: TransferEngine,
    web_root: Option<PathBuf>,
}

impl LibraryApi {
    pub fn new(volumes: Arc<Volumes>, transfer: TransferEngine, web_root: Option<PathBuf>) -> Self {
        Self {
            volumes,
            transfer,
            web_root,
        }
    }

    fn status(&self) -> Reply {
        let progress = self.transfer.poll_progress();
        let body = StatusBody {
            reader_connected: self.volumes.is_attached(),
            transfer_active: progress.is_some(),
            filename: progress.as_ref().map(|p| p.filename.clone()),
            bytes_transferred: progress.as_ref().map(|p| p.bytes_transferred),
            total_bytes: progress.as_ref().map(|p| p.total_bytes),
        };
        Reply::json(200, &body)
    }

    fn list_files(&self, request: &HttpRequest) -> Reply {
        let volume: Volume = match request.query_param("type").map(|t| t.parse()) {
            Some(Ok(volume)) => volume,
            Some(Err(e)) => return Reply::text(400, e.to_string()),
            None => return Reply::text(400, "missing type parameter"),
        };

        let Some(handle) = self.volumes.handle(volume) else {
            return Reply::json(200, &Vec::<()>::new());
        };

        match list_books(handle.root()) {
            Ok(books) => Reply::json(200, &books),
            Err(e) => {
                error!("Cannot list {} at {:?}: {}", volume, handle.root(), e);
                Reply::text(500, format!("cannot read {}", volume))
            }
        }
    }

    fn transfer_file(&self, request: &HttpRequest) -> Reply {
        let parsed: TransferRequest = match serde_json::from_slice(&request.body) {
            Ok(parsed) => parsed,
            Err(e) => return Reply::text(400, format!("malformed request: {}", e)),
        };
        let (source, destination) = match (
            parsed.source.parse::<Volume>(),
            parsed.destination.parse::<Volume>(),
        ) {
            (Ok(s), Ok(d)) => (s, d),
            (Err(e), _) | (_, Err(e)) => return Reply::text(400, e.to_string()),
        };

        info!(
            "Transfer requested: {} {} -> {}",
            parsed.filename, source, destination
        );
        match self
            .transfer
            .begin_transfer(source, destination, &parsed.filename)
        {
            Ok(handle) => {
                let report = handle.wait();
                Outcome::reply(200, report.succeeded(), report.message())
            }
            Err(TransferError::Busy) => Outcome::reply(429, false, TransferError::Busy.to_string()),
            Err(e) => {
                warn!("Transfer refused: {}", e);
                Outcome::reply(200, false, e.to_string())
            }
        }
    }

    fn transfer_progress(&self) -> Reply {
        match self.transfer.poll_progress() {
            Some(progress) => Reply::json(200, &progress),
            None => Reply::text(404, "no active transfer"),
        }
    }

    fn transfer_cancel(&self) -> Reply {
        if self.transfer.cancel_transfer() {
            Outcome::reply(200, true, "Cancelling transfer.")
        } else {
            Outcome::reply(200, false, "No active transfer.")
        }
    }

    fn static_file(&self, path: &str) -> Reply {
        let Some(root) = self.web_root.as_deref() else {
            return Reply::not_found();
        };
        let Some(file) = resolve_asset(root, path) else {
            return Reply::not_found();
        };
        match fs::read(&file) {
            Ok(body) => {
                let mime = mime_guess::from_path(&file).first_or_octet_stream();
                Reply::new(200, mime.to_string(), body)
            }
            Err(_) => Reply::not_found(),
        }
    }
}

/// File under `root` named by a request path, refusing anything that
/// escapes the root.
fn resolve_asset(root: &Path, request_path: &str) -> Option<PathBuf> {
    let relative = Path::new(request_path.trim_start_matches('/'));
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }

    let candidate = root.join(relative);
    let canonical = candidate.canonicalize().ok()?;
    let base = root.canonicalize().ok()?;
    (canonical.starts_with(&base) && canonical.is_file()).then_some(canonical)
}

impl Handler for LibraryApi {
    fn handle(&self, request: &HttpRequest) -> Reply {
        let get = request.method == Method::Get;
        let post = request.method == Method::Post;

        match request.path.as_str() {
            "/" if get => Reply::html(200, INDEX_HTML),
            "/status" if get => self.status(),
            "/list-files" if get => self.list_files(request),
            "/transfer-progress" if get => self.transfer_progress(),
            "/transfer-file" if post => self.transfer_file(request),
            "/transfer-cancel" if post => self.transfer_cancel(),
            "/" | "/status" | "/list-files" | "/transfer-progress" => {
                Reply::method_not_allowed("GET")
            }
            "/transfer-file" | "/transfer-cancel" => Reply::method_not_allowed("POST"),
            path if get => self.static_file(path),
            _ => Reply::method_not_allowed("GET"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::Indicator;
    use std::env;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

    struct Fixture {
        base: PathBuf,
        sd: PathBuf,
        usb: PathBuf,
        www: PathBuf,
        volumes: Arc<Volumes>,
    }

    impl Fixture {
        fn new() -> Self {
            let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
            let base = env::temp_dir().join(format!("librarian-api-{}-{}", std::process::id(), id));
            let sd = base.join("sd");
            let usb = base.join("usb");
            let www = base.join("www");
            for dir in [&sd, &usb, &www] {
                fs::create_dir_all(dir).unwrap();
            }
            let volumes = Arc::new(Volumes::new(&sd));
            Self {
                base,
                sd,
                usb,
                www,
                volumes,
            }
        }

        fn api(&self, engine: &TransferEngine) -> LibraryApi {
            LibraryApi::new(self.volumes.clone(), engine.clone(), Some(self.www.clone()))
        }

        fn engine(&self) -> TransferEngine {
            TransferEngine::new(self.volumes.clone(), Indicator::new())
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.base);
        }
    }

    fn json(reply: &Reply) -> serde_json::Value {
        serde_json::from_slice(&reply.body).unwrap()
    }

    fn transfer_body(source: &str, destination: &str, filename: &str) -> String {
        serde_json::json!({
            "source": source,
            "destination": destination,
            "filename": filename,
        })
        .to_string()
    }

    // ==================== Status and listing ====================

    #[test]
    fn test_status_idle() {
        let fx = Fixture::new();
        let api = fx.api(&fx.engine());

        let reply = api.handle(&HttpRequest::get("/status"));
        assert_eq!(reply.status, 200);
        assert_eq!(
            json(&reply),
            serde_json::json!({"reader_connected": false, "transfer_active": false})
        );

        fx.volumes.attach(&fx.usb);
        let reply = api.handle(&HttpRequest::get("/status"));
        assert_eq!(json(&reply)["reader_connected"], true);
    }

    #[test]
    fn test_list_files() {
        let fx = Fixture::new();
        fs::write(fx.sd.join("b.txt"), "Title: Bee\nAuthor: A. Writer\n").unwrap();
        fs::write(fx.sd.join("a.pdf"), "%PDF").unwrap();
        fs::write(fx.sd.join("notes.doc"), "skip").unwrap();
        let api = fx.api(&fx.engine());

        let reply = api.handle(&HttpRequest::get("/list-files?type=sd"));
        assert_eq!(reply.status, 200);
        assert_eq!(
            json(&reply),
            serde_json::json!([
                {"name": "a.pdf"},
                {"name": "b.txt", "title": "Bee", "author": "A. Writer"},
            ])
        );
    }

    #[test]
    fn test_list_files_usb_detached_is_empty() {
        let fx = Fixture::new();
        let api = fx.api(&fx.engine());

        let reply = api.handle(&HttpRequest::get("/list-files?type=usb"));
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body_text(), "[]");
    }

    #[test]
    fn test_list_files_bad_type() {
        let fx = Fixture::new();
        let api = fx.api(&fx.engine());

        assert_eq!(api.handle(&HttpRequest::get("/list-files")).status, 400);
        assert_eq!(
            api.handle(&HttpRequest::get("/list-files?type=floppy")).status,
            400
        );
    }

    #[test]
    fn test_list_files_unreadable_root() {
        let fx = Fixture::new();
        fx.volumes.attach(fx.base.join("missing"));
        let api = fx.api(&fx.engine());

        assert_eq!(api.handle(&HttpRequest::get("/list-files?type=usb")).status, 500);
    }

    // ==================== Transfers ====================

    #[test]
    fn test_transfer_file_success() {
        let fx = Fixture::new();
        fs::write(fx.sd.join("book.epub"), vec![7u8; 10_000]).unwrap();
        fx.volumes.attach(&fx.usb);
        let api = fx.api(&fx.engine());

        let reply = api.handle(&HttpRequest::post(
            "/transfer-file",
            transfer_body("sd", "usb", "book.epub"),
        ));
        assert_eq!(reply.status, 200);
        let body = json(&reply);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "File transfer complete!");
        assert_eq!(fs::read(fx.usb.join("book.epub")).unwrap().len(), 10_000);

        // Slot released
        assert_eq!(api.handle(&HttpRequest::get("/transfer-progress")).status, 404);
    }

    #[test]
    fn test_transfer_file_refusals() {
        let fx = Fixture::new();
        let api = fx.api(&fx.engine());

        let reply = api.handle(&HttpRequest::post("/transfer-file", "{not json"));
        assert_eq!(reply.status, 400);

        let reply = api.handle(&HttpRequest::post(
            "/transfer-file",
            transfer_body("sd", "cloud", "book.epub"),
        ));
        assert_eq!(reply.status, 400);

        let reply = api.handle(&HttpRequest::post(
            "/transfer-file",
            transfer_body("sd", "usb", "book.epub"),
        ));
        assert_eq!(reply.status, 200);
        assert_eq!(json(&reply)["success"], false);
        assert_eq!(
            json(&reply)["message"],
            TransferError::DestinationUnavailable.to_string()
        );
    }

    #[test]
    fn test_busy_progress_and_cancel() {
        let fx = Fixture::new();
        fs::write(fx.sd.join("big.pdf"), vec![1u8; 64 * 1024]).unwrap();
        fs::write(fx.sd.join("other.pdf"), b"x").unwrap();
        fx.volumes.attach(&fx.usb);
        let engine = fx.engine().with_chunk_pause(Duration::from_millis(20));
        let api = Arc::new(fx.api(&engine));

        let worker = {
            let api = api.clone();
            thread::spawn(move || {
                api.handle(&HttpRequest::post(
                    "/transfer-file",
                    transfer_body("sd", "usb", "big.pdf"),
                ))
            })
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        while !engine.is_active() {
            assert!(Instant::now() < deadline, "transfer never started");
            thread::sleep(Duration::from_millis(2));
        }

        let progress = api.handle(&HttpRequest::get("/transfer-progress"));
        assert_eq!(progress.status, 200);
        assert_eq!(json(&progress)["filename"], "big.pdf");
        assert_eq!(json(&progress)["total_bytes"], 64 * 1024);

        let status = api.handle(&HttpRequest::get("/status"));
        assert_eq!(json(&status)["transfer_active"], true);

        let busy = api.handle(&HttpRequest::post(
            "/transfer-file",
            transfer_body("sd", "usb", "other.pdf"),
        ));
        assert_eq!(busy.status, 429);

        let cancel = api.handle(&HttpRequest::post("/transfer-cancel", ""));
        assert_eq!(json(&cancel)["success"], true);

        let finished = worker.join().unwrap();
        assert_eq!(json(&finished)["success"], false);
        assert_eq!(json(&finished)["message"], "File transfer cancelled.");
        assert!(!fx.usb.join("big.pdf").exists());
        assert!(!fx.usb.join("other.pdf").exists());
    }

    #[test]
    fn test_cancel_when_idle() {
        let fx = Fixture::new();
        let api = fx.api(&fx.engine());

        let reply = api.handle(&HttpRequest::post("/transfer-cancel", ""));
        assert_eq!(reply.status, 200);
        assert_eq!(json(&reply)["success"], false);
    }

    // ==================== Pages and methods ====================

    #[test]
    fn test_index_and_static_assets() {
        let fx = Fixture::new();
        fs::write(fx.www.join("style.css"), "body{}").unwrap();
        fs::write(fx.base.join("secret.txt"), "nope").unwrap();
        let api = fx.api(&fx.engine());

        let index = api.handle(&HttpRequest::get("/"));
        assert_eq!(index.status, 200);
        assert!(index.content_type.starts_with("text/html"));
        assert!(index.body_text().contains("/transfer-file"));

        let css = api.handle(&HttpRequest::get("/style.css"));
        assert_eq!(css.status, 200);
        assert_eq!(css.content_type, "text/css");

        assert_eq!(api.handle(&HttpRequest::get("/../secret.txt")).status, 404);
        assert_eq!(api.handle(&HttpRequest::get("/missing.js")).status, 404);
    }

    #[test]
    fn test_wrong_methods() {
        let fx = Fixture::new();
        let api = fx.api(&fx.engine());

        let reply = api.handle(&HttpRequest::get("/transfer-file"));
        assert_eq!(reply.status, 405);
        assert_eq!(reply.header("Allow"), Some("POST"));

        let reply = api.handle(&HttpRequest::post("/status", ""));
        assert_eq!(reply.status, 405);
        assert_eq!(reply.header("Allow"), Some("GET"));

        assert_eq!(api.handle(&HttpRequest::post("/elsewhere", "")).status, 405);
    }
}
