//! In-process stand-in for the remote blob store, used by tests.
//!
//! Serves the resolve endpoint and the file endpoint (with `Range` support)
//! on an ephemeral local port, and records what it was asked.

use std::{
    collections::{HashMap, HashSet},
    io::{self, Read},
    net::{SocketAddr, TcpListener},
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, AtomicUsize, Ordering},
        mpsc::Sender,
    },
    thread::JoinHandle,
};

use rouille::{Request, Response, ResponseBody};
use serde_json::json;

use crate::{config::UpstreamConfig, remote::client::RemoteBlobClient, remote::error::RemoteError};

pub const TOKEN: &str = "42:test-token";

#[derive(Default)]
struct MockState {
    files: Mutex<HashMap<String, Vec<u8>>>,
    endless: Mutex<HashSet<String>>,
    streamed_bytes: Arc<AtomicU64>,
    resolve_hits: AtomicUsize,
    fetch_hits: AtomicUsize,
    ranges: Mutex<Vec<Option<String>>>,
}

pub struct MockUpstream {
    addr: SocketAddr,
    state: Arc<MockState>,
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockUpstream {
    pub fn start() -> Self {
        let state = Arc::new(MockState::default());
        let handler_state = Arc::clone(&state);

        let server = rouille::Server::new("127.0.0.1:0", move |request| {
            handler_state.handle(request)
        })
        .expect("mock upstream failed to bind");

        let addr = server.server_addr();
        let (handle, stop) = server.stoppable();

        Self {
            addr,
            state,
            stop: Some(stop),
            handle: Some(handle),
        }
    }

    pub fn with_file(self, blob_id: &str, data: Vec<u8>) -> Self {
        self.state
            .files
            .lock()
            .unwrap()
            .insert(blob_id.to_string(), data);
        self
    }

    /// Registers a blob whose body never ends, like a live feed
    pub fn with_endless_file(self, blob_id: &str) -> Self {
        self.state
            .endless
            .lock()
            .unwrap()
            .insert(blob_id.to_string());
        self
    }

    pub fn config(&self) -> UpstreamConfig {
        UpstreamConfig {
            api_base: format!("http://{}", self.addr),
            token: TOKEN.to_string(),
            connect_timeout_secs: 2,
            request_timeout_secs: 5,
        }
    }

    pub fn client(&self) -> Result<RemoteBlobClient, RemoteError> {
        RemoteBlobClient::new(&self.config())
    }

    pub fn resolve_hits(&self) -> usize {
        self.state.resolve_hits.load(Ordering::SeqCst)
    }

    pub fn fetch_hits(&self) -> usize {
        self.state.fetch_hits.load(Ordering::SeqCst)
    }

    pub fn total_hits(&self) -> usize {
        self.resolve_hits() + self.fetch_hits()
    }

    /// Bytes handed to the network so far by endless bodies
    pub fn streamed_bytes(&self) -> u64 {
        self.state.streamed_bytes.load(Ordering::SeqCst)
    }

    /// `Range` header of every file request, in arrival order
    pub fn received_ranges(&self) -> Vec<Option<String>> {
        self.state.ranges.lock().unwrap().clone()
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Config pointing at a local port nobody listens on
pub fn unreachable_config() -> UpstreamConfig {
    let port = TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .map(|a| a.port())
        .expect("could not reserve a port");

    UpstreamConfig {
        api_base: format!("http://127.0.0.1:{port}"),
        token: TOKEN.to_string(),
        connect_timeout_secs: 1,
        request_timeout_secs: 2,
    }
}

impl MockState {
    fn handle(&self, request: &Request) -> Response {
        let url = request.url();

        if url == format!("/bot{TOKEN}/getFile") {
            self.resolve_hits.fetch_add(1, Ordering::SeqCst);
            return self.resolve(request);
        }

        let file_prefix = format!("/file/bot{TOKEN}/music/");
        if let Some(blob_id) = url
            .strip_prefix(&file_prefix)
            .and_then(|rest| rest.strip_suffix(".mp3"))
        {
            self.fetch_hits.fetch_add(1, Ordering::SeqCst);
            let range = request.header("Range").map(str::to_string);
            self.ranges.lock().unwrap().push(range.clone());

            if self.endless.lock().unwrap().contains(blob_id) {
                return serve_endless(Arc::clone(&self.streamed_bytes));
            }

            let data = self.files.lock().unwrap().get(blob_id).cloned();
            return match data {
                Some(data) => serve(&data, range.as_deref()),
                None => Response::empty_404(),
            };
        }

        Response::empty_404()
    }

    fn resolve(&self, request: &Request) -> Response {
        let file_id = request.get_param("file_id").unwrap_or_default();

        let known = self.files.lock().unwrap().contains_key(&file_id)
            || self.endless.lock().unwrap().contains(&file_id);

        if known {
            Response::json(&json!({
                "ok": true,
                "result": {
                    "file_id": file_id,
                    "file_path": format!("music/{file_id}.mp3"),
                }
            }))
        } else {
            Response::json(&json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: invalid file_id",
            }))
            .with_status_code(400)
        }
    }
}

fn serve(data: &[u8], range: Option<&str>) -> Response {
    let Some(range) = range else {
        return Response::from_data("audio/mpeg", data.to_vec())
            .with_additional_header("Accept-Ranges", "bytes");
    };

    match parse_range(range, data.len()) {
        Some((start, end)) => Response::from_data("audio/mpeg", data[start..=end].to_vec())
            .with_status_code(206)
            .with_additional_header("Accept-Ranges", "bytes")
            .with_additional_header(
                "Content-Range",
                format!("bytes {start}-{end}/{}", data.len()),
            ),
        None => Response::empty_404()
            .with_status_code(416)
            .with_additional_header("Content-Range", format!("bytes */{}", data.len())),
    }
}

struct EndlessBody {
    sent: Arc<AtomicU64>,
}

impl Read for EndlessBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        buf.fill(0x55);
        self.sent.fetch_add(buf.len() as u64, Ordering::SeqCst);
        Ok(buf.len())
    }
}

/// Chunked 200 with no length, written until the reader goes away
fn serve_endless(sent: Arc<AtomicU64>) -> Response {
    Response {
        status_code: 200,
        headers: vec![("Content-Type".into(), "audio/mpeg".into())],
        data: ResponseBody::from_reader(EndlessBody { sent }),
        upgrade: None,
    }
}

/// `bytes=a-b` or `bytes=a-`, clamped to the resource
fn parse_range(range: &str, len: usize) -> Option<(usize, usize)> {
    let (start, end) = range.strip_prefix("bytes=")?.split_once('-')?;
    let start: usize = start.trim().parse().ok()?;
    let end: usize = match end.trim() {
        "" => len.checked_sub(1)?,
        end => end.parse::<usize>().ok()?.min(len.checked_sub(1)?),
    };
    (start <= end).then_some((start, end))
}
