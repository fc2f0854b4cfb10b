// Shared fixtures for the integration tests: a minimal HTTP server built
// on std::net::TcpListener (enough for the blocking client to talk to),
// and helpers to build archives and trees.
//
// Each test binary includes this module and uses a different subset of it.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

#[derive(Clone)]
pub struct Route {
    pub body: Vec<u8>,
    /// Advertise and honor `Range: bytes=N-` requests.
    pub ranges: bool,
    /// Artificial delay before the body, to widen race windows.
    pub delay: Duration,
}

/// A tiny HTTP/1.1 fixture server. Routes are exact paths; GET and HEAD
/// are supported, everything else is a 404. GET hits and received Range
/// headers are recorded for assertions.
pub struct TestServer {
    port: u16,
    routes: Arc<Mutex<HashMap<String, Route>>>,
    get_hits: Arc<Mutex<HashMap<String, usize>>>,
    range_headers: Arc<Mutex<Vec<String>>>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    pub fn start() -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fixture server");
        let port = listener.local_addr().unwrap().port();
        let routes: Arc<Mutex<HashMap<String, Route>>> = Arc::default();
        let get_hits: Arc<Mutex<HashMap<String, usize>>> = Arc::default();
        let range_headers: Arc<Mutex<Vec<String>>> = Arc::default();
        let shutdown = Arc::new(AtomicBool::new(false));

        let handle = {
            let routes = Arc::clone(&routes);
            let get_hits = Arc::clone(&get_hits);
            let range_headers = Arc::clone(&range_headers);
            let shutdown = Arc::clone(&shutdown);
            std::thread::spawn(move || {
                for stream in listener.incoming() {
                    if shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                    let Ok(stream) = stream else { continue };
                    let routes = Arc::clone(&routes);
                    let get_hits = Arc::clone(&get_hits);
                    let range_headers = Arc::clone(&range_headers);
                    std::thread::spawn(move || {
                        let _ = serve_one(stream, &routes, &get_hits, &range_headers);
                    });
                }
            })
        };

        TestServer {
            port,
            routes,
            get_hits,
            range_headers,
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    pub fn route(&self, path: &str, body: Vec<u8>) {
        self.routes.lock().unwrap().insert(
            path.to_string(),
            Route {
                body,
                ranges: false,
                delay: Duration::ZERO,
            },
        );
    }

    pub fn route_full(&self, path: &str, route: Route) {
        self.routes.lock().unwrap().insert(path.to_string(), route);
    }

    /// How many GET requests hit a path (HEAD probes are not counted).
    pub fn get_hits(&self, path: &str) -> usize {
        *self.get_hits.lock().unwrap().get(path).unwrap_or(&0)
    }

    /// Every `Range` header value any request carried, in arrival order.
    pub fn range_headers(&self) -> Vec<String> {
        self.range_headers.lock().unwrap().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        // Nudge the accept loop awake so it observes the flag.
        let _ = TcpStream::connect(("127.0.0.1", self.port));
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn serve_one(
    stream: TcpStream,
    routes: &Mutex<HashMap<String, Route>>,
    get_hits: &Mutex<HashMap<String, usize>>,
    range_headers: &Mutex<Vec<String>>,
) -> std::io::Result<()> {
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    let mut reader = BufReader::new(stream.try_clone()?);

    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let path = parts.next().unwrap_or("").to_string();

    let mut range: Option<(u64, Option<u64>)> = None;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line)?;
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some(value) = line.strip_prefix("Range:").map(str::trim) {
            range_headers.lock().unwrap().push(value.to_string());
            if let Some(spec) = value.strip_prefix("bytes=") {
                let mut bounds = spec.splitn(2, '-');
                let start = bounds.next().and_then(|s| s.parse().ok()).unwrap_or(0);
                let end = bounds.next().and_then(|s| s.parse().ok());
                range = Some((start, end));
            }
        }
    }

    let route = routes.lock().unwrap().get(&path).cloned();
    let mut out = stream;
    let Some(route) = route else {
        let body = b"not found";
        write!(
            out,
            "HTTP/1.1 404 Not Found\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )?;
        if method != "HEAD" {
            out.write_all(body)?;
        }
        return out.flush();
    };

    if method == "GET" {
        *get_hits.lock().unwrap().entry(path.clone()).or_insert(0) += 1;
    }

    let total = route.body.len() as u64;
    let ranged = route.ranges && range.is_some() && method == "GET";
    let (status, start) = if ranged {
        (206, range.unwrap().0.min(total))
    } else {
        (200, 0)
    };
    let slice = &route.body[start as usize..];

    let mut headers = format!(
        "HTTP/1.1 {status} {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        if status == 206 { "Partial Content" } else { "OK" },
        slice.len()
    );
    if route.ranges {
        headers.push_str("Accept-Ranges: bytes\r\n");
    }
    if ranged {
        headers.push_str(&format!(
            "Content-Range: bytes {start}-{}/{total}\r\n",
            total.saturating_sub(1)
        ));
    }
    headers.push_str("\r\n");
    out.write_all(headers.as_bytes())?;

    if method != "HEAD" {
        if !route.delay.is_zero() {
            std::thread::sleep(route.delay);
        }
        out.write_all(slice)?;
    }
    out.flush()
}

/// Builds a gzipped tarball from (path, contents, mode) entries.
pub fn build_tar_gz(entries: &[(&str, &[u8], u32)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(flate2::write::GzEncoder::new(
        Vec::new(),
        flate2::Compression::default(),
    ));
    for (name, data, mode) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(*mode);
        header.set_cksum();
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}
