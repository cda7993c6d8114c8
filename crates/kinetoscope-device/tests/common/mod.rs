// crates/kinetoscope-device/tests/common/mod.rs
//
// A byte-addressable in-memory "file" served over plain HTTP by a
// background thread, so the end-to-end scenarios in spec.md §8 can be
// exercised against kinetoscope-device's public dispatch entry point
// without a real media server.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

pub struct FakeServer {
    pub port: u16,
}

impl FakeServer {
    pub fn start(files: Vec<(&'static str, Vec<u8>)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let files = files.clone();
                thread::spawn(move || serve_one(&mut stream, &files));
            }
        });
        thread::sleep(std::time::Duration::from_millis(20));
        Self { port }
    }
}

// The client defaults to `Connection: keep-alive` and may reuse this same
// TcpStream for several requests in a row, so this keeps serving requests
// on it until the client closes the connection or a read fails.
fn serve_one(stream: &mut TcpStream, files: &[(&'static str, Vec<u8>)]) {
    while serve_request(stream, files) {}
}

fn serve_request(stream: &mut TcpStream, files: &[(&'static str, Vec<u8>)]) -> bool {
    let mut buf = [0u8; 4096];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return false,
        Ok(n) => n,
    };
    let request = String::from_utf8_lossy(&buf[..n]);
    let mut lines = request.split("\r\n");
    let request_line = lines.next().unwrap_or("");
    let mut parts = request_line.split_whitespace();
    let _method = parts.next();
    let path = parts.next().unwrap_or("/").trim_start_matches('/').to_string();

    // A small artificial delay makes the worker's fetch_busy window wide
    // enough for tests to deterministically observe it, mirroring real
    // network latency rather than the near-zero latency of loopback.
    thread::sleep(std::time::Duration::from_millis(25));

    let mut range: Option<(usize, usize)> = None;
    for line in lines {
        if let Some(value) = line.strip_prefix("Range: bytes=") {
            if let Some((a, b)) = value.split_once('-') {
                range = Some((a.parse().unwrap(), b.parse().unwrap()));
            }
        }
    }

    let Some((_, data)) = files.iter().find(|(name, _)| *name == path) else {
        let resp = b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n";
        let _ = stream.write_all(resp);
        return true;
    };

    let (status_line, body): (&str, &[u8]) = match range {
        Some((first, last)) => {
            let last = last.min(data.len() - 1);
            ("HTTP/1.1 206 Partial Content", &data[first..=last])
        }
        None => ("HTTP/1.1 200 OK", &data[..]),
    };
    let header = format!("{status_line}\r\nContent-Length: {}\r\n\r\n", body.len());
    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(body);
    true
}

pub fn sample_header(
    relative_url: &str,
    title: &str,
    total_chunks: u32,
    chunk_size: u32,
    compression: u16,
) -> kinetoscope_core::header::VideoHeader {
    use kinetoscope_core::header::{CURRENT_FORMAT_VERSION, HEADER_SIZE, TITLE_OFFSET};
    kinetoscope_core::header::VideoHeader {
        format_version: CURRENT_FORMAT_VERSION,
        frame_rate: 30,
        audio_sample_rate: 32000,
        total_frames: 100,
        total_audio_samples: 100_000,
        chunk_size,
        total_chunk_count: total_chunks,
        title: title.to_string(),
        relative_url: relative_url.to_string(),
        compression,
        thumbnail: vec![0; HEADER_SIZE - TITLE_OFFSET - 128 - 128 - 2],
    }
}
