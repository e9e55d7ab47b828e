#![allow(dead_code)]

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::Rgb;
use qrcode::{Color, QrCode};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use qrfeed::api::{self, AppState};
use qrfeed::config::ServerOptions;
use qrfeed::{
    CameraController, CameraService, CameraSettings, CaptureBackend, Error, Frame, FrameSource,
    Resolution, Result, StreamSettings,
};

/// Backend that opens a fixed set of indices and serves one still frame
pub struct BenchBackend {
    name: &'static str,
    working: Arc<Mutex<HashSet<usize>>>,
    frame: Frame,
}

impl BenchBackend {
    pub fn new(name: &'static str, working: &[usize], frame: Frame) -> Self {
        Self {
            name,
            working: Arc::new(Mutex::new(working.iter().copied().collect())),
            frame,
        }
    }
}

struct StillSource {
    frame: Frame,
}

impl CaptureBackend for BenchBackend {
    fn name(&self) -> &str {
        self.name
    }

    fn open(&self, index: usize) -> Result<Box<dyn FrameSource>> {
        if self.working.lock().unwrap().contains(&index) {
            Ok(Box::new(StillSource {
                frame: self.frame.clone(),
            }))
        } else {
            Err(Error::Camera(format!("{} cannot open {index}", self.name)))
        }
    }
}

impl FrameSource for StillSource {
    fn read(&mut self) -> Result<Frame> {
        std::thread::sleep(Duration::from_millis(5));
        Ok(self.frame.clone())
    }

    fn set_resolution(&mut self, _resolution: Resolution) -> Result<Resolution> {
        Ok(self.resolution())
    }

    fn resolution(&self) -> Resolution {
        Resolution::new(self.frame.width(), self.frame.height())
    }
}

/// Backend whose device opens but never delivers a frame: each read waits
/// `stall`, then fails the way a driver read timeout does
pub struct StallingBackend {
    stall: Duration,
}

impl StallingBackend {
    pub fn new(stall: Duration) -> Self {
        Self { stall }
    }
}

struct StallingSource {
    stall: Duration,
}

impl CaptureBackend for StallingBackend {
    fn name(&self) -> &str {
        "stalling"
    }

    fn open(&self, _index: usize) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(StallingSource { stall: self.stall }))
    }
}

impl FrameSource for StallingSource {
    fn read(&mut self) -> Result<Frame> {
        std::thread::sleep(self.stall);
        Err(Error::FrameCapture(format!(
            "No frame within {} ms",
            self.stall.as_millis()
        )))
    }

    fn set_resolution(&mut self, resolution: Resolution) -> Result<Resolution> {
        Ok(resolution)
    }

    fn resolution(&self) -> Resolution {
        Resolution::new(64, 48)
    }
}

/// Grey frame with nothing to decode
pub fn blank_frame() -> Frame {
    Frame::from_pixel(64, 48, Rgb([128, 128, 128]))
}

/// White frame with `payload` rendered as a QR code, 4 px per module
pub fn qr_frame(payload: &str) -> Frame {
    let code = QrCode::new(payload.as_bytes()).expect("encode QR");
    let modules = code.width() as u32;
    let colors = code.to_colors();
    let scale = 4;
    let margin = 40;
    let side = modules * scale + margin * 2;

    let mut frame = Frame::from_pixel(side, side, Rgb([255, 255, 255]));
    for my in 0..modules {
        for mx in 0..modules {
            if colors[(my * modules + mx) as usize] == Color::Dark {
                for dy in 0..scale {
                    for dx in 0..scale {
                        frame.put_pixel(margin + mx * scale + dx, margin + my * scale + dy, Rgb([0, 0, 0]));
                    }
                }
            }
        }
    }
    frame
}

pub struct TestApp {
    pub addr: SocketAddr,
    pub service: Arc<CameraService>,
}

/// Serve the real router on an ephemeral port
pub async fn spawn_app(backends: Vec<BenchBackend>) -> TestApp {
    let backends = backends
        .into_iter()
        .map(|b| Arc::new(b) as Arc<dyn CaptureBackend>)
        .collect();
    spawn_with(backends).await
}

/// Serve the real router over an arbitrary backend chain
pub async fn spawn_with(backends: Vec<Arc<dyn CaptureBackend>>) -> TestApp {
    let controller = CameraController::new(backends, CameraSettings::default());
    let stream = StreamSettings {
        placeholder_size: Resolution::new(160, 120),
        ..StreamSettings::default()
    };
    let service = Arc::new(CameraService::new(controller, stream));

    let app = api::router(AppState::new(Arc::clone(&service)), &ServerOptions::default());
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });

    TestApp { addr, service }
}

pub struct RawResponse {
    pub status: u16,
    pub head: String,
    pub body: String,
}

impl RawResponse {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or_else(|e| panic!("invalid JSON {:?}: {e}", self.body))
    }

    pub fn header(&self, name: &str) -> Option<String> {
        let prefix = format!("{}:", name.to_ascii_lowercase());
        self.head
            .lines()
            .find(|line| line.to_ascii_lowercase().starts_with(&prefix))
            .map(|line| line[prefix.len()..].trim().to_string())
    }
}

/// One HTTP/1.1 request with `Connection: close`, read to the end
pub async fn send(addr: SocketAddr, method: &str, path: &str, body: Option<&str>) -> RawResponse {
    send_with_headers(addr, method, path, body, &[]).await
}

pub async fn send_with_headers(
    addr: SocketAddr,
    method: &str,
    path: &str,
    body: Option<&str>,
    headers: &[(&str, &str)],
) -> RawResponse {
    let mut request = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n");
    for (name, value) in headers {
        request.push_str(&format!("{name}: {value}\r\n"));
    }
    match body {
        Some(body) => request.push_str(&format!(
            "Content-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        )),
        None => request.push_str("Content-Length: 0\r\n\r\n"),
    }

    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream.write_all(request.as_bytes()).await.expect("write request");

    let mut buf = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), stream.read_to_end(&mut buf))
        .await
        .expect("response timed out")
        .expect("read response");

    parse_response(&buf)
}

pub fn parse_response(buf: &[u8]) -> RawResponse {
    let text = String::from_utf8_lossy(buf);
    let (head, body) = text.split_once("\r\n\r\n").expect("invalid HTTP response format");
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .expect("status code");
    RawResponse {
        status,
        head: head.to_string(),
        body: body.to_string(),
    }
}
