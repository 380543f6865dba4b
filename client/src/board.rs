use anyhow::{bail, Result};
use async_trait::async_trait;
use dockloc_pilot::service::FrameSource;
use opencv::{core, imgcodecs, prelude::*};
use std::time::Duration;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);
/// Larger than any snapshot the board serves
const MAX_RESPONSE_LEN: u64 = 8 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Quality {
    Lo,
    Mid,
    Hi,
}

impl Quality {
    pub fn path(self) -> &'static str {
        match self {
            Self::Lo => "/cam-lo.jpg",
            Self::Mid => "/cam-mid.jpg",
            Self::Hi => "/cam-hi.jpg",
        }
    }

    pub fn resolution(self) -> (u32, u32) {
        match self {
            Self::Lo => (320, 240),
            Self::Mid => (640, 480),
            Self::Hi => (1280, 720),
        }
    }
}

/// Camera board serving JPEG snapshots and a light switch over HTTP.
pub struct CameraBoard {
    host: String,
    quality: Quality,
}

impl CameraBoard {
    pub const LIGHT_PATH: &'static str = "/led";

    pub fn new(host: impl Into<String>, quality: Quality) -> Self {
        Self {
            host: host.into(),
            quality,
        }
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        match timeout(REQUEST_TIMEOUT, http_get(&self.host, path)).await {
            Ok(r) => r,
            Err(_) => bail!("GET {path} timed out"),
        }
    }
}

/// Bare HTTP/1.0 GET, returns the body of a `200` response.
async fn http_get(host: &str, path: &str) -> Result<Vec<u8>> {
    let address = if host.contains(':') {
        host.to_owned()
    } else {
        format!("{host}:80")
    };

    let mut s = TcpStream::connect(address).await?;
    s.write_all(format!("GET {path} HTTP/1.0\r\nHost: {host}\r\nConnection: close\r\n\r\n").as_bytes())
        .await?;

    let mut response = vec![];
    s.take(MAX_RESPONSE_LEN + 1).read_to_end(&mut response).await?;
    if response.len() as u64 > MAX_RESPONSE_LEN {
        bail!("GET {path}: response over {MAX_RESPONSE_LEN} bytes");
    }

    response_body(response).map_err(|e| e.context(format!("GET {path}")))
}

fn response_body(mut response: Vec<u8>) -> Result<Vec<u8>> {
    let Some(header_end) = response.windows(4).position(|w| w == b"\r\n\r\n") else {
        bail!("malformed response");
    };

    let head = String::from_utf8_lossy(&response[..header_end]).into_owned();
    let mut lines = head.lines();

    let status = lines.next().unwrap_or_default();
    if status.split_whitespace().nth(1) != Some("200") {
        bail!("{status}");
    }

    let content_length = lines
        .filter_map(|l| l.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .map(|(_, v)| v.trim().parse::<usize>())
        .transpose()?;

    let body = response.split_off(header_end + 4);
    if let Some(expected) = content_length {
        if body.len() != expected {
            bail!("body is {} bytes, expected {expected}", body.len());
        }
    }

    Ok(body)
}

#[async_trait]
impl FrameSource for CameraBoard {
    type Frame = Mat;

    async fn next_frame(&mut self) -> Result<Option<Mat>> {
        let body = self.get(self.quality.path()).await?;

        let image = imgcodecs::imdecode(&core::Vector::<u8>::from_slice(&body), imgcodecs::IMREAD_COLOR)?;
        if image.cols() < 1 {
            bail!("Couldn't decode frame ({} bytes)", body.len());
        }

        let (w, h) = self.quality.resolution();
        if (image.cols(), image.rows()) != (w as i32, h as i32) {
            log::warn!(
                "Frame is {}x{}, expected {w}x{h}",
                image.cols(),
                image.rows()
            );
        }

        Ok(Some(image))
    }

    async fn set_light(&mut self, on: bool) -> Result<()> {
        if on {
            self.get(Self::LIGHT_PATH).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn body_must_match_content_length() {
        let ok = b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nJPEG".to_vec();
        assert_eq!(response_body(ok).unwrap(), b"JPEG");

        let truncated = b"HTTP/1.1 200 OK\r\ncontent-length: 10\r\n\r\nJPEG".to_vec();
        assert!(response_body(truncated).is_err());

        let no_length = b"HTTP/1.0 200 OK\r\n\r\nJPEG".to_vec();
        assert_eq!(response_body(no_length).unwrap(), b"JPEG");

        let missing = b"HTTP/1.0 404 Not Found\r\n\r\n".to_vec();
        assert!(response_body(missing).is_err());
    }

    #[tokio::test]
    async fn oversized_response_is_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let host = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut s, _) = listener.accept().await.unwrap();
            let mut request = [0; 256];
            let _ = s.read(&mut request).await;

            let _ = s.write_all(b"HTTP/1.0 200 OK\r\n\r\n").await;
            let chunk = vec![0u8; 1 << 20];
            for _ in 0..9 {
                if s.write_all(&chunk).await.is_err() {
                    break;
                }
            }
        });

        let err = http_get(&host, "/cam-hi.jpg").await.unwrap_err();
        assert!(err.to_string().contains("bytes"), "{err}");
    }
}
