use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, VmmError};

/// Instance state as reported by `GET /`.
///
/// Only `Running` counts as ready; everything else, `Starting` included,
/// is treated as not-yet-ready by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum InstanceState {
    Uninitialized,
    Starting,
    Running,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstanceInfo {
    pub state: InstanceState,
}

#[derive(Debug, Serialize)]
struct PartialDrive<'a> {
    drive_id: &'a str,
    path_on_host: &'a str,
}

/// HTTP/1.1 client for the VMM control API over its UNIX socket.
///
/// The VMM speaks plain HTTP/1.1 on an AF_UNIX socket; requests are small
/// and responses fit in memory, so the transport is a blocking stream
/// driven from `spawn_blocking`. There is no retry at this layer; callers
/// wrap their own polls.
pub struct FirecrackerClient {
    socket_path: PathBuf,
}

impl FirecrackerClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// `GET /`: describe the VMM instance.
    pub async fn describe_instance(&self) -> Result<InstanceInfo> {
        let (status, body) = self.send_request("GET", "/", None).await?;
        if status >= 300 {
            return Err(VmmError::Api(format!(
                "GET / returned {}: {}",
                status, body
            )));
        }

        serde_json::from_str(&body)
            .map_err(|err| VmmError::Api(format!("decoding instance info failed: {}", err)))
    }

    /// `PATCH /drives/{id}`: repoint a guest drive's backing file. The
    /// path is the only property the VMM allows changing after boot.
    pub async fn patch_guest_drive(&self, drive_id: &str, path_on_host: &Path) -> Result<()> {
        let path = path_on_host.to_string_lossy();
        let body = serde_json::to_string(&PartialDrive {
            drive_id,
            path_on_host: &path,
        })?;

        debug!(drive_id, path_on_host = %path, "patching guest drive");

        let (status, resp_body) = self
            .send_request("PATCH", &format!("/drives/{}", drive_id), Some(&body))
            .await?;
        if status >= 300 {
            return Err(VmmError::Api(format!(
                "PATCH /drives/{} returned {}: {}",
                drive_id, status, resp_body
            )));
        }

        Ok(())
    }

    async fn send_request(
        &self,
        method: &str,
        path: &str,
        body: Option<&str>,
    ) -> Result<(u16, String)> {
        let socket_path = self.socket_path.clone();
        let method = method.to_string();
        let path = path.to_string();
        let body = body.map(|s| s.to_string());

        tokio::task::spawn_blocking(move || {
            let mut stream = UnixStream::connect(&socket_path).map_err(|err| {
                VmmError::Api(format!(
                    "connecting to {} failed: {}",
                    socket_path.display(),
                    err
                ))
            })?;

            let body = body.unwrap_or_default();
            let request = if body.is_empty() {
                format!(
                    "{} {} HTTP/1.1\r\nHost: localhost\r\nAccept: application/json\r\n\r\n",
                    method, path
                )
            } else {
                format!(
                    "{} {} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nAccept: application/json\r\n\r\n{}",
                    method, path, body.len(), body
                )
            };

            stream
                .write_all(request.as_bytes())
                .map_err(|err| VmmError::Api(format!("writing request failed: {}", err)))?;

            stream
                .set_read_timeout(Some(Duration::from_secs(10)))
                .ok();

            let mut response = String::new();
            let mut buf = [0u8; 4096];
            loop {
                match stream.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        response.push_str(&String::from_utf8_lossy(&buf[..n]));
                        if let Some(header_end) = response.find("\r\n\r\n") {
                            let headers = &response[..header_end];
                            match parse_content_length(headers) {
                                Some(expected) => {
                                    if response[header_end + 4..].len() >= expected {
                                        break;
                                    }
                                }
                                // No content-length; the VMM's responses are
                                // small enough that this read had it all.
                                None => break,
                            }
                        }
                    }
                    Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                    Err(err) => {
                        return Err(VmmError::Api(format!("reading response failed: {}", err)));
                    }
                }
            }

            let status = parse_status_code(&response)?;
            let body = response
                .find("\r\n\r\n")
                .map(|i| response[i + 4..].to_string())
                .unwrap_or_default();

            Ok((status, body))
        })
        .await
        .map_err(|err| VmmError::Api(format!("api task failed: {}", err)))?
    }
}

fn parse_status_code(response: &str) -> Result<u16> {
    // "HTTP/1.1 204 No Content" and friends.
    let first_line = response.lines().next().unwrap_or("");
    let mut parts = first_line.split_whitespace();
    let _proto = parts.next();
    parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| VmmError::Api(format!("invalid http response line: {:?}", first_line)))
}

fn parse_content_length(headers: &str) -> Option<usize> {
    for line in headers.lines() {
        let lower = line.to_ascii_lowercase();
        if let Some(value) = lower.strip_prefix("content-length:") {
            return value.trim().parse().ok();
        }
    }
    None
}
