//! Unix-socket control protocol.
//!
//! Newline-delimited JSON, one request and one response per line. Requests
//! are a closed command set — an unknown `cmd` fails JSON decoding on the
//! daemon side, so there is no stringly-typed dispatch anywhere.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use swarmkeeper_core::ContainerId;

use crate::cache::Readiness;
use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;

/// Attempts to reach a socket that exists but does not answer yet (daemon
/// restarting, socket recreated).
const CONNECT_ATTEMPTS: u32 = 5;
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Commands the daemon accepts over its socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum DaemonRequest {
    /// Full runtime status: overlay daemon state, environments, last tick.
    Status,
    /// Per-container launch readiness for one environment, by name.
    Readiness { environment: String },
    /// Graceful shutdown.
    Stop,
}

/// One response per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DaemonResponse {
    Ok {
        #[serde(default)]
        data: Value,
    },
    Err {
        message: String,
    },
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self::Ok { data }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Err {
            message: message.into(),
        }
    }

    /// Unwrap the payload, turning a daemon-side failure into
    /// [`DaemonError::Protocol`].
    pub fn into_data(self) -> Result<Value, DaemonError> {
        match self {
            Self::Ok { data } => Ok(data),
            Self::Err { message } => Err(DaemonError::Protocol(message)),
        }
    }
}

/// Payload of a [`DaemonRequest::Readiness`] response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessReport {
    pub environment: String,
    pub hash: String,
    pub joined: bool,
    pub containers: Vec<ContainerReadiness>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerReadiness {
    pub id: ContainerId,
    pub name: String,
    pub readiness: Readiness,
}

/// Send one request to the daemon socket and return its response.
pub fn send_request(home: &Path, request: &DaemonRequest) -> Result<DaemonResponse, DaemonError> {
    let socket = socket_path(home);
    if !socket.exists() {
        return Err(DaemonError::DaemonNotRunning { socket });
    }

    let mut stream = UnixStream::connect(&socket).map_err(|err| connect_error(&socket, err))?;

    let mut payload = serde_json::to_vec(request)?;
    payload.push(b'\n');
    stream.write_all(&payload).map_err(|e| io_err(&socket, e))?;
    stream.flush().map_err(|e| io_err(&socket, e))?;

    let mut line = String::new();
    let read = BufReader::new(stream)
        .read_line(&mut line)
        .map_err(|e| io_err(&socket, e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "daemon closed connection before responding".to_string(),
        ));
    }

    Ok(serde_json::from_str(line.trim_end())?)
}

pub fn request_status(home: &Path) -> Result<Value, DaemonError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match send_request(home, &DaemonRequest::Status) {
            Ok(response) => return response.into_data(),
            Err(err @ DaemonError::DaemonNotRunning { .. }) => {
                if attempt == CONNECT_ATTEMPTS {
                    return Err(err);
                }
                sleep(CONNECT_RETRY_DELAY);
            }
            Err(err) => return Err(err),
        }
    }
}

pub fn request_readiness(home: &Path, environment: String) -> Result<ReadinessReport, DaemonError> {
    let data = send_request(home, &DaemonRequest::Readiness { environment })?.into_data()?;
    Ok(serde_json::from_value(data)?)
}

pub fn request_stop(home: &Path) -> Result<(), DaemonError> {
    send_request(home, &DaemonRequest::Stop)?
        .into_data()
        .map(|_| ())
}

fn connect_error(socket: &Path, err: std::io::Error) -> DaemonError {
    if matches!(
        err.kind(),
        std::io::ErrorKind::NotFound
            | std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
    ) {
        DaemonError::DaemonNotRunning {
            socket: socket.to_path_buf(),
        }
    } else {
        io_err(socket, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn requests_use_a_cmd_tag_on_the_wire() {
        assert_eq!(
            serde_json::to_value(DaemonRequest::Status).expect("encode"),
            json!({"cmd": "status"})
        );
        assert_eq!(
            serde_json::to_value(DaemonRequest::Readiness {
                environment: "staging".to_string(),
            })
            .expect("encode"),
            json!({"cmd": "readiness", "environment": "staging"})
        );
    }

    #[test]
    fn unknown_command_fails_to_decode() {
        let result: Result<DaemonRequest, _> = serde_json::from_str(r#"{"cmd":"reboot"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn into_data_maps_failure_to_protocol_error() {
        let data = DaemonResponse::ok(json!({"running": true}))
            .into_data()
            .expect("ok payload");
        assert_eq!(data["running"], json!(true));

        let err = DaemonResponse::error("swarm gone").into_data().unwrap_err();
        assert!(matches!(err, DaemonError::Protocol(m) if m == "swarm gone"));
    }

    #[test]
    fn readiness_report_roundtrips() {
        let report = ReadinessReport {
            environment: "staging".to_string(),
            hash: "h1".to_string(),
            joined: true,
            containers: vec![ContainerReadiness {
                id: ContainerId::from("c1"),
                name: "web".to_string(),
                readiness: Readiness::ContainerNotReachable,
            }],
        };
        let value = serde_json::to_value(&report).expect("encode");
        assert_eq!(value["containers"][0]["readiness"], json!("container_not_reachable"));
        let back: ReadinessReport = serde_json::from_value(value).expect("decode");
        assert_eq!(back.containers[0].id, ContainerId::from("c1"));
        assert_eq!(back.containers[0].readiness, Readiness::ContainerNotReachable);
    }
}
