//! Real health-check protocols.

use super::HealthProbe;
use crate::model::Protocol;
use crate::runtime::run_shell;
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;

/// Upper bound on command checks; the prober's per-attempt timeout is usually tighter.
const COMMAND_CHECK_TIMEOUT: Duration = Duration::from_secs(60);

/// Speaks TCP, HTTP and shell commands.
#[derive(Debug, Clone, Default)]
pub struct NetworkProbe {
    http: reqwest::Client,
}

impl NetworkProbe {
    pub fn new() -> Self {
        Self::default()
    }

    async fn tcp(address: &str) -> Result<(), String> {
        TcpStream::connect(address)
            .await
            .map(drop)
            .map_err(|err| format!("connect {address}: {err}"))
    }

    async fn http(&self, url: &str, expect_status: Option<u16>) -> Result<(), String> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| format!("GET {url}: {err}"))?;

        let status = response.status();
        let healthy = match expect_status {
            Some(expected) => status.as_u16() == expected,
            None => status.is_success(),
        };
        if healthy {
            Ok(())
        } else {
            Err(format!("GET {url} answered {status}"))
        }
    }

    async fn command(command: &str) -> Result<(), String> {
        let output = run_shell(command, COMMAND_CHECK_TIMEOUT)
            .await
            .map_err(|err| err.to_string())?;
        if output.success {
            Ok(())
        } else {
            Err(output.describe_failure())
        }
    }
}

#[async_trait]
impl HealthProbe for NetworkProbe {
    async fn check(&self, _service: &str, protocol: &Protocol) -> Result<(), String> {
        match protocol {
            Protocol::Tcp { address } => Self::tcp(address).await,
            Protocol::Http { url, expect_status } => self.http(url, *expect_status).await,
            Protocol::Command { command } => Self::command(command).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn http_server(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buffer = [0u8; 1024];
                let _ = socket.read(&mut buffer).await;
                let response =
                    format!("HTTP/1.1 {status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{address}/health")
    }

    #[tokio::test]
    async fn tcp_check_follows_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let probe = NetworkProbe::new();

        let tcp = Protocol::Tcp {
            address: address.clone(),
        };
        assert!(probe.check("postgres", &tcp).await.is_ok());

        drop(listener);
        let err = probe.check("postgres", &tcp).await.unwrap_err();
        assert!(err.starts_with(&format!("connect {address}")));
    }

    #[tokio::test]
    async fn http_check_accepts_2xx_by_default() {
        let url = http_server("200 OK").await;
        let probe = NetworkProbe::new();
        let http = Protocol::Http {
            url,
            expect_status: None,
        };
        assert!(probe.check("superset", &http).await.is_ok());
    }

    #[tokio::test]
    async fn http_check_honours_expected_status() {
        let url = http_server("503 Service Unavailable").await;
        let probe = NetworkProbe::new();

        let default = Protocol::Http {
            url: url.clone(),
            expect_status: None,
        };
        let err = probe.check("airflow", &default).await.unwrap_err();
        assert!(err.contains("503"));

        let expecting_503 = Protocol::Http {
            url,
            expect_status: Some(503),
        };
        assert!(probe.check("airflow", &expecting_503).await.is_ok());
    }

    #[tokio::test]
    async fn command_check_uses_exit_status() {
        let probe = NetworkProbe::new();
        let ok = Protocol::Command {
            command: "exit 0".into(),
        };
        let not_ready = Protocol::Command {
            command: "echo 'no response' >&2; exit 2".into(),
        };
        assert!(probe.check("postgres", &ok).await.is_ok());
        assert_eq!(
            probe.check("postgres", &not_ready).await.unwrap_err(),
            "exited with status 2: no response"
        );
    }
}
