//! Real SSH/Telnet transport backing the Connection Manager (spec §4.2).
//!
//! SSH goes over `ssh2` (libssh2), run on a blocking thread per call since
//! libssh2's session handle isn't `Send`-friendly across an async
//! executor. Telnet is a minimal hand-rolled client: Cisco command
//! automation only needs IAC option refusal and line read/write, not a
//! full RFC 854 implementation.

use crate::connection::{ConnectionAdapter, SessionHandle};
use crate::credentials::CredentialStore;
use async_trait::async_trait;
use netorch_core::{DeviceSnapshot, JumphostConfig, Transport, TransportError};
use std::io::{Read, Write};
use std::net::TcpStream as StdTcpStream;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Adapter backed by real sockets. Holds the credential store so it can
/// decrypt device and jumphost passwords just before use.
pub struct SshTelnetAdapter {
    credentials: Arc<CredentialStore>,
}

impl SshTelnetAdapter {
    pub fn new(credentials: Arc<CredentialStore>) -> Self {
        Self { credentials }
    }

    fn decrypt(&self, stored: &str) -> Result<String, TransportError> {
        if CredentialStore::is_encrypted(stored) {
            self.credentials.decrypt(stored).map_err(|e| TransportError(format!("credential error: {e}")))
        } else {
            Ok(stored.to_string())
        }
    }
}

#[async_trait]
impl ConnectionAdapter for SshTelnetAdapter {
    async fn connect(
        &self,
        device: &DeviceSnapshot,
        jumphost: Option<&JumphostConfig>,
        connect_timeout: Duration,
    ) -> Result<Box<dyn SessionHandle>, TransportError> {
        let password = self.decrypt(&device.password_encrypted)?;
        let jumphost_password = match jumphost {
            Some(cfg) if cfg.enabled => Some(self.decrypt(&cfg.password_encrypted)?),
            _ => None,
        };

        let target_addr = match (jumphost, &jumphost_password) {
            (Some(cfg), Some(jp_password)) if cfg.enabled => {
                open_jumphost_tunnel(cfg, jp_password.clone(), device.host.clone(), device.port, connect_timeout)
                    .await?
            }
            _ => format!("{}:{}", device.host, device.port),
        };

        match device.transport {
            Transport::Ssh => {
                let username = device.username.clone();
                let host_for_log = device.host.clone();
                let session = tokio::task::spawn_blocking(move || {
                    ssh_connect(&target_addr, connect_timeout, &username, &password)
                })
                .await
                .map_err(|e| TransportError(format!("ssh connect task panicked: {e}")))??;
                tracing::debug!(host = %host_for_log, "ssh session established");
                Ok(Box::new(SshSession { session: Arc::new(parking_lot::Mutex::new(session)) }))
            }
            Transport::Telnet => {
                let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(&target_addr))
                    .await
                    .map_err(|_| TransportError(format!("telnet connect to {target_addr} timed out")))?
                    .map_err(|e| TransportError(format!("telnet connect to {target_addr} failed: {e}")))?;
                let telnet = TelnetSession { stream: tokio::sync::Mutex::new(stream) };
                telnet.login(&device.username, &password).await?;
                Ok(Box::new(telnet))
            }
        }
    }

    async fn probe_jumphost(&self, config: &JumphostConfig, connect_timeout: Duration) -> bool {
        let password = match self.decrypt(&config.password_encrypted) {
            Ok(p) => p,
            Err(_) => return false,
        };
        let addr = format!("{}:{}", config.host, config.port);
        let username = config.username.clone();
        tokio::task::spawn_blocking(move || ssh_connect(&addr, connect_timeout, &username, &password).is_ok())
            .await
            .unwrap_or(false)
    }
}

/// Blocking libssh2 handshake + password auth. Run inside
/// `spawn_blocking` by callers.
fn ssh_connect(
    addr: &str,
    connect_timeout: Duration,
    username: &str,
    password: &str,
) -> Result<ssh2::Session, TransportError> {
    let tcp = StdTcpStream::connect(addr).map_err(|e| TransportError(format!("tcp connect to {addr}: {e}")))?;
    tcp.set_read_timeout(Some(connect_timeout)).ok();
    let mut session = ssh2::Session::new().map_err(|e| TransportError(format!("ssh session init: {e}")))?;
    session.set_tcp_stream(tcp);
    session.handshake().map_err(|e| TransportError(format!("ssh handshake with {addr}: {e}")))?;
    session
        .userauth_password(username, password)
        .map_err(|e| TransportError(format!("ssh auth to {addr} failed: {e}")))?;
    if !session.authenticated() {
        return Err(TransportError(format!("ssh auth to {addr} was not accepted")));
    }
    Ok(session)
}

/// Open a local TCP forward through the jumphost (SSH ProxyJump
/// equivalent): handshake to the jumphost, open a direct-tcpip channel
/// to the target, and bridge it to a locally bound ephemeral port so the
/// device-facing transport can dial a plain `TcpStream` as usual.
async fn open_jumphost_tunnel(
    config: &JumphostConfig,
    jumphost_password: String,
    target_host: String,
    target_port: u16,
    connect_timeout: Duration,
) -> Result<String, TransportError> {
    let jump_addr = format!("{}:{}", config.host, config.port);
    let jump_username = config.username.clone();
    let session = tokio::task::spawn_blocking(move || {
        ssh_connect(&jump_addr, connect_timeout, &jump_username, &jumphost_password)
    })
    .await
    .map_err(|e| TransportError(format!("jumphost connect task panicked: {e}")))??;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| TransportError(format!("local forward bind failed: {e}")))?;
    let local_addr = listener.local_addr().map_err(|e| TransportError(format!("local forward addr: {e}")))?;

    tokio::spawn(async move {
        if let Ok((local_stream, _)) = listener.accept().await {
            if let Ok(std_stream) = local_stream.into_std() {
                tokio::task::spawn_blocking(move || {
                    bridge_through_jumphost(session, std_stream, target_host, target_port)
                });
            }
        }
    });

    Ok(local_addr.to_string())
}

/// Pump bytes between the local forward socket and the jumphost's
/// `direct-tcpip` channel. Both sides are put in non-blocking mode and
/// polled in one loop on a blocking-pool thread — `ssh2::Channel` has no
/// owned split, so a single-thread poll loop is simpler than faking one.
fn bridge_through_jumphost(
    session: ssh2::Session,
    mut local_stream: StdTcpStream,
    target_host: String,
    target_port: u16,
) {
    let mut channel = match session.channel_direct_tcpip(&target_host, target_port, None) {
        Ok(c) => c,
        Err(_) => return,
    };
    local_stream.set_nonblocking(true).ok();
    session.set_blocking(false);

    let mut local_buf = [0u8; 4096];
    let mut channel_buf = [0u8; 4096];
    loop {
        let mut idle = true;
        match local_stream.read(&mut local_buf) {
            Ok(0) => break,
            Ok(n) => {
                idle = false;
                if channel.write_all(&local_buf[..n]).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(_) => break,
        }
        match channel.read(&mut channel_buf) {
            Ok(0) if channel.eof() => break,
            Ok(0) => {}
            Ok(n) => {
                idle = false;
                if local_stream.write_all(&channel_buf[..n]).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(_) => break,
        }
        if channel.eof() {
            break;
        }
        if idle {
            std::thread::sleep(Duration::from_millis(5));
        }
    }
    channel.close().ok();
}

struct SshSession {
    session: Arc<parking_lot::Mutex<ssh2::Session>>,
}

#[async_trait]
impl SessionHandle for SshSession {
    async fn send(&self, command: &str, read_timeout: Duration) -> Result<String, TransportError> {
        let session = self.session.clone();
        let command = command.to_string();
        tokio::task::spawn_blocking(move || {
            let session = session.lock();
            let mut channel =
                session.channel_session().map_err(|e| TransportError(format!("open channel: {e}")))?;
            channel.exec(&command).map_err(|e| TransportError(format!("exec {command:?}: {e}")))?;
            session.set_timeout(read_timeout.as_millis() as u32);
            let mut output = String::new();
            channel
                .read_to_string(&mut output)
                .map_err(|e| TransportError(format!("read output of {command:?}: {e}")))?;
            channel.wait_close().ok();
            Ok(output)
        })
        .await
        .map_err(|e| TransportError(format!("command task panicked: {e}")))?
    }

    async fn close(&self) -> Result<(), TransportError> {
        let session = self.session.clone();
        tokio::task::spawn_blocking(move || {
            let session = session.lock();
            session.disconnect(None, "done", None).ok();
        })
        .await
        .ok();
        Ok(())
    }
}

struct TelnetSession {
    stream: tokio::sync::Mutex<TcpStream>,
}

const IAC: u8 = 255;
const WILL: u8 = 251;
const WONT: u8 = 252;
const DO: u8 = 253;
const DONT: u8 = 254;

impl TelnetSession {
    /// Drain and refuse any option negotiation, then send the username
    /// and password as plain lines (Cisco telnet login prompts).
    async fn login(&self, username: &str, password: &str) -> Result<(), TransportError> {
        self.drain_negotiation().await?;
        self.write_line(username).await?;
        self.drain_negotiation().await?;
        self.write_line(password).await?;
        self.drain_negotiation().await?;
        Ok(())
    }

    async fn write_line(&self, line: &str) -> Result<(), TransportError> {
        self.stream
            .lock()
            .await
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .map_err(|e| TransportError(format!("telnet write failed: {e}")))
    }

    /// Read and respond to IAC option negotiation without blocking
    /// forever: refuse every WILL/DO with WONT/DONT, stop once the
    /// stream goes quiet for a short window.
    async fn drain_negotiation(&self) -> Result<(), TransportError> {
        let mut buf = [0u8; 1];
        loop {
            let mut stream = self.stream.lock().await;
            match tokio::time::timeout(Duration::from_millis(200), stream.read(&mut buf)).await {
                Ok(Ok(0)) => return Err(TransportError("telnet connection closed during negotiation".into())),
                Ok(Ok(_)) if buf[0] == IAC => {
                    let mut cmd = [0u8; 2];
                    stream
                        .read_exact(&mut cmd)
                        .await
                        .map_err(|e| TransportError(format!("telnet negotiation read failed: {e}")))?;
                    let reply = match cmd[0] {
                        WILL => DONT,
                        DO => WONT,
                        _ => continue,
                    };
                    stream
                        .write_all(&[IAC, reply, cmd[1]])
                        .await
                        .map_err(|e| TransportError(format!("telnet negotiation reply failed: {e}")))?;
                }
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => return Err(TransportError(format!("telnet read failed: {e}"))),
                Err(_) => return Ok(()), // quiet window: negotiation settled
            }
        }
    }
}

#[async_trait]
impl SessionHandle for TelnetSession {
    async fn send(&self, command: &str, read_timeout: Duration) -> Result<String, TransportError> {
        {
            let mut stream = self.stream.lock().await;
            stream
                .write_all(format!("{command}\r\n").as_bytes())
                .await
                .map_err(|e| TransportError(format!("telnet write failed: {e}")))?;
        }
        let mut output = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let mut stream = self.stream.lock().await;
            match tokio::time::timeout(read_timeout, stream.read(&mut buf)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => output.extend_from_slice(&buf[..n]),
                Ok(Err(e)) => return Err(TransportError(format!("telnet read failed: {e}"))),
                Err(_) => break, // read_timeout elapsed: treat as end of output
            }
        }
        Ok(String::from_utf8_lossy(&output).into_owned())
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}
