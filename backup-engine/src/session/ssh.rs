//! SSH sessions via libssh2.

use super::{DeviceConnector, DeviceSession};
use crate::config::SessionConfig;
use crate::device::Device;
use crate::utils::errors::{ConnectError, FetchError};
use crate::utils::Sensitive;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info};

/// Opens password-authenticated SSH sessions.
#[derive(Debug, Clone)]
pub struct SshConnector {
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl SshConnector {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(config.connect_timeout_secs.max(1)),
            command_timeout: Duration::from_secs(config.command_timeout_secs.max(1)),
        }
    }
}

impl DeviceConnector for SshConnector {
    fn open(&self, device: &Device) -> Result<Box<dyn DeviceSession>, ConnectError> {
        let address = format!("{}:{}", device.address, device.port);
        let unreachable = |source: std::io::Error| ConnectError::Unreachable {
            address: address.clone(),
            source,
        };

        let socket_addr = address
            .to_socket_addrs()
            .map_err(unreachable)?
            .next()
            .ok_or_else(|| {
                unreachable(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "address did not resolve",
                ))
            })?;

        let tcp = TcpStream::connect_timeout(&socket_addr, self.connect_timeout).map_err(unreachable)?;
        tcp.set_read_timeout(Some(self.command_timeout)).map_err(unreachable)?;
        tcp.set_write_timeout(Some(self.command_timeout)).map_err(unreachable)?;

        let handshake = |e: ssh2::Error| ConnectError::Handshake {
            address: address.clone(),
            reason: e.to_string(),
        };
        let mut sess = ssh2::Session::new().map_err(handshake)?;
        sess.set_tcp_stream(tcp);
        sess.set_timeout(self.command_timeout.as_millis().min(u32::MAX as u128) as u32);
        sess.handshake().map_err(handshake)?;

        sess.userauth_password(&device.username, device.password.expose())
            .map_err(|e| ConnectError::Authentication {
                username: device.username.clone(),
                reason: e.to_string(),
            })?;
        if !sess.authenticated() {
            return Err(ConnectError::Authentication {
                username: device.username.clone(),
                reason: "server did not accept credentials".into(),
            });
        }

        info!(hostname = %device.hostname, address = %address, "Opened SSH session");
        Ok(Box::new(SshSession {
            session: sess,
            hostname: device.hostname.clone(),
            device_type: device.device_type.clone(),
            secret: device.secret.clone(),
        }))
    }
}

struct SshSession {
    session: ssh2::Session,
    hostname: String,
    device_type: String,
    secret: Sensitive,
}

impl SshSession {
    fn exec(&self, command: &str) -> Result<String, FetchError> {
        let failed = |e: ssh2::Error| FetchError::Command {
            command: command.to_string(),
            reason: e.to_string(),
        };
        let mut channel = self.session.channel_session().map_err(failed)?;
        channel.exec(command).map_err(failed)?;

        let mut stdout = String::new();
        channel.read_to_string(&mut stdout)?;
        channel.wait_close().map_err(failed)?;

        let status = channel.exit_status().map_err(failed)?;
        if status != 0 && stdout.trim().is_empty() {
            return Err(FetchError::Command {
                command: command.to_string(),
                reason: format!("exit status {}", status),
            });
        }
        Ok(stdout)
    }

    /// Interactive path used when the device needs `enable` first.
    fn exec_privileged(&self, command: &str) -> Result<String, FetchError> {
        let failed = |e: ssh2::Error| FetchError::Command {
            command: command.to_string(),
            reason: e.to_string(),
        };
        let mut channel = self.session.channel_session().map_err(failed)?;
        channel.request_pty("vt100", None, None).map_err(failed)?;
        channel.shell().map_err(failed)?;

        let script = format!(
            "terminal length 0\nenable\n{}\n{}\nexit\n",
            self.secret.expose(),
            command
        );
        channel.write_all(script.as_bytes())?;
        channel.send_eof().map_err(failed)?;

        let mut raw = String::new();
        channel.read_to_string(&mut raw)?;
        if let Err(e) = channel.wait_close() {
            debug!(hostname = %self.hostname, error = %e, "Shell channel did not close cleanly");
        }

        if raw.contains("% Access denied") || raw.contains("% Bad secrets") {
            return Err(FetchError::Privilege("enable secret rejected".into()));
        }
        Ok(extract_command_output(&raw, command))
    }
}

impl DeviceSession for SshSession {
    fn fetch_running_config(&mut self) -> Result<String, FetchError> {
        let command = running_config_command(&self.device_type);
        debug!(hostname = %self.hostname, command, "Fetching running configuration");

        let output = if self.secret.is_empty() {
            self.exec(command)?
        } else {
            self.exec_privileged(command)?
        };

        let output = output.replace("\r\n", "\n");
        if output.trim().is_empty() {
            return Err(FetchError::EmptyOutput);
        }
        Ok(output)
    }

    fn close(&mut self) {
        if let Err(e) = self.session.disconnect(None, "backup complete", None) {
            debug!(hostname = %self.hostname, error = %e, "SSH disconnect failed");
        }
    }
}

/// Retrieval command for a device-type tag.
pub fn running_config_command(device_type: &str) -> &'static str {
    let tag = device_type.to_ascii_lowercase();
    if tag.starts_with("juniper") {
        "show configuration | no-more"
    } else if tag.starts_with("mikrotik") {
        "/export"
    } else if tag.starts_with("paloalto") {
        "show config running"
    } else {
        "show running-config"
    }
}

/// Cut the command's output out of an interactive transcript: everything
/// after the last line echoing `command`, minus the trailing prompt lines.
pub fn extract_command_output(raw: &str, command: &str) -> String {
    let lines: Vec<&str> = raw.lines().map(|l| l.trim_end_matches('\r')).collect();
    let start = lines
        .iter()
        .rposition(|l| l.trim_end().ends_with(command))
        .map(|i| i + 1)
        .unwrap_or(0);

    let mut body = &lines[start..];
    while let Some(last) = body.last() {
        let t = last.trim_end();
        let is_prompt = t.is_empty() || t.ends_with('#') || t.ends_with('>') || t.ends_with("exit");
        if !is_prompt {
            break;
        }
        body = &body[..body.len() - 1];
    }

    let mut out = body.join("\n");
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_by_device_type() {
        assert_eq!(running_config_command("cisco_ios"), "show running-config");
        assert_eq!(running_config_command("arista_eos"), "show running-config");
        assert_eq!(running_config_command("juniper_junos"), "show configuration | no-more");
        assert_eq!(running_config_command("MikroTik_RouterOS"), "/export");
        assert_eq!(running_config_command(""), "show running-config");
    }

    #[test]
    fn test_extract_from_transcript() {
        let raw = "r1>terminal length 0\r\nr1>enable\r\nPassword: \r\nr1#show running-config\r\n\
                   Building configuration...\r\n!\r\nhostname r1\r\nend\r\n\r\nr1#exit\r\n";
        assert_eq!(
            extract_command_output(raw, "show running-config"),
            "Building configuration...\n!\nhostname r1\nend\n"
        );
    }

    #[test]
    fn test_extract_without_echo_keeps_everything() {
        assert_eq!(extract_command_output("hostname r1\nend\n", "show run"), "hostname r1\nend\n");
    }

    #[test]
    fn test_connect_to_closed_port_fails() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut device = Device::new("r1", "127.0.0.1");
        device.port = port;
        let connector = SshConnector::new(&SessionConfig {
            port: 22,
            connect_timeout_secs: 1,
            command_timeout_secs: 1,
        });
        assert!(matches!(
            connector.open(&device),
            Err(ConnectError::Unreachable { .. })
        ));
    }
}
