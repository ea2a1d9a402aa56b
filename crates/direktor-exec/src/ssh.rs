//! SSH connections using russh crate

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use russh::keys::ssh_key;
use russh::keys::{PrivateKeyWithHashAlg, decode_secret_key};
use russh::{ChannelMsg, Disconnect, client};
use tracing::{debug, info};

use crate::error::ExecError;
use crate::options::ConnectOptions;
use crate::result::CommandOutput;
use crate::traits::{Connection, Connector};

/// SSH client handler for russh
#[derive(Debug)]
struct SshClientHandler;

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Accept all server keys (like StrictHostKeyChecking=no)
        // In production, this should verify against known_hosts
        Ok(true)
    }

    async fn auth_banner(
        &mut self,
        banner: &str,
        _session: &mut client::Session,
    ) -> Result<(), Self::Error> {
        info!(banner = %banner.trim_end(), "server banner");
        Ok(())
    }
}

/// Connector producing russh-backed connections
#[derive(Debug, Clone, Default)]
pub struct SshConnector;

impl SshConnector {
    /// Create a new SSH connector
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self, options: &ConnectOptions) -> Result<Box<dyn Connection>, ExecError> {
        info!(
            host = %options.host,
            port = options.port,
            user = %options.username,
            "connecting to SSH"
        );

        let config = client::Config::default();
        let config = Arc::new(config);

        let mut handle = client::connect(
            config,
            (&options.host[..], options.port),
            SshClientHandler,
        )
        .await
        .map_err(|e| ExecError::ConnectionFailed(e.to_string()))?;

        if let Some(pem) = &options.private_key {
            let key_pair =
                decode_secret_key(pem, None).map_err(|e| ExecError::InvalidKey(e.to_string()))?;

            let hash_alg = handle
                .best_supported_rsa_hash()
                .await
                .ok()
                .flatten()
                .flatten();
            let auth_res = handle
                .authenticate_publickey(
                    &options.username,
                    PrivateKeyWithHashAlg::new(Arc::new(key_pair), hash_alg),
                )
                .await
                .map_err(|e| ExecError::AuthenticationFailed(e.to_string()))?;

            if !auth_res.success() {
                return Err(ExecError::AuthenticationFailed(
                    "public key authentication failed".to_string(),
                ));
            }
        } else if let Some(password) = &options.password {
            let auth_res = handle
                .authenticate_password(&options.username, password)
                .await
                .map_err(|e| ExecError::AuthenticationFailed(e.to_string()))?;

            if !auth_res.success() {
                return Err(ExecError::AuthenticationFailed(
                    "password authentication failed".to_string(),
                ));
            }
        } else {
            return Err(ExecError::AuthenticationFailed(
                "no authentication method available".to_string(),
            ));
        }

        info!(host = %options.host, "connected to remote host");

        Ok(Box::new(SshConnection { handle }))
    }
}

/// One authenticated SSH session
struct SshConnection {
    handle: client::Handle<SshClientHandler>,
}

#[async_trait]
impl Connection for SshConnection {
    async fn exec(&mut self, cmd: &str) -> Result<CommandOutput, ExecError> {
        debug!(command = %cmd, "executing remote command");

        let start = Instant::now();

        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| ExecError::Io(e.to_string()))?;

        channel
            .exec(true, cmd)
            .await
            .map_err(|e| ExecError::Io(e.to_string()))?;

        let mut status = -1;
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        loop {
            let msg = channel.wait().await;

            match msg {
                Some(ChannelMsg::Data { data }) => {
                    info!(stream = "stdout", output = %String::from_utf8_lossy(&data).trim_end(), "command output");
                    stdout.extend_from_slice(&data);
                }
                Some(ChannelMsg::ExtendedData { data, ext }) => {
                    if ext == 1 {
                        // stderr
                        info!(stream = "stderr", output = %String::from_utf8_lossy(&data).trim_end(), "command output");
                        stderr.extend_from_slice(&data);
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    status = exit_status.cast_signed();
                }
                Some(ChannelMsg::Eof) | None => break,
                _ => {}
            }
        }

        let duration = start.elapsed();
        let stdout = String::from_utf8_lossy(&stdout).to_string();
        let stderr = String::from_utf8_lossy(&stderr).to_string();

        debug!(
            command = %cmd,
            status = status,
            duration = ?duration,
            "remote command completed"
        );

        Ok(CommandOutput {
            status,
            stdout,
            stderr,
            duration,
        })
    }

    async fn close(&mut self) -> Result<(), ExecError> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
            .map_err(|e| ExecError::Io(e.to_string()))?;
        info!("connection to remote host closed");
        Ok(())
    }
}
