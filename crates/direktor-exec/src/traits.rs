//! Transport traits

use async_trait::async_trait;

use crate::error::ExecError;
use crate::options::ConnectOptions;
use crate::result::CommandOutput;

/// One open connection to a remote host
///
/// Exclusively owned by its caller; a connection executes one command at a
/// time and is closed exactly once.
#[async_trait]
pub trait Connection: Send {
    /// Execute a shell instruction on the remote host and wait for its exit
    async fn exec(&mut self, cmd: &str) -> Result<CommandOutput, ExecError>;

    /// Close the connection
    async fn close(&mut self) -> Result<(), ExecError>;
}

/// Factory opening connections from connection options
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open and authenticate a new connection
    async fn connect(&self, options: &ConnectOptions) -> Result<Box<dyn Connection>, ExecError>;
}
