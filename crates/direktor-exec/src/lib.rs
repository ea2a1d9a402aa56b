//! direktor-exec: SSH transport seam
//!
//! Provides the `Connector`/`Connection` traits and the russh-backed implementation

pub mod error;
pub mod options;
pub mod result;
pub mod ssh;
pub mod traits;

pub use error::ExecError;
pub use options::ConnectOptions;
pub use result::CommandOutput;
pub use ssh::SshConnector;
pub use traits::{Connection, Connector};
