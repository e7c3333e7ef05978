use std::path::Path;

use serde::{Deserialize, Serialize};

/// Addressing for ZeroMQ connections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "address")]
pub enum Endpoint {
    /// Inter-process communication via Unix domain sockets.
    /// Fastest option for same-host brokers.
    Ipc(String),

    /// TCP transport for a remote broker.
    Tcp { host: String, port: u16 },
}

impl Endpoint {
    /// Create an IPC endpoint with the given socket name.
    ///
    /// The name is used as a path component under `/tmp/viaduct/`.
    pub fn ipc(name: &str) -> Self {
        Self::Ipc(name.to_string())
    }

    /// Create a TCP endpoint with the given host and port.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Generate the ZeroMQ endpoint address string.
    pub fn address(&self) -> String {
        match self {
            Self::Ipc(name) => format!("ipc:///tmp/viaduct/{name}.sock"),
            Self::Tcp { host, port } => format!("tcp://{host}:{port}"),
        }
    }

    /// For IPC endpoints, ensure the parent directory exists.
    ///
    /// ZeroMQ requires the directory to exist before binding an IPC socket.
    /// This is a no-op for TCP endpoints.
    pub fn ensure_ipc_dir(&self) -> std::io::Result<()> {
        if let Self::Ipc(_) = self {
            let address = self.address();
            let path = address.strip_prefix("ipc://").unwrap_or(&address);
            if let Some(parent) = Path::new(path).parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.address())
    }
}
