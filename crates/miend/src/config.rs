use std::net::SocketAddr;
use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Directory containing the trained artifact files.
    pub artifact_dir: PathBuf,
    /// Address the HTTP server binds to.
    pub listen_addr: SocketAddr,
}

impl Config {
    /// Load configuration from `MIEN_*` environment variables with defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        let artifact_dir = std::env::var("MIEN_ARTIFACT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("artifacts"));

        let listen_addr = std::env::var("MIEN_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:5000".to_string())
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid MIEN_LISTEN_ADDR: {e}"))?;

        Ok(Self { artifact_dir, listen_addr })
    }
}
