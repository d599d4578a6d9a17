use std::{net::SocketAddr, path::PathBuf};

use anyhow::{anyhow, Context, Result};

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// Static client, served as the router fallback when set.
    pub assets_dir: Option<PathBuf>,
    pub cors_allow_any: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_owned());
        let bind_addr: SocketAddr = bind_addr
            .parse()
            .with_context(|| format!("BIND_ADDR is not a socket address: {bind_addr}"))?;

        let assets_dir = lookup("ASSETS_DIR")
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from);

        let cors_allow_any = match lookup("CORS_ALLOW_ANY").as_deref() {
            None | Some("") => true,
            Some("1" | "true" | "yes") => true,
            Some("0" | "false" | "no") => false,
            Some(other) => return Err(anyhow!("CORS_ALLOW_ANY must be true or false, got {other}")),
        };

        Ok(Self {
            bind_addr,
            assets_dir,
            cors_allow_any,
        })
    }
}
