use toml;

use std::fs::File;
use std::io::Read;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Server configuration. Every key is optional in the file; missing keys take the defaults below.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Address the stock socket provider binds to.
    pub host: IpAddr,
    pub port: u16,
    /// Maximum number of simultaneously serviced clients, also used as the OS listen backlog.
    pub backlog: usize,
    /// Poll timeout in (fractional) seconds. Absent means wait for readiness indefinitely.
    pub timeout: Option<f64>,
    /// Chunk size of a single receive.
    pub read_buffer_size: usize,
    /// Chunk size of a single send.
    pub write_buffer_size: usize,
    /// How many readiness events a single wait can report.
    pub events_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 7070,
            backlog: 10,
            timeout: None,
            read_buffer_size: 2048,
            write_buffer_size: 2048,
            events_capacity: 1024,
        }
    }
}

impl Config {
    /// Read from a config file, create a new config. Will exit the process on error.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        unwrap!(Self::from_path(path), "loading the configuration")
    }

    /// Read and validate a config file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from {:?}", path);
        let mut file = File::open(path)?;
        let mut buffer = String::new();
        file.read_to_string(&mut buffer)?;
        buffer.parse()
    }

    /// Check the values that deserialization alone cannot rule out.
    pub fn validate(&self) -> Result<()> {
        if self.backlog == 0 {
            return Err(Error::InvalidConfig("backlog must be at least 1".into()));
        }
        if self.read_buffer_size == 0 || self.write_buffer_size == 0 {
            return Err(Error::InvalidConfig("buffer sizes must be non-zero".into()));
        }
        if self.events_capacity == 0 {
            return Err(Error::InvalidConfig("events_capacity must be non-zero".into()));
        }
        if let Some(timeout) = self.timeout {
            if !timeout.is_finite() || timeout < 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "timeout must be a non-negative number of seconds, got {}",
                    timeout
                )));
            }
        }
        Ok(())
    }

    /// The readiness wait bound, or `None` to block until something happens.
    pub fn poll_timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs_f64)
    }

    pub fn address(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}
