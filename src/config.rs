use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Server settings, read from `CALGUARD_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub password: String,
    pub max_connections: usize,
    /// WAL appends since the last compaction before the compactor rewrites it.
    pub compact_threshold: u64,
    pub request_timeout: Duration,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 5433,
            data_dir: PathBuf::from("./data"),
            password: "calguard".into(),
            max_connections: 256,
            compact_threshold: 1000,
            request_timeout: Duration::from_millis(5000),
            tls_cert: None,
            tls_key: None,
            metrics_port: None,
        }
    }
}

impl Config {
    pub fn from_env() -> io::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unset variables keep their
    /// defaults; set but unparsable ones are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> io::Result<Self> {
        let defaults = Self::default();
        let parsed = |key: &str| -> io::Result<Option<u64>> {
            lookup(key)
                .map(|v| {
                    v.trim().parse::<u64>().map_err(|e| {
                        io::Error::new(io::ErrorKind::InvalidInput, format!("{key}={v}: {e}"))
                    })
                })
                .transpose()
        };
        let port = |key: &str| -> io::Result<Option<u16>> {
            parsed(key)?
                .map(|n| {
                    u16::try_from(n).map_err(|_| {
                        io::Error::new(io::ErrorKind::InvalidInput, format!("{key}={n}: not a port"))
                    })
                })
                .transpose()
        };

        let max_connections = parsed("CALGUARD_MAX_CONNECTIONS")?
            .map_or(defaults.max_connections, |n| n as usize);
        if max_connections == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "CALGUARD_MAX_CONNECTIONS must be at least 1",
            ));
        }

        Ok(Self {
            bind: lookup("CALGUARD_BIND").unwrap_or(defaults.bind),
            port: port("CALGUARD_PORT")?.unwrap_or(defaults.port),
            data_dir: lookup("CALGUARD_DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            password: lookup("CALGUARD_PASSWORD").unwrap_or(defaults.password),
            max_connections,
            compact_threshold: parsed("CALGUARD_COMPACT_THRESHOLD")?
                .unwrap_or(defaults.compact_threshold),
            request_timeout: parsed("CALGUARD_REQUEST_TIMEOUT_MS")?
                .map_or(defaults.request_timeout, Duration::from_millis),
            tls_cert: lookup("CALGUARD_TLS_CERT"),
            tls_key: lookup("CALGUARD_TLS_KEY"),
            metrics_port: port("CALGUARD_METRICS_PORT")?,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("bookings.wal")
    }
}
