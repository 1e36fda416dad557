use anyhow::{Context, ensure};
use serde::Deserialize;
use std::{fmt, path::PathBuf, time::Duration};

/// config layout this build understands
pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub version: u32,
    pub database: Database,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub covers: CoversConfig,
    pub http: HttpConfig,
    #[serde(default)]
    pub public: PublicEndpoint,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Config> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {path}"))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Config> {
        let config: Config =
            toml::from_str(contents).with_context(|| "Failed to parse config TOML")?;
        ensure!(
            config.version == CONFIG_VERSION,
            "Unsupported config version {}, expected {CONFIG_VERSION}",
            config.version
        );
        Ok(config)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub bind_addr: String,
    pub port: u16,
    /// size of reads from upstream while relaying a stream
    #[serde(default = "default_stream_chunk_bytes")]
    pub stream_chunk_bytes: usize,
}

#[derive(Debug, Deserialize)]
pub struct Database {
    pub in_memory: bool,
    pub path: Option<PathBuf>,
}

/// Remote blob store: a bot-style file API reachable at `api_base`.
#[derive(Deserialize, Clone)]
pub struct UpstreamConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    pub token: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Bounds resolve calls, prefix fetches and thumbnail fetches.
    /// Relayed streams are never cut by it.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("api_base", &self.api_base)
            .field("token", &"<redacted>")
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl UpstreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CoversConfig {
    #[serde(default = "default_covers_dir")]
    pub dir: PathBuf,
    /// How many leading bytes of an audio file are fetched to look for an
    /// embedded picture. Tags bigger than this miss and fall back to the
    /// thumbnail.
    #[serde(default = "default_prefix_cap_bytes")]
    pub prefix_cap_bytes: u64,
    #[serde(default = "default_max_thumbnail_bytes")]
    pub max_thumbnail_bytes: u64,
}

impl Default for CoversConfig {
    fn default() -> Self {
        Self {
            dir: default_covers_dir(),
            prefix_cap_bytes: default_prefix_cap_bytes(),
            max_thumbnail_bytes: default_max_thumbnail_bytes(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PublicEndpoint {
    /// empty means urls handed to clients are relative
    #[serde(default)]
    pub base_url: String,
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_covers_dir() -> PathBuf {
    PathBuf::from("covers")
}

fn default_prefix_cap_bytes() -> u64 {
    300 * 1024
}

fn default_max_thumbnail_bytes() -> u64 {
    1024 * 1024
}

fn default_stream_chunk_bytes() -> usize {
    64 * 1024
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_config_toml() -> anyhow::Result<()> {
        let toml_str = r#"
version = 1

[database]
in_memory = true

[upstream]
token = "123:abc"

[http]
bind_addr = "127.0.0.1"
port = 8080
"#;

        let cfg = Config::from_toml(toml_str)?;

        assert_eq!(cfg.version, 1);
        assert!(cfg.database.in_memory);

        // Defaults
        assert_eq!(cfg.upstream.api_base, "https://api.telegram.org");
        assert_eq!(cfg.upstream.request_timeout(), Duration::from_secs(15));
        assert_eq!(cfg.covers.dir, PathBuf::from("covers"));
        assert_eq!(cfg.covers.prefix_cap_bytes, 307_200);
        assert_eq!(cfg.http.stream_chunk_bytes, 65_536);
        assert!(cfg.public.base_url.is_empty());

        Ok(())
    }

    #[test]
    fn test_parse_full_config() -> anyhow::Result<()> {
        let toml_str = r#"
version = 1

[database]
in_memory = false
path = "/tmp/blobdeck.db"

[upstream]
api_base = "http://127.0.0.1:9000"
token = "123:abc"
connect_timeout_secs = 3
request_timeout_secs = 7

[covers]
dir = "/var/cache/blobdeck"
prefix_cap_bytes = 65536
max_thumbnail_bytes = 4096

[http]
bind_addr = "0.0.0.0"
port = 8081
stream_chunk_bytes = 8192

[public]
base_url = "https://music.example.org"
"#;

        let cfg = Config::from_toml(toml_str)?;

        assert!(!cfg.database.in_memory);
        assert_eq!(cfg.database.path, Some(PathBuf::from("/tmp/blobdeck.db")));

        assert_eq!(cfg.upstream.api_base, "http://127.0.0.1:9000");
        assert_eq!(cfg.upstream.connect_timeout(), Duration::from_secs(3));
        assert_eq!(cfg.upstream.request_timeout(), Duration::from_secs(7));

        assert_eq!(cfg.covers.dir, PathBuf::from("/var/cache/blobdeck"));
        assert_eq!(cfg.covers.prefix_cap_bytes, 65536);
        assert_eq!(cfg.covers.max_thumbnail_bytes, 4096);

        assert_eq!(cfg.http.port, 8081);
        assert_eq!(cfg.http.stream_chunk_bytes, 8192);
        assert_eq!(cfg.public.base_url, "https://music.example.org");

        Ok(())
    }

    #[test]
    fn test_missing_token_is_rejected() {
        let toml_str = r#"
version = 1

[database]
in_memory = true

[upstream]

[http]
bind_addr = "127.0.0.1"
port = 8080
"#;

        assert!(toml::from_str::<Config>(toml_str).is_err());
    }

    #[test]
    fn test_load_example_config() -> anyhow::Result<()> {
        let cfg = Config::load(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.toml"))?;

        assert!(!cfg.database.in_memory);
        assert_eq!(cfg.upstream.api_base, "https://api.telegram.org");
        assert_eq!(cfg.covers.prefix_cap_bytes, 300 * 1024);
        assert_eq!(cfg.http.stream_chunk_bytes, 64 * 1024);

        Ok(())
    }

    #[test]
    fn test_load_missing_file() {
        assert!(Config::load("/nonexistent/blobdeck.toml").is_err());
    }

    #[test]
    fn test_unsupported_version_is_rejected() {
        let toml_str = r#"
version = 2

[database]
in_memory = true

[upstream]
token = "1:abc"

[http]
bind_addr = "127.0.0.1"
port = 8080
"#;

        let err = Config::from_toml(toml_str).expect_err("version 2 must fail");
        assert!(err.to_string().contains("Unsupported config version 2"));
    }

    #[test]
    fn test_debug_output_hides_token() -> anyhow::Result<()> {
        let toml_str = r#"
version = 1

[database]
in_memory = true

[upstream]
token = "123456:very-secret"

[http]
bind_addr = "127.0.0.1"
port = 8080
"#;

        let cfg = Config::from_toml(toml_str)?;
        let printed = format!("{cfg:?}");

        assert!(!printed.contains("very-secret"), "{printed}");
        assert!(printed.contains("<redacted>"));
        assert!(printed.contains("api.telegram.org"));
        Ok(())
    }
}
