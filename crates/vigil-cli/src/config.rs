use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use vigil_sync::{resolve_base_url, SessionOptions};

/// Optional TOML file. Every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    backend_url: Option<String>,
    page_host: Option<String>,
    detection_interval_ms: Option<u64>,
    alert_interval_ms: Option<u64>,
    directory_interval_ms: Option<u64>,
    request_timeout_secs: Option<u64>,
}

/// Client configuration: file, then `VIGIL_*` environment, then defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Resolved once at load time.
    pub base_url: String,
    pub detection_interval: Duration,
    pub alert_interval: Duration,
    /// `None` when the directory poll is disabled (`0`).
    pub directory_interval: Option<Duration>,
    pub request_timeout: Duration,
}

impl Config {
    /// Load from `path`, or from `VIGIL_CONFIG` when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    fn load_with(path: Option<&Path>, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| env("VIGIL_CONFIG").map(PathBuf::from));
        let file = match &path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                toml::from_str::<FileConfig>(&text)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => FileConfig::default(),
        };

        let backend_url = env("VIGIL_BACKEND_URL").or(file.backend_url);
        let page_host = env("VIGIL_PAGE_HOST").or(file.page_host);
        let detection_ms = env_u64(&env, "VIGIL_DETECTION_INTERVAL_MS")
            .or(file.detection_interval_ms)
            .unwrap_or(2_000);
        let alert_ms = env_u64(&env, "VIGIL_ALERT_INTERVAL_MS")
            .or(file.alert_interval_ms)
            .unwrap_or(5_000);
        let directory_ms = env_u64(&env, "VIGIL_DIRECTORY_INTERVAL_MS")
            .or(file.directory_interval_ms)
            .unwrap_or(30_000);
        let timeout_secs = env_u64(&env, "VIGIL_REQUEST_TIMEOUT_SECS")
            .or(file.request_timeout_secs)
            .unwrap_or(10);

        if detection_ms == 0 {
            bail!("detection_interval_ms must be greater than zero");
        }
        if alert_ms == 0 {
            bail!("alert_interval_ms must be greater than zero");
        }

        Ok(Self {
            base_url: resolve_base_url(backend_url.as_deref(), page_host.as_deref()),
            detection_interval: Duration::from_millis(detection_ms),
            alert_interval: Duration::from_millis(alert_ms),
            directory_interval: (directory_ms > 0).then(|| Duration::from_millis(directory_ms)),
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            base_url: self.base_url.clone(),
            request_timeout: self.request_timeout,
            detection_interval: self.detection_interval,
            alert_interval: self.alert_interval,
            directory_interval: self.directory_interval,
        }
    }
}

fn env_u64(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    env(key).and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn toml_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = Config::load_with(None, vars(&[])).unwrap();
        assert_eq!(config.base_url, "http://127.0.0.1:8000");
        assert_eq!(config.detection_interval, Duration::from_millis(2_000));
        assert_eq!(config.alert_interval, Duration::from_millis(5_000));
        assert_eq!(config.directory_interval, Some(Duration::from_secs(30)));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_file_values() {
        let file = toml_file(
            "page_host = \"cam.lan\"\nalert_interval_ms = 8000\ndirectory_interval_ms = 0\n",
        );
        let config = Config::load_with(Some(file.path()), vars(&[])).unwrap();
        assert_eq!(config.base_url, "http://cam.lan:8000");
        assert_eq!(config.alert_interval, Duration::from_millis(8_000));
        assert_eq!(config.directory_interval, None);
    }

    #[test]
    fn test_env_overrides_file() {
        let file = toml_file("backend_url = \"http://a.lan:9000\"\ndetection_interval_ms = 1000\n");
        let env = vars(&[
            ("VIGIL_BACKEND_URL", "http://b.lan:8000/"),
            ("VIGIL_DETECTION_INTERVAL_MS", "750"),
        ]);
        let config = Config::load_with(Some(file.path()), env).unwrap();
        assert_eq!(config.base_url, "http://b.lan:8000");
        assert_eq!(config.detection_interval, Duration::from_millis(750));
    }

    #[test]
    fn test_config_path_from_env() {
        let file = toml_file("request_timeout_secs = 3\n");
        let path = file.path().to_string_lossy().into_owned();
        let config = Config::load_with(None, vars(&[("VIGIL_CONFIG", path.as_str())])).unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_unparseable_env_falls_back() {
        let config =
            Config::load_with(None, vars(&[("VIGIL_ALERT_INTERVAL_MS", "soon")])).unwrap();
        assert_eq!(config.alert_interval, Duration::from_millis(5_000));
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let err = Config::load_with(None, vars(&[("VIGIL_DETECTION_INTERVAL_MS", "0")]))
            .unwrap_err();
        assert!(err.to_string().contains("detection_interval_ms"));

        let file = toml_file("alert_interval_ms = 0\n");
        assert!(Config::load_with(Some(file.path()), vars(&[])).is_err());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let file = toml_file("poll_everything = true\n");
        assert!(Config::load_with(Some(file.path()), vars(&[])).is_err());
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(Config::load_with(Some(missing.as_path()), vars(&[])).is_err());
    }
}
