use crate::cli::Args;
use crate::reporting::OutputFormat;
use http::Request;
use hyper::body::Bytes;
use hyper::{Body, Uri};
use serde::Deserialize;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_METHOD: &str = "GET";
const DEFAULT_CONFIG_NAME: &str = ".load-test-cli.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("Unsupported scheme '{0}', expected http or https")]
    UnsupportedScheme(String),
    #[error("Could not read config file {}: {}", .path.display(), .source)]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Could not parse config file {}: {}", .path.display(), .source)]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid header '{0}', expected 'Name: Value'")]
    InvalidHeader(String),
    #[error("Concurrency must be at least 1")]
    ZeroConcurrency,
    #[error("Could not read payload file {}: {}", .path.display(), .source)]
    Payload {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum PayloadConfig {
    Inline(String),
    File { file: PathBuf },
    Value { value: String },
}

impl PayloadConfig {
    fn make_absolute(mut self, parent: &Path) -> PayloadConfig {
        if let PayloadConfig::File { ref mut file } = self {
            *file = parent.join(&file);
        }
        self
    }

    fn load(self) -> Result<Bytes, ConfigError> {
        match self {
            PayloadConfig::Inline(v) | PayloadConfig::Value { value: v } => Ok(Bytes::from(v)),
            PayloadConfig::File { file } => fs::read(&file)
                .map(Bytes::from)
                .map_err(|source| ConfigError::Payload { path: file, source }),
        }
    }
}

/// Shape of the TOML config file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub concurrency: Option<usize>,
    pub method: Option<String>,
    pub headers: Option<Vec<String>>,
    pub data: Option<PayloadConfig>,
    pub timeout: Option<u64>,
    pub format: Option<OutputFormat>,
}

impl FileConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<FileConfig, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: FileConfig =
            toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let parent = path.parent().unwrap_or_else(|| Path::new("/"));
        config.data = config.data.map(|p| p.make_absolute(parent));
        Ok(config)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(DEFAULT_CONFIG_NAME))
}

/// Everything needed to issue one request. Built once, then shared read-only
/// by every worker.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub url: Uri,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    pub timeout: Option<Duration>,
}

impl RequestSpec {
    #[cfg(test)]
    pub fn get(url: Uri) -> RequestSpec {
        RequestSpec {
            url,
            method: DEFAULT_METHOD.into(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    /// Builds a fresh request. Method and header validity are only checked
    /// here, so a bad one fails the worker rather than the run.
    pub fn to_request(&self) -> Result<Request<Body>, http::Error> {
        let mut builder = Request::builder()
            .uri(self.url.clone())
            .method(self.method.as_str());
        for (k, v) in self.headers.iter() {
            builder = builder.header(k.as_str(), v.as_str());
        }
        let body = match self.body {
            Some(ref b) => Body::from(b.clone()),
            None => Body::empty(),
        };
        builder.body(body)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub request: RequestSpec,
    pub concurrency: NonZeroUsize,
    pub format: OutputFormat,
    pub source: Option<PathBuf>,
}

pub fn parse_url(raw: &str) -> Result<Uri, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };
    let url: Uri = raw.parse().map_err(|e: http::uri::InvalidUri| invalid(&e.to_string()))?;
    let scheme = url
        .scheme_str()
        .ok_or_else(|| invalid("URL must be absolute"))?;
    if url.host().map(str::is_empty).unwrap_or(true) {
        return Err(invalid("URL has no host"));
    }
    if scheme != "http" && scheme != "https" {
        return Err(ConfigError::UnsupportedScheme(scheme.to_string()));
    }
    Ok(url)
}

pub fn parse_header(line: &str) -> Result<(String, String), ConfigError> {
    match line.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(ConfigError::InvalidHeader(line.to_string())),
    }
}

impl Config {
    /// Loads the explicit `--config` file, or the default one if it exists,
    /// then layers the command line on top.
    pub fn from_args(args: &Args) -> Result<Config, ConfigError> {
        let path = match args.config {
            Some(ref p) => Some(p.clone()),
            None => default_config_path().filter(|p| p.is_file()),
        };
        let file = match path {
            Some(ref p) => FileConfig::load(p)?,
            None => FileConfig::default(),
        };
        let mut config = Config::build(args, file)?;
        config.source = path;
        Ok(config)
    }

    /// Flag or environment value first (clap already merged those), then the
    /// config file, then the built-in default.
    pub fn build(args: &Args, file: FileConfig) -> Result<Config, ConfigError> {
        let url = parse_url(&args.url)?;

        let concurrency = args.concurrency.or(file.concurrency).unwrap_or(1);
        let concurrency = NonZeroUsize::new(concurrency).ok_or(ConfigError::ZeroConcurrency)?;

        let method = args
            .method
            .clone()
            .or(file.method)
            .unwrap_or_else(|| DEFAULT_METHOD.into());

        let header_lines = if args.headers.is_empty() {
            file.headers.unwrap_or_default()
        } else {
            args.headers.clone()
        };
        let headers = header_lines
            .iter()
            .map(|h| parse_header(h))
            .collect::<Result<Vec<_>, _>>()?;

        let body = match args.data {
            Some(ref d) => Some(Bytes::from(d.clone())),
            None => file.data.map(PayloadConfig::load).transpose()?,
        };

        // zero disables the deadline rather than failing every request
        let timeout = args
            .timeout
            .or(file.timeout)
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs);
        let format = args.format.or(file.format).unwrap_or_default();

        Ok(Config {
            request: RequestSpec {
                url,
                method,
                headers,
                body,
                timeout,
            },
            concurrency,
            format,
            source: None,
        })
    }
}
