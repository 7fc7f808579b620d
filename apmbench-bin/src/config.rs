use http::header::{HeaderName, HeaderValue};
use http::{Method, Uri};
use serde::Deserialize;
use std::fs::File;
use std::io::prelude::*;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Replaced with the variant name when a variant has no explicit `url`.
pub const VARIANT_PLACEHOLDER: &str = "{variant}";

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum PayloadConfig {
    File { file: String },
    Value { value: String },
}

impl PayloadConfig {
    fn make_absolute(mut self, parent: &Path) -> PayloadConfig {
        match self {
            PayloadConfig::File { ref mut file } => {
                *file = parent.join(&file).to_string_lossy().into();
            }
            PayloadConfig::Value { .. } => {}
        }
        self
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct FileWaitTime {
    min: f64,
    max: f64,
}

#[derive(Debug, Deserialize)]
pub struct FileVariantConfig {
    pub name: String,
    pub url: Option<String>,
    pub method: Option<String>,
    pub headers: Option<Vec<String>>,
    pub payload: Option<PayloadConfig>,
    pub enabled: Option<bool>,
    pub weight: Option<u32>,
    pub trace_context: Option<bool>,
    pub trace_options: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FileConfig {
    pub url_template: Option<String>,
    pub default_method: Option<String>,
    pub default_headers: Option<Vec<String>>,
    pub users: Option<usize>,
    pub run_time: Option<u64>,
    pub requests: Option<u64>,
    pub wait_time: Option<FileWaitTime>,
    pub request_timeout: Option<u64>,
    pub keep_alive: Option<bool>,
    #[serde(default)]
    pub variants: Vec<FileVariantConfig>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub load: LoadConfig,
    pub variants: Vec<VariantConfig>,
}

/// How the swarm of virtual users behaves.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadConfig {
    pub users: usize,
    /// `None` runs until interrupted or the request budget is spent
    pub run_time: Option<Duration>,
    pub requests: Option<u64>,
    pub wait_time: WaitTime,
    pub request_timeout: Option<Duration>,
    pub keep_alive: bool,
}

impl Default for LoadConfig {
    fn default() -> LoadConfig {
        LoadConfig {
            users: 1,
            run_time: None,
            requests: None,
            wait_time: WaitTime::default(),
            request_timeout: Some(Duration::from_secs(30)),
            keep_alive: true,
        }
    }
}

/// Think time between two requests of the same virtual user, drawn uniformly from `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaitTime {
    pub min: Duration,
    pub max: Duration,
}

impl Default for WaitTime {
    fn default() -> WaitTime {
        WaitTime {
            min: Duration::from_millis(250),
            max: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VariantConfig {
    pub name: String,
    pub url: Uri,
    pub method: Method,
    pub headers: Vec<(HeaderName, HeaderValue)>,
    pub payload: Option<PayloadConfig>,
    pub enabled: bool,
    pub weight: u32,
    /// `x-trace-options` value to send along fresh trace context headers, when enabled
    pub trace_options: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing url for variant '{0}' and no url_template set.")]
    MissingUrl(String),
    #[error("Invalid url '{url}' for variant '{variant}': {source}")]
    InvalidUrl {
        variant: String,
        url: String,
        source: http::uri::InvalidUri,
    },
    #[error("Invalid method '{0}'")]
    InvalidMethod(String),
    #[error("Invalid header '{0}', expected 'Name: value'")]
    InvalidHeader(String),
    #[error("Variant '{0}' is defined more than once.")]
    DuplicateVariant(String),
    #[error("Variant '{0}' has weight 0.")]
    ZeroWeight(String),
    #[error("Unknown variant '{0}'")]
    UnknownVariant(String),
    #[error("Invalid wait_time: min {min}s and max {max}s must be finite, non-negative and min <= max")]
    InvalidWaitTime { min: f64, max: f64 },
    #[error("users must be at least 1")]
    NoUsers,
}

pub const DEFAULT_TRACE_OPTIONS: &str =
    "trigger-trace;custom-from=frank;foo=bar;sw-keys=custom-sw-from:herbert,baz:qux;ts=1234567890";

fn parse_header(raw: &str) -> Result<(HeaderName, HeaderValue), ConfigError> {
    let invalid = || ConfigError::InvalidHeader(raw.to_string());
    let (name, value) = raw.split_once(':').ok_or_else(invalid)?;
    let name = HeaderName::from_bytes(name.trim().as_bytes()).map_err(|_| invalid())?;
    let value = HeaderValue::from_str(value.trim()).map_err(|_| invalid())?;
    Ok((name, value))
}

fn parse_headers(raw: &[String]) -> Result<Vec<(HeaderName, HeaderValue)>, ConfigError> {
    raw.iter().map(String::as_str).map(parse_header).collect()
}

fn parse_method(raw: &str) -> Result<Method, ConfigError> {
    Method::from_bytes(raw.to_uppercase().as_bytes())
        .map_err(|_| ConfigError::InvalidMethod(raw.to_string()))
}

fn parse_wait_time(w: FileWaitTime) -> Result<WaitTime, ConfigError> {
    let invalid = || ConfigError::InvalidWaitTime {
        min: w.min,
        max: w.max,
    };
    let min = Duration::try_from_secs_f64(w.min).map_err(|_| invalid())?;
    let max = Duration::try_from_secs_f64(w.max).map_err(|_| invalid())?;
    if min > max {
        return Err(invalid());
    }
    Ok(WaitTime { min, max })
}

impl Config {
    fn fill_defaults(unresolved: FileConfig, path: &Path) -> Result<Config, ConfigError> {
        let default_method = match unresolved.default_method.as_ref() {
            Some(m) => parse_method(m)?,
            None => Method::GET,
        };
        let default_headers = parse_headers(&unresolved.default_headers.unwrap_or_default())?;

        let url_template = unresolved.url_template;
        if url_template.is_none() {
            for v in unresolved.variants.iter() {
                if v.url.is_none() {
                    return Err(ConfigError::MissingUrl(v.name.clone()));
                }
            }
        }

        let defaults = LoadConfig::default();
        let wait_time = match unresolved.wait_time {
            Some(w) => parse_wait_time(w)?,
            None => defaults.wait_time,
        };
        let users = unresolved.users.unwrap_or(defaults.users);
        if users == 0 {
            return Err(ConfigError::NoUsers);
        }
        let load = LoadConfig {
            users,
            run_time: unresolved.run_time.map(Duration::from_secs),
            requests: unresolved.requests,
            wait_time,
            request_timeout: unresolved
                .request_timeout
                .map(Duration::from_secs)
                .or(defaults.request_timeout),
            keep_alive: unresolved.keep_alive.unwrap_or(defaults.keep_alive),
        };

        let variants = unresolved
            .variants
            .into_iter()
            .map(|v| {
                let raw_url = match (v.url, url_template.as_ref()) {
                    (Some(url), _) => url,
                    (None, Some(template)) => template.replace(VARIANT_PLACEHOLDER, &v.name),
                    (None, None) => return Err(ConfigError::MissingUrl(v.name)),
                };
                let url = raw_url
                    .parse::<Uri>()
                    .map_err(|source| ConfigError::InvalidUrl {
                        variant: v.name.clone(),
                        url: raw_url.clone(),
                        source,
                    })?;
                let weight = v.weight.unwrap_or(1);
                if weight == 0 {
                    return Err(ConfigError::ZeroWeight(v.name));
                }
                let method = match v.method.as_ref() {
                    Some(m) => parse_method(m)?,
                    None => default_method.clone(),
                };
                let headers = match v.headers.as_ref() {
                    Some(h) => parse_headers(h)?,
                    None => default_headers.clone(),
                };
                let trace_options = if v.trace_context.unwrap_or(false) {
                    Some(
                        v.trace_options
                            .unwrap_or_else(|| DEFAULT_TRACE_OPTIONS.to_string()),
                    )
                } else {
                    None
                };

                Ok(VariantConfig {
                    name: v.name,
                    url,
                    method,
                    headers,
                    payload: v.payload.map(|p| p.make_absolute(path)),
                    enabled: v.enabled.unwrap_or(true),
                    weight,
                    trace_options,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Config { load, variants })
    }

    /// Parse a config document. Relative payload paths resolve against `base`.
    pub fn parse<P: AsRef<Path>>(contents: &str, base: P) -> anyhow::Result<Config> {
        let config: FileConfig = toml::from_str(contents)?;
        Ok(Config::fill_defaults(config, base.as_ref())?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        let mut f = File::open(path.as_ref())?;
        let mut contents = String::new();
        f.read_to_string(&mut contents)?;
        let p = path.as_ref().parent().unwrap_or_else(|| Path::new("/"));
        Config::parse(&contents, p)
    }
}
