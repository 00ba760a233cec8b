use std::env;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::flow::FlowRewards;

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct ConfigFile {
    pub target: Option<String>,
    pub rate: Option<u32>,
    #[serde(alias = "concurrency")]
    pub workers: Option<usize>,
    pub timeout: Option<u64>,
    pub proxy: Option<String>,
    pub follow_redirects: Option<bool>,
    pub output: Option<String>,
    pub output_format: Option<String>,
    #[serde(alias = "wayback_index")]
    pub history_index: Option<String>,
    pub history_limit: Option<usize>,
    pub skip_history: Option<bool>,
    pub skip_flow: Option<bool>,
    pub skip_context: Option<bool>,
    pub skip_method_audit: Option<bool>,
    pub top_words: Option<usize>,
    pub guess_prefixes: Option<Vec<String>>,
    pub flow_steps: Option<usize>,
    pub flow_rewards: Option<FlowRewards>,
    pub size_deviation: Option<f64>,
    pub fuzz_params: Option<String>,
    pub min_secret_entropy: Option<f64>,
    pub hamming_threshold: Option<u32>,
    pub jaccard_threshold: Option<f64>,
    pub circuit_threshold: Option<u32>,
    pub circuit_cooldown: Option<u64>,
    pub classifier: Option<String>,
    pub no_color: Option<bool>,
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("USERPROFILE").map(PathBuf::from))
        .or_else(|| {
            let drive = env::var_os("HOMEDRIVE")?;
            let path = env::var_os("HOMEPATH")?;
            Some(PathBuf::from(drive).join(path))
        })
}

pub fn default_config_path() -> Option<PathBuf> {
    Some(home_dir()?.join(".probewright").join("config.yml"))
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        if let Some(home) = home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

pub fn expand_tilde_string(path: &str) -> String {
    expand_tilde(path).to_string_lossy().to_string()
}

pub fn parse_config(contents: &str) -> Result<ConfigFile, String> {
    serde_yaml::from_str::<ConfigFile>(contents).map_err(|e| e.to_string())
}

pub fn load_config(path: &PathBuf, allow_missing: bool) -> Result<ConfigFile, String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => parse_config(&contents)
            .map_err(|e| format!("failed to parse config '{}': {e}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && allow_missing => {
            Ok(ConfigFile::default())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(format!("config file not found '{}'", path.display()))
        }
        Err(e) => Err(format!("failed to read config '{}': {e}", path.display())),
    }
}

pub fn default_config_yaml() -> String {
    r#"# Probewright config
#
# Location (default):
#   ~/.probewright/config.yml
#
# Command-line flags win over values set here.

# Target (optional, usually passed with -u)
# target: https://example.com/

# Output (optional)
# output: ./findings.json
# output_format: json

# Performance
rate: 20
workers: 10
timeout: 10

# HTTP (optional)
# proxy: http://127.0.0.1:8080
follow_redirects: true

# Circuit breaker: opens after more than `circuit_threshold` consecutive 5xx,
# stays open for `circuit_cooldown` seconds.
circuit_threshold: 5
circuit_cooldown: 60

# Discovery
history_index: http://web.archive.org/cdx/search/cdx
history_limit: 500
skip_history: false
skip_context: false
top_words: 15
guess_prefixes:
  - /
  - /api/

# Flow explorer
skip_flow: false
flow_steps: 4
flow_rewards:
  login: 10
  register: 20
  checkout: 100
  submit: 50

# Detection
skip_method_audit: false
classifier: keyword
fuzz_params: "admin=true&debug=1&test=true&role=admin"
size_deviation: 0.05
min_secret_entropy: 3.5
hamming_threshold: 3
jaccard_threshold: 0.85

# Output styling
no_color: false
"#
    .to_string()
}

pub fn ensure_default_config_file(path: &PathBuf) -> Result<(), String> {
    if path.exists() {
        return Ok(());
    }
    let parent = path
        .parent()
        .ok_or_else(|| format!("invalid config path '{}'", path.display()))?;
    std::fs::create_dir_all(parent).map_err(|e| {
        format!(
            "failed to create config directory '{}': {e}",
            parent.display()
        )
    })?;
    let contents = default_config_yaml();
    std::fs::write(path, contents)
        .map_err(|e| format!("failed to write config file '{}': {e}", path.display()))?;
    Ok(())
}
