use std::{env, path::PathBuf, time::Duration};

use color_eyre::Result;
use config::{Environment, File};
use directories::ProjectDirs;
use lazy_static::lazy_static;
use serde::Deserialize;
use strum::Display;
use tracing::warn;

const DEFAULT_CONFIG: &str = include_str!("../.config/config.json5");
const DEFAULT_SCAN_COOLDOWN: Duration = Duration::from_secs(1);

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub config_dir: PathBuf,
}

#[derive(Clone, Copy, Debug, Deserialize, Default, PartialEq, Eq, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Firebase,
}

#[derive(Clone, Debug, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_root")]
    pub root: String,
    /// Database secret or ID token, appended as `auth` query parameter.
    #[serde(default)]
    pub auth: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            url: String::new(),
            root: default_root(),
            auth: None,
        }
    }
}

fn default_root() -> String {
    "progloveData".to_owned()
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default, flatten)]
    pub config: AppConfig,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub dishes: Vec<String>,
    #[serde(default)]
    pub scan_cooldown: String,
    #[serde(default)]
    pub store: StoreConfig,
}

lazy_static! {
    pub static ref PROJECT_NAME: String = env!("CARGO_CRATE_NAME").to_uppercase().to_string();
    pub static ref DATA_FOLDER: Option<PathBuf> =
        env::var(format!("{}_DATA", PROJECT_NAME.clone()))
            .ok()
            .map(PathBuf::from);
    pub static ref CONFIG_FOLDER: Option<PathBuf> =
        env::var(format!("{}_CONFIG", PROJECT_NAME.clone()))
            .ok()
            .map(PathBuf::from);
}

impl Config {
    pub fn new() -> Result<Self, config::ConfigError> {
        let data_dir = get_data_dir();
        let config_dir = get_config_dir();

        let mut builder = config::Config::builder()
            .set_default("data_dir", data_dir.to_string_lossy().to_string())?
            .set_default("config_dir", config_dir.to_string_lossy().to_string())?
            .add_source(File::from_str(DEFAULT_CONFIG, config::FileFormat::Json5));

        let config_files = [
            ("config.json5", config::FileFormat::Json5),
            ("config.json", config::FileFormat::Json),
            ("config.yaml", config::FileFormat::Yaml),
            ("config.toml", config::FileFormat::Toml),
        ];
        for (file, format) in &config_files {
            let source = config::File::from(config_dir.join(file))
                .format(*format)
                .required(false);
            builder = builder.add_source(source);
        }

        builder
            .add_source(Environment::with_prefix(&PROJECT_NAME).separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn scan_cooldown(&self) -> Duration {
        match humantime::parse_duration(&self.scan_cooldown) {
            Ok(duration) => duration,
            Err(err) => {
                warn!(
                    "Invalid scan_cooldown {:?} ({err}), using {DEFAULT_SCAN_COOLDOWN:?}",
                    self.scan_cooldown
                );
                DEFAULT_SCAN_COOLDOWN
            }
        }
    }

    pub fn export_dir(&self) -> PathBuf {
        self.config.data_dir.join("exports")
    }
}

pub fn get_data_dir() -> PathBuf {
    if let Some(s) = DATA_FOLDER.clone() {
        s
    } else if let Some(proj_dirs) = project_directory() {
        proj_dirs.data_local_dir().to_path_buf()
    } else {
        PathBuf::from(".").join(".data")
    }
}

pub fn get_config_dir() -> PathBuf {
    if let Some(s) = CONFIG_FOLDER.clone() {
        s
    } else if let Some(proj_dirs) = project_directory() {
        proj_dirs.config_local_dir().to_path_buf()
    } else {
        PathBuf::from(".").join(".config")
    }
}

fn project_directory() -> Option<ProjectDirs> {
    ProjectDirs::from("plus.lit", "", env!("CARGO_PKG_NAME"))
}
