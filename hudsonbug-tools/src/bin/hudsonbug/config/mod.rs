use figment::{
    providers::{Env, Format, Json, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// A struct which holds all configs.
#[derive(Debug, Clone)]
pub struct Configs {
    figment: Figment,
}

/// The main struct holding all the possible config options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub serial: Serial,
    pub upload: Upload,
}

/// The serial connection to the monitor.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Serial {
    pub port: Option<String>,
    pub baud: u32,
    pub timeout_ms: u64,
    pub echo: bool,
}

impl Serial {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Defaults of the `upload` command.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Upload {
    pub default_file: Option<PathBuf>,
    pub base_address: u32,
}

impl Configs {
    pub fn new(conf_dir: PathBuf) -> Configs {
        // Start off by merging in the default configuration file.
        let mut figments = Figment::new().merge(Toml::string(include_str!("default.toml")));

        // Project files first, personal overrides last.
        let config_files = ["hudsonbug", ".hudsonbug", "hudsonbug.local", ".hudsonbug.local"];

        for file in &config_files {
            figments = figments
                .merge(Toml::file(conf_dir.join(format!("{file}.toml"))))
                .merge(Json::file(conf_dir.join(format!("{file}.json"))))
                .merge(Yaml::file(conf_dir.join(format!("{file}.yaml"))))
                .merge(Yaml::file(conf_dir.join(format!("{file}.yml"))));
        }

        Configs { figment: figments }
    }

    pub fn merge(&mut self, conf_file: PathBuf) -> anyhow::Result<()> {
        let original = self.figment.clone();
        self.figment = match conf_file.extension().and_then(|e| e.to_str()) {
            Some("toml") => original.merge(Toml::file(conf_file)),
            Some("json") => original.merge(Json::file(conf_file)),
            Some("yml" | "yaml") => original.merge(Yaml::file(conf_file)),
            _ => {
                return Err(anyhow::anyhow!(
                    "File format not recognized from extension (supported: .toml, .json, .yaml / .yml)"
                ))
            }
        };
        Ok(())
    }

    /// Extracts the configuration. `HUDSONBUG_SERIAL__PORT` style variables override all files.
    pub fn extract(self) -> anyhow::Result<Config> {
        self.extract_with(Env::prefixed("HUDSONBUG_").split("__"))
    }

    fn extract_with(self, env: Env) -> anyhow::Result<Config> {
        let figment = self.figment.merge(env);

        figment.extract::<Config>().map_err(|figerr| {
            // Join all the figment errors into a multiline string.
            anyhow::anyhow!(
                "Failed to parse supplied configuration:\n{}",
                figerr
                    .into_iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("\n")
            )
        })
    }
}
