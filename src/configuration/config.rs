#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

use std::collections::HashMap;
use std::env;
use std::path;

use clap::ArgMatches;
use clap::Command;
use strum::EnumIter;
use strum::EnumVariantNames;
use strum::IntoEnumIterator;
use tokio::fs;

use crate::domain::models::BackendName;
use crate::domain::models::ConfigError;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, EnumIter, EnumVariantNames, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ConfigKey {
    Backend,
    BackendHealthCheckTimeout,
    ConfigFile,
    DatabasePoolSize,
    DatabaseURL,
    MaxContextMessages,
    Model,
    OllamaURL,
    OpenaiToken,
    OpenaiURL,
    SessionID,
    SystemPrompt,
    Temperature,
    Username,
}

impl ConfigKey {
    pub fn env_var(&self) -> String {
        return format!(
            "PARLEY_{}",
            self.to_string().to_uppercase().replace('-', "_")
        );
    }
}

fn app_dir(base: Option<path::PathBuf>) -> path::PathBuf {
    return base
        .unwrap_or_else(|| return path::PathBuf::from("."))
        .join("parley");
}

pub fn cache_dir() -> path::PathBuf {
    return app_dir(dirs::cache_dir());
}

/// Settings for a single run, layered from defaults, the config file, then
/// environment variables and flags. Built once at startup and passed down
/// by reference.
#[derive(Clone, Debug)]
pub struct Config {
    values: HashMap<ConfigKey, String>,
}

impl Config {
    pub fn get(&self, key: ConfigKey) -> String {
        if let Some(val) = self.values.get(&key) {
            return val.to_string();
        }

        return "".to_string();
    }

    pub fn set(&mut self, key: ConfigKey, value: &str) {
        self.values.insert(key, value.to_string());
    }

    pub fn default(key: ConfigKey) -> String {
        if key == ConfigKey::Username {
            let mut user = env::var("USER").unwrap_or_else(|_| return "".to_string());
            if user.is_empty() {
                user = "User".to_string();
            }

            return user;
        }

        let default_backend = BackendName::OpenAI.to_string();
        let config_path = app_dir(dirs::config_dir()).join("config.toml");
        let database_url = format!(
            "sqlite://{}",
            app_dir(dirs::data_dir()).join("parley.db").to_string_lossy()
        );

        let res = match key {
            ConfigKey::Backend => &default_backend,
            ConfigKey::BackendHealthCheckTimeout => "1000",
            ConfigKey::DatabasePoolSize => "5",
            ConfigKey::DatabaseURL => &database_url,
            ConfigKey::MaxContextMessages => "0",
            ConfigKey::Model => "gpt-3.5-turbo",
            ConfigKey::OllamaURL => "http://localhost:11434",
            ConfigKey::OpenaiToken => "",
            ConfigKey::OpenaiURL => "https://api.openai.com",
            ConfigKey::SystemPrompt => "",
            ConfigKey::Temperature => "0.7",

            // Special
            ConfigKey::ConfigFile => return config_path.to_string_lossy().to_string(),
            ConfigKey::SessionID => "",
            ConfigKey::Username => "",
        };

        return res.to_string();
    }

    pub fn with_defaults() -> Config {
        let mut config = Config {
            values: HashMap::new(),
        };
        for key in ConfigKey::iter() {
            config.set(key, &Config::default(key));
        }

        return config;
    }

    pub async fn load(cmd: Command, clap_arg_matches: Vec<&ArgMatches>) -> Result<Config, ConfigError> {
        let mut config = Config::with_defaults();

        let mut config_file = Config::default(ConfigKey::ConfigFile);
        let mut explicit_config_file = false;
        for matches in clap_arg_matches.as_slice() {
            if let Ok(Some(arg_config_file)) =
                matches.try_get_one::<String>(&ConfigKey::ConfigFile.to_string())
            {
                config_file = arg_config_file.to_string();
                explicit_config_file = true;
            }
        }

        let config_path = path::PathBuf::from(&config_file);
        if config_path.exists() {
            let toml_str =
                fs::read_to_string(&config_path)
                    .await
                    .map_err(|err| {
                        return ConfigError::Read {
                            path: config_file.to_string(),
                            source: err,
                        };
                    })?;
            let doc = toml_str
                .parse::<toml_edit::Document>()
                .map_err(|err| {
                    return ConfigError::Malformed {
                        path: config_file.to_string(),
                        reason: err.to_string(),
                    };
                })?;

            for key in ConfigKey::iter() {
                if let Some(val) = doc.get(&key.to_string()) {
                    // Use clap value parsers to do validation.
                    let mut possible_values = vec![];
                    if let Some(arg) = cmd
                        .get_arguments()
                        .find(|e| return e.get_long() == Some(key.to_string().as_str()))
                    {
                        possible_values = arg
                            .get_possible_values()
                            .iter()
                            .map(|e| return e.get_name().to_string())
                            .collect::<Vec<String>>();
                    }

                    if let Some(val_int) = val.as_integer() {
                        config.set(key, &val_int.to_string());
                    } else if let Some(val_float) = val.as_float() {
                        config.set(key, &val_float.to_string());
                    } else if let Some(val_str) = val.as_str() {
                        if val_str.is_empty() {
                            continue;
                        }
                        if !possible_values.is_empty()
                            && !possible_values.contains(&val_str.to_string())
                        {
                            return Err(ConfigError::InvalidValue {
                                key: key.to_string(),
                                value: val_str.to_string(),
                                reason: format!(
                                    "Possible values are: {}",
                                    possible_values.join(", ")
                                ),
                            });
                        }
                        config.set(key, val_str);
                    } else {
                        return Err(ConfigError::InvalidValue {
                            key: key.to_string(),
                            value: val.to_string().trim().to_string(),
                            reason: "Expected a string or a number.".to_string(),
                        });
                    }
                }
            }
        } else if explicit_config_file {
            return Err(ConfigError::NotFound(config_file));
        }

        for key in ConfigKey::iter() {
            for matches in clap_arg_matches.as_slice() {
                if let Ok(Some(val)) = matches.try_get_one::<String>(&key.to_string()) {
                    if val.is_empty() {
                        continue;
                    }
                    config.set(key, val)
                }
            }
        }

        config.validate()?;

        tracing::debug!(
            username = config.get(ConfigKey::Username),
            backend = config.get(ConfigKey::Backend),
            model = config.get(ConfigKey::Model),
            temperature = config.get(ConfigKey::Temperature),
            database_url = config.get(ConfigKey::DatabaseURL),
            database_pool_size = config.get(ConfigKey::DatabasePoolSize),
            max_context_messages = config.get(ConfigKey::MaxContextMessages),
            "config"
        );

        return Ok(config);
    }

    fn invalid(&self, key: ConfigKey, reason: &str) -> ConfigError {
        return ConfigError::InvalidValue {
            key: key.to_string(),
            value: self.get(key),
            reason: reason.to_string(),
        };
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.backend()?;
        self.backend_health_check_timeout()?;
        self.database_pool_size()?;
        self.max_context_messages()?;
        self.temperature()?;

        if self.get(ConfigKey::DatabaseURL).trim().is_empty() {
            return Err(self.invalid(ConfigKey::DatabaseURL, "A database URL is required."));
        }
        if self.get(ConfigKey::Model).trim().is_empty() {
            return Err(self.invalid(ConfigKey::Model, "A model name is required."));
        }

        return Ok(());
    }

    pub fn backend(&self) -> Result<BackendName, ConfigError> {
        return BackendName::parse(&self.get(ConfigKey::Backend)).ok_or_else(|| {
            return self.invalid(ConfigKey::Backend, "Possible values are: openai, ollama");
        });
    }

    pub fn backend_health_check_timeout(&self) -> Result<u64, ConfigError> {
        return self
            .get(ConfigKey::BackendHealthCheckTimeout)
            .parse::<u64>()
            .map_err(|_| {
                return self.invalid(
                    ConfigKey::BackendHealthCheckTimeout,
                    "Expected a number of milliseconds.",
                );
            });
    }

    pub fn database_pool_size(&self) -> Result<u32, ConfigError> {
        let size = self
            .get(ConfigKey::DatabasePoolSize)
            .parse::<u32>()
            .unwrap_or(0);
        if size == 0 {
            return Err(self.invalid(
                ConfigKey::DatabasePoolSize,
                "Expected a whole number of at least 1.",
            ));
        }

        return Ok(size);
    }

    /// `0` means the whole transcript is sent every turn.
    pub fn max_context_messages(&self) -> Result<usize, ConfigError> {
        return self
            .get(ConfigKey::MaxContextMessages)
            .parse::<usize>()
            .map_err(|_| {
                return self.invalid(
                    ConfigKey::MaxContextMessages,
                    "Expected a whole number, use 0 to send the whole transcript.",
                );
            });
    }

    pub fn temperature(&self) -> Result<f32, ConfigError> {
        let reason = "Expected a number between 0.0 and 2.0.";
        let temperature = self
            .get(ConfigKey::Temperature)
            .parse::<f32>()
            .map_err(|_| return self.invalid(ConfigKey::Temperature, reason))?;

        if !(0.0..=2.0).contains(&temperature) {
            return Err(self.invalid(ConfigKey::Temperature, reason));
        }

        return Ok(temperature);
    }

    pub fn serialize_default(cmd: Command) -> String {
        let toml_str = ConfigKey::iter()
            .filter_map(|key| {
                if key == ConfigKey::SessionID || key == ConfigKey::ConfigFile {
                    return None;
                }

                if key == ConfigKey::Username {
                    return Some(
                        "# Your user name displayed above your messages.\n# username = \"\""
                            .to_string(),
                    );
                }

                let arg = cmd
                    .get_arguments()
                    .find(|e| return e.get_long() == Some(key.to_string().as_str()))?;

                let mut description = arg
                    .get_help()
                    .map(|help| return help.to_string())
                    .unwrap_or_default()
                    .split("[default:")
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_string();

                if !arg.get_possible_values().is_empty() {
                    let possible_values = arg
                        .get_possible_values()
                        .iter()
                        .map(|e| return e.get_name().to_string())
                        .collect::<Vec<_>>()
                        .join(", ");
                    description = format!("{description} [possible values: {possible_values}]");
                }

                let mut val = Config::default(key);
                if val.is_empty() {
                    val = format!("# {key} = \"\"");
                } else if val.parse::<i64>().is_ok() || val.parse::<f64>().is_ok() {
                    val = format!("{key} = {val}");
                } else {
                    val = format!("{key} = \"{val}\"");
                }

                return Some(format!("# {description}\n{val}"));
            })
            .collect::<Vec<String>>()
            .join("\n\n");

        return toml_str;
    }
}
