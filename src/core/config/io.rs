use crate::core::config::data::{home_relative, Config};
use directories::ProjectDirs;
use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Why `config.toml` could not be turned into a [`Config`].
#[derive(Debug)]
pub enum ConfigError {
    /// The file exists but could not be read.
    Unreadable(PathBuf, io::Error),
    /// The file is not TOML, or a field has the wrong type.
    Invalid(PathBuf, toml::de::Error),
}

impl ConfigError {
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Unreadable(path, _) | ConfigError::Invalid(path, _) => path,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = home_relative(self.path());
        match self {
            ConfigError::Unreadable(_, err) => write!(f, "cannot open {path}: {err}"),
            ConfigError::Invalid(_, err) => {
                write!(f, "{path} is not a valid super-okai config: {err}")
            }
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Unreadable(_, err) => Some(err),
            ConfigError::Invalid(_, err) => Some(err),
        }
    }
}

impl Config {
    /// Loads the config from `config_path`; a missing file yields defaults.
    pub fn load_from_path(config_path: &Path) -> Result<Config, ConfigError> {
        if !config_path.exists() {
            return Ok(Config::default());
        }
        let contents = fs::read_to_string(config_path)
            .map_err(|err| ConfigError::Unreadable(config_path.to_path_buf(), err))?;
        toml::from_str(&contents)
            .map_err(|err| ConfigError::Invalid(config_path.to_path_buf(), err))
    }

    /// Writes the config atomically through a temp file in the same directory.
    pub fn save_to_path(&self, config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let parent = config_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty());

        if let Some(dir) = parent {
            fs::create_dir_all(dir)?;
        }

        let contents = toml::to_string_pretty(self)?;
        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir)?,
            None => NamedTempFile::new()?,
        };

        temp_file.write_all(contents.as_bytes())?;
        temp_file.as_file_mut().sync_all()?;
        temp_file
            .persist(config_path)
            .map_err(|err| -> Box<dyn std::error::Error> { Box::new(err) })?;
        Ok(())
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("org", "superokai", "super-okai")
    }

    /// Platform config file location, relative to the working directory when
    /// no home directory can be determined.
    pub fn default_config_path() -> PathBuf {
        match Self::project_dirs() {
            Some(dirs) => dirs.config_dir().join("config.toml"),
            None => PathBuf::from("super-okai.toml"),
        }
    }

    pub fn default_storage_dir() -> PathBuf {
        match Self::project_dirs() {
            Some(dirs) => dirs.data_dir().join("storage"),
            None => PathBuf::from("super-okai-storage"),
        }
    }
}
