use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "sparkcli.toml";
pub const DEFAULT_BASE_URL: &str = "https://api.ciscospark.com/v1";
pub const DEFAULT_REDIRECT_URI: &str = "http://files.ducbase.com/code.html";
pub const DEFAULT_SCOPE: &str = "spark:people_read spark:rooms_read spark:rooms_write \
spark:messages_read spark:messages_write spark:memberships_read spark:memberships_write";

const SYSTEM_CONFIG_DIR: &str = "/etc/sparkcli";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to encode config: {0}")]
    Encode(#[from] toml::ser::Error),
    #[error("No DefaultRoomId configured. Run `sparkcli rooms default <id>` first.")]
    NoDefaultRoom,
    #[error("`{0}` is not a room id and cannot be stored as DefaultRoomId")]
    InvalidDefaultRoom(String),
}

/// Credentials, tokens and preferences persisted between invocations.
///
/// Loaded once at startup and handed to [`crate::api::ApiClient`], which owns it
/// for the rest of the process. Token exchanges write it back to `path`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Config {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub auth_code: String,
    pub redirect_uri: String,
    pub scope: String,
    pub access_token: String,
    pub access_expires: f64,
    pub refresh_token: String,
    pub refresh_expires: f64,
    pub default_room_id: String,
    #[serde(skip)]
    path: PathBuf,
}

impl Config {
    /// Resolves the config file location: `SPARKCLI_CONFIG`, then the first
    /// existing `sparkcli.toml` in the working directory, `/etc/sparkcli` and
    /// the home directory. Falls back to a relative `sparkcli.toml`.
    pub fn locate() -> PathBuf {
        if let Ok(path) = env::var("SPARKCLI_CONFIG") {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }
        find_config_file(&search_dirs())
    }

    pub fn load(path: PathBuf) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "config file not found, using defaults");
                String::new()
            }
            Err(err) => return Err(ConfigError::Io(err)),
        };
        let mut config: Config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        config.apply_defaults();
        config.path = path;
        Ok(config)
    }

    /// Overwrites the whole file. The new contents are written next to the
    /// target and renamed over it so a crash never leaves a truncated file.
    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let payload = toml::to_string_pretty(self)?;
        let tmp_path = temp_path(&self.path);
        fs::write(&tmp_path, payload)?;
        set_file_permissions(&tmp_path, 0o600)?;
        fs::rename(&tmp_path, &self.path)?;
        debug!(path = %self.path.display(), "config saved");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_access_token(&self) -> bool {
        !self.access_token.trim().is_empty()
    }

    /// `None` and `-` both mean "the default room".
    pub fn resolve_room(&self, room_id: Option<&str>) -> Result<String, ConfigError> {
        match room_id.map(str::trim) {
            Some(id) if !id.is_empty() && id != "-" => Ok(id.to_string()),
            _ if !self.default_room_id.is_empty() => Ok(self.default_room_id.clone()),
            _ => Err(ConfigError::NoDefaultRoom),
        }
    }

    /// Rejects `-` and blank ids, which would otherwise resolve to themselves.
    pub fn set_default_room(&mut self, room_id: &str) -> Result<(), ConfigError> {
        let room_id = room_id.trim();
        if room_id.is_empty() || room_id == "-" {
            return Err(ConfigError::InvalidDefaultRoom(room_id.to_string()));
        }
        self.default_room_id = room_id.to_string();
        self.save()
    }

    fn apply_defaults(&mut self) {
        if self.base_url.is_empty() {
            self.base_url = DEFAULT_BASE_URL.to_string();
        }
        if self.redirect_uri.is_empty() {
            self.redirect_uri = DEFAULT_REDIRECT_URI.to_string();
        }
        if self.scope.is_empty() {
            self.scope = DEFAULT_SCOPE.to_string();
        }
    }
}

fn search_dirs() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        candidates.push(cwd);
    }
    candidates.push(PathBuf::from(SYSTEM_CONFIG_DIR));
    if let Some(home) = dirs::home_dir() {
        candidates.push(home);
    }
    candidates
}

fn find_config_file(dirs: &[PathBuf]) -> PathBuf {
    dirs.iter()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find(|path| path.is_file())
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| CONFIG_FILE_NAME.into());
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(unix)]
fn set_file_permissions(path: &Path, mode: u32) -> Result<(), io::Error> {
    use std::os::unix::fs::PermissionsExt;
    let perm = fs::Permissions::from_mode(mode);
    fs::set_permissions(path, perm)
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path, _mode: u32) -> Result<(), io::Error> {
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_config(path: PathBuf, base_url: &str) -> Config {
    Config {
        base_url: base_url.to_string(),
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
        auth_code: "auth-code".to_string(),
        redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
        scope: DEFAULT_SCOPE.to_string(),
        path,
        ..Config::default()
    }
}
