use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use todoverse_core::{SortDirection, SortKey, StatusFilter, ViewParams};
use tracing::debug;

/// Environment variable pointing at an explicit configuration file.
pub const ENV_CONFIG: &str = "TODOVERSE_CONFIG";

const APP_DIR: &str = "todoverse";
const CONFIG_FILE: &str = "config.toml";

/// User configuration loaded from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Where the collection is persisted.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Default list presentation.
    #[serde(default)]
    pub view: ViewConfig,
}

/// `[storage]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory holding `todos.json`. Defaults to the platform data directory.
    pub dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the storage directory.
    ///
    /// # Errors
    /// Returns an error when no directory is configured and the platform has no data dir.
    pub fn resolve_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.dir {
            return Ok(dir.clone());
        }
        dirs::data_dir()
            .map(|base| base.join(APP_DIR))
            .ok_or_else(|| anyhow!("no data directory available; set [storage] dir"))
    }
}

/// `[view]` section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ViewConfig {
    /// Completion filter applied by default.
    #[serde(default)]
    pub filter: StatusFilter,
    /// Default sort key.
    #[serde(default)]
    pub sort: SortKey,
    /// Default sort direction.
    #[serde(default)]
    pub direction: SortDirection,
}

impl ViewConfig {
    /// View parameters seeded from this section, with no search or tag selection.
    #[must_use]
    pub fn to_params(self) -> ViewParams {
        ViewParams::default()
            .with_status(self.filter)
            .with_sort(self.sort, self.direction)
    }
}

impl AppConfig {
    /// Load configuration using the standard lookup order:
    /// explicit path, then `$TODOVERSE_CONFIG`, then the platform config directory.
    ///
    /// A missing file in the platform directory yields defaults; an explicitly named file
    /// must exist.
    ///
    /// # Errors
    /// Returns an error when a file cannot be read or parsed.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut fetch = |key: &'static str| env::var(key).ok();
        Self::load_with(explicit, &mut fetch, dirs::config_dir())
    }

    fn load_with(
        explicit: Option<&Path>,
        fetch: &mut impl FnMut(&'static str) -> Option<String>,
        config_dir: Option<PathBuf>,
    ) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Some(path) = fetch(ENV_CONFIG).filter(|value| !value.trim().is_empty()) {
            return Self::from_file(Path::new(&path));
        }
        match config_dir.map(|dir| dir.join(APP_DIR).join(CONFIG_FILE)) {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Parse a specific configuration file.
    ///
    /// # Errors
    /// Returns an error when the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!(file = %path.display(), "loading configuration");
        let contents =
            fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap_or_else(|err| panic!("mkdir: {err}"));
        }
        fs::write(&path, contents).unwrap_or_else(|err| panic!("write config: {err}"));
        path
    }

    #[test]
    fn parses_all_sections() -> Result<()> {
        let config: AppConfig = toml::from_str(
            r#"
            [storage]
            dir = "/tmp/todos"

            [view]
            filter = "active"
            sort = "dueDate"
            direction = "asc"
            "#,
        )?;
        assert_eq!(config.storage.dir, Some(PathBuf::from("/tmp/todos")));
        assert_eq!(config.view.filter, StatusFilter::Active);
        assert_eq!(config.view.sort, SortKey::DueDate);
        assert_eq!(config.view.direction, SortDirection::Ascending);

        let params = config.view.to_params();
        assert_eq!(params.status, StatusFilter::Active);
        assert_eq!(params.sort, SortKey::DueDate);
        assert!(params.search.is_empty());
        Ok(())
    }

    #[test]
    fn empty_file_yields_defaults() -> Result<()> {
        let config: AppConfig = toml::from_str("")?;
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.view.sort, SortKey::CreatedAt);
        assert_eq!(config.view.direction, SortDirection::Descending);
        Ok(())
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(toml::from_str::<AppConfig>("[view]\ncolor = \"red\"").is_err());
    }

    #[test]
    fn explicit_path_wins_over_env_and_platform_dir() -> Result<()> {
        let dir = tempdir()?;
        let explicit = write(dir.path(), "explicit.toml", "[view]\nfilter = \"completed\"");
        let from_env = write(dir.path(), "env.toml", "[view]\nfilter = \"active\"");
        write(dir.path(), "todoverse/config.toml", "[view]\nsort = \"title\"");

        let env_value = from_env.display().to_string();
        let mut fetch = |key: &'static str| (key == ENV_CONFIG).then(|| env_value.clone());

        let config = AppConfig::load_with(Some(explicit.as_path()), &mut fetch, Some(dir.path().to_path_buf()))?;
        assert_eq!(config.view.filter, StatusFilter::Completed);

        let config = AppConfig::load_with(None, &mut fetch, Some(dir.path().to_path_buf()))?;
        assert_eq!(config.view.filter, StatusFilter::Active);

        let mut no_env = |_: &'static str| None::<String>;
        let config = AppConfig::load_with(None, &mut no_env, Some(dir.path().to_path_buf()))?;
        assert_eq!(config.view.sort, SortKey::Title);
        Ok(())
    }

    #[test]
    fn missing_platform_file_yields_defaults() -> Result<()> {
        let dir = tempdir()?;
        let mut no_env = |_: &'static str| None::<String>;
        let config = AppConfig::load_with(None, &mut no_env, Some(dir.path().to_path_buf()))?;
        assert_eq!(config, AppConfig::default());
        Ok(())
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let mut no_env = |_: &'static str| None::<String>;
        let result = AppConfig::load_with(Some(Path::new("/nonexistent/todoverse.toml")), &mut no_env, None);
        assert!(result.is_err());
    }

    #[test]
    fn storage_dir_prefers_configured_value() -> Result<()> {
        let config = StorageConfig {
            dir: Some(PathBuf::from("/srv/todos")),
        };
        assert_eq!(config.resolve_dir()?, PathBuf::from("/srv/todos"));
        Ok(())
    }
}
