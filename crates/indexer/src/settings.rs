//! Runtime settings, built once at startup and shared read-only.

use crate::error::{IndexerError, Result};
use std::env;
use std::path::{Path, PathBuf};

pub const DEFAULT_DATABASE_URI: &str = ".lancedb";
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";
pub const DEFAULT_IGNORE_PATTERNS: &str = ".*,*.db,*.sqlite,*.log,node_modules/*,venv/*,.git/*";

#[derive(Debug, Clone)]
pub struct Settings {
    /// Canonicalized project root.
    pub project_root: PathBuf,
    /// Vector-store location. Read from `LANCEDB_URI` (the key name is kept
    /// for compatibility with existing deployments); relative values join
    /// the project root.
    pub database_uri: PathBuf,
    pub embedding_model_name: String,
    pub ignore_patterns: Vec<String>,
    pub log_level: String,
    /// Bind address for an HTTP transport; unused by the stdio server.
    pub host: String,
    pub port: u16,
}

impl Settings {
    /// Build settings from the environment for the given project path.
    pub fn from_env(project_path: &Path) -> Result<Self> {
        Self::from_lookup(project_path, |key| env::var(key).ok())
    }

    fn from_lookup(
        project_path: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let project_root = project_path.canonicalize().map_err(|err| {
            IndexerError::Config(format!(
                "project path {} is not accessible: {err}",
                project_path.display()
            ))
        })?;
        if !project_root.is_dir() {
            return Err(IndexerError::Config(format!(
                "project path {} is not a directory",
                project_root.display()
            )));
        }

        let database_uri = {
            let raw = lookup("LANCEDB_URI")
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_DATABASE_URI.to_string());
            let candidate = PathBuf::from(raw);
            if candidate.is_absolute() {
                candidate
            } else {
                project_root.join(candidate)
            }
        };

        let embedding_model_name = lookup("EMBEDDING_MODEL_NAME")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string());

        let ignore_patterns = parse_patterns(
            &lookup("IGNORE_PATTERNS").unwrap_or_else(|| DEFAULT_IGNORE_PATTERNS.to_string()),
        );

        let log_level = normalize_log_level(lookup("LOG_LEVEL").as_deref().unwrap_or("INFO"))?;

        let host = lookup("HOST")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        let port = match lookup("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| IndexerError::Config(format!("invalid PORT value '{raw}'")))?,
            None => 8000,
        };

        Ok(Self {
            project_root,
            database_uri,
            embedding_model_name,
            ignore_patterns,
            log_level,
            host,
            port,
        })
    }
}

fn parse_patterns(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|pattern| !pattern.is_empty())
        .map(str::to_string)
        .collect()
}

fn normalize_log_level(raw: &str) -> Result<String> {
    let level = raw.trim().to_ascii_uppercase();
    match level.as_str() {
        "DEBUG" | "INFO" | "WARN" | "ERROR" => Ok(level),
        _ => Err(IndexerError::Config(format!(
            "unsupported LOG_LEVEL '{raw}' (expected DEBUG, INFO, WARN, or ERROR)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn build(root: &Path, vars: &[(&str, &str)]) -> Result<Settings> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Settings::from_lookup(root, |key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let dir = TempDir::new().unwrap();
        let settings = build(dir.path(), &[]).unwrap();

        let root = dir.path().canonicalize().unwrap();
        assert_eq!(settings.project_root, root);
        assert_eq!(settings.database_uri, root.join(".lancedb"));
        assert_eq!(settings.embedding_model_name, "all-MiniLM-L6-v2");
        assert_eq!(settings.log_level, "INFO");
        assert_eq!(settings.host, "0.0.0.0");
        assert_eq!(settings.port, 8000);
        assert!(settings.ignore_patterns.contains(&".*".to_string()));
        assert!(settings.ignore_patterns.contains(&"node_modules/*".to_string()));
    }

    #[test]
    fn relative_database_uri_joins_project_root() {
        let dir = TempDir::new().unwrap();
        let settings = build(dir.path(), &[("LANCEDB_URI", "state/index.db")]).unwrap();
        assert_eq!(
            settings.database_uri,
            dir.path().canonicalize().unwrap().join("state/index.db")
        );
    }

    #[test]
    fn absolute_database_uri_is_used_verbatim() {
        let dir = TempDir::new().unwrap();
        let settings = build(dir.path(), &[("LANCEDB_URI", "/var/tmp/index.db")]).unwrap();
        assert_eq!(settings.database_uri, PathBuf::from("/var/tmp/index.db"));
    }

    #[test]
    fn ignore_patterns_split_and_trim() {
        let dir = TempDir::new().unwrap();
        let settings = build(dir.path(), &[("IGNORE_PATTERNS", " *.log , build/* ,,")]).unwrap();
        assert_eq!(settings.ignore_patterns, vec!["*.log", "build/*"]);
    }

    #[test]
    fn log_level_is_validated() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            build(dir.path(), &[("LOG_LEVEL", "debug")]).unwrap().log_level,
            "DEBUG"
        );
        assert!(build(dir.path(), &[("LOG_LEVEL", "verbose")]).is_err());
    }

    #[test]
    fn missing_project_path_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            build(&missing, &[]),
            Err(IndexerError::Config(_))
        ));
    }

    #[test]
    fn invalid_port_is_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(build(dir.path(), &[("PORT", "eighty")]).is_err());
    }
}
