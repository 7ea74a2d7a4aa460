//! Settings resolution for fmgctl

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fmg_client::ClientSettings;

/// Resolve client settings.
///
/// An explicit `--config` file wins, then the default config file if it
/// exists, then the `FORTIMANAGER_*` environment variables.
pub fn load_settings(path: Option<&Path>) -> Result<ClientSettings> {
    if let Some(path) = path {
        return ClientSettings::from_file(path)
            .with_context(|| format!("Failed to load config file: {}", path.display()));
    }

    if let Some(default) = config_path().filter(|p| p.exists()) {
        return ClientSettings::from_file(&default)
            .with_context(|| format!("Failed to load config file: {}", default.display()));
    }

    ClientSettings::from_env()
        .context("No config file found and FORTIMANAGER_* environment settings are incomplete")
}

/// Default config file location
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("fmgctl").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_explicit_file_wins() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "connection:\n  host: fmg.lab.local\ncredentials:\n  mode: token\n  token: abc"
        )
        .unwrap();

        let settings = load_settings(Some(file.path())).unwrap();
        assert_eq!(settings.connection.host, "fmg.lab.local");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let err = load_settings(Some(Path::new("/nonexistent/fmgctl.yaml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to load config file"));
    }

    #[test]
    fn test_default_path_location() {
        if let Some(path) = config_path() {
            assert!(path.ends_with("fmgctl/config.yaml"));
        }
    }
}
