use directories::ProjectDirs;
use std::path::PathBuf;

/// Overrides the config file location.
pub const CONFIG_ENV: &str = "SHELLGATE_CONFIG";
/// Overrides the log directory; an empty value disables file logging.
pub const LOG_DIR_ENV: &str = "SHELLGATE_LOG_DIR";

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("dev", "shellgate", "shellgate")
        .map(|proj_dirs| proj_dirs.config_dir().to_path_buf())
}

/// Path of the server config file, honoring `SHELLGATE_CONFIG`.
pub fn config_file() -> Option<PathBuf> {
    if let Some(raw) = non_empty_env(CONFIG_ENV) {
        return Some(PathBuf::from(raw));
    }
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Default location of the host inventory
pub fn hosts_file() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("hosts.toml"))
}

/// Get the log directory path
pub fn log_dir() -> Option<PathBuf> {
    if let Ok(raw) = std::env::var(LOG_DIR_ENV) {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        return Some(PathBuf::from(trimmed));
    }

    config_dir().map(|d| d.join("logs"))
}

/// Ensure the log directory exists with owner-only permissions
pub fn ensure_log_dir() -> std::io::Result<PathBuf> {
    let dir = log_dir().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not determine log directory",
        )
    })?;

    ensure_private_dir(&dir)?;
    Ok(dir)
}

fn ensure_private_dir(dir: &std::path::Path) -> std::io::Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
        }
    }
    Ok(())
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_dir_returns_some() {
        assert!(config_dir().is_some());
    }

    #[test]
    fn hosts_file_is_toml_in_config_dir() {
        let path = hosts_file().unwrap();
        assert!(path.starts_with(config_dir().unwrap()));
        assert!(path.to_string_lossy().ends_with("hosts.toml"));
    }

    #[test]
    fn private_dir_created_with_owner_only_mode() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("a").join("logs");
        ensure_private_dir(&dir).unwrap();
        assert!(dir.is_dir());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&dir).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o700);
        }
    }
}
