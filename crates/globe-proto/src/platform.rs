use std::path::PathBuf;

const APP_DIR: &str = "globe-radio";

/// Environment variable that points the daemon at an explicit config file.
pub const CONFIG_ENV: &str = "GLOBE_RADIO_CONFIG";

pub fn data_dir() -> PathBuf {
    // On macOS and Linux, use ~/.local/share/globe-radio/ (XDG standard)
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join(APP_DIR)
    }
    #[cfg(windows)]
    {
        // Kiosk installs ship a portable data directory beside the executable
        if let Some(dir) = beside_exe("data") {
            return dir;
        }

        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Some(path) = beside_exe("config.toml") {
            if let Some(dir) = path.parent() {
                return dir.to_path_buf();
            }
        }
    }

    // On macOS and Linux, always use ~/.config/globe-radio/
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join(APP_DIR)
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

#[cfg(windows)]
fn beside_exe(name: &str) -> Option<PathBuf> {
    let exe_path = std::env::current_exe().ok()?;
    let candidate = exe_path.parent()?.join(name);
    candidate.exists().then_some(candidate)
}
