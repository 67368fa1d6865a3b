use std::path::PathBuf;

const DATA_DIR_NAME: &str = ".architect";

/// `~/.architect`, or `None` when the home directory is unknown
pub fn default_data_dir() -> Option<PathBuf> {
    home::home_dir()
        .filter(|home| !home.as_os_str().is_empty())
        .map(|home| home.join(DATA_DIR_NAME))
}
