pub mod error;
pub mod model;
pub mod parser;

pub use error::*;
pub use model::*;
pub use parser::*;

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 設定ファイルの環境変数
pub const CONFIG_PATH_ENV: &str = "MODELSHIP_CONFIG_PATH";

/// プロジェクトの設定ファイル名（優先順）
pub const SETTINGS_FILENAMES: &[&str] = &["modelship.local.kdl", "modelship.kdl"];

/// プロジェクト内の状態ディレクトリ
pub const STATE_DIR: &str = ".modelship";

/// modelshipのユーザー設定ディレクトリを取得
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("modelship");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// プロジェクトの modelship.kdl を探す
///
/// 以下の優先順位で設定ファイルを検索:
/// 1. 環境変数 MODELSHIP_CONFIG_PATH (直接パス指定)
/// 2. カレントディレクトリ: modelship.local.kdl, modelship.kdl
/// 3. ./.modelship/ ディレクトリ内: 同様の順序
/// 4. 親ディレクトリを上方向に探索
pub fn find_settings_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(&config_path);
        if path.exists() {
            info!(settings_path = %path.display(), "Found settings from environment variable");
            return Ok(path);
        }
        warn!(env_path = %config_path, "MODELSHIP_CONFIG_PATH is set but file does not exist");
    }

    let current_dir = std::env::current_dir()?;
    find_settings_from(&current_dir).ok_or(ConfigError::SettingsFileNotFound)
}

/// 指定ディレクトリから上方向に設定ファイルを探す
pub fn find_settings_from(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();
    debug!(start_dir = %start_dir.display(), "Searching for settings file");

    loop {
        for dir in [current.clone(), current.join(STATE_DIR)] {
            for filename in SETTINGS_FILENAMES {
                let path = dir.join(filename);
                if path.is_file() {
                    debug!(settings_path = %path.display(), "Found settings file");
                    return Some(path);
                }
            }
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// 設定ファイルのパスからプロジェクトルートを求める
///
/// `.modelship/` 内の設定ファイルならその親ディレクトリ。
pub fn project_root(settings_path: &Path) -> PathBuf {
    let dir = settings_path.parent().unwrap_or_else(|| Path::new("."));
    if dir.file_name().is_some_and(|name| name == STATE_DIR) {
        dir.parent().unwrap_or(dir).to_path_buf()
    } else {
        dir.to_path_buf()
    }
}

/// 設定ファイルを探して読み込む。`explicit` があればそれを使う。
pub fn load_settings(explicit: Option<&Path>) -> Result<(PathBuf, Settings)> {
    let path = match explicit {
        Some(path) if path.exists() => path.to_path_buf(),
        Some(_) => return Err(ConfigError::SettingsFileNotFound),
        None => find_settings_file()?,
    };
    let settings = parse_settings_file(&path)?;
    Ok((path, settings))
}
