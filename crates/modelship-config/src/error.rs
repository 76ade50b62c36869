use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定ディレクトリが見つかりません")]
    ConfigDirNotFound,

    #[error(
        "設定ファイルが見つかりません。以下の場所を確認してください:\n\
        - カレントディレクトリ: modelship.local.kdl, modelship.kdl\n\
        - ./.modelship/ ディレクトリ\n\
        - 親ディレクトリ\n\
        または MODELSHIP_CONFIG_PATH 環境変数で直接指定できます"
    )]
    SettingsFileNotFound,

    #[error("KDL パースエラー: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("必須項目がありません: {0}")]
    MissingField(String),

    #[error("不正な設定値: {0}")]
    InvalidValue(String),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
