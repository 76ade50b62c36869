use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Unsupported model framework: {0}")]
    UnsupportedFramework(String),

    #[error("Cannot infer model framework from: {0}")]
    UnknownArtifact(PathBuf),

    #[error("Invalid service definition: {0}")]
    InvalidSpec(String),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// ユーザー向けの分かりやすいエラーメッセージ
    pub fn user_message(&self) -> String {
        match self {
            BuildError::UnsupportedFramework(name) => {
                format!(
                    "未対応のフレームワークです: {}\n\
                     \n\
                     sklearn / pytorch / tensorflow / xgboost のいずれかを\n\
                     modelship.kdl の model ノードで指定してください:\n\
                        model \"model.pkl\" framework=\"sklearn\"",
                    name
                )
            }
            BuildError::UnknownArtifact(path) => {
                format!(
                    "モデルファイルの拡張子からフレームワークを判別できません: {}\n\
                     \n\
                     modelship.kdl で framework を明示してください。",
                    path.display()
                )
            }
            _ => format!("{}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;
