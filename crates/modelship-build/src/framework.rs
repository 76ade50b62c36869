//! モデルフレームワークの定義
//!
//! フレームワークごとに、成果物の拡張子・依存パッケージ・読み込みと推論の
//! Python コード片を持つ。

use crate::error::{BuildError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

const BASE_REQUIREMENTS: &[&str] = &["fastapi", "mangum", "pydantic", "boto3"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFramework {
    Sklearn,
    Pytorch,
    Tensorflow,
    Xgboost,
}

impl ModelFramework {
    pub const ALL: [ModelFramework; 4] = [
        ModelFramework::Sklearn,
        ModelFramework::Pytorch,
        ModelFramework::Tensorflow,
        ModelFramework::Xgboost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFramework::Sklearn => "sklearn",
            ModelFramework::Pytorch => "pytorch",
            ModelFramework::Tensorflow => "tensorflow",
            ModelFramework::Xgboost => "xgboost",
        }
    }

    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            ModelFramework::Sklearn => &["pkl", "joblib"],
            ModelFramework::Pytorch => &["pt", "pth"],
            ModelFramework::Tensorflow => &["h5", "keras"],
            ModelFramework::Xgboost => &["json", "ubj", "bst"],
        }
    }

    /// 拡張子から推定する
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .ok_or_else(|| BuildError::UnknownArtifact(path.to_path_buf()))?;

        Self::ALL
            .into_iter()
            .find(|fw| fw.extensions().contains(&ext.as_str()))
            .ok_or_else(|| BuildError::UnknownArtifact(path.to_path_buf()))
    }

    /// 明示指定があればそれを、なければ拡張子から
    pub fn resolve(explicit: Option<&str>, path: &Path) -> Result<Self> {
        match explicit {
            Some(name) => name.parse(),
            None => Self::from_path(path),
        }
    }

    pub fn requirements(&self) -> Vec<&'static str> {
        let extra: &[&str] = match self {
            ModelFramework::Sklearn => &["scikit-learn", "joblib", "numpy"],
            ModelFramework::Pytorch => &["torch", "numpy"],
            ModelFramework::Tensorflow => &["tensorflow-cpu", "numpy"],
            ModelFramework::Xgboost => &["xgboost", "numpy"],
        };
        BASE_REQUIREMENTS.iter().chain(extra).copied().collect()
    }

    /// `load_model()` 内で `_model` を組み立てる Python 文
    pub(crate) fn loader(&self) -> &'static [&'static str] {
        match self {
            ModelFramework::Sklearn => &["import joblib", "_model = joblib.load(_download())"],
            ModelFramework::Pytorch => &[
                "import torch",
                "_model = torch.load(_download(), map_location=\"cpu\", weights_only=False)",
                "_model.eval()",
            ],
            ModelFramework::Tensorflow => &[
                "from tensorflow.keras.models import load_model as load_keras_model",
                "_model = load_keras_model(_download())",
            ],
            ModelFramework::Xgboost => &[
                "import xgboost",
                "_model = xgboost.Booster()",
                "_model.load_model(_download())",
            ],
        }
    }

    /// `predict(model, data)` の本体
    pub(crate) fn predictor(&self) -> &'static [&'static str] {
        match self {
            ModelFramework::Sklearn => &["return model.predict(data).tolist()"],
            ModelFramework::Pytorch => &[
                "import torch",
                "with torch.no_grad():",
                "    output = model(torch.tensor(data, dtype=torch.float32))",
                "return output.tolist()",
            ],
            ModelFramework::Tensorflow => &[
                "import numpy as np",
                "return model.predict(np.array(data)).tolist()",
            ],
            ModelFramework::Xgboost => &[
                "import numpy as np",
                "import xgboost",
                "return model.predict(xgboost.DMatrix(np.array(data))).tolist()",
            ],
        }
    }
}

impl fmt::Display for ModelFramework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ModelFramework {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sklearn" | "scikit-learn" => Ok(ModelFramework::Sklearn),
            "pytorch" | "torch" => Ok(ModelFramework::Pytorch),
            "tensorflow" | "keras" => Ok(ModelFramework::Tensorflow),
            "xgboost" => Ok(ModelFramework::Xgboost),
            _ => Err(BuildError::UnsupportedFramework(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("SKLearn".parse::<ModelFramework>().unwrap(), ModelFramework::Sklearn);
        assert_eq!("PyTorch".parse::<ModelFramework>().unwrap(), ModelFramework::Pytorch);
        assert!(matches!(
            "caffe".parse::<ModelFramework>(),
            Err(BuildError::UnsupportedFramework(_))
        ));
    }

    #[test]
    fn test_infer_from_extension() {
        let cases = [
            ("model.pkl", ModelFramework::Sklearn),
            ("model.JOBLIB", ModelFramework::Sklearn),
            ("weights.pth", ModelFramework::Pytorch),
            ("net.keras", ModelFramework::Tensorflow),
            ("booster.ubj", ModelFramework::Xgboost),
        ];
        for (file, expected) in cases {
            assert_eq!(ModelFramework::from_path(Path::new(file)).unwrap(), expected);
        }

        assert!(matches!(
            ModelFramework::from_path(Path::new("model.onnx")),
            Err(BuildError::UnknownArtifact(_))
        ));
        assert!(ModelFramework::from_path(Path::new("model")).is_err());
    }

    #[test]
    fn test_explicit_framework_wins() {
        let path = PathBuf::from("model.json");
        assert_eq!(
            ModelFramework::resolve(Some("tensorflow"), &path).unwrap(),
            ModelFramework::Tensorflow
        );
        assert_eq!(ModelFramework::resolve(None, &path).unwrap(), ModelFramework::Xgboost);
    }

    #[test]
    fn test_requirements_include_base() {
        for fw in ModelFramework::ALL {
            let reqs = fw.requirements();
            assert!(reqs.contains(&"fastapi"));
            assert!(reqs.contains(&"mangum"));
        }
        assert!(ModelFramework::Sklearn.requirements().contains(&"scikit-learn"));
        assert!(ModelFramework::Pytorch.requirements().contains(&"torch"));
    }
}
