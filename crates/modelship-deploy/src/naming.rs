//! リソース名とオブジェクトキーの決定
//!
//! グローバルに一意である必要がある名前は、プロジェクト名から作った slug と
//! 1回の実行につき1度だけ生成するランダムな suffix から組み立てる。

use crate::error::{DeployError, Result};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;

const SLUG_MAX_LEN: usize = 40;
const SUFFIX_LEN: usize = 6;

/// プロジェクト名から空白・ドット・数字・記号を除いたもの（大文字小文字は保持）
pub fn base_name(project_name: &str) -> String {
    project_name
        .chars()
        .filter(|c| c.is_ascii_alphabetic() || *c == '-')
        .collect()
}

/// リソース名の先頭に使う小文字の slug
pub fn slug(project_name: &str) -> String {
    let lowered = base_name(project_name).to_ascii_lowercase();
    let truncated: String = lowered.chars().take(SLUG_MAX_LEN).collect();
    truncated.trim_matches('-').to_string()
}

/// 1回のパイプライン実行で使う名前一式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamePlan {
    pub slug: String,
    pub suffix: String,
    pub bucket: String,
    pub registry: String,
    pub function: String,
    pub build_project: String,
    pub api: String,
    pub role: String,
    pub schedule_rule: String,
}

impl NamePlan {
    pub fn new<R: Rng + ?Sized>(project_name: &str, rng: &mut R) -> Result<Self> {
        let slug = slug(project_name);
        if slug.is_empty() {
            return Err(DeployError::Validation(format!(
                "プロジェクト名 '{}' からリソース名を作れません（英字を含めてください）",
                project_name
            )));
        }

        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| rng.gen_range(b'a'..=b'z') as char)
            .collect();

        let scoped = |part: &str| format!("{}-{}-{}", slug, part, suffix);
        Ok(Self {
            bucket: format!("{}-{}", slug, suffix),
            registry: format!("{}-{}", slug, suffix),
            function: format!("{}-{}", slug, suffix),
            build_project: scoped("build"),
            api: scoped("api"),
            role: scoped("role"),
            schedule_rule: scoped("keepwarm"),
            slug,
            suffix,
        })
    }

    /// seed 指定時は再現可能な suffix を使う
    pub fn generate(project_name: &str, seed: Option<u64>) -> Result<Self> {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::new(project_name, &mut rng)
    }
}

/// バケット内のオブジェクトキー
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectKeys {
    pub model: String,
    pub model_versioned: String,
    pub logs_prefix: String,
    pub service_prefix: String,
}

impl ObjectKeys {
    pub fn new(slug: &str, model_path: &Path, timestamp: DateTime<Utc>) -> Self {
        let file = model_path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string());
        let stem = model_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string());
        let stamp = timestamp.format("%Y-%m-%d_%H-%M-%S");
        let model_versioned = match model_path.extension() {
            Some(ext) => format!(
                "{}/models/{}_{}.{}",
                slug,
                stem,
                stamp,
                ext.to_string_lossy()
            ),
            None => format!("{}/models/{}_{}", slug, stem, stamp),
        };

        Self {
            model: format!("{}/{}", slug, file),
            model_versioned,
            logs_prefix: format!("{}/logs/", slug),
            service_prefix: format!("{}/service/", slug),
        }
    }

    pub fn log_key(&self, relative: &str) -> String {
        format!("{}{}", self.logs_prefix, relative)
    }

    pub fn service_key(&self, relative: &str) -> String {
        format!("{}{}", self.service_prefix, relative)
    }

    /// ビルドプロジェクトのソース（`bucket/slug/service/`）
    pub fn build_source(&self, bucket: &str) -> String {
        format!("{}/{}", bucket, self.service_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_slug_strips_spaces_dots_digits() {
        assert_eq!(base_name("Demo Model"), "DemoModel");
        assert_eq!(slug("Demo Model"), "demomodel");
        assert_eq!(slug("Iris v2.1 Classifier"), "irisvclassifier");
        assert_eq!(slug("fraud_detector"), "frauddetector");
        assert_eq!(slug("2024"), "");
    }

    #[test]
    fn test_slug_is_truncated() {
        let long = "a".repeat(100);
        assert_eq!(slug(&long).len(), 40);
    }

    #[test]
    fn test_same_seed_same_names() {
        let a = NamePlan::generate("Demo Model", Some(7)).unwrap();
        let b = NamePlan::generate("Demo Model", Some(7)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.suffix.len(), 6);
        assert!(a.suffix.chars().all(|c| c.is_ascii_lowercase()));
        assert_eq!(a.function, format!("demomodel-{}", a.suffix));
        assert_eq!(a.bucket, a.function);
        assert_eq!(a.role, format!("demomodel-role-{}", a.suffix));
        assert_eq!(a.schedule_rule, format!("demomodel-keepwarm-{}", a.suffix));
    }

    #[test]
    fn test_empty_slug_is_rejected() {
        assert!(matches!(
            NamePlan::generate("123 456", Some(1)),
            Err(DeployError::Validation(_))
        ));
    }

    #[test]
    fn test_object_keys() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let keys = ObjectKeys::new("demomodel", Path::new("artifacts/model.pkl"), ts);

        assert_eq!(keys.model, "demomodel/model.pkl");
        assert_eq!(keys.model_versioned, "demomodel/models/model_2024-03-09_14-05-07.pkl");
        assert_eq!(keys.log_key("train.log"), "demomodel/logs/train.log");
        assert_eq!(keys.service_key("app/model.py"), "demomodel/service/app/model.py");
        assert_eq!(keys.build_source("demomodel-abcdef"), "demomodel-abcdef/demomodel/service/");
    }
}
