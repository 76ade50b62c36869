//! 推論サービスのソース生成
//!
//! Tera テンプレートから FastAPI アプリ、Dockerfile、buildspec、
//! requirements.txt を明示したディレクトリに書き出す。

use crate::error::{BuildError, Result};
use crate::framework::ModelFramework;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tera::{Context, Tera};
use tracing::{debug, info};

/// Lambda ベースイメージの Python バージョン
pub const PYTHON_VERSION: &str = "3.11";

/// (テンプレート名, 出力パス, ソース)
const TEMPLATES: &[(&str, &str, &str)] = &[
    ("main.py", "main.py", include_str!("../templates/main.py.tera")),
    ("model.py", "app/model.py", include_str!("../templates/model.py.tera")),
    ("Dockerfile", "Dockerfile", include_str!("../templates/Dockerfile.tera")),
    (
        "buildspec.yml",
        "buildspec.yml",
        include_str!("../templates/buildspec.yml.tera"),
    ),
    (
        "requirements.txt",
        "requirements.txt",
        include_str!("../templates/requirements.txt.tera"),
    ),
];

/// テンプレートを持たない固定ファイル
const STATIC_FILES: &[(&str, &str)] = &[("app/__init__.py", "")];

/// 生成するサービスの定義
#[derive(Debug, Clone, Serialize)]
pub struct ServiceSpec {
    pub project_name: String,
    pub slug: String,
    pub version: String,
    pub description: String,
    pub framework: ModelFramework,
    pub bucket: String,
    pub model_key: String,
    pub logs_prefix: String,
    pub stage: String,
}

impl ServiceSpec {
    fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("slug", &self.slug),
            ("bucket", &self.bucket),
            ("model_key", &self.model_key),
            ("stage", &self.stage),
        ] {
            if value.trim().is_empty() {
                return Err(BuildError::InvalidSpec(format!("{} が空です", field)));
            }
        }
        if !self
            .stage
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(BuildError::InvalidSpec(format!(
                "stage '{}' に使えない文字が含まれています",
                self.stage
            )));
        }
        Ok(())
    }
}

/// 生成済みファイル（パスは出力ディレクトリからの相対パス）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceFile {
    pub path: String,
    pub contents: String,
}

#[derive(Debug, Clone)]
pub struct GeneratedService {
    pub dir: PathBuf,
    pub files: Vec<String>,
}

pub struct ServiceGenerator {
    tera: Tera,
}

impl ServiceGenerator {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(
            TEMPLATES
                .iter()
                .map(|(name, _, source)| (*name, *source)),
        )?;
        Ok(Self { tera })
    }

    fn context(spec: &ServiceSpec) -> Context {
        let mut context = Context::new();
        context.insert("project_name", &spec.project_name);
        context.insert("title", &format!("{} API", spec.project_name));
        context.insert("slug", &spec.slug);
        context.insert("version", &spec.version);
        context.insert("description", &spec.description);
        context.insert("bucket", &spec.bucket);
        context.insert("model_key", &spec.model_key);
        context.insert("logs_prefix", &spec.logs_prefix);
        context.insert("stage", &spec.stage);
        context.insert("python_version", PYTHON_VERSION);
        context.insert("requirements", &spec.framework.requirements());
        context.insert("loader", &indent(spec.framework.loader(), 8));
        context.insert("predictor", &indent(spec.framework.predictor(), 4));
        context
    }

    /// ファイルへ書き出さずにレンダリングする
    pub fn render(&self, spec: &ServiceSpec) -> Result<Vec<ServiceFile>> {
        spec.validate()?;
        let context = Self::context(spec);

        let mut files = Vec::with_capacity(TEMPLATES.len() + STATIC_FILES.len());
        for (name, path, _) in TEMPLATES {
            debug!(template = %name, "Rendering service template");
            files.push(ServiceFile {
                path: path.to_string(),
                contents: self.tera.render(name, &context)?,
            });
        }
        for (path, contents) in STATIC_FILES {
            files.push(ServiceFile {
                path: path.to_string(),
                contents: contents.to_string(),
            });
        }
        Ok(files)
    }

    /// `output_dir` にサービス一式を書き出す
    pub fn generate(&self, spec: &ServiceSpec, output_dir: &Path) -> Result<GeneratedService> {
        let files = self.render(spec)?;

        std::fs::create_dir_all(output_dir)?;
        let mut written = Vec::with_capacity(files.len());
        for file in files {
            let target = output_dir.join(&file.path);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, file.contents)?;
            written.push(file.path);
        }

        info!(
            dir = %output_dir.display(),
            framework = %spec.framework,
            files = written.len(),
            "Generated service sources"
        );
        Ok(GeneratedService {
            dir: output_dir.to_path_buf(),
            files: written,
        })
    }
}

fn indent(lines: &[&str], width: usize) -> String {
    let pad = " ".repeat(width);
    lines
        .iter()
        .map(|line| format!("{}{}", pad, line))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(framework: ModelFramework) -> ServiceSpec {
        ServiceSpec {
            project_name: "Demo \"Model\"".into(),
            slug: "demomodel".into(),
            version: "0.1.0".into(),
            description: "Iris classifier".into(),
            framework,
            bucket: "demomodel-abcdef".into(),
            model_key: "demomodel/model.pkl".into(),
            logs_prefix: "demomodel/logs/".into(),
            stage: "dev".into(),
        }
    }

    fn file<'a>(files: &'a [ServiceFile], path: &str) -> &'a str {
        &files.iter().find(|f| f.path == path).unwrap().contents
    }

    #[test]
    fn test_render_all_files() {
        let generator = ServiceGenerator::new().unwrap();
        let files = generator.render(&spec(ModelFramework::Sklearn)).unwrap();

        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "main.py",
                "app/model.py",
                "Dockerfile",
                "buildspec.yml",
                "requirements.txt",
                "app/__init__.py"
            ]
        );
    }

    #[test]
    fn test_main_py_routes_and_escaping() {
        let generator = ServiceGenerator::new().unwrap();
        let files = generator.render(&spec(ModelFramework::Sklearn)).unwrap();
        let main = file(&files, "main.py");

        assert!(main.contains(r#"root_path="/dev""#));
        assert!(main.contains(r#"title="Demo \"Model\" API""#));
        assert!(main.contains(r#"@app.get("/status")"#));
        assert!(main.contains(r#"@app.get("/ping")"#));
        assert!(main.contains("handler = Mangum(app=app)"));
    }

    #[test]
    fn test_model_py_uses_framework_loader() {
        let generator = ServiceGenerator::new().unwrap();
        let files = generator.render(&spec(ModelFramework::Pytorch)).unwrap();
        let model = file(&files, "app/model.py");

        assert!(model.contains(r#"MODEL_KEY = os.environ.get("MODEL_KEY", "demomodel/model.pkl")"#));
        assert!(model.contains("        import torch\n"));
        assert!(model.contains("    with torch.no_grad():\n        output = "));
    }

    #[test]
    fn test_dockerfile_and_buildspec() {
        let generator = ServiceGenerator::new().unwrap();
        let files = generator.render(&spec(ModelFramework::Xgboost)).unwrap();

        let dockerfile = file(&files, "Dockerfile");
        assert!(dockerfile.starts_with("FROM public.ecr.aws/lambda/python:3.11"));
        assert!(dockerfile.contains(r#"CMD ["main.handler"]"#));
        assert!(dockerfile.contains("ENV MODEL_BUCKET=demomodel-abcdef"));

        let buildspec = file(&files, "buildspec.yml");
        assert!(buildspec.contains("docker push $REPOSITORY_URI:$IMAGE_TAG"));
        assert!(buildspec.contains("${REPOSITORY_URI%%/*}"));

        let requirements = file(&files, "requirements.txt");
        assert_eq!(requirements.lines().last(), Some("numpy"));
        assert!(requirements.lines().any(|l| l == "xgboost"));
    }

    #[test]
    fn test_invalid_stage_is_rejected() {
        let generator = ServiceGenerator::new().unwrap();
        let mut bad = spec(ModelFramework::Sklearn);
        bad.stage = "dev/../prod".into();
        assert!(matches!(generator.render(&bad), Err(BuildError::InvalidSpec(_))));

        bad.stage = "dev".into();
        bad.bucket = String::new();
        assert!(matches!(generator.render(&bad), Err(BuildError::InvalidSpec(_))));
    }
}
