use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    /// `modelship init` 済みのプロジェクト
    pub fn initialized(name: &str) -> Self {
        let project = Self::new();
        project.cmd().args(["init", name]).assert().success();
        project
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    pub fn file(&self, relative: &str) -> PathBuf {
        self.root.path().join(relative)
    }

    #[allow(dead_code)]
    pub fn write(&self, relative: &str, content: &str) {
        let path = self.file(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    /// プロジェクトディレクトリで実行するコマンド（環境変数の影響を受けない）
    #[allow(deprecated)]
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("modelship").unwrap();
        cmd.current_dir(self.root.path())
            .env_remove("MODELSHIP_CONFIG_PATH")
            .env_remove("MODELSHIP_EMAIL")
            .env_remove("MODELSHIP_PASSWORD")
            .env_remove("RUST_LOG")
            .arg("--project-dir")
            .arg(self.root.path());
        cmd
    }
}

#[allow(dead_code)]
pub fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}
