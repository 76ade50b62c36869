use clap::Args;
use colored::Colorize;
use modelship_cloud::{CancelToken, cancel_pair};
use modelship_cloud_aws::AwsProvider;
use modelship_config::{
    ConfigError, Settings, find_settings_from, load_settings, parse_settings_file, project_root,
};
use modelship_deploy::{PipelineOptions, Session};
use modelship_registry::{Credentials, DestroyOrder, ProjectStore, RemoteClient};
use std::path::{Path, PathBuf};

/// 全コマンド共通のオプション
#[derive(Args)]
pub struct GlobalArgs {
    /// 詳細ログを表示
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// 設定ファイルのパス
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// プロジェクトディレクトリ（省略時は設定ファイルの場所）
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// リモート設定サービスのメールアドレス
    #[arg(long, global = true, env = "MODELSHIP_EMAIL", hide = true)]
    pub email: Option<String>,

    /// リモート設定サービスのパスワード
    #[arg(
        long,
        global = true,
        env = "MODELSHIP_PASSWORD",
        hide = true,
        hide_env_values = true
    )]
    pub password: Option<String>,
}

/// 設定ファイルを読み込んだ後のコマンド実行環境
pub struct Context {
    pub root: PathBuf,
    pub settings_path: PathBuf,
    pub settings: Settings,
    remote: Option<RemoteClient>,
}

impl Context {
    pub fn load(global: &GlobalArgs) -> anyhow::Result<Self> {
        let (settings_path, settings) = match (&global.config, &global.project_dir) {
            (Some(path), _) => load_settings(Some(path))?,
            (None, Some(dir)) => {
                let path = find_settings_from(dir).ok_or(ConfigError::SettingsFileNotFound)?;
                let settings = parse_settings_file(&path)?;
                (path, settings)
            }
            (None, None) => load_settings(None)?,
        };

        let root = global
            .project_dir
            .clone()
            .unwrap_or_else(|| project_root(&settings_path));
        let remote = remote_client(global, settings.remote.as_deref());

        tracing::debug!(
            settings = %settings_path.display(),
            root = %root.display(),
            "Loaded settings"
        );

        Ok(Self {
            root,
            settings_path,
            settings,
            remote,
        })
    }

    pub fn provider(&self) -> AwsProvider {
        AwsProvider::new(
            self.settings.target.profile.clone(),
            &self.settings.target.region,
        )
    }

    pub fn session(&self) -> Session<'_> {
        session_for(&self.root, self.remote.as_ref())
    }

    pub fn pipeline_options(&self) -> anyhow::Result<PipelineOptions> {
        Ok(PipelineOptions::from_settings(&self.settings, &self.root)?)
    }

    /// 設定ファイルの `logs` ディレクトリ
    pub fn logs_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.settings.logs {
            Some(logs) => Ok(self.root.join(logs)),
            None => anyhow::bail!(
                "{} に logs が設定されていません（例: logs \"logs\"）",
                self.settings_path.display()
            ),
        }
    }

    pub fn destroy_order(&self) -> anyhow::Result<DestroyOrder> {
        Ok(self.settings.destroy_order.parse()?)
    }

    pub fn print_settings_file(&self) {
        println!("📄 設定ファイル: {}", self.settings_path.display().to_string().cyan());
    }
}

pub fn session_for<'a>(root: &Path, remote: Option<&'a RemoteClient>) -> Session<'a> {
    let session = Session::new(ProjectStore::new(root));
    match remote {
        Some(remote) => session.with_remote(remote),
        None => session,
    }
}

/// リモート設定サービスのクライアント（URL と認証情報が揃っている場合のみ）
pub fn remote_client(global: &GlobalArgs, url: Option<&str>) -> Option<RemoteClient> {
    let url = url?;
    match (&global.email, &global.password) {
        (Some(email), Some(password)) => Some(RemoteClient::new(
            url,
            Credentials {
                email: email.clone(),
                password: password.clone(),
            },
        )),
        _ => {
            println!(
                "{}",
                "⚠ remote が設定されていますが MODELSHIP_EMAIL / MODELSHIP_PASSWORD が未設定のため同期しません"
                    .yellow()
            );
            None
        }
    }
}

/// Ctrl-C でキャンセルされるトークン
pub fn cancel_on_ctrl_c() -> CancelToken {
    let (handle, token) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "\n中断しています（待機中のステップを終了します）...".yellow());
            handle.cancel();
        }
    });
    token
}
