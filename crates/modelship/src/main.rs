mod commands;
mod context;
mod progress;

use clap::{ArgGroup, Parser, Subcommand};
use colored::Colorize;
use context::GlobalArgs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "modelship")]
#[command(about = "学習済みモデルを、そのまま推論APIに。", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// プロジェクトを初期化（modelship.kdl と .modelship/project.json を作成）
    Init {
        /// プロジェクト名
        name: String,
    },
    /// デプロイ計画とサービスコードを生成（クラウドには触れない）
    Generate,
    /// モデルをデプロイして推論APIを公開
    Deploy,
    /// 現在のデプロイを更新
    Update {
        /// モデルファイルを再アップロード
        #[arg(long)]
        model: bool,
        /// ログディレクトリを再アップロード
        #[arg(long)]
        logs: bool,
        /// サービスコードを再生成してイメージを再ビルド
        #[arg(long)]
        api: bool,
    },
    /// 登録済みリソースを破棄
    Destroy {
        /// 対象の iteration（省略時は現在の iteration）
        #[arg(long)]
        iteration: Option<String>,
        /// 対象に含めるリソース（id または種別: IAM, ECR, S3, CodeBuild, AWSLambda, APIGateway, Cloudwatch）
        #[arg(long, conflicts_with = "exclude")]
        include: Vec<String>,
        /// 対象から除くリソース（id または種別）
        #[arg(long)]
        exclude: Vec<String>,
    },
    /// 学習ログを記録（デプロイ時と update --logs でアップロード）
    #[command(group(ArgGroup::new("value").required(true)))]
    Log {
        /// ログのキー（空白は _ に置換）
        key: String,
        /// 数値
        #[arg(long, group = "value")]
        float: Option<f64>,
        /// テキスト
        #[arg(long, group = "value")]
        text: Option<String>,
        /// 表（{"columns": [...], "rows": [[...]]} 形式の JSON ファイル）
        #[arg(long, group = "value")]
        table: Option<PathBuf>,
        /// グラフ画像ファイル
        #[arg(long, group = "value")]
        plot: Option<PathBuf>,
        /// タイトル
        #[arg(long)]
        annotate: Option<String>,
    },
    /// プロジェクトと iteration の状態を表示
    Status {
        /// クラウド側の実際の状態も確認
        #[arg(long)]
        live: bool,
    },
    /// iteration の管理
    #[command(subcommand)]
    Iterations(IterationCommands),
    /// バージョン情報を表示
    Version,
}

#[derive(Subcommand)]
enum IterationCommands {
    /// iteration 一覧を表示
    List,
    /// iteration をレジストリから削除（現在の iteration は削除不可）
    Prune {
        /// iteration ID
        id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "エラー:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let global = cli.global;

    match cli.command {
        // 設定ファイル不要
        Commands::Version => {
            println!("modelship {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Init { name } => {
            let dir = resolve_dir(global.project_dir.as_ref())?;
            commands::init::handle(&global, &dir, &name).await
        }
        command => {
            let ctx = context::Context::load(&global)?;
            match command {
                Commands::Generate => commands::generate::handle(&ctx).await,
                Commands::Deploy => commands::deploy::handle(&ctx).await,
                Commands::Update { model, logs, api } => {
                    commands::update::handle(&ctx, model, logs, api).await
                }
                Commands::Destroy {
                    iteration,
                    include,
                    exclude,
                } => commands::destroy::handle(&ctx, iteration.as_deref(), include, exclude).await,
                Commands::Log {
                    key,
                    float,
                    text,
                    table,
                    plot,
                    annotate,
                } => {
                    let input = commands::log::LogInput {
                        float,
                        text,
                        table,
                        plot,
                    };
                    commands::log::handle(&ctx, &key, input, annotate.as_deref()).await
                }
                Commands::Status { live } => commands::status::handle(&ctx, live).await,
                Commands::Iterations(IterationCommands::List) => {
                    commands::iterations::handle_list(&ctx).await
                }
                Commands::Iterations(IterationCommands::Prune { id }) => {
                    commands::iterations::handle_prune(&ctx, &id).await
                }
                // 上で処理済み
                Commands::Version | Commands::Init { .. } => Ok(()),
            }
        }
    }
}

/// `--project-dir`（省略時はカレントディレクトリ）
fn resolve_dir(base: Option<&PathBuf>) -> anyhow::Result<PathBuf> {
    match base {
        Some(dir) => Ok(dir.clone()),
        None => Ok(std::env::current_dir()?),
    }
}
