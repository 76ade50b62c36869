use crate::context::{GlobalArgs, remote_client, session_for};
use crate::progress::print_sync;
use colored::Colorize;
use modelship_config::{parse_settings_file, settings_template};
use std::path::Path;

const SETTINGS_FILE: &str = "modelship.kdl";

pub async fn handle(global: &GlobalArgs, dir: &Path, name: &str) -> anyhow::Result<()> {
    println!("{}", "プロジェクトを初期化します...".blue().bold());

    std::fs::create_dir_all(dir)?;
    let settings_path = dir.join(SETTINGS_FILE);
    if settings_path.exists() {
        println!("  - {} は既に存在します（そのまま使います）", SETTINGS_FILE);
    } else {
        std::fs::write(&settings_path, settings_template(name))?;
        println!("  ✓ {} を作成しました", settings_path.display().to_string().cyan());
    }

    let settings = parse_settings_file(&settings_path)?;
    let remote = remote_client(global, settings.remote.as_deref());
    let session = session_for(dir, remote.as_ref());

    let outcome = session.init(&settings.project).await?;
    let project = outcome.value;
    println!(
        "  ✓ {} を作成しました",
        session.store().project_path().display().to_string().cyan()
    );
    println!(
        "  ✓ iteration {} ({})",
        project.current_iteration_id().cyan(),
        settings.project.iteration
    );
    print_sync(&outcome.sync);

    println!();
    println!("{}", "次のステップ:".bold());
    println!("  1. {} の model / target を編集", SETTINGS_FILE);
    println!("  2. {} で計画を確認", "modelship generate".cyan());
    println!("  3. {} でデプロイ", "modelship deploy".cyan());
    Ok(())
}
