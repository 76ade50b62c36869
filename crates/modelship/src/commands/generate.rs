use crate::context::Context;
use colored::Colorize;
use modelship_deploy::Pipeline;

pub async fn handle(ctx: &Context) -> anyhow::Result<()> {
    println!("{}", "デプロイ計画を生成します...".blue().bold());
    ctx.print_settings_file();

    let provider = ctx.provider();
    let pipeline = Pipeline::new(&provider, ctx.pipeline_options()?);
    let report = ctx.session().generate(&pipeline).await?;

    println!();
    println!("フレームワーク: {}", report.framework.to_string().cyan());
    println!("suffix: {}", report.names.suffix.cyan());
    println!();
    println!(
        "{}",
        format!("作成予定のリソース ({} 個):", report.planned.len()).bold()
    );
    for planned in &report.planned {
        println!(
            "  • {:<12} {} {}",
            planned.kind.to_string().cyan(),
            planned.name,
            format!("[{}]", planned.state).dimmed()
        );
    }

    println!();
    println!("{}", "オブジェクトキー:".bold());
    println!("  • モデル: {}", report.keys.model);
    println!("  • モデル（版）: {}", report.keys.model_versioned);
    println!("  • ログ: {}", report.keys.logs_prefix);
    println!("  • サービス: {}", report.keys.service_prefix);

    if let Some(service) = &report.service {
        println!();
        println!(
            "{}",
            format!("サービスコード: {}", service.dir.display()).bold()
        );
        for file in &service.files {
            println!("  ✓ {}", file);
        }
    }

    println!();
    println!(
        "{}",
        "計画のみ生成しました。クラウド上のリソースは作成していません。".green()
    );
    Ok(())
}
