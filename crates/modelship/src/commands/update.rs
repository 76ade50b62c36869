use crate::context::{Context, cancel_on_ctrl_c};
use crate::progress::print_sync;
use colored::Colorize;
use modelship_deploy::{Pipeline, UpdateActions};

pub async fn handle(ctx: &Context, model: bool, logs: bool, api: bool) -> anyhow::Result<()> {
    println!("{}", "デプロイを更新します...".blue().bold());
    ctx.print_settings_file();

    let actions = UpdateActions { model, logs, api };
    let provider = ctx.provider();
    let pipeline =
        Pipeline::new(&provider, ctx.pipeline_options()?).with_cancel(cancel_on_ctrl_c());

    if api {
        println!("{}", "イメージを再ビルドします（数分かかります）...".yellow());
    }
    let outcome = ctx.session().update(&pipeline, &actions).await?;
    let report = outcome.value;

    println!();
    println!(
        "{}",
        format!("iteration {} を更新しました", report.iteration_id).green().bold()
    );
    for key in &report.uploaded {
        println!("  ✓ {}", key);
    }
    if let Some(image) = &report.image_uri {
        println!("  ✓ イメージ: {}", image.cyan());
    }
    print_sync(&outcome.sync);
    Ok(())
}
