use crate::context::{Context, cancel_on_ctrl_c};
use crate::progress::{StepPrinter, print_sync};
use colored::Colorize;
use modelship_cloud::CloudProvider;
use modelship_deploy::Pipeline;

pub async fn handle(ctx: &Context) -> anyhow::Result<()> {
    println!("{}", "デプロイを開始します...".blue().bold());
    ctx.print_settings_file();

    let provider = ctx.provider();
    println!(
        "デプロイ先: {} ({})",
        provider.display_name().cyan(),
        provider.region()
    );
    println!();

    let printer = StepPrinter::new();
    let pipeline = Pipeline::new(&provider, ctx.pipeline_options()?)
        .with_observer(&printer)
        .with_cancel(cancel_on_ctrl_c());

    match ctx.session().deploy(&pipeline).await {
        Ok(outcome) => {
            let report = outcome.value;
            println!();
            println!("{}", "✓ デプロイが完了しました".green().bold());
            if let Some(id) = &report.iteration_id {
                println!("  iteration: {}", id.cyan());
            }
            if let Some(url) = &report.url {
                println!("  URL: {}", url.cyan().bold());
            }
            print_sync(&outcome.sync);
            Ok(())
        }
        Err(e) => {
            if let Some((state, registered)) = e.failed_step() {
                println!();
                println!(
                    "{}",
                    format!("✗ {} ({}) で失敗しました", state.label(), state).red().bold()
                );
                if !registered.is_empty() {
                    println!("作成済みのリソースはレジストリに残っています:");
                    for id in registered {
                        println!("  • {}", id);
                    }
                    println!(
                        "不要であれば {} で破棄してください",
                        "modelship destroy".cyan()
                    );
                }
            }
            Err(e.into())
        }
    }
}
