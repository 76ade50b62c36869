use crate::context::Context;
use crate::progress::print_sync;
use colored::Colorize;
use modelship_registry::Selection;

pub async fn handle(
    ctx: &Context,
    iteration: Option<&str>,
    include: Vec<String>,
    exclude: Vec<String>,
) -> anyhow::Result<()> {
    println!("{}", "リソースを破棄します...".blue().bold());
    ctx.print_settings_file();

    let selection = if !include.is_empty() {
        Selection::including(include)
    } else {
        Selection::excluding(exclude)
    };
    let order = ctx.destroy_order()?;
    let provider = ctx.provider();

    let outcome = ctx
        .session()
        .destroy(&provider, iteration, &selection, order)
        .await?;
    let report = outcome.value;

    println!();
    if report.is_empty() {
        println!("{}", "破棄対象のリソースはありません".yellow());
    }
    for id in &report.destroyed {
        println!("  ✓ {} を破棄しました", id.cyan());
    }
    for id in &report.not_found {
        println!("  - {} (既に存在しません)", id);
    }
    for selector in &report.unmatched {
        println!("{}", format!("  ⚠ {} に一致するリソースはありません", selector).yellow());
    }
    for failure in &report.failed {
        println!(
            "{}",
            format!("  ✗ {} ({}): {}", failure.id, failure.kind, failure.error).red()
        );
    }
    print_sync(&outcome.sync);

    if !report.failed.is_empty() {
        anyhow::bail!(
            "{} 個のリソースを破棄できませんでした（レジストリに残しています）",
            report.failed.len()
        );
    }
    Ok(())
}
