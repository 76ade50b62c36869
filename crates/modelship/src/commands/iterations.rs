use crate::context::Context;
use crate::progress::print_sync;
use colored::Colorize;

pub async fn handle_list(ctx: &Context) -> anyhow::Result<()> {
    let project = ctx.session().load().await?;
    let current = project.current_iteration_id();

    println!(
        "{}",
        format!("{} の iteration ({} 個):", project.name, project.iterations().len()).bold()
    );
    for iteration in project.iterations().values() {
        let marker = if iteration.id == current { "*" } else { " " };
        println!(
            "{} {} {:<12} {:<8} リソース {} 個  {}",
            marker,
            iteration.id.cyan(),
            iteration.name,
            iteration.status.to_string(),
            iteration.len(),
            iteration.created_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
        );
    }
    Ok(())
}

pub async fn handle_prune(ctx: &Context, id: &str) -> anyhow::Result<()> {
    let outcome = ctx.session().prune(id).await?;
    let pruned = outcome.value;

    println!(
        "{}",
        format!("✓ iteration {} をレジストリから削除しました", pruned.id).green()
    );
    if !pruned.is_empty() {
        println!(
            "{}",
            format!(
                "  ⚠ {} 個のリソースの記録も削除されました（クラウド上には残っている可能性があります）",
                pruned.len()
            )
            .yellow()
        );
    }
    print_sync(&outcome.sync);
    Ok(())
}
