use crate::context::Context;
use colored::Colorize;
use modelship_cloud::ResourceStatus;
use modelship_deploy::{LiveState, live_status, logs};
use modelship_registry::Status;

pub async fn handle(ctx: &Context, live: bool) -> anyhow::Result<()> {
    let project = ctx.session().load().await?;

    let status = match project.status {
        Status::Active => "active".green(),
        Status::Inactive => "inactive".yellow(),
    };
    println!("{} {} ({})", project.name.bold(), project.version, status);
    if !project.id.is_empty() {
        println!("  リモートID: {}", project.id);
    }
    if let Some(url) = &project.service_api_url {
        println!("  URL: {}", url.cyan());
    }

    if let Some(logs_dir) = &ctx.settings.logs {
        let entries = logs::read_entries(&ctx.root.join(logs_dir)).await?;
        if !entries.is_empty() {
            println!("  記録済みログ: {} 件", entries.len());
            for entry in &entries {
                println!(
                    "    - {} ({}) {}",
                    entry.key,
                    entry.data.kind(),
                    entry.annotation.as_deref().unwrap_or_default().dimmed()
                );
            }
        }
    }

    let Some(iteration) = project.current_iteration() else {
        println!("{}", "iteration がありません".yellow());
        return Ok(());
    };
    println!();
    println!(
        "{}",
        format!(
            "現在の iteration: {} ({}, {})",
            iteration.id, iteration.name, iteration.status
        )
        .bold()
    );
    if iteration.is_empty() {
        println!("  （リソースなし）");
        return Ok(());
    }

    if !live {
        for record in iteration.resources_in_order() {
            println!(
                "  • {:<12} {} {}",
                record.name.to_string().cyan(),
                record.id,
                record.updated_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
            );
        }
        return Ok(());
    }

    let provider = ctx.provider();
    for resource in live_status(iteration, &provider).await? {
        let state = match &resource.state {
            LiveState::Known(ResourceStatus::Active) => "active".green(),
            LiveState::Known(ResourceStatus::Pending) => "pending".yellow(),
            LiveState::Known(status) => status.to_string().red(),
            LiveState::Unknown(e) => format!("unknown: {}", e).red(),
        };
        println!(
            "  • {:<12} {} {} {}",
            resource.kind.to_string().cyan(),
            resource.id,
            resource.identifier.as_deref().unwrap_or("-"),
            state
        );
    }
    Ok(())
}
