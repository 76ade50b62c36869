use colored::Colorize;
use modelship_deploy::{PipelineState, StepObserver, SyncStatus};
use modelship_registry::Iteration;
use std::sync::Mutex;

/// パイプラインの進捗を `【Step n/N】` 形式で表示する
pub struct StepPrinter {
    /// 表示済みのリソース数
    shown: Mutex<usize>,
}

impl StepPrinter {
    pub fn new() -> Self {
        Self {
            shown: Mutex::new(0),
        }
    }
}

impl StepObserver for StepPrinter {
    fn on_transition(&self, state: PipelineState, iteration: Option<&Iteration>) {
        let total = PipelineState::SEQUENCE.len();
        match state.step_number() {
            Some(step) => println!(
                "{}",
                format!("【Step {}/{}】{}", step, total, state.label()).yellow()
            ),
            None => {
                println!("{}", format!("✗ {}", state.label()).red().bold());
                return;
            }
        }

        let Some(iteration) = iteration else {
            return;
        };
        let Ok(mut shown) = self.shown.lock() else {
            return;
        };
        let resources = iteration.resources_in_order();
        for record in resources.iter().skip(*shown) {
            let identifier = record
                .handle()
                .map(|h| h.identifier().to_string())
                .unwrap_or_default();
            println!(
                "  ✓ {} {} ({})",
                record.name.to_string().cyan(),
                identifier,
                record.id.dimmed()
            );
        }
        *shown = resources.len();
    }
}

pub fn print_sync(sync: &SyncStatus) {
    match sync {
        SyncStatus::Skipped => {}
        SyncStatus::Synced => println!("  ✓ リモートに同期しました"),
        SyncStatus::Failed(e) => println!("{}", format!("  ⚠ リモート同期に失敗しました: {}", e).yellow()),
    }
}
