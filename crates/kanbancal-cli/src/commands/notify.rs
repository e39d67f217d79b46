//! Deadline notification commands for CLI.

use std::sync::Arc;

use clap::Subcommand;
use kanbancal_core::integrations::TelegramSink;
use kanbancal_core::notify::DeadlineScheduler;
use kanbancal_core::storage::{Config, TaskDb};

#[derive(Subcommand)]
pub enum NotifyAction {
    /// Run the notification loop in the foreground
    Run,
    /// Run a single evaluation cycle and print the report
    Once,
    /// Send a test message to the configured channel
    Test,
    /// Show recently sent notifications
    Log {
        /// Maximum number of entries
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

pub fn run(action: NotifyAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        NotifyAction::Run => {
            let config = Config::load()?;
            let db = Arc::new(TaskDb::open()?);
            let sink = Arc::new(TelegramSink::from_config(&config.telegram, &config.frontend)?);
            let scheduler = Arc::new(DeadlineScheduler::new(
                db,
                sink,
                config.scheduler_settings(),
            ));

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(scheduler.run());
            Ok(())
        }
        NotifyAction::Once => {
            let config = Config::load()?;
            let db = Arc::new(TaskDb::open()?);
            let sink = Arc::new(TelegramSink::from_config(&config.telegram, &config.frontend)?);
            let scheduler = Arc::new(DeadlineScheduler::new(
                db,
                sink,
                config.scheduler_settings(),
            ));

            // Delivery blocks on the runtime handle, so the cycle itself has
            // to run on a blocking thread.
            let rt = tokio::runtime::Runtime::new()?;
            let report = rt.block_on(async move {
                tokio::task::spawn_blocking(move || scheduler.run_cycle()).await
            })??;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        NotifyAction::Test => {
            let config = Config::load()?;
            let sink = TelegramSink::from_config(&config.telegram, &config.frontend)?;

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async move {
                tokio::task::spawn_blocking(move || sink.send_test_message()).await
            })??;
            println!("test message sent");
            Ok(())
        }
        NotifyAction::Log { limit } => {
            let db = TaskDb::open()?;
            let records = db.recent_notifications(limit)?;
            println!("{}", serde_json::to_string_pretty(&records)?);
            Ok(())
        }
    }
}
