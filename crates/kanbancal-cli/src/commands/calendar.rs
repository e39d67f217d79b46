//! Calendar view commands for CLI.

use chrono::{DateTime, Duration, Utc};
use clap::Subcommand;
use kanbancal_core::calendar::CalendarEvent;
use kanbancal_core::storage::TaskDb;

#[derive(Subcommand)]
pub enum CalendarAction {
    /// List tasks as calendar events
    Events {
        /// Range start (RFC 3339, default: now)
        #[arg(long)]
        from: Option<String>,
        /// Range end (RFC 3339, default: from + 30 days)
        #[arg(long)]
        to: Option<String>,
    },
}

fn parse_instant(s: &str) -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .map_err(|e| format!("cannot parse '{s}' as RFC 3339: {e}"))?
        .with_timezone(&Utc))
}

pub fn run(action: CalendarAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        CalendarAction::Events { from, to } => {
            let now = Utc::now();
            let from = from.as_deref().map(parse_instant).transpose()?.unwrap_or(now);
            let to = to
                .as_deref()
                .map(parse_instant)
                .transpose()?
                .unwrap_or(from + Duration::days(30));

            let db = TaskDb::open()?;
            let events: Vec<CalendarEvent> = db
                .list_tasks()?
                .iter()
                .map(|task| CalendarEvent::from_task(task, now))
                .filter(|event| event.overlaps(from, to))
                .collect();
            println!("{}", serde_json::to_string_pretty(&events)?);
        }
    }
    Ok(())
}
