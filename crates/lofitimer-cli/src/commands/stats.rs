use std::sync::Arc;

use clap::Subcommand;
use lofitimer_core::storage::RETENTION_DAYS;
use lofitimer_core::{Clock, Config, DailyUsageRecord, PropertiesFile, SystemClock, UsageLedger};

#[derive(Subcommand)]
pub enum StatsAction {
    /// Today's usage
    Today {
        /// Print JSON instead of a summary line
        #[arg(long)]
        json: bool,
    },
    /// One row per day, oldest first, ending today
    Week {
        /// Number of days to show (at most 7 are retained)
        #[arg(long, default_value_t = RETENTION_DAYS as usize)]
        days: usize,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: StatsAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let store = Arc::new(PropertiesFile::new(config.properties_path()?));
    let today = SystemClock.today();
    let ledger = UsageLedger::load(store, today);

    match action {
        StatsAction::Today { json } => {
            let record = ledger.today(today);
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                println!("{}", format_row(&record));
            }
        }
        StatsAction::Week { days, json } => {
            let days = days.clamp(1, RETENTION_DAYS as usize);
            let records = ledger.last_n_days(days, today);
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for record in &records {
                    println!("{}", format_row(record));
                }
                let minutes: u32 = records.iter().map(|r| r.total_minutes).sum();
                let sessions: u32 = records.iter().map(|r| r.session_count).sum();
                println!("total       {minutes:>5} min  {sessions:>3} sessions");
            }
        }
    }
    Ok(())
}

fn format_row(record: &DailyUsageRecord) -> String {
    format!(
        "{} {:>5} min  {:>3} sessions",
        record.date.format("%Y-%m-%d %a"),
        record.total_minutes,
        record.session_count
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn row_shows_date_minutes_and_sessions() {
        let record = DailyUsageRecord {
            date: NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
            total_minutes: 75,
            session_count: 3,
        };
        assert_eq!(format_row(&record), "2024-03-09 Sat    75 min    3 sessions");
    }
}
