//! Meal intake logging.

use chrono::{NaiveDateTime, SubsecRound, Utc};
use clap::Subcommand;

use calorie_minder_core::IntakeEvent;

use super::{load_config, open_store, zone};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Subcommand)]
pub enum IntakeAction {
    /// Record the calories of a finished meal
    Log {
        /// Total kcal of the meal
        kcal: u32,
        /// Local time of the meal ("YYYY-MM-DD HH:MM:SS"); defaults to now
        #[arg(long)]
        at: Option<String>,
    },
    /// Show the total kcal logged today
    Today {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: IntakeAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let zone = zone(&config)?;
    let store = open_store()?;

    match action {
        IntakeAction::Log { kcal, at } => {
            let timestamp = match at {
                Some(text) => NaiveDateTime::parse_from_str(&text, TIMESTAMP_FORMAT)
                    .map_err(|e| format!("invalid --at '{text}': {e}"))?,
                None => zone.local_datetime(Utc::now()).trunc_subsecs(0),
            };
            let event = IntakeEvent {
                timestamp,
                calorie_count: kcal,
            };
            store.append(&event)?;
            tracing::debug!("logged intake {kcal} kcal at {timestamp}");
            println!("Logged {kcal} kcal at {timestamp}");
        }
        IntakeAction::Today { json } => {
            let today = zone.date_of(Utc::now());
            let total = store.intake_total_for(today)?;
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "date": today.to_string(), "caloriesIn": total })
                );
            } else {
                println!("{total}");
            }
        }
    }
    Ok(())
}
