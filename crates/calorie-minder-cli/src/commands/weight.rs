//! Body-weight history listing and deletion.

use clap::Subcommand;

use super::open_store;

#[derive(Subcommand)]
pub enum WeightAction {
    /// List stored weight samples
    List {
        /// Only the most recent N samples
        #[arg(long)]
        last: Option<usize>,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete one weight sample by ID
    Delete {
        /// Sample ID (see `weight list`)
        id: i64,
    },
}

pub fn run(action: WeightAction) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store()?;

    match action {
        WeightAction::List { last, json } => {
            let samples = store.weight_samples_with_ids(last)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&samples)?);
            } else if samples.is_empty() {
                println!("No weight samples.");
            } else {
                for s in &samples {
                    println!(
                        "{:>5}  {}  {:<12}  {:>8.1} kg",
                        s.id,
                        s.sample.timestamp,
                        s.sample.subject_id,
                        s.sample.value_grams / 1000.0
                    );
                }
            }
        }
        WeightAction::Delete { id } => {
            if !store.delete_weight_sample(id)? {
                return Err(format!("no weight sample with id {id}").into());
            }
            println!("Deleted weight sample {id}");
        }
    }
    Ok(())
}
