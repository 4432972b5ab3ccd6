//! Daily aggregate history and one-shot rebuild.

use calorie_minder_core::{DailyAggregate, DailyAggregator};

use super::{load_config, open_store, zone};

pub fn run(last: Option<usize>, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store()?;
    let rows = match last {
        Some(n) => store.latest::<DailyAggregate>(n)?,
        None => store.all::<DailyAggregate>()?,
    };
    print_rows(&rows, json)
}

pub fn aggregate(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let store = open_store()?;
    let aggregator = DailyAggregator::new(
        store,
        zone(&config)?,
        config.aggregation.moving_average_days,
    );
    let rows = aggregator.recompute()?;
    print_rows(&rows, json)
}

fn print_rows(rows: &[DailyAggregate], json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No daily history yet.");
        return Ok(());
    }

    println!(
        "{:<10}  {:>7}  {:>7}  {:>7}  {:>7}",
        "date", "in", "out", "avg in", "avg out"
    );
    for row in rows {
        println!(
            "{:<10}  {:>7}  {:>7}  {:>7}  {:>7}",
            row.date, row.calories_in, row.calories_out, row.moving_avg_in, row.moving_avg_out
        );
    }
    Ok(())
}
