// src/bin/print_report.rs
use ipo_analyzer::models::StoredOffering;
use ipo_analyzer::services::sample::sample_offerings;
use ipo_analyzer::services::suitability::SuitabilityAnalyzer;
use log::info;
use std::{env, error::Error, fs};

const OUTPUT_FILE: &str = "ipo_analysis_report.txt";

/// Prints the same-day trading report for a store snapshot (first argument)
/// or, without one, for the built-in sample offerings.
fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();
    env_logger::init();

    let records = match env::args().nth(1) {
        Some(path) => {
            info!("Reading offerings from snapshot {}", path);
            let entries: Vec<StoredOffering> = serde_json::from_str(&fs::read_to_string(&path)?)?;
            entries.into_iter().map(|entry| entry.record).collect()
        }
        None => {
            info!("No snapshot given, using the sample offerings");
            sample_offerings()
        }
    };

    let report = SuitabilityAnalyzer::default().generate_report(&records);
    println!("{}", report);

    fs::write(OUTPUT_FILE, &report)?;
    println!("\nReport saved to '{}'", OUTPUT_FILE);
    Ok(())
}
