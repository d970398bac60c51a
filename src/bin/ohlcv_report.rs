//! Print the daily OHLCV aggregate
//!
//! Usage:
//!   cargo run --bin ohlcv_report [SYMBOL ...] [--refresh]
//!
//! With no symbols, reports every symbol in `TRACKED_SYMBOLS`. `--refresh`
//! recomputes the aggregate before printing.

use coinwatch::pipeline::{
    config::PipelineConfig,
    db::{open_connection, run_schema_migrations},
    refresher::{load_daily_ohlcv, refresh_daily_ohlcv},
};
use dotenv::dotenv;
use std::env;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let config = PipelineConfig::from_env()?;

    let args: Vec<String> = env::args().skip(1).collect();
    let refresh = args.iter().any(|a| a == "--refresh");
    let mut symbols: Vec<String> = args
        .iter()
        .filter(|a| !a.starts_with("--"))
        .map(|a| a.to_uppercase())
        .collect();
    if symbols.is_empty() {
        symbols = config.tracked_symbols.clone();
    }

    let mut conn = open_connection(&config.db_path)?;
    run_schema_migrations(&conn)?;

    if refresh {
        let rows = refresh_daily_ohlcv(&mut conn)?;
        println!("Refreshed {} aggregate rows", rows);
    }

    println!(
        "{:<8} {:<10} {:>14} {:>14} {:>14} {:>14} {:>20}",
        "SYMBOL", "DAY", "OPEN", "HIGH", "LOW", "CLOSE", "VOLUME_SUM"
    );

    for symbol in &symbols {
        let rows = load_daily_ohlcv(&conn, symbol)?;
        if rows.is_empty() {
            println!("{:<8} (no data)", symbol);
            continue;
        }

        for row in rows {
            println!(
                "{:<8} {:<10} {:>14.4} {:>14.4} {:>14.4} {:>14.4} {:>20.2}",
                row.symbol, row.day, row.open, row.high, row.low, row.close, row.volume_sum
            );
        }
    }

    Ok(())
}
