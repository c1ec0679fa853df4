//! pipeline-runner: headless batch runner for the superstore analytics pipeline.
//!
//! Usage:
//!   pipeline-runner --input orders.csv --out-dir ./out --year 2013
//!   pipeline-runner --config pipeline.json --sequential
//!   pipeline-runner --input orders.csv --json

use anyhow::{bail, Result};
use std::env;
use superstore_core::{
    config::PipelineConfig,
    engine::{PipelineEngine, PipelineOutputs},
    report,
    types::Year,
};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let mut config = match find_arg(&args, "--config") {
        Some(path) => PipelineConfig::load(path)?,
        None       => PipelineConfig::default(),
    };
    if let Some(input) = find_arg(&args, "--input") {
        config.input_path = Some(input.to_string());
    }
    if let Some(dir) = find_arg(&args, "--out-dir") {
        config.output_dir = Some(dir.to_string());
    }
    config.analysis_year = parse_arg::<Year>(&args, "--year", config.analysis_year);
    if args.iter().any(|a| a == "--sequential") {
        config.parallel_branches = false;
    }
    if args.iter().any(|a| a == "--raw-numbers") {
        config.format_risk_output = false;
    }
    let json_mode = args.iter().any(|a| a == "--json");

    let Some(input) = config.input_path.clone() else {
        bail!("no input file: pass --input <orders.csv> or set input_path in --config");
    };

    if !json_mode {
        println!("Superstore analytics: pipeline-runner");
        println!("  input:     {input}");
        println!("  out_dir:   {}", config.output_dir.as_deref().unwrap_or("(none)"));
        println!("  year:      {}", config.analysis_year);
        println!("  branches:  {}", if config.parallel_branches { "parallel" } else { "sequential" });
        println!();
    }

    log::debug!("resolved config: {config:?}");
    let mut engine = PipelineEngine::build(config)?;
    let outputs = engine.run_file(&input)?;

    if json_mode {
        println!("{}", serde_json::to_string_pretty(engine.events())?);
    } else {
        print_summary(&engine, &outputs);
    }

    let failed = engine.failed_stages();
    if !failed.is_empty() {
        bail!("run {} finished with failed stages: {failed:?}", engine.run_id);
    }
    Ok(())
}

fn print_summary(engine: &PipelineEngine, outputs: &PipelineOutputs) {
    println!("=== RUN SUMMARY ===");
    println!("  run_id:           {}", engine.run_id);
    if let Some(cleaned) = &outputs.cleaned {
        let r = &cleaned.report;
        println!("  rows in:          {}", r.input_rows);
        println!("  rows out:         {}", r.output_rows);
        println!("  duplicates:       {}", r.duplicates_removed);
        println!("  bad order dates:  {}", r.rows_dropped_for_dates);
        println!("  missing numerics: {}", r.missing_numeric_cells);
    }
    match &outputs.customers {
        Some(c) => println!("  customers:        {}", c.rows.len()),
        None    => println!("  customers:        (failed)"),
    }
    match &outputs.products {
        Some(p) => println!("  products:         {}", p.rows.len()),
        None    => println!("  products:         (failed)"),
    }

    println!();
    match &outputs.risk {
        Some(budget) => {
            println!("=== RISK BUDGET {} ===", budget.analysis_year);
            if budget.rows.is_empty() {
                println!("  (No new or retained customers)");
            }
            for row in &budget.rows {
                let f = row.formatted();
                println!(
                    "  {:<5} | Customers: {:>5} | AOV: {:>12} | Retention: {:>8} | At risk: {:>14} | Alloc: {:>8}",
                    f.risk_level, f.customer_count, f.average_order_value,
                    f.retention_pct, f.dollar_at_risk, f.risk_allocation_pct
                );
            }
            println!("  total at risk: {}", report::format_currency(budget.total_dollar_at_risk()));
        }
        None => println!("=== RISK BUDGET === (not produced)"),
    }

    if let Some(store) = engine.store() {
        println!();
        println!("  outputs written to {}", store.dir().display());
    }
}

fn find_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
