use chrono::{TimeZone, Utc};
use sensor_query::{QueryEngine, QueryParams, QueryReport, SensorField, SensorQueryConfig, SortOrder};

const USAGE: &str = "usage: sensor-query-cli <field> <start_ms> <end_ms> [asc|desc]";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 3 {
        eprintln!("{}", USAGE);
        eprintln!("fields: dust, humidity, temperature, methane, co");
        std::process::exit(2);
    }

    let field: SensorField = args[0].parse()?;
    let start: u64 = args[1].parse()?;
    let end: u64 = args[2].parse()?;
    let order = match args.get(3) {
        Some(order) => order.parse()?,
        None => SortOrder::Ascending,
    };

    let config = SensorQueryConfig::from_env();
    println!("Sensor Query");
    println!("============");
    println!("Endpoint:   {}", config.endpoint_url);

    let engine = QueryEngine::connect(config)?;
    let params = QueryParams::new(field, start, end).with_sort(sensor_query::query::DEFAULT_SORT_KEY, order);

    let query_start = std::time::Instant::now();
    let report = engine.query(params).await?;
    let elapsed = query_start.elapsed();

    print_report(&report, start, end);
    println!("Query time: {:?}", elapsed);

    Ok(())
}

fn print_report(report: &QueryReport, start: u64, end: u64) {
    let result = &report.result;

    println!("Field:      {}", report.field);
    println!("Range:      {} to {}", format_timestamp(start), format_timestamp(end));
    println!("Matches:    {} in {} pages", report.total_matches, report.total_pages);
    println!("Values:     {}", result.values.len());
    println!("Average:    {}", result.average);
    println!("Minimum:    {}", result.minimum);
    println!("Maximum:    {}", result.maximum);
    println!("Baseline:   {}", result.baseline);

    if !result.values.is_empty() {
        println!("Sample readings:");
        let sample_size = std::cmp::min(5, result.values.len());
        for i in 0..sample_size {
            println!("  {} -> {}", format_timestamp(result.timestamps[i]), result.values[i]);
        }
        if result.values.len() > sample_size {
            println!("  ... and {} more", result.values.len() - sample_size);
        }
    }

    for failure in &report.failed_pages {
        println!("Warning: page {} (offset {}) lost: {}", failure.page_index, failure.offset, failure.reason);
    }
    if let Some(reason) = &report.baseline_error {
        println!("Warning: baseline unavailable: {}", reason);
    }
}

fn format_timestamp(timestamp: u64) -> String {
    match Utc.timestamp_millis_opt(timestamp as i64).single() {
        Some(datetime) => datetime.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => timestamp.to_string(),
    }
}
