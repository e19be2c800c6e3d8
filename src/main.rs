//! gedload CLI - load and query conflict-event CSV exports
//!
//! # Commands
//!
//! ```bash
//! gedload load events.csv              # Load, report admitted/rejected
//! gedload summary events.csv           # Headline numbers (events, deaths, ...)
//! gedload aggregate events.csv --by month              # Events per month
//! gedload aggregate events.csv --by region \
//!     --measure fatalities --sorted    # Deaths per state, sorted
//! gedload detect events.csv            # Dialect & encoding suggestion
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};

use gedload::{
    aggregate, detect_delimiter, detect_encoding, load_bytes, parser, DecimalSeparator, Delimiter,
    EstimatePolicy, Filter, GroupKey, KeyOrder, LoadOptions, Reducer, Table, TextEncoding,
};

#[derive(Parser)]
#[command(name = "gedload")]
#[command(about = "Normalize conflict-event CSV exports into a queryable table", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a CSV file and report what was admitted and rejected
    Load {
        /// Input CSV file
        input: PathBuf,

        #[command(flatten)]
        load: LoadArgs,

        /// Write admitted records as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// List every rejected row instead of the per-reason summary
        #[arg(long)]
        rejects: bool,
    },

    /// Print the headline numbers: events, fatalities, regions, date range
    Summary {
        /// Input CSV file
        input: PathBuf,

        #[command(flatten)]
        load: LoadArgs,
    },

    /// Group and reduce the table for charting
    Aggregate {
        /// Input CSV file
        input: PathBuf,

        #[command(flatten)]
        load: LoadArgs,

        /// Grouping dimension
        #[arg(long, value_enum)]
        by: ByArg,

        /// Reduction applied per group
        #[arg(long, value_enum, default_value = "count")]
        measure: MeasureArg,

        /// Stable-sort categorical keys instead of first-seen order
        #[arg(long)]
        sorted: bool,

        /// Keep only these regions (repeatable)
        #[arg(long)]
        region: Vec<String>,

        /// Keep only this year
        #[arg(long)]
        year: Option<i32>,

        /// Keep only these violence types (repeatable)
        #[arg(long)]
        violence: Vec<String>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Suggest dialect and encoding (one-shot detection, loads nothing)
    Detect {
        /// Input CSV file
        input: PathBuf,
    },
}

/// Shared load configuration flags, mirroring [`LoadOptions`].
#[derive(Args)]
struct LoadArgs {
    /// Field delimiter
    #[arg(long, value_enum, default_value = "comma")]
    delimiter: DelimiterArg,

    /// Decimal separator (default follows the delimiter convention)
    #[arg(long, value_enum)]
    decimal: Option<DecimalArg>,

    /// Text encoding
    #[arg(long, value_enum, default_value = "utf8")]
    encoding: EncodingArg,

    /// Resolve ambiguous dates day-first
    #[arg(long)]
    day_first: bool,

    /// Column whose dropped delimiter the shift repair compensates for
    #[arg(long, default_value = gedload::DEFAULT_DROPPABLE_COLUMN)]
    droppable_column: String,

    /// Disable the column-shift repair entirely
    #[arg(long)]
    no_repair: bool,

    /// Reject records without a region
    #[arg(long)]
    require_region: bool,

    /// Treat an unparseable fatality estimate as zero instead of absent
    #[arg(long)]
    estimate_zero: bool,
}

#[derive(ValueEnum, Clone, Copy, PartialEq)]
enum DelimiterArg {
    Comma,
    Semicolon,
    /// Detect once from the first non-empty line
    Auto,
}

#[derive(ValueEnum, Clone, Copy)]
enum DecimalArg {
    Dot,
    Comma,
}

#[derive(ValueEnum, Clone, Copy, PartialEq)]
enum EncodingArg {
    Utf8,
    Latin1,
    /// Detect once from the byte content
    Auto,
}

#[derive(ValueEnum, Clone, Copy)]
enum ByArg {
    Month,
    Region,
    Violence,
    Year,
}

#[derive(ValueEnum, Clone, Copy)]
enum MeasureArg {
    Count,
    Fatalities,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Load {
            input,
            load,
            output,
            rejects,
        } => cmd_load(&input, &load, output.as_deref(), rejects),

        Commands::Summary { input, load } => cmd_summary(&input, &load),

        Commands::Aggregate {
            input,
            load,
            by,
            measure,
            sorted,
            region,
            year,
            violence,
            output,
        } => cmd_aggregate(
            &input,
            &load,
            by,
            measure,
            sorted,
            region,
            year,
            violence,
            output.as_deref(),
        ),

        Commands::Detect { input } => cmd_detect(&input),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

/// Read the file once and resolve `auto` settings with the one-shot
/// detectors before the load proper.
fn load_table(input: &Path, args: &LoadArgs) -> Result<Table, Box<dyn std::error::Error>> {
    let bytes = fs::read(input)?;

    let encoding = match args.encoding {
        EncodingArg::Utf8 => TextEncoding::Utf8,
        EncodingArg::Latin1 => TextEncoding::Latin1,
        EncodingArg::Auto => {
            let detected = detect_encoding(&bytes);
            eprintln!("   Encoding: {} (auto-detected)", detected);
            detected
        }
    };

    let delimiter = match args.delimiter {
        DelimiterArg::Comma => Delimiter::Comma,
        DelimiterArg::Semicolon => Delimiter::Semicolon,
        DelimiterArg::Auto => {
            let text = parser::decode(&bytes, encoding)?;
            let detected = detect_delimiter(&text);
            eprintln!("   Delimiter: '{}' (auto-detected)", detected);
            detected
        }
    };

    // Semicolon dialect implies comma decimals unless overridden.
    let decimal_separator = match args.decimal {
        Some(DecimalArg::Dot) => DecimalSeparator::Dot,
        Some(DecimalArg::Comma) => DecimalSeparator::Comma,
        None => match delimiter {
            Delimiter::Semicolon => DecimalSeparator::Comma,
            Delimiter::Comma => DecimalSeparator::Dot,
        },
    };

    let options = LoadOptions {
        delimiter,
        decimal_separator,
        encoding,
        day_first: args.day_first,
        droppable_column: if args.no_repair {
            None
        } else {
            Some(args.droppable_column.clone())
        },
        require_region: args.require_region,
        estimate_policy: if args.estimate_zero {
            EstimatePolicy::Zero
        } else {
            EstimatePolicy::Absent
        },
    };

    Ok(load_bytes(&bytes, &options)?)
}

fn cmd_load(
    input: &Path,
    args: &LoadArgs,
    output: Option<&Path>,
    rejects: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Loading: {}", input.display());
    let table = load_table(input, args)?;
    let info = table.info();

    eprintln!("   Encoding: {}", info.encoding);
    eprintln!("   Delimiter: '{}'", info.delimiter);
    eprintln!("   Date order: {}", info.date_order);
    eprintln!("   Columns: {}", info.headers.join(", "));
    eprintln!("✅ Admitted {} of {} rows", table.len(), info.rows_seen);

    if table.stats().total() > 0 {
        eprintln!(
            "   Field values degraded to absent: {} dates, {} coordinates, {} estimates, {} years",
            table.stats().dates_failed,
            table.stats().coordinates_failed,
            table.stats().estimates_failed,
            table.stats().years_failed,
        );
    }

    if !table.rejected().is_empty() {
        eprintln!("⚠️  Rejected {} rows:", table.rejected().len());
        if rejects {
            for row in table.rejected() {
                eprintln!("   line {}: {} | {}", row.line, row.reason, row.raw);
            }
        } else {
            let mut by_reason: std::collections::HashMap<&str, Vec<u64>> = Default::default();
            for row in table.rejected() {
                by_reason.entry(row.reason.as_str()).or_default().push(row.line);
            }
            let mut reasons: Vec<_> = by_reason.into_iter().collect();
            reasons.sort();
            for (reason, lines) in reasons {
                let sample: Vec<String> = lines.iter().take(5).map(u64::to_string).collect();
                let more = if lines.len() > 5 {
                    format!("... +{}", lines.len() - 5)
                } else {
                    String::new()
                };
                eprintln!(
                    "   • {} x {} (lines: {}{})",
                    lines.len(),
                    reason,
                    sample.join(", "),
                    more
                );
            }
        }
    }

    if output.is_some() {
        let json = serde_json::to_string_pretty(table.records())?;
        write_output(&json, output)?;
    }

    Ok(())
}

fn cmd_summary(input: &Path, args: &LoadArgs) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Loading: {}", input.display());
    let table = load_table(input, args)?;
    let summary = table.summary();

    println!("Events:            {}", summary.events);
    println!("Total fatalities:  {}", summary.total_fatalities);
    println!("Regions:           {}", summary.regions);
    match (summary.first_date, summary.last_date) {
        (Some(first), Some(last)) => println!("Date range:        {} → {}", first, last),
        _ => println!("Date range:        (empty table)"),
    }
    eprintln!("📊 {} rows rejected", table.rejected().len());

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_aggregate(
    input: &Path,
    args: &LoadArgs,
    by: ByArg,
    measure: MeasureArg,
    sorted: bool,
    region: Vec<String>,
    year: Option<i32>,
    violence: Vec<String>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Loading: {}", input.display());
    let table = load_table(input, args)?;

    let mut filter = Filter::new();
    if !region.is_empty() {
        filter = filter.regions(region);
    }
    if let Some(year) = year {
        filter = filter.year(year);
    }
    if !violence.is_empty() {
        filter = filter.violence_types(violence);
    }
    let view = table.filter(&filter);
    eprintln!("   {} of {} records match the filter", view.len(), table.len());

    let key = match by {
        ByArg::Month => GroupKey::Month,
        ByArg::Region => GroupKey::Region,
        ByArg::Violence => GroupKey::ViolenceType,
        ByArg::Year => GroupKey::Year,
    };
    let reducer = match measure {
        MeasureArg::Count => Reducer::Count,
        MeasureArg::Fatalities => Reducer::FatalitySum,
    };
    let order = if sorted { KeyOrder::Sorted } else { KeyOrder::FirstSeen };

    let rows = aggregate(&view, key, reducer, order);
    let mut out = String::new();
    for (key, value) in &rows {
        out.push_str(&format!("{}\t{}\n", key, value));
    }
    write_output(&out, output)?;

    eprintln!("✅ {} groups", rows.len());
    Ok(())
}

fn cmd_detect(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("🔍 Detecting: {}", input.display());
    let bytes = fs::read(input)?;

    let encoding = detect_encoding(&bytes);
    // The sniff must not fail on undecodable bytes; the strict check is the
    // load's job.
    let text = String::from_utf8_lossy(&bytes);
    let delimiter = detect_delimiter(&text);

    println!("Encoding:  {}", encoding);
    println!("Delimiter: {}", delimiter);
    println!(
        "Decimals:  {}",
        match delimiter {
            Delimiter::Semicolon => ",",
            Delimiter::Comma => ".",
        }
    );

    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            print!("{}", content);
        }
    }
    Ok(())
}
