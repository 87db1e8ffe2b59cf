use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ftpscan_core::logging::{init_logging, LogConfig, LogFormat};
use ftpscan_core::ScannerConfig;
use results_sqlite::{export_results_to_parquet, Db, Sink};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use sweep::{Scanner, SweepReport};
use tracing::info;

mod config;
mod export;

use config::{DnsArgs, FillArgs, ScanArgs};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ExportFormat {
    Jsonl,
    Csv,
    Parquet,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "ftpscan", version, about = "IPv4-wide anonymous FTP survey")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./ftpscan.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Results database (default ./ftp.sqlite)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[arg(long, global = true, value_enum, default_value_t = LogFormatArg::Text)]
    log_format: LogFormatArg,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Sweep the address space from a start address
    Scan(ScanArgs),
    /// Probe known hosts that have no service record yet
    Fill(FillArgs),
    /// Resolve names for known hosts that have none yet
    Dns(DnsArgs),
    /// Write host and service rows out of the database
    Export {
        #[arg(long, value_enum, default_value_t = ExportFormat::Jsonl)]
        format: ExportFormat,
        /// Output file; stdout when omitted (required for parquet)
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
        /// Only hosts that accepted an anonymous login
        #[arg(long, default_value_t = false)]
        anonymous_only: bool,
    },
    /// Print result counts
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = match cli.log_format {
        LogFormatArg::Text => LogFormat::Text,
        LogFormatArg::Json => LogFormat::Json,
    };
    init_logging(LogConfig::default().level(cli.log_level.clone()).format(format));

    let loaded = config::load_config(cli.config.as_deref())?.unwrap_or_default();
    let db_path = cli
        .db
        .clone()
        .or_else(|| loaded.db.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("ftp.sqlite"));

    match cli.command {
        Commands::Version => {
            println!("ftpscan {} (core {})", env!("CARGO_PKG_VERSION"), ftpscan_core::version());
        }
        Commands::Scan(args) => {
            let cfg = config::scan_config(&args, loaded.scan.as_ref())?;
            run(cfg, &db_path)?;
        }
        Commands::Fill(args) => {
            let cfg = config::fill_config(&args, loaded.fill.as_ref())?;
            run(cfg, &db_path)?;
        }
        Commands::Dns(args) => {
            let cfg = config::dns_config(&args, loaded.dns.as_ref())?;
            run(cfg, &db_path)?;
        }
        Commands::Export { format, out, anonymous_only } => {
            let db = Db::open_or_create(&db_path)?;
            match format {
                ExportFormat::Parquet => {
                    let path = out.ok_or_else(|| anyhow!("--format parquet requires --out <file>"))?;
                    let n = export_results_to_parquet(&db, anonymous_only, &path)?;
                    info!(rows = n, path = %path.display(), "parquet written");
                }
                ExportFormat::Jsonl | ExportFormat::Csv => {
                    let rows = db.result_rows(anonymous_only)?;
                    let sink: Box<dyn std::io::Write> = match &out {
                        Some(p) => Box::new(BufWriter::new(File::create(p)?)),
                        None => Box::new(std::io::stdout().lock()),
                    };
                    if format == ExportFormat::Csv {
                        export::write_csv(&rows, sink)?;
                    } else {
                        export::write_jsonl(&rows, sink)?;
                    }
                    info!(rows = rows.len(), "export finished");
                }
            }
        }
        Commands::Stats => {
            let db = Db::open_or_create(&db_path)?;
            let s = db.summary()?;
            println!("hosts:          {}", s.hosts);
            println!("services:       {}", s.services);
            println!("available:      {}", s.available);
            println!("anonymous:      {}", s.anonymous);
            println!("tls:            {}", s.ftps);
            println!("awaiting probe: {}", s.awaiting_probe);
            println!("named hosts:    {}", s.named_hosts);
        }
    }
    Ok(())
}

fn run(cfg: ScannerConfig, db_path: &std::path::Path) -> Result<()> {
    let sink = Arc::new(Sink::new(Db::open_or_create(db_path)?));
    let scanner = Scanner::new(cfg, sink)?;
    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(scanner.run())?;
    println!("{}", summary_line(&report));
    Ok(())
}

fn summary_line(r: &SweepReport) -> String {
    format!(
        "{}: dispatched {} reachable {} anonymous {} tls {} timeouts {} failures {} names {} in {:.1}s",
        r.mode.as_str(),
        r.dispatched,
        r.reachable,
        r.anonymous,
        r.tls,
        r.timeouts,
        r.unexpected_failures + r.write_failures,
        r.names,
        r.elapsed.as_secs_f64()
    )
}
