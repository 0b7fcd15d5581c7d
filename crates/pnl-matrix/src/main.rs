//! P&L Matrix
//!
//! Serves the monthly P&L tree over HTTP and prints trees, breakdowns and
//! cell drill-downs on the console.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pnl_model::Dimension;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pnl_matrix::bigquery::BigQueryClient;
use pnl_matrix::config::{Config, FileConfig, mask_credentials};
use pnl_matrix::constants;
use pnl_matrix::fixtures::MemoryStore;
use pnl_matrix::ledger::{Ledger, MySqlLedger};
use pnl_matrix::overlay::CorrectionSource;
use pnl_matrix::pivot::placeholders;
use pnl_matrix::render;
use pnl_matrix::request::{BreakdownParams, DetailParams, parse_year};
use pnl_matrix::server;
use pnl_matrix::service::PnlService;
use pnl_matrix::session::{BreakdownCache, TreeView};
use pnl_matrix::warehouse::Warehouse;

#[derive(Parser, Debug)]
#[command(name = "pnl-matrix")]
#[command(about = "Monthly P&L matrix from the invoice warehouse and the expense ledger")]
struct Args {
    /// Config file
    #[arg(long, default_value = constants::CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Read invoices, payables and postings from a JSON fixture file instead
    /// of the configured stores
    #[arg(long, global = true)]
    fixtures: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API
    Serve {
        /// Bind address, overrides server.bind
        #[arg(long)]
        bind: Option<String>,
    },

    /// Print the year tree
    Tree {
        /// Year (default: current year)
        #[arg(long)]
        year: Option<String>,

        /// Node ids to expand, including breakdown placeholders
        /// (e.g. gross_revenue.breakdown.family)
        #[arg(long)]
        expand: Vec<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print one breakdown of a sales line
    Breakdown {
        /// Sales line id (gross_revenue, returns, discount, cogs, ...)
        #[arg(long)]
        line: String,

        /// family, product, volume_family or volume_product
        #[arg(long)]
        dimension: String,

        #[arg(long)]
        year: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Print the items behind one cell
    Detail {
        /// Month (YYYY-MM)
        #[arg(long)]
        month: String,

        /// line, tax, expense or financial_revenue
        #[arg(long)]
        kind: String,

        #[arg(long)]
        line: Option<String>,

        #[arg(long)]
        tax: Option<String>,

        #[arg(long)]
        scenario: Option<String>,

        #[arg(long)]
        group: Option<String>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        parent: Option<String>,

        #[arg(long)]
        json: bool,
    },
}

fn setup_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Load the config file. It may be absent when running on fixtures.
fn load_config_file(path: &Path, required: bool) -> Result<FileConfig> {
    if !path.exists() {
        if required {
            anyhow::bail!(
                "Config file '{}' not found.\n\n\
                To get started:\n\
                1. Copy config.toml.example to config.toml\n\
                2. Fill in the warehouse and ledger sections\n\n\
                Or run against a fixture file with --fixtures <file.json>.",
                path.display()
            );
        }
        return Ok(FileConfig::default());
    }
    FileConfig::load(path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.verbose);

    let file_config = load_config_file(&args.config, args.fixtures.is_none())?;
    let bind_override = match &args.command {
        Command::Serve { bind } => bind.as_deref(),
        _ => None,
    };
    let config = Config::from_file(&file_config, bind_override)?;
    let corrections = CorrectionSource::from_path(config.corrections_path.clone());

    match &args.fixtures {
        Some(path) => {
            let store = MemoryStore::load(path)?;
            info!(
                fixtures = %path.display(),
                invoice_lines = store.invoice_lines.len(),
                payables = store.payables.len(),
                postings = store.postings.len(),
                "using fixture store"
            );
            let service = PnlService::new(store.clone(), store, corrections);
            run(args.command, service, &config).await
        }
        None => {
            let warehouse = config
                .warehouse
                .as_ref()
                .context("Missing [warehouse] section in config")?;
            let ledger = config.ledger.as_ref().context("Missing [ledger] section in config")?;
            info!(
                project = %warehouse.project_id,
                table = %warehouse.table,
                ledger = %mask_credentials(&ledger.database_url),
                "using configured stores"
            );
            let service = PnlService::new(BigQueryClient::new(warehouse), MySqlLedger::new(ledger), corrections);
            run(args.command, service, &config).await
        }
    }
}

async fn run<W, L>(command: Command, service: PnlService<W, L>, config: &Config) -> Result<()>
where
    W: Warehouse + 'static,
    L: Ledger + 'static,
{
    match command {
        Command::Serve { .. } => server::serve(service, config.bind).await,

        Command::Tree { year, expand, json } => {
            let year = parse_year(year.as_deref())?;
            let tree = service.build_year_tree(year).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tree)?);
                return Ok(());
            }

            let expanded: HashSet<String> = expand.into_iter().collect();
            let mut cache = BreakdownCache::new();
            for placeholder in tree.iter().flat_map(placeholders) {
                let Some(request) = placeholder.breakdown() else {
                    continue;
                };
                if !expanded.contains(&placeholder.id) {
                    continue;
                }
                let ticket = cache.begin(&placeholder.id, year);
                let result = service.breakdown(year, request).await.map_err(|err| err.to_body());
                cache.complete(&ticket, result);
            }

            let view = TreeView::new(year, &tree, &cache);
            println!("\nP&L {}\n", year);
            render::print_rows(year, &view.flatten(&expanded));
            Ok(())
        }

        Command::Breakdown {
            line,
            dimension,
            year,
            json,
        } => {
            let params = BreakdownParams { year, line: Some(line) };
            let (year, line, dimension) = params.parse(&dimension)?;
            let nodes = match dimension {
                Dimension::Family => service.family_breakdown(year, line).await?,
                Dimension::Product => service.product_breakdown(year, line).await?,
                Dimension::VolumeFamily => service.volume_family_breakdown(year, line).await?,
                Dimension::VolumeProduct => service.volume_product_breakdown(year, line).await?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&nodes)?);
            } else {
                println!("\n{} by {} ({})\n", line, dimension, year);
                let rows: Vec<_> = nodes.into_iter().map(|node| (0, node)).collect();
                render::print_rows(year, &rows);
            }
            Ok(())
        }

        Command::Detail {
            month,
            kind,
            line,
            tax,
            scenario,
            group,
            category,
            parent,
            json,
        } => {
            let params = DetailParams {
                month: Some(month),
                kind: Some(kind),
                line,
                tax,
                scenario,
                group,
                category,
                parent,
            };
            let (month, target) = params.parse()?;
            let detail = service.cell_detail(month, &target).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&detail)?);
            } else {
                println!("\n{:?} in {}\n", target, month);
                render::print_detail(&detail);
            }
            Ok(())
        }
    }
}
