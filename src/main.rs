use clap::{Parser, Subcommand, ValueEnum};
use po_intake::catalog::{Catalog, CatalogIndex, filter_options};
use po_intake::config::Config;
use po_intake::order::{self, OrderType};
use po_intake::order_store::OrderStore;
use po_intake::session::{ImportOutcome, OrderSession, SubmissionStatus};
use po_intake::{heuristics, pdf_text};
use std::path::{Path, PathBuf};
use tracing::{Instrument, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "po_intake")]
#[command(about = "Turn pasted purchase-order text into stored orders", long_about = None)]
struct Args {
    /// Config file path
    #[arg(long, default_value = "po_intake.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a text or PDF file and print what was recognized
    Parse { file: PathBuf },
    /// Parse a file into a new order, or into an existing one with --edit
    Import {
        file: PathBuf,
        /// Id of a stored order to re-import into
        #[arg(long, value_name = "ORDER_ID")]
        edit: Option<String>,
        #[arg(long, value_enum)]
        order_type: Option<OrderTypeArg>,
        /// Expected delivery date, YYYY-MM-DD
        #[arg(long, value_name = "DATE")]
        delivery: Option<String>,
    },
    /// Print a stored order as JSON
    Show { order_id: String },
    /// List stored order ids
    List,
    /// Record received goods for one line of a stored order
    Receive {
        order_id: String,
        sku: String,
        quantity: u32,
    },
    /// Search the catalog by name or SKU
    Search { term: String },
    /// List known suppliers, optionally filtered
    Suppliers { query: Option<String> },
    /// List catalog systems, optionally filtered
    Systems { query: Option<String> },
    /// Remember a new supplier in the config file
    AddSupplier { name: String },
    /// Print store statistics
    Stats,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OrderTypeArg {
    Normal,
    Project,
}

impl From<OrderTypeArg> for OrderType {
    fn from(arg: OrderTypeArg) -> Self {
        match arg {
            OrderTypeArg::Normal => OrderType::Normal,
            OrderTypeArg::Project => OrderType::Project,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    match args.command {
        Command::Parse { file } => {
            let catalog = Catalog::load(&cfg.catalog_path)?;
            let text = pdf_text::read_order_text(&file)?;
            let index = CatalogIndex::build(&catalog.items);
            let fragment = heuristics::parse_order_text(&text, &index);
            let (filled, total) = fragment.coverage();
            info!(filled, total, items = fragment.items.len(), "Heuristic coverage");
            println!("{}", serde_json::to_string_pretty(&fragment)?);
        }
        Command::Import {
            file,
            edit,
            order_type,
            delivery,
        } => {
            let span = tracing::info_span!("import", file = %file.display());
            import(&cfg, &file, edit, order_type.map(Into::into), delivery)
                .instrument(span)
                .await?;
        }
        Command::Show { order_id } => {
            let db = OrderStore::new(&cfg.db_path)?;
            let order = db
                .get_order(&order_id)?
                .ok_or_else(|| format!("No order found with id {order_id}"))?;
            println!("{}", serde_json::to_string_pretty(&order)?);
        }
        Command::List => {
            let db = OrderStore::new(&cfg.db_path)?;
            for id in db.get_order_ids()? {
                println!("{id}");
            }
        }
        Command::Receive {
            order_id,
            sku,
            quantity,
        } => {
            let db = OrderStore::new(&cfg.db_path)?;
            if db.set_quantity_received(&order_id, &sku, quantity)? == 0 {
                return Err(format!("Order {order_id} has no line {sku}").into());
            }
        }
        Command::Search { term } => {
            let catalog = Catalog::load(&cfg.catalog_path)?;
            for item in catalog.search(&term) {
                println!("{}\t{}", item.sku, item.name);
            }
        }
        Command::Systems { query } => {
            let catalog = Catalog::load(&cfg.catalog_path)?;
            for system in filter_options(&catalog.systems(), query.as_deref().unwrap_or("")) {
                println!("{system}");
            }
        }
        Command::Suppliers { query } => {
            let mut options = cfg.supplier_options.clone();
            if let Ok(catalog) = Catalog::load(&cfg.catalog_path) {
                for supplier in catalog.suppliers() {
                    if !options.contains(&supplier) {
                        options.push(supplier);
                    }
                }
            }
            for supplier in filter_options(&options, query.as_deref().unwrap_or("")) {
                println!("{supplier}");
            }
        }
        Command::AddSupplier { name } => {
            let name = name.trim();
            if name.is_empty() {
                return Err("Supplier name must not be empty".into());
            }
            if !Config::add_supplier_option(&args.config, name)? {
                println!("{name} is already listed");
            }
        }
        Command::Stats => {
            let db = OrderStore::new(&cfg.db_path)?;
            let (orders, lines, deleted) = db.get_counts()?;
            info!(
                orders_total = orders,
                lines_total = lines,
                lines_deleted = deleted,
                "Database statistics"
            );
        }
    }

    Ok(())
}

/// Parse `file` into a create or edit session and save it.
async fn import(
    cfg: &Config,
    file: &Path,
    edit: Option<String>,
    order_type: Option<OrderType>,
    delivery: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    if !cfg.enable_smart_import {
        return Err("Text import is disabled in the config".into());
    }

    if let Some(dir) = Path::new(&cfg.db_path).parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let db = OrderStore::new(&cfg.db_path)?;
    let catalog = Catalog::load(&cfg.catalog_path)?;

    let mut session = match edit {
        Some(id) => {
            let order = db
                .get_order(&id)?
                .ok_or_else(|| format!("No order found with id {id}"))?;
            OrderSession::edit(order, &catalog)
        }
        None => OrderSession::create(order::today()),
    };

    if let Some(order_type) = order_type {
        session.header.order_type = Some(order_type);
    }
    if let Some(delivery) = delivery {
        session.header.expected_delivery_date = Some(order::parse_iso_date(&delivery)?);
    }

    let text = pdf_text::read_order_text(file)?;
    let index = CatalogIndex::build(&catalog.items);
    let fragment = heuristics::parse_order_text(&text, &index);

    match session.apply_fragment(fragment) {
        ImportOutcome::Imported(count) => {
            info!(count, lines = session.lines().len(), "Positions recognized")
        }
        ImportOutcome::NoItemsRecognized => {
            warn!("No known catalog items found in the text");
        }
    }

    session.submit(&db, cfg.require_delivery_date).await?;
    match session.status() {
        SubmissionStatus::Succeeded => {
            println!("{}", serde_json::to_string_pretty(&session.to_purchase_order())?);
            Ok(())
        }
        SubmissionStatus::Failed(reason) => Err(format!("Saving order failed: {reason}").into()),
        status => Err(format!("Unexpected submission state {status:?}").into()),
    }
}
