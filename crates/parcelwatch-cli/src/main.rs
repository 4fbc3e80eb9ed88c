//! parcelwatch: match deed recordings against a parcel watchlist.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use parcelwatch_core::legal::parse_legal_description;
use parcelwatch_core::{
    AddressMetric, DeedRecord, LotTractMapping, LotTractSource, Matcher, MatcherConfig, WatchlistSource,
};
use parcelwatch_store::{DuckStore, csv_import};
use parcelwatch_sync::RestClient;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod display;

#[derive(Parser, Debug)]
#[command(name = "parcelwatch")]
#[command(version, about = "Match deed recordings to watchlist parcels", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Match one deed recording against the watchlist
    Match {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        tuning: TuningArgs,
        #[command(flatten)]
        deed: DeedArgs,
        /// Print the result as JSON instead of a card
        #[arg(long)]
        json: bool,
    },

    /// Import a watchlist CSV into a DuckDB reference database
    ImportWatchlist {
        csv: PathBuf,
        #[arg(long)]
        db: PathBuf,
    },

    /// Import a lot/tract → APN CSV into a DuckDB reference database
    ImportLotTract {
        csv: PathBuf,
        #[arg(long)]
        db: PathBuf,
    },

    /// Add a lot/tract → APN mapping and persist it to the source
    AddMapping {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long)]
        lot: String,
        #[arg(long)]
        tract: String,
        #[arg(long, default_value = "")]
        city: String,
        #[arg(long)]
        apn: String,
    },

    /// Extract lot and tract numbers from a legal description
    ParseLegal { text: String },
}

/// Where the watchlist and lot/tract tables live.
#[derive(Args, Debug)]
struct SourceArgs {
    /// DuckDB reference database (takes precedence over the REST settings)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Base URL of the hosted database
    #[arg(long, env = "PARCELWATCH_REST_URL")]
    rest_url: Option<String>,

    /// API key for the hosted database
    #[arg(long, env = "PARCELWATCH_REST_KEY", hide_env_values = true)]
    rest_key: Option<String>,
}

#[derive(Args, Debug)]
struct TuningArgs {
    /// JSON matcher config; flags below override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Minimum address similarity accepted as a match (0-1)
    #[arg(long)]
    min_confidence: Option<f64>,

    /// Do not retry lot/tract lookups with the city ignored
    #[arg(long)]
    no_city_fallback: bool,

    /// Address similarity metric: gestalt or levenshtein
    #[arg(long)]
    metric: Option<AddressMetric>,
}

#[derive(Args, Debug)]
struct DeedArgs {
    #[arg(long)]
    apn: Option<String>,
    #[arg(long)]
    lot: Option<String>,
    #[arg(long)]
    tract: Option<String>,
    #[arg(long)]
    city: Option<String>,
    #[arg(long)]
    address: Option<String>,
    /// Legal description; fills in lot/tract when those flags are absent
    #[arg(long)]
    legal: Option<String>,
    /// Documentary transfer tax paid, in dollars
    #[arg(long)]
    dtt: Option<f64>,
    #[arg(long)]
    doc_number: Option<String>,
    /// Recording date, YYYY-MM-DD
    #[arg(long)]
    recorded: Option<NaiveDate>,
    #[arg(long)]
    doc_type: Option<String>,
    #[arg(long)]
    grantor: Option<String>,
    #[arg(long)]
    grantee: Option<String>,
}

// ── Sources ──

enum Backend {
    Duck(DuckStore),
    Rest(RestClient),
}

impl Backend {
    fn watchlist(&self) -> &dyn WatchlistSource {
        match self {
            Self::Duck(store) => store,
            Self::Rest(client) => client,
        }
    }

    fn lot_tract(&self) -> &dyn LotTractSource {
        match self {
            Self::Duck(store) => store,
            Self::Rest(client) => client,
        }
    }
}

impl SourceArgs {
    fn open(&self) -> Result<Backend> {
        if let Some(path) = &self.db {
            let store = DuckStore::open_persistent(path)
                .with_context(|| format!("opening {}", path.display()))?;
            return Ok(Backend::Duck(store));
        }
        match (&self.rest_url, &self.rest_key) {
            (Some(url), Some(key)) => Ok(Backend::Rest(RestClient::new(url.clone(), key.clone()))),
            (Some(_), None) => bail!("--rest-url given without --rest-key (or PARCELWATCH_REST_KEY)"),
            _ => bail!("no source: pass --db, or --rest-url with --rest-key"),
        }
    }
}

// ── Config ──

impl TuningArgs {
    fn resolve(&self) -> Result<MatcherConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                MatcherConfig::from_json(&json).with_context(|| format!("parsing {}", path.display()))?
            }
            None => MatcherConfig::default(),
        };
        if let Some(min) = self.min_confidence {
            config.min_address_confidence = min;
        }
        if self.no_city_fallback {
            config.lot_tract_city_fallback = false;
        }
        if let Some(metric) = self.metric {
            config.address_metric = metric;
        }
        config.validate()?;
        Ok(config)
    }
}

impl DeedArgs {
    fn into_record(self) -> DeedRecord {
        let parsed = self.legal.as_deref().and_then(parse_legal_description);
        let (lot, tract) = match (self.lot, self.tract, parsed) {
            (lot, tract, Some(p)) => (lot.or(Some(p.lot)), tract.or(Some(p.tract))),
            (lot, tract, None) => (lot, tract),
        };
        DeedRecord {
            doc_number: self.doc_number,
            recording_date: self.recorded,
            doc_type: self.doc_type,
            apn: self.apn,
            lot_number: lot,
            tract_number: tract,
            address: self.address,
            city: self.city,
            grantor: self.grantor,
            grantee: self.grantee,
            documentary_transfer_tax: self.dtt,
        }
    }
}

// ── Commands ──

async fn run_match(source: SourceArgs, tuning: TuningArgs, deed: DeedArgs, json: bool) -> Result<()> {
    let config = tuning.resolve()?;
    let backend = source.open()?;
    let matcher = Matcher::load(backend.watchlist(), backend.lot_tract(), config)
        .await
        .context("loading watchlist")?;

    let record = deed.into_record();
    let result = matcher.match_record(&record);
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        display::print_match_card(&result, &record, matcher.config().dtt_rate);
    }
    Ok(())
}

fn import_watchlist(csv: &Path, db: &Path) -> Result<()> {
    let import = csv_import::read_watchlist_file(csv).with_context(|| format!("reading {}", csv.display()))?;
    let store = DuckStore::open_persistent(db).with_context(|| format!("opening {}", db.display()))?;
    let written = store.insert_watchlist(&import.entries)?;
    println!(
        "Imported {written} watchlist parcels ({} without APN, {} duplicates skipped); table now holds {}",
        import.missing_apn,
        import.duplicates,
        store.watchlist_count()?
    );
    Ok(())
}

fn import_lot_tract(csv: &Path, db: &Path) -> Result<()> {
    let import = csv_import::read_lot_tract_file(csv).with_context(|| format!("reading {}", csv.display()))?;
    let store = DuckStore::open_persistent(db).with_context(|| format!("opening {}", db.display()))?;
    let written = store.insert_lot_tract(&import.mappings)?;
    println!(
        "Imported {written} lot/tract mappings ({} from legal descriptions, {} rows skipped); table now holds {}",
        import.from_legal,
        import.skipped,
        store.lot_tract_count()?
    );
    Ok(())
}

async fn add_mapping(source: SourceArgs, mapping: LotTractMapping) -> Result<()> {
    let backend = source.open()?;
    let matcher = Matcher::load(backend.watchlist(), backend.lot_tract(), MatcherConfig::default())
        .await
        .context("loading lookup tables")?;

    let outcome = matcher.add_mapping(backend.lot_tract(), mapping).await?;
    let m = &outcome.mapping;
    match &outcome.previous {
        Some(prev) => println!(
            "Lot {}, Tract {} ({}) → {} (replaced {prev})",
            m.lot_number, m.tract_number, m.city, m.apn
        ),
        None => println!("Lot {}, Tract {} ({}) → {}", m.lot_number, m.tract_number, m.city, m.apn),
    }
    if matcher.watchlist().get(&m.apn).is_none() {
        println!("note: {} is not on the watchlist", m.apn);
    }
    match outcome.persisted {
        Ok(()) => {
            println!("Saved.");
            Ok(())
        }
        Err(e) => Err(e).context("mapping applied in memory but not persisted"),
    }
}

fn parse_legal(text: &str) -> Result<()> {
    match parse_legal_description(text) {
        Some(lt) => {
            println!("lot={} tract={}", lt.lot, lt.tract);
            Ok(())
        }
        None => bail!("no lot/tract found in {text:?}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    info!("parcelwatch v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Match {
            source,
            tuning,
            deed,
            json,
        } => run_match(source, tuning, deed, json).await,
        Commands::ImportWatchlist { csv, db } => import_watchlist(&csv, &db),
        Commands::ImportLotTract { csv, db } => import_lot_tract(&csv, &db),
        Commands::AddMapping {
            source,
            lot,
            tract,
            city,
            apn,
        } => add_mapping(source, LotTractMapping::new(lot, tract, city, apn)).await,
        Commands::ParseLegal { text } => parse_legal(&text),
    }
}
