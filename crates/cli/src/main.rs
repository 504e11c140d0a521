use std::io::Read;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing::info;

use tabula_api::{AppRecord, OneOrMany, Query, RecordService, Removal, TableService};
use tabula_query::{build_params, normalize, to_query_pairs};
use tabula_transport::{HttpTransport, TransportConfig};

#[derive(Parser, Debug)]
#[command(name = "tabulactl", version, about = "Tabula CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// API root, e.g. https://api.airtable.com/v0
    #[arg(long = "api-root", env = "TABULA_API_ROOT", global = true)]
    api_root: Option<String>,

    /// Base id
    #[arg(long = "base", env = "TABULA_BASE_ID", global = true)]
    base_id: Option<String>,

    /// Table name or id
    #[arg(long = "table", env = "TABULA_TABLE", global = true)]
    table: Option<String>,

    /// Bearer token sent with every request
    #[arg(long = "api-key", env = "TABULA_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long = "timeout-secs", env = "TABULA_TIMEOUT_SECS", global = true)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// List records matching a structured query
    Find {
        /// Query JSON, e.g. '{"status":"open","$limit":10}' ("-" reads stdin)
        #[arg(long = "query")]
        query: Option<String>,
    },
    /// Fetch one record by id
    Get { id: String },
    /// Create a record (JSON object) or several (JSON array)
    Create { data: String },
    /// Partially update records
    Patch {
        #[arg(long = "id")]
        id: Option<String>,
        data: String,
    },
    /// Replace a record's fields
    Update {
        #[arg(long = "id")]
        id: Option<String>,
        data: String,
    },
    /// Delete by id, or every record matching --query when no id is given
    Remove {
        #[arg(long = "id")]
        id: Option<String>,
        #[arg(long = "query")]
        query: Option<String>,
    },
    /// Compile a query offline and print the formula and transport params
    Formula { query: String },
}

fn init_tracing() {
    let env = std::env::var("TABULA_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("TABULA_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid TABULA_METRICS_ADDR; expected host:port");
        }
    }
}

impl Cli {
    fn transport_config(&self) -> Result<TransportConfig> {
        let base_id = self.base_id.clone().ok_or_else(|| anyhow!("--base (or TABULA_BASE_ID) is required"))?;
        let table = self.table.clone().ok_or_else(|| anyhow!("--table (or TABULA_TABLE) is required"))?;
        let mut cfg = TransportConfig::new(base_id, table);
        if let Some(root) = &self.api_root {
            cfg.api_root = root.clone();
        }
        cfg.api_key = self.api_key.clone().filter(|k| !k.is_empty());
        cfg.timeout = self.timeout_secs.map(Duration::from_secs);
        Ok(cfg)
    }
}

/// Parse a JSON argument; "-" reads it from stdin.
fn read_json(arg: &str) -> Result<Value> {
    let text = if arg == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).context("reading stdin")?;
        buf
    } else {
        arg.to_string()
    };
    serde_json::from_str(&text).with_context(|| format!("parsing JSON argument: {}", text.trim()))
}

fn read_query(arg: Option<&str>) -> Result<Query> {
    match arg {
        None => Ok(Query::new()),
        Some(a) => match read_json(a)? {
            Value::Object(m) => Ok(m),
            other => Err(anyhow!("query must be a JSON object, got {}", other)),
        },
    }
}

fn read_record(arg: &str) -> Result<AppRecord> {
    match read_json(arg)? {
        Value::Object(m) => Ok(m),
        other => Err(anyhow!("record must be a JSON object, got {}", other)),
    }
}

fn read_records(arg: &str) -> Result<OneOrMany<AppRecord>> {
    serde_json::from_value(read_json(arg)?).context("expected a JSON object or an array of objects")
}

fn print_records(output: Output, records: &[AppRecord]) -> Result<()> {
    match output {
        Output::Human => {
            for r in records {
                let id = r.get("id").and_then(Value::as_str).unwrap_or("-");
                let mut rest = r.clone();
                rest.remove("id");
                println!("{:<18} {}", id, Value::Object(rest));
            }
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(records)?),
    }
    Ok(())
}

fn print_removals(output: Output, removals: &[Removal]) -> Result<()> {
    match output {
        Output::Human => {
            for r in removals {
                match r {
                    Removal::Deleted(d) => println!("- {}", d.id),
                    Removal::Passthrough(v) => println!("? {}", v),
                }
            }
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(removals)?),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    if let Commands::Formula { query } = &cli.command {
        let query = read_query(Some(query))?;
        let normalized = normalize(&query)?;
        let params = build_params(&normalized.selection);
        match cli.output {
            Output::Human => {
                println!("formula: {}", normalized.selection.filter_formula.as_deref().unwrap_or("(none)"));
                if normalized.skip > 0 {
                    println!("skip (client-side): {}", normalized.skip);
                }
                for (k, v) in to_query_pairs(&params) {
                    println!("{k}={v}");
                }
            }
            Output::Json => println!("{}", serde_json::to_string_pretty(&Value::Object(params))?),
        }
        return Ok(());
    }

    let transport = HttpTransport::new(cli.transport_config()?)?;
    info!(table = %transport.config().table, base = %transport.config().base_id, "tabulactl connected");
    let service = TableService::new(transport);

    match &cli.command {
        Commands::Find { query } => {
            let query = read_query(query.as_deref())?;
            let records = service.find(&query).await?;
            print_records(cli.output, &records)?;
        }
        Commands::Get { id } => {
            let record = service.get(id).await?;
            print_records(cli.output, &[record])?;
        }
        Commands::Create { data } => {
            let created = service.create(read_records(data)?).await?;
            print_records(cli.output, &created.into_vec())?;
        }
        Commands::Patch { id, data } => {
            let patched = service.patch(id.as_deref(), read_records(data)?).await?;
            print_records(cli.output, &patched.into_vec())?;
        }
        Commands::Update { id, data } => {
            let updated = service.update(id.as_deref(), read_record(data)?).await?;
            print_records(cli.output, &[updated])?;
        }
        Commands::Remove { id, query } => {
            let query = read_query(query.as_deref())?;
            let removed = service.remove(id.as_deref(), &query).await?;
            print_removals(cli.output, &removed.into_vec())?;
        }
        Commands::Formula { .. } => {}
    }

    Ok(())
}
