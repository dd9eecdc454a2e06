//! vector-migrate CLI
//!
//! Copies vector collections between stores and verifies the result.
//! Pedantic lints relaxed for CLI ergonomics.

// CLI tool - relax pedantic lints for ergonomics
#![allow(clippy::pedantic)]

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use vector_migrate::config::{QdrantConfig, QdrantTargetConfig};
use vector_migrate::connectors::create_source;
use vector_migrate::report::Report;
use vector_migrate::retry::RetryConfig;
use vector_migrate::{
    MigrationConfig, MigrationOptions, Paginator, Pipeline, SourceConfig, TargetConfig,
};

#[derive(Parser)]
#[command(name = "vector-migrate")]
#[command(version)]
#[command(about = "Copy vector collections between stores and verify the result", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Dry run mode (don't write to destination)
    #[arg(long)]
    dry_run: bool,

    /// Stop cleanly after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout_secs: Option<u64>,

    /// Hide the progress bar
    #[arg(short, long)]
    quiet: bool,
}

/// Endpoints of the `qdrant` quick run. URLs win over host settings.
#[derive(clap::Args)]
struct QdrantArgs {
    /// Source Qdrant URL
    #[arg(long, env = "SOURCE_QDRANT_URL")]
    source_url: Option<String>,

    /// Source Qdrant host, used when no source URL is given
    #[arg(long, env = "SOURCE_QDRANT_HOST", default_value = "localhost")]
    source_host: String,

    /// Source Qdrant port, used with the source host
    #[arg(long, env = "SOURCE_QDRANT_PORT", default_value_t = 6333)]
    source_port: u16,

    /// Target Qdrant URL
    #[arg(long, env = "TARGET_QDRANT_URL")]
    target_url: Option<String>,

    /// Target Qdrant Cloud host, reached over https when no target URL is given
    #[arg(long, env = "TARGET_QDRANT_HOST")]
    target_host: Option<String>,

    /// Target Qdrant API key (required with the target host)
    #[arg(long, env = "TARGET_QDRANT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Collection to copy
    #[arg(long, env = "COLLECTION_NAME", default_value = "sengol_incidents")]
    collection: String,

    /// Records per batch
    #[arg(long, env = "BATCH_SIZE", default_value_t = 100)]
    batch_size: usize,
}

impl QdrantArgs {
    fn source_url(&self) -> String {
        self.source_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.source_host, self.source_port))
    }

    fn target_url(&self) -> anyhow::Result<String> {
        if let Some(url) = &self.target_url {
            return Ok(url.clone());
        }
        match (&self.target_host, &self.api_key) {
            (Some(host), Some(_)) => Ok(format!("https://{host}")),
            (Some(_), None) => {
                anyhow::bail!("TARGET_QDRANT_HOST requires TARGET_QDRANT_API_KEY to be set")
            }
            (None, _) => anyhow::bail!("Set TARGET_QDRANT_URL or TARGET_QDRANT_HOST"),
        }
    }

    fn into_config(self) -> anyhow::Result<MigrationConfig> {
        let source_url = self.source_url();
        let target_url = self.target_url()?;
        Ok(MigrationConfig {
            source: SourceConfig::Qdrant(QdrantConfig {
                url: source_url,
                collection: self.collection,
                api_key: None,
                timeout_secs: 60,
            }),
            destination: TargetConfig::Qdrant(QdrantTargetConfig {
                url: target_url,
                collection: None,
                api_key: self.api_key,
                timeout_secs: 60,
                dimension: None,
                distance: None,
            }),
            options: MigrationOptions {
                batch_size: self.batch_size,
                ..MigrationOptions::default()
            },
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run migration from config file
    Run {
        /// Configuration file path
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// Batch size override
        #[arg(long)]
        batch_size: Option<usize>,

        /// Writer task override
        #[arg(long)]
        workers: Option<usize>,

        /// Stop after this many records
        #[arg(long)]
        limit: Option<u64>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Validate configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },

    /// Show the source collection descriptor and count
    Schema {
        /// Configuration file path
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },

    /// Generate example configuration
    Init {
        /// Template (qdrant, jsonl, export)
        #[arg(short, long)]
        source: String,

        /// Output file path
        #[arg(short, long, default_value = "migration.yaml")]
        output: PathBuf,
    },

    /// Copy one Qdrant collection to another Qdrant instance, configured from the environment
    Qdrant {
        #[command(flatten)]
        endpoints: QdrantArgs,

        #[command(flatten)]
        run: RunArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run {
            config,
            batch_size,
            workers,
            limit,
            run,
        } => {
            info!("Loading configuration from {:?}", config);
            let mut config = MigrationConfig::from_file(&config)?;
            if let Some(bs) = batch_size {
                config.options.batch_size = bs;
            }
            if let Some(w) = workers {
                config.options.workers = w;
            }
            if limit.is_some() {
                config.options.limit = limit;
            }
            run_migration(config, &run).await?;
        }
        Commands::Validate { config } => {
            validate_config(&config)?;
        }
        Commands::Schema { config } => {
            show_schema(&config).await?;
        }
        Commands::Init { source, output } => {
            generate_config(&source, &output)?;
        }
        Commands::Qdrant { endpoints, run } => {
            let config = endpoints.into_config()?;
            run_migration(config, &run).await?;
        }
    }

    Ok(())
}

async fn run_migration(mut config: MigrationConfig, args: &RunArgs) -> anyhow::Result<()> {
    if args.dry_run {
        config.options.dry_run = true;
    }

    let token = CancellationToken::new();
    let on_interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after in-flight batches");
            on_interrupt.cancel();
        }
    });
    if let Some(secs) = args.timeout_secs {
        let on_timeout = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            warn!("Timeout of {}s reached, stopping after in-flight batches", secs);
            on_timeout.cancel();
        });
    }

    let show_progress = !args.quiet && console::Term::stderr().is_term();
    let pipeline = Pipeline::from_config(&config)?
        .with_cancellation(token)
        .with_progress(show_progress);

    let report = Report::new();
    match pipeline.run().await {
        Ok(result) => {
            report.print_success(&result)?;
            Ok(())
        }
        Err(failure) => {
            report.print_failure(&failure)?;
            error!("{}", failure);
            std::process::exit(1);
        }
    }
}

fn validate_config(config_path: &Path) -> anyhow::Result<()> {
    info!("Validating configuration from {:?}", config_path);

    let config = MigrationConfig::from_file(config_path)?;
    config.validate()?;
    let plan = config.plan();

    let source_type = match &config.source {
        SourceConfig::Qdrant(cfg) => format!("qdrant ({})", cfg.url),
        SourceConfig::JsonlFile(cfg) => format!("jsonl_file ({})", cfg.path.display()),
    };
    let destination_type = match &config.destination {
        TargetConfig::Qdrant(cfg) => format!("qdrant ({})", cfg.url),
        TargetConfig::JsonFile(cfg) => format!("json_file ({})", cfg.path.display()),
    };

    println!("Configuration is valid");
    println!("   Source:      {} '{}'", source_type, plan.source_collection);
    println!("   Destination: {} '{}'", destination_type, plan.target_collection);
    println!("   Batch size:  {}", plan.batch_size);
    println!("   Workers:     {} ({} in flight)", plan.workers, plan.max_in_flight);
    if let Some(limit) = plan.limit {
        println!("   Limit:       {}", limit);
    }
    if plan.dry_run {
        println!("   Dry run:     yes");
    }

    Ok(())
}

async fn show_schema(config_path: &Path) -> anyhow::Result<()> {
    info!("Loading configuration from {:?}", config_path);

    let config = MigrationConfig::from_file(config_path)?;
    let source = create_source(&config.source)?;
    let paginator = Paginator::new(
        source,
        config.source.collection(),
        RetryConfig::from(&config.options.retry),
    );

    let info = paginator.describe().await?;
    paginator.close().await?;

    Report::new().print_schema(paginator.source_type(), &info)?;
    Ok(())
}

fn generate_config(source: &str, output: &Path) -> anyhow::Result<()> {
    let Some(template) = template_for(source) else {
        error!("Unknown template: {}", source);
        eprintln!("Supported templates: qdrant, jsonl, export");
        std::process::exit(1);
    };

    std::fs::write(output, template)?;
    println!("Generated configuration: {:?}", output);
    println!(
        "   Edit the file and run: vector-migrate run --config {:?}",
        output
    );

    Ok(())
}

fn template_for(source: &str) -> Option<&'static str> {
    match source.to_lowercase().as_str() {
        "qdrant" => Some(QDRANT_TEMPLATE),
        "jsonl" | "jsonl_file" => Some(JSONL_TEMPLATE),
        "export" | "json_file" => Some(EXPORT_TEMPLATE),
        _ => None,
    }
}

const QDRANT_TEMPLATE: &str = r#"# vector-migrate configuration - Qdrant to Qdrant
source:
  type: qdrant
  url: http://localhost:6333
  collection: your_collection
  # api_key: your-api-key  # Optional

destination:
  type: qdrant
  url: https://your-cluster.cloud.qdrant.io
  # api_key: your-api-key
  # collection: renamed_collection  # Defaults to the source collection
  # dimension: 1536                  # Defaults to the source dimension
  # distance: cosine                 # cosine, dot, or euclidean

options:
  batch_size: 100
  workers: 2
  dry_run: false
  retry:
    max_retries: 5
    initial_delay_ms: 500
"#;

const JSONL_TEMPLATE: &str = r#"# vector-migrate configuration - JSONL embeddings to Qdrant
source:
  type: jsonl_file
  path: ./embeddings.jsonl
  collection: incidents
  id_field: id
  vector_field: embedding
  distance: cosine

destination:
  type: qdrant
  url: http://localhost:6333

# Input lines look like:
# {"id": 1, "embedding": [...], "embedding_id": "...", "embedding_text": "...",
#  "metadata": {"source_file": "...", "category": "...", "original_record": {...}}}
options:
  batch_size: 100
  workers: 2
  transform:
    extract:
      - target: content
        candidates:
          - metadata.original_record.description
          - metadata.original_record.text
          - metadata.original_record.abstract
          - embedding_text
        max_chars: 1000
      - target: embedding_id
        candidates: [embedding_id]
        default: null
      - target: embedding_text
        candidates: [embedding_text]
      - target: source_file
        candidates: [metadata.source_file]
        default: null
      - target: category
        candidates: [metadata.category]
        default: null
      - target: metadata.title
        candidates: [metadata.original_record.title]
        default: null
      - target: metadata.severity
        candidates: [metadata.original_record.severity]
        default: null
      - target: metadata.organization
        candidates: [metadata.original_record.organization]
        default: null
      - target: metadata.incident_date
        candidates: [metadata.original_record.incident_date]
        default: null
    # metadata is rebuilt from original_record by the rules above
    exclude_fields:
      - metadata
"#;

const EXPORT_TEMPLATE: &str = r#"# vector-migrate configuration - Qdrant collection to a JSON export
source:
  type: qdrant
  url: http://localhost:6333
  collection: your_collection

destination:
  type: json_file
  path: ./exports/your_collection.json
  pretty: true

options:
  batch_size: 100
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_are_valid_configs() {
        for name in ["qdrant", "jsonl", "export"] {
            let template = template_for(name).unwrap();
            let config = MigrationConfig::from_yaml_str(template)
                .unwrap_or_else(|e| panic!("{name} template does not parse: {e}"));
            config
                .validate()
                .unwrap_or_else(|e| panic!("{name} template is invalid: {e}"));
        }
    }

    #[tokio::test]
    async fn test_jsonl_template_builds_loader_payload() {
        use vector_migrate::connectors::{ScanOptions, SourceConnector};
        use vector_migrate::Transformer;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.jsonl");
        let line = serde_json::json!({
            "id": 1,
            "embedding": [0.1, 0.2, 0.3],
            "embedding_id": "emb-1",
            "embedding_text": "EMBEDDING TEXT",
            "metadata": {
                "source_file": "incidents_2024.json",
                "category": "incidents",
                "original_record": {
                    "description": "D".repeat(1500),
                    "title": "Breach",
                    "severity": "high"
                }
            }
        });
        std::fs::write(&path, format!("{line}\n")).unwrap();

        let mut config = MigrationConfig::from_yaml_str(JSONL_TEMPLATE).unwrap();
        let SourceConfig::JsonlFile(source) = &mut config.source else {
            panic!("jsonl template must read a jsonl file");
        };
        source.path = path;
        let source = create_source(&config.source).unwrap();
        let page = source
            .scan("incidents", 0, 10, ScanOptions::default())
            .await
            .unwrap();
        let record = page.records.into_iter().next().unwrap();

        let out = Transformer::new(config.options.transform.clone()).transform(record);
        let payload = serde_json::Value::Object(out.payload);

        assert_eq!(payload["content"], "D".repeat(1000));
        assert_eq!(payload["embedding_id"], "emb-1");
        assert_eq!(payload["embedding_text"], "EMBEDDING TEXT");
        assert_eq!(payload["source_file"], "incidents_2024.json");
        assert_eq!(payload["category"], "incidents");
        assert_eq!(
            payload["metadata"],
            serde_json::json!({
                "title": "Breach",
                "severity": "high",
                "organization": null,
                "incident_date": null
            })
        );
    }

    #[test]
    fn test_unknown_template() {
        assert!(template_for("pinecone").is_none());
    }

    #[test]
    fn test_cli_parses_qdrant_env_command() {
        let cli = Cli::try_parse_from([
            "vector-migrate",
            "qdrant",
            "--target-url",
            "https://target:6333",
            "--collection",
            "incidents",
            "--dry-run",
        ])
        .unwrap();

        match cli.command {
            Commands::Qdrant { endpoints, run } => {
                assert_eq!(endpoints.collection, "incidents");
                assert_eq!(endpoints.batch_size, 100);
                assert_eq!(endpoints.target_url().unwrap(), "https://target:6333");
                assert!(run.dry_run);
            }
            _ => panic!("expected qdrant command"),
        }
    }

    fn qdrant_args(args: &[&str]) -> QdrantArgs {
        let argv: Vec<&str> = ["vector-migrate", "qdrant"]
            .into_iter()
            .chain(args.iter().copied())
            .collect();
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Qdrant { endpoints, .. } => endpoints,
            _ => panic!("expected qdrant command"),
        }
    }

    #[test]
    fn test_qdrant_host_settings_build_urls() {
        let endpoints = qdrant_args(&[
            "--source-host",
            "10.128.0.2",
            "--source-port",
            "6334",
            "--target-host",
            "xyz.cloud.qdrant.io",
            "--api-key",
            "secret",
        ]);

        assert_eq!(endpoints.source_url(), "http://10.128.0.2:6334");
        assert_eq!(endpoints.target_url().unwrap(), "https://xyz.cloud.qdrant.io");

        let config = endpoints.into_config().unwrap();
        assert_eq!(config.source.collection(), "sengol_incidents");
        config.validate().unwrap();
    }

    #[test]
    fn test_qdrant_target_host_requires_api_key() {
        let mut endpoints = qdrant_args(&["--target-host", "xyz.cloud.qdrant.io"]);
        endpoints.target_url = None;
        endpoints.api_key = None;

        let err = endpoints.target_url().unwrap_err();
        assert!(err.to_string().contains("TARGET_QDRANT_API_KEY"));
    }
}
