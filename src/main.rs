//! pathgate - protected path admission control.
//!
//! Manages persisted allow-list and protected-path records and evaluates
//! single requests against the configured rules.

use clap::{Parser, Subcommand};
use pathgate::config::{
    BasicValidator, ConfigLoader, LogLevel, PathgateConfig, StaticRuleValidator, Validator,
};
use pathgate::logging::init_tracing;
use pathgate::module::{ModuleConfig, ModuleContract};
use pathgate::modules::ip_restriction::{
    FileRecordStore, IpRestrictionHandler, RequestContext, RequestOutcome, RuleAdmin,
    UpsertOutcome,
};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

type CliResult<T> = Result<T, Box<dyn Error>>;

/// Exit status of `check` when the request is denied.
const DENIED_EXIT_CODE: u8 = 2;

/// pathgate - protected path admission control
#[derive(Parser, Debug)]
#[command(name = "pathgate")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "pathgate.toml")]
    config: PathBuf,

    /// Record file, overriding `records.path` from the configuration
    #[arg(long)]
    records: Option<PathBuf>,

    /// Log level, overriding `logging.level` (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage allow-list entries
    Allow {
        #[command(subcommand)]
        action: AllowAction,
    },

    /// Manage protected-path rules
    Path {
        #[command(subcommand)]
        action: PathAction,
    },

    /// Evaluate one request; exits with status 2 when it is denied
    Check {
        /// Request path
        #[arg(long)]
        path: String,

        /// Directly connected peer address
        #[arg(long)]
        peer: String,

        /// Forwarded-for header value
        #[arg(long)]
        forwarded_for: Option<String>,

        /// Print filter metrics in Prometheus text format after the verdict
        #[arg(long)]
        metrics: bool,
    },

    /// Validate the configuration, rejecting malformed static rules
    Validate,
}

#[derive(Subcommand, Debug)]
enum AllowAction {
    /// Add an address or CIDR range, or update and reactivate an existing one
    Add {
        /// Address or CIDR range
        address: String,

        /// Free-form description
        #[arg(short, long)]
        description: Option<String>,
    },

    /// List all entries
    #[command(alias = "ls")]
    List,

    /// Remove an entry
    #[command(alias = "rm")]
    Remove {
        /// Address or CIDR range
        address: String,
    },
}

#[derive(Subcommand, Debug)]
enum PathAction {
    /// Add a protected-path pattern, or update and reactivate an existing one
    Add {
        /// Regular expression matched against request paths
        pattern: String,

        /// Free-form description
        #[arg(short, long)]
        description: Option<String>,
    },

    /// List all rules
    #[command(alias = "ls")]
    List,

    /// Remove a rule
    #[command(alias = "rm")]
    Remove {
        /// Regular expression as stored
        pattern: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        },
    }
}

fn run(cli: Cli) -> CliResult<ExitCode> {
    if let Commands::Validate = cli.command {
        return validate(&cli.config);
    }

    let mut config = ConfigLoader::new()
        .with_validator(BasicValidator::new())
        .load_or_default(&cli.config)?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(records) = cli.records {
        config.records.path = Some(records);
    }
    init_tracing(&config.logging)?;
    tracing::debug!(service = %config.service.name, "configuration loaded");

    match cli.command {
        Commands::Allow { action } => allow(&config, action),
        Commands::Path { action } => path(&config, action),
        Commands::Check {
            path,
            peer,
            forwarded_for,
            metrics,
        } => check(&config, path, peer, forwarded_for, metrics),
        Commands::Validate => validate(&cli.config),
    }
}

fn record_store(config: &PathgateConfig) -> CliResult<Arc<FileRecordStore>> {
    let path = config
        .records
        .path
        .clone()
        .ok_or("no record file configured; set records.path or pass --records")?;
    Ok(Arc::new(FileRecordStore::new(path)))
}

/// Start the filter over the configured rules and records.
fn start_handler(
    config: &PathgateConfig,
    records: Option<Arc<FileRecordStore>>,
) -> CliResult<IpRestrictionHandler> {
    let mut handler = IpRestrictionHandler::new();
    if let Some(records) = records {
        handler = handler.with_record_source(records);
    }
    handler.init(ModuleConfig::from_section(&config.ip_restriction)?)?;
    handler.start()?;
    Ok(handler)
}

/// Admin over the record file.
///
/// A running filter in another process has its own cache and no listener
/// here; it picks up record changes when its cached rule sets expire.
fn admin(config: &PathgateConfig) -> CliResult<RuleAdmin> {
    Ok(RuleAdmin::new(record_store(config)?))
}

fn announce(config: &PathgateConfig, change: String) {
    println!("{change}");
    let ttl = config.ip_restriction.cache_ttl_seconds;
    if ttl > 0 {
        println!("running filters apply this within {ttl}s (cache_ttl_seconds)");
    }
}

fn describe(outcome: UpsertOutcome) -> &'static str {
    match outcome {
        UpsertOutcome::Created => "added",
        UpsertOutcome::Updated => "updated",
    }
}

fn allow(config: &PathgateConfig, action: AllowAction) -> CliResult<ExitCode> {
    let admin = admin(config)?;

    match action {
        AllowAction::Add {
            address,
            description,
        } => {
            let outcome = admin.add_or_update_allowlist_entry(&address, description.as_deref())?;
            announce(config, format!("{} {address}", describe(outcome)));
        },
        AllowAction::List => {
            for entry in admin.list_allowlist()? {
                println!(
                    "{}\t{}\t{}\t{}",
                    entry.address_or_cidr,
                    if entry.active { "active" } else { "inactive" },
                    entry.updated_at.to_rfc3339(),
                    entry.description
                );
            }
        },
        AllowAction::Remove { address } => {
            admin.remove_allowlist_entry(&address)?;
            announce(config, format!("removed {address}"));
        },
    }

    Ok(ExitCode::SUCCESS)
}

fn path(config: &PathgateConfig, action: PathAction) -> CliResult<ExitCode> {
    let admin = admin(config)?;

    match action {
        PathAction::Add {
            pattern,
            description,
        } => {
            let outcome = admin.add_or_update_protected_path(&pattern, description.as_deref())?;
            announce(config, format!("{} {pattern}", describe(outcome)));
        },
        PathAction::List => {
            for rule in admin.list_protected_paths()? {
                println!(
                    "{}\t{}\t{}\t{}",
                    rule.pattern,
                    if rule.active { "active" } else { "inactive" },
                    rule.updated_at.to_rfc3339(),
                    rule.description
                );
            }
        },
        PathAction::Remove { pattern } => {
            admin.remove_protected_path(&pattern)?;
            announce(config, format!("removed {pattern}"));
        },
    }

    Ok(ExitCode::SUCCESS)
}

fn check(
    config: &PathgateConfig,
    path: String,
    peer: String,
    forwarded_for: Option<String>,
    metrics: bool,
) -> CliResult<ExitCode> {
    let records = match config.records.path {
        Some(_) => Some(record_store(config)?),
        None => None,
    };
    let handler = start_handler(config, records)?;

    let mut request = RequestContext::new().with_path(path).with_peer_address(peer);
    if let Some(value) = forwarded_for {
        request = request.with_forwarded_for(value);
    }
    let decision = handler.check_request(&request);

    println!(
        "verdict: {}",
        if decision.is_allowed() { "ALLOW" } else { "DENY" }
    );
    println!("protected: {}", decision.path_protected);
    if let Some(address) = &decision.client_address {
        println!("client address: {address}");
    }
    if let RequestOutcome::Forbidden(response) = &decision.outcome {
        println!(
            "response: {} ({})",
            response.status(),
            response.content_type()
        );
    }
    if !handler.status().is_healthy() {
        println!("status: {}", handler.status());
    }
    if metrics {
        print!("{}", handler.metrics().to_prometheus("pathgate_ip_restriction"));
    }

    if decision.is_allowed() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(DENIED_EXIT_CODE))
    }
}

fn validate(path: &Path) -> CliResult<ExitCode> {
    let config = ConfigLoader::new().load(path)?;

    let mut result = BasicValidator::new().validate(&config);
    result.merge(StaticRuleValidator::new().validate(&config));

    for warning in result.warnings() {
        println!("warning: {}: {}", warning.field, warning.message);
    }
    for error in result.errors_only() {
        println!("error: {}: {}", error.field, error.message);
    }

    if result.is_valid() {
        println!("{}: ok", path.display());
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
