use crate::config::CleanupConfig;
pub use crate::utils::logger::LogFormat;
use crate::utils::logger::LogSettings;
use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "destlist-cleanup")]
#[command(about = "Find stale destination-list entries, cross-check them and delete them in batches")]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "cleanup.toml")]
    pub config: String,

    /// Destination list id(s) to process; overrides list.list_ids
    #[arg(long = "list-id", value_delimiter = ',')]
    pub list_ids: Vec<String>,

    /// Minimum age in days for an entry to be considered stale
    #[arg(long)]
    pub threshold_days: Option<i64>,

    /// Review only: never call the delete endpoint
    #[arg(long, conflicts_with = "live")]
    pub dry_run: bool,

    /// Delete for real after the review and two confirmations
    #[arg(long)]
    pub live: bool,

    /// Skip the telemetry cross-check even if the config enables it
    #[arg(long)]
    pub no_crosscheck: bool,

    /// Print the account's destination lists (id, name, size) and exit
    #[arg(long)]
    pub list_lists: bool,

    /// Audit report path (.csv or .json)
    #[arg(short, long)]
    pub output: Option<String>,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, value_enum, default_value = "compact")]
    pub log_format: LogFormat,

    /// Extra tracing filter directives, e.g. "reqwest=debug"
    #[arg(long)]
    pub log_filter: Option<String>,
}

impl CliArgs {
    pub fn log_settings(&self) -> LogSettings {
        LogSettings {
            format: self.log_format,
            verbose: self.verbose,
            directives: self.log_filter.clone(),
        }
    }

    /// Folds command-line overrides into the loaded configuration.
    pub fn apply_to(&self, config: &mut CleanupConfig) {
        if !self.list_ids.is_empty() {
            config.list.list_ids = Some(self.list_ids.clone());
        }
        if let Some(days) = self.threshold_days {
            config.selection.threshold_days = Some(days);
        }
        if self.dry_run {
            config.deletion.dry_run = Some(true);
        } else if self.live {
            config.deletion.dry_run = Some(false);
        }
        if self.no_crosscheck {
            config.crosscheck.enabled = false;
        }
        if let Some(output) = &self.output {
            config.output.path = Some(output.clone());
        }
    }
}
