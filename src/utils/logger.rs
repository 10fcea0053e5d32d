use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CRATE_TARGET: &str = env!("CARGO_CRATE_NAME");

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum LogFormat {
    #[default]
    Compact,
    /// JSON lines, for runs whose output is shipped to a log collector.
    Json,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSettings {
    pub format: LogFormat,
    pub verbose: bool,
    /// Extra `EnvFilter` directives such as `reqwest=debug`, appended to the defaults.
    pub directives: Option<String>,
}

impl LogSettings {
    /// `RUST_LOG`, when set, replaces all of these.
    pub fn filter_directives(&self) -> String {
        let mut directives = if self.verbose {
            format!("{}=debug,info", CRATE_TARGET)
        } else {
            format!("{}=info", CRATE_TARGET)
        };
        let extra = self.directives.as_deref().unwrap_or_default();
        for directive in extra.split(',').map(str::trim).filter(|d| !d.is_empty()) {
            directives.push(',');
            directives.push_str(directive);
        }
        directives
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.filter_directives()))
    }

    pub fn init(&self) {
        let layer = tracing_subscriber::fmt::layer()
            .with_target(self.verbose)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false);
        let registry = tracing_subscriber::registry().with(self.filter());

        match self.format {
            LogFormat::Compact => registry.with(layer.compact()).init(),
            LogFormat::Json => registry.with(layer.json()).init(),
        }
    }
}
