use crate::core::selector::{NoDataAction, SelectionPolicy};
use crate::utils::error::{CleanupError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

/// Vendor ceiling for both page size and delete batch size.
pub const VENDOR_MAX_BATCH: usize = 100;

const DEFAULT_DESTINATIONS_PATH: &str = "{list_id}/destinations";
const DEFAULT_REMOVE_PATH: &str = "{list_id}/destinations/remove";

static ENV_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("placeholder pattern is valid"));

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    pub list: ListConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub crosscheck: CrosscheckConfig,
    #[serde(default)]
    pub deletion: DeletionConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub headers: Option<HashMap<String, String>>,
    pub lists_path: Option<String>,
    pub destinations_path: Option<String>,
    pub remove_path: Option<String>,
    pub page_size: Option<u32>,
    pub timeout_seconds: Option<u64>,
    pub retry_base_delay_ms: Option<u64>,
    pub list_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectionConfig {
    pub threshold_days: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStyle {
    /// Advanced-hunting style endpoint that takes a KQL query.
    Hunting,
    /// Endpoint that takes one indicator and answers `{matched, lastSeen, hitCount}`.
    Indicator,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrosscheckConfig {
    #[serde(default)]
    pub enabled: bool,
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub headers: Option<HashMap<String, String>>,
    pub style: Option<QueryStyle>,
    pub lookback_days: Option<u32>,
    pub concurrency: Option<usize>,
    pub timeout_seconds: Option<u64>,
    pub on_no_data: Option<NoDataAction>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeletionConfig {
    pub batch_size: Option<usize>,
    pub batch_delay_ms: Option<u64>,
    pub dry_run: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    pub path: Option<String>,
}

impl CleanupConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| CleanupError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the environment value; unknown variables are left in place
    /// so validation can name them.
    fn substitute_env_vars(content: &str) -> String {
        ENV_PLACEHOLDER
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    pub fn list_ids(&self) -> &[String] {
        self.list.list_ids.as_deref().unwrap_or_default()
    }

    pub fn page_size(&self) -> u32 {
        self.list.page_size.unwrap_or(VENDOR_MAX_BATCH as u32)
    }

    pub fn list_timeout(&self) -> Duration {
        Duration::from_secs(self.list.timeout_seconds.unwrap_or(30))
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.list.retry_base_delay_ms.unwrap_or(500))
    }

    /// The list index; defaults to `base_url` itself.
    pub fn lists_url(&self) -> String {
        match self.list.lists_path.as_deref().map(|p| p.trim_matches('/')) {
            Some(path) if !path.is_empty() => {
                format!("{}/{}", self.list.base_url.trim_end_matches('/'), path)
            }
            _ => self.list.base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn destinations_url(&self, list_id: &str) -> String {
        self.render_list_url(
            self.list
                .destinations_path
                .as_deref()
                .unwrap_or(DEFAULT_DESTINATIONS_PATH),
            list_id,
        )
    }

    pub fn remove_url(&self, list_id: &str) -> String {
        self.render_list_url(
            self.list.remove_path.as_deref().unwrap_or(DEFAULT_REMOVE_PATH),
            list_id,
        )
    }

    fn render_list_url(&self, template: &str, list_id: &str) -> String {
        format!(
            "{}/{}",
            self.list.base_url.trim_end_matches('/'),
            template.trim_start_matches('/').replace("{list_id}", list_id)
        )
    }

    pub fn threshold_days(&self) -> i64 {
        self.selection.threshold_days.unwrap_or(180)
    }

    pub fn crosscheck_enabled(&self) -> bool {
        self.crosscheck.enabled
    }

    pub fn query_style(&self) -> QueryStyle {
        self.crosscheck.style.unwrap_or(QueryStyle::Hunting)
    }

    pub fn lookback_days(&self) -> u32 {
        self.crosscheck.lookback_days.unwrap_or(180)
    }

    pub fn crosscheck_concurrency(&self) -> usize {
        self.crosscheck.concurrency.unwrap_or(5)
    }

    pub fn crosscheck_timeout(&self) -> Duration {
        Duration::from_secs(self.crosscheck.timeout_seconds.unwrap_or(60))
    }

    pub fn batch_size(&self) -> usize {
        self.deletion.batch_size.unwrap_or(VENDOR_MAX_BATCH)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.deletion.batch_delay_ms.unwrap_or(200))
    }

    pub fn dry_run(&self) -> bool {
        self.deletion.dry_run.unwrap_or(true)
    }

    pub fn output_path(&self) -> &str {
        self.output.path.as_deref().unwrap_or("./output/audit.csv")
    }

    pub fn selection_policy(&self) -> SelectionPolicy {
        SelectionPolicy {
            threshold_days: self.threshold_days(),
            crosscheck_enabled: self.crosscheck_enabled(),
            on_no_data: self.crosscheck.on_no_data.unwrap_or(NoDataAction::Delete),
        }
    }

    /// The subset needed to talk to the list API at all (e.g. `--list-lists`).
    pub fn validate_list_access(&self) -> Result<()> {
        validation::validate_url("list.base_url", &self.list.base_url)?;
        if let Some(token) = &self.list.token {
            validation::validate_no_placeholder("list.token", token)?;
        }
        Ok(())
    }

    pub fn validate_config(&self) -> Result<()> {
        self.validate_list_access()?;
        if self.list_ids().is_empty() {
            return Err(CleanupError::MissingConfigError {
                field: "list.list_ids (or --list-id)".to_string(),
            });
        }
        for id in self.list_ids() {
            validation::validate_non_empty_string("list.list_ids", id)?;
        }
        validation::validate_range("list.page_size", self.page_size(), 1, u32::MAX)?;

        validation::validate_range("selection.threshold_days", self.threshold_days(), 1, 36_500)?;

        if self.crosscheck.enabled {
            let endpoint = self.crosscheck.endpoint.as_deref().ok_or_else(|| {
                CleanupError::MissingConfigError {
                    field: "crosscheck.endpoint".to_string(),
                }
            })?;
            validation::validate_url("crosscheck.endpoint", endpoint)?;
            if let Some(token) = &self.crosscheck.token {
                validation::validate_no_placeholder("crosscheck.token", token)?;
            }
            validation::validate_range("crosscheck.lookback_days", self.lookback_days(), 1, 3_650)?;
            validation::validate_range(
                "crosscheck.concurrency",
                self.crosscheck_concurrency(),
                1,
                50,
            )?;
        }

        validation::validate_range("deletion.batch_size", self.batch_size(), 1, usize::MAX)?;

        validation::validate_path("output.path", self.output_path())?;
        validation::validate_file_extension("output.path", self.output_path(), &["csv", "json"])?;

        Ok(())
    }
}

impl Validate for CleanupConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
