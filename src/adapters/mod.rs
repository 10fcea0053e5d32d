// Adapters layer: concrete implementations of the domain ports (http, storage, prompts, reports).

pub mod list_client;
pub mod prompt;
pub mod report;
pub mod storage;
pub mod telemetry_client;

pub use list_client::HttpListClient;
pub use prompt::{PromptConfirmation, StdinConfirmation};
pub use report::FileReportSink;
pub use storage::LocalStorage;
pub use telemetry_client::HttpTelemetryClient;
