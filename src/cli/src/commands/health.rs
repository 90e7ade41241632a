//! Health check command.
//!
//! Queries the `/health` endpoint and displays dispatcher status.

use anyhow::Result;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

pub async fn execute(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let (code, health) = client.get_raw("/health").await?;

    match format {
        OutputFormat::Table => {
            let field = |key: &str| {
                health
                    .get(key)
                    .map(|v| match v.as_str() {
                        Some(s) => s.to_string(),
                        None => v.to_string(),
                    })
                    .unwrap_or_else(|| "?".to_string())
            };
            let status = field("status");

            output::print_header("Server Health");
            output::print_detail("Status", &status);
            output::print_detail("API URL", client.base_url());
            output::print_detail("Version", &field("version"));
            output::print_detail("Uptime (s)", &field("uptime_secs"));
            output::print_detail("Dispatcher running", &field("running"));

            if let Some(workers) = health.get("workers") {
                output::print_detail("Workers", &workers["total"].to_string());
                output::print_detail("Busy workers", &workers["busy"].to_string());
            }
            if let Some(queue) = health.get("queue") {
                output::print_detail("Waiting tasks", &queue["waiting"].to_string());
                output::print_detail("In-flight tasks", &queue["in_flight"].to_string());
            }

            if (200..300).contains(&code) {
                output::print_success("Taskhive operational");
            } else {
                output::print_error(&format!("Server status: {}", status));
            }
        }
        _ => output::print_item(&health, format)?,
    }

    Ok(())
}
