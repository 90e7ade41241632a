//! Subcommands, one module per entity.

pub mod health;
pub mod listeners;
pub mod stats;
pub mod tasks;
pub mod workers;

use anyhow::Result;
use clap::Args;
use serde::de::DeserializeOwned;

use crate::client::ApiClient;
use crate::models::{ControlForm, Page, Snapshot, ViewQuery};
use crate::output::{self, OutputFormat};

/// Pagination and sorting flags shared by the `list` subcommands.
#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Page number (1-indexed)
    #[arg(long, default_value = "1")]
    page: u64,

    /// Items per page
    #[arg(long, default_value = "20")]
    per_page: u64,

    /// Field to sort by
    #[arg(short, long)]
    sort: Option<String>,

    /// Sort order (asc or desc)
    #[arg(long, default_value = "asc")]
    order: String,
}

impl ListArgs {
    fn query(&self, entity: &'static str) -> ViewQuery {
        ViewQuery {
            entity,
            page: self.page,
            per_page: self.per_page,
            sort: self.sort.clone(),
            order: self.order.clone(),
        }
    }
}

/// Fetch one page of `entity`.
async fn fetch_page<T: DeserializeOwned>(
    client: &ApiClient,
    entity: &'static str,
    args: &ListArgs,
) -> Result<Page<T>> {
    client.get("/workers", &args.query(entity)).await
}

/// Send a control command and report the refreshed counts.
async fn control(
    client: &ApiClient,
    action: &str,
    form: ControlForm,
    format: OutputFormat,
    done: &str,
) -> Result<()> {
    let snapshot: Snapshot = client
        .post_form("/workers", &[("action", action)], &form)
        .await?;

    match format {
        OutputFormat::Table => {
            output::print_success(done);
            stats::print_counts(&snapshot);
        }
        _ => output::print_item(&snapshot, format)?,
    }
    Ok(())
}
