//! Worker commands: list, add, kill and reset.

use anyhow::Result;
use clap::Subcommand;

use super::ListArgs;
use crate::client::ApiClient;
use crate::models::{ControlForm, WorkerInfo, WorkerRow};
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum WorkerCommands {
    /// List workers
    List(ListArgs),

    /// Add workers to the pool
    Add {
        /// Number of workers to add
        count: usize,
    },

    /// Kill a worker, or every worker when no id is given
    Kill {
        /// Worker ID
        id: Option<String>,
    },

    /// Reset a worker to wait, or every worker when no id is given
    Reset {
        /// Worker ID
        id: Option<String>,
    },
}

pub async fn execute(cmd: WorkerCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        WorkerCommands::List(args) => {
            let page = super::fetch_page::<WorkerInfo>(client, "workers", &args).await?;
            match format {
                OutputFormat::Table => {
                    let rows: Vec<WorkerRow> = page.data.iter().map(WorkerRow::from).collect();
                    output::print_table(&rows);
                    output::print_page_footer(
                        page.pagination.current_page,
                        page.pagination.total_pages,
                        page.pagination.total_items,
                    );
                }
                _ => output::print_item(&page, format)?,
            }
            Ok(())
        }

        WorkerCommands::Add { count } => {
            let form = ControlForm {
                count: Some(count),
                ..Default::default()
            };
            super::control(client, "workers-add", form, format, &format!("Added {count} workers")).await
        }

        WorkerCommands::Kill { id } => {
            let done = match &id {
                Some(id) => format!("Worker {id} killed"),
                None => "All workers killed".to_string(),
            };
            let form = ControlForm {
                id,
                ..Default::default()
            };
            super::control(client, "workers-kill", form, format, &done).await
        }

        WorkerCommands::Reset { id } => {
            let done = match &id {
                Some(id) => format!("Worker {id} reset"),
                None => "All workers reset".to_string(),
            };
            let form = ControlForm {
                id,
                ..Default::default()
            };
            super::control(client, "workers-reset", form, format, &done).await
        }
    }
}
