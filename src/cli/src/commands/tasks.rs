//! Task commands: list and remove.

use anyhow::Result;
use clap::Subcommand;

use super::ListArgs;
use crate::client::ApiClient;
use crate::models::{ControlForm, TaskInfo, TaskRow};
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum TaskCommands {
    /// List tasks, finished ones included
    List(ListArgs),

    /// Remove a task wherever it is
    Remove {
        /// Task ID
        id: String,
    },
}

pub async fn execute(cmd: TaskCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        TaskCommands::List(args) => {
            let page = super::fetch_page::<TaskInfo>(client, "tasks", &args).await?;
            match format {
                OutputFormat::Table => {
                    let rows: Vec<TaskRow> = page.data.iter().map(TaskRow::from).collect();
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

        TaskCommands::Remove { id } => {
            let done = format!("Task {id} removed");
            let form = ControlForm {
                id: Some(id),
                ..Default::default()
            };
            super::control(client, "tasks-remove", form, format, &done).await
        }
    }
}
