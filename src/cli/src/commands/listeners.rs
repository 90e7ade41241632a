//! Listener commands: list and remove.

use anyhow::Result;
use clap::Subcommand;

use super::ListArgs;
use crate::client::ApiClient;
use crate::models::{ControlForm, ListenerInfo, ListenerRow};
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum ListenerCommands {
    /// List listeners
    List(ListArgs),

    /// Remove a listener, or every unlocked listener when no name is given
    Remove {
        /// Listener name
        name: Option<String>,

        /// Only remove these subscriptions (comma-separated, e.g. task.success,task.fail)
        #[arg(short, long)]
        events: Option<String>,
    },
}

pub async fn execute(cmd: ListenerCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        ListenerCommands::List(args) => {
            let page = super::fetch_page::<ListenerInfo>(client, "listeners", &args).await?;
            match format {
                OutputFormat::Table => {
                    let rows: Vec<ListenerRow> = page.data.iter().map(ListenerRow::from).collect();
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

        ListenerCommands::Remove { name, events } => {
            let target = name.as_deref().unwrap_or("all unlocked listeners");
            let done = match &events {
                Some(events) => format!("Removed {events} from {target}"),
                None => format!("Removed {target}"),
            };
            let form = ControlForm {
                id: name,
                events,
                ..Default::default()
            };
            super::control(client, "listeners-remove", form, format, &done).await
        }
    }
}
