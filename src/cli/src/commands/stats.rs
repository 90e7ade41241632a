//! Stats snapshot command.

use anyhow::Result;

use crate::client::ApiClient;
use crate::models::{ListenerRow, Snapshot, TaskRow, WorkerRow};
use crate::output::{self, OutputFormat};

pub async fn execute(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let snapshot: Snapshot = client.get("/workers", &[("action", "stats")]).await?;

    match format {
        OutputFormat::Table => {
            output::print_header("Taskhive Stats");
            print_counts(&snapshot);

            output::print_header("Workers");
            let rows: Vec<WorkerRow> = snapshot.workers.iter().map(WorkerRow::from).collect();
            output::print_table(&rows);

            output::print_header("Waiting Tasks");
            let rows: Vec<TaskRow> = snapshot.tasks_wait.iter().map(TaskRow::from).collect();
            output::print_table(&rows);

            output::print_header("Listeners");
            let rows: Vec<ListenerRow> = snapshot.listeners.iter().map(ListenerRow::from).collect();
            output::print_table(&rows);
        }
        _ => output::print_item(&snapshot, format)?,
    }

    Ok(())
}

pub fn print_counts(snapshot: &Snapshot) {
    output::print_detail("Workers", &snapshot.workers_count.to_string());
    output::print_detail("Waiting workers", &snapshot.workers_wait.to_string());
    output::print_detail("Busy workers", &snapshot.workers_busy.to_string());
    output::print_detail("Waiting tasks", &snapshot.tasks_wait_count.to_string());
    output::print_detail("Listeners", &snapshot.listeners_count.to_string());
}
