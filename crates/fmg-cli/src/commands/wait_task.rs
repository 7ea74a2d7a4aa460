//! Wait-task command - poll a task with a progress bar

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use fmg_client::{FmgClient, FmgError, Task, TaskStatus};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tabled::Tabled;

use crate::output::OutputContext;

/// Exit code after Ctrl+C
const INTERRUPTED: u8 = 130;

#[derive(Tabled, Serialize)]
pub struct TaskRow {
    #[tabled(rename = "ID")]
    pub id: u64,
    #[tabled(rename = "Title")]
    pub title: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Percent")]
    pub percent: u8,
    #[tabled(rename = "Done")]
    pub num_done: u64,
    #[tabled(rename = "Errors")]
    pub num_err: u64,
}

impl From<&Task> for TaskRow {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            title: task.title.clone().unwrap_or_default(),
            status: format!("{:?}", task.status).to_lowercase(),
            percent: task.percent,
            num_done: task.num_done,
            num_err: task.num_err,
        }
    }
}

pub async fn wait_task(
    client: &FmgClient,
    task_id: u64,
    interval: u64,
    timeout: u64,
    ctx: &OutputContext,
) -> Result<ExitCode> {
    if interval == 0 {
        bail!("--interval must be at least 1");
    }

    let pb = if ctx.quiet || ctx.is_json() {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(100)
    };
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-"),
    );
    pb.set_message(format!("task {}", task_id));

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let tasks = client.tasks();
    let wait = tasks.wait_with_progress(
        task_id,
        Duration::from_secs(interval),
        Duration::from_secs(timeout),
        |task| pb.set_position(u64::from(task.percent)),
    );
    tokio::pin!(wait);

    let outcome = loop {
        tokio::select! {
            outcome = &mut wait => break Some(outcome),
            _ = tokio::time::sleep(Duration::from_millis(100)) => {
                if !running.load(Ordering::SeqCst) {
                    break None;
                }
            }
        }
    };

    let Some(outcome) = outcome else {
        pb.abandon_with_message("interrupted");
        ctx.warn(&format!(
            "Stopped waiting; task {} keeps running on the appliance",
            task_id
        ));
        return Ok(ExitCode::from(INTERRUPTED));
    };

    match outcome {
        Ok(task) => {
            pb.finish_and_clear();
            ctx.print_rows(&[TaskRow::from(&task)]);
            if task.status == TaskStatus::Done {
                ctx.success(&format!("Task {} finished", task_id));
                Ok(ExitCode::SUCCESS)
            } else {
                ctx.error(&format!("Task {} ended in state {:?}", task_id, task.status));
                Ok(ExitCode::FAILURE)
            }
        }
        Err(FmgError::TaskTimeout { task, waited }) => {
            pb.abandon();
            ctx.print_rows(&[TaskRow::from(task.as_ref())]);
            ctx.error(&format!(
                "Task {} still {:?} after {}s",
                task_id,
                task.status,
                waited.as_secs()
            ));
            Ok(ExitCode::FAILURE)
        }
        Err(e) => {
            pb.abandon();
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_row_from_snapshot() {
        let task = Task::from_value(
            42,
            &json!({"title": "install", "state": 4, "percent": 100, "num_done": 3}),
        );
        let row = TaskRow::from(&task);
        assert_eq!(row.id, 42);
        assert_eq!(row.title, "install");
        assert_eq!(row.status, "done");
        assert_eq!(row.percent, 100);
        assert_eq!(row.num_done, 3);
        assert_eq!(row.num_err, 0);
    }
}
