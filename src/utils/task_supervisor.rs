use tokio::task::JoinHandle;
use std::collections::HashMap;
use crate::error::{Error, Result};
use tracing::{info, error};

/// Task Supervisor - Monitors the long-running pipeline units
///
/// ## Purpose
/// Every connector feed, the aggregator, the fan-out consumer and the HTTP
/// server run as their own task. None of them is supposed to return, so a
/// finished handle means the unit died.
///
/// ## Usage
/// ```rust,ignore
/// let mut supervisor = TaskSupervisor::new();
///
/// supervisor.spawn("aggregator", async move {
///     aggregator.run(subscriber).await;
/// });
///
/// if let Err(e) = supervisor.check_health() {
///     error!("Task failure detected: {:?}", e);
/// }
/// ```
pub struct TaskSupervisor {
    tasks: HashMap<String, JoinHandle<()>>,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        TaskSupervisor {
            tasks: HashMap::new(),
        }
    }

    /// Spawn a new background task and register it for monitoring
    pub fn spawn<F>(&mut self, name: impl Into<String>, future: F) -> &mut Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let handle = tokio::spawn(future);

        info!(task = %name, "Spawned background task");
        self.tasks.insert(name, handle);
        self
    }

    /// Returns an error naming every task that has terminated, and stops
    /// tracking them.
    pub fn check_health(&mut self) -> Result<()> {
        let failed_tasks: Vec<String> = self.tasks
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(name, _)| name.clone())
            .collect();

        if failed_tasks.is_empty() {
            return Ok(());
        }

        for name in &failed_tasks {
            self.tasks.remove(name);
        }

        let error_msg = format!("Tasks terminated unexpectedly: {:?}", failed_tasks);
        error!("{}", error_msg);
        Err(Error::TaskFailure(error_msg))
    }

    /// Get count of active tasks
    pub fn active_task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Abort everything still running
    pub fn shutdown_all(&mut self) {
        info!("Shutting down {} background tasks", self.tasks.len());

        for (name, handle) in self.tasks.drain() {
            handle.abort();
            info!(task = %name, "Aborted task");
        }
    }
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_finished_task_is_reported_once() {
        let mut supervisor = TaskSupervisor::new();
        supervisor
            .spawn("short", async {})
            .spawn("long", async { tokio::time::sleep(Duration::from_secs(60)).await });

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(matches!(supervisor.check_health(), Err(Error::TaskFailure(_))));
        assert_eq!(supervisor.active_task_count(), 1);
        assert!(supervisor.check_health().is_ok());

        supervisor.shutdown_all();
        assert_eq!(supervisor.active_task_count(), 0);
    }
}
