use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::stats::get_stats;
use super::types::{SystemStats, Worker, WorkerError, WorkerResult};
use crate::config::WorkerConfig;
use crate::queue::Queue;
use crate::store::open_store;
use crate::tasks::{
    new_config,
    state::valid_state_transition,
    types::{DockerResult, Executor, ExecutorError, ExecutorResult, InspectResult, State, Task},
};

impl Worker {
    pub fn new(config: WorkerConfig, executor: Arc<dyn Executor>) -> WorkerResult<Self> {
        let db = open_store(config.store, &config.task_db_path(), "tasks")?;
        Ok(Worker {
            name: config.name.clone(),
            queue: Queue::new(),
            db,
            stats: RwLock::new(None),
            config,
            executor,
            sysinfo: Mutex::new(sysinfo::System::new()),
            records: Mutex::new(()),
        })
    }

    pub async fn add_task(&self, task: Task) {
        debug!(task_id = %task.id, state = %task.state, "Task queued");
        self.queue.enqueue(task).await;
    }

    pub fn get_tasks(&self) -> Vec<Task> {
        match self.db.list() {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(worker = %self.name, error = %e, "Failed to list tasks");
                Vec::new()
            }
        }
    }

    pub fn get_task(&self, id: &Uuid) -> WorkerResult<Option<Task>> {
        Ok(self.db.get(&id.to_string())?)
    }

    /// Takes one queued task and drives it to the requested state. Returns
    /// `Ok(None)` when the queue is empty or a start failure was recorded.
    pub async fn run_task(&self) -> WorkerResult<Option<DockerResult>> {
        let Some(mut task_queued) = self.queue.dequeue().await else {
            return Ok(None);
        };

        let key = task_queued.key();
        let task_persisted = {
            let _records = self.records.lock().await;
            match self.db.get(&key)? {
                Some(task) => task,
                None => {
                    self.db.put(&key, &task_queued)?;
                    task_queued.clone()
                }
            }
        };

        if !valid_state_transition(&task_persisted.state, &task_queued.state) {
            warn!(
                task_id = %task_queued.id,
                from = %task_persisted.state,
                to = %task_queued.state,
                "Invalid state transition, dropping task"
            );
            return Err(WorkerError::InvalidStateTransition {
                from: task_persisted.state,
                to: task_queued.state,
            });
        }

        match task_queued.state {
            State::Scheduled => self.start_task(task_queued).await,
            State::Completed => {
                if task_queued.container_id.is_none() {
                    task_queued.container_id = task_persisted.container_id;
                }
                self.stop_task(task_queued).await.map(Some)
            }
            other => Err(WorkerError::InvalidTargetState(other, task_queued.id)),
        }
    }

    /// A failed start is recorded as `Failed` and left for the manager's
    /// health checks to restart.
    pub async fn start_task(&self, mut task: Task) -> WorkerResult<Option<DockerResult>> {
        task.start_time = Some(Utc::now());
        let config = new_config(&task);

        let outcome = self.executor.run(&config).await;
        let _records = self.records.lock().await;
        match outcome {
            Ok(result) => {
                info!(task_id = %task.id, container_id = %result.container_id, "Task started");
                task.container_id = Some(result.container_id.clone());
                task.state = State::Running;
                self.db.put(&task.key(), &task)?;
                Ok(Some(result))
            }
            Err(e) => {
                error!(task_id = %task.id, error = %e, "Failed to start task");
                task.state = State::Failed;
                self.db.put(&task.key(), &task)?;
                Ok(None)
            }
        }
    }

    pub async fn stop_task(&self, mut task: Task) -> WorkerResult<DockerResult> {
        let container_id = task
            .container_id
            .clone()
            .ok_or(WorkerError::MissingContainerId(task.id))?;

        let result = self.executor.stop(&container_id).await.inspect_err(
            |e| error!(task_id = %task.id, container_id = %container_id, error = %e, "Failed to stop task"),
        )?;

        task.finish_time = Some(Utc::now());
        task.state = State::Completed;
        {
            let _records = self.records.lock().await;
            self.db.put(&task.key(), &task)?;
        }
        info!(task_id = %task.id, container_id = %container_id, "Stopped and removed task");

        Ok(result)
    }

    pub async fn inspect_task(&self, task: &Task) -> ExecutorResult<InspectResult> {
        match &task.container_id {
            Some(container_id) => self.executor.inspect(container_id).await,
            None => Err(ExecutorError::Other(format!(
                "task {} has no container",
                task.id
            ))),
        }
    }

    /// Reconciles every running task against the executor. Only records that
    /// already exist are touched, and only while they still hold the
    /// container that was inspected.
    pub async fn update_tasks(&self) -> WorkerResult<()> {
        for task in self.db.list()? {
            if task.state != State::Running {
                continue;
            }

            let observed = self.inspect_task(&task).await;

            let _records = self.records.lock().await;
            let key = task.key();
            let Some(mut current) = self.db.get(&key)? else {
                continue;
            };
            if current.state != State::Running || current.container_id != task.container_id {
                debug!(task_id = %task.id, state = %current.state, "Task changed during inspect, skipping");
                continue;
            }

            match observed {
                Ok(resp) if resp.status == "exited" => {
                    warn!(task_id = %task.id, "Container exited, marking task failed");
                    current.state = State::Failed;
                }
                Ok(resp) => {
                    current.host_ports = resp.host_ports;
                }
                Err(e) => {
                    warn!(task_id = %task.id, error = %e, "Failed to inspect task");
                    current.state = State::Failed;
                }
            }

            self.db.put(&key, &current)?;
        }

        Ok(())
    }

    pub async fn refresh_stats(&self) -> SystemStats {
        let task_count = self.db.count().unwrap_or_else(|e| {
            warn!(worker = %self.name, error = %e, "Failed to count tasks");
            0
        }) as u64;

        let stats = {
            let mut sys = self.sysinfo.lock().await;
            sys.refresh_cpu_usage();
            sys.refresh_memory();
            get_stats(&sys, task_count)
        };

        *self.stats.write().await = Some(stats.clone());
        stats
    }

    /// Last collected snapshot, sampling one if none exists yet.
    pub async fn current_stats(&self) -> SystemStats {
        if let Some(stats) = self.stats.read().await.clone() {
            return stats;
        }
        self.refresh_stats().await
    }
}

pub async fn run_tasks(worker: Arc<Worker>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(worker.config.run_interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if worker.queue.is_empty().await {
                    continue;
                }
                match worker.run_task().await {
                    Ok(Some(result)) => debug!(action = %result.action, container_id = %result.container_id, "Task processed"),
                    Ok(None) => {}
                    Err(e) => error!(worker = %worker.name, error = %e, "Error running task"),
                }
            }
        }
    }
    info!(worker = %worker.name, "Task runner stopped");
}

pub async fn collect_stats(worker: Arc<Worker>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(worker.config.stats_interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let stats = worker.refresh_stats().await;
                debug!(worker = %worker.name, task_count = stats.task_count, "Collected stats");
            }
        }
    }
    info!(worker = %worker.name, "Stats collector stopped");
}

pub async fn reconcile_tasks(worker: Arc<Worker>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(worker.config.update_interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                debug!(worker = %worker.name, "Updating tasks");
                if let Err(e) = worker.update_tasks().await {
                    error!(worker = %worker.name, error = %e, "Failed to update tasks");
                }
            }
        }
    }
    info!(worker = %worker.name, "Task reconciler stopped");
}
