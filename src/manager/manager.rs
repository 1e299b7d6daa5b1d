use std::sync::Arc;

use reqwest::StatusCode;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::types::{Assignments, Manager, ManagerError, ManagerResult};
use crate::config::ManagerConfig;
use crate::node::Node;
use crate::queue::Queue;
use crate::scheduler::new_scheduler;
use crate::store::open_store;
use crate::tasks::{
    state::valid_state_transition,
    types::{ErrResponse, State, Task, TaskEvent},
};

impl Manager {
    pub fn new(config: ManagerConfig) -> ManagerResult<Self> {
        let task_db = open_store(config.store, &config.task_db_path(), "tasks")?;
        let event_db = open_store(config.store, &config.event_db_path(), "events")?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(ManagerError::Client)?;

        let workers = config.workers.clone();
        let nodes = workers.iter().map(|w| Node::for_worker(w)).collect();

        Ok(Manager {
            pending: Queue::new(),
            task_db,
            event_db,
            assignments: Mutex::new(Assignments::new(&workers)),
            nodes: RwLock::new(nodes),
            scheduler: Mutex::new(new_scheduler(config.scheduler)),
            workers,
            config,
            client,
            records: Mutex::new(()),
        })
    }

    pub async fn add_task(&self, task_event: TaskEvent) {
        debug!(event_id = %task_event.id, task_id = %task_event.task.id, state = %task_event.state, "Event queued");
        self.pending.enqueue(task_event).await;
    }

    pub fn get_tasks(&self) -> Vec<Task> {
        match self.task_db.list() {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(error = %e, "Failed to list tasks");
                Vec::new()
            }
        }
    }

    pub fn get_task(&self, id: &Uuid) -> ManagerResult<Option<Task>> {
        Ok(self.task_db.get(&id.to_string())?)
    }

    pub async fn get_nodes(&self) -> Vec<Node> {
        self.nodes.read().await.clone()
    }

    pub async fn worker_for(&self, task_id: &Uuid) -> Option<String> {
        self.assignments
            .lock()
            .await
            .worker_for(task_id)
            .map(str::to_string)
    }

    /// Runs the scheduler over the current node list.
    pub async fn select_worker(&self, task: &Task) -> ManagerResult<Node> {
        let nodes = self.get_nodes().await;
        let mut scheduler = self.scheduler.lock().await;

        let candidates = scheduler.select_candidate_nodes(task, &nodes);
        if candidates.is_empty() {
            return Err(ManagerError::NoCandidates(task.id));
        }

        let scores = scheduler.score(task, &candidates);
        debug!(scheduler = scheduler.name(), task_id = %task.id, ?scores, "Scored candidates");
        scheduler
            .pick(&scores, &candidates)
            .ok_or(ManagerError::NoCandidates(task.id))
    }

    /// Dispatches at most one pending event. An empty queue is a no-op.
    pub async fn send_work(&self) -> ManagerResult<()> {
        let Some(mut task_event) = self.pending.dequeue().await else {
            debug!("No work in the queue");
            return Ok(());
        };

        self.event_db.put(&task_event.key(), &task_event)?;
        let task_id = task_event.task.id;

        if let Some(worker) = self.worker_for(&task_id).await {
            let persisted = self
                .get_task(&task_id)?
                .ok_or(ManagerError::TaskNotFound(task_id))?;

            if task_event.state == State::Completed {
                if valid_state_transition(&persisted.state, &State::Completed) {
                    return self.stop_task(&worker, &task_id).await;
                }
                warn!(
                    task_id = %task_id,
                    from = %persisted.state,
                    "Invalid request: existing task cannot transition to completed"
                );
                return Ok(());
            }

            if is_pending_restart(&task_event, &persisted) {
                info!(task_id = %task_id, worker = %worker, "Redelivering restart");
                self.post_event(&worker, &task_event).await?;
                return Ok(());
            }

            warn!(
                task_id = %task_id,
                state = %task_event.state,
                "Task already assigned, dropping event"
            );
            return Ok(());
        }

        let node = self.select_worker(&task_event.task).await.inspect_err(
            |e| error!(task_id = %task_id, error = %e, "Error selecting worker for task"),
        )?;
        let worker = node.name;

        if !self.assignments.lock().await.assign(task_id, &worker) {
            warn!(task_id = %task_id, worker = %worker, "Task was assigned concurrently, dropping event");
            return Ok(());
        }

        task_event.task.state = State::Scheduled;
        self.task_db.put(&task_event.task.key(), &task_event.task)?;

        match self.post_event(&worker, &task_event).await {
            Ok(task) => {
                info!(task_id = %task.id, worker = %worker, "Task dispatched");
                Ok(())
            }
            Err(e) => {
                if e.is_transport() {
                    warn!(task_id = %task_id, worker = %worker, error = %e, "Worker unreachable, re-queueing");
                    self.assignments.lock().await.unassign(&task_id);
                    self.pending.enqueue(task_event).await;
                }
                Err(e)
            }
        }
    }

    async fn post_event(&self, worker: &str, task_event: &TaskEvent) -> ManagerResult<Task> {
        let url = format!("http://{}/tasks", worker);
        let resp = self
            .client
            .post(&url)
            .json(task_event)
            .send()
            .await
            .map_err(|source| ManagerError::Transport {
                worker: worker.to_string(),
                source,
            })?;

        if resp.status() != StatusCode::CREATED {
            return Err(rejection(worker, resp).await);
        }

        resp.json::<Task>()
            .await
            .map_err(|source| ManagerError::Decode {
                worker: worker.to_string(),
                source,
            })
    }

    pub async fn stop_task(&self, worker: &str, task_id: &Uuid) -> ManagerResult<()> {
        let url = format!("http://{}/tasks/{}", worker, task_id);
        let resp = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|source| ManagerError::Transport {
                worker: worker.to_string(),
                source,
            })?;

        if resp.status() != StatusCode::NO_CONTENT {
            return Err(rejection(worker, resp).await);
        }

        info!(task_id = %task_id, worker, "Task has been scheduled to be stopped");
        Ok(())
    }

    async fn get_worker_tasks(&self, worker: &str) -> ManagerResult<Vec<Task>> {
        let url = format!("http://{}/tasks", worker);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| ManagerError::Transport {
                worker: worker.to_string(),
                source,
            })?;

        if !resp.status().is_success() {
            return Err(rejection(worker, resp).await);
        }

        resp.json::<Vec<Task>>()
            .await
            .map_err(|source| ManagerError::Decode {
                worker: worker.to_string(),
                source,
            })
    }

    /// Pulls every worker's task list and copies runtime fields onto the
    /// manager's records. Unknown ids are ignored, as are reports older than
    /// the latest restart. A failing worker does not stop the others; the
    /// first error is returned at the end.
    pub async fn update_tasks(&self) -> ManagerResult<()> {
        let mut first_err = None;

        for worker in &self.workers {
            debug!(worker = %worker, "Checking worker for task updates");
            let tasks = match self.get_worker_tasks(worker).await {
                Ok(tasks) => tasks,
                Err(e) => {
                    warn!(worker = %worker, error = %e, "Error getting tasks");
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                    continue;
                }
            };

            for task in tasks {
                let _records = self.records.lock().await;
                let key = task.key();
                let Some(mut persisted) = self.task_db.get(&key)? else {
                    debug!(task_id = %task.id, worker = %worker, "Ignoring task unknown to manager");
                    continue;
                };
                if task.restart_count < persisted.restart_count {
                    debug!(
                        task_id = %task.id,
                        reported = task.restart_count,
                        restart_count = persisted.restart_count,
                        "Ignoring report from before the last restart"
                    );
                    continue;
                }

                persisted.state = task.state;
                persisted.start_time = task.start_time;
                persisted.finish_time = task.finish_time;
                persisted.container_id = task.container_id;
                persisted.host_ports = task.host_ports;
                self.task_db.put(&key, &persisted)?;
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Restarts failed tasks and running tasks whose health check fails, while they
    /// are under the restart cap.
    pub async fn do_health_checks(&self) {
        let max_restarts = self.config.max_restarts;

        for task in self.get_tasks() {
            if task.restart_count >= max_restarts {
                continue;
            }

            match task.state {
                State::Running => {
                    if let Err(e) = self.check_task_health(&task).await {
                        warn!(task_id = %task.id, error = %e, "Health check failed, restarting task");
                        self.try_restart(task).await;
                    }
                }
                State::Failed => {
                    info!(task_id = %task.id, restart_count = task.restart_count, "Restarting failed task");
                    self.try_restart(task).await;
                }
                _ => {}
            }
        }
    }

    async fn try_restart(&self, task: Task) {
        let task_id = task.id;
        if let Err(e) = self.restart_task(task).await {
            error!(task_id = %task_id, error = %e, "Error restarting task");
        }
    }

    /// Calls `http://{worker host}:{host port}{health_check}`. A task with
    /// no health check is healthy.
    pub async fn check_task_health(&self, task: &Task) -> ManagerResult<()> {
        if task.health_check.is_empty() {
            return Ok(());
        }

        let worker = self
            .worker_for(&task.id)
            .await
            .ok_or(ManagerError::Unassigned(task.id))?;
        let host_port = task.host_port().ok_or(ManagerError::NoHostPort(task.id))?;
        let host = worker.split(':').next().unwrap_or(worker.as_str());
        let url = format!("http://{}:{}{}", host, host_port, task.health_check);

        debug!(task_id = %task.id, url = %url, "Calling health check");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| ManagerError::HealthCheck {
                task_id: task.id,
                source,
            })?;

        if resp.status() != StatusCode::OK {
            return Err(ManagerError::Unhealthy {
                task_id: task.id,
                status: resp.status().as_u16(),
            });
        }

        debug!(task_id = %task.id, "Task health check passed");
        Ok(())
    }

    /// Sends the task back to its assigned worker with a bumped restart
    /// count. `seen` is the record the restart was decided on; nothing
    /// happens if the stored record has moved on since. An unreachable
    /// worker gets the event re-queued.
    pub async fn restart_task(&self, seen: Task) -> ManagerResult<()> {
        let worker = self
            .worker_for(&seen.id)
            .await
            .ok_or(ManagerError::Unassigned(seen.id))?;

        let task = {
            let _records = self.records.lock().await;
            let mut task = self
                .get_task(&seen.id)?
                .ok_or(ManagerError::TaskNotFound(seen.id))?;
            let restartable = matches!(task.state, State::Running | State::Failed);
            if !restartable || task.restart_count != seen.restart_count {
                debug!(
                    task_id = %task.id,
                    state = %task.state,
                    restart_count = task.restart_count,
                    "Task changed since health check, skipping restart"
                );
                return Ok(());
            }

            task.state = State::Scheduled;
            task.restart_count += 1;
            self.task_db.put(&task.key(), &task)?;
            task
        };

        let task_event = TaskEvent::new(State::Running, task);
        match self.post_event(&worker, &task_event).await {
            Ok(task) => {
                info!(task_id = %task.id, worker = %worker, restart_count = task.restart_count, "Task restarted");
                Ok(())
            }
            Err(e) => {
                if e.is_transport() {
                    self.pending.enqueue(task_event).await;
                }
                Err(e)
            }
        }
    }

    /// Refreshes capacity figures for every node from its `/stats` endpoint.
    pub async fn update_node_stats(&self) {
        let nodes = self.get_nodes().await;

        for node in nodes {
            let stats = match node
                .get_stats(
                    &self.client,
                    self.config.stats_retries,
                    self.config.stats_backoff,
                )
                .await
            {
                Ok(stats) => stats,
                Err(e) => {
                    warn!(node = %node.name, error = %e, "Failed to refresh node stats");
                    continue;
                }
            };

            let mut nodes = self.nodes.write().await;
            if let Some(current) = nodes.iter_mut().find(|n| n.name == node.name) {
                current.apply_stats(stats);
                debug!(node = %current.name, memory_allocated = current.memory_allocated, task_count = current.task_count, "Node stats updated");
            }
        }
    }
}

/// A restart event redelivered from the queue: the record was moved back to
/// `Scheduled` by a restart carrying the same restart count.
fn is_pending_restart(task_event: &TaskEvent, persisted: &Task) -> bool {
    task_event.state == State::Running
        && persisted.state == State::Scheduled
        && persisted.restart_count > 0
        && task_event.task.restart_count == persisted.restart_count
}

async fn rejection(worker: &str, resp: reqwest::Response) -> ManagerError {
    let status = resp.status().as_u16();
    match resp.json::<ErrResponse>().await {
        Ok(body) => ManagerError::WorkerRejected {
            worker: worker.to_string(),
            status: body.http_status_code,
            message: body.message,
        },
        Err(source) => {
            warn!(worker, status, "Worker returned an undecodable error body");
            ManagerError::Decode {
                worker: worker.to_string(),
                source,
            }
        }
    }
}

pub async fn process_tasks(manager: Arc<Manager>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(manager.config.dispatch_interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                debug!("Processing any tasks in the queue");
                if let Err(e) = manager.send_work().await {
                    error!(error = %e, "Error sending work");
                }
            }
        }
    }
    info!("Task dispatcher stopped");
}

pub async fn reconcile_tasks(manager: Arc<Manager>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(manager.config.update_interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                debug!("Checking for task updates from workers");
                if let Err(e) = manager.update_tasks().await {
                    error!(error = %e, "Error updating tasks");
                }
            }
        }
    }
    info!("Task reconciler stopped");
}

pub async fn health_check_tasks(manager: Arc<Manager>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(manager.config.health_check_interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                debug!("Performing task health check");
                manager.do_health_checks().await;
            }
        }
    }
    info!("Health checker stopped");
}

pub async fn refresh_node_stats(manager: Arc<Manager>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(manager.config.node_stats_interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => manager.update_node_stats().await,
        }
    }
    info!("Node stats collector stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn restarted(count: u32) -> Task {
        let mut task = Task::new("web", "nginx", Vec::new());
        task.restart_count = count;
        task
    }

    #[test]
    fn restart_redelivery_needs_matching_count() {
        let persisted = restarted(1);
        let event = TaskEvent::new(State::Running, persisted.clone());
        assert!(is_pending_restart(&event, &persisted));

        let stale = TaskEvent::new(State::Running, restarted(0));
        assert!(!is_pending_restart(&stale, &persisted));
    }

    #[test]
    fn first_delivery_is_not_a_restart() {
        let persisted = restarted(0);
        let event = TaskEvent::new(State::Running, persisted.clone());
        assert!(!is_pending_restart(&event, &persisted));
    }

    #[test]
    fn running_record_is_not_redelivered() {
        let mut persisted = restarted(2);
        persisted.state = State::Running;
        let event = TaskEvent::new(State::Running, persisted.clone());
        assert!(!is_pending_restart(&event, &persisted));
    }

    #[tokio::test]
    async fn new_manager_tracks_one_node_per_worker() {
        let config = ManagerConfig::new(vec!["a:1".to_string(), "b:2".to_string()]);
        let manager = Manager::new(config).unwrap();

        let nodes = manager.get_nodes().await;
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].name, "a:1");
        assert_eq!(nodes[1].api, "http://b:2");
        assert!(manager.get_tasks().is_empty());
    }

    #[tokio::test]
    async fn empty_queue_sends_nothing() {
        let manager = Manager::new(ManagerConfig::new(vec!["127.0.0.1:1".to_string()])).unwrap();
        manager.send_work().await.unwrap();
        assert!(manager.assignments.lock().await.is_empty());
        assert_eq!(manager.event_db.count().unwrap(), 0);
    }
}
