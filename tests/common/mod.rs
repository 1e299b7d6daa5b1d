//! Shared harness for worker and manager integration tests.
//!
//! Workers run with a scripted executor and serve their real HTTP API on a
//! random local port, so the manager talks to them exactly as in production.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{Router, http::StatusCode, routing::get};
use tokio::net::TcpListener;

use cube::config::{ManagerConfig, WorkerConfig};
use cube::manager::{Manager, ManagerServer};
use cube::scheduler::SchedulerType;
use cube::tasks::types::{
    Config, DockerResult, Executor, ExecutorError, ExecutorResult, InspectResult, State, Task,
    TaskEvent,
};
use cube::worker::{TaskServer, Worker};

/// Executor that never touches a container runtime. Every call is counted.
#[derive(Default)]
pub struct FakeExecutor {
    pub run_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    pub inspect_calls: AtomicUsize,
    pub fail_run: AtomicBool,
    pub fail_inspect: AtomicBool,
    /// Milliseconds each inspect call sleeps before answering.
    pub inspect_delay_ms: AtomicU64,
    pub status: Mutex<String>,
    pub host_ports: Mutex<BTreeMap<String, String>>,
}

impl FakeExecutor {
    pub fn new() -> Arc<Self> {
        let executor = FakeExecutor::default();
        *executor.status.lock().unwrap() = "running".to_string();
        Arc::new(executor)
    }

    pub fn set_status(&self, status: &str) {
        *self.status.lock().unwrap() = status.to_string();
    }

    pub fn publish(&self, container_port: &str, host_port: u16) {
        self.host_ports
            .lock()
            .unwrap()
            .insert(container_port.to_string(), host_port.to_string());
    }

    pub fn runs(&self) -> usize {
        self.run_calls.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Executor for FakeExecutor {
    async fn run(&self, config: &Config) -> ExecutorResult<DockerResult> {
        let n = self.run_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_run.load(Ordering::SeqCst) {
            return Err(ExecutorError::ImagePull {
                image: config.image.clone(),
                message: "pull access denied".to_string(),
            });
        }
        Ok(DockerResult::success(&format!("container-{}", n), "start"))
    }

    async fn stop(&self, container_id: &str) -> ExecutorResult<DockerResult> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        Ok(DockerResult::success(container_id, "stop"))
    }

    async fn inspect(&self, container_id: &str) -> ExecutorResult<InspectResult> {
        self.inspect_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.inspect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_inspect.load(Ordering::SeqCst) {
            return Err(ExecutorError::Other(format!(
                "no such container: {}",
                container_id
            )));
        }
        Ok(InspectResult {
            status: self.status.lock().unwrap().clone(),
            host_ports: self.host_ports.lock().unwrap().clone(),
        })
    }
}

pub fn test_worker(name: &str) -> (Arc<Worker>, Arc<FakeExecutor>) {
    let executor = FakeExecutor::new();
    let worker = Worker::new(WorkerConfig::new(name), executor.clone()).unwrap();
    (Arc::new(worker), executor)
}

/// Serves the worker API on `listener` and returns its `host:port`.
pub async fn serve_worker(worker: Arc<Worker>, listener: TcpListener) -> String {
    let addr = listener.local_addr().unwrap();
    let app = TaskServer::router(worker);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    format!("127.0.0.1:{}", addr.port())
}

pub async fn spawn_worker(worker: Arc<Worker>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    serve_worker(worker, listener).await
}

pub async fn spawn_manager(manager: Arc<Manager>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = ManagerServer::router(manager);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    format!("127.0.0.1:{}", addr.port())
}

/// An address with nothing listening on it.
pub async fn unreachable_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("127.0.0.1:{}", port)
}

/// Serves `GET /health` with a fixed status and returns the port.
pub async fn spawn_health_server(status: StatusCode) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let app = Router::new().route("/health", get(move || async move { status }));

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    port
}

pub fn test_manager_config(workers: Vec<String>) -> ManagerConfig {
    ManagerConfig {
        request_timeout: Duration::from_secs(2),
        stats_retries: 1,
        stats_backoff: Duration::from_millis(10),
        ..ManagerConfig::new(workers)
    }
}

pub fn test_manager(workers: Vec<String>) -> Arc<Manager> {
    Arc::new(Manager::new(test_manager_config(workers)).unwrap())
}

pub fn test_manager_with(workers: Vec<String>, scheduler: SchedulerType) -> Arc<Manager> {
    let config = test_manager_config(workers).with_scheduler(scheduler);
    Arc::new(Manager::new(config).unwrap())
}

pub fn run_event(name: &str) -> TaskEvent {
    TaskEvent::new(State::Running, Task::new(name, "nginx:latest", Vec::new()))
}

pub fn stop_event(task: &Task) -> TaskEvent {
    let mut task = task.clone();
    task.state = State::Completed;
    TaskEvent::new(State::Completed, task)
}
