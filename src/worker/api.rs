use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State as AxumState, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use super::types::{TaskServer, Worker};
use crate::tasks::types::{ErrResponse, State, Task, TaskEvent};

impl TaskServer {
    pub fn new(worker: Arc<Worker>, address: &str, port: u16) -> Self {
        Self {
            worker,
            address: address.to_string(),
            port,
        }
    }

    async fn get_tasks(AxumState(worker): AxumState<Arc<Worker>>) -> Json<Vec<Task>> {
        Json(worker.get_tasks())
    }

    async fn start_task(
        AxumState(worker): AxumState<Arc<Worker>>,
        payload: Result<Json<TaskEvent>, JsonRejection>,
    ) -> Response {
        let task_event = match payload {
            Ok(Json(task_event)) => task_event,
            Err(rejection) => {
                return ErrResponse::new(
                    StatusCode::BAD_REQUEST,
                    format!("Error unmarshalling body: {}", rejection.body_text()),
                )
                .into_response();
            }
        };

        let task = task_event.task;
        worker.add_task(task.clone()).await;
        info!(task_id = %task.id, event_id = %task_event.id, "Task queued to start");
        (StatusCode::CREATED, Json(task)).into_response()
    }

    async fn stop_task(
        AxumState(worker): AxumState<Arc<Worker>>,
        Path(id): Path<String>,
    ) -> Response {
        let task_id = match Uuid::parse_str(&id) {
            Ok(task_id) => task_id,
            Err(e) => {
                return ErrResponse::new(
                    StatusCode::BAD_REQUEST,
                    format!("Error parsing taskID: {}", e),
                )
                .into_response();
            }
        };

        let task = match worker.get_task(&task_id) {
            Ok(Some(task)) => task,
            Ok(None) => {
                return ErrResponse::new(
                    StatusCode::NOT_FOUND,
                    format!("no task with ID {} found", task_id),
                )
                .into_response();
            }
            Err(e) => {
                error!(task_id = %task_id, error = %e, "Failed to load task");
                return ErrResponse::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                    .into_response();
            }
        };

        let mut stopped_task = task;
        stopped_task.state = State::Completed;
        info!(task_id = %task_id, container_id = ?stopped_task.container_id, "Task queued to stop");
        worker.add_task(stopped_task).await;
        StatusCode::NO_CONTENT.into_response()
    }

    async fn get_stats(AxumState(worker): AxumState<Arc<Worker>>) -> impl IntoResponse {
        Json(worker.current_stats().await)
    }

    pub fn router(worker: Arc<Worker>) -> Router {
        Router::new()
            .route(
                "/tasks",
                get(TaskServer::get_tasks).post(TaskServer::start_task),
            )
            .route("/tasks/{id}", axum::routing::delete(TaskServer::stop_task))
            .route("/stats", get(TaskServer::get_stats))
            .with_state(worker)
    }

    pub async fn start_server(self, cancel: CancellationToken) -> std::io::Result<()> {
        let addr = format!("{}:{}", self.address, self.port);
        let listener = TcpListener::bind(&addr).await?;
        info!(worker = %self.worker.name, addr = %addr, "Worker API listening");

        axum::serve(listener, TaskServer::router(self.worker))
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
    }
}
