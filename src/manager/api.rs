use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State as AxumState, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use super::types::{Manager, ManagerServer};
use crate::node::Node;
use crate::tasks::types::{ErrResponse, State, Task, TaskEvent};

impl ManagerServer {
    pub fn new(manager: Arc<Manager>, address: &str, port: u16) -> Self {
        Self {
            manager,
            address: address.to_string(),
            port,
        }
    }

    async fn start_task(
        AxumState(manager): AxumState<Arc<Manager>>,
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

        let task = task_event.task.clone();
        info!(task_id = %task.id, event_id = %task_event.id, "Added task");
        manager.add_task(task_event).await;
        (StatusCode::CREATED, Json(task)).into_response()
    }

    async fn get_tasks(AxumState(manager): AxumState<Arc<Manager>>) -> Json<Vec<Task>> {
        Json(manager.get_tasks())
    }

    async fn stop_task(
        AxumState(manager): AxumState<Arc<Manager>>,
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

        let mut task = match manager.get_task(&task_id) {
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

        task.state = State::Completed;
        let task_event = TaskEvent::new(State::Completed, task);
        info!(task_id = %task_id, event_id = %task_event.id, "Added stop event");
        manager.add_task(task_event).await;
        StatusCode::NO_CONTENT.into_response()
    }

    async fn get_nodes(AxumState(manager): AxumState<Arc<Manager>>) -> Json<Vec<Node>> {
        Json(manager.get_nodes().await)
    }

    pub fn router(manager: Arc<Manager>) -> Router {
        Router::new()
            .route(
                "/tasks",
                get(ManagerServer::get_tasks).post(ManagerServer::start_task),
            )
            .route("/tasks/{id}", delete(ManagerServer::stop_task))
            .route("/nodes", get(ManagerServer::get_nodes))
            .with_state(manager)
    }

    pub async fn start_server(self, cancel: CancellationToken) -> std::io::Result<()> {
        let addr = format!("{}:{}", self.address, self.port);
        let listener = TcpListener::bind(&addr).await?;
        info!(addr = %addr, "Manager API listening");

        axum::serve(listener, ManagerServer::router(self.manager))
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
    }
}
