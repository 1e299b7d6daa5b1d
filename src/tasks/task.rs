use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use uuid::Uuid;

use super::types::{Config, ErrResponse, State, Task, TaskEvent};

impl Task {
    pub fn new(name: &str, image: &str, env: Vec<String>) -> Self {
        Task {
            id: Uuid::new_v4(),
            name: name.to_string(),
            state: State::Scheduled,
            image: image.to_string(),
            env,
            ..Default::default()
        }
    }

    pub fn key(&self) -> String {
        self.id.to_string()
    }

    /// First observed host port, in container port order.
    pub fn host_port(&self) -> Option<&str> {
        self.host_ports
            .values()
            .find(|port| !port.is_empty())
            .map(String::as_str)
    }
}

impl TaskEvent {
    pub fn new(state: State, task: Task) -> Self {
        TaskEvent {
            id: Uuid::new_v4(),
            state,
            timestamp: Utc::now(),
            task,
        }
    }

    pub fn key(&self) -> String {
        self.id.to_string()
    }
}

impl ErrResponse {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ErrResponse {
            http_status_code: status.as_u16(),
            message: message.into(),
        }
    }
}

impl IntoResponse for ErrResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

pub fn new_config(task: &Task) -> Config {
    Config {
        name: task.name.clone(),
        image: task.image.clone(),
        cpu: task.cpu,
        memory: task.memory as i64,
        disk: task.disk as i64,
        env: task.env.clone(),
        exposed_ports: task.exposed_ports.clone(),
        restart_policy: task.restart_policy.clone(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_starts_scheduled_with_no_runtime_fields() {
        let task = Task::new("web", "nginx:latest", vec!["A=1".to_string()]);
        assert_eq!(task.state, State::Scheduled);
        assert_eq!(task.restart_count, 0);
        assert!(task.container_id.is_none());
        assert!(task.start_time.is_none());
        assert!(task.finish_time.is_none());
    }

    #[test]
    fn host_port_picks_first_non_empty_binding() {
        let mut task = Task::default();
        assert!(task.host_port().is_none());

        task.host_ports.insert("443/tcp".to_string(), String::new());
        task.host_ports.insert("80/tcp".to_string(), "32768".to_string());
        assert_eq!(task.host_port(), Some("32768"));
    }

    #[test]
    fn task_json_defaults_missing_fields() {
        let id = Uuid::new_v4();
        let body = format!(r#"{{"id":"{}","name":"web","image":"nginx"}}"#, id);
        let task: Task = serde_json::from_str(&body).unwrap();
        assert_eq!(task.id, id);
        assert_eq!(task.state, State::Pending);
        assert!(task.health_check.is_empty());
    }

    #[test]
    fn task_json_rejects_unknown_fields() {
        let body = r#"{"name":"web","bogus":true}"#;
        assert!(serde_json::from_str::<Task>(body).is_err());
    }

    #[test]
    fn err_response_uses_wire_field_names() {
        let body = serde_json::to_value(ErrResponse::new(StatusCode::NOT_FOUND, "missing")).unwrap();
        assert_eq!(body["HTTPStatusCode"], 404);
        assert_eq!(body["Message"], "missing");
    }

    #[test]
    fn config_carries_resources_and_env() {
        let mut task = Task::new("db", "postgres:16", vec!["POSTGRES_USER=cube".to_string()]);
        task.memory = 512;
        task.cpu = 0.5;
        task.restart_policy = "always".to_string();

        let config = new_config(&task);
        assert_eq!(config.name, "db");
        assert_eq!(config.memory, 512);
        assert_eq!(config.cpu, 0.5);
        assert_eq!(config.env, vec!["POSTGRES_USER=cube".to_string()]);
        assert_eq!(config.restart_policy, "always");
    }
}
