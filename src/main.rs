use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use cube::config::{ManagerConfig, WorkerConfig};
use cube::manager::{self, Manager, ManagerServer};
use cube::node::Node;
use cube::scheduler::SchedulerType;
use cube::shutdown::install_shutdown_handler;
use cube::store::StoreType;
use cube::tasks::types::{DockerClient, ErrResponse, Task, TaskEvent};
use cube::worker::{self, TaskServer, Worker};

#[derive(Parser, Debug)]
#[command(name = "cube")]
#[command(version)]
#[command(about = "A small container orchestrator: one manager, many workers")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the manager: accept tasks, schedule them onto workers, reconcile and restart
    Manager(ManagerArgs),

    /// Run a worker: execute tasks and report their state
    Worker(WorkerArgs),

    /// Submit a task event file to the manager
    Run {
        #[command(flatten)]
        client: ClientArgs,

        /// Task event specification file
        #[arg(long, short = 'f', default_value = "task.json")]
        filename: PathBuf,
    },

    /// Ask the manager to stop a task
    Stop {
        #[command(flatten)]
        client: ClientArgs,

        /// Task id
        id: Uuid,
    },

    /// List tasks known to the manager
    Status {
        #[command(flatten)]
        client: ClientArgs,
    },

    /// List worker nodes known to the manager
    Node {
        #[command(flatten)]
        client: ClientArgs,
    },
}

#[derive(Parser, Debug)]
struct ManagerArgs {
    /// Hostname or IP address to bind
    #[arg(long, short = 'H', default_value = "0.0.0.0")]
    host: String,

    #[arg(long, short = 'p', default_value = "5555")]
    port: u16,

    /// Worker addresses (comma-separated, format: "host:port")
    #[arg(long, short = 'w', value_delimiter = ',', default_value = "localhost:5556")]
    workers: Vec<String>,

    /// "roundrobin" or "epvm"
    #[arg(long, short = 's', default_value = "roundrobin")]
    scheduler: SchedulerType,

    /// Datastore for tasks and events: "memory" or "persistent"
    #[arg(long, short = 'd', default_value = "memory")]
    store: StoreType,

    /// Directory for persistent store files
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,
}

#[derive(Parser, Debug)]
struct WorkerArgs {
    /// Hostname or IP address to bind
    #[arg(long, short = 'H', default_value = "0.0.0.0")]
    host: String,

    #[arg(long, short = 'p', default_value = "5556")]
    port: u16,

    /// Worker name, also used for the persistent store file name
    #[arg(long, short = 'n')]
    name: Option<String>,

    /// Datastore for tasks: "memory" or "persistent"
    #[arg(long, short = 'd', default_value = "memory")]
    store: StoreType,

    /// Directory for persistent store files
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,
}

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Manager to talk to
    #[arg(long, short = 'm', default_value = "localhost:5555")]
    manager: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Manager(args) => run_manager(args).await,
        Commands::Worker(args) => run_worker(args).await,
        Commands::Run { client, filename } => submit_task(&client.manager, &filename).await,
        Commands::Stop { client, id } => stop_task(&client.manager, &id).await,
        Commands::Status { client } => print_tasks(&client.manager).await,
        Commands::Node { client } => print_nodes(&client.manager).await,
    }
}

async fn run_manager(args: ManagerArgs) -> anyhow::Result<()> {
    let config = ManagerConfig {
        host: args.host,
        port: args.port,
        ..ManagerConfig::new(args.workers)
    }
    .with_scheduler(args.scheduler)
    .with_store(args.store, &args.data_dir);

    let m = Arc::new(Manager::new(config).context("failed to create manager")?);
    let cancel = install_shutdown_handler();

    let loops = vec![
        tokio::spawn(manager::process_tasks(m.clone(), cancel.clone())),
        tokio::spawn(manager::reconcile_tasks(m.clone(), cancel.clone())),
        tokio::spawn(manager::health_check_tasks(m.clone(), cancel.clone())),
        tokio::spawn(manager::refresh_node_stats(m.clone(), cancel.clone())),
    ];

    info!(
        workers = ?m.workers,
        scheduler = %m.config.scheduler,
        store = %m.config.store,
        "Starting manager"
    );
    let server = ManagerServer::new(m.clone(), &m.config.host, m.config.port);
    let served = server.start_server(cancel.clone()).await;
    cancel.cancel();

    for handle in loops {
        if let Err(e) = handle.await {
            error!(error = %e, "Manager loop panicked");
        }
    }

    served.context("manager API failed")
}

async fn run_worker(args: WorkerArgs) -> anyhow::Result<()> {
    let name = args
        .name
        .unwrap_or_else(|| format!("worker-{}", Uuid::new_v4()));
    let config = WorkerConfig {
        host: args.host,
        port: args.port,
        store: args.store,
        data_dir: args.data_dir,
        ..WorkerConfig::new(&name)
    };

    let executor = Arc::new(DockerClient::new().context("failed to connect to docker")?);
    let w = Arc::new(Worker::new(config, executor).context("failed to create worker")?);
    let cancel = install_shutdown_handler();

    let loops = vec![
        tokio::spawn(worker::run_tasks(w.clone(), cancel.clone())),
        tokio::spawn(worker::collect_stats(w.clone(), cancel.clone())),
        tokio::spawn(worker::reconcile_tasks(w.clone(), cancel.clone())),
    ];

    info!(worker = %w.name, store = %w.config.store, "Starting worker");
    let server = TaskServer::new(w.clone(), &w.config.host, w.config.port);
    let served = server.start_server(cancel.clone()).await;
    cancel.cancel();

    for handle in loops {
        if let Err(e) = handle.await {
            error!(error = %e, "Worker loop panicked");
        }
    }

    served.context("worker API failed")
}

async fn submit_task(manager: &str, filename: &Path) -> anyhow::Result<()> {
    let data = tokio::fs::read_to_string(filename)
        .await
        .with_context(|| format!("failed to read {}", filename.display()))?;
    let task_event: TaskEvent = serde_json::from_str(&data)
        .with_context(|| format!("{} is not a valid task event", filename.display()))?;

    let url = format!("http://{}/tasks", manager);
    let resp = reqwest::Client::new()
        .post(&url)
        .json(&task_event)
        .send()
        .await
        .with_context(|| format!("failed to reach manager at {}", manager))?;

    if resp.status() != reqwest::StatusCode::CREATED {
        bail!(error_message(resp).await);
    }

    let task: Task = resp.json().await.context("invalid response from manager")?;
    println!("Task {} submitted", task.id);
    Ok(())
}

async fn stop_task(manager: &str, id: &Uuid) -> anyhow::Result<()> {
    let url = format!("http://{}/tasks/{}", manager, id);
    let resp = reqwest::Client::new()
        .delete(&url)
        .send()
        .await
        .with_context(|| format!("failed to reach manager at {}", manager))?;

    if resp.status() != reqwest::StatusCode::NO_CONTENT {
        bail!(error_message(resp).await);
    }

    println!("Task {} has been stopped", id);
    Ok(())
}

async fn print_tasks(manager: &str) -> anyhow::Result<()> {
    let url = format!("http://{}/tasks", manager);
    let tasks: Vec<Task> = reqwest::get(&url)
        .await
        .with_context(|| format!("failed to reach manager at {}", manager))?
        .json()
        .await
        .context("invalid response from manager")?;

    println!(
        "{:<38}{:<20}{:<14}{:<12}{:<16}{}",
        "ID", "NAME", "CREATED", "STATE", "CONTAINER", "IMAGE"
    );
    for task in tasks {
        let created = task
            .start_time
            .map(|start| format!("{} ago", human_duration(Utc::now() - start)))
            .unwrap_or_else(|| "-".to_string());
        let container = task
            .container_id
            .as_deref()
            .map(|id| id.chars().take(12).collect::<String>())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<38}{:<20}{:<14}{:<12}{:<16}{}",
            task.id, task.name, created, task.state, container, task.image
        );
    }
    Ok(())
}

async fn print_nodes(manager: &str) -> anyhow::Result<()> {
    let url = format!("http://{}/nodes", manager);
    let nodes: Vec<Node> = reqwest::get(&url)
        .await
        .with_context(|| format!("failed to reach manager at {}", manager))?
        .json()
        .await
        .context("invalid response from manager")?;

    println!(
        "{:<24}{:<16}{:<12}{:<10}{}",
        "NAME", "MEMORY (MiB)", "DISK (GiB)", "ROLE", "TASKS"
    );
    for node in nodes {
        println!(
            "{:<24}{:<16}{:<12}{:<10}{}",
            node.name,
            node.memory / 1024 / 1024,
            node.disk / 1024 / 1024 / 1024,
            node.role,
            node.task_count
        );
    }
    Ok(())
}

async fn error_message(resp: reqwest::Response) -> String {
    let status = resp.status();
    match resp.json::<ErrResponse>().await {
        Ok(body) => format!("manager returned {}: {}", body.http_status_code, body.message),
        Err(_) => format!("manager returned {}", status),
    }
}

fn human_duration(elapsed: chrono::Duration) -> String {
    let secs = elapsed.num_seconds().max(0);
    match secs {
        0..=59 => format!("{}s", secs),
        60..=3599 => format!("{}m", secs / 60),
        3600..=86_399 => format!("{}h", secs / 3600),
        _ => format!("{}d", secs / 86_400),
    }
}
