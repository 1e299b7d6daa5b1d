use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use bollard::{
    Docker,
    container::{
        CreateContainerOptions, InspectContainerOptions, RemoveContainerOptions,
        StartContainerOptions, StopContainerOptions,
    },
    image::CreateImageOptions,
    models::{ContainerInspectResponse, HostConfig, RestartPolicy, RestartPolicyNameEnum},
};
use futures_util::stream::StreamExt;
use tracing::{debug, error, info};

use super::types::{
    Config, DockerClient, DockerResult, Executor, ExecutorError, ExecutorResult, InspectResult,
};

impl DockerResult {
    pub fn success(container_id: &str, action: &str) -> Self {
        DockerResult {
            container_id: container_id.to_string(),
            action: action.to_string(),
        }
    }
}

impl DockerClient {
    pub fn new() -> ExecutorResult<Self> {
        let client = Docker::connect_with_local_defaults()?;
        Ok(DockerClient { client })
    }

    async fn pull_image(&self, image: &str) -> ExecutorResult<()> {
        info!(image, "Pulling image");

        let mut stream = self.client.create_image(
            Some(CreateImageOptions {
                from_image: image.to_string(),
                ..Default::default()
            }),
            None,
            None,
        );

        while let Some(msg) = stream.next().await {
            match msg {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!(image, status = %status, "Image pull progress");
                    }
                }
                Err(e) => {
                    error!(image, error = %e, "Error during image pull stream");
                    return Err(ExecutorError::ImagePull {
                        image: image.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(image, "Image pulled");
        Ok(())
    }
}

fn container_config(config: &Config) -> bollard::container::Config<String> {
    let restart_policy = RestartPolicy {
        name: Some(
            config
                .restart_policy
                .parse()
                .unwrap_or(RestartPolicyNameEnum::NO),
        ),
        maximum_retry_count: None,
    };

    let host_config = HostConfig {
        restart_policy: Some(restart_policy),
        nano_cpus: Some((config.cpu * 1_000_000_000.0) as i64),
        memory: Some(config.memory),
        publish_all_ports: Some(true),
        ..Default::default()
    };

    bollard::container::Config {
        image: Some(config.image.clone()),
        env: Some(config.env.clone()),
        exposed_ports: Some(
            config
                .exposed_ports
                .iter()
                .map(|port| (port.clone(), HashMap::new()))
                .collect(),
        ),
        host_config: Some(host_config),
        ..Default::default()
    }
}

/// Status string and the first host port bound to each container port.
fn inspect_result(resp: ContainerInspectResponse) -> InspectResult {
    let status = resp
        .state
        .and_then(|state| state.status)
        .map(|status| status.to_string())
        .unwrap_or_default();

    let mut host_ports = BTreeMap::new();
    if let Some(ports) = resp.network_settings.and_then(|settings| settings.ports) {
        for (container_port, bindings) in ports {
            let host_port = bindings
                .unwrap_or_default()
                .into_iter()
                .find_map(|binding| binding.host_port);
            if let Some(host_port) = host_port {
                host_ports.insert(container_port, host_port);
            }
        }
    }

    InspectResult { status, host_ports }
}

#[async_trait]
impl Executor for DockerClient {
    async fn run(&self, config: &Config) -> ExecutorResult<DockerResult> {
        self.pull_image(&config.image).await?;

        let options = Some(CreateContainerOptions {
            name: config.name.clone(),
            ..Default::default()
        });

        let resp = self
            .client
            .create_container(options, container_config(config))
            .await
            .inspect_err(|e| error!(name = %config.name, error = %e, "Error creating container"))?;
        info!(container_id = %resp.id, "Container created");

        self.client
            .start_container(&resp.id, None::<StartContainerOptions<String>>)
            .await
            .inspect_err(|e| error!(name = %config.name, error = %e, "Error starting container"))?;
        info!(container_id = %resp.id, name = %config.name, "Container started");

        Ok(DockerResult::success(&resp.id, "start"))
    }

    async fn stop(&self, container_id: &str) -> ExecutorResult<DockerResult> {
        info!(container_id, "Stopping container");
        self.client
            .stop_container(container_id, None::<StopContainerOptions>)
            .await?;

        self.client
            .remove_container(
                container_id,
                Some(RemoveContainerOptions {
                    v: true,
                    force: false,
                    link: false,
                }),
            )
            .await?;
        info!(container_id, "Container stopped and removed");

        Ok(DockerResult::success(container_id, "stop"))
    }

    async fn inspect(&self, container_id: &str) -> ExecutorResult<InspectResult> {
        let resp = self
            .client
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await?;
        Ok(inspect_result(resp))
    }
}
