use std::time::Duration;

use tracing::warn;

use super::types::{Node, NodeError, NodeResult};
use crate::worker::types::SystemStats;

impl Node {
    pub fn new(name: &str, api: &str, role: &str) -> Self {
        let ip = name.split(':').next().unwrap_or_default().to_string();
        Node {
            name: name.to_string(),
            ip,
            api: api.to_string(),
            role: role.to_string(),
            ..Default::default()
        }
    }

    /// Node record for a worker listening on `address` (`host:port`).
    pub fn for_worker(address: &str) -> Self {
        Node::new(address, &format!("http://{}", address), "worker")
    }

    /// Fetches `GET {api}/stats`, retrying failed sends `retries` times with a
    /// fixed `backoff` between attempts.
    pub async fn get_stats(
        &self,
        client: &reqwest::Client,
        retries: u32,
        backoff: Duration,
    ) -> NodeResult<SystemStats> {
        let url = format!("{}/stats", self.api);
        let resp = http_with_retry(client, &url, retries.max(1), backoff).await?;

        if !resp.status().is_success() {
            return Err(NodeError::Status {
                url,
                status: resp.status().as_u16(),
            });
        }

        resp.json::<SystemStats>()
            .await
            .map_err(|source| NodeError::Decode {
                node: self.name.clone(),
                source,
            })
    }

    pub fn apply_stats(&mut self, stats: SystemStats) {
        self.cores = stats.total_cpus;
        self.memory = stats.total_memory;
        self.memory_allocated = stats.used_memory;
        self.disk = stats.total_disk;
        self.disk_allocated = stats.used_disk;
        self.task_count = stats.task_count;
        self.stats = Some(stats);
    }
}

async fn http_with_retry(
    client: &reqwest::Client,
    url: &str,
    attempts: u32,
    backoff: Duration,
) -> NodeResult<reqwest::Response> {
    let mut attempt = 1;
    loop {
        match client.get(url).send().await {
            Ok(resp) => return Ok(resp),
            Err(source) if attempt >= attempts => {
                return Err(NodeError::Request {
                    url: url.to_string(),
                    source,
                });
            }
            Err(e) => {
                warn!(url, attempt, error = %e, "Error calling node, retrying");
                attempt += 1;
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_node_derives_ip_and_api() {
        let node = Node::for_worker("10.0.0.5:5556");
        assert_eq!(node.name, "10.0.0.5:5556");
        assert_eq!(node.ip, "10.0.0.5");
        assert_eq!(node.api, "http://10.0.0.5:5556");
        assert_eq!(node.role, "worker");
        assert!(node.stats.is_none());
    }

    #[test]
    fn apply_stats_overwrites_capacity() {
        let mut node = Node::for_worker("localhost:5556");
        node.apply_stats(SystemStats {
            total_cpus: 8,
            total_memory: 16_000,
            used_memory: 4_000,
            total_disk: 500_000,
            used_disk: 100_000,
            task_count: 2,
            ..Default::default()
        });

        assert_eq!(node.cores, 8);
        assert_eq!(node.memory, 16_000);
        assert_eq!(node.memory_allocated, 4_000);
        assert_eq!(node.disk, 500_000);
        assert_eq!(node.disk_allocated, 100_000);
        assert_eq!(node.task_count, 2);
        assert!(node.stats.is_some());
    }

    #[tokio::test]
    async fn get_stats_gives_up_after_retries() {
        let node = Node::for_worker("127.0.0.1:1");
        let client = reqwest::Client::new();
        let err = node
            .get_stats(&client, 2, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Request { .. }));
    }
}
