//! Desired state: what the zone should contain according to the metadata source

use std::collections::HashMap;
use std::net::IpAddr;

use tracing::{debug, info, warn};

use crate::config::ReconcileConfig;
use crate::error::Result;
use crate::record::{DnsRecord, RecordSet, ServiceInstance};
use crate::traits::MetadataSource;

/// Builds the desired [`RecordSet`] from discovered service instances
///
/// Every instance of a service maps to
/// `service.stack.environment.root_domain` (lower-cased). Instances of the
/// same service merge into one record carrying every instance's host IP in
/// first-seen order.
#[derive(Debug, Clone)]
pub struct DesiredStateBuilder {
    environment_name: String,
    root_domain: String,
    ttl: u32,
}

impl DesiredStateBuilder {
    /// Create a builder for the configured environment and root domain
    pub fn new(config: &ReconcileConfig) -> Self {
        Self {
            environment_name: config.environment_name.clone(),
            root_domain: config.root_domain.clone(),
            ttl: config.ttl,
        }
    }

    /// Domain name an instance publishes under
    pub fn domain_name(&self, instance: &ServiceInstance) -> String {
        [
            instance.service_name.as_str(),
            instance.stack_name.as_str(),
            self.environment_name.as_str(),
            self.root_domain.as_str(),
        ]
        .join(".")
        .to_lowercase()
    }

    /// List instances from the source and build the desired record set
    ///
    /// # Errors
    ///
    /// Only a failure to list instances is returned. Instances that cannot
    /// be resolved are skipped.
    pub async fn read(&self, source: &dyn MetadataSource) -> Result<RecordSet> {
        let instances = source.list_service_instances().await?;
        debug!(
            "Discovered {} instance(s) from {}",
            instances.len(),
            source.source_name()
        );
        Ok(self.build(&instances, source).await)
    }

    /// Build the desired record set from already-listed instances
    ///
    /// Each host is resolved at most once per call.
    pub async fn build(
        &self,
        instances: &[ServiceInstance],
        source: &dyn MetadataSource,
    ) -> RecordSet {
        let mut records = RecordSet::new();
        let mut resolved: HashMap<&str, Option<IpAddr>> = HashMap::new();

        for instance in instances {
            if instance.service_name.is_empty() {
                continue;
            }

            if instance.host_id.is_empty() {
                debug!("Instance {} has no host id, skipping", instance.name);
                continue;
            }

            let ip = match resolved.get(instance.host_id.as_str()) {
                Some(ip) => *ip,
                None => {
                    let ip = match source.resolve_host(&instance.host_id).await {
                        Ok(ip) => Some(ip),
                        Err(e) => {
                            warn!("Skipping instance {}: {}", instance.name, e);
                            None
                        }
                    };
                    resolved.insert(instance.host_id.as_str(), ip);
                    ip
                }
            };

            let Some(ip) = ip else {
                continue;
            };

            let record =
                DnsRecord::new(self.domain_name(instance), vec![ip.to_string()]).with_ttl(self.ttl);
            records.merge(record);
        }

        info!("Desired state: {} record(s)", records.len());
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StaticSource {
        instances: Vec<ServiceInstance>,
        hosts: HashMap<String, IpAddr>,
        resolve_calls: Mutex<Vec<String>>,
    }

    impl StaticSource {
        fn new(instances: Vec<ServiceInstance>, hosts: &[(&str, [u8; 4])]) -> Self {
            Self {
                instances,
                hosts: hosts
                    .iter()
                    .map(|(id, ip)| (id.to_string(), IpAddr::from(*ip)))
                    .collect(),
                resolve_calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MetadataSource for StaticSource {
        async fn list_service_instances(&self) -> Result<Vec<ServiceInstance>> {
            Ok(self.instances.clone())
        }

        async fn resolve_host(&self, host_id: &str) -> Result<IpAddr> {
            self.resolve_calls.lock().unwrap().push(host_id.to_string());
            self.hosts
                .get(host_id)
                .copied()
                .ok_or_else(|| Error::host_resolution(host_id, "unknown host"))
        }

        fn source_name(&self) -> &'static str {
            "static"
        }
    }

    fn builder() -> DesiredStateBuilder {
        DesiredStateBuilder::new(&ReconcileConfig::new("Env", "Example.com"))
    }

    #[test]
    fn test_domain_name_is_lowercase_join() {
        let instance = ServiceInstance::new("web-1", "Web", "Stack", "h1");
        assert_eq!(builder().domain_name(&instance), "web.stack.env.example.com");
    }

    #[tokio::test]
    async fn test_instances_of_one_service_merge_in_order() {
        let source = StaticSource::new(
            vec![
                ServiceInstance::new("web-1", "web", "stack", "h1"),
                ServiceInstance::new("db-1", "db", "stack", "h1"),
                ServiceInstance::new("web-2", "web", "stack", "h2"),
            ],
            &[("h1", [10, 0, 0, 1]), ("h2", [10, 0, 0, 2])],
        );

        let records = builder().read(&source).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(
            records.get("web.stack.env.example.com").unwrap().values,
            vec!["10.0.0.1", "10.0.0.2"]
        );
        assert_eq!(
            records.get("db.stack.env.example.com").unwrap().values,
            vec!["10.0.0.1"]
        );
    }

    #[tokio::test]
    async fn test_skips_standalone_and_unresolvable_instances() {
        let source = StaticSource::new(
            vec![
                ServiceInstance::new("standalone", "", "", "h1"),
                ServiceInstance::new("no-host", "api", "stack", ""),
                ServiceInstance::new("lost", "api", "stack", "gone"),
                ServiceInstance::new("web-1", "web", "stack", "h1"),
            ],
            &[("h1", [10, 0, 0, 1])],
        );

        let records = builder().read(&source).await.unwrap();

        assert_eq!(records.len(), 1);
        assert!(records.contains("web.stack.env.example.com"));
        assert!(!records.contains("api.stack.env.example.com"));
    }

    #[tokio::test]
    async fn test_each_host_resolved_once() {
        let source = StaticSource::new(
            vec![
                ServiceInstance::new("web-1", "web", "stack", "h1"),
                ServiceInstance::new("api-1", "api", "stack", "h1"),
                ServiceInstance::new("lost-1", "lost", "stack", "gone"),
                ServiceInstance::new("lost-2", "lost", "other", "gone"),
            ],
            &[("h1", [10, 0, 0, 1])],
        );

        let records = builder().read(&source).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(*source.resolve_calls.lock().unwrap(), vec!["h1", "gone"]);
    }

    #[tokio::test]
    async fn test_configured_ttl_applied() {
        let source = StaticSource::new(
            vec![ServiceInstance::new("web-1", "web", "stack", "h1")],
            &[("h1", [10, 0, 0, 1])],
        );
        let builder =
            DesiredStateBuilder::new(&ReconcileConfig::new("env", "example.com").with_ttl(60));

        let records = builder.read(&source).await.unwrap();
        assert_eq!(records.get("web.stack.env.example.com").unwrap().ttl, 60);
    }
}
