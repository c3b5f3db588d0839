//! Vector database (qdrant).

use async_trait::async_trait;

use super::managed::{ManagedService, ServiceProfile};
use crate::config::{ServiceConfig, TimeoutConfig};
use crate::error::Result;
use crate::health::{probe_http, probe_tcp};
use crate::platform::{NamingTable, TARGET_TRIPLE_NAMING};

#[derive(Debug, Clone, Copy, Default)]
pub struct VectorDbProfile;

/// Lifecycle manager for the vector database.
pub type VectorDb = ManagedService<VectorDbProfile>;

/// URL of the HTTP health endpoint.
#[must_use]
pub fn healthz_url(config: &ServiceConfig) -> String {
    format!("http://localhost:{}/healthz", config.port)
}

#[async_trait]
impl ServiceProfile for VectorDbProfile {
    fn name(&self) -> &'static str {
        "qdrant"
    }

    fn naming(&self) -> NamingTable {
        TARGET_TRIPLE_NAMING
    }

    async fn check_health(
        &self,
        config: &ServiceConfig,
        timeouts: &TimeoutConfig,
        client: &reqwest::Client,
    ) -> Result<()> {
        probe_tcp(&config.health_address(), timeouts.probe).await?;
        probe_http(client, &healthz_url(config)).await
    }
}

impl ManagedService<VectorDbProfile> {
    /// Create a vector database manager.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] if the snapshot is incomplete.
    pub fn vector_db(config: ServiceConfig, timeouts: TimeoutConfig) -> Result<Self> {
        Self::new(VectorDbProfile, config, timeouts)
    }
}
