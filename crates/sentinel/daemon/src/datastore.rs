//! REST data store transport for the database probe

use std::time::Duration;

use async_trait::async_trait;
use sentinel_health::probes::DataStore;
use sentinel_health::{HealthError, HealthResult};

use crate::config::DataStoreConfig;

/// Data store reached over a PostgREST-style HTTP interface
pub struct RestDataStore {
    client: reqwest::Client,
    read_url: String,
    api_key: Option<String>,
}

impl RestDataStore {
    /// Create a transport from configuration
    pub fn new(config: &DataStoreConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            read_url: read_url(&config.url, &config.table),
            api_key: config.api_key.clone(),
        })
    }

    fn error(&self, reason: impl Into<String>) -> HealthError {
        HealthError::DataStore {
            store: self.name().to_string(),
            reason: reason.into(),
        }
    }
}

fn read_url(base: &str, table: &str) -> String {
    format!("{}/{}?select=id&limit=1", base.trim_end_matches('/'), table)
}

#[async_trait]
impl DataStore for RestDataStore {
    fn name(&self) -> &str {
        "rest"
    }

    async fn minimal_read(&self) -> HealthResult<()> {
        let mut request = self.client.get(&self.read_url);
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key).bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| self.error(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(self.error(format!("HTTP {}", status)));
        }
        Ok(())
    }
}
