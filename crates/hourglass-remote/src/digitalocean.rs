//! DigitalOcean droplet power control

use async_trait::async_trait;
use hourglass_config::CloudSettings;
use hourglass_host_api::{CloudPower, PowerError, PowerResult};
use reqwest::header::CONTENT_TYPE;
use tracing::{info, warn};

/// Droplet actions endpoint client
pub struct DigitalOceanPower {
    client: reqwest::Client,
    api_url: String,
    droplet_id: String,
    api_token: String,
}

impl DigitalOceanPower {
    pub fn new(settings: &CloudSettings) -> PowerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .connect_timeout(settings.request_timeout)
            .build()
            .map_err(|e| PowerError::Request(e.to_string()))?;

        Ok(Self {
            client,
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            droplet_id: settings.droplet_id.clone(),
            api_token: settings.api_token.clone(),
        })
    }

    pub fn actions_url(&self) -> String {
        format!("{}/droplets/{}/actions", self.api_url, self.droplet_id)
    }

    /// Submit a droplet action. The API answers once the action is queued,
    /// not when it finishes.
    async fn action(&self, action: &str) -> PowerResult<()> {
        let body = serde_json::json!({ "type": action }).to_string();

        let response = self
            .client
            .post(self.actions_url())
            .bearer_auth(&self.api_token)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| PowerError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            info!(droplet = %self.droplet_id, action, "Droplet action submitted");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            warn!(
                droplet = %self.droplet_id,
                action,
                status = status.as_u16(),
                "Droplet action rejected"
            );
            Err(PowerError::Api {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl CloudPower for DigitalOceanPower {
    async fn power_on(&self) -> PowerResult<()> {
        self.action("power_on").await
    }

    /// Graceful ACPI shutdown
    async fn power_off(&self) -> PowerResult<()> {
        self.action("shutdown").await
    }
}
