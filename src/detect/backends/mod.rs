pub mod landing_ai;
pub mod stub;

use anyhow::{anyhow, Result};
use std::time::Duration;

use super::client::DetectionClient;

pub use landing_ai::{LandingAiClient, DEFAULT_PREDICT_URL};
pub use stub::StubClient;

/// Connection settings for the remote detector.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectorSettings {
    pub predict_url: String,
    pub endpoint_id: String,
    pub api_key: String,
    pub request_timeout: Duration,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            predict_url: DEFAULT_PREDICT_URL.to_string(),
            endpoint_id: String::new(),
            api_key: String::new(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl DetectorSettings {
    pub fn is_stub(&self) -> bool {
        self.endpoint_id.starts_with("stub://")
    }

    /// Reject empty or template credentials before any frame is captured.
    pub fn validate_credentials(&self) -> Result<()> {
        if self.is_stub() {
            return Ok(());
        }
        for (name, value) in [("endpoint id", &self.endpoint_id), ("api key", &self.api_key)] {
            let value = value.trim();
            if value.is_empty() || value.contains("your-") {
                return Err(anyhow!(
                    "landing ai {} is not configured (set LANDING_AI_ENDPOINT_ID and LANDING_AI_API_KEY)",
                    name
                ));
            }
        }
        Ok(())
    }
}

/// Build the detection client named by `settings`.
pub fn client_from_settings(settings: &DetectorSettings) -> Result<Box<dyn DetectionClient>> {
    settings.validate_credentials()?;
    if settings.is_stub() {
        log::info!("using stub detector ({})", settings.endpoint_id);
        return Ok(Box::new(StubClient::from_endpoint(&settings.endpoint_id)?));
    }
    log::info!("using landing ai endpoint {}", settings.endpoint_id);
    Ok(Box::new(LandingAiClient::new(
        &settings.predict_url,
        &settings.endpoint_id,
        &settings.api_key,
        settings.request_timeout,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_credentials_are_rejected() {
        let settings = DetectorSettings {
            endpoint_id: "your-endpoint-id".to_string(),
            api_key: "abc".to_string(),
            ..DetectorSettings::default()
        };
        assert!(client_from_settings(&settings).is_err());

        let empty = DetectorSettings::default();
        assert!(empty.validate_credentials().is_err());
    }

    #[test]
    fn stub_endpoint_needs_no_key() -> Result<()> {
        let settings = DetectorSettings {
            endpoint_id: "stub://bench".to_string(),
            ..DetectorSettings::default()
        };
        let client = client_from_settings(&settings)?;
        assert_eq!(client.name(), "stub");
        Ok(())
    }
}
