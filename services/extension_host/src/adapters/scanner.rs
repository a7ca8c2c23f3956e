//! services/extension_host/src/adapters/scanner.rs

use async_trait::async_trait;
use synthstyle_core::domain::BodyMeasurements;
use synthstyle_core::ports::{BodyScanner, PortError, PortResult};
use tracing::warn;

/// Stands in for a body-scanning model when none is installed. Every scan fails
/// with `Unavailable`, which the background reports to the popup.
pub struct UnconfiguredScanner;

#[async_trait]
impl BodyScanner for UnconfiguredScanner {
    async fn measure(&self, stream: &str) -> PortResult<BodyMeasurements> {
        warn!("Body scan requested for stream {} but no scanner is configured.", stream);
        Err(PortError::Unavailable(
            "Body scanning is not configured".to_string(),
        ))
    }
}
