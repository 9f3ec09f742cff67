//! Operation Runners
//!
//! Shared by the CLI and the stdio server: validate the provider
//! configuration, run one operation, and wrap the outcome in a JSON envelope.
//!
//! Configuration is validated on every call, before any connection is
//! attempted.

use std::time::Instant;

use crate::bridge::{Operation, Provider, ResourceRequest, ResourceResponse};
use crate::config::ProviderConfig;
use crate::engine::cockroach::{ConnectionDescriptor, ConnectionFactory};
use crate::engine::ConnectionInfo;
use crate::error::ProviderError;
use crate::output::{ErrorEnvelope, Metadata, SuccessEnvelope};

/// Outcome of a command: a success or an error envelope
pub type Envelope<T> = std::result::Result<SuccessEnvelope<T>, ErrorEnvelope>;

/// Run one resource operation against the cluster
pub async fn run_operation(
    config: &ProviderConfig,
    operation: Operation,
    request: ResourceRequest,
) -> Envelope<ResourceResponse> {
    let start = Instant::now();
    let resource = request.resource.clone();
    let fail = |err: ProviderError| ErrorEnvelope::from_error(resource.as_str(), operation.as_str(), &err);

    let descriptor = config.validate().map_err(&fail)?;
    let provider = Provider::new(ConnectionFactory::new(descriptor));
    let response = provider.handle(operation, request).await.map_err(&fail)?;

    let meta = Metadata::with_drift(elapsed_ms(start), response.drifted.clone());
    Ok(SuccessEnvelope::new(resource.as_str(), operation.as_str(), response, meta))
}

/// Open a session, report server metadata, and close it
pub async fn run_check(config: &ProviderConfig) -> Envelope<ConnectionInfo> {
    let start = Instant::now();
    let fail = |err: ProviderError| ErrorEnvelope::from_error("", "check", &err);

    let descriptor = config.validate().map_err(fail)?;
    let info = ConnectionFactory::new(descriptor).validate_connection().await.map_err(fail)?;

    Ok(SuccessEnvelope::new("", "check", info, Metadata::new(elapsed_ms(start))))
}

/// Validate the configuration without connecting
pub fn run_configure(config: &ProviderConfig) -> Envelope<ConfiguredProvider> {
    let start = Instant::now();
    let descriptor = config
        .validate()
        .map_err(|err| ErrorEnvelope::from_error("", "configure", &err))?;

    let data = ConfiguredProvider::from_descriptor(&descriptor)
        .map_err(|err| ErrorEnvelope::from_error("", "configure", &err))?;
    Ok(SuccessEnvelope::new("", "configure", data, Metadata::new(elapsed_ms(start))))
}

/// Non-secret view of a validated configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConfiguredProvider {
    pub host: String,
    pub username: String,
    /// Connection URI with the password masked
    pub uri: String,
}

impl ConfiguredProvider {
    fn from_descriptor(descriptor: &ConnectionDescriptor) -> crate::Result<Self> {
        Ok(Self {
            host: descriptor.host().to_string(),
            username: descriptor.admin_username().to_string(),
            uri: descriptor.redacted_uri()?,
        })
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
