use super::models::Config;
use crate::endpoint::EndpointDescriptor;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("No endpoints configured (at least one [endpoints.<name>] table is required)")]
    NoEndpointsConfigured,

    #[error("Endpoint '{endpoint}' is missing required field '{field}'")]
    MissingField { endpoint: String, field: &'static str },

    #[error("Endpoint '{endpoint}' has a zero {field}")]
    ZeroInterval { endpoint: String, field: &'static str },

    #[error("Endpoint '{endpoint}' must have at least one consumer")]
    NoConsumers { endpoint: String },

    #[error("Endpoint '{endpoint}' has an invalid filter '{filter}': {reason}")]
    InvalidFilter {
        endpoint: String,
        filter: String,
        reason: String,
    },

    #[error("Endpoints '{first}' and '{second}' share the drop path {path}")]
    DuplicateDropPath {
        first: String,
        second: String,
        path: PathBuf,
    },

    #[error("Engine setting '{field}' must be positive")]
    InvalidEngineSetting { field: &'static str },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_engine(config)?;
    validate_endpoints(config)?;
    Ok(())
}

fn validate_engine(config: &Config) -> Result<(), ValidationError> {
    if config.engine.stop_timeout.is_zero() {
        return Err(ValidationError::InvalidEngineSetting {
            field: "stop_timeout",
        });
    }

    if config.engine.idle_wait.is_zero() {
        return Err(ValidationError::InvalidEngineSetting { field: "idle_wait" });
    }

    if config.engine.claim_max_attempts != 1 && config.engine.claim_backoff.is_zero() {
        return Err(ValidationError::InvalidEngineSetting {
            field: "claim_backoff",
        });
    }

    Ok(())
}

/// Every endpoint must form a valid descriptor and own its drop directory
fn validate_endpoints(config: &Config) -> Result<(), ValidationError> {
    if config.endpoints.is_empty() {
        return Err(ValidationError::NoEndpointsConfigured);
    }

    let mut owners: HashMap<PathBuf, &str> = HashMap::new();

    for (name, endpoint) in &config.endpoints {
        EndpointDescriptor::from_config(name, endpoint)?;

        if let Some(first) = owners.insert(endpoint.drop_path.clone(), name) {
            return Err(ValidationError::DuplicateDropPath {
                first: first.to_string(),
                second: name.clone(),
                path: endpoint.drop_path.clone(),
            });
        }
    }

    Ok(())
}
