// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Environment variable configuration.
//!
//! - `ROS_DOMAIN_ID`: DDS domain ID (default: 0, range 0-232)
//! - `ROS_SECURITY_ENCLAVE`: enclave announced in participant user data
//!   (default: "/")
//!
//! Invalid values are logged and replaced by the default.

use crate::transport::DomainId;
use std::env;

/// ROS 2 environment variable for domain ID
pub const ENV_ROS_DOMAIN_ID: &str = "ROS_DOMAIN_ID";
/// ROS 2 security enclave
pub const ENV_ROS_SECURITY_ENCLAVE: &str = "ROS_SECURITY_ENCLAVE";

pub const DEFAULT_DOMAIN_ID: DomainId = 0;
pub const MAX_DOMAIN_ID: DomainId = 232;
pub const DEFAULT_ENCLAVE: &str = "/";

/// Runtime configuration from environment variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    /// DDS domain ID (0-232)
    pub domain_id: DomainId,

    /// Security enclave (SROS2 compatibility)
    pub enclave: String,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            domain_id: DEFAULT_DOMAIN_ID,
            enclave: DEFAULT_ENCLAVE.to_string(),
        }
    }
}

impl EnvConfig {
    /// Load configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary lookup (tests, embedding).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let domain_id = match lookup(ENV_ROS_DOMAIN_ID).map(|s| s.trim().to_string()) {
            None => DEFAULT_DOMAIN_ID,
            Some(s) if s.is_empty() => DEFAULT_DOMAIN_ID,
            Some(s) => match s.parse::<DomainId>() {
                Ok(id) if id <= MAX_DOMAIN_ID => id,
                _ => {
                    log::warn!(
                        "[context] invalid {}='{}', using domain {}",
                        ENV_ROS_DOMAIN_ID,
                        s,
                        DEFAULT_DOMAIN_ID
                    );
                    DEFAULT_DOMAIN_ID
                }
            },
        };

        let enclave = lookup(ENV_ROS_SECURITY_ENCLAVE)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_ENCLAVE.to_string());

        Self { domain_id, enclave }
    }
}

/// Options of a [`crate::context::Context`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextOptions {
    pub domain_id: DomainId,
    pub enclave: String,
}

impl ContextOptions {
    pub fn new(domain_id: DomainId) -> Self {
        Self {
            domain_id,
            enclave: DEFAULT_ENCLAVE.to_string(),
        }
    }

    pub fn with_enclave(mut self, enclave: &str) -> Self {
        self.enclave = enclave.to_string();
        self
    }

    pub fn from_env() -> Self {
        EnvConfig::from_env().into()
    }
}

impl Default for ContextOptions {
    fn default() -> Self {
        EnvConfig::default().into()
    }
}

impl From<EnvConfig> for ContextOptions {
    fn from(config: EnvConfig) -> Self {
        Self {
            domain_id: config.domain_id,
            enclave: config.enclave,
        }
    }
}
