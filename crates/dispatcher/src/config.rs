// Rust guideline compliant 2026-07-28

use crate::error::ConfigError;
use domain::{BatchKey, Handler, ServingMode};
use std::sync::Arc;
use std::time::Duration;

/// Serving configuration for one dispatcher. Built via
/// [`ServingConfig::builder`], following the
/// required-argument-then-chained-setters shape used throughout this
/// workspace's pipeline component configs.
pub struct ServingConfig<H: Handler> {
    pub(crate) name: Arc<str>,
    pub(crate) handler: Arc<H>,
    pub(crate) batch_size: usize,
    pub(crate) batch_timeout: Duration,
    pub(crate) partitions: usize,
    pub(crate) batch_keys: Vec<BatchKey>,
    pub(crate) shutdown_grace: Duration,
    pub(crate) mode: ServingMode,
}

impl<H: Handler> ServingConfig<H> {
    #[must_use]
    pub fn builder(name: impl Into<String>, handler: H) -> ServingConfigBuilder<H> {
        ServingConfigBuilder::new(name, handler)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub fn batch_keys(&self) -> &[BatchKey] {
        &self.batch_keys
    }

    #[must_use]
    pub fn mode(&self) -> ServingMode {
        self.mode
    }
}

/// Builder for [`ServingConfig`]. `name` and `handler` are required
/// constructor arguments; every other field has the default called for
/// in the serving-configuration table.
pub struct ServingConfigBuilder<H: Handler> {
    name: String,
    handler: H,
    batch_size: usize,
    batch_timeout: Duration,
    partitions: usize,
    batch_keys: Vec<BatchKey>,
    shutdown_grace: Duration,
    mode: ServingMode,
}

impl<H: Handler> ServingConfigBuilder<H> {
    fn new(name: impl Into<String>, handler: H) -> Self {
        Self {
            name: name.into(),
            handler,
            batch_size: 1,
            batch_timeout: Duration::from_millis(100),
            partitions: 1,
            batch_keys: vec![BatchKey::default_key()],
            shutdown_grace: Duration::from_millis(30_000),
            mode: ServingMode::Execute,
        }
    }

    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn batch_timeout(mut self, batch_timeout: Duration) -> Self {
        self.batch_timeout = batch_timeout;
        self
    }

    #[must_use]
    pub fn partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions;
        self
    }

    #[must_use]
    pub fn batch_keys(mut self, batch_keys: Vec<BatchKey>) -> Self {
        self.batch_keys = batch_keys;
        self
    }

    #[must_use]
    pub fn shutdown_grace(mut self, shutdown_grace: Duration) -> Self {
        self.shutdown_grace = shutdown_grace;
        self
    }

    #[must_use]
    pub fn mode(mut self, mode: ServingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Validate and freeze the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `name` is empty, `batch_size` or
    /// `partitions` is zero, or `batch_keys` is empty.
    pub fn build(self) -> Result<ServingConfig<H>, ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingName);
        }
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }
        if self.partitions == 0 {
            return Err(ConfigError::InvalidPartitions);
        }
        if self.batch_keys.is_empty() {
            return Err(ConfigError::EmptyBatchKeys);
        }
        Ok(ServingConfig {
            name: Arc::from(self.name),
            handler: Arc::new(self.handler),
            batch_size: self.batch_size,
            batch_timeout: self.batch_timeout,
            partitions: self.partitions,
            batch_keys: self.batch_keys,
            shutdown_grace: self.shutdown_grace,
            mode: self.mode,
        })
    }
}
