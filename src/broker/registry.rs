//! One broker per endpoint, created on first use.
//!
//! The registry is an ordinary value owned by the application, not global
//! state. Two lookups for the same endpoint always return the same
//! [`Broker`], so the single-client guarantee holds across every caller that
//! shares the registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::connector::Connector;
use crate::constants::{DEFAULT_COOLDOWN, MAX_BACKOFF};
use crate::endpoint::Endpoint;

use super::{Broker, SessionOptions};

/// Lazily populated map of endpoint to broker.
pub struct BrokerRegistry<C: Connector + Clone> {
    connector: C,
    cooldown: Duration,
    max_backoff: Duration,
    options: SessionOptions,
    brokers: Mutex<HashMap<Endpoint, Arc<Broker<C>>>>,
}

impl<C: Connector + Clone> fmt::Debug for BrokerRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerRegistry")
            .field("endpoints", &self.len())
            .finish_non_exhaustive()
    }
}

impl<C: Connector + Clone> BrokerRegistry<C> {
    /// Registry whose brokers share clones of `connector`.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            cooldown: DEFAULT_COOLDOWN,
            max_backoff: MAX_BACKOFF,
            options: SessionOptions::default(),
            brokers: Mutex::new(HashMap::new()),
        }
    }

    /// Cooldown applied to brokers created from now on.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Retry ceiling applied to brokers created from now on.
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Session options applied to brokers created from now on.
    pub fn with_session_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// The broker for `endpoint`, creating it if this is the first request.
    pub fn get(&self, endpoint: &Endpoint) -> Arc<Broker<C>> {
        let mut brokers = self.brokers.lock().unwrap_or_else(PoisonError::into_inner);
        let broker = brokers.entry(endpoint.clone()).or_insert_with(|| {
            log::debug!("[registry] creating broker for {endpoint}");
            Arc::new(
                Broker::new(endpoint.clone(), self.connector.clone())
                    .with_cooldown(self.cooldown)
                    .with_max_backoff(self.max_backoff)
                    .with_session_options(self.options.clone()),
            )
        });
        Arc::clone(broker)
    }

    /// Number of endpoints with a broker.
    pub fn len(&self) -> usize {
        self.brokers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// True if no broker has been created yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
