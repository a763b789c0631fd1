//! Host Context
//!
//! The collaborators an engine invocation runs against. The host owns them;
//! the engine holds shared references for the duration of a call and never
//! caches catalog state between calls.

use std::sync::Arc;

use crate::catalog::Catalog;
use crate::queue::JobQueue;
use crate::schedule::ScheduleRegistrar;

/// Catalog, job queue and (optionally) schedule registrar
pub struct HostContext<C: Catalog, Q: JobQueue> {
    pub catalog: Arc<C>,
    pub queue: Arc<Q>,
    pub registrar: Option<Arc<dyn ScheduleRegistrar>>,
}

impl<C: Catalog, Q: JobQueue> HostContext<C, Q> {
    pub fn new(catalog: Arc<C>, queue: Arc<Q>) -> Self {
        Self {
            catalog,
            queue,
            registrar: None,
        }
    }

    /// Attach the facility `schedule` requests are forwarded to
    pub fn with_registrar(mut self, registrar: Arc<dyn ScheduleRegistrar>) -> Self {
        self.registrar = Some(registrar);
        self
    }
}

impl<C: Catalog, Q: JobQueue> Clone for HostContext<C, Q> {
    fn clone(&self) -> Self {
        Self {
            catalog: self.catalog.clone(),
            queue: self.queue.clone(),
            registrar: self.registrar.clone(),
        }
    }
}
