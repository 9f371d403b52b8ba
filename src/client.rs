use std::fmt;
use std::sync::Arc;

use crate::config::ClientOptions;
use crate::driver::Driver;
use crate::driver::memory::MemoryDriver;
use crate::errors::DbError;
use crate::fault::{self, FaultInjector, FaultOp, NoopInjector};
use crate::scoop::Scoop;

/// A type stored in a named collection.
pub trait Model {
    fn collection_name() -> &'static str;
}

#[derive(Clone)]
enum InjectorSource {
    Fixed(Arc<dyn FaultInjector>),
    /// Resolved through [`fault::current`] on every guarded call.
    Ambient,
}

/// Entry point: a driver handle plus options and the failure-injection seam.
/// Cheap to clone; clones share the driver.
#[derive(Clone)]
pub struct Client {
    driver: Arc<dyn Driver>,
    options: Arc<ClientOptions>,
    injector: InjectorSource,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let injector = match self.injector {
            InjectorSource::Fixed(_) => "fixed",
            InjectorSource::Ambient => "ambient",
        };
        f.debug_struct("Client")
            .field("options", &self.options)
            .field("injector", &injector)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Wraps `driver` with default options and a [`NoopInjector`].
    #[must_use]
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            options: Arc::new(ClientOptions::default()),
            injector: InjectorSource::Fixed(Arc::new(NoopInjector)),
        }
    }

    /// Client over a fresh [`MemoryDriver`].
    #[must_use]
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryDriver::new()))
    }

    #[must_use]
    pub fn with_options(mut self, options: ClientOptions) -> Self {
        log::debug!("client options: {options:?}");
        self.options = Arc::new(options);
        self
    }

    #[must_use]
    pub fn with_injector(mut self, injector: Arc<dyn FaultInjector>) -> Self {
        self.injector = InjectorSource::Fixed(injector);
        self
    }

    /// Uses the process-wide injector installed with [`fault::set_injector`].
    #[must_use]
    pub fn with_ambient_injector(mut self) -> Self {
        self.injector = InjectorSource::Ambient;
        self
    }

    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    #[must_use]
    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    fn injector(&self) -> Arc<dyn FaultInjector> {
        match &self.injector {
            InjectorSource::Fixed(i) => Arc::clone(i),
            InjectorSource::Ambient => fault::current(),
        }
    }

    pub(crate) fn guard(&self, op: FaultOp) -> Result<(), DbError> {
        fault::check(self.injector().as_ref(), op)
    }

    /// # Errors
    /// Returns the injected or driver error.
    pub fn ping(&self) -> Result<(), DbError> {
        self.guard(FaultOp::Ping)?;
        self.driver.ping()
    }

    /// Ping, with a failure wrapped as [`DbError::Health`].
    ///
    /// # Errors
    /// `DbError::Health` whose source is the ping error.
    pub fn health(&self) -> Result<(), DbError> {
        self.ping().map_err(|e| {
            log::error!("health check failed: {e}");
            DbError::Health { source: Box::new(e) }
        })
    }

    /// # Errors
    /// Returns the injected or driver error.
    pub fn close(&self) -> Result<(), DbError> {
        self.guard(FaultOp::Close)?;
        self.driver.close()?;
        log::info!("client closed");
        Ok(())
    }

    /// A builder with no collection bound.
    #[must_use]
    pub fn scoop(&self) -> Scoop {
        Scoop::new(self.clone())
    }

    #[must_use]
    pub fn collection(&self, name: &str) -> Scoop {
        let mut s = self.scoop();
        s.collection(name);
        s
    }

    #[must_use]
    pub fn model<M: Model>(&self) -> Scoop {
        let mut s = self.scoop();
        s.model::<M>();
        s
    }
}
