//! Registry of source schema services.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use fusion_planner::schema::SourceSchemaName;
use itertools::Itertools;
use tower::BoxError;
use tower::Service;
use tower::ServiceBuilder;
use tower::ServiceExt;

pub use self::source::Request as SourceRequest;
pub use self::source::Response as SourceResponse;

pub mod source;

/// Collection of source schema services, one per source name.
///
/// The executor only ever sees this registry: every outbound call goes through a service made
/// for the step's source, so transports and retries are tower layers added by the host.
#[derive(Clone, Default)]
pub struct SourceServices {
    services: HashMap<SourceSchemaName, Arc<dyn MakeSourceService>>,
    timeout: Option<Duration>,
}

impl SourceServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the service answering for `name`, replacing any previous one.
    pub fn insert<S>(&mut self, name: impl Into<SourceSchemaName>, service: S)
    where
        S: MakeSourceService,
    {
        self.services.insert(name.into(), Arc::new(service));
    }

    /// Builder flavour of [`SourceServices::insert`].
    pub fn with<S>(mut self, name: impl Into<SourceSchemaName>, service: S) -> Self
    where
        S: MakeSourceService,
    {
        self.insert(name, service);
        self
    }

    /// A fresh instance of the service registered for `name`.
    pub fn create(&self, name: &str) -> Option<source::BoxService> {
        let service = self.services.get(name)?.make();
        Some(match self.timeout {
            Some(timeout) => ServiceBuilder::new()
                .timeout(timeout)
                .service(service)
                .boxed(),
            None => service,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    /// Every service created from now on fails requests lasting longer than `timeout`.
    pub(crate) fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl std::fmt::Debug for SourceServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self
            .services
            .keys()
            .map(SourceSchemaName::as_str)
            .sorted_unstable()
            .collect();
        f.debug_struct("SourceServices")
            .field("services", &names)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Makes new instances of a source service.
///
/// There can be multiple instances of that service executing at any given time.
pub trait MakeSourceService: Send + Sync + 'static {
    fn make(&self) -> source::BoxService;
}

impl<S> MakeSourceService for S
where
    S: Service<SourceRequest, Response = SourceResponse> + Clone + Send + Sync + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
{
    fn make(&self) -> source::BoxService {
        self.clone().map_err(Into::into).boxed()
    }
}
