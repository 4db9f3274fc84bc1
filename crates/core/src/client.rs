//! Wiring for the CDS components.
//!
//! [`CdsClient`] owns the shared dependencies (configuration, transport, id generator, app
//! registry) and hands out the individual components. It is cheap to clone.

use crate::catalog::CatalogFetcher;
use crate::config::CdsConfig;
use crate::dismissal::DismissalController;
use crate::invoker::HookInvoker;
use crate::links::{AppRegistry, SmartLinkResolver, StaticAppRegistry};
use crate::transport::{CdsTransport, HttpTransport};
use crate::view::PatientView;
use crate::CdsResult;
use cds_uuid::{IdGenerator, RandomIdGenerator};
use fhir::{PatientResource, PractitionerResource};
use std::sync::Arc;

#[derive(Clone)]
pub struct CdsClient {
    cfg: Arc<CdsConfig>,
    transport: Arc<dyn CdsTransport>,
    ids: Arc<dyn IdGenerator>,
    registry: Arc<dyn AppRegistry>,
}

impl CdsClient {
    pub fn new(
        cfg: Arc<CdsConfig>,
        transport: Arc<dyn CdsTransport>,
        ids: Arc<dyn IdGenerator>,
        registry: Arc<dyn AppRegistry>,
    ) -> Self {
        Self {
            cfg,
            transport,
            ids,
            registry,
        }
    }

    /// Production wiring: HTTP transport, random hook instances, and the app registry file named
    /// in `cfg` (or an empty registry).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the registry file cannot be loaded.
    pub fn from_config(cfg: CdsConfig) -> CdsResult<Self> {
        let transport = HttpTransport::new(&cfg)?;
        let registry = match cfg.app_registry_file() {
            Some(path) => StaticAppRegistry::load(path)?,
            None => StaticAppRegistry::default(),
        };

        Ok(Self::new(
            Arc::new(cfg),
            Arc::new(transport),
            Arc::new(RandomIdGenerator),
            Arc::new(registry),
        ))
    }

    pub fn config(&self) -> &CdsConfig {
        &self.cfg
    }

    pub fn catalog(&self) -> CatalogFetcher {
        CatalogFetcher::new(self.cfg.clone(), self.transport.clone())
    }

    pub fn invoker(&self) -> HookInvoker {
        HookInvoker::new(self.cfg.clone(), self.transport.clone(), self.ids.clone())
    }

    pub fn resolver(&self) -> SmartLinkResolver {
        SmartLinkResolver::new(self.registry.clone())
    }

    pub fn dismissal(&self) -> DismissalController {
        DismissalController::new(self.cfg.clone(), self.transport.clone())
    }

    /// Start a patient-view activation.
    pub fn patient_view(
        &self,
        patient: PatientResource,
        practitioner: Option<PractitionerResource>,
    ) -> PatientView {
        PatientView::new(self.clone(), patient, practitioner)
    }
}
