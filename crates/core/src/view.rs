//! Patient-view orchestration.
//!
//! A [`PatientView`] is one activation of the patient-view hook for one patient. [`PatientView::load`]
//! fetches the catalog, invokes every service concurrently, normalizes the cards and resolves their
//! smart links, then publishes a [`PatientCards`] render set. Services fail independently: a failed
//! invocation becomes a [`PanelOutcome::Failed`] panel next to the healthy ones.
//!
//! Dismissals go through [`PatientView::dismiss`]. A successful hide suppresses the encounter context
//! for the rest of the session and queues a refresh of the owning service; queued refreshes are
//! applied by [`PatientView::process_pending_refreshes`] or by a task running
//! [`PatientView::run_refreshes`].
//!
//! After [`PatientView::teardown`] in-flight work is abandoned and nothing more is published.
//! Results from a superseded `load` are dropped as well.

use crate::cards::{normalize, DecisionCard, EncounterContext};
use crate::catalog::ServiceDescriptor;
use crate::client::CdsClient;
use crate::dismissal::{RefreshRequest, RefreshSignal};
use crate::links::{LinkAction, SmartLinkResolver};
use crate::{CdsError, CdsResult};
use chrono::{DateTime, Utc};
use fhir::{PatientResource, PractitionerResource};
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, watch, Mutex, RwLock};

/// A card ready for display.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedCard {
    pub card: DecisionCard,
    pub colour: &'static str,
    pub dismissible: bool,
    pub actions: Vec<LinkAction>,
}

impl RenderedCard {
    /// Number of links that render as launch buttons.
    pub fn launch_buttons(&self) -> usize {
        self.actions.iter().filter(|a| a.is_launchable()).count()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum PanelOutcome {
    Cards { cards: Vec<RenderedCard> },
    Failed { diagnostic: Value },
}

/// The outcome of invoking one service.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ServicePanel {
    pub service: ServiceDescriptor,
    #[serde(flatten)]
    pub outcome: PanelOutcome,
}

impl ServicePanel {
    pub fn cards(&self) -> &[RenderedCard] {
        match &self.outcome {
            PanelOutcome::Cards { cards } => cards,
            PanelOutcome::Failed { .. } => &[],
        }
    }

    fn hide(&mut self, context: &EncounterContext) {
        if let PanelOutcome::Cards { cards } = &mut self.outcome {
            cards.retain(|c| c.card.encounter_context.as_ref() != Some(context));
        }
    }
}

/// Render set for one patient, one panel per catalog entry in catalog order.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientCards {
    pub patient: String,
    pub fetched_at: DateTime<Utc>,
    pub panels: Vec<ServicePanel>,
}

impl PatientCards {
    pub fn panel(&self, service_id: &str) -> Option<&ServicePanel> {
        self.panels.iter().find(|p| p.service.id == service_id)
    }

    /// All cards across panels, in panel order.
    pub fn cards(&self) -> impl Iterator<Item = &RenderedCard> {
        self.panels.iter().flat_map(|p| p.cards().iter())
    }

    fn replace_panel(&mut self, panel: ServicePanel) {
        match self
            .panels
            .iter_mut()
            .find(|p| p.service.id == panel.service.id)
        {
            Some(slot) => *slot = panel,
            None => self.panels.push(panel),
        }
    }
}

pub struct PatientView {
    client: CdsClient,
    patient: PatientResource,
    practitioner: Option<PractitionerResource>,
    latest: RwLock<Option<PatientCards>>,
    hidden: Mutex<HashSet<EncounterContext>>,
    refresh: RefreshSignal,
    refresh_rx: Mutex<mpsc::UnboundedReceiver<RefreshRequest>>,
    teardown: watch::Sender<bool>,
    generation: AtomicU64,
}

impl PatientView {
    pub fn new(
        client: CdsClient,
        patient: PatientResource,
        practitioner: Option<PractitionerResource>,
    ) -> Self {
        let (refresh, refresh_rx) = RefreshSignal::channel();
        let (teardown, _) = watch::channel(false);
        Self {
            client,
            patient,
            practitioner,
            latest: RwLock::new(None),
            hidden: Mutex::new(HashSet::new()),
            refresh,
            refresh_rx: Mutex::new(refresh_rx),
            teardown,
            generation: AtomicU64::new(0),
        }
    }

    pub fn patient(&self) -> &PatientResource {
        &self.patient
    }

    /// The last published render set, if any.
    pub async fn latest(&self) -> Option<PatientCards> {
        self.latest.read().await.clone()
    }

    pub fn is_torn_down(&self) -> bool {
        *self.teardown.borrow()
    }

    /// Load cards from every service in the catalog and publish them.
    ///
    /// # Errors
    ///
    /// - [`CdsError::CatalogFetch`] / [`CdsError::CatalogShape`] if the catalog cannot be read; no
    ///   service is invoked
    /// - [`CdsError::Cancelled`] if the view was torn down or a newer load started meanwhile
    pub async fn load(&self) -> CdsResult<PatientCards> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cards = self.until_torn_down(self.collect()).await?;

        let published = cards.clone();
        self.publish(generation, move |latest| *latest = Some(published))
            .await?;

        tracing::info!(
            patient = %cards.patient,
            services = cards.panels.len(),
            cards = cards.cards().count(),
            "patient cards loaded"
        );
        Ok(cards)
    }

    /// Re-invoke one service and swap its panel into the published set.
    ///
    /// The service is looked up in the published set first and in a fresh catalog otherwise.
    ///
    /// # Errors
    ///
    /// - [`CdsError::UnknownService`] if no catalog entry has `service_id`
    /// - [`CdsError::Cancelled`] if the view was torn down or a load started meanwhile
    pub async fn refresh_service(&self, service_id: &str) -> CdsResult<ServicePanel> {
        let generation = self.generation.load(Ordering::SeqCst);
        let panel = self
            .until_torn_down(async {
                let service = self.find_service(service_id).await?;
                let hidden = self.hidden.lock().await.clone();
                Ok(self.build_panel(service, &hidden).await)
            })
            .await?;

        let published = panel.clone();
        self.publish(generation, move |latest| {
            if let Some(cards) = latest {
                cards.replace_panel(published);
            }
        })
        .await?;

        Ok(panel)
    }

    /// Hide `context` on the server. On success the context stays suppressed for this view and a
    /// refresh of `service_id` is queued.
    ///
    /// # Errors
    ///
    /// - [`CdsError::Dismissal`] / [`CdsError::DismissalUnavailable`] from the hide request
    /// - [`CdsError::Cancelled`] if the view was torn down
    pub async fn dismiss(&self, service_id: &str, context: &EncounterContext) -> CdsResult<()> {
        if self.is_torn_down() {
            return Err(CdsError::Cancelled);
        }

        self.client
            .dismissal()
            .dismiss_and_refresh(service_id, context, &self.refresh)
            .await?;

        self.hidden.lock().await.insert(context.clone());
        if !self.is_torn_down() {
            if let Some(cards) = self.latest.write().await.as_mut() {
                for panel in &mut cards.panels {
                    panel.hide(context);
                }
            }
        }
        Ok(())
    }

    /// Dismiss a rendered card.
    ///
    /// # Errors
    ///
    /// Returns [`CdsError::DismissalUnavailable`] if the card has no encounter context, otherwise as
    /// [`PatientView::dismiss`].
    pub async fn dismiss_card(&self, service_id: &str, card: &DecisionCard) -> CdsResult<()> {
        let context = card
            .encounter_context
            .as_ref()
            .ok_or(CdsError::DismissalUnavailable)?;
        self.dismiss(service_id, context).await
    }

    /// Apply every queued refresh and return the refreshed panels.
    ///
    /// Returns nothing while [`PatientView::run_refreshes`] owns the queue.
    pub async fn process_pending_refreshes(&self) -> Vec<CdsResult<ServicePanel>> {
        let mut pending = Vec::new();
        {
            let Ok(mut rx) = self.refresh_rx.try_lock() else {
                tracing::debug!(patient = %self.patient.reference(), "refresh loop owns the queue");
                return Vec::new();
            };
            while let Ok(request) = rx.try_recv() {
                pending.push(request);
            }
        }

        let mut results = Vec::with_capacity(pending.len());
        for request in pending {
            results.push(self.apply_refresh(request).await);
        }
        results
    }

    /// Apply refreshes as they arrive until the view is torn down.
    pub async fn run_refreshes(&self) {
        let mut rx = self.refresh_rx.lock().await;
        let mut teardown = self.teardown.subscribe();
        loop {
            tokio::select! {
                biased;
                _ = torn_down(&mut teardown) => break,
                request = rx.recv() => {
                    let Some(request) = request else { break };
                    let service_id = request.service_id.clone();
                    if let Err(e) = self.apply_refresh(request).await {
                        tracing::warn!(service = %service_id, "refresh failed: {e}");
                    }
                }
            }
        }
        tracing::debug!(patient = %self.patient.reference(), "refresh loop stopped");
    }

    /// Stop the view. In-flight loads and refreshes return [`CdsError::Cancelled`] and publish
    /// nothing.
    pub fn teardown(&self) {
        if !self.teardown.send_replace(true) {
            tracing::debug!(patient = %self.patient.reference(), "patient view torn down");
        }
    }

    async fn apply_refresh(&self, request: RefreshRequest) -> CdsResult<ServicePanel> {
        self.hidden.lock().await.insert(request.dismissed);
        self.refresh_service(&request.service_id).await
    }

    async fn collect(&self) -> CdsResult<PatientCards> {
        let services = self.client.catalog().fetch_catalog().await?;
        let hidden = self.hidden.lock().await.clone();

        let panels = join_all(
            services
                .into_iter()
                .map(|service| self.build_panel(service, &hidden)),
        )
        .await;

        Ok(PatientCards {
            patient: self.patient.reference(),
            fetched_at: Utc::now(),
            panels,
        })
    }

    async fn build_panel(
        &self,
        service: ServiceDescriptor,
        hidden: &HashSet<EncounterContext>,
    ) -> ServicePanel {
        let invoked = self
            .client
            .invoker()
            .invoke(&service, &self.patient, self.practitioner.as_ref())
            .await;

        let outcome = match invoked {
            Ok(raw) => {
                let resolver = self.client.resolver();
                let visible = raw.into_iter().map(normalize).filter(|card| {
                    card.encounter_context
                        .as_ref()
                        .map_or(true, |ctx| !hidden.contains(ctx))
                });
                let cards = join_all(visible.map(|card| render(&resolver, card))).await;
                PanelOutcome::Cards { cards }
            }
            Err(e) => {
                tracing::warn!(service = %service.id, "CDS service failed: {e}");
                PanelOutcome::Failed {
                    diagnostic: e.diagnostic(),
                }
            }
        };

        ServicePanel { service, outcome }
    }

    async fn find_service(&self, service_id: &str) -> CdsResult<ServiceDescriptor> {
        let known = self
            .latest
            .read()
            .await
            .as_ref()
            .and_then(|cards| cards.panel(service_id))
            .map(|panel| panel.service.clone());
        if let Some(service) = known {
            return Ok(service);
        }

        self.client
            .catalog()
            .fetch_catalog()
            .await?
            .into_iter()
            .find(|s| s.id == service_id)
            .ok_or_else(|| CdsError::UnknownService(service_id.to_string()))
    }

    async fn until_torn_down<T, F>(&self, work: F) -> CdsResult<T>
    where
        F: Future<Output = CdsResult<T>>,
    {
        let mut teardown = self.teardown.subscribe();
        tokio::select! {
            biased;
            _ = torn_down(&mut teardown) => Err(CdsError::Cancelled),
            result = work => result,
        }
    }

    async fn publish<F>(&self, generation: u64, apply: F) -> CdsResult<()>
    where
        F: FnOnce(&mut Option<PatientCards>),
    {
        let mut latest = self.latest.write().await;
        if self.is_torn_down() || self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(patient = %self.patient.reference(), "discarding stale results");
            return Err(CdsError::Cancelled);
        }
        apply(&mut *latest);
        Ok(())
    }
}

impl Drop for PatientView {
    fn drop(&mut self) {
        self.teardown.send_replace(true);
    }
}

async fn render(resolver: &SmartLinkResolver, card: DecisionCard) -> RenderedCard {
    let actions = resolver.resolve_card(&card).await;
    RenderedCard {
        colour: card.indicator.colour(),
        dismissible: card.is_dismissible(),
        actions,
        card,
    }
}

/// Resolves once the watched flag is set.
async fn torn_down(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
