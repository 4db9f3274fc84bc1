//! Card dismissal.
//!
//! Hiding a card posts `{encounterId, assessmentType}` to
//! `{base}/cds-services/hide-assessment-card`. When (and only when) that POST succeeds, a refresh
//! request for the owning service goes out on the [`RefreshSignal`], so the service is re-invoked
//! without reloading anything else. A failed POST is returned as [`CdsError::Dismissal`]; nothing is
//! retried and no refresh is sent.
//!
//! Per card:
//!
//! ```text
//! Visible --dismiss--> Dismissing --POST ok--> RefreshPending --> Visible | Gone
//!                          |
//!                          +--POST failed--> Visible (error reported)
//! ```

use crate::cards::{DecisionCard, EncounterContext};
use crate::config::CdsConfig;
use crate::transport::CdsTransport;
use crate::{CdsError, CdsResult};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Asks the owner of a patient view to re-invoke one service after a successful hide.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshRequest {
    pub service_id: String,
    /// The context that was hidden, so the view can keep it suppressed.
    pub dismissed: EncounterContext,
}

/// Sending half of the dismissal-to-invoker refresh channel.
#[derive(Clone, Debug)]
pub struct RefreshSignal {
    tx: mpsc::UnboundedSender<RefreshRequest>,
}

impl RefreshSignal {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RefreshRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn request(&self, service_id: &str, dismissed: &EncounterContext) {
        let request = RefreshRequest {
            service_id: service_id.to_string(),
            dismissed: dismissed.clone(),
        };
        if self.tx.send(request).is_err() {
            tracing::debug!(service = %service_id, "refresh requested after the view closed");
        }
    }
}

#[derive(Clone)]
pub struct DismissalController {
    cfg: Arc<CdsConfig>,
    transport: Arc<dyn CdsTransport>,
}

impl DismissalController {
    pub fn new(cfg: Arc<CdsConfig>, transport: Arc<dyn CdsTransport>) -> Self {
        Self { cfg, transport }
    }

    /// Post the hide request for `context`. The acknowledgement body is ignored.
    ///
    /// # Errors
    ///
    /// - [`CdsError::DismissalUnavailable`] if the encounter id is blank (nothing is sent)
    /// - [`CdsError::Dismissal`] if the POST fails
    pub async fn dismiss(&self, context: &EncounterContext) -> CdsResult<()> {
        if context.encounter_id().trim().is_empty() {
            return Err(CdsError::DismissalUnavailable);
        }

        let body = json!({
            "encounterId": context.encounter_id(),
            "assessmentType": context.assessment_type(),
        });

        let url = self.cfg.hide_card_url();
        match self.transport.post_json(&url, &body).await {
            Ok(_ack) => {
                tracing::info!(
                    encounter = %context.encounter_id(),
                    assessment_type = %context.assessment_type(),
                    "assessment card hidden"
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    encounter = %context.encounter_id(),
                    assessment_type = %context.assessment_type(),
                    "failed to hide assessment card: {e}"
                );
                Err(CdsError::Dismissal(e))
            }
        }
    }

    /// Hide `context` and, on success, request a refresh of `service_id`.
    pub async fn dismiss_and_refresh(
        &self,
        service_id: &str,
        context: &EncounterContext,
        refresh: &RefreshSignal,
    ) -> CdsResult<()> {
        self.dismiss(context).await?;
        refresh.request(service_id, context);
        Ok(())
    }

    /// Dismiss `card` and, on success, request a refresh of `service_id`.
    ///
    /// Cards without an encounter context cannot be dismissed and produce no request.
    pub async fn dismiss_card(
        &self,
        service_id: &str,
        card: &DecisionCard,
        refresh: &RefreshSignal,
    ) -> CdsResult<()> {
        let context = card
            .encounter_context
            .as_ref()
            .ok_or(CdsError::DismissalUnavailable)?;

        self.dismiss_and_refresh(service_id, context, refresh).await
    }
}
