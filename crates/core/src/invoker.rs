//! Hook invocation.
//!
//! For one service and one patient the invoker builds an [`InvocationRequest`], posts it to
//! `{base}/cds-services/{id}` and returns the raw cards. Every call mints a new hook instance from
//! the injected [`IdGenerator`]; requests are never cached or replayed.

use crate::cards::{decode_cards, RawCard};
use crate::catalog::ServiceDescriptor;
use crate::config::CdsConfig;
use crate::constants::PATIENT_VIEW_HOOK;
use crate::transport::CdsTransport;
use crate::{CdsError, CdsResult};
use cds_uuid::{HookInstance, IdGenerator};
use fhir::{PatientResource, PractitionerResource};
use serde::Serialize;
use std::sync::Arc;

/// Data handed to the service up front.
#[derive(Clone, Debug, Serialize)]
pub struct Prefetch {
    pub patient: PatientResource,
    /// Omitted from the body when no practitioner is in context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub practitioner: Option<PractitionerResource>,
}

/// Body of one hook invocation.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationRequest {
    pub hook: String,
    pub hook_instance: HookInstance,
    /// `Patient/{id}` reference.
    pub patient: String,
    pub prefetch: Prefetch,
}

impl InvocationRequest {
    /// Build a `patient-view` request with a fresh hook instance.
    pub fn patient_view(
        ids: &dyn IdGenerator,
        patient: &PatientResource,
        practitioner: Option<&PractitionerResource>,
    ) -> Self {
        Self {
            hook: PATIENT_VIEW_HOOK.to_string(),
            hook_instance: ids.next_id(),
            patient: patient.reference(),
            prefetch: Prefetch {
                patient: patient.clone(),
                practitioner: practitioner.cloned(),
            },
        }
    }
}

/// Posts hook invocations and returns the service's raw cards.
#[derive(Clone)]
pub struct HookInvoker {
    cfg: Arc<CdsConfig>,
    transport: Arc<dyn CdsTransport>,
    ids: Arc<dyn IdGenerator>,
}

impl HookInvoker {
    pub fn new(
        cfg: Arc<CdsConfig>,
        transport: Arc<dyn CdsTransport>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            cfg,
            transport,
            ids,
        }
    }

    /// Invoke `service` for `patient`.
    ///
    /// Zero cards is a success. `practitioner` may be `None`.
    ///
    /// # Errors
    ///
    /// - [`CdsError::Invocation`] for network and HTTP status failures
    /// - [`CdsError::InvocationShape`] when the response matches no known envelope
    pub async fn invoke(
        &self,
        service: &ServiceDescriptor,
        patient: &PatientResource,
        practitioner: Option<&PractitionerResource>,
    ) -> CdsResult<Vec<RawCard>> {
        let request = InvocationRequest::patient_view(self.ids.as_ref(), patient, practitioner);
        if service.hook != request.hook {
            tracing::debug!(
                service = %service.id,
                registered_hook = %service.hook,
                "invoking service registered for a different hook"
            );
        }

        let body = serde_json::to_value(&request).map_err(|e| CdsError::InvocationShape {
            service_id: service.id.clone(),
            message: format!("failed to serialise request: {e}"),
        })?;

        tracing::debug!(
            service = %service.id,
            hook_instance = %request.hook_instance,
            patient = %request.patient,
            "invoking CDS service"
        );

        let url = self.cfg.service_url(&service.id);
        let response = self
            .transport
            .post_json(&url, &body)
            .await
            .map_err(|source| CdsError::Invocation {
                service_id: service.id.clone(),
                source,
            })?;

        decode_cards(response).map_err(|message| CdsError::InvocationShape {
            service_id: service.id.clone(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTransport;
    use crate::transport::TransportError;
    use cds_uuid::SequentialIdGenerator;
    use serde_json::{json, Value};
    use std::collections::{BTreeMap, HashSet};
    use std::time::Duration;

    const SERVICE_URL: &str = "http://cds.test/cds-services/fall-risk";

    fn service() -> ServiceDescriptor {
        ServiceDescriptor {
            id: "fall-risk".into(),
            hook: "patient-view".into(),
            title: "Fall risk".into(),
            description: String::new(),
            prefetch_template: BTreeMap::new(),
        }
    }

    fn patient() -> PatientResource {
        PatientResource::from_json(json!({"resourceType": "Patient", "id": "42"})).unwrap()
    }

    fn practitioner() -> PractitionerResource {
        PractitionerResource::from_json(json!({"resourceType": "Practitioner", "id": "p1"}))
            .unwrap()
    }

    fn invoker(transport: Arc<FakeTransport>) -> HookInvoker {
        let cfg = Arc::new(CdsConfig::new("http://cds.test", Duration::from_secs(1)).unwrap());
        HookInvoker::new(cfg, transport, Arc::new(SequentialIdGenerator::new(1)))
    }

    #[tokio::test]
    async fn test_posts_patient_view_request() {
        let transport = Arc::new(FakeTransport::new());
        transport.on_post(SERVICE_URL, Ok(json!({"cards": []})));

        invoker(transport.clone())
            .invoke(&service(), &patient(), Some(&practitioner()))
            .await
            .expect("invoke");

        let bodies = transport.posts_to(SERVICE_URL);
        assert_eq!(bodies.len(), 1);
        let body = &bodies[0];
        assert_eq!(body["hook"], "patient-view");
        assert_eq!(body["hookInstance"], "00000000-0000-0001-0000-000000000001");
        assert_eq!(body["patient"], "Patient/42");
        assert_eq!(body["prefetch"]["patient"]["id"], "42");
        assert_eq!(body["prefetch"]["practitioner"]["id"], "p1");
    }

    #[tokio::test]
    async fn test_omits_practitioner_when_absent() {
        let transport = Arc::new(FakeTransport::new());
        transport.on_post(SERVICE_URL, Ok(json!({"cards": []})));

        invoker(transport.clone())
            .invoke(&service(), &patient(), None)
            .await
            .expect("invoke without practitioner");

        let body = &transport.posts_to(SERVICE_URL)[0];
        assert!(body["prefetch"].get("practitioner").is_none());
    }

    #[tokio::test]
    async fn test_every_invocation_gets_a_new_hook_instance() {
        let transport = Arc::new(FakeTransport::new());
        transport.on_post(SERVICE_URL, Ok(json!({"cards": []})));
        let invoker = invoker(transport.clone());

        for _ in 0..25 {
            invoker.invoke(&service(), &patient(), None).await.unwrap();
        }

        let instances: HashSet<String> = transport
            .posts_to(SERVICE_URL)
            .iter()
            .map(|b| b["hookInstance"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(instances.len(), 25);
    }

    #[tokio::test]
    async fn test_returns_raw_cards_from_either_envelope() {
        let transport = Arc::new(FakeTransport::new());
        transport.on_post(
            SERVICE_URL,
            Ok(json!({"cards": [{"uuid": "a", "summary": "A", "indicator": "info"}]})),
        );
        let cards = invoker(transport.clone())
            .invoke(&service(), &patient(), None)
            .await
            .unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].uuid.as_deref(), Some("a"));

        let transport = Arc::new(FakeTransport::new());
        transport.on_post(SERVICE_URL, Ok(json!([{"uuid": "b"}, {"uuid": "c"}])));
        let cards = invoker(transport)
            .invoke(&service(), &patient(), None)
            .await
            .unwrap();
        assert_eq!(cards.len(), 2);
    }

    #[tokio::test]
    async fn test_zero_cards_is_not_an_error() {
        let transport = Arc::new(FakeTransport::new());
        transport.on_post(SERVICE_URL, Ok(json!({"cards": []})));

        let cards = invoker(transport)
            .invoke(&service(), &patient(), None)
            .await
            .expect("empty list is success");
        assert!(cards.is_empty());
    }

    #[tokio::test]
    async fn test_server_error_is_typed_failure() {
        let transport = Arc::new(FakeTransport::new());
        transport.on_post(
            SERVICE_URL,
            Err(TransportError::Status {
                status: 503,
                body: String::new(),
            }),
        );

        let err = invoker(transport)
            .invoke(&service(), &patient(), None)
            .await
            .expect_err("503 is a failure");
        match err {
            CdsError::Invocation { service_id, source } => {
                assert_eq!(service_id, "fall-risk");
                assert!(matches!(source, TransportError::Status { status: 503, .. }));
            }
            other => panic!("expected Invocation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_json_body_is_shape_failure() {
        let transport = Arc::new(FakeTransport::new());
        transport.on_post(SERVICE_URL, Ok(Value::String("<html>".into())));

        let err = invoker(transport)
            .invoke(&service(), &patient(), None)
            .await
            .expect_err("html is not a card list");
        assert!(matches!(err, CdsError::InvocationShape { .. }));
    }

    #[tokio::test]
    async fn test_error_object_with_ok_status_is_shape_failure() {
        let transport = Arc::new(FakeTransport::new());
        transport.on_post(SERVICE_URL, Ok(json!({"error": "database unavailable"})));

        let err = invoker(transport)
            .invoke(&service(), &patient(), None)
            .await
            .expect_err("an error object is not zero cards");
        match err {
            CdsError::InvocationShape { service_id, message } => {
                assert_eq!(service_id, service().id);
                assert!(message.contains("error"), "{message}");
            }
            other => panic!("expected InvocationShape, got {other:?}"),
        }
    }
}
