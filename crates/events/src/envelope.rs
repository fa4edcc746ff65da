use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shopfloor_core::TenantId;

/// Envelope for an event, carrying tenant and subject metadata.
///
/// `subject_id` is the record the event is about (e.g. a work order id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    tenant_id: TenantId,
    subject_id: Uuid,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(tenant_id: TenantId, subject_id: impl Into<Uuid>, payload: E) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            tenant_id,
            subject_id: subject_id.into(),
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn subject_id(&self) -> Uuid {
        self.subject_id
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
