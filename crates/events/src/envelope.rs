use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use facturo_core::{AggregateId, DomainError, TenantId};

use crate::event::Event;

/// Envelope for an event in a document's audit trail.
///
/// This is the unit a store appends after a successful save:
/// - **Multi-tenancy** is enforced via `tenant_id`.
/// - **Append-only**: `sequence_number` increases monotonically per aggregate
///   and matches the aggregate version the event produced.
/// - `payload` is the serialized typed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    event_id: Uuid,
    tenant_id: TenantId,

    aggregate_id: AggregateId,
    aggregate_type: String,

    sequence_number: u64,

    event_type: String,
    event_version: u32,
    occurred_at: DateTime<Utc>,

    payload: JsonValue,
}

impl EventEnvelope {
    /// Wrap a typed event, capturing the metadata needed to read it back.
    pub fn from_typed<E>(
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
        event: &E,
    ) -> Result<Self, DomainError>
    where
        E: Event + Serialize,
    {
        let payload = serde_json::to_value(event).map_err(|e| {
            DomainError::invariant(format!("event payload serialization failed: {e}"))
        })?;

        Ok(Self {
            event_id: Uuid::now_v7(),
            tenant_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            sequence_number,
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }

    /// Rebuild an envelope read back from storage.
    #[allow(clippy::too_many_arguments)]
    pub fn from_stored(
        event_id: Uuid,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
        event_type: impl Into<String>,
        event_version: u32,
        occurred_at: DateTime<Utc>,
        payload: JsonValue,
    ) -> Self {
        Self {
            event_id,
            tenant_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            sequence_number,
            event_type: event_type.into(),
            event_version,
            occurred_at,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn event_version(&self) -> u32 {
        self.event_version
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &JsonValue {
        &self.payload
    }

    /// Deserialize the payload back into its typed event.
    pub fn decode<E>(&self) -> Result<E, DomainError>
    where
        E: for<'de> Deserialize<'de>,
    {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            DomainError::invariant(format!(
                "cannot decode '{}' payload: {e}",
                self.event_type
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Pinged {
        at: DateTime<Utc>,
        note: String,
    }

    impl Event for Pinged {
        fn event_type(&self) -> &'static str {
            "test.pinged"
        }

        fn version(&self) -> u32 {
            2
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.at
        }
    }

    #[test]
    fn envelope_captures_metadata_and_decodes_payload() {
        let event = Pinged {
            at: Utc::now(),
            note: "hello".into(),
        };
        let envelope =
            EventEnvelope::from_typed(TenantId::new(), AggregateId::new(), "test", 3, &event)
                .unwrap();

        assert_eq!(envelope.event_type(), "test.pinged");
        assert_eq!(envelope.event_version(), 2);
        assert_eq!(envelope.sequence_number(), 3);
        assert_eq!(envelope.occurred_at(), event.at);
        assert_eq!(envelope.decode::<Pinged>().unwrap(), event);
    }
}
