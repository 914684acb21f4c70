//! Door-side ticket verification and admission.
//!
//! Verification is read-only. Admission goes through the store's atomic
//! transition, so two stations scanning the same ticket at once get exactly
//! one admission and one "already used".

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{Order, OrderStatus};
use crate::services::lifecycle::TransitionStamp;
use crate::services::orders::OrderService;
use crate::utils::error::{OrderError, StoreError};

/// What a scanner produced. QR codes carry a JSON envelope; manual entry and
/// older codes carry the bare reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanPayload {
    Reference(String),
    Envelope {
        tx_ref: String,
        event_id: Option<String>,
        ticket_count: Option<u32>,
    },
}

const REFERENCE_KEYS: [&str; 3] = ["txRef", "tx_ref", "reference"];
const EVENT_KEYS: [&str; 2] = ["eventId", "event_id"];
const COUNT_KEYS: [&str; 2] = ["ticketCount", "ticket_count"];

fn field<'a>(fields: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| fields.get(*key))
}

/// Strings and numbers both count as text. Blank strings do not.
fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn count(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl ScanPayload {
    /// Never fails: anything without a usable reference field is taken as
    /// the reference itself. Side fields that do not parse are dropped.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        let fields = match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Object(fields)) => fields,
            _ => return ScanPayload::Reference(trimmed.to_string()),
        };

        match field(&fields, &REFERENCE_KEYS).and_then(text) {
            Some(tx_ref) => ScanPayload::Envelope {
                tx_ref,
                event_id: field(&fields, &EVENT_KEYS).and_then(text),
                ticket_count: field(&fields, &COUNT_KEYS).and_then(count),
            },
            None => ScanPayload::Reference(trimmed.to_string()),
        }
    }

    pub fn reference(&self) -> &str {
        match self {
            ScanPayload::Reference(tx_ref) | ScanPayload::Envelope { tx_ref, .. } => tx_ref,
        }
    }

    fn event_id(&self) -> Option<&str> {
        match self {
            ScanPayload::Envelope { event_id, .. } => event_id.as_deref(),
            ScanPayload::Reference(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Valid,
    Used,
    Invalid,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct TicketVerification {
    pub status: TicketStatus,
    pub order: Option<Order>,
    pub message: String,
    /// True only on the single call that moved the ticket to `used`.
    pub admitted: bool,
}

impl TicketVerification {
    fn new(status: TicketStatus, order: Option<Order>, message: impl Into<String>) -> Self {
        Self {
            status,
            order,
            message: message.into(),
            admitted: false,
        }
    }

    fn invalid(message: impl Into<String>) -> Self {
        Self::new(TicketStatus::Invalid, None, message)
    }
}

/// Maps an order's current state to what the door should see.
pub fn classify(order: Option<Order>, payload: &ScanPayload) -> TicketVerification {
    let Some(order) = order else {
        return TicketVerification::invalid("Ticket not found");
    };

    if let Some(scanned_event) = payload.event_id() {
        let same_event = match Uuid::parse_str(scanned_event) {
            Ok(id) => id == order.event_id,
            Err(_) => scanned_event == order.event_id.to_string(),
        };
        if !same_event {
            return TicketVerification::new(
                TicketStatus::Invalid,
                Some(order),
                "Ticket is for a different event",
            );
        }
    }

    match order.status {
        OrderStatus::Pending => {
            TicketVerification::new(TicketStatus::Invalid, Some(order), "Payment not confirmed")
        }
        OrderStatus::Cancelled => {
            TicketVerification::new(TicketStatus::Cancelled, Some(order), "Ticket has been cancelled")
        }
        OrderStatus::Used => {
            let message = match order.used_at {
                Some(at) => format!("Ticket already used at {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
                None => "Ticket already used".to_string(),
            };
            TicketVerification::new(TicketStatus::Used, Some(order), message)
        }
        OrderStatus::Confirmed => {
            let message = format!("Valid ticket: {} admission(s)", order.ticket_count());
            TicketVerification::new(TicketStatus::Valid, Some(order), message)
        }
    }
}

#[derive(Clone)]
pub struct RedemptionVerifier {
    orders: OrderService,
}

impl RedemptionVerifier {
    pub fn new(orders: OrderService) -> Self {
        Self { orders }
    }

    pub async fn verify_ticket(&self, scanned: &str) -> Result<TicketVerification, StoreError> {
        let payload = ScanPayload::parse(scanned);
        if payload.reference().is_empty() {
            return Ok(TicketVerification::invalid("No ticket reference provided"));
        }

        let order = self.orders.order_by_reference(payload.reference()).await?;
        let verification = classify(order, &payload);
        if verification.status == TicketStatus::Used {
            warn!(
                tx_ref = %payload.reference(),
                "Scan of an already used ticket"
            );
        }
        Ok(verification)
    }

    /// Moves a confirmed ticket to `used`. Classification is taken from the
    /// state the store saw under its lock, never from an earlier scan.
    pub async fn admit(
        &self,
        order_id: Uuid,
        staff: Option<String>,
    ) -> Result<TicketVerification, StoreError> {
        let stamp = TransitionStamp {
            transaction_id: None,
            actor: staff,
        };

        match self.orders.transition(order_id, OrderStatus::Used, stamp).await {
            Ok(Some(order)) => {
                info!(
                    order_id = %order.id,
                    tx_ref = %order.tx_ref,
                    admitted_by = ?order.admitted_by,
                    "Ticket admitted"
                );
                let message = format!("Admitted {} guest(s)", order.ticket_count());
                Ok(TicketVerification {
                    status: TicketStatus::Used,
                    order: Some(order),
                    message,
                    admitted: true,
                })
            }
            Ok(None) => Ok(TicketVerification::invalid("Ticket not found")),
            Err(OrderError::IllegalTransition { from, .. }) => {
                let order = self.orders.order(order_id).await?;
                if from == OrderStatus::Used {
                    warn!(order_id = %order_id, "Duplicate admission attempt");
                }
                Ok(classify(order, &ScanPayload::Reference(String::new())))
            }
            Err(OrderError::Storage(e)) => Err(e),
            Err(other) => Ok(TicketVerification::invalid(other.to_string())),
        }
    }
}
