//! Order state transitions and venue report application.
//!
//! All mutation of an [`Order`] goes through these functions, called under
//! the order's own lock by the tracker.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::domain::{Order, OrderReport, OrderState, VenueOrderStatus};

/// Whether the state machine allows `from -> to`.
#[must_use]
pub fn can_transition(from: OrderState, to: OrderState) -> bool {
    use OrderState::*;

    match (from, to) {
        (Created, Submitting { .. } | Failed) => true,
        (
            Submitting { .. },
            Submitting { .. } | Acknowledged | PartiallyFilled | Filled | CancelRequested
            | Canceled | Rejected | Failed,
        ) => true,
        (Acknowledged, PartiallyFilled | Filled | CancelRequested | Canceled | Rejected) => true,
        (PartiallyFilled, PartiallyFilled | Filled | CancelRequested | Canceled) => true,
        (CancelRequested, Filled | Canceled | Acknowledged | PartiallyFilled) => true,
        _ => false,
    }
}

/// Move to `to` if allowed. Returns false, leaving the order untouched, otherwise.
pub fn transition(order: &mut Order, to: OrderState, now: DateTime<Utc>) -> bool {
    if !can_transition(order.state, to) {
        warn!(
            client_order_id = %order.client_order_id,
            from = %order.state,
            to = %to,
            "Ignoring illegal order transition"
        );
        return false;
    }
    if order.state == OrderState::CancelRequested {
        order.pre_cancel_state = None;
    }
    order.state = to;
    order.updated_at = now;
    true
}

/// Result of applying one venue report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportEffect {
    /// Fill progress or a state change was recorded.
    Applied,
    /// Duplicate, stale or not applicable; nothing changed.
    Ignored(&'static str),
}

/// Apply a venue report.
///
/// Fill progress is monotonic: a fill report whose cumulative quantity does
/// not exceed the recorded one is discarded. Reaching the ordered quantity
/// resolves to Filled whatever else is pending, which settles the
/// cancel/fill race by quantity.
pub fn apply_report(order: &mut Order, report: &OrderReport, now: DateTime<Utc>) -> ReportEffect {
    if order.state.is_terminal() {
        return ReportEffect::Ignored("order is terminal");
    }

    let is_fill_report = matches!(
        report.status,
        VenueOrderStatus::PartiallyFilled | VenueOrderStatus::Filled
    );
    let reported_filled = match (report.filled_quantity, report.status) {
        (Some(filled), _) => Some(filled),
        (None, VenueOrderStatus::Filled) => Some(order.quantity),
        (None, _) => None,
    };

    let progressed = match reported_filled {
        Some(filled) if filled > order.filled_quantity => {
            record_fill(order, filled, report);
            true
        }
        _ => false,
    };

    if is_fill_report && !progressed {
        debug!(
            client_order_id = %order.client_order_id,
            reported = ?reported_filled,
            recorded = %order.filled_quantity,
            "Discarding duplicate or stale fill report"
        );
        return ReportEffect::Ignored("fill not beyond recorded quantity");
    }

    let target = if order.filled_quantity >= order.quantity {
        OrderState::Filled
    } else {
        match report.status {
            VenueOrderStatus::New => OrderState::Acknowledged,
            VenueOrderStatus::PartiallyFilled => OrderState::PartiallyFilled,
            // Venue says filled but reports less than ordered: trust the quantity.
            VenueOrderStatus::Filled => OrderState::PartiallyFilled,
            VenueOrderStatus::Canceled | VenueOrderStatus::Expired => OrderState::Canceled,
            VenueOrderStatus::Rejected => OrderState::Rejected,
        }
    };

    if matches!(report.status, VenueOrderStatus::Rejected | VenueOrderStatus::Canceled) {
        if let Some(reason) = &report.reason {
            order.reason = Some(reason.clone());
        }
    }

    let changed = if target == order.state {
        false
    } else if order.state == OrderState::CancelRequested
        && matches!(target, OrderState::Acknowledged | OrderState::PartiallyFilled)
    {
        // Only an explicit refusal restores a pre-cancel state.
        false
    } else {
        transition(order, target, now)
    };

    if progressed || changed {
        order.updated_at = now;
        ReportEffect::Applied
    } else {
        ReportEffect::Ignored("no change")
    }
}

fn record_fill(order: &mut Order, filled: Decimal, report: &OrderReport) {
    let previous = order.filled_quantity;
    let increment = filled - previous;

    order.average_price = match report.average_price {
        Some(average) if average > Decimal::ZERO => Some(average),
        _ => match report.last_fill_price.or(order.price) {
            Some(price) => {
                let prior_notional = order.average_price.unwrap_or(Decimal::ZERO) * previous;
                Some((prior_notional + price * increment) / filled)
            }
            None => order.average_price,
        },
    };
    order.filled_quantity = filled;
}

/// Record a cancel request, remembering the state to restore on refusal.
pub fn request_cancel(order: &mut Order, now: DateTime<Utc>) -> bool {
    let previous = order.state;
    if transition(order, OrderState::CancelRequested, now) {
        order.pre_cancel_state = Some(previous);
        true
    } else {
        false
    }
}

/// The venue refused the cancel; go back to where the order was.
pub fn cancel_refused(order: &mut Order, reason: &str, now: DateTime<Utc>) -> bool {
    if order.state != OrderState::CancelRequested {
        return false;
    }
    let restore = match order.pre_cancel_state.take() {
        Some(OrderState::PartiallyFilled) => OrderState::PartiallyFilled,
        _ if order.filled_quantity > Decimal::ZERO => OrderState::PartiallyFilled,
        _ => OrderState::Acknowledged,
    };
    order.reason = Some(reason.to_string());
    transition(order, restore, now)
}
