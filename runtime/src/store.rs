//! The command service.
//!
//! [`MarketplaceStore`] owns the [`Ledger`] and runs every command as one
//! serialized transaction:
//!
//! 1. take the ledger write lock
//! 2. decide: the reducer re-reads current state and rejects or emits events
//! 3. persist the events per stream, expecting the version the ledger holds
//! 4. apply the persisted events to the ledger
//! 5. release the lock, then fan out notifications and broadcast the events
//!
//! A rejected decision or a failed append leaves the ledger untouched.
//! Notifications and broadcasts only ever follow a commit.
//!
//! Marking a notification read is persisted the same way, as a
//! `NotificationRead` event on the recipient's `notifications-{user}` stream.

use crate::inbox::NotificationInbox;
use crate::metrics::{CommandMetrics, NotificationMetrics};
use marketplace_core::notification::Notification;
use marketplace_core::order::{Order, OrderItem, PickupCode};
use marketplace_core::payout::{BankDetails, Payout, PayoutDecision};
use marketplace_core::returns::{ReturnDecision, ReturnReason, ReturnRequest};
use marketplace_core::{
    Actor, Apply, EventStore, Events, FulfillmentStatus, LedgerEvent, MarketResult,
    MarketplaceError, Money, NotificationId, OrderId, OrderItemId, PaymentStatus, PayoutId,
    Reducer, ReturnId, StreamId, UserId, smallvec,
};
use marketplace_fulfillment::analytics::{
    self, PayoutSummary, Period, RefundAnalytics, VendorRisk,
};
use marketplace_fulfillment::orders::{self, OrderCommand, OrderView, PlaceOrder};
use marketplace_fulfillment::payouts::PayoutCommand;
use marketplace_fulfillment::returns::{self, PendingReturnAge, ReturnCommand};
use marketplace_fulfillment::{
    Ledger, LedgerCommand, LedgerEnvironment, MarketplaceReducer, VendorBalance, drafts_for,
    settlement,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{RwLock, broadcast};

/// Domain events buffered for slow subscribers
const BROADCAST_CAPACITY: usize = 256;

/// Command name recorded for read marks
const MARK_READ: &str = "MarkNotificationRead";

/// Serialized command execution over the ledger.
///
/// # Example
///
/// ```ignore
/// let store = MarketplaceStore::new(Arc::new(InMemoryEventStore::new()), env);
/// let view = store.place_order(customer, checkout).await?;
/// let balance = store.vendor_balance(vendor).await;
/// ```
pub struct MarketplaceStore {
    ledger: RwLock<Ledger>,
    inbox: RwLock<NotificationInbox>,
    event_store: Arc<dyn EventStore>,
    environment: LedgerEnvironment,
    reducer: MarketplaceReducer,
    events: broadcast::Sender<LedgerEvent>,
}

impl MarketplaceStore {
    /// Store over an empty ledger
    #[must_use]
    pub fn new(event_store: Arc<dyn EventStore>, environment: LedgerEnvironment) -> Self {
        Self::with_state(
            Ledger::new(),
            NotificationInbox::new(),
            event_store,
            environment,
        )
    }

    fn with_state(
        ledger: Ledger,
        inbox: NotificationInbox,
        event_store: Arc<dyn EventStore>,
        environment: LedgerEnvironment,
    ) -> Self {
        let (events, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            ledger: RwLock::new(ledger),
            inbox: RwLock::new(inbox),
            event_store,
            environment,
            reducer: MarketplaceReducer::new(),
            events,
        }
    }

    /// Rebuilds the ledger by replaying every persisted event in global
    /// append order.
    ///
    /// Inboxes are rebuilt from the same events, with the same notification
    /// ids and read flags. Nothing is broadcast.
    ///
    /// # Errors
    ///
    /// `Internal` if the store cannot be read or holds an undecodable event.
    pub async fn recover(
        event_store: Arc<dyn EventStore>,
        environment: LedgerEnvironment,
    ) -> MarketResult<Self> {
        let recorded = event_store.load_all().await.map_err(|error| {
            tracing::error!(%error, "Failed to load event log");
            MarketplaceError::from(error)
        })?;

        let mut ledger = Ledger::new();
        let mut inbox = NotificationInbox::new();
        for record in &recorded {
            let event = LedgerEvent::from_serialized(&record.event).map_err(|error| {
                tracing::error!(
                    stream = %record.stream_id,
                    position = record.position,
                    %error,
                    "Undecodable event in log"
                );
                MarketplaceError::internal(error.to_string())
            })?;
            ledger.apply(&event);
            for draft in drafts_for(&event) {
                inbox.deliver(draft, event.occurred_at());
            }
            if let LedgerEvent::NotificationRead {
                notification_id,
                recipient,
                ..
            } = &event
            {
                inbox.set_read(*recipient, *notification_id);
            }
        }

        tracing::info!(events = recorded.len(), "Ledger recovered from event log");
        Ok(Self::with_state(ledger, inbox, event_store, environment))
    }

    /// Receives every committed event, in commit order
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    /// Environment commands are decided under
    #[must_use]
    pub const fn environment(&self) -> &LedgerEnvironment {
        &self.environment
    }

    /// Runs `command` and returns the committed events.
    ///
    /// # Errors
    ///
    /// The reducer's rejection, `Conflict` if the event store moved ahead of
    /// the ledger, or `Internal` on a persistence failure.
    pub async fn execute(
        &self,
        command: impl Into<LedgerCommand>,
    ) -> MarketResult<Events<LedgerEvent>> {
        self.execute_then(command.into(), |_| Ok(())).await.map(|(events, ())| events)
    }

    /// Runs `command`, then reads the result out of the ledger before any
    /// other command can run.
    #[tracing::instrument(skip_all, fields(command = command.name()))]
    async fn execute_then<T, F>(
        &self,
        command: LedgerCommand,
        read: F,
    ) -> MarketResult<(Events<LedgerEvent>, T)>
    where
        F: FnOnce(&Ledger) -> MarketResult<T>,
    {
        let name = command.name();
        let started = Instant::now();

        let outcome = {
            let mut ledger = self.ledger.write().await;
            self.decide_and_commit(&mut *ledger, name, command)
                .await
                .map(|events| {
                    let value = read(&*ledger);
                    (events, value)
                })
        };

        self.settle(name, started, outcome).await
    }

    /// Records the outcome of a command, then publishes what it committed.
    async fn settle<T>(
        &self,
        name: &'static str,
        started: Instant,
        outcome: MarketResult<(Events<LedgerEvent>, MarketResult<T>)>,
    ) -> MarketResult<(Events<LedgerEvent>, T)> {
        match outcome {
            Ok((events, value)) => {
                CommandMetrics::record_accepted(name, events.len(), started.elapsed());
                tracing::info!(
                    events = events.len(),
                    types = ?events.iter().map(LedgerEvent::event_type).collect::<Vec<_>>(),
                    "Command committed"
                );
                // Committed events are published even if the read-back fails
                self.publish(&events).await;
                value.map(|value| (events, value))
            },
            Err(error) => {
                CommandMetrics::record_rejected(name, error.code(), started.elapsed());
                match &error {
                    MarketplaceError::Internal { detail } => {
                        tracing::error!(%detail, "Command failed");
                    },
                    other => tracing::warn!(code = other.code(), error = %other, "Command rejected"),
                }
                Err(error)
            },
        }
    }

    async fn decide_and_commit(
        &self,
        ledger: &mut Ledger,
        name: &'static str,
        command: LedgerCommand,
    ) -> MarketResult<Events<LedgerEvent>> {
        let events = self.reducer.reduce(ledger, command, &self.environment)?;
        self.commit(ledger, name, events).await
    }

    /// Persists `events`, then applies them to the ledger
    async fn commit(
        &self,
        ledger: &mut Ledger,
        name: &'static str,
        events: Events<LedgerEvent>,
    ) -> MarketResult<Events<LedgerEvent>> {
        // Group by stream, keeping the decided order within each stream
        let mut batches: Vec<(StreamId, Vec<&LedgerEvent>)> = Vec::new();
        for event in &events {
            let stream = event.stream_id();
            match batches.iter_mut().find(|(id, _)| *id == stream) {
                Some((_, batch)) => batch.push(event),
                None => batches.push((stream, vec![event])),
            }
        }

        let metadata = serde_json::json!({
            "command": name,
            "recorded_at": self.environment.clock.now(),
        });
        for (stream, batch) in batches {
            let serialized = batch
                .iter()
                .map(|event| event.to_serialized(Some(metadata.clone())))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|error| MarketplaceError::internal(error.to_string()))?;
            let expected = ledger.version(&stream);
            self.event_store
                .append_events(stream.clone(), Some(expected), serialized)
                .await
                .map_err(|error| {
                    tracing::debug!(%stream, %expected, %error, "Append failed");
                    MarketplaceError::from(error)
                })?;
            // Applied stream by stream so the ledger never runs ahead of the log
            ledger.apply_all(batch.iter().copied());
        }
        Ok(events)
    }

    async fn publish(&self, events: &[LedgerEvent]) {
        {
            let mut inbox = self.inbox.write().await;
            for event in events {
                for draft in drafts_for(event) {
                    let kind = draft.kind.as_str();
                    if inbox.deliver(draft, event.occurred_at()).is_some() {
                        NotificationMetrics::record_delivered(kind);
                    } else {
                        NotificationMetrics::record_duplicate();
                    }
                }
            }
        }
        for event in events {
            // No subscribers is not an error
            let _ = self.events.send(event.clone());
        }
    }

    // Orders

    /// Creates an order and its items with frozen prices and commission.
    ///
    /// # Errors
    ///
    /// `Validation` for malformed checkout input, `Forbidden` unless the
    /// actor is a customer.
    pub async fn place_order(&self, actor: Actor, order: PlaceOrder) -> MarketResult<OrderView> {
        let order_id = order.order_id;
        self.execute_then(
            OrderCommand::PlaceOrder { actor, order }.into(),
            |ledger| orders::order_view(ledger, order_id),
        )
        .await
        .map(|(_, view)| view)
    }

    /// Applies a payment gateway callback.
    ///
    /// # Errors
    ///
    /// `PreconditionFailed` for a transition outside the payment table.
    pub async fn record_payment_status(
        &self,
        order_id: OrderId,
        status: PaymentStatus,
    ) -> MarketResult<Order> {
        self.execute_then(
            OrderCommand::RecordPaymentStatus { order_id, status }.into(),
            |ledger| ledger.require_order(order_id).cloned(),
        )
        .await
        .map(|(_, order)| order)
    }

    /// Moves one item along a fulfillment edge.
    ///
    /// `observed` is the status the caller last saw; if the item has moved
    /// since, the call fails with `Conflict` and the caller should re-read.
    ///
    /// # Errors
    ///
    /// `Conflict`, `Forbidden`, or `PreconditionFailed` for an edge outside
    /// the transition table.
    pub async fn advance_item_status(
        &self,
        actor: Actor,
        item_id: OrderItemId,
        observed: FulfillmentStatus,
        to: FulfillmentStatus,
    ) -> MarketResult<OrderItem> {
        self.execute_then(
            OrderCommand::AdvanceItemStatus {
                item_id,
                observed,
                to,
                actor,
            }
            .into(),
            |ledger| ledger.require_item(item_id).cloned(),
        )
        .await
        .map(|(_, item)| item)
    }

    /// Returns the order's active pickup code, issuing one if needed.
    ///
    /// # Errors
    ///
    /// `PreconditionFailed` if the order is not awaiting pickup,
    /// `PickupCodeExhausted` if no unique code could be drawn.
    pub async fn issue_pickup_code(
        &self,
        actor: Actor,
        order_id: OrderId,
    ) -> MarketResult<PickupCode> {
        self.execute_then(
            OrderCommand::IssuePickupCode { order_id, actor }.into(),
            |ledger| {
                ledger
                    .require_order(order_id)?
                    .pickup_code
                    .clone()
                    .ok_or_else(|| MarketplaceError::internal("pickup code missing after issue"))
            },
        )
        .await
        .map(|(_, code)| code)
    }

    /// Hands the order over at the pickup point: every item becomes
    /// DELIVERED and the code is burned.
    ///
    /// # Errors
    ///
    /// `Validation` for a wrong code, `PreconditionFailed` if an item is not
    /// ready or the code was already used.
    pub async fn verify_and_consume_code(
        &self,
        actor: Actor,
        order_id: OrderId,
        code: &str,
    ) -> MarketResult<OrderView> {
        self.execute_then(
            OrderCommand::VerifyAndConsumeCode {
                order_id,
                code: code.to_string(),
                actor,
            }
            .into(),
            |ledger| orders::order_view(ledger, order_id),
        )
        .await
        .map(|(_, view)| view)
    }

    /// Cancels every item of an order that has not shipped.
    ///
    /// # Errors
    ///
    /// `PreconditionFailed` once any item has shipped or the order is
    /// already cancelled.
    pub async fn cancel_order(&self, actor: Actor, order_id: OrderId) -> MarketResult<OrderView> {
        self.execute_then(
            OrderCommand::CancelOrder { order_id, actor }.into(),
            |ledger| orders::order_view(ledger, order_id),
        )
        .await
        .map(|(_, view)| view)
    }

    // Returns

    /// Files a return request on a delivered item.
    ///
    /// # Errors
    ///
    /// `Validation` if the amount exceeds what is left to refund,
    /// `PreconditionFailed` for an undelivered item, a closed window or an
    /// open request.
    pub async fn request_return(
        &self,
        actor: Actor,
        order_item_id: OrderItemId,
        reason: ReturnReason,
        description: &str,
        requested_amount: Money,
    ) -> MarketResult<ReturnRequest> {
        let request_id = ReturnId::new();
        self.execute_then(
            ReturnCommand::RequestReturn {
                request_id,
                order_item_id,
                reason,
                description: description.to_string(),
                requested_amount,
                actor,
            }
            .into(),
            |ledger| ledger.require_return(request_id).cloned(),
        )
        .await
        .map(|(_, request)| request)
    }

    /// Approves or rejects a pending request.
    ///
    /// # Errors
    ///
    /// `PreconditionFailed::AlreadyDecided` with the current status if the
    /// request left PENDING, `Validation` for a rejection without a reason.
    pub async fn decide_return(
        &self,
        actor: Actor,
        request_id: ReturnId,
        decision: ReturnDecision,
        response: Option<String>,
    ) -> MarketResult<ReturnRequest> {
        self.execute_then(
            ReturnCommand::Decide {
                request_id,
                decision,
                response,
                actor,
            }
            .into(),
            |ledger| ledger.require_return(request_id).cloned(),
        )
        .await
        .map(|(_, request)| request)
    }

    /// Records the customer dropping the item off at the pickup point.
    ///
    /// # Errors
    ///
    /// `Validation` for a wrong code, `PreconditionFailed` if the request is
    /// not approved or was already dropped off.
    pub async fn confirm_return_dropoff(
        &self,
        actor: Actor,
        request_id: ReturnId,
        code: &str,
    ) -> MarketResult<ReturnRequest> {
        self.execute_then(
            ReturnCommand::ConfirmDropoff {
                request_id,
                code: code.to_string(),
                actor,
            }
            .into(),
            |ledger| ledger.require_return(request_id).cloned(),
        )
        .await
        .map(|(_, request)| request)
    }

    /// Marks an approved refund as paid back to the customer.
    ///
    /// # Errors
    ///
    /// `PreconditionFailed::AlreadyCompleted` on a repeat.
    pub async fn complete_return(
        &self,
        actor: Actor,
        request_id: ReturnId,
    ) -> MarketResult<ReturnRequest> {
        self.execute_then(
            ReturnCommand::Complete { request_id, actor }.into(),
            |ledger| ledger.require_return(request_id).cloned(),
        )
        .await
        .map(|(_, request)| request)
    }

    // Payouts

    /// Requests a payout of `amount` from the vendor's available balance.
    ///
    /// # Errors
    ///
    /// `InsufficientBalance` with the available amount, `Validation` below
    /// the platform minimum or for incomplete bank details.
    pub async fn request_payout(
        &self,
        actor: Actor,
        amount: Money,
        bank: BankDetails,
    ) -> MarketResult<Payout> {
        let payout_id = PayoutId::new();
        self.execute_then(
            PayoutCommand::RequestPayout {
                payout_id,
                amount,
                bank,
                actor,
            }
            .into(),
            |ledger| ledger.require_payout(payout_id).cloned(),
        )
        .await
        .map(|(_, payout)| payout)
    }

    /// Moves a pending payout to PROCESSING.
    ///
    /// # Errors
    ///
    /// `Forbidden` unless admin, `PreconditionFailed` unless PENDING.
    pub async fn mark_payout_processing(
        &self,
        actor: Actor,
        payout_id: PayoutId,
    ) -> MarketResult<Payout> {
        self.execute_then(
            PayoutCommand::MarkProcessing { payout_id, actor }.into(),
            |ledger| ledger.require_payout(payout_id).cloned(),
        )
        .await
        .map(|(_, payout)| payout)
    }

    /// Completes or fails a payout.
    ///
    /// # Errors
    ///
    /// `Forbidden` unless admin, `PreconditionFailed` for a payout already
    /// completed or failed.
    pub async fn decide_payout(
        &self,
        actor: Actor,
        payout_id: PayoutId,
        decision: PayoutDecision,
        note: Option<String>,
    ) -> MarketResult<Payout> {
        self.execute_then(
            PayoutCommand::Decide {
                payout_id,
                decision,
                note,
                actor,
            }
            .into(),
            |ledger| ledger.require_payout(payout_id).cloned(),
        )
        .await
        .map(|(_, payout)| payout)
    }

    // Reads

    /// Runs `read` against the current ledger
    pub async fn read<T>(&self, read: impl FnOnce(&Ledger) -> T) -> T {
        read(&*self.ledger.read().await)
    }

    /// Balance breakdown of a vendor
    pub async fn vendor_balance(&self, vendor: UserId) -> VendorBalance {
        self.read(|ledger| settlement::vendor_balance(ledger, vendor)).await
    }

    /// Order, items and display status.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown order.
    pub async fn order_view(&self, order_id: OrderId) -> MarketResult<OrderView> {
        self.read(|ledger| orders::order_view(ledger, order_id)).await
    }

    /// Pending return requests with their age, oldest first
    pub async fn pending_return_ages(&self) -> Vec<PendingReturnAge> {
        let now = self.environment.clock.now();
        self.read(|ledger| returns::pending_return_ages(ledger, now))
            .await
    }

    /// Refund rollup over `period`
    pub async fn refund_analytics(
        &self,
        period: Period,
        vendor: Option<UserId>,
    ) -> RefundAnalytics {
        let now = self.environment.clock.now();
        self.read(|ledger| analytics::refund_analytics(ledger, period, vendor, now))
            .await
    }

    /// Vendor risk scores over `period`, riskiest first
    pub async fn vendor_risk(&self, period: Period) -> Vec<VendorRisk> {
        let now = self.environment.clock.now();
        let policy = &self.environment.config.risk;
        self.read(|ledger| analytics::vendor_risk(ledger, period, policy, now))
            .await
    }

    /// Payout rollup over `period`
    pub async fn payout_summary(&self, period: Period, vendor: Option<UserId>) -> PayoutSummary {
        let now = self.environment.clock.now();
        self.read(|ledger| analytics::payout_summary(ledger, period, vendor, now))
            .await
    }

    // Notifications

    /// A user's notifications, newest first
    pub async fn notifications_for(&self, user: UserId) -> Vec<Notification> {
        self.inbox.read().await.for_user(user)
    }

    /// Unread notifications of a user
    pub async fn unread_count(&self, user: UserId) -> usize {
        self.inbox.read().await.unread_count(user)
    }

    /// Marks one of the caller's notifications read; idempotent.
    ///
    /// The first mark is persisted; marking a read notification again
    /// records nothing.
    ///
    /// # Errors
    ///
    /// `Forbidden` for someone else's notification, `NotFound` for an
    /// unknown id, `Conflict` or `Internal` if the mark cannot be persisted.
    #[tracing::instrument(skip_all, fields(command = MARK_READ))]
    pub async fn mark_notification_read(
        &self,
        actor: Actor,
        id: NotificationId,
    ) -> MarketResult<Notification> {
        let started = Instant::now();
        let outcome = self.commit_read(actor, id).await;
        self.settle(MARK_READ, started, outcome)
            .await
            .map(|(_, notification)| notification)
    }

    async fn commit_read(
        &self,
        actor: Actor,
        id: NotificationId,
    ) -> MarketResult<(Events<LedgerEvent>, MarketResult<Notification>)> {
        let mut ledger = self.ledger.write().await;
        let mut inbox = self.inbox.write().await;
        let current = inbox.find_own(actor, id)?;
        if current.read {
            return Ok((Events::new(), Ok(current.clone())));
        }

        let event = LedgerEvent::NotificationRead {
            notification_id: id,
            recipient: actor.user_id,
            at: self.environment.clock.now(),
        };
        let events = self.commit(&mut *ledger, MARK_READ, smallvec![event]).await?;
        inbox.set_read(actor.user_id, id);
        let read = inbox.find_own(actor, id).cloned();
        Ok((events, read))
    }
}

impl std::fmt::Debug for MarketplaceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketplaceStore")
            .field("environment", &self.environment)
            .field("subscribers", &self.events.receiver_count())
            .finish_non_exhaustive()
    }
}
