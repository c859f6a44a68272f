//! # Payment Confirmation Poller
//!
//! Drives one payment attempt at a time:
//!
//! ```text
//! Idle -> Initiating -> AwaitingExternalCompletion -> Succeeded | Failed | Abandoned
//!                                   |
//!                                   +-> AwaitingManualConfirmation (404 or polling ceiling)
//! ```
//!
//! `initiate` asks the backend for a checkout URL, hands it to the
//! platform browser and starts a polling task. The task checks
//! `/api/payments/status/{id}/` every `poll_interval` and stops on a
//! terminal status, on a 404, when the ceiling is reached, or when the
//! attempt is cancelled. Each attempt reports through its own channel and
//! emits at most one terminal event.
//!
//! Only one polling task exists per poller. Starting a new attempt,
//! calling [`PaymentPoller::cancel`] or dropping the poller stops it.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::client::api::{ApiClient, ApiError};
use crate::client::session::SessionManager;
use crate::client::types::AppLifecycle;
use crate::shared::payment::{
    payment_id_from_checkout_url, InitiatePaymentResponse, PaymentId, PaymentRequest,
    PaymentSession, PaymentStatus, PaymentStatusResponse,
};
use crate::shared::profile::Profile;

/// Opens a URL outside the app. Fire-and-forget.
pub trait UrlLauncher: Send + Sync {
    fn open(&self, url: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentPhase {
    Idle,
    Initiating,
    AwaitingExternalCompletion,
    /// Automatic polling stopped without a verdict
    AwaitingManualConfirmation,
    Succeeded,
    Failed,
    Abandoned,
}

impl PaymentPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Abandoned)
    }
}

/// Why automatic polling handed over to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualCheckReason {
    /// The backend does not know the payment id (yet, or any more)
    NotFound,
    /// The polling ceiling was reached
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    Succeeded { payment_id: PaymentId },
    Failed { payment_id: PaymentId },
    ManualCheckRequired { payment_id: PaymentId, reason: ManualCheckReason },
}

impl PaymentEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment initiation failed: {0}")]
    Api(#[from] ApiError),
    #[error("backend did not return a checkout URL")]
    MissingCheckoutUrl,
    #[error("no payment id in response or checkout URL")]
    MissingPaymentId,
    #[error("a payment is already being initiated")]
    AlreadyInFlight,
    #[error("payment attempt was cancelled")]
    Cancelled,
}

/// Handle returned to the caller for one attempt
#[derive(Debug)]
pub struct PaymentAttempt {
    pub session: PaymentSession,
    pub events: mpsc::UnboundedReceiver<PaymentEvent>,
}

struct ActiveAttempt {
    generation: u64,
    payment: PaymentSession,
    events: mpsc::UnboundedSender<PaymentEvent>,
    check_now: Arc<Notify>,
    task: Option<JoinHandle<()>>,
    settled: bool,
}

struct PollerState {
    phase: PaymentPhase,
    generation: u64,
    attempt: Option<ActiveAttempt>,
    lifecycle: AppLifecycle,
}

impl PollerState {
    /// The active attempt if it still belongs to `generation`.
    fn current(&mut self, generation: u64) -> Option<&mut ActiveAttempt> {
        self.attempt
            .as_mut()
            .filter(|attempt| attempt.generation == generation)
    }

    /// Abort the polling task. A settled attempt keeps its task so the
    /// verdict it is about to report still reaches the caller.
    fn stop_task(&mut self) {
        let unsettled = self.attempt.as_mut().filter(|a| !a.settled);
        if let Some(task) = unsettled.and_then(|a| a.task.take()) {
            task.abort();
        }
    }

    fn set_phase(&mut self, phase: PaymentPhase) {
        if self.phase != phase {
            tracing::debug!(from = ?self.phase, to = ?phase, "payment phase");
            self.phase = phase;
        }
    }

    /// Record a terminal outcome once. Returns the channel to report on.
    fn settle(
        &mut self,
        generation: u64,
        status: PaymentStatus,
    ) -> Option<mpsc::UnboundedSender<PaymentEvent>> {
        let attempt = self.current(generation)?;
        if attempt.settled {
            return None;
        }
        attempt.settled = true;
        attempt.payment.status = status;
        let events = attempt.events.clone();
        self.set_phase(if status.is_success() {
            PaymentPhase::Succeeded
        } else {
            PaymentPhase::Failed
        });
        Some(events)
    }
}

/// Returns a poller left in `Initiating` to `Idle` when `initiate` is
/// dropped before the backend answered.
struct InitiatingGuard<'a> {
    state: &'a Mutex<PollerState>,
    generation: u64,
}

impl Drop for InitiatingGuard<'_> {
    fn drop(&mut self) {
        let mut state = lock(self.state);
        if state.generation == self.generation && state.phase == PaymentPhase::Initiating {
            state.set_phase(PaymentPhase::Idle);
        }
    }
}

fn lock(state: &Mutex<PollerState>) -> MutexGuard<'_, PollerState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct PaymentPoller {
    api: ApiClient,
    session: SessionManager,
    launcher: Arc<dyn UrlLauncher>,
    poll_interval: Duration,
    max_poll_duration: Option<Duration>,
    state: Arc<Mutex<PollerState>>,
}

impl std::fmt::Debug for PaymentPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentPoller")
            .field("phase", &self.phase())
            .field("poll_interval", &self.poll_interval)
            .field("max_poll_duration", &self.max_poll_duration)
            .finish()
    }
}

impl PaymentPoller {
    /// Poller using the intervals from the session's API configuration.
    pub fn new(session: SessionManager, launcher: Arc<dyn UrlLauncher>) -> Self {
        let api = session.api().clone();
        let poll_interval = api.config().poll_interval();
        let max_poll_duration = api.config().max_poll_duration();
        Self {
            api,
            session,
            launcher,
            poll_interval,
            max_poll_duration,
            state: Arc::new(Mutex::new(PollerState {
                phase: PaymentPhase::Idle,
                generation: 0,
                attempt: None,
                lifecycle: AppLifecycle::Foreground,
            })),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_poll_duration(mut self, ceiling: Option<Duration>) -> Self {
        self.max_poll_duration = ceiling;
        self
    }

    pub fn phase(&self) -> PaymentPhase {
        lock(&self.state).phase
    }

    /// The attempt being tracked, with its last known status.
    pub fn current_payment(&self) -> Option<PaymentSession> {
        lock(&self.state).attempt.as_ref().map(|a| a.payment.clone())
    }

    /// Create a payment, open its checkout page and start polling.
    pub async fn initiate(&self, request: PaymentRequest) -> Result<PaymentAttempt, PaymentError> {
        let generation = {
            let mut state = lock(&self.state);
            if state.phase == PaymentPhase::Initiating {
                return Err(PaymentError::AlreadyInFlight);
            }
            state.stop_task();
            state.attempt = None;
            state.generation += 1;
            state.set_phase(PaymentPhase::Initiating);
            state.generation
        };
        // Declared before the state lock below so it drops after it.
        let _initiating = InitiatingGuard {
            state: &self.state,
            generation,
        };

        let result = self.create_payment(&request).await;

        let mut state = lock(&self.state);
        if state.generation != generation {
            return Err(PaymentError::Cancelled);
        }
        let (payment_id, checkout_url) = match result {
            Ok(created) => created,
            Err(e) => {
                tracing::warn!("Payment initiation failed: {}", e);
                state.set_phase(PaymentPhase::Idle);
                return Err(e);
            }
        };

        if let Err(e) = self.launcher.open(&checkout_url) {
            // The user can still pay from another device; keep polling.
            tracing::warn!("Could not open checkout URL: {}", e);
        }

        let payment = PaymentSession {
            payment_id: payment_id.clone(),
            checkout_url,
            status: PaymentStatus::Pending,
            booking_id: request.booking_id,
        };
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let check_now = Arc::new(Notify::new());

        let task = tokio::spawn(poll_loop(PollContext {
            api: self.api.clone(),
            session: self.session.clone(),
            state: Arc::clone(&self.state),
            generation,
            payment_id: payment_id.clone(),
            poll_interval: self.poll_interval,
            max_poll_duration: self.max_poll_duration,
            check_now: Arc::clone(&check_now),
        }));

        state.attempt = Some(ActiveAttempt {
            generation,
            payment: payment.clone(),
            events: events_tx,
            check_now,
            task: Some(task),
            settled: false,
        });
        state.set_phase(PaymentPhase::AwaitingExternalCompletion);
        tracing::info!(%payment_id, "Payment initiated, awaiting checkout");

        Ok(PaymentAttempt {
            session: payment,
            events: events_rx,
        })
    }

    async fn create_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<(PaymentId, String), PaymentError> {
        let response: InitiatePaymentResponse = self
            .api
            .post_json("/api/payments/initiate/", request)
            .await?;

        let checkout_url = response
            .checkout_url
            .filter(|url| !url.trim().is_empty())
            .ok_or(PaymentError::MissingCheckoutUrl)?;

        let payment_id = match response.payment_id {
            Some(id) => id,
            None => {
                let derived = payment_id_from_checkout_url(&checkout_url)
                    .ok_or(PaymentError::MissingPaymentId)?;
                tracing::warn!(%derived, "payment_id missing, derived from checkout URL");
                derived
            }
        };
        Ok((payment_id, checkout_url))
    }

    /// Feed platform visibility changes. Coming back to the foreground
    /// while awaiting checkout triggers an immediate status check.
    pub fn on_lifecycle(&self, lifecycle: AppLifecycle) {
        let mut state = lock(&self.state);
        let previous = std::mem::replace(&mut state.lifecycle, lifecycle);
        let resumed = previous == AppLifecycle::Background && lifecycle == AppLifecycle::Foreground;

        if resumed && state.phase == PaymentPhase::AwaitingExternalCompletion {
            if let Some(attempt) = state.attempt.as_ref() {
                tracing::debug!(
                    payment_id = %attempt.payment.payment_id,
                    "App resumed, checking payment now"
                );
                attempt.check_now.notify_one();
            }
        }
    }

    /// "I have completed payment": refresh the profile and let `is_settled`
    /// decide from it. Does not query the payment endpoint.
    pub async fn confirm_manually<F>(&self, is_settled: F) -> bool
    where
        F: Fn(&Profile) -> bool,
    {
        let generation = {
            let state = lock(&self.state);
            match (&state.attempt, state.phase) {
                (Some(_), PaymentPhase::Succeeded) => return true,
                (
                    Some(attempt),
                    PaymentPhase::AwaitingExternalCompletion
                    | PaymentPhase::AwaitingManualConfirmation,
                ) => attempt.generation,
                _ => return false,
            }
        };

        self.session.refresh_user().await;
        let confirmed = self
            .session
            .snapshot()
            .user
            .as_ref()
            .is_some_and(|profile| is_settled(profile));

        if !confirmed {
            tracing::info!("Manual payment check: not detected yet");
            return false;
        }

        let mut state = lock(&self.state);
        let Some(events) = state.settle(generation, PaymentStatus::Succeeded) else {
            return state.phase == PaymentPhase::Succeeded;
        };
        let payment_id = state.current(generation).map(|attempt| {
            if let Some(task) = attempt.task.take() {
                task.abort();
            }
            attempt.payment.payment_id.clone()
        });
        drop(state);

        if let Some(payment_id) = payment_id {
            tracing::info!(%payment_id, "Payment confirmed manually");
            let _ = events.send(PaymentEvent::Succeeded { payment_id });
        }
        true
    }

    /// The payment modal was closed; stop tracking this attempt.
    pub fn cancel(&self) {
        let mut state = lock(&self.state);
        state.stop_task();
        if !state.phase.is_terminal() && state.phase != PaymentPhase::Idle {
            state.set_phase(PaymentPhase::Abandoned);
        }
        state.generation += 1;
        state.attempt = None;
    }
}

impl Drop for PaymentPoller {
    fn drop(&mut self) {
        lock(&self.state).stop_task();
    }
}

struct PollContext {
    api: ApiClient,
    session: SessionManager,
    state: Arc<Mutex<PollerState>>,
    generation: u64,
    payment_id: PaymentId,
    poll_interval: Duration,
    max_poll_duration: Option<Duration>,
    check_now: Arc<Notify>,
}

async fn poll_loop(ctx: PollContext) {
    let started = Instant::now();
    let mut ticker = tokio::time::interval_at(started + ctx.poll_interval, ctx.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let ceiling = async {
        match ctx.max_poll_duration {
            Some(limit) => tokio::time::sleep_until(started + limit).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(ceiling);

    let path = format!("/api/payments/status/{}/", ctx.payment_id);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = ctx.check_now.notified() => {}
            _ = &mut ceiling => {
                tracing::info!(payment_id = %ctx.payment_id, "Payment polling ceiling reached");
                hand_over(&ctx, ManualCheckReason::TimedOut);
                return;
            }
        }

        match ctx.api.get_json::<PaymentStatusResponse>(&path).await {
            Ok(PaymentStatusResponse { status }) if status.is_terminal() => {
                let settled = lock(&ctx.state).settle(ctx.generation, status);
                let Some(events) = settled else {
                    return;
                };
                let payment_id = ctx.payment_id.clone();
                if status.is_success() {
                    tracing::info!(%payment_id, "Payment succeeded");
                    ctx.session.refresh_user().await;
                    let _ = events.send(PaymentEvent::Succeeded { payment_id });
                } else {
                    tracing::info!(%payment_id, "Payment failed");
                    let _ = events.send(PaymentEvent::Failed { payment_id });
                }
                return;
            }
            Ok(PaymentStatusResponse { status }) => {
                tracing::debug!(payment_id = %ctx.payment_id, ?status, "Payment still pending");
                {
                    let mut state = lock(&ctx.state);
                    if let Some(attempt) = state.current(ctx.generation) {
                        attempt.payment.status = status;
                    }
                }
            }
            Err(e) if e.is_not_found() => {
                tracing::info!(
                    payment_id = %ctx.payment_id,
                    "Payment not found, switching to manual check"
                );
                hand_over(&ctx, ManualCheckReason::NotFound);
                return;
            }
            Err(e) => {
                tracing::warn!(payment_id = %ctx.payment_id, "Payment status check failed: {}", e);
            }
        }
    }
}

/// Stop automatic polling without a verdict.
fn hand_over(ctx: &PollContext, reason: ManualCheckReason) {
    let mut state = lock(&ctx.state);
    let Some(attempt) = state.current(ctx.generation) else {
        return;
    };
    if attempt.settled {
        return;
    }
    attempt.task = None;
    let events = attempt.events.clone();
    state.set_phase(PaymentPhase::AwaitingManualConfirmation);
    drop(state);

    let _ = events.send(PaymentEvent::ManualCheckRequired {
        payment_id: ctx.payment_id.clone(),
        reason,
    });
}
