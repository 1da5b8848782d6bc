use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// How long the embedded widget gets to signal readiness before the
/// adapter falls back to the redirect flow.
pub const WIDGET_READY_TIMEOUT: Duration = Duration::from_secs(15);

/// Grace delay between a widget-reported error and the fallback.
pub const WIDGET_ERROR_GRACE: Duration = Duration::from_secs(2);

/// Single-use guard for the fallback path.
///
/// The readiness timer and the widget's error callback can both decide to
/// fall back; whichever wins the check-and-set performs it, the loser does
/// nothing. The check-and-set happens before any side effect.
#[derive(Debug, Default)]
pub struct FallbackLatch(AtomicBool);

impl FallbackLatch {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attempts to claim the fallback. Returns `true` exactly once.
    pub fn trigger(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn fired(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Which embedded form the widget step is running.
#[derive(Debug, Clone)]
pub enum WidgetKind {
    /// Hosted gateway's card widget; carries the fallback machinery.
    HostedWidget,
    /// PaymentIntent card form; the secret is what the client SDK renders
    /// against.
    CardIntent {
        client_secret: String,
        payment_intent_id: String,
    },
}

/// Ephemeral per-attempt state for an embedded-widget step.
///
/// Created when the step is entered, discarded on leaving it. Dropping the
/// session aborts the pending fallback timer, so whichever of widget-ready,
/// step-exit, or session teardown comes first silences a late fallback.
pub struct GatewaySession {
    pub kind: WidgetKind,
    pub ready: bool,
    pub processing: bool,
    latch: Arc<FallbackLatch>,
    fallback_timer: Option<JoinHandle<()>>,
}

impl GatewaySession {
    pub fn new(kind: WidgetKind) -> Self {
        Self {
            kind,
            ready: false,
            processing: false,
            latch: FallbackLatch::new(),
            fallback_timer: None,
        }
    }

    pub fn latch(&self) -> Arc<FallbackLatch> {
        self.latch.clone()
    }

    pub fn arm_fallback_timer(&mut self, handle: JoinHandle<()>) {
        self.fallback_timer = Some(handle);
    }

    /// Marks the widget ready and cancels the pending fallback timer.
    pub fn mark_ready(&mut self) {
        self.ready = true;
        self.cancel_fallback_timer();
    }

    pub fn cancel_fallback_timer(&mut self) {
        if let Some(handle) = self.fallback_timer.take() {
            handle.abort();
        }
    }

    pub fn fallback_fired(&self) -> bool {
        self.latch.fired()
    }
}

impl Drop for GatewaySession {
    fn drop(&mut self) {
        self.cancel_fallback_timer();
    }
}

impl std::fmt::Debug for GatewaySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySession")
            .field("kind", &self.kind)
            .field("ready", &self.ready)
            .field("processing", &self.processing)
            .field("fallback_fired", &self.latch.fired())
            .field("timer_armed", &self.fallback_timer.is_some())
            .finish()
    }
}
