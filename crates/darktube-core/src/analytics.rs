//! Analytics event pipeline
//!
//! Events are enriched with the client context at enqueue time, queued, and
//! delivered in batches:
//! - a debounce timer, restarted on every enqueue, flushes after a quiet period
//! - a periodic timer forces a flush regardless of activity
//! - reaching the queue capacity flushes immediately
//!
//! A failed delivery puts the drained batch back at the front of the queue.
//! Teardown (explicit or on drop) hands whatever is left to the transport's
//! beacon path.

use crate::{
    api::AnalyticsTransport,
    types::{AnalyticsConfig, SessionId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, trace, warn};

/// Progress percentages reported once each
pub const PROGRESS_MILESTONES: [u32; 4] = [25, 50, 75, 95];

/// Width of a retention bucket in seconds
pub const RETENTION_BUCKET_SECS: f64 = 30.0;

/// Analytics event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    VideoView,
    VideoProgress,
    VideoRetention,
    VideoInteraction,
    VideoEngagement,
    VideoError,
    PageView,
    Search,
    SearchClick,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::VideoView => "video_view",
            EventType::VideoProgress => "video_progress",
            EventType::VideoRetention => "video_retention",
            EventType::VideoInteraction => "video_interaction",
            EventType::VideoEngagement => "video_engagement",
            EventType::VideoError => "video_error",
            EventType::PageView => "page_view",
            EventType::Search => "search",
            EventType::SearchClick => "search_click",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One analytics record as sent over the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Absent for page-level events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
    pub data: Map<String, Value>,
}

impl AnalyticsEvent {
    /// String field of the payload
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

/// Request body of the analytics endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventBatch {
    pub events: Vec<AnalyticsEvent>,
}

impl EventBatch {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Client environment attached to every event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientContext {
    pub user_agent: String,
    pub screen_resolution: String,
    pub viewport_size: String,
    pub referrer: String,
    pub page_url: String,
}

impl ClientContext {
    /// Merge the envelope into a payload, overwriting same-named keys
    pub fn apply(&self, data: &mut Map<String, Value>) {
        data.insert("user_agent".into(), json!(self.user_agent));
        data.insert("screen_resolution".into(), json!(self.screen_resolution));
        data.insert("viewport_size".into(), json!(self.viewport_size));
        data.insert("referrer".into(), json!(self.referrer));
        data.insert("page_url".into(), json!(self.page_url));
    }
}

/// Supplies the client context; sampled each time an event is enqueued
pub trait ClientContextSource: Send + Sync {
    fn snapshot(&self) -> ClientContext;
}

impl ClientContextSource for ClientContext {
    fn snapshot(&self) -> ClientContext {
        self.clone()
    }
}

/// A progress threshold crossed for the first time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMark {
    Milestone(u32),
    /// Start of a retention bucket, in seconds
    Retention(u64),
}

/// Remembers which milestones and retention buckets already fired
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    milestones: BTreeSet<u32>,
    buckets: BTreeSet<u64>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a position, returning milestones (ascending) then the
    /// retention bucket that fire for the first time
    pub fn observe(&mut self, current_time: f64, duration: f64) -> Vec<ProgressMark> {
        if !(duration > 0.0) || !current_time.is_finite() {
            return Vec::new();
        }

        let current_time = current_time.max(0.0);
        let percent = (current_time / duration * 100.0).floor();
        let mut marks = Vec::new();

        for milestone in PROGRESS_MILESTONES {
            if percent >= milestone as f64 && self.milestones.insert(milestone) {
                marks.push(ProgressMark::Milestone(milestone));
            }
        }

        let bucket = ((current_time / RETENTION_BUCKET_SECS).floor() * RETENTION_BUCKET_SECS) as u64;
        if self.buckets.insert(bucket) {
            marks.push(ProgressMark::Retention(bucket));
        }

        marks
    }

    pub fn fired_milestones(&self) -> impl Iterator<Item = u32> + '_ {
        self.milestones.iter().copied()
    }
}

/// Result of one flush attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was queued
    Empty,
    /// This many events were accepted by the transport
    Delivered(usize),
    /// Delivery failed; this many events went back to the queue front
    Requeued(usize),
}

#[derive(Default)]
struct Timers {
    debounce: Option<JoinHandle<()>>,
    periodic: Option<JoinHandle<()>>,
}

impl Timers {
    fn abort_all(&mut self) {
        for task in [self.debounce.take(), self.periodic.take()].into_iter().flatten() {
            task.abort();
        }
    }
}

#[derive(Default)]
struct Tracking {
    view_tracked: bool,
    progress: ProgressTracker,
}

struct Shared {
    video_id: String,
    session_id: SessionId,
    config: AnalyticsConfig,
    transport: Arc<dyn AnalyticsTransport>,
    context: Arc<dyn ClientContextSource>,
    queue: Mutex<Vec<AnalyticsEvent>>,
    tracking: Mutex<Tracking>,
    timers: StdMutex<Timers>,
    closed: AtomicBool,
}

impl Shared {
    fn timers(&self) -> std::sync::MutexGuard<'_, Timers> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn flush(&self) -> FlushOutcome {
        let events = {
            let mut queue = self.queue.lock().await;
            if queue.is_empty() {
                return FlushOutcome::Empty;
            }
            std::mem::take(&mut *queue)
        };

        let batch = EventBatch { events };
        let count = batch.len();

        match self.transport.send(&batch).await {
            Ok(()) => {
                debug!(count, video_id = %self.video_id, "Analytics events flushed");
                FlushOutcome::Delivered(count)
            }
            Err(e) => {
                warn!(count, error = %e, "Failed to send analytics events, requeueing");
                let mut queue = self.queue.lock().await;
                let newer = std::mem::replace(&mut *queue, batch.events);
                queue.extend(newer);
                FlushOutcome::Requeued(count)
            }
        }
    }

    /// Run a flush on its own task so timer restarts never cancel a send
    fn spawn_flush(self: &Arc<Self>, runtime: &Handle) {
        let shared = Arc::clone(self);
        runtime.spawn(async move {
            shared.flush().await;
        });
    }

    fn restart_debounce(self: &Arc<Self>, runtime: &Handle) {
        let weak = Arc::downgrade(self);
        let delay = self.config.debounce();
        let runtime_for_flush = runtime.clone();

        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = weak.upgrade() {
                trace!("Debounce elapsed");
                shared.spawn_flush(&runtime_for_flush);
            }
        });

        if let Some(previous) = self.timers().debounce.replace(task) {
            previous.abort();
        }
    }

    fn start_periodic(self: &Arc<Self>, runtime: &Handle) {
        let weak: Weak<Shared> = Arc::downgrade(self);
        let period = self.config.flush_interval();
        let runtime_for_flush = runtime.clone();

        let task = runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                trace!("Periodic analytics flush");
                shared.spawn_flush(&runtime_for_flush);
            }
        });

        self.timers().periodic = Some(task);
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let events = std::mem::take(self.queue.get_mut());
        if !events.is_empty() {
            debug!(count = events.len(), "Beaconing analytics events on drop");
            self.transport.beacon(EventBatch { events });
        }
    }
}

/// Per-video analytics pipeline
///
/// Owned by the player controller; one pipeline per target video.
pub struct AnalyticsPipeline {
    shared: Arc<Shared>,
}

impl AnalyticsPipeline {
    /// Create a pipeline and start its periodic flush timer
    ///
    /// Without a tokio runtime no timers are scheduled; events still queue
    /// and can be delivered with [`flush_events`](Self::flush_events).
    pub fn new(
        video_id: impl Into<String>,
        session_id: SessionId,
        config: AnalyticsConfig,
        transport: Arc<dyn AnalyticsTransport>,
        context: Arc<dyn ClientContextSource>,
    ) -> Self {
        let shared = Arc::new(Shared {
            video_id: video_id.into(),
            session_id,
            config,
            transport,
            context,
            queue: Mutex::new(Vec::new()),
            tracking: Mutex::new(Tracking::default()),
            timers: StdMutex::new(Timers::default()),
            closed: AtomicBool::new(false),
        });

        match Handle::try_current() {
            Ok(runtime) => shared.start_periodic(&runtime),
            Err(_) => debug!("No tokio runtime, analytics timers disabled"),
        }

        Self { shared }
    }

    pub fn video_id(&self) -> &str {
        &self.shared.video_id
    }

    pub fn session_id(&self) -> SessionId {
        self.shared.session_id
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Snapshot of the events waiting for delivery
    pub async fn pending_events(&self) -> Vec<AnalyticsEvent> {
        self.shared.queue.lock().await.clone()
    }

    pub async fn queue_len(&self) -> usize {
        self.shared.queue.lock().await.len()
    }

    async fn enqueue(&self, event_type: EventType, mut data: Map<String, Value>) {
        if self.is_closed() {
            debug!(event = %event_type, "Pipeline torn down, dropping event");
            return;
        }

        self.shared.context.snapshot().apply(&mut data);
        let event = AnalyticsEvent {
            event_type,
            video_id: Some(self.shared.video_id.clone()),
            session_id: self.shared.session_id,
            timestamp: Utc::now(),
            data,
        };

        let queued = {
            let mut queue = self.shared.queue.lock().await;
            queue.push(event);
            queue.len()
        };
        trace!(event = %event_type, queued, "Analytics event queued");

        let Ok(runtime) = Handle::try_current() else {
            return;
        };
        self.shared.restart_debounce(&runtime);
        if queued >= self.shared.config.max_queue_size {
            debug!(queued, "Analytics queue full, flushing");
            self.shared.spawn_flush(&runtime);
        }
    }

    /// Record the view; only the first call per pipeline enqueues
    pub async fn track_view(&self) {
        {
            let mut tracking = self.shared.tracking.lock().await;
            if tracking.view_tracked {
                return;
            }
            tracking.view_tracked = true;
        }

        let data = object(json!({
            "video_id": self.shared.video_id,
            "view_start_time": Utc::now().timestamp_millis(),
        }));
        self.enqueue(EventType::VideoView, data).await;
    }

    /// Report milestones and retention buckets reached at `current_time`
    pub async fn track_progress(&self, current_time: f64, duration: f64) {
        let marks = self
            .shared
            .tracking
            .lock()
            .await
            .progress
            .observe(current_time, duration);

        for mark in marks {
            let (event_type, data) = match mark {
                ProgressMark::Milestone(percent) => (
                    EventType::VideoProgress,
                    json!({
                        "video_id": self.shared.video_id,
                        "progress_percent": percent,
                        "current_time": current_time,
                        "duration": duration,
                    }),
                ),
                ProgressMark::Retention(bucket) => (
                    EventType::VideoRetention,
                    json!({
                        "video_id": self.shared.video_id,
                        "time_marker": bucket,
                        "current_time": current_time,
                        "duration": duration,
                        "retention_rate": current_time / duration,
                    }),
                ),
            };
            self.enqueue(event_type, object(data)).await;
        }
    }

    pub async fn track_interaction(&self, interaction: &str, data: Value) {
        self.track_typed(EventType::VideoInteraction, "interaction_type", interaction, data)
            .await;
    }

    pub async fn track_engagement(&self, engagement: &str, data: Value) {
        self.track_typed(EventType::VideoEngagement, "engagement_type", engagement, data)
            .await;
    }

    pub async fn track_error(&self, error: &str, data: Value) {
        self.track_typed(EventType::VideoError, "error_type", error, data)
            .await;
    }

    async fn track_typed(&self, event_type: EventType, key: &str, kind: &str, data: Value) {
        let mut payload = Map::new();
        payload.insert("video_id".into(), json!(self.shared.video_id));
        payload.insert(key.into(), json!(kind));
        payload.extend(object(data));
        self.enqueue(event_type, payload).await;
    }

    /// Deliver everything queued as one batch
    #[instrument(skip(self), fields(video_id = %self.shared.video_id))]
    pub async fn flush_events(&self) -> FlushOutcome {
        self.shared.flush().await
    }

    /// Cancel timers and beacon the remaining queue; later tracking is ignored
    pub async fn teardown(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.timers().abort_all();

        let events = std::mem::take(&mut *self.shared.queue.lock().await);
        info!(
            video_id = %self.shared.video_id,
            remaining = events.len(),
            "Analytics pipeline torn down"
        );
        if !events.is_empty() {
            self.shared.transport.beacon(EventBatch { events });
        }
    }
}

impl Drop for AnalyticsPipeline {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.timers().abort_all();
    }
}

/// Page-level analytics outside any player
///
/// Each event is sent on its own as soon as it is tracked. Page views carry
/// the instance session id; search events are each sent under a new one.
pub struct PageAnalytics {
    session_id: SessionId,
    transport: Arc<dyn AnalyticsTransport>,
    context: Arc<dyn ClientContextSource>,
}

impl PageAnalytics {
    pub fn new(transport: Arc<dyn AnalyticsTransport>, context: Arc<dyn ClientContextSource>) -> Self {
        Self {
            session_id: SessionId::new(),
            transport,
            context,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub async fn track_page_view(&self, page_name: &str) {
        let mut data = object(json!({ "page_name": page_name }));
        self.context.snapshot().apply(&mut data);
        self.send(EventType::PageView, self.session_id, data).await;
    }

    pub async fn track_search(&self, query: &str, results_count: usize, filters: Value) {
        let filters = if filters.is_null() { json!({}) } else { filters };
        let data = object(json!({
            "search_query": query,
            "results_count": results_count,
            "filters": filters,
            "page_url": self.context.snapshot().page_url,
        }));
        self.send(EventType::Search, SessionId::new(), data).await;
    }

    pub async fn track_search_click(&self, query: &str, video_id: &str, position: usize) {
        let data = object(json!({
            "search_query": query,
            "video_id": video_id,
            "click_position": position,
            "page_url": self.context.snapshot().page_url,
        }));
        self.send(EventType::SearchClick, SessionId::new(), data).await;
    }

    async fn send(&self, event_type: EventType, session_id: SessionId, data: Map<String, Value>) {
        let batch = EventBatch {
            events: vec![AnalyticsEvent {
                event_type,
                video_id: None,
                session_id,
                timestamp: Utc::now(),
                data,
            }],
        };

        if let Err(e) = self.transport.send(&batch).await {
            warn!(event = %event_type, error = %e, "Failed to send page analytics");
        }
    }
}

/// Payload map from a JSON value; non-objects are nested under "value"
fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".into(), other);
            map
        }
    }
}
