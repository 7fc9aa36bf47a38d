//! Per-widget refresh timers.
//!
//! Every scheduled widget gets its own tokio task that fetches once right
//! away and then on each tick of its interval. Fetches run in their own
//! tasks and report back over a channel tagged with the generation of the
//! timer that started them. Rescheduling or cancelling a widget bumps or
//! drops its generation, so late results from an old configuration can be
//! recognised and discarded by the consumer.

use crate::binding::WidgetBindingService;
use crate::error::FetchError;
use crate::widget::WidgetConfig;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RefreshUpdate {
    pub widget_id: String,
    pub generation: u64,
    pub result: Result<Value, FetchError>,
}

struct Timer {
    generation: u64,
    url: String,
    handle: JoinHandle<()>,
}

pub struct RefreshScheduler {
    binding: WidgetBindingService,
    tx: UnboundedSender<RefreshUpdate>,
    timers: HashMap<String, Timer>,
    next_generation: u64,
}

impl RefreshScheduler {
    pub fn new(binding: WidgetBindingService) -> (Self, UnboundedReceiver<RefreshUpdate>) {
        let (tx, rx) = unbounded_channel();
        let scheduler = RefreshScheduler {
            binding,
            tx,
            timers: HashMap::new(),
            next_generation: 0,
        };
        (scheduler, rx)
    }

    /// Start (or restart) the timer for `widget`. Returns the new generation.
    pub fn schedule(&mut self, widget: &WidgetConfig) -> u64 {
        self.cancel(&widget.id);
        self.next_generation += 1;
        let generation = self.next_generation;

        let handle = tokio::spawn(run_timer(
            self.binding.clone(),
            self.tx.clone(),
            widget.id.clone(),
            widget.api_url.clone(),
            widget.refresh_interval,
            generation,
        ));
        debug!(
            widget_id = %widget.id,
            generation,
            interval = widget.refresh_interval,
            "refresh_scheduled"
        );
        self.timers.insert(
            widget.id.clone(),
            Timer {
                generation,
                url: widget.api_url.clone(),
                handle,
            },
        );
        generation
    }

    /// Stop the widget's timer. Fetches already in flight still finish,
    /// but their updates are no longer current.
    pub fn cancel(&mut self, widget_id: &str) -> bool {
        match self.timers.remove(widget_id) {
            Some(timer) => {
                timer.handle.abort();
                debug!(widget_id = %widget_id, generation = timer.generation, "refresh_cancelled");
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.handle.abort();
        }
    }

    /// Fetch a scheduled widget now, outside its timer.
    pub fn refresh_now(&self, widget_id: &str) -> bool {
        match self.timers.get(widget_id) {
            Some(timer) => {
                spawn_fetch(
                    self.binding.clone(),
                    self.tx.clone(),
                    widget_id.to_string(),
                    timer.url.clone(),
                    timer.generation,
                );
                true
            }
            None => false,
        }
    }

    /// Drop cached responses so the next fetches hit the network.
    pub fn clear_cache(&self) {
        self.binding.clear_cache();
    }

    /// Whether `update` came from the widget's live configuration.
    pub fn is_current(&self, update: &RefreshUpdate) -> bool {
        self.timers
            .get(&update.widget_id)
            .is_some_and(|t| t.generation == update.generation)
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

async fn run_timer(
    binding: WidgetBindingService,
    tx: UnboundedSender<RefreshUpdate>,
    widget_id: String,
    url: String,
    interval_secs: u64,
    generation: u64,
) {
    spawn_fetch(binding.clone(), tx.clone(), widget_id.clone(), url.clone(), generation);
    if interval_secs == 0 {
        return;
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    // the first tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        spawn_fetch(binding.clone(), tx.clone(), widget_id.clone(), url.clone(), generation);
    }
}

fn spawn_fetch(
    binding: WidgetBindingService,
    tx: UnboundedSender<RefreshUpdate>,
    widget_id: String,
    url: String,
    generation: u64,
) {
    tokio::spawn(async move {
        let result = binding.fetch_widget_data(&url).await;
        // receiver gone means the dashboard is shutting down
        let _ = tx.send(RefreshUpdate {
            widget_id,
            generation,
            result,
        });
    });
}
