use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::capture::CaptureTarget;
use crate::train::{Train, TrainLayout};

/// The live train shown on screen. Its track animates on its own timer,
/// independent of anything that samples it.
pub struct TrainWidget {
    train: RwLock<Train>,
    tick: AtomicU64,
}

impl TrainWidget {
    pub fn new(train: Train) -> Arc<Self> {
        Arc::new(Self {
            train: RwLock::new(train),
            tick: AtomicU64::new(0),
        })
    }

    pub fn set_train(&self, train: Train) {
        *self.train.write().unwrap_or_else(|e| e.into_inner()) = train;
    }

    pub fn tick(&self) -> u64 {
        self.tick.load(Ordering::SeqCst)
    }

    pub fn advance(&self) {
        self.tick.fetch_add(1, Ordering::SeqCst);
    }

    pub fn layout(&self) -> TrainLayout {
        self.train
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .layout(self.tick())
    }

    /// Advances the track every `interval` until the handle is dropped.
    pub fn spawn_animation(self: &Arc<Self>, runtime: &Handle, interval: Duration) -> AnimationHandle {
        let widget = Arc::clone(self);
        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                widget.advance();
            }
        });
        debug!("Train animation started every {:?}", interval);
        AnimationHandle { task }
    }
}

impl CaptureTarget for TrainWidget {
    /// The widget lives as long as the app, so it is always available.
    fn snapshot(&self) -> Option<TrainLayout> {
        Some(self.layout())
    }
}

pub struct AnimationHandle {
    task: JoinHandle<()>,
}

impl Drop for AnimationHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
