use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, warn};

use crate::bus::Publisher;

/// Shortest period a poller runs at.
pub const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Re-publishes a request on a fixed period while the link is up.
///
/// A request goes out as soon as the link (re)connects, then once per
/// `period`, which is raised to [`MIN_PERIOD`] when shorter. The task stops
/// when the poller is dropped.
#[derive(Debug)]
pub struct Poller {
    task: JoinHandle<()>,
}

impl Poller {
    pub fn spawn(
        publisher: Publisher,
        topic: impl Into<String>,
        payload: impl Into<String>,
        period: Duration,
    ) -> Self {
        let topic = topic.into();
        let payload = payload.into();
        if period < MIN_PERIOD {
            warn!("poll period {:?} for {} raised to {:?}", period, topic, MIN_PERIOD);
        }
        let period = period.max(MIN_PERIOD);
        let mut status = publisher.status();

        let task = tokio::spawn(async move {
            loop {
                if status.wait_for(|connected| *connected).await.is_err() {
                    return;
                }
                debug!("polling {} every {:?}", topic, period);

                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => publisher.publish(&topic, payload.clone()),
                        changed = status.changed() => {
                            if changed.is_err() {
                                return;
                            }
                            if !*status.borrow_and_update() {
                                break;
                            }
                            ticker.reset_immediately();
                        }
                    }
                }
            }
        });

        Self { task }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.task.abort();
    }
}
