//! Blip transport.
//!
//! Sends are queued per topic and only leave the process on a flush, so the
//! robot sees every frame's blips as one batch as soon as the frame is done.

use std::collections::VecDeque;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::module::error::{Error, Result};
use crate::module::util::conf;
use crate::module::vision::Blip;

/// Publish/flush transport shared by every camera loop.
pub trait Network: Send + Sync {
    /// Open a sender for the given topic path.
    fn blip_sender(&self, path: &str) -> Result<Box<dyn BlipSink>>;

    /// Push everything sent so far on any topic, waiting a bounded time.
    fn flush(&self) -> Result<()>;
}

/// One topic's sending end.
pub trait BlipSink: Send {
    /// Queue one frame's blips with its capture delay. Atomic per call.
    fn send(&self, blips: Vec<Blip>, delay_us: u64) -> Result<()>;

    /// Push this topic's queued frames, waiting a bounded time.
    ///
    /// Fails when a frame of this topic was dropped, including one dropped by
    /// an earlier [`Network::flush`].
    fn flush(&self) -> Result<()>;
}

/// One frame's worth of blips as delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct Publication {
    pub path: String,
    pub blips: Vec<Blip>,
    pub delay_us: u64,
    pub published: DateTime<Utc>,
}

/// In-process transport delivering to a bounded channel.
///
/// The receiving end returned by [`LoopbackNetwork::new`] stands in for the
/// robot. When it stops draining, flush fails after the timeout instead of
/// stalling the camera loop.
pub struct LoopbackNetwork {
    link: Arc<Link>,
    topics: Mutex<Vec<Weak<Mutex<Topic>>>>,
}

/// Channel end shared by the network and its senders.
struct Link {
    tx: SyncSender<Publication>,
    timeout: Duration,
    flushing: Mutex<()>,
}

/// Frames queued on one topic.
#[derive(Default)]
struct Topic {
    pending: VecDeque<Publication>,
    lost: usize,
}

impl LoopbackNetwork {
    /// Creates the transport and the receiving end.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Publications the channel holds before flush has to wait.
    /// * `timeout` - Longest a flush waits for room.
    ///
    pub fn new(capacity: usize, timeout: Duration) -> (Self, Receiver<Publication>) {
        let (tx, rx) = sync_channel(capacity);
        let network = Self {
            link: Arc::new(Link {
                tx,
                timeout,
                flushing: Mutex::new(()),
            }),
            topics: Mutex::new(Vec::new()),
        };
        (network, rx)
    }

    /// Creates the transport from the `[network]` config section.
    pub fn from_conf(conf: &conf::Network) -> (Self, Receiver<Publication>) {
        Self::new(conf.capacity, Duration::from_millis(conf.flush_timeout_ms))
    }

    /// Publications sent but not yet flushed.
    pub fn pending(&self) -> usize {
        self.live_topics()
            .iter()
            .map(|topic| lock(topic).pending.len())
            .sum()
    }

    fn live_topics(&self) -> Vec<Arc<Mutex<Topic>>> {
        let mut topics = lock(&self.topics);
        topics.retain(|topic| topic.strong_count() > 0);
        topics.iter().filter_map(Weak::upgrade).collect()
    }
}

impl Network for LoopbackNetwork {
    fn blip_sender(&self, path: &str) -> Result<Box<dyn BlipSink>> {
        let topic = Arc::new(Mutex::new(Topic::default()));
        lock(&self.topics).push(Arc::downgrade(&topic));
        log::debug!("Opened blip sender on {}", path);
        Ok(Box::new(LoopbackSender {
            path: path.to_owned(),
            topic,
            link: Arc::clone(&self.link),
        }))
    }

    fn flush(&self) -> Result<()> {
        let _flushing = lock(&self.link.flushing);
        let deadline = Instant::now() + self.link.timeout;
        let mut res = Ok(());
        for topic in self.live_topics() {
            let batch = std::mem::take(&mut lock(&topic).pending);
            if let Err((e, dropped)) = self.link.deliver(batch, deadline) {
                // the owner hears about it on its own next flush
                lock(&topic).lost += dropped;
                if res.is_ok() {
                    res = Err(e);
                }
            }
        }
        res
    }
}

impl Link {
    /// Sends `batch` in order until `deadline`.
    ///
    /// On failure, also returns how many publications of the batch were dropped.
    fn deliver(
        &self,
        mut batch: VecDeque<Publication>,
        deadline: Instant,
    ) -> std::result::Result<(), (Error, usize)> {
        while let Some(mut publication) = batch.pop_front() {
            loop {
                match self.tx.try_send(publication) {
                    Ok(()) => break,
                    Err(TrySendError::Full(p)) => {
                        if Instant::now() >= deadline {
                            let dropped = batch.len() + 1;
                            log::warn!(
                                "Flush timed out, dropping {} publications of {}",
                                dropped,
                                p.path
                            );
                            return Err((Error::FlushTimeout(self.timeout), dropped));
                        }
                        publication = p;
                        thread::sleep(Duration::from_micros(200));
                    }
                    Err(TrySendError::Disconnected(_)) => {
                        return Err((Error::NetworkClosed, batch.len() + 1))
                    }
                }
            }
        }
        Ok(())
    }
}

struct LoopbackSender {
    path: String,
    topic: Arc<Mutex<Topic>>,
    link: Arc<Link>,
}

impl BlipSink for LoopbackSender {
    fn send(&self, blips: Vec<Blip>, delay_us: u64) -> Result<()> {
        lock(&self.topic).pending.push_back(Publication {
            path: self.path.clone(),
            blips,
            delay_us,
            published: Utc::now(),
        });
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let _flushing = lock(&self.link.flushing);
        let (batch, lost) = {
            let mut topic = lock(&self.topic);
            (
                std::mem::take(&mut topic.pending),
                std::mem::take(&mut topic.lost),
            )
        };
        let deadline = Instant::now() + self.link.timeout;
        self.link.deliver(batch, deadline).map_err(|(e, _)| e)?;
        if lost > 0 {
            log::warn!("{} earlier publications of {} were dropped", lost, self.path);
            return Err(Error::FlushTimeout(self.link.timeout));
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
