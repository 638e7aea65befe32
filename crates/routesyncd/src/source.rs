//! Route event sources
//!
//! A source pushes [`RouteChangeEvent`]s into a bounded channel in the order
//! the kernel produced them, until the stop token fires. The netlink source
//! lives in [`crate::netlink`]; [`FeedRouteSource`] replays events handed to
//! it in-process.

use crate::error::{Result, RoutesyncError};
use crate::types::RouteChangeEvent;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Subscription options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Replay every route already installed before live updates
    pub list_existing: bool,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            list_existing: true,
        }
    }
}

/// Producer of kernel route-change events
pub trait RouteEventSource: Send {
    /// Begin delivering events to `events`.
    ///
    /// Must be called from within a tokio runtime. Returns once the
    /// subscription is established; delivery continues on a background task
    /// until `stop` is cancelled or the receiver is dropped. A source can be
    /// subscribed once.
    fn subscribe(
        &mut self,
        events: mpsc::Sender<RouteChangeEvent>,
        stop: CancellationToken,
        options: SubscribeOptions,
    ) -> Result<()>;
}

/// Send one event, giving up if `stop` fires while the channel is full.
///
/// Returns false when delivery should end.
pub(crate) async fn forward(
    events: &mpsc::Sender<RouteChangeEvent>,
    stop: &CancellationToken,
    event: RouteChangeEvent,
) -> bool {
    tokio::select! {
        biased;
        _ = stop.cancelled() => false,
        sent = events.send(event) => sent.is_ok(),
    }
}

/// Handle for pushing live events into a [`FeedRouteSource`]
#[derive(Debug, Clone)]
pub struct RouteFeed {
    tx: mpsc::UnboundedSender<RouteChangeEvent>,
}

impl RouteFeed {
    /// Queue a live event; false once the source has shut down
    pub fn push(&self, event: RouteChangeEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// In-process route source.
///
/// Events given to [`with_existing`](Self::with_existing) play the role of
/// the initial table dump; events pushed through the paired [`RouteFeed`]
/// are live updates.
#[derive(Debug)]
pub struct FeedRouteSource {
    existing: Vec<RouteChangeEvent>,
    feed: Option<mpsc::UnboundedReceiver<RouteChangeEvent>>,
    failure: Option<String>,
}

impl FeedRouteSource {
    pub fn new() -> (Self, RouteFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = Self {
            existing: Vec::new(),
            feed: Some(rx),
            failure: None,
        };
        (source, RouteFeed { tx })
    }

    /// Routes reported as already installed at subscription time
    pub fn with_existing(mut self, existing: Vec<RouteChangeEvent>) -> Self {
        self.existing = existing;
        self
    }

    /// A source whose subscription is refused with `reason`
    pub fn failing(reason: impl Into<String>) -> Self {
        let (mut source, _) = Self::new();
        source.failure = Some(reason.into());
        source
    }
}

impl RouteEventSource for FeedRouteSource {
    fn subscribe(
        &mut self,
        events: mpsc::Sender<RouteChangeEvent>,
        stop: CancellationToken,
        options: SubscribeOptions,
    ) -> Result<()> {
        if let Some(reason) = &self.failure {
            return Err(RoutesyncError::Netlink(reason.clone()));
        }

        let mut feed = self
            .feed
            .take()
            .ok_or_else(|| RoutesyncError::Lifecycle("source already subscribed".into()))?;
        let existing = if options.list_existing {
            std::mem::take(&mut self.existing)
        } else {
            Vec::new()
        };

        debug!(existing = existing.len(), "Feed source subscribed");

        tokio::spawn(async move {
            for event in existing {
                if !forward(&events, &stop, event).await {
                    return;
                }
            }

            loop {
                let event = tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    event = feed.recv() => event,
                };

                match event {
                    Some(event) => {
                        if !forward(&events, &stop, event).await {
                            break;
                        }
                    }
                    None => break,
                }
            }

            trace!("Feed source finished");
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AddressFamily, RouteChangeType};
    use pretty_assertions::assert_eq;

    fn event(ifindex: u32) -> RouteChangeEvent {
        let mut event = RouteChangeEvent::new(RouteChangeType::New, AddressFamily::Ipv4);
        event.out_ifindex = ifindex;
        event
    }

    #[tokio::test]
    async fn test_existing_then_live_in_order() {
        let (source, feed) = FeedRouteSource::new();
        let mut source = source.with_existing(vec![event(1), event(2)]);
        let (tx, mut rx) = mpsc::channel(1);

        source
            .subscribe(tx, CancellationToken::new(), SubscribeOptions::default())
            .unwrap();
        assert!(feed.push(event(3)));

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(rx.recv().await.unwrap().out_ifindex);
        }
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_existing_skipped_without_list_existing() {
        let (source, feed) = FeedRouteSource::new();
        let mut source = source.with_existing(vec![event(1)]);
        let (tx, mut rx) = mpsc::channel(1);

        source
            .subscribe(
                tx,
                CancellationToken::new(),
                SubscribeOptions {
                    list_existing: false,
                },
            )
            .unwrap();
        feed.push(event(7));

        assert_eq!(rx.recv().await.unwrap().out_ifindex, 7);
    }

    #[tokio::test]
    async fn test_stop_closes_channel() {
        let (mut source, _feed) = FeedRouteSource::new();
        let (tx, mut rx) = mpsc::channel(1);
        let stop = CancellationToken::new();

        source
            .subscribe(tx, stop.clone(), SubscribeOptions::default())
            .unwrap();
        stop.cancel();

        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_subscribe_twice_rejected() {
        let (mut source, _feed) = FeedRouteSource::new();
        let (tx, _rx) = mpsc::channel(1);

        source
            .subscribe(tx.clone(), CancellationToken::new(), SubscribeOptions::default())
            .unwrap();
        let err = source
            .subscribe(tx, CancellationToken::new(), SubscribeOptions::default())
            .unwrap_err();
        assert!(matches!(err, RoutesyncError::Lifecycle(_)));
    }

    #[test]
    fn test_failing_source() {
        let mut source = FeedRouteSource::failing("permission denied");
        let (tx, _rx) = mpsc::channel(1);

        let err = source
            .subscribe(tx, CancellationToken::new(), SubscribeOptions::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "Netlink error: permission denied");
    }
}
