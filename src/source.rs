//! 骨格フレームの配信口
//!
//! センサー側スレッドが `FrameBus::publish` でフレームを流し、
//! パイプライン側は `Subscription` から1フレームずつ受け取る。

use parking_lot::Mutex;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Weak};

use crate::skeleton::Frame;

struct Subscriber {
    id: u64,
    tx: Sender<Frame>,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subscribers: Vec<Subscriber>,
}

/// 購読者全員にフレームを配る
#[derive(Clone, Default)]
pub struct FrameBus {
    inner: Arc<Mutex<BusInner>>,
}

impl FrameBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel();
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push(Subscriber { id, tx });
        tracing::debug!(id, "frame subscription opened");
        Subscription {
            id,
            rx,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// 届いた購読者数を返す。受信側が消えた購読は取り除く
    pub fn publish(&self, frame: Frame) -> usize {
        let mut inner = self.inner.lock();
        inner
            .subscribers
            .retain(|s| s.tx.send(frame.clone()).is_ok());
        inner.subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }
}

/// 1購読分の受信口。drop で購読解除
pub struct Subscription {
    id: u64,
    rx: Receiver<Frame>,
    bus: Weak<Mutex<BusInner>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// フレームが来るまで待つ。配信元がなくなれば None
    pub fn recv(&self) -> Option<Frame> {
        self.rx.recv().ok()
    }

    /// 溜まっていれば1フレーム
    pub fn try_recv(&self) -> Option<Frame> {
        match self.rx.try_recv() {
            Ok(frame) => Some(frame),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.lock().subscribers.retain(|s| s.id != self.id);
            tracing::debug!(id = self.id, "frame subscription closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::Skeleton;
    use std::thread;

    #[test]
    fn test_publish_reaches_all_subscribers() {
        let bus = FrameBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();
        assert_eq!(bus.publish(Frame::single(Skeleton::tracked())), 2);
        assert!(a.try_recv().is_some());
        assert!(b.try_recv().is_some());
        assert!(a.try_recv().is_none());
    }

    #[test]
    fn test_unsubscribe_removes_subscriber() {
        let bus = FrameBus::new();
        let a = bus.subscribe();
        let _b = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
        a.unsubscribe();
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(bus.publish(Frame::default()), 1);
    }

    #[test]
    fn test_recv_ends_when_bus_dropped() {
        let bus = FrameBus::new();
        let sub = bus.subscribe();
        let handle = thread::spawn(move || {
            bus.publish(Frame::default());
            bus.publish(Frame::default());
        });
        handle.join().unwrap();
        assert!(sub.recv().is_some());
        assert!(sub.recv().is_some());
        assert!(sub.recv().is_none());
    }

    #[test]
    fn test_frames_arrive_in_order() {
        let bus = FrameBus::new();
        let sub = bus.subscribe();
        for i in 0..3 {
            let skeleton = Skeleton::tracked().with_confidence(i as f32);
            bus.publish(Frame::single(skeleton));
        }
        let order: Vec<f32> = (0..3)
            .filter_map(|_| sub.try_recv())
            .map(|f| f.skeletons[0].confidence)
            .collect();
        assert_eq!(order, vec![0.0, 1.0, 2.0]);
    }
}
