//! 프로세스 내부 fan-out 허브.
//!
//! 업스트림 피드가 정규화한 틱을 등록된 모든 콜백에 동기적으로 전달합니다.
//!
//! - 발행 시점의 구독자 목록을 복사한 뒤 락 밖에서 콜백을 호출합니다
//!   (발행 중 구독/해제가 다른 구독자를 건너뛰거나 중복 전달하지 않음)
//! - 콜백 하나가 패닉해도 나머지 구독자에게는 계속 전달되며, 해당 구독은 유지됩니다
//! - 버퍼링하지 않습니다. 구독자가 없으면 틱은 버려집니다

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use tracing::{debug, warn};

use crate::types::NormalizedTick;

/// 틱 수신 콜백.
pub type TickCallback = Arc<dyn Fn(&NormalizedTick) + Send + Sync>;

/// 공유 허브 핸들.
pub type SharedFanoutHub = Arc<FanoutHub>;

struct HubInner {
    next_id: AtomicU64,
    subscribers: RwLock<Vec<(u64, TickCallback)>>,
}

impl HubInner {
    fn remove(&self, id: u64) -> bool {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        before != subscribers.len()
    }
}

/// 콜백 기반 pub/sub 허브.
pub struct FanoutHub {
    inner: Arc<HubInner>,
}

impl Default for FanoutHub {
    fn default() -> Self {
        Self::new()
    }
}

impl FanoutHub {
    /// 새로운 허브 생성.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                next_id: AtomicU64::new(1),
                subscribers: RwLock::new(Vec::new()),
            }),
        }
    }

    /// 공유 허브 생성.
    pub fn shared() -> SharedFanoutHub {
        Arc::new(Self::new())
    }

    /// 콜백을 등록하고 구독 핸들을 반환합니다.
    ///
    /// 핸들을 drop하면 자동으로 구독이 해제됩니다.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&NormalizedTick) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let callback: TickCallback = Arc::new(callback);
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, callback));

        debug!(subscriber_id = id, "Hub subscriber registered");

        Subscription {
            id,
            hub: Arc::downgrade(&self.inner),
            active: AtomicBool::new(true),
        }
    }

    /// 현재 구독자 모두에게 틱을 전달하고, 정상 처리된 콜백 수를 반환합니다.
    pub fn publish(&self, tick: &NormalizedTick) -> usize {
        let snapshot: Vec<(u64, TickCallback)> = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut delivered = 0;
        for (id, callback) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| callback(tick))) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    warn!(
                        subscriber_id = id,
                        symbol = %tick.symbol,
                        "Subscriber callback panicked, continuing fan-out"
                    );
                }
            }
        }
        delivered
    }

    /// 등록된 구독자 수.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// 허브 구독 핸들.
pub struct Subscription {
    id: u64,
    hub: Weak<HubInner>,
    active: AtomicBool,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// 구독을 해제합니다. 두 번째 호출부터는 아무 일도 하지 않습니다.
    ///
    /// 이번 호출에서 실제로 해제되었으면 `true`.
    pub fn unsubscribe(&self) -> bool {
        if !self.active.swap(false, Ordering::AcqRel) {
            return false;
        }
        match self.hub.upgrade() {
            Some(hub) => {
                let removed = hub.remove(self.id);
                debug!(subscriber_id = self.id, "Hub subscriber removed");
                removed
            }
            None => false,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
