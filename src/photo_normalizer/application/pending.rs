use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::domain::image::NormalizedImage;

/// Identifies one normalization started against a [`PendingImage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

// 最後に開始した処理の結果だけを保持する (古い結果は捨てる)
#[derive(Debug, Default)]
pub struct PendingImage {
    latest: AtomicU64,
    slot: Mutex<Option<NormalizedImage>>,
}

impl PendingImage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> Ticket {
        Ticket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }

    /// Stores `image` if `ticket` is still the latest one; returns whether it was kept.
    pub fn offer(&self, ticket: Ticket, image: NormalizedImage) -> bool {
        let mut slot = self.lock();
        if !self.is_current(ticket) {
            return false;
        }
        *slot = Some(image);
        true
    }

    /// Moves the held image out, together with the ticket that was current at that moment.
    pub fn take(&self) -> Option<(Ticket, NormalizedImage)> {
        let mut slot = self.lock();
        let image = slot.take()?;
        Some((Ticket(self.latest.load(Ordering::SeqCst)), image))
    }

    // 保存に失敗した画像を戻す。take の後に discard や新しい処理があれば戻さない
    pub fn restore(&self, ticket: Ticket, image: NormalizedImage) -> bool {
        let mut slot = self.lock();
        if !self.is_current(ticket) || slot.is_some() {
            return false;
        }
        *slot = Some(image);
        true
    }

    // 途中の処理も無効にする
    pub fn discard(&self) {
        let mut slot = self.lock();
        self.latest.fetch_add(1, Ordering::SeqCst);
        *slot = None;
    }

    pub fn is_pending(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<NormalizedImage>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
