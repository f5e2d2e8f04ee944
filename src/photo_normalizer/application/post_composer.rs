use std::sync::Arc;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::ApplicationError;
use super::normalizer_service::NormalizerService;
use super::pending::PendingImage;
use crate::domain::budget::EncodingBudget;
use crate::domain::document_store::{DocumentStore, TWEETS_COLLECTION};
use crate::domain::image::RawImageInput;
use crate::domain::tweet::{Author, TweetRecord, TweetText};
use crate::infrastructure::error::InfrastructureError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    Attached,
    // 確認ダイアログで拒否された
    Declined,
    // 後から選ばれた画像に置き換えられた
    Superseded,
}

// 投稿フォーム一つ分の状態。添付画像は送信まで保留される
pub struct PostComposer {
    normalizer: Arc<NormalizerService>,
    store: Arc<dyn DocumentStore + Send + Sync>,
    budget: EncodingBudget,
    pending: PendingImage,
}

impl PostComposer {
    pub fn new(
        normalizer: Arc<NormalizerService>,
        store: Arc<dyn DocumentStore + Send + Sync>,
        budget: EncodingBudget,
    ) -> Self {
        Self {
            normalizer,
            store,
            budget,
            pending: PendingImage::new(),
        }
    }

    /// `confirm` is asked only when the raw file is already at or above the byte budget.
    pub async fn attach_photo<F>(
        &self,
        input: RawImageInput,
        confirm: F,
        cancel: &CancellationToken,
    ) -> Result<AttachOutcome, ApplicationError>
    where
        F: FnOnce(&RawImageInput) -> bool,
    {
        if input.byte_len() >= self.budget.max_bytes() && !confirm(&input) {
            info!(bytes = input.byte_len(), "compression declined, photo not attached");
            return Ok(AttachOutcome::Declined);
        }

        let ticket = self.pending.begin();
        let image = self.normalizer.normalize(input, self.budget, cancel).await?;
        if self.pending.offer(ticket, image) {
            Ok(AttachOutcome::Attached)
        } else {
            debug!(?ticket, "dropping stale photo");
            Ok(AttachOutcome::Superseded)
        }
    }

    pub fn has_photo(&self) -> bool {
        self.pending.is_pending()
    }

    pub fn discard_photo(&self) {
        self.pending.discard();
    }

    pub async fn submit(&self, author: &Author, text: &str) -> Result<String, ApplicationError> {
        let text = TweetText::parse(text)?;
        let photo = self.pending.take();
        let record = TweetRecord::new(
            author,
            text,
            Utc::now().timestamp_millis(),
            photo.as_ref().map(|(_, image)| image.to_data_uri()),
        );
        let document = serde_json::to_value(&record).map_err(InfrastructureError::from)?;

        match self.store.create(TWEETS_COLLECTION, document).await {
            Ok(id) => {
                info!(%id, user_id = %author.user_id, with_photo = photo.is_some(), "tweet posted");
                Ok(id)
            }
            Err(e) => {
                warn!(error = %e, "failed to post tweet");
                if let Some((ticket, photo)) = photo {
                    if !self.pending.restore(ticket, photo) {
                        debug!(?ticket, "photo changed while posting, not restoring");
                    }
                }
                Err(e.into())
            }
        }
    }
}
