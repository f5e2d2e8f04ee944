use std::sync::Arc;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::error::ApplicationError;
use super::normalizer_service::NormalizerService;
use crate::domain::budget::EncodingBudget;
use crate::domain::document_store::{DocumentStore, PROFILES_COLLECTION};
use crate::domain::image::{NormalizedImage, RawImageInput};
use crate::domain::profile::ProfileRecord;
use crate::domain::tweet::Author;
use crate::infrastructure::error::InfrastructureError;

pub struct AvatarEditor {
    normalizer: Arc<NormalizerService>,
    store: Arc<dyn DocumentStore + Send + Sync>,
    budget: EncodingBudget,
}

impl AvatarEditor {
    pub fn new(
        normalizer: Arc<NormalizerService>,
        store: Arc<dyn DocumentStore + Send + Sync>,
        budget: EncodingBudget,
    ) -> Self {
        Self {
            normalizer,
            store,
            budget,
        }
    }

    pub async fn update_avatar(
        &self,
        author: &Author,
        input: RawImageInput,
        cancel: &CancellationToken,
    ) -> Result<NormalizedImage, ApplicationError> {
        let image = self.normalizer.normalize(input, self.budget, cancel).await?;
        let record = ProfileRecord {
            avatar: image.to_data_uri(),
            updated_at: Utc::now().timestamp_millis(),
            user_id: author.user_id.clone(),
        };
        let document = serde_json::to_value(&record).map_err(InfrastructureError::from)?;
        self.store
            .merge(PROFILES_COLLECTION, &author.user_id, document)
            .await?;
        info!(user_id = %author.user_id, bytes = image.encoded_byte_size, "avatar updated");
        Ok(image)
    }
}
