use async_trait::async_trait;
use serde_json::Value;

use crate::infrastructure::error::InfrastructureError;

pub const TWEETS_COLLECTION: &str = "tweets";
pub const PROFILES_COLLECTION: &str = "profiles";

// 外部ドキュメントストアの契約。実体はコンストラクタ経由で注入する
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore {
    async fn create(&self, collection: &str, document: Value) -> Result<String, InfrastructureError>;

    // 既存フィールドは残したまま上書きマージ
    async fn merge(&self, collection: &str, id: &str, document: Value) -> Result<(), InfrastructureError>;
}
