use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    pub avatar: String,
    pub updated_at: i64,
    pub user_id: String,
}
