use serde::Deserialize;

/// Body of an iTunes `lookup` response.
#[derive(Debug, Deserialize)]
pub(crate) struct LookupResponse {
    #[serde(default)]
    pub results: Vec<LookupResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LookupResult {
    pub track_id: Option<u64>,
    pub track_name: Option<String>,
    pub user_rating_count: Option<u64>,
    pub bundle_id: Option<String>,
}
