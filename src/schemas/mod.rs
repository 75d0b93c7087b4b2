use std::collections::HashMap;

use serde::Serialize;

use crate::repositories::health::Backlog;

pub(crate) mod analysis;
pub(crate) mod diagnostic;
pub(crate) mod exam;
pub(crate) mod ocr;
pub(crate) mod parser;
pub(crate) mod review;

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) service: String,
    pub(crate) status: String,
    pub(crate) components: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) backlog: Option<Backlog>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RootResponse {
    pub(crate) message: String,
    pub(crate) version: String,
    pub(crate) docs_url: String,
}
