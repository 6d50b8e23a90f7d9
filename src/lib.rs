pub mod analysis_store;
pub mod app;
pub mod auth;
pub mod db;
pub mod environment;
pub mod logging;
pub mod pipeline;
pub mod scheduler;
pub mod util;
pub mod workflow;

pub const TARGET_WEB_REQUEST: &str = "web_request";
pub const TARGET_WORKFLOW_REQUEST: &str = "workflow_request";
pub const TARGET_DB: &str = "db_query";
