pub mod admin;
pub mod chat;
pub mod cims;
pub mod documents;
pub mod liveness;
pub mod readiness;
pub mod search;
pub mod webhooks;
