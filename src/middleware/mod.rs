//! HTTP middleware - request correlation and rate limiting

pub mod rate_limit;
pub mod request_id;

pub use rate_limit::RateLimitLayer;
pub use request_id::{request_id_middleware, RequestId};
