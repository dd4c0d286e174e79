pub mod health;
pub mod metrics;
pub mod response;
pub mod users;
