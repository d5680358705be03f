pub mod executions;
pub mod webhooks;
