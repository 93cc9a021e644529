mod gateway;

pub use gateway::GatewayError;

pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}
