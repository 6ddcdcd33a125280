use async_trait::async_trait;

use crate::error::BackendError;
use crate::types::Invocation;

/// An interchangeable execution backend that performs the actual fix.
///
/// Implementations classify their own failures: the router's failover
/// policy acts purely on the `BackendError` variant.
#[async_trait]
pub trait FixBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Run one fix attempt. `session_id` resumes a previous stateful
    /// conversation when the backend supports it.
    async fn invoke(
        &self,
        prompt: &str,
        session_id: Option<&str>,
    ) -> Result<Invocation, BackendError>;
}
