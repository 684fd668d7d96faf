pub mod error;
pub mod publish;
pub mod records;
pub mod resolver;
pub mod slug;
pub mod storage;
pub mod worker;

pub use error::ServiceError;

use std::future::Future;
use std::time::Duration;

/// Bounds a collaborator call. An elapsed timer is reported as an ordinary
/// error so the caller maps it to the failure of the current step.
pub(crate) async fn with_timeout<T, F>(timeout: Duration, what: &str, fut: F) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(res) => res,
        Err(_) => Err(anyhow::anyhow!("{} timed out after {:?}", what, timeout)),
    }
}
