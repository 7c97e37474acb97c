use std::future::Future;

use crate::models::Outcome;

/// Performs one GET against a URL and classifies the result.
///
/// Implementations must never fail: every transport error, timeout or
/// non-200 status is folded into [`Outcome::Dropped`].
pub trait Fetcher: Send + Sync + Clone + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Outcome> + Send;
}
