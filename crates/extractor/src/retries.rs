//! Retry behavior of the HTTP transport towards the node.

use std::time::Duration;

use alloy::transports::{
    RpcError, TransportError,
    layers::{RetryBackoffLayer, RetryPolicy},
};
use alloy_json_rpc::ErrorPayload;
use serde::Deserialize;

/// Retries attempted before a request error is surfaced to the caller.
const MAX_RETRIES: u32 = 8;
/// First backoff step; later steps grow from here.
const INITIAL_BACKOFF_MS: u64 = 50;
/// Compute-unit budget assumed when a rate-limited response carries no hint.
const COMPUTE_UNITS_PER_SECOND: u64 = 100;

/// Retry layer installed on the RPC client. Backs off on rate limits and
/// transient transport failures, including the refused connections seen while
/// the node restarts.
pub(crate) const fn retry_layer() -> RetryBackoffLayer<NodeRetryPolicy> {
    RetryBackoffLayer::new_with_policy(
        MAX_RETRIES,
        INITIAL_BACKOFF_MS,
        COMPUTE_UNITS_PER_SECOND,
        NodeRetryPolicy,
    )
}

/// Policy deciding which node errors are worth retrying.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeRetryPolicy;

impl RetryPolicy for NodeRetryPolicy {
    fn should_retry(&self, error: &TransportError) -> bool {
        match error {
            RpcError::Transport(kind) => kind.is_retry_err() || connection_refused(kind),
            RpcError::ErrorResp(payload) => payload.is_retry_err(),
            // A null result with no error: the node is still catching up.
            RpcError::NullResp => true,
            // Overloaded providers emit error bodies that are not valid
            // JSON-RPC envelopes; sniff those before giving up.
            RpcError::DeserError { text, .. } => retryable_error_text(text),
            _ => false,
        }
    }

    fn backoff_hint(&self, error: &TransportError) -> Option<Duration> {
        let RpcError::ErrorResp(payload) = error else { return None };
        let data = payload.try_data_as::<serde_json::Value>()?.ok()?;
        // Infura's daily rate limit spells out the wait in the error data.
        let seconds = &data["rate"]["backoff_seconds"];
        if let Some(whole) = seconds.as_u64() {
            return Some(Duration::from_secs(whole));
        }
        seconds.as_f64().map(|secs| Duration::from_secs(secs as u64 + 1))
    }
}

/// Decide retryability from a response body that failed envelope
/// deserialization.
fn retryable_error_text(text: &str) -> bool {
    if let Ok(payload) = serde_json::from_str::<ErrorPayload>(text) {
        return payload.is_retry_err();
    }

    // Some providers drop the `id` field in error responses; the payload
    // itself is still well formed under an `error` key.
    #[derive(Deserialize)]
    struct Wrapper {
        error: ErrorPayload,
    }
    serde_json::from_str::<Wrapper>(text).is_ok_and(|wrapper| wrapper.error.is_retry_err())
}

/// Whether the transport failed because the node refused the connection.
fn connection_refused(err: impl std::fmt::Display) -> bool {
    err.to_string().to_lowercase().contains("connection refused")
}
