//! Bounded-buffer discipline for requests and responses (spec §4.E, §9).

use crate::history::Turn;

/// Requests must fit in this bounded buffer before being sent.
pub const MAX_REQUEST_BYTES: usize = 12 * 1024;

/// Responses are read into a bounded buffer of this size; overflow yields
/// `LlmError::Truncated`.
pub const MAX_RESPONSE_BYTES: usize = 16 * 1024;

/// Drop oldest non-system turns from `history` until `encode(history)`
/// serializes to at most `MAX_REQUEST_BYTES`, never dropping the final
/// turn (the current user turn, or an in-flight tool-result turn).
///
/// Returns the (possibly shrunk) turn slice length actually used.
pub fn fit_request(
    history: &mut Vec<Turn>,
    encode: impl Fn(&[Turn]) -> serde_json::Value,
) -> serde_json::Value {
    loop {
        let encoded = encode(history);
        let size = serde_json::to_vec(&encoded).map(|v| v.len()).unwrap_or(usize::MAX);
        if size <= MAX_REQUEST_BYTES || history.len() <= 1 {
            return encoded;
        }
        history.remove(0);
    }
}
