//! Tolerant JSON decoding for model responses.
//!
//! Model output is assumed to be mostly JSON but may carry surrounding prose
//! or code fences. Decoding locates the JSON span first, then deserializes;
//! the two failure modes are kept distinct so callers can tell "no JSON at
//! all" from "JSON of the wrong shape".

use serde::de::DeserializeOwned;

use crate::errors::{EpigraphError, Result};
use crate::utils::text::{extract_json_from_response, truncate_with_ellipsis};

/// How much of the offending span to carry in validation errors.
const EXCERPT_LEN: usize = 80;

/// Decode a model response into `T`.
///
/// `context` names the requesting step ("entity extraction", "dedup", …) and
/// appears in both error variants:
/// - [`EpigraphError::ModelOutput`] — no JSON span found (parse error),
/// - [`EpigraphError::ModelValidation`] — span found, shape mismatch; the
///   message names the failing field and carries a short excerpt.
pub fn parse_llm_json<T: DeserializeOwned>(context: &'static str, response: &str) -> Result<T> {
    let span = extract_json_from_response(response)
        .ok_or(EpigraphError::ModelOutput { context })?;

    serde_json::from_str(span).map_err(|e| EpigraphError::ModelValidation {
        context,
        message: e.to_string(),
        excerpt: truncate_with_ellipsis(span, EXCERPT_LEN),
    })
}
