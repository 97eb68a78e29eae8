//! The labelled fenced-block wire format.
//!
//! Calls and results travel inside fenced code blocks whose info string is a
//! protocol label, one JSON object per block:
//!
//! ````text
//! ```function_call
//! { "id": "1", "function": "fetch_weather", "parameters": { "place": "Pune" } }
//! ```
//! ````
//!
//! The formatter is the structural inverse of the parser: same fence and
//! label grammar, same one-object-per-block rule, so a re-parse of formatted
//! output — including by a differently-implemented peer — recovers identical
//! id/payload pairs. Call blocks and result blocks use distinct labels so a
//! full-transcript re-parse cannot mistake one for the other.
//!
//! Blocks with any other label (prose code samples, say) are ignored. A
//! malformed JSON body inside a labelled block is reported and skipped;
//! sibling blocks are unaffected. The parsed order is the left-to-right
//! order of appearance, which is advisory only — execution makes no ordering
//! promise and results carry their ids for correlation.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use colloquy_common::{FunctionCall, FunctionResult};

/// Info-string label for call blocks (model → engine).
pub const CALL_LABEL: &str = "function_call";

/// Info-string label for result blocks (engine → model).
pub const RESULT_LABEL: &str = "function_output";

static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"(?ms)^```([A-Za-z_][A-Za-z0-9_.-]*)[ \t]*\r?\n(.*?)^```[ \t]*$")
        .expect("block pattern is a valid regex")
});

/// A recoverable problem with one block in a parse batch.
///
/// These never abort the batch: one bad block must not discard valid
/// sibling calls.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The block's body was not a deserializable JSON object. The block is
    /// dropped.
    #[error("malformed block #{ordinal} at byte {offset}: {reason}")]
    MalformedCall {
        /// Zero-based index among same-labelled blocks, left to right.
        ordinal: usize,
        /// Byte offset of the block's opening fence in the scanned text.
        offset: usize,
        /// The deserialization failure.
        reason: String,
    },

    /// The block repeats an id already seen in this batch. The first
    /// occurrence stands; this one is dropped.
    #[error("duplicate call id '{id}' in block #{ordinal}")]
    DuplicateCallId {
        /// The repeated id.
        id: String,
        /// Zero-based index among same-labelled blocks, left to right.
        ordinal: usize,
    },
}

/// Outcome of scanning text for call blocks.
#[derive(Debug, Default)]
pub struct ParsedCalls {
    /// Accepted calls, in order of appearance.
    pub calls: Vec<FunctionCall>,
    /// Problems with dropped blocks.
    pub errors: Vec<ParseError>,
}

/// Outcome of scanning text for result blocks.
#[derive(Debug, Default)]
pub struct ParsedResults {
    /// Accepted results, in order of appearance.
    pub results: Vec<FunctionResult>,
    /// Problems with dropped blocks.
    pub errors: Vec<ParseError>,
}

struct Block<'a> {
    ordinal: usize,
    offset: usize,
    body: &'a str,
}

fn scan_blocks<'a>(text: &'a str, label: &str) -> Vec<Block<'a>> {
    let mut ordinal = 0;
    let mut blocks = Vec::new();
    for captures in BLOCK_RE.captures_iter(text) {
        let Some(found) = captures.get(1) else { continue };
        if found.as_str() != label {
            continue;
        }
        let Some(body) = captures.get(2) else { continue };
        let Some(whole) = captures.get(0) else { continue };
        blocks.push(Block {
            ordinal,
            offset: whole.start(),
            body: body.as_str().trim_end_matches(['\r', '\n']),
        });
        ordinal += 1;
    }
    blocks
}

/// Extracts function calls from free-form model output.
///
/// Scans for `function_call` blocks and deserializes each body. Malformed
/// bodies and repeated ids are reported in [`ParsedCalls::errors`] without
/// affecting sibling blocks.
#[must_use]
pub fn parse_calls(text: &str) -> ParsedCalls {
    let mut parsed = ParsedCalls::default();
    let mut seen: HashSet<String> = HashSet::new();

    for block in scan_blocks(text, CALL_LABEL) {
        match serde_json::from_str::<FunctionCall>(block.body) {
            Ok(call) => {
                if seen.contains(&call.id) {
                    parsed.errors.push(ParseError::DuplicateCallId {
                        id: call.id,
                        ordinal: block.ordinal,
                    });
                } else {
                    seen.insert(call.id.clone());
                    parsed.calls.push(call);
                }
            }
            Err(e) => parsed.errors.push(ParseError::MalformedCall {
                ordinal: block.ordinal,
                offset: block.offset,
                reason: e.to_string(),
            }),
        }
    }

    parsed
}

/// Extracts function results from text, the inverse of [`format_results`].
#[must_use]
pub fn parse_results(text: &str) -> ParsedResults {
    let mut parsed = ParsedResults::default();
    let mut seen: HashSet<String> = HashSet::new();

    for block in scan_blocks(text, RESULT_LABEL) {
        match serde_json::from_str::<FunctionResult>(block.body) {
            Ok(result) => {
                if seen.contains(&result.id) {
                    parsed.errors.push(ParseError::DuplicateCallId {
                        id: result.id,
                        ordinal: block.ordinal,
                    });
                } else {
                    seen.insert(result.id.clone());
                    parsed.results.push(result);
                }
            }
            Err(e) => parsed.errors.push(ParseError::MalformedCall {
                ordinal: block.ordinal,
                offset: block.offset,
                reason: e.to_string(),
            }),
        }
    }

    parsed
}

/// Renders results as `function_output` blocks, in the given order.
///
/// The caller supplies completion order; this function preserves it.
///
/// # Errors
///
/// Returns a `serde_json::Error` if a result fails to serialize (not
/// expected for well-formed values).
pub fn format_results(results: &[FunctionResult]) -> Result<String, serde_json::Error> {
    let mut blocks = Vec::with_capacity(results.len());
    for result in results {
        blocks.push(format!(
            "```{RESULT_LABEL}\n{}\n```",
            serde_json::to_string(result)?
        ));
    }
    Ok(blocks.join("\n\n"))
}

/// Renders calls as `function_call` blocks, in the given order.
///
/// Useful for drivers that replay calls and for discovery material; the
/// model-facing inverse of [`parse_calls`].
///
/// # Errors
///
/// Returns a `serde_json::Error` if a call fails to serialize.
pub fn format_calls(calls: &[FunctionCall]) -> Result<String, serde_json::Error> {
    let mut blocks = Vec::with_capacity(calls.len());
    for call in calls {
        blocks.push(format!(
            "```{CALL_LABEL}\n{}\n```",
            serde_json::to_string(call)?
        ));
    }
    Ok(blocks.join("\n\n"))
}
