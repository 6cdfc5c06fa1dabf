use std::io;

use thiserror::Error;

use crate::params::FusedOpKind;
use crate::variants::VariantId;

/// Engine-level failures.
///
/// A request that a variant simply cannot run is not an error: validation
/// reports it as `false` / `Ok(None)`. These variants signal broken variant
/// metadata, a bad tuning table, or a request that slipped past validation.
#[derive(Debug, Error)]
pub enum SelectorError {
    #[error("jit constant '{name}' is defined twice")]
    DuplicateJitConstant { name: String },
    #[error("fused op {index} of kind {kind:?} is not supported by variant {variant:?}")]
    UnsupportedFusedOp {
        variant: VariantId,
        index: usize,
        kind: FusedOpKind,
    },
    #[error("tuned config {tile_x}x{tile_y}x{tile_f} is invalid for {variant:?}: {reason}")]
    InvalidTunedConfig {
        variant: VariantId,
        tile_x: usize,
        tile_y: usize,
        tile_f: usize,
        reason: String,
    },
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error("tuning table i/o error: {0}")]
    TuningTableIo(#[from] io::Error),
    #[error("tuning table format error: {0}")]
    TuningTableFormat(#[from] serde_json::Error),
    #[error("invalid value '{value}' for {name}")]
    InvalidOption { name: &'static str, value: String },
    #[error("failed to encode digest input: {0}")]
    Digest(#[from] bincode::Error),
}

impl SelectorError {
    pub fn malformed(message: impl Into<String>) -> Self {
        SelectorError::MalformedRequest(message.into())
    }
}

pub type SelectorResult<T> = Result<T, SelectorError>;
