//! Constant blocks contributed by fused post-operations.
//!
//! Each op gets a self-contained block prefixed `FUSED_OP{i}_`, so blocks
//! for two ops of the same kind never collide.

use crate::error::{SelectorError, SelectorResult};
use crate::jit::{tensor_constants, JitConstants};
use crate::params::{FusedConvEltwiseParams, FusedOp};
use crate::tensor::TensorDesc;
use crate::variants::VariantId;

pub fn block_prefix(index: usize) -> String {
    format!("FUSED_OP{index}")
}

/// Constants for fused op `index` of the request.
pub fn fused_op_constants(
    variant: VariantId,
    index: usize,
    op: &FusedOp,
    output: &TensorDesc,
) -> SelectorResult<JitConstants> {
    let kind = op.kind();
    if !variant.key().supports_fused_op(kind) {
        return Err(SelectorError::UnsupportedFusedOp {
            variant,
            index,
            kind,
        });
    }

    let prefix = block_prefix(index);
    let mut jit = JitConstants::new();
    jit.ident(
        format!("{prefix}_KIND"),
        format!("FUSED_OP_KIND_{}", kind.jit_tag()),
    )?;
    match op {
        FusedOp::Eltwise { mode, operand } => {
            jit.ident(format!("{prefix}_ELTWISE_MODE"), mode.jit_tag())?;
            jit.merge(tensor_constants(&format!("{prefix}_INPUT0"), operand)?)?;
        }
        FusedOp::Quantize {
            in_lo,
            in_hi,
            out_lo,
            out_hi,
            levels,
            out_dtype,
        } => {
            let (in_scale, out_scale) = op.quantize_scales().ok_or_else(|| {
                SelectorError::malformed(format!(
                    "quantize {index} range [{in_lo}, {in_hi}] -> [{out_lo}, {out_hi}] has no usable scale"
                ))
            })?;
            jit.define(format!("{prefix}_IN_LO"), *in_lo)?;
            jit.define(format!("{prefix}_IN_HI"), *in_hi)?;
            jit.define(format!("{prefix}_OUT_LO"), *out_lo)?;
            jit.define(format!("{prefix}_OUT_HI"), *out_hi)?;
            jit.define(format!("{prefix}_LEVELS"), *levels)?;
            jit.ident(format!("{prefix}_OUT_TYPE"), out_dtype.kernel_type())?;
            jit.define(format!("{prefix}_IN_SCALE"), in_scale)?;
            jit.define(format!("{prefix}_OUT_SCALE"), out_scale)?;
        }
        FusedOp::Scale { scale, shift } => {
            jit.merge(tensor_constants(&format!("{prefix}_INPUT0"), scale)?)?;
            jit.define(format!("{prefix}_HAS_SHIFT"), shift.is_some())?;
            jit.define(
                format!("{prefix}_SCALE_PER_FEATURE"),
                scale.dims() != output.dims(),
            )?;
            if let Some(shift) = shift {
                jit.merge(tensor_constants(&format!("{prefix}_INPUT1"), shift)?)?;
            }
        }
        FusedOp::Activation { func, m, n } => {
            jit.ident(format!("{prefix}_ACTIVATION_FUNC"), func.jit_tag())?;
            jit.define(format!("{prefix}_ACTIVATION_PARAM_M"), *m)?;
            jit.define(format!("{prefix}_ACTIVATION_PARAM_N"), *n)?;
        }
    }
    jit.define(format!("{prefix}_INPUT_COUNT"), op.operands().len())?;
    Ok(jit)
}

/// Every fused-op block in request order, followed by the aggregates.
pub fn all_fused_op_constants(
    variant: VariantId,
    params: &FusedConvEltwiseParams,
) -> SelectorResult<JitConstants> {
    let mut jit = JitConstants::new();
    for (index, op) in params.fused_ops.iter().enumerate() {
        jit.merge(fused_op_constants(variant, index, op, &params.output)?)?;
    }
    jit.define("FUSED_OPS_COUNT", params.fused_ops.len())?;
    jit.define("HAS_FUSED_OPS", !params.fused_ops.is_empty())?;

    // The last quantize decides what the kernel finally stores.
    let result_type = params
        .fused_ops
        .iter()
        .rposition(|op| matches!(op, FusedOp::Quantize { .. }))
        .map(|index| format!("{}_OUT_TYPE", block_prefix(index)))
        .unwrap_or_else(|| "OUTPUT_TYPE".to_string());
    jit.ident("FUSED_OPS_RESULT_TYPE", result_type)?;
    Ok(jit)
}
