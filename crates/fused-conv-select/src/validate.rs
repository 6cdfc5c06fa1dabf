//! Applicability checks for a `(variant, request)` pair.
//!
//! Rejection is an expected outcome while searching candidates, so it is
//! reported as a [`RejectReason`] and never as a [`SelectorError`].
//!
//! [`SelectorError`]: crate::error::SelectorError

use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::params::{ActivationFunc, FusedConvEltwiseParams, FusedOp};
use crate::tensor::TensorDesc;
use crate::variants::VariantId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectReason {
    pub reason: String,
}

impl RejectReason {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

/// `true` when `variant` can execute `params` as given.
pub fn validate(variant: VariantId, params: &FusedConvEltwiseParams) -> bool {
    match check(variant, params) {
        Ok(()) => true,
        Err(reason) => {
            debug!(variant = %variant, layer = ?params.layer_id, %reason, "variant rejected");
            false
        }
    }
}

/// Same as [`validate`] but keeps the first failed check.
pub fn check(variant: VariantId, params: &FusedConvEltwiseParams) -> Result<(), RejectReason> {
    check_types(variant, params)?;
    check_fused_ops(variant, params)?;
    check_structure(variant, params)?;
    (variant.hooks().check_layout)(params)?;
    check_weights_layout(variant, params)
}

fn check_types(variant: VariantId, params: &FusedConvEltwiseParams) -> Result<(), RejectReason> {
    let key = variant.key();
    if !key.supports_input(params.input.dtype, params.input.layout) {
        return Err(RejectReason::new(format!(
            "input {:?}/{:?} is not supported",
            params.input.dtype, params.input.layout
        )));
    }
    if !key.supports_output(params.output.dtype, params.output.layout) {
        return Err(RejectReason::new(format!(
            "output {:?}/{:?} is not supported",
            params.output.dtype, params.output.layout
        )));
    }
    if !key.supports_weights(params.weights.dtype) {
        return Err(RejectReason::new(format!(
            "weights dtype {:?} is not supported",
            params.weights.dtype
        )));
    }
    if let Some(bias) = &params.bias {
        if !key.supports_bias(bias.dtype) {
            return Err(RejectReason::new(format!(
                "bias dtype {:?} is not supported",
                bias.dtype
            )));
        }
        if bias.dims() != [1, params.output.feature, 1, 1] {
            return Err(RejectReason::new(format!(
                "bias dims {:?} must be [1, {}, 1, 1]",
                bias.dims(),
                params.output.feature
            )));
        }
    }
    Ok(())
}

fn check_fused_ops(
    variant: VariantId,
    params: &FusedConvEltwiseParams,
) -> Result<(), RejectReason> {
    let key = variant.key();
    let output = &params.output;
    for (index, op) in params.fused_ops.iter().enumerate() {
        if !key.supports_fused_op(op.kind()) {
            return Err(RejectReason::new(format!(
                "fused op {index} ({:?}) is not supported",
                op.kind()
            )));
        }
        match op {
            FusedOp::Eltwise { operand, .. } => {
                if operand.dims() != output.dims() {
                    return Err(RejectReason::new(format!(
                        "eltwise operand {index} dims {:?} differ from output {:?}",
                        operand.dims(),
                        output.dims()
                    )));
                }
                if !key.supports_output(operand.dtype, operand.layout) {
                    return Err(RejectReason::new(format!(
                        "eltwise operand {index} {:?}/{:?} is not supported",
                        operand.dtype, operand.layout
                    )));
                }
            }
            FusedOp::Scale { scale, shift } => {
                check_scale_operand(index, "scale", scale, output)?;
                if let Some(shift) = shift {
                    check_scale_operand(index, "shift", shift, output)?;
                }
            }
            FusedOp::Quantize {
                in_lo,
                in_hi,
                out_lo,
                out_hi,
                levels,
                out_dtype,
            } => {
                if *levels < 2 {
                    return Err(RejectReason::new(format!(
                        "quantize {index} needs at least 2 levels, got {levels}"
                    )));
                }
                if ![in_lo, in_hi, out_lo, out_hi].iter().all(|v| v.is_finite()) {
                    return Err(RejectReason::new(format!(
                        "quantize {index} has a non-finite range"
                    )));
                }
                if in_lo >= in_hi {
                    return Err(RejectReason::new(format!(
                        "quantize {index} input range [{in_lo}, {in_hi}] is empty"
                    )));
                }
                if op.quantize_scales().is_none() {
                    return Err(RejectReason::new(format!(
                        "quantize {index} range [{in_lo}, {in_hi}] -> [{out_lo}, {out_hi}] \
                         has a zero or non-finite scale"
                    )));
                }
                if !key.output_dtypes.contains(out_dtype) {
                    return Err(RejectReason::new(format!(
                        "quantize {index} output dtype {out_dtype:?} is not supported"
                    )));
                }
            }
            FusedOp::Activation { func, m, n } => {
                if !m.is_finite() || !n.is_finite() {
                    return Err(RejectReason::new(format!(
                        "activation {index} has non-finite parameters"
                    )));
                }
                if *func == ActivationFunc::Clamp && m > n {
                    return Err(RejectReason::new(format!(
                        "activation {index} clamp range [{m}, {n}] is empty"
                    )));
                }
            }
        }
    }
    Ok(())
}

fn check_scale_operand(
    index: usize,
    role: &str,
    operand: &TensorDesc,
    output: &TensorDesc,
) -> Result<(), RejectReason> {
    if !operand.dtype.is_float() {
        return Err(RejectReason::new(format!(
            "{role} operand of fused op {index} must be a float tensor"
        )));
    }
    let per_feature = operand.dims() == [1, output.feature, 1, 1];
    let full = operand.dims() == output.dims();
    if !per_feature && !full {
        return Err(RejectReason::new(format!(
            "{role} operand of fused op {index} has dims {:?}; expected [1, {}, 1, 1] or {:?}",
            operand.dims(),
            output.feature,
            output.dims()
        )));
    }
    Ok(())
}

fn check_structure(
    variant: VariantId,
    params: &FusedConvEltwiseParams,
) -> Result<(), RejectReason> {
    let flags = variant.key().flags;
    let conv = &params.conv;
    let (input, weights, output) = (&params.input, &params.weights, &params.output);

    if input.dims().contains(&0) || output.dims().contains(&0) {
        return Err(RejectReason::new("tensor with a zero extent"));
    }
    if [weights.ofm, weights.ifm, weights.y, weights.x].contains(&0) {
        return Err(RejectReason::new("weights with a zero extent"));
    }
    let tensors = [Some(input), Some(output), params.bias.as_ref()]
        .into_iter()
        .flatten()
        .chain(params.fused_ops.iter().flat_map(|op| op.operands()));
    for tensor in tensors {
        if tensor.physical_len().is_none() {
            return Err(RejectReason::new(format!(
                "tensor {:?} exceeds the addressable range",
                tensor.dims()
            )));
        }
    }
    if weights.physical_len().is_none() {
        return Err(RejectReason::new("weights exceed the addressable range"));
    }
    if conv.groups == 0 {
        return Err(RejectReason::new("groups must be at least 1"));
    }
    if conv.groups > 1 && !flags.grouped {
        return Err(RejectReason::new("grouped convolution is not supported"));
    }
    if weights.ifm.checked_mul(conv.groups) != Some(input.feature) {
        return Err(RejectReason::new(format!(
            "weights ifm {} x groups {} does not match input features {}",
            weights.ifm, conv.groups, input.feature
        )));
    }
    if weights.ofm != output.feature {
        return Err(RejectReason::new(format!(
            "weights ofm {} does not match output features {}",
            weights.ofm, output.feature
        )));
    }
    if weights.ofm % conv.groups != 0 {
        return Err(RejectReason::new(format!(
            "ofm {} is not divisible by groups {}",
            weights.ofm, conv.groups
        )));
    }
    if conv.is_dilated() && !flags.dilation {
        return Err(RejectReason::new("dilated convolution is not supported"));
    }
    if input.batch != output.batch {
        return Err(RejectReason::new(format!(
            "input batch {} differs from output batch {}",
            input.batch, output.batch
        )));
    }
    if output.batch > 1 && !flags.batching {
        return Err(RejectReason::new("batch > 1 is not supported"));
    }
    if (input.offset != 0 || output.offset != 0) && !flags.tensor_offset {
        return Err(RejectReason::new("tensor offsets are not supported"));
    }
    let expected = params.expected_output_spatial().ok_or_else(|| {
        RejectReason::new("filter window does not fit the padded input or stride is zero")
    })?;
    if expected.y != output.y || expected.x != output.x {
        return Err(RejectReason::new(format!(
            "output spatial {}x{} differs from computed {}x{}",
            output.y, output.x, expected.y, expected.x
        )));
    }
    Ok(())
}

fn check_weights_layout(
    variant: VariantId,
    params: &FusedConvEltwiseParams,
) -> Result<(), RejectReason> {
    let preferred = variant.preferred_weights_layout();
    if params.weights.layout != preferred {
        return Err(RejectReason::new(format!(
            "weights are in {:?}, variant requires {:?}",
            params.weights.layout, preferred
        )));
    }
    Ok(())
}
