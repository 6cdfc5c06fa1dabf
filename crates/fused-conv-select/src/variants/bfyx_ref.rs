use crate::capability::{CapabilityFlags, CapabilityKey};
use crate::dispatch::DispatchData;
use crate::error::SelectorResult;
use crate::jit::JitConstants;
use crate::params::{FusedConvEltwiseParams, FusedOpKind};
use crate::tensor::{DType, DataLayout, WeightsLayout};
use crate::validate::RejectReason;

use super::{TileCandidates, VariantHooks, VariantId};

pub const KERNEL_ID: &str = "fcs.kernel.fused_conv_eltwise.bfyx_ref.v1";
pub const TEMPLATE: &str = "fused_conv_eltwise_gpu_ref";

/// Float fallback over plain `bfyx`; slow but accepts grouped and dilated
/// convolutions.
pub(super) static HOOKS: VariantHooks = VariantHooks {
    id: VariantId::BfyxRef,
    kernel_id: KERNEL_ID,
    template: TEMPLATE,
    key: CapabilityKey {
        input_dtypes: &[DType::F32, DType::F16],
        output_dtypes: &[DType::F32, DType::F16],
        weights_dtypes: &[DType::F32, DType::F16],
        bias_dtypes: &[DType::F32, DType::F16],
        input_layouts: &[DataLayout::Bfyx],
        output_layouts: &[DataLayout::Bfyx],
        fused_ops: &[FusedOpKind::Eltwise, FusedOpKind::Activation],
        flags: CapabilityFlags {
            bias: true,
            dilation: true,
            grouped: true,
            batching: true,
            tensor_offset: true,
            need_padded_input: false,
        },
    },
    preferred_weights_layout: WeightsLayout::Oiyx,
    priority: 100,
    feature_slice: 1,
    tiles: TileCandidates {
        x: &[16, 8, 4, 2, 1],
        y: &[8, 4, 2, 1],
        f: &[4, 2, 1],
    },
    check_layout,
    extra_jit,
};

fn check_layout(params: &FusedConvEltwiseParams) -> Result<(), RejectReason> {
    if params.input.dtype != params.output.dtype || params.weights.dtype != params.input.dtype {
        return Err(RejectReason::new(
            "reference kernel requires matching input/weights/output dtypes",
        ));
    }
    Ok(())
}

fn extra_jit(
    params: &FusedConvEltwiseParams,
    _dispatch: &DispatchData,
) -> SelectorResult<JitConstants> {
    let mut jit = JitConstants::new();
    jit.define("REFERENCE_KERNEL", true)?;
    jit.define(
        "IFM_PER_GROUP",
        params.input.feature / params.conv.groups.max(1),
    )?;
    jit.define(
        "OFM_PER_GROUP",
        params.output.feature / params.conv.groups.max(1),
    )?;
    Ok(jit)
}
