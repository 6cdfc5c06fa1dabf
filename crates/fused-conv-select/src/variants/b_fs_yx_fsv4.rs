//! Int8 convolution over `b_fs_yx_fsv4` activations.
//!
//! Features are read four at a time, so both input and output feature
//! counts must fill whole slices. Weights come pre-blocked as
//! `os_is_yx_osv16_isv4`, which lets one sub-group of 16 lanes cover 16
//! output features per 4-wide input slice.

use crate::capability::{CapabilityFlags, CapabilityKey};
use crate::dispatch::DispatchData;
use crate::error::SelectorResult;
use crate::jit::JitConstants;
use crate::params::{FusedConvEltwiseParams, FusedOpKind};
use crate::tensor::{DType, DataLayout, WeightsLayout};
use crate::validate::RejectReason;

use super::{TileCandidates, VariantHooks, VariantId};

pub const KERNEL_ID: &str = "fcs.kernel.fused_conv_eltwise.b_fs_yx_fsv4.v1";
pub const TEMPLATE: &str = "fused_conv_eltwise_gpu_b_fs_yx_fsv4";

const SUB_GROUP_SIZE: usize = 16;
const FSV: usize = 4;

pub(super) static HOOKS: VariantHooks = VariantHooks {
    id: VariantId::BFsYxFsv4,
    kernel_id: KERNEL_ID,
    template: TEMPLATE,
    key: CapabilityKey {
        input_dtypes: &[DType::Si8, DType::Ui8],
        output_dtypes: &[DType::Si8, DType::Ui8, DType::F32, DType::F16],
        weights_dtypes: &[DType::Si8],
        bias_dtypes: &[DType::F32, DType::Si32],
        input_layouts: &[DataLayout::BFsYxFsv4],
        output_layouts: &[DataLayout::BFsYxFsv4],
        fused_ops: &[
            FusedOpKind::Eltwise,
            FusedOpKind::Quantize,
            FusedOpKind::Scale,
            FusedOpKind::Activation,
        ],
        flags: CapabilityFlags {
            bias: true,
            dilation: true,
            grouped: false,
            batching: true,
            tensor_offset: true,
            need_padded_input: true,
        },
    },
    preferred_weights_layout: WeightsLayout::OsIsYxOsv16Isv4,
    priority: 0,
    feature_slice: FSV,
    tiles: TileCandidates {
        x: &[8, 4, 2, 1],
        y: &[4, 2, 1],
        f: &[16, 8, 4],
    },
    check_layout,
    extra_jit,
};

fn check_layout(params: &FusedConvEltwiseParams) -> Result<(), RejectReason> {
    if params.input.feature % FSV != 0 {
        return Err(RejectReason::new(format!(
            "input feature count {} is not a multiple of {FSV}",
            params.input.feature
        )));
    }
    if params.output.feature % FSV != 0 {
        return Err(RejectReason::new(format!(
            "output feature count {} is not a multiple of {FSV}",
            params.output.feature
        )));
    }
    if params.conv.groups != 1 {
        return Err(RejectReason::new("grouped convolution is not tiled by fsv4"));
    }
    Ok(())
}

fn extra_jit(
    params: &FusedConvEltwiseParams,
    _dispatch: &DispatchData,
) -> SelectorResult<JitConstants> {
    let mut jit = JitConstants::new();
    jit.define("SUB_GROUP_SIZE", SUB_GROUP_SIZE)?;
    jit.define("IFM_SLICES", params.input.feature / FSV)?;
    jit.define("OFM_SLICES", params.output.feature / FSV)?;
    Ok(jit)
}
