#![allow(dead_code)]

use fused_conv_select::{
    ConvParams, DType, DataLayout, EltwiseMode, FusedConvEltwiseParams, FusedOp, Spatial,
    TensorDesc, WeightsDesc, WeightsLayout,
};

/// Int8 `b_fs_yx_fsv4` request with a 3x3 filter, stride 1 and padding 1,
/// so output spatial equals input spatial.
pub fn fsv4_request(
    batch: usize,
    in_f: usize,
    out_f: usize,
    y: usize,
    x: usize,
) -> FusedConvEltwiseParams {
    FusedConvEltwiseParams::new(
        TensorDesc::new([batch, in_f, y, x], DType::Si8, DataLayout::BFsYxFsv4),
        WeightsDesc::new([out_f, in_f, 3, 3], DType::Si8, WeightsLayout::OsIsYxOsv16Isv4),
        TensorDesc::new([batch, out_f, y, x], DType::F32, DataLayout::BFsYxFsv4),
        ConvParams {
            padding: Spatial::splat(1),
            ..ConvParams::default()
        },
    )
}

/// Grouped, dilated f32 request only the reference variant accepts.
pub fn ref_request() -> FusedConvEltwiseParams {
    FusedConvEltwiseParams::new(
        TensorDesc::new([1, 8, 10, 10], DType::F32, DataLayout::Bfyx),
        WeightsDesc::new([16, 4, 3, 3], DType::F32, WeightsLayout::Oiyx),
        TensorDesc::new([1, 16, 10, 10], DType::F32, DataLayout::Bfyx),
        ConvParams {
            padding: Spatial::splat(2),
            dilation: Spatial::splat(2),
            groups: 2,
            ..ConvParams::default()
        },
    )
}

pub fn eltwise_sum(output: &TensorDesc) -> FusedOp {
    FusedOp::Eltwise {
        mode: EltwiseMode::Sum,
        operand: output.clone(),
    }
}

pub fn quantize_to_u8() -> FusedOp {
    FusedOp::Quantize {
        in_lo: -1.0,
        in_hi: 1.0,
        out_lo: 0.0,
        out_hi: 255.0,
        levels: 256,
        out_dtype: DType::Ui8,
    }
}

pub fn per_feature(features: usize) -> TensorDesc {
    TensorDesc::new([1, features, 1, 1], DType::F32, DataLayout::Bfyx)
}
