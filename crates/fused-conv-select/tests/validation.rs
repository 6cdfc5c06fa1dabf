mod common;

use common::{eltwise_sum, fsv4_request, per_feature, quantize_to_u8, ref_request};
use fused_conv_select::{
    check, select_kernel, validate, ActivationFunc, ConvParams, DType, DataLayout,
    FusedConvEltwiseParams, FusedOp, Spatial, SpatialPadding, TensorDesc, TuningTable, VariantId,
    WeightsDesc, WeightsLayout,
};

#[test]
fn relu_scenario_validates_on_fsv4() {
    let params = fsv4_request(1, 32, 32, 8, 8).with_fused_op(FusedOp::relu());
    assert!(validate(VariantId::BFsYxFsv4, &params));
}

#[test]
fn validate_is_deterministic() {
    let accepted = fsv4_request(1, 32, 32, 8, 8).with_fused_op(FusedOp::relu());
    let rejected = fsv4_request(1, 32, 30, 8, 8);
    for params in [&accepted, &rejected] {
        for variant in VariantId::ALL {
            let first = check(variant, params);
            let second = check(variant, params);
            assert_eq!(first, second, "{variant} changed its answer");
            assert_eq!(validate(variant, params), first.is_ok());
        }
    }
}

#[test]
fn feature_count_off_the_slice_is_rejected() {
    let out_30 = fsv4_request(1, 32, 30, 8, 8).with_fused_op(FusedOp::relu());
    assert!(!validate(VariantId::BFsYxFsv4, &out_30));
    let reason = check(VariantId::BFsYxFsv4, &out_30).unwrap_err();
    assert!(reason.reason.contains("multiple of 4"), "reason: {reason}");

    let in_30 = fsv4_request(1, 30, 32, 8, 8);
    assert!(!validate(VariantId::BFsYxFsv4, &in_30));
}

#[test]
fn unsupported_fused_kind_rejects_the_whole_request() {
    let params = ref_request()
        .with_fused_op(FusedOp::relu())
        .with_fused_op(quantize_to_u8());
    let reason = check(VariantId::BfyxRef, &params).unwrap_err();
    assert!(reason.reason.contains("Quantize"), "reason: {reason}");
    assert!(validate(VariantId::BfyxRef, &ref_request().with_fused_op(FusedOp::relu())));
}

#[test]
fn capability_key_gates_dtypes_and_layouts() {
    assert!(!validate(VariantId::BFsYxFsv4, &ref_request()));

    let mut params = fsv4_request(1, 16, 16, 4, 4);
    params.input.dtype = DType::F32;
    assert!(!validate(VariantId::BFsYxFsv4, &params));

    let mut params = fsv4_request(1, 16, 16, 4, 4);
    params.output.layout = DataLayout::Byxf;
    assert!(!validate(VariantId::BFsYxFsv4, &params));
}

#[test]
fn weights_must_already_be_in_preferred_layout() {
    let mut params = fsv4_request(1, 16, 16, 4, 4);
    params.weights.layout = WeightsLayout::Oiyx;
    let reason = check(VariantId::BFsYxFsv4, &params).unwrap_err();
    assert!(reason.reason.contains("weights are in"), "reason: {reason}");
    assert_eq!(
        VariantId::BFsYxFsv4.preferred_weights_layout(),
        WeightsLayout::OsIsYxOsv16Isv4
    );
}

#[test]
fn output_shape_must_match_convolution_arithmetic() {
    let mut params = fsv4_request(1, 16, 16, 8, 8);
    params.conv.stride = Spatial::splat(2);
    assert!(!validate(VariantId::BFsYxFsv4, &params));
    params.output.y = 4;
    params.output.x = 4;
    assert!(validate(VariantId::BFsYxFsv4, &params));
}

#[test]
fn grouped_convolution_needs_the_grouped_flag() {
    let mut params = fsv4_request(1, 16, 16, 4, 4);
    params.conv.groups = 2;
    params.weights.ifm = 8;
    assert!(!validate(VariantId::BFsYxFsv4, &params));
    assert!(validate(VariantId::BfyxRef, &ref_request()));
}

#[test]
fn bias_must_be_per_feature_and_supported() {
    let params = fsv4_request(1, 16, 16, 4, 4).with_bias(per_feature(16));
    assert!(validate(VariantId::BFsYxFsv4, &params));

    let params = fsv4_request(1, 16, 16, 4, 4).with_bias(per_feature(8));
    assert!(!validate(VariantId::BFsYxFsv4, &params));

    let half_bias = TensorDesc::new([1, 16, 1, 1], DType::F16, DataLayout::Bfyx);
    let params = fsv4_request(1, 16, 16, 4, 4).with_bias(half_bias);
    assert!(!validate(VariantId::BFsYxFsv4, &params));
}

#[test]
fn fused_operands_must_match_the_output() {
    let base = fsv4_request(1, 16, 16, 4, 4);
    let ok = base.clone().with_fused_op(eltwise_sum(&base.output));
    assert!(validate(VariantId::BFsYxFsv4, &ok));

    let mut operand = base.output.clone();
    operand.x = 2;
    let bad = base.clone().with_fused_op(FusedOp::Eltwise {
        mode: fused_conv_select::EltwiseMode::Prod,
        operand,
    });
    assert!(!validate(VariantId::BFsYxFsv4, &bad));

    let scaled = base.clone().with_fused_op(FusedOp::Scale {
        scale: per_feature(16),
        shift: Some(base.output.clone()),
    });
    assert!(validate(VariantId::BFsYxFsv4, &scaled));

    let int_scale = base.clone().with_fused_op(FusedOp::Scale {
        scale: TensorDesc::new([1, 16, 1, 1], DType::Si8, DataLayout::Bfyx),
        shift: None,
    });
    assert!(!validate(VariantId::BFsYxFsv4, &int_scale));
}

#[test]
fn fused_op_parameters_are_checked() {
    let base = fsv4_request(1, 16, 16, 4, 4);
    let one_level = base.clone().with_fused_op(FusedOp::Quantize {
        in_lo: 0.0,
        in_hi: 1.0,
        out_lo: 0.0,
        out_hi: 1.0,
        levels: 1,
        out_dtype: DType::Ui8,
    });
    assert!(!validate(VariantId::BFsYxFsv4, &one_level));

    let inverted_clamp = base.clone().with_fused_op(FusedOp::Activation {
        func: ActivationFunc::Clamp,
        m: 6.0,
        n: 0.0,
    });
    assert!(!validate(VariantId::BFsYxFsv4, &inverted_clamp));

    let nan_slope = base.with_fused_op(FusedOp::Activation {
        func: ActivationFunc::ReluNegativeSlope,
        m: f32::NAN,
        n: 0.0,
    });
    assert!(!validate(VariantId::BFsYxFsv4, &nan_slope));
}

#[test]
fn quantize_ranges_need_usable_scales() {
    let base = fsv4_request(1, 16, 16, 4, 4);
    let full_range = base.clone().with_fused_op(FusedOp::Quantize {
        in_lo: -f32::MAX,
        in_hi: f32::MAX,
        out_lo: 0.0,
        out_hi: 255.0,
        levels: 256,
        out_dtype: DType::Ui8,
    });
    let err = check(VariantId::BFsYxFsv4, &full_range).unwrap_err();
    assert!(err.reason.contains("scale"), "unexpected reason: {err}");
    assert!(!validate(VariantId::BFsYxFsv4, &full_range));

    let flat_output = base.clone().with_fused_op(FusedOp::Quantize {
        in_lo: -1.0,
        in_hi: 1.0,
        out_lo: 3.0,
        out_hi: 3.0,
        levels: 256,
        out_dtype: DType::Ui8,
    });
    assert!(!validate(VariantId::BFsYxFsv4, &flat_output));

    let inverted_output = base.with_fused_op(FusedOp::Quantize {
        in_lo: -1.0,
        in_hi: 1.0,
        out_lo: 255.0,
        out_hi: 0.0,
        levels: 256,
        out_dtype: DType::Ui8,
    });
    assert!(validate(VariantId::BFsYxFsv4, &inverted_output));
}

#[test]
fn huge_group_count_is_rejected_not_overflowed() {
    let mut params = ref_request();
    params.conv.groups = usize::MAX / 2 + 1;
    params.weights.ifm = 2;
    assert!(!validate(VariantId::BfyxRef, &params));
    let err = check(VariantId::BfyxRef, &params).unwrap_err();
    assert!(err.reason.contains("groups"), "unexpected reason: {err}");
}

#[test]
fn unaddressable_tensors_are_rejected() {
    let side = 1usize << 33;
    let params = FusedConvEltwiseParams::new(
        TensorDesc::new([1, 1, side, side], DType::F32, DataLayout::Bfyx),
        WeightsDesc::new([1, 1, 1, 1], DType::F32, WeightsLayout::Oiyx),
        TensorDesc::new([1, 1, side, side], DType::F32, DataLayout::Bfyx),
        ConvParams::default(),
    );
    let err = check(VariantId::BfyxRef, &params).unwrap_err();
    assert!(
        err.reason.contains("addressable"),
        "unexpected reason: {err}"
    );
    let kernel = select_kernel(VariantId::BfyxRef, &params, &TuningTable::builtin(), None)
        .expect("rejection is not an engine error");
    assert!(kernel.is_none());

    let mut offset_bias = ref_request();
    offset_bias.bias = Some(per_feature(16).with_offset(usize::MAX));
    assert!(!validate(VariantId::BfyxRef, &offset_bias));
}

#[test]
fn padded_and_offset_tensors_are_accepted_when_flagged() {
    let mut params = fsv4_request(2, 16, 16, 4, 4);
    params.input = params
        .input
        .clone()
        .with_padding(SpatialPadding::uniform(1, 1))
        .with_offset(64);
    assert!(validate(VariantId::BFsYxFsv4, &params));

    params.output.batch = 1;
    assert!(!validate(VariantId::BFsYxFsv4, &params));
}
