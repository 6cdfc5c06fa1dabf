mod common;

use common::{eltwise_sum, fsv4_request, per_feature};
use fused_conv_select::variants::registry;
use fused_conv_select::{
    assemble, build_constants, plan, select_kernel, FusedOp, KernelArg, KernelDescriptor,
    TuningTable, VariantId,
};

fn descriptor(params: &fused_conv_select::FusedConvEltwiseParams) -> KernelDescriptor {
    select_kernel(VariantId::BFsYxFsv4, params, &TuningTable::builtin(), None)
        .unwrap()
        .expect("request should be accepted")
}

#[test]
fn arguments_follow_tensor_roles_then_fused_operands() {
    let base = fsv4_request(1, 16, 16, 4, 4);
    let params = base
        .clone()
        .with_bias(per_feature(16))
        .with_fused_op(eltwise_sum(&base.output))
        .with_fused_op(FusedOp::relu())
        .with_fused_op(FusedOp::Scale {
            scale: per_feature(16),
            shift: Some(per_feature(16)),
        });
    let kernel = descriptor(&params);
    assert_eq!(
        kernel.args.as_slice(),
        [
            KernelArg::Input(0),
            KernelArg::Weights,
            KernelArg::Bias,
            KernelArg::Output,
            KernelArg::FusedOpInput { op: 0, slot: 0 },
            KernelArg::FusedOpInput { op: 2, slot: 0 },
            KernelArg::FusedOpInput { op: 2, slot: 1 },
        ]
    );
}

#[test]
fn arguments_skip_missing_bias() {
    let kernel = descriptor(&fsv4_request(1, 16, 16, 4, 4));
    assert_eq!(
        kernel.args.as_slice(),
        [KernelArg::Input(0), KernelArg::Weights, KernelArg::Output]
    );
}

#[test]
fn descriptor_binds_variant_identity_and_geometry() {
    let params = fsv4_request(1, 32, 32, 8, 8).with_fused_op(FusedOp::relu());
    let tuning = TuningTable::builtin();
    let dispatch = plan(VariantId::BFsYxFsv4, &params, &tuning, None).unwrap();
    let jit = build_constants(VariantId::BFsYxFsv4, &params, &dispatch).unwrap();
    let kernel = assemble(VariantId::BFsYxFsv4, &params, dispatch.clone(), jit.clone()).unwrap();

    let hooks = VariantId::BFsYxFsv4.hooks();
    assert_eq!(kernel.variant, VariantId::BFsYxFsv4);
    assert_eq!(kernel.kernel_id, hooks.kernel_id);
    assert_eq!(kernel.template, hooks.template);
    assert_eq!(kernel.dispatch, dispatch);
    assert_eq!(kernel.jit, jit);
    assert_eq!(kernel.build_options(), jit.render());

    let suffix = kernel
        .entry_point
        .strip_prefix(&format!("{}_", hooks.template))
        .expect("entry point starts with the template name");
    assert_eq!(suffix.len(), 16);
    assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn entry_point_is_stable_and_salted_by_layer() {
    let params = fsv4_request(1, 16, 16, 4, 4);
    let first = descriptor(&params.clone().with_layer_id("conv1"));
    let again = descriptor(&params.clone().with_layer_id("conv1"));
    let other = descriptor(&params.with_layer_id("conv2"));

    assert_eq!(first.entry_point, again.entry_point);
    assert_ne!(first.entry_point, other.entry_point);
    assert_eq!(first.fingerprint().unwrap(), again.fingerprint().unwrap());
    assert_eq!(first.fingerprint().unwrap(), other.fingerprint().unwrap());
}

#[test]
fn descriptor_serializes_to_json() {
    let kernel = descriptor(&fsv4_request(1, 16, 16, 4, 4).with_fused_op(FusedOp::relu()));
    let json = kernel.to_json_string().unwrap();
    let back: KernelDescriptor = serde_json::from_str(&json).unwrap();
    assert_eq!(back, kernel);
    assert!(json.contains("\"b_fs_yx_fsv4\""), "json: {json}");
}

#[test]
fn kernel_ids_and_templates_are_unique() {
    let mut ids = std::collections::HashSet::new();
    let mut templates = std::collections::HashSet::new();
    for hooks in registry() {
        assert!(
            ids.insert(hooks.kernel_id),
            "duplicate kernel id in registry: {}",
            hooks.kernel_id
        );
        assert!(
            templates.insert(hooks.template),
            "duplicate template in registry: {}",
            hooks.template
        );
    }
}
