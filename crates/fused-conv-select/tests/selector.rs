mod common;

use std::sync::Arc;
use std::thread;

use common::{fsv4_request, quantize_to_u8, ref_request};
use fused_conv_select::variants::{candidates_for, registry};
use fused_conv_select::{
    DType, FusedOp, KernelSelector, SelectorOptions, TuningTable, VariantId,
};

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn selector_is_shareable_across_threads() {
    assert_send_sync::<KernelSelector>();

    let selector = Arc::new(KernelSelector::default());
    let params = Arc::new(fsv4_request(1, 32, 32, 8, 8).with_fused_op(FusedOp::relu()));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let selector = Arc::clone(&selector);
            let params = Arc::clone(&params);
            thread::spawn(move || selector.select(&params, None).unwrap())
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(results.iter().all(|r| r.is_some()));
    assert!(results.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn registry_is_searched_in_priority_order() {
    let priorities: Vec<u32> = registry().iter().map(|hooks| hooks.priority).collect();
    assert!(priorities.windows(2).all(|w| w[0] <= w[1]), "{priorities:?}");

    let selector = KernelSelector::default();
    let int8 = selector
        .select(&fsv4_request(1, 16, 16, 4, 4), None)
        .unwrap()
        .unwrap();
    assert_eq!(int8.variant, VariantId::BFsYxFsv4);

    let float = selector.select(&ref_request(), None).unwrap().unwrap();
    assert_eq!(float.variant, VariantId::BfyxRef);
}

#[test]
fn rejection_produces_no_kernel() {
    let selector = KernelSelector::default();
    let params = ref_request().with_fused_op(quantize_to_u8());
    assert_eq!(selector.select(&params, None).unwrap(), None);
    assert_eq!(
        selector
            .select_variant(VariantId::BfyxRef, &params, Some(0))
            .unwrap(),
        None
    );
    assert!(selector.applicable_variants(&params).is_empty());
    assert!(candidates_for(&params).is_empty());
}

#[test]
fn forced_variant_skips_the_search() {
    let options = SelectorOptions::default().with_forced_variant(VariantId::BfyxRef);
    let selector = KernelSelector::new(Arc::new(TuningTable::builtin()), options);
    assert_eq!(selector.select(&fsv4_request(1, 16, 16, 4, 4), None).unwrap(), None);
    assert!(selector.select(&ref_request(), None).unwrap().is_some());
}

#[test]
fn disabled_autotune_ignores_tune_index() {
    let params = fsv4_request(1, 32, 32, 8, 8);
    let tuning = Arc::new(TuningTable::builtin());
    let tuned = KernelSelector::new(tuning.clone(), SelectorOptions::default())
        .select(&params, Some(1))
        .unwrap()
        .unwrap();
    assert_eq!(tuned.dispatch.tune_index, Some(1));

    let untuned = KernelSelector::new(tuning, SelectorOptions::default().with_autotune_disabled())
        .select(&params, Some(1))
        .unwrap()
        .unwrap();
    assert_eq!(untuned.dispatch.tune_index, None);
    assert_ne!(tuned.dispatch, untuned.dispatch);
}

#[test]
fn explain_reports_every_variant() {
    let selector = KernelSelector::default();
    let params = fsv4_request(1, 16, 16, 4, 4);
    let report = selector.explain(&params);
    assert_eq!(report.len(), registry().len());
    assert!(report
        .iter()
        .any(|(variant, outcome)| *variant == VariantId::BFsYxFsv4 && outcome.is_ok()));
    let (_, reference) = report
        .iter()
        .find(|(variant, _)| *variant == VariantId::BfyxRef)
        .unwrap();
    assert!(reference.is_err());
    assert_eq!(selector.applicable_variants(&params), vec![VariantId::BFsYxFsv4]);
}

#[test]
fn candidates_prefilter_by_capability_key_only() {
    let mut params = fsv4_request(1, 16, 30, 4, 4);
    assert_eq!(candidates_for(&params), vec![VariantId::BFsYxFsv4]);
    assert!(KernelSelector::default().applicable_variants(&params).is_empty());

    params.input.dtype = DType::F16;
    assert!(candidates_for(&params).is_empty());
}
