//! Validate -> plan -> build constants -> assemble, over one variant or the
//! whole registry.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::constants::build_constants;
use crate::dispatch::plan;
use crate::error::SelectorResult;
use crate::kernel::{assemble, KernelDescriptor};
use crate::options::SelectorOptions;
use crate::params::FusedConvEltwiseParams;
use crate::tuning::TuningTable;
use crate::validate::{check, validate, RejectReason};
use crate::variants::{registry, VariantId};

/// Runs the full pipeline for one variant. `Ok(None)` means the variant
/// does not apply; nothing past validation runs in that case.
pub fn select_kernel(
    variant: VariantId,
    params: &FusedConvEltwiseParams,
    tuning: &TuningTable,
    tune_index: Option<i64>,
) -> SelectorResult<Option<KernelDescriptor>> {
    if !validate(variant, params) {
        return Ok(None);
    }
    let dispatch = plan(variant, params, tuning, tune_index)?;
    let jit = build_constants(variant, params, &dispatch)?;
    assemble(variant, params, dispatch, jit).map(Some)
}

/// Shares one immutable tuning table across any number of threads.
#[derive(Debug, Clone)]
pub struct KernelSelector {
    tuning: Arc<TuningTable>,
    options: SelectorOptions,
}

impl Default for KernelSelector {
    fn default() -> Self {
        Self::new(Arc::new(TuningTable::builtin()), SelectorOptions::default())
    }
}

impl KernelSelector {
    pub fn new(tuning: Arc<TuningTable>, options: SelectorOptions) -> Self {
        Self { tuning, options }
    }

    pub fn tuning(&self) -> &TuningTable {
        &self.tuning
    }

    pub fn options(&self) -> &SelectorOptions {
        &self.options
    }

    fn effective_tune_index(&self, tune_index: Option<i64>) -> Option<i64> {
        if self.options.disable_autotune {
            None
        } else {
            tune_index
        }
    }

    pub fn select_variant(
        &self,
        variant: VariantId,
        params: &FusedConvEltwiseParams,
        tune_index: Option<i64>,
    ) -> SelectorResult<Option<KernelDescriptor>> {
        select_kernel(
            variant,
            params,
            &self.tuning,
            self.effective_tune_index(tune_index),
        )
    }

    /// First variant, in priority order, that produces a kernel.
    pub fn select(
        &self,
        params: &FusedConvEltwiseParams,
        tune_index: Option<i64>,
    ) -> SelectorResult<Option<KernelDescriptor>> {
        if let Some(variant) = self.options.forced_variant {
            trace!(variant = %variant, "forced variant");
            return self.select_variant(variant, params, tune_index);
        }
        for hooks in registry() {
            if let Some(kernel) = self.select_variant(hooks.id, params, tune_index)? {
                return Ok(Some(kernel));
            }
        }
        debug!(layer = ?params.layer_id, "no variant accepted the request");
        Ok(None)
    }

    /// Every registered variant that validates `params`, in priority order.
    pub fn applicable_variants(&self, params: &FusedConvEltwiseParams) -> Vec<VariantId> {
        registry()
            .iter()
            .map(|hooks| hooks.id)
            .filter(|&variant| validate(variant, params))
            .collect()
    }

    /// Validation outcome of every registered variant.
    pub fn explain(
        &self,
        params: &FusedConvEltwiseParams,
    ) -> Vec<(VariantId, Result<(), RejectReason>)> {
        registry()
            .iter()
            .map(|hooks| (hooks.id, check(hooks.id, params)))
            .collect()
    }
}
