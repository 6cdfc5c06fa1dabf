//! The fixed table of kernel variants.
//!
//! Each [`VariantId`] owns a `'static` [`VariantHooks`] value: capability
//! key, preferred weights layout, tiling candidates and the per-variant
//! validation and jit hooks, driven by the generic pipeline in `validate`,
//! `dispatch`, `constants` and `kernel`.

mod b_fs_yx_fsv4;
mod bfyx_ref;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::capability::CapabilityKey;
use crate::dispatch::DispatchData;
use crate::error::SelectorResult;
use crate::jit::JitConstants;
use crate::params::{FusedConvEltwiseParams, FusedOpKind};
use crate::tensor::WeightsLayout;
use crate::validate::RejectReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantId {
    BFsYxFsv4,
    BfyxRef,
}

impl VariantId {
    pub const ALL: [VariantId; 2] = [VariantId::BFsYxFsv4, VariantId::BfyxRef];

    pub fn hooks(self) -> &'static VariantHooks {
        match self {
            VariantId::BFsYxFsv4 => &b_fs_yx_fsv4::HOOKS,
            VariantId::BfyxRef => &bfyx_ref::HOOKS,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            VariantId::BFsYxFsv4 => "b_fs_yx_fsv4",
            VariantId::BfyxRef => "bfyx_ref",
        }
    }

    pub fn key(self) -> &'static CapabilityKey {
        &self.hooks().key
    }

    pub fn preferred_weights_layout(self) -> WeightsLayout {
        self.hooks().preferred_weights_layout
    }

    pub fn supported_fused_ops(self) -> &'static [FusedOpKind] {
        self.hooks().key.fused_ops
    }
}

impl fmt::Display for VariantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VariantId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        VariantId::ALL
            .into_iter()
            .find(|variant| variant.name() == normalized)
            .ok_or_else(|| format!("unknown kernel variant '{s}'"))
    }
}

/// Tile sizes a variant may use along `[x, y, feature]`, largest first.
#[derive(Debug, Clone, Copy)]
pub struct TileCandidates {
    pub x: &'static [usize],
    pub y: &'static [usize],
    pub f: &'static [usize],
}

pub type LayoutCheck = fn(&FusedConvEltwiseParams) -> Result<(), RejectReason>;
pub type ExtraJit = fn(&FusedConvEltwiseParams, &DispatchData) -> SelectorResult<JitConstants>;

/// Everything the generic pipeline needs to know about one variant.
pub struct VariantHooks {
    pub id: VariantId,
    pub kernel_id: &'static str,
    /// Name of the kernel template the external compiler specializes.
    pub template: &'static str,
    pub key: CapabilityKey,
    pub preferred_weights_layout: WeightsLayout,
    /// Lower runs first when searching the registry.
    pub priority: u32,
    /// Feature-alignment granularity of the layout family.
    pub feature_slice: usize,
    pub tiles: TileCandidates,
    pub check_layout: LayoutCheck,
    pub extra_jit: ExtraJit,
}

impl fmt::Debug for VariantHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariantHooks")
            .field("id", &self.id)
            .field("kernel_id", &self.kernel_id)
            .field("template", &self.template)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

static REGISTRY: [&VariantHooks; 2] = [&b_fs_yx_fsv4::HOOKS, &bfyx_ref::HOOKS];

/// Every variant, in search order.
pub fn registry() -> &'static [&'static VariantHooks] {
    &REGISTRY
}

/// Variants whose capability key admits the request's tensors and fused
/// ops. This is only a pre-match; full validation may still reject.
pub fn candidates_for(params: &FusedConvEltwiseParams) -> Vec<VariantId> {
    registry()
        .iter()
        .filter(|hooks| {
            hooks
                .key
                .supports_input(params.input.dtype, params.input.layout)
                && hooks
                    .key
                    .supports_output(params.output.dtype, params.output.layout)
                && params
                    .fused_op_kinds()
                    .all(|kind| hooks.key.supports_fused_op(kind))
        })
        .map(|hooks| hooks.id)
        .collect()
}
