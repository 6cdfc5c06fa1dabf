//! The kernel descriptor handed to the job-submission layer.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::trace;

use crate::dispatch::DispatchData;
use crate::error::SelectorResult;
use crate::jit::JitConstants;
use crate::params::FusedConvEltwiseParams;
use crate::variants::VariantId;

/// Runtime buffer bound to one kernel argument slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KernelArg {
    Input(u32),
    Weights,
    Bias,
    Output,
    /// Secondary operand `slot` of fused op `op`.
    FusedOpInput { op: u32, slot: u32 },
}

pub type KernelArgs = SmallVec<[KernelArg; 8]>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelDescriptor {
    pub variant: VariantId,
    pub kernel_id: String,
    pub template: String,
    pub entry_point: String,
    pub dispatch: DispatchData,
    pub jit: JitConstants,
    pub args: KernelArgs,
}

impl KernelDescriptor {
    /// `#define` lines passed to the external compiler.
    pub fn build_options(&self) -> String {
        self.jit.render()
    }

    /// Stable hash of everything that affects the compiled binary and the
    /// launch, for external compile caches.
    pub fn fingerprint(&self) -> SelectorResult<u64> {
        let bytes = bincode::serialize(&(&self.template, &self.jit, &self.dispatch))?;
        Ok(fnv_hash(&bytes))
    }

    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Argument order: input, weights, bias when present, output, then each
/// fused op's secondary operands in request order.
pub fn kernel_args(params: &FusedConvEltwiseParams) -> KernelArgs {
    let mut args = KernelArgs::new();
    args.push(KernelArg::Input(0));
    args.push(KernelArg::Weights);
    if params.bias.is_some() {
        args.push(KernelArg::Bias);
    }
    args.push(KernelArg::Output);
    for (op, fused) in params.fused_ops.iter().enumerate() {
        for slot in 0..fused.operands().len() {
            args.push(KernelArg::FusedOpInput {
                op: op as u32,
                slot: slot as u32,
            });
        }
    }
    args
}

/// Digest of the request, salted by its layer id through serialization.
pub fn request_digest(params: &FusedConvEltwiseParams) -> SelectorResult<u64> {
    let bytes = bincode::serialize(params)?;
    Ok(fnv_hash(&bytes))
}

pub fn assemble(
    variant: VariantId,
    params: &FusedConvEltwiseParams,
    dispatch: DispatchData,
    jit: JitConstants,
) -> SelectorResult<KernelDescriptor> {
    let hooks = variant.hooks();
    let entry_point = format!("{}_{:016x}", hooks.template, request_digest(params)?);
    let args = kernel_args(params);
    trace!(variant = %variant, %entry_point, args = args.len(), "kernel assembled");
    Ok(KernelDescriptor {
        variant,
        kernel_id: hooks.kernel_id.to_string(),
        template: hooks.template.to_string(),
        entry_point,
        dispatch,
        jit,
        args,
    })
}

fn fnv_hash(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    let mut hash = OFFSET;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}
