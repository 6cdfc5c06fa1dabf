//! Kernel selection for the fused convolution + elementwise operator.
//!
//! Given tensor descriptors, convolution parameters and an ordered list of
//! fused post-ops, decides which hand-written kernel variant can run the
//! request, how to launch it, and which compile-time constants specialize
//! its template. Nothing here compiles or submits work.

pub mod capability;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod fused_ops;
pub mod jit;
pub mod kernel;
pub mod options;
pub mod params;
pub mod selector;
pub mod tensor;
pub mod tuning;
pub mod validate;
pub mod variants;

pub use capability::{CapabilityFlags, CapabilityKey};
pub use constants::build_constants;
pub use dispatch::{plan, DispatchData, TileShape, MAX_WORK_GROUP_SIZE};
pub use error::{SelectorError, SelectorResult};
pub use jit::{IntoJitValue, JitConstant, JitConstants, JitValue};
pub use kernel::{assemble, KernelArg, KernelDescriptor};
pub use options::SelectorOptions;
pub use params::{
    ActivationFunc, ConvParams, EltwiseMode, FusedConvEltwiseParams, FusedOp, FusedOpKind, Spatial,
};
pub use selector::{select_kernel, KernelSelector};
pub use tensor::{DType, DataLayout, SpatialPadding, TensorDesc, WeightsDesc, WeightsLayout};
pub use tuning::{FeatureClass, ShapeClass, SpatialClass, TunedConfig, TuningTable};
pub use validate::{check, validate, RejectReason};
pub use variants::{registry, VariantId};
