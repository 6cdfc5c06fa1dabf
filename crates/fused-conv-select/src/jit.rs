//! Compile-time constants that specialize a kernel template.
//!
//! [`JitConstants`] keeps insertion order because later constants may refer
//! to earlier macro names, and refuses duplicate names.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{SelectorError, SelectorResult};
use crate::tensor::{TensorDesc, WeightsDesc};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JitValue {
    Int(i64),
    Float(f32),
    Bool(bool),
    /// A bare identifier: type names, tags, other macro names.
    Ident(String),
    /// An expression; rendered in parentheses.
    Expr(String),
}

impl From<i64> for JitValue {
    fn from(value: i64) -> Self {
        JitValue::Int(value)
    }
}

impl From<u32> for JitValue {
    fn from(value: u32) -> Self {
        JitValue::Int(i64::from(value))
    }
}

impl From<f32> for JitValue {
    fn from(value: f32) -> Self {
        JitValue::Float(value)
    }
}

impl From<bool> for JitValue {
    fn from(value: bool) -> Self {
        JitValue::Bool(value)
    }
}

impl fmt::Display for JitValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JitValue::Int(v) => write!(f, "{v}"),
            JitValue::Float(v) => f.write_str(&format_f32(*v)),
            JitValue::Bool(v) => f.write_str(if *v { "1" } else { "0" }),
            JitValue::Ident(v) => f.write_str(v),
            JitValue::Expr(v) => write!(f, "({v})"),
        }
    }
}

/// Conversion used by [`JitConstants::define`]. `None` means the value has
/// no literal form, such as an extent past `i64::MAX`.
pub trait IntoJitValue {
    fn into_jit_value(self) -> Option<JitValue>;
}

impl IntoJitValue for usize {
    fn into_jit_value(self) -> Option<JitValue> {
        i64::try_from(self).ok().map(JitValue::Int)
    }
}

impl IntoJitValue for i64 {
    fn into_jit_value(self) -> Option<JitValue> {
        Some(JitValue::Int(self))
    }
}

impl IntoJitValue for u32 {
    fn into_jit_value(self) -> Option<JitValue> {
        Some(self.into())
    }
}

impl IntoJitValue for f32 {
    fn into_jit_value(self) -> Option<JitValue> {
        Some(self.into())
    }
}

impl IntoJitValue for bool {
    fn into_jit_value(self) -> Option<JitValue> {
        Some(self.into())
    }
}

impl IntoJitValue for JitValue {
    fn into_jit_value(self) -> Option<JitValue> {
        Some(self)
    }
}

pub(crate) fn format_f32(value: f32) -> String {
    if value.is_nan() {
        "NAN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_negative() {
            "-INFINITY".to_string()
        } else {
            "INFINITY".to_string()
        }
    } else {
        let base = value.to_string();
        let needs_decimal = !base.contains('.') && !base.contains('e') && !base.contains('E');
        let suffix = if needs_decimal { ".0f" } else { "f" };
        format!("{base}{suffix}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JitConstant {
    pub name: String,
    pub value: JitValue,
}

impl JitConstant {
    pub fn new(name: impl Into<String>, value: impl Into<JitValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for JitConstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#define {} {}", self.name, self.value)
    }
}

/// Ordered, name-unique constant set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<JitConstant>", into = "Vec<JitConstant>")]
pub struct JitConstants {
    constants: Vec<JitConstant>,
    index: HashMap<String, usize>,
}

impl JitConstants {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, constant: JitConstant) -> SelectorResult<()> {
        if self.index.contains_key(&constant.name) {
            return Err(SelectorError::DuplicateJitConstant {
                name: constant.name,
            });
        }
        self.index.insert(constant.name.clone(), self.constants.len());
        self.constants.push(constant);
        Ok(())
    }

    pub fn define(
        &mut self,
        name: impl Into<String>,
        value: impl IntoJitValue,
    ) -> SelectorResult<()> {
        let name = name.into();
        let Some(value) = value.into_jit_value() else {
            return Err(SelectorError::malformed(format!(
                "constant '{name}' does not fit a 64-bit literal"
            )));
        };
        self.push(JitConstant { name, value })
    }

    pub fn ident(
        &mut self,
        name: impl Into<String>,
        ident: impl Into<String>,
    ) -> SelectorResult<()> {
        self.push(JitConstant::new(name, JitValue::Ident(ident.into())))
    }

    pub fn expr(
        &mut self,
        name: impl Into<String>,
        expr: impl Into<String>,
    ) -> SelectorResult<()> {
        self.push(JitConstant::new(name, JitValue::Expr(expr.into())))
    }

    /// Appends every constant of `other`, failing on the first collision.
    pub fn merge(&mut self, other: JitConstants) -> SelectorResult<()> {
        for constant in other.constants {
            self.push(constant)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&JitValue> {
        self.index.get(name).map(|&idx| &self.constants[idx].value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &JitConstant> {
        self.constants.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constants.iter().map(|c| c.name.as_str())
    }

    /// One `#define` per line, in insertion order.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for constant in &self.constants {
            out.push_str(&constant.to_string());
            out.push('\n');
        }
        out
    }
}

impl TryFrom<Vec<JitConstant>> for JitConstants {
    type Error = SelectorError;

    fn try_from(value: Vec<JitConstant>) -> Result<Self, Self::Error> {
        let mut out = JitConstants::new();
        for constant in value {
            out.push(constant)?;
        }
        Ok(out)
    }
}

impl From<JitConstants> for Vec<JitConstant> {
    fn from(value: JitConstants) -> Self {
        value.constants
    }
}

impl<'a> IntoIterator for &'a JitConstants {
    type Item = &'a JitConstant;
    type IntoIter = std::slice::Iter<'a, JitConstant>;

    fn into_iter(self) -> Self::IntoIter {
        self.constants.iter()
    }
}

/// Shape, padding, pitch and type constants for an activation tensor.
pub fn tensor_constants(prefix: &str, desc: &TensorDesc) -> SelectorResult<JitConstants> {
    let unaddressable = || {
        SelectorError::malformed(format!(
            "{prefix} tensor {:?} exceeds the addressable range",
            desc.dims()
        ))
    };
    let pitches = desc.pitches().ok_or_else(unaddressable)?;
    let offset = desc.first_element_offset().ok_or_else(unaddressable)?;
    let length = desc.physical_len().ok_or_else(unaddressable)?;
    let mut jit = JitConstants::new();
    jit.ident(format!("{prefix}_TYPE"), desc.dtype.kernel_type())?;
    jit.define(format!("{prefix}_BATCH_NUM"), desc.batch)?;
    jit.define(format!("{prefix}_FEATURE_NUM"), desc.feature)?;
    jit.define(format!("{prefix}_SIZE_Y"), desc.y)?;
    jit.define(format!("{prefix}_SIZE_X"), desc.x)?;
    jit.define(format!("{prefix}_PAD_BEFORE_SIZE_Y"), desc.padding.y_before)?;
    jit.define(format!("{prefix}_PAD_AFTER_SIZE_Y"), desc.padding.y_after)?;
    jit.define(format!("{prefix}_PAD_BEFORE_SIZE_X"), desc.padding.x_before)?;
    jit.define(format!("{prefix}_PAD_AFTER_SIZE_X"), desc.padding.x_after)?;
    jit.define(format!("{prefix}_X_PITCH"), pitches.x)?;
    jit.define(format!("{prefix}_Y_PITCH"), pitches.y)?;
    jit.define(format!("{prefix}_FEATURE_PITCH"), pitches.feature)?;
    jit.define(format!("{prefix}_FEATURE_SLICE_PITCH"), pitches.feature_slice)?;
    jit.define(format!("{prefix}_BATCH_PITCH"), pitches.batch)?;
    jit.define(format!("{prefix}_FEATURE_SLICE_NUM"), desc.feature_slices())?;
    jit.define(format!("{prefix}_OFFSET"), offset)?;
    jit.define(format!("{prefix}_LENGTH"), length)?;
    jit.define(format!("{prefix}_LAYOUT_{}", desc.layout.jit_tag()), true)?;
    Ok(jit)
}

/// Shape, pitch and type constants for the convolution filter.
pub fn weights_constants(prefix: &str, desc: &WeightsDesc) -> SelectorResult<JitConstants> {
    let pitches = desc.pitches().ok_or_else(|| {
        SelectorError::malformed(format!(
            "{prefix} filter {:?} exceeds the addressable range",
            [desc.ofm, desc.ifm, desc.y, desc.x]
        ))
    })?;
    let (ofm_block, ifm_block) = desc.layout.block();
    let mut jit = JitConstants::new();
    jit.ident(format!("{prefix}_TYPE"), desc.dtype.kernel_type())?;
    jit.define(format!("{prefix}_OFM_NUM"), desc.ofm)?;
    jit.define(format!("{prefix}_IFM_NUM"), desc.ifm)?;
    jit.define(format!("{prefix}_SIZE_Y"), desc.y)?;
    jit.define(format!("{prefix}_SIZE_X"), desc.x)?;
    jit.define(format!("{prefix}_X_PITCH"), pitches.x)?;
    jit.define(format!("{prefix}_Y_PITCH"), pitches.y)?;
    jit.define(format!("{prefix}_IFM_PITCH"), pitches.ifm)?;
    jit.define(format!("{prefix}_OFM_PITCH"), pitches.ofm)?;
    jit.define(format!("{prefix}_IFM_BLOCK_PITCH"), pitches.ifm_block)?;
    jit.define(format!("{prefix}_OFM_BLOCK_PITCH"), pitches.ofm_block)?;
    jit.define(format!("{prefix}_OFM_BLOCK_SIZE"), ofm_block)?;
    jit.define(format!("{prefix}_IFM_BLOCK_SIZE"), ifm_block)?;
    jit.define(format!("{prefix}_LAYOUT_{}", desc.layout.jit_tag()), true)?;
    Ok(jit)
}
