use std::env;

use serde::{Deserialize, Serialize};

use crate::error::{SelectorError, SelectorResult};
use crate::variants::VariantId;

pub const DISABLE_AUTOTUNE_VAR: &str = "FCSELECT_DISABLE_AUTOTUNE";
pub const FORCE_VARIANT_VAR: &str = "FCSELECT_FORCE_VARIANT";

/// Knobs of a [`KernelSelector`](crate::selector::KernelSelector).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorOptions {
    /// Treat every auto-tune index as absent.
    #[serde(default)]
    pub disable_autotune: bool,
    /// Only try this variant instead of searching the registry.
    #[serde(default)]
    pub forced_variant: Option<VariantId>,
}

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

impl SelectorOptions {
    pub fn from_env() -> SelectorResult<Self> {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Reads options through `lookup`; empty values count as unset.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> SelectorResult<Self> {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let disable_autotune = get(DISABLE_AUTOTUNE_VAR)
            .map(|value| parse_bool(&value))
            .unwrap_or(false);
        let forced_variant = match get(FORCE_VARIANT_VAR) {
            Some(value) => Some(value.parse::<VariantId>().map_err(|_| {
                SelectorError::InvalidOption {
                    name: FORCE_VARIANT_VAR,
                    value,
                }
            })?),
            None => None,
        };
        Ok(Self {
            disable_autotune,
            forced_variant,
        })
    }

    pub fn with_forced_variant(mut self, variant: VariantId) -> Self {
        self.forced_variant = Some(variant);
        self
    }

    pub fn with_autotune_disabled(mut self) -> Self {
        self.disable_autotune = true;
        self
    }
}
