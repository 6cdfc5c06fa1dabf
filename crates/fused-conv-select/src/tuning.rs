//! Precomputed tile configurations produced by an offline tuning run.
//!
//! The table is keyed by `(variant, shape class)` and holds an ordered list
//! of configs; an auto-tune index selects one entry of that list. It is
//! built once, validated on insertion, and shared read-only behind an `Arc`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dispatch::MAX_WORK_GROUP_SIZE;
use crate::error::{SelectorError, SelectorResult};
use crate::tensor::TensorDesc;
use crate::variants::VariantId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TunedConfig {
    pub tile_x: usize,
    pub tile_y: usize,
    pub tile_f: usize,
}

impl TunedConfig {
    pub const fn new(tile_x: usize, tile_y: usize, tile_f: usize) -> Self {
        Self {
            tile_x,
            tile_y,
            tile_f,
        }
    }

    /// Checks the config against the variant's feature slice and the
    /// work-group size limit.
    pub fn validate_for(&self, variant: VariantId) -> SelectorResult<()> {
        let invalid = |reason: String| SelectorError::InvalidTunedConfig {
            variant,
            tile_x: self.tile_x,
            tile_y: self.tile_y,
            tile_f: self.tile_f,
            reason,
        };
        if self.tile_x == 0 || self.tile_y == 0 || self.tile_f == 0 {
            return Err(invalid("tile sizes must be positive".to_string()));
        }
        let slice = variant.hooks().feature_slice;
        if self.tile_f % slice != 0 {
            return Err(invalid(format!(
                "tile_f is not a multiple of the feature slice {slice}"
            )));
        }
        let volume = self
            .tile_x
            .checked_mul(self.tile_y)
            .and_then(|v| v.checked_mul(self.tile_f));
        match volume {
            Some(volume) if volume <= MAX_WORK_GROUP_SIZE => Ok(()),
            _ => Err(invalid(format!(
                "work-group volume exceeds {MAX_WORK_GROUP_SIZE}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpatialClass {
    /// `max(x, y) <= 8`
    Small,
    /// `max(x, y) <= 32`
    Medium,
    Large,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureClass {
    /// `f <= 32`
    Narrow,
    Wide,
}

/// Coarse bucket of an output shape used to key tuned configs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShapeClass {
    pub spatial: SpatialClass,
    pub feature: FeatureClass,
}

impl ShapeClass {
    pub const fn new(spatial: SpatialClass, feature: FeatureClass) -> Self {
        Self { spatial, feature }
    }

    pub fn of(output: &TensorDesc) -> Self {
        let extent = output.x.max(output.y);
        let spatial = if extent <= 8 {
            SpatialClass::Small
        } else if extent <= 32 {
            SpatialClass::Medium
        } else {
            SpatialClass::Large
        };
        let feature = if output.feature <= 32 {
            FeatureClass::Narrow
        } else {
            FeatureClass::Wide
        };
        Self { spatial, feature }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TuningEntry {
    variant: VariantId,
    class: ShapeClass,
    #[serde(default)]
    configs: Vec<TunedConfig>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TuningFile {
    #[serde(default)]
    entries: Vec<TuningEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TuningTable {
    entries: BTreeMap<(VariantId, ShapeClass), Vec<TunedConfig>>,
}

impl TuningTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Defaults shipped with the crate.
    pub fn builtin() -> Self {
        use FeatureClass::{Narrow, Wide};
        use SpatialClass::{Large, Medium, Small};

        const FSV4: &[(SpatialClass, FeatureClass, &[TunedConfig])] = &[
            (
                Small,
                Narrow,
                &[TunedConfig::new(8, 2, 16), TunedConfig::new(4, 4, 16)],
            ),
            (
                Small,
                Wide,
                &[TunedConfig::new(8, 1, 32), TunedConfig::new(4, 2, 32)],
            ),
            (
                Medium,
                Narrow,
                &[TunedConfig::new(8, 2, 16), TunedConfig::new(8, 4, 8)],
            ),
            (
                Medium,
                Wide,
                &[TunedConfig::new(8, 1, 32), TunedConfig::new(8, 2, 16)],
            ),
            (
                Large,
                Wide,
                &[TunedConfig::new(16, 1, 16), TunedConfig::new(8, 2, 16)],
            ),
        ];
        const REF: &[(SpatialClass, FeatureClass, &[TunedConfig])] = &[
            (Small, Narrow, &[TunedConfig::new(8, 8, 1)]),
            (
                Medium,
                Narrow,
                &[TunedConfig::new(16, 4, 2), TunedConfig::new(8, 8, 4)],
            ),
            (Large, Wide, &[TunedConfig::new(16, 8, 2)]),
        ];

        let mut entries = BTreeMap::new();
        for (variant, rows) in [(VariantId::BFsYxFsv4, FSV4), (VariantId::BfyxRef, REF)] {
            for (spatial, feature, configs) in rows {
                entries.insert(
                    (variant, ShapeClass::new(*spatial, *feature)),
                    configs.to_vec(),
                );
            }
        }
        Self { entries }
    }

    /// Appends `config` to the list for `(variant, class)`.
    pub fn insert(
        &mut self,
        variant: VariantId,
        class: ShapeClass,
        config: TunedConfig,
    ) -> SelectorResult<()> {
        config.validate_for(variant)?;
        self.entries.entry((variant, class)).or_default().push(config);
        Ok(())
    }

    pub fn configs(&self, variant: VariantId, class: ShapeClass) -> &[TunedConfig] {
        self.entries
            .get(&(variant, class))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self, variant: VariantId, class: ShapeClass) -> usize {
        self.configs(variant, class).len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, variant: VariantId, class: ShapeClass, index: usize) -> Option<TunedConfig> {
        self.configs(variant, class).get(index).copied()
    }

    /// Parses a tuning dump. Entries without configs are skipped; an
    /// invalid config fails the whole load.
    pub fn from_json_str(json: &str) -> SelectorResult<Self> {
        let file: TuningFile = serde_json::from_str(json)?;
        let mut table = Self::empty();
        for entry in file.entries {
            if entry.configs.is_empty() {
                warn!(
                    variant = %entry.variant,
                    class = ?entry.class,
                    "skipping tuning entry without configs"
                );
                continue;
            }
            for config in entry.configs {
                table.insert(entry.variant, entry.class, config)?;
            }
        }
        debug!(keys = table.entries.len(), "tuning table loaded");
        Ok(table)
    }

    pub fn load_json(path: impl AsRef<Path>) -> SelectorResult<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> SelectorResult<String> {
        let file = TuningFile {
            entries: self
                .entries
                .iter()
                .map(|(&(variant, class), configs)| TuningEntry {
                    variant,
                    class,
                    configs: configs.clone(),
                })
                .collect(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }
}
