use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Binary layout of script resources.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// Self-describing `{type, length, payload}` blocks in a single resource.
    #[default]
    BlockStream,
    /// Script resource plus a separate heap resource with fixed header fields.
    FixedHeap,
}

/// VM-wide settings, resolved once when the [`ScriptManager`](crate::ScriptManager)
/// is constructed and never mutated afterwards.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct VmConfig {
    pub dialect: Dialect,
    /// Early block-stream scripts open with a locals count word and no locals block.
    pub legacy_header: bool,
    /// `lofsa`/`lofss` take an absolute offset instead of a pc-relative one.
    pub lofs_absolute: bool,
    /// Call and send operands that used to be bytes are words.
    pub wide_call_operands: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::BlockStream,
            legacy_header: false,
            lofs_absolute: true,
            wide_call_operands: false,
        }
    }
}

impl VmConfig {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("parse vm config")
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).context("serialize vm config")
    }
}

/// `VmConfigBuilder` is a convenience builder to create a `VmConfig` from code.
pub struct VmConfigBuilder {
    config: VmConfig,
}

impl VmConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Default::default(),
        }
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.config.dialect = dialect;
        self
    }

    pub fn with_legacy_header(mut self, legacy_header: bool) -> Self {
        self.config.legacy_header = legacy_header;
        self
    }

    pub fn with_lofs_absolute(mut self, lofs_absolute: bool) -> Self {
        self.config.lofs_absolute = lofs_absolute;
        self
    }

    pub fn with_wide_call_operands(mut self, wide: bool) -> Self {
        self.config.wide_call_operands = wide;
        self
    }

    pub fn get(self) -> VmConfig {
        self.config
    }
}

impl Default for VmConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg = VmConfig::from_json(br#"{ "dialect": "fixed_heap" }"#).unwrap();
        assert_eq!(
            cfg,
            VmConfigBuilder::new().with_dialect(Dialect::FixedHeap).get()
        );
    }

    #[test]
    fn json_roundtrip_keeps_flags() {
        let cfg = VmConfigBuilder::new()
            .with_legacy_header(true)
            .with_lofs_absolute(false)
            .get();
        let back = VmConfig::from_json(&cfg.to_json().unwrap()).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn unknown_dialect_is_rejected() {
        assert!(VmConfig::from_json(br#"{ "dialect": "sci32" }"#).is_err());
    }
}
