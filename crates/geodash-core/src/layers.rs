//! Registered layers, their on/off state and display opacity.
//!
//! The registry comes from config; everything downstream iterates it, so a
//! new layer is a config entry, not a code change.

use std::collections::BTreeSet;

use geodash_proto::config::{LayerConfig, Legend};
use geodash_proto::{LayerId, ProtoError};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerInfo {
    pub id: LayerId,
    pub title: String,
    pub attribution: String,
    pub legend: Legend,
    pub enabled: bool,
    pub opacity: f32,
}

#[derive(Debug, Clone, Default)]
pub struct LayerSet {
    layers: Vec<LayerInfo>,
}

impl LayerSet {
    pub fn from_config(registry: &[LayerConfig]) -> Self {
        let mut layers: Vec<LayerInfo> = Vec::with_capacity(registry.len());
        for entry in registry {
            if layers.iter().any(|l| l.id == entry.id) {
                continue;
            }
            layers.push(LayerInfo {
                id: entry.id.clone(),
                title: if entry.title.is_empty() {
                    entry.id.to_string()
                } else {
                    entry.title.clone()
                },
                attribution: entry.attribution.clone(),
                legend: entry.legend.clone(),
                enabled: entry.enabled,
                opacity: entry.opacity.clamp(0.0, 1.0),
            });
        }
        Self { layers }
    }

    /// All registered ids, registry order.
    pub fn ids(&self) -> Vec<LayerId> {
        self.layers.iter().map(|l| l.id.clone()).collect()
    }

    pub fn enabled_ids(&self) -> BTreeSet<LayerId> {
        self.layers
            .iter()
            .filter(|l| l.enabled)
            .map(|l| l.id.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LayerInfo> {
        self.layers.iter()
    }

    pub fn get(&self, id: &LayerId) -> Option<&LayerInfo> {
        self.layers.iter().find(|l| &l.id == id)
    }

    pub fn is_enabled(&self, id: &LayerId) -> bool {
        self.get(id).is_some_and(|l| l.enabled)
    }

    fn get_mut(&mut self, id: &LayerId) -> Result<&mut LayerInfo, ProtoError> {
        self.layers
            .iter_mut()
            .find(|l| &l.id == id)
            .ok_or_else(|| ProtoError::UnknownLayer(id.to_string()))
    }

    /// Returns `true` when the flag actually changed.
    pub fn set_enabled(&mut self, id: &LayerId, enabled: bool) -> Result<bool, ProtoError> {
        let layer = self.get_mut(id)?;
        let changed = layer.enabled != enabled;
        layer.enabled = enabled;
        Ok(changed)
    }

    /// Flip a layer, returning its new state.
    pub fn toggle(&mut self, id: &LayerId) -> Result<bool, ProtoError> {
        let layer = self.get_mut(id)?;
        layer.enabled = !layer.enabled;
        Ok(layer.enabled)
    }

    /// Clamp into `0.0..=1.0` and store; returns the stored value.
    pub fn set_opacity(&mut self, id: &LayerId, opacity: f32) -> Result<f32, ProtoError> {
        let layer = self.get_mut(id)?;
        layer.opacity = if opacity.is_nan() {
            layer.opacity
        } else {
            opacity.clamp(0.0, 1.0)
        };
        Ok(layer.opacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geodash_proto::config::Config;

    fn id(s: &str) -> LayerId {
        LayerId::new(s).unwrap()
    }

    #[test]
    fn test_defaults_from_registry() {
        let set = LayerSet::from_config(&Config::default().layers);
        assert_eq!(set.ids(), vec![id("lst"), id("ndvi")]);
        assert_eq!(set.enabled_ids().into_iter().collect::<Vec<_>>(), vec![id("lst")]);
        assert_eq!(set.get(&id("lst")).unwrap().legend.max, 40.0);
    }

    #[test]
    fn test_toggle_and_set() {
        let mut set = LayerSet::from_config(&Config::default().layers);
        assert!(set.toggle(&id("ndvi")).unwrap());
        assert!(set.is_enabled(&id("ndvi")));
        assert!(!set.set_enabled(&id("ndvi"), true).unwrap());
        assert!(set.set_enabled(&id("lst"), false).unwrap());
        assert_eq!(set.enabled_ids().len(), 1);
    }

    #[test]
    fn test_unknown_layer() {
        let mut set = LayerSet::from_config(&Config::default().layers);
        let err = set.toggle(&id("evi")).unwrap_err();
        assert_eq!(err, ProtoError::UnknownLayer("evi".into()));
    }

    #[test]
    fn test_opacity_clamped() {
        let mut set = LayerSet::from_config(&Config::default().layers);
        assert_eq!(set.set_opacity(&id("lst"), 1.7).unwrap(), 1.0);
        assert_eq!(set.set_opacity(&id("lst"), -0.2).unwrap(), 0.0);
        assert_eq!(set.set_opacity(&id("lst"), 0.4).unwrap(), 0.4);
        assert_eq!(set.set_opacity(&id("lst"), f32::NAN).unwrap(), 0.4);
    }
}
