// Control nodes: named automatable parameters with no DSP of their own.

use std::collections::BTreeMap;

use log::debug;

use crate::address::{CurveType, Name};
use crate::automation::{Automations, ParamId};
use crate::distributor::LocalTarget;
use crate::node_factory::{RegistryError, Settings};
use crate::parameter::RecordedParam;
use crate::playable::Playable;

/// Settings keys that become plain properties rather than parameters.
const PROPERTY_NAMES: [Name; 2] = [Name::TYPE, Name::MUTE];

/// A node exposing named parameters and plain properties.
///
/// Parameters accept every curve type and keep their history in an
/// automation arena. Properties only take `set` events.
#[derive(Debug, Default)]
pub struct ControlNode {
    playable: Playable,
    automations: Automations,
    params: BTreeMap<Name, (ParamId, RecordedParam)>,
    properties: BTreeMap<Name, f64>,
}

impl ControlNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_param(mut self, name: Name, value: f64) -> Self {
        let id = self.automations.register(value);
        self.params.insert(name, (id, RecordedParam::new(value)));
        self
    }

    pub fn with_property(mut self, name: Name, value: f64) -> Self {
        self.properties.insert(name, value);
        self
    }

    /// Build from settings keyed by parameter name ("gain", "frequency", ...).
    pub fn from_settings(settings: &Settings) -> Result<Self, RegistryError> {
        // Sorted so parameter handles do not depend on hash order
        let mut entries: Vec<(&String, &f64)> = settings.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        entries
            .into_iter()
            .try_fold(Self::new(), |node, (key, &value)| {
                let name = Name::parse(key).ok_or_else(|| RegistryError::UnknownSetting {
                    type_name: "control".to_string(),
                    key: key.clone(),
                })?;

                Ok(if PROPERTY_NAMES.contains(&name) {
                    node.with_property(name, value)
                } else {
                    node.with_param(name, value)
                })
            })
    }

    #[inline]
    pub fn playable(&self) -> &Playable {
        &self.playable
    }

    pub fn param(&self, name: Name) -> Option<&RecordedParam> {
        self.params.get(&name).map(|(_, param)| param)
    }

    /// Automated value of parameter `name` at `time`.
    pub fn value_at_time(&self, name: Name, time: f64) -> Option<f64> {
        let (id, _) = self.params.get(&name)?;
        self.automations.value_at_time(*id, time)
    }

    pub fn property(&self, name: Name) -> Option<f64> {
        self.properties.get(&name).copied()
    }

    /// Drop automation history before `time`.
    pub fn purge(&mut self, time: f64) {
        self.automations.purge(time);
    }
}

impl LocalTarget for ControlNode {
    fn start(&mut self, time: f64, _note: f64, _velocity: f64) {
        // Misuse is logged by the playable
        let _ = self.playable.start(time);
    }

    fn stop(&mut self, time: f64, _note: f64) {
        let _ = self.playable.stop(time);
    }

    fn automate(&mut self, name: Name, time: f64, curve: CurveType, value: f64, duration: f64) -> bool {
        let Some((id, param)) = self.params.get_mut(&name) else {
            return false;
        };
        self.automations
            .automate(*id, param, time, curve, value, duration)
            .is_some()
    }

    fn set_property(&mut self, name: Name, time: f64, value: f64) -> bool {
        let Some(property) = self.properties.get_mut(&name) else {
            return false;
        };
        debug!("property {} = {} at {:.3}", name, value, time);
        *property = value;
        true
    }
}
