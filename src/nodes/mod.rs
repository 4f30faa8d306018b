// src/nodes/mod.rs
//
// Standard node types.

mod control;

pub use control::*;

use crate::config::EngineConfig;
use crate::distributor::BoxedTarget;
use crate::node_factory::{NodeRegistry, RegistryError, Settings, SimpleNodeFactory};
use crate::polyphonic::Polyphonic;
use crate::parameter::RecordedParam;
use crate::voice::{DEFAULT_ATTACK, Monophonic};

// ═══════════════════════════════════════════════════════════════════
// Node Type Names
// ═══════════════════════════════════════════════════════════════════

pub mod node_types {
    pub const CONTROL: &str = "control";
    pub const INSTRUMENT: &str = "instrument";
}

// ═══════════════════════════════════════════════════════════════════
// Registry Population
// ═══════════════════════════════════════════════════════════════════

/// Populate the registry with all standard node types.
pub fn register_standard_nodes(registry: &mut NodeRegistry, config: EngineConfig) {
    registry.register(
        node_types::CONTROL,
        SimpleNodeFactory::new(|_, settings| {
            Ok(Box::new(ControlNode::from_settings(settings)?) as BoxedTarget)
        }),
    );

    registry.register(
        node_types::INSTRUMENT,
        SimpleNodeFactory::new(move |clock, settings| {
            let (attack, release) = instrument_settings(settings, &config)?;
            let instrument = Polyphonic::new(
                clock.clone(),
                Box::new(move || {
                    Monophonic::new(
                        RecordedParam::new(0.0),
                        RecordedParam::new(440.0),
                        attack,
                        release,
                    )
                }),
            );
            Ok(Box::new(instrument) as BoxedTarget)
        }),
    );
}

/// Envelope time constants from instrument settings.
fn instrument_settings(settings: &Settings, config: &EngineConfig) -> Result<(f64, f64), RegistryError> {
    let mut attack = DEFAULT_ATTACK;
    let mut release = config.release;

    for (key, &value) in settings {
        let slot = match key.as_str() {
            "attack" => &mut attack,
            "release" => &mut release,
            _ => {
                return Err(RegistryError::UnknownSetting {
                    type_name: node_types::INSTRUMENT.to_string(),
                    key: key.clone(),
                });
            }
        };
        if !(value >= 0.0 && value.is_finite()) {
            return Err(RegistryError::InvalidSetting {
                type_name: node_types::INSTRUMENT.to_string(),
                key: key.clone(),
                value,
            });
        }
        *slot = value;
    }

    Ok((attack, release))
}
