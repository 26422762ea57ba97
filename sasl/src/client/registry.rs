use std::collections::BTreeMap;

use log::{debug, trace};

use crate::client::mechanisms::{Anonymous, External, OAuthBearer, Plain, XOAuth2};
#[cfg(feature = "scram")]
use crate::client::mechanisms::Scram;
use crate::client::{Mechanism, Priority};
#[cfg(feature = "scram")]
use crate::common::scram::{Sha1, Sha256, Sha384, Sha512};
use crate::common::Connection;
use crate::error::{NoCompatibleMechanism, RegistryError};

/// Operator overrides for one mechanism.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MechanismOverride {
    /// Replaces the mechanism’s default priority.
    #[cfg_attr(feature = "serde", serde(default))]
    pub priority: Option<Priority>,
    /// A disabled mechanism is never selected.
    #[cfg_attr(feature = "serde", serde(default = "enabled_by_default"))]
    pub enabled: bool,
}

#[cfg(feature = "serde")]
fn enabled_by_default() -> bool {
    true
}

impl Default for MechanismOverride {
    fn default() -> MechanismOverride {
        MechanismOverride {
            priority: None,
            enabled: true,
        }
    }
}

impl MechanismOverride {
    /// An override which only changes the priority.
    pub fn priority(priority: Priority) -> MechanismOverride {
        MechanismOverride {
            priority: Some(priority),
            enabled: true,
        }
    }

    /// An override which disables the mechanism.
    pub fn disabled() -> MechanismOverride {
        MechanismOverride {
            priority: None,
            enabled: false,
        }
    }
}

/// Per-mechanism overrides, keyed by mechanism name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct RegistryConfig {
    overrides: BTreeMap<String, MechanismOverride>,
}

impl RegistryConfig {
    /// An empty configuration, every mechanism keeps its defaults.
    pub fn new() -> RegistryConfig {
        RegistryConfig::default()
    }

    /// Adds an override for the named mechanism, replacing any previous one.
    pub fn with_override<N: Into<String>>(
        mut self,
        name: N,
        value: MechanismOverride,
    ) -> RegistryConfig {
        self.overrides.insert(name.into(), value);
        self
    }

    /// The override for the named mechanism, if any.
    pub fn get(&self, name: &str) -> Option<&MechanismOverride> {
        self.overrides.get(name)
    }
}

fn is_valid_name(name: &str) -> bool {
    (1..=20).contains(&name.len())
        && name
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
}

/// The set of mechanisms a connection knows, and the policy to pick one of them.
///
/// Registration order is kept, it breaks ties between equal priorities.
#[derive(Default)]
pub struct Registry {
    mechanisms: Vec<Box<dyn Mechanism>>,
    config: RegistryConfig,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Creates an empty registry with the given overrides.
    pub fn with_config(config: RegistryConfig) -> Registry {
        Registry {
            mechanisms: Vec::new(),
            config,
        }
    }

    /// Creates a registry holding every mechanism this crate provides.
    pub fn with_defaults() -> Registry {
        let mut registry = Registry::new();
        registry.register_defaults();
        registry
    }

    /// Registers every mechanism this crate provides which isn’t registered yet, from
    /// the strongest to the weakest.
    pub fn register_defaults(&mut self) {
        let mut defaults: Vec<Box<dyn Mechanism>> = Vec::new();
        #[cfg(feature = "scram")]
        {
            defaults.push(Box::new(Scram::<Sha512>::new()));
            defaults.push(Box::new(Scram::<Sha384>::new()));
            defaults.push(Box::new(Scram::<Sha256>::new()));
            defaults.push(Box::new(Scram::<Sha1>::new()));
        }
        defaults.push(Box::new(Plain::new()));
        defaults.push(Box::new(OAuthBearer::new()));
        defaults.push(Box::new(XOAuth2::new()));
        defaults.push(Box::new(Anonymous::new()));
        defaults.push(Box::new(External::new()));

        for mechanism in defaults {
            if let Err(err) = self.register_boxed(mechanism) {
                debug!("Not registering default mechanism: {}", err);
            }
        }
    }

    /// Adds a mechanism.
    pub fn register<M: Mechanism + 'static>(&mut self, mechanism: M) -> Result<(), RegistryError> {
        self.register_boxed(Box::new(mechanism))
    }

    /// Adds an already boxed mechanism.
    pub fn register_boxed(&mut self, mechanism: Box<dyn Mechanism>) -> Result<(), RegistryError> {
        let name = mechanism.name();
        if !is_valid_name(name) {
            return Err(RegistryError::InvalidName(name.to_owned()));
        }
        if self.get(name).is_some() {
            return Err(RegistryError::Duplicate(name.to_owned()));
        }
        debug!(
            "Registered SASL mechanism {} with priority {}",
            name,
            self.effective_priority(mechanism.as_ref())
        );
        self.mechanisms.push(mechanism);
        Ok(())
    }

    /// Removes a mechanism, returning it if it was registered.
    pub fn unregister(&mut self, name: &str) -> Option<Box<dyn Mechanism>> {
        let index = self.mechanisms.iter().position(|m| m.name() == name)?;
        Some(self.mechanisms.remove(index))
    }

    /// The mechanism registered under this name.
    pub fn get(&self, name: &str) -> Option<&dyn Mechanism> {
        self.mechanisms
            .iter()
            .find(|m| m.name() == name)
            .map(|m| m.as_ref())
    }

    /// The registered names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.mechanisms.iter().map(|m| m.name())
    }

    /// The number of registered mechanisms.
    pub fn len(&self) -> usize {
        self.mechanisms.len()
    }

    /// Whether no mechanism is registered.
    pub fn is_empty(&self) -> bool {
        self.mechanisms.is_empty()
    }

    /// The current overrides.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Replaces the overrides, must not be called while a session is in flight.
    pub fn set_config(&mut self, config: RegistryConfig) {
        self.config = config;
    }

    /// The priority of the named mechanism once overrides are applied.
    pub fn priority(&self, name: &str) -> Option<Priority> {
        self.get(name).map(|m| self.effective_priority(m))
    }

    /// Whether the named mechanism is registered and enabled.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.get(name).is_some() && self.config.get(name).map_or(true, |o| o.enabled)
    }

    fn effective_priority(&self, mechanism: &dyn Mechanism) -> Priority {
        self.config
            .get(mechanism.name())
            .and_then(|o| o.priority)
            .unwrap_or_else(|| mechanism.priority())
    }

    /// Picks the mechanism to attempt among those the server offered.
    pub fn select<S: AsRef<str>>(
        &self,
        offered: &[S],
        connection: &dyn Connection,
    ) -> Result<&dyn Mechanism, NoCompatibleMechanism> {
        self.select_excluding(offered, connection, &[])
    }

    /// Same as [`select`](Registry::select), never picking any of the `excluded`
    /// mechanisms, typically those which already failed on this connection.
    pub fn select_excluding<S: AsRef<str>>(
        &self,
        offered: &[S],
        connection: &dyn Connection,
        excluded: &[&str],
    ) -> Result<&dyn Mechanism, NoCompatibleMechanism> {
        let mut best: Option<(Priority, &dyn Mechanism)> = None;
        for mechanism in &self.mechanisms {
            let name = mechanism.name();
            if !offered.iter().any(|o| o.as_ref().trim() == name) {
                continue;
            }
            if excluded.contains(&name) {
                trace!("Skipping excluded mechanism {}", name);
                continue;
            }
            if !self.config.get(name).map_or(true, |o| o.enabled) {
                trace!("Skipping disabled mechanism {}", name);
                continue;
            }
            if !mechanism.test(connection) {
                trace!("Skipping mechanism {}, not applicable here", name);
                continue;
            }
            let priority = self.effective_priority(mechanism.as_ref());
            match best {
                Some((best_priority, _)) if best_priority >= priority => (),
                _ => best = Some((priority, mechanism.as_ref())),
            }
        }
        match best {
            Some((priority, mechanism)) => {
                debug!(
                    "Selected SASL mechanism {} with priority {}",
                    mechanism.name(),
                    priority
                );
                Ok(mechanism)
            }
            None => Err(NoCompatibleMechanism {
                offered: offered.iter().map(|o| o.as_ref().to_owned()).collect(),
            }),
        }
    }
}
