//! Read-only reference data consulted by the lifecycle
//!
//! Drivers, locations, chassis and container types are managed elsewhere;
//! the lifecycle only looks them up.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub name: String,
    pub id: String,
    #[serde(default)]
    pub plate: String,
    #[serde(default)]
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chassis {
    pub id: String,
    #[serde(default)]
    pub weight: f64,
    #[serde(default, rename = "is2x20")]
    pub is_2x20: bool,
    #[serde(default, rename = "is40ft")]
    pub is_40ft: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerType {
    pub name: String,
}

pub trait ReferenceProvider: Send + Sync {
    fn drivers(&self) -> Vec<Driver>;
    fn locations(&self) -> Vec<Location>;
    fn chassis(&self) -> Vec<Chassis>;
    fn container_types(&self) -> Vec<ContainerType>;

    fn is_location(&self, label: &str) -> bool {
        self.locations().iter().any(|l| l.location == label)
    }

    fn driver(&self, name: &str) -> Option<Driver> {
        self.drivers().into_iter().find(|d| d.name == name)
    }
}

/// In-memory reference data, typically loaded from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSet {
    #[serde(default)]
    pub drivers: Vec<Driver>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub chassis: Vec<Chassis>,
    #[serde(default)]
    pub container_types: Vec<ContainerType>,
}

impl ReferenceSet {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_location(mut self, location: &str) -> Self {
        self.locations.push(Location {
            location: location.to_string(),
        });
        self
    }
    pub fn with_driver(mut self, name: &str, id: &str, plate: &str) -> Self {
        self.drivers.push(Driver {
            name: name.to_string(),
            id: id.to_string(),
            plate: plate.to_string(),
            weight: 0.0,
        });
        self
    }
    pub fn with_container_type(mut self, name: &str) -> Self {
        self.container_types.push(ContainerType {
            name: name.to_string(),
        });
        self
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}

impl ReferenceProvider for ReferenceSet {
    fn drivers(&self) -> Vec<Driver> {
        self.drivers.clone()
    }
    fn locations(&self) -> Vec<Location> {
        self.locations.clone()
    }
    fn chassis(&self) -> Vec<Chassis> {
        self.chassis.clone()
    }
    fn container_types(&self) -> Vec<ContainerType> {
        self.container_types.clone()
    }

    fn is_location(&self, label: &str) -> bool {
        self.locations.iter().any(|l| l.location == label)
    }
}
