use std::collections::BTreeMap;

use log::debug;

use crate::error::SequenceError;

pub const VARIABLE_TYPE: &str = "Variable";
pub const ARRAY_TYPE: &str = "Array";
pub const SPACECRAFT_TYPE: &str = "Spacecraft";
/// Parameter holding a `Variable`'s value.
pub const VALUE_PARAMETER: &str = "Value";

/// Object types that drive solver loops unless configured otherwise.
pub const SOLVER_TYPES: &[&str] = &[
    "DifferentialCorrector",
    "FminconOptimizer",
    "SQP",
    "VF13ad",
    "Yukon",
];

const SPACECRAFT_DEFAULTS: &[(&str, f64)] = &[
    ("SMA", 7191.938817629),
    ("ECC", 0.024549749),
    ("INC", 12.850080056),
    ("RAAN", 306.61480219),
    ("AOP", 314.19055153),
    ("TA", 99.887749332),
    ("DryMass", 850.0),
];

/// A named configuration object referenced by commands.
#[derive(Debug, Clone, PartialEq)]
pub struct RefObject {
    type_name: String,
    name: String,
    parameters: BTreeMap<String, f64>,
    /// Non-numeric fields such as `DC1.DerivativeMethod = ForwardDifference`.
    settings: BTreeMap<String, String>,
    dimensions: Option<(usize, usize)>,
}

impl RefObject {
    pub fn new(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        let mut parameters = BTreeMap::new();
        if type_name == VARIABLE_TYPE {
            parameters.insert(VALUE_PARAMETER.to_string(), 0.0);
        } else if type_name == SPACECRAFT_TYPE {
            for (parameter, value) in SPACECRAFT_DEFAULTS {
                parameters.insert(parameter.to_string(), *value);
            }
        }
        RefObject {
            type_name,
            name: name.into(),
            parameters,
            settings: BTreeMap::new(),
            dimensions: None,
        }
    }

    /// A zero-filled `rows` x `columns` array.
    pub fn array(name: impl Into<String>, rows: usize, columns: usize) -> Self {
        let mut object = RefObject::new(ARRAY_TYPE, name);
        for r in 1..=rows {
            for c in 1..=columns {
                object.parameters.insert(format!("({},{})", r, c), 0.0);
            }
        }
        object.dimensions = Some((rows, columns));
        object
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimensions(&self) -> Option<(usize, usize)> {
        self.dimensions
    }

    pub fn parameter(&self, parameter: &str) -> Option<f64> {
        self.parameters.get(parameter).copied()
    }

    pub fn set_parameter(&mut self, parameter: &str, value: f64) {
        self.parameters.insert(parameter.to_string(), value);
    }

    pub fn parameters(&self) -> &BTreeMap<String, f64> {
        &self.parameters
    }

    pub fn setting(&self, field: &str) -> Option<&str> {
        self.settings.get(field).map(|s| s.as_str())
    }

    pub fn set_setting(&mut self, field: &str, value: impl Into<String>) {
        self.settings.insert(field.to_string(), value.into());
    }
}

/// Every object created by the script, by name.
#[derive(Debug, Clone, Default)]
pub struct ObjectStore {
    objects: BTreeMap<String, RefObject>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, type_name: &str, name: &str) -> Result<&mut RefObject, SequenceError> {
        self.add(RefObject::new(type_name, name))
    }

    pub fn add(&mut self, object: RefObject) -> Result<&mut RefObject, SequenceError> {
        if self.objects.contains_key(object.name()) {
            return Err(SequenceError::DuplicateObject(object.name().to_string()));
        }
        debug!("created {} {}", object.type_name(), object.name());
        let name = object.name().to_string();
        Ok(self.objects.entry(name).or_insert(object))
    }

    pub fn get(&self, name: &str) -> Option<&RefObject> {
        self.objects.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut RefObject> {
        self.objects.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.objects.contains_key(name)
    }

    pub fn get_parameter(&self, name: &str, parameter: &str) -> Option<f64> {
        self.get(name).and_then(|object| object.parameter(parameter))
    }

    /// Set a parameter on an existing object. False when there is no such
    /// object.
    pub fn set_parameter(&mut self, name: &str, parameter: &str, value: f64) -> bool {
        match self.get_mut(name) {
            Some(object) => {
                object.set_parameter(parameter, value);
                true
            }
            None => false,
        }
    }

    /// Move `old` to `new`. False when `old` does not exist.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<bool, SequenceError> {
        if old == new {
            return Ok(self.contains(old));
        }
        if self.contains(new) {
            return Err(SequenceError::DuplicateObject(new.to_string()));
        }
        let Some(mut object) = self.objects.remove(old) else {
            return Ok(false);
        };
        object.name = new.to_string();
        self.objects.insert(new.to_string(), object);
        Ok(true)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RefObject> {
        self.objects.values()
    }

    pub fn of_type<'a>(&'a self, type_name: &'a str) -> impl Iterator<Item = &'a RefObject> + 'a {
        self.objects.values().filter(move |o| o.type_name() == type_name)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
