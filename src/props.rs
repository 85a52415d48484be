use std::collections::HashMap;
use std::convert::TryFrom;
use std::sync::Arc;

use anyhow::{anyhow, bail};

use crate::film::Film;
use crate::{Float, Vec3f};

/// Typed configuration value for component construction.
#[derive(Clone)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(Float),
    Vec3(Vec3f),
    Str(String),
    Film(Arc<Film>),
}

macro_rules! impl_value_conversions {
    ($variant:ident, $ty:ty, $name:expr) => {
        impl TryFrom<Value> for $ty {
            type Error = anyhow::Error;

            fn try_from(value: Value) -> Result<Self, Self::Error> {
                match value {
                    Value::$variant(v) => Ok(v),
                    _ => Err(anyhow!("expected {} value", $name)),
                }
            }
        }

        impl From<$ty> for Value {
            fn from(v: $ty) -> Value {
                Value::$variant(v)
            }
        }
    };
}

impl_value_conversions!(Bool, bool, "bool");
impl_value_conversions!(Int, i64, "int");
impl_value_conversions!(Float, Float, "float");
impl_value_conversions!(Vec3, Vec3f, "vec3");
impl_value_conversions!(Str, String, "string");
impl_value_conversions!(Film, Arc<Film>, "film handle");

/// Property bag consumed by renderer and accelerator constructors. Lookups
/// are by name; type mismatches and missing required keys are configuration
/// errors.
#[derive(Clone, Default)]
pub struct Props {
    values: HashMap<String, Value>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<V: Into<Value>>(mut self, name: &str, value: V) -> Self {
        self.values.insert(name.to_string(), value.into());
        self
    }

    /// Required property.
    pub fn get<T>(&self, name: &str) -> anyhow::Result<T>
    where
        T: TryFrom<Value, Error = anyhow::Error>,
    {
        match self.values.get(name) {
            Some(value) => T::try_from(value.clone())
                .map_err(|e| anyhow!("property \"{}\": {}", name, e)),
            None => bail!("missing required property \"{}\"", name),
        }
    }

    /// Optional property with a default.
    pub fn get_or<T>(&self, name: &str, default: T) -> anyhow::Result<T>
    where
        T: TryFrom<Value, Error = anyhow::Error>,
    {
        match self.values.get(name) {
            Some(value) => T::try_from(value.clone())
                .map_err(|e| anyhow!("property \"{}\": {}", name, e)),
            None => Ok(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_lookup() {
        let props = Props::new()
            .with("spp", 16i64)
            .with("bg_color", Vec3f::new(1.0, 0.0, 0.0))
            .with("use_constant_color", true);

        assert_eq!(props.get::<i64>("spp").unwrap(), 16);
        assert_eq!(
            props.get::<Vec3f>("bg_color").unwrap(),
            Vec3f::new(1.0, 0.0, 0.0)
        );
        assert!(props.get::<bool>("use_constant_color").unwrap());
    }

    #[test]
    fn missing_required_property_is_an_error() {
        let props = Props::new();
        assert!(props.get::<i64>("spp").is_err());
        assert_eq!(props.get_or::<i64>("spp", 4).unwrap(), 4);
    }

    #[test]
    fn type_mismatch_is_an_error() {
        let props = Props::new().with("spp", "sixteen".to_string());
        assert!(props.get::<i64>("spp").is_err());
        assert!(props.get_or::<i64>("spp", 4).is_err());
    }
}
