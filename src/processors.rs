use std::collections::BTreeMap;

use crate::billing;
use crate::config::{Config, Context};
use crate::error::{ConfigError, ProcessError};

/// A transform applied to the template context before rendering.
pub type ContextProcessor =
    fn(&Config, &mut Context) -> Result<(), ProcessError>;

/// Context processors by the name used for them in the config file.
#[derive(Default)]
pub struct Registry {
    processors: BTreeMap<&'static str, ContextProcessor>,
}

impl Registry {
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        registry.register("billing", billing::context_processor);
        registry
    }

    pub fn register(&mut self, name: &'static str, processor: ContextProcessor) {
        self.processors.insert(name, processor);
    }

    pub fn get(&self, name: &str) -> Result<ContextProcessor, ConfigError> {
        self.processors
            .get(name)
            .copied()
            .ok_or_else(|| ConfigError::UnknownProcessor {
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp(_: &Config, context: &mut Context) -> Result<(), ProcessError> {
        context.insert("stamped".to_string(), true.into());
        Ok(())
    }

    #[test]
    fn billing_is_built_in() {
        let registry = Registry::builtin();
        assert!(registry.get("billing").is_ok());
    }

    #[test]
    fn unknown_name_is_a_config_error() {
        match Registry::builtin().get("invoicing.aggregate") {
            Err(ConfigError::UnknownProcessor { name }) => {
                assert_eq!(name, "invoicing.aggregate")
            }
            _ => panic!("expected an unknown processor"),
        }
    }

    #[test]
    fn registered_processor_runs() -> Result<(), Box<dyn std::error::Error>> {
        let mut registry = Registry::default();
        registry.register("stamp", stamp);

        let mut context = Context::new();
        registry.get("stamp")?(&Config::default(), &mut context)?;
        assert_eq!(context.get("stamped"), Some(&serde_yaml::Value::Bool(true)));
        Ok(())
    }
}
