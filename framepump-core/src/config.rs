//! Runtime configuration shared by the libretro core and the headless runner.

use thiserror::Error;

use crate::abi::IMPORT_MODULE;
use crate::bindings::{BindingAdapter, system};

pub const ENV_FPS: &str = "FRAMEPUMP_FPS";
pub const ENV_IMPORT_MODULE: &str = "FRAMEPUMP_IMPORT_MODULE";

pub const DEFAULT_REFRESH_RATE_HZ: f64 = 60.0;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("refresh rate must be a positive number of Hz, got {0}")]
    InvalidRefreshRate(f64),
    #[error("{var} is not a number: {value:?}")]
    NotANumber { var: &'static str, value: String },
    #[error("import module name must not be empty")]
    EmptyImportModule,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeConfig {
    /// Namespace whose function imports go through the binding adapter.
    pub import_module: String,
    /// Display refresh rate reported to the frontend and used by the headless schedulers.
    pub refresh_rate_hz: f64,
    /// Offer the built-in `system_*` host functions.
    pub system_bindings: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            import_module: IMPORT_MODULE.to_owned(),
            refresh_rate_hz: DEFAULT_REFRESH_RATE_HZ,
            system_bindings: true,
        }
    }
}

impl RuntimeConfig {
    /// Defaults overridden by `FRAMEPUMP_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `FRAMEPUMP_*` variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_FPS) {
            config.refresh_rate_hz =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::NotANumber {
                        var: ENV_FPS,
                        value: value.clone(),
                    })?;
        }
        if let Some(value) = lookup(ENV_IMPORT_MODULE) {
            config.import_module = value;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.refresh_rate_hz.is_finite() && self.refresh_rate_hz > 0.0) {
            return Err(ConfigError::InvalidRefreshRate(self.refresh_rate_hz));
        }
        if self.import_module.is_empty() {
            return Err(ConfigError::EmptyImportModule);
        }
        Ok(())
    }

    /// A fresh binding adapter for one session.
    pub fn adapter(&self) -> BindingAdapter {
        let adapter = BindingAdapter::new(self.import_module.clone());
        if self.system_bindings {
            adapter.with_source(system::capabilities())
        } else {
            adapter
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |var| {
            pairs
                .iter()
                .find(|(k, _)| *k == var)
                .map(|(_, v)| (*v).to_owned())
        }
    }

    #[test]
    fn defaults_apply_without_overrides() {
        let config = RuntimeConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.import_module, "env");
        assert_eq!(config.refresh_rate_hz, 60.0);
    }

    #[test]
    fn overrides_are_read() {
        let config = RuntimeConfig::from_lookup(lookup_from(&[
            (ENV_FPS, " 30 "),
            (ENV_IMPORT_MODULE, "host"),
        ]))
        .unwrap();
        assert_eq!(config.refresh_rate_hz, 30.0);
        assert_eq!(config.import_module, "host");
    }

    #[test]
    fn bad_values_are_rejected() {
        assert_eq!(
            RuntimeConfig::from_lookup(lookup_from(&[(ENV_FPS, "fast")])),
            Err(ConfigError::NotANumber {
                var: ENV_FPS,
                value: "fast".into()
            })
        );
        assert_eq!(
            RuntimeConfig::from_lookup(lookup_from(&[(ENV_FPS, "0")])),
            Err(ConfigError::InvalidRefreshRate(0.0))
        );
        assert_eq!(
            RuntimeConfig::from_lookup(lookup_from(&[(ENV_IMPORT_MODULE, "")])),
            Err(ConfigError::EmptyImportModule)
        );
    }

    #[test]
    fn adapter_carries_namespace_and_system_source() {
        let adapter = RuntimeConfig::default().adapter();
        assert_eq!(adapter.namespace(), "env");
        assert!(!adapter.lookup(system::SYSTEM_LOG).is_stub());

        let bare = RuntimeConfig {
            system_bindings: false,
            ..RuntimeConfig::default()
        };
        assert!(bare.adapter().sources().is_empty());
        assert!(bare.adapter().lookup(system::SYSTEM_LOG).is_stub());
    }
}
