use std::collections::HashMap;
use std::str::FromStr;

use crate::config::Config;

#[derive(Debug, PartialEq, Eq)]
pub enum ParseRestrictedFlagsError {
    InvalidEntry(String),
}

impl std::fmt::Display for ParseRestrictedFlagsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseRestrictedFlagsError::InvalidEntry(entry) => {
                write!(f, "Invalid restricted flag entry: {}", entry)
            }
        }
    }
}

impl std::error::Error for ParseRestrictedFlagsError {}

/// Flag keys that may only be on in one deployment environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestrictedFlags(HashMap<String, String>);

impl RestrictedFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restrict(mut self, key: &str, environment: &str) -> Self {
        self.0
            .insert(key.to_string(), environment.trim().to_lowercase());
        self
    }

    pub fn required_environment(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for RestrictedFlags {
    type Err = ParseRestrictedFlagsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("none") {
            return Ok(RestrictedFlags::default());
        }

        let mut restricted = RestrictedFlags::default();
        for part in s.split(',').map(|p| p.trim()).filter(|p| !p.is_empty()) {
            let (key, environment) = part
                .split_once(':')
                .ok_or_else(|| ParseRestrictedFlagsError::InvalidEntry(part.to_string()))?;
            let (key, environment) = (key.trim(), environment.trim());
            if key.is_empty() || environment.is_empty() {
                return Err(ParseRestrictedFlagsError::InvalidEntry(part.to_string()));
            }
            restricted = restricted.restrict(key, environment);
        }
        Ok(restricted)
    }
}

/// Keeps restricted flags off outside the environment they belong to. Consulted before
/// overrides and server values.
#[derive(Debug, Clone)]
pub struct EnvironmentGate {
    environment: String,
    restricted: RestrictedFlags,
}

impl EnvironmentGate {
    pub fn new(environment: &str, restricted: RestrictedFlags) -> Self {
        Self {
            environment: environment.trim().to_lowercase(),
            restricted,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.deployment_environment,
            config.restricted_flags.clone(),
        )
    }

    /// A gate with no restricted keys; allows everything.
    pub fn open(environment: &str) -> Self {
        Self::new(environment, RestrictedFlags::default())
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn allows(&self, key: &str) -> bool {
        match self.restricted.required_environment(key) {
            Some(required) => required == self.environment,
            None => true,
        }
    }
}
