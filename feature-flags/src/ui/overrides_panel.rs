use std::sync::Arc;

use serde::Serialize;

use crate::flags::flag_resolver::FlagResolver;

pub const PANEL_TITLE: &str = "Feature Flags";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverrideState {
    On,
    Off,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanelRow {
    pub key: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub state: OverrideState,
}

/// Lists every known flag with ON / OFF / DEFAULT controls.
pub struct OverridesPanel {
    resolver: Arc<FlagResolver>,
}

impl OverridesPanel {
    pub fn new(resolver: Arc<FlagResolver>) -> Self {
        Self { resolver }
    }

    pub fn title(&self) -> &'static str {
        PANEL_TITLE
    }

    pub fn state_of(&self, key: &str) -> OverrideState {
        if !self.resolver.is_overridden(key) {
            OverrideState::Default
        } else if self.resolver.is_on(key) {
            OverrideState::On
        } else {
            OverrideState::Off
        }
    }

    pub fn rows(&self) -> Vec<PanelRow> {
        self.resolver
            .get_all()
            .into_iter()
            .map(|flag| PanelRow {
                state: self.state_of(&flag.key),
                label: flag.label().to_string(),
                key: flag.key,
                description: flag.description,
            })
            .collect()
    }

    pub fn enable(&self, key: &str) {
        self.resolver.enable(key);
    }

    pub fn disable(&self, key: &str) {
        self.resolver.disable(key);
    }

    pub fn reset(&self, key: &str) {
        self.resolver.reset(key);
    }

    pub fn reset_all(&self) {
        self.resolver.reset_all();
    }
}
