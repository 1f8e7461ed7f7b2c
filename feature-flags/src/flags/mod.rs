pub mod environment_gate;
pub mod flag_models;
pub mod flag_resolver;
pub mod flag_source;
pub mod overrides;
pub mod subscriptions;
