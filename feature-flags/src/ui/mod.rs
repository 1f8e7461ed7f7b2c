pub mod overrides_panel;
pub mod reactive_toggle;
