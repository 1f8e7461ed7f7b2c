use assert_json_diff::assert_json_include;
use serde_json::json;

use feature_flag_overrides::flags::flag_models::ServerPayload;
use feature_flag_overrides::test_utils::{sample_flags_json, setup_resolver};
use feature_flag_overrides::ui::overrides_panel::OverridesPanel;
use feature_flag_overrides::ui::reactive_toggle::{ReactiveToggle, ToggleBinding};

use crate::common::*;
mod common;

#[test]
fn it_drives_toggles_from_panel_controls() {
    let (resolver, _, _) = setup_resolver("production");
    resolver.set_from_server(ServerPayload::from_value(sample_flags_json()).unwrap());

    let host = TestHost::new();
    let _binding = ToggleBinding::bind(&resolver, ReactiveToggle::new("beta-export", host.clone()));
    let panel = OverridesPanel::new(resolver.clone());
    assert_eq!(host.nodes(), vec![Node::Placeholder]);

    panel.enable("beta-export");
    assert_eq!(host.nodes(), vec![Node::Fragment(1)]);

    assert_json_include!(
        actual: serde_json::to_value(panel.rows()).unwrap(),
        expected: json!([
            {"key": "new-dashboard", "state": "default"},
            {"key": "beta-export", "state": "on"},
            {"key": "shapeshift", "state": "default"}
        ])
    );

    panel.reset_all();
    assert_eq!(host.nodes(), vec![Node::Placeholder]);
}
