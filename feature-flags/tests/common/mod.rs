use std::sync::{Arc, Mutex};

use feature_flag_overrides::ui::reactive_toggle::RenderHost;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomEvent {
    ScopeCreated(u32),
    Materialized(u32),
    Inserted(u32),
    Removed(u32),
    ScopeDestroyed(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Placeholder,
    Fragment(u32),
}

#[derive(Debug, Default)]
pub struct Dom {
    pub nodes: Vec<Node>,
    pub events: Vec<DomEvent>,
    pub live_scopes: Vec<u32>,
    next_scope: u32,
}

impl Dom {
    pub fn scopes_created(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, DomEvent::ScopeCreated(_)))
            .count()
    }
}

/// A render host over a shared, inspectable "DOM" holding one toggle slot.
#[derive(Clone)]
pub struct TestHost {
    pub dom: Arc<Mutex<Dom>>,
}

impl TestHost {
    pub fn new() -> Self {
        let dom = Dom {
            nodes: vec![Node::Placeholder],
            ..Default::default()
        };
        Self {
            dom: Arc::new(Mutex::new(dom)),
        }
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.dom.lock().unwrap().nodes.clone()
    }
}

impl RenderHost for TestHost {
    type Scope = u32;
    type Fragment = u32;

    fn create_scope(&mut self) -> u32 {
        let mut dom = self.dom.lock().unwrap();
        dom.next_scope += 1;
        let scope = dom.next_scope;
        dom.live_scopes.push(scope);
        dom.events.push(DomEvent::ScopeCreated(scope));
        scope
    }

    fn materialize(&mut self, scope: &u32) -> u32 {
        let mut dom = self.dom.lock().unwrap();
        assert!(dom.live_scopes.contains(scope), "materialized into a dead scope");
        dom.events.push(DomEvent::Materialized(*scope));
        *scope
    }

    fn show_fragment(&mut self, fragment: &u32) {
        let mut dom = self.dom.lock().unwrap();
        assert_eq!(dom.nodes, vec![Node::Placeholder]);
        dom.nodes = vec![Node::Fragment(*fragment)];
        dom.events.push(DomEvent::Inserted(*fragment));
    }

    fn hide_fragment(&mut self, fragment: u32) {
        let mut dom = self.dom.lock().unwrap();
        assert_eq!(dom.nodes, vec![Node::Fragment(fragment)]);
        dom.nodes = vec![Node::Placeholder];
        dom.events.push(DomEvent::Removed(fragment));
    }

    fn destroy_scope(&mut self, scope: u32) {
        let mut dom = self.dom.lock().unwrap();
        dom.live_scopes.retain(|s| *s != scope);
        dom.events.push(DomEvent::ScopeDestroyed(scope));
    }
}
