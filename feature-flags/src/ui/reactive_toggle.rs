use std::sync::{Arc, Mutex, MutexGuard};

use crate::flags::flag_resolver::FlagResolver;
use crate::flags::subscriptions::Subscription;

/// The rendering collaborator. It owns the actual tree; the toggle only tells it when to
/// swap the placeholder for the content and back.
pub trait RenderHost {
    type Scope;
    type Fragment;

    fn create_scope(&mut self) -> Self::Scope;

    /// Builds the toggled content bound to `scope`, detached from the tree.
    fn materialize(&mut self, scope: &Self::Scope) -> Self::Fragment;

    /// Inserts `fragment` where the placeholder sits, then removes the placeholder.
    fn show_fragment(&mut self, fragment: &Self::Fragment);

    /// Puts the placeholder back where `fragment` sits, then removes the fragment.
    fn hide_fragment(&mut self, fragment: Self::Fragment);

    /// Releases everything bound to `scope`. The scope is never used again.
    fn destroy_scope(&mut self, scope: Self::Scope);
}

enum ToggleState<S, F> {
    Hidden,
    Shown { scope: S, fragment: F },
}

/// Shows a piece of content while a flag resolves on (or off, when inverted), with a
/// placeholder in its place otherwise. Each shown interval gets a fresh scope which is
/// destroyed when the content is hidden again.
pub struct ReactiveToggle<H: RenderHost> {
    key: String,
    invert: bool,
    host: H,
    state: ToggleState<H::Scope, H::Fragment>,
}

impl<H: RenderHost> ReactiveToggle<H> {
    pub fn new(key: &str, host: H) -> Self {
        Self {
            key: key.to_string(),
            invert: false,
            host,
            state: ToggleState::Hidden,
        }
    }

    /// Content shows while the flag is off.
    pub fn inverted(key: &str, host: H) -> Self {
        Self {
            invert: true,
            ..Self::new(key, host)
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_inverted(&self) -> bool {
        self.invert
    }

    pub fn is_shown(&self) -> bool {
        matches!(self.state, ToggleState::Shown { .. })
    }

    /// Text of the placeholder marker left in the content's place.
    pub fn placeholder_text(&self) -> String {
        format!(
            " featureFlag: {} is {} ",
            self.key,
            if self.invert { "on" } else { "off" }
        )
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Feeds a newly resolved flag value. Repeated values are ignored.
    pub fn on_change(&mut self, enabled: bool) {
        let show = enabled != self.invert;
        if show {
            self.show();
        } else {
            self.hide();
        }
    }

    fn show(&mut self) {
        if self.is_shown() {
            return;
        }
        let scope = self.host.create_scope();
        let fragment = self.host.materialize(&scope);
        self.host.show_fragment(&fragment);
        tracing::debug!(key = %self.key, "flag content shown");
        self.state = ToggleState::Shown { scope, fragment };
    }

    /// Hides the content if it is shown. Also used for teardown.
    pub fn hide(&mut self) {
        if let ToggleState::Shown { scope, fragment } =
            std::mem::replace(&mut self.state, ToggleState::Hidden)
        {
            self.host.destroy_scope(scope);
            self.host.hide_fragment(fragment);
            tracing::debug!(key = %self.key, "flag content hidden");
        }
    }
}

/// A toggle wired to a resolver. Dropping the binding unsubscribes and tears down any
/// shown content.
pub struct ToggleBinding<H: RenderHost> {
    toggle: Arc<Mutex<ReactiveToggle<H>>>,
    subscription: Option<Subscription>,
}

fn lock_toggle<H: RenderHost>(toggle: &Mutex<ReactiveToggle<H>>) -> MutexGuard<'_, ReactiveToggle<H>> {
    match toggle.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl<H> ToggleBinding<H>
where
    H: RenderHost + Send + 'static,
    H::Scope: Send,
    H::Fragment: Send,
{
    pub fn bind(resolver: &FlagResolver, toggle: ReactiveToggle<H>) -> Self {
        let key = toggle.key().to_string();
        let toggle = Arc::new(Mutex::new(toggle));
        let watched = toggle.clone();
        let subscription = resolver.subscribe(&key, move |enabled| {
            lock_toggle(&watched).on_change(enabled);
        });

        Self {
            toggle,
            subscription: Some(subscription),
        }
    }
}

impl<H: RenderHost> ToggleBinding<H> {
    pub fn toggle(&self) -> MutexGuard<'_, ReactiveToggle<H>> {
        lock_toggle(&self.toggle)
    }
}

impl<H: RenderHost> Drop for ToggleBinding<H> {
    fn drop(&mut self) {
        // unsubscribe first so no notification can re-show the content mid-teardown
        drop(self.subscription.take());
        lock_toggle(&self.toggle).hide();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Node {
        Placeholder,
        Fragment(u32),
    }

    /// Tracks the single slot a toggle controls, plus scope bookkeeping.
    #[derive(Default)]
    struct SlotHost {
        slot: Vec<Node>,
        next_scope: u32,
        live_scopes: Vec<u32>,
        destroyed: Vec<u32>,
    }

    impl SlotHost {
        fn new() -> Self {
            Self {
                slot: vec![Node::Placeholder],
                ..Default::default()
            }
        }
    }

    impl RenderHost for SlotHost {
        type Scope = u32;
        type Fragment = u32;

        fn create_scope(&mut self) -> u32 {
            self.next_scope += 1;
            self.live_scopes.push(self.next_scope);
            self.next_scope
        }

        fn materialize(&mut self, scope: &u32) -> u32 {
            assert!(self.live_scopes.contains(scope));
            *scope
        }

        fn show_fragment(&mut self, fragment: &u32) {
            assert_eq!(self.slot, vec![Node::Placeholder]);
            self.slot = vec![Node::Fragment(*fragment)];
        }

        fn hide_fragment(&mut self, fragment: u32) {
            assert_eq!(self.slot, vec![Node::Fragment(fragment)]);
            self.slot = vec![Node::Placeholder];
        }

        fn destroy_scope(&mut self, scope: u32) {
            self.live_scopes.retain(|s| *s != scope);
            self.destroyed.push(scope);
        }
    }

    #[test]
    fn test_starts_hidden() {
        let toggle = ReactiveToggle::new("x", SlotHost::new());
        assert!(!toggle.is_shown());
        assert_eq!(toggle.host().slot, vec![Node::Placeholder]);
        assert_eq!(toggle.placeholder_text(), " featureFlag: x is off ");
    }

    #[test]
    fn test_show_hide_cycle_uses_fresh_scopes() {
        let mut toggle = ReactiveToggle::new("x", SlotHost::new());

        toggle.on_change(true);
        assert_eq!(toggle.host().slot, vec![Node::Fragment(1)]);
        toggle.on_change(false);
        assert_eq!(toggle.host().slot, vec![Node::Placeholder]);
        toggle.on_change(true);
        assert_eq!(toggle.host().slot, vec![Node::Fragment(2)]);

        assert_eq!(toggle.host().destroyed, vec![1]);
        assert_eq!(toggle.host().live_scopes, vec![2]);
    }

    #[test]
    fn test_repeated_values_do_not_create_scopes() {
        let mut toggle = ReactiveToggle::new("x", SlotHost::new());
        toggle.on_change(true);
        toggle.on_change(true);
        toggle.on_change(false);
        toggle.on_change(false);
        assert_eq!(toggle.host().next_scope, 1);
        assert_eq!(toggle.host().destroyed, vec![1]);
    }

    #[test]
    fn test_inverted_shows_when_off() {
        let mut toggle = ReactiveToggle::inverted("x", SlotHost::new());
        assert_eq!(toggle.placeholder_text(), " featureFlag: x is on ");

        toggle.on_change(false);
        assert!(toggle.is_shown());
        toggle.on_change(true);
        assert!(!toggle.is_shown());
        assert_eq!(toggle.host().slot, vec![Node::Placeholder]);
    }

    #[test]
    fn test_hide_when_hidden_is_noop() {
        let mut toggle = ReactiveToggle::new("x", SlotHost::new());
        toggle.hide();
        assert!(toggle.host().destroyed.is_empty());
        assert_eq!(toggle.host().slot, vec![Node::Placeholder]);
    }
}
