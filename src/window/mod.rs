use serde::{Deserialize, Serialize};

/// Raw foreground-window notification delivered by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowEvent {
    pub package_name: String,
    pub class_name: String,
    #[serde(default)]
    pub forced_recheck: bool,
}

impl WindowEvent {
    pub fn new(package_name: &str, class_name: &str) -> Self {
        Self {
            package_name: package_name.to_string(),
            class_name: class_name.to_string(),
            forced_recheck: false,
        }
    }

    pub fn forced(package_name: &str, class_name: &str) -> Self {
        Self {
            forced_recheck: true,
            ..Self::new(package_name, class_name)
        }
    }
}

/// Per-instance view of the last window seen. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowState {
    pub last_package_name: String,
    pub last_class_name: String,
    pub lock_screen_passed: bool,
}

pub struct WindowEventNormalizer {
    lock_on_package_change_only: bool,
    state: WindowState,
}

impl WindowEventNormalizer {
    pub fn new(lock_on_package_change_only: bool) -> Self {
        Self {
            lock_on_package_change_only,
            state: WindowState::default(),
        }
    }

    pub fn state(&self) -> &WindowState {
        &self.state
    }

    /// Record `event` and report whether the state machine should evaluate it.
    pub fn observe(&mut self, event: &WindowEvent) -> bool {
        let package_changed = event.package_name != self.state.last_package_name;
        if package_changed {
            self.state.last_package_name.clone_from(&event.package_name);
        }

        let class_changed = event.class_name != self.state.last_class_name;
        if class_changed {
            self.state.last_class_name.clone_from(&event.class_name);
        }

        let significant = if self.lock_on_package_change_only {
            class_changed && package_changed
        } else {
            class_changed
        };

        significant || event.forced_recheck || !self.state.lock_screen_passed
    }

    pub fn set_lock_screen_passed(&mut self, passed: bool) {
        self.state.lock_screen_passed = passed;
    }

    /// Forget the last window so the next event is always treated as new.
    pub fn reset(&mut self) {
        self.state.last_package_name.clear();
        self.state.last_class_name.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passed(lock_on_package_change_only: bool) -> WindowEventNormalizer {
        let mut normalizer = WindowEventNormalizer::new(lock_on_package_change_only);
        normalizer.set_lock_screen_passed(true);
        normalizer
    }

    #[test]
    fn test_first_event_is_significant() {
        let mut normalizer = passed(false);
        assert!(normalizer.observe(&WindowEvent::new("com.foo", "Main")));
        assert_eq!(normalizer.state().last_package_name, "com.foo");
        assert_eq!(normalizer.state().last_class_name, "Main");
    }

    #[test]
    fn test_same_window_is_not_significant_once_passed() {
        let mut normalizer = passed(false);
        normalizer.observe(&WindowEvent::new("com.foo", "Main"));

        assert!(!normalizer.observe(&WindowEvent::new("com.foo", "Main")));
    }

    #[test]
    fn test_same_window_triggers_until_lock_screen_passed() {
        let mut normalizer = WindowEventNormalizer::new(false);
        normalizer.observe(&WindowEvent::new("com.foo", "Main"));

        assert!(normalizer.observe(&WindowEvent::new("com.foo", "Main")));
    }

    #[test]
    fn test_class_change_within_package_triggers_by_default() {
        let mut normalizer = passed(false);
        normalizer.observe(&WindowEvent::new("com.foo", "Main"));

        assert!(normalizer.observe(&WindowEvent::new("com.foo", "Settings")));
    }

    #[test]
    fn test_class_change_within_package_ignored_in_package_only_mode() {
        let mut normalizer = passed(true);
        normalizer.observe(&WindowEvent::new("com.foo", "Main"));

        assert!(!normalizer.observe(&WindowEvent::new("com.foo", "Settings")));
        assert!(normalizer.observe(&WindowEvent::new("com.bar", "Main")));
    }

    #[test]
    fn test_forced_recheck_always_triggers() {
        let mut normalizer = passed(true);
        normalizer.observe(&WindowEvent::new("com.foo", "Main"));

        assert!(normalizer.observe(&WindowEvent::forced("com.foo", "Main")));
    }

    #[test]
    fn test_reset_forgets_names_only() {
        let mut normalizer = passed(false);
        normalizer.observe(&WindowEvent::new("com.foo", "Main"));

        normalizer.reset();

        assert_eq!(normalizer.state().last_package_name, "");
        assert!(normalizer.state().lock_screen_passed);
        assert!(normalizer.observe(&WindowEvent::new("com.foo", "Main")));
    }
}
