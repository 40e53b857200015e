// SPDX-License-Identifier: GPL-3.0-only

//! Thread-safe ordered set of active effects
//!
//! Control threads add and remove effects at any time while the processing
//! thread iterates them once per frame. All access goes through one mutex and
//! the processing thread only ever iterates a [`EffectRegistry::snapshot`], so
//! a change made mid-frame is first seen by the next frame.

use super::{EffectRef, same_effect};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Ordered, duplicate-free list of effects (insertion order = application order)
///
/// Cloning yields another handle onto the same registry.
#[derive(Clone, Default)]
pub struct EffectRegistry {
    effects: Arc<Mutex<Vec<EffectRef>>>,
}

impl EffectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // The Vec is never left half-updated, so a poisoned lock is still usable.
    fn guard(&self) -> MutexGuard<'_, Vec<EffectRef>> {
        self.effects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an effect unless the same instance is already registered
    ///
    /// Returns `false` (and leaves the registry unchanged) for a duplicate.
    pub fn register(&self, effect: EffectRef) -> bool {
        let mut effects = self.guard();
        if effects.iter().any(|existing| same_effect(existing, &effect)) {
            debug!(effect = effect.name(), "Effect already registered");
            return false;
        }
        debug!(effect = effect.name(), position = effects.len(), "Effect registered");
        effects.push(effect);
        true
    }

    /// Remove the first entry that is the same instance as `effect`
    ///
    /// Returns `false` if it was not registered.
    pub fn unregister(&self, effect: &EffectRef) -> bool {
        let mut effects = self.guard();
        match effects
            .iter()
            .position(|existing| same_effect(existing, effect))
        {
            Some(index) => {
                effects.remove(index);
                debug!(effect = effect.name(), "Effect unregistered");
                true
            }
            None => false,
        }
    }

    /// Copy of the current ordering for one frame pass
    pub fn snapshot(&self) -> Vec<EffectRef> {
        self.guard().clone()
    }

    pub fn contains(&self, effect: &EffectRef) -> bool {
        self.guard()
            .iter()
            .any(|existing| same_effect(existing, effect))
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    /// Remove all effects
    pub fn clear(&self) {
        self.guard().clear();
    }

    /// Names of the registered effects, in order
    pub fn names(&self) -> Vec<String> {
        self.guard()
            .iter()
            .map(|effect| effect.name().to_string())
            .collect()
    }
}

impl std::fmt::Debug for EffectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::effect_fn;
    use std::thread;

    fn noop(name: &str) -> EffectRef {
        effect_fn(name, |image| image)
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let registry = EffectRegistry::new();
        let a = noop("a");

        assert!(registry.register(a.clone()));
        assert!(!registry.register(a.clone()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_equal_looking_effects_are_distinct() {
        let registry = EffectRegistry::new();
        assert!(registry.register(noop("same")));
        assert!(registry.register(noop("same")));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unregister_reports_presence() {
        let registry = EffectRegistry::new();
        let a = noop("a");
        let b = noop("b");

        assert!(!registry.unregister(&a));
        registry.register(a.clone());
        registry.register(b.clone());
        assert!(registry.unregister(&a));
        assert!(!registry.unregister(&a));
        assert_eq!(registry.names(), vec!["b".to_string()]);
    }

    #[test]
    fn test_snapshot_keeps_insertion_order() {
        let registry = EffectRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.register(noop(name));
        }
        let names: Vec<String> = registry
            .snapshot()
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let registry = EffectRegistry::new();
        let a = noop("a");
        registry.register(a.clone());

        let snapshot = registry.snapshot();
        registry.unregister(&a);
        registry.register(noop("b"));

        assert_eq!(snapshot.len(), 1);
        assert!(same_effect(&snapshot[0], &a));
    }

    #[test]
    fn test_concurrent_registration_never_duplicates() {
        let registry = EffectRegistry::new();
        let shared = noop("shared");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let shared = shared.clone();
                thread::spawn(move || {
                    let mut wins = 0usize;
                    for _ in 0..200 {
                        if registry.register(shared.clone()) {
                            wins += 1;
                        }
                        let _ = registry.snapshot();
                        registry.unregister(&shared);
                    }
                    wins
                })
            })
            .collect();

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert!(total > 0);
        assert!(registry.len() <= 1);
    }
}
