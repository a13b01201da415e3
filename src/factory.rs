//! Name → constructor registry that resolves named actions into fresh
//! instances with dependency injection (§4.3).
//!
//! Uses `indexmap::IndexMap` rather than `std::collections::HashMap` because
//! the contract requires `list()` to return names in insertion order and
//! re-registration to replace a constructor in place without moving it to
//! the back — exactly `IndexMap::insert`'s behavior for an existing key.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::action::Action;
use crate::error::FactoryError;

/// Constructs a fresh action instance given optional injected dependencies.
/// Returning `None` is legal (§4.3 edge cases) and is propagated verbatim by
/// `create`.
pub type ActionConstructor<D> =
    Arc<dyn Fn(Option<Arc<D>>) -> Option<Box<dyn Action<D>>> + Send + Sync>;

/// An insertion-ordered `actionName → constructor` registry (§3, §4.3).
///
/// Process-wide there may be one optional global `ActionFactory` plus any
/// number of per-worker ones; the engine never consults a global factory
/// implicitly (§4.3), so this type carries no notion of global-ness itself —
/// callers choose whether the instance they hold is "the" global one.
pub struct ActionFactory<D> {
    constructors: IndexMap<String, ActionConstructor<D>>,
}

impl<D> Default for ActionFactory<D> {
    fn default() -> Self {
        Self {
            constructors: IndexMap::new(),
        }
    }
}

impl<D> ActionFactory<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the constructor registered under `name`. Replacing
    /// an existing name preserves its original insertion position.
    pub fn register(&mut self, name: impl Into<String>, constructor: ActionConstructor<D>) {
        self.constructors.insert(name.into(), constructor);
    }

    /// Construct a fresh instance of the action registered under `name`.
    ///
    /// Fails with `FactoryError::ActionUnregistered` if `name` was never
    /// registered. If the constructor itself returns `None`, that `None` is
    /// returned as `Ok(None)` — the factory does not treat it as an error.
    pub fn create(
        &self,
        name: &str,
        deps: Option<Arc<D>>,
    ) -> Result<Option<Box<dyn Action<D>>>, FactoryError> {
        match self.constructors.get(name) {
            Some(constructor) => Ok(constructor(deps)),
            None => Err(FactoryError::ActionUnregistered(name.to_owned())),
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Names in insertion order, no duplicates.
    pub fn list(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, NoOpAction};
    use crate::data::{ActionContext, JobData};
    use crate::error::ActionError;
    use async_trait::async_trait;
    use serde_json::json;

    struct Deps;

    fn noop_constructor() -> ActionConstructor<Deps> {
        Arc::new(|_deps| Some(Box::new(NoOpAction::new("noop"))))
    }

    #[test]
    fn unregistered_name_fails_with_distinct_error() {
        let factory: ActionFactory<Deps> = ActionFactory::new();
        let err = factory.create("missing", None).unwrap_err();
        assert_eq!(err, FactoryError::ActionUnregistered("missing".into()));
    }

    #[test]
    fn empty_string_name_is_legal() {
        let mut factory: ActionFactory<Deps> = ActionFactory::new();
        factory.register("", noop_constructor());
        assert!(factory.is_registered(""));
        assert!(factory.create("", None).unwrap().is_some());
    }

    #[test]
    fn create_always_yields_a_fresh_instance() {
        let mut factory: ActionFactory<Deps> = ActionFactory::new();
        factory.register("noop", noop_constructor());

        let one = factory.create("noop", None).unwrap().unwrap();
        let two = factory.create("noop", None).unwrap().unwrap();
        // Distinct heap allocations: comparing vtable+data pointers of the trait objects.
        let one_ptr = Box::as_ref(&one) as *const dyn Action<Deps> as *const ();
        let two_ptr = Box::as_ref(&two) as *const dyn Action<Deps> as *const ();
        assert_ne!(one_ptr, two_ptr);
    }

    #[test]
    fn re_registering_replaces_constructor_but_preserves_position() {
        struct Marker(&'static str);

        #[async_trait]
        impl Action<Deps> for Marker {
            fn name(&self) -> &str {
                self.0
            }

            async fn execute(
                &self,
                data: JobData,
                _deps: &Deps,
                _context: &ActionContext,
            ) -> Result<JobData, ActionError> {
                Ok(data)
            }
        }

        let mut factory: ActionFactory<Deps> = ActionFactory::new();
        factory.register("a", Arc::new(|_| Some(Box::new(Marker("a-v1")))));
        factory.register("b", Arc::new(|_| Some(Box::new(Marker("b")))));
        factory.register("a", Arc::new(|_| Some(Box::new(Marker("a-v2")))));

        assert_eq!(factory.list(), vec!["a", "b"]);
        let a = factory.create("a", None).unwrap().unwrap();
        assert_eq!(a.name(), "a-v2");
    }

    #[test]
    fn constructor_returning_none_is_returned_as_none() {
        let mut factory: ActionFactory<Deps> = ActionFactory::new();
        factory.register("absent", Arc::new(|_| None));
        let created = factory.create("absent", None).unwrap();
        assert!(created.is_none());
    }

    #[test]
    fn deps_are_passed_through_verbatim() {
        let seen: Arc<std::sync::Mutex<Option<u32>>> = Arc::new(std::sync::Mutex::new(None));
        let mut factory: ActionFactory<u32> = ActionFactory::new();
        factory.register("capture", {
            let seen = seen.clone();
            Arc::new(move |deps: Option<Arc<u32>>| {
                *seen.lock().unwrap() = deps.map(|d| *d);
                Some(Box::new(NoOpAction::new("capture")) as Box<dyn Action<u32>>)
            })
        });

        factory.create("capture", Some(Arc::new(7))).unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(7));
    }

    #[test]
    fn list_has_no_duplicates_after_replacement() {
        let mut factory: ActionFactory<Deps> = ActionFactory::new();
        factory.register("a", noop_constructor());
        factory.register("a", noop_constructor());
        assert_eq!(factory.list(), vec!["a"]);
    }
}
