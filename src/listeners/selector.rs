//! # Selectors: which actions a listener reacts to.
//!
//! A [`Selector`] has exactly one variant populated. At registration it is resolved once
//! into a normalized predicate `(action, state_after, state_before) -> bool`, which is all
//! the dispatcher ever calls.
//!
//! | Variant         | Matches when                                          |
//! |-----------------|-------------------------------------------------------|
//! | `Type`          | `action.action_type() == ty`                          |
//! | `ActionCreator` | `creator.matches(action)` (type discriminant by default) |
//! | `Matcher`       | `matcher(action)`                                     |
//! | `Predicate`     | `predicate(action, state_after, state_before)`        |
//!
//! ## Identity
//! Two selectors are the *same* when they are the same variant and either the type strings
//! are equal or the `Arc`s point to the same allocation. Registration deduplicates on
//! selector identity plus effect identity.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::store::Action;

/// Shared matcher over actions.
pub type MatcherFn<A> = Arc<dyn Fn(&A) -> bool + Send + Sync>;

/// Shared predicate over `(action, state_after, state_before)`.
pub type PredicateFn<S, A> = Arc<dyn Fn(&A, &S, &S) -> bool + Send + Sync>;

/// Something that builds actions of one type and can recognise them.
pub trait ActionCreator<A>: Send + Sync + 'static {
    /// The type string of the actions this creator builds.
    fn action_type(&self) -> &str;

    /// True if `action` was built by this creator.
    fn matches(&self, action: &A) -> bool
    where
        A: Action,
    {
        action.action_type() == self.action_type()
    }
}

/// Function-backed action creator.
///
/// # Example
/// ```
/// use listenvisor::{Action, ActionCreator, CreatorFn};
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct Named { ty: &'static str, by: i64 }
/// impl Action for Named {
///     fn action_type(&self) -> &str { self.ty }
/// }
///
/// let add = CreatorFn::new("counter/add", |by: i64| Named { ty: "counter/add", by });
/// let action = add.create(3);
/// assert!(ActionCreator::<Named>::matches(&add, &action));
/// assert_eq!(action.by, 3);
/// ```
pub struct CreatorFn<F> {
    action_type: Cow<'static, str>,
    build: F,
}

impl<F> CreatorFn<F> {
    /// Creates a creator for `action_type` using `build`.
    pub fn new(action_type: impl Into<Cow<'static, str>>, build: F) -> Self {
        Self {
            action_type: action_type.into(),
            build,
        }
    }

    /// Creates the creator and returns it as a shared handle.
    pub fn arc(action_type: impl Into<Cow<'static, str>>, build: F) -> Arc<Self> {
        Arc::new(Self::new(action_type, build))
    }

    /// Builds an action from `payload`.
    pub fn create<P, A>(&self, payload: P) -> A
    where
        F: Fn(P) -> A,
    {
        (self.build)(payload)
    }
}

impl<A, F> ActionCreator<A> for CreatorFn<F>
where
    F: Send + Sync + 'static,
{
    fn action_type(&self) -> &str {
        &self.action_type
    }
}

impl<F> fmt::Debug for CreatorFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreatorFn")
            .field("action_type", &self.action_type)
            .finish_non_exhaustive()
    }
}

/// Which actions a listener reacts to.
pub enum Selector<S, A> {
    /// Exact action type string.
    Type(Cow<'static, str>),
    /// Actions built by this creator.
    ActionCreator(Arc<dyn ActionCreator<A>>),
    /// Actions accepted by this matcher.
    Matcher(MatcherFn<A>),
    /// Actions for which this predicate holds, given the state after and before reduction.
    Predicate(PredicateFn<S, A>),
}

impl<S, A> Selector<S, A>
where
    S: 'static,
    A: Action,
{
    /// Short name of the populated variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Selector::Type(_) => "type",
            Selector::ActionCreator(_) => "action_creator",
            Selector::Matcher(_) => "matcher",
            Selector::Predicate(_) => "predicate",
        }
    }

    /// True if both selectors identify the same thing.
    pub fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Selector::Type(a), Selector::Type(b)) => a == b,
            (Selector::ActionCreator(a), Selector::ActionCreator(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            (Selector::Matcher(a), Selector::Matcher(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            (Selector::Predicate(a), Selector::Predicate(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            _ => false,
        }
    }

    /// Resolves the selector into the predicate the dispatcher evaluates.
    pub(crate) fn to_predicate(&self) -> PredicateFn<S, A> {
        match self {
            Selector::Type(ty) => {
                let ty = ty.clone();
                Arc::new(move |action: &A, _: &S, _: &S| action.action_type() == ty)
            }
            Selector::ActionCreator(creator) => {
                let creator = Arc::clone(creator);
                Arc::new(move |action: &A, _: &S, _: &S| creator.matches(action))
            }
            Selector::Matcher(matcher) => {
                let matcher = Arc::clone(matcher);
                Arc::new(move |action: &A, _: &S, _: &S| matcher(action))
            }
            Selector::Predicate(predicate) => Arc::clone(predicate),
        }
    }
}

impl<S, A> Clone for Selector<S, A> {
    fn clone(&self) -> Self {
        match self {
            Selector::Type(ty) => Selector::Type(ty.clone()),
            Selector::ActionCreator(c) => Selector::ActionCreator(Arc::clone(c)),
            Selector::Matcher(m) => Selector::Matcher(Arc::clone(m)),
            Selector::Predicate(p) => Selector::Predicate(Arc::clone(p)),
        }
    }
}

impl<S, A: 'static> fmt::Debug for Selector<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Type(ty) => f.debug_tuple("Type").field(ty).finish(),
            Selector::ActionCreator(c) => f.debug_tuple("ActionCreator").field(&c.action_type()).finish(),
            Selector::Matcher(_) => f.write_str("Matcher(..)"),
            Selector::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestAction;

    #[test]
    fn type_selector_matches_exact_string() {
        let sel: Selector<i64, TestAction> = Selector::Type("counter/increment".into());
        let pred = sel.to_predicate();
        assert!(pred(&TestAction::Increment, &1, &0));
        assert!(!pred(&TestAction::Decrement, &1, &0));
    }

    #[test]
    fn creator_selector_uses_discriminant() {
        let creator = CreatorFn::arc("counter/add", TestAction::Add);
        let sel: Selector<i64, TestAction> = Selector::ActionCreator(creator.clone());
        let pred = sel.to_predicate();
        assert!(pred(&creator.create(5), &5, &0));
        assert!(!pred(&TestAction::Increment, &1, &0));
    }

    #[test]
    fn predicate_sees_after_then_before() {
        let sel: Selector<i64, TestAction> =
            Selector::Predicate(Arc::new(|_: &TestAction, after: &i64, before: &i64| after > before));
        let pred = sel.to_predicate();
        assert!(pred(&TestAction::Increment, &1, &0));
        assert!(!pred(&TestAction::Decrement, &0, &1));
    }

    #[test]
    fn identity_is_by_value_for_types_and_by_allocation_otherwise() {
        let a: Selector<i64, TestAction> = Selector::Type("x".into());
        let b: Selector<i64, TestAction> = Selector::Type(String::from("x").into());
        assert!(a.same_as(&b));

        let m1: MatcherFn<TestAction> = Arc::new(|_: &TestAction| true);
        let m2: MatcherFn<TestAction> = Arc::new(|_: &TestAction| true);
        let s1: Selector<i64, TestAction> = Selector::Matcher(m1.clone());
        assert!(s1.same_as(&Selector::Matcher(m1)));
        assert!(!s1.same_as(&Selector::Matcher(m2)));
        assert!(!s1.same_as(&a));
    }

    #[test]
    fn debug_shows_creator_type() {
        let creator = CreatorFn::arc("counter/add", TestAction::Add);
        let sel: Selector<i64, TestAction> = Selector::ActionCreator(creator);
        assert_eq!(format!("{sel:?}"), r#"ActionCreator("counter/add")"#);

        let sel: Selector<i64, TestAction> = Selector::Matcher(Arc::new(|_: &TestAction| true));
        assert_eq!(format!("{sel:?}"), "Matcher(..)");
    }
}
