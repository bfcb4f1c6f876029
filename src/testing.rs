//! Shared fixtures for unit tests: a counter action set and a mutex-backed reducer store.

use parking_lot::Mutex;

use crate::store::{Action, Store};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum TestAction {
    Increment,
    Decrement,
    Add(i64),
}

impl Action for TestAction {
    fn action_type(&self) -> &str {
        match self {
            TestAction::Increment => "counter/increment",
            TestAction::Decrement => "counter/decrement",
            TestAction::Add(_) => "counter/add",
        }
    }
}

/// Counter reducer; `dispatch` returns the action it reduced.
#[derive(Default)]
pub(crate) struct CounterStore {
    value: Mutex<i64>,
    log: Mutex<Vec<TestAction>>,
}

impl CounterStore {
    pub(crate) fn dispatched(&self) -> Vec<TestAction> {
        self.log.lock().clone()
    }
}

impl Store for CounterStore {
    type State = i64;
    type Action = TestAction;
    type Output = TestAction;

    fn get_state(&self) -> i64 {
        *self.value.lock()
    }

    fn dispatch(&self, action: TestAction) -> TestAction {
        {
            let mut value = self.value.lock();
            match &action {
                TestAction::Increment => *value += 1,
                TestAction::Decrement => *value -= 1,
                TestAction::Add(by) => *value += by,
            }
        }
        self.log.lock().push(action.clone());
        action
    }
}
