//! Tests for #[derive(State)] macro

use taskboard_macros::State;

#[derive(State, Clone, Debug, Default)]
struct TaskState {
    pub titles: Vec<String>,
    #[revision]
    pub revision: u64,
}

#[derive(State, Clone, Debug, Default)]
struct CounterState {
    pub count: u32,
}

#[test]
fn test_revision_accessor() {
    let state = TaskState {
        titles: vec!["a".into()],
        revision: 5,
    };
    assert_eq!(state.revision(), 5);
}

#[test]
fn test_bump_revision() {
    let mut state = TaskState::default();
    assert_eq!(state.bump_revision(), 1);
    assert_eq!(state.bump_revision(), 2);
    assert_eq!(state.revision(), 2);
}

#[test]
fn test_bump_revision_wraps() {
    let mut state = TaskState {
        titles: Vec::new(),
        revision: u64::MAX,
    };
    assert_eq!(state.bump_revision(), 0);
}

#[test]
fn test_state_without_revision() {
    let state = CounterState { count: 3 };
    assert_eq!(state.count, 3);
}
