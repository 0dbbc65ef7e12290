//! Tests for #[derive(Action)] macro

use taskboard_macros::Action;

#[derive(Action, Clone, Debug, PartialEq)]
enum TaskAction {
    #[command]
    CreateTask { title: String },

    #[command]
    ListTasks,

    CommitCreate { title: String },

    Tick(u32),

    #[event]
    TaskCreated { id: u64 },

    #[event]
    TaskRejected(String),
}

#[test]
fn test_is_command() {
    let action = TaskAction::CreateTask {
        title: "Write docs".to_string(),
    };
    assert!(action.is_command());
    assert!(!action.is_event());
    assert!(!action.is_internal());
    assert!(TaskAction::ListTasks.is_command());
}

#[test]
fn test_is_event() {
    let action = TaskAction::TaskCreated { id: 3 };
    assert!(!action.is_command());
    assert!(action.is_event());
    assert!(TaskAction::TaskRejected("nope".into()).is_event());
}

#[test]
fn test_unmarked_variants_are_internal() {
    assert!(TaskAction::CommitCreate { title: String::new() }.is_internal());
    assert!(TaskAction::Tick(1).is_internal());
}

#[test]
fn test_name() {
    assert_eq!(TaskAction::ListTasks.name(), "ListTasks");
    assert_eq!(TaskAction::Tick(0).name(), "Tick");
    assert_eq!(TaskAction::TaskCreated { id: 1 }.name(), "TaskCreated");
}

#[derive(Action, Clone, Debug)]
enum Wrapper<T> {
    #[command]
    Send(T),
    #[event]
    Sent,
}

#[test]
fn test_generic_enum() {
    assert!(Wrapper::Send(5_u8).is_command());
    assert!(Wrapper::<u8>::Sent.is_event());
    assert_eq!(Wrapper::<u8>::Sent.name(), "Sent");
}
