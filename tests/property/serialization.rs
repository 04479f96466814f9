//! Property-based protocol tests.
//!
//! Uses proptest to verify:
//! 1. Any task list carried by a list event decodes back intact, in order,
//!    whichever of the three event types carries it.
//! 2. Any valid action survives encode → decode.
//! 3. Random strings never cause a panic in either decoder.

use proptest::prelude::*;
use serde_json::json;
use tasksync_proto::codec;
use tasksync_proto::{Action, ServerEvent, Task};

/// Strategy for generating arbitrary `Task` values.
fn arb_task() -> impl Strategy<Value = Task> {
    ("[a-zA-Z0-9-]{1,36}", "\\PC{0,80}", any::<bool>())
        .prop_map(|(id, text, completed)| Task::new(id, text).with_completed(completed))
}

/// Strategy for generating task lists of varying length.
fn arb_tasks() -> impl Strategy<Value = Vec<Task>> {
    prop::collection::vec(arb_task(), 0..32)
}

/// Strategy for the three list-carrying event tags.
fn arb_list_kind() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("tasks_overview"),
        Just("task_added"),
        Just("task_toggled"),
    ]
}

/// Strategy for generating arbitrary valid `Action` values.
fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        Just(Action::GetTasks),
        "\\PC*\\S\\PC*".prop_map(|text| Action::AddTask { text }),
        "[a-zA-Z0-9-]{1,36}".prop_map(Action::toggle_task),
    ]
}

proptest! {
    #[test]
    fn list_event_snapshot_matches_wire_list(kind in arb_list_kind(), tasks in arb_tasks()) {
        let frame = json!({ "type": kind, "tasks": tasks }).to_string();
        let event = codec::decode_event(&frame).unwrap();
        prop_assert_eq!(event.kind(), kind);
        prop_assert_eq!(event.into_snapshot(), Some(tasks));
    }

    #[test]
    fn encoded_event_decodes_to_same_event(tasks in arb_tasks()) {
        let event = ServerEvent::TasksOverview { tasks };
        let frame = codec::encode_event(&event).unwrap();
        prop_assert_eq!(codec::decode_event(&frame).unwrap(), event);
    }

    #[test]
    fn action_round_trip(action in arb_action()) {
        let frame = codec::encode_action(&action).unwrap();
        prop_assert_eq!(codec::decode_action(&frame).unwrap(), action);
    }

    #[test]
    fn random_strings_never_panic_decoders(input in "\\PC{0,256}") {
        let _ = codec::decode_event(&input);
        let _ = codec::decode_action(&input);
    }

    #[test]
    fn list_frames_without_tasks_are_rejected(kind in arb_list_kind()) {
        let frame = json!({ "type": kind }).to_string();
        prop_assert!(codec::decode_event(&frame).is_err());
    }
}
