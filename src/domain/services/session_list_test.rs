use super::session_labels;
use crate::domain::models::Message;
use crate::domain::models::Role;
use crate::domain::models::SessionEntry;

#[test]
fn it_labels_sessions_with_their_first_question() {
    let sessions = vec![
        SessionEntry::new(
            "a",
            "Session 1",
            vec![
                Message::new(Role::User, "\nWhat is the capital of France?"),
                Message::new(Role::Assistant, "Paris."),
            ],
        ),
        SessionEntry::new("b", "Session 2", vec![]),
    ];

    insta::assert_debug_snapshot!(session_labels(&sessions), @r###"
    [
        "1. Session 1\n   What is the cap...",
        "2. Session 2\n   (empty)",
    ]
    "###);
}
