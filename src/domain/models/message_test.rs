use test_utils::long_reply_fixture;

use super::Message;
use super::Role;

#[test]
fn it_executes_new() {
    let msg = Message::new(Role::User, "Hi there!");
    assert_eq!(msg.role, Role::User);
    assert_eq!(msg.role.to_string(), "user");
    assert_eq!(msg.content, "Hi there!".to_string());
}

#[test]
fn it_keeps_tabs_in_content() {
    let msg = Message::new(Role::Assistant, "\t\tHi there!");
    assert_eq!(msg.content, "\t\tHi there!".to_string());
}

#[test]
fn it_executes_append() {
    let mut msg = Message::new(Role::Assistant, "Hi there!");
    msg.append(" It's me!");
    assert_eq!(msg.content, "Hi there! It's me!");
}

#[test]
fn it_wraps_on_word_boundaries() {
    let msg = Message::new(Role::User, "hello world again");
    assert_eq!(msg.as_string_lines(11), vec!["hello world", "again"]);
}

#[test]
fn it_splits_words_wider_than_a_line() {
    let msg = Message::new(Role::User, "abcdefghij");
    assert_eq!(msg.as_string_lines(4), vec!["abcd", "efgh", "ij"]);
}

#[test]
fn it_keeps_blank_lines() {
    let msg = Message::new(Role::User, "first\n\nsecond");
    assert_eq!(msg.as_string_lines(20), vec!["first", "", "second"]);
}

#[test]
fn it_replaces_tabs_when_wrapping() {
    let msg = Message::new(Role::User, "\tindented");
    assert_eq!(msg.as_string_lines(20), vec!["  indented"]);
}

#[test]
fn it_wraps_long_replies() {
    let msg = Message::new(Role::Assistant, long_reply_fixture());
    let lines = msg.as_string_lines(40);

    assert!(lines.iter().all(|line| return line.chars().count() <= 40));
    insta::assert_snapshot!(lines.join("\n"), @r###"
    Sure! Here is a short overview of the
    three primary colours used when mixing
    paint, along with a little history about
    how they came to be taught in schools.

    Red, yellow and blue.

    That's it!
    "###);
}

#[test]
fn it_previews_the_first_line() {
    let msg = Message::new(Role::User, "\n  What is the weather like?\nIn Paris.");
    assert_eq!(msg.preview(70), "What is the weather like?");
}

#[test]
fn it_shortens_long_previews() {
    let msg = Message::new(Role::User, "abcdefghijklmnop");
    assert_eq!(msg.preview(10), "abcdefg...");
}
