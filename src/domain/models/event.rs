use tui_textarea::Input;

use super::CompletionError;

pub enum Event {
    KeyboardCharInput(Input),
    KeyboardCTRLC(),
    KeyboardCTRLN(),
    KeyboardCTRLP(),
    KeyboardCTRLW(),
    KeyboardEnter(),
    KeyboardPaste(String),
    KeyboardTab(),
    ReplyDone(),
    ReplyFailed(CompletionError),
    ReplyFragment(String),
    UIResize(),
    UIScrollDown(),
    UIScrollPageDown(),
    UIScrollPageUp(),
    UIScrollUp(),
    UITick(),
}
