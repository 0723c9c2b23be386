#[cfg(test)]
#[path = "actions_test.rs"]
mod tests;

use futures::stream::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::models::Event;
use crate::domain::models::ReplyStream;

pub fn help_text() -> String {
    let text = r#"
COMMANDS:
- /new (/n) - Starts a new session and switches to it.
- /delete (/d) - Closes the current session. Its messages stay in the database.
- /select (/s) [SESSION_NUMBER] - Switches to the session with the given number from the sidebar.
- /sessions (/ls) - Lists the open sessions with their ids.
- /quit /exit (/q) - Exit Parley.
- /help (/h) - Provides this help menu.

HOTKEYS:
- Enter - Send your message
- Tab - Next session
- CTRL+P - Previous session
- CTRL+N - New session
- CTRL+W - Close the current session
- Up arrow - Scroll up
- Down arrow - Scroll down
- CTRL+U / Page Up - Page up
- CTRL+D / Page Down - Page down
- CTRL+C - Exit Parley.

While a reply is being generated, switching, creating, and closing sessions is disabled until the reply completes.
        "#;

    return text.trim().to_string();
}

pub struct ActionsService {}

impl ActionsService {
    /// Drains a reply stream on its own task, forwarding every fragment to the
    /// UI as it arrives. Exactly one of `ReplyDone` or `ReplyFailed` is sent
    /// last, unless the UI has already gone away.
    pub fn forward_reply(
        mut stream: ReplyStream,
        tx: mpsc::UnboundedSender<Event>,
    ) -> JoinHandle<()> {
        return tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(fragment) => {
                        if tx.send(Event::ReplyFragment(fragment)).is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        if let Err(send_err) = tx.send(Event::ReplyFailed(err)) {
                            tracing::error!(error = %send_err, "Failed to report reply failure");
                        }
                        return;
                    }
                }
            }

            if tx.send(Event::ReplyDone()).is_err() {
                tracing::debug!("UI closed before reply finished");
            }
        });
    }
}
