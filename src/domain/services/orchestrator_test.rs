use std::sync::Arc;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream;
use futures::stream::StreamExt;
use serde_json::json;
use test_utils::temp_database;

use super::Orchestrator;
use super::TurnState;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::Backend;
use crate::domain::models::BackendName;
use crate::domain::models::CompletionError;
use crate::domain::models::Message;
use crate::domain::models::ReplyStream;
use crate::domain::models::Role;
use crate::domain::models::StoreError;
use crate::domain::models::TurnError;
use crate::infrastructure::backends::BackendManager;
use crate::infrastructure::store::SessionStore;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Failure {
    None,
    Rejected,
    MidStream,
    Empty,
}

struct FakeBackend {
    fragments: Vec<&'static str>,
    failure: Arc<Mutex<Failure>>,
    requests: Arc<Mutex<Vec<Vec<Message>>>>,
}

#[async_trait]
impl Backend for FakeBackend {
    fn name(&self) -> BackendName {
        return BackendName::OpenAI;
    }

    async fn health_check(&self) -> Result<(), CompletionError> {
        return Ok(());
    }

    async fn list_models(&self) -> Result<Vec<String>, CompletionError> {
        return Ok(vec!["fake".to_string()]);
    }

    async fn stream_reply(&self, transcript: &[Message]) -> Result<ReplyStream, CompletionError> {
        self.requests.lock().unwrap().push(transcript.to_vec());

        let failure = *self.failure.lock().unwrap();
        if failure == Failure::Rejected {
            return Err(CompletionError::Rejected {
                backend: BackendName::OpenAI,
                status: 500,
                body: "boom".to_string(),
            });
        }

        if failure == Failure::Empty {
            return Ok(stream::empty().boxed());
        }

        let mut items: Vec<Result<String, CompletionError>> = self
            .fragments
            .iter()
            .map(|fragment| return Ok(fragment.to_string()))
            .collect();

        if failure == Failure::MidStream {
            items.truncate(1);
            items.push(Err(CompletionError::Interrupted {
                backend: BackendName::OpenAI,
                reason: "connection reset".to_string(),
            }));
        }

        return Ok(stream::iter(items).boxed());
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    store: SessionStore,
    failure: Arc<Mutex<Failure>>,
    requests: Arc<Mutex<Vec<Vec<Message>>>>,
    orchestrator: Orchestrator,
}

async fn harness(max_context_messages: usize) -> Result<Harness> {
    let (dir, url) = temp_database();
    let store = SessionStore::connect(&url, 2).await?;
    store.ensure_schema().await?;

    let failure = Arc::new(Mutex::new(Failure::None));
    let requests = Arc::new(Mutex::new(vec![]));
    let backend = FakeBackend {
        fragments: vec!["Hi", " there", "!"],
        failure: failure.clone(),
        requests: requests.clone(),
    };

    let orchestrator = Orchestrator::new(store.clone(), Box::new(backend), max_context_messages);

    return Ok(Harness {
        _dir: dir,
        store,
        failure,
        requests,
        orchestrator,
    });
}

fn current_id(orchestrator: &Orchestrator) -> String {
    return orchestrator.current().unwrap().id.to_string();
}

mod load {
    use super::*;

    #[tokio::test]
    async fn it_creates_a_session_when_store_is_empty() -> Result<()> {
        let mut h = harness(0).await?;
        h.orchestrator.load(None).await?;

        assert_eq!(h.orchestrator.sessions().len(), 1);
        assert_eq!(h.orchestrator.current().unwrap().name, "Session 1");
        assert!(h.orchestrator.current().unwrap().messages.is_empty());
        assert_eq!(h.store.list_sessions().await?.len(), 1);

        return Ok(());
    }

    #[tokio::test]
    async fn it_loads_existing_sessions_with_transcripts() -> Result<()> {
        let mut h = harness(0).await?;
        let first = h.store.create_session().await?;
        let second = h.store.create_session().await?;
        h.store
            .append_message(&first, Role::User, "hello", None)
            .await?;

        h.orchestrator.load(None).await?;

        let sessions = h.orchestrator.sessions();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, first);
        assert_eq!(sessions[0].messages, vec![Message::new(Role::User, "hello")]);
        assert_eq!(sessions[1].id, second);
        assert_eq!(current_id(&h.orchestrator), second);

        return Ok(());
    }

    #[tokio::test]
    async fn it_opens_the_requested_session() -> Result<()> {
        let mut h = harness(0).await?;
        let first = h.store.create_session().await?;
        h.store.create_session().await?;

        h.orchestrator.load(Some(&first)).await?;
        assert_eq!(current_id(&h.orchestrator), first);
        assert_eq!(h.orchestrator.sessions().len(), 2);

        return Ok(());
    }

    #[tokio::test]
    async fn it_reopens_archived_sessions() -> Result<()> {
        let mut h = harness(0).await?;
        let archived = h.store.create_session().await?;
        h.store
            .append_message(&archived, Role::User, "old", None)
            .await?;
        h.store.archive_session(&archived).await?;

        h.orchestrator.load(Some(&archived)).await?;
        assert_eq!(current_id(&h.orchestrator), archived);
        assert_eq!(
            h.orchestrator.current().unwrap().messages,
            vec![Message::new(Role::User, "old")]
        );
        assert_eq!(h.store.list_sessions().await?.len(), 1);

        return Ok(());
    }

    #[tokio::test]
    async fn it_fails_for_unknown_sessions() -> Result<()> {
        let mut h = harness(0).await?;
        let res = h.orchestrator.load(Some("missing")).await;

        assert!(matches!(
            res,
            Err(TurnError::Store(StoreError::SessionNotFound(_)))
        ));
        assert!(h.store.list_sessions().await?.is_empty());

        return Ok(());
    }
}

mod sessions {
    use super::*;

    #[tokio::test]
    async fn it_names_new_sessions_in_order() -> Result<()> {
        let mut h = harness(0).await?;
        h.orchestrator.load(None).await?;
        let name = h.orchestrator.new_session().await?.name.to_string();

        assert_eq!(name, "Session 2");
        assert_eq!(h.orchestrator.current_index(), 1);

        return Ok(());
    }

    #[tokio::test]
    async fn it_selects_and_cycles_sessions() -> Result<()> {
        let mut h = harness(0).await?;
        h.orchestrator.load(None).await?;
        let first = current_id(&h.orchestrator);
        h.orchestrator.new_session().await?;
        h.orchestrator.new_session().await?;

        h.orchestrator.select_session(&first)?;
        assert_eq!(h.orchestrator.current_index(), 0);

        h.orchestrator.cycle_session(-1)?;
        assert_eq!(h.orchestrator.current_index(), 2);
        h.orchestrator.cycle_session(1)?;
        assert_eq!(h.orchestrator.current_index(), 0);

        let res = h.orchestrator.select_session("missing");
        assert!(matches!(res, Err(TurnError::UnknownSession(_))));

        return Ok(());
    }

    #[tokio::test]
    async fn it_keeps_messages_after_delete() -> Result<()> {
        let mut h = harness(0).await?;
        h.orchestrator.load(None).await?;
        let first = current_id(&h.orchestrator);
        h.orchestrator.submit("hello", |_| {}).await?;
        h.orchestrator.new_session().await?;

        h.orchestrator.delete_session(&first).await?;

        assert_eq!(h.orchestrator.sessions().len(), 1);
        assert!(h.orchestrator.sessions().iter().all(|entry| return entry.id != first));
        assert_eq!(h.store.list_messages(&first).await?.len(), 2);
        assert!(h
            .store
            .list_sessions()
            .await?
            .iter()
            .all(|record| return record.id != first));

        return Ok(());
    }

    #[tokio::test]
    async fn it_moves_to_first_session_when_deleting_current() -> Result<()> {
        let mut h = harness(0).await?;
        h.orchestrator.load(None).await?;
        let first = current_id(&h.orchestrator);
        h.orchestrator.new_session().await?;
        h.orchestrator.new_session().await?;
        let third = current_id(&h.orchestrator);

        h.orchestrator.delete_session(&third).await?;
        assert_eq!(current_id(&h.orchestrator), first);

        return Ok(());
    }

    #[tokio::test]
    async fn it_creates_a_session_when_deleting_the_last() -> Result<()> {
        let mut h = harness(0).await?;
        h.orchestrator.load(None).await?;
        let only = current_id(&h.orchestrator);

        h.orchestrator.delete_session(&only).await?;

        assert_eq!(h.orchestrator.sessions().len(), 1);
        assert_ne!(current_id(&h.orchestrator), only);
        assert_eq!(h.orchestrator.current().unwrap().name, "Session 2");

        return Ok(());
    }
}

mod turns {
    use super::*;

    #[tokio::test]
    async fn it_persists_both_sides_of_a_turn() -> Result<()> {
        let mut h = harness(0).await?;
        h.orchestrator.load(None).await?;
        let id = current_id(&h.orchestrator);

        let mut seen: Vec<String> = vec![];
        let reply = h
            .orchestrator
            .submit("hello", |accumulated| {
                seen.push(accumulated.to_string());
            })
            .await?;

        assert_eq!(reply, "Hi there!");
        assert_eq!(seen, vec!["Hi", "Hi there", "Hi there!"]);

        let persisted = h.store.list_messages(&id).await?;
        assert_eq!(
            persisted,
            vec![
                Message::new(Role::User, "hello"),
                Message::new(Role::Assistant, "Hi there!"),
            ]
        );
        assert_eq!(h.orchestrator.current().unwrap().messages, persisted);
        assert_eq!(h.orchestrator.state(), TurnState::Idle);

        return Ok(());
    }

    #[tokio::test]
    async fn it_sends_the_whole_transcript() -> Result<()> {
        let mut h = harness(0).await?;
        h.orchestrator.load(None).await?;
        h.orchestrator.submit("one", |_| {}).await?;
        h.orchestrator.submit("two", |_| {}).await?;

        let requests = h.requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], vec![Message::new(Role::User, "one")]);
        assert_eq!(
            requests[1],
            vec![
                Message::new(Role::User, "one"),
                Message::new(Role::Assistant, "Hi there!"),
                Message::new(Role::User, "two"),
            ]
        );

        return Ok(());
    }

    #[tokio::test]
    async fn it_limits_context_to_the_latest_messages() -> Result<()> {
        let mut h = harness(2).await?;
        h.orchestrator.load(None).await?;
        h.orchestrator.submit("one", |_| {}).await?;
        h.orchestrator.submit("two", |_| {}).await?;

        let requests = h.requests.lock().unwrap().clone();
        assert_eq!(
            requests[1],
            vec![
                Message::new(Role::Assistant, "Hi there!"),
                Message::new(Role::User, "two"),
            ]
        );

        return Ok(());
    }

    #[tokio::test]
    async fn it_rejects_empty_input_without_io() -> Result<()> {
        let mut h = harness(0).await?;
        h.orchestrator.load(None).await?;
        let id = current_id(&h.orchestrator);

        let res = h.orchestrator.submit("  \n ", |_| {}).await;

        assert!(matches!(res, Err(TurnError::EmptyInput)));
        assert!(h.requests.lock().unwrap().is_empty());
        assert_eq!(h.store.message_count(&id).await?, 0);

        return Ok(());
    }

    #[tokio::test]
    async fn it_is_busy_while_awaiting_a_reply() -> Result<()> {
        let mut h = harness(0).await?;
        h.orchestrator.load(None).await?;

        let _stream = h.orchestrator.begin_turn("first").await?;
        assert_eq!(h.orchestrator.state(), TurnState::AwaitingReply);

        assert!(matches!(
            h.orchestrator.begin_turn("second").await,
            Err(TurnError::Busy)
        ));
        assert!(matches!(
            h.orchestrator.new_session().await,
            Err(TurnError::Busy)
        ));
        assert!(matches!(h.orchestrator.cycle_session(1), Err(TurnError::Busy)));

        h.orchestrator.push_fragment("ok")?;
        assert_eq!(h.orchestrator.pending_reply(), Some("ok"));
        assert_eq!(h.orchestrator.finish_turn().await?, "ok");
        assert_eq!(h.orchestrator.state(), TurnState::Idle);

        return Ok(());
    }

    #[tokio::test]
    async fn it_abandons_the_turn_on_mid_stream_failure() -> Result<()> {
        let mut h = harness(0).await?;
        h.orchestrator.load(None).await?;
        let id = current_id(&h.orchestrator);
        *h.failure.lock().unwrap() = Failure::MidStream;

        let mut seen: Vec<String> = vec![];
        let res = h
            .orchestrator
            .submit("hello", |accumulated| {
                seen.push(accumulated.to_string());
            })
            .await;

        assert!(matches!(
            res,
            Err(TurnError::Completion(CompletionError::Interrupted { .. }))
        ));
        assert_eq!(seen, vec!["Hi"]);
        assert_eq!(h.orchestrator.state(), TurnState::Idle);
        assert_eq!(
            h.store.list_messages(&id).await?,
            vec![Message::new(Role::User, "hello")]
        );

        *h.failure.lock().unwrap() = Failure::None;
        h.orchestrator.submit("again", |_| {}).await?;
        assert_eq!(
            h.store.list_messages(&id).await?,
            vec![
                Message::new(Role::User, "hello"),
                Message::new(Role::User, "again"),
                Message::new(Role::Assistant, "Hi there!"),
            ]
        );

        return Ok(());
    }

    #[tokio::test]
    async fn it_does_not_save_a_reply_cut_off_before_done() -> Result<()> {
        let body = format!(
            "data: {}\n\n",
            json!({ "choices": [{ "delta": { "content": "Hello, the answer is" } }] }),
        );
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let mut config = Config::with_defaults();
        config.set(ConfigKey::OpenaiURL, &server.url());
        config.set(ConfigKey::OpenaiToken, "abc");
        let backend = BackendManager::get(BackendName::OpenAI, &config)?;

        let (_dir, url) = temp_database();
        let store = SessionStore::connect(&url, 2).await?;
        store.ensure_schema().await?;
        let mut orchestrator = Orchestrator::new(store.clone(), backend, 0);
        orchestrator.load(None).await?;
        let id = current_id(&orchestrator);

        let mut seen: Vec<String> = vec![];
        let res = orchestrator
            .submit("What is the answer?", |reply| {
                seen.push(reply.to_string());
            })
            .await;
        mock.assert_async().await;

        assert!(matches!(
            res,
            Err(TurnError::Completion(CompletionError::Interrupted { reason, .. }))
                if reason == "stream ended before completion"
        ));
        assert_eq!(seen, vec!["Hello, the answer is"]);
        assert_eq!(orchestrator.state(), TurnState::Idle);
        assert_eq!(
            store.list_messages(&id).await?,
            vec![Message::new(Role::User, "What is the answer?")]
        );
        assert_eq!(
            orchestrator.current().unwrap().messages,
            vec![Message::new(Role::User, "What is the answer?")]
        );

        return Ok(());
    }

    #[tokio::test]
    async fn it_drops_an_empty_reply() -> Result<()> {
        let mut h = harness(0).await?;
        h.orchestrator.load(None).await?;
        let id = current_id(&h.orchestrator);
        *h.failure.lock().unwrap() = Failure::Empty;

        let res = h.orchestrator.submit("hello", |_| {}).await;

        assert!(matches!(
            res,
            Err(TurnError::Completion(CompletionError::Malformed { reason, .. }))
                if reason == "empty reply"
        ));
        assert_eq!(h.orchestrator.state(), TurnState::Idle);
        assert_eq!(
            h.store.list_messages(&id).await?,
            vec![Message::new(Role::User, "hello")]
        );
        assert_eq!(
            h.orchestrator.current().unwrap().messages,
            vec![Message::new(Role::User, "hello")]
        );

        return Ok(());
    }

    #[tokio::test]
    async fn it_keeps_the_user_message_when_rejected() -> Result<()> {
        let mut h = harness(0).await?;
        h.orchestrator.load(None).await?;
        let id = current_id(&h.orchestrator);
        *h.failure.lock().unwrap() = Failure::Rejected;

        let res = h.orchestrator.submit("hello", |_| {}).await;

        assert!(matches!(
            res,
            Err(TurnError::Completion(CompletionError::Rejected { status: 500, .. }))
        ));
        assert_eq!(h.orchestrator.state(), TurnState::Idle);
        assert_eq!(
            h.orchestrator.current().unwrap().messages,
            vec![Message::new(Role::User, "hello")]
        );
        assert_eq!(h.store.message_count(&id).await?, 1);

        return Ok(());
    }

    #[tokio::test]
    async fn it_requires_a_turn_in_flight() -> Result<()> {
        let mut h = harness(0).await?;
        h.orchestrator.load(None).await?;

        assert!(matches!(
            h.orchestrator.push_fragment("stray"),
            Err(TurnError::NotAwaiting)
        ));
        assert!(matches!(
            h.orchestrator.finish_turn().await,
            Err(TurnError::NotAwaiting)
        ));

        return Ok(());
    }

    #[tokio::test]
    async fn it_streams_into_the_turn_phases() -> Result<()> {
        let mut h = harness(0).await?;
        h.orchestrator.load(None).await?;
        let id = current_id(&h.orchestrator);

        let mut stream = h.orchestrator.begin_turn("hello").await?;
        while let Some(fragment) = stream.next().await {
            h.orchestrator.push_fragment(&fragment?)?;
        }
        h.orchestrator.finish_turn().await?;

        assert_eq!(h.store.message_count(&id).await?, 2);

        return Ok(());
    }
}
