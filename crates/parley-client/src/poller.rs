use std::time::Duration;

use parley_types::api::{ErrorEnvelope, MessagesEnvelope};
use parley_types::models::{Message, Scope};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::sync::PollState;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Polls one chat thread for new messages.
pub struct ChatPoller {
    http: reqwest::Client,
    base_url: String,
    token: String,
    scope: Scope,
    interval: Duration,
    state: PollState,
}

impl ChatPoller {
    /// - `base_url`: server root, e.g. `http://localhost:3000`
    /// - `token`: bearer token issued by the main application
    pub fn new(base_url: &str, token: &str, scope: Scope) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            scope,
            interval: DEFAULT_POLL_INTERVAL,
            state: PollState::new(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Skip messages the caller already has.
    pub fn starting_after(mut self, last_id: i64) -> Self {
        self.state = PollState::starting_after(last_id);
        self
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    /// One poll: fetch messages after the cursor and return the ones that
    /// were new to the local view.
    pub async fn fetch_once(&mut self) -> Result<Vec<Message>, ClientError> {
        let mut query: Vec<(&str, String)> = vec![("last_id", self.state.last_id().to_string())];
        if let Some(project_id) = self.scope.project_id {
            query.push(("project_id", project_id.to_string()));
        }
        if let Some(page_id) = self.scope.page_id {
            query.push(("page_id", page_id.to_string()));
        }

        let resp = self
            .http
            .get(format!("{}/chat/messages", self.base_url))
            .bearer_auth(&self.token)
            .query(&query)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = match resp.json::<ErrorEnvelope>().await {
                Ok(envelope) => envelope.error,
                Err(_) => status.canonical_reason().unwrap_or("request failed").to_string(),
            };
            return Err(ClientError::Api { code: status.as_u16(), message });
        }

        let envelope: MessagesEnvelope = resp.json().await?;
        Ok(self.state.apply(envelope.messages).to_vec())
    }

    /// Poll until the receiving side of `tx` is dropped. Failed polls are
    /// logged and retried on the next tick.
    pub async fn run(mut self, tx: mpsc::Sender<Message>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = tx.closed() => break,
            }

            match self.fetch_once().await {
                Ok(fresh) => {
                    if !fresh.is_empty() {
                        debug!("Chat poll: {} new messages, cursor {}", fresh.len(), self.state.last_id());
                    }
                    for message in fresh {
                        if tx.send(message).await.is_err() {
                            debug!("Chat poll receiver dropped");
                            return;
                        }
                    }
                }
                Err(e) => warn!("Chat poll failed: {}", e),
            }
        }
        debug!("Chat poll receiver dropped");
    }

    /// Run the poller on its own task.
    pub fn spawn(self, buffer: usize) -> (JoinHandle<()>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(buffer);
        (tokio::spawn(self.run(tx)), rx)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parley_api::{AppStateInner, auth::create_token};
    use parley_chat::{ChatConfig, ChatService, RequestContext, UploadStore};
    use parley_db::Database;
    use parley_types::models::Role;
    use tempfile::TempDir;

    use super::*;

    const SECRET: &str = "poller-test-secret";

    struct Server {
        _dir: TempDir,
        base_url: String,
        db: Arc<Database>,
        token: String,
        user: RequestContext,
        project: i64,
    }

    /// Real router on an ephemeral port. Tests post through their own
    /// service on the same database handle.
    async fn server() -> Server {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open(&dir.path().join("poll.db")).unwrap());
        let user_id = db.create_user("pat", "Pat Poller", "project_lead").unwrap();
        let project = db.create_project("Polling", Some(user_id)).unwrap();

        let chat = ChatService::new(db.clone(), UploadStore::new(dir.path()), ChatConfig::default());
        let app = parley_api::router(AppStateInner::new(chat, SECRET));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Server {
            base_url: format!("http://{addr}"),
            token: create_token(SECRET, user_id, "pat", Role::ProjectLead).unwrap(),
            user: RequestContext::new(user_id, "pat", Role::ProjectLead),
            db,
            _dir: dir,
            project,
        }
    }

    fn post(server: &Server, body: &str) -> i64 {
        let chat = ChatService::new(server.db.clone(), UploadStore::new("."), ChatConfig::default());
        chat.send(&server.user, body, Scope::project(server.project), None).unwrap().id
    }

    #[tokio::test]
    async fn fetch_once_only_returns_new_messages() {
        let server = server().await;
        let first = post(&server, "one");
        let second = post(&server, "two");

        let mut poller = ChatPoller::new(&server.base_url, &server.token, Scope::project(server.project));
        let fresh = poller.fetch_once().await.unwrap();
        assert_eq!(fresh.iter().map(|m| m.id).collect::<Vec<_>>(), vec![first, second]);
        assert_eq!(poller.state().last_id(), second);

        assert!(poller.fetch_once().await.unwrap().is_empty());

        let third = post(&server, "three");
        let fresh = poller.fetch_once().await.unwrap();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].id, third);
        assert_eq!(poller.state().messages().len(), 3);
    }

    #[tokio::test]
    async fn starting_cursor_skips_known_messages() {
        let server = server().await;
        let first = post(&server, "old");
        let second = post(&server, "new");

        let mut poller = ChatPoller::new(&server.base_url, &server.token, Scope::project(server.project))
            .starting_after(first);
        let fresh = poller.fetch_once().await.unwrap();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].id, second);
    }

    #[tokio::test]
    async fn api_errors_surface_status_and_message() {
        let server = server().await;
        let mut poller = ChatPoller::new(&server.base_url, "not-a-token", Scope::global());
        match poller.fetch_once().await {
            Err(ClientError::Api { code, message }) => {
                assert_eq!(code, 401);
                assert_eq!(message, "Authentication required");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn spawned_poller_forwards_new_messages() {
        let server = server().await;
        let poller = ChatPoller::new(&server.base_url, &server.token, Scope::project(server.project))
            .with_interval(Duration::from_millis(20));
        let (handle, mut rx) = poller.spawn(16);

        let id = post(&server, "live");
        let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.id, id);
        assert_eq!(received.body, "live");

        drop(rx);
        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    }
}
