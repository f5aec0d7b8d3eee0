use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header::CONTENT_TYPE, HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use octorelay_chat::{decode_form_component, ChatHost};
use octorelay_core::OutgoingMessage;
use octorelay_db::repositories::AssociationRepository;
use octorelay_github::event::{EventKind, InboundEvent};
use octorelay_github::render;

#[derive(Clone)]
pub struct WebhookState {
    pub associations: Arc<dyn AssociationRepository>,
    pub chat: Arc<dyn ChatHost>,
    pub bot_alias: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WebhookAck {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub fn router(state: WebhookState) -> Router {
    Router::new().route("/webhook", post(receive)).with_state(state)
}

/// Accepts one GitHub delivery and fans the rendered notification out to
/// every room connected to the repository. Deliveries of kinds this relay
/// does not render are acknowledged immediately without touching the store.
async fn receive(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<WebhookAck>) {
    let raw_kind = headers
        .get("x-github-event")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    let kind = EventKind::from_header(&raw_kind);

    if kind == EventKind::Unknown {
        info!(
            event_name = "webhook.event.skipped",
            event_kind = %raw_kind,
            "acknowledging delivery of an unrendered event kind"
        );
        return accepted(Some(format!("Cannot handle event type `{raw_kind}` yet, but that's ok.")));
    }

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let payload = match extract_payload(content_type, &body) {
        Ok(payload) => payload,
        Err(reason) => {
            warn!(
                event_name = "webhook.payload.undecodable",
                event_kind = %raw_kind,
                reason = %reason,
                "discarding undecodable delivery"
            );
            return accepted(Some(format!("Could not decode the `{raw_kind}` payload.")));
        }
    };

    let event = match InboundEvent::decode(kind, &payload) {
        Ok(event) => event,
        Err(decode_error) => {
            warn!(
                event_name = "webhook.payload.malformed",
                event_kind = %raw_kind,
                error = %decode_error,
                "discarding malformed delivery"
            );
            return accepted(Some(format!("Could not decode the `{raw_kind}` payload.")));
        }
    };

    let Some(repo_name) = event.repository_full_name().map(str::to_owned) else {
        debug!(
            event_name = "webhook.event.anonymous",
            event_kind = %raw_kind,
            "delivery names no repository, nothing to fan out"
        );
        return accepted(None);
    };

    let rooms = match state.associations.rooms_for_repo(&repo_name).await {
        Ok(rooms) => rooms,
        Err(store_error) => {
            error!(
                event_name = "webhook.store.error",
                repo_name = %repo_name,
                error = %store_error,
                "association lookup failed"
            );
            return failed();
        }
    };

    if rooms.is_empty() {
        debug!(
            event_name = "webhook.event.unrouted",
            repo_name = %repo_name,
            "no rooms are connected to this repository"
        );
        return accepted(None);
    }

    let sender = render::sender_link(&event);
    let (alias, avatar_url) = match event.credited_sender() {
        Some(user) => (Some(user.login.clone()), user.avatar_url.clone()),
        None => (Some(state.bot_alias.clone()), None),
    };

    for room_id in rooms {
        let room = match state.chat.room_by_id(&room_id).await {
            Ok(Some(room)) => room,
            Ok(None) => {
                warn!(
                    event_name = "webhook.room.unresolved",
                    repo_name = %repo_name,
                    room_id = %room_id,
                    "stored room no longer resolves, skipping"
                );
                continue;
            }
            Err(host_error) => {
                error!(
                    event_name = "webhook.room.lookup_failed",
                    repo_name = %repo_name,
                    room_id = %room_id,
                    error = %host_error,
                    "room lookup failed, aborting fan-out"
                );
                return failed();
            }
        };

        let message = OutgoingMessage {
            room_id: room.id,
            text: render::render(&event, sender.as_deref()),
            alias: alias.clone(),
            avatar_url: avatar_url.clone(),
        };

        if let Err(send_error) = state.chat.send(message).await {
            error!(
                event_name = "webhook.send.failed",
                repo_name = %repo_name,
                room_id = %room_id,
                error = %send_error,
                "message delivery failed, aborting fan-out"
            );
            return failed();
        }

        info!(
            event_name = "webhook.event.relayed",
            event_kind = %raw_kind,
            repo_name = %repo_name,
            room_id = %room_id,
            "delivery relayed"
        );
    }

    accepted(None)
}

/// GitHub posts either raw JSON or a form body whose `payload` field holds
/// the JSON document, depending on the hook's content type.
fn extract_payload(content_type: &str, body: &[u8]) -> Result<Value, String> {
    if content_type.starts_with("application/x-www-form-urlencoded") {
        let raw = std::str::from_utf8(body).map_err(|_| "form body is not utf-8".to_owned())?;
        let encoded = raw
            .split('&')
            .find_map(|pair| pair.strip_prefix("payload="))
            .ok_or_else(|| "form body has no payload field".to_owned())?;
        let decoded = decode_form_component(encoded)
            .ok_or_else(|| "payload field is not valid form encoding".to_owned())?;
        serde_json::from_str(&decoded).map_err(|error| format!("payload field is not JSON: {error}"))
    } else {
        serde_json::from_slice(body).map_err(|error| format!("body is not JSON: {error}"))
    }
}

fn accepted(message: Option<String>) -> (StatusCode, Json<WebhookAck>) {
    (StatusCode::OK, Json(WebhookAck { success: true, message }))
}

fn failed() -> (StatusCode, Json<WebhookAck>) {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(WebhookAck { success: false, message: None }))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    use octorelay_chat::{InMemoryChatHost, Room};
    use octorelay_core::RepoRoomAssociation;
    use octorelay_db::repositories::{
        AssociationRepository, InMemoryAssociationRepository, RepositoryError,
    };

    use super::{router, WebhookState};

    fn state(
        associations: Arc<dyn AssociationRepository>,
        chat: Arc<InMemoryChatHost>,
    ) -> WebhookState {
        WebhookState { associations, chat, bot_alias: "octorelay".to_owned() }
    }

    /// Store wrapper that counts read-path calls, for asserting that a code
    /// path never touched persistence.
    #[derive(Default)]
    struct CountingAssociationStore {
        inner: InMemoryAssociationRepository,
        reads: AtomicUsize,
    }

    impl CountingAssociationStore {
        fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AssociationRepository for CountingAssociationStore {
        async fn connect(&self, repo_name: &str, room_id: &str) -> Result<(), RepositoryError> {
            self.inner.connect(repo_name, room_id).await
        }

        async fn disconnect(&self, repo_name: &str, room_id: &str) -> Result<(), RepositoryError> {
            self.inner.disconnect(repo_name, room_id).await
        }

        async fn rooms_for_repo(&self, repo_name: &str) -> Result<Vec<String>, RepositoryError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.rooms_for_repo(repo_name).await
        }

        async fn repos_for_room(
            &self,
            room_id: &str,
        ) -> Result<Vec<RepoRoomAssociation>, RepositoryError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.repos_for_room(room_id).await
        }
    }

    fn push_payload() -> serde_json::Value {
        json!({
            "ref": "refs/heads/main",
            "before": "1111111111",
            "after": "2222222222",
            "compare": "https://github.com/acme/widgets/compare/1111...2222",
            "head_commit": {
                "message": "Tighten input validation",
                "added": ["src/check.rs"],
                "removed": [],
                "modified": ["src/lib.rs"]
            },
            "repository": {
                "full_name": "acme/widgets",
                "html_url": "https://github.com/acme/widgets"
            },
            "sender": {
                "login": "alice",
                "html_url": "https://github.com/alice",
                "avatar_url": "https://avatars.example.com/alice"
            }
        })
    }

    fn json_request(event_kind: &str, payload: &serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("x-github-event", event_kind)
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .expect("request should build")
    }

    #[tokio::test]
    async fn push_delivery_fans_out_to_every_connected_room() {
        let associations = Arc::new(InMemoryAssociationRepository::default());
        associations.connect("acme/widgets", "room-1").await.expect("connect");
        associations.connect("acme/widgets", "room-2").await.expect("connect");

        let chat = Arc::new(InMemoryChatHost::default());
        chat.add_room(Room { id: "room-1".into(), display_name: "devops".into() }).await;
        chat.add_room(Room { id: "room-2".into(), display_name: "releases".into() }).await;

        let app = router(state(associations, chat.clone()));
        let response =
            app.oneshot(json_request("push", &push_payload())).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);

        let sent = chat.sent().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].room_id, "room-1");
        assert_eq!(sent[1].room_id, "room-2");
        assert_eq!(sent[0].text, sent[1].text);
        assert!(sent[0].text.contains("Repository: [acme/widgets/refs/heads/main]"));
        assert!(sent[0].text.contains("Tighten input validation"));
        assert_eq!(sent[0].alias.as_deref(), Some("alice"));
        assert_eq!(sent[0].avatar_url.as_deref(), Some("https://avatars.example.com/alice"));
    }

    #[tokio::test]
    async fn unrendered_event_kind_is_acknowledged_without_store_access_or_sending() {
        let associations = Arc::new(CountingAssociationStore::default());
        associations.connect("acme/widgets", "room-1").await.expect("connect");

        let chat = Arc::new(InMemoryChatHost::default());
        chat.add_room(Room { id: "room-1".into(), display_name: "devops".into() }).await;

        let app = router(state(associations.clone(), chat.clone()));
        let payload = json!({"action": "opened", "issue": {"number": 1}});
        let response = app.oneshot(json_request("issues", &payload)).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(associations.reads(), 0, "fast-accepted kinds must not hit the store");
        assert!(chat.sent().await.is_empty());
    }

    #[tokio::test]
    async fn delivery_for_an_unconnected_repository_sends_nothing() {
        let associations = Arc::new(InMemoryAssociationRepository::default());
        let chat = Arc::new(InMemoryChatHost::default());

        let app = router(state(associations, chat.clone()));
        let response =
            app.oneshot(json_request("push", &push_payload())).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert!(chat.sent().await.is_empty());
    }

    #[tokio::test]
    async fn unresolved_room_is_skipped_and_remaining_rooms_still_receive() {
        let associations = Arc::new(InMemoryAssociationRepository::default());
        associations.connect("acme/widgets", "room-gone").await.expect("connect");
        associations.connect("acme/widgets", "room-2").await.expect("connect");

        let chat = Arc::new(InMemoryChatHost::default());
        chat.add_room(Room { id: "room-2".into(), display_name: "releases".into() }).await;

        let app = router(state(associations, chat.clone()));
        let response =
            app.oneshot(json_request("push", &push_payload())).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);

        let sent = chat.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].room_id, "room-2");
    }

    #[tokio::test]
    async fn failed_delivery_aborts_the_fan_out_with_a_server_error() {
        let associations = Arc::new(InMemoryAssociationRepository::default());
        associations.connect("acme/widgets", "room-1").await.expect("connect");
        associations.connect("acme/widgets", "room-2").await.expect("connect");

        let chat = Arc::new(InMemoryChatHost::default());
        chat.add_room(Room { id: "room-1".into(), display_name: "devops".into() }).await;
        chat.add_room(Room { id: "room-2".into(), display_name: "releases".into() }).await;
        chat.fail_sends_to("room-1").await;

        let app = router(state(associations, chat.clone()));
        let response =
            app.oneshot(json_request("push", &push_payload())).await.expect("response");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(chat.sent().await.is_empty());
    }

    #[tokio::test]
    async fn form_encoded_delivery_decodes_the_payload_field() {
        let associations = Arc::new(InMemoryAssociationRepository::default());
        associations.connect("acme/widgets", "room-1").await.expect("connect");

        let chat = Arc::new(InMemoryChatHost::default());
        chat.add_room(Room { id: "room-1".into(), display_name: "devops".into() }).await;

        let encoded = push_payload()
            .to_string()
            .replace('%', "%25")
            .replace('&', "%26")
            .replace('+', "%2B");
        let body = format!("payload={encoded}");

        let request = Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("x-github-event", "push")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .expect("request should build");

        let app = router(state(associations, chat.clone()));
        let response = app.oneshot(request).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(chat.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn malformed_payload_is_acknowledged_without_sending() {
        let associations = Arc::new(InMemoryAssociationRepository::default());
        associations.connect("acme/widgets", "room-1").await.expect("connect");

        let chat = Arc::new(InMemoryChatHost::default());
        chat.add_room(Room { id: "room-1".into(), display_name: "devops".into() }).await;

        let app = router(state(associations, chat.clone()));
        let payload = json!({"ref": "refs/heads/main"});
        let response = app.oneshot(json_request("push", &payload)).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert!(chat.sent().await.is_empty());
    }
}
