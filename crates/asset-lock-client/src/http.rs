use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use asset_lock_core::{LockError, LockItem, LockScope, LockService, LockedFile};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, instrument};

/// HTTP/JSON client for the remote lock server.
///
/// Every call is a POST of `{user, branch, ...}` answered by `{ok, msg?, ...}`.
/// The request timeout bounds how long a pool thread can wait on the server.
pub struct HttpLockClient {
    http_client: HttpClient,
    logged_in: AtomicBool,
}

#[derive(Serialize)]
struct ScopeRequest<'a> {
    user: &'a str,
    branch: &'a str,
}

#[derive(Serialize)]
struct FilesRequest<'a, T: Serialize> {
    user: &'a str,
    branch: &'a str,
    files: &'a [T],
}

#[derive(Serialize)]
struct HashedPath<'a> {
    hash: &'a str,
    path: &'a str,
}

/// `lockedFiles` entries: bare paths, or objects naming the owner.
#[derive(Deserialize)]
#[serde(untagged)]
enum LockedFileEntry {
    Path(String),
    Owned {
        path: String,
        #[serde(default)]
        user: Option<String>,
    },
}

#[derive(Deserialize)]
struct LoginPayload {
    #[serde(default, rename = "lockedFiles")]
    locked_files: Vec<LockedFileEntry>,
}

#[derive(Deserialize)]
struct LockStateEntry {
    #[serde(default)]
    user: Option<String>,
}

#[derive(Deserialize)]
struct LockStatesPayload {
    #[serde(rename = "lockStates")]
    lock_states: Vec<LockStateEntry>,
}

/// Responses that carry nothing beyond `ok`.
#[derive(Deserialize)]
struct Ack {}

impl HttpLockClient {
    /// Create a client whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, LockError> {
        let http_client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LockError::Network(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            logged_in: AtomicBool::new(false),
        })
    }

    fn endpoint(scope: &LockScope, api: &str) -> String {
        format!("{}/{}", scope.server_url.trim_end_matches('/'), api)
    }

    /// POST `body` to `/{api}` and decode the payload of an `ok: true` answer.
    async fn post<B, R>(&self, scope: &LockScope, api: &str, body: &B) -> Result<R, LockError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = Self::endpoint(scope, api);

        let response = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json; charset=utf-8")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!("[/{}] No response from server: {}", api, e);
                LockError::Network(format!("[/{}] No response from server: {}", api, e))
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LockError::Network(format!("[/{}] Failed to read response: {}", api, e)))?;
        debug!("[/{}] resp: {}, content: {}", api, status, text);

        let value: Value = serde_json::from_str(&text).map_err(|e| {
            error!("[/{}] Failed to parse response body: {}", api, text);
            LockError::Protocol(format!(
                "[/{}] Unexpected response ({}): {}",
                api, status, e
            ))
        })?;

        let ok = value.get("ok").and_then(Value::as_bool).unwrap_or(false);
        if !ok {
            let msg = value
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or("request rejected by lock server")
                .to_string();
            error!("[/{}] Error - {}", api, msg);
            return Err(LockError::Protocol(msg));
        }

        serde_json::from_value(value)
            .map_err(|e| LockError::Protocol(format!("[/{}] Malformed payload: {}", api, e)))
    }
}

#[async_trait]
impl LockService for HttpLockClient {
    #[instrument(skip(self), level = "debug", fields(user = %scope.user, branch = %scope.branch))]
    async fn login(&self, scope: &LockScope) -> Result<Vec<LockedFile>, LockError> {
        let body = ScopeRequest {
            user: &scope.user,
            branch: &scope.branch,
        };
        let payload: LoginPayload = self.post(scope, "unsafeLogin", &body).await?;

        self.logged_in.store(true, Ordering::Release);

        Ok(payload
            .locked_files
            .into_iter()
            .map(|entry| match entry {
                LockedFileEntry::Path(git_path) => LockedFile {
                    git_path,
                    owner: None,
                },
                LockedFileEntry::Owned { path, user } => LockedFile {
                    git_path: path,
                    owner: user.filter(|u| !u.is_empty()),
                },
            })
            .collect())
    }

    #[instrument(skip(self, git_paths), level = "debug", fields(files = git_paths.len()))]
    async fn lock_states(
        &self,
        scope: &LockScope,
        git_paths: &[String],
    ) -> Result<Vec<Option<String>>, LockError> {
        let body = FilesRequest {
            user: &scope.user,
            branch: &scope.branch,
            files: git_paths,
        };
        let payload: LockStatesPayload = self.post(scope, "getLockStates", &body).await?;

        if payload.lock_states.len() != git_paths.len() {
            error!(
                "[/getLockStates] Invalid number of lock states! - {} vs {}",
                payload.lock_states.len(),
                git_paths.len()
            );
            return Err(LockError::Protocol(format!(
                "[/getLockStates] Invalid number of lock states: {} for {} files",
                payload.lock_states.len(),
                git_paths.len()
            )));
        }

        Ok(payload
            .lock_states
            .into_iter()
            .map(|s| s.user.filter(|u| !u.is_empty()))
            .collect())
    }

    #[instrument(skip(self, items), level = "debug", fields(files = items.len()))]
    async fn lock_files(&self, scope: &LockScope, items: &[LockItem]) -> Result<(), LockError> {
        let files: Vec<HashedPath<'_>> = items
            .iter()
            .map(|item| HashedPath {
                hash: &item.last_hash,
                path: &item.git_path,
            })
            .collect();
        let body = FilesRequest {
            user: &scope.user,
            branch: &scope.branch,
            files: &files,
        };
        let _: Ack = self.post(scope, "lockFiles", &body).await?;
        Ok(())
    }

    #[instrument(skip(self, git_paths), level = "debug", fields(files = git_paths.len()))]
    async fn unlock_files(
        &self,
        scope: &LockScope,
        git_paths: &[String],
    ) -> Result<(), LockError> {
        let body = FilesRequest {
            user: &scope.user,
            branch: &scope.branch,
            files: git_paths,
        };
        let _: Ack = self.post(scope, "unlockFiles", &body).await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug", fields(user = %scope.user, branch = %scope.branch))]
    async fn unlock_all(&self, scope: &LockScope) -> Result<(), LockError> {
        let body = ScopeRequest {
            user: &scope.user,
            branch: &scope.branch,
        };
        let _: Ack = self.post(scope, "unlockAll", &body).await?;
        Ok(())
    }

    fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn scope(server_url: &str) -> LockScope {
        LockScope {
            server_url: server_url.to_string(),
            user: "alice".to_string(),
            branch: "main".to_string(),
        }
    }

    fn client() -> HttpLockClient {
        HttpLockClient::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_login_reads_locked_files_and_sets_logged_in() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/unsafeLogin"))
            .and(body_json(json!({"user": "alice", "branch": "main"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "lockedFiles": ["Content/Hero.uasset", {"path": "Maps/L1.umap", "user": "bob"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client();
        assert!(!client.is_logged_in());

        let locked = client.login(&scope(&server.uri())).await.unwrap();
        assert_eq!(
            locked,
            vec![
                LockedFile {
                    git_path: "Content/Hero.uasset".to_string(),
                    owner: None
                },
                LockedFile {
                    git_path: "Maps/L1.umap".to_string(),
                    owner: Some("bob".to_string())
                },
            ]
        );
        assert!(client.is_logged_in());
    }

    #[tokio::test]
    async fn test_rejection_surfaces_server_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/lockFiles"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": false, "msg": "locked by bob"})),
            )
            .mount(&server)
            .await;

        let items = vec![LockItem {
            local_path: PathBuf::from("/repo/Content/Hero.uasset"),
            git_path: "Content/Hero.uasset".to_string(),
            last_hash: "abc123".to_string(),
        }];
        let err = client()
            .lock_files(&scope(&server.uri()), &items)
            .await
            .unwrap_err();
        assert_eq!(err, LockError::Protocol("locked by bob".to_string()));
    }

    #[tokio::test]
    async fn test_lock_files_sends_hash_per_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/lockFiles"))
            .and(body_json(json!({
                "user": "alice",
                "branch": "main",
                "files": [{"hash": "abc123", "path": "Content/Hero.uasset"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let items = vec![LockItem {
            local_path: PathBuf::from("/repo/Content/Hero.uasset"),
            git_path: "Content/Hero.uasset".to_string(),
            last_hash: "abc123".to_string(),
        }];
        client()
            .lock_files(&scope(&server.uri()), &items)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_lock_states_maps_owners_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/getLockStates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "lockStates": [{"user": "bob"}, {}, {"user": ""}]
            })))
            .mount(&server)
            .await;

        let paths = vec!["a.uasset".to_string(), "b.uasset".to_string(), "c.umap".to_string()];
        let states = client()
            .lock_states(&scope(&server.uri()), &paths)
            .await
            .unwrap();
        assert_eq!(states, vec![Some("bob".to_string()), None, None]);
    }

    #[tokio::test]
    async fn test_lock_states_length_mismatch_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/getLockStates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "lockStates": [{"user": "bob"}]
            })))
            .mount(&server)
            .await;

        let paths = vec!["a.uasset".to_string(), "b.uasset".to_string()];
        let err = client()
            .lock_states(&scope(&server.uri()), &paths)
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::Protocol(msg) if msg.contains("Invalid number")));
    }

    #[tokio::test]
    async fn test_malformed_json_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/unlockAll"))
            .respond_with(ResponseTemplate::new(500).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = client().unlock_all(&scope(&server.uri())).await.unwrap_err();
        assert!(matches!(err, LockError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        let err = client()
            .unlock_files(&scope("http://127.0.0.1:1"), &["a.uasset".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::Network(_)));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        assert_eq!(
            HttpLockClient::endpoint(&scope("http://localhost:15111/"), "unlockAll"),
            "http://localhost:15111/unlockAll"
        );
    }
}
