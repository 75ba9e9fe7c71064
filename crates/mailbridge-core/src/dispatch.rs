//! Request routing
//!
//! A request names one action plus the account it runs against; dispatch
//! runs exactly one mailbox operation for it.

use crate::mailbox::{Mailbox, MessagePage};
use crate::CoreResult;
use mailbridge_auth::AccountConfig;
use mailbridge_imap::{Connector, FolderDescriptor, MessageDetail};
use serde::{Deserialize, Serialize};
use tracing::debug;

fn default_folder() -> String {
    "INBOX".to_string()
}

fn default_limit() -> u32 {
    50
}

/// One mailbox request, tagged by `action`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    Test {
        config: AccountConfig,
    },
    Folders {
        config: AccountConfig,
    },
    Emails {
        config: AccountConfig,
        #[serde(default = "default_folder")]
        folder: String,
        #[serde(default = "default_limit")]
        limit: u32,
        #[serde(default)]
        offset: u32,
    },
    Search {
        config: AccountConfig,
        #[serde(default = "default_folder")]
        folder: String,
        query: String,
        #[serde(default = "default_limit")]
        limit: u32,
        #[serde(default)]
        offset: u32,
    },
    Email {
        config: AccountConfig,
        #[serde(default = "default_folder")]
        folder: String,
        uid: u32,
    },
    /// Accepts a single `uid`, a `uids` list, or both
    Delete {
        config: AccountConfig,
        #[serde(default = "default_folder")]
        folder: String,
        #[serde(default)]
        uid: Option<u32>,
        #[serde(default)]
        uids: Vec<u32>,
    },
    MarkRead {
        config: AccountConfig,
        #[serde(default = "default_folder")]
        folder: String,
        uid: u32,
    },
}

impl Request {
    pub fn action(&self) -> &'static str {
        match self {
            Request::Test { .. } => "test",
            Request::Folders { .. } => "folders",
            Request::Emails { .. } => "emails",
            Request::Search { .. } => "search",
            Request::Email { .. } => "email",
            Request::Delete { .. } => "delete",
            Request::MarkRead { .. } => "markRead",
        }
    }
}

/// Result of a dispatched request, serialized without a wrapper
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Response {
    Success { success: bool },
    Folders(Vec<FolderDescriptor>),
    Page(MessagePage),
    Message(Option<MessageDetail>),
}

/// Run the one operation a request names
pub async fn dispatch<C: Connector>(mailbox: &Mailbox<C>, request: Request) -> CoreResult<Response> {
    debug!("Dispatching {} request", request.action());

    let response = match request {
        Request::Test { config } => Response::Success {
            success: mailbox.test_connection(&config).await?,
        },
        Request::Folders { config } => Response::Folders(mailbox.list_folders(&config).await?),
        Request::Emails {
            config,
            folder,
            limit,
            offset,
        } => Response::Page(mailbox.list_messages(&config, &folder, limit, offset).await?),
        Request::Search {
            config,
            folder,
            query,
            limit,
            offset,
        } => Response::Page(
            mailbox
                .search_messages(&config, &folder, &query, limit, offset)
                .await?,
        ),
        Request::Email { config, folder, uid } => {
            Response::Message(mailbox.get_message(&config, &folder, uid).await?)
        }
        Request::Delete {
            config,
            folder,
            uid,
            mut uids,
        } => {
            uids.extend(uid);
            Response::Success {
                success: mailbox.delete_messages(&config, &folder, &uids).await?,
            }
        }
        Request::MarkRead { config, folder, uid } => Response::Success {
            success: mailbox.mark_read(&config, &folder, uid).await?,
        },
    };
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeConnector, FakeServer, SharedServer};
    use crate::PoolConfig;
    use mailbridge_auth::{CredentialResolver, OAuth2Refresher};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn config() -> Value {
        json!({
            "username": "me@example.com",
            "host": "imap.example.com",
            "password": "hunter2"
        })
    }

    fn request(value: Value) -> Request {
        serde_json::from_value(value).unwrap()
    }

    async fn run(server: &SharedServer, value: Value) -> Value {
        let mailbox = Mailbox::new(
            FakeConnector {
                server: server.clone(),
            },
            CredentialResolver::new(Arc::new(OAuth2Refresher::default())),
            PoolConfig::default(),
        );
        let response = dispatch(&mailbox, request(value)).await.unwrap();
        serde_json::to_value(response).unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let parsed = request(json!({"action": "emails", "config": config()}));
        match parsed {
            Request::Emails {
                folder,
                limit,
                offset,
                ..
            } => {
                assert_eq!(folder, "INBOX");
                assert_eq!(limit, 50);
                assert_eq!(offset, 0);
            }
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[test]
    fn test_mark_read_action_name() {
        let parsed = request(json!({"action": "markRead", "config": config(), "uid": 4}));
        assert_eq!(parsed.action(), "markRead");
    }

    #[test]
    fn test_unknown_action_rejected() {
        let result: Result<Request, _> =
            serde_json::from_value(json!({"action": "compose", "config": config()}));
        assert!(result.is_err());
    }

    #[test]
    fn test_search_requires_query() {
        let result: Result<Request, _> =
            serde_json::from_value(json!({"action": "search", "config": config()}));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_emails_response_shape() {
        let server = FakeServer::with_folder("INBOX", 3).shared();
        let value = run(
            &server,
            json!({"action": "emails", "config": config(), "limit": 2}),
        )
        .await;

        assert_eq!(value["total"], 3);
        assert_eq!(value["hasMore"], true);
        assert_eq!(value["messages"][0]["uid"], 3);
        assert_eq!(value["messages"][1]["uid"], 2);
    }

    #[tokio::test]
    async fn test_email_not_found_is_null() {
        let server = FakeServer::with_folder("INBOX", 3).shared();
        let value = run(&server, json!({"action": "email", "config": config(), "uid": 99})).await;
        assert!(value.is_null());
    }

    #[tokio::test]
    async fn test_delete_merges_uid_and_uids() {
        let server = FakeServer::with_folder("INBOX", 5).shared();
        let value = run(
            &server,
            json!({"action": "delete", "config": config(), "uid": 1, "uids": [4, 5]}),
        )
        .await;

        assert_eq!(value, json!({"success": true}));
        assert!(server
            .lock()
            .commands
            .contains(&"UID STORE 1,4:5 +FLAGS (\\Deleted)".to_string()));
    }

    #[tokio::test]
    async fn test_delete_without_uids_is_noop() {
        let server = FakeServer::with_folder("INBOX", 5).shared();
        let value = run(&server, json!({"action": "delete", "config": config()})).await;

        assert_eq!(value, json!({"success": true}));
        assert_eq!(server.lock().connects, 0);
    }

    #[tokio::test]
    async fn test_folders_response_is_list() {
        let server = FakeServer::with_folder("INBOX", 0).shared();
        let value = run(&server, json!({"action": "folders", "config": config()})).await;

        assert_eq!(value[0]["path"], "INBOX");
        assert_eq!(value[0]["folderType"], "inbox");
    }
}
