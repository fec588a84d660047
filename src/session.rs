use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use parking_lot::RwLock;

use crate::error::ClientError;
use crate::models::{Role, User, UserId};
use crate::storage::{self, StoredSession};

/// Identity of the signed-in viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub id: UserId,
    pub name: String,
    pub role: Role,
}

impl Viewer {
    pub fn is_elevated(&self) -> bool {
        self.role.is_elevated()
    }
}

impl From<&User> for Viewer {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            role: user.role.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub viewer: Viewer,
    pub token: String,
}

/// Source of the bearer credential attached to outgoing requests.
pub trait CredentialSource: Send + Sync {
    fn bearer(&self) -> Option<String>;
}

/// Shared handle to the current session; cloned into every component that needs it.
#[derive(Clone, Default)]
pub struct SessionHandle {
    inner: Arc<RwLock<Option<Session>>>,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(session: Session) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(session))),
        }
    }

    pub fn current(&self) -> Option<Session> {
        self.inner.read().clone()
    }

    pub fn viewer(&self) -> Option<Viewer> {
        self.inner.read().as_ref().map(|session| session.viewer.clone())
    }

    pub fn is_signed_in(&self) -> bool {
        self.inner.read().is_some()
    }

    /// Viewer identity for write operations.
    pub fn require(&self) -> Result<Viewer, ClientError> {
        self.viewer().ok_or(ClientError::NotSignedIn)
    }

    pub fn set(&self, session: Session) {
        tracing::info!(user = %session.viewer.id, "session started");
        *self.inner.write() = Some(session);
    }

    pub fn clear(&self) -> Option<Session> {
        let previous = self.inner.write().take();
        if let Some(session) = previous.as_ref() {
            tracing::info!(user = %session.viewer.id, "session cleared");
        }
        previous
    }
}

impl CredentialSource for SessionHandle {
    fn bearer(&self) -> Option<String> {
        self.inner
            .read()
            .as_ref()
            .map(|session| session.token.clone())
            .filter(|token| !token.is_empty())
    }
}

/// Keeps the session handle and the persisted session row in step.
pub struct Manager {
    store: Arc<storage::Store>,
    handle: SessionHandle,
}

impl Manager {
    pub fn new(store: Arc<storage::Store>) -> Self {
        Self {
            store,
            handle: SessionHandle::new(),
        }
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn load_existing(&self) -> Result<Option<Viewer>> {
        let Some(stored) = self.store.load_session()? else {
            return Ok(None);
        };
        let viewer = Viewer {
            id: stored.user_id,
            name: stored.name,
            role: stored.role,
        };
        self.handle.set(Session {
            viewer: viewer.clone(),
            token: stored.token,
        });
        Ok(Some(viewer))
    }

    pub fn login(&self, session: Session) -> Result<()> {
        self.store.save_session(StoredSession {
            user_id: session.viewer.id.clone(),
            name: session.viewer.name.clone(),
            role: session.viewer.role.clone(),
            token: session.token.clone(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })?;
        self.handle.set(session);
        Ok(())
    }

    pub fn logout(&self) -> Result<bool> {
        let removed = self.store.clear_session()?;
        let had_session = self.handle.clear().is_some();
        Ok(removed || had_session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(token: &str) -> Session {
        Session {
            viewer: Viewer {
                id: UserId::from("u1"),
                name: "Asha".into(),
                role: Role::User,
            },
            token: token.into(),
        }
    }

    #[test]
    fn handle_exposes_bearer_only_when_signed_in() {
        let handle = SessionHandle::new();
        assert_eq!(handle.bearer(), None);
        assert!(matches!(handle.require(), Err(ClientError::NotSignedIn)));

        handle.set(session("tok"));
        assert_eq!(handle.bearer().as_deref(), Some("tok"));
        assert_eq!(handle.require().unwrap().name, "Asha");

        let clone = handle.clone();
        clone.clear();
        assert!(!handle.is_signed_in());
    }

    #[test]
    fn manager_persists_and_restores() {
        let store = Arc::new(storage::Store::open_in_memory().unwrap());
        let manager = Manager::new(store.clone());
        manager.login(session("abc")).unwrap();

        let restored = Manager::new(store);
        let viewer = restored.load_existing().unwrap().unwrap();
        assert_eq!(viewer.id, UserId::from("u1"));
        assert_eq!(restored.handle().bearer().as_deref(), Some("abc"));

        assert!(restored.logout().unwrap());
        assert!(restored.load_existing().unwrap().is_none());
        assert!(!restored.handle().is_signed_in());
    }
}
