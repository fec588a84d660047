use std::sync::Arc;

use crate::api;
use crate::error::{ClientError, Result};
use crate::interaction::Confirm;
use crate::models::{Ack, Role, User, UserId};
use crate::notice::{Notice, Notices};
use crate::session::SessionHandle;

pub trait DirectoryService: Send + Sync {
    fn users(&self) -> Result<Vec<User>>;
    fn delete_user(&self, id: &UserId) -> Result<Ack>;
    fn promote_user(&self, id: &UserId, role: &Role) -> Result<Ack>;
}

pub struct ApiDirectoryService {
    client: Arc<api::Client>,
}

impl ApiDirectoryService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl DirectoryService for ApiDirectoryService {
    fn users(&self) -> Result<Vec<User>> {
        self.client.admin_users()
    }

    fn delete_user(&self, id: &UserId) -> Result<Ack> {
        self.client.admin_delete_user(id)
    }

    fn promote_user(&self, id: &UserId, role: &Role) -> Result<Ack> {
        self.client.admin_promote_user(id, role)
    }
}

/// Admin-only view of all accounts with local search.
pub struct UserDirectory {
    service: Arc<dyn DirectoryService>,
    session: SessionHandle,
    users: Vec<User>,
    notices: Notices,
}

impl UserDirectory {
    pub fn new(service: Arc<dyn DirectoryService>, session: SessionHandle) -> Self {
        Self {
            service,
            session,
            users: Vec::new(),
            notices: Notices::default(),
        }
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn notices_mut(&mut self) -> &mut Notices {
        &mut self.notices
    }

    pub fn load(&mut self) -> Result<usize> {
        self.require_admin()?;
        match self.service.users() {
            Ok(users) => {
                tracing::debug!(count = users.len(), "user directory loaded");
                self.users = users;
                Ok(self.users.len())
            }
            Err(err) => {
                self.notices.push(Notice::failure("Error fetching users", &err));
                Err(err)
            }
        }
    }

    /// Case-insensitive substring match over the visible profile fields.
    /// A blank query returns every user.
    pub fn search(&self, query: &str) -> Vec<&User> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.users.iter().collect();
        }
        self.users
            .iter()
            .filter(|user| {
                [
                    user.name.as_str(),
                    user.email.as_str(),
                    user.mobile.as_str(),
                    user.role.as_str(),
                    user.job.as_str(),
                    user.state.as_str(),
                    user.district.as_str(),
                    user.office_place.as_str(),
                    user.office.as_str(),
                ]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle))
            })
            .collect()
    }

    pub fn delete_user(&mut self, id: &UserId, confirm: &dyn Confirm) -> Result<bool> {
        self.require_admin()?;
        if !confirm.confirm("Are you sure you want to delete this user?") {
            return Ok(false);
        }
        match self.service.delete_user(id) {
            Ok(ack) => {
                self.users.retain(|user| &user.id != id);
                self.notices.push(Notice::success(
                    ack.message.unwrap_or_else(|| "User deleted".to_string()),
                ));
                Ok(true)
            }
            Err(err) => {
                self.notices.push(Notice::failure("Error deleting user", &err));
                Err(err)
            }
        }
    }

    /// Changes a user's role and patches the cached record on success.
    pub fn promote(&mut self, id: &UserId, role: Role) -> Result<Option<String>> {
        self.require_admin()?;
        match self.service.promote_user(id, &role) {
            Ok(ack) => {
                if let Some(user) = self.users.iter_mut().find(|user| &user.id == id) {
                    user.role = role.clone();
                }
                tracing::info!(user = %id, role = role.as_str(), "role changed");
                let message = ack
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("Role updated to {}", role.as_str()));
                self.notices.push(Notice::success(message));
                Ok(ack.message)
            }
            Err(err) => {
                self.notices.push(Notice::failure("Error promoting user", &err));
                Err(err)
            }
        }
    }

    fn require_admin(&self) -> Result<()> {
        let viewer = self.session.require()?;
        if !viewer.is_elevated() {
            return Err(ClientError::Forbidden("admin role required".into()));
        }
        Ok(())
    }
}
