use std::sync::Arc;

use crate::api;
use crate::error::{ClientError, Result};
use crate::models::{FollowState, Follower, UserId};
use crate::notice::{Notice, Notices};
use crate::session::SessionHandle;

pub trait FollowService: Send + Sync {
    fn followers(&self, user: &UserId) -> Result<Vec<Follower>>;
    fn toggle_follow(&self, user: &UserId) -> Result<FollowState>;
}

pub struct ApiFollowService {
    client: Arc<api::Client>,
}

impl ApiFollowService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl FollowService for ApiFollowService {
    fn followers(&self, user: &UserId) -> Result<Vec<Follower>> {
        self.client.followers(user)
    }

    fn toggle_follow(&self, user: &UserId) -> Result<FollowState> {
        self.client.toggle_follow(user)
    }
}

/// Follower list of one profile, plus follow toggling for the viewer.
pub struct FollowList {
    service: Arc<dyn FollowService>,
    session: SessionHandle,
    profile: Option<UserId>,
    followers: Vec<Follower>,
    notices: Notices,
}

impl FollowList {
    pub fn new(service: Arc<dyn FollowService>, session: SessionHandle) -> Self {
        Self {
            service,
            session,
            profile: None,
            followers: Vec::new(),
            notices: Notices::default(),
        }
    }

    pub fn profile(&self) -> Option<&UserId> {
        self.profile.as_ref()
    }

    pub fn followers(&self) -> &[Follower] {
        &self.followers
    }

    pub fn notices_mut(&mut self) -> &mut Notices {
        &mut self.notices
    }

    pub fn load(&mut self, profile: &UserId) -> Result<usize> {
        self.session.require()?;
        match self.service.followers(profile) {
            Ok(followers) => {
                tracing::debug!(user = %profile, count = followers.len(), "followers loaded");
                self.profile = Some(profile.clone());
                self.followers = followers;
                Ok(self.followers.len())
            }
            Err(err) => {
                self.notices
                    .push(Notice::failure("Error fetching followers", &err));
                Err(err)
            }
        }
    }

    /// Toggles following `target`. A reported `isFollowing` replaces the
    /// cached flag; a bare ack leaves it untouched.
    pub fn toggle_follow(&mut self, target: &UserId) -> Result<FollowState> {
        let viewer = self.session.require()?;
        if &viewer.id == target {
            return Err(ClientError::validation("you cannot follow yourself"));
        }
        match self.service.toggle_follow(target) {
            Ok(state) => {
                if let Some(following) = state.is_following {
                    if let Some(entry) = self.followers.iter_mut().find(|f| &f.id == target) {
                        entry.is_following = following;
                    }
                }
                self.notices
                    .push(Notice::success("Follow status updated successfully"));
                Ok(state)
            }
            Err(err) => {
                self.notices
                    .push(Notice::failure("Error toggling follow", &err));
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::models::Role;
    use crate::session::{Session, Viewer};

    #[derive(Default)]
    struct FakeFollows {
        followers: Vec<Follower>,
        reply: Mutex<Option<FollowState>>,
        toggles: Mutex<Vec<String>>,
    }

    impl FollowService for FakeFollows {
        fn followers(&self, _user: &UserId) -> Result<Vec<Follower>> {
            Ok(self.followers.clone())
        }

        fn toggle_follow(&self, user: &UserId) -> Result<FollowState> {
            self.toggles.lock().push(user.to_string());
            Ok(self.reply.lock().take().unwrap_or_default())
        }
    }

    fn follower(id: &str, following: bool) -> Follower {
        Follower {
            id: UserId::from(id),
            name: format!("user {id}"),
            photo: None,
            is_following: following,
        }
    }

    fn session() -> SessionHandle {
        SessionHandle::signed_in(Session {
            viewer: Viewer {
                id: UserId::from("me"),
                name: "Me".into(),
                role: Role::User,
            },
            token: "t".into(),
        })
    }

    #[test]
    fn toggle_adopts_reported_state() {
        let service = Arc::new(FakeFollows {
            followers: vec![follower("a", false), follower("b", true)],
            reply: Mutex::new(Some(FollowState {
                is_following: Some(true),
                message: None,
            })),
            ..Default::default()
        });
        let mut list = FollowList::new(service.clone(), session());
        assert_eq!(list.load(&UserId::from("me")).unwrap(), 2);

        let state = list.toggle_follow(&UserId::from("a")).unwrap();
        assert_eq!(state.is_following, Some(true));
        assert!(list.followers()[0].is_following);
        assert_eq!(*service.toggles.lock(), vec!["a".to_string()]);
    }

    #[test]
    fn bare_ack_keeps_cached_flag() {
        let service = Arc::new(FakeFollows {
            followers: vec![follower("b", true)],
            ..Default::default()
        });
        let mut list = FollowList::new(service, session());
        list.load(&UserId::from("me")).unwrap();
        list.toggle_follow(&UserId::from("b")).unwrap();
        assert!(list.followers()[0].is_following);
    }

    #[test]
    fn self_follow_and_anonymous_use_are_rejected() {
        let service = Arc::new(FakeFollows::default());
        let mut list = FollowList::new(service.clone(), session());
        assert!(matches!(
            list.toggle_follow(&UserId::from("me")),
            Err(ClientError::Validation(_))
        ));

        let mut anonymous = FollowList::new(service.clone(), SessionHandle::new());
        assert!(matches!(
            anonymous.load(&UserId::from("me")),
            Err(ClientError::NotSignedIn)
        ));
        assert!(service.toggles.lock().is_empty());
    }
}
