use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(ItemId);
string_id!(UserId);
string_id!(CommentId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    #[default]
    Post,
    Video,
}

impl ItemKind {
    pub fn collection(&self) -> &'static str {
        match self {
            ItemKind::Post => "posts",
            ItemKind::Video => "videoposts",
        }
    }

    pub fn noun(&self) -> &'static str {
        match self {
            ItemKind::Post => "post",
            ItemKind::Video => "video",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Role {
    #[default]
    User,
    Staff,
    Admin,
    Block,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::User => "user",
            Role::Staff => "staff",
            Role::Admin => "admin",
            Role::Block => "block",
            Role::Other(value) => value.as_str(),
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "user" => Role::User,
            "staff" => Role::Staff,
            "admin" => Role::Admin,
            "block" => Role::Block,
            other => Role::Other(other.to_string()),
        }
    }

    pub fn is_elevated(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Role {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map(|value| Role::parse(&value)).unwrap_or_default())
    }
}

/// Author summary embedded in items and comments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Author {
    pub id: UserId,
    pub name: String,
    pub photo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub id: ItemId,
    pub kind: ItemKind,
    pub author: Option<Author>,
    pub title: String,
    pub media: String,
    pub description: String,
    pub like_count: u64,
    pub liked_by: Vec<UserId>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Item {
    pub fn is_liked_by(&self, user: &UserId) -> bool {
        self.liked_by.iter().any(|id| id == user)
    }

    pub fn is_owned_by(&self, user: &UserId) -> bool {
        self.author.as_ref().is_some_and(|author| &author.id == user)
    }

    pub fn like_state(&self) -> LikeState {
        LikeState {
            like_count: self.like_count,
            liked_by: self.liked_by.clone(),
        }
    }

    pub fn apply_like(&mut self, state: LikeState) {
        self.like_count = state.like_count;
        self.liked_by = state.liked_by;
    }
}

impl<'de> Deserialize<'de> for Item {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ItemHelper {
            #[serde(default, rename = "_id")]
            mongo_id: Option<ItemId>,
            #[serde(default)]
            id: Option<ItemId>,
            #[serde(default, alias = "author", alias = "postedBy")]
            user: Value,
            #[serde(default, rename = "postName", alias = "title")]
            title: Option<String>,
            #[serde(default, rename = "postImage")]
            image: Option<String>,
            #[serde(default)]
            video: Option<String>,
            #[serde(default, rename = "postDescription")]
            post_description: Option<String>,
            #[serde(default)]
            description: Option<String>,
            #[serde(default, rename = "likesCount")]
            likes_count: Option<u64>,
            #[serde(default, rename = "likedBy", alias = "likes")]
            liked_by: Value,
            #[serde(default, rename = "createdAt")]
            created_at: Option<DateTime<Utc>>,
        }

        let helper = ItemHelper::deserialize(deserializer)?;
        let id = either_id::<_, D::Error>(helper.mongo_id, helper.id)?;
        let liked_by = user_ids(&helper.liked_by);
        let kind = if helper.video.is_some() && helper.image.is_none() {
            ItemKind::Video
        } else {
            ItemKind::Post
        };
        Ok(Item {
            id,
            kind,
            author: author_from_value(&helper.user),
            title: helper.title.unwrap_or_default(),
            media: helper.image.or(helper.video).unwrap_or_default(),
            description: helper
                .post_description
                .or(helper.description)
                .unwrap_or_default(),
            like_count: helper.likes_count.unwrap_or(liked_by.len() as u64),
            liked_by,
            created_at: helper.created_at,
        })
    }
}

/// Server-authoritative like state returned by the toggle endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct LikeState {
    pub like_count: u64,
    pub liked_by: Vec<UserId>,
}

impl LikeState {
    pub fn contains(&self, user: &UserId) -> bool {
        self.liked_by.iter().any(|id| id == user)
    }
}

impl<'de> Deserialize<'de> for LikeState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct LikeHelper {
            #[serde(rename = "likesCount")]
            likes_count: Option<u64>,
            #[serde(default, rename = "likedBy", alias = "likes")]
            liked_by: Value,
        }

        let helper = LikeHelper::deserialize(deserializer)?;
        if helper.likes_count.is_none() && helper.liked_by.is_null() {
            return Err(serde::de::Error::custom(
                "like response missing likesCount and likedBy",
            ));
        }
        let liked_by = user_ids(&helper.liked_by);
        Ok(LikeState {
            like_count: helper.likes_count.unwrap_or(liked_by.len() as u64),
            liked_by,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comment {
    pub id: CommentId,
    pub author: Option<Author>,
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl Comment {
    pub fn is_authored_by(&self, user: &UserId) -> bool {
        self.author.as_ref().is_some_and(|author| &author.id == user)
    }
}

impl<'de> Deserialize<'de> for Comment {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct CommentHelper {
            #[serde(default, rename = "_id")]
            mongo_id: Option<CommentId>,
            #[serde(default)]
            id: Option<CommentId>,
            #[serde(default, alias = "author", alias = "postedBy")]
            user: Value,
            #[serde(default)]
            text: String,
            #[serde(default, rename = "createdAt")]
            created_at: Option<DateTime<Utc>>,
        }

        let helper = CommentHelper::deserialize(deserializer)?;
        Ok(Comment {
            id: either_id::<_, D::Error>(helper.mongo_id, helper.id)?,
            author: author_from_value(&helper.user),
            text: helper.text,
            created_at: helper.created_at,
        })
    }
}

/// Account record as returned by the profile and admin endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub mobile: String,
    pub role: Role,
    pub job: String,
    pub state: String,
    pub district: String,
    #[serde(rename = "officePlace")]
    pub office_place: String,
    pub office: String,
    pub photo: Option<String>,
}

impl<'de> Deserialize<'de> for User {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct UserHelper {
            #[serde(default, rename = "_id")]
            mongo_id: Option<UserId>,
            #[serde(default)]
            id: Option<UserId>,
            #[serde(default)]
            name: String,
            #[serde(default)]
            email: String,
            #[serde(default)]
            mobile: String,
            #[serde(default)]
            role: Role,
            #[serde(default)]
            job: String,
            #[serde(default)]
            state: String,
            #[serde(default)]
            district: String,
            #[serde(default, rename = "officePlace")]
            office_place: String,
            #[serde(default)]
            office: String,
            #[serde(default)]
            photo: Option<String>,
        }

        let helper = UserHelper::deserialize(deserializer)?;
        Ok(User {
            id: either_id::<_, D::Error>(helper.mongo_id, helper.id)?,
            name: helper.name,
            email: helper.email,
            mobile: helper.mobile,
            role: helper.role,
            job: helper.job,
            state: helper.state,
            district: helper.district,
            office_place: helper.office_place,
            office: helper.office,
            photo: helper.photo,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub message: Option<String>,
}

/// Entry in a user's follower list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Follower {
    pub id: UserId,
    pub name: String,
    pub photo: Option<String>,
    pub is_following: bool,
}

impl<'de> Deserialize<'de> for Follower {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct FollowerHelper {
            #[serde(default, rename = "_id")]
            mongo_id: Option<UserId>,
            #[serde(default)]
            id: Option<UserId>,
            #[serde(default)]
            name: String,
            #[serde(default)]
            photo: Option<String>,
            #[serde(default, rename = "isFollowing")]
            is_following: bool,
        }

        let helper = FollowerHelper::deserialize(deserializer)?;
        Ok(Follower {
            id: either_id::<_, D::Error>(helper.mongo_id, helper.id)?,
            name: helper.name,
            photo: helper.photo.filter(|photo| !photo.is_empty()),
            is_following: helper.is_following,
        })
    }
}

/// Reply to a follow toggle; `is_following` is absent when the server only acks.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct FollowState {
    #[serde(default, rename = "isFollowing")]
    pub is_following: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Documents may carry `_id`, `id` or both; `_id` wins.
fn either_id<T, E>(mongo_id: Option<T>, id: Option<T>) -> Result<T, E>
where
    E: serde::de::Error,
{
    mongo_id
        .or(id)
        .ok_or_else(|| E::missing_field("_id"))
}

fn id_from_value(value: &Value) -> Option<UserId> {
    match value {
        Value::String(id) if !id.is_empty() => Some(UserId::new(id.clone())),
        Value::Object(map) => map
            .get("_id")
            .or_else(|| map.get("id"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(UserId::from),
        _ => None,
    }
}

/// Normalises liker lists that arrive either as id strings or as user objects.
fn user_ids(value: &Value) -> Vec<UserId> {
    let Some(entries) = value.as_array() else {
        return Vec::new();
    };
    let mut ids: Vec<UserId> = Vec::with_capacity(entries.len());
    for id in entries.iter().filter_map(id_from_value) {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

fn author_from_value(value: &Value) -> Option<Author> {
    let id = id_from_value(value)?;
    let (name, photo) = match value {
        Value::Object(map) => (
            map.get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            map.get("photo")
                .and_then(Value::as_str)
                .filter(|photo| !photo.is_empty())
                .map(str::to_string),
        ),
        _ => (String::new(), None),
    };
    Some(Author { id, name, photo })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_post_with_populated_user() {
        let item: Item = serde_json::from_str(
            r#"{
                "_id": "p1",
                "user": {"_id": "u1", "name": "Asha", "photo": ""},
                "postName": "Harvest",
                "postImage": "https://cdn/p1.jpg",
                "postDescription": "Rice fields",
                "likesCount": 2,
                "likedBy": ["u2", "u3"],
                "createdAt": "2024-03-01T10:00:00Z"
            }"#,
        )
        .unwrap();
        assert_eq!(item.id.as_str(), "p1");
        assert_eq!(item.kind, ItemKind::Post);
        let author = item.author.as_ref().unwrap();
        assert_eq!(author.name, "Asha");
        assert_eq!(author.photo, None);
        assert_eq!(item.title, "Harvest");
        assert_eq!(item.description, "Rice fields");
        assert_eq!(item.like_count, 2);
        assert!(item.is_liked_by(&UserId::from("u3")));
        assert!(item.created_at.is_some());
    }

    #[test]
    fn decodes_video_with_missing_author_and_object_likers() {
        let item: Item = serde_json::from_str(
            r#"{
                "id": "v1",
                "user": null,
                "postName": "Demo",
                "video": "https://cdn/v1.mp4",
                "description": "Walkthrough",
                "likedBy": [{"_id": "u1"}, {"id": "u2"}, "u1"]
            }"#,
        )
        .unwrap();
        assert_eq!(item.kind, ItemKind::Video);
        assert!(item.author.is_none());
        assert_eq!(item.media, "https://cdn/v1.mp4");
        assert_eq!(item.liked_by, vec![UserId::from("u1"), UserId::from("u2")]);
        assert_eq!(item.like_count, 2);
    }

    #[test]
    fn like_state_requires_some_payload() {
        let err = serde_json::from_str::<LikeState>(r#"{"ok": true}"#);
        assert!(err.is_err());

        let state: LikeState =
            serde_json::from_str(r#"{"likesCount": 5, "likedBy": ["a"]}"#).unwrap();
        assert_eq!(state.like_count, 5);
        assert!(state.contains(&UserId::from("a")));
    }

    #[test]
    fn comment_author_may_be_bare_id() {
        let comment: Comment =
            serde_json::from_str(r#"{"_id": "c1", "user": "u9", "text": "nice"}"#).unwrap();
        assert!(comment.is_authored_by(&UserId::from("u9")));
        assert_eq!(comment.author.unwrap().name, "");
    }

    #[test]
    fn role_round_trips_unknown_values() {
        assert_eq!(Role::parse("Admin"), Role::Admin);
        assert_eq!(Role::parse("moderator"), Role::Other("moderator".into()));
        let user: User = serde_json::from_str(r#"{"_id": "u1", "role": null}"#).unwrap();
        assert_eq!(user.role, Role::User);
        assert!(!user.role.is_elevated());
    }

    #[test]
    fn documents_with_both_id_fields_decode() {
        let item: Item = serde_json::from_str(
            r#"{"_id": "p1", "id": "p1-virtual", "postName": "Harvest", "likedBy": []}"#,
        )
        .unwrap();
        assert_eq!(item.id.as_str(), "p1");

        let comment: Comment =
            serde_json::from_str(r#"{"_id": "c1", "id": "c1", "text": "ok"}"#).unwrap();
        assert_eq!(comment.id.as_str(), "c1");

        let user: User =
            serde_json::from_str(r#"{"_id": "u1", "id": "u1", "name": "Asha", "role": "staff"}"#)
                .unwrap();
        assert_eq!(user.id.as_str(), "u1");
        assert_eq!(user.role, Role::Staff);

        let only_id: User = serde_json::from_str(r#"{"id": "u2"}"#).unwrap();
        assert_eq!(only_id.id.as_str(), "u2");
    }

    #[test]
    fn document_without_any_id_is_rejected() {
        let err = serde_json::from_str::<Item>(r#"{"postName": "x"}"#).unwrap_err();
        assert!(err.to_string().contains("_id"));
        assert!(serde_json::from_str::<User>(r#"{"name": "x"}"#).is_err());
    }

    #[test]
    fn follower_list_entry_decodes() {
        let follower: Follower = serde_json::from_str(
            r#"{"_id": "u5", "name": "Ravi", "photo": "", "isFollowing": true}"#,
        )
        .unwrap();
        assert_eq!(follower.id.as_str(), "u5");
        assert_eq!(follower.photo, None);
        assert!(follower.is_following);

        let state: FollowState = serde_json::from_str(r#"{"message": "ok"}"#).unwrap();
        assert_eq!(state.is_following, None);
    }
}
