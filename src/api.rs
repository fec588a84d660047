use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::DEFAULT_BASE_URL;
use crate::error::{ClientError, Result};
use crate::models::{
    Ack, Comment, CommentId, FollowState, Follower, Item, ItemId, ItemKind, LikeState, Role, User,
    UserId,
};
use crate::session::CredentialSource;

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub base_url: Option<String>,
    pub user_agent: String,
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

/// One page request against a listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub author: Option<UserId>,
    pub limit: u32,
    pub skip: u64,
}

impl PageQuery {
    pub fn for_page(author: Option<UserId>, page: u64, limit: u32) -> Self {
        Self {
            author,
            limit,
            skip: page * u64::from(limit),
        }
    }

    fn into_params(self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(author) = self.author {
            if !author.as_str().is_empty() {
                params.push(("userId".into(), author.to_string()));
            }
        }
        params.push(("limit".into(), self.limit.to_string()));
        params.push(("skip".into(), self.skip.to_string()));
        params
    }
}

/// Media payload handed to the multipart create endpoints.
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct NewItem {
    pub title: String,
    pub description: String,
    pub media: MediaUpload,
}

#[derive(Serialize)]
struct CommentBody<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct RoleBody<'a> {
    role: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct CommentList(Vec<Comment>);

pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
    credentials: Arc<dyn CredentialSource>,
}

impl Client {
    pub fn new(credentials: Arc<dyn CredentialSource>, config: ClientConfig) -> anyhow::Result<Self> {
        if config.user_agent.trim().is_empty() {
            anyhow::bail!("api client user agent required");
        }
        let base = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = normalize_base(&base)?;
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout.unwrap_or(Duration::from_secs(20)))
                .build()?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
            credentials,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn list_items(&self, kind: ItemKind, query: PageQuery) -> Result<Vec<Item>> {
        let path = kind.collection().to_string();
        let mut items: Vec<Item> = self.get_json(&path, &query.into_params())?;
        for item in &mut items {
            item.kind = kind;
        }
        Ok(items)
    }

    pub fn list_posts(&self, query: PageQuery) -> Result<Vec<Item>> {
        self.list_items(ItemKind::Post, query)
    }

    pub fn list_videos(&self, query: PageQuery) -> Result<Vec<Item>> {
        self.list_items(ItemKind::Video, query)
    }

    pub fn create_item(&self, kind: ItemKind, item: NewItem) -> Result<Item> {
        self.require_credentials()?;
        let title = item.title.trim();
        if title.is_empty() {
            return Err(ClientError::validation("title is required"));
        }
        if item.media.bytes.is_empty() {
            return Err(ClientError::validation("media file is empty"));
        }

        let mime = tree_magic_mini::from_u8(&item.media.bytes);
        let part = Part::bytes(item.media.bytes)
            .file_name(item.media.file_name)
            .mime_str(mime)
            .map_err(|err| ClientError::validation(format!("unsupported media type: {err}")))?;
        let (description_field, media_field) = match kind {
            ItemKind::Post => ("postDescription", "postImage"),
            ItemKind::Video => ("description", "video"),
        };
        let form = Form::new()
            .text("postName", title.to_string())
            .text(description_field, item.description)
            .part(media_field, part);

        let req = self.builder(Method::POST, kind.collection(), &[])?.multipart(form);
        let mut created: Item = decode(self.send(req)?)?;
        created.kind = kind;
        Ok(created)
    }

    pub fn delete_item(&self, kind: ItemKind, id: &ItemId) -> Result<Ack> {
        self.require_credentials()?;
        let path = format!("{}/{}", kind.collection(), id);
        let req = self.builder(Method::DELETE, &path, &[])?;
        Ok(lenient(self.send(req)?))
    }

    pub fn toggle_like(&self, id: &ItemId) -> Result<LikeState> {
        self.require_credentials()?;
        let path = format!("posts/like/{id}");
        self.send_json(Method::PUT, &path, Some(&serde_json::json!({})))
    }

    pub fn list_comments(&self, id: &ItemId) -> Result<Vec<Comment>> {
        let path = format!("posts/comments/{id}");
        let list: CommentList = self.get_json(&path, &[])?;
        Ok(list.0)
    }

    pub fn add_comment(&self, id: &ItemId, text: &str) -> Result<Vec<Comment>> {
        self.require_credentials()?;
        let path = format!("posts/comment/{id}");
        let list: CommentList = self.send_json(Method::POST, &path, Some(&CommentBody { text }))?;
        Ok(list.0)
    }

    pub fn delete_comment(&self, id: &CommentId) -> Result<()> {
        self.require_credentials()?;
        let path = format!("posts/comment/{id}");
        let req = self.builder(Method::DELETE, &path, &[])?;
        self.send(req)?;
        Ok(())
    }

    pub fn profile(&self) -> Result<User> {
        self.require_credentials()?;
        self.get_json("users/profile", &[])
    }

    pub fn followers(&self, id: &UserId) -> Result<Vec<Follower>> {
        self.require_credentials()?;
        let path = format!("users/followers/{id}");
        self.get_json(&path, &[])
    }

    pub fn toggle_follow(&self, id: &UserId) -> Result<FollowState> {
        self.require_credentials()?;
        let path = format!("users/{id}/toggleFollow");
        let req = self
            .builder(Method::POST, &path, &[])?
            .json(&serde_json::json!({}));
        Ok(lenient(self.send(req)?))
    }

    pub fn admin_users(&self) -> Result<Vec<User>> {
        self.require_credentials()?;
        self.get_json("admin/users", &[])
    }

    pub fn admin_delete_user(&self, id: &UserId) -> Result<Ack> {
        self.require_credentials()?;
        let path = format!("admin/deleteuser/{id}");
        let req = self.builder(Method::DELETE, &path, &[])?;
        Ok(lenient(self.send(req)?))
    }

    pub fn admin_promote_user(&self, id: &UserId, role: &Role) -> Result<Ack> {
        self.require_credentials()?;
        let path = format!("admin/promoteuser/{id}");
        let req = self.builder(Method::PUT, &path, &[])?.json(&RoleBody {
            role: role.as_str(),
        });
        Ok(lenient(self.send(req)?))
    }

    fn require_credentials(&self) -> Result<String> {
        self.credentials.bearer().ok_or(ClientError::NotSignedIn)
    }

    fn get_json<T>(&self, path: &str, params: &[(String, String)]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let req = self.builder(Method::GET, path, params)?;
        decode(self.send(req)?)
    }

    fn send_json<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut req = self.builder(method, path, &[])?;
        if let Some(body) = body {
            req = req.json(body);
        }
        decode(self.send(req)?)
    }

    fn builder(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
    ) -> Result<RequestBuilder> {
        let mut url = self.base_url.join(path.trim_start_matches('/'))?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }

        tracing::debug!(%method, %url, "api request");
        let mut req = self.http.request(method, url);
        req = req.header(USER_AGENT, self.user_agent.clone());
        if let Some(token) = self.credentials.bearer() {
            req = req.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        Ok(req)
    }

    fn send(&self, req: RequestBuilder) -> Result<Response> {
        let resp = req.send().map_err(|err| {
            tracing::warn!(error = %err, "api transport failure");
            ClientError::Network(err.to_string())
        })?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().unwrap_or_default();
        tracing::warn!(status = status.as_u16(), "api request rejected");
        Err(ClientError::from_status(status, &body))
    }
}

fn decode<T>(resp: Response) -> Result<T>
where
    T: DeserializeOwned,
{
    let body = resp.text()?;
    let trimmed = body.trim();
    let payload = if trimmed.is_empty() { "null" } else { trimmed };
    serde_json::from_str(payload).map_err(ClientError::from)
}

/// Acknowledgement bodies are informational; an empty or foreign body is still success.
fn lenient<T>(resp: Response) -> T
where
    T: DeserializeOwned + Default,
{
    resp.text()
        .ok()
        .and_then(|body| serde_json::from_str::<T>(&body).ok())
        .unwrap_or_default()
}

/// Base URLs need a trailing slash so relative joins keep the `/api` prefix.
fn normalize_base(raw: &str) -> anyhow::Result<Url> {
    let trimmed = raw.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    Ok(Url::parse(&with_slash)?)
}
