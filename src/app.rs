use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use crate::admin::{ApiDirectoryService, UserDirectory};
use crate::api::{self, MediaUpload, NewItem};
use crate::config::{self, Config};
use crate::error::ClientError;
use crate::feed::{ApiFeedService, FeedScope, FeedService, FeedStore};
use crate::follow::{ApiFollowService, FollowList};
use crate::interaction::{ApiInteractionService, Confirm, Interactions};
use crate::models::{ItemId, ItemKind, Role, UserId};
use crate::notice::{Level, Notice};
use crate::pager::{Applied, Pager, Trigger, TriggerOutcome};
use crate::present::Presenter;
use crate::session::{self, Session, SessionHandle, Viewer};
use crate::storage;

const LOG_ENV: &str = "FMC_LOG";
const DEFAULT_WIDTH: usize = 80;
const DELETE_SEARCH_PAGES: u32 = 20;

/// FMC client: browse and moderate the FMC community feed.
#[derive(Debug, Parser)]
#[command(
    name = "fmc-client",
    version,
    after_help = "Set FMC_LOG (e.g. FMC_LOG=debug) to enable diagnostics on stderr."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// List posts or videos (the default command)
    Feed {
        /// List videos instead of posts
        #[arg(long)]
        videos: bool,
        /// Only items shared by this user
        #[arg(long, value_name = "ID")]
        user: Option<String>,
        /// Number of pages to load
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        pages: u32,
    },
    /// Show an item's comments
    Comments { item: String },
    /// Toggle your like on an item
    Like { item: String },
    /// Add a comment; every word after ITEM is part of the text
    Comment {
        item: String,
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },
    /// Delete an item you own (or any item, as admin)
    Delete {
        item: String,
        #[arg(long)]
        videos: bool,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Upload a post or video
    Post {
        title: String,
        file: PathBuf,
        #[arg(long)]
        videos: bool,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Sign in with a bearer token
    Login {
        #[arg(long)]
        token: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Search accounts (admin)
    Users {
        #[arg(trailing_var_arg = true)]
        query: Vec<String>,
    },
    /// List a user's followers (defaults to you)
    Followers { user: Option<String> },
    /// Follow or unfollow a user
    Follow { user: String },
    /// Change a user's role (admin)
    Promote {
        user: String,
        #[arg(value_parser = parse_role)]
        role: Role,
    },
    /// Delete an account (admin)
    RemoveUser {
        user: String,
        #[arg(long)]
        yes: bool,
    },
    /// Save the API base URL to the config file
    Endpoint { url: String },
}

fn parse_role(raw: &str) -> std::result::Result<Role, String> {
    match Role::parse(raw) {
        Role::Other(other) => Err(format!(
            "unknown role {other:?}; expected user, staff, admin or block"
        )),
        role => Ok(role),
    }
}

fn kind_of(videos: bool) -> ItemKind {
    if videos {
        ItemKind::Video
    } else {
        ItemKind::Post
    }
}

fn scope_for(kind: ItemKind) -> FeedScope {
    match kind {
        ItemKind::Post => FeedScope::posts(),
        ItemKind::Video => FeedScope::videos(),
    }
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

pub fn run(cli: Cli) -> Result<()> {
    let command = cli.command.unwrap_or(Command::Feed {
        videos: false,
        user: None,
        pages: 1,
    });
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;

    if let Command::Endpoint { url } = &command {
        let path = config::save_api_endpoint(None, url)?;
        println!("API endpoint saved to {}", path.display());
        return Ok(());
    }

    let runtime = Runtime::open(cfg)?;
    tracing::debug!(?command, base_url = %runtime.client.base_url(), "running command");
    runtime.execute(command)
}

struct Runtime {
    cfg: Config,
    sessions: session::Manager,
    client: Arc<api::Client>,
    width: usize,
}

impl Runtime {
    fn open(cfg: Config) -> Result<Self> {
        let store = Arc::new(
            storage::Store::open(storage::Options {
                path: cfg.storage.path.clone(),
            })
            .context("open storage")?,
        );
        let sessions = session::Manager::new(store);
        if let Some(viewer) = sessions.load_existing().context("restore session")? {
            tracing::debug!(user = %viewer.id, "session restored");
        }
        let client = Arc::new(build_client(&cfg, Arc::new(sessions.handle()))?);
        Ok(Self {
            cfg,
            sessions,
            client,
            width: terminal_width(),
        })
    }

    fn execute(&self, command: Command) -> Result<()> {
        match command {
            Command::Feed {
                videos,
                user,
                pages,
            } => self.feed(kind_of(videos), user.map(UserId::from), pages),
            Command::Comments { item } => self.comments(&ItemId::from(item)),
            Command::Like { item } => self.like(&ItemId::from(item)),
            Command::Comment { item, text } => self.comment(&ItemId::from(item), &text.join(" ")),
            Command::Delete { item, videos, yes } => {
                self.delete(&ItemId::from(item), kind_of(videos), yes)
            }
            Command::Post {
                title,
                file,
                videos,
                description,
            } => self.post(kind_of(videos), title, file, description),
            Command::Login { token } => self.login(token),
            Command::Logout => {
                if self.sessions.logout()? {
                    println!("Signed out.");
                } else {
                    println!("No active session.");
                }
                Ok(())
            }
            Command::Whoami => {
                match self.sessions.handle().viewer() {
                    Some(viewer) => println!("{} ({}) {}", viewer.name, viewer.id, viewer.role.as_str()),
                    None => println!("Not signed in."),
                }
                Ok(())
            }
            Command::Users { query } => self.users(&query.join(" ")),
            Command::Followers { user } => self.followers(user.map(UserId::from)),
            Command::Follow { user } => self.follow(&UserId::from(user)),
            Command::Promote { user, role } => {
                let mut directory = self.directory();
                let result = directory.promote(&UserId::from(user), role);
                report(directory.notices_mut().drain());
                result?;
                Ok(())
            }
            Command::RemoveUser { user, yes } => {
                let mut directory = self.directory();
                let result = directory.delete_user(&UserId::from(user), &prompt_confirm(yes));
                report(directory.notices_mut().drain());
                if !result? {
                    println!("Cancelled.");
                }
                Ok(())
            }
            Command::Endpoint { .. } => Ok(()),
        }
    }

    fn interactions(&self) -> Interactions {
        Interactions::new(
            Arc::new(ApiInteractionService::new(self.client.clone())),
            self.sessions.handle(),
        )
    }

    fn directory(&self) -> UserDirectory {
        UserDirectory::new(
            Arc::new(ApiDirectoryService::new(self.client.clone())),
            self.sessions.handle(),
        )
    }

    fn follow_list(&self) -> FollowList {
        FollowList::new(
            Arc::new(ApiFollowService::new(self.client.clone())),
            self.sessions.handle(),
        )
    }

    fn feed_service(&self) -> Arc<dyn FeedService> {
        Arc::new(ApiFeedService::new(self.client.clone()))
    }

    fn presenter(&self) -> Presenter {
        Presenter::new(self.width, self.cfg.feed.preview_chars)
    }

    fn feed(&self, kind: ItemKind, author: Option<UserId>, pages: u32) -> Result<()> {
        let mut scope = scope_for(kind);
        if let Some(author) = author {
            scope = scope.by_author(author);
        }
        let store = FeedStore::with_config(scope, &self.cfg.feed);
        let mut pager = Pager::new(self.feed_service(), store, self.cfg.feed.scroll_threshold);
        let wait_for = self.cfg.api.timeout + Duration::from_secs(5);

        for _ in 0..pages {
            if let TriggerOutcome::Ignored(reason) = pager.trigger(Trigger::Explicit) {
                tracing::debug!(?reason, "stopping pagination");
                break;
            }
            match pager.wait(wait_for) {
                Some(Applied::Failed(message)) => bail!(message),
                Some(_) => {}
                None => bail!("timed out waiting for {}", pager.scope()),
            }
        }

        let interactions = self.interactions();
        for line in self
            .presenter()
            .render_feed(pager.store(), &interactions, pager.is_fetching())
        {
            println!("{line}");
        }
        Ok(())
    }

    fn comments(&self, item: &ItemId) -> Result<()> {
        let mut interactions = self.interactions();
        let comments = interactions.open_comments(item).to_vec();
        let notices = interactions.notices_mut().drain();
        if let Some(failed) = notices.iter().find(|notice| notice.level == Level::Error) {
            bail!(failed.message.clone());
        }
        for line in self.presenter().render_thread(&comments) {
            println!("{line}");
        }
        Ok(())
    }

    fn like(&self, item: &ItemId) -> Result<()> {
        let mut interactions = self.interactions();
        let mut store = FeedStore::with_config(FeedScope::posts(), &self.cfg.feed);
        let state = interactions.toggle_like(&mut store, item)?;
        let liked = self
            .sessions
            .handle()
            .viewer()
            .is_some_and(|viewer| state.contains(&viewer.id));
        let marker = if liked { "liked" } else { "not liked" };
        println!("{item}: {marker}, {} likes", state.like_count);
        Ok(())
    }

    fn comment(&self, item: &ItemId, text: &str) -> Result<()> {
        let mut interactions = self.interactions();
        let thread = interactions.submit_comment(item, text)?.to_vec();
        for line in self.presenter().render_thread(&thread) {
            println!("{line}");
        }
        Ok(())
    }

    fn delete(&self, item: &ItemId, kind: ItemKind, yes: bool) -> Result<()> {
        let viewer = self.sessions.handle().require()?;
        // Non-admins can only delete items they authored.
        let scope = if viewer.is_elevated() {
            scope_for(kind)
        } else {
            scope_for(kind).by_author(viewer.id.clone())
        };
        let mut store = FeedStore::with_config(scope, &self.cfg.feed);
        let service = self.feed_service();
        let mut searched = 0;
        while !store.contains(item) && store.has_more() && searched < DELETE_SEARCH_PAGES {
            store.load_next_page(service.as_ref())?;
            searched += 1;
        }
        if !store.contains(item) {
            bail!("{} {item} not found", kind.noun());
        }

        let mut interactions = self.interactions();
        let result = interactions.delete_item(&mut store, item, &prompt_confirm(yes));
        report(interactions.notices_mut().drain());
        if !result? {
            println!("Cancelled.");
        }
        Ok(())
    }

    fn post(&self, kind: ItemKind, title: String, file: PathBuf, description: String) -> Result<()> {
        let bytes = std::fs::read(&file)
            .with_context(|| format!("read media file {}", file.display()))?;
        let file_name = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let mut store = FeedStore::with_config(scope_for(kind), &self.cfg.feed);
        let mut interactions = self.interactions();
        let result = interactions.create_item(
            &mut store,
            NewItem {
                title,
                description,
                media: MediaUpload { file_name, bytes },
            },
        );
        report(interactions.notices_mut().drain());
        let created = result?;
        println!("{}", created.id);
        Ok(())
    }

    /// Validates the token against the profile endpoint before persisting it.
    fn login(&self, token: String) -> Result<()> {
        let token = token.trim().to_string();
        if token.is_empty() {
            bail!("token must not be empty");
        }
        let candidate = SessionHandle::signed_in(Session {
            viewer: Viewer {
                id: UserId::from("pending"),
                name: String::new(),
                role: Role::User,
            },
            token: token.clone(),
        });
        let client = build_client(&self.cfg, Arc::new(candidate))?;
        let profile = client.profile().map_err(|err| match err {
            ClientError::Auth => anyhow!("token rejected by server"),
            other => anyhow!(other).context("fetch profile"),
        })?;
        let viewer = Viewer::from(&profile);
        self.sessions.login(Session {
            viewer: viewer.clone(),
            token,
        })?;
        println!("Signed in as {} ({})", viewer.name, viewer.role.as_str());
        Ok(())
    }

    fn followers(&self, user: Option<UserId>) -> Result<()> {
        let profile = match user {
            Some(user) => user,
            None => self.sessions.handle().require()?.id,
        };
        let mut list = self.follow_list();
        let loaded = list.load(&profile);
        report(list.notices_mut().drain());
        loaded?;
        if list.followers().is_empty() {
            println!("No followers yet.");
        }
        for follower in list.followers() {
            let marker = if follower.is_following {
                "following"
            } else {
                ""
            };
            println!("{}  {}  {marker}", follower.id, follower.name);
        }
        Ok(())
    }

    fn follow(&self, user: &UserId) -> Result<()> {
        let mut list = self.follow_list();
        let result = list.toggle_follow(user);
        report(list.notices_mut().drain());
        let state = result?;
        match state.is_following {
            Some(true) => println!("Following {user}"),
            Some(false) => println!("Not following {user}"),
            None => {}
        }
        Ok(())
    }

    fn users(&self, query: &str) -> Result<()> {
        let mut directory = self.directory();
        let loaded = directory.load();
        report(directory.notices_mut().drain());
        loaded?;
        for user in directory.search(query) {
            println!(
                "{}  {}  {}  {}  {}",
                user.id,
                user.name,
                user.email,
                user.role.as_str(),
                user.district
            );
        }
        Ok(())
    }
}

fn build_client(cfg: &Config, credentials: Arc<dyn session::CredentialSource>) -> Result<api::Client> {
    api::Client::new(
        credentials,
        api::ClientConfig {
            base_url: Some(cfg.api.base_url.clone()),
            user_agent: cfg.api.user_agent.clone(),
            timeout: Some(cfg.api.timeout),
            http_client: None,
        },
    )
}

/// Success and info notices go to stdout; failures surface via the returned error.
fn report(notices: Vec<Notice>) {
    for notice in notices {
        if notice.level != Level::Error {
            println!("{}", notice.message);
        }
    }
}

struct PromptConfirm {
    assume_yes: bool,
}

impl Confirm for PromptConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        print!("{prompt} [y/N] ");
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

fn prompt_confirm(assume_yes: bool) -> PromptConfirm {
    PromptConfirm { assume_yes }
}

fn terminal_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|raw| raw.parse::<usize>().ok())
        .filter(|width| *width >= 20)
        .unwrap_or(DEFAULT_WIDTH)
}
