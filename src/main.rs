use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quire::{
    BlogService, Config, Database, NewPost, NewUser, Post, PostId, PostStatus, Subject, User,
};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// quire - a small multi-author blogging engine
#[derive(Parser)]
#[command(name = "quire")]
#[command(about = "Multi-author blogging with reactions and personalized feeds")]
#[command(version)]
struct Cli {
    /// Database file to use instead of the configured one
    #[arg(long, global = true, value_name = "PATH")]
    database: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Manage accounts
    #[command(subcommand)]
    User(UserCommand),
    /// Manage main tags
    #[command(subcommand)]
    Tag(TagCommand),
    /// Manage posts
    #[command(subcommand)]
    Post(PostCommand),
    /// Manage comments
    #[command(subcommand)]
    Comment(CommentCommand),
    /// Toggle an upvote or downvote on a post or comment
    React(ReactCommand),
    /// Follow another user
    Follow(FollowCommand),
    /// Stop following another user
    Unfollow(FollowCommand),
    /// Replace a user's preferred tags
    Prefs(PrefsCommand),
    /// Record that a user read a post
    Read(ReadCommand),
    /// Show a user's personalized feed
    Feed(UsernameArg),
    /// Show recent posts by the authors a user follows
    Following(UsernameArg),
    /// Recommend authors or posts to a user
    #[command(subcommand)]
    Recommend(RecommendCommand),
}

#[derive(Subcommand)]
enum UserCommand {
    /// Register a new account
    Add {
        username: String,
        email: String,
        /// Short profile text
        #[arg(long)]
        bio: Option<String>,
    },
    /// Delete an account and everything it owns
    Delete { username: String },
}

#[derive(Subcommand)]
enum TagCommand {
    /// Create a main tag (no-op if it exists)
    Add { name: String },
    /// List main tags
    List,
}

#[derive(Subcommand)]
enum PostCommand {
    /// Write a new post, published unless --draft is given
    Add(PostAddCommand),
}

#[derive(Parser)]
struct PostAddCommand {
    /// Username of the author
    author: String,
    title: String,
    content: String,
    /// Main tag name, created if missing
    #[arg(long, value_name = "MAIN")]
    tag: String,
    /// Author's own sub-tag, created if missing
    #[arg(long, value_name = "NAME")]
    sub_tag: Option<String>,
    /// Keep the post as a draft
    #[arg(long)]
    draft: bool,
    #[arg(long, value_name = "TEXT")]
    excerpt: Option<String>,
}

#[derive(Subcommand)]
enum CommentCommand {
    /// Comment on a post
    Add {
        /// Username of the author
        author: String,
        post_id: i64,
        content: String,
        /// Comment being replied to
        #[arg(long, value_name = "COMMENT_ID")]
        reply_to: Option<i64>,
    },
}

#[derive(Parser)]
struct ReactCommand {
    username: String,
    /// `post` or `comment`
    subject_kind: String,
    subject_id: i64,
    /// `upvote` or `downvote`
    reaction: String,
}

#[derive(Parser)]
struct FollowCommand {
    username: String,
    target: String,
}

#[derive(Parser)]
struct PrefsCommand {
    username: String,
    /// Comma-separated main tag names; empty clears the preferences
    #[arg(value_name = "TAGS")]
    tags: String,
}

#[derive(Parser)]
struct ReadCommand {
    username: String,
    post_id: i64,
}

#[derive(Parser)]
struct UsernameArg {
    username: String,
}

#[derive(Subcommand)]
enum RecommendCommand {
    /// Authors with similar interests, then trending ones
    Authors(UsernameArg),
    /// Posts matching preferred tags or upvotes
    Posts(UsernameArg),
}

fn main() {
    let cli = Cli::parse();

    let result = Config::load().and_then(|config| {
        init_tracing(&config);
        let db_path = cli.database.clone().unwrap_or(config.database_path);
        ensure_database_directory(&db_path)?;
        let db = Database::open_with_timeout(&db_path, config.busy_timeout)
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

        let mut stdout = io::stdout().lock();
        execute(&cli.command, &BlogService::new(db), cli.json, &mut stdout)
    });

    if let Err(e) = result {
        let exit_code = if is_user_error(&e) { 1 } else { 2 };
        eprintln!("Error: {e:#}");
        std::process::exit(exit_code);
    }
}

/// Installs the stderr log subscriber, keeping stdout for command output.
fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_filter)
        .unwrap_or_else(|_| EnvFilter::new(quire::config::DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Determines if an error is a user error (vs internal error).
///
/// User errors are the library's input errors (unknown users or posts,
/// bad reaction values, validation failures). Everything else, including
/// database and I/O failures, is internal.
fn is_user_error(error: &anyhow::Error) -> bool {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<quire::Error>())
        .is_some_and(quire::Error::is_user_error)
}

/// Ensures the parent directory of the database file exists.
fn ensure_database_directory(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create database directory: {}", parent.display())
        })?;
    }
    Ok(())
}

/// Runs one command against `service`, writing its output to `out`.
///
/// Separated from `main` so it can be tested with in-memory databases.
fn execute(
    command: &Commands,
    service: &BlogService,
    json: bool,
    out: &mut impl Write,
) -> Result<()> {
    debug!(json, "executing command");
    match command {
        Commands::User(UserCommand::Add {
            username,
            email,
            bio,
        }) => {
            let mut new_user = NewUser::new(username.as_str(), email.as_str());
            if let Some(bio) = bio {
                new_user = new_user.bio(bio.as_str());
            }
            let user = service.register_user(new_user)?;
            emit(out, json, &user, |u| format!("User created (id: {}): {}", u.id, u.username))
        }
        Commands::User(UserCommand::Delete { username }) => {
            let user = service.user_by_username(username)?;
            service.delete_user(user.id)?;
            emit(out, json, &user, |u| format!("User deleted: {}", u.username))
        }
        Commands::Tag(TagCommand::Add { name }) => {
            let tag = service.get_or_create_main_tag(name)?;
            emit(out, json, &tag, |t| format!("Tag {} (id: {})", t.name, t.id))
        }
        Commands::Tag(TagCommand::List) => {
            let tags = service.list_main_tags()?;
            emit(out, json, &tags, |tags| {
                tags.iter()
                    .map(|t| format!("{}\t{}", t.id, t.name))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        Commands::Post(PostCommand::Add(cmd)) => {
            let post = execute_post_add(cmd, service)?;
            emit(out, json, &post, |p| {
                format!("Post created (id: {}, {}): {}", p.id, p.status, p.slug)
            })
        }
        Commands::Comment(CommentCommand::Add {
            author,
            post_id,
            content,
            reply_to,
        }) => {
            let author = service.user_by_username(author)?;
            let comment = service.add_comment(
                author.id,
                PostId::new(*post_id),
                content,
                reply_to.map(quire::CommentId::new),
            )?;
            emit(out, json, &comment, |c| format!("Comment created (id: {})", c.id))
        }
        Commands::React(cmd) => {
            let user = service.user_by_username(&cmd.username)?;
            let outcome =
                service.toggle_reaction(user.id, &cmd.subject_kind, cmd.subject_id, &cmd.reaction)?;
            let subject = Subject::parse(&cmd.subject_kind, cmd.subject_id)?;
            let counts = service.reaction_counts(subject)?;

            #[derive(Serialize)]
            struct ReactOutput {
                subject: Subject,
                reaction: Option<quire::ReactionKind>,
                counts: quire::ReactionCounts,
            }
            let output = ReactOutput {
                subject,
                reaction: outcome,
                counts,
            };
            emit(out, json, &output, |o| {
                let state = o.reaction.map_or("none".to_string(), |r| r.to_string());
                format!(
                    "{}: your reaction is {state} ({} up, {} down)",
                    o.subject, o.counts.upvotes, o.counts.downvotes
                )
            })
        }
        Commands::Follow(cmd) => {
            let (user, target) = resolve_pair(service, cmd)?;
            let created = service.follow(user.id, target.id)?;
            emit(out, json, &created, |created| {
                if *created {
                    format!("{} now follows {}", user.username, target.username)
                } else {
                    format!("{} already follows {}", user.username, target.username)
                }
            })
        }
        Commands::Unfollow(cmd) => {
            let (user, target) = resolve_pair(service, cmd)?;
            let removed = service.unfollow(user.id, target.id)?;
            emit(out, json, &removed, |removed| {
                if *removed {
                    format!("{} no longer follows {}", user.username, target.username)
                } else {
                    format!("{} was not following {}", user.username, target.username)
                }
            })
        }
        Commands::Prefs(cmd) => {
            let user = service.user_by_username(&cmd.username)?;
            let mut ids = Vec::new();
            for name in parse_tags(&cmd.tags) {
                let tag = service.find_main_tag(&name)?.ok_or(quire::Error::NotFound {
                    entity: "main tag",
                    id: name,
                })?;
                ids.push(tag.id);
            }
            let prefs = service.update_preferences(user.id, &ids)?;
            emit(out, json, &prefs, |p| {
                let names: Vec<&str> = p.preferred_tags.iter().map(|t| t.name.as_str()).collect();
                format!("Preferred tags: {}", names.join(", "))
            })
        }
        Commands::Read(cmd) => {
            let user = service.user_by_username(&cmd.username)?;
            let entry = service.record_read(user.id, PostId::new(cmd.post_id))?;
            emit(out, json, &entry, |e| format!("{} read post {}", user.username, e.post_id))
        }
        Commands::Feed(arg) => {
            let user = service.user_by_username(&arg.username)?;
            let posts = service.for_you(user.id)?;
            emit(out, json, &posts, |posts| format_posts(posts))
        }
        Commands::Following(arg) => {
            let user = service.user_by_username(&arg.username)?;
            let posts = service.following_feed(user.id)?;
            emit(out, json, &posts, |posts| format_posts(posts))
        }
        Commands::Recommend(RecommendCommand::Authors(arg)) => {
            let user = service.user_by_username(&arg.username)?;
            let authors = service.recommended_authors(user.id)?;
            emit(out, json, &authors, |authors| format_users(authors))
        }
        Commands::Recommend(RecommendCommand::Posts(arg)) => {
            let user = service.user_by_username(&arg.username)?;
            let posts = service.recommended_posts(user.id)?;
            emit(out, json, &posts, |posts| format_posts(posts))
        }
    }
}

fn execute_post_add(cmd: &PostAddCommand, service: &BlogService) -> Result<Post> {
    let author = service.user_by_username(&cmd.author)?;
    let tag = service.get_or_create_main_tag(&cmd.tag)?;

    let mut post = NewPost::new(cmd.title.as_str(), cmd.content.as_str(), tag.id);
    if !cmd.draft {
        post = post.status(PostStatus::Published);
    }
    if let Some(name) = &cmd.sub_tag {
        post = post.sub_tag(service.get_or_create_sub_tag(author.id, name)?.id);
    }
    if let Some(excerpt) = &cmd.excerpt {
        post = post.excerpt(excerpt.as_str());
    }

    Ok(service.create_post(author.id, post)?)
}

fn resolve_pair(service: &BlogService, cmd: &FollowCommand) -> Result<(User, User)> {
    Ok((
        service.user_by_username(&cmd.username)?,
        service.user_by_username(&cmd.target)?,
    ))
}

/// Writes `value` as pretty JSON, or as the text produced by `human`.
fn emit<T: Serialize>(
    out: &mut impl Write,
    json: bool,
    value: &T,
    human: impl FnOnce(&T) -> String,
) -> Result<()> {
    if json {
        serde_json::to_writer_pretty(&mut *out, value).context("Failed to serialize output")?;
        writeln!(out)?;
    } else {
        let text = human(value);
        if !text.is_empty() {
            writeln!(out, "{text}")?;
        }
    }
    Ok(())
}

fn format_posts(posts: &[Post]) -> String {
    if posts.is_empty() {
        return "No posts.".to_string();
    }
    posts
        .iter()
        .map(|p| format!("{}\t{}\t{}", p.id, p.created_at.date(), p.title))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_users(users: &[User]) -> String {
    if users.is_empty() {
        return "No authors.".to_string();
    }
    users
        .iter()
        .map(|u| format!("{}\t{}", u.id, u.username))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parses comma-separated tags from a string.
///
/// Splits on commas, trims whitespace from each tag, and filters out empty strings.
fn parse_tags(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(service: &BlogService, args: &[&str]) -> Result<String> {
        let cli = Cli::try_parse_from(std::iter::once("quire").chain(args.iter().copied()))
            .expect("arguments should parse");
        let mut out = Vec::new();
        execute(&cli.command, service, cli.json, &mut out)?;
        Ok(String::from_utf8(out).expect("output is utf-8"))
    }

    fn service() -> BlogService {
        BlogService::new(Database::in_memory().expect("failed to create in-memory database"))
    }

    #[test]
    fn parse_tags_with_normal_input() {
        let result = parse_tags("rust,learning");
        assert_eq!(result, vec!["rust", "learning"]);
    }

    #[test]
    fn parse_tags_with_whitespace_and_empty_elements() {
        let result = parse_tags(" rust ,, learning ,");
        assert_eq!(result, vec!["rust", "learning"]);
    }

    #[test]
    fn parse_tags_only_whitespace() {
        assert!(parse_tags("  ,  ,  ").is_empty());
    }

    #[test]
    fn user_add_and_post_add_print_ids() {
        let service = service();

        let out = run(&service, &["user", "add", "ada", "ada@example.com"]).unwrap();
        assert_eq!(out, "User created (id: 1): ada\n");

        let out = run(
            &service,
            &["post", "add", "ada", "Hello", "First post", "--tag", "rust"],
        )
        .unwrap();
        assert_eq!(out, "Post created (id: 1, published): hello\n");
    }

    #[test]
    fn react_toggles_and_reports_counts() {
        let service = service();
        run(&service, &["user", "add", "ada", "ada@example.com"]).unwrap();
        run(&service, &["post", "add", "ada", "Hello", "Body", "--tag", "rust"]).unwrap();

        let out = run(&service, &["react", "ada", "post", "1", "upvote"]).unwrap();
        assert_eq!(out, "post 1: your reaction is upvote (1 up, 0 down)\n");

        let out = run(&service, &["react", "ada", "post", "1", "upvote"]).unwrap();
        assert_eq!(out, "post 1: your reaction is none (0 up, 0 down)\n");
    }

    #[test]
    fn react_with_bad_kind_is_a_user_error() {
        let service = service();
        run(&service, &["user", "add", "ada", "ada@example.com"]).unwrap();

        let err = run(&service, &["react", "ada", "photo", "1", "upvote"]).unwrap_err();
        assert!(is_user_error(&err));
    }

    #[test]
    fn unknown_username_is_a_user_error() {
        let service = service();

        let err = run(&service, &["feed", "nobody"]).unwrap_err();
        assert!(is_user_error(&err));
    }

    #[test]
    fn internal_errors_are_not_user_errors() {
        let err = anyhow::Error::new(quire::Error::Transient("busy".into()));
        assert!(!is_user_error(&err));

        let err = anyhow::anyhow!("disk on fire");
        assert!(!is_user_error(&err));
    }

    #[test]
    fn prefs_rejects_unknown_tag_names() {
        let service = service();
        run(&service, &["user", "add", "ada", "ada@example.com"]).unwrap();
        run(&service, &["tag", "add", "rust"]).unwrap();

        let out = run(&service, &["prefs", "ada", "Rust"]).unwrap();
        assert_eq!(out, "Preferred tags: rust\n");

        let err = run(&service, &["prefs", "ada", "rust, cobol"]).unwrap_err();
        assert!(is_user_error(&err));
    }

    #[test]
    fn feed_as_json_is_an_array_of_posts() {
        let service = service();
        run(&service, &["user", "add", "ada", "ada@example.com"]).unwrap();
        run(&service, &["user", "add", "grace", "grace@example.com"]).unwrap();
        run(&service, &["post", "add", "grace", "Compilers", "Body", "--tag", "cs"]).unwrap();
        run(&service, &["follow", "ada", "grace"]).unwrap();

        let out = run(&service, &["--json", "feed", "ada"]).unwrap();
        let posts: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(posts.as_array().map(Vec::len), Some(1));
        assert_eq!(posts[0]["title"], "Compilers");
    }

    #[test]
    fn empty_feed_says_so() {
        let service = service();
        run(&service, &["user", "add", "ada", "ada@example.com"]).unwrap();

        assert_eq!(run(&service, &["feed", "ada"]).unwrap(), "No posts.\n");
        assert_eq!(
            run(&service, &["recommend", "authors", "ada"]).unwrap(),
            "No authors.\n"
        );
    }

    #[test]
    fn ensure_database_directory_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("quire.db");

        ensure_database_directory(&path).unwrap();

        assert!(path.parent().unwrap().is_dir());
    }
}
