//! Personalized feeds and recommendations.
//!
//! Everything here is a read. A user with no preference record or no
//! follows simply contributes empty sets; none of these functions fail
//! because of missing personalization data. Only published posts are
//! ever returned.

use std::collections::HashSet;
use std::hash::Hash;

use tracing::debug;

use super::{BlogService, POST_COLUMNS, USER_COLUMNS, post_from_row, query_all, user_from_row};
use crate::{Post, Result, User, UserId};

/// Maximum number of posts in the "for you" and following feeds.
pub const FEED_LIMIT: usize = 20;

/// Maximum number of trending authors mixed into author recommendations.
pub const TRENDING_AUTHOR_LIMIT: usize = 10;

/// SQL predicate over `posts p`: the post is tagged with one of the
/// preferences of user `?1`.
///
/// Matches on the main tag, or on a sub-tag whose name equals a preferred
/// main tag's name.
const MATCHES_PREFERRED_TAGS: &str = "(
      p.main_tag_id IN (SELECT tag_id FROM preferred_tags WHERE user_id = ?1)
      OR p.sub_tag_id IN (
          SELECT s.id FROM sub_tags s
          JOIN main_tags m ON m.name = s.name
          JOIN preferred_tags pt ON pt.tag_id = m.id
          WHERE pt.user_id = ?1))";

impl BlogService {
    /// The "for you" feed.
    ///
    /// Published posts that are by an author `user` follows, or that `user`
    /// upvoted, or that carry one of `user`'s preferred tags. Each post
    /// appears once, newest first, at most [`FEED_LIMIT`] of them.
    ///
    /// # Examples
    ///
    /// ```
    /// use quire::{BlogService, Database, NewPost, NewUser};
    ///
    /// # fn main() -> quire::Result<()> {
    /// let service = BlogService::new(Database::in_memory()?);
    /// let ada = service.register_user(NewUser::new("ada", "ada@example.com"))?;
    /// let grace = service.register_user(NewUser::new("grace", "grace@example.com"))?;
    /// let tag = service.get_or_create_main_tag("compilers")?;
    /// let post = service.create_post(grace.id, NewPost::new("COBOL", "...", tag.id).publish())?;
    ///
    /// // No preferences and no follows: empty, not an error
    /// assert!(service.for_you(ada.id)?.is_empty());
    ///
    /// service.follow(ada.id, grace.id)?;
    /// assert_eq!(service.for_you(ada.id)?[0].id, post.id);
    /// # Ok(())
    /// # }
    /// ```
    pub fn for_you(&self, user: UserId) -> Result<Vec<Post>> {
        let posts = query_all(
            self.db.connection(),
            &format!(
                "SELECT {POST_COLUMNS} FROM posts p
                 WHERE p.status = 'published' AND (
                     p.author_id IN (SELECT followed_id FROM user_follows WHERE follower_id = ?1)
                     OR p.id IN (SELECT post_id FROM upvoted_posts WHERE user_id = ?1)
                     OR {MATCHES_PREFERRED_TAGS})
                 ORDER BY p.created_at DESC, p.id DESC
                 LIMIT ?2"
            ),
            rusqlite::params![user, FEED_LIMIT as i64],
            post_from_row,
        )?;

        debug!(user = %user, posts = posts.len(), "built for-you feed");
        Ok(posts)
    }

    /// Published posts by authors `user` follows, newest first, at most
    /// [`FEED_LIMIT`] of them.
    pub fn following_feed(&self, user: UserId) -> Result<Vec<Post>> {
        query_all(
            self.db.connection(),
            &format!(
                "SELECT {POST_COLUMNS} FROM posts p
                 JOIN user_follows f ON f.followed_id = p.author_id
                 WHERE f.follower_id = ?1 AND p.status = 'published'
                 ORDER BY p.created_at DESC, p.id DESC
                 LIMIT ?2"
            ),
            rusqlite::params![user, FEED_LIMIT as i64],
            post_from_row,
        )
    }

    /// Authors `user` might want to follow.
    ///
    /// First every author of a published post carrying one of `user`'s
    /// preferred tags, by user id, then the [`TRENDING_AUTHOR_LIMIT`]
    /// authors of published posts with the most upvotes. Authors without
    /// upvotes still rank (by id, after everyone with some), so a quiet
    /// site still gets suggestions. Authors appearing in both lists are
    /// kept at their first position; `user` is never included. The
    /// interest-based part is not capped, so the result has no fixed upper
    /// bound.
    pub fn recommended_authors(&self, user: UserId) -> Result<Vec<User>> {
        let conn = self.db.connection();

        let similar = query_all(
            conn,
            &format!(
                "SELECT DISTINCT {USER_COLUMNS} FROM users u
                 JOIN posts p ON p.author_id = u.id
                 WHERE p.status = 'published' AND u.id <> ?1
                   AND {MATCHES_PREFERRED_TAGS}
                 ORDER BY u.id"
            ),
            [user],
            user_from_row,
        )?;

        let trending = query_all(
            conn,
            &format!(
                "SELECT {USER_COLUMNS} FROM users u
                 JOIN posts p ON p.author_id = u.id AND p.status = 'published'
                 LEFT JOIN reactions r ON r.subject_kind = 'post' AND r.subject_id = p.id
                                      AND r.value = 'upvote'
                 WHERE u.id <> ?1
                 GROUP BY u.id
                 ORDER BY COUNT(r.id) DESC, u.id
                 LIMIT ?2"
            ),
            rusqlite::params![user, TRENDING_AUTHOR_LIMIT as i64],
            user_from_row,
        )?;

        debug!(
            user = %user,
            similar = similar.len(),
            trending = trending.len(),
            "recommending authors"
        );
        Ok(dedupe_by_key(similar.into_iter().chain(trending), |u| u.id))
    }

    /// Posts `user` might want to read.
    ///
    /// Published posts carrying one of `user`'s preferred tags, plus
    /// published posts `user` upvoted, each once. No cap is applied. The
    /// result comes back in post-id order so it is stable, but that order
    /// carries no ranking; callers sort and paginate as they need.
    pub fn recommended_posts(&self, user: UserId) -> Result<Vec<Post>> {
        query_all(
            self.db.connection(),
            &format!(
                "SELECT {POST_COLUMNS} FROM posts p
                 WHERE p.status = 'published' AND (
                     {MATCHES_PREFERRED_TAGS}
                     OR p.id IN (SELECT subject_id FROM reactions
                                 WHERE user_id = ?1 AND subject_kind = 'post' AND value = 'upvote'))
                 ORDER BY p.id"
            ),
            [user],
            post_from_row,
        )
    }
}

/// Drops items whose key was already seen, keeping first-seen order.
///
/// # Examples
///
/// ```
/// use quire::dedupe_by_key;
///
/// let deduped = dedupe_by_key(vec![3, 1, 3, 2, 1], |n| *n);
/// assert_eq!(deduped, vec![3, 1, 2]);
/// ```
pub fn dedupe_by_key<T, K, I, F>(items: I, key: F) -> Vec<T>
where
    I: IntoIterator<Item = T>,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(key(item)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, NewPost, NewUser, PostId, PostStatus, ReactionKind, Subject, TagId};

    struct World {
        service: BlogService,
    }

    impl World {
        fn new() -> Self {
            Self {
                service: BlogService::new(Database::in_memory().expect("in-memory database")),
            }
        }

        fn user(&self, name: &str) -> UserId {
            self.service
                .register_user(NewUser::new(name, format!("{name}@example.com")))
                .unwrap()
                .id
        }

        fn tag(&self, name: &str) -> TagId {
            self.service.get_or_create_main_tag(name).unwrap().id
        }

        fn publish(&self, author: UserId, title: &str, tag: TagId) -> PostId {
            self.service
                .create_post(author, NewPost::new(title, "body", tag).publish())
                .unwrap()
                .id
        }

        fn upvote(&self, user: UserId, post: PostId) {
            let outcome = self
                .service
                .toggle(user, Subject::Post(post), ReactionKind::Upvote)
                .unwrap();
            assert_eq!(outcome, Some(ReactionKind::Upvote));
        }

        fn ids(posts: &[Post]) -> Vec<PostId> {
            posts.iter().map(|p| p.id).collect()
        }
    }

    #[test]
    fn feed_is_empty_without_preferences_or_follows() {
        let w = World::new();
        let reader = w.user("reader");
        let author = w.user("author");
        let tag = w.tag("rust");
        w.publish(author, "Unrelated", tag);

        assert!(w.service.preferences(reader).unwrap().is_none());
        assert!(w.service.for_you(reader).unwrap().is_empty());
    }

    #[test]
    fn feed_unions_follows_upvotes_and_tags_once_each() {
        let w = World::new();
        let reader = w.user("reader");
        let followed = w.user("followed");
        let stranger = w.user("stranger");
        let rust = w.tag("rust");
        let go = w.tag("go");
        let cooking = w.tag("cooking");

        let by_followed = w.publish(followed, "From a friend", cooking);
        let upvoted = w.publish(stranger, "Upvoted", go);
        let tagged = w.publish(stranger, "Tagged", rust);
        let all_three = w.publish(followed, "Everything", rust);
        let _ignored = w.publish(stranger, "Ignored", cooking);

        w.service.follow(reader, followed).unwrap();
        w.upvote(reader, upvoted);
        w.upvote(reader, all_three);
        w.service.update_preferences(reader, &[rust]).unwrap();

        let feed = w.service.for_you(reader).unwrap();
        assert_eq!(
            World::ids(&feed),
            vec![all_three, tagged, upvoted, by_followed],
            "each source once, newest first"
        );
    }

    #[test]
    fn feed_skips_drafts() {
        let w = World::new();
        let reader = w.user("reader");
        let author = w.user("author");
        let tag = w.tag("rust");
        w.service
            .create_post(author, NewPost::new("Draft", "wip", tag).status(PostStatus::Draft))
            .unwrap();
        w.service.follow(reader, author).unwrap();

        assert!(w.service.for_you(reader).unwrap().is_empty());
        assert!(w.service.following_feed(reader).unwrap().is_empty());
    }

    #[test]
    fn feed_is_capped_and_sorted_newest_first() {
        let w = World::new();
        let reader = w.user("reader");
        let author = w.user("author");
        let tag = w.tag("rust");
        for i in 0..(FEED_LIMIT + 5) {
            w.publish(author, &format!("Post {i}"), tag);
        }
        w.service.follow(reader, author).unwrap();

        let feed = w.service.for_you(reader).unwrap();
        assert_eq!(feed.len(), FEED_LIMIT);
        assert!(
            feed.windows(2)
                .all(|pair| (pair[0].created_at, pair[0].id) > (pair[1].created_at, pair[1].id)),
            "feed must be strictly newest first"
        );
    }

    #[test]
    fn sub_tag_named_like_preferred_tag_matches() {
        let w = World::new();
        let reader = w.user("reader");
        let author = w.user("author");
        let rust = w.tag("rust");
        let general = w.tag("general");
        let sub = w.service.get_or_create_sub_tag(author, "Rust").unwrap();
        let post = w
            .service
            .create_post(
                author,
                NewPost::new("Sub-tagged", "body", general)
                    .sub_tag(sub.id)
                    .publish(),
            )
            .unwrap()
            .id;
        w.service.update_preferences(reader, &[rust]).unwrap();

        assert_eq!(World::ids(&w.service.for_you(reader).unwrap()), vec![post]);
        assert_eq!(World::ids(&w.service.recommended_posts(reader).unwrap()), vec![post]);
    }

    #[test]
    fn recommended_posts_stay_within_tags_or_upvotes() {
        let w = World::new();
        let reader = w.user("reader");
        let followed = w.user("followed");
        let rust = w.tag("rust");
        let go = w.tag("go");

        let tagged = w.publish(followed, "Tagged", rust);
        let upvoted = w.publish(followed, "Upvoted", go);
        let followed_only = w.publish(followed, "Followed only", go);
        w.service.follow(reader, followed).unwrap();
        w.upvote(reader, upvoted);
        w.service.update_preferences(reader, &[rust]).unwrap();

        let ids = World::ids(&w.service.recommended_posts(reader).unwrap());
        assert_eq!(ids, vec![tagged, upvoted]);
        assert!(!ids.contains(&followed_only));
    }

    #[test]
    fn downvoted_posts_are_not_recommended() {
        let w = World::new();
        let reader = w.user("reader");
        let author = w.user("author");
        let tag = w.tag("go");
        let post = w.publish(author, "Meh", tag);
        w.service
            .toggle(reader, Subject::Post(post), ReactionKind::Downvote)
            .unwrap();

        assert!(w.service.recommended_posts(reader).unwrap().is_empty());
        assert!(w.service.for_you(reader).unwrap().is_empty());
    }

    #[test]
    fn recommended_authors_lists_similar_then_trending() {
        let w = World::new();
        let reader = w.user("reader");
        let similar = w.user("similar");
        let popular = w.user("popular");
        let both = w.user("both");
        let quiet = w.user("quiet");
        let fans: Vec<UserId> = (0..3).map(|i| w.user(&format!("fan{i}"))).collect();
        let rust = w.tag("rust");
        let go = w.tag("go");

        w.publish(similar, "Rust tips", rust);
        w.publish(both, "More Rust", rust);
        w.publish(quiet, "Quiet Go", go);
        let hit = w.publish(popular, "Go hit", go);
        let both_go = w.publish(both, "Go too", go);
        for fan in &fans {
            w.upvote(*fan, hit);
        }
        w.upvote(fans[0], both_go);
        w.service.update_preferences(reader, &[rust]).unwrap();

        let names: Vec<String> = w
            .service
            .recommended_authors(reader)
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();

        assert_eq!(names, vec!["similar", "both", "popular", "quiet"]);
    }

    #[test]
    fn authors_without_upvotes_still_trend() {
        let w = World::new();
        let reader = w.user("reader");
        let quiet = w.user("quiet");
        let _lurker = w.user("lurker");
        let tag = w.tag("go");
        w.publish(quiet, "Nobody reads this", tag);

        let authors: Vec<UserId> = w
            .service
            .recommended_authors(reader)
            .unwrap()
            .into_iter()
            .map(|u| u.id)
            .collect();

        assert_eq!(authors, vec![quiet], "only authors of published posts trend");
    }

    #[test]
    fn recommended_authors_never_include_the_reader() {
        let w = World::new();
        let reader = w.user("reader");
        let fan = w.user("fan");
        let other = w.user("other");
        let rust = w.tag("rust");
        let own = w.publish(reader, "My own", rust);
        w.publish(other, "Theirs", rust);
        w.upvote(fan, own);
        w.service.update_preferences(reader, &[rust]).unwrap();

        let authors: Vec<UserId> = w
            .service
            .recommended_authors(reader)
            .unwrap()
            .into_iter()
            .map(|u| u.id)
            .collect();
        assert_eq!(authors, vec![other]);
    }

    #[test]
    fn trending_authors_are_capped() {
        let w = World::new();
        let reader = w.user("reader");
        let fan = w.user("fan");
        let tag = w.tag("go");
        for i in 0..(TRENDING_AUTHOR_LIMIT + 3) {
            let author = w.user(&format!("author{i}"));
            let post = w.publish(author, &format!("Post {i}"), tag);
            w.upvote(fan, post);
        }

        let authors = w.service.recommended_authors(reader).unwrap();
        assert_eq!(authors.len(), TRENDING_AUTHOR_LIMIT);
    }

    #[test]
    fn following_feed_only_has_followed_authors() {
        let w = World::new();
        let reader = w.user("reader");
        let friend = w.user("friend");
        let stranger = w.user("stranger");
        let tag = w.tag("rust");
        let first = w.publish(friend, "One", tag);
        w.publish(stranger, "Two", tag);
        let third = w.publish(friend, "Three", tag);
        w.service.follow(reader, friend).unwrap();

        let ids = World::ids(&w.service.following_feed(reader).unwrap());
        assert_eq!(ids, vec![third, first]);
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let items = vec![("a", 1), ("b", 2), ("a", 3), ("c", 4), ("b", 5)];
        let deduped = dedupe_by_key(items, |(k, _)| *k);
        assert_eq!(deduped, vec![("a", 1), ("b", 2), ("c", 4)]);
    }
}
