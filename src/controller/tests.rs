//! Tests for the controllers over in-memory services.

use super::*;
use crate::error::Error;
use crate::platform::cache::CountCache;
use crate::platform::queue::{QueueConfig, QueueService};
use crate::platform::sql::SqlService;
use crate::service::event::TYPE_LIKE;
use crate::service::{Attachment, Event, Object, Platform, Target, Visibility};
use anyhow::Result;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::time::Duration;

const NS: &str = "app_1_1";

struct Fixture {
    services: Services,
    ctl: Controllers,
}

fn fixture() -> Result<Fixture> {
    let queue = QueueService::memory(QueueConfig {
        wait_time: Duration::from_millis(10),
        ..Default::default()
    });
    let services = Services::new(SqlService::memory()?, queue, CountCache::default());
    let ctl = Controllers::new(&services);
    Ok(Fixture { services, ctl })
}

async fn signup(f: &Fixture, name: &str) -> Result<User> {
    let user = User {
        username: name.to_string(),
        email: format!("{name}@example.com"),
        first_name: "Sam".into(),
        last_name: "Lee".into(),
        password: "secret".into(),
        ..Default::default()
    };
    Ok(f.ctl.users.create(NS, user).await?)
}

fn me(user: &User) -> Origin {
    Origin::application(user.id)
}

async fn follow(f: &Fixture, from: &User, to: &User) -> Result<Connection> {
    let con = Connection {
        to_id: to.id,
        kind: ConnectionType::Follow,
        state: ConnectionState::Confirmed,
        ..Default::default()
    };
    Ok(f.ctl.connections.update(NS, &me(from), con).await?)
}

async fn befriend(f: &Fixture, a: &User, b: &User) -> Result<()> {
    let request = Connection {
        to_id: b.id,
        kind: ConnectionType::Friend,
        state: ConnectionState::Pending,
        ..Default::default()
    };
    f.ctl.connections.update(NS, &me(a), request).await?;
    let confirm = Connection {
        to_id: a.id,
        kind: ConnectionType::Friend,
        state: ConnectionState::Confirmed,
        ..Default::default()
    };
    f.ctl.connections.update(NS, &me(b), confirm).await?;
    Ok(())
}

fn text(body: &str) -> Vec<Attachment> {
    vec![Attachment::text("body", BTreeMap::from([("en".to_string(), body.to_string())]))]
}

async fn post(f: &Fixture, owner: &User, visibility: Visibility) -> Result<Post> {
    let object = Object {
        attachments: text("hello"),
        visibility,
        ..Default::default()
    };
    Ok(f.ctl.posts.create(NS, &me(owner), object).await?)
}

async fn event(f: &Fixture, user: &User, visibility: Visibility, target: Option<u64>) -> Result<Event> {
    let event = Event {
        user_id: user.id,
        kind: "check_in".into(),
        visibility,
        enabled: true,
        target: target.map(|id| Target {
            id: id.to_string(),
            kind: crate::service::user::TARGET_TYPE.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    };
    Ok(f.services.events.put(NS, event).await?)
}

// Connection state machine

#[test]
fn test_transition_table() {
    use ConnectionState::{Confirmed, Pending, Rejected};

    assert!(connection::validate_transition(None, Pending).is_ok());
    assert!(connection::validate_transition(None, Confirmed).is_err());
    assert!(connection::validate_transition(None, Rejected).is_err());
    assert!(connection::validate_transition(Some(Pending), Confirmed).is_ok());
    assert!(connection::validate_transition(Some(Pending), Rejected).is_ok());
    assert!(connection::validate_transition(Some(Confirmed), Rejected).is_ok());
    assert!(connection::validate_transition(Some(Confirmed), Pending).is_err());
    assert!(connection::validate_transition(Some(Rejected), Confirmed).is_err());
    assert!(connection::validate_transition(Some(Rejected), Pending).is_err());
}

fn state() -> impl Strategy<Value = ConnectionState> {
    prop_oneof![
        Just(ConnectionState::Pending),
        Just(ConnectionState::Confirmed),
        Just(ConnectionState::Rejected),
    ]
}

proptest! {
    #[test]
    fn transitions_accept_exactly_the_allowed_pairs(old in proptest::option::of(state()), new in state()) {
        use ConnectionState::{Confirmed, Pending, Rejected};

        let expected = matches!(
            (old, new),
            (None, Pending) | (Some(Pending), Confirmed | Rejected) | (Some(Confirmed), Rejected)
        ) || old == Some(new);

        let result = connection::validate_transition(old, new);
        prop_assert_eq!(result.is_ok(), expected);
        if let Err(err) = result {
            prop_assert!(matches!(err, Error::InvalidEntity(_)));
        }
    }
}

#[tokio::test]
async fn test_follow_is_confirmed_right_away() -> Result<()> {
    let f = fixture()?;
    let (a, b) = (signup(&f, "anna").await?, signup(&f, "bert").await?);

    let con = follow(&f, &a, &b).await?;
    assert_eq!(con.from_id, a.id);
    assert!(con.enabled);

    let followers = f.ctl.connections.followers(NS, &me(&a), b.id, Page::default()).await?;
    assert_eq!(followers.len(), 1);
    assert_eq!(followers[0].id, a.id);
    assert!(followers[0].password.is_empty());

    let followings = f.ctl.connections.followings(NS, &me(&b), a.id, Page::default()).await?;
    assert_eq!(followings[0].id, b.id);
    assert_eq!(followings[0].is_follower, Some(false));
    Ok(())
}

#[tokio::test]
async fn test_friend_flow_is_symmetric() -> Result<()> {
    let f = fixture()?;
    let (a, b) = (signup(&f, "anna").await?, signup(&f, "bert").await?);

    befriend(&f, &a, &b).await?;

    let of_a = f.ctl.connections.friends(NS, &me(&a), a.id, Page::default()).await?;
    let of_b = f.ctl.connections.friends(NS, &me(&b), b.id, Page::default()).await?;
    assert_eq!(of_a.iter().map(|u| u.id).collect::<Vec<_>>(), vec![b.id]);
    assert_eq!(of_b.iter().map(|u| u.id).collect::<Vec<_>>(), vec![a.id]);
    assert_eq!(of_a[0].is_friend, Some(true));
    Ok(())
}

#[tokio::test]
async fn test_requester_cannot_confirm() -> Result<()> {
    let f = fixture()?;
    let (a, b) = (signup(&f, "anna").await?, signup(&f, "bert").await?);

    let request = Connection {
        to_id: b.id,
        kind: ConnectionType::Friend,
        state: ConnectionState::Pending,
        ..Default::default()
    };
    f.ctl.connections.update(NS, &me(&a), request.clone()).await?;

    let again = f.ctl.connections.update(NS, &me(&a), request.clone()).await?;
    assert_eq!(again.state, ConnectionState::Pending);

    let confirm = Connection {
        state: ConnectionState::Confirmed,
        ..request
    };
    let err = f.ctl.connections.update(NS, &me(&a), confirm).await.unwrap_err();
    assert!(matches!(err, Error::InvalidEntity(_)), "{err}");
    Ok(())
}

#[tokio::test]
async fn test_friend_cannot_start_confirmed() -> Result<()> {
    let f = fixture()?;
    let (a, b) = (signup(&f, "anna").await?, signup(&f, "bert").await?);

    let con = Connection {
        to_id: b.id,
        kind: ConnectionType::Friend,
        state: ConnectionState::Confirmed,
        ..Default::default()
    };
    let err = f.ctl.connections.update(NS, &me(&a), con).await.unwrap_err();
    assert!(matches!(err, Error::InvalidEntity(_)));
    Ok(())
}

#[tokio::test]
async fn test_connection_target_must_exist() -> Result<()> {
    let f = fixture()?;
    let a = signup(&f, "anna").await?;

    let con = Connection {
        to_id: a.id + 1_000,
        kind: ConnectionType::Follow,
        state: ConnectionState::Confirmed,
        ..Default::default()
    };
    let err = f.ctl.connections.update(NS, &me(&a), con).await.unwrap_err();
    assert!(err.is_not_found());

    let own = Connection {
        to_id: a.id,
        kind: ConnectionType::Follow,
        state: ConnectionState::Confirmed,
        ..Default::default()
    };
    let err = f.ctl.connections.update(NS, &me(&a), own).await.unwrap_err();
    assert!(matches!(err, Error::InvalidConnection(_)));
    Ok(())
}

#[tokio::test]
async fn test_pending_follow_is_answered_by_target() -> Result<()> {
    let f = fixture()?;
    let (a, b) = (signup(&f, "anna").await?, signup(&f, "bert").await?);

    let request = Connection {
        to_id: b.id,
        kind: ConnectionType::Follow,
        state: ConnectionState::Pending,
        ..Default::default()
    };
    f.ctl.connections.update(NS, &me(&a), request).await?;

    let pending = f.ctl.connections.by_state(NS, &me(&b), ConnectionState::Pending).await?;
    assert_eq!(pending.items.len(), 1);
    assert!(pending.users.contains_key(&a.id));

    let accept = Connection {
        to_id: a.id,
        kind: ConnectionType::Follow,
        state: ConnectionState::Confirmed,
        ..Default::default()
    };
    let accepted = f.ctl.connections.update(NS, &me(&b), accept).await?;
    assert_eq!((accepted.from_id, accepted.to_id), (a.id, b.id));
    assert_eq!(accepted.state, ConnectionState::Confirmed);
    Ok(())
}

#[tokio::test]
async fn test_delete_friend_disables_both_sides() -> Result<()> {
    let f = fixture()?;
    let (a, b) = (signup(&f, "anna").await?, signup(&f, "bert").await?);
    befriend(&f, &a, &b).await?;

    f.ctl.connections.delete(NS, &me(&b), ConnectionType::Friend, a.id).await?;
    f.ctl.connections.delete(NS, &me(&b), ConnectionType::Friend, a.id).await?;

    assert!(f.ctl.connections.friends(NS, &me(&a), a.id, Page::default()).await?.is_empty());
    assert!(f.ctl.connections.friends(NS, &me(&b), b.id, Page::default()).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_create_social_connects_by_platform_id() -> Result<()> {
    let f = fixture()?;
    let a = signup(&f, "anna").await?;
    let mut b = User {
        username: "bert".into(),
        email: "bert@example.com".into(),
        password: "secret".into(),
        social_ids: BTreeMap::from([("facebook".to_string(), "fb-2".to_string())]),
        ..Default::default()
    };
    b = f.ctl.users.create(NS, b).await?;

    let users = f
        .ctl
        .connections
        .create_social(
            NS,
            &me(&a),
            "facebook",
            vec!["fb-2".into(), "fb-unknown".into()],
            ConnectionType::Follow,
            ConnectionState::Confirmed,
        )
        .await?;
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].id, b.id);
    assert_eq!(users[0].is_following, Some(true));
    Ok(())
}

#[tokio::test]
async fn test_relation_derivation() -> Result<()> {
    let f = fixture()?;
    let (a, b) = (signup(&f, "anna").await?, signup(&f, "bert").await?);
    follow(&f, &a, &b).await?;

    let relation = query_relation(&f.services, NS, a.id, b.id).await?;
    assert_eq!(
        relation,
        Relation {
            is_friend: false,
            is_follower: false,
            is_following: true,
        }
    );
    let reverse = query_relation(&f.services, NS, b.id, a.id).await?;
    assert!(reverse.is_follower && !reverse.is_following);
    assert_eq!(query_relation(&f.services, NS, a.id, a.id).await?, Relation::default());
    Ok(())
}

// Posts, comments, likes

#[tokio::test]
async fn test_global_post_requires_backend() -> Result<()> {
    let f = fixture()?;
    let a = signup(&f, "anna").await?;

    let err = post(&f, &a, Visibility::Global).await.unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Unauthorized(_))));

    let object = Object {
        attachments: text("announcement"),
        visibility: Visibility::Global,
        ..Default::default()
    };
    let created = f.ctl.posts.create(NS, &Origin::backend(a.id), object).await?;
    assert_eq!(created.object.kind, crate::service::object::TYPE_POST);
    assert!(created.object.owned);
    Ok(())
}

#[tokio::test]
async fn test_post_visibility() -> Result<()> {
    let f = fixture()?;
    let (a, b, c) = (
        signup(&f, "anna").await?,
        signup(&f, "bert").await?,
        signup(&f, "cleo").await?,
    );
    follow(&f, &b, &a).await?;

    let private = post(&f, &a, Visibility::Private).await?;
    let connection = post(&f, &a, Visibility::Connection).await?;
    let public = post(&f, &a, Visibility::Public).await?;

    assert!(f.ctl.posts.retrieve(NS, &me(&b), private.object.id).await.unwrap_err().is_not_found());
    assert_eq!(f.ctl.posts.retrieve(NS, &me(&b), connection.object.id).await?.items.len(), 1);
    assert!(f.ctl.posts.retrieve(NS, &me(&c), connection.object.id).await.unwrap_err().is_not_found());
    assert_eq!(f.ctl.posts.retrieve(NS, &me(&c), public.object.id).await?.items.len(), 1);

    let own = f.ctl.posts.list_user(NS, &me(&a), a.id, Page::default()).await?;
    assert_eq!(own.items.len(), 3);
    let followed = f.ctl.posts.list_user(NS, &me(&b), a.id, Page::default()).await?;
    assert_eq!(followed.items.len(), 2);
    let stranger = f.ctl.posts.list_user(NS, &me(&c), a.id, Page::default()).await?;
    assert_eq!(stranger.items.len(), 1);
    assert!(stranger.users.contains_key(&a.id));

    let all = f.ctl.posts.list_all(NS, &me(&c), Page::default()).await?;
    assert_eq!(all.items.iter().map(|p| p.object.id).collect::<Vec<_>>(), vec![public.object.id]);
    Ok(())
}

#[tokio::test]
async fn test_post_update_and_delete() -> Result<()> {
    let f = fixture()?;
    let (a, b) = (signup(&f, "anna").await?, signup(&f, "bert").await?);
    let created = post(&f, &a, Visibility::Public).await?;
    let id = created.object.id;

    let change = Object {
        attachments: text("edited"),
        tags: vec!["news".into()],
        visibility: Visibility::Connection,
        owner_id: b.id,
        ..Default::default()
    };
    let err = f.ctl.posts.update(NS, &me(&b), id, change.clone()).await.unwrap_err();
    assert!(matches!(err, Error::Unauthorized(_)));

    let updated = f.ctl.posts.update(NS, &me(&a), id, change).await?;
    assert_eq!(updated.object.id, id);
    assert_eq!(updated.object.owner_id, a.id);
    assert_eq!(updated.object.created_at, created.object.created_at);
    assert_eq!(updated.object.tags, vec!["news".to_string()]);

    assert!(matches!(
        f.ctl.posts.delete(NS, &me(&b), id).await.unwrap_err(),
        Error::Unauthorized(_)
    ));
    f.ctl.posts.delete(NS, &me(&a), id).await?;
    f.ctl.posts.delete(NS, &me(&a), id).await?;
    assert!(f.ctl.posts.retrieve(NS, &me(&a), id).await.unwrap_err().is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_comments() -> Result<()> {
    let f = fixture()?;
    let (a, b) = (signup(&f, "anna").await?, signup(&f, "bert").await?);
    let target = post(&f, &a, Visibility::Public).await?;
    let post_id = target.object.id;

    let input = Object {
        attachments: text("nice"),
        ..Default::default()
    };
    let comment = f.ctl.comments.create(NS, &me(&b), post_id, input.clone()).await?;
    assert_eq!(comment.object_id, post_id);
    assert_eq!(comment.visibility, Visibility::Public);
    assert_eq!(comment.attachments[0].name, ATTACHMENT_CONTENT);
    assert_eq!(comment.attachments[0].contents.get("en").map(String::as_str), Some("nice"));

    let empty = Object::default();
    assert!(f.ctl.comments.create(NS, &me(&b), post_id, empty).await.is_err());
    assert!(f.ctl.comments.create(NS, &me(&b), post_id + 1, input).await.unwrap_err().is_not_found());

    let listed = f.ctl.comments.list(NS, &me(&a), post_id, Page::default()).await?;
    assert_eq!(listed.items.len(), 1);
    assert!(listed.users.contains_key(&b.id));

    let edit = Object {
        attachments: text("very nice"),
        ..Default::default()
    };
    assert!(matches!(
        f.ctl.comments.update(NS, &me(&a), post_id, comment.id, edit.clone()).await.unwrap_err(),
        Error::Unauthorized(_)
    ));
    let edited = f.ctl.comments.update(NS, &me(&b), post_id, comment.id, edit).await?;
    assert_eq!(edited.attachments[0].contents.get("en").map(String::as_str), Some("very nice"));
    assert_eq!(f.ctl.comments.retrieve(NS, &me(&b), post_id, comment.id).await?.id, comment.id);

    f.ctl.comments.delete(NS, &me(&b), post_id, comment.id).await?;
    f.ctl.comments.delete(NS, &me(&b), post_id, comment.id).await?;
    assert!(f.ctl.comments.list(NS, &me(&a), post_id, Page::default()).await?.items.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_like_is_idempotent() -> Result<()> {
    let f = fixture()?;
    let (a, b, c) = (
        signup(&f, "anna").await?,
        signup(&f, "bert").await?,
        signup(&f, "cleo").await?,
    );
    let target = post(&f, &a, Visibility::Public).await?;
    let post_id = target.object.id;

    let first = f.ctl.likes.create(NS, &me(&b), post_id).await?;
    let second = f.ctl.likes.create(NS, &me(&b), post_id).await?;
    assert_eq!(first.id, second.id);
    assert_eq!(first.kind, TYPE_LIKE);
    f.ctl.likes.create(NS, &me(&c), post_id).await?;

    let retrieved = f.ctl.posts.retrieve(NS, &me(&b), post_id).await?;
    assert_eq!(retrieved.items[0].counts.likes, 2);
    assert!(retrieved.items[0].is_liked);

    f.ctl.likes.delete(NS, &me(&b), post_id).await?;
    f.ctl.likes.delete(NS, &me(&b), post_id).await?;
    let listed = f.ctl.likes.list(NS, &me(&a), post_id, Page::default()).await?;
    assert_eq!(listed.items.iter().map(|l| l.user_id).collect::<Vec<_>>(), vec![c.id]);

    let again = f.ctl.likes.create(NS, &me(&b), post_id).await?;
    assert_eq!(again.id, first.id);
    assert!(again.enabled);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_likes_store_one_row() -> Result<()> {
    use crate::service::EventQuery;

    let f = fixture()?;
    let (a, b) = (signup(&f, "anna").await?, signup(&f, "bert").await?);

    for _ in 0..20 {
        let target = post(&f, &a, Visibility::Public).await?;
        let post_id = target.object.id;
        let liker = me(&b);

        let (first, second) = tokio::join!(
            f.ctl.likes.create(NS, &liker, post_id),
            f.ctl.likes.create(NS, &liker, post_id),
        );
        assert_eq!(first?.id, second?.id);

        let rows = f
            .services
            .events
            .query(
                NS,
                &EventQuery {
                    object_ids: vec![post_id],
                    types: vec![TYPE_LIKE.into()],
                    ..Default::default()
                },
            )
            .await?;
        assert_eq!(rows.len(), 1);
    }
    Ok(())
}

// Events

#[tokio::test]
async fn test_event_rules() -> Result<()> {
    let f = fixture()?;
    let (a, b, c) = (
        signup(&f, "anna").await?,
        signup(&f, "bert").await?,
        signup(&f, "cleo").await?,
    );
    follow(&f, &b, &a).await?;

    let reserved = Event {
        kind: TYPE_LIKE.into(),
        ..Default::default()
    };
    assert!(matches!(
        f.ctl.events.create(NS, &me(&a), reserved).await.unwrap_err(),
        Error::InvalidEntity(_)
    ));

    for visibility in [Visibility::Private, Visibility::Connection, Visibility::Public] {
        let e = Event {
            kind: "read".into(),
            visibility,
            ..Default::default()
        };
        f.ctl.events.create(NS, &me(&a), e).await?;
    }

    assert_eq!(f.ctl.events.list_me(NS, &me(&a), Page::default()).await?.items.len(), 3);
    assert_eq!(f.ctl.events.list_user(NS, &me(&b), a.id, Page::default()).await?.items.len(), 2);
    assert_eq!(f.ctl.events.list_user(NS, &me(&c), a.id, Page::default()).await?.items.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_event_pages_walk_from_cursor() -> Result<()> {
    let f = fixture()?;
    let a = signup(&f, "anna").await?;
    let mut created = Vec::new();
    for _ in 0..5 {
        let e = Event {
            kind: "read".into(),
            visibility: Visibility::Public,
            ..Default::default()
        };
        created.push(f.ctl.events.create(NS, &me(&a), e).await?);
    }
    let ids = |items: &[Event]| items.iter().map(|e| e.id).collect::<Vec<_>>();

    let newest = f.ctl.events.list_me(NS, &me(&a), Page::with_limit(2)).await?;
    assert_eq!(ids(&newest.items), vec![created[4].id, created[3].id]);

    let after_first = Page {
        after: Some(created[0].created_at),
        ..Page::with_limit(2)
    };
    let next = f.ctl.events.list_me(NS, &me(&a), after_first).await?;
    assert_eq!(ids(&next.items), vec![created[2].id, created[1].id]);

    let before_last = Page {
        before: Some(created[4].created_at),
        ..Page::with_limit(2)
    };
    let older = f.ctl.events.list_me(NS, &me(&a), before_last).await?;
    assert_eq!(ids(&older.items), vec![created[3].id, created[2].id]);
    Ok(())
}

#[test]
fn test_page_truncate_keeps_items_closest_to_cursor() {
    let mut newest = vec![5, 4, 3, 2, 1];
    Page::with_limit(2).truncate(&mut newest);
    assert_eq!(newest, vec![5, 4]);

    let mut after = vec![5, 4, 3, 2, 1];
    let page = Page {
        after: Some(chrono::Utc::now()),
        ..Page::with_limit(2)
    };
    page.truncate(&mut after);
    assert_eq!(after, vec![2, 1]);
}

#[tokio::test]
async fn test_event_update_and_delete_are_owner_only() -> Result<()> {
    let f = fixture()?;
    let (a, b) = (signup(&f, "anna").await?, signup(&f, "bert").await?);
    let created = f
        .ctl
        .events
        .create(
            NS,
            &me(&a),
            Event {
                kind: "read".into(),
                ..Default::default()
            },
        )
        .await?;

    let change = Event {
        kind: "write".into(),
        language: "de".into(),
        visibility: Visibility::Public,
        ..Default::default()
    };
    assert!(f.ctl.events.update(NS, &me(&b), created.id, change.clone()).await.unwrap_err().is_not_found());
    let updated = f.ctl.events.update(NS, &me(&a), created.id, change).await?;
    assert_eq!(updated.kind, "write");
    assert_eq!(updated.user_id, a.id);
    assert_eq!(updated.created_at, created.created_at);

    assert!(f.ctl.events.delete(NS, &me(&b), created.id).await.unwrap_err().is_not_found());
    f.ctl.events.delete(NS, &me(&a), created.id).await?;
    assert!(f.ctl.events.delete(NS, &me(&a), created.id).await.unwrap_err().is_not_found());
    Ok(())
}

// Feeds

#[tokio::test]
async fn test_events_feed_merges_sources() -> Result<()> {
    let f = fixture()?;
    let v = signup(&f, "viewer").await?;
    let (a, b, c, d) = (
        signup(&f, "anna").await?,
        signup(&f, "bert").await?,
        signup(&f, "cleo").await?,
        signup(&f, "dora").await?,
    );
    follow(&f, &v, &a).await?;
    follow(&f, &v, &b).await?;
    befriend(&f, &c, &v).await?;

    let e1 = event(&f, &a, Visibility::Connection, None).await?;
    let e2 = event(&f, &b, Visibility::Public, None).await?;
    let e3 = event(&f, &d, Visibility::Global, None).await?;
    let e4 = event(&f, &d, Visibility::Private, Some(v.id)).await?;
    let e5 = event(&f, &a, Visibility::Private, None).await?;

    let feed = f.ctl.feed.events(NS, &me(&v)).await?;
    let mut ids: Vec<u64> = feed.events.iter().map(|e| e.id).collect();
    assert!(!ids.contains(&e5.id));
    for pair in feed.events.windows(2) {
        assert!(pair[0].created_at >= pair[1].created_at);
    }
    ids.sort_unstable();
    let mut expected = vec![e1.id, e2.id, e3.id, e4.id];
    expected.sort_unstable();
    assert_eq!(ids, expected);
    assert!(feed.users.contains_key(&a.id) && feed.users.contains_key(&d.id));
    assert_eq!(feed.unread_events, 4);
    Ok(())
}

#[tokio::test]
async fn test_events_feed_drops_events_of_deleted_posts() -> Result<()> {
    let f = fixture()?;
    let (v, a) = (signup(&f, "viewer").await?, signup(&f, "anna").await?);
    follow(&f, &v, &a).await?;

    let kept = post(&f, &a, Visibility::Public).await?;
    let gone = post(&f, &a, Visibility::Public).await?;
    f.ctl.likes.create(NS, &me(&a), kept.object.id).await?;
    f.ctl.likes.create(NS, &me(&a), gone.object.id).await?;
    f.ctl.posts.delete(NS, &me(&a), gone.object.id).await?;

    let feed = f.ctl.feed.events(NS, &me(&v)).await?;
    assert_eq!(feed.events.len(), 1);
    assert_eq!(feed.events[0].object_id, kept.object.id);
    assert!(feed.post_map.contains_key(&kept.object.id));
    Ok(())
}

#[tokio::test]
async fn test_news_marks_feed_read() -> Result<()> {
    let f = fixture()?;
    let (v, a) = (signup(&f, "viewer").await?, signup(&f, "anna").await?);
    follow(&f, &v, &a).await?;
    post(&f, &a, Visibility::Public).await?;
    post(&f, &a, Visibility::Private).await?;
    event(&f, &a, Visibility::Public, None).await?;

    let first = f.ctl.feed.news(NS, &me(&v)).await?;
    assert_eq!(first.posts.len(), 1);
    assert_eq!(first.unread_posts, 1);
    assert_eq!(first.unread_events, 1);

    let second = f.ctl.feed.news(NS, &me(&v)).await?;
    assert_eq!(second.unread_posts, 0);
    assert_eq!(second.unread_events, 0);

    let posts = f.ctl.feed.posts(NS, &me(&v)).await?;
    assert_eq!(posts.posts.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_notifications_self() -> Result<()> {
    let f = fixture()?;
    let (v, a, b) = (
        signup(&f, "viewer").await?,
        signup(&f, "anna").await?,
        signup(&f, "bert").await?,
    );
    let own = post(&f, &v, Visibility::Public).await?;
    follow(&f, &b, &v).await?;
    f.ctl.likes.create(NS, &me(&a), own.object.id).await?;
    f.ctl.likes.create(NS, &me(&v), own.object.id).await?;
    let input = Object {
        attachments: text("hi"),
        ..Default::default()
    };
    f.ctl.comments.create(NS, &me(&a), own.object.id, input).await?;

    let feed = f.ctl.feed.notifications_self(NS, &me(&v)).await?;
    let mut kinds: Vec<&str> = feed.events.iter().map(|e| e.kind.as_str()).collect();
    kinds.sort_unstable();
    assert_eq!(kinds, vec!["tg_comment", "tg_follow", "tg_like"]);
    assert!(feed.events.iter().all(|e| e.user_id != v.id));
    assert!(feed.post_map.contains_key(&own.object.id));
    Ok(())
}

// Users

#[tokio::test]
async fn test_signup_and_login() -> Result<()> {
    let f = fixture()?;
    let created = signup(&f, "anna").await?;
    assert!(created.session_token.is_some());
    assert!(created.password.is_empty());

    let stored = f
        .services
        .users
        .query(
            NS,
            &UserQuery {
                ids: vec![created.id],
                ..Default::default()
            },
        )
        .await?;
    assert_ne!(stored[0].password, "secret");
    assert!(stored[0].password.starts_with("$argon2id$"));
    assert!(user::verify_password(&stored[0].password, "secret"));

    let login = f
        .ctl
        .users
        .login(
            NS,
            Credentials {
                username: "anna".into(),
                password: "secret".into(),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(login.id, created.id);
    assert_ne!(login.session_token, created.session_token);

    let wrong = Credentials {
        email: "anna@example.com".into(),
        password: "nope".into(),
        ..Default::default()
    };
    assert!(matches!(f.ctl.users.login(NS, wrong).await.unwrap_err(), Error::Unauthorized(_)));

    let again = signup(&f, "anna").await?;
    assert_eq!(again.id, created.id);
    Ok(())
}

#[test]
fn test_password_verifiers_are_salted_phc_strings() -> Result<()> {
    let first = user::hash_password("hunter22")?;
    let second = user::hash_password("hunter22")?;
    assert_ne!(first, second);
    assert!(user::verify_password(&first, "hunter22"));
    assert!(user::verify_password(&second, "hunter22"));
    assert!(!user::verify_password(&first, "hunter23"));
    assert!(!user::verify_password("not-a-verifier", "hunter22"));
    assert!(!user::verify_password("", ""));
    Ok(())
}

#[tokio::test]
async fn test_sessions() -> Result<()> {
    let f = fixture()?;
    let a = signup(&f, "anna").await?;
    let token = a.session_token.clone().unwrap_or_default();

    assert_eq!(f.ctl.users.by_session(NS, &token).await?.id, a.id);
    f.ctl.users.logout(NS, &me(&a), &token).await?;
    f.ctl.users.logout(NS, &me(&a), &token).await?;
    assert!(matches!(
        f.ctl.users.by_session(NS, &token).await.unwrap_err(),
        Error::Unauthorized(_)
    ));
    assert!(matches!(f.ctl.users.by_id(NS, a.id + 7).await.unwrap_err(), Error::Unauthorized(_)));
    Ok(())
}

#[derive(Clone, Default)]
struct CapturedLogs(std::sync::Arc<parking_lot::Mutex<Vec<u8>>>);

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_storage_logs_never_carry_credentials() -> Result<()> {
    use crate::constants::GLOBAL_NAMESPACE;
    use crate::service::{App, AppQuery};

    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let f = fixture()?;
    let a = signup(&f, "anna").await?;
    let token = a.session_token.clone().unwrap_or_default();
    assert_eq!(f.ctl.users.by_session(NS, &token).await?.id, a.id);
    f.ctl.users.logout(NS, &me(&a), &token).await?;

    let app = f
        .services
        .apps
        .put(GLOBAL_NAMESPACE, App::new(3, "logs", "", false))
        .await?;
    let by_token = AppQuery {
        tokens: vec![app.token.clone()],
        ..Default::default()
    };
    assert_eq!(f.services.apps.query(GLOBAL_NAMESPACE, &by_token).await?.len(), 1);
    let by_backend_token = AppQuery {
        backend_tokens: vec![app.backend_token.clone()],
        ..Default::default()
    };
    assert_eq!(f.services.apps.query(GLOBAL_NAMESPACE, &by_backend_token).await?.len(), 1);

    let verifier = f
        .services
        .users
        .query(
            NS,
            &UserQuery {
                ids: vec![a.id],
                ..Default::default()
            },
        )
        .await?
        .remove(0)
        .password;

    let text = String::from_utf8_lossy(&logs.0.lock()).into_owned();
    assert!(text.contains("sessions"), "storage calls were not logged: {text}");
    assert!(text.contains("<redacted>"));
    for secret in [&token, &app.token, &app.backend_token, &verifier] {
        assert!(!secret.is_empty());
        assert!(!text.contains(secret.as_str()), "credential leaked into logs");
    }
    Ok(())
}

#[tokio::test]
async fn test_retrieve_with_counts_and_relation() -> Result<()> {
    let f = fixture()?;
    let (a, b, c) = (
        signup(&f, "anna").await?,
        signup(&f, "bert").await?,
        signup(&f, "cleo").await?,
    );
    follow(&f, &b, &a).await?;
    follow(&f, &c, &a).await?;
    befriend(&f, &a, &c).await?;

    let seen_by_b = f.ctl.users.retrieve(NS, &me(&b), a.id).await?;
    assert_eq!(seen_by_b.follower_count, Some(2));
    assert_eq!(seen_by_b.followed_count, Some(0));
    assert_eq!(seen_by_b.friend_count, Some(1));
    assert_eq!(seen_by_b.is_following, Some(true));
    assert!(seen_by_b.session_token.is_none());

    let own = f.ctl.users.retrieve(NS, &me(&a).with_session("tok"), a.id).await?;
    assert_eq!(own.session_token.as_deref(), Some("tok"));
    assert!(own.is_following.is_none());
    Ok(())
}

#[tokio::test]
async fn test_update_keeps_password_and_checks_uniqueness() -> Result<()> {
    let f = fixture()?;
    let (a, _b) = (signup(&f, "anna").await?, signup(&f, "bert").await?);

    let change = User {
        username: "anna".into(),
        email: "anna@example.com".into(),
        first_name: "Annabel".into(),
        ..Default::default()
    };
    let updated = f.ctl.users.update(NS, &me(&a), change).await?;
    assert_eq!(updated.id, a.id);
    assert_eq!(updated.first_name, "Annabel");
    assert_eq!(updated.created_at, a.created_at);

    let creds = Credentials {
        username: "anna".into(),
        password: "secret".into(),
        ..Default::default()
    };
    f.ctl.users.login(NS, creds).await?;

    let taken = User {
        username: "bert".into(),
        ..Default::default()
    };
    assert!(matches!(
        f.ctl.users.update(NS, &me(&a), taken).await.unwrap_err(),
        Error::InvalidUser(_)
    ));

    f.ctl.users.delete(NS, &me(&a)).await?;
    assert!(f.ctl.users.retrieve(NS, &me(&a), a.id).await.unwrap_err().is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_search_and_lists() -> Result<()> {
    let f = fixture()?;
    let (a, b) = (signup(&f, "anna").await?, signup(&f, "annika").await?);
    follow(&f, &a, &b).await?;

    assert!(matches!(
        f.ctl.users.search(NS, &me(&a), "an", Page::default()).await.unwrap_err(),
        Error::InvalidEntity(_)
    ));
    let found = f.ctl.users.search(NS, &me(&a), "ann", Page::default()).await?;
    assert_eq!(found.iter().map(|u| u.id).collect::<Vec<_>>(), vec![b.id]);
    assert_eq!(found[0].is_following, Some(true));

    let by_email = f
        .ctl
        .users
        .list_by_emails(NS, &me(&a), vec!["annika@example.com".into(), "x@example.com".into()])
        .await?;
    assert_eq!(by_email.len(), 1);
    Ok(())
}

// Recommendations and devices

#[tokio::test]
async fn test_active_users_exclude_connections() -> Result<()> {
    let f = fixture()?;
    let (v, a, b) = (
        signup(&f, "viewer").await?,
        signup(&f, "anna").await?,
        signup(&f, "bert").await?,
    );
    follow(&f, &v, &a).await?;
    event(&f, &a, Visibility::Public, None).await?;
    event(&f, &b, Visibility::Public, None).await?;
    event(&f, &v, Visibility::Public, None).await?;

    let users = f.ctl.recommendations.users_active(NS, &me(&v), Period::Week).await?;
    assert_eq!(users.iter().map(|u| u.id).collect::<Vec<_>>(), vec![b.id]);
    assert!("year".parse::<Period>().is_err());
    assert_eq!("day".parse::<Period>()?, Period::Day);
    Ok(())
}

#[tokio::test]
async fn test_active_users_scan_is_bounded() -> Result<()> {
    let f = fixture()?;
    let (v, a, b, c) = (
        signup(&f, "viewer").await?,
        signup(&f, "anna").await?,
        signup(&f, "bert").await?,
        signup(&f, "cleo").await?,
    );
    event(&f, &a, Visibility::Public, None).await?;
    event(&f, &b, Visibility::Public, None).await?;
    event(&f, &c, Visibility::Public, None).await?;

    let recommendations = RecommendationController::new(f.services.clone()).with_event_scan(2);
    let mut ids: Vec<u64> = recommendations
        .users_active(NS, &me(&v), Period::Week)
        .await?
        .iter()
        .map(|u| u.id)
        .collect();
    ids.sort_unstable();
    let mut expected = vec![b.id, c.id];
    expected.sort_unstable();
    assert_eq!(ids, expected);
    Ok(())
}

#[tokio::test]
async fn test_device_update_and_delete() -> Result<()> {
    let f = fixture()?;
    let a = signup(&f, "anna").await?;
    let ctl = &f.ctl.devices;

    let created = ctl.update(NS, &me(&a), "phone", Platform::Ios, "tok-1", "en").await?;
    assert!(!created.endpoint_arn.is_empty());

    let same = ctl.update(NS, &me(&a), "phone", Platform::Ios, "tok-1", "en").await?;
    assert_eq!(same.updated_at, created.updated_at);

    let refreshed = ctl.update(NS, &me(&a), "phone", Platform::Ios, "tok-2", "en").await?;
    assert_eq!(refreshed.id, created.id);
    assert_eq!(refreshed.token, "tok-2");
    assert_eq!(refreshed.endpoint_arn, created.endpoint_arn);

    ctl.delete(NS, &me(&a), "phone").await?;
    ctl.delete(NS, &me(&a), "phone").await?;
    let fresh = ctl.update(NS, &me(&a), "phone", Platform::Ios, "tok-2", "en").await?;
    assert_ne!(fresh.id, created.id);
    Ok(())
}
