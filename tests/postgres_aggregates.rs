//! Aggregates read through the Postgres repositories.
//!
//! Needs `DATABASE_URL` pointing at a server where `#[sqlx::test]` may create
//! scratch databases; run with `cargo test --test postgres_aggregates -- --ignored`.

use std::sync::Arc;

use sqlx::PgPool;
use townsfolk::application::homepage::HomepageAggregate;
use townsfolk::application::media::PublicMediaUrls;
use townsfolk::application::person::PersonAggregate;
use townsfolk::application::repos::{
    GeoScope, GeoSummaryService, MediaUrls, PermissionResolver, TownsRepo,
};
use townsfolk::application::town::TownAggregate;
use townsfolk::infra::db::PostgresRepositories;
use url::Url;
use uuid::{Uuid, uuid};

const TOWN_ID: Uuid = uuid!("00000000-0000-0000-0000-000000000001");
const JOE_ID: Uuid = uuid!("00000000-0000-0000-0000-0000000000a1");
const OWNER_ID: Uuid = uuid!("00000000-0000-0000-0000-0000000000b1");

const SEED: &str = r#"
INSERT INTO users (id, email, display_name, is_moderator) VALUES
    ('00000000-0000-0000-0000-0000000000b1', 'owner@example.com', 'Owner', TRUE);

INSERT INTO sessions (token, user_id, expires_at) VALUES
    ('live', '00000000-0000-0000-0000-0000000000b1', now() + interval '1 hour'),
    ('stale', '00000000-0000-0000-0000-0000000000b1', now() - interval '1 hour');

INSERT INTO images (id, storage_key, width, height) VALUES
    ('00000000-0000-0000-0000-0000000000c1', 'people/joe-1.jpg', 1200, 800),
    ('00000000-0000-0000-0000-0000000000c2', 'people/joe-2.jpg', 800, 1200);

INSERT INTO towns (id, slug, name, state, featured) VALUES
    ('00000000-0000-0000-0000-000000000001', 'borrego_springs', 'Borrego Springs', 'CA', TRUE),
    ('00000000-0000-0000-0000-000000000002', 'julian', 'Julian', 'CA', FALSE);

INSERT INTO facilities (id, town_id, name, kind) VALUES
    ('00000000-0000-0000-0000-0000000000d1', '00000000-0000-0000-0000-000000000001',
     'Borrego Springs Library', 'library');

INSERT INTO people (id, town_id, slug, first_name, last_name, nickname, facility_id, owner_id,
                    donation_goal, funds_raised, listed, created_at) VALUES
    ('00000000-0000-0000-0000-0000000000a1', '00000000-0000-0000-0000-000000000001',
     'joe_plumber', 'Joe', 'Plumber', 'Pipes', '00000000-0000-0000-0000-0000000000d1',
     '00000000-0000-0000-0000-0000000000b1', 2000, 500, TRUE, '2024-03-01T12:00:00Z'),
    ('00000000-0000-0000-0000-0000000000a2', '00000000-0000-0000-0000-000000000001',
     'hidden_hank', 'Hank', 'Hidden', NULL, NULL, NULL, NULL, 100, FALSE, '2024-03-02T12:00:00Z');

INSERT INTO person_images (person_id, image_id, position, alt_text) VALUES
    ('00000000-0000-0000-0000-0000000000a1', '00000000-0000-0000-0000-0000000000c2', 1, 'second'),
    ('00000000-0000-0000-0000-0000000000a1', '00000000-0000-0000-0000-0000000000c1', 0, 'first');

INSERT INTO comments (id, person_id, author_name, body, approved) VALUES
    ('00000000-0000-0000-0000-0000000000e1', '00000000-0000-0000-0000-0000000000a1',
     'Neighbor', 'Fixed our well pump.', TRUE),
    ('00000000-0000-0000-0000-0000000000e2', '00000000-0000-0000-0000-0000000000a1',
     'Spammer', 'Buy now', FALSE);

INSERT INTO narrative_blocks (id, person_id, position, kind, heading, body) VALUES
    ('00000000-0000-0000-0000-0000000000f1', '00000000-0000-0000-0000-0000000000a1',
     0, 'story', 'Early years', 'Moved to the desert in 1998.');

INSERT INTO supporters (id, person_id, region) VALUES
    (gen_random_uuid(), '00000000-0000-0000-0000-0000000000a1', 'CA'),
    (gen_random_uuid(), '00000000-0000-0000-0000-0000000000a1', 'CA'),
    (gen_random_uuid(), '00000000-0000-0000-0000-0000000000a1', 'CA'),
    (gen_random_uuid(), '00000000-0000-0000-0000-0000000000a1', ''),
    (gen_random_uuid(), '00000000-0000-0000-0000-0000000000a1', NULL),
    (gen_random_uuid(), '00000000-0000-0000-0000-0000000000a1', 'NV'),
    (gen_random_uuid(), '00000000-0000-0000-0000-0000000000a2', 'OR');
"#;

async fn seeded(pool: PgPool) -> Arc<PostgresRepositories> {
    sqlx::raw_sql(SEED).execute(&pool).await.expect("seed fixtures");
    Arc::new(PostgresRepositories::new(pool))
}

fn media() -> Arc<dyn MediaUrls> {
    Arc::new(PublicMediaUrls::new(
        Url::parse("https://cdn.example.com/").expect("url"),
    ))
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn person_aggregate_joins_every_collection(pool: PgPool) {
    let repos = seeded(pool).await;
    let aggregate = PersonAggregate::new(repos.clone(), repos.clone(), repos.clone(), media());

    let person = aggregate
        .fetch("borrego_springs", "joe_plumber")
        .await
        .expect("fetch")
        .expect("joe is listed");

    assert_eq!(person.id, JOE_ID);
    assert_eq!(person.display_name, "Joe \"Pipes\" Plumber");
    assert_eq!(person.town.slug, "borrego_springs");
    assert_eq!(person.owner_id, Some(OWNER_ID));
    assert_eq!(person.funds_raised, "500.00");
    assert_eq!(person.donation_goal.as_deref(), Some("2000.00"));
    assert_eq!(person.percent_funded, Some(25));

    let alts: Vec<&str> = person.images.iter().map(|image| image.alt_text.as_str()).collect();
    assert_eq!(alts, ["first", "second"]);
    assert_eq!(person.images[0].width, 1200);

    assert_eq!(person.comment_count, 1);
    assert_eq!(person.comments[0].author_name, "Neighbor");
    assert_eq!(person.narrative.len(), 1);

    let facility = person.facility.expect("facility");
    assert_eq!(facility.name, "Borrego Springs Library");
    assert_eq!(facility.people_count, 1);

    assert_eq!(person.geo.total_supporters, 6);
    assert_eq!(person.geo.buckets[0].region, "CA");
    assert_eq!(person.geo.buckets[0].supporters, 3);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn unlisted_and_unknown_people_are_absent(pool: PgPool) {
    let repos = seeded(pool).await;
    let aggregate = PersonAggregate::new(repos.clone(), repos.clone(), repos.clone(), media());

    assert!(
        aggregate
            .fetch("borrego_springs", "hidden_hank")
            .await
            .expect("fetch")
            .is_none()
    );
    assert!(aggregate.fetch("nowhere", "joe_plumber").await.expect("fetch").is_none());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn town_aggregate_lists_only_listed_people(pool: PgPool) {
    let repos = seeded(pool).await;
    let aggregate = TownAggregate::new(repos.clone(), repos.clone(), repos.clone(), media());

    let town = aggregate
        .fetch("borrego_springs")
        .await
        .expect("fetch")
        .expect("town exists");

    assert_eq!(town.id, TOWN_ID);
    assert_eq!(town.people_count, 1);
    assert_eq!(town.people[0].slug, "joe_plumber");
    assert_eq!(town.people[0].comment_count, 1);
    assert_eq!(town.people[0].supporter_count, 6);
    assert_eq!(town.facilities.len(), 1);
    assert_eq!(town.geo.total_supporters, 6);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn homepage_totals_skip_unlisted_people(pool: PgPool) {
    let repos = seeded(pool).await;
    let aggregate = HomepageAggregate::new(repos.clone(), repos.clone(), media());

    let homepage = aggregate.fetch().await.expect("fetch").expect("homepage");

    assert_eq!(homepage.featured_towns.len(), 1);
    assert_eq!(homepage.featured_towns[0].people_count, 1);
    assert_eq!(homepage.recent_people.len(), 1);
    assert_eq!(homepage.recent_comments.len(), 1);
    assert_eq!(homepage.totals.towns, 2);
    assert_eq!(homepage.totals.people, 1);
    assert_eq!(homepage.totals.comments, 1);
    assert_eq!(homepage.totals.funds_raised, "500.00");
    assert_eq!(homepage.geo.total_supporters, 6);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn blank_regions_collapse_into_unknown(pool: PgPool) {
    let repos = seeded(pool).await;

    let summary = repos
        .supporter_summary(GeoScope::Town(TOWN_ID))
        .await
        .expect("summary");

    let unknown = summary
        .buckets
        .iter()
        .find(|bucket| bucket.region == "unknown")
        .expect("unknown bucket");
    assert_eq!(unknown.supporters, 2);
    assert!(summary.buckets.iter().all(|bucket| bucket.region != "OR"));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn sessions_resolve_until_expiry(pool: PgPool) {
    let repos = seeded(pool).await;

    let live = repos.resolve("live").await.expect("resolve");
    assert_eq!(live.user_id, Some(OWNER_ID));
    assert!(live.is_moderator);
    assert!(!live.is_admin);

    assert!(!repos.resolve("stale").await.expect("resolve").is_authenticated());
    assert!(!repos.resolve("missing").await.expect("resolve").is_authenticated());

    let town = repos
        .find_town_by_slug("julian")
        .await
        .expect("lookup")
        .expect("julian");
    assert_eq!(town.name, "Julian");
}
