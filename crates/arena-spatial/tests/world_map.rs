//! End-to-end properties of the world map.

use arena_spatial::world_map::{StatusFilter, WorldMap, WorldMapConfig};
use arena_types::{MemoryError, ObjectKind, ObjectStatus, Observation, Vec3};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

fn kind(rng: &mut StdRng) -> ObjectKind {
    *ObjectKind::ALL.choose(rng).expect("kinds")
}

fn map() -> WorldMap {
    WorldMap::new(WorldMapConfig::default()).unwrap()
}

fn berry_seen_at(tick: u64) -> Observation {
    Observation::new("forager", tick, Vec3::new(0.0, 0.0, 0.0)).with_visible(
        "Berry1",
        ObjectKind::Resource,
        Vec3::new(1.0, 0.0, 1.0),
    )
}

#[test]
fn collected_berry_disappears_from_kind_queries() {
    let mut m = map();
    for tick in 1..=5 {
        m.update_from_observation(&berry_seen_at(tick));
    }
    assert_eq!(m.get("Berry1").unwrap().status, ObjectStatus::Active);

    // Tick 6: the agent picks the berry up.
    m.mark_collected("Berry1");
    // Tick 7: nothing new in view.
    m.update_from_observation(&Observation::new("forager", 7, Vec3::new(0.0, 0.0, 0.0)));

    assert!(m.query_by_kind(ObjectKind::Resource).is_empty());
    assert_eq!(m.get("Berry1").unwrap().status, ObjectStatus::Collected);
}

#[test]
fn one_object_per_name_at_last_position() {
    let mut m = map();
    let mut rng = StdRng::seed_from_u64(7);
    let mut last = Vec3::default();
    for tick in 0..200 {
        last = Vec3::new(rng.gen_range(-500.0..500.0), 0.0, rng.gen_range(-500.0..500.0));
        let obs = Observation::new("scout", tick, Vec3::default()).with_visible(
            "Wanderer",
            ObjectKind::Agent,
            last,
        );
        m.update_from_observation(&obs);
    }
    assert_eq!(m.len(), 1);
    assert_eq!(m.get("Wanderer").unwrap().position, last);
    m.verify_index().unwrap();
}

#[test]
fn grid_query_matches_brute_force_scan() {
    let mut m = WorldMap::new(WorldMapConfig {
        cell_size: 7.5,
        ..WorldMapConfig::default()
    })
    .unwrap();
    let mut rng = StdRng::seed_from_u64(42);

    for tick in 0..40 {
        let mut obs = Observation::new("scout", tick, Vec3::default());
        for _ in 0..10 {
            let name = format!("obj{}", rng.gen_range(0..150));
            let pos = Vec3::new(
                rng.gen_range(-100.0..100.0),
                rng.gen_range(-5.0..5.0),
                rng.gen_range(-100.0..100.0),
            );
            obs = obs.with_visible(name, kind(&mut rng), pos);
        }
        m.update_from_observation(&obs);
        if tick % 3 == 0 {
            m.mark_collected(&format!("obj{}", rng.gen_range(0..150)));
        }
        if tick % 5 == 0 {
            m.mark_destroyed(&format!("obj{}", rng.gen_range(0..150)));
        }
    }
    m.verify_index().unwrap();

    for _ in 0..200 {
        let center = Vec3::new(rng.gen_range(-120.0..120.0), 0.0, rng.gen_range(-120.0..120.0));
        let radius = rng.gen_range(0.0..60.0);

        let mut from_grid: Vec<String> = m
            .query_near_position(center, radius, None)
            .into_iter()
            .map(|o| o.name)
            .collect();
        let mut brute: Vec<String> = m
            .all_objects()
            .into_iter()
            .filter(|o| o.is_active() && o.distance_to(center) <= radius)
            .map(|o| o.name.clone())
            .collect();
        from_grid.sort();
        brute.sort();
        assert_eq!(from_grid, brute, "center {center} radius {radius}");
    }
}

#[test]
fn boundary_objects_at_exact_radius_match_brute_force() {
    let cell_size = 10.0;
    let mut m = WorldMap::new(WorldMapConfig {
        cell_size,
        ..WorldMapConfig::default()
    })
    .unwrap();
    let mut rng = StdRng::seed_from_u64(11);

    let mut obs = Observation::new("scout", 1, Vec3::default());
    for i in -50..=50 {
        let x = f64::from(i) * cell_size;
        obs = obs.with_visible(format!("x{i}"), ObjectKind::Other, Vec3::new(x, 0.0, 0.0));
        obs = obs.with_visible(format!("z{i}"), ObjectKind::Other, Vec3::new(0.0, 0.0, x));
    }
    m.update_from_observation(&obs);

    let objects = m.all_objects();
    for _ in 0..500 {
        let target = objects.choose(&mut rng).expect("objects").position;
        let offset: f64 = rng.gen_range(-600.0..600.0);
        let (center, radius) = if target.z == 0.0 {
            (Vec3::new(offset, 0.0, 0.0), (target.x - offset).abs())
        } else {
            (Vec3::new(0.0, 0.0, offset), (target.z - offset).abs())
        };

        let mut from_grid: Vec<String> = m
            .query_near_position(center, radius, None)
            .into_iter()
            .map(|o| o.name)
            .collect();
        let mut brute: Vec<String> = objects
            .iter()
            .filter(|o| o.distance_to(center) <= radius)
            .map(|o| o.name.clone())
            .collect();
        from_grid.sort();
        brute.sort();
        assert_eq!(from_grid, brute, "center {center} radius {radius}");
    }

    let rock = Vec3::new(470.0, 0.0, 0.0);
    let center = Vec3::new(-87.37863562245813, 0.0, 0.0);
    let hits = m.query_near_position(center, rock.x - center.x, Some(ObjectKind::Other));
    assert!(hits.iter().any(|o| o.name == "x47"));
}

#[test]
fn repeated_collection_is_idempotent() {
    let mut once = map();
    let mut twice = map();
    for m in [&mut once, &mut twice] {
        m.update_from_observation(&berry_seen_at(1));
    }
    once.mark_collected("Berry1");
    twice.mark_collected("Berry1");
    twice.mark_collected("Berry1");

    assert_eq!(once.dump(), twice.dump());
    assert!(once.query_by_kind(ObjectKind::Resource).is_empty());
    assert!(twice.query_by_kind(ObjectKind::Resource).is_empty());
    assert_eq!(
        twice
            .query_by_kind_with(ObjectKind::Resource, StatusFilter::IncludeCollected)
            .len(),
        1
    );
}

#[test]
fn summarize_is_stable_without_mutation() {
    let mut m = map();
    let mut rng = StdRng::seed_from_u64(3);
    let mut obs = Observation::new("scout", 9, Vec3::default());
    for i in 0..30 {
        obs = obs.with_visible(
            format!("thing{i}"),
            kind(&mut rng),
            Vec3::new(rng.gen_range(-50.0..50.0), 0.0, rng.gen_range(-50.0..50.0)),
        );
    }
    m.update_from_observation(&obs);
    let first = m.summarize();
    let second = m.summarize();
    assert_eq!(first, second);

    // Same content inserted in reverse order renders identically.
    let mut reversed = map();
    let mut rev = obs.clone();
    rev.visible.reverse();
    reversed.update_from_observation(&rev);
    assert_eq!(reversed.summarize(), first);
}

#[test]
fn empty_neighbourhood_is_empty_list_not_error() {
    let m = map();
    assert!(m.query_near_position(Vec3::new(5.0, 0.0, 5.0), 100.0, None).is_empty());
    assert!(matches!(m.get("nothing"), Err(MemoryError::NotFound(_))));
}
