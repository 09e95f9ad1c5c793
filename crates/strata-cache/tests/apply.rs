//! Integration tests for strata-cache

use strata_cache::Cache;
use strata_ecs::{Entity, Format, SchemaKind, Type, Value, World};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Scenario Tests
// ============================================================================

#[test]
fn test_query_sees_buffered_creations_after_apply() {
    init_tracing();
    let mut world = World::with_capacity(10);
    let a = world.register_schema(SchemaKind::Tag);
    let ty = Type::from([a]);

    world.make(&ty, None).unwrap();
    world.make(&ty, None).unwrap();
    let query = world.query(&ty);

    let mut cache = Cache::new();
    cache.make(&world, &ty, None).unwrap();
    cache.make(&world, &ty, None).unwrap();

    assert_eq!(query.len(&world), 2);
    cache.apply(&mut world).unwrap();
    assert_eq!(query.len(&world), 4);
}

#[test]
fn test_workers_record_while_iterating() {
    init_tracing();
    let mut world = World::with_capacity(100);
    let hp = world.register_schema(SchemaKind::BinaryScalar(Format::Int32));
    let dead = world.register_schema(SchemaKind::Tag);

    let alive = Type::from([hp]);
    let entities: Vec<Entity> = (0..100)
        .map(|i| world.make(&alive, Some(&[Some(Value::from(i))])).unwrap())
        .collect();

    let query = world.query(&alive);
    let mut cache = Cache::new();

    // Each worker tags entities with odd hp; the world is only borrowed shared.
    std::thread::scope(|scope| {
        for worker in 0..4_usize {
            let (world, query, cache) = (&world, &query, &cache);
            scope.spawn(move || {
                query.for_each(world, |view| {
                    let entities = view.entities();
                    for (row, entity) in entities.into_iter().enumerate() {
                        if row % 4 != worker {
                            continue;
                        }
                        let hp = view.get(row, 0).and_then(|v| v.as_number()).unwrap();
                        if hp as i32 % 2 == 1 {
                            cache.set(entity, &Type::from([dead]), None).unwrap();
                        }
                    }
                });
            });
        }
    });

    assert_eq!(cache.pending(), 50);
    assert_eq!(cache.apply(&mut world).unwrap(), 50);

    let tagged = Type::from([dead]);
    for (i, &entity) in entities.iter().enumerate() {
        assert_eq!(world.has(entity, &tagged).unwrap(), i % 2 == 1);
    }
    assert_eq!(world.query(&tagged).len(&world), 50);
}

#[test]
fn test_apply_twice_is_empty() {
    init_tracing();
    let mut world = World::with_capacity(4);
    let a = world.register_schema(SchemaKind::Tag);
    let mut cache = Cache::new();

    cache.make(&world, &Type::from([a]), None).unwrap();
    assert_eq!(cache.apply(&mut world).unwrap(), 1);
    assert_eq!(cache.apply(&mut world).unwrap(), 0);
}
