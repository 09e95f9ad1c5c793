//! Integration tests for strata-ecs

use std::collections::BTreeMap;

use strata_ecs::prelude::*;
use strata_ecs::{ArchetypeId, EcsError};

// ============================================================================
// Fixtures
// ============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn register_six(world: &mut World) -> [SchemaId; 6] {
    [
        world.register_schema(SchemaKind::BinaryScalar(Format::Int32)),
        world.register_schema(SchemaKind::binary_struct([
            ("x", Format::Float32),
            ("y", Format::Float32),
        ])),
        world.register_schema(SchemaKind::NativeScalar(Format::Float64)),
        world.register_schema(SchemaKind::native_object([(
            "name",
            Shape::record([("len", Shape::Scalar(Format::Uint8))]),
        )])),
        world.register_schema(SchemaKind::Tag),
        world.register_schema(SchemaKind::BinaryScalar(Format::Uint16)),
    ]
}

fn type_of_mask(schemas: &[SchemaId; 6], mask: u32) -> Type {
    schemas
        .iter()
        .enumerate()
        .filter(|(bit, _)| mask & (1 << bit) != 0)
        .map(|(_, &id)| id)
        .collect()
}

// ============================================================================
// Default Values
// ============================================================================

#[test]
fn test_get_returns_zero_defaults() {
    init_tracing();
    let mut world = World::with_capacity(8);
    let squad = world.register_schema(SchemaKind::native_object([(
        "squad",
        Shape::Scalar(Format::Int32),
    )]));
    let tag = world.register_schema(SchemaKind::Tag);
    let scalar = world.register_schema(SchemaKind::BinaryScalar(Format::Float32));
    let vec2 = world.register_schema(SchemaKind::binary_struct([
        ("x", Format::Float32),
        ("y", Format::Float32),
    ]));

    let ty = Type::from([squad, tag, scalar, vec2]);
    let entity = world.make(&ty, None).unwrap();

    assert_eq!(
        world.get(entity, &ty).unwrap(),
        [
            Some(Value::record([("squad", 0.0)])),
            None,
            Some(Value::Number(0.0)),
            Some(Value::record([("x", 0.0), ("y", 0.0)])),
        ]
    );
}

// ============================================================================
// Query Tests
// ============================================================================

#[test]
fn test_query_superset_matching() {
    init_tracing();
    let mut world = World::with_capacity(32);
    let [a, b, c, ..] = register_six(&mut world);

    let qa = world.query(&Type::from([a]));
    let qab = world.query(&Type::from([a, b]));
    let qabc = world.query(&Type::from([a, b, c]));

    world.make(&Type::from([a]), None).unwrap();
    world.make(&Type::from([a, b]), None).unwrap();
    world.make(&Type::from([a, b, c]), None).unwrap();

    assert_eq!(qa.len(&world), 3);
    assert_eq!(qab.len(&world), 2);
    assert_eq!(qabc.len(&world), 1);
}

#[test]
fn test_query_counts_across_fifteen_types() {
    init_tracing();
    const PER_TYPE: usize = 100;
    const MASKS: [u32; 15] = [
        0b00_0001, 0b00_0011, 0b00_0111, 0b00_1111, 0b01_1111, 0b11_1111, 0b00_0010, 0b00_0110,
        0b00_1100, 0b01_1000, 0b11_0000, 0b10_0001, 0b10_1010, 0b01_0101, 0b10_0100,
    ];

    let mut world = World::with_capacity(1500);
    let schemas = register_six(&mut world);
    let types: Vec<Type> = MASKS.iter().map(|&mask| type_of_mask(&schemas, mask)).collect();

    // Half the queries exist before any archetype, half are made afterwards.
    let early: Vec<Query> = types[..7].iter().map(|ty| world.query(ty)).collect();

    for ty in &types {
        for _ in 0..PER_TYPE {
            world.make(ty, None).unwrap();
        }
    }
    assert_eq!(world.entity_count(), 1500);

    let late: Vec<Query> = types[7..].iter().map(|ty| world.query(ty)).collect();

    for (query, ty) in early.iter().chain(&late).zip(&types) {
        let expected = types
            .iter()
            .filter(|other| other.is_equal_or_superset_of(ty))
            .count()
            * PER_TYPE;
        assert_eq!(query.len(&world), expected, "query for {ty:?}");

        // Every record belongs to an archetype covering the query.
        for record in query.records().iter() {
            let archetype = world.archetype(record.archetype()).unwrap();
            assert!(archetype.ty().is_equal_or_superset_of(ty));
        }
    }
}

#[test]
fn test_parallel_iteration() {
    init_tracing();
    let mut world = World::with_capacity(256);
    let [counter, _, _, _, tag, _] = register_six(&mut world);

    let plain = Type::from([counter]);
    let tagged = Type::from([counter, tag]);
    let mut entities = Vec::new();
    for i in 0..200 {
        let ty = if i % 2 == 0 { &plain } else { &tagged };
        entities.push(world.make(ty, None).unwrap());
    }

    let query = world.query(&plain);
    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                query.for_each(&world, |view| {
                    view.with_columns(|entities, columns| {
                        let values = columns[0].scalars_mut::<i32>().unwrap();
                        for row in 0..entities.len() {
                            values[row] += 1;
                        }
                    });
                });
            });
        }
    });

    for entity in entities {
        assert_eq!(world.get(entity, &plain).unwrap(), [Some(Value::Number(4.0))]);
    }
}

#[test]
fn test_writes_from_many_threads() {
    init_tracing();
    let mut world = World::with_capacity(64);
    let [counter, ..] = register_six(&mut world);
    let ty = Type::from([counter]);
    let entities: Vec<Entity> = (0..64).map(|_| world.make(&ty, None).unwrap()).collect();

    std::thread::scope(|scope| {
        for chunk in entities.chunks(16) {
            let world = &world;
            scope.spawn(move || {
                for &entity in chunk {
                    world.write(entity, counter, entity.id()).unwrap();
                }
            });
        }
    });

    for entity in entities {
        assert_eq!(
            world.get(entity, &ty).unwrap(),
            [Some(Value::Number(f64::from(entity.id())))]
        );
    }
}

// ============================================================================
// Transition Tests
// ============================================================================

#[test]
fn test_move_preserves_shared_data() {
    init_tracing();
    let mut world = World::with_capacity(16);
    let [a, b, c, ..] = register_six(&mut world);

    let ab = Type::from([a, b]);
    let entity = world
        .make(
            &ab,
            Some(&[
                Some(Value::Number(11.0)),
                Some(Value::record([("x", 1.5), ("y", -2.5)])),
            ]),
        )
        .unwrap();
    let before = world.get(entity, &ab).unwrap();

    world.set(entity, &Type::from([c]), None).unwrap();
    assert_eq!(world.get(entity, &ab).unwrap(), before);

    world.unset(entity, &Type::from([b])).unwrap();
    assert_eq!(
        world.get(entity, &Type::from([a])).unwrap(),
        [Some(Value::Number(11.0))]
    );
    assert!(!world.has(entity, &ab).unwrap());
}

#[test]
fn test_set_then_unset_returns_to_origin() {
    init_tracing();
    let mut world = World::with_capacity(16);
    let schemas = register_six(&mut world);
    let base = Type::from([schemas[0], schemas[2]]);
    let entity = world.make(&base, None).unwrap();
    let origin = world.location(entity).unwrap();

    for &id in &schemas {
        if base.contains(id) {
            continue;
        }
        world.set(entity, &Type::from([id]), None).unwrap();
        world.unset(entity, &Type::from([id])).unwrap();
        assert_eq!(world.location(entity).unwrap(), origin);
    }

    // Graph edges agree with set algebra.
    for archetype in world.archetypes() {
        for &id in &schemas {
            if let Some(next) = archetype.edge_set(id) {
                let next = world.archetype(next).unwrap();
                assert_eq!(next.ty(), &archetype.ty().with(id));
                assert_eq!(next.edge_unset(id), Some(archetype.id()));
            }
        }
    }
}

#[test]
fn test_swap_removal_through_world() {
    init_tracing();
    let mut world = World::with_capacity(64);
    let [a, ..] = register_six(&mut world);
    let ty = Type::from([a]);

    let entities: Vec<Entity> = (0..10)
        .map(|i| world.make(&ty, Some(&[Some(Value::from(i))])).unwrap())
        .collect();

    world.destroy(entities[3]).unwrap();

    let archetype = world.find_archetype(&ty).unwrap();
    assert_eq!(world.archetype(archetype).unwrap().len(), 9);
    for (i, &entity) in entities.iter().enumerate() {
        if i == 3 {
            assert!(matches!(
                world.get(entity, &ty),
                Err(EcsError::EntityNotFound(_))
            ));
        } else {
            assert_eq!(
                world.get(entity, &ty).unwrap(),
                [Some(Value::Number(i as f64))]
            );
        }
    }
}

#[test]
fn test_root_archetype_holds_empty_entities() {
    init_tracing();
    let mut world = World::with_capacity(4);
    let entity = world.make(&Type::empty(), None).unwrap();

    assert_eq!(world.location(entity).unwrap(), ArchetypeId::ROOT);
    assert!(world.type_of(entity).unwrap().is_empty());
    assert!(world.has(entity, &Type::empty()).unwrap());
}

#[test]
fn test_archetypes_created_lazily() {
    init_tracing();
    let mut world = World::with_capacity(4);
    let schemas = register_six(&mut world);
    assert_eq!(world.archetypes().count(), 1);

    let full = type_of_mask(&schemas, 0b11_1111);
    world.make(&full, None).unwrap();

    // One archetype per prefix of the walk, not one per subset.
    assert_eq!(world.archetypes().count(), 7);

    let created: BTreeMap<usize, Type> = world
        .archetypes()
        .map(|archetype| (archetype.ty().len(), archetype.ty().clone()))
        .collect();
    assert_eq!(created[&6], full);
}

#[test]
fn test_unnormalized_type_rejected() {
    init_tracing();
    let ids = [SchemaId::from_raw(3), SchemaId::from_raw(1)];
    assert!(matches!(
        Type::from_sorted(&ids),
        Err(EcsError::UnnormalizedType(raw)) if raw == [3, 1]
    ));
    assert_eq!(Type::normalize(ids).ids(), &[ids[1], ids[0]]);
}
