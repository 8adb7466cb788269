use spatial_crossmatch::{
    overlaps, CrossmatchConfig, CrossmatchSession, FrontierOrder, KeyDomain, PairingStrategy,
};
use spatial_crossmatch_int_test::test_util::{
    all_pairs_overlap, brute_force, cleanup, create_pair, create_test_context,
    create_test_context_with_capacity, crossmatch, random_entries, run_test,
};

fn all_configs() -> Vec<CrossmatchConfig> {
    let mut configs = Vec::new();
    for order in [FrontierOrder::DepthFirst, FrontierOrder::BreadthFirst] {
        for pairing in [PairingStrategy::NestedLoop, PairingStrategy::PlaneSweep] {
            configs.push(
                CrossmatchConfig::new()
                    .with_frontier_order(order)
                    .with_pairing(pairing),
            );
        }
    }
    configs
}

#[test]
fn test_random_trees_match_brute_force() {
    for seed in [1u64, 7, 42, 1234] {
        run_test(
            || create_test_context(),
            |ctx| {
                let outer = random_entries(seed, 300, 2, 100.0, 6.0, 0.05);
                let inner = random_entries(seed + 1000, 200, 2, 100.0, 4.0, 0.05);
                create_pair(&ctx.memory(), 2, &outer, &inner)?;
                let expected = brute_force(&outer, &inner);
                assert!(!expected.is_empty());

                for config in all_configs() {
                    let pairs = crossmatch(ctx.shared_memory(), "outer", "inner", config)?;
                    assert_eq!(pairs, expected, "seed {}", seed);
                }
                Ok(())
            },
            |ctx| cleanup(ctx),
        )
    }
}

#[test]
fn test_every_pair_overlaps() {
    run_test(
        || create_test_context(),
        |ctx| {
            let outer = random_entries(99, 250, 2, 50.0, 5.0, 0.1);
            let inner = random_entries(100, 250, 2, 50.0, 5.0, 0.1);
            create_pair(&ctx.memory(), 2, &outer, &inner)?;

            let pairs = crossmatch(
                ctx.shared_memory(),
                "outer",
                "inner",
                CrossmatchConfig::default(),
            )?;
            assert!(!pairs.is_empty());
            assert!(all_pairs_overlap(&pairs, &outer, &inner));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_three_dimensional_trees() {
    run_test(
        || create_test_context_with_capacity(3),
        |ctx| {
            let outer = random_entries(5, 200, 3, 30.0, 5.0, 0.0);
            let inner = random_entries(6, 150, 3, 30.0, 5.0, 0.0);
            create_pair(&ctx.memory(), 3, &outer, &inner)?;

            let pairs = crossmatch(
                ctx.shared_memory(),
                "outer",
                "inner",
                CrossmatchConfig::new().with_pairing(PairingStrategy::PlaneSweep),
            )?;
            assert_eq!(pairs, brute_force(&outer, &inner));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_different_heights_both_ways() {
    run_test(
        || create_test_context(),
        |ctx| {
            let store = ctx.memory();
            let deep = random_entries(11, 500, 2, 100.0, 3.0, 0.0);
            let shallow = random_entries(12, 6, 2, 100.0, 30.0, 0.0);
            store.create_tree("deep", KeyDomain::new(2), deep.clone())?;
            store.create_tree("shallow", KeyDomain::new(2), shallow.clone())?;

            for config in all_configs() {
                assert_eq!(
                    crossmatch(ctx.shared_memory(), "deep", "shallow", config.clone())?,
                    brute_force(&deep, &shallow)
                );
                assert_eq!(
                    crossmatch(ctx.shared_memory(), "shallow", "deep", config)?,
                    brute_force(&shallow, &deep)
                );
            }
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_two_sessions_yield_the_same_set() {
    run_test(
        || create_test_context(),
        |ctx| {
            let outer = random_entries(21, 150, 2, 40.0, 4.0, 0.0);
            let inner = random_entries(22, 150, 2, 40.0, 4.0, 0.0);
            create_pair(&ctx.memory(), 2, &outer, &inner)?;

            let first = crossmatch(
                ctx.shared_memory(),
                "outer",
                "inner",
                CrossmatchConfig::default(),
            )?;
            let second = crossmatch(
                ctx.shared_memory(),
                "outer",
                "inner",
                CrossmatchConfig::new().with_frontier_order(FrontierOrder::BreadthFirst),
            )?;
            assert_eq!(first, second);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_large_pages() {
    run_test(
        || create_test_context_with_capacity(64),
        |ctx| {
            let outer = random_entries(31, 2000, 2, 500.0, 5.0, 0.01);
            let inner = random_entries(32, 1500, 2, 500.0, 5.0, 0.01);
            create_pair(&ctx.memory(), 2, &outer, &inner)?;

            let mut session = CrossmatchSession::open(ctx.shared_memory(), "outer", "inner")?;
            let mut pairs = Vec::new();
            while let Some(pair) = session.next_pair()? {
                pairs.push(pair);
            }
            pairs.sort();
            assert_eq!(pairs, brute_force(&outer, &inner));
            assert_eq!(session.stats().results_returned, pairs.len() as u64);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_predicate_is_symmetric() {
    let extents: Vec<_> = random_entries(77, 200, 2, 20.0, 4.0, 0.0)
        .into_iter()
        .filter_map(|(extent, _)| extent)
        .collect();
    for a in &extents {
        for b in &extents {
            assert_eq!(overlaps(a, b), overlaps(b, a));
        }
    }
}
