use spatial_crossmatch::{
    CrossmatchConfig, CrossmatchError, CrossmatchSession, IndexKind, KeyDomain, SessionState,
    SpatialIndexStore,
};
use spatial_crossmatch_int_test::test_util::{
    brute_force, cleanup, create_pair, create_test_context, grid, random_entries, run_test,
};

#[test]
fn test_exhaustion_releases_both_trees() {
    run_test(
        || create_test_context(),
        |ctx| {
            let store = ctx.memory();
            create_pair(&store, 2, &grid(40, 8, 1.5, 0.0), &grid(40, 8, 1.5, 0.5))?;

            let mut session = CrossmatchSession::open(ctx.shared_memory(), "outer", "inner")?;
            assert_eq!(store.active_intents("outer")?, 1);
            assert_eq!(store.active_intents("inner")?, 1);
            assert!(store.drop_tree("inner").is_err());

            while session.next_pair()?.is_some() {}
            assert_eq!(session.state(), SessionState::Exhausted);
            assert!(!session.is_open());
            assert_eq!(store.active_intents("outer")?, 0);
            assert_eq!(store.active_intents("inner")?, 0);

            // exhaustion is sticky
            assert_eq!(session.next_pair()?, None);
            assert_eq!(session.next_pair()?, None);

            store.drop_tree("inner")?;
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_abandoned_session_releases_on_drop() {
    run_test(
        || create_test_context(),
        |ctx| {
            let store = ctx.memory();
            let outer = random_entries(1, 200, 2, 30.0, 4.0, 0.0);
            let inner = random_entries(2, 200, 2, 30.0, 4.0, 0.0);
            create_pair(&store, 2, &outer, &inner)?;

            {
                let mut session =
                    CrossmatchSession::open(ctx.shared_memory(), "outer", "inner")?;
                assert!(session.next_pair()?.is_some());
                assert!(session.frontier_len() + session.buffered_results() > 0);
            }
            assert_eq!(store.active_intents("outer")?, 0);
            assert_eq!(store.active_intents("inner")?, 0);
            store.drop_tree("outer")?;
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_close_is_idempotent() {
    run_test(
        || create_test_context(),
        |ctx| {
            let store = ctx.memory();
            let outer = random_entries(3, 100, 2, 20.0, 4.0, 0.0);
            let inner = random_entries(4, 100, 2, 20.0, 4.0, 0.0);
            create_pair(&store, 2, &outer, &inner)?;

            let mut session = CrossmatchSession::open(ctx.shared_memory(), "outer", "inner")?;
            assert!(session.next_pair()?.is_some());

            session.close();
            assert_eq!(session.state(), SessionState::Closed);
            assert_eq!(session.frontier_len(), 0);
            assert_eq!(session.buffered_results(), 0);
            assert_eq!(store.active_intents("outer")?, 0);

            session.close();
            assert_eq!(session.state(), SessionState::Closed);
            assert_eq!(session.next_pair()?, None);

            // an exhausted session can be closed too
            let mut session = CrossmatchSession::open(ctx.shared_memory(), "outer", "inner")?;
            while session.next_pair()?.is_some() {}
            session.close();
            session.close();
            assert_eq!(session.state(), SessionState::Closed);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_restart_after_abandon() {
    run_test(
        || create_test_context(),
        |ctx| {
            let store = ctx.memory();
            let outer = random_entries(5, 150, 2, 25.0, 4.0, 0.0);
            let inner = random_entries(6, 150, 2, 25.0, 4.0, 0.0);
            create_pair(&store, 2, &outer, &inner)?;

            let mut session = CrossmatchSession::open(ctx.shared_memory(), "outer", "inner")?;
            for _ in 0..3 {
                session.next_pair()?;
            }
            drop(session);

            let mut pairs = CrossmatchSession::open(ctx.shared_memory(), "outer", "inner")?
                .collect::<Result<Vec<_>, _>>()?;
            pairs.sort();
            assert_eq!(pairs, brute_force(&outer, &inner));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_validation_failures_hold_nothing() {
    run_test(
        || create_test_context(),
        |ctx| {
            let store = ctx.memory();
            store.create_tree("flat", KeyDomain::new(2), grid(10, 5, 1.0, 0.0))?;
            store.create_tree("cube", KeyDomain::new(3), Vec::new())?;
            store.create_tree("mapped", KeyDomain::new(2).with_srid(4326), Vec::new())?;
            store.create_foreign_index("ordered", IndexKind::Ordered)?;

            let cases = [
                ("flat", "cube"),
                ("flat", "mapped"),
                ("flat", "ordered"),
                ("ordered", "flat"),
                ("flat", "flat"),
            ];
            for (outer, inner) in cases {
                let err = CrossmatchSession::open(ctx.shared_memory(), outer, inner)
                    .err()
                    .expect("invalid pair accepted");
                assert!(err.is_validation_error(), "{} x {}: {:?}", outer, inner, err);
            }
            assert!(matches!(
                CrossmatchSession::open(ctx.shared_memory(), "flat", "missing"),
                Err(CrossmatchError::NotFound(_))
            ));
            assert!(matches!(
                CrossmatchSession::open_with_config(
                    ctx.shared_memory(),
                    "flat",
                    "cube",
                    CrossmatchConfig::new().with_max_sibling_chain(0),
                ),
                Err(CrossmatchError::InvalidOperation(_))
            ));

            for name in ["flat", "cube", "mapped"] {
                assert_eq!(store.active_intents(name)?, 0, "{}", name);
            }
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_same_tree_through_two_handles() {
    run_test(
        || create_test_context(),
        |ctx| {
            let store = ctx.memory();
            store.create_tree("flat", KeyDomain::new(2), grid(10, 5, 1.0, 0.0))?;

            let first = store.open_tree("flat")?;
            let second = store.open_tree("flat")?;
            assert_eq!(store.active_intents("flat")?, 2);
            assert!(matches!(
                CrossmatchSession::new(ctx.shared_memory(), first, second),
                Err(CrossmatchError::SameTree(_))
            ));
            assert_eq!(store.active_intents("flat")?, 0);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_explain_names_both_indexes() {
    run_test(
        || create_test_context(),
        |ctx| {
            let store = ctx.memory();
            store.create_tree("fields", KeyDomain::new(2), grid(4, 2, 1.0, 0.0))?;
            store.create_tree("sources", KeyDomain::new(2), grid(4, 2, 1.0, 0.5))?;

            let mut session = CrossmatchSession::open(ctx.shared_memory(), "fields", "sources")?;
            let plan = session.explain();
            assert_eq!(
                plan,
                "Spatial Crossmatch\n  Outer index: fields\n  Inner index: sources"
            );

            // still describable after the trees are released
            session.close();
            assert_eq!(session.explain(), plan);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_stats_track_progress() {
    run_test(
        || create_test_context(),
        |ctx| {
            let store = ctx.memory();
            let outer = random_entries(40, 120, 2, 20.0, 3.0, 0.0);
            let inner = random_entries(41, 120, 2, 20.0, 3.0, 0.0);
            create_pair(&store, 2, &outer, &inner)?;

            let mut session = CrossmatchSession::open(ctx.shared_memory(), "outer", "inner")?;
            assert_eq!(session.stats().pairs_expanded, 0);
            let mut count = 0u64;
            while session.next_pair()?.is_some() {
                count += 1;
            }

            let stats = session.stats();
            assert_eq!(stats.results_returned, count);
            assert_eq!(stats.results_produced, count);
            assert_eq!(stats.pairs_expanded, stats.pending_generated + 1);
            assert!(stats.pages_fetched >= 2 * stats.pairs_expanded);
            assert!(stats.peak_frontier > 0);
            assert!(stats.to_string().contains("expanded="));
            assert_eq!(store.fetch_count("outer")? + store.fetch_count("inner")?, stats.pages_fetched);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
