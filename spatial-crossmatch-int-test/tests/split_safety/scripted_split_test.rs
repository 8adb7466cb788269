use spatial_crossmatch::{
    CrossmatchConfig, CrossmatchError, CrossmatchSession, FrontierOrder, MemoryIndexStore,
    PairingStrategy, ScriptedSplit, SessionState, SplitMode,
};
use spatial_crossmatch_int_test::test_util::{
    brute_force, cleanup, collect_sorted, create_pair, create_test_context, grid, run_test, Entry,
};

/// Two overlapping grids. 16 entries make a two-level tree with four
/// entries per page, 64 entries a three-level one.
fn overlapping_grids(count: u64) -> (Vec<Entry>, Vec<Entry>) {
    let columns = (count as f64).sqrt() as u64;
    (grid(count, columns, 1.5, 0.0), grid(count, columns, 1.5, 0.25))
}

fn scripted(after_fetches: u64, page_id: u64, mode: SplitMode) -> ScriptedSplit {
    ScriptedSplit {
        after_fetches,
        page_id,
        mode,
    }
}

fn first_page_at(store: &MemoryIndexStore, name: &str, level: u32) -> u64 {
    let ids = store.page_ids_at_level(name, level).unwrap_or_default();
    assert!(!ids.is_empty(), "no page at level {} of {}", level, name);
    ids[0]
}

fn all_orders() -> Vec<CrossmatchConfig> {
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
fn test_leaf_split_after_root_read() {
    for mode in [SplitMode::Complete, SplitMode::Incomplete] {
        for config in all_orders() {
            run_test(
                || create_test_context(),
                |ctx| {
                    let store = ctx.memory();
                    let (outer, inner) = overlapping_grids(16);
                    create_pair(&store, 2, &outer, &inner)?;

                    // fires on the first leaf read, after the root was expanded
                    let leaf = first_page_at(&store, "outer", 0);
                    store.script_split("outer", scripted(1, leaf, mode))?;

                    let mut session = CrossmatchSession::open_with_config(
                        ctx.shared_memory(),
                        "outer",
                        "inner",
                        config.clone(),
                    )?;
                    let mut pairs = Vec::new();
                    while let Some(pair) = session.next_pair()? {
                        pairs.push(pair);
                    }
                    pairs.sort();

                    assert!(store.read_page("outer", leaf)?.right_sibling.is_some());
                    assert!(session.stats().siblings_followed > 0);
                    assert_eq!(pairs, brute_force(&outer, &inner), "{:?} {:?}", mode, config);
                    Ok(())
                },
                |ctx| cleanup(ctx),
            )
        }
    }
}

#[test]
fn test_internal_split_after_root_read() {
    for mode in [SplitMode::Complete, SplitMode::Incomplete] {
        run_test(
            || create_test_context(),
            |ctx| {
                let store = ctx.memory();
                let (outer, inner) = overlapping_grids(64);
                create_pair(&store, 2, &outer, &inner)?;
                assert_eq!(store.read_page("inner", 1)?.node.level(), 2);

                let internal = first_page_at(&store, "inner", 1);
                store.script_split("inner", scripted(1, internal, mode))?;

                let mut session =
                    CrossmatchSession::open(ctx.shared_memory(), "outer", "inner")?;
                let mut pairs = Vec::new();
                while let Some(pair) = session.next_pair()? {
                    pairs.push(pair);
                }
                pairs.sort();

                assert!(session.stats().siblings_followed > 0);
                assert_eq!(pairs, brute_force(&outer, &inner), "{:?}", mode);
                Ok(())
            },
            |ctx| cleanup(ctx),
        )
    }
}

#[test]
fn test_many_splits_on_both_sides() {
    run_test(
        || create_test_context(),
        |ctx| {
            let store = ctx.memory();
            let (outer, inner) = overlapping_grids(64);
            create_pair(&store, 2, &outer, &inner)?;

            let outer_leaves = store.page_ids_at_level("outer", 0)?;
            let inner_leaves = store.page_ids_at_level("inner", 0)?;
            for (i, leaf) in outer_leaves.iter().step_by(3).enumerate() {
                let mode = if i % 2 == 0 {
                    SplitMode::Complete
                } else {
                    SplitMode::Incomplete
                };
                store.script_split("outer", scripted(1 + i as u64 * 2, *leaf, mode))?;
            }
            for (i, leaf) in inner_leaves.iter().step_by(4).enumerate() {
                store.script_split("inner", scripted(2 + i as u64 * 3, *leaf, SplitMode::Complete))?;
            }
            store.script_split(
                "outer",
                scripted(4, first_page_at(&store, "outer", 1), SplitMode::Incomplete),
            )?;

            let pairs = collect_sorted(CrossmatchSession::open(
                ctx.shared_memory(),
                "outer",
                "inner",
            )?)?;
            assert_eq!(pairs, brute_force(&outer, &inner));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_split_before_session_needs_no_chain() {
    run_test(
        || create_test_context(),
        |ctx| {
            let store = ctx.memory();
            let (outer, inner) = overlapping_grids(16);
            create_pair(&store, 2, &outer, &inner)?;

            // the parent downlink is in place before the root is read
            let leaf = first_page_at(&store, "outer", 0);
            store.split_page("outer", leaf, SplitMode::Complete)?;

            let mut session = CrossmatchSession::open(ctx.shared_memory(), "outer", "inner")?;
            let mut pairs = Vec::new();
            while let Some(pair) = session.next_pair()? {
                pairs.push(pair);
            }
            pairs.sort();

            assert_eq!(session.stats().siblings_followed, 0);
            assert_eq!(pairs, brute_force(&outer, &inner));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_finished_split_is_followed_once() {
    run_test(
        || create_test_context(),
        |ctx| {
            let store = ctx.memory();
            let (outer, inner) = overlapping_grids(16);
            create_pair(&store, 2, &outer, &inner)?;

            let leaf = first_page_at(&store, "outer", 0);
            store.split_page("outer", leaf, SplitMode::Incomplete)?;
            assert!(store.read_page("outer", leaf)?.follow_right);

            // a reader still sees the marker and follows it
            let before = collect_sorted(CrossmatchSession::open(
                ctx.shared_memory(),
                "outer",
                "inner",
            )?)?;
            assert_eq!(before, brute_force(&outer, &inner));

            store.finish_split("outer", leaf)?;
            assert!(!store.read_page("outer", leaf)?.follow_right);

            let mut session = CrossmatchSession::open(ctx.shared_memory(), "outer", "inner")?;
            let mut after = Vec::new();
            while let Some(pair) = session.next_pair()? {
                after.push(pair);
            }
            after.sort();
            assert_eq!(session.stats().siblings_followed, 0);
            assert_eq!(after, before);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_repeated_split_of_one_page() {
    run_test(
        || create_test_context(),
        |ctx| {
            let store = ctx.memory();
            let (outer, inner) = overlapping_grids(16);
            create_pair(&store, 2, &outer, &inner)?;

            let leaf = first_page_at(&store, "outer", 0);
            store.script_split("outer", scripted(1, leaf, SplitMode::Complete))?;
            store.script_split("outer", scripted(1, leaf, SplitMode::Complete))?;

            let pairs = collect_sorted(CrossmatchSession::open(
                ctx.shared_memory(),
                "outer",
                "inner",
            )?)?;
            assert_eq!(pairs, brute_force(&outer, &inner));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_sibling_chain_bound() {
    run_test(
        || create_test_context(),
        |ctx| {
            let store = ctx.memory();
            let (outer, inner) = overlapping_grids(16);
            create_pair(&store, 2, &outer, &inner)?;

            // two splits of one leaf leave a chain of three pages
            let leaf = first_page_at(&store, "outer", 0);
            store.script_split("outer", scripted(1, leaf, SplitMode::Complete))?;
            store.script_split("outer", scripted(1, leaf, SplitMode::Complete))?;

            let mut session = CrossmatchSession::open_with_config(
                ctx.shared_memory(),
                "outer",
                "inner",
                CrossmatchConfig::new().with_max_sibling_chain(1),
            )?;
            let outcome = loop {
                match session.next_pair() {
                    Ok(Some(_)) => continue,
                    other => break other,
                }
            };

            assert!(matches!(outcome, Err(CrossmatchError::CorruptPage { .. })));
            assert_eq!(session.state(), SessionState::Closed);
            assert_eq!(session.next_pair()?, None);
            assert_eq!(store.active_intents("outer")?, 0);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
