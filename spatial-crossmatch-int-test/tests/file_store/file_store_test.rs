use spatial_crossmatch::index::PAGE_SIZE;
use spatial_crossmatch::{
    CrossmatchConfig, CrossmatchError, CrossmatchResult, CrossmatchSession, FileIndexStore,
    IndexKind, KeyDomain, PairingStrategy, SessionState,
};
use spatial_crossmatch_int_test::test_util::{
    brute_force, cleanup, create_test_context, crossmatch, random_entries, run_test, Entry,
};
use std::io::{Seek, SeekFrom, Write};
use std::sync::Arc;

fn create_files(store: &FileIndexStore, seed: u64) -> CrossmatchResult<(Vec<Entry>, Vec<Entry>)> {
    let outer = random_entries(seed, 400, 2, 80.0, 4.0, 0.05);
    let inner = random_entries(seed + 1, 300, 2, 80.0, 4.0, 0.05);
    store.create_tree("outer", KeyDomain::new(2), outer.clone())?;
    store.create_tree("inner", KeyDomain::new(2), inner.clone())?;
    Ok((outer, inner))
}

#[test]
fn test_file_crossmatch_matches_brute_force() {
    run_test(
        || create_test_context(),
        |ctx| {
            let (outer, inner) = create_files(&ctx.files(), 17)?;
            let expected = brute_force(&outer, &inner);

            for pairing in [PairingStrategy::NestedLoop, PairingStrategy::PlaneSweep] {
                let pairs = crossmatch(
                    ctx.shared_files(),
                    "outer",
                    "inner",
                    CrossmatchConfig::new().with_pairing(pairing),
                )?;
                assert_eq!(pairs, expected);
            }
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_reopened_directory_gives_same_pairs() {
    run_test(
        || create_test_context(),
        |ctx| {
            let (outer, inner) = create_files(&ctx.files(), 23)?;
            let first = crossmatch(
                ctx.shared_files(),
                "outer",
                "inner",
                CrossmatchConfig::default(),
            )?;

            let reopened = FileIndexStore::open(ctx.path())?;
            let second = crossmatch(
                Arc::new(reopened),
                "outer",
                "inner",
                CrossmatchConfig::default(),
            )?;
            assert_eq!(first, second);
            assert_eq!(second, brute_force(&outer, &inner));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_memory_and_file_hosts_agree() {
    run_test(
        || create_test_context(),
        |ctx| {
            let (outer, inner) = create_files(&ctx.files(), 31)?;
            let memory = ctx.memory();
            memory.create_tree("outer", KeyDomain::new(2), outer)?;
            memory.create_tree("inner", KeyDomain::new(2), inner)?;

            let from_files = crossmatch(
                ctx.shared_files(),
                "outer",
                "inner",
                CrossmatchConfig::default(),
            )?;
            let from_memory = crossmatch(
                ctx.shared_memory(),
                "outer",
                "inner",
                CrossmatchConfig::default(),
            )?;
            assert_eq!(from_files, from_memory);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_corrupt_root_aborts_session() {
    run_test(
        || create_test_context(),
        |ctx| {
            let files = ctx.files();
            create_files(&files, 5)?;

            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .open(files.index_path("inner")?)?;
            // inside the root page's body
            file.seek(SeekFrom::Start(PAGE_SIZE as u64 + 12))?;
            file.write_all(&[0xFE])?;
            drop(file);

            let mut session = CrossmatchSession::open(ctx.shared_files(), "outer", "inner")?;
            assert!(matches!(
                session.next_pair(),
                Err(CrossmatchError::CorruptPage { page_id: 1, .. })
            ));
            assert_eq!(session.state(), SessionState::Closed);
            assert!(!session.is_open());
            assert_eq!(session.next_pair()?, None);
            assert_eq!(files.active_intents("inner"), 0);
            assert_eq!(files.active_intents("outer"), 0);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_non_spatial_files_are_rejected() {
    run_test(
        || create_test_context(),
        |ctx| {
            let files = ctx.files();
            create_files(&files, 9)?;
            files.create_foreign_index("names", IndexKind::Ordered)?;
            std::fs::write(files.index_path("junk")?, b"not an index at all")?;

            for other in ["names", "junk"] {
                let err = CrossmatchSession::open(ctx.shared_files(), "outer", other)
                    .err()
                    .expect("non-spatial index accepted");
                assert!(
                    matches!(err, CrossmatchError::WrongIndexType { .. }),
                    "{}: {:?}",
                    other,
                    err
                );
                assert!(err.is_validation_error());
            }
            assert_eq!(files.active_intents("outer"), 0);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_dropped_file_tree_is_not_found() {
    run_test(
        || create_test_context(),
        |ctx| {
            let files = ctx.files();
            create_files(&files, 13)?;

            let session = CrossmatchSession::open(ctx.shared_files(), "outer", "inner")?;
            assert!(files.drop_tree("inner").is_err());
            drop(session);

            files.drop_tree("inner")?;
            assert!(matches!(
                CrossmatchSession::open(ctx.shared_files(), "outer", "inner"),
                Err(CrossmatchError::NotFound(_))
            ));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
