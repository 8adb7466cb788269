//! Cross-matches over persisted trees.

mod file_store_test;
