//! The worked examples: a single matching pair, disjoint internal roots
//! and a leaf against an internal node.
