//! Generates DTO structs from existing Rust structs.
//!
//! A run locates a struct in a source tree ([`app::extractor`]), selects and
//! renames its fields ([`app::transform`]), and renders the result through a
//! template ([`app::emitter`]).

pub mod app;
