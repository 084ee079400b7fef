//! Embedded copy of the default brio library.
//!
//! `lib/default.brio` is baked into the binary at compile time via
//! `include_str!()`, so the console works without any installed library
//! directory (e.g. after `cargo install`). It runs before the user init
//! script, which may redefine anything in it, including `prompt()`.

/// The default library source.
pub static DEFAULT_LIB: &str = include_str!("../lib/default.brio");
