// src/commands/mod.rs
pub mod check;
pub mod common;
pub mod eval;
pub mod inspect;
pub mod run;
