//! Ready-made hooks to customise the behaviour of a [`Consumer`](crate::consumers::Consumer).
pub mod pre_start;
