//! Ready-made implementations of the hardware traits.

pub mod bitbang;
