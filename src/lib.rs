// This is free and unencumbered software released into the public domain.

//! Manual camera control: focus, ISO, and exposure duration driven by UI
//! control positions, applied to a capture device inside scoped
//! configuration transactions.

extern crate alloc;

pub mod cli;
pub mod ffi;
pub mod shared;
