//! Builds and inspects ATR disk images holding a SpartaDOS File System
//! (SFS) volume, plus recognition of HOWFEN DOS menu disks.
//!
//! The CLI front ends (`mkatr`, `lsatr`, `lshowfen`) are thin
//! collaborators over this library: they parse options, walk the host
//! filesystem into a [`flist::FileList`], and call [`builder::build`] /
//! [`reader::list`] / [`howfen::howfen_list`].

pub mod atr;
pub mod bitmap;
pub mod builder;
pub mod dirent;
pub mod error;
pub mod flist;
pub mod howfen;
pub mod reader;
pub mod secmap;

pub use error::{Result, SfsError};
