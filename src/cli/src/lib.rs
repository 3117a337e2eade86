//! boxrun CLI - run a command in a container built from an image archive.

pub mod commands;
