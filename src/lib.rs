//! A streaming, single-pass software update agent: reads a cpio-format
//! update package entry by entry, validates its manifest against device
//! and policy constraints, dispatches each artifact to a registered
//! handler through a decrypt/decompress/hash transform chain, drives
//! preinstall/postinstall scripts, and commits the result to whichever
//! bootloader backend is available.
//!
//! [`coordinator::Session`] is the entry point: build one with a
//! [`config::AgentConfig`], a populated [`handler::HandlerRegistry`], a
//! probed [`bootloader::Bootloader`] backend and a [`notifier::NotifierBus`],
//! then call [`coordinator::Session::run`] with the package's byte source.

pub mod bootloader;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod handler;
pub mod hwcompat;
pub mod ipc;
pub mod manifest;
pub mod notifier;
pub mod subprocess;
pub mod transform;
pub mod version;

pub use error::{Error, Result};
