//! Developer CLI for signer-link.
//!
//! `uri` and `check` exercise connection-string building and validation;
//! `simulate` drives a [`signer_link::ConnectionStateMachine`] against a
//! scripted signer and streams its snapshots.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
pub mod styles;
