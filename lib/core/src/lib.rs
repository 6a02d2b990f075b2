//! Core domain types and utilities for the flywheel platform.
//!
//! This crate provides the foundational identifier types and error handling
//! used throughout the flywheel workflow-automation engine.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{
    ConfirmId, CredentialId, InstanceId, InstanceNodeId, NodeId, OrganizationId, TriggerId, UserId,
    WorkflowId,
};
