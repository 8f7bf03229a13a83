//! Roles and the operation whitelist checked before any engine call
//!
//! The engine trusts the caller identity it is given; this module is where
//! that trust is established. Every operation has a minimum [`Role`], banned
//! users are denied everything and unknown users are denied until they
//! register.

use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};

use crate::db::{users, Store, User};
use crate::error::{StorageError, UserFacing};

pub use crate::db::Role;

/// Operations exposed to users and staff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    // Member
    Claim,
    Redeem,
    ViewBalance,

    // Admin
    AddPlatform,
    AddStock,
    GenerateKeys,
    Ban,
    Unban,
    VerifyUser,
    ListUsers,
    ViewAudit,
    RecordReferral,

    // Owner
    GivePoints,
    AddOwner,
    PromoteAdmin,
}

impl Operation {
    /// Minimum role allowed to perform the operation
    pub fn required_role(self) -> Role {
        match self {
            Operation::Claim | Operation::Redeem | Operation::ViewBalance => Role::Member,

            Operation::AddPlatform
            | Operation::AddStock
            | Operation::GenerateKeys
            | Operation::Ban
            | Operation::Unban
            | Operation::VerifyUser
            | Operation::ListUsers
            | Operation::ViewAudit
            | Operation::RecordReferral => Role::Admin,

            Operation::GivePoints | Operation::AddOwner | Operation::PromoteAdmin => Role::Owner,
        }
    }

    /// Consuming inventory needs a verified account
    pub fn requires_verification(self) -> bool {
        matches!(self, Operation::Claim | Operation::Redeem)
    }

    /// Human-readable description for logs
    pub fn description(self) -> &'static str {
        match self {
            Operation::Claim => "Claim stock",
            Operation::Redeem => "Redeem key",
            Operation::ViewBalance => "View balance",
            Operation::AddPlatform => "Add platform",
            Operation::AddStock => "Add stock",
            Operation::GenerateKeys => "Generate keys",
            Operation::Ban => "Ban user",
            Operation::Unban => "Unban user",
            Operation::VerifyUser => "Verify user",
            Operation::ListUsers => "List users",
            Operation::ViewAudit => "View audit log",
            Operation::RecordReferral => "Record referral",
            Operation::GivePoints => "Give points",
            Operation::AddOwner => "Add owner",
            Operation::PromoteAdmin => "Promote admin",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Check if an operation is allowed for the given role
pub fn is_operation_allowed(op: Operation, role: Role) -> bool {
    role >= op.required_role()
}

#[derive(Error, Debug)]
pub enum AccessError {
    #[error("Unknown user: {0}")]
    UnknownUser(i64),

    #[error("User {0} is banned")]
    Banned(i64),

    #[error("User {0} is not verified")]
    Unverified(i64),

    #[error("{operation} requires {required}, user {user_id} is {role}")]
    Forbidden {
        user_id: i64,
        role: Role,
        required: Role,
        operation: Operation,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl UserFacing for AccessError {
    fn user_message(&self) -> &'static str {
        match self {
            AccessError::UnknownUser(_) => "Please register first.",
            AccessError::Banned(_) => "You are banned.",
            AccessError::Unverified(_) => "Please verify your account first.",
            AccessError::Forbidden { .. } => "You are not allowed to do that.",
            AccessError::Storage(_) => "Service temporarily unavailable, please try again.",
        }
    }
}

/// Decide whether `user_id` may perform `op`; returns the caller's record on success
pub fn authorize(store: &Store, user_id: i64, op: Operation) -> Result<User, AccessError> {
    let user = store
        .read(|conn| users::get_user(conn, user_id))?
        .ok_or(AccessError::UnknownUser(user_id))?;

    check(&user, op)?;
    debug!(user_id, operation = %op, "Authorized");
    Ok(user)
}

/// The role, ban and verification rules on an already-loaded user
pub fn check(user: &User, op: Operation) -> Result<(), AccessError> {
    if user.banned {
        warn!(user_id = user.user_id, operation = %op, "Banned user denied");
        return Err(AccessError::Banned(user.user_id));
    }

    let role = user.role();
    if !is_operation_allowed(op, role) {
        warn!(user_id = user.user_id, operation = %op, role = %role, "Operation denied");
        return Err(AccessError::Forbidden {
            user_id: user.user_id,
            role,
            required: op.required_role(),
            operation: op,
        });
    }

    if op.requires_verification() && !user.verified && !role.is_staff() {
        return Err(AccessError::Unverified(user.user_id));
    }

    Ok(())
}
