//! Resource definitions
//!
//! Each remote resource type declares its fields and their mutability here;
//! the reconciliation core stays generic over them.

pub mod billing_account;
