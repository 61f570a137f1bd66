//! Infrastructure layer - adapters behind the domain ports

pub mod blockchain;
pub mod notifications;
pub mod security;
pub mod storage;
