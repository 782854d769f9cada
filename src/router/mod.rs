//! HTTP handlers.
pub mod auth;
pub mod badges;
pub mod emote;
pub mod status;
pub mod user;

use serde::{Deserialize, Serialize};

/// `{"data": ...}` envelope of every lookup.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Data<T> {
    pub data: T,
}
