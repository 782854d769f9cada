//! Upstream platform integration.

pub mod auth;
pub mod badge;
pub mod client;

pub use auth::{Authenticator, Credentials};
pub use badge::{BadgeCache, BadgeSet, BadgeVersion, GlobalBadges};
pub use client::{TwitchClient, User};
