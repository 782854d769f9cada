//! Chat badges and the global badge cache.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::client::TwitchClient;
use crate::cache::{Cache, Refresh};
use crate::error::{Result, ServerError};

/// Name of the global badge cache, and of its document.
pub const CACHE_NAME: &str = "badges";

/// Size used when none is requested.
pub const DEFAULT_SIZE: &str = "image_url_1x";

/// Global badges keyed by set ID.
pub type BadgeCache = Cache<BadgeSet, GlobalBadges>;

/// A badge set and its versions, as returned upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadgeSet {
    #[serde(default)]
    pub set_id: String,
    #[serde(default)]
    pub versions: Vec<BadgeVersion>,
    /// Remaining upstream fields, kept as received.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A badge version. Image URLs and every other upstream field stay in
/// `fields` untouched, `null`s included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadgeVersion {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl BadgeSet {
    pub fn version(&self, id: &str) -> Option<&BadgeVersion> {
        self.versions.iter().find(|version| version.id == id)
    }
}

impl BadgeVersion {
    /// Image URL of the given size.
    ///
    /// `size` is either a shorthand (`1x`, `2x`, `4x`) or a field name such
    /// as `image_url_2x`.
    pub fn url(&self, size: &str) -> Option<&str> {
        self.fields.get(size_field(size)).and_then(Value::as_str)
    }
}

/// Expand a size shorthand into its field name. Anything else is returned
/// as is.
pub fn size_field(size: &str) -> &str {
    match size {
        "1x" => "image_url_1x",
        "2x" => "image_url_2x",
        "4x" => "image_url_4x",
        other => other,
    }
}

/// Find `set/version` among `sets`.
pub fn find_version<'a>(
    sets: &'a [BadgeSet],
    set: &str,
    version: &str,
) -> Option<&'a BadgeVersion> {
    sets.iter()
        .find(|badge| badge.set_id == set)
        .and_then(|badge| badge.version(version))
}

/// Look `set/version` up in the global badge cache.
pub fn cached_badge(cache: &BadgeCache, set: &str, version: &str) -> Result<BadgeVersion> {
    cache
        .get(set)
        .ok()
        .and_then(|badge| badge.version(version).cloned())
        .ok_or_else(|| ServerError::badge_not_found(format!("{set}/{version}")))
}

/// Refreshes the global badge cache from upstream.
#[derive(Clone)]
pub struct GlobalBadges {
    client: TwitchClient,
}

impl GlobalBadges {
    /// Create a new [`GlobalBadges`].
    pub fn new(client: TwitchClient) -> Self {
        Self { client }
    }
}

impl Refresh<BadgeSet> for GlobalBadges {
    async fn refresh(&self, name: &str, _rules: &Value) -> Result<BTreeMap<String, BadgeSet>> {
        tracing::debug!(cache = %name, "fetching global badges");

        let badges = self.client.global_badges().await?;
        Ok(by_set_id(badges))
    }
}

fn by_set_id(badges: Vec<BadgeSet>) -> BTreeMap<String, BadgeSet> {
    badges
        .into_iter()
        .map(|badge| (badge.set_id.clone(), badge))
        .collect()
}
