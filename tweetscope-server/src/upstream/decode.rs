// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Decoders for the upstream timeline envelopes
//!
//! All three contracts carry the same v1.1-style status objects; they differ
//! only in how the statuses are wrapped and whether a "more pages" flag is
//! present.

use serde::Deserialize;
use tweetscope_core::{parse_upstream_time, AuthorProfile, Post};

use super::UpstreamError;
use crate::config::UpstreamKind;

/// One decoded page of a timeline
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub posts: Vec<Post>,
    /// Owner profile taken from the first status, if any
    pub profile: Option<AuthorProfile>,
    /// Explicit continuation flag, when the envelope carries one
    pub has_more: Option<bool>,
}

/// Turns a raw response body into a normalized page
pub trait TimelineDecoder: Send + Sync {
    fn decode(&self, body: &[u8]) -> Result<Page, UpstreamError>;
}

pub fn decoder_for(kind: UpstreamKind) -> Box<dyn TimelineDecoder> {
    match kind {
        UpstreamKind::Scroller => Box::new(ScrollerDecoder),
        UpstreamKind::V1 => Box::new(V1Decoder),
        UpstreamKind::Modules => Box::new(ModulesDecoder),
    }
}

/// `{"tweets": [...], "hasMore": bool}`
pub struct ScrollerDecoder;

/// `[...]`
pub struct V1Decoder;

/// `{"modules": [{"status": {"data": {...}}}, ...], "hasMore": bool?}`
pub struct ModulesDecoder;

impl TimelineDecoder for ScrollerDecoder {
    fn decode(&self, body: &[u8]) -> Result<Page, UpstreamError> {
        let envelope: ScrollerEnvelope = serde_json::from_slice(body)?;
        normalize(envelope.tweets, Some(envelope.has_more))
    }
}

impl TimelineDecoder for V1Decoder {
    fn decode(&self, body: &[u8]) -> Result<Page, UpstreamError> {
        let statuses: Vec<RawStatus> = serde_json::from_slice(body)?;
        normalize(statuses, None)
    }
}

impl TimelineDecoder for ModulesDecoder {
    fn decode(&self, body: &[u8]) -> Result<Page, UpstreamError> {
        let envelope: ModulesEnvelope = serde_json::from_slice(body)?;
        // Non-status modules (prompts, suggestions) carry no post
        let statuses = envelope
            .modules
            .into_iter()
            .filter_map(|module| module.status.map(|status| status.data))
            .collect();
        normalize(statuses, envelope.has_more)
    }
}

fn normalize(statuses: Vec<RawStatus>, has_more: Option<bool>) -> Result<Page, UpstreamError> {
    let profile = statuses.first().map(|status| status.user.to_profile());
    let posts = statuses
        .into_iter()
        .map(RawStatus::into_post)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Page {
        posts,
        profile,
        has_more,
    })
}

#[derive(Debug, Deserialize)]
struct ScrollerEnvelope {
    #[serde(default)]
    tweets: Vec<RawStatus>,
    #[serde(rename = "hasMore", default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct ModulesEnvelope {
    #[serde(default)]
    modules: Vec<RawModule>,
    #[serde(rename = "hasMore")]
    has_more: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawModule {
    status: Option<RawModuleStatus>,
}

#[derive(Debug, Deserialize)]
struct RawModuleStatus {
    data: RawStatus,
}

#[derive(Debug, Deserialize)]
struct RawStatus {
    id: Option<u64>,
    id_str: Option<String>,
    created_at: String,
    text: Option<String>,
    full_text: Option<String>,
    #[serde(default)]
    entities: RawEntities,
    user: RawUser,
}

#[derive(Debug, Default, Deserialize)]
struct RawEntities {
    #[serde(default)]
    user_mentions: Vec<RawMention>,
}

#[derive(Debug, Deserialize)]
struct RawMention {
    screen_name: String,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    #[serde(default)]
    name: String,
    screen_name: String,
    description: Option<String>,
    #[serde(default)]
    followers_count: u64,
    #[serde(default)]
    friends_count: u64,
    #[serde(default)]
    statuses_count: u64,
    #[serde(default)]
    favourites_count: u64,
    #[serde(default)]
    created_at: String,
}

impl RawStatus {
    fn into_post(self) -> Result<Post, UpstreamError> {
        // id_str is authoritative; JSON numbers above 2^53 lose precision in some producers
        let id = match (&self.id_str, self.id) {
            (Some(id_str), _) => id_str
                .parse::<u64>()
                .map_err(|e| UpstreamError::Decode(format!("bad id_str {:?}: {}", id_str, e)))?,
            (None, Some(id)) => id,
            (None, None) => return Err(UpstreamError::Decode("status without id".to_string())),
        };
        let created_at = parse_upstream_time(&self.created_at)?;
        let text = self.full_text.or(self.text).unwrap_or_default();

        Ok(Post {
            id,
            author_handle: self.user.screen_name,
            author_name: self.user.name,
            created_at,
            text,
            mentions: self
                .entities
                .user_mentions
                .into_iter()
                .map(|m| m.screen_name)
                .collect(),
        })
    }
}

impl RawUser {
    fn to_profile(&self) -> AuthorProfile {
        AuthorProfile {
            name: self.name.clone(),
            handle: self.screen_name.clone(),
            description: self.description.clone().unwrap_or_default(),
            followers_count: self.followers_count,
            following_count: self.friends_count,
            post_count: self.statuses_count,
            favorite_count: self.favourites_count,
            created_at: self.created_at.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn status(id: u64, text: &str) -> serde_json::Value {
        json!({
            "id": id,
            "id_str": id.to_string(),
            "created_at": "Wed Oct 10 20:19:24 +0000 2018",
            "text": text,
            "entities": {
                "hashtags": [],
                "user_mentions": [{"screen_name": "bob", "name": "Bob", "id": 7}]
            },
            "user": {
                "id": 1,
                "name": "Alice",
                "screen_name": "alice",
                "description": "hello there",
                "followers_count": 100,
                "friends_count": 20,
                "statuses_count": 300,
                "favourites_count": 40,
                "created_at": "Tue Mar 21 20:50:14 +0000 2006"
            }
        })
    }

    #[test]
    fn test_v1_bare_array() {
        let body = json!([status(2, "second"), status(1, "first")]).to_string();
        let page = V1Decoder.decode(body.as_bytes()).unwrap();

        assert_eq!(page.posts.len(), 2);
        assert_eq!(page.posts[0].id, 2);
        assert_eq!(page.posts[0].author_handle, "alice");
        assert_eq!(page.posts[0].mentions, vec!["bob".to_string()]);
        assert!(page.has_more.is_none());

        let profile = page.profile.unwrap();
        assert_eq!(profile.following_count, 20);
        assert_eq!(profile.favorite_count, 40);
        assert_eq!(profile.description, "hello there");
    }

    #[test]
    fn test_scroller_envelope() {
        let body = json!({"tweets": [status(9, "hi")], "hasMore": true}).to_string();
        let page = ScrollerDecoder.decode(body.as_bytes()).unwrap();
        assert_eq!(page.posts.len(), 1);
        assert_eq!(page.has_more, Some(true));
    }

    #[test]
    fn test_modules_envelope_skips_non_status_modules() {
        let body = json!({
            "modules": [
                {"status": {"data": status(5, "five")}},
                {"prompt": {"data": {"text": "follow more people"}}},
                {"status": {"data": status(4, "four")}}
            ]
        })
        .to_string();
        let page = ModulesDecoder.decode(body.as_bytes()).unwrap();
        let ids: Vec<u64> = page.posts.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![5, 4]);
        assert!(page.has_more.is_none());
    }

    #[test]
    fn test_full_text_preferred_and_null_description() {
        let mut raw = status(3, "truncated…");
        raw["full_text"] = json!("the whole thing");
        raw["user"]["description"] = serde_json::Value::Null;
        raw.as_object_mut().unwrap().remove("entities");

        let page = V1Decoder.decode(json!([raw]).to_string().as_bytes()).unwrap();
        assert_eq!(page.posts[0].text, "the whole thing");
        assert!(page.posts[0].mentions.is_empty());
        assert_eq!(page.profile.unwrap().description, "");
    }

    #[test]
    fn test_id_str_wins_over_lossy_number() {
        let mut raw = status(1, "x");
        raw["id_str"] = json!("1684931012345678901");
        let page = V1Decoder.decode(json!([raw]).to_string().as_bytes()).unwrap();
        assert_eq!(page.posts[0].id, 1684931012345678901);
    }

    #[test]
    fn test_empty_pages() {
        assert!(V1Decoder.decode(b"[]").unwrap().profile.is_none());
        let page = ScrollerDecoder.decode(br#"{"tweets": [], "hasMore": false}"#).unwrap();
        assert!(page.posts.is_empty());
        assert_eq!(page.has_more, Some(false));
    }

    #[test]
    fn test_wrong_shape_is_decode_error() {
        let err = V1Decoder.decode(br#"{"errors": [{"code": 34}]}"#).unwrap_err();
        assert!(matches!(err, UpstreamError::Decode(_)));
    }

    #[test]
    fn test_bad_timestamp_is_decode_error() {
        let mut raw = status(1, "x");
        raw["created_at"] = json!("yesterday");
        let err = V1Decoder.decode(json!([raw]).to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, UpstreamError::Decode(_)));
    }
}
