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

//! Normalized post and profile model
//!
//! Every upstream envelope is decoded into these types before anything else
//! touches it. Posts are immutable once built and live only as long as the
//! request that fetched them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Timestamp layout used by the timeline API (`Wed Oct 10 20:19:24 +0000 2018`)
pub const UPSTREAM_TIME_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// A single post from a user's timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: u64,
    pub author_handle: String,
    pub author_name: String,
    pub created_at: DateTime<Utc>,
    pub text: String,
    /// Handles mentioned in the body, without the leading `@`
    pub mentions: Vec<String>,
}

impl Post {
    /// Creation time rendered the way the upstream API reports it
    pub fn created_at_display(&self) -> String {
        self.created_at.format(UPSTREAM_TIME_FORMAT).to_string()
    }
}

/// Profile of the timeline owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorProfile {
    pub name: String,
    pub handle: String,
    pub description: String,
    pub followers_count: u64,
    pub following_count: u64,
    pub post_count: u64,
    pub favorite_count: u64,
    /// Account creation time, kept verbatim from the upstream
    pub created_at: String,
}

/// Result of a timeline fetch
///
/// `profile` is present whenever `posts` is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeline {
    pub profile: Option<AuthorProfile>,
    pub posts: Vec<Post>,
    /// Max-id watermark for fetching the next, strictly older, batch
    pub next_cursor: Option<u64>,
}

impl Timeline {
    pub fn new(profile: AuthorProfile, posts: Vec<Post>, next_cursor: Option<u64>) -> Self {
        if posts.is_empty() {
            return Self::empty();
        }
        Self {
            profile: Some(profile),
            posts,
            next_cursor,
        }
    }

    pub fn empty() -> Self {
        Self {
            profile: None,
            posts: Vec::new(),
            next_cursor: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    /// Replace the post list, keeping the profile only if posts remain
    pub fn with_posts(mut self, posts: Vec<Post>) -> Self {
        if posts.is_empty() {
            self.profile = None;
        }
        self.posts = posts;
        self
    }
}

/// Parse an upstream creation timestamp into UTC
pub fn parse_upstream_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_str(raw, UPSTREAM_TIME_FORMAT)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Decode(format!("bad created_at {:?}: {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn profile() -> AuthorProfile {
        AuthorProfile {
            name: "Jack".to_string(),
            handle: "jack".to_string(),
            description: "just setting up".to_string(),
            followers_count: 10,
            following_count: 2,
            post_count: 3,
            favorite_count: 4,
            created_at: "Tue Mar 21 20:50:14 +0000 2006".to_string(),
        }
    }

    fn post(id: u64) -> Post {
        Post {
            id,
            author_handle: "jack".to_string(),
            author_name: "Jack".to_string(),
            created_at: Utc.with_ymd_and_hms(2023, 6, 15, 14, 30, 22).unwrap(),
            text: "hello".to_string(),
            mentions: vec![],
        }
    }

    #[test]
    fn test_parse_upstream_time() {
        let ts = parse_upstream_time("Wed Oct 10 20:19:24 +0000 2018").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2018, 10, 10, 20, 19, 24).unwrap());
    }

    #[test]
    fn test_parse_upstream_time_with_offset() {
        let ts = parse_upstream_time("Wed Oct 10 22:19:24 +0200 2018").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2018, 10, 10, 20, 19, 24).unwrap());
    }

    #[test]
    fn test_parse_upstream_time_rejects_iso() {
        assert!(matches!(
            parse_upstream_time("2018-10-10T20:19:24Z"),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn test_created_at_display_matches_upstream_layout() {
        assert_eq!(post(1).created_at_display(), "Thu Jun 15 14:30:22 +0000 2023");
    }

    #[test]
    fn test_empty_timeline_drops_profile() {
        let timeline = Timeline::new(profile(), vec![], Some(5));
        assert!(timeline.profile.is_none());
        assert!(timeline.next_cursor.is_none());
        assert!(timeline.is_empty());
    }

    #[test]
    fn test_with_posts_keeps_profile_when_non_empty() {
        let timeline = Timeline::new(profile(), vec![post(1), post(2)], None);
        let narrowed = timeline.clone().with_posts(vec![post(1)]);
        assert_eq!(narrowed.profile, timeline.profile);
        assert_eq!(narrowed.len(), 1);

        let cleared = timeline.with_posts(vec![]);
        assert!(cleared.profile.is_none());
    }

    #[test]
    fn test_timeline_json_shape() {
        let timeline = Timeline::new(profile(), vec![post(42)], Some(41));
        let value = serde_json::to_value(&timeline).unwrap();

        assert_eq!(value["next_cursor"], 41);
        assert_eq!(value["profile"]["following_count"], 2);
        assert_eq!(value["posts"][0]["id"], 42);
        assert_eq!(value["posts"][0]["created_at"], "2023-06-15T14:30:22Z");
    }
}
