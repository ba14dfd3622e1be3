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

//! Keyword and date-range narrowing of a fetched timeline
//!
//! Each criterion is optional and they compose: a filter with only a keyword
//! matches on the keyword alone, a filter with only dates matches on dates
//! alone. Date bounds are exclusive on both sides.

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{Error, Result};
use crate::post::Post;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostFilter {
    keyword: Option<String>,
    /// Posts must be created strictly after this instant
    after: Option<DateTime<Utc>>,
    /// Posts must be created strictly before this instant
    before: Option<DateTime<Utc>>,
}

impl PostFilter {
    /// Build a filter from raw request parameters.
    ///
    /// Empty strings are treated as absent. Dates use `YYYY-MM-DD` and are
    /// anchored at midnight UTC.
    pub fn new(
        keyword: Option<&str>,
        start_date: Option<&str>,
        end_date: Option<&str>,
    ) -> Result<Self> {
        Ok(Self {
            keyword: non_empty(keyword).map(str::to_string),
            after: non_empty(start_date).map(parse_date).transpose()?,
            before: non_empty(end_date).map(parse_date).transpose()?,
        })
    }

    pub fn is_noop(&self) -> bool {
        self.keyword.is_none() && self.after.is_none() && self.before.is_none()
    }

    pub fn matches(&self, post: &Post) -> bool {
        if let Some(after) = self.after {
            if post.created_at <= after {
                return false;
            }
        }
        if let Some(before) = self.before {
            if post.created_at >= before {
                return false;
            }
        }
        match &self.keyword {
            Some(keyword) => post.text.contains(keyword.as_str()),
            None => true,
        }
    }

    /// Keep the posts matching every requested criterion, preserving order
    pub fn apply(&self, posts: Vec<Post>) -> Vec<Post> {
        if self.is_noop() {
            return posts;
        }
        let before = posts.len();
        let kept: Vec<Post> = posts.into_iter().filter(|p| self.matches(p)).collect();
        tracing::debug!(before, after = kept.len(), "Applied post filter");
        kept
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|source| Error::Parse {
        input: raw.to_string(),
        source,
    })?;
    Ok(date.and_time(chrono::NaiveTime::MIN).and_utc())
}
