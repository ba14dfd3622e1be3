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

//! Tweetscope Core
//!
//! Domain types for timeline analysis: the normalized post model, post
//! filtering and prompt assembly. Nothing in this crate performs I/O.

pub mod error;
pub mod filter;
pub mod post;
pub mod prompt;

pub use error::{Error, Result};
pub use filter::PostFilter;
pub use post::{parse_upstream_time, AuthorProfile, Post, Timeline, UPSTREAM_TIME_FORMAT};
pub use prompt::build_prompt;
