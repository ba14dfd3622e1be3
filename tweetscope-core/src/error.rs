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

//! Core error types

use thiserror::Error;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while normalizing or filtering posts
#[derive(Debug, Error)]
pub enum Error {
    /// A caller-supplied date did not match `YYYY-MM-DD`
    #[error("Invalid date {input:?}: {source}")]
    Parse {
        input: String,
        #[source]
        source: chrono::ParseError,
    },

    /// An upstream record could not be mapped onto the post model
    #[error("Decode error: {0}")]
    Decode(String),
}
