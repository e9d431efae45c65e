// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Crate-wide error type.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ControlError>;

#[derive(Debug, Error)]
pub enum ControlError {
    /// A malformed request: wrong service name, missing operation, nil request.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Attempted to merge two metric values (or distributions) that are not
    /// compatible with each other.
    #[error("incompatible merge: {0}")]
    IncompatibleMerge(String),

    /// The control-plane round-trip failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Monetary arithmetic overflowed and `allow_overflow` was not set.
    #[error("overflow: {0}")]
    Overflow(String),

    /// The façade client was used after `stop()`.
    #[error("client is stopped")]
    ClientStopped,
}
