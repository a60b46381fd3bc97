// shard-invalidator - Selective cache-shard invalidation for PostgreSQL-backed parameters
// Copyright (C) 2025 shard-invalidator contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! shard-invalidator: decides which cache shards must drop a changed
//! parameter and evicts it from exactly those.

pub mod cli;
pub mod core;
pub mod engine;
pub mod listener;
pub mod logging;
pub mod shard;
pub mod store;
pub mod ui;

#[cfg(test)]
mod testing;

pub use crate::core::error::{InvalidatorError, Result};
pub use crate::engine::{ChangeOutcome, EngineSettings, InvalidationEngine};
