/*
 * 5D Labs Agent Platform - Event Alerter
 * Copyright (C) 2025 5D Labs
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

#![allow(clippy::missing_errors_doc, clippy::doc_markdown)]

//! Event alerter core library
//!
//! This crate watches the cluster-wide stream of Kubernetes events and
//! forwards a filtered subset to an Alertmanager-compatible gateway:
//! - Watching core/v1 Events across all namespaces
//! - Coalescing change notifications into a deduplicating work queue
//! - Retrying failed alert deliveries with exponential backoff

pub mod config;
pub mod controller;
pub mod error;
pub mod handlers;

// Re-export commonly used types
pub use config::FilterConfig;
pub use controller::{Controller, ControllerOptions};
pub use error::{Error, Result};
pub use handlers::alertmanager::AlertManager;
