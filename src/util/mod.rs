// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared utilities: vision masks and token/text positioning.

pub mod masks;
pub mod positioning;
