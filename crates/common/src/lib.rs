// SPDX-FileCopyrightText: 2025-2026 The vperf contributors
// SPDX-License-Identifier: Apache-2.0

pub mod address;
pub mod error;
pub mod types;

pub use address::{Endpoint, Purpose, VMADDR_CID_ANY, resolve};
pub use error::{ErrorCode, TransportError};
