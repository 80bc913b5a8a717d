// SPDX-License-Identifier: GPL-3.0-only

//! Hardware backends

pub mod camera;
