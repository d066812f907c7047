// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command-line front end for the `sessionward` session layer.

pub mod cli;
pub mod command;
