// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Accelerator abstraction.
//!
//! An [`Accelerator`] executes one [`LayerRequest`] against a borrowed view
//! of device memory and returns once the layer's whole output is written.
//! Implementations exist for real hardware (outside this workspace) and for
//! the pure-software [`crate::ReferenceAccelerator`].

use crate::{DispatchStats, DriverError, Element, LayerRequest};

/// The three memory spaces a request addresses.
///
/// The arena is exclusively borrowed for the duration of one call; weights
/// and bias are read-only.
#[derive(Debug)]
pub struct DeviceMemory<'a, T> {
    pub arena: &'a mut [T],
    pub weights: &'a [T],
    pub bias: &'a [T],
}

fn span_check(space: &'static str, start: usize, count: usize, len: usize) -> Result<(), DriverError> {
    let end = start.checked_add(count).ok_or(DriverError::OutOfBounds {
        space,
        start,
        end: usize::MAX,
        len,
    })?;
    if end > len {
        return Err(DriverError::OutOfBounds {
            space,
            start,
            end,
            len,
        });
    }
    Ok(())
}

impl<'a, T: Element> DeviceMemory<'a, T> {
    pub fn new(arena: &'a mut [T], weights: &'a [T], bias: &'a [T]) -> Self {
        Self {
            arena,
            weights,
            bias,
        }
    }

    /// Verifies every operand region of `req` lies inside its space.
    pub fn check_bounds(&self, req: &LayerRequest) -> Result<(), DriverError> {
        span_check(
            "input",
            req.input_addr,
            req.input_shape().aligned_len(),
            self.arena.len(),
        )?;
        span_check(
            "output",
            req.output_addr,
            req.output_shape().aligned_len(),
            self.arena.len(),
        )?;
        span_check("weights", req.weight_addr, req.weight_count(), self.weights.len())?;
        span_check("bias", req.bias_addr, req.bias_count(), self.bias.len())?;
        Ok(())
    }
}

/// A device (or stand-in) that runs conv and pool layers.
pub trait Accelerator<T: Element> {
    /// Short identifier for logs.
    fn name(&self) -> &str;

    /// Runs one layer to completion.
    ///
    /// On error the output region may be partially written; the caller
    /// must abandon the run.
    fn execute(
        &mut self,
        req: &LayerRequest,
        mem: &mut DeviceMemory<'_, T>,
    ) -> Result<DispatchStats, DriverError>;
}

impl<T: Element, A: Accelerator<T> + ?Sized> Accelerator<T> for Box<A> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn execute(
        &mut self,
        req: &LayerRequest,
        mem: &mut DeviceMemory<'_, T>,
    ) -> Result<DispatchStats, DriverError> {
        (**self).execute(req, mem)
    }
}
