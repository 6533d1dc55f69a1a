// Copyright 2025 HEM Sp. z o.o.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Gate that holds playback back while audio clients buffer the current item.
///
/// The server engages and releases it; players consult [`ReadinessBarrier::can_play`] before
/// starting playback. Clones share the same gate.
#[derive(Debug, Clone, Default)]
pub struct ReadinessBarrier {
    waiting: Arc<AtomicBool>,
}

impl ReadinessBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn engage(&self) {
        self.waiting.store(true, Ordering::SeqCst);
    }

    /// Returns whether the barrier was engaged.
    pub fn release(&self) -> bool {
        self.waiting.swap(false, Ordering::SeqCst)
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting.load(Ordering::SeqCst)
    }

    pub fn can_play(&self) -> bool {
        !self.is_waiting()
    }
}
