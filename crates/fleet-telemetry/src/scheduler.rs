// Copyright 2025 Chris Custine
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

//! Render batching.
//!
//! [`FrameScheduler`] holds at most one pending unit of work. Any number of
//! `schedule` calls between two frame boundaries collapse into a single run.
//! The job receives the target by reference when it runs, so it always sees
//! the state as of the flush, not as of the first `schedule` call.

type Job<T> = Box<dyn FnOnce(&mut T) + Send>;

/// Coalesces repeated work requests into one run per frame.
pub struct FrameScheduler<T: ?Sized> {
    pending: Option<Job<T>>,
    scheduled: u64,
    flushed: u64,
}

impl<T: ?Sized> std::fmt::Debug for FrameScheduler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameScheduler")
            .field("pending", &self.pending.is_some())
            .field("scheduled", &self.scheduled)
            .field("flushed", &self.flushed)
            .finish()
    }
}

impl<T: ?Sized> Default for FrameScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> FrameScheduler<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: None,
            scheduled: 0,
            flushed: 0,
        }
    }

    /// Queue `job` for the next frame unless a job is already pending.
    ///
    /// Returns `true` if this call armed the scheduler.
    pub fn schedule<F>(&mut self, job: F) -> bool
    where
        F: FnOnce(&mut T) + Send + 'static,
    {
        self.scheduled += 1;
        if self.pending.is_some() {
            return false;
        }
        self.pending = Some(Box::new(job));
        true
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Remove the pending job without running it, clearing the pending flag.
    ///
    /// Used when the job needs the scheduler's owner as its target.
    pub fn take(&mut self) -> Option<Box<dyn FnOnce(&mut T) + Send>> {
        let job = self.pending.take();
        if job.is_some() {
            self.flushed += 1;
        }
        job
    }

    /// Frame boundary: run the pending job, if any, against `target`.
    pub fn run(&mut self, target: &mut T) -> bool {
        match self.take() {
            Some(job) => {
                job(target);
                true
            }
            None => false,
        }
    }

    /// Drop any pending job. Called on teardown.
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// Total `schedule` calls, including coalesced ones.
    #[must_use]
    pub fn scheduled_count(&self) -> u64 {
        self.scheduled
    }

    /// Total jobs actually run.
    #[must_use]
    pub fn flushed_count(&self) -> u64 {
        self.flushed
    }
}
