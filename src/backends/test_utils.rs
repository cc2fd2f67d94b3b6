//! Test utilities and mock capabilities
//!
//! Scripted stand-ins for the edit and restoration capabilities plus a sleeper
//! that records instead of waiting, so retry and degrade behavior can be
//! exercised without network access or real delays.

use crate::{
    backends::{EditRequest, ImageEditor, ImageRestorer},
    error::{Result, SmileDesignError},
    retry::Sleeper,
    types::ImagePayload,
};
use async_trait::async_trait;
use image::DynamicImage;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What a mock capability does on one call
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Succeed with this image, PNG encoded inline
    Image(DynamicImage),
    /// Succeed with this exact payload
    Payload(ImagePayload),
    /// Succeed without output
    Empty,
    /// Fail with a retryable rate-limit error
    Throttled,
    /// Fail with a non-retryable upstream error
    Fail,
}

impl MockOutcome {
    fn into_result(self) -> Result<Option<ImagePayload>> {
        match self {
            Self::Image(image) => ImagePayload::png(&image).map(Some),
            Self::Payload(payload) => Ok(Some(payload)),
            Self::Empty => Ok(None),
            Self::Throttled => Err(SmileDesignError::throttled("mock capability: 429 Too Many Requests")),
            Self::Fail => Err(SmileDesignError::upstream(Some(500), "mock capability failure")),
        }
    }
}

#[derive(Debug)]
struct Script {
    queued: Mutex<VecDeque<MockOutcome>>,
    then: MockOutcome,
    calls: AtomicU32,
}

impl Script {
    fn new(queued: Vec<MockOutcome>, then: MockOutcome) -> Self {
        Self {
            queued: Mutex::new(queued.into()),
            then,
            calls: AtomicU32::new(0),
        }
    }

    fn next(&self) -> Result<Option<ImagePayload>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = lock(&self.queued)
            .pop_front()
            .unwrap_or_else(|| self.then.clone());
        outcome.into_result()
    }
}

/// Mock edit capability
#[derive(Debug)]
pub struct MockImageEditor {
    script: Script,
    requests: Mutex<Vec<EditRequest>>,
}

impl MockImageEditor {
    /// Play `queued` in order, then repeat `then` forever
    #[must_use]
    pub fn scripted(queued: Vec<MockOutcome>, then: MockOutcome) -> Self {
        Self {
            script: Script::new(queued, then),
            requests: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn always(outcome: MockOutcome) -> Self {
        Self::scripted(Vec::new(), outcome)
    }

    /// Succeed with `image` on every call
    #[must_use]
    pub fn returning(image: DynamicImage) -> Self {
        Self::always(MockOutcome::Image(image))
    }

    /// Number of `edit` calls received so far
    pub fn call_count(&self) -> u32 {
        self.script.calls.load(Ordering::SeqCst)
    }

    /// Every request received, in order
    pub fn requests(&self) -> Vec<EditRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl ImageEditor for MockImageEditor {
    fn name(&self) -> String {
        "mock-editor".to_string()
    }

    async fn edit(&self, request: &EditRequest) -> Result<Option<ImagePayload>> {
        lock(&self.requests).push(request.clone());
        self.script.next()
    }
}

/// Mock restoration capability
#[derive(Debug)]
pub struct MockImageRestorer {
    script: Script,
}

impl MockImageRestorer {
    #[must_use]
    pub fn scripted(queued: Vec<MockOutcome>, then: MockOutcome) -> Self {
        Self {
            script: Script::new(queued, then),
        }
    }

    #[must_use]
    pub fn always(outcome: MockOutcome) -> Self {
        Self::scripted(Vec::new(), outcome)
    }

    #[must_use]
    pub fn returning(image: DynamicImage) -> Self {
        Self::always(MockOutcome::Image(image))
    }

    pub fn call_count(&self) -> u32 {
        self.script.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageRestorer for MockImageRestorer {
    fn name(&self) -> String {
        "mock-restorer".to_string()
    }

    async fn restore(&self, _image: &ImagePayload) -> Result<Option<ImagePayload>> {
        self.script.next()
    }
}

/// Sleeper that records requested durations and returns immediately
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Durations requested so far, in order
    pub fn recorded(&self) -> Vec<Duration> {
        lock(&self.sleeps).clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        lock(&self.sleeps).push(duration);
    }
}
