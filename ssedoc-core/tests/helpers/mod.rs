//! Shared helpers for session and HTTP integration tests

#![allow(dead_code)]

use ssedoc_common::{EventState, Notification};
use ssedoc_core::extractors::{ContentExtractor, ExtractionError, ExtractorTable};
use ssedoc_core::session::{
    DeliverySink, SessionOrchestrator, SessionRegistry, SessionSettings, SubmittedFile,
};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Extractor that blocks before returning the file's text
pub struct SlowExtractor {
    pub delay: Duration,
}

impl ContentExtractor for SlowExtractor {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn extract(&self, file: &mut File) -> Result<String, ExtractionError> {
        std::thread::sleep(self.delay);
        let mut text = String::new();
        file.read_to_string(&mut text)?;
        Ok(text)
    }
}

/// Extractor that always panics
pub struct PanickingExtractor;

impl ContentExtractor for PanickingExtractor {
    fn name(&self) -> &'static str {
        "panicking"
    }

    fn extract(&self, _file: &mut File) -> Result<String, ExtractionError> {
        panic!("extractor exploded");
    }
}

pub fn text_file(name: &str, content: &str) -> SubmittedFile {
    SubmittedFile::from_bytes(name, Some("text/plain"), content.as_bytes()).unwrap()
}

pub fn text_files(n: usize) -> Vec<SubmittedFile> {
    (0..n)
        .map(|i| text_file(&format!("file-{}.txt", i), &format!("content of file {}", i)))
        .collect()
}

pub fn settings(timeout: Duration, stream_progress: bool) -> SessionSettings {
    SessionSettings {
        timeout,
        max_files: 10,
        stream_progress,
        attach_grace: Duration::ZERO,
    }
}

pub fn orchestrator(table: ExtractorTable, settings: SessionSettings) -> SessionOrchestrator {
    SessionOrchestrator::new(SessionRegistry::new(), Arc::new(table), settings)
}

/// Files named `slow-*` and `panic-*` go to test extractors, the rest to the standard routes
pub fn table_with_test_routes(delay: Duration) -> ExtractorTable {
    ExtractorTable::new()
        .with_route(|p| p.filename.starts_with("slow-"), SlowExtractor { delay })
        .with_route(|p| p.filename.starts_with("panic-"), PanickingExtractor)
        .with_standard_routes(10)
}

/// Drain a sink until its stream ends
pub async fn drain(mut sink: DeliverySink, deadline: Instant) -> Vec<Notification> {
    let mut events = Vec::new();
    while let Some(event) = sink.recv_until(deadline).await {
        events.push(event);
    }
    events
}

pub fn count(events: &[Notification], state: EventState) -> usize {
    events.iter().filter(|e| e.event == state).count()
}

fn rank(state: EventState) -> u8 {
    match state {
        EventState::FileQueued => 0,
        EventState::FileProcessingStarted => 1,
        EventState::FileProcessed | EventState::FileProcessingError => 2,
        EventState::FileCompleted => 3,
        EventState::UploadStarted | EventState::Completed => u8::MAX,
    }
}

/// Events grouped by task id, in arrival order
pub fn by_task(events: &[Notification]) -> HashMap<String, Vec<EventState>> {
    let mut tasks: HashMap<String, Vec<EventState>> = HashMap::new();
    for event in events.iter().filter(|e| !e.is_session_level()) {
        tasks.entry(event.uuid.clone()).or_default().push(event.event);
    }
    tasks
}

/// Every task's events follow the state machine order, with no repeats
pub fn assert_task_order(events: &[Notification]) {
    for (task_id, states) in by_task(events) {
        let ranks: Vec<u8> = states.iter().map(|s| rank(*s)).collect();
        assert!(
            ranks.windows(2).all(|w| w[0] < w[1]),
            "task {} has out-of-order events: {:?}",
            task_id,
            states
        );
    }
}

/// Session COMPLETED is last and comes after every task's FILE_COMPLETED
pub fn assert_completed_last(events: &[Notification]) {
    let last = events.last().expect("no events received");
    assert_eq!(last.event, EventState::Completed);
    assert_eq!(count(events, EventState::Completed), 1);
}
