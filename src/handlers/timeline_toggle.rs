//! Handlers for Activate/Deactivate Timeline Reporting (family 0, ids 6/7).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::backend::BackendRegistry;
use crate::buffer::BufferManager;
use crate::cmd::CommandHandler;
use crate::error::{Error, Result};
use crate::packet::Packet;
use crate::send::TimelineWriter;
use crate::service::ReportStructure;
use crate::state::{ProfilingState, ProfilingStateMachine};

/// Turns the timeline stream on.
///
/// The first flip from off to on emits the timeline message directory and
/// the well-known baseline, then runs the report-structure hook exactly once
/// per service lifetime; every flip notifies the backends. An activate while
/// already on changes nothing.
pub struct ActivateTimelineReportingCommandHandler {
    version: u32,
    state: Arc<ProfilingStateMachine>,
    buffer_manager: Arc<BufferManager>,
    timeline_reporting: Arc<AtomicBool>,
    backends: Arc<BackendRegistry>,
    report_structure: Option<Arc<dyn ReportStructure>>,
    report_done: AtomicBool,
}

impl ActivateTimelineReportingCommandHandler {
    pub(crate) fn new(
        version: u32,
        state: Arc<ProfilingStateMachine>,
        buffer_manager: Arc<BufferManager>,
        timeline_reporting: Arc<AtomicBool>,
        backends: Arc<BackendRegistry>,
        report_structure: Option<Arc<dyn ReportStructure>>,
    ) -> ActivateTimelineReportingCommandHandler {
        ActivateTimelineReportingCommandHandler {
            version,
            state,
            buffer_manager,
            timeline_reporting,
            backends,
            report_structure,
            report_done: AtomicBool::new(false),
        }
    }
}

impl CommandHandler for ActivateTimelineReportingCommandHandler {
    fn family(&self) -> u32 {
        0
    }

    fn packet_id(&self) -> u32 {
        6
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn handle(&self, packet: &Packet) -> Result<()> {
        if packet.family() != 0 || packet.packet_id() != 6 {
            return Err(Error::InvalidArgument(format!(
                "expected family 0 id 6, got {packet}"
            )));
        }
        match self.state.current_state() {
            ProfilingState::Active => {}
            state => {
                return Err(Error::WrongState {
                    operation: "activate timeline reporting",
                    state,
                })
            }
        }

        if self.timeline_reporting.load(Ordering::Acquire) {
            return Ok(());
        }

        let mut writer = TimelineWriter::new(Arc::clone(&self.buffer_manager));
        writer.send_timeline_message_directory_package()?;
        writer.send_well_known_labels_and_event_classes()?;

        self.timeline_reporting.store(true, Ordering::Release);

        if let Some(hook) = &self.report_structure {
            if !self.report_done.swap(true, Ordering::AcqRel) {
                hook.report_structure(&mut writer)?;
                writer.commit()?;
            }
        }

        self.backends.notify_timeline_reporting(true);
        Ok(())
    }
}

/// Turns the timeline stream off and tells the backends.
pub struct DeactivateTimelineReportingCommandHandler {
    version: u32,
    state: Arc<ProfilingStateMachine>,
    timeline_reporting: Arc<AtomicBool>,
    backends: Arc<BackendRegistry>,
}

impl DeactivateTimelineReportingCommandHandler {
    pub(crate) fn new(
        version: u32,
        state: Arc<ProfilingStateMachine>,
        timeline_reporting: Arc<AtomicBool>,
        backends: Arc<BackendRegistry>,
    ) -> DeactivateTimelineReportingCommandHandler {
        DeactivateTimelineReportingCommandHandler {
            version,
            state,
            timeline_reporting,
            backends,
        }
    }
}

impl CommandHandler for DeactivateTimelineReportingCommandHandler {
    fn family(&self) -> u32 {
        0
    }

    fn packet_id(&self) -> u32 {
        7
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn handle(&self, packet: &Packet) -> Result<()> {
        if packet.family() != 0 || packet.packet_id() != 7 {
            return Err(Error::InvalidArgument(format!(
                "expected family 0 id 7, got {packet}"
            )));
        }
        match self.state.current_state() {
            ProfilingState::Active => {}
            state => {
                return Err(Error::WrongState {
                    operation: "deactivate timeline reporting",
                    state,
                })
            }
        }

        self.timeline_reporting.store(false, Ordering::Release);
        self.backends.notify_timeline_reporting(false);
        Ok(())
    }
}
