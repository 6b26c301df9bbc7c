//! The profiling service: owns every pipeline component and drives the
//! connection lifecycle.


use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::time::Duration;

use crate::backend::{BackendContext, BackendId, BackendRegistry};
use crate::buffer::BufferManager;
use crate::capture::PeriodicCounterCapture;
use crate::cmd::{CommandHandlerRegistry, CommandReceiver};
use crate::conn::{
    ConnectionFactory, DefaultConnectionFactory, LocalPacketHandler, ProfilingConnection,
};
use crate::counters::{
    CaptureData, Counter, CounterDescriptor, CounterDirectory, CounterIdMap, CounterValueStore,
    Holder,
};
use crate::error::{Error, Result};
use crate::guid::{Guid, GuidGenerator};
use crate::handlers::{
    ActivateTimelineReportingCommandHandler, ConnectionAcknowledgedCommandHandler,
    DeactivateTimelineReportingCommandHandler, PerJobCounterSelectionCommandHandler,
    PeriodicCounterSelectionCommandHandler, RequestCounterDirectoryCommandHandler,
};
use crate::packet::PacketVersionResolver;
use crate::send::{SendCounterPacket, SendThread, TimelineWriter};
use crate::state::{ProfilingState, ProfilingStateMachine};

/// Capture period used when the monitor never selected one.
pub const DEFAULT_CAPTURE_PERIOD_US: u32 = 150_000;

/// External profiling configuration.
#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ProfilingOptions {
    /// Master switch; nothing runs while this is off.
    pub enable_profiling: bool,

    /// Start with timeline reporting already on.
    pub timeline_enabled: bool,

    /// Capture every outbound packet to this file.
    pub outgoing_capture_file: Option<PathBuf>,

    /// Replay inbound commands from this file.
    pub incoming_capture_file: Option<PathBuf>,

    /// Use the file transport instead of a live connection.
    pub file_only: bool,

    /// Sampling period when the monitor does not select one.
    pub capture_period_us: u32,

    /// In-process subscribers observing every outbound packet.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub local_packet_handlers: Vec<Arc<dyn LocalPacketHandler>>,
}

impl Default for ProfilingOptions {
    fn default() -> Self {
        ProfilingOptions {
            enable_profiling: false,
            timeline_enabled: false,
            outgoing_capture_file: None,
            incoming_capture_file: None,
            file_only: false,
            capture_period_us: DEFAULT_CAPTURE_PERIOD_US,
            local_packet_handlers: Vec::new(),
        }
    }
}

impl std::fmt::Debug for ProfilingOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfilingOptions")
            .field("enable_profiling", &self.enable_profiling)
            .field("timeline_enabled", &self.timeline_enabled)
            .field("outgoing_capture_file", &self.outgoing_capture_file)
            .field("incoming_capture_file", &self.incoming_capture_file)
            .field("file_only", &self.file_only)
            .field("capture_period_us", &self.capture_period_us)
            .field("local_packet_handlers", &self.local_packet_handlers.len())
            .finish()
    }
}

/// Hook run when the service initializes, before it first connects.
///
/// Hosts register their categories and counters here so the directory is
/// complete by the time the monitor asks for it.
pub trait Initialiser: Send + Sync {
    fn initialise_profiling_service(&self, service: &ProfilingService);
}

/// Hook reporting the host's structure over the timeline.
///
/// Invoked once, on the first timeline activation.
pub trait ReportStructure: Send + Sync {
    fn report_structure(&self, writer: &mut TimelineWriter) -> Result<()>;
}

/// Condition-variable pair signaling the end of `Active` handshaking.
pub(crate) struct ServiceStatus {
    active: Mutex<bool>,
    posted: Condvar,
}

impl ServiceStatus {
    pub(crate) fn new() -> ServiceStatus {
        ServiceStatus {
            active: Mutex::new(false),
            posted: Condvar::new(),
        }
    }

    pub(crate) fn notify_active(&self) {
        *self.active.lock().unwrap() = true;
        self.posted.notify_all();
    }

    fn reset(&self) {
        *self.active.lock().unwrap() = false;
    }

    fn wait_for_activation(&self, timeout: Duration) -> bool {
        let active = self.active.lock().unwrap();
        let (active, wait) = self
            .posted
            .wait_timeout_while(active, timeout, |active| !*active)
            .unwrap();
        if wait.timed_out() && !*active {
            log::warn!("timed out after {timeout:?} waiting for profiling service activation");
            return false;
        }
        true
    }
}

/// Top-level orchestrator of the profiling pipeline.
///
/// # Examples
///
/// ```rust
/// use perf_pipe::backend::BackendId;
/// use perf_pipe::counters::CounterDescriptor;
/// use perf_pipe::service::{ProfilingOptions, ProfilingService};
///
/// let service = ProfilingService::new(ProfilingOptions::default());
///
/// // Counters live in a category and are mutated through the service.
/// service.counter_directory().register_category("inference").unwrap();
/// let counter = service
///     .register_counter(
///         &BackendId::from("core"),
///         0,
///         "inference",
///         CounterDescriptor {
///             name: "jobs run".into(),
///             description: "completed inference jobs".into(),
///             ..Default::default()
///         },
///     )
///     .unwrap();
///
/// service.increment_counter_value(counter.uid).unwrap();
/// assert_eq!(service.absolute_counter_value(counter.uid).unwrap(), 1);
/// ```
pub struct ProfilingService {
    options: ProfilingOptions,
    timeline_reporting: Arc<AtomicBool>,
    state: Arc<ProfilingStateMachine>,
    counter_directory: Arc<CounterDirectory>,
    counter_values: Arc<CounterValueStore>,
    counter_id_map: Arc<CounterIdMap>,
    holder: Arc<Holder>,
    buffer_manager: Arc<BufferManager>,
    send_thread: SendThread,
    capture: Arc<PeriodicCounterCapture>,
    registry: Arc<CommandHandlerRegistry>,
    resolver: PacketVersionResolver,
    receiver: CommandReceiver,
    backends: Arc<BackendRegistry>,
    guid_generator: Arc<GuidGenerator>,
    local_handlers: Arc<RwLock<Vec<Arc<dyn LocalPacketHandler>>>>,
    connection_factory: Box<dyn ConnectionFactory>,
    connection: Option<Arc<dyn ProfilingConnection>>,
    status: Arc<ServiceStatus>,
    initialiser: Option<Arc<dyn Initialiser>>,
    max_backend_counter_uid: AtomicU16,
}

impl ProfilingService {
    pub fn new(options: ProfilingOptions) -> ProfilingService {
        Self::with_report_structure(options, None)
    }

    /// Builds the service with a report-structure hook for timeline
    /// activation.
    pub fn with_report_structure(
        options: ProfilingOptions,
        report_structure: Option<Arc<dyn ReportStructure>>,
    ) -> ProfilingService {
        let state = Arc::new(ProfilingStateMachine::new());
        let buffer_manager = Arc::new(BufferManager::default());
        let counter_directory = Arc::new(CounterDirectory::new());
        let counter_values = Arc::new(CounterValueStore::new());
        let counter_id_map = Arc::new(CounterIdMap::new());
        let holder = Arc::new(Holder::new());
        // Seed the capture period so a selection without one has a default.
        holder.set_capture_data(
            resolve_capture_period(&options),
            Vec::new(),
            Default::default(),
        );
        let backends = Arc::new(BackendRegistry::new());
        let guid_generator = Arc::new(GuidGenerator::new());
        let status = Arc::new(ServiceStatus::new());
        let timeline_reporting = Arc::new(AtomicBool::new(options.timeline_enabled));
        let send_counter = SendCounterPacket::new(Arc::clone(&buffer_manager));
        let local_handlers = Arc::new(RwLock::new(options.local_packet_handlers.clone()));
        let send_thread = SendThread::new(
            Arc::clone(&state),
            Arc::clone(&buffer_manager),
            send_counter.clone(),
            Arc::clone(&local_handlers),
        );
        let capture = Arc::new(PeriodicCounterCapture::new(
            Arc::clone(&holder),
            Arc::clone(&counter_values),
            Arc::clone(&counter_id_map),
            Arc::clone(&backends),
            send_counter.clone(),
            buffer_manager.buffer_capacity(),
        ));

        let resolver = PacketVersionResolver;
        let registry = Arc::new(CommandHandlerRegistry::new());
        let version = |id| resolver.resolve_packet_version(0, id).encoded();
        let registrations = [
            registry.register(Arc::new(ConnectionAcknowledgedCommandHandler::new(
                version(1),
                Arc::clone(&state),
                Arc::clone(&counter_directory),
                send_counter.clone(),
                Arc::clone(&buffer_manager),
                Arc::clone(&timeline_reporting),
                Arc::clone(&backends),
                Arc::clone(&status),
            ))),
            registry.register(Arc::new(RequestCounterDirectoryCommandHandler::new(
                version(3),
                Arc::clone(&state),
                Arc::clone(&counter_directory),
                send_counter.clone(),
            ))),
            registry.register(Arc::new(PeriodicCounterSelectionCommandHandler::new(
                version(4),
                Arc::clone(&state),
                Arc::clone(&counter_directory),
                Arc::clone(&counter_id_map),
                Arc::clone(&holder),
                Arc::clone(&capture),
                Arc::clone(&backends),
                send_counter.clone(),
            ))),
            registry.register(Arc::new(PerJobCounterSelectionCommandHandler::new(
                version(5),
                Arc::clone(&state),
            ))),
            registry.register(Arc::new(ActivateTimelineReportingCommandHandler::new(
                version(6),
                Arc::clone(&state),
                Arc::clone(&buffer_manager),
                Arc::clone(&timeline_reporting),
                Arc::clone(&backends),
                report_structure,
            ))),
            registry.register(Arc::new(DeactivateTimelineReportingCommandHandler::new(
                version(7),
                Arc::clone(&state),
                Arc::clone(&timeline_reporting),
                Arc::clone(&backends),
            ))),
        ];
        for registration in registrations {
            registration.expect("command handler keys are distinct");
        }

        ProfilingService {
            options,
            timeline_reporting,
            state,
            counter_directory,
            counter_values,
            counter_id_map,
            holder,
            buffer_manager,
            send_thread,
            capture,
            registry,
            resolver,
            receiver: CommandReceiver::new(),
            backends,
            guid_generator,
            local_handlers,
            connection_factory: Box::new(DefaultConnectionFactory),
            connection: None,
            status,
            initialiser: None,
            max_backend_counter_uid: AtomicU16::new(0),
        }
    }

    /// Replaces the connection factory; used by hosts with a live transport
    /// and by tests.
    pub fn set_connection_factory(&mut self, factory: Box<dyn ConnectionFactory>) {
        self.connection_factory = factory;
    }

    /// Installs the hook run when the service leaves `Uninitialised`.
    pub fn set_initialiser(&mut self, initialiser: Arc<dyn Initialiser>) {
        self.initialiser = Some(initialiser);
    }

    /// Applies new options, driving the state machine as far as they allow.
    ///
    /// Enabling from scratch runs up to three [`update`][Self::update]
    /// rounds: initialize, connect, and start the worker threads so the
    /// stream-metadata packet goes out. Disabling past `NotConnected` stops
    /// everything. Returns the state reached.
    pub fn configure(
        &mut self,
        options: ProfilingOptions,
        reset: bool,
    ) -> Result<ProfilingState> {
        self.timeline_reporting
            .store(options.timeline_enabled, Ordering::Release);
        *self.local_handlers.write().unwrap() = options.local_packet_handlers.clone();
        self.options = options;
        if reset {
            self.reset()?;
        }

        if self.options.enable_profiling {
            if matches!(
                self.current_state(),
                ProfilingState::Uninitialised | ProfilingState::NotConnected
            ) {
                self.update()?;
                self.update()?;
                if self.current_state() == ProfilingState::WaitingForAck {
                    // Third poke starts the worker threads and sends the
                    // stream metadata.
                    self.update()?;
                }
            }
        } else if !matches!(
            self.current_state(),
            ProfilingState::Uninitialised | ProfilingState::NotConnected
        ) {
            self.stop()?;
        }
        Ok(self.current_state())
    }

    /// Advances the connection lifecycle one step.
    pub fn update(&mut self) -> Result<()> {
        if !self.options.enable_profiling {
            return Ok(());
        }
        match self.current_state() {
            ProfilingState::Uninitialised => {
                if let Some(initialiser) = self.initialiser.take() {
                    initialiser.initialise_profiling_service(self);
                    self.initialiser = Some(initialiser);
                }
                self.state.transition_to(ProfilingState::NotConnected)?;
            }
            ProfilingState::NotConnected => {
                // A previous connection may have died with its threads
                // still around.
                self.receiver.stop();
                self.send_thread.stop();
                self.capture.stop();
                if let Some(connection) = self.connection.take() {
                    if connection.is_open() {
                        connection.close();
                    }
                }
                match self.connection_factory.new_connection(&self.options) {
                    Ok(connection) => {
                        self.connection = Some(connection);
                        self.state.transition_to(ProfilingState::WaitingForAck)?;
                    }
                    Err(e) => {
                        log::warn!("could not open a profiling connection: {e}");
                    }
                }
            }
            ProfilingState::WaitingForAck => {
                let Some(connection) = self.connection.clone() else {
                    log::warn!("waiting for an ack without a connection");
                    return Ok(());
                };
                self.receiver.start(
                    Arc::clone(&connection),
                    Arc::clone(&self.registry),
                    self.resolver,
                );
                // Its first output is the stream-metadata packet; the ack
                // handler drives the transition to Active.
                self.send_thread.start(connection);
            }
            ProfilingState::Active => {}
        }
        Ok(())
    }

    /// Tears the connection down from `Active`; a no-op anywhere else.
    pub fn disconnect(&mut self) -> Result<()> {
        match self.current_state() {
            ProfilingState::Active => self.stop(),
            _ => Ok(()),
        }
    }

    /// Stops producers, then the consumer, then drops the connection.
    pub fn stop(&mut self) -> Result<()> {
        self.status.reset();
        // Producers first: the receive loop launches the capture worker, so
        // it goes down before the capture worker, and the send thread last.
        self.receiver.stop();
        self.capture.stop();
        self.send_thread.stop();
        if let Some(connection) = self.connection.take() {
            if connection.is_open() {
                connection.close();
            }
        }
        match self.state.transition_to(ProfilingState::NotConnected) {
            Ok(()) => Ok(()),
            Err(Error::InvalidTransition {
                from: ProfilingState::WaitingForAck,
                ..
            }) => {
                // Stopped mid-handshake; the state table has no edge for
                // this, so the state is left as-is and the next update
                // reconnects.
                log::warn!("stopped while waiting for an ack");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Stops everything and drops all registered state, returning the
    /// service to `Uninitialised`.
    pub fn reset(&mut self) -> Result<()> {
        self.stop()?;
        self.counter_values.reset();
        self.counter_directory.clear();
        self.counter_id_map.reset();
        self.buffer_manager.reset();
        self.backends.clear();
        self.holder.set_capture_data(
            resolve_capture_period(&self.options),
            Vec::new(),
            Default::default(),
        );
        self.guid_generator.reset();
        self.max_backend_counter_uid.store(0, Ordering::Relaxed);
        self.timeline_reporting
            .store(self.options.timeline_enabled, Ordering::Release);
        self.state.reset();
        Ok(())
    }

    pub fn current_state(&self) -> ProfilingState {
        self.state.current_state()
    }

    pub fn is_profiling_enabled(&self) -> bool {
        self.options.enable_profiling
    }

    pub fn is_timeline_reporting_enabled(&self) -> bool {
        self.timeline_reporting.load(Ordering::Acquire)
    }

    /// The counter directory, for registration and lookups.
    pub fn counter_directory(&self) -> &CounterDirectory {
        &self.counter_directory
    }

    /// Registers a counter and initializes a value slot for every UID it
    /// reserves.
    pub fn register_counter(
        &self,
        backend_id: &BackendId,
        requested_uid: u16,
        parent_category: &str,
        descriptor: CounterDescriptor,
    ) -> Result<Arc<Counter>> {
        let counter =
            self.counter_directory
                .register_counter(backend_id, requested_uid, parent_category, descriptor)?;
        for uid in counter.uid..=counter.max_uid {
            self.counter_values.initialize(uid);
        }
        Ok(counter)
    }

    pub fn is_counter_registered(&self, uid: u16) -> bool {
        self.counter_directory.is_counter_registered(uid)
    }

    pub fn counter_count(&self) -> u16 {
        self.counter_directory.counter_count()
    }

    fn check_counter_uid(&self, uid: u16) -> Result<()> {
        if !self.is_counter_registered(uid) {
            return Err(Error::NotRegistered(format!("counter UID {uid}")));
        }
        Ok(())
    }

    pub fn absolute_counter_value(&self, uid: u16) -> Result<u32> {
        self.check_counter_uid(uid)?;
        self.counter_values.get_absolute(uid)
    }

    pub fn delta_counter_value(&self, uid: u16) -> Result<u32> {
        self.check_counter_uid(uid)?;
        self.counter_values.get_delta(uid)
    }

    pub fn set_counter_value(&self, uid: u16, value: u32) -> Result<()> {
        self.check_counter_uid(uid)?;
        self.counter_values.set(uid, value)
    }

    pub fn add_counter_value(&self, uid: u16, value: u32) -> Result<u32> {
        self.check_counter_uid(uid)?;
        self.counter_values.add(uid, value)
    }

    pub fn subtract_counter_value(&self, uid: u16, value: u32) -> Result<u32> {
        self.check_counter_uid(uid)?;
        self.counter_values.subtract(uid, value)
    }

    pub fn increment_counter_value(&self, uid: u16) -> Result<u32> {
        self.check_counter_uid(uid)?;
        self.counter_values.increment(uid)
    }

    pub fn counter_mappings(&self) -> &CounterIdMap {
        &self.counter_id_map
    }

    pub fn capture_data(&self) -> CaptureData {
        self.holder.capture_data()
    }

    pub fn set_capture_data(
        &self,
        capture_period_us: u32,
        counter_uids: Vec<u16>,
        active_backends: std::collections::BTreeSet<BackendId>,
    ) {
        self.holder
            .set_capture_data(capture_period_us, counter_uids, active_backends);
    }

    /// Stores a backend context and lets it claim a slice of the global
    /// counter UID space.
    pub fn add_backend_context(&self, backend_id: BackendId, context: Arc<dyn BackendContext>) {
        let first_free = self.max_backend_counter_uid.load(Ordering::Relaxed);
        let high_water = context.register_counters(first_free);
        self.max_backend_counter_uid
            .store(high_water, Ordering::Relaxed);
        self.backends.insert(backend_id, context);
    }

    pub fn notify_backends_for_timeline_reporting(&self) {
        self.backends
            .notify_timeline_reporting(self.is_timeline_reporting_enabled());
    }

    /// Registers an in-process subscriber for outbound packets.
    pub fn add_local_packet_handler(&self, handler: Arc<dyn LocalPacketHandler>) {
        self.local_handlers.write().unwrap().push(handler);
    }

    pub fn next_guid(&self) -> Guid {
        self.guid_generator.next_guid()
    }

    pub fn static_guid(&self, text: &str) -> Guid {
        self.guid_generator.static_guid(text)
    }

    pub fn guid_generator(&self) -> &GuidGenerator {
        &self.guid_generator
    }

    /// A fresh timeline writer over the shared buffer pool.
    pub fn timeline_writer(&self) -> TimelineWriter {
        TimelineWriter::new(Arc::clone(&self.buffer_manager))
    }

    pub fn notify_profiling_service_active(&self) {
        self.status.notify_active();
    }

    /// Blocks until the handshake completes, or `timeout_ms` expires
    /// (logged, not an error).
    pub fn wait_for_profiling_service_activation(&self, timeout_ms: u64) -> bool {
        self.status
            .wait_for_activation(Duration::from_millis(timeout_ms))
    }

    /// Blocks until the send thread puts the next packet on the wire.
    pub fn wait_for_packet_sent(&self, timeout_ms: u64) -> bool {
        self.send_thread
            .wait_for_packet_sent(Duration::from_millis(timeout_ms))
    }

    #[cfg(test)]
    pub(crate) fn command_registry(&self) -> Arc<CommandHandlerRegistry> {
        Arc::clone(&self.registry)
    }

    #[cfg(test)]
    pub(crate) fn packet_version_resolver(&self) -> PacketVersionResolver {
        self.resolver
    }
}

fn resolve_capture_period(options: &ProfilingOptions) -> u32 {
    if options.capture_period_us == 0 {
        DEFAULT_CAPTURE_PERIOD_US
    } else {
        options.capture_period_us
    }
}

impl Drop for ProfilingService {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("profiling service shutdown: {e}");
        }
    }
}
