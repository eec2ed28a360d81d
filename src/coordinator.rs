// src/coordinator.rs
//! Session coordinator: owns the locations of interest and decides which
//! one is being sampled.
//!
//! At most one sampling session is active. Switching away from a target
//! whose batch is still running stops its feed and rolls the target back to
//! the samples it had before that batch began.

use crate::{
    error::{Result, SamplerError},
    export::PersistenceSink,
    gps::{
        data::{LocationSample, RawReading},
        source::{LocationSource, PermissionStatus, SamplingMethod, SourceEvent},
    },
    sampling::{
        ChangeNotifier, LocationOfInterest, Property, ReadingOutcome, SamplingSession,
        SubscriptionId, TargetChange,
    },
};
use tokio::sync::mpsc;

pub struct SamplingCoordinator<S, P> {
    targets: Vec<LocationOfInterest>,
    selected: Option<usize>,
    session: Option<SamplingSession>,
    /// Samples of the sampled target as they were before its batch began
    saved_samples: Vec<LocationSample>,
    permission_granted: bool,
    method: SamplingMethod,
    samples_diagnostics: String,
    events: Option<mpsc::UnboundedReceiver<SourceEvent>>,
    source: S,
    sink: P,
    notifier: ChangeNotifier,
}

impl<S, P> SamplingCoordinator<S, P>
where
    S: LocationSource,
    P: PersistenceSink,
{
    pub fn new(targets: Vec<LocationOfInterest>, source: S, sink: P, method: SamplingMethod) -> Self {
        Self {
            targets,
            selected: None,
            session: None,
            saved_samples: Vec::new(),
            permission_granted: false,
            method,
            samples_diagnostics: String::new(),
            events: None,
            source,
            sink,
            notifier: ChangeNotifier::new(),
        }
    }

    /// Build targets from names, in order
    pub fn with_target_names<I, T>(names: I, source: S, sink: P, method: SamplingMethod) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let targets = names.into_iter().map(LocationOfInterest::new).collect();
        Self::new(targets, source, sink, method)
    }

    pub fn targets(&self) -> &[LocationOfInterest] {
        &self.targets
    }

    pub fn target(&self, index: usize) -> Option<&LocationOfInterest> {
        self.targets.get(index)
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected_target(&self) -> Option<&LocationOfInterest> {
        self.selected.and_then(|i| self.targets.get(i))
    }

    pub fn is_sampling(&self) -> bool {
        self.session.as_ref().map_or(false, |s| s.is_active())
    }

    pub fn permission_granted(&self) -> bool {
        self.permission_granted
    }

    pub fn samples_diagnostics(&self) -> &str {
        &self.samples_diagnostics
    }

    pub fn show_samples_diagnostics(&self) -> bool {
        !self.samples_diagnostics.is_empty()
    }

    pub fn sampling_method(&self) -> SamplingMethod {
        self.method
    }

    pub fn can_change_sampling_method(&self) -> bool {
        !self.is_sampling()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn sink(&self) -> &P {
        &self.sink
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&TargetChange) + Send + 'static,
    {
        self.notifier.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    /// Switch sampling method; refused while a batch is running.
    pub fn set_sampling_method(&mut self, method: SamplingMethod) -> bool {
        if !self.can_change_sampling_method() {
            return false;
        }
        if self.method != method {
            self.method = method;
            self.notifier.notify(None, Property::SamplingMethod);
        }
        true
    }

    /// Page became visible: make sure location permission is held.
    pub fn on_appear(&mut self) -> PermissionStatus {
        if self.permission_granted {
            return PermissionStatus::Granted;
        }

        let mut status = self.source.check_permission();
        if status != PermissionStatus::Granted {
            status = self.source.request_permission();
        }
        self.permission_granted = status == PermissionStatus::Granted;

        if self.permission_granted {
            log::info!("Location permission granted");
        } else {
            log::warn!("Location permission denied");
        }
        status
    }

    /// Page went away: stop any running batch, keeping what it collected.
    pub fn on_disappear(&mut self) {
        self.stop();
    }

    /// Make `index` the current target and start a fresh batch for it.
    ///
    /// A batch still running (for any target, this one included) is
    /// abandoned and its target rolled back first. Returns
    /// `PermissionDenied` when no batch could be started; the selection
    /// itself still changes.
    pub fn select_target(&mut self, index: usize) -> Result<()> {
        if index >= self.targets.len() {
            return Err(SamplerError::Other(format!("No location of interest at index {}", index)));
        }

        self.abandon_active_session();

        self.selected = Some(index);
        self.notifier.notify(Some(index), Property::SelectedTarget);

        self.start()
    }

    /// Stop sampling, clear every target and the diagnostics.
    pub fn clear_all(&mut self) {
        self.stop();

        for (index, target) in self.targets.iter_mut().enumerate() {
            target.clear();
            self.notifier.notify(Some(index), Property::Samples);
            self.notifier.notify(Some(index), Property::SelectedReading);
        }
        self.saved_samples.clear();
        self.set_samples_diagnostics(String::new());
    }

    /// Wait for the next event of the active feed. Never resolves while no
    /// feed is running.
    pub async fn next_event(&mut self) -> SourceEvent {
        match self.recv_event().await {
            Some(event) => event,
            None => std::future::pending().await,
        }
    }

    /// Next event of the active feed, or `None` once the feed has closed or
    /// when none is running.
    pub async fn recv_event(&mut self) -> Option<SourceEvent> {
        let rx = self.events.as_mut()?;
        match rx.recv().await {
            Some(event) => Some(event),
            None => {
                log::info!("Location feed closed");
                self.events = None;
                None
            }
        }
    }

    pub fn handle_event(&mut self, event: SourceEvent) -> ReadingOutcome {
        match event {
            SourceEvent::Reading(reading) => self.on_reading(&reading),
            SourceEvent::ListeningFailed(message) => {
                log::error!("Error sampling location: {}", message);
                self.set_samples_diagnostics(format!("Location sampling error: {}", message));
                ReadingOutcome::Ignored
            }
        }
    }

    /// Hand one reading to the active session.
    pub fn on_reading(&mut self, reading: &RawReading) -> ReadingOutcome {
        let session = match self.session.as_mut() {
            Some(session) if session.is_active() => session,
            _ => return ReadingOutcome::Ignored,
        };
        let index = session.target_index();
        let outcome = session.on_reading(&mut self.targets[index], reading);

        match outcome {
            ReadingOutcome::Accepted { .. } => {
                self.notifier.notify(Some(index), Property::Samples);
                self.notifier.notify(Some(index), Property::SamplingProgress);
            }
            ReadingOutcome::Completed => {
                self.halt_feed();
                self.saved_samples.clear();
                for property in [
                    Property::Samples,
                    Property::SamplingProgress,
                    Property::IsSampling,
                    Property::SelectedReading,
                    Property::Diagnostic,
                ] {
                    self.notifier.notify(Some(index), property);
                }
                self.sink.persist(&self.targets);
            }
            ReadingOutcome::Rejected | ReadingOutcome::Ignored => {}
        }
        outcome
    }

    fn start(&mut self) -> Result<()> {
        let index = match self.selected {
            Some(index) => index,
            None => return Ok(()),
        };
        if !self.permission_granted {
            log::warn!("Location permission not granted; not sampling '{}'", self.targets[index].name());
            return Err(SamplerError::PermissionDenied);
        }

        let target = &mut self.targets[index];
        self.saved_samples = target.samples().to_vec();
        self.session = Some(SamplingSession::begin(index, target));
        self.set_samples_diagnostics(String::new());
        self.notifier.notify(Some(index), Property::IsSampling);
        self.notifier.notify(Some(index), Property::Samples);

        match self.source.start(self.method) {
            Ok(rx) => self.events = Some(rx),
            Err(e) => {
                // The batch stays open; the user may retry by selecting again
                log::error!("Error starting location sampling: {}", e);
                self.set_samples_diagnostics("Failed to start GPS location sampling!".to_string());
            }
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.halt_feed();
        if let Some(session) = self.session.as_mut() {
            let index = session.target_index();
            if session.stop(&mut self.targets[index]) {
                self.notifier.notify(Some(index), Property::IsSampling);
            }
        }
    }

    /// Stop a running batch and restore its pre-batch samples.
    fn abandon_active_session(&mut self) {
        let index = match self.session.as_ref() {
            Some(session) if session.is_active() => session.target_index(),
            _ => return,
        };

        // No reading may land after the rollback below
        self.stop();

        let restored = std::mem::take(&mut self.saved_samples);
        log::info!(
            "Restoring {} previous sample(s) for '{}'",
            restored.len(),
            self.targets[index].name()
        );
        self.targets[index].replace_samples(restored);
        self.notifier.notify(Some(index), Property::Samples);
        self.notifier.notify(Some(index), Property::SamplingProgress);
    }

    fn halt_feed(&mut self) {
        self.events = None;
        self.source.stop();
    }

    fn set_samples_diagnostics(&mut self, value: String) {
        if self.samples_diagnostics != value {
            self.samples_diagnostics = value;
            self.notifier.notify(None, Property::SamplesDiagnostics);
        }
    }
}
