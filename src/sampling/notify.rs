// src/sampling/notify.rs
//! Publish-on-change notifications for presentation layers

/// Which observable field of the coordinator changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    IsSampling,
    SamplingProgress,
    Samples,
    SelectedReading,
    Diagnostic,
    SelectedTarget,
    SamplesDiagnostics,
    SamplingMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetChange {
    /// Index of the affected target; `None` for coordinator-wide fields
    pub target: Option<usize>,
    pub property: Property,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Box<dyn FnMut(&TargetChange) + Send>;

/// Callback list invoked synchronously on every change
#[derive(Default)]
pub struct ChangeNotifier {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Callback)>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&TargetChange) + Send + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub, _)| *sub != id);
        self.subscribers.len() != before
    }

    pub fn notify(&mut self, target: Option<usize>, property: Property) {
        let change = TargetChange { target, property };
        for (_, callback) in self.subscribers.iter_mut() {
            callback(&change);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
