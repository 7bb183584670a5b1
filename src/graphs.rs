//! Visualization hooks driven from the experiment loop.
//!
//! Updaters are notified after every injected batch with the dataset and the
//! length it had before the batch, so incremental renderers touch only new
//! observations. Updaters run on the worker thread and must not block.

use tracing::debug;

use crate::data::Data;

/// One registered visualization consumer.
pub trait GraphUpdater: Send {
    /// A short identifier used in logs.
    fn name(&self) -> &str;

    /// Called after each batch. `last_size` is the observation count before
    /// the batch landed; `data.len() - last_size` rows are new.
    fn update(&mut self, data: &Data, last_size: usize);
}

/// Ordered collection of updaters, notified in registration order.
#[derive(Default)]
pub struct GraphRegistry {
    updaters: Vec<Box<dyn GraphUpdater>>,
}

impl GraphRegistry {
    pub fn register(&mut self, updater: Box<dyn GraphUpdater>) {
        debug!(name = updater.name(), "graph updater registered");
        self.updaters.push(updater);
    }

    pub fn update_all(&mut self, data: &Data, last_size: usize) {
        for updater in &mut self.updaters {
            updater.update(data, last_size);
        }
    }

    pub fn len(&self) -> usize {
        self.updaters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updaters.is_empty()
    }
}
