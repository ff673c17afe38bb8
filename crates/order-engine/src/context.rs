use std::sync::Arc;

use order_core::{OrderGateway, SymbolFilters};

use crate::journal::{JournalEntry, OrderJournal};

/// Shared handles injected into every strategy.
#[derive(Clone)]
pub struct Collaborators {
    pub gateway: Arc<dyn OrderGateway>,
    pub filters: Arc<dyn SymbolFilters>,
    pub journal: Arc<dyn OrderJournal>,
}

impl Collaborators {
    pub fn new(
        gateway: Arc<dyn OrderGateway>,
        filters: Arc<dyn SymbolFilters>,
        journal: Arc<dyn OrderJournal>,
    ) -> Self {
        Self {
            gateway,
            filters,
            journal,
        }
    }

    pub(crate) fn record(&self, entry: JournalEntry) {
        self.journal.record(entry);
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
