use std::sync::Arc;

use crate::exec::ExecService;
use crate::forward::Forwarder;
use crate::history::HistoryService;

#[derive(Clone)]
pub struct ExecState {
    pub service: Arc<dyn ExecService>,
    /// Only read for health reporting; the service chain holds its own handle.
    pub forwarder: Option<Arc<Forwarder>>,
}

#[derive(Clone)]
pub struct StoreState {
    pub service: Arc<dyn HistoryService>,
}
