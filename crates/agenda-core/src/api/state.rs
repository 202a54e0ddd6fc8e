//! Shared component graph behind `AgendaApi`.

use crate::accessor::ContactAccessor;
use crate::cache::CacheBackend;
use crate::config::AgendaConfig;
use crate::resilience::Resilience;
use crate::service::ContactService;
use crate::store::ContactRepository;
use crate::upstream::ResilientContactClient;
use std::sync::Arc;

/// All components owned by one agenda instance.
pub(crate) struct ApiState {
    pub(crate) config: AgendaConfig,
    pub(crate) cache: Arc<dyn CacheBackend>,
    pub(crate) repository: Arc<dyn ContactRepository>,
    pub(crate) store_resilience: Arc<Resilience>,
    pub(crate) upstream_resilience: Arc<Resilience>,
    pub(crate) accessor: ContactAccessor,
    pub(crate) client: Arc<ResilientContactClient>,
    pub(crate) service: ContactService,
}
