use crate::server::TerraServerConfig;
use std::sync::Arc;
use terra_core::traits::InstanceStore;

#[derive(Clone)]
pub struct AppState<S: InstanceStore + Clone> {
    pub store: S,
    pub config: Arc<TerraServerConfig>,
}
