use std::sync::Arc;

use warren_provision::Provisioner;

#[derive(Clone)]
pub struct AppState {
    pub provisioner: Arc<Provisioner>,
    /// Static bearer secret for the control surface.
    pub secret: Arc<str>,
}
