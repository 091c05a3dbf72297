// Client handle - one open application instance
// Author: kelexine (https://github.com/kelexine)

use super::Registration;
use crate::error::Result;
use crate::models::{RequestDescriptor, Response};
use std::sync::Arc;
use uuid::Uuid;

/// An open application instance of a registration.
///
/// Requests of a controlled client go through the active coordinator, the
/// ones of an uncontrolled client straight to the network. Dropping the
/// handle closes the client.
pub struct ClientHandle {
    id: Uuid,
    registration: Arc<Registration>,
}

impl ClientHandle {
    pub(super) fn new(id: Uuid, registration: Arc<Registration>) -> Self {
        Self { id, registration }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Version currently controlling this client.
    pub fn controller(&self) -> Option<String> {
        self.registration.controller_of(self.id)
    }

    pub async fn fetch(&self, request: &RequestDescriptor) -> Result<Response> {
        match self.controller() {
            Some(_) => self.registration.fetch(request).await,
            None => self.registration.passthrough(request).await,
        }
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        self.registration.close_client(self.id);
    }
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("id", &self.id)
            .field("controller", &self.controller())
            .finish()
    }
}
