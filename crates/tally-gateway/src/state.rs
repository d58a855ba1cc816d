use std::sync::Arc;

use tally_core::{CodeGenerator, LinkStore, RandomCodeGenerator};
use tally_redirector::Redirector;

#[derive(Clone)]
pub struct AppState {
    redirector: Arc<dyn Redirector>,
    store: Arc<dyn LinkStore>,
    generator: Arc<dyn CodeGenerator>,
    base_url: String,
}

impl AppState {
    /// `store` backs link creation only; every read goes through
    /// `redirector` so expiry is enforced in one place.
    pub fn new(
        redirector: Arc<dyn Redirector>,
        store: Arc<dyn LinkStore>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            redirector,
            store,
            generator: Arc::new(RandomCodeGenerator::default()),
            base_url: public_base_url.into(),
        }
    }

    /// Replaces the generator used for links created without a code.
    pub fn with_generator(mut self, generator: Arc<dyn CodeGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn redirector(&self) -> &dyn Redirector {
        self.redirector.as_ref()
    }

    pub fn store(&self) -> &dyn LinkStore {
        self.store.as_ref()
    }

    pub fn generator(&self) -> &dyn CodeGenerator {
        self.generator.as_ref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}
