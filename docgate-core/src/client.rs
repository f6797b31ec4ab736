//! The composition root: owns a store driver and hands out models.
//!
//! # Example
//!
//! ```ignore
//! use docgate::{prelude::*, memory::InMemoryDriver};
//!
//! let client = Client::new(InMemoryDriver::builder().build().await?);
//! let users = client.model("users", TypedAdapter::<User>::binary_id());
//! ```

use crate::{
    adapter::Adapter,
    driver::StoreDriver,
    error::ModelResult,
    model::Model,
    options::ModelOptions,
};

/// Holds the store connection handle and constructs [`Model`]s bound to it.
///
/// Models borrow the driver, so they live as long as the client. The driver is never
/// reconfigured through a model. Use `Client<Arc<dyn StoreDriver>>` to pick the driver
/// at runtime.
#[derive(Debug)]
pub struct Client<D: StoreDriver> {
    driver: D,
}

impl<D: StoreDriver> Client<D> {
    pub fn new(driver: D) -> Self {
        Self { driver }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Creates a model for `collection` with default options.
    pub fn model<A: Adapter>(&self, collection: &str, adapter: A) -> Model<'_, D, A> {
        Model::new(collection, &self.driver, adapter)
    }

    /// Creates a model for `collection` with the given options.
    pub fn model_with_options<A: Adapter>(
        &self,
        collection: &str,
        adapter: A,
        options: ModelOptions,
    ) -> Model<'_, D, A> {
        Model::with_options(collection, &self.driver, adapter, options)
    }

    /// Shuts down the driver. Consumes the client, so no model can outlive it.
    pub async fn shutdown(self) -> ModelResult<()> {
        self.driver.shutdown().await
    }
}
