//! ResourceSync core: inventories and changesets as sitemaps.
//!
//! A synchronization *source* publishes the state of its resources; a
//! *destination* replicates that state. Both sides share this crate:
//!
//! - [`resource`] / [`container`]: the data model (resources, change
//!   records, inventories, changesets, capability links)
//! - [`sitemap`]: the codec that turns containers into Sitemap-format XML
//!   documents (and a sitemapindex when a container outgrows one document)
//!   and back
//! - [`mapper`] / [`fetch`]: translation between published URI space and
//!   local storage, and the retrieval seam behind the codec's read path
//! - [`source`]: a demonstration source that simulates resource churn and
//!   periodically republishes itself

pub mod cli;
pub mod config;
pub mod container;
pub mod datetime;
pub mod fetch;
pub mod logger;
pub mod mapper;
pub mod resource;
pub mod sitemap;
pub mod source;
