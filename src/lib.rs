// src/lib.rs

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::feed::{HttpOfferingSource, OfferingSource, SampleOfferingSource};
use crate::services::sample::sample_offerings;

/// Upstream source for the configured feed, or the built-in sample set.
pub fn offering_source(config: &AppConfig) -> anyhow::Result<Arc<dyn OfferingSource>> {
    match &config.feed_url {
        Some(url) => {
            log::info!("Using upstream feed {} ({:?})", url, config.feed_format);
            Ok(Arc::new(HttpOfferingSource::new(
                url,
                config.feed_format,
                config.refresh.fetch_timeout,
            )?))
        }
        None => {
            log::warn!("IPO_FEED_URL not set, serving the built-in sample offerings");
            Ok(Arc::new(SampleOfferingSource::new(sample_offerings())))
        }
    }
}
