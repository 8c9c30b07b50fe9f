pub mod batch_scrape;
pub mod normalize;
pub mod pipeline;
