pub mod offer_sweeper;

pub use offer_sweeper::OfferSweeper;
