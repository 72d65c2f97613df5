// Record processing: field filters, admission gates and geocoding

pub mod candidate;
pub mod filters;
pub mod geocode;
pub mod normalize;
pub mod quality_gate;
