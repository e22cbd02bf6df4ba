pub mod contour;
pub mod debug_sink;
pub mod drive_policy;
pub mod geometry;
pub mod line_extractor;
pub mod pose;
pub mod roi;
pub mod threshold_balancer;
