pub mod block_plan;
pub mod classification;
pub mod models;
pub mod notification;
pub mod sites;
