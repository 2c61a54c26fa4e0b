pub mod attendees;
pub mod data;
pub mod duration;
pub mod matcher;
pub mod projector;
pub mod reconciler;
