mod tracker;

pub use tracker::{SessionChange, Tracker};
