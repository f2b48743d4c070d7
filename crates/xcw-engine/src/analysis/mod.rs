mod normalize;

pub use normalize::normalize_message;
