mod section;

pub use section::DirtyState;
