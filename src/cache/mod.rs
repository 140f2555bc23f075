pub(crate) mod section_cache;

pub use section_cache::SectionCache;
