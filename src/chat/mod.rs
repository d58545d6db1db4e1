pub mod discussion;

pub use discussion::render_discussion;
