pub mod document;
pub mod html;
pub mod normalize;

pub use document::Document;
pub use html::{HeadingBlock, Link};
pub use normalize::{clean_title, collapse_whitespace, normalize_width};
