mod handler;

pub use handler::{MAX_FILES, upload_images};
