mod handler;
mod model;

pub use handler::{get_me, get_user, update_me};
pub use model::{PublicProfile, UpdateProfileRequest, UserProfile, normalize_whatsapp};
