mod handler;
mod model;

pub use handler::{
    callback, callback_page, current_user, logout, reconcile, send_otp, start_oauth,
};
pub use model::{OtpRequest, ReconcileRequest, SessionResponse};
