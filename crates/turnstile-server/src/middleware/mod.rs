//! Middleware stack para el servidor HTTP.
//!
//! - `AdmissionLayer`: token bucket delante de las rutas `/api/*`
//! - `request_id`: genera X-Request-Id (UUID v7) y el span de cada request

mod admission;
mod request_id;

pub use admission::{AdmissionLayer, AdmissionMiddleware};
pub use request_id::{MakeRequestUuidV7, REQUEST_ID_HEADER, make_request_span};
