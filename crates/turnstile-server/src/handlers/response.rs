//! Success envelope shared by the user API.

use serde::Serialize;
use turnstile_core::User;

/// Cuerpo de toda respuesta exitosa.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T: Serialize> {
    /// Siempre 200 en respuestas exitosas
    pub code: u32,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: 200,
            message: "success".to_string(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    /// Respuesta sin `data`.
    pub fn empty() -> Self {
        Self {
            code: 200,
            message: "success".to_string(),
            data: None,
        }
    }
}

/// Payload de `/api/list`.
#[derive(Debug, Clone, Serialize)]
pub struct UserListData {
    pub total: usize,
    pub list: Vec<User>,
}
