//! `{ "data": ... }` envelope for successful `/api/v1` responses.
//!
//! Errors use the `{error, code}` shape from [`crate::error::AppError`]
//! instead, so clients can branch on the top-level key.

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
