//! Shared request/response shapes

pub mod pagination;

pub use pagination::{Page, PageParams, Paginated};
